//! Link integrity checking for a generated corpus.
//!
//! Every page under `numbers/` and every Markdown file at the corpus root
//! (the index) is parsed once into a [`LinkGraph`]. Each
//! navigation link must point at an existing page whose id is the origin
//! plus the link's offset, and that page must link back with the inverse
//! kind. Every other relative link must resolve to an existing file inside
//! the corpus. Nothing is repaired.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use numsheet_shared::{NumsheetError, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::corpus::Corpus;
use crate::page::NavKind;
use crate::render::page_rel_path;

static NAV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- (previous|next|-10|\+10|-100|\+100): \[(\d{3})\]\(([^)\s]+)\)$")
        .expect("valid regex")
});

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid regex"));

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    /// A navigation link points at a page that does not exist.
    MissingTarget,
    /// A navigation link points at the wrong id.
    WrongTarget,
    /// The target page does not link back with the inverse kind.
    NotReciprocated,
    /// A non-navigation relative link does not resolve.
    BrokenLink,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingTarget => "missing target",
            Self::WrongTarget => "wrong target",
            Self::NotReciprocated => "not reciprocated",
            Self::BrokenLink => "broken link",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkViolation {
    pub origin_id: Option<u16>,
    /// Relative to the corpus root.
    pub origin_path: PathBuf,
    /// Navigation label (`next`, `+10`, ...) or `link`.
    pub link: String,
    pub target_id: Option<u16>,
    /// Relative to the corpus root when inside it.
    pub target_path: PathBuf,
    pub kind: ViolationKind,
}

impl fmt::Display for LinkViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.origin_path.display(),
            self.link,
            self.target_path.display(),
            self.kind
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    pub pages_scanned: usize,
    pub links_checked: usize,
    pub violations: Vec<LinkViolation>,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Process exit status: 1 when any violation exists.
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() { 0 } else { 1 }
    }
}

// ---------------------------------------------------------------------------
// Link graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct NavEntry {
    kind: NavKind,
    declared: u16,
    resolved: PathBuf,
}

#[derive(Debug, Clone, Default)]
struct PageLinks {
    nav: Vec<NavEntry>,
    /// `(raw href, resolved path)` for every other relative link.
    other: Vec<(String, PathBuf)>,
}

/// Parsed pages keyed by absolute (lexically normalized) path.
#[derive(Debug, Default)]
pub struct LinkGraph {
    root: PathBuf,
    pages: BTreeMap<PathBuf, PageLinks>,
}

impl LinkGraph {
    /// Parse every page under `<root>/numbers` and the root's own `*.md`.
    pub fn load(root: &Path) -> Result<Self> {
        let root = normalize(root);
        let numbers = Corpus::new(&root).numbers_dir();
        if !numbers.is_dir() {
            return Err(NumsheetError::validation(format!(
                "no numbers/ directory under {}",
                root.display()
            )));
        }

        let mut files = Vec::new();
        collect_markdown(&numbers, &mut files)?;
        collect_root_markdown(&root, &mut files)?;

        let mut pages = BTreeMap::new();
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|e| NumsheetError::io(&file, e))?;
            let links = parse_page(&text, &file);
            pages.insert(file, links);
        }
        debug!(pages = pages.len(), "link graph loaded");
        Ok(Self { root, pages })
    }

    /// Page id for a path that sits exactly where page `n` belongs.
    fn id_of(&self, path: &Path) -> Option<u16> {
        let stem = path.file_stem()?.to_str()?;
        if stem.len() != 3 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u16 = stem.parse().ok()?;
        (n <= numsheet_shared::MAX_NUMBER && self.root.join(page_rel_path(n)) == path).then_some(n)
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn exists(&self, path: &Path) -> bool {
        self.pages.contains_key(path) || path.is_file()
    }

    /// Run every check.
    pub fn check(&self) -> LinkReport {
        let mut report = LinkReport {
            pages_scanned: self.pages.len(),
            ..LinkReport::default()
        };

        for (origin, links) in &self.pages {
            let origin_id = self.id_of(origin);
            let violation = |link: &str, target: &Path, target_id, kind| LinkViolation {
                origin_id,
                origin_path: self.relative(origin),
                link: link.to_string(),
                target_id,
                target_path: self.relative(target),
                kind,
            };

            for nav in &links.nav {
                report.links_checked += 1;
                let label = nav.kind.label();

                if !nav.resolved.starts_with(&self.root) || !self.exists(&nav.resolved) {
                    report.violations.push(violation(
                        label,
                        &nav.resolved,
                        Some(nav.declared),
                        ViolationKind::MissingTarget,
                    ));
                    continue;
                }

                let target_id = self.id_of(&nav.resolved);
                let expected = origin_id.and_then(|o| nav.kind.target(o));
                if target_id.is_none() || target_id != expected || target_id != Some(nav.declared) {
                    report.violations.push(violation(
                        label,
                        &nav.resolved,
                        target_id.or(Some(nav.declared)),
                        ViolationKind::WrongTarget,
                    ));
                    continue;
                }

                let reciprocated = self.pages.get(&nav.resolved).is_some_and(|target| {
                    target
                        .nav
                        .iter()
                        .any(|back| back.kind == nav.kind.inverse() && back.resolved == *origin)
                });
                if !reciprocated {
                    report.violations.push(violation(
                        label,
                        &nav.resolved,
                        target_id,
                        ViolationKind::NotReciprocated,
                    ));
                }
            }

            for (_, resolved) in &links.other {
                report.links_checked += 1;
                if !resolved.starts_with(&self.root) || !self.exists(resolved) {
                    report.violations.push(violation(
                        "link",
                        resolved,
                        self.id_of(resolved),
                        ViolationKind::BrokenLink,
                    ));
                }
            }
        }

        report
    }
}

/// Check the corpus at `root`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn check_corpus(root: &Path) -> Result<LinkReport> {
    let report = LinkGraph::load(root)?.check();
    info!(
        pages = report.pages_scanned,
        links = report.links_checked,
        violations = report.violations.len(),
        "link check complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_page(text: &str, path: &Path) -> PageLinks {
    let dir = path.parent().unwrap_or(Path::new(""));
    let mut links = PageLinks::default();

    for line in text.lines() {
        if let Some(caps) = NAV_RE.captures(line) {
            if let (Some(kind), Ok(declared)) = (NavKind::from_label(&caps[1]), caps[2].parse()) {
                links.nav.push(NavEntry {
                    kind,
                    declared,
                    resolved: normalize(&dir.join(strip_suffixes(&caps[3]))),
                });
                continue;
            }
        }

        for caps in LINK_RE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > 0 && line.as_bytes()[whole.start() - 1] == b'\\' {
                continue;
            }
            let raw = &caps[2];
            if is_external(raw) {
                continue;
            }
            let target = strip_suffixes(raw);
            if target.is_empty() || Path::new(target).is_absolute() {
                continue;
            }
            links
                .other
                .push((raw.to_string(), normalize(&dir.join(target))));
        }
    }
    links
}

fn is_external(href: &str) -> bool {
    href.starts_with('#') || SCHEME_RE.is_match(href)
}

/// Drop `#fragment` and `?query`.
fn strip_suffixes(href: &str) -> &str {
    let end = href.find(['#', '?']).unwrap_or(href.len());
    href[..end].trim()
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Markdown files directly under the root, not descending.
fn collect_root_markdown(root: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(root).map_err(|e| NumsheetError::io(root, e))?;
    for entry in entries {
        let path = entry.map_err(|e| NumsheetError::io(root, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            out.push(normalize(&path));
        }
    }
    Ok(())
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| NumsheetError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| NumsheetError::io(dir, e))?.path();
        if path.is_dir() {
            collect_markdown(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            out.push(normalize(&path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{RunContext, SilentProgress, SourcePlan, generate};
    use numsheet_shared::Policy;
    use numsheet_sources::StaticClient;
    use numsheet_storage::Storage;
    use std::time::Duration;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("ns_links_{}", Uuid::now_v7()))
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn pair(root: &Path) {
        write(root, "numbers/0xx/041.md", "# 41\n\n- next: [042](042.md)\n");
        write(root, "numbers/0xx/042.md", "# 42\n\n- previous: [041](041.md)\n");
    }

    #[test]
    fn reciprocal_pair_is_clean() {
        let root = temp_root();
        pair(&root);
        let report = check_corpus(&root).unwrap();
        assert_eq!(report.pages_scanned, 2);
        assert_eq!(report.links_checked, 2);
        assert!(report.is_clean());
        assert_eq!(report.exit_code(), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn removed_page_yields_exactly_one_violation() {
        let root = temp_root();
        pair(&root);
        std::fs::remove_file(root.join("numbers/0xx/042.md")).unwrap();

        let report = check_corpus(&root).unwrap();
        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.origin_id, Some(41));
        assert_eq!(v.target_id, Some(42));
        assert_eq!(v.link, "next");
        assert_eq!(v.kind, ViolationKind::MissingTarget);
        assert_eq!(v.target_path, PathBuf::from("numbers/0xx/042.md"));
        assert_eq!(report.exit_code(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn wrong_and_unreciprocated_links() {
        let root = temp_root();
        write(&root, "numbers/0xx/041.md", "- next: [043](043.md)\n- +10: [051](051.md)\n");
        write(&root, "numbers/0xx/043.md", "# 43\n");
        write(&root, "numbers/0xx/051.md", "# 51\n");

        let report = check_corpus(&root).unwrap();
        let kinds: Vec<(String, ViolationKind)> = report
            .violations
            .iter()
            .map(|v| (v.link.clone(), v.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("next".to_string(), ViolationKind::WrongTarget),
                ("+10".to_string(), ViolationKind::NotReciprocated),
            ]
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn other_links_must_resolve() {
        let root = temp_root();
        write(
            &root,
            "numbers/0xx/007.md",
            "[index](../../index.md) [gone](../../nowhere.md) [web](https://example.org) \
             [anchor](#facts) \\[escaped\\](ignored.md)\n",
        );
        write(&root, "index.md", "# Index\n");

        let report = check_corpus(&root).unwrap();
        assert_eq!(report.links_checked, 2);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ViolationKind::BrokenLink);
        assert_eq!(report.violations[0].target_path, PathBuf::from("nowhere.md"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_numbers_dir_is_an_error() {
        assert!(check_corpus(&temp_root()).is_err());
    }

    #[test]
    fn index_links_to_removed_pages_are_reported() {
        let root = temp_root();
        pair(&root);
        write(&root, "index.md", "| [041](numbers/0xx/041.md) | [042](numbers/0xx/042.md) |\n");
        assert!(check_corpus(&root).unwrap().is_clean());

        std::fs::remove_file(root.join("numbers/0xx/042.md")).unwrap();
        let report = check_corpus(&root).unwrap();
        let from_index: Vec<&LinkViolation> = report
            .violations
            .iter()
            .filter(|v| v.origin_path == Path::new("index.md"))
            .collect();
        assert_eq!(from_index.len(), 1);
        assert_eq!(from_index[0].origin_id, None);
        assert_eq!(from_index[0].target_id, Some(42));
        assert_eq!(from_index[0].kind, ViolationKind::BrokenLink);
        let _ = std::fs::remove_dir_all(&root);
    }

    /// Write the whole 0-999 corpus offline under `<root>/out`.
    async fn generate_offline(root: &Path) -> PathBuf {
        let storage = Storage::open(&root.join("cache.db")).await.unwrap();
        let off = SourcePlan {
            enabled: false,
            policy: Policy::UseCache,
        };
        let ctx = RunContext {
            out_dir: root.join("out"),
            force_offline: true,
            elevate_online: false,
            structured: off,
            prose: off,
            excerpts: None,
            retry_attempts: 0,
            retry_backoff: Duration::ZERO,
        };
        let ids: Vec<u16> = (0..=999).collect();
        generate(&ctx, &ids, &storage, &StaticClient::new(), &SilentProgress)
            .await
            .unwrap();
        ctx.out_dir
    }

    #[tokio::test]
    async fn full_generated_corpus_is_clean() {
        let root = temp_root();
        let out = generate_offline(&root).await;

        let report = check_corpus(&out).unwrap();
        assert_eq!(report.pages_scanned, 1001);
        assert!(report.is_clean(), "{:?}", report.violations.first());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn removing_a_page_from_a_generated_corpus() {
        let root = temp_root();
        let out = generate_offline(&root).await;
        std::fs::remove_file(out.join("numbers/0xx/042.md")).unwrap();

        let report = check_corpus(&out).unwrap();
        let mut found: Vec<(Option<u16>, String, ViolationKind)> = report
            .violations
            .iter()
            .map(|v| (v.origin_id, v.link.clone(), v.kind))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        assert_eq!(
            found,
            vec![
                (None, "link".to_string(), ViolationKind::BrokenLink),
                (Some(32), "+10".to_string(), ViolationKind::MissingTarget),
                (Some(41), "next".to_string(), ViolationKind::MissingTarget),
                (Some(43), "previous".to_string(), ViolationKind::MissingTarget),
                (Some(52), "-10".to_string(), ViolationKind::MissingTarget),
                (Some(142), "-100".to_string(), ViolationKind::MissingTarget),
            ]
        );
        assert!(report.violations.iter().all(|v| v.target_id == Some(42)));
        assert_eq!(report.exit_code(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }
}
