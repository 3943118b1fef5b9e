//! Corpus generation: per hundred-range, decide online or offline, resolve
//! data through the cache store, and write one page per id.
//!
//! Each range walks `ProbeNetwork → {OnlineRun, OfflineRun} → RangeComplete`
//! before the next range probes again, so a network that drops mid-run
//! only degrades the ranges that follow.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use numsheet_excerpt::{ExcerptSelector, RuleBook, SectionExcerpts, TermFrequency};
use numsheet_shared::{
    AppConfig, CacheEntry, NumsheetError, Payload, Policy, ResourceId, Result, RunMode, Source,
    expand_home,
};
use numsheet_sources::{
    CALLING_CODES, CacheSettings, CacheStats, CacheStore, ISO3166_NUMERIC, Resolved, SourceClient,
};
use numsheet_storage::Storage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::corpus::{Corpus, WriteOutcome};
use crate::facts;
use crate::page::{self, CacheView};
use crate::render::{render_index, render_page};

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Whether a source takes part in a run, and under which policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePlan {
    pub enabled: bool,
    pub policy: Policy,
}

/// Immutable configuration for one generate or refresh invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub out_dir: PathBuf,
    /// Skip probing and never touch the network.
    pub force_offline: bool,
    /// Elevate `UseCache` sources to a refresh when a range runs online.
    pub elevate_online: bool,
    pub structured: SourcePlan,
    pub prose: SourcePlan,
    /// `None` when excerpts are disabled.
    pub excerpts: Option<ExcerptSelector>,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl RunContext {
    /// Build a context from config, loading the pin and threshold tables
    /// when excerpts are enabled.
    pub fn from_config(config: &AppConfig, out_dir: PathBuf) -> Result<Self> {
        let excerpts = if config.excerpt.enabled {
            let rules = RuleBook::load(
                &expand_home(&config.excerpt.pins_path),
                &expand_home(&config.excerpt.thresholds_path),
            )?;
            Some(ExcerptSelector::new(config.excerpt.clone(), rules))
        } else {
            None
        };

        let plan = |source| SourcePlan {
            enabled: config.sources.is_enabled(source),
            policy: config.sources.policy(source),
        };

        Ok(Self {
            out_dir,
            force_offline: false,
            elevate_online: false,
            structured: plan(Source::StructuredData),
            prose: plan(Source::ProseArticle),
            excerpts,
            retry_attempts: config.network.retry_attempts,
            retry_backoff: config.network.retry_backoff(),
        })
    }

    pub fn plan(&self, source: Source) -> SourcePlan {
        match source {
            Source::StructuredData => self.structured,
            Source::ProseArticle => self.prose,
        }
    }

    fn enabled_sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|&s| self.plan(s).enabled)
            .collect()
    }

    /// The policy a source runs under in `mode`.
    fn effective_policy(&self, source: Source, mode: RunMode) -> Policy {
        let policy = self.plan(source).policy;
        if mode == RunMode::Online && self.elevate_online {
            policy.elevated()
        } else {
            policy
        }
    }

    fn cache_settings(&self, mode: RunMode) -> CacheSettings {
        CacheSettings {
            mode,
            retry_attempts: self.retry_attempts,
            retry_backoff: self.retry_backoff,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports and progress
// ---------------------------------------------------------------------------

/// Outcome of one hundred-range.
#[derive(Debug, Clone, Serialize)]
pub struct RangeReport {
    pub label: String,
    pub mode: RunMode,
    pub ids: Vec<u16>,
    pub written: u32,
    pub unchanged: u32,
    /// Ids rendered with placeholders because a payload was unusable.
    pub failures: Vec<u16>,
    pub cache: CacheStats,
    pub duration_ms: u64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub ranges: Vec<RangeReport>,
    pub index_written: bool,
}

impl GenerateReport {
    pub fn written(&self) -> u32 {
        self.ranges.iter().map(|r| r.written).sum()
    }

    pub fn unchanged(&self) -> u32 {
        self.ranges.iter().map(|r| r.unchanged).sum()
    }

    pub fn failures(&self) -> usize {
        self.ranges.iter().map(|r| r.failures.len()).sum()
    }
}

/// Progress callback for the generator.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase (a range, the index).
    fn phase(&self, name: &str);
    /// Called after each page is written or found unchanged.
    fn page_done(&self, id: u16, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &GenerateReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_done(&self, _id: u16, _current: usize, _total: usize) {}
    fn done(&self, _report: &GenerateReport) {}
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

enum RangeState {
    ProbeNetwork,
    Run(RunMode),
    Complete(RangeReport),
}

/// Group ids by hundred, keeping increasing order.
pub fn group_by_hundred(ids: &[u16]) -> Vec<(u16, Vec<u16>)> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut groups: Vec<(u16, Vec<u16>)> = Vec::new();
    for id in sorted {
        match groups.last_mut() {
            Some((h, members)) if *h == id / 100 => members.push(id),
            _ => groups.push((id / 100, vec![id])),
        }
    }
    groups
}

fn range_label(hundred: u16) -> String {
    let start = hundred * 100;
    format!("{start}-{}", start + 99)
}

/// Generate pages for `ids`, then rewrite the index.
#[instrument(skip_all, fields(out = %ctx.out_dir.display(), ids = ids.len()))]
pub async fn generate<C: SourceClient>(
    ctx: &RunContext,
    ids: &[u16],
    storage: &Storage,
    client: &C,
    progress: &dyn ProgressReporter,
) -> Result<GenerateReport> {
    let corpus = Corpus::new(&ctx.out_dir);
    let total = ids.len();
    let mut done = 0;
    let mut ranges = Vec::new();

    info!(ids = total, offline = ctx.force_offline, "starting generation");

    let selector = match &ctx.excerpts {
        Some(selector) => Some(selector.clone().with_term_frequency(load_term_frequency(storage).await?)),
        None => None,
    };

    for (hundred, members) in group_by_hundred(ids) {
        let label = range_label(hundred);
        let mut state = RangeState::ProbeNetwork;

        let report = loop {
            state = match state {
                RangeState::ProbeNetwork => RangeState::Run(probe(ctx, client).await),
                RangeState::Run(mode) => {
                    progress.phase(&format!("Range {label} ({mode})"));
                    let report = run_range(
                        ctx,
                        selector.as_ref(),
                        &corpus,
                        &label,
                        mode,
                        &members,
                        storage,
                        client,
                        progress,
                        &mut done,
                        total,
                    )
                    .await?;
                    RangeState::Complete(report)
                }
                RangeState::Complete(report) => break report,
            };
        };

        info!(
            range = %report.label,
            mode = %report.mode,
            written = report.written,
            unchanged = report.unchanged,
            failures = report.failures.len(),
            "range complete"
        );
        ranges.push(report);
    }

    progress.phase("Writing index");
    let index = render_index(&corpus.existing_pages());
    let index_written = corpus.write_if_changed(&corpus.index_path(), &index)? == WriteOutcome::Written;

    let report = GenerateReport {
        ranges,
        index_written,
    };
    info!(
        written = report.written(),
        unchanged = report.unchanged(),
        failures = report.failures(),
        "generation complete"
    );
    progress.done(&report);
    Ok(report)
}

/// Decide the mode for the next range.
async fn probe<C: SourceClient>(ctx: &RunContext, client: &C) -> RunMode {
    if ctx.force_offline {
        debug!("offline forced, skipping probe");
        return RunMode::Offline;
    }
    let sources = ctx.enabled_sources();
    if sources.is_empty() {
        debug!("no enabled source, skipping probe");
        return RunMode::Offline;
    }

    for source in sources {
        if !client.probe(source).await {
            warn!(%source, "source unreachable, running range offline");
            return RunMode::Offline;
        }
    }
    RunMode::Online
}

#[allow(clippy::too_many_arguments)]
async fn run_range<C: SourceClient>(
    ctx: &RunContext,
    selector: Option<&ExcerptSelector>,
    corpus: &Corpus,
    label: &str,
    mode: RunMode,
    ids: &[u16],
    storage: &Storage,
    client: &C,
    progress: &dyn ProgressReporter,
    done: &mut usize,
    total: usize,
) -> Result<RangeReport> {
    let start = Instant::now();
    let run_id = storage.insert_generation_run(label, &mode.to_string()).await?;
    let mut store = CacheStore::new(storage, client, ctx.cache_settings(mode));

    let mut report = RangeReport {
        label: label.to_string(),
        mode,
        ids: ids.to_vec(),
        written: 0,
        unchanged: 0,
        failures: Vec::new(),
        cache: CacheStats::default(),
        duration_ms: 0,
    };

    for &id in ids {
        let view = resolve_view(ctx, &mut store, mode, id).await?;
        let excerpts = select_excerpts(selector, id, &view);
        let page = page::build(id, facts::compute(id), &view, excerpts);

        if !page.issues.is_empty() {
            for issue in &page.issues {
                warn!(id, %issue, "rendering with placeholders");
            }
            report.failures.push(id);
        }

        match corpus.write_if_changed(&corpus.page_path(id), &render_page(&page))? {
            WriteOutcome::Written => report.written += 1,
            WriteOutcome::Unchanged => report.unchanged += 1,
        }

        *done += 1;
        progress.page_done(id, *done, total);
    }

    report.cache = store.stats();
    report.duration_ms = start.elapsed().as_millis() as u64;

    let stats_json = serde_json::to_string(&report)
        .map_err(|e| NumsheetError::parse(format!("range report serialization failed: {e}")))?;
    storage.finish_generation_run(&run_id, &stats_json).await?;

    Ok(report)
}

async fn resolve_view<C: SourceClient>(
    ctx: &RunContext,
    store: &mut CacheStore<'_, C>,
    mode: RunMode,
    id: u16,
) -> Result<CacheView> {
    let mut view = CacheView::default();

    if ctx.structured.enabled {
        let policy = ctx.effective_policy(Source::StructuredData, mode);
        view.structured = available(
            store
                .resolve(&ResourceId::number(Source::StructuredData, id), policy)
                .await?,
        );
        view.iso3166 = available(
            store
                .resolve(&ResourceId::external(Source::StructuredData, ISO3166_NUMERIC), policy)
                .await?,
        );
        view.calling_codes = available(
            store
                .resolve(&ResourceId::external(Source::StructuredData, CALLING_CODES), policy)
                .await?,
        );
    }

    if ctx.prose.enabled {
        let policy = ctx.effective_policy(Source::ProseArticle, mode);
        view.prose = available(
            store
                .resolve(&ResourceId::number(Source::ProseArticle, id), policy)
                .await?,
        );
    }

    Ok(view)
}

fn available(resolved: Resolved) -> Option<CacheEntry> {
    match resolved {
        Resolved::Available(entry) => Some(entry),
        Resolved::Unavailable => None,
    }
}

/// Term counts over every cached number article, taken once at run start.
async fn load_term_frequency(storage: &Storage) -> Result<TermFrequency> {
    let mut terms = TermFrequency::default();
    for summary in storage.list_entries(Some(Source::ProseArticle)).await? {
        if let Some(entry) = storage.get_entry(&summary.resource).await? {
            match entry.payload {
                Payload::Article(article) if page::is_number_article(&article) => {
                    ExcerptSelector::count_article_terms(&mut terms, &article);
                }
                _ => {}
            }
        }
    }
    debug!(terms = terms.len(), "term frequency loaded");
    Ok(terms)
}

fn select_excerpts(selector: Option<&ExcerptSelector>, id: u16, view: &CacheView) -> SectionExcerpts {
    let Some(selector) = selector else {
        return SectionExcerpts::new();
    };
    match view.prose.as_ref().map(|e| &e.payload) {
        Some(Payload::Article(article)) if page::is_number_article(article) => {
            selector.select_article(id, article)
        }
        _ => SectionExcerpts::new(),
    }
}
