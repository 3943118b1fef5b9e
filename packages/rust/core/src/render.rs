//! Markdown rendering for number pages and the corpus index.
//!
//! Output is a pure function of the page, so identical inputs give
//! byte-identical files.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use numsheet_excerpt::{ELLIPSIS, Quote, shorten, split_sentences};
use numsheet_shared::{EntityRef, MAX_NUMBER, SectionKind};

use crate::page::{ArticleRef, Field, NumberPage};

/// Placeholder for data that could not be obtained.
pub const UNAVAILABLE: &str = "_unavailable_";
/// Placeholder for a source that has nothing for this number.
pub const NONE: &str = "_none_";
/// Placeholder for a section without selected quotes.
pub const NO_EXCERPT: &str = "_no excerpt available_";

/// Entity references listed per code table before summarising the rest.
const REF_LIMIT: usize = 10;
/// Longest intro sentence shown.
const INTRO_MAX_CHARS: usize = 140;

/// Path of page `n` relative to the corpus root.
pub fn page_rel_path(n: u16) -> String {
    format!("numbers/{}xx/{n:03}.md", n / 100)
}

/// Link from page `from` to page `to`, relative to `from`'s directory.
pub fn page_href(from: u16, to: u16) -> String {
    if from / 100 == to / 100 {
        format!("{to:03}.md")
    } else {
        format!("../{}xx/{to:03}.md", to / 100)
    }
}

/// Render a full page.
pub fn render_page(page: &NumberPage) -> String {
    let mut out = String::new();
    let n = page.id;

    // Title
    let _ = writeln!(out, "# {n}");
    out.push('\n');

    // Navigation
    for link in &page.navigation {
        let _ = writeln!(
            out,
            "- {}: [{:03}]({})",
            link.kind.label(),
            link.target,
            page_href(n, link.target)
        );
    }
    out.push_str("- index: [index](../../index.md)\n\n");

    render_facts(&mut out, page);
    render_structured(&mut out, page);
    render_codes(&mut out, page);
    render_article(&mut out, page);
    render_references(&mut out, page);
    render_attribution(&mut out, page);

    out
}

fn render_facts(out: &mut String, page: &NumberPage) {
    let f = &page.facts;
    let undefined = || "_undefined_".to_string();
    let flags = f.flags();

    let rows = [
        ("Class", f.class().to_string()),
        ("Factorization", f.factorization()),
        ("Divisor count", f.divisor_count.map_or_else(undefined, |v| v.to_string())),
        ("Divisor sum", f.divisor_sum.map_or_else(undefined, |v| v.to_string())),
        (
            "Proper divisor sum",
            f.proper_divisor_sum.map_or_else(undefined, |v| v.to_string()),
        ),
        (
            "Abundance",
            f.abundance.map_or_else(undefined, |a| a.label().to_string()),
        ),
        ("Euler's totient", f.totient.map_or_else(undefined, |v| v.to_string())),
        ("Digit sum", f.digit_sum.to_string()),
        ("Parity", if f.is_even { "even" } else { "odd" }.to_string()),
        (
            "Special forms",
            if flags.is_empty() {
                NONE.to_string()
            } else {
                flags.join(", ")
            },
        ),
        ("Binary", format!("`{}`", f.binary)),
        ("Octal", format!("`{}`", f.octal)),
        ("Hexadecimal", format!("`{}`", f.hexadecimal)),
        ("Roman numeral", f.roman.clone().unwrap_or_else(undefined)),
        ("In words", f.english.clone()),
    ];

    out.push_str("## Facts\n\n| Property | Value |\n| --- | --- |\n");
    for (name, value) in rows {
        let _ = writeln!(out, "| {name} | {value} |");
    }
    out.push('\n');
}

fn render_structured(out: &mut String, page: &NumberPage) {
    out.push_str("## Wikidata\n\n");
    match &page.structured {
        Field::Value(item) => {
            let _ = write!(out, "- Item: [{}]({})", item.qid, item.url());
            if let Some(desc) = &item.description {
                let _ = write!(out, ": {}", escape(desc));
            }
            out.push('\n');
        }
        Field::Absent => {
            let _ = writeln!(out, "- Item: {NONE}");
        }
        Field::Unavailable => {
            let _ = writeln!(out, "- Item: {UNAVAILABLE}");
        }
    }
    out.push('\n');
}

fn render_codes(out: &mut String, page: &NumberPage) {
    out.push_str("## Codes\n\n");
    for (title, field) in [
        ("ISO 3166-1 numeric", &page.iso3166),
        ("International calling code", &page.calling_codes),
    ] {
        let _ = writeln!(out, "### {title}\n");
        match field {
            Field::Value(refs) => render_refs(out, refs),
            Field::Absent => {
                let _ = writeln!(out, "{NONE}");
            }
            Field::Unavailable => {
                let _ = writeln!(out, "{UNAVAILABLE}");
            }
        }
        out.push('\n');
    }
}

fn render_refs(out: &mut String, refs: &[EntityRef]) {
    for r in refs.iter().take(REF_LIMIT) {
        let _ = writeln!(out, "- [{}]({})", escape(&r.label), r.url());
    }
    if refs.len() > REF_LIMIT {
        let _ = writeln!(out, "- and {} more", refs.len() - REF_LIMIT);
    }
}

fn render_article(out: &mut String, page: &NumberPage) {
    out.push_str("## Wikipedia\n\n");
    match &page.article {
        Field::Value(article) => {
            let _ = writeln!(out, "{}\n", intro_line(article));
        }
        Field::Absent => {
            let _ = writeln!(out, "{NONE}\n");
        }
        Field::Unavailable => {
            let _ = writeln!(out, "{UNAVAILABLE}\n");
        }
    }

    for kind in SectionKind::ALL {
        let _ = writeln!(out, "### {}\n", kind.title());
        match page.excerpts.get(&kind).map(Vec::as_slice) {
            Some(quotes) if !quotes.is_empty() => {
                for q in quotes {
                    let _ = writeln!(out, "> {}\n", escape(&q.text));
                }
            }
            _ => {
                let _ = writeln!(out, "{NO_EXCERPT}\n");
            }
        }
    }
}

/// First sentence of the intro, shortened when long.
fn intro_line(article: &ArticleRef) -> String {
    match split_sentences(&article.intro).into_iter().next() {
        Some(first) => format!("> {}", escape(&shorten(&first, INTRO_MAX_CHARS).0)),
        None => UNAVAILABLE.to_string(),
    }
}

fn render_references(out: &mut String, page: &NumberPage) {
    let n = page.id;
    out.push_str("## References\n\n");
    match &page.article {
        Field::Value(article) => {
            let _ = writeln!(out, "- Wikipedia: [{}]({})", escape(&article.title), article.url);
        }
        _ => {
            let _ = writeln!(out, "- Wikipedia: {UNAVAILABLE}");
        }
    }
    match &page.structured {
        Field::Value(item) => {
            let _ = writeln!(out, "- Wikidata: [{}]({})", item.qid, item.url());
        }
        _ => {
            let _ = writeln!(out, "- Wikidata: {UNAVAILABLE}");
        }
    }
    let _ = writeln!(
        out,
        "- OEIS: [search for {n}](https://oeis.org/search?q={n}&language=english)\n"
    );
}

fn render_attribution(out: &mut String, page: &NumberPage) {
    let shortened = page.excerpts.values().flatten().any(|q: &Quote| q.shortened);

    out.push_str("## Sources and licensing\n\n");
    out.push_str(
        "- Wikipedia text is available under CC BY-SA 4.0. Quotes are short and link back to the article.\n",
    );
    if shortened {
        let _ = writeln!(out, "- Quotes ending in {ELLIPSIS} were shortened.");
    }
    out.push_str("- Wikidata structured data is available under CC0.\n");
    match page.generated_at {
        Some(at) => {
            let _ = writeln!(out, "- Data fetched: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => {
            let _ = writeln!(out, "- Data fetched: {UNAVAILABLE}");
        }
    }
}

/// Keep external text from forming Markdown links.
fn escape(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Render `index.md`: one 10×10 grid per hundred. Numbers without a page
/// are shown as plain text.
pub fn render_index(existing: &BTreeSet<u16>) -> String {
    let mut out = String::new();
    out.push_str("# Numbers 0-999\n\n");
    out.push_str(
        "One page per number with arithmetic facts, Wikidata references, and short Wikipedia excerpts.\n\n",
    );

    for h in 0..=MAX_NUMBER / 100 {
        let start = h * 100;
        let _ = writeln!(out, "## {h}xx ({start:03}-{:03})\n", start + 99);
        out.push_str("| 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 |\n");
        out.push_str("| --- | --- | --- | --- | --- | --- | --- | --- | --- | --- |\n");
        for row in 0..10 {
            let cells: Vec<String> = (0..10)
                .map(|col| {
                    let n = start + row * 10 + col;
                    if existing.contains(&n) {
                        format!("[{n:03}]({})", page_rel_path(n))
                    } else {
                        format!("{n:03}")
                    }
                })
                .collect();
            let _ = writeln!(out, "| {} |", cells.join(" | "));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use numsheet_shared::NumberItem;

    use super::*;
    use crate::facts;
    use crate::page::{CacheView, build};

    fn bare_page(n: u16) -> NumberPage {
        build(n, facts::compute(n), &CacheView::default(), BTreeMap::new())
    }

    #[test]
    fn hrefs_cross_hundreds() {
        assert_eq!(page_rel_path(7), "numbers/0xx/007.md");
        assert_eq!(page_href(42, 43), "043.md");
        assert_eq!(page_href(42, 142), "../1xx/142.md");
        assert_eq!(page_href(100, 99), "../0xx/099.md");
    }

    #[test]
    fn layout_order_is_fixed() {
        let md = render_page(&bare_page(42));
        let order = [
            "# 42",
            "- previous: [041](041.md)",
            "- +100: [142](../1xx/142.md)",
            "## Facts",
            "## Wikidata",
            "## Codes",
            "## Wikipedia",
            "### Properties",
            "### Miscellany",
            "## References",
            "## Sources and licensing",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|s| md.find(s).unwrap_or_else(|| panic!("missing {s}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn missing_data_renders_placeholders() {
        let md = render_page(&bare_page(0));
        assert!(md.contains("- Item: _unavailable_"));
        assert!(md.contains(NO_EXCERPT));
        assert!(md.contains("| Divisor count | _undefined_ |"));
        assert!(md.contains("- Data fetched: _unavailable_"));
        assert!(!md.contains("- previous:"));
        assert!(!md.contains("- -100:"));
    }

    #[test]
    fn values_and_quotes_render() {
        let mut page = bare_page(42);
        page.structured = Field::Value(NumberItem {
            qid: "Q713".into(),
            label: None,
            description: Some("natural number".into()),
        });
        page.excerpts.insert(
            SectionKind::Miscellany,
            vec![Quote {
                text: "42 is the [answer]…".into(),
                score: 50.0,
                pinned: true,
                shortened: true,
            }],
        );
        let md = render_page(&page);
        assert!(md.contains("- Item: [Q713](https://www.wikidata.org/wiki/Q713): natural number"));
        assert!(md.contains("> 42 is the \\[answer\\]…"));
        assert!(md.contains("were shortened"));
    }

    #[test]
    fn long_ref_lists_are_summarised() {
        let mut page = bare_page(1);
        let refs = (0..13)
            .map(|i| EntityRef {
                label: format!("Place {i:02}"),
                qid: format!("Q{i}"),
            })
            .collect();
        page.calling_codes = Field::Value(refs);
        let md = render_page(&page);
        assert!(md.contains("- [Place 09](https://www.wikidata.org/wiki/Q9)"));
        assert!(!md.contains("Place 10"));
        assert!(md.contains("- and 3 more"));
    }

    #[test]
    fn index_links_existing_pages_only() {
        let existing = BTreeSet::from([0, 42, 999]);
        let md = render_index(&existing);
        assert!(md.contains("[042](numbers/0xx/042.md)"));
        assert!(md.contains("[999](numbers/9xx/999.md)"));
        assert!(md.contains("| 040 | 041 | [042](numbers/0xx/042.md) |"));
        assert!(md.contains("## 9xx (900-999)"));
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(render_page(&bare_page(500)), render_page(&bare_page(500)));
    }
}
