//! Wikitext → plain text.
//!
//! Each pass is a function `&str -> String` applied in sequence. Line
//! breaks survive so that list items remain separate sentence candidates.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Maximum nesting depth of templates we unwrap.
const MAX_TEMPLATE_PASSES: usize = 10;

/// Run the full cleanup pipeline on raw section wikitext.
pub fn to_plain_text(wikitext: &str) -> String {
    let mut result = wikitext.replace("\r\n", "\n");

    result = strip_comments(&result);
    result = strip_refs(&result);
    result = replace_math_templates(&result);
    result = strip_templates(&result);
    result = strip_tables(&result);
    result = unwrap_external_links(&result);
    result = unwrap_internal_links(&result);
    result = strip_emphasis(&result);
    result = strip_line_markers(&result);
    result = strip_leftover_html(&result);
    result = normalize_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1-2: Comments and references
// ---------------------------------------------------------------------------

fn strip_comments(text: &str) -> String {
    static COMMENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

    COMMENT_RE.replace_all(text, " ").to_string()
}

/// Remove `<ref .../>` and `<ref>...</ref>` including their content.
fn strip_refs(text: &str) -> String {
    static SELF_CLOSING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<ref[^>/]*/>").expect("valid regex"));
    static PAIRED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<ref[^>]*>.*?</ref>").expect("valid regex"));

    let text = SELF_CLOSING_RE.replace_all(text, " ");
    PAIRED_RE.replace_all(&text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3-4: Templates
// ---------------------------------------------------------------------------

/// Keep the meaning of a few math templates before the rest are dropped:
/// `{{sup|2}}` → `^2`, `{{sub|n}}` → `_n`, `{{overline|3}}` → `3`, `{{pi}}` → `π`.
fn replace_math_templates(text: &str) -> String {
    static SUP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\{\{\s*sup\s*\|\s*([^{}|]+?)\s*\}\}").expect("valid regex"));
    static SUB_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\{\{\s*sub\s*\|\s*([^{}|]+?)\s*\}\}").expect("valid regex"));
    static OVERLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\{\{\s*overline\s*\|\s*([^{}|]+?)\s*\}\}").expect("valid regex")
    });
    static PI_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\{\{\s*(?:pi|π)\s*\}\}").expect("valid regex"));

    let text = SUP_RE.replace_all(text, "^$1");
    let text = SUB_RE.replace_all(&text, "_$1");
    let text = OVERLINE_RE.replace_all(&text, "$1");
    PI_RE.replace_all(&text, "π").to_string()
}

/// Drop innermost `{{...}}` repeatedly until nothing changes.
fn strip_templates(text: &str) -> String {
    static TEMPLATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid regex"));

    let mut current = text.to_string();
    for _ in 0..MAX_TEMPLATE_PASSES {
        let next = TEMPLATE_RE.replace_all(&current, " ").to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Wiki tables (`{| ... |}`) carry no quotable prose.
fn strip_tables(text: &str) -> String {
    static TABLE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)\{\|.*?\|\}").expect("valid regex"));

    TABLE_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5-6: Links
// ---------------------------------------------------------------------------

/// `[https://x label]` → `label`; bare `[https://x]` is dropped.
fn unwrap_external_links(text: &str) -> String {
    static LABELLED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[(?:https?:)?//\S+\s+([^\]]+)\]").expect("valid regex"));
    static BARE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[(?:https?:)?//\S+\]").expect("valid regex"));

    let text = LABELLED_RE.replace_all(text, "$1");
    BARE_RE.replace_all(&text, " ").to_string()
}

/// `[[A|B]]` → `B`, `[[A]]` → `A`; file and category links are dropped.
fn unwrap_internal_links(text: &str) -> String {
    static MEDIA_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\[\[(?:file|image|category):[^\]]*\]\]").expect("valid regex")
    });
    static PIPED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)\|([^\]]+)\]\]").expect("valid regex"));
    static PLAIN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("valid regex"));

    let text = MEDIA_RE.replace_all(text, " ");
    let text = PIPED_RE.replace_all(&text, "$2");
    PLAIN_RE.replace_all(&text, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 7-8: Inline and line markup
// ---------------------------------------------------------------------------

fn strip_emphasis(text: &str) -> String {
    text.replace("'''''", "").replace("'''", "").replace("''", "")
}

/// Heading `==` runs and list markers (`*`, `#`, `;`, `:`) at line edges.
fn strip_line_markers(text: &str) -> String {
    static HEADING_OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^=+[ \t]*").expect("valid regex"));
    static HEADING_CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)[ \t]*=+[ \t]*$").expect("valid regex"));
    static LIST_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[\*#;:]+[ \t]*").expect("valid regex"));

    let text = HEADING_OPEN_RE.replace_all(text, "");
    let text = HEADING_CLOSE_RE.replace_all(&text, "");
    LIST_RE.replace_all(&text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 9: Leftover HTML
// ---------------------------------------------------------------------------

/// Reduce any remaining tags to their text and decode entities.
fn strip_leftover_html(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }

    let fragment = Html::parse_fragment(text);
    fragment.root_element().text().collect()
}

// ---------------------------------------------------------------------------
// Pass 10: Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces, trim each line, and drop empty lines.
fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_and_emphasis_are_unwrapped() {
        let wt = "'''42''' is a [[pronic number|pronic]] and an [[abundant number]]. See [https://oeis.org/A002378 OEIS].";
        assert_eq!(
            to_plain_text(wt),
            "42 is a pronic and an abundant number. See OEIS."
        );
    }

    #[test]
    fn refs_comments_and_templates_are_removed() {
        let wt = "42 is even.<ref name=\"a\">Some book</ref><!-- hidden --> It is {{citation needed|date=2020}}composite.<ref name=\"b\"/>";
        assert_eq!(to_plain_text(wt), "42 is even. It is composite.");
    }

    #[test]
    fn nested_templates_are_stripped() {
        let wt = "Text {{outer|{{inner|{{deep}}}}}} end";
        assert_eq!(to_plain_text(wt), "Text end");
    }

    #[test]
    fn math_templates_keep_meaning() {
        let wt = "42 = 2 × 3 × 7 and 6{{sup|2}} = 36; {{pi}} is not 3.";
        assert_eq!(to_plain_text(wt), "42 = 2 × 3 × 7 and 6^2 = 36; π is not 3.");
    }

    #[test]
    fn headings_and_lists_keep_line_structure() {
        let wt = "== Mathematics ==\n* 42 is the sum of the first six even numbers.\n* 42 is a Catalan number.";
        assert_eq!(
            to_plain_text(wt),
            "Mathematics\n42 is the sum of the first six even numbers.\n42 is a Catalan number."
        );
    }

    #[test]
    fn leftover_html_and_entities() {
        let wt = "42&nbsp;is <span class=\"x\">the <b>answer</b></span>.";
        assert_eq!(to_plain_text(wt), "42 is the answer.");
    }

    #[test]
    fn files_and_tables_are_dropped() {
        let wt = "[[File:42.svg|thumb|A figure]]\n{| class=\"wikitable\"\n| 1 || 2\n|}\nProse remains.";
        assert_eq!(to_plain_text(wt), "Prose remains.");
    }
}
