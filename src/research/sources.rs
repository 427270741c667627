//! URL and citation extraction.
//!
//! Pure pattern-matching helpers used by the synthesis engine to collect and
//! count citations from thread findings and the final answer. Handles
//! markdown links, bare `http(s)://` and `www.` tokens, numbered reference
//! lines, parenthetical citations, and bare DOIs (normalized to
//! `https://doi.org/<doi>`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ceiling on input length, in characters, to bound matching cost.
const MAX_EXTRACT_CHARS: usize = 100_000;

static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]\(\s*([^)\s]+)\s*\)").expect("markdown link regex"));

static NUMBERED_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\[\d+\][:.]?\s+(https?://\S+|www\.\S+)").expect("numbered ref regex")
});

static BARE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+|\bwww\.[^\s<>"']+"#).expect("bare url regex"));

static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b10\.\d{1,9}/[^\s"'<>\]),]+"#).expect("doi regex"));

static REFERENCES_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:#+\s*)?(?:references|citations|sources)\s*:?\s*$")
        .expect("references heading regex")
});

static REFERENCE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\[\d+\]|\d{1,3}[.)])\s+\S").expect("reference line regex"));

/// Where an extracted citation came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOrigin {
    /// Extracted from one thread's findings.
    Thread {
        /// 0-based thread index.
        index: usize,
    },
    /// Extracted from the synthesized final answer.
    FinalAnswer,
}

/// A citation extracted from text during one synthesis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLink {
    /// The extracted (or DOI-normalized) URL.
    pub url: String,
    /// Originating thread or final answer.
    pub origin: SourceOrigin,
    /// The sub-query the source was found under, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_query: Option<String>,
}

/// Extract a deduplicated, first-occurrence-ordered list of URLs from text.
///
/// Input longer than the length ceiling is truncated (on a char boundary)
/// before matching. Running extraction on its own output yields the same
/// set: trailing punctuation is stripped, but a trailing `)` survives when
/// the URL's parentheses are balanced.
pub fn extract_urls(text: &str) -> Vec<String> {
    let text = truncate_chars(text, MAX_EXTRACT_CHARS);

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && seen.insert(candidate.clone()) {
            urls.push(candidate);
        }
    };

    for caps in MARKDOWN_LINK_RE.captures_iter(text) {
        push(trim_url(&caps[1]).to_string());
    }
    for caps in NUMBERED_REF_RE.captures_iter(text) {
        push(trim_url(&caps[1]).to_string());
    }
    for m in BARE_URL_RE.find_iter(text) {
        push(trim_url(m.as_str()).to_string());
    }
    for m in DOI_RE.find_iter(text) {
        let doi = trim_url(m.as_str());
        push(format!("https://doi.org/{}", doi));
    }

    urls
}

/// Wrap extracted URLs into [`SourceLink`]s tagged with their origin.
pub fn extract_source_links(
    text: &str,
    origin: SourceOrigin,
    sub_query: Option<&str>,
) -> Vec<SourceLink> {
    extract_urls(text)
        .into_iter()
        .map(|url| SourceLink {
            url,
            origin: origin.clone(),
            sub_query: sub_query.map(|s| s.to_string()),
        })
        .collect()
}

/// Conservative source count for a body of findings.
///
/// Prefers counting numbered reference lines inside a detected
/// references/citations section when one exists, otherwise counts extracted
/// URLs, returning the larger of the two.
pub fn count_sources(text: &str) -> usize {
    let text = truncate_chars(text, MAX_EXTRACT_CHARS);
    let url_count = extract_urls(text).len();

    let reference_count = REFERENCES_HEADING_RE
        .find(text)
        .map(|heading| {
            let section = &text[heading.end()..];
            REFERENCE_LINE_RE.find_iter(section).count()
        })
        .unwrap_or(0);

    url_count.max(reference_count)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Strip trailing punctuation from a URL candidate. A trailing `)` or `]`
/// is only stripped while the URL holds more closers than openers, so URLs
/// with balanced parentheses survive intact.
fn trim_url(url: &str) -> &str {
    let mut current = url;
    loop {
        let Some(last) = current.chars().last() else {
            return current;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' => true,
            ')' => current.matches(')').count() > current.matches('(').count(),
            ']' => current.matches(']').count() > current.matches('[').count(),
            _ => false,
        };
        if !strip {
            return current;
        }
        current = &current[..current.len() - last.len_utf8()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_links() {
        let urls = extract_urls("See [the docs](https://docs.rs/tokio) for details.");
        assert_eq!(urls, vec!["https://docs.rs/tokio"]);
    }

    #[test]
    fn test_bare_urls_with_trailing_punctuation() {
        let urls = extract_urls("Start at https://example.com/a. Then www.example.org/b, done.");
        assert_eq!(urls, vec!["https://example.com/a", "www.example.org/b"]);
    }

    #[test]
    fn test_parenthetical_citation() {
        let urls = extract_urls("A result (see https://example.com/paper) was found.");
        assert_eq!(urls, vec!["https://example.com/paper"]);
    }

    #[test]
    fn test_balanced_parens_survive() {
        let urls = extract_urls("See https://en.wikipedia.org/wiki/Rust_(language) today.");
        assert_eq!(urls, vec!["https://en.wikipedia.org/wiki/Rust_(language)"]);
    }

    #[test]
    fn test_numbered_reference_lines() {
        let text = "Findings.\n[1]: https://example.com/one\n[2]: https://example.com/two";
        let urls = extract_urls(text);
        assert!(urls.contains(&"https://example.com/one".to_string()));
        assert!(urls.contains(&"https://example.com/two".to_string()));
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_doi_normalization() {
        let urls = extract_urls("See [Paper](https://doi.org/10.1/x) and DOI: 10.2/y");
        assert_eq!(
            urls,
            vec!["https://doi.org/10.1/x", "https://doi.org/10.2/y"]
        );
    }

    #[test]
    fn test_dedup_preserves_first_occurrence() {
        let text = "https://a.example https://b.example and again https://a.example";
        assert_eq!(extract_urls(text), vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let text = "Links: [x](https://x.example/p_(q)) www.y.example/z. DOI: 10.5/abc; done \
                    (https://w.example).";
        let first = extract_urls(text);
        let rejoined = first.join("\n");
        let second = extract_urls(&rejoined);
        assert_eq!(first, second);
    }

    #[test]
    fn test_input_truncated_before_matching() {
        let mut text = "x".repeat(MAX_EXTRACT_CHARS + 10);
        text.push_str(" https://late.example/url");
        assert!(extract_urls(&text).is_empty());
    }

    #[test]
    fn test_truncation_is_char_boundary_safe() {
        let text = "é".repeat(MAX_EXTRACT_CHARS + 5);
        // Must not panic on a multi-byte boundary.
        assert!(extract_urls(&text).is_empty());
    }

    #[test]
    fn test_count_sources_prefers_reference_section() {
        let text = "Body with https://one.example\n\nReferences:\n[1] Alpha, 2021\n[2] Beta, 2022\n[3] Gamma, 2023";
        assert_eq!(count_sources(text), 3);
    }

    #[test]
    fn test_count_sources_falls_back_to_urls() {
        let text = "https://one.example and https://two.example";
        assert_eq!(count_sources(text), 2);
    }

    #[test]
    fn test_count_sources_takes_larger_of_the_two() {
        let text = "https://a.example https://b.example https://c.example\n\nSources:\n[1] only one";
        assert_eq!(count_sources(text), 3);
    }

    #[test]
    fn test_extract_source_links_tags_origin() {
        let links = extract_source_links(
            "see https://example.com/x",
            SourceOrigin::Thread { index: 2 },
            Some("sub query"),
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].origin, SourceOrigin::Thread { index: 2 });
        assert_eq!(links[0].sub_query.as_deref(), Some("sub query"));
    }

    #[test]
    fn test_no_urls_in_plain_text() {
        assert!(extract_urls("no links here at all").is_empty());
        assert_eq!(count_sources("no links here at all"), 0);
    }
}
