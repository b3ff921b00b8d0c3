use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Evaluated in order; on equal start positions the earlier entry wins.
/// A pattern may mark the phrase itself with an `offer` group when it has to
/// consume a leading character first.
static OFFER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let table: &[&str] = &[
        // multi-buy: the count must not be the tail of an amount ("$5.49 / $3.99")
        r"(?i)(?:^|[^\w.,$€£])(?P<offer>\d+\s*(?:for|/)\s*(?:[$€£]\s*\d+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?\s*[€£]))",
        r"(?i)\bbuy\s+\d+\s*,?\s*get\s+\d+\s+free\b",
        r"(?i)(?:\b1/2|\bhalf)\s+price\b",
        r"(?i)\bsave\s+(?:up\s+to\s+)?(?:[$€£]\s*\d+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?\s*(?:%|[€£]))",
        r"(?i)\b\d{1,2}\s*%\s*off\b",
        r"(?i)\b(?:super\s+saver|special\s+buy|special\s+offer|limited\s+time(?:\s+only)?|while\s+stocks\s+last)\b",
    ];
    table.iter().map(|pattern| Regex::new(pattern).unwrap()).collect()
});

#[derive(Debug, Clone, PartialEq)]
pub struct OfferMatch {
    pub span: Range<usize>,
}

impl OfferMatch {
    /// Offer wording as printed, whitespace collapsed.
    pub fn text(&self, haystack: &str) -> String {
        haystack[self.span.clone()]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// All non-overlapping offer phrases, left to right.
pub fn find_offers(text: &str) -> Vec<OfferMatch> {
    let mut all: Vec<(usize, Range<usize>)> = Vec::new();
    for (priority, re) in OFFER_PATTERNS.iter().enumerate() {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.name("offer").or_else(|| caps.get(0)) {
                all.push((priority, m.range()));
            }
        }
    }
    all.sort_by(|a, b| a.1.start.cmp(&b.1.start).then(a.0.cmp(&b.0)));

    let mut kept: Vec<OfferMatch> = Vec::new();
    for (_, span) in all {
        if kept.last().is_some_and(|prev| span.start < prev.span.end) {
            continue;
        }
        kept.push(OfferMatch { span });
    }
    kept
}

// ── Tests ──
