use std::collections::BTreeMap;
use std::ops::Range;

use regex::Regex;
use tracing::debug;

use super::layout::Page;
use super::offers;
use super::units::{self, UnitToken};
use crate::config::ExtractorConfig;
use crate::error::ExtractError;

const CURRENCY_CODES: &str = "AUD|USD|NZD|CAD|EUR|GBP|CHF|JPY|SEK|NOK|DKK|PLN|INR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRole {
    /// Can serve as a headline price.
    Single,
    /// Part of an offer phrase ("2 for $6", "save $2").
    Offer,
    /// Quoted against a unit ("$13.96 per kg").
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceCandidate {
    pub fragment: usize,
    pub value: f64,
    pub currency: String,
    pub role: PriceRole,
    /// The price text itself.
    pub span: Range<usize>,
    /// What to cut when deriving a name: the price plus its unit phrase and parentheses.
    pub strip: Range<usize>,
    pub unit: Option<UnitToken>,
}

struct PricePattern {
    name: &'static str,
    re: Regex,
}

/// Scans fragment text for prices. Patterns depend on the configured
/// decimal separator, so they are compiled per detector rather than once.
pub struct PriceDetector {
    patterns: Vec<PricePattern>,
    bare_re: Regex,
    bare_number_re: Regex,
    decimal: char,
    thousands: char,
    dollar_currency: String,
    allow_bare: bool,
}

impl PriceDetector {
    pub fn new(cfg: &ExtractorConfig) -> Result<Self, ExtractError> {
        let d = regex::escape(&cfg.decimal_separator.to_string());
        let t = regex::escape(&cfg.thousands_separator().to_string());
        let num = format!(r"\d{{1,3}}(?:{t}\d{{3}})+(?:{d}\d{{1,2}})?|\d+(?:{d}\d{{1,2}})?");

        let table = [
            ("symbol_prefix", format!(r"(?P<cur>[$€£¥])\s?(?P<num>{num})")),
            (
                "code_prefix",
                format!(r"\b(?P<cur>{CURRENCY_CODES})\s?(?P<num>{num})"),
            ),
            ("symbol_suffix", format!(r"\b(?P<num>{num})\s?(?P<cur>[€£])")),
            (
                "code_suffix",
                format!(r"\b(?P<num>{num})\s?(?P<cur>{CURRENCY_CODES})\b"),
            ),
        ];
        let patterns = table
            .into_iter()
            .map(|(name, pattern)| Ok(PricePattern { name, re: compile(&pattern)? }))
            .collect::<Result<Vec<_>, ExtractError>>()?;

        Ok(PriceDetector {
            patterns,
            bare_re: compile(&format!(r"^\s*(?P<num>\d+{d}\d{{2}})\s*$"))?,
            bare_number_re: compile(&format!(r"\b(?P<num>\d+{d}\d{{2}})\b"))?,
            decimal: cfg.decimal_separator,
            thousands: cfg.thousands_separator(),
            dollar_currency: cfg.dollar_currency.clone(),
            allow_bare: cfg.allow_bare_prices,
        })
    }

    /// Currency-marked prices in one fragment. `row_prefix` is the text of the
    /// fragment just before it on the same row, so an offer phrase split
    /// across the two ("2 for" | "$6") is still recognised.
    pub fn scan(&self, fragment: usize, text: &str, row_prefix: Option<&str>) -> Vec<PriceCandidate> {
        let mut found: Vec<PriceCandidate> = Vec::new();

        for pattern in &self.patterns {
            for caps in pattern.re.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let span = whole.range();
                if found.iter().any(|c| overlaps(&c.span, &span)) {
                    continue;
                }
                let Some(value) = self.parse_amount(&caps["num"]) else {
                    continue;
                };
                if value <= 0.0 {
                    continue;
                }
                let currency = self.currency_for(&caps["cur"]);
                debug!("{} matched {:?} in {:?}", pattern.name, whole.as_str(), text);
                found.push(PriceCandidate {
                    fragment,
                    value,
                    currency,
                    role: PriceRole::Single,
                    strip: span.clone(),
                    span,
                    unit: None,
                });
            }
        }

        found.sort_by_key(|c| c.span.start);
        for candidate in &mut found {
            classify(candidate, text, row_prefix);
        }
        found
    }

    /// Unmarked two-decimal prices, accepted only under a page currency:
    /// a fragment that is nothing but the number, or a number quoted per unit.
    pub fn scan_bare(&self, fragment: usize, text: &str, currency: &str) -> Vec<PriceCandidate> {
        if let Some(caps) = self.bare_re.captures(text) {
            let m = &caps["num"];
            let Some(span) = caps.name("num").map(|m| m.range()) else {
                return Vec::new();
            };
            return self
                .parse_amount(m)
                .filter(|v| *v > 0.0)
                .map(|value| PriceCandidate {
                    fragment,
                    value,
                    currency: currency.to_string(),
                    role: PriceRole::Single,
                    strip: span.clone(),
                    span,
                    unit: None,
                })
                .into_iter()
                .collect();
        }

        let mut found = Vec::new();
        for caps in self.bare_number_re.captures_iter(text) {
            let Some(m) = caps.name("num") else { continue };
            let Some((len, token)) = units::unit_after(&text[m.end()..]) else {
                continue;
            };
            let Some(value) = self.parse_amount(m.as_str()).filter(|v| *v > 0.0) else {
                continue;
            };
            found.push(PriceCandidate {
                fragment,
                value,
                currency: currency.to_string(),
                role: PriceRole::Unit,
                span: m.range(),
                strip: opening_paren(text, m.start())..m.end() + len,
                unit: Some(token),
            });
        }
        found
    }

    pub fn detect_page(&self, page: &Page) -> PriceTable {
        let mut by_fragment: Vec<Vec<PriceCandidate>> = (0..page.len())
            .map(|id| {
                let prefix = page.row_predecessor(id).map(|p| page.text(p));
                self.scan(id, page.text(id), prefix)
            })
            .collect();

        let context_currency = dominant_currency(&by_fragment);
        if self.allow_bare {
            if let Some(currency) = &context_currency {
                for (id, candidates) in by_fragment.iter_mut().enumerate() {
                    if candidates.is_empty() {
                        *candidates = self.scan_bare(id, page.text(id), currency);
                    }
                }
            }
        }

        PriceTable {
            by_fragment,
            context_currency,
        }
    }

    fn parse_amount(&self, num: &str) -> Option<f64> {
        let cleaned: String = num
            .chars()
            .filter(|c| *c != self.thousands)
            .map(|c| if c == self.decimal { '.' } else { c })
            .collect();
        cleaned.parse::<f64>().ok().map(round_cents)
    }

    fn currency_for(&self, marker: &str) -> String {
        match marker {
            "$" => self.dollar_currency.clone(),
            "€" => "EUR".to_string(),
            "£" => "GBP".to_string(),
            "¥" => "JPY".to_string(),
            code => code.to_string(),
        }
    }
}

/// Decide offer / unit / single from the text around the match.
fn classify(candidate: &mut PriceCandidate, text: &str, row_prefix: Option<&str>) {
    let span = candidate.span.clone();
    let inside = |offer: &offers::OfferMatch, shift: usize| {
        offer.span.start <= span.start + shift && span.end + shift <= offer.span.end
    };

    if offers::find_offers(text).iter().any(|o| inside(o, 0)) {
        candidate.role = PriceRole::Offer;
        return;
    }
    if let Some(prefix) = row_prefix {
        let joined = format!("{} {}", prefix, text);
        let shift = prefix.len() + 1;
        if offers::find_offers(&joined).iter().any(|o| inside(o, shift)) {
            candidate.role = PriceRole::Offer;
            return;
        }
    }
    if let Some((len, token)) = units::unit_after(&text[span.end..]) {
        candidate.role = PriceRole::Unit;
        candidate.strip = opening_paren(text, span.start)..span.end + len;
        candidate.unit = Some(token);
        return;
    }
    if let Some((start, token)) = units::unit_before(&text[..span.start]) {
        candidate.role = PriceRole::Unit;
        candidate.strip = start..span.end;
        candidate.unit = Some(token);
    }
}

/// Start of a "(" wrapping the price, else `start` itself.
fn opening_paren(text: &str, start: usize) -> usize {
    let head = text[..start].trim_end();
    if head.ends_with('(') {
        head.len() - 1
    } else {
        start
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Most frequent marked currency; ties go to the one seen first.
fn dominant_currency(by_fragment: &[Vec<PriceCandidate>]) -> Option<String> {
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (order, c) in by_fragment.iter().flatten().enumerate() {
        let entry = counts.entry(c.currency.as_str()).or_insert((0, order));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(currency, _)| currency.to_string())
}

fn compile(pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|e| ExtractError::InvalidConfig(format!("price pattern: {}", e)))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Price table ──

/// Candidates per page fragment, indexed by reading-order id.
#[derive(Debug, Default)]
pub struct PriceTable {
    by_fragment: Vec<Vec<PriceCandidate>>,
    pub context_currency: Option<String>,
}

impl PriceTable {
    pub fn of(&self, id: usize) -> &[PriceCandidate] {
        self.by_fragment.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.by_fragment.iter().map(Vec::len).sum()
    }

    pub fn has_single(&self, id: usize) -> bool {
        self.of(id).iter().any(|c| c.role == PriceRole::Single)
    }

    pub fn has_unit(&self, id: usize) -> bool {
        self.of(id).iter().any(|c| c.role == PriceRole::Unit)
    }

    /// Carries a price that is not offer wording.
    pub fn is_price_bearing(&self, id: usize) -> bool {
        self.of(id).iter().any(|c| c.role != PriceRole::Offer)
    }

    /// Index of the headline candidate: the lowest single price, else the
    /// lowest unit-quoted one.
    pub fn headline(&self, id: usize) -> Option<usize> {
        let lowest = |role: PriceRole| {
            self.of(id)
                .iter()
                .enumerate()
                .filter(|(_, c)| c.role == role)
                .min_by(|a, b| a.1.value.total_cmp(&b.1.value).then(a.0.cmp(&b.0)))
                .map(|(i, _)| i)
        };
        lowest(PriceRole::Single).or_else(|| lowest(PriceRole::Unit))
    }
}

// ── Tests ──
