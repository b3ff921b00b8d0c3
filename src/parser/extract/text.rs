use std::collections::BTreeMap;
use std::ops::Range;

use crate::parser::clusters::{Cluster, ClusterSet};
use crate::parser::layout::Page;
use crate::parser::offers;
use crate::parser::prices::PriceTable;
use crate::parser::units::{self, Quantity};

const EDGE_NOISE: &[char] = &['-', '–', '|', '/', '\\', ',', ';', ':', '*', '•', '·', '~'];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedText {
    /// `None` when nothing usable is left; callers substitute a placeholder.
    pub name: Option<String>,
    pub description: Option<String>,
    pub special_offer: Option<String>,
    pub quantity: Option<Quantity>,
}

/// Residual text of a cluster once prices, offer wording, unit labels and
/// OCR noise are removed. First line becomes the name, the rest the description.
pub fn clean_cluster(
    page: &Page,
    prices: &PriceTable,
    clusters: &ClusterSet,
    cluster: &Cluster,
    max_name_length: usize,
) -> CleanedText {
    let rows = group_rows(page, &cluster.members);
    let mut cuts: BTreeMap<usize, Vec<Range<usize>>> = BTreeMap::new();

    // Every offer phrase is cut from the text; the first one is reported.
    let mut special_offer = None;
    for row in &rows {
        let (joined, starts) = join_row(page, row);
        for offer in offers::find_offers(&joined) {
            special_offer.get_or_insert_with(|| offer.text(&joined));
            for (&id, &start) in row.iter().zip(&starts) {
                let end = start + page.text(id).len();
                let lo = offer.span.start.max(start);
                let hi = offer.span.end.min(end);
                if lo < hi {
                    cuts.entry(id).or_default().push(lo - start..hi - start);
                }
            }
        }
    }

    let mut lines = Vec::new();
    for row in &rows {
        let parts: Vec<String> = row
            .iter()
            .filter(|&&id| !clusters.is_label(id))
            .map(|&id| {
                let mut ranges: Vec<Range<usize>> =
                    prices.of(id).iter().map(|c| c.strip.clone()).collect();
                if let Some(extra) = cuts.get(&id) {
                    ranges.extend(extra.iter().cloned());
                }
                drop_noise(&remove_ranges(page.text(id), ranges))
            })
            .filter(|s| !s.is_empty())
            .collect();
        let line = trim_edges(&parts.join(" "));
        if !line.is_empty() {
            lines.push(line);
        }
    }

    let (name, description) = split_name(&lines, max_name_length);
    let quantity = name
        .as_deref()
        .and_then(units::find_quantity)
        .or_else(|| description.as_deref().and_then(units::find_quantity));

    CleanedText {
        name,
        description,
        special_offer,
        quantity,
    }
}

/// Member ids split into page rows, each left to right.
fn group_rows(page: &Page, members: &[usize]) -> Vec<Vec<usize>> {
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for &id in members {
        let same_row = rows
            .last()
            .and_then(|row| row.last())
            .is_some_and(|&prev| page.row(prev) == page.row(id));
        match rows.last_mut() {
            Some(row) if same_row => row.push(id),
            _ => rows.push(vec![id]),
        }
    }
    rows
}

/// Row text joined with single spaces, plus each fragment's start offset.
fn join_row(page: &Page, row: &[usize]) -> (String, Vec<usize>) {
    let mut joined = String::new();
    let mut starts = Vec::with_capacity(row.len());
    for &id in row {
        if !joined.is_empty() {
            joined.push(' ');
        }
        starts.push(joined.len());
        joined.push_str(page.text(id));
    }
    (joined, starts)
}

fn remove_ranges(text: &str, mut ranges: Vec<Range<usize>>) -> String {
    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::new();
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for r in merged {
        out.push_str(&text[pos..r.start]);
        out.push(' ');
        pos = r.end;
    }
    out.push_str(&text[pos..]);
    out
}

/// Drop tokens with nothing readable in them ("$", "--", "*").
fn drop_noise(text: &str) -> String {
    text.split_whitespace()
        .filter(|t| *t == "&" || t.chars().any(char::is_alphanumeric))
        .collect::<Vec<_>>()
        .join(" ")
}

fn trim_edges(line: &str) -> String {
    line.trim_matches(|c: char| c.is_whitespace() || EDGE_NOISE.contains(&c))
        .to_string()
}

/// First line is the name, capped at a word boundary; overflow and the
/// remaining lines form the description. A first line that is not a usable
/// name stays in the description and the name is left empty.
fn split_name(lines: &[String], max_len: usize) -> (Option<String>, Option<String>) {
    let Some(first) = lines.first() else {
        return (None, None);
    };
    let (name, spill) = cap_at_word(first, max_len);
    if !is_valid_name(name) {
        return (None, Some(lines.join(" ")));
    }
    let rest: Vec<&str> = spill.into_iter().chain(lines[1..].iter().map(String::as_str)).collect();
    let description = (!rest.is_empty()).then(|| rest.join(" "));
    (Some(name.to_string()), description)
}

fn cap_at_word(text: &str, max_len: usize) -> (&str, Option<&str>) {
    let Some((cut, _)) = text.char_indices().nth(max_len) else {
        return (text, None);
    };
    let split = match text[..cut].rfind(char::is_whitespace) {
        Some(space) if space > 0 => space,
        _ => cut,
    };
    let spill = text[split..].trim_start();
    (text[..split].trim_end(), (!spill.is_empty()).then_some(spill))
}

/// At least two characters, at least half of them letters, digits or spaces.
pub fn is_valid_name(name: &str) -> bool {
    let total = name.chars().count();
    if total < 2 {
        return false;
    }
    let readable = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    readable * 2 >= total
}

// ── Tests ──
