use std::cmp::Ordering;

use tracing::warn;

use crate::config::ExtractorConfig;
use crate::model::{BoundingBox, TextFragment};

/// A fragment accepted for clustering. Its position in `Page::fragments`
/// is its reading-order id; `source` points back into the caller's list.
#[derive(Debug, Clone)]
struct PageFragment<'a> {
    source: usize,
    row: usize,
    fragment: &'a TextFragment,
}

/// Filtered, reading-ordered view of one fragment list.
#[derive(Debug)]
pub struct Page<'a> {
    fragments: Vec<PageFragment<'a>>,
    radius: f64,
    horizontal_weight: f64,
    vertical_weight: f64,
    pub total: usize,
    pub malformed: usize,
    pub below_threshold: usize,
}

impl<'a> Page<'a> {
    pub fn prepare(input: &'a [TextFragment], cfg: &ExtractorConfig) -> Page<'a> {
        let mut malformed = 0;
        let mut below_threshold = 0;
        let mut kept: Vec<(usize, &'a TextFragment)> = Vec::with_capacity(input.len());

        for (i, f) in input.iter().enumerate() {
            if !f.bounding_box.is_well_formed() || !f.confidence.is_finite() {
                warn!(
                    "Skipping malformed fragment #{} {:?}: box {:?}, confidence {}",
                    i, f.text, f.bounding_box, f.confidence
                );
                malformed += 1;
                continue;
            }
            if f.confidence < cfg.confidence_threshold {
                below_threshold += 1;
                continue;
            }
            kept.push((i, f));
        }

        let median = median_height(&kept);
        let radius = cfg
            .clustering_radius_px
            .unwrap_or(median * cfg.clustering_radius_scale);
        let fragments = reading_order(kept, median / 2.0);

        Page {
            fragments,
            radius,
            horizontal_weight: cfg.horizontal_weight,
            vertical_weight: cfg.vertical_weight,
            total: input.len(),
            malformed,
            below_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn text(&self, id: usize) -> &'a str {
        &self.fragments[id].fragment.text
    }

    pub fn bbox(&self, id: usize) -> &'a BoundingBox {
        &self.fragments[id].fragment.bounding_box
    }

    pub fn confidence(&self, id: usize) -> f64 {
        self.fragments[id].fragment.confidence
    }

    pub fn row(&self, id: usize) -> usize {
        self.fragments[id].row
    }

    pub fn source(&self, id: usize) -> usize {
        self.fragments[id].source
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Direction-weighted length of an (dx, dy) offset.
    pub fn weighted(&self, dx: f64, dy: f64) -> f64 {
        let h = dx * self.horizontal_weight;
        let v = dy * self.vertical_weight;
        (h * h + v * v).sqrt()
    }

    /// Weighted distance between two fragments' box centers.
    pub fn center_distance(&self, a: usize, b: usize) -> f64 {
        let (ax, ay) = self.bbox(a).center();
        let (bx, by) = self.bbox(b).center();
        self.weighted(ax - bx, ay - by)
    }

    /// Weighted edge-to-edge distance from a fragment to any box.
    pub fn gap_distance(&self, id: usize, other: &BoundingBox) -> f64 {
        let (dx, dy) = self.bbox(id).gap(other);
        self.weighted(dx, dy)
    }

    /// The fragment just before `id` on the same row, if any.
    pub fn row_predecessor(&self, id: usize) -> Option<usize> {
        let prev = id.checked_sub(1)?;
        (self.row(prev) == self.row(id)).then_some(prev)
    }
}

fn median_height(kept: &[(usize, &TextFragment)]) -> f64 {
    let mut heights: Vec<f64> = kept.iter().map(|(_, f)| f.bounding_box.height).collect();
    if heights.is_empty() {
        return 0.0;
    }
    heights.sort_by(f64::total_cmp);
    let mid = heights.len() / 2;
    if heights.len() % 2 == 0 {
        (heights[mid - 1] + heights[mid]) / 2.0
    } else {
        heights[mid]
    }
}

/// Top-to-bottom rows, left-to-right within a row. A fragment joins the
/// current row while its center sits within `tolerance` of the row's first
/// center line.
fn reading_order<'a>(
    mut kept: Vec<(usize, &'a TextFragment)>,
    tolerance: f64,
) -> Vec<PageFragment<'a>> {
    kept.sort_by(|a, b| {
        let (ax, ay) = a.1.bounding_box.center();
        let (bx, by) = b.1.bounding_box.center();
        ay.total_cmp(&by)
            .then(ax.total_cmp(&bx))
            .then(a.0.cmp(&b.0))
    });

    let mut rows: Vec<Vec<(usize, &'a TextFragment)>> = Vec::new();
    let mut row_line = f64::NEG_INFINITY;
    for item in kept {
        let cy = item.1.bounding_box.center().1;
        if rows.is_empty() || cy - row_line > tolerance {
            row_line = cy;
            rows.push(vec![item]);
        } else if let Some(row) = rows.last_mut() {
            row.push(item);
        }
    }

    let mut ordered = Vec::new();
    for (row_idx, mut row) in rows.into_iter().enumerate() {
        row.sort_by(left_to_right);
        ordered.extend(row.into_iter().map(|(source, fragment)| PageFragment {
            source,
            row: row_idx,
            fragment,
        }));
    }
    ordered
}

fn left_to_right(a: &(usize, &TextFragment), b: &(usize, &TextFragment)) -> Ordering {
    a.1.bounding_box
        .x
        .total_cmp(&b.1.bounding_box.x)
        .then(a.0.cmp(&b.0))
}

// ── Tests ──
