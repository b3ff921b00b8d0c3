use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

// ── Input ──

/// Axis-aligned box in image pixel space, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BoxShape")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// OCR engines disagree on box encoding: rectangles or four-corner quads.
#[derive(Deserialize)]
#[serde(untagged)]
enum BoxShape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Quad([[f64; 2]; 4]),
}

impl From<BoxShape> for BoundingBox {
    fn from(shape: BoxShape) -> Self {
        match shape {
            BoxShape::Rect {
                x,
                y,
                width,
                height,
            } => BoundingBox::new(x, y, width, height),
            BoxShape::Quad(points) => BoundingBox::from_quad(&points),
        }
    }
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle enclosing the four corners (tl, tr, br, bl).
    pub fn from_quad(points: &[[f64; 2]; 4]) -> Self {
        let min_x = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
        let min_y = points.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
        BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Finite, non-negative origin and extent.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(x, y, right - x, bottom - y)
    }

    /// Per-axis gap between two boxes; zero on an axis where they overlap.
    pub fn gap(&self, other: &BoundingBox) -> (f64, f64) {
        let dx = (other.x - self.right()).max(self.x - other.right()).max(0.0);
        let dy = (other.y - self.bottom()).max(self.y - other.bottom()).max(0.0);
        (dx, dy)
    }
}

/// One OCR-detected text span. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFragment {
    pub text: String,
    #[serde(alias = "bounding_box")]
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox, confidence: f64) -> Self {
        TextFragment {
            text: text.into(),
            bounding_box,
            confidence,
        }
    }
}

/// Accepts either a bare fragment array or `{"fragments": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FragmentDocument {
    List(Vec<TextFragment>),
    Wrapped { fragments: Vec<TextFragment> },
}

/// Decode a fragment list. Anything that is not a fragment list is fatal.
pub fn parse_fragments(json: &str) -> Result<Vec<TextFragment>, ExtractError> {
    let doc: FragmentDocument =
        serde_json::from_str(json).map_err(ExtractError::MalformedInput)?;
    Ok(match doc {
        FragmentDocument::List(list) => list,
        FragmentDocument::Wrapped { fragments } => fragments,
    })
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    pub position: BoundingBox,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub total_fragments: usize,
    pub malformed_fragments: usize,
    pub low_confidence_fragments: usize,
    pub price_candidates: usize,
    pub anchors: usize,
    pub adjacent_anchor_pairs: usize,
    pub clustered_fragments: usize,
    pub absorbed_orphans: usize,
    pub orphaned_fragments: usize,
    pub rejected_anchors: usize,
    pub total_products_extracted: usize,
}

/// One cluster as seen from the caller: input indices, not engine ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReport {
    pub anchor: usize,
    pub members: Vec<usize>,
    pub position: BoundingBox,
    pub adjacent_anchors: Vec<usize>,
    pub product_id: Option<String>,
    pub rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedFragment {
    pub index: usize,
    pub text: String,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

/// Everything one extraction pass produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub products: Vec<Product>,
    pub stats: ExtractionStats,
    pub clusters: Vec<ClusterReport>,
    pub unmatched: Vec<UnmatchedFragment>,
    pub context_currency: Option<String>,
}

impl Extraction {
    pub fn total_products_extracted(&self) -> usize {
        self.stats.total_products_extracted
    }
}

// ── Tests ──
