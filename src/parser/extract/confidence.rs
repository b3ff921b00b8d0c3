use crate::config::ExtractorConfig;

/// Which product fields the cluster managed to fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completeness {
    pub placeholder_name: bool,
    pub has_unit_price: bool,
    pub unit_price_flagged: bool,
    pub has_offer: bool,
}

impl Completeness {
    pub fn score(&self) -> f64 {
        if self.placeholder_name {
            return 0.0;
        }
        let base: f64 = if self.has_unit_price || self.has_offer { 1.0 } else { 0.5 };
        let penalty: f64 = if self.unit_price_flagged { 0.25 } else { 0.0 };
        (base - penalty).max(0.0)
    }
}

/// Product confidence from its anchor, the other members and structure.
/// Never more than `confidence_smoothing` above the weakest contributing
/// fragment, always within [0, 1], rounded to 4 places.
pub fn aggregate(anchor: f64, others: &[f64], completeness: &Completeness, cfg: &ExtractorConfig) -> f64 {
    let members = if others.is_empty() {
        anchor
    } else {
        others.iter().sum::<f64>() / others.len() as f64
    };
    let total_weight = cfg.anchor_weight + cfg.member_weight + cfg.structure_weight;
    let raw = (anchor * cfg.anchor_weight
        + members * cfg.member_weight
        + completeness.score() * cfg.structure_weight)
        / total_weight;

    let weakest = others.iter().copied().fold(anchor, f64::min);
    let capped = raw.min(weakest + cfg.confidence_smoothing).clamp(0.0, 1.0);
    (capped * 10_000.0).round() / 10_000.0
}

// ── Tests ──
