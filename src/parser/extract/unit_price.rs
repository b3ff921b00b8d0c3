use tracing::debug;

use crate::parser::clusters::{Cluster, ClusterSet};
use crate::parser::layout::Page;
use crate::parser::prices::{round_cents, PriceCandidate, PriceRole, PriceTable};
use crate::parser::units::{self, Measure, Quantity, Unit, UnitToken};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitPrice {
    pub value: f64,
    pub unit: String,
    /// False when the printed rate disagrees with price and pack size.
    pub consistent: bool,
}

/// Unit price for one cluster. A printed rate wins over a derived one:
/// another unit-quoted price first, then a price beside a unit label, then
/// the headline itself when it is unit-quoted. Failing all of those the rate
/// is worked out from a weight or volume in the name.
pub fn resolve(
    page: &Page,
    prices: &PriceTable,
    clusters: &ClusterSet,
    cluster: &Cluster,
    headline: &PriceCandidate,
    quantity: Option<&Quantity>,
    tolerance: f64,
) -> Option<UnitPrice> {
    match printed(page, prices, clusters, cluster, headline) {
        Some((value, token)) => {
            let consistent = is_consistent(headline.value, value, &token, quantity, tolerance);
            if !consistent {
                debug!(
                    "Unit price {} {} disagrees with {} for {:?}",
                    value,
                    token.label(),
                    headline.value,
                    quantity.map(|q| q.text.as_str())
                );
            }
            Some(UnitPrice {
                value,
                unit: token.label(),
                consistent,
            })
        }
        None => derive(headline.value, quantity?),
    }
}

fn printed(
    page: &Page,
    prices: &PriceTable,
    clusters: &ClusterSet,
    cluster: &Cluster,
    headline: &PriceCandidate,
) -> Option<(f64, UnitToken)> {
    let is_headline = |id: usize, i: usize| id == cluster.anchor && i == cluster.headline;

    for &id in &cluster.members {
        for (i, c) in prices.of(id).iter().enumerate() {
            if is_headline(id, i) || c.role != PriceRole::Unit {
                continue;
            }
            if let Some(token) = &c.unit {
                return Some((c.value, token.clone()));
            }
        }
    }

    for &id in &cluster.members {
        let Some(token) = label_token(page, clusters, id) else {
            continue;
        };
        let other = prices
            .of(id)
            .iter()
            .enumerate()
            .find(|(i, c)| !is_headline(id, *i) && c.role != PriceRole::Offer);
        if let Some((_, c)) = other {
            return Some((c.value, token));
        }
    }

    if headline.role == PriceRole::Unit {
        return headline.unit.clone().map(|token| (headline.value, token));
    }
    label_token(page, clusters, cluster.anchor).map(|token| (headline.value, token))
}

fn label_token(page: &Page, clusters: &ClusterSet, price_fragment: usize) -> Option<UnitToken> {
    let label = clusters.label_of(price_fragment)?;
    units::unit_label(page.text(label))
}

/// A printed rate is checked against price / pack size when the pack size is
/// known; otherwise a per-100g style rate above the pack price is suspect.
pub fn is_consistent(
    price: f64,
    unit_price: f64,
    token: &UnitToken,
    quantity: Option<&Quantity>,
    tolerance: f64,
) -> bool {
    let Some((measure, size)) = token.standard_size() else {
        return true;
    };
    match quantity.and_then(Quantity::standard_total) {
        Some((pack_measure, total)) if pack_measure == measure && total > 0.0 && size > 0.0 => {
            let expected = price / total * size;
            (expected - unit_price).abs() <= tolerance.max(expected * 0.10)
        }
        _ if token.is_sub_unit() => unit_price <= price,
        _ => true,
    }
}

fn derive(price: f64, quantity: &Quantity) -> Option<UnitPrice> {
    let (value, unit) = match quantity.standard_total() {
        Some((_, total)) if total <= 0.0 => return None,
        Some((Measure::Weight, total)) => (price / total, "per kg".to_string()),
        Some((Measure::Volume, total)) => (price / total, "per L".to_string()),
        None if quantity.unit == Unit::Pack && quantity.count > 1 => {
            (price / quantity.count as f64, "each".to_string())
        }
        None => return None,
    };
    Some(UnitPrice {
        value: round_cents(value),
        unit,
        consistent: true,
    })
}

// ── Tests ──
