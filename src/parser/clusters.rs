use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::layout::Page;
use super::prices::PriceTable;
use super::units;
use crate::model::BoundingBox;

/// A unit label only labels a price within this share of the radius.
const LABEL_REACH: f64 = 0.5;
const TIE_EPSILON: f64 = 1e-9;

/// One product candidate: an anchor price and the fragments grouped around it.
/// All ids are reading-order ids into the page.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub anchor: usize,
    /// Index of the headline candidate among the anchor's prices.
    pub headline: usize,
    pub members: Vec<usize>,
    pub bounding_box: BoundingBox,
    /// Other anchors within the radius of this one.
    pub adjacent_anchors: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterSet {
    pub clusters: Vec<Cluster>,
    pub orphans: Vec<usize>,
    /// Fragments that joined a cluster through box proximity.
    pub absorbed: usize,
    pub adjacent_pairs: usize,
    /// Price fragment -> the unit-label fragment beside it.
    pub unit_labels: BTreeMap<usize, usize>,
}

impl ClusterSet {
    pub fn label_of(&self, price_fragment: usize) -> Option<usize> {
        self.unit_labels.get(&price_fragment).copied()
    }

    pub fn is_label(&self, id: usize) -> bool {
        self.unit_labels.values().any(|&label| label == id)
    }

    pub fn clustered(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }
}

/// Group the page around its price anchors.
///
/// Every non-anchor fragment first goes to the nearest anchor whose center is
/// within the radius. Unit labels then follow the price they label, and
/// leftovers touching a cluster's box are pulled in, repeating until nothing
/// moves. What is left is orphaned.
pub fn cluster_fragments(page: &Page, prices: &PriceTable) -> ClusterSet {
    if page.is_empty() {
        return ClusterSet::default();
    }
    let unit_labels = find_unit_labels(page, prices);
    let anchors = select_anchors(page, prices, &unit_labels);
    let label_ids: BTreeSet<usize> = unit_labels.values().copied().collect();

    let mut builder = ClusterBuilder::new(page, &anchors);
    let adjacent_pairs = builder.mark_adjacent();

    for id in 0..page.len() {
        if builder.owner[id].is_some() || label_ids.contains(&id) {
            continue;
        }
        if let Some(c) = builder.nearest_anchor(id) {
            builder.assign(c, id);
        }
    }

    let mut absorbed = 0;
    loop {
        let mut changed = false;
        for (&price, &label) in &unit_labels {
            if builder.owner[label].is_some() {
                continue;
            }
            if let Some(c) = builder.owner[price] {
                builder.assign(c, label);
                changed = true;
            }
        }
        for id in 0..page.len() {
            if builder.owner[id].is_some() {
                continue;
            }
            if let Some(c) = builder.nearest_box(id) {
                debug!(
                    "Absorbing {:?} into cluster of {:?}",
                    page.text(id),
                    page.text(builder.clusters[c].anchor)
                );
                builder.assign(c, id);
                absorbed += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let orphans: Vec<usize> = (0..page.len())
        .filter(|&id| builder.owner[id].is_none())
        .collect();
    let mut clusters = builder.clusters;
    for c in &mut clusters {
        c.members.sort_unstable();
    }

    ClusterSet {
        clusters,
        orphans,
        absorbed,
        adjacent_pairs,
        unit_labels,
    }
}

/// Pair each whole-fragment unit phrase ("per kg") with the closest single
/// price it sits beside.
fn find_unit_labels(page: &Page, prices: &PriceTable) -> BTreeMap<usize, usize> {
    let reach = page.radius() * LABEL_REACH;
    let mut labels = BTreeMap::new();

    for label in 0..page.len() {
        if !prices.of(label).is_empty() || units::unit_label(page.text(label)).is_none() {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for price in 0..page.len() {
            if price == label || !prices.has_single(price) || prices.has_unit(price) {
                continue;
            }
            let d = page.gap_distance(label, page.bbox(price));
            if d <= reach && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((price, d));
            }
        }
        if let Some((price, _)) = best {
            labels.entry(price).or_insert(label);
        }
    }
    labels
}

/// Anchors with their headline index. A fragment with a single price and no
/// unit label can head a product; any other price-bearing fragment only does
/// so when no such fragment is within reach. Offer-only text never anchors.
fn select_anchors(
    page: &Page,
    prices: &PriceTable,
    unit_labels: &BTreeMap<usize, usize>,
) -> Vec<(usize, usize)> {
    let capable = |id: usize| prices.has_single(id) && !unit_labels.contains_key(&id);
    let capable_ids: Vec<usize> = (0..page.len()).filter(|&id| capable(id)).collect();

    let mut anchors = Vec::new();
    for id in 0..page.len() {
        if !prices.is_price_bearing(id) {
            continue;
        }
        let Some(headline) = prices.headline(id) else {
            continue;
        };
        let alone = capable_ids
            .iter()
            .all(|&c| c == id || page.center_distance(id, c) > page.radius());
        if capable(id) || alone {
            anchors.push((id, headline));
        } else {
            debug!("{:?} joins a neighbouring price as unit evidence", page.text(id));
        }
    }
    anchors
}

struct ClusterBuilder<'p> {
    page: &'p Page<'p>,
    clusters: Vec<Cluster>,
    owner: Vec<Option<usize>>,
}

impl<'p> ClusterBuilder<'p> {
    fn new(page: &'p Page<'p>, anchors: &[(usize, usize)]) -> Self {
        let mut owner = vec![None; page.len()];
        let clusters = anchors
            .iter()
            .enumerate()
            .map(|(c, &(anchor, headline))| {
                owner[anchor] = Some(c);
                Cluster {
                    anchor,
                    headline,
                    members: vec![anchor],
                    bounding_box: *page.bbox(anchor),
                    adjacent_anchors: Vec::new(),
                }
            })
            .collect();
        ClusterBuilder {
            page,
            clusters,
            owner,
        }
    }

    fn mark_adjacent(&mut self) -> usize {
        let mut pairs = 0;
        for i in 0..self.clusters.len() {
            for j in i + 1..self.clusters.len() {
                let (a, b) = (self.clusters[i].anchor, self.clusters[j].anchor);
                if self.page.center_distance(a, b) <= self.page.radius() {
                    self.clusters[i].adjacent_anchors.push(b);
                    self.clusters[j].adjacent_anchors.push(a);
                    pairs += 1;
                }
            }
        }
        if pairs > 0 {
            debug!("{} adjacent anchor pairs", pairs);
        }
        pairs
    }

    fn assign(&mut self, c: usize, id: usize) {
        self.owner[id] = Some(c);
        let cluster = &mut self.clusters[c];
        cluster.members.push(id);
        cluster.bounding_box = cluster.bounding_box.union(self.page.bbox(id));
    }

    fn nearest_anchor(&self, id: usize) -> Option<usize> {
        self.nearest(|cluster| self.page.center_distance(id, cluster.anchor))
    }

    fn nearest_box(&self, id: usize) -> Option<usize> {
        self.nearest(|cluster| self.page.gap_distance(id, &cluster.bounding_box))
    }

    /// Closest cluster within the radius. Distance ties go to the more
    /// confident anchor, then to the earlier one.
    fn nearest(&self, distance: impl Fn(&Cluster) -> f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (c, cluster) in self.clusters.iter().enumerate() {
            let d = distance(cluster);
            if d > self.page.radius() {
                continue;
            }
            let better = match best {
                None => true,
                Some((b, bd)) => {
                    d < bd - TIE_EPSILON
                        || ((d - bd).abs() <= TIE_EPSILON
                            && self.page.confidence(cluster.anchor)
                                > self.page.confidence(self.clusters[b].anchor))
                }
            };
            if better {
                best = Some((c, d));
            }
        }
        best.map(|(c, _)| c)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::model::TextFragment;
    use crate::parser::prices::PriceDetector;

    fn frag(text: &str, x: f64, y: f64, w: f64, h: f64, conf: f64) -> TextFragment {
        TextFragment::new(text, BoundingBox::new(x, y, w, h), conf)
    }

    fn run(input: &[TextFragment]) -> (Vec<String>, ClusterSet) {
        let cfg = ExtractorConfig::default();
        let page = Page::prepare(input, &cfg);
        let prices = PriceDetector::new(&cfg).unwrap().detect_page(&page);
        let set = cluster_fragments(&page, &prices);
        let texts = (0..page.len()).map(|i| page.text(i).to_string()).collect();
        (texts, set)
    }

    #[test]
    fn name_joins_its_price() {
        let (texts, set) = run(&[
            frag("Organic Bananas", 10.0, 10.0, 100.0, 20.0, 0.9),
            frag("$3.99", 10.0, 35.0, 60.0, 20.0, 0.95),
        ]);
        assert_eq!(set.clusters.len(), 1);
        assert_eq!(texts[set.clusters[0].anchor], "$3.99");
        assert_eq!(set.clusters[0].members, vec![0, 1]);
        assert!(set.orphans.is_empty());
    }

    #[test]
    fn no_prices_no_clusters() {
        let (_, set) = run(&[
            frag("Fresh Produce", 0.0, 0.0, 100.0, 20.0, 0.9),
            frag("Weekly specials", 0.0, 30.0, 100.0, 20.0, 0.9),
        ]);
        assert!(set.clusters.is_empty());
        assert_eq!(set.orphans, vec![0, 1]);
    }

    #[test]
    fn unit_label_follows_its_price() {
        let (texts, set) = run(&[
            frag("$3.99", 10.0, 10.0, 60.0, 20.0, 0.95),
            frag("per kg", 75.0, 10.0, 40.0, 20.0, 0.9),
        ]);
        assert_eq!(set.clusters.len(), 1);
        let label = set.label_of(set.clusters[0].anchor).unwrap();
        assert_eq!(texts[label], "per kg");
        assert!(set.clusters[0].members.contains(&label));
    }

    #[test]
    fn labelled_price_yields_to_headline() {
        let (texts, set) = run(&[
            frag("$3.99", 10.0, 10.0, 60.0, 20.0, 0.95),
            frag("$13.96", 10.0, 35.0, 60.0, 20.0, 0.9),
            frag("per kg", 75.0, 35.0, 40.0, 20.0, 0.9),
        ]);
        assert_eq!(set.clusters.len(), 1);
        assert_eq!(texts[set.clusters[0].anchor], "$3.99");
        assert_eq!(set.clusters[0].members.len(), 3);
    }

    #[test]
    fn close_prices_both_anchor_and_are_flagged() {
        let (_, set) = run(&[
            frag("$3.99", 10.0, 10.0, 30.0, 20.0, 0.95),
            frag("$4.99", 45.0, 10.0, 30.0, 20.0, 0.95),
        ]);
        assert_eq!(set.clusters.len(), 2);
        assert_eq!(set.adjacent_pairs, 1);
        assert_eq!(set.clusters[0].adjacent_anchors, vec![1]);
        assert_eq!(set.clusters[1].adjacent_anchors, vec![0]);
    }

    #[test]
    fn equidistant_member_goes_to_confident_anchor() {
        let (texts, set) = run(&[
            frag("$1.00", 0.0, 0.0, 20.0, 20.0, 0.7),
            frag("Milk", 0.0, 30.0, 20.0, 20.0, 0.9),
            frag("$2.00", 0.0, 60.0, 20.0, 20.0, 0.95),
        ]);
        let owner = set
            .clusters
            .iter()
            .find(|c| c.members.contains(&1))
            .unwrap();
        assert_eq!(texts[owner.anchor], "$2.00");
    }

    #[test]
    fn full_tie_goes_to_earlier_anchor_in_reading_order() {
        let (texts, set) = run(&[
            frag("$2.00", 0.0, 60.0, 20.0, 20.0, 0.9),
            frag("Milk", 0.0, 30.0, 20.0, 20.0, 0.9),
            frag("$1.00", 0.0, 0.0, 20.0, 20.0, 0.9),
        ]);
        assert_eq!(set.clusters.len(), 2);
        let owner = set
            .clusters
            .iter()
            .find(|c| c.members.contains(&1))
            .unwrap();
        assert_eq!(texts[owner.anchor], "$1.00");
        assert_eq!(set.clusters.iter().filter(|c| c.members.contains(&1)).count(), 1);
    }

    #[test]
    fn empty_page_has_no_clusters() {
        let (_, set) = run(&[]);
        assert!(set.clusters.is_empty());
        assert!(set.orphans.is_empty());
    }

    #[test]
    fn chained_text_is_absorbed_and_far_text_orphaned() {
        let (texts, set) = run(&[
            frag("$5.00", 0.0, 0.0, 50.0, 20.0, 0.9),
            frag("Greek Yoghurt", 0.0, 50.0, 80.0, 20.0, 0.9),
            frag("Natural 1kg tub", 0.0, 100.0, 80.0, 20.0, 0.9),
            frag("Page 12", 900.0, 900.0, 50.0, 20.0, 0.9),
        ]);
        assert_eq!(set.clusters.len(), 1);
        assert_eq!(set.clusters[0].members.len(), 3);
        assert!(set.absorbed >= 1);
        assert_eq!(set.orphans.len(), 1);
        assert_eq!(texts[set.orphans[0]], "Page 12");
        assert_eq!(set.clustered() + set.orphans.len(), texts.len());
    }
}
