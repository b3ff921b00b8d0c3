pub mod clusters;
pub mod extract;
pub mod layout;
pub mod offers;
pub mod prices;
pub mod units;

use tracing::info;

use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::model::{ClusterReport, Extraction, ExtractionStats, TextFragment, UnmatchedFragment};
use layout::Page;
use prices::PriceDetector;

/// Holds a validated config and the price patterns compiled for it.
/// Shareable across threads; each `extract` call is independent.
pub struct Extractor {
    config: ExtractorConfig,
    detector: PriceDetector,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        let detector = PriceDetector::new(&config)?;
        Ok(Extractor { config, detector })
    }

    /// Four-pass pipeline: fragments → prices → clusters → products.
    pub fn extract(&self, fragments: &[TextFragment]) -> Extraction {
        let page = Page::prepare(fragments, &self.config);
        let prices = self.detector.detect_page(&page);
        let clusters = clusters::cluster_fragments(&page, &prices);
        let assembled = extract::assemble(&page, &prices, &clusters, &self.config);

        let reports: Vec<ClusterReport> = clusters
            .clusters
            .iter()
            .zip(&assembled.product_ids)
            .map(|(cluster, product_id)| ClusterReport {
                anchor: page.source(cluster.anchor),
                members: cluster.members.iter().map(|&id| page.source(id)).collect(),
                position: cluster.bounding_box,
                adjacent_anchors: cluster.adjacent_anchors.iter().map(|&id| page.source(id)).collect(),
                product_id: product_id.clone(),
                rejected: product_id.is_none(),
            })
            .collect();

        let unmatched: Vec<UnmatchedFragment> = clusters
            .orphans
            .iter()
            .map(|&id| UnmatchedFragment {
                index: page.source(id),
                text: page.text(id).to_string(),
                bounding_box: *page.bbox(id),
                confidence: page.confidence(id),
            })
            .collect();

        let stats = ExtractionStats {
            total_fragments: page.total,
            malformed_fragments: page.malformed,
            low_confidence_fragments: page.below_threshold,
            price_candidates: prices.total(),
            anchors: clusters.clusters.len(),
            adjacent_anchor_pairs: clusters.adjacent_pairs,
            clustered_fragments: clusters.clustered(),
            absorbed_orphans: clusters.absorbed,
            orphaned_fragments: clusters.orphans.len(),
            rejected_anchors: assembled.rejected,
            total_products_extracted: assembled.products.len(),
        };

        info!(
            "Extracted {} products from {} fragments ({} anchors, {} orphaned, {} rejected)",
            stats.total_products_extracted,
            stats.total_fragments,
            stats.anchors,
            stats.orphaned_fragments,
            stats.rejected_anchors
        );

        Extraction {
            products: assembled.products,
            stats,
            clusters: reports,
            unmatched,
            context_currency: prices.context_currency.clone(),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_fragments, BoundingBox, Product};

    fn frag(text: &str, x: f64, y: f64, w: f64, h: f64, conf: f64) -> TextFragment {
        TextFragment::new(text, BoundingBox::new(x, y, w, h), conf)
    }

    fn extractor() -> Extractor {
        Extractor::new(ExtractorConfig::default()).unwrap()
    }

    fn fixture(name: &str) -> Vec<TextFragment> {
        let json = std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap();
        parse_fragments(&json).unwrap()
    }

    fn by_name<'a>(products: &'a [Product], name: &str) -> &'a Product {
        products.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn name_above_price() {
        let out = extractor().extract(&[
            frag("Organic Bananas", 10.0, 10.0, 100.0, 20.0, 0.9),
            frag("$3.99", 10.0, 35.0, 60.0, 20.0, 0.95),
        ]);
        assert_eq!(out.total_products_extracted(), 1);
        let p = &out.products[0];
        assert_eq!(p.id, "prod-001");
        assert_eq!(p.name, "Organic Bananas");
        assert_eq!(p.price, 3.99);
        assert_eq!(p.currency, "AUD");
        assert!(p.unit_price.is_none());
        assert!(p.confidence > 0.8);
        assert_eq!(p.confidence, 0.845);
        assert_eq!(p.position, BoundingBox::new(10.0, 10.0, 100.0, 45.0));
    }

    #[test]
    fn no_currency_no_products() {
        let out = extractor().extract(&fixture("no_prices.json"));
        assert!(out.products.is_empty());
        assert_eq!(out.total_products_extracted(), 0);
        assert_eq!(out.stats.orphaned_fragments, 3);
        assert!(out.context_currency.is_none());
    }

    #[test]
    fn empty_input() {
        let out = extractor().extract(&[]);
        assert!(out.products.is_empty());
        assert_eq!(out.stats, ExtractionStats::default());
    }

    #[test]
    fn unit_label_beside_price() {
        let out = extractor().extract(&[
            frag("$3.99", 10.0, 10.0, 60.0, 20.0, 0.95),
            frag("per kg", 75.0, 10.0, 40.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.price, 3.99);
        assert_eq!(p.unit_price, Some(3.99));
        assert_eq!(p.unit.as_deref(), Some("per kg"));
        assert_eq!(p.name, "Unnamed item");
    }

    #[test]
    fn labelled_second_price_is_the_unit_price() {
        let out = extractor().extract(&[
            frag("Bananas", 10.0, 0.0, 60.0, 20.0, 0.9),
            frag("$3.99", 10.0, 25.0, 60.0, 20.0, 0.95),
            frag("$13.96", 10.0, 50.0, 60.0, 20.0, 0.9),
            frag("per kg", 75.0, 50.0, 40.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.price, 3.99);
        assert_eq!(p.unit_price, Some(13.96));
        assert_eq!(p.unit.as_deref(), Some("per kg"));
    }

    #[test]
    fn adjacent_prices_make_two_products() {
        let out = extractor().extract(&[
            frag("$3.99", 10.0, 10.0, 30.0, 20.0, 0.95),
            frag("$4.99", 45.0, 10.0, 30.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 2);
        assert_eq!(out.stats.adjacent_anchor_pairs, 1);
        assert!(out.clusters.iter().all(|c| c.adjacent_anchors.len() == 1));
        assert_eq!(out.products[0].price, 3.99);
        assert_eq!(out.products[1].id, "prod-002");
    }

    #[test]
    fn offer_text_is_not_the_price() {
        let out = extractor().extract(&[
            frag("Tim Tams", 10.0, 0.0, 80.0, 20.0, 0.9),
            frag("$3.99", 10.0, 25.0, 50.0, 20.0, 0.95),
            frag("2 for $6", 10.0, 50.0, 70.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.price, 3.99);
        assert_eq!(p.special_offer.as_deref(), Some("2 for $6"));
        assert_eq!(p.name, "Tim Tams");
        assert!(p.description.is_none());
    }

    #[test]
    fn implausible_prices_are_rejected() {
        let out = extractor().extract(&[
            frag("Ride-on Mower", 10.0, 0.0, 120.0, 20.0, 0.9),
            frag("$12,500.00", 10.0, 25.0, 90.0, 20.0, 0.95),
        ]);
        assert!(out.products.is_empty());
        assert_eq!(out.stats.rejected_anchors, 1);
        assert!(out.clusters[0].rejected);
        assert!(out.clusters[0].product_id.is_none());
    }

    #[test]
    fn malformed_fragments_are_skipped() {
        let out = extractor().extract(&[
            frag("Organic Bananas", 10.0, 10.0, 100.0, 20.0, 0.9),
            frag("$3.99", 10.0, 35.0, 60.0, 20.0, 0.95),
            frag("$1.00", f64::NAN, 35.0, 60.0, 20.0, 0.95),
            frag("$2.00", 10.0, 35.0, -1.0, 20.0, 0.95),
        ]);
        assert_eq!(out.products.len(), 1);
        assert_eq!(out.stats.malformed_fragments, 2);
        assert_eq!(out.stats.total_fragments, 4);
    }

    #[test]
    fn leaflet_page() {
        let input = fixture("leaflet.json");
        let out = extractor().extract(&input);
        assert_eq!(out.total_products_extracted(), 3);
        assert_eq!(out.context_currency.as_deref(), Some("AUD"));

        let ids: Vec<&str> = out.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["prod-001", "prod-002", "prod-003"]);

        let bananas = by_name(&out.products, "Organic Bananas");
        assert_eq!(bananas.id, "prod-001");
        assert_eq!(bananas.unit.as_deref(), Some("per kg"));
        assert_eq!(bananas.unit_price, Some(3.99));

        let sprouts = by_name(&out.products, "Brussels Sprouts 250g");
        assert_eq!(sprouts.price, 3.49);
        assert_eq!(sprouts.special_offer.as_deref(), Some("Super Saver"));
        assert_eq!(sprouts.quantity.as_deref(), Some("250g"));
        assert_eq!(sprouts.unit_price, Some(13.96));
        assert_eq!(sprouts.unit.as_deref(), Some("per kg"));

        let tim_tams = by_name(&out.products, "Tim Tam Original");
        assert_eq!(tim_tams.price, 4.5);
        assert_eq!(tim_tams.special_offer.as_deref(), Some("2 for $8"));

        assert_eq!(out.stats.low_confidence_fragments, 1);
        assert_eq!(out.unmatched.len(), 1);
        assert_eq!(out.unmatched[0].text, "Page 3");
        assert_eq!(out.unmatched[0].index, 10);
    }

    #[test]
    fn clusters_partition_accepted_fragments() {
        let input = fixture("leaflet.json");
        let out = extractor().extract(&input);
        let accepted = out.stats.total_fragments
            - out.stats.malformed_fragments
            - out.stats.low_confidence_fragments;
        assert_eq!(out.stats.clustered_fragments + out.stats.orphaned_fragments, accepted);

        let mut seen: Vec<usize> = out
            .clusters
            .iter()
            .flat_map(|c| c.members.iter().copied())
            .chain(out.unmatched.iter().map(|u| u.index))
            .collect();
        seen.sort_unstable();
        let before = seen.len();
        seen.dedup();
        assert_eq!(seen.len(), before);
    }

    #[test]
    fn products_are_well_formed() {
        let out = extractor().extract(&fixture("leaflet.json"));
        for p in &out.products {
            assert!(p.price > 0.0);
            assert!((0.0..=1.0).contains(&p.confidence));
            assert!(!p.name.is_empty());
            assert_eq!(p.currency, "AUD");
        }
    }

    #[test]
    fn output_is_deterministic() {
        let input = fixture("leaflet.json");
        let ex = extractor();
        let a = serde_json::to_string(&ex.extract(&input).products).unwrap();
        let b = serde_json::to_string(&ex.extract(&input).products).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rerun_on_one_cluster_is_stable() {
        let input = fixture("leaflet.json");
        let ex = extractor();
        let out = ex.extract(&input);
        let cluster = out
            .clusters
            .iter()
            .find(|c| c.product_id.as_deref() == Some("prod-001"))
            .unwrap();
        let subset: Vec<TextFragment> = cluster.members.iter().map(|&i| input[i].clone()).collect();

        let again = ex.extract(&subset);
        assert_eq!(again.products.len(), 1);
        let (a, b) = (&out.products[0], &again.products[0]);
        assert_eq!(a.name, b.name);
        assert_eq!(a.price, b.price);
        assert_eq!(a.unit_price, b.unit_price);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.position, b.position);
    }

    #[test]
    fn confidence_rises_with_fragment_confidence() {
        let ex = extractor();
        let run = |name_conf: f64| {
            ex.extract(&[
                frag("Organic Bananas", 10.0, 10.0, 100.0, 20.0, name_conf),
                frag("$3.99", 10.0, 35.0, 60.0, 20.0, 0.95),
            ])
            .products[0]
                .confidence
        };
        assert!(run(0.8) <= run(0.9));
        assert!(run(0.9) <= run(0.99));
    }

    #[test]
    fn was_now_pair_keeps_the_lower_price() {
        let out = extractor().extract(&[
            frag("Coffee Beans", 10.0, 0.0, 100.0, 20.0, 0.9),
            frag("Was $5.49 / $3.99", 10.0, 25.0, 140.0, 20.0, 0.95),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.name, "Coffee Beans");
        assert_eq!(p.price, 3.99);
        assert!(p.special_offer.is_none());
    }

    #[test]
    fn every_offer_phrase_is_cut() {
        let out = extractor().extract(&[
            frag("Super Saver", 10.0, 0.0, 90.0, 20.0, 0.9),
            frag("Tim Tams", 10.0, 25.0, 80.0, 20.0, 0.9),
            frag("$4.50", 10.0, 50.0, 50.0, 20.0, 0.95),
            frag("2 for $8", 10.0, 75.0, 70.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.price, 4.5);
        assert_eq!(p.name, "Tim Tams");
        assert_eq!(p.special_offer.as_deref(), Some("Super Saver"));
        assert!(p.description.is_none());
    }

    #[test]
    fn unusable_first_line_is_kept_as_description() {
        let out = extractor().extract(&[
            frag("x", 10.0, 0.0, 20.0, 20.0, 0.9),
            frag("$3.99", 10.0, 25.0, 60.0, 20.0, 0.95),
            frag("Fresh daily", 10.0, 50.0, 90.0, 20.0, 0.9),
        ]);
        assert_eq!(out.products.len(), 1);
        let p = &out.products[0];
        assert_eq!(p.name, "Unnamed item");
        assert_eq!(p.description.as_deref(), Some("x Fresh daily"));
    }

    #[test]
    fn shared_extractor_across_threads() {
        let input = fixture("leaflet.json");
        let ex = extractor();
        let expected = serde_json::to_string(&ex.extract(&input)).unwrap();

        let outputs: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| serde_json::to_string(&ex.extract(&input)).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outputs.len(), 8);
        assert!(outputs.iter().all(|o| *o == expected));
    }

    #[test]
    fn invalid_config_is_refused() {
        let cfg = ExtractorConfig {
            confidence_threshold: -0.1,
            ..Default::default()
        };
        assert!(matches!(Extractor::new(cfg), Err(ExtractError::InvalidConfig(_))));
    }
}
