pub mod confidence;
pub mod text;
pub mod unit_price;

use tracing::debug;

use self::confidence::Completeness;
use super::clusters::{Cluster, ClusterSet};
use super::layout::Page;
use super::prices::PriceTable;
use crate::config::ExtractorConfig;
use crate::model::Product;

pub struct Assembled {
    pub products: Vec<Product>,
    /// Product id per cluster, `None` where the anchor was rejected.
    pub product_ids: Vec<Option<String>>,
    pub rejected: usize,
}

/// Turn clusters into products, most confident anchor first.
pub fn assemble(
    page: &Page,
    prices: &PriceTable,
    clusters: &ClusterSet,
    cfg: &ExtractorConfig,
) -> Assembled {
    let mut built: Vec<(usize, Product)> = Vec::new();
    let mut rejected = 0;
    for (c, cluster) in clusters.clusters.iter().enumerate() {
        match build_product(page, prices, clusters, cluster, cfg) {
            Some(product) => built.push((c, product)),
            None => rejected += 1,
        }
    }

    built.sort_by(|(a, _), (b, _)| {
        let (a, b) = (clusters.clusters[*a].anchor, clusters.clusters[*b].anchor);
        page.confidence(b)
            .total_cmp(&page.confidence(a))
            .then(a.cmp(&b))
    });

    let mut product_ids = vec![None; clusters.clusters.len()];
    let products = built
        .into_iter()
        .enumerate()
        .map(|(n, (c, mut product))| {
            product.id = format!("{}-{:03}", cfg.id_prefix, n + 1);
            product_ids[c] = Some(product.id.clone());
            product
        })
        .collect();

    Assembled {
        products,
        product_ids,
        rejected,
    }
}

fn build_product(
    page: &Page,
    prices: &PriceTable,
    clusters: &ClusterSet,
    cluster: &Cluster,
    cfg: &ExtractorConfig,
) -> Option<Product> {
    let headline = prices.of(cluster.anchor).get(cluster.headline)?;
    if !(headline.value > 0.0 && headline.value <= cfg.price_sanity_ceiling) {
        debug!(
            "Rejecting anchor {:?}: {} {} outside (0, {}]",
            page.text(cluster.anchor),
            headline.value,
            headline.currency,
            cfg.price_sanity_ceiling
        );
        return None;
    }

    let cleaned = text::clean_cluster(page, prices, clusters, cluster, cfg.max_name_length);
    let unit = unit_price::resolve(
        page,
        prices,
        clusters,
        cluster,
        headline,
        cleaned.quantity.as_ref(),
        cfg.unit_price_tolerance,
    );

    let completeness = Completeness {
        placeholder_name: cleaned.name.is_none(),
        has_unit_price: unit.is_some(),
        unit_price_flagged: unit.as_ref().is_some_and(|u| !u.consistent),
        has_offer: cleaned.special_offer.is_some(),
    };
    let others: Vec<f64> = cluster
        .members
        .iter()
        .filter(|&&id| id != cluster.anchor)
        .map(|&id| page.confidence(id))
        .collect();
    let confidence = confidence::aggregate(page.confidence(cluster.anchor), &others, &completeness, cfg);

    Some(Product {
        id: String::new(),
        name: cleaned.name.unwrap_or_else(|| cfg.placeholder_name.clone()),
        description: cleaned.description,
        price: headline.value,
        unit_price: unit.as_ref().map(|u| u.value),
        unit: unit.map(|u| u.unit),
        currency: headline.currency.clone(),
        special_offer: cleaned.special_offer,
        quantity: cleaned.quantity.map(|q| q.text),
        position: cluster.bounding_box,
        confidence,
    })
}
