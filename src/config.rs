use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

const ENV_PREFIX: &str = "LEAFLET";

/// Tuning knobs for one extractor. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Fragments below this OCR confidence are dropped before clustering.
    pub confidence_threshold: f64,
    /// Cluster radius as a multiple of the median fragment height.
    pub clustering_radius_scale: f64,
    /// Fixed radius in pixels; overrides the scale when set.
    pub clustering_radius_px: Option<f64>,
    pub horizontal_weight: f64,
    pub vertical_weight: f64,
    pub decimal_separator: char,
    /// Longest name kept before the rest spills into the description.
    pub max_name_length: usize,
    /// Anchors priced above this are treated as misread SKUs or phone numbers.
    pub price_sanity_ceiling: f64,
    /// Currency a bare `$` resolves to.
    pub dollar_currency: String,
    pub allow_bare_prices: bool,
    pub anchor_weight: f64,
    pub member_weight: f64,
    pub structure_weight: f64,
    /// How far a product may sit above its weakest fragment's confidence.
    pub confidence_smoothing: f64,
    pub unit_price_tolerance: f64,
    pub placeholder_name: String,
    pub id_prefix: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            confidence_threshold: 0.5,
            clustering_radius_scale: 3.0,
            clustering_radius_px: None,
            horizontal_weight: 1.5,
            vertical_weight: 1.0,
            decimal_separator: '.',
            max_name_length: 60,
            price_sanity_ceiling: 10_000.0,
            dollar_currency: "AUD".to_string(),
            allow_bare_prices: true,
            anchor_weight: 0.5,
            member_weight: 0.3,
            structure_weight: 0.2,
            confidence_smoothing: 0.25,
            unit_price_tolerance: 0.10,
            placeholder_name: "Unnamed item".to_string(),
            id_prefix: "prod".to_string(),
        }
    }
}

impl ExtractorConfig {
    /// Defaults, then the optional TOML file, then `LEAFLET_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ExtractError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        let cfg: ExtractorConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        let fail = |msg: String| Err(ExtractError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return fail(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(self.clustering_radius_scale > 0.0 && self.clustering_radius_scale.is_finite()) {
            return fail(format!(
                "clustering_radius_scale must be positive, got {}",
                self.clustering_radius_scale
            ));
        }
        if let Some(px) = self.clustering_radius_px {
            if !(px >= 0.0 && px.is_finite()) {
                return fail(format!("clustering_radius_px must be non-negative, got {}", px));
            }
        }
        if !(self.horizontal_weight > 0.0 && self.vertical_weight > 0.0) {
            return fail("direction weights must be positive".to_string());
        }
        if self.decimal_separator != '.' && self.decimal_separator != ',' {
            return fail(format!(
                "decimal_separator must be '.' or ',', got {:?}",
                self.decimal_separator
            ));
        }
        if !(self.price_sanity_ceiling > 0.0) {
            return fail(format!(
                "price_sanity_ceiling must be positive, got {}",
                self.price_sanity_ceiling
            ));
        }
        let weights = [self.anchor_weight, self.member_weight, self.structure_weight];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) || weights.iter().sum::<f64>() <= 0.0 {
            return fail("confidence weights must be non-negative and not all zero".to_string());
        }
        if self.confidence_smoothing < 0.0 || self.unit_price_tolerance < 0.0 {
            return fail("confidence_smoothing and unit_price_tolerance must be non-negative".to_string());
        }
        if self.max_name_length == 0 {
            return fail("max_name_length must be at least 1".to_string());
        }
        Ok(())
    }

    /// Separator grouping thousands for the configured decimal separator.
    pub fn thousands_separator(&self) -> char {
        if self.decimal_separator == ',' {
            '.'
        } else {
            ','
        }
    }
}

// ── Tests ──
