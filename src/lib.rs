//! Turns OCR text fragments from a retail leaflet page into structured
//! product records: price detection, spatial clustering around prices,
//! then field extraction per cluster.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;

pub use crate::config::ExtractorConfig;
pub use crate::error::ExtractError;
pub use crate::model::{parse_fragments, BoundingBox, Extraction, Product, TextFragment};
pub use crate::parser::Extractor;
