use thiserror::Error;

/// Conditions that abort a call. Leaflet content never produces one of these;
/// odd text and geometry only lower confidence or the product count.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("fragment input is not a fragment list: {0}")]
    MalformedInput(#[source] serde_json::Error),

    #[error("failed to load configuration: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
