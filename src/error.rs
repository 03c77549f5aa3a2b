use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("no geocoding API key configured, set MAPBOX_API_KEY")]
    MissingApiKey,
    #[error("geocoding service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("geocoding service answered {status}")]
    Status { status: reqwest::StatusCode },
    #[error("no match found for {0:?}")]
    NoMatch(String),
    #[error("invalid geocoding url: {0}")]
    Url(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("overpass request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("overpass rate limit hit on {endpoint}, try again later")]
    RateLimited { endpoint: String },
    #[error("overpass answered {status}: {snippet}")]
    Status {
        status: reqwest::StatusCode,
        snippet: String,
    },
    #[error("malformed overpass response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("query returned no elements")]
    Empty,
}

/// Raised when a feature's `tags` is present but not a mapping. Never fatal,
/// the feature is treated as untagged.
#[derive(Error, Debug)]
#[error("tags of {feature} are not a mapping: {found}")]
pub struct MalformedTagError {
    pub feature: String,
    pub found: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parsing failed: {0}")]
    Toml(#[from] toml::de::Error),
}
