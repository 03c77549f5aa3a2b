use std::{collections::HashMap, path::PathBuf, str::FromStr, time::Duration};

use tracing::{debug, warn};

use crate::error::ConfigError;

const API_KEY_NAME: &str = "MAPBOX_API_KEY";
const DEFAULT_SECRETS_FILE: &str = "secrets.toml";
const DEFAULT_TIMEOUT_S: u64 = 10;
const DEFAULT_MAX_PAUSE_S: u64 = 60;

/// Session configuration, handed to the geocoder and the Overpass client when
/// they are built.
#[derive(Debug, Clone)]
pub struct Config {
    pub mapbox_api_key: Option<String>,
    pub overpass_timeout: Duration,
    pub overpass_memory: Option<u64>,
    pub max_rate_limit_pause: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mapbox_api_key: None,
            overpass_timeout: Duration::from_secs(DEFAULT_TIMEOUT_S),
            overpass_memory: None,
            max_rate_limit_pause: Duration::from_secs(DEFAULT_MAX_PAUSE_S),
            user_agent: format!("osm-explorer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Reads the environment and the optional secrets file. Never fails: a
    /// missing key only surfaces once geocoding is attempted.
    pub fn load() -> Self {
        let secrets_path = std::env::var("OSM_EXPLORER_SECRETS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRETS_FILE));

        let mapbox_api_key = std::env::var(API_KEY_NAME)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| match read_secrets(&secrets_path) {
                Ok(secrets) => secrets.get(API_KEY_NAME).cloned(),
                Err(ConfigError::Io(e)) => {
                    debug!("no secrets file at {}: {e}", secrets_path.display());
                    None
                }
                Err(e) => {
                    warn!("ignoring secrets file {}: {e}", secrets_path.display());
                    None
                }
            });

        let defaults = Config::default();
        Config {
            mapbox_api_key,
            overpass_timeout: env_parse("OSM_EXPLORER_TIMEOUT_S")
                .map(Duration::from_secs)
                .unwrap_or(defaults.overpass_timeout),
            overpass_memory: env_parse("OSM_EXPLORER_MAXSIZE"),
            max_rate_limit_pause: env_parse("OSM_EXPLORER_MAX_PAUSE_S")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_rate_limit_pause),
            user_agent: defaults.user_agent,
        }
    }
}

fn read_secrets(path: &std::path::Path) -> Result<HashMap<String, String>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_secrets(&raw)
}

/// Only top level string entries are kept, anything else in the file is
/// ignored.
fn parse_secrets(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let table: toml::Table = raw.parse()?;

    Ok(table
        .into_iter()
        .filter_map(|(k, v)| match v {
            toml::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}
