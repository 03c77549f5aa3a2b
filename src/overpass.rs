use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{config::Config, error::FetchError, query::Endpoint};

/// How long to wait before asking the status endpoint again when every slot
/// is taken by a running query.
const BUSY_RECHECK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMember {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(rename = "ref")]
    pub id: i64,
    #[serde(default)]
    pub role: String,
}

/// One element of an Overpass JSON response. `tags` is kept untyped, its
/// shape is checked during normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub members: Vec<RawMember>,
    #[serde(default)]
    pub tags: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<RawElement>,
    remark: Option<String>,
}

#[derive(Serialize)]
struct OverpassForm<'a> {
    data: &'a str,
}

/// Query slot availability as reported by the `status` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Available,
    AvailableIn(Duration),
    Busy,
}

/// Parses the plain text of an Overpass `status` page.
pub fn parse_status(text: &str) -> Option<SlotStatus> {
    let mut next_slot: Option<Duration> = None;
    let mut busy = false;

    for line in text.lines().map(str::trim) {
        if let Some(limit) = line.strip_prefix("Rate limit:") {
            if limit.trim() == "0" {
                return Some(SlotStatus::Available);
            }
        } else if line.ends_with("slots available now.") || line.ends_with("slot available now.") {
            let count = line.split(' ').next().and_then(|n| n.parse::<u32>().ok());
            if count.unwrap_or(0) > 0 {
                return Some(SlotStatus::Available);
            }
        } else if line.starts_with("Slot available after:") {
            let secs = line
                .rsplit_once(", in ")
                .and_then(|(_, rest)| rest.split(' ').next())
                .and_then(|n| n.parse::<u64>().ok());

            if let Some(secs) = secs {
                let wait = Duration::from_secs(secs);
                next_slot = Some(next_slot.map_or(wait, |w| w.min(wait)));
            }
        } else if line.starts_with("Currently running queries") {
            busy = true;
        }
    }

    match next_slot {
        Some(wait) => Some(SlotStatus::AvailableIn(wait)),
        None if busy => Some(SlotStatus::Busy),
        None => None,
    }
}

/// Talks to the Overpass endpoints. Built once per session from [`Config`].
#[derive(Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    settings: String,
    max_pause: Duration,
}

impl OverpassClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        OverpassClient {
            client,
            settings: crate::query::settings(config.overpass_timeout, config.overpass_memory),
            max_pause: config.max_rate_limit_pause,
        }
    }

    /// Settings line every query sent by this client should start with.
    pub fn settings(&self) -> &str {
        &self.settings
    }

    pub async fn fetch(
        &self,
        endpoint: Endpoint,
        query: &str,
    ) -> Result<Vec<RawElement>, FetchError> {
        if endpoint.rate_limited() {
            self.wait_for_slot(endpoint).await;
        }

        info!("querying {}", endpoint.interpreter_url());
        debug!("query: {query}");

        let response = self
            .client
            .post(endpoint.interpreter_url())
            .form(&OverpassForm { data: query })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                snippet: snippet(&body),
            });
        }

        let elements = parse_response(&body)?;
        info!("received {} elements", elements.len());

        Ok(elements)
    }

    /// Waits until the endpoint advertises a free query slot, never longer
    /// than the configured maximum pause. Status failures are not fatal, the
    /// query is sent anyway and the endpoint decides.
    async fn wait_for_slot(&self, endpoint: Endpoint) {
        let mut waited = Duration::ZERO;

        while waited < self.max_pause {
            let status = match self.slot_status(endpoint).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    debug!("unrecognized status page, not waiting");
                    return;
                }
                Err(e) => {
                    warn!("could not read overpass status: {e}");
                    return;
                }
            };

            let pause = match status {
                SlotStatus::Available => return,
                SlotStatus::AvailableIn(pause) => pause,
                SlotStatus::Busy => BUSY_RECHECK,
            };
            let pause = pause.min(self.max_pause - waited);

            info!("waiting {}s for an overpass slot", pause.as_secs());
            tokio::time::sleep(pause).await;
            waited += pause;

            if matches!(status, SlotStatus::AvailableIn(_)) {
                return;
            }
        }
    }

    async fn slot_status(&self, endpoint: Endpoint) -> reqwest::Result<Option<SlotStatus>> {
        let text = self
            .client
            .get(endpoint.status_url())
            .send()
            .await?
            .text()
            .await?;

        Ok(parse_status(&text))
    }
}

/// Decodes a successful response body. Runtime errors reported by Overpass
/// in `remark` are logged, whatever elements came with them are kept.
pub fn parse_response(body: &str) -> Result<Vec<RawElement>, FetchError> {
    let response: OverpassResponse = serde_json::from_str(body)?;

    if let Some(remark) = response.remark {
        warn!("overpass remark: {remark}");
    }
    if response.elements.is_empty() {
        return Err(FetchError::Empty);
    }

    Ok(response.elements)
}

fn snippet(body: &str) -> String {
    const MAX: usize = 256;

    if body.len() <= MAX {
        return body.trim().to_string();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", body[..end].trim())
}
