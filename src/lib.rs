pub mod config;
pub mod envelope;
pub mod error;
pub mod export;
pub mod geocode;
pub mod normalize;
pub mod overpass;
pub mod pipeline;
pub mod query;
pub mod session;
pub mod util;
pub mod view;

use config::Config;
use geocode::Geocoder;
use overpass::OverpassClient;
use session::{Command, Event};

/// The remote collaborators of a session, sharing one HTTP client.
#[derive(Clone)]
pub struct Services {
    geocoder: Geocoder,
    overpass: OverpassClient,
}

impl Services {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.overpass_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Services {
            geocoder: Geocoder::new(client.clone(), config),
            overpass: OverpassClient::new(client, config),
        })
    }

    /// Settings line queries have to be built with.
    pub fn query_settings(&self) -> &str {
        self.overpass.settings()
    }

    /// Runs a command and turns its outcome into the event reporting it.
    pub async fn run(&self, command: Command) -> Event {
        match command {
            Command::Geocode { place } => Event::Geocoded(self.geocoder.locate(&place).await),
            Command::Fetch { endpoint, query } => Event::Fetched(
                self.overpass
                    .fetch(endpoint, &query)
                    .await
                    .map(normalize::normalize),
            ),
        }
    }
}
