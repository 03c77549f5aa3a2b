use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    config::Config,
    envelope::LatLon,
    error::GeocodeError,
};

const MAPBOX_PLACES_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places/";

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    #[serde(default)]
    place_name: String,
    /// `[lon, lat]`
    #[serde(default)]
    center: Option<[f64; 2]>,
}

/// Forward geocoder backed by the Mapbox places API.
#[derive(Clone)]
pub struct Geocoder {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl Geocoder {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Geocoder {
            client,
            api_key: config.mapbox_api_key.clone(),
        }
    }

    pub async fn locate(&self, place: &str) -> Result<LatLon, GeocodeError> {
        let key = self.api_key.as_deref().ok_or(GeocodeError::MissingApiKey)?;

        let place = place.trim();
        if place.is_empty() {
            return Err(GeocodeError::NoMatch(place.to_string()));
        }

        let url = places_url(place)?;
        debug!("geocoding {place:?}");

        let response = self
            .client
            .get(url)
            .query(&[("access_token", key), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status { status });
        }

        let body: MapboxResponse = response.json().await?;
        let point = first_match(body).ok_or_else(|| GeocodeError::NoMatch(place.to_string()))?;
        info!("geocoded {place:?} to {}, {}", point.lat, point.lon);

        Ok(point)
    }
}

fn places_url(place: &str) -> Result<reqwest::Url, GeocodeError> {
    let mut url =
        reqwest::Url::parse(MAPBOX_PLACES_URL).map_err(|e| GeocodeError::Url(e.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| GeocodeError::Url(MAPBOX_PLACES_URL.to_string()))?
        .pop_if_empty()
        .push(&format!("{place}.json"));

    Ok(url)
}

fn first_match(response: MapboxResponse) -> Option<LatLon> {
    let feature = response.features.into_iter().next()?;
    debug!("best match {:?}", feature.place_name);

    let [lon, lat] = feature.center?;
    Some(LatLon::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_url_escapes_the_query() {
        let url = places_url("Auckland, New Zealand").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/Auckland,%20New%20Zealand.json"
        );

        let url = places_url("a/b").unwrap();
        assert!(url.path().ends_with("/a%2Fb.json"));
    }

    #[test]
    fn first_match_swaps_to_lat_lon() {
        let response: MapboxResponse = serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {"place_name": "Auckland, New Zealand", "center": [174.7633, -36.8485]},
                {"place_name": "Auckland Park", "center": [28.0, -26.2]}
            ]
        }))
        .unwrap();

        assert_eq!(first_match(response), Some(LatLon::new(-36.8485, 174.7633)));
    }

    #[test]
    fn no_features_is_no_match() {
        let response: MapboxResponse = serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": []
        }))
        .unwrap();

        assert_eq!(first_match(response), None);
    }

    #[test]
    fn match_without_center_is_no_match() {
        let response: MapboxResponse = serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [{"place_name": "Somewhere"}]
        }))
        .unwrap();

        assert_eq!(first_match(response), None);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let geocoder = Geocoder::new(reqwest::Client::new(), &Config::default());
        let err = geocoder.locate("Auckland").await.unwrap_err();
        assert!(matches!(err, GeocodeError::MissingApiKey));
    }
}
