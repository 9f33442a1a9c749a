//! GADM administrative boundaries client.
//!
//! GADM publishes per-country boundary files at several administrative
//! levels. Level 0 is the national outline, one feature per country (some
//! countries ship disjoint parts as a single MultiPolygon).
//!
//! # API Reference
//!
//! See: <https://gadm.org/download_country.html>

use geo_types::Geometry;
use geojson::FeatureCollection;
use serde_json::Value;

use super::http::Downloader;
use crate::country::Country;
use crate::error::{Result, StarterKitError};
use crate::gpkg::Feature;

const GADM_BASE: &str = "https://geodata.ucdavis.edu/gadm/gadm4.1";

/// Client for the GADM 4.1 boundary downloads.
#[derive(Clone)]
pub struct GadmClient {
    http: Downloader,
    base_url: String,
}

impl Default for GadmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GadmClient {
    pub fn new() -> Self {
        Self::with_base_url(GADM_BASE)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: Downloader::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Share a downloader (and its connection pool).
    pub fn with_downloader(mut self, http: Downloader) -> Self {
        self.http = http;
        self
    }

    /// URL of the level-0 GeoJSON for a country.
    pub fn level0_url(&self, country: &Country) -> String {
        format!("{}/json/gadm41_{}_0.json", self.base_url, country.iso3)
    }

    /// Fetch the national boundary as features.
    ///
    /// Feature properties (e.g. `GID_0`, `COUNTRY`) are kept as text;
    /// null properties are dropped.
    pub async fn get_boundary(&self, country: &Country) -> Result<Vec<Feature>> {
        let collection: FeatureCollection = self.http.get_json(&self.level0_url(country)).await?;
        let features = collection_to_features(collection)?;

        if features.is_empty() {
            return Err(StarterKitError::Geometry(format!(
                "no boundary features for {}",
                country.iso3
            )));
        }
        Ok(features)
    }
}

fn collection_to_features(collection: FeatureCollection) -> Result<Vec<Feature>> {
    let mut features = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry.value)?;

        let mut out = Feature::new(geometry);
        for (key, value) in feature.properties.unwrap_or_default() {
            match value {
                Value::Null => {}
                Value::String(s) => out = out.with_property(&key, s),
                other => out = out.with_property(&key, other.to_string()),
            }
        }
        features.push(out);
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::resolve_country;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kenya_outline() -> serde_json::Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "GID_0": "KEN", "COUNTRY": "Kenya", "NOTE": null, "LEVEL": 0 },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[34.0, -4.0], [41.0, -4.0], [41.0, 4.0], [34.0, 4.0], [34.0, -4.0]]]]
                }
            }]
        })
    }

    #[test]
    fn test_level0_url() {
        let client = GadmClient::with_base_url("http://localhost:1234/");
        let kenya = resolve_country("KEN").unwrap();
        assert_eq!(
            client.level0_url(&kenya),
            "http://localhost:1234/json/gadm41_KEN_0.json"
        );
    }

    #[tokio::test]
    async fn test_get_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/gadm41_KEN_0.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(kenya_outline()))
            .mount(&server)
            .await;

        let client = GadmClient::with_base_url(&server.uri());
        let kenya = resolve_country("KEN").unwrap();
        let features = client.get_boundary(&kenya).await.unwrap();

        assert_eq!(features.len(), 1);
        assert!(matches!(features[0].geometry, Geometry::MultiPolygon(_)));
        assert_eq!(features[0].properties.get("GID_0").map(String::as_str), Some("KEN"));
        assert_eq!(features[0].properties.get("LEVEL").map(String::as_str), Some("0"));
        assert!(!features[0].properties.contains_key("NOTE"));
    }

    #[tokio::test]
    async fn test_get_boundary_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GadmClient::with_base_url(&server.uri());
        let kenya = resolve_country("KEN").unwrap();
        let err = client.get_boundary(&kenya).await.unwrap_err();

        assert!(matches!(err, StarterKitError::Download { .. }));
    }

    #[tokio::test]
    async fn test_empty_collection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "FeatureCollection",
                "features": []
            })))
            .mount(&server)
            .await;

        let client = GadmClient::with_base_url(&server.uri());
        let kenya = resolve_country("KEN").unwrap();
        assert!(client.get_boundary(&kenya).await.is_err());
    }
}
