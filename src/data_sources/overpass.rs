//! Overpass API client for OpenStreetMap road networks.
//!
//! The query selects drivable ways (public roads open to motor vehicles,
//! excluding areas, parking aisles and private service roads) inside the
//! country's national administrative area, and returns each way with its
//! tags and inline geometry.
//!
//! # API Reference
//!
//! See: <https://wiki.openstreetmap.org/wiki/Overpass_API>
//!
//! # Rate Limits
//!
//! The public instance allows two concurrent slots per client and may
//! answer `429 Too Many Requests`; large countries take minutes.

use std::collections::BTreeMap;

use geo_types::{Coord, LineString};
use serde::Deserialize;
use tracing::debug;

use crate::country::Country;
use crate::error::{Result, StarterKitError};
use crate::roads::{RoadEdge, RoadNetwork};

const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Server-side query timeout, seconds.
const QUERY_TIMEOUT_SECS: u32 = 900;

/// Drivable-network way filter (public, motor-vehicle accessible roads).
const DRIVE_FILTER: &str = concat!(
    r#"["highway"]["area"!~"yes"]"#,
    r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track"]"#,
    r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
    r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
    r#"["access"!~"private"]"#,
);

/// Client for an Overpass API interpreter endpoint.
#[derive(Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
}

impl Default for OverpassClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OverpassClient {
    pub fn new() -> Self {
        Self::with_url(OVERPASS_URL)
    }

    /// Create a client against a custom interpreter URL (for testing).
    pub fn with_url(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    /// Share a client (and its connection pool).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Overpass QL selecting the drivable network of a country.
    pub fn drive_query(country: &Country) -> String {
        format!(
            "[out:json][timeout:{QUERY_TIMEOUT_SECS}];\n\
             area[\"ISO3166-1:alpha3\"=\"{}\"][\"admin_level\"=\"2\"]->.country;\n\
             way{DRIVE_FILTER}(area.country);\n\
             out tags geom;",
            country.iso3
        )
    }

    /// Fetch the drivable road network of a country, one edge per way.
    pub async fn get_drive_network(&self, country: &Country) -> Result<RoadNetwork> {
        let query = Self::drive_query(country);
        let response = self
            .client
            .post(&self.url)
            .form(&[("data", query.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StarterKitError::Download {
                url: self.url.clone(),
                status,
            });
        }

        let data = response.json::<OverpassResponse>().await?;
        if let Some(remark) = data.failure() {
            return Err(StarterKitError::Overpass(remark.to_string()));
        }
        let network = data.into_network();
        debug!(country = %country.iso3, edges = network.len(), "Overpass network received");
        Ok(network)
    }
}

/// Overpass JSON response.
#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,

    /// Set when the server aborted the query; `elements` is then partial.
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub geometry: Vec<OverpassPoint>,
}

#[derive(Debug, Deserialize)]
pub struct OverpassPoint {
    pub lat: f64,
    pub lon: f64,
}

impl OverpassResponse {
    /// The remark of an aborted query, if any.
    pub fn failure(&self) -> Option<&str> {
        self.remark
            .as_deref()
            .map(str::trim)
            .filter(|r| r.starts_with("runtime error") || r.starts_with("runtime remark"))
    }

    /// Convert ways with a `highway` tag and at least two points into edges.
    pub fn into_network(self) -> RoadNetwork {
        let edges = self
            .elements
            .into_iter()
            .filter(|e| e.element_type == "way" && e.geometry.len() >= 2)
            .filter_map(|mut e| {
                let highway = e.tags.remove("highway")?;
                let geometry: LineString<f64> = e
                    .geometry
                    .iter()
                    .map(|p| Coord { x: p.lon, y: p.lat })
                    .collect();
                Some(RoadEdge {
                    osm_id: e.id,
                    highway,
                    tags: e.tags,
                    geometry,
                })
            })
            .collect();
        RoadNetwork::new(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::resolve_country;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_response() -> serde_json::Value {
        serde_json::json!({
            "version": 0.6,
            "elements": [
                {
                    "type": "way", "id": 101,
                    "tags": { "highway": "primary", "name": "Mombasa Road" },
                    "geometry": [{ "lat": -1.30, "lon": 36.82 }, { "lat": -1.31, "lon": 36.84 }]
                },
                {
                    "type": "way", "id": 102,
                    "tags": { "highway": "residential" },
                    "geometry": [{ "lat": -1.28, "lon": 36.80 }, { "lat": -1.28, "lon": 36.81 }]
                },
                {
                    "type": "way", "id": 103,
                    "tags": { "highway": "tertiary" },
                    "geometry": [{ "lat": -1.28, "lon": 36.80 }]
                },
                {
                    "type": "node", "id": 5, "tags": { "highway": "traffic_signals" }
                }
            ]
        })
    }

    #[test]
    fn test_drive_query() {
        let kenya = resolve_country("KEN").unwrap();
        let query = OverpassClient::drive_query(&kenya);
        assert!(query.starts_with("[out:json]"));
        assert!(query.contains(r#"area["ISO3166-1:alpha3"="KEN"]["admin_level"="2"]"#));
        assert!(query.contains(r#"["access"!~"private"]"#));
        assert!(query.ends_with("out tags geom;"));
    }

    #[test]
    fn test_into_network_skips_nodes_and_degenerate_ways() {
        let response: OverpassResponse = serde_json::from_value(sample_response()).unwrap();
        let network = response.into_network();

        assert_eq!(network.len(), 2);
        let primary = &network.edges[0];
        assert_eq!(primary.osm_id, 101);
        assert_eq!(primary.highway, "primary");
        assert_eq!(primary.tags.get("name").map(String::as_str), Some("Mombasa Road"));
        assert!(!primary.tags.contains_key("highway"));
        assert_eq!(primary.geometry.0[0], Coord { x: 36.82, y: -1.30 });
    }

    #[tokio::test]
    async fn test_get_drive_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .and(body_string_contains("data="))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .mount(&server)
            .await;

        let client = OverpassClient::with_url(&format!("{}/api/interpreter", server.uri()));
        let kenya = resolve_country("KEN").unwrap();
        let network = client.get_drive_network(&kenya).await.unwrap();

        assert_eq!(network.len(), 2);
    }

    #[test]
    fn test_informational_remark_is_not_a_failure() {
        let response: OverpassResponse = serde_json::from_value(serde_json::json!({
            "elements": [],
            "remark": "note: area query used cached data"
        }))
        .unwrap();
        assert_eq!(response.failure(), None);
    }

    #[tokio::test]
    async fn test_timed_out_query_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": 0.6,
                "elements": [],
                "remark": "runtime error: Query timed out in \"query\" at line 3 after 901 seconds."
            })))
            .mount(&server)
            .await;

        let client = OverpassClient::with_url(&server.uri());
        let kenya = resolve_country("KEN").unwrap();
        let err = client.get_drive_network(&kenya).await.unwrap_err();

        match err {
            StarterKitError::Overpass(remark) => assert!(remark.contains("timed out")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = OverpassClient::with_url(&server.uri());
        let kenya = resolve_country("KEN").unwrap();
        let err = client.get_drive_network(&kenya).await.unwrap_err();

        match err {
            StarterKitError::Download { status, .. } => assert_eq!(status.as_u16(), 429),
            other => panic!("unexpected error: {other}"),
        }
    }
}
