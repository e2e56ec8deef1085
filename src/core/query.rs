//! HTTP query facade over a running routing endpoint
//!
//! Thin client for the OSRM HTTP API: nearest-point lookup, single routes,
//! and many-to-many duration tables, with parameter normalization and a
//! liveness probe. 4xx responses carry a machine-readable `{code, message}`
//! body; per-point lookups treat those as expected-empty so batch operations
//! can report partial results.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::error::{Error, Result};
use crate::core::points::Coord;

/// Global HTTP client shared by every endpoint
static GLOBAL_CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(20)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!(
            "butterfly-scenario/{}",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to create HTTP client")
});

/// OSRM joins multi-value parameters (sources, destinations, bearings,
/// radiuses, hints, timestamps) with semicolons
pub fn join_multi<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<_>>()
        .join(";")
}

/// Boolean flags must be serialized lower-case
fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Snapped waypoint returned by nearest-point lookups
#[derive(Debug, Clone, Deserialize)]
pub struct Waypoint {
    #[serde(default)]
    pub name: String,
    pub distance: f64,
    /// Snapped position as a GeoJSON-ordered [lon, lat] pair
    pub location: [f64; 2],
    pub hint: Option<String>,
    #[serde(default)]
    pub nodes: Vec<u64>,
}

impl Waypoint {
    pub fn snapped(&self) -> Coord {
        Coord::new(self.location[0], self.location[1])
    }
}

/// One computed route
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    /// Travel time in seconds
    pub duration: f64,
    /// Travel distance in meters
    pub distance: f64,
    /// Opaque GeoJSON LineString
    pub geometry: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NearestResponse {
    waypoints: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    durations: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Either a parsed payload or the server's machine-readable rejection
enum ApiOutcome<T> {
    Parsed(T),
    Rejected { code: String, message: String },
}

/// HTTP client bound to one scenario's endpoint
#[derive(Debug, Clone)]
pub struct QueryClient {
    base_url: String,
    version: String,
    profile: String,
}

impl QueryClient {
    /// Client for a server on the local loopback
    pub fn new(port: u16) -> Self {
        Self::with_base_url(format!("http://127.0.0.1:{port}"))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            version: "v1".to_string(),
            // osrm-routed serves whatever profile it was built with and
            // ignores this segment, but the URL shape requires one.
            profile: "profile".to_string(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Snap a coordinate to the `number` nearest network positions
    ///
    /// Returns `Ok(None)` when the server rejects the query (e.g. no segment
    /// in range); the rejection is logged as a warning.
    pub async fn nearest(
        &self,
        coord: impl Into<Coord>,
        number: usize,
    ) -> Result<Option<Vec<Waypoint>>> {
        let coord = coord.into();
        let url = format!(
            "{}/nearest/{}/{}/{}",
            self.base_url,
            self.version,
            self.profile,
            coord.to_param()
        );
        let query = [("number".to_string(), number.to_string())];

        match self.get::<NearestResponse>(&url, &query).await? {
            ApiOutcome::Parsed(resp) => Ok(Some(resp.waypoints)),
            ApiOutcome::Rejected { code, message } => {
                log::warn!("HTTP 400: {}: {}", code, message);
                Ok(None)
            }
        }
    }

    /// Compute a single route through all given waypoints in order
    ///
    /// Geometry comes back as an opaque GeoJSON LineString. `Ok(None)` when
    /// the server cannot route the pair (logged as a warning).
    pub async fn route(&self, coords: &[Coord]) -> Result<Option<Route>> {
        if coords.len() < 2 {
            return Err(Error::Configuration(
                "a route needs at least two coordinates".to_string(),
            ));
        }

        let path = join_multi(&coords.iter().map(Coord::to_param).collect::<Vec<_>>());
        let url = format!(
            "{}/route/{}/{}/{}",
            self.base_url, self.version, self.profile, path
        );
        let query = [
            ("overview".to_string(), "full".to_string()),
            ("geometries".to_string(), "geojson".to_string()),
            ("alternatives".to_string(), bool_param(false).to_string()),
        ];

        match self.get::<RouteResponse>(&url, &query).await? {
            ApiOutcome::Parsed(resp) => Ok(resp.routes.into_iter().next()),
            ApiOutcome::Rejected { code, message } => {
                log::warn!("HTTP 400: {}: {}", code, message);
                Ok(None)
            }
        }
    }

    /// Dense all-pairs duration table, origins as rows and destinations as
    /// columns; unreachable pairs come back as NaN
    ///
    /// A request larger than the cap the server was started with is rejected
    /// deterministically and surfaces as a configuration error.
    pub async fn table(&self, origins: &[Coord], dests: &[Coord]) -> Result<Vec<Vec<f64>>> {
        if origins.is_empty() || dests.is_empty() {
            return Err(Error::Configuration(
                "table requires at least one origin and one destination".to_string(),
            ));
        }

        let coords: Vec<String> = origins
            .iter()
            .chain(dests.iter())
            .map(Coord::to_param)
            .collect();
        let sources: Vec<String> = (0..origins.len()).map(|i| i.to_string()).collect();
        let destinations: Vec<String> = (origins.len()..coords.len())
            .map(|i| i.to_string())
            .collect();

        let url = format!(
            "{}/table/{}/{}/{}",
            self.base_url,
            self.version,
            self.profile,
            join_multi(&coords)
        );
        let query = [
            ("sources".to_string(), join_multi(&sources)),
            ("destinations".to_string(), join_multi(&destinations)),
        ];

        match self.get::<TableResponse>(&url, &query).await? {
            ApiOutcome::Parsed(resp) => {
                let rows = resp.durations;
                if rows.len() != origins.len()
                    || rows.iter().any(|row| row.len() != dests.len())
                {
                    return Err(Error::Http(format!(
                        "table response has wrong shape: expected {}x{}",
                        origins.len(),
                        dests.len()
                    )));
                }
                Ok(rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|cell| cell.unwrap_or(f64::NAN))
                            .collect()
                    })
                    .collect())
            }
            ApiOutcome::Rejected { code, message } if code == "TooBig" => {
                Err(Error::Configuration(format!(
                    "requested table of {}x{} exceeds the cap the server was started with: {}",
                    origins.len(),
                    dests.len(),
                    message
                )))
            }
            ApiOutcome::Rejected { code, message } => Err(Error::Query { code, message }),
        }
    }

    /// Whether the endpoint is actually answering queries
    ///
    /// A trivial nearest lookup; any parsed HTTP answer counts, including a
    /// rejection, since that still proves the server is serving. Distinct
    /// from process-level readiness.
    pub async fn is_alive(&self) -> bool {
        self.nearest(Coord::new(0.0, 0.0), 1).await.is_ok()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<ApiOutcome<T>> {
        let response = GLOBAL_CLIENT.get(url).query(query).send().await?;
        let status = response.status();

        if status.is_client_error() {
            let body = response
                .json::<ErrorBody>()
                .await
                .unwrap_or_else(|_| ErrorBody {
                    code: format!("HTTP{}", status.as_u16()),
                    message: String::new(),
                });
            return Ok(ApiOutcome::Rejected {
                code: body.code,
                message: body.message,
            });
        }
        if !status.is_success() {
            return Err(Error::Http(format!("{url} returned {status}")));
        }

        Ok(ApiOutcome::Parsed(response.json::<T>().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> QueryClient {
        QueryClient::with_base_url(server.uri()).with_profile("walk")
    }

    #[test]
    fn test_join_multi_and_bool_param() {
        assert_eq!(join_multi(&["0", "1", "2"]), "0;1;2");
        assert_eq!(join_multi(&[] as &[&str]), "");
        assert_eq!(bool_param(true), "true");
        assert_eq!(bool_param(false), "false");
    }

    #[tokio::test]
    async fn test_nearest_parses_waypoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nearest/v1/walk/31.14,-26.52"))
            .and(query_param("number", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "waypoints": [
                    {"name": "R23", "distance": 4.2,
                     "location": [31.1401, -26.5199],
                     "hint": "abc", "nodes": [10, 11]},
                    {"name": "", "distance": 9.9,
                     "location": [31.141, -26.521], "hint": null}
                ]
            })))
            .mount(&server)
            .await;

        let waypoints = client_for(&server)
            .nearest((31.14, -26.52), 2)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].name, "R23");
        assert_eq!(waypoints[0].snapped(), Coord::new(31.1401, -26.5199));
        assert!(waypoints[1].nodes.is_empty());
    }

    #[tokio::test]
    async fn test_nearest_rejection_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "NoSegment",
                "message": "Could not find a matching segment"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server).nearest((0.0, 0.0), 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_route_returns_first_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/route/v1/walk/31.1,-26.5;31.2,-26.6"))
            .and(query_param("overview", "full"))
            .and(query_param("geometries", "geojson"))
            .and(query_param("alternatives", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "routes": [{
                    "duration": 1234.5,
                    "distance": 1813.0,
                    "geometry": {"type": "LineString",
                                 "coordinates": [[31.1, -26.5], [31.2, -26.6]]}
                }]
            })))
            .mount(&server)
            .await;

        let route = client_for(&server)
            .route(&[Coord::new(31.1, -26.5), Coord::new(31.2, -26.6)])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(route.duration, 1234.5);
        assert_eq!(route.distance, 1813.0);
        assert_eq!(route.geometry["type"], "LineString");
    }

    #[tokio::test]
    async fn test_route_requires_two_coords() {
        let server = MockServer::start().await;
        let result = client_for(&server).route(&[Coord::new(0.0, 0.0)]).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_table_indices_and_nan_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/table/v1/walk/0,0;1,0;0,1;1,1;2,2"))
            .and(query_param("sources", "0;1;2"))
            .and(query_param("destinations", "3;4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "durations": [[10.0, 20.0], [30.0, null], [50.0, 60.0]]
            })))
            .mount(&server)
            .await;

        let origins = vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(0.0, 1.0),
        ];
        let dests = vec![Coord::new(1.0, 1.0), Coord::new(2.0, 2.0)];

        let matrix = client_for(&server).table(&origins, &dests).await.unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[0], vec![10.0, 20.0]);
        assert!(matrix[1][1].is_nan(), "unreachable pair must be NaN");
        assert_eq!(matrix[2], vec![50.0, 60.0]);
    }

    #[tokio::test]
    async fn test_table_too_big_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "TooBig",
                "message": "Too many table coordinates"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .table(&[Coord::new(0.0, 0.0)], &[Coord::new(1.0, 1.0)])
            .await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_is_alive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "InvalidQuery", "message": "nope"
            })))
            .mount(&server)
            .await;

        // A rejection still proves the server is answering.
        assert!(client_for(&server).is_alive().await);

        let dead = QueryClient::new(allocate_dead_port());
        assert!(!dead.is_alive().await);
    }

    fn allocate_dead_port() -> u16 {
        // Bind and release so nothing is listening there.
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    }
}
