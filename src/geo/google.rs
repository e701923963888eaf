use crate::geo::{round_up_minutes, Commute, GeoEnricher};
use crate::models::Coordinates;
use crate::store::Metric;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const GOOGLE_MAPS_URL: &str = "https://maps.googleapis.com";
pub const SHIBUYA_STATION: &str = "渋谷駅";

const STATION_RADIUS_M: u32 = 3000;
const STATION_TYPE: &str = "train_station";
const MAX_STATIONS: usize = 4;

#[derive(Debug, Deserialize)]
struct Seconds {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Place {
    place_id: String,
}

#[derive(Debug, Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    results: Vec<Place>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    duration: Option<Seconds>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    duration: Seconds,
    duration_in_traffic: Option<Seconds>,
}

#[derive(Debug, Deserialize)]
struct Route {
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<Route>,
    error_message: Option<String>,
}

/// `OK` and `ZERO_RESULTS` are answers; every other status is an error
fn check_status(api: &str, status: &str, message: Option<&str>) -> Result<()> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => bail!("{} returned {}: {}", api, other, message.unwrap_or("")),
    }
}

fn latlng(c: Coordinates) -> String {
    format!("{},{}", c.lat, c.lng)
}

/// Unix time of 08:00 local time on the day after `now`
pub fn next_morning<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<i64> {
    let eight = now.date_naive().succ_opt()?.and_hms_opt(8, 0, 0)?;
    let departure = now.timezone().from_local_datetime(&eight).earliest()?;
    Some(departure.timestamp())
}

/// Thin client for the Places, Distance Matrix and Directions web services
#[derive(Clone)]
pub struct GoogleMaps {
    client: Client,
    base_url: String,
    key: String,
}

impl GoogleMaps {
    pub fn new(base_url: &str, key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/maps/api/{}/json", self.base_url, endpoint);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.key.as_str())])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", endpoint))?;

        if !response.status().is_success() {
            bail!("{} returned HTTP {}", endpoint, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Unexpected {} response", endpoint))
    }

    /// Place ids of the nearest train stations, closest first
    pub async fn nearby_stations(&self, origin: Coordinates) -> Result<Vec<String>> {
        let response: NearbyResponse = self
            .get(
                "place/nearbysearch",
                &[
                    ("location", latlng(origin)),
                    ("radius", STATION_RADIUS_M.to_string()),
                    ("type", STATION_TYPE.to_string()),
                ],
            )
            .await?;
        check_status("Places", &response.status, response.error_message.as_deref())?;

        Ok(response
            .results
            .into_iter()
            .take(MAX_STATIONS)
            .map(|place| place.place_id)
            .collect())
    }

    /// Walking seconds to each destination that has a route
    pub async fn walking_seconds(
        &self,
        origin: Coordinates,
        place_ids: &[String],
    ) -> Result<Vec<u64>> {
        let destinations = place_ids
            .iter()
            .map(|id| format!("place_id:{}", id))
            .collect::<Vec<_>>()
            .join("|");

        let response: MatrixResponse = self
            .get(
                "distancematrix",
                &[
                    ("origins", latlng(origin)),
                    ("destinations", destinations),
                    ("mode", "walking".to_string()),
                ],
            )
            .await?;
        check_status("Distance Matrix", &response.status, response.error_message.as_deref())?;

        Ok(response
            .rows
            .into_iter()
            .next()
            .map(|row| row.elements)
            .unwrap_or_default()
            .into_iter()
            .filter(|element| element.status == "OK")
            .filter_map(|element| element.duration.map(|d| d.value))
            .collect())
    }

    /// Driving seconds of the first route, traffic-aware when available
    pub async fn driving_seconds(
        &self,
        origin: Coordinates,
        destination: &str,
        departure: i64,
    ) -> Result<Option<u64>> {
        let response: DirectionsResponse = self
            .get(
                "directions",
                &[
                    ("origin", latlng(origin)),
                    ("destination", destination.to_string()),
                    ("mode", "driving".to_string()),
                    ("departure_time", departure.to_string()),
                    ("traffic_model", "best_guess".to_string()),
                    ("language", "ja".to_string()),
                ],
            )
            .await?;
        check_status("Directions", &response.status, response.error_message.as_deref())?;

        let leg = response
            .routes
            .into_iter()
            .next()
            .and_then(|route| route.legs.into_iter().next());
        Ok(leg.map(|leg| leg.duration_in_traffic.unwrap_or(leg.duration).value))
    }
}

/// Minimal walk to one of the nearest stations
pub struct WalkingEnricher {
    maps: GoogleMaps,
}

impl WalkingEnricher {
    pub fn new(maps: GoogleMaps) -> Self {
        Self { maps }
    }
}

#[async_trait]
impl GeoEnricher for WalkingEnricher {
    fn metric(&self) -> Metric {
        Metric::WalkMinutes
    }

    async fn commute(&self, origin: Coordinates) -> Result<Commute> {
        let stations = self.maps.nearby_stations(origin).await?;
        if stations.is_empty() {
            return Ok(Commute::NoRoute);
        }

        let seconds = self.maps.walking_seconds(origin, &stations).await?;
        Ok(seconds
            .into_iter()
            .min()
            .map(|s| Commute::Minutes(round_up_minutes(s)))
            .unwrap_or(Commute::NoRoute))
    }
}

/// Morning drive to a fixed destination
pub struct DrivingEnricher {
    maps: GoogleMaps,
    destination: String,
    departure: i64,
}

impl DrivingEnricher {
    /// Departs at 08:00 tomorrow, host local time
    pub fn new(maps: GoogleMaps, destination: &str) -> Result<Self> {
        let departure =
            next_morning(&Local::now()).context("Could not compute tomorrow's departure time")?;
        Ok(Self::departing_at(maps, destination, departure))
    }

    pub fn departing_at(maps: GoogleMaps, destination: &str, departure: i64) -> Self {
        Self {
            maps,
            destination: destination.to_string(),
            departure,
        }
    }
}

#[async_trait]
impl GeoEnricher for DrivingEnricher {
    fn metric(&self) -> Metric {
        Metric::DriveMinutes
    }

    async fn commute(&self, origin: Coordinates) -> Result<Commute> {
        let seconds = self
            .maps
            .driving_seconds(origin, &self.destination, self.departure)
            .await?;
        Ok(match seconds {
            Some(s) => Commute::Minutes(round_up_minutes(s)),
            None => Commute::NoRoute,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORIGIN: Coordinates = Coordinates {
        lat: 35.7,
        lng: 139.7,
    };

    fn maps(server: &MockServer) -> GoogleMaps {
        GoogleMaps::new(&server.uri(), "k").unwrap()
    }

    #[test]
    fn test_next_morning_is_eight_tomorrow() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tokyo.with_ymd_and_hms(2024, 3, 31, 22, 15, 0).unwrap();
        let expected = tokyo.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap();
        assert_eq!(next_morning(&now), Some(expected.timestamp()));
    }

    #[tokio::test]
    async fn test_walking_takes_fastest_station() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/nearbysearch/json"))
            .and(query_param("location", "35.7,139.7"))
            .and(query_param("radius", "3000"))
            .and(query_param("type", "train_station"))
            .and(query_param("key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "results": [
                    { "place_id": "s1" }, { "place_id": "s2" }, { "place_id": "s3" },
                    { "place_id": "s4" }, { "place_id": "s5" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/maps/api/distancematrix/json"))
            .and(query_param(
                "destinations",
                "place_id:s1|place_id:s2|place_id:s3|place_id:s4",
            ))
            .and(query_param("mode", "walking"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "rows": [{ "elements": [
                    { "status": "OK", "duration": { "value": 900 } },
                    { "status": "NOT_FOUND" },
                    { "status": "OK", "duration": { "value": 421 } },
                    { "status": "OK", "duration": { "value": 1200 } }
                ]}]
            })))
            .mount(&server)
            .await;

        let commute = WalkingEnricher::new(maps(&server)).commute(ORIGIN).await.unwrap();
        assert_eq!(commute, Commute::Minutes(8));
    }

    #[tokio::test]
    async fn test_walking_without_stations_is_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/nearbysearch/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ZERO_RESULTS", "results": [] })),
            )
            .mount(&server)
            .await;

        let commute = WalkingEnricher::new(maps(&server)).commute(ORIGIN).await.unwrap();
        assert_eq!(commute, Commute::NoRoute);
    }

    #[tokio::test]
    async fn test_api_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/nearbysearch/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let err = WalkingEnricher::new(maps(&server))
            .commute(ORIGIN)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[tokio::test]
    async fn test_driving_prefers_traffic_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/directions/json"))
            .and(query_param("origin", "35.7,139.7"))
            .and(query_param("destination", SHIBUYA_STATION))
            .and(query_param("mode", "driving"))
            .and(query_param("departure_time", "1711926000"))
            .and(query_param("traffic_model", "best_guess"))
            .and(query_param("language", "ja"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "routes": [{ "legs": [{
                    "duration": { "value": 1500 },
                    "duration_in_traffic": { "value": 2101 }
                }]}]
            })))
            .mount(&server)
            .await;

        let enricher = DrivingEnricher::departing_at(maps(&server), SHIBUYA_STATION, 1_711_926_000);
        assert_eq!(enricher.commute(ORIGIN).await.unwrap(), Commute::Minutes(36));
    }

    #[tokio::test]
    async fn test_driving_falls_back_to_plain_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/directions/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "routes": [{ "legs": [{ "duration": { "value": 1500 } }]}]
            })))
            .mount(&server)
            .await;

        let enricher = DrivingEnricher::departing_at(maps(&server), SHIBUYA_STATION, 0);
        assert_eq!(enricher.commute(ORIGIN).await.unwrap(), Commute::Minutes(25));
    }

    #[tokio::test]
    async fn test_driving_without_route_is_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/directions/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ZERO_RESULTS", "routes": [] })),
            )
            .mount(&server)
            .await;

        let enricher = DrivingEnricher::departing_at(maps(&server), SHIBUYA_STATION, 0);
        assert_eq!(enricher.commute(ORIGIN).await.unwrap(), Commute::NoRoute);
    }
}
