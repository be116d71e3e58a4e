use std::{collections::HashSet, sync::Arc};

use reqwest::Url;
use serde_json::{Value, json};

use crate::{
    Config, Error, Result,
    config::ProviderId,
    fetch::{CachedFetcher, FetchOptions, HttpTransport},
    model::{CitySuggestion, GeoCoordinate, PlaceRecord, PlaceSuggestion},
    normalize,
};

/// Fields requested from place details. Keep in sync with `normalize_detailed_place`.
pub const DETAIL_FIELDS: &str =
    "id,displayName,location,formattedAddress,rating,userRatingCount,outdoorSeating,photos,types";

const AUTOCOMPLETE_BIAS_RADIUS_M: f64 = 50_000.0;
const CITY_TYPES: &[&str] = &["locality", "administrative_area_level_3"];
const SPOT_TYPES: &[&str] = &["restaurant", "bar", "cafe", "park"];

/// The `type=` of a nearby search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearbyKind {
    Park,
    Restaurant,
    Bar,
    Cafe,
}

impl NearbyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NearbyKind::Park => "park",
            NearbyKind::Restaurant => "restaurant",
            NearbyKind::Bar => "bar",
            NearbyKind::Cafe => "cafe",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NearbySearch {
    pub location: GeoCoordinate,
    pub radius_m: u32,
    pub kind: NearbyKind,
    pub keyword: Option<String>,
    /// Rank by distance instead of prominence. The upstream rejects a radius
    /// together with distance ranking, so the radius is then left out.
    pub rank_by_distance: bool,
}

impl NearbySearch {
    pub fn new(location: GeoCoordinate, radius_m: u32, kind: NearbyKind) -> Self {
        Self { location, radius_m, kind, keyword: None, rank_by_distance: false }
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
}

#[derive(Clone)]
pub struct PlacesClient<T> {
    fetcher: Arc<CachedFetcher<T>>,
    api_key: String,
    legacy_base: String,
    base: String,
    language_code: String,
}

impl<T: HttpTransport> PlacesClient<T> {
    pub fn from_config(config: &Config, fetcher: Arc<CachedFetcher<T>>) -> Result<Self> {
        Ok(Self {
            fetcher,
            api_key: config.require_api_key(ProviderId::GooglePlaces)?.to_string(),
            legacy_base: config.endpoints.legacy_places.trim_end_matches('/').to_string(),
            base: config.endpoints.places.trim_end_matches('/').to_string(),
            language_code: "en".to_string(),
        })
    }

    /// Legacy nearby search. Any failure yields an empty list.
    pub async fn nearby_search(&self, search: &NearbySearch) -> Vec<PlaceRecord> {
        match self.try_nearby_search(search).await {
            Ok(places) => places,
            Err(e) => {
                log::warn!("nearby search ({}) failed: {e}", search.kind.as_str());
                Vec::new()
            }
        }
    }

    async fn try_nearby_search(&self, search: &NearbySearch) -> Result<Vec<PlaceRecord>> {
        let mut params = vec![
            ("location", search.location.to_query_value()),
            ("type", search.kind.as_str().to_string()),
            ("key", self.api_key.clone()),
        ];
        if search.rank_by_distance {
            params.push(("rankby", "distance".to_string()));
        } else {
            params.push(("radius", search.radius_m.to_string()));
        }
        if let Some(keyword) = &search.keyword {
            params.push(("keyword", keyword.clone()));
        }

        let url = build_url(&format!("{}/nearbysearch/json", self.legacy_base), &params)?;
        let body = self.fetcher.fetch_json(url.as_str(), FetchOptions::default()).await?;
        check_legacy_status(&body)?;

        Ok(normalize::normalize_nearby_results(&body))
    }

    /// Parks and restaurants around `location`, fetched concurrently.
    ///
    /// A failed half contributes nothing. Results are unique by id; a place
    /// found by both searches keeps its park entry.
    pub async fn search_outdoor_spots(&self, location: GeoCoordinate, radius_m: u32) -> Vec<PlaceRecord> {
        let parks = NearbySearch::new(location, radius_m, NearbyKind::Park);
        let restaurants = NearbySearch::new(location, radius_m, NearbyKind::Restaurant);

        let (parks, restaurants) =
            tokio::join!(self.nearby_search(&parks), self.nearby_search(&restaurants));

        log::info!("found {} parks and {} restaurants near {location}", parks.len(), restaurants.len());
        merge_unique([parks, restaurants])
    }

    pub async fn autocomplete_cities(&self, input: &str, bias: GeoCoordinate) -> Vec<CitySuggestion> {
        match self.autocomplete(input, bias, CITY_TYPES).await {
            Ok(body) => normalize::normalize_suggestions(&body, normalize::normalize_city_suggestion),
            Err(e) => {
                log::warn!("city autocomplete failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn autocomplete_places(&self, input: &str, bias: GeoCoordinate) -> Vec<PlaceSuggestion> {
        match self.autocomplete(input, bias, SPOT_TYPES).await {
            Ok(body) => normalize::normalize_suggestions(&body, normalize::normalize_place_suggestion),
            Err(e) => {
                log::warn!("place autocomplete failed: {e}");
                Vec::new()
            }
        }
    }

    async fn autocomplete(&self, input: &str, bias: GeoCoordinate, types: &[&str]) -> Result<Value> {
        let body = json!({
            "input": input,
            "locationBias": {
                "circle": {
                    "center": { "latitude": bias.latitude(), "longitude": bias.longitude() },
                    "radius": AUTOCOMPLETE_BIAS_RADIUS_M,
                }
            },
            "includedPrimaryTypes": types,
            "languageCode": self.language_code,
        });
        let options = FetchOptions::default()
            .post_json(&body)
            .header("X-Goog-Api-Key", self.api_key.clone());

        self.fetcher
            .fetch_json(&format!("{}/places:autocomplete", self.base), options)
            .await
    }

    /// Place details from the current API. Any failure yields `None`.
    pub async fn place_details(&self, id: &str) -> Option<PlaceRecord> {
        let result = self.try_place_details(id).await;
        match result {
            Ok(Some(place)) => Some(place),
            Ok(None) => {
                log::warn!("place details for {id} were not usable");
                None
            }
            Err(e) => {
                log::warn!("place details for {id} failed: {e}");
                None
            }
        }
    }

    async fn try_place_details(&self, id: &str) -> Result<Option<PlaceRecord>> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(Error::UpstreamData(format!("not a place id: {id:?}")));
        }
        let url = build_url(
            &format!("{}/places/{id}", self.base),
            &[("fields", DETAIL_FIELDS.to_string()), ("key", self.api_key.clone())],
        )?;
        let body = self.fetcher.fetch_json(url.as_str(), FetchOptions::default()).await?;
        Ok(normalize::normalize_detailed_place(&body))
    }

    /// Upstream URL behind the photo proxy.
    pub fn photo_url(&self, reference: &str, width: u32) -> Result<Url> {
        build_url(
            &format!("{}/photo", self.legacy_base),
            &[
                ("maxwidth", width.to_string()),
                ("photo_reference", reference.to_string()),
                ("key", self.api_key.clone()),
            ],
        )
    }

    pub fn fetcher(&self) -> &CachedFetcher<T> {
        &self.fetcher
    }
}

fn build_url(base: &str, params: &[(&str, String)]) -> Result<Url> {
    Url::parse_with_params(base, params).map_err(|e| Error::InvalidUrl(e.to_string()))
}

fn check_legacy_status(body: &Value) -> Result<()> {
    match body.get("status").and_then(Value::as_str) {
        Some("OK" | "ZERO_RESULTS") => Ok(()),
        Some(other) => Err(Error::UpstreamData(format!("status {other}"))),
        None => Err(Error::UpstreamData("missing status".to_string())),
    }
}

/// Concatenate, keeping the first record seen for each id.
pub fn merge_unique(lists: impl IntoIterator<Item = Vec<PlaceRecord>>) -> Vec<PlaceRecord> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|place| seen.insert(place.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::{FakeTransport, json_response};
    use crate::model::PlaceCategory;
    use reqwest::Method;

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::GooglePlaces, "PLACES_KEY".into());
        cfg.endpoints.legacy_places = "https://legacy.test/api/place".into();
        cfg.endpoints.places = "https://places.test/v1/".into();
        cfg
    }

    fn client(transport: FakeTransport) -> PlacesClient<FakeTransport> {
        PlacesClient::from_config(&config(), Arc::new(CachedFetcher::new(transport))).unwrap()
    }

    fn nearby_result(id: &str, name: &str, types: &[&str]) -> Value {
        json!({
            "place_id": id,
            "name": name,
            "geometry": { "location": { "lat": 52.09, "lng": 5.12 } },
            "vicinity": "Utrecht",
            "types": types,
        })
    }

    fn utrecht() -> GeoCoordinate {
        GeoCoordinate::UTRECHT
    }

    #[test]
    fn requires_places_key() {
        let fetcher = Arc::new(CachedFetcher::new(FakeTransport::new(|_| unreachable!())));
        let err = PlacesClient::from_config(&Config::default(), fetcher).err().unwrap();
        assert!(matches!(err, Error::MissingApiKey(ProviderId::GooglePlaces)));
    }

    #[tokio::test]
    async fn nearby_search_sends_expected_query() {
        let places = client(FakeTransport::new(|_| {
            Ok(json_response(200, &json!({ "status": "OK", "results": [nearby_result("A", "Park A", &["park"])] })))
        }));

        let search = NearbySearch::new(utrecht(), 1500, NearbyKind::Park).keyword("terrace");
        let found = places.nearby_search(&search).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, PlaceCategory::Park);

        let requests = places.fetcher().transport_requests();
        let url = Url::parse(&requests[0].url).unwrap();
        assert_eq!(url.path(), "/api/place/nearbysearch/json");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("location".into(), "52.0907,5.1214".into())));
        assert!(query.contains(&("radius".into(), "1500".into())));
        assert!(query.contains(&("type".into(), "park".into())));
        assert!(query.contains(&("keyword".into(), "terrace".into())));
        assert!(query.contains(&("key".into(), "PLACES_KEY".into())));
    }

    #[tokio::test]
    async fn distance_ranking_drops_radius() {
        let places = client(FakeTransport::new(|_| Ok(json_response(200, &json!({ "status": "ZERO_RESULTS" })))));

        let mut search = NearbySearch::new(utrecht(), 1500, NearbyKind::Cafe);
        search.rank_by_distance = true;
        assert!(places.nearby_search(&search).await.is_empty());

        let url = Url::parse(&places.fetcher().transport_requests()[0].url).unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert!(keys.contains(&"rankby".to_string()));
        assert!(!keys.contains(&"radius".to_string()));
    }

    #[tokio::test]
    async fn nearby_search_degrades_to_empty() {
        let denied = client(FakeTransport::new(|_| {
            Ok(json_response(200, &json!({ "status": "REQUEST_DENIED", "results": [nearby_result("A", "A", &[])] })))
        }));
        assert!(denied.nearby_search(&NearbySearch::new(utrecht(), 100, NearbyKind::Bar)).await.is_empty());

        let down = client(FakeTransport::new(|_| Ok(json_response(503, &Value::Null))));
        assert!(down.nearby_search(&NearbySearch::new(utrecht(), 100, NearbyKind::Bar)).await.is_empty());
    }

    #[tokio::test]
    async fn combined_search_dedupes_parks_first() {
        let places = client(FakeTransport::new(|req| {
            let results = if req.url.contains("type=park") {
                json!([nearby_result("A", "From parks", &["park"]), nearby_result("P", "Park only", &["park"])])
            } else {
                json!([nearby_result("A", "From restaurants", &["restaurant"]), nearby_result("R", "Diner", &["restaurant"])])
            };
            Ok(json_response(200, &json!({ "status": "OK", "results": results })))
        }));

        let spots = places.search_outdoor_spots(utrecht(), 1000).await;
        let names: Vec<&str> = spots.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["From parks", "Park only", "Diner"]);
    }

    #[tokio::test]
    async fn combined_search_keeps_surviving_half() {
        let places = client(FakeTransport::new(|req| {
            if req.url.contains("type=park") {
                Ok(json_response(500, &Value::Null))
            } else {
                Ok(json_response(200, &json!({ "status": "OK", "results": [nearby_result("R", "Diner", &[])] })))
            }
        }));

        let spots = places.search_outdoor_spots(utrecht(), 1000).await;
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].id, "R");
    }

    #[tokio::test]
    async fn autocomplete_posts_json_body() {
        let places = client(FakeTransport::new(|_| {
            Ok(json_response(200, &json!({ "suggestions": [{ "placePrediction": {
                "placeId": "u1",
                "structuredFormat": { "mainText": { "text": "Utrecht" }, "secondaryText": { "text": "Netherlands" } }
            }}]})))
        }));

        let cities = places.autocomplete_cities("Utr", utrecht()).await;
        assert_eq!(cities[0].name, "Utrecht");

        let request = &places.fetcher().transport_requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://places.test/v1/places:autocomplete");
        assert!(request.headers.contains(&("X-Goog-Api-Key".into(), "PLACES_KEY".into())));
        let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["input"], "Utr");
        assert_eq!(body["languageCode"], "en");
        assert_eq!(body["includedPrimaryTypes"][0], "locality");
        assert_eq!(body["locationBias"]["circle"]["center"]["latitude"], 52.0907);
    }

    #[tokio::test]
    async fn autocomplete_failure_is_empty() {
        let places = client(FakeTransport::new(|_| Ok(json_response(403, &Value::Null))));
        assert!(places.autocomplete_places("cafe", utrecht()).await.is_empty());
    }

    #[tokio::test]
    async fn details_use_fields_and_normalize() {
        let places = client(FakeTransport::new(|_| {
            Ok(json_response(200, &json!({
                "id": "ChIJ1",
                "displayName": { "text": "Terras" },
                "location": { "latitude": 52.0, "longitude": 5.0 },
                "outdoorSeating": true
            })))
        }));

        let place = places.place_details("ChIJ1").await.unwrap();
        assert_eq!(place.outdoor_seating, Some(true));

        let url = Url::parse(&places.fetcher().transport_requests()[0].url).unwrap();
        assert_eq!(url.path(), "/v1/places/ChIJ1");
        assert!(url.query_pairs().any(|(k, v)| k == "fields" && v == DETAIL_FIELDS));
    }

    #[tokio::test]
    async fn details_degrade_to_none() {
        let places = client(FakeTransport::new(|_| Ok(json_response(200, &json!({ "id": "x" })))));
        assert!(places.place_details("x").await.is_none());
        // Rejected before any request is made.
        assert!(places.place_details("../etc").await.is_none());
        assert_eq!(places.fetcher().transport_requests().len(), 1);
    }

    #[test]
    fn photo_url_carries_reference_and_width() {
        let fetcher = Arc::new(CachedFetcher::new(FakeTransport::new(|_| unreachable!())));
        let places = PlacesClient::from_config(&config(), fetcher).unwrap();
        let url = places.photo_url("XYZ", 400).unwrap();
        assert_eq!(
            url.as_str(),
            "https://legacy.test/api/place/photo?maxwidth=400&photo_reference=XYZ&key=PLACES_KEY"
        );
    }
}
