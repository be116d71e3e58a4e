//! Raw upstream payloads in, stable records out.
//!
//! Three schemas are handled: the legacy Places nearby search, Places API
//! (New) details and autocomplete, and the OpenWeather one-call response.
//! Nothing here returns an error: a record that cannot be fully populated is
//! dropped (list inputs) or reported as `None` (single inputs).

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::{
    CitySuggestion, GeoCoordinate, PhotoRef, PlaceCategory, PlaceRecord, PlaceSuggestion,
    WeatherSnapshot,
};

/// Category from the first type only, checked in a fixed order.
///
/// `["night_club", "bar"]` is a restaurant: only `"night_club"` is looked at.
pub fn infer_category<S: AsRef<str>>(types: &[S]) -> PlaceCategory {
    let Some(first) = types.first() else {
        return PlaceCategory::Restaurant;
    };
    let first = first.as_ref().to_lowercase();

    if first.contains("park") {
        PlaceCategory::Park
    } else if first.contains("restaurant") {
        PlaceCategory::Restaurant
    } else if first.contains("bar") || first.contains("pub") {
        PlaceCategory::Bar
    } else if first.contains("cafe") || first.contains("coffee") {
        PlaceCategory::Cafe
    } else {
        PlaceCategory::Restaurant
    }
}

/// `"places/abc/photos/XYZ123"` -> `"XYZ123"`.
pub fn photo_reference_from_name(name: &str) -> Option<&str> {
    let reference = name.rsplit('/').next()?;
    (!reference.is_empty()).then_some(reference)
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct LegacyLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyGeometry {
    location: LegacyLatLng,
}

#[derive(Debug, Deserialize)]
struct LegacyPhoto {
    photo_reference: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    width: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    height: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    html_attributions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyPlace {
    place_id: Option<String>,
    name: Option<String>,
    geometry: Option<LegacyGeometry>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    vicinity: Option<String>,
    formatted_address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    photos: Vec<LegacyPhoto>,
    #[serde(default, deserialize_with = "null_as_default")]
    types: Vec<String>,
}

pub fn normalize_nearby_place(raw: &Value) -> Option<PlaceRecord> {
    let place = LegacyPlace::deserialize(raw)
        .inspect_err(|e| log::debug!("Skipping malformed nearby result: {e}"))
        .ok()?;

    let id = non_empty(place.place_id)?;
    let name = non_empty(place.name)?;
    let location = place.geometry?.location;
    let coordinate = GeoCoordinate::new(location.lat, location.lng).ok()?;

    let photos = place
        .photos
        .into_iter()
        .filter_map(|p| {
            Some(PhotoRef {
                reference: non_empty(p.photo_reference)?,
                width: p.width,
                height: p.height,
                attributions: p.html_attributions,
            })
        })
        .collect();

    Some(PlaceRecord {
        id,
        name,
        coordinate,
        rating: place.rating,
        rating_count: place.user_ratings_total,
        address: place.vicinity.or(place.formatted_address).unwrap_or_default(),
        photos,
        outdoor_seating: None,
        category: infer_category(&place.types),
    })
}

/// All usable entries of a nearby-search body's `results` array.
pub fn normalize_nearby_results(body: &Value) -> Vec<PlaceRecord> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().filter_map(normalize_nearby_place).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorAttribution {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedPhoto {
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    width_px: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    height_px: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    author_attributions: Vec<AuthorAttribution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedPlace {
    id: Option<String>,
    display_name: Option<LocalizedText>,
    name: Option<String>,
    location: Option<DetailedLocation>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    user_rating_count: Option<u32>,
    outdoor_seating: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    photos: Vec<DetailedPhoto>,
    #[serde(default, deserialize_with = "null_as_default")]
    types: Vec<String>,
}

pub fn normalize_detailed_place(raw: &Value) -> Option<PlaceRecord> {
    let place = DetailedPlace::deserialize(raw)
        .inspect_err(|e| log::debug!("Malformed place details: {e}"))
        .ok()?;

    let id = non_empty(place.id)?;
    let name = non_empty(place.display_name.and_then(|d| d.text)).or(non_empty(place.name))?;
    let location = place.location?;
    let coordinate = GeoCoordinate::new(location.latitude, location.longitude).ok()?;

    let photos = place
        .photos
        .into_iter()
        .filter_map(|p| {
            let reference = photo_reference_from_name(p.name.as_deref()?)?.to_string();
            Some(PhotoRef {
                reference,
                width: p.width_px,
                height: p.height_px,
                attributions: p
                    .author_attributions
                    .into_iter()
                    .filter_map(|a| a.display_name)
                    .collect(),
            })
        })
        .collect();

    Some(PlaceRecord {
        id,
        name,
        coordinate,
        rating: place.rating,
        rating_count: place.user_rating_count,
        address: place.formatted_address.unwrap_or_default(),
        photos,
        outdoor_seating: Some(place.outdoor_seating.unwrap_or(false)),
        category: infer_category(&place.types),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredFormat {
    main_text: Option<LocalizedText>,
    secondary_text: Option<LocalizedText>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacePrediction {
    place_id: Option<String>,
    text: Option<LocalizedText>,
    structured_format: Option<StructuredFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    place_prediction: Option<PlacePrediction>,
}

/// `(place_id, main text, secondary text)` of one autocomplete suggestion.
fn prediction_parts(raw: &Value) -> Option<(String, String, Option<String>)> {
    let prediction = Suggestion::deserialize(raw).ok()?.place_prediction?;
    let place_id = non_empty(prediction.place_id)?;

    let (main, secondary) = match prediction.structured_format {
        Some(format) => (
            format.main_text.and_then(|t| t.text),
            format.secondary_text.and_then(|t| t.text),
        ),
        None => (None, None),
    };
    let name = non_empty(main).or(non_empty(prediction.text.and_then(|t| t.text)))?;

    Some((place_id, name, non_empty(secondary)))
}

pub fn normalize_city_suggestion(raw: &Value) -> Option<CitySuggestion> {
    let (place_id, name, secondary_text) = prediction_parts(raw)?;
    Some(CitySuggestion { place_id, name, secondary_text })
}

pub fn normalize_place_suggestion(raw: &Value) -> Option<PlaceSuggestion> {
    let (place_id, name, address) = prediction_parts(raw)?;
    Some(PlaceSuggestion { place_id, name, address })
}

/// Applies `normalize` to every entry of an autocomplete body's `suggestions`.
pub fn normalize_suggestions<T>(body: &Value, normalize: fn(&Value) -> Option<T>) -> Vec<T> {
    body.get("suggestions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct OwCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    temp: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    uvi: f64,
    weather: Vec<OwCondition>,
}

#[derive(Debug, Deserialize)]
struct OwOneCall {
    current: OwCurrent,
}

/// `None` means "weather unavailable", not a failure.
pub fn normalize_weather(raw: &Value) -> Option<WeatherSnapshot> {
    let parsed = OwOneCall::deserialize(raw)
        .inspect_err(|e| log::debug!("Malformed one-call response: {e}"))
        .ok()?;
    let condition = parsed.current.weather.into_iter().next()?;

    Some(WeatherSnapshot {
        temperature: parsed.current.temp,
        uv_index: parsed.current.uvi,
        icon: condition.icon,
        description: condition.description,
        condition: condition.main,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_substring_match_wins_in_order() {
        assert_eq!(infer_category(&["amusement_park"]), PlaceCategory::Park);
        assert_eq!(infer_category(&["Restaurant"]), PlaceCategory::Restaurant);
        assert_eq!(infer_category(&["wine_bar"]), PlaceCategory::Bar);
        assert_eq!(infer_category(&["pub"]), PlaceCategory::Bar);
        assert_eq!(infer_category(&["coffee_shop"]), PlaceCategory::Cafe);
        assert_eq!(infer_category(&["cafe"]), PlaceCategory::Cafe);
        // "park" is checked before "bar".
        assert_eq!(infer_category(&["barpark"]), PlaceCategory::Park);
    }

    #[test]
    fn category_defaults_to_restaurant() {
        assert_eq!(infer_category::<&str>(&[]), PlaceCategory::Restaurant);
        assert_eq!(infer_category(&["museum"]), PlaceCategory::Restaurant);
    }

    #[test]
    fn category_only_looks_at_first_type() {
        assert_eq!(infer_category(&["night_club", "bar"]), PlaceCategory::Restaurant);
    }

    fn nearby(id: &str) -> Value {
        json!({
            "place_id": id,
            "name": "Hofje",
            "geometry": { "location": { "lat": 52.09, "lng": 5.12 } },
            "rating": 4.5,
            "user_ratings_total": 120,
            "vicinity": "Oudegracht 1, Utrecht",
            "types": ["bar", "point_of_interest"],
            "photos": [
                { "photo_reference": "REF1", "width": 800, "height": 600, "html_attributions": ["<a>someone</a>"] },
                { "width": 10, "height": 10 }
            ]
        })
    }

    #[test]
    fn nearby_place_fields() {
        let place = normalize_nearby_place(&nearby("A")).unwrap();

        assert_eq!(place.id, "A");
        assert_eq!(place.name, "Hofje");
        assert_eq!(place.coordinate.latitude(), 52.09);
        assert_eq!(place.rating, Some(4.5));
        assert_eq!(place.rating_count, Some(120));
        assert_eq!(place.address, "Oudegracht 1, Utrecht");
        assert_eq!(place.category, PlaceCategory::Bar);
        assert_eq!(place.outdoor_seating, None);
        assert_eq!(place.photos.len(), 1);
        assert_eq!(place.photos[0].reference, "REF1");
    }

    #[test]
    fn nearby_place_without_types_is_restaurant() {
        let mut raw = nearby("A");
        raw.as_object_mut().unwrap().remove("types");
        assert_eq!(normalize_nearby_place(&raw).unwrap().category, PlaceCategory::Restaurant);
    }

    #[test]
    fn nearby_place_with_null_lists() {
        let mut raw = nearby("A");
        let obj = raw.as_object_mut().unwrap();
        obj.insert("types".into(), Value::Null);
        obj.insert("photos".into(), Value::Null);

        let place = normalize_nearby_place(&raw).unwrap();
        assert_eq!(place.category, PlaceCategory::Restaurant);
        assert!(place.photos.is_empty());
    }

    #[test]
    fn nearby_results_skip_malformed_entries() {
        let body = json!({
            "status": "OK",
            "results": [
                nearby("A"),
                { "place_id": "B", "name": "No geometry" },
                { "place_id": "C", "name": "Bad", "geometry": { "location": { "lat": 95.0, "lng": 0.0 } } },
                "not an object",
                nearby("D")
            ]
        });

        let ids: Vec<_> = normalize_nearby_results(&body).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["A", "D"]);
    }

    #[test]
    fn nearby_results_without_array_is_empty() {
        assert!(normalize_nearby_results(&json!({ "status": "ZERO_RESULTS" })).is_empty());
    }

    fn detailed() -> Value {
        json!({
            "id": "ChIJ123",
            "displayName": { "text": "Café de Zaak", "languageCode": "nl" },
            "location": { "latitude": 52.1, "longitude": 5.11 },
            "formattedAddress": "Korte Minrebroederstraat 9, Utrecht",
            "rating": 4.2,
            "userRatingCount": 88,
            "outdoorSeating": true,
            "types": ["cafe", "restaurant"],
            "photos": [
                { "name": "places/abc/photos/XYZ123", "widthPx": 1024, "heightPx": 768,
                  "authorAttributions": [{ "displayName": "Jan" }] },
                { "widthPx": 10, "heightPx": 10 },
                { "name": "places/abc/photos/", "widthPx": 10, "heightPx": 10 }
            ]
        })
    }

    #[test]
    fn detailed_place_fields() {
        let place = normalize_detailed_place(&detailed()).unwrap();

        assert_eq!(place.id, "ChIJ123");
        assert_eq!(place.name, "Café de Zaak");
        assert_eq!(place.address, "Korte Minrebroederstraat 9, Utrecht");
        assert_eq!(place.outdoor_seating, Some(true));
        assert_eq!(place.rating_count, Some(88));
        assert_eq!(place.category, PlaceCategory::Cafe);
        assert_eq!(
            place.photos,
            vec![PhotoRef {
                reference: "XYZ123".to_string(),
                width: 1024,
                height: 768,
                attributions: vec!["Jan".to_string()],
            }]
        );
    }

    #[test]
    fn detailed_place_name_falls_back_and_seating_is_coerced() {
        let mut raw = detailed();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("displayName");
        obj.remove("outdoorSeating");
        obj.insert("name".into(), json!("Fallback name"));

        let place = normalize_detailed_place(&raw).unwrap();
        assert_eq!(place.name, "Fallback name");
        assert_eq!(place.outdoor_seating, Some(false));
    }

    #[test]
    fn detailed_place_with_null_lists() {
        let mut raw = detailed();
        let obj = raw.as_object_mut().unwrap();
        obj.insert("photos".into(), Value::Null);
        obj.insert("types".into(), Value::Null);

        let place = normalize_detailed_place(&raw).unwrap();
        assert!(place.photos.is_empty());
        assert_eq!(place.category, PlaceCategory::Restaurant);

        let raw = json!({
            "id": "P", "name": "Parkje",
            "location": { "latitude": 52.1, "longitude": 5.1 },
            "photos": [{ "name": "places/P/photos/R", "widthPx": null, "authorAttributions": null }]
        });
        let photos = normalize_detailed_place(&raw).unwrap().photos;
        assert_eq!(photos[0].reference, "R");
        assert_eq!(photos[0].width, 0);
        assert!(photos[0].attributions.is_empty());
    }

    #[test]
    fn detailed_place_without_location_is_none() {
        let mut raw = detailed();
        raw.as_object_mut().unwrap().remove("location");
        assert!(normalize_detailed_place(&raw).is_none());
        assert!(normalize_detailed_place(&json!(null)).is_none());
    }

    #[test]
    fn photo_reference_is_last_segment() {
        assert_eq!(photo_reference_from_name("places/abc/photos/XYZ123"), Some("XYZ123"));
        assert_eq!(photo_reference_from_name("plain"), Some("plain"));
        assert_eq!(photo_reference_from_name("trailing/"), None);
    }

    #[test]
    fn suggestions() {
        let body = json!({
            "suggestions": [
                { "placePrediction": {
                    "placeId": "city1",
                    "text": { "text": "Utrecht, Netherlands" },
                    "structuredFormat": {
                        "mainText": { "text": "Utrecht" },
                        "secondaryText": { "text": "Netherlands" }
                    }
                }},
                { "placePrediction": { "placeId": "city2", "text": { "text": "Utrechtse Heuvelrug" } } },
                { "queryPrediction": { "text": { "text": "utrecht cafes" } } }
            ]
        });

        let cities = normalize_suggestions(&body, normalize_city_suggestion);
        assert_eq!(
            cities,
            vec![
                CitySuggestion {
                    place_id: "city1".into(),
                    name: "Utrecht".into(),
                    secondary_text: Some("Netherlands".into()),
                },
                CitySuggestion {
                    place_id: "city2".into(),
                    name: "Utrechtse Heuvelrug".into(),
                    secondary_text: None,
                },
            ]
        );

        let places = normalize_suggestions(&body, normalize_place_suggestion);
        assert_eq!(places[0].address.as_deref(), Some("Netherlands"));
    }

    #[test]
    fn weather_snapshot() {
        let raw = json!({
            "current": {
                "temp": 21.5,
                "uvi": 6.1,
                "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }]
            }
        });

        assert_eq!(
            normalize_weather(&raw),
            Some(WeatherSnapshot {
                temperature: 21.5,
                uv_index: 6.1,
                icon: "01d".into(),
                description: "clear sky".into(),
                condition: "Clear".into(),
            })
        );
    }

    #[test]
    fn weather_null_uv_index_is_zero() {
        let raw = json!({
            "current": {
                "temp": 1.0,
                "uvi": null,
                "weather": [{ "main": "Clouds", "description": "overcast clouds", "icon": "04n" }]
            }
        });
        let snapshot = normalize_weather(&raw).unwrap();
        assert_eq!(snapshot.uv_index, 0.0);
        assert_eq!(snapshot.condition, "Clouds");
    }

    #[test]
    fn weather_unavailable_is_none() {
        assert!(normalize_weather(&json!({ "current": { "temp": 1.0, "weather": [] } })).is_none());
        assert!(normalize_weather(&json!({ "current": { "temp": 1.0 } })).is_none());
        assert!(normalize_weather(&json!({})).is_none());
        assert!(normalize_weather(&json!("garbage")).is_none());
    }
}
