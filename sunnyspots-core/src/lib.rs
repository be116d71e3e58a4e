//! Core library for SunnySpots: is that terrace in the sun right now?
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Sun position evaluation for a place and instant
//! - Normalization of Places and OpenWeather payloads into stable records
//! - A cached HTTP fetch wrapper and the upstream clients built on it
//! - The map/shadow overlay controller and debounced search
//!
//! It is used by `sunnyspots-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod overlay;
pub mod places;
pub mod search;
pub mod sun;
pub mod weather;

pub use config::{Config, Endpoints, ProviderConfig, ProviderId};
pub use error::{Error, Result};
pub use fetch::{CachedFetcher, FetchOptions, HttpTransport, ReqwestTransport};
pub use model::{
    CitySuggestion, GeoCoordinate, PhotoRef, PlaceCategory, PlaceRecord, PlaceSuggestion,
    SunlightQuery, SunlightResult, WeatherSnapshot,
};
pub use places::PlacesClient;
pub use sun::{SunEvaluator, SunStatus, is_daylight};
pub use weather::WeatherClient;
