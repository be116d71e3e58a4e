use std::sync::Arc;

use reqwest::Url;

use crate::{
    Config, Error, Result,
    config::ProviderId,
    fetch::{CachedFetcher, FetchOptions, HttpTransport},
    model::{GeoCoordinate, WeatherSnapshot},
    normalize,
};

/// Current conditions change faster than place data.
const WEATHER_REVALIDATE: std::time::Duration = std::time::Duration::from_secs(600);

/// OpenWeather one-call client, metric units.
#[derive(Clone)]
pub struct WeatherClient<T> {
    fetcher: Arc<CachedFetcher<T>>,
    api_key: String,
    base: String,
}

impl<T: HttpTransport> WeatherClient<T> {
    pub fn from_config(config: &Config, fetcher: Arc<CachedFetcher<T>>) -> Result<Self> {
        Ok(Self {
            fetcher,
            api_key: config.require_api_key(ProviderId::OpenWeather)?.to_string(),
            base: config.endpoints.weather.trim_end_matches('/').to_string(),
        })
    }

    /// Weather right now at `location`, or `None` when unavailable.
    pub async fn current(&self, location: GeoCoordinate) -> Option<WeatherSnapshot> {
        match self.try_current(location).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                log::warn!("weather for {location} had no current conditions");
                None
            }
            Err(e) => {
                log::warn!("weather for {location} failed: {e}");
                None
            }
        }
    }

    async fn try_current(&self, location: GeoCoordinate) -> Result<Option<WeatherSnapshot>> {
        let url = Url::parse_with_params(
            &format!("{}/onecall", self.base),
            &[
                ("lat", location.latitude().to_string()),
                ("lon", location.longitude().to_string()),
                ("exclude", "minutely,hourly,daily,alerts".to_string()),
                ("units", "metric".to_string()),
                ("appid", self.api_key.clone()),
            ],
        )
        .map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let options = FetchOptions::default().revalidate(WEATHER_REVALIDATE);
        let body = self.fetcher.fetch_json(url.as_str(), options).await?;
        Ok(normalize::normalize_weather(&body))
    }
}
