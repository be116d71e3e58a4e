use thiserror::Error;

use crate::config::ProviderId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A third party answered with a non-2xx status.
    #[error("upstream request to {url} failed with status {status}")]
    UpstreamHttp { url: String, status: u16 },

    /// A 2xx answer whose body is missing fields or is not the expected shape.
    #[error("upstream returned an unusable body: {0}")]
    UpstreamData(String),

    #[error("invalid coordinate ({latitude}, {longitude}): latitude must be in [-90, 90], longitude in [-180, 180]")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("HTTP transport error")]
    Transport(#[from] reqwest::Error),

    #[error("could not build request URL: {0}")]
    InvalidUrl(String),

    #[error("solar position computation failed: {0}")]
    Ephemeris(String),

    #[error("no API key configured for provider '{0}'; run `sunnyspots configure {0}`")]
    MissingApiKey(ProviderId),
}
