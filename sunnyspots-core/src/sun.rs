//! Is the sun up?
//!
//! The astronomy lives in the `solar-positioning` crate (NREL SPA). This
//! module only turns its altitude into a daylight flag.

use chrono::{DateTime, Datelike, Utc};
use solar_positioning::{RefractionCorrection, spa, time::DeltaT};

use crate::{
    Error, Result,
    model::{GeoCoordinate, PlaceRecord, SunlightQuery, SunlightResult},
};

/// Source of solar altitude angles, in degrees above the horizon.
pub trait SolarAltitude {
    fn altitude_degrees(&self, at: DateTime<Utc>, location: &GeoCoordinate) -> Result<f64>;
}

const STANDARD_PRESSURE_HPA: f64 = 1013.25;
const STANDARD_TEMPERATURE_C: f64 = 15.0;

/// Years the delta-T polynomials cover; instants outside reuse the edge year.
const DELTA_T_YEARS: std::ops::RangeInclusive<i32> = -500..=2999;

/// Apparent altitude from the SPA algorithm at sea level, refracted
/// through a standard atmosphere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaAltitude;

impl SolarAltitude for SpaAltitude {
    fn altitude_degrees(&self, at: DateTime<Utc>, location: &GeoCoordinate) -> Result<f64> {
        let year = at.year().clamp(*DELTA_T_YEARS.start(), *DELTA_T_YEARS.end());
        let delta_t = DeltaT::estimate_from_date(year, at.month())
            .map_err(|e| Error::Ephemeris(e.to_string()))?;
        let refraction = RefractionCorrection::new(STANDARD_PRESSURE_HPA, STANDARD_TEMPERATURE_C)
            .map_err(|e| Error::Ephemeris(e.to_string()))?;

        let position = spa::solar_position(
            at,
            location.latitude(),
            location.longitude(),
            0.0,
            delta_t,
            Some(refraction),
        )
        .map_err(|e| Error::Ephemeris(e.to_string()))?;

        Ok(position.elevation_angle())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SunEvaluator<A = SpaAltitude> {
    altitude: A,
}

impl SunEvaluator<SpaAltitude> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: SolarAltitude> SunEvaluator<A> {
    pub fn with_altitude(altitude: A) -> Self {
        Self { altitude }
    }

    /// Strictly above the horizon; an altitude of exactly zero is night.
    pub fn is_daylight(&self, timestamp: DateTime<Utc>, location: &GeoCoordinate) -> Result<bool> {
        let altitude = self.altitude.altitude_degrees(timestamp, location)?;
        Ok(altitude > 0.0)
    }

    pub fn evaluate(&self, query: &SunlightQuery) -> Result<SunlightResult> {
        Ok(SunlightResult {
            is_daylight: self.is_daylight(query.timestamp, &query.location)?,
        })
    }

    /// Sun or moon for every place card at `timestamp`.
    pub fn statuses<'a>(
        &self,
        places: &'a [PlaceRecord],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<(&'a PlaceRecord, SunStatus)>> {
        places
            .iter()
            .map(|place| {
                let daylight = self.is_daylight(timestamp, &place.coordinate)?;
                Ok((place, SunStatus::from_daylight(daylight)))
            })
            .collect()
    }
}

pub fn is_daylight(timestamp: DateTime<Utc>, location: &GeoCoordinate) -> Result<bool> {
    SunEvaluator::new().is_daylight(timestamp, location)
}

/// Icon shown next to a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunStatus {
    Sun,
    Moon,
}

impl SunStatus {
    pub fn from_daylight(is_daylight: bool) -> Self {
        if is_daylight { SunStatus::Sun } else { SunStatus::Moon }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SunStatus::Sun => "☀",
            SunStatus::Moon => "☾",
        }
    }
}
