//! Keeps a map and its shadow simulation on one shared date.
//!
//! The map and the shadow library are external; they sit behind
//! [`MapBackend`], [`MapSurface`] and [`ShadowSimulator`]. The controller
//! only sequences calls into them:
//!
//! `Uninitialized -> Initializing -> Ready -> Disposed`
//!
//! `set_date` and `place_marker` are silently ignored before initialization
//! and after disposal.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::GeoCoordinate;

/// Terrarium PNG encoding: `r * 256 + g + b / 256 - 32768` metres.
pub fn decode_elevation(r: u8, g: u8, b: u8) -> f64 {
    f64::from(r) * 256.0 + f64::from(g) + f64::from(b) / 256.0 - 32768.0
}

/// Properties of a building footprint that matter for shadow casting.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildingFeature {
    pub height: Option<f64>,
    pub render_height: Option<f64>,
    #[serde(default, deserialize_with = "truthy")]
    pub underground: bool,
}

/// Vector tiles carry `underground` as `true` or as the string `"true"`.
fn truthy<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// Only above-ground buildings with a positive height or render height cast shadows.
pub fn keep_building(feature: &BuildingFeature) -> bool {
    let has_height = [feature.height, feature.render_height]
        .into_iter()
        .flatten()
        .any(|h| h > 0.0);
    has_height && !feature.underground
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainSource {
    /// Template with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    pub tile_size: u32,
    pub max_zoom: u8,
}

impl TerrainSource {
    /// Tiles served through this application's elevation proxy at `base`.
    pub fn proxied(base: &str) -> Self {
        Self {
            url_template: format!("{}/api/elevation/{{z}}/{{x}}/{{y}}", base.trim_end_matches('/')),
            tile_size: 256,
            max_zoom: 15,
        }
    }

    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ShadowOptions {
    pub date: DateTime<Utc>,
    pub terrain: TerrainSource,
    pub elevation: fn(u8, u8, u8) -> f64,
    pub building_filter: fn(&BuildingFeature) -> bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Green,
    Red,
}

impl MarkerColor {
    pub fn for_outdoor_seating(outdoor_seating: bool) -> Self {
        if outdoor_seating { MarkerColor::Green } else { MarkerColor::Red }
    }

    pub fn css(&self) -> &'static str {
        match self {
            MarkerColor::Green => "green",
            MarkerColor::Red => "red",
        }
    }
}

pub trait MapSurface {
    type Marker;

    fn add_building_layer(&mut self);
    fn add_marker(&mut self, at: GeoCoordinate, color: MarkerColor) -> Self::Marker;
    fn remove_marker(&mut self, marker: Self::Marker);
    fn fly_to(&mut self, center: GeoCoordinate);
    fn remove(self);
}

pub trait ShadowSimulator {
    fn set_date(&mut self, date: DateTime<Utc>);
    fn remove(self);
}

pub trait MapBackend {
    type Map: MapSurface;
    type Shadow: ShadowSimulator;

    fn create_map(&mut self, center: GeoCoordinate) -> Self::Map;
    fn create_shadow(&mut self, map: &mut Self::Map, options: ShadowOptions) -> Self::Shadow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

type MarkerOf<B> = <<B as MapBackend>::Map as MapSurface>::Marker;

enum Stage<B: MapBackend> {
    Uninitialized,
    Initializing {
        map: B::Map,
        date: DateTime<Utc>,
    },
    Ready {
        map: B::Map,
        shadow: B::Shadow,
        date: DateTime<Utc>,
        marker: Option<MarkerOf<B>>,
    },
    Disposed,
}

/// Integer percentage of loaded tiles, floored. Zero when nothing is expected.
pub fn progress_percent(loaded: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u64::from(loaded) * 100 / u64::from(total)).min(100);
    pct as u8
}

pub struct OverlayController<B: MapBackend> {
    backend: B,
    terrain: TerrainSource,
    stage: Stage<B>,
    on_progress: Option<Box<dyn FnMut(u8)>>,
}

impl<B: MapBackend> OverlayController<B> {
    pub fn new(backend: B, terrain: TerrainSource) -> Self {
        Self { backend, terrain, stage: Stage::Uninitialized, on_progress: None }
    }

    pub fn on_progress(mut self, callback: impl FnMut(u8) + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> OverlayState {
        match self.stage {
            Stage::Uninitialized => OverlayState::Uninitialized,
            Stage::Initializing { .. } => OverlayState::Initializing,
            Stage::Ready { .. } => OverlayState::Ready,
            Stage::Disposed => OverlayState::Disposed,
        }
    }

    /// Creates the map; the shadow layer follows in [`Self::map_loaded`].
    pub fn initialize(&mut self, default_location: GeoCoordinate, date: DateTime<Utc>) {
        if !matches!(self.stage, Stage::Uninitialized) {
            log::warn!("overlay already initialized ({:?}); ignoring", self.state());
            return;
        }
        log::debug!("creating map at {default_location}");
        let map = self.backend.create_map(default_location);
        self.stage = Stage::Initializing { map, date };
    }

    /// The map finished loading: add buildings and attach the shadow simulator.
    pub fn map_loaded(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Disposed) {
            Stage::Initializing { mut map, date } => {
                map.add_building_layer();
                let options = ShadowOptions {
                    date,
                    terrain: self.terrain.clone(),
                    elevation: decode_elevation,
                    building_filter: keep_building,
                };
                let shadow = self.backend.create_shadow(&mut map, options);
                self.stage = Stage::Ready { map, shadow, date, marker: None };
            }
            other => self.stage = other,
        }
    }

    /// Called on every time-slider tick; a repeated date is not pushed again.
    pub fn set_date(&mut self, new_date: DateTime<Utc>) {
        match &mut self.stage {
            Stage::Ready { shadow, date, .. } => {
                if *date != new_date {
                    *date = new_date;
                    shadow.set_date(new_date);
                }
            }
            // Picked up when the simulator is created.
            Stage::Initializing { date, .. } => *date = new_date,
            Stage::Uninitialized | Stage::Disposed => {}
        }
    }

    /// Replaces the single marker and centres the view on it.
    pub fn place_marker(&mut self, at: GeoCoordinate, outdoor_seating: bool) {
        let state = self.state();
        let Stage::Ready { map, marker, .. } = &mut self.stage else {
            log::debug!("ignoring marker while {state:?}");
            return;
        };
        if let Some(previous) = marker.take() {
            map.remove_marker(previous);
        }
        *marker = Some(map.add_marker(at, MarkerColor::for_outdoor_seating(outdoor_seating)));
        map.fly_to(at);
    }

    /// Tile-load progress from the simulator; forwarded as a percentage.
    pub fn tile_progress(&mut self, loaded: u32, total: u32) -> Option<u8> {
        if !matches!(self.stage, Stage::Ready { .. }) {
            return None;
        }
        let pct = progress_percent(loaded, total);
        if let Some(callback) = self.on_progress.as_mut() {
            callback(pct);
        }
        Some(pct)
    }

    /// Releases the simulator, then the map.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Disposed) {
            Stage::Ready { map, shadow, .. } => {
                shadow.remove();
                map.remove();
            }
            Stage::Initializing { map, .. } => map.remove(),
            Stage::Uninitialized | Stage::Disposed => {}
        }
    }
}

impl<B: MapBackend> Drop for OverlayController<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
