use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sunnyspots_core::{
    CachedFetcher, Config, GeoCoordinate, PlaceRecord, PlacesClient, ProviderId, ReqwestTransport,
    SunEvaluator, WeatherClient,
    search::{DEFAULT_QUIET_PERIOD, DebouncedSearch},
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "sunnyspots", version, about = "Find terraces and parks that are in the sun")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key for a provider.
    Configure {
        /// Provider short name: "googleplaces" or "openweather".
        provider: String,
    },

    /// Is the sun above the horizon at a location?
    Sunlight {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// RFC 3339 instant; if absent, means "now".
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Parks and restaurants nearby, each marked sun or moon.
    Spots {
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,

        /// Search radius in metres.
        #[arg(long, default_value = "1500")]
        radius: u32,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Show details for one place id.
    Details { id: String },

    /// Current weather at a location.
    Weather {
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,
    },

    /// Search as you type: every stdin line is treated as the current input.
    Suggest {
        /// Suggest cities instead of places.
        #[arg(long)]
        city: bool,
    },

    /// Run the elevation tile and photo proxy.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
        bind: String,

        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        if let Command::Configure { provider } = &self.command {
            return configure(provider);
        }

        let config = Config::load_with_env()?;

        match self.command {
            Command::Configure { .. } => Ok(()),
            Command::Sunlight { lat, lng, at } => {
                let location = GeoCoordinate::new(lat, lng)?;
                let at = at.unwrap_or_else(Utc::now);
                let daylight = sunnyspots_core::is_daylight(at, &location)?;
                let status = sunnyspots_core::SunStatus::from_daylight(daylight);
                println!(
                    "{} {location} at {at}: {}",
                    status.icon(),
                    if daylight { "sun is up" } else { "sun is down" }
                );
                Ok(())
            }
            Command::Spots { lat, lng, radius, at } => {
                let location = location_or_default(lat, lng, &config)?;
                let places = PlacesClient::from_config(&config, fetcher(&config)?)?;
                let spots = places.search_outdoor_spots(location, radius).await;
                print_spots(&spots, at.unwrap_or_else(Utc::now))
            }
            Command::Details { id } => {
                let places = PlacesClient::from_config(&config, fetcher(&config)?)?;
                match places.place_details(&id).await {
                    Some(place) => {
                        println!("{}", serde_json::to_string_pretty(&place)?);
                        Ok(())
                    }
                    None => Err(anyhow!("No usable details for place '{id}'")),
                }
            }
            Command::Weather { lat, lng } => {
                let location = location_or_default(lat, lng, &config)?;
                let weather = WeatherClient::from_config(&config, fetcher(&config)?)?;
                match weather.current(location).await {
                    Some(w) => println!(
                        "{location}: {:.1}°C, {} ({}), UV index {:.1} [{}]",
                        w.temperature, w.condition, w.description, w.uv_index, w.icon
                    ),
                    None => println!("{location}: weather unavailable"),
                }
                Ok(())
            }
            Command::Suggest { city } => suggest(&config, city).await,
            Command::Serve { bind, port } => server::run_server(&config, &bind, port).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    config.save()?;
    println!("Saved {id} key to {}", Config::config_file_path()?.display());
    Ok(())
}

fn fetcher(config: &Config) -> anyhow::Result<Arc<CachedFetcher<ReqwestTransport>>> {
    let transport = ReqwestTransport::new(config.request_timeout())
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(CachedFetcher::new(transport)))
}

fn location_or_default(
    lat: Option<f64>,
    lng: Option<f64>,
    config: &Config,
) -> anyhow::Result<GeoCoordinate> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(GeoCoordinate::new(lat, lng)?),
        _ => Ok(config.default_location),
    }
}

fn print_spots(spots: &[PlaceRecord], at: DateTime<Utc>) -> anyhow::Result<()> {
    if spots.is_empty() {
        println!("No spots found.");
        return Ok(());
    }

    for (place, status) in SunEvaluator::new().statuses(spots, at)? {
        let rating = place
            .rating
            .map(|r| format!(" {r:.1}★ ({})", place.rating_count.unwrap_or(0)))
            .unwrap_or_default();
        println!("{} {} [{}]{rating} - {}", status.icon(), place.name, place.category, place.address);
    }
    Ok(())
}

async fn suggest(config: &Config, city: bool) -> anyhow::Result<()> {
    let places = PlacesClient::from_config(config, fetcher(config)?)?;
    let bias = config.default_location;

    let search = DebouncedSearch::new(DEFAULT_QUIET_PERIOD, move |input: String| {
        let places = places.clone();
        async move {
            if city {
                places
                    .autocomplete_cities(&input, bias)
                    .await
                    .into_iter()
                    .map(|c| match c.secondary_text {
                        Some(secondary) => format!("{} ({secondary})", c.name),
                        None => c.name,
                    })
                    .collect()
            } else {
                places
                    .autocomplete_places(&input, bias)
                    .await
                    .into_iter()
                    .map(|p| format!("{} [{}]", p.name, p.place_id))
                    .collect::<Vec<String>>()
            }
        }
    });

    let mut rx = search.subscribe();
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            if let Some(results) = current {
                println!("{}:", results.query);
                for item in results.items {
                    println!("  {item}");
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = String::new();
    while let Some(line) = lines.next_line().await? {
        search.submit(&line);
        last = line.trim().to_string();
    }

    if !last.is_empty() {
        let mut rx = search.subscribe();
        let wait = DEFAULT_QUIET_PERIOD + config.request_timeout() + Duration::from_millis(100);
        let finished = tokio::time::timeout(
            wait,
            rx.wait_for(|r| r.as_ref().is_some_and(|r| r.query == last)),
        )
        .await;
        if finished.is_err() {
            log::warn!("no suggestions for {last:?} within {wait:?}");
        }
    }

    drop(search);
    printer.await.context("suggestion printer failed")?;
    Ok(())
}
