//! Actix-Web proxy for elevation tiles and place photos.
//!
//! Keeps API keys server-side and adds long-lived cache headers so the
//! browser's shadow layer only downloads each tile once.

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::{StatusCode, header},
    middleware, web,
};
use serde::Deserialize;
use sunnyspots_core::{
    CachedFetcher, Config, FetchOptions, HttpTransport, PlacesClient, ReqwestTransport,
    fetch::SharedFetcher,
};

pub const TILE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const PHOTO_CACHE_CONTROL: &str = "public, max-age=86400";
const DEFAULT_PHOTO_WIDTH: u32 = 400;

/// Shared application state.
pub struct ProxyState<T> {
    pub fetcher: Arc<CachedFetcher<T>>,
    /// Base URL of the Terrarium tile bucket.
    pub tiles_base: String,
    /// `None` when no Places key is configured; photo requests then fail.
    pub photos: Option<PlacesClient<T>>,
}

impl<T: HttpTransport> ProxyState<T> {
    pub fn new(config: &Config, fetcher: Arc<CachedFetcher<T>>) -> Self {
        let photos = match PlacesClient::from_config(config, Arc::clone(&fetcher)) {
            Ok(client) => Some(client),
            Err(e) => {
                log::warn!("Photo proxy disabled: {e}");
                None
            }
        };
        Self {
            fetcher,
            tiles_base: config.endpoints.elevation_tiles.trim_end_matches('/').to_string(),
            photos,
        }
    }
}

pub fn routes<T: HttpTransport + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .route("/elevation/{z}/{x}/{y}", web::get().to(elevation_tile::<T>))
            .route("/photo", web::get().to(photo::<T>)),
    );
}

pub async fn run_server(config: &Config, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let transport: Box<dyn HttpTransport> = Box::new(ReqwestTransport::new(config.request_timeout())?);
    let fetcher: SharedFetcher = Arc::new(CachedFetcher::new(transport));
    let state = web::Data::new(ProxyState::new(config, fetcher));

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes::<Box<dyn HttpTransport>>)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

fn upstream_failure(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({ "error": message }))
}

/// Parses a tile path segment; the last one may carry a `.png` suffix.
fn tile_coordinate(segment: &str) -> Option<u32> {
    segment.strip_suffix(".png").unwrap_or(segment).parse().ok()
}

async fn elevation_tile<T: HttpTransport + 'static>(
    state: web::Data<ProxyState<T>>,
    path: web::Path<(String, String, String)>,
) -> HttpResponse {
    let (z, x, y) = path.into_inner();
    let (Some(z), Some(x), Some(y)) = (tile_coordinate(&z), tile_coordinate(&x), tile_coordinate(&y))
    else {
        return bad_request("z, x and y must be non-negative integers");
    };

    let url = format!("{}/{z}/{x}/{y}.png", state.tiles_base);
    // Browsers keep tiles for a year; storing them here too would only grow memory.
    let options = FetchOptions::default().revalidate(Duration::ZERO);

    match state.fetcher.fetch_cached(&url, options).await {
        Ok(res) if res.is_success() => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "image/png"))
            .insert_header((header::CACHE_CONTROL, TILE_CACHE_CONTROL))
            .body(res.body),
        Ok(res) => {
            log::warn!("elevation tile {z}/{x}/{y} upstream status {}", res.status);
            let status = StatusCode::from_u16(res.status).unwrap_or(StatusCode::BAD_GATEWAY);
            HttpResponse::build(status).body(res.status_text().to_string())
        }
        Err(e) => {
            log::error!("elevation tile {z}/{x}/{y} fetch failed: {e}");
            upstream_failure("Failed to fetch elevation tile")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    reference: Option<String>,
    width: Option<String>,
}

async fn photo<T: HttpTransport + 'static>(
    state: web::Data<ProxyState<T>>,
    query: web::Query<PhotoQuery>,
) -> HttpResponse {
    let query = query.into_inner();
    let Some(reference) = query.reference.filter(|r| !r.trim().is_empty()) else {
        return bad_request("missing required parameter: reference");
    };
    let width = match query.width.as_deref() {
        None | Some("") => DEFAULT_PHOTO_WIDTH,
        Some(w) => match w.parse::<u32>() {
            Ok(w) if w > 0 => w,
            _ => return bad_request("width must be a positive integer"),
        },
    };

    let Some(places) = state.photos.as_ref() else {
        return upstream_failure("photo proxy is not configured");
    };
    let url = match places.photo_url(&reference, width) {
        Ok(url) => url,
        Err(e) => {
            log::error!("photo url: {e}");
            return upstream_failure("Failed to fetch photo");
        }
    };

    match state.fetcher.fetch_cached(url.as_str(), FetchOptions::default()).await {
        Ok(res) if res.is_success() => HttpResponse::Ok()
            .insert_header((
                header::CONTENT_TYPE,
                res.content_type.clone().unwrap_or_else(|| "image/jpeg".to_string()),
            ))
            .insert_header((header::CACHE_CONTROL, PHOTO_CACHE_CONTROL))
            .body(res.body),
        Ok(res) => {
            log::warn!("photo {reference} upstream status {}", res.status);
            upstream_failure("Failed to fetch photo")
        }
        Err(e) => {
            log::error!("photo {reference} fetch failed: {e}");
            upstream_failure("Failed to fetch photo")
        }
    }
}
