use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::bods::{BodsClient, FeedFormat};
use crate::error::{Error, Result};
use crate::model::{BoundingBox, DistanceUnit, GeoPoint, RankedVehicle, VehiclePosition};
use crate::postcode::{GeocodedPostcode, PostcodeClient};
use crate::snapshot::{build_snapshot, find_vehicle, within_radius};

const DASHBOARD_HTML: &str = include_str!("../static/index.html");

/// Upper bound on `limit` so a typo can't ask for the whole country.
const MAX_LIMIT: usize = 500;

pub struct AppState {
    pub bods: BodsClient,
    pub geocoder: PostcodeClient,
    pub default_limit: usize,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/buses", get(all_buses))
        .route("/api/buses/{vehicle_ref}", get(bus_details))
        .route("/api/postcode/{postcode}", get(lookup_postcode))
        .route("/api/nearby", get(nearby_buses))
        .route("/api/nearby.csv", get(nearby_buses_csv))
        .layer(cors)
        .with_state(state)
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct BusesResponse {
    fetched_at: DateTime<Utc>,
    feed: FeedFormat,
    bounding_box: BoundingBox,
    center: GeoPoint,
    count: usize,
    buses: Vec<VehiclePosition>,
}

// Every bus currently reported inside the configured area
async fn all_buses(State(state): State<Arc<AppState>>) -> Result<Json<BusesResponse>> {
    let feed = state.bods.vehicles().await?;
    let bounding_box = state.bods.bounding_box();

    Ok(Json(BusesResponse {
        fetched_at: feed.fetched_at,
        feed: state.bods.format(),
        bounding_box,
        center: bounding_box.center(),
        count: feed.vehicles.len(),
        buses: feed.vehicles.clone(),
    }))
}

async fn bus_details(
    State(state): State<Arc<AppState>>,
    Path(vehicle_ref): Path<String>,
) -> Result<Json<VehiclePosition>> {
    let feed = state.bods.vehicles().await?;
    find_vehicle(&feed.vehicles, &vehicle_ref)
        .cloned()
        .map(Json)
        .ok_or(Error::VehicleNotFound(vehicle_ref))
}

async fn lookup_postcode(
    State(state): State<Arc<AppState>>,
    Path(postcode): Path<String>,
) -> Result<Json<GeocodedPostcode>> {
    Ok(Json(state.geocoder.geocode(&postcode).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct NearbyQuery {
    pub postcode: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub limit: Option<usize>,
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub unit: DistanceUnit,
}

impl NearbyQuery {
    /// Limit to apply, falling back to `default_limit`.
    fn effective_limit(&self, default_limit: usize) -> Result<usize> {
        match self.limit {
            Some(0) => Err(Error::invalid_argument("limit must be at least 1")),
            Some(n) => Ok(n.min(MAX_LIMIT)),
            None => Ok(default_limit),
        }
    }

    fn radius(&self) -> Result<Option<f64>> {
        match self.radius_km {
            Some(r) if !(r.is_finite() && r >= 0.0) => Err(Error::invalid_argument(
                "radius_km must be a non-negative number",
            )),
            other => Ok(other),
        }
    }

    /// Coordinates given directly in the query, if any.
    fn explicit_point(&self) -> Result<Option<GeoPoint>> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => GeoPoint::try_new(lat, lon).map(Some),
            (None, None) => Ok(None),
            _ => Err(Error::invalid_argument("lat and lon must be given together")),
        }
    }
}

#[derive(Debug, Serialize)]
struct NearbyBus {
    #[serde(flatten)]
    ranked: RankedVehicle,
    /// Distance in the requested unit
    distance: f64,
}

#[derive(Debug, Serialize)]
struct NearbyResponse {
    reference: GeoPoint,
    postcode: Option<String>,
    unit: DistanceUnit,
    fetched_at: DateTime<Utc>,
    total_in_area: usize,
    count: usize,
    buses: Vec<NearbyBus>,
}

async fn resolve_nearby(state: &AppState, query: &NearbyQuery) -> Result<NearbyResponse> {
    let limit = query.effective_limit(state.default_limit)?;
    let radius = query.radius()?;

    let (reference, postcode) = match (query.explicit_point()?, query.postcode.as_deref()) {
        (Some(point), _) => (point, None),
        (None, Some(raw)) => {
            let geocoded = state.geocoder.geocode(raw).await?;
            (geocoded.point, Some(geocoded.postcode))
        }
        (None, None) => {
            return Err(Error::invalid_argument(
                "either postcode or lat/lon is required",
            ))
        }
    };

    let feed = state.bods.vehicles().await?;

    let vehicles = feed.vehicles.iter().cloned();
    let ranked = match radius {
        Some(radius_km) => {
            let mut ranked = within_radius(build_snapshot(reference, vehicles, None), radius_km);
            ranked.truncate(limit);
            ranked
        }
        None => build_snapshot(reference, vehicles, Some(limit)),
    };

    tracing::info!(
        lat = reference.latitude,
        lon = reference.longitude,
        postcode = postcode.as_deref().unwrap_or("-"),
        total = feed.vehicles.len(),
        shown = ranked.len(),
        "Built nearby snapshot"
    );

    let buses: Vec<NearbyBus> = ranked
        .into_iter()
        .map(|ranked| NearbyBus {
            distance: ranked.distance_in(query.unit),
            ranked,
        })
        .collect();

    Ok(NearbyResponse {
        reference,
        postcode,
        unit: query.unit,
        fetched_at: feed.fetched_at,
        total_in_area: feed.vehicles.len(),
        count: buses.len(),
        buses,
    })
}

async fn nearby_buses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>> {
    Ok(Json(resolve_nearby(&state, &query).await?))
}

async fn nearby_buses_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Response> {
    let nearby = resolve_nearby(&state, &query).await?;
    let body = nearby_to_csv(&nearby.buses, nearby.unit)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"nearby-buses.csv\""),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    vehicle_ref: &'a str,
    line: Option<&'a str>,
    direction: Option<&'a str>,
    operator: Option<&'a str>,
    destination: Option<&'a str>,
    next_stop: Option<&'a str>,
    latitude: f64,
    longitude: f64,
    distance: String,
    recorded_at: Option<String>,
}

fn nearby_to_csv(buses: &[NearbyBus], unit: DistanceUnit) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for bus in buses {
        let vehicle = &bus.ranked.vehicle;
        let meta = &vehicle.metadata;
        writer.serialize(CsvRow {
            vehicle_ref: &vehicle.vehicle_ref,
            line: meta.line.as_deref(),
            direction: meta.direction.as_deref(),
            operator: meta.operator.as_deref(),
            destination: meta.destination.as_deref(),
            next_stop: meta.next_stop.as_deref(),
            latitude: vehicle.point.latitude,
            longitude: vehicle.point.longitude,
            distance: format!("{:.2} {}", bus.distance, unit.suffix()),
            recorded_at: meta.recorded_at.map(|t| t.to_rfc3339()),
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
