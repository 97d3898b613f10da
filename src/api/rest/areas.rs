use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::directory;
use crate::error::AppError;
use crate::models::agent::GeoPoint;
use crate::models::area::{DeliveryTier, ServiceableArea};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/areas", post(create_area).get(list_areas))
        .route("/areas/:pincode", get(get_area))
        .route("/serviceability/:pincode", get(serviceability))
}

#[derive(Deserialize)]
pub struct CreateAreaRequest {
    pub pincode: String,
    pub area_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "default_standard_days")]
    pub standard_delivery_days: u32,
    #[serde(default = "default_express_days")]
    pub express_delivery_days: u32,
    #[serde(default = "default_standard_charge")]
    pub standard_charge: f64,
    #[serde(default = "default_express_charge")]
    pub express_charge: f64,
    pub location: Option<GeoPoint>,
}

fn default_true() -> bool {
    true
}
fn default_standard_days() -> u32 {
    3
}
fn default_express_days() -> u32 {
    1
}
fn default_standard_charge() -> f64 {
    50.0
}
fn default_express_charge() -> f64 {
    100.0
}

#[derive(Serialize)]
struct TierQuote {
    charge: f64,
    days: u32,
}

#[derive(Serialize)]
struct ServiceabilityResponse {
    pincode: String,
    serviceable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    standard: Option<TierQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    express: Option<TierQuote>,
}

async fn create_area(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAreaRequest>,
) -> Result<Json<ServiceableArea>, AppError> {
    if payload.pincode.trim().is_empty() {
        return Err(AppError::BadRequest("pincode cannot be empty".to_string()));
    }
    if state.areas.contains_key(&payload.pincode) {
        return Err(AppError::Conflict(format!(
            "area {} already exists",
            payload.pincode
        )));
    }

    let now = Utc::now();
    let area = ServiceableArea {
        pincode: payload.pincode.clone(),
        area_name: payload.area_name,
        city: payload.city,
        state: payload.state,
        is_active: payload.is_active,
        is_premium: payload.is_premium,
        standard_delivery_days: payload.standard_delivery_days,
        express_delivery_days: payload.express_delivery_days,
        standard_charge: payload.standard_charge,
        express_charge: payload.express_charge,
        location: payload.location,
        created_at: now,
        updated_at: now,
    };

    state.areas.insert(payload.pincode, area.clone());
    Ok(Json(area))
}

async fn list_areas(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceableArea>> {
    let areas = state
        .areas
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(areas)
}

async fn get_area(
    State(state): State<Arc<AppState>>,
    Path(pincode): Path<String>,
) -> Result<Json<ServiceableArea>, AppError> {
    let area = state
        .areas
        .get(&pincode)
        .ok_or_else(|| AppError::NotFound(format!("area {pincode} not found")))?;
    Ok(Json(area.value().clone()))
}

async fn serviceability(
    State(state): State<Arc<AppState>>,
    Path(pincode): Path<String>,
) -> Json<ServiceabilityResponse> {
    if !directory::is_serviceable(&state, &pincode) {
        return Json(ServiceabilityResponse {
            pincode,
            serviceable: false,
            standard: None,
            express: None,
        });
    }

    // The record is active, so the tier lookups cannot miss.
    let standard = TierQuote {
        charge: directory::charge_for(&state, &pincode, DeliveryTier::Standard).unwrap_or(0.0),
        days: directory::eta_days_for(&state, &pincode, DeliveryTier::Standard).unwrap_or(0),
    };
    let express = TierQuote {
        charge: directory::charge_for(&state, &pincode, DeliveryTier::Express).unwrap_or(0.0),
        days: directory::eta_days_for(&state, &pincode, DeliveryTier::Express).unwrap_or(0),
    };

    Json(ServiceabilityResponse {
        pincode,
        serviceable: true,
        standard: Some(standard),
        express: Some(express),
    })
}
