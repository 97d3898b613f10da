use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::analytics;
use crate::engine::{assignment, lifecycle};
use crate::error::AppError;
use crate::models::agent::GeoPoint;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/active", get(active_deliveries))
        .route("/deliveries/overdue", get(overdue_deliveries))
        .route("/deliveries/retryable", get(retryable_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", post(assign_delivery))
        .route("/deliveries/:id/accept", post(accept_delivery))
        .route("/deliveries/:id/status", patch(update_status))
        .route("/deliveries/:id/location", patch(update_location))
        .route("/deliveries/:id/reassign", post(reassign_delivery))
        .route("/deliveries/:id/retry", post(retry_delivery))
        .route("/deliveries/:id/rating", post(rate_delivery))
        .route("/track/:code", get(track_delivery))
        .route("/analytics", get(get_analytics))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub order: Order,
    pub delivery_address: String,
    pub delivery_pincode: String,
    pub delivery_instructions: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct AcceptDeliveryRequest {
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    pub feedback: Option<String>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.delivery_address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "delivery address cannot be empty".to_string(),
        ));
    }

    let delivery = lifecycle::create_delivery(
        &state,
        payload.order,
        payload.delivery_address,
        payload.delivery_pincode,
        payload.delivery_instructions,
    )?;
    Ok(Json(delivery))
}

async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    let deliveries = state
        .deliveries
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(deliveries)
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;
    Ok(Json(delivery.value().clone()))
}

async fn track_delivery(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::track(&state, &code).map(Json)
}

async fn assign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    assignment::assign_best_agent(&state, id).map(Json)
}

async fn accept_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::accept_delivery(&state, id, payload.agent_id).map(Json)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::update_status(&state, id, payload.status, payload.notes).map(Json)
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::update_delivery_location(&state, id, payload.location).map(Json)
}

async fn reassign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::reassign_delivery(&state, id, payload.agent_id).map(Json)
}

async fn retry_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::retry_delivery(&state, id).map(Json)
}

async fn rate_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<Delivery>, AppError> {
    lifecycle::rate_delivery(&state, id, payload.rating, payload.feedback).map(Json)
}

async fn active_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    Json(lifecycle::active_deliveries(&state))
}

async fn overdue_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    Json(lifecycle::get_overdue_deliveries(&state, Utc::now()))
}

async fn retryable_deliveries(State(state): State<Arc<AppState>>) -> Json<Vec<Delivery>> {
    Json(lifecycle::get_retryable_deliveries(&state))
}

async fn get_analytics(
    State(state): State<Arc<AppState>>,
) -> Json<analytics::AnalyticsSnapshot> {
    Json(analytics::snapshot(&state))
}
