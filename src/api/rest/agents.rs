use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::analytics;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::agent::{
    AgentStatus, DeliveryAgent, GeoPoint, VehicleType, MAX_CONCURRENT_DELIVERIES,
};
use crate::models::delivery::Delivery;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/available/:pincode", get(available_agents))
        .route("/agents/:id", get(get_agent).patch(update_agent))
        .route("/agents/:id/toggle-online", post(toggle_online))
        .route("/agents/:id/location", patch(update_location))
        .route("/agents/:id/stats", get(agent_stats))
        .route("/agents/:id/deliveries", get(agent_deliveries))
}

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub current_pincode: String,
    pub vehicle_type: Option<VehicleType>,
    pub vehicle_number: Option<String>,
    pub serviceable_pincodes: HashSet<String>,
}

#[derive(Deserialize)]
pub struct UpdateAgentRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub current_pincode: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    pub vehicle_number: Option<String>,
    pub serviceable_pincodes: Option<HashSet<String>>,
    /// Break management only; other statuses are bookkeeping outcomes.
    pub status: Option<AgentStatus>,
}

#[derive(Deserialize)]
pub struct UpdateAgentLocationRequest {
    pub location: GeoPoint,
    pub pincode: Option<String>,
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAgentRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.email.trim().is_empty() {
        return Err(AppError::BadRequest("email cannot be empty".to_string()));
    }
    if payload.serviceable_pincodes.is_empty() {
        return Err(AppError::BadRequest(
            "agent must service at least one pincode".to_string(),
        ));
    }

    let now = Utc::now();
    let agent = DeliveryAgent {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
        current_pincode: payload.current_pincode,
        status: AgentStatus::Free,
        current_workload: 0,
        rating: 5.0,
        rating_count: 0,
        total_deliveries: 0,
        is_online: true,
        vehicle_type: payload.vehicle_type,
        vehicle_number: payload.vehicle_number,
        current_location: None,
        serviceable_pincodes: payload.serviceable_pincodes,
        last_active_at: now,
        created_at: now,
        updated_at: now,
    };

    state.agents.insert(agent.id, agent.clone());
    Ok(Json(agent))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryAgent>> {
    let agents = state
        .agents
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(agents)
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let agent = state
        .agents
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))?;
    Ok(Json(agent.value().clone()))
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let mut agent = state
        .agents
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))?;

    if let Some(status) = payload.status {
        let allowed = matches!(
            (agent.status, status),
            (AgentStatus::Free, AgentStatus::OnBreak) | (AgentStatus::OnBreak, AgentStatus::Free)
        );
        if !allowed {
            return Err(AppError::InvalidTransition(format!(
                "agent status can only switch between FREE and ON_BREAK, not to {status:?}"
            )));
        }
        agent.status = status;
    }

    if let Some(name) = payload.name {
        agent.name = name;
    }
    if let Some(phone) = payload.phone {
        agent.phone = phone;
    }
    if let Some(pincode) = payload.current_pincode {
        agent.current_pincode = pincode;
    }
    if let Some(vehicle_type) = payload.vehicle_type {
        agent.vehicle_type = Some(vehicle_type);
    }
    if let Some(vehicle_number) = payload.vehicle_number {
        agent.vehicle_number = Some(vehicle_number);
    }
    if let Some(pincodes) = payload.serviceable_pincodes {
        agent.serviceable_pincodes = pincodes;
    }
    agent.updated_at = Utc::now();

    Ok(Json(agent.clone()))
}

async fn toggle_online(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let mut agent = state
        .agents
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))?;

    let now = Utc::now();
    agent.is_online = !agent.is_online;
    agent.last_active_at = now;
    agent.updated_at = now;

    if !agent.is_online {
        agent.status = AgentStatus::Offline;
    } else if agent.current_workload >= MAX_CONCURRENT_DELIVERIES {
        agent.status = AgentStatus::Busy;
    } else {
        agent.status = AgentStatus::Free;
    }

    Ok(Json(agent.clone()))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentLocationRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let mut agent = state
        .agents
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))?;

    let now = Utc::now();
    agent.current_location = Some(payload.location);
    if let Some(pincode) = payload.pincode {
        agent.current_pincode = pincode;
    }
    agent.last_active_at = now;
    agent.updated_at = now;

    Ok(Json(agent.clone()))
}

async fn available_agents(
    State(state): State<Arc<AppState>>,
    Path(pincode): Path<String>,
) -> Json<Vec<DeliveryAgent>> {
    let agents = state
        .agents
        .iter()
        .filter(|entry| {
            let agent = entry.value();
            agent.can_take_new_order() && agent.services_area(&pincode)
        })
        .map(|entry| entry.value().clone())
        .collect();
    Json(agents)
}

async fn agent_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<analytics::AgentStats>, AppError> {
    analytics::agent_stats(&state, id).map(Json)
}

async fn agent_deliveries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    if !state.agents.contains_key(&id) {
        return Err(AppError::NotFound(format!("agent {id} not found")));
    }
    Ok(Json(lifecycle::deliveries_for_agent(&state, id)))
}
