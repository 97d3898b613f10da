//! Read-only aggregation over the delivery and agent stores. Snapshots are
//! pure in-memory folds and must stay off the transactional path; empty
//! windows report zeros, never errors.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::delivery::DeliveryStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_deliveries: usize,
    pub active_deliveries: usize,
    pub completed_deliveries: usize,
    pub failed_deliveries: usize,
    pub total_agents: usize,
    pub online_agents: usize,
    pub available_agents: usize,
    pub average_delivery_time_hours: f64,
    pub weekly_success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_id: Uuid,
    pub total_deliveries: u64,
    pub current_workload: u8,
    pub rating: f64,
    pub status: AgentStatus,
    pub completed_deliveries: usize,
    pub failed_deliveries: usize,
    pub success_rate: f64,
}

pub fn snapshot(state: &AppState) -> AnalyticsSnapshot {
    let total_deliveries = state.deliveries.len();
    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut active = 0usize;

    let mut delivered_hours_sum = 0.0;
    let mut delivered_count = 0usize;

    let week_ago = Utc::now() - Duration::weeks(1);
    let mut created_in_window = 0usize;
    let mut delivered_in_window = 0usize;

    for entry in state.deliveries.iter() {
        let d = entry.value();
        match d.status {
            DeliveryStatus::Completed => completed += 1,
            DeliveryStatus::Failed => failed += 1,
            DeliveryStatus::PickedUp
            | DeliveryStatus::InTransit
            | DeliveryStatus::OutForDelivery => active += 1,
            _ => {}
        }

        if let Some(delivered_at) = d.delivered_at {
            let hours = (delivered_at - d.created_at).num_seconds() as f64 / 3600.0;
            delivered_hours_sum += hours;
            delivered_count += 1;
        }

        if d.created_at >= week_ago {
            created_in_window += 1;
            if d.delivered_at.is_some() {
                delivered_in_window += 1;
            }
        }
    }

    let total_agents = state.agents.len();
    let mut online_agents = 0usize;
    let mut available_agents = 0usize;
    for entry in state.agents.iter() {
        let agent = entry.value();
        if agent.is_online {
            online_agents += 1;
        }
        if agent.can_take_new_order() {
            available_agents += 1;
        }
    }

    let average_delivery_time_hours = if delivered_count > 0 {
        delivered_hours_sum / delivered_count as f64
    } else {
        0.0
    };
    let weekly_success_rate = if created_in_window > 0 {
        delivered_in_window as f64 * 100.0 / created_in_window as f64
    } else {
        0.0
    };

    AnalyticsSnapshot {
        total_deliveries,
        active_deliveries: active,
        completed_deliveries: completed,
        failed_deliveries: failed,
        total_agents,
        online_agents,
        available_agents,
        average_delivery_time_hours,
        weekly_success_rate,
    }
}

pub fn agent_stats(state: &AppState, agent_id: Uuid) -> Result<AgentStats, AppError> {
    let (total, workload, rating, status) = {
        let agent = state
            .agents
            .get(&agent_id)
            .ok_or_else(|| AppError::NotFound(format!("agent {agent_id} not found")))?;
        (
            agent.total_deliveries,
            agent.current_workload,
            agent.rating,
            agent.status,
        )
    };

    let deliveries = lifecycle::deliveries_for_agent(state, agent_id);
    let completed = deliveries
        .iter()
        .filter(|d| d.status == DeliveryStatus::Completed)
        .count();
    let failed = deliveries
        .iter()
        .filter(|d| d.status == DeliveryStatus::Failed)
        .count();
    let success_rate = if deliveries.is_empty() {
        0.0
    } else {
        completed as f64 * 100.0 / deliveries.len() as f64
    };

    Ok(AgentStats {
        agent_id,
        total_deliveries: total,
        current_workload: workload,
        rating,
        status,
        completed_deliveries: completed,
        failed_deliveries: failed,
        success_rate,
    })
}
