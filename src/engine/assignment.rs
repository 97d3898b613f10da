use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::lifecycle;
use crate::engine::scoring::compute_score;
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::state::AppState;

/// Picks the best eligible agent for a CREATED delivery and commits the
/// joint mutation: delivery -> ASSIGNED, agent workload +1.
///
/// The delivery's map guard is held for the whole read-decide-write
/// sequence and the winning agent is re-validated under its own guard, so
/// two concurrent attempts for one delivery serialize and exactly one can
/// succeed. Lock order is always delivery before agent.
pub fn assign_best_agent(state: &AppState, delivery_id: Uuid) -> Result<Delivery, AppError> {
    let start = Instant::now();

    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if !delivery.can_be_assigned() {
        return Ok(delivery.clone());
    }

    // Snapshot of eligible agents; eligibility is re-checked under the
    // agent guard before committing, since another delivery may have
    // claimed the remaining capacity in the meantime.
    let mut candidates: Vec<(Uuid, f64, u8, f64)> = state
        .agents
        .iter()
        .filter(|entry| {
            let agent = entry.value();
            agent.can_take_new_order() && agent.services_area(&delivery.delivery_pincode)
        })
        .map(|entry| {
            let agent = entry.value();
            let (score, _breakdown) = compute_score(agent, &delivery);
            (agent.id, score, agent.current_workload, agent.rating)
        })
        .collect();

    if candidates.is_empty() {
        debug!(delivery_id = %delivery_id, pincode = %delivery.delivery_pincode, "no eligible agents; deferring");
        record_outcome(state, "deferred", start);
        return Ok(delivery.clone());
    }

    // Highest score first; ties go to the lowest workload, then the
    // highest rating, so selection is deterministic.
    candidates.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then(a.2.cmp(&b.2))
            .then(b.3.total_cmp(&a.3))
    });

    for (agent_id, score, _, _) in candidates {
        let Some(mut agent) = state.agents.get_mut(&agent_id) else {
            continue;
        };
        if !agent.can_take_new_order() || !agent.services_area(&delivery.delivery_pincode) {
            continue;
        }

        agent.status = AgentStatus::Assigned;
        agent.increment_workload();
        state
            .metrics
            .agent_workload
            .with_label_values(&[&agent_id.to_string()])
            .set(f64::from(agent.current_workload));
        drop(agent);

        delivery.agent_id = Some(agent_id);
        delivery.apply_status(DeliveryStatus::Assigned, Utc::now());

        info!(
            delivery_id = %delivery_id,
            agent_id = %agent_id,
            score = score,
            "delivery assigned"
        );
        record_outcome(state, "assigned", start);
        lifecycle::emit_event(state, &delivery);
        return Ok(delivery.clone());
    }

    debug!(delivery_id = %delivery_id, "all candidates lost eligibility; deferring");
    record_outcome(state, "deferred", start);
    Ok(delivery.clone())
}

fn record_outcome(state: &AppState, outcome: &str, start: Instant) {
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();
}

/// Recurring background job: releases assignments whose acceptance window
/// elapsed, then retries every delivery still waiting for an agent.
pub async fn run_assignment_sweep(state: Arc<AppState>, config: Config) {
    info!(
        interval_secs = config.sweep_interval_secs,
        accept_timeout_secs = config.accept_timeout_secs,
        "assignment sweep started"
    );

    let mut ticker = interval(Duration::from_secs(config.sweep_interval_secs.max(1)));
    // The first tick of tokio's interval fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        lifecycle::release_expired_assignments(&state, Utc::now(), config.accept_timeout_secs);
        lifecycle::process_automatic_assignments(&state);
    }
}
