use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory;
use crate::engine::assignment::assign_best_agent;
use crate::error::AppError;
use crate::models::agent::{AgentStatus, GeoPoint};
use crate::models::area::DeliveryTier;
use crate::models::delivery::{generate_tracking_id, Delivery, DeliveryStatus};
use crate::models::event::DeliveryEvent;
use crate::models::order::Order;
use crate::state::AppState;

const MAX_DELIVERY_ATTEMPTS: u32 = 3;

pub(crate) fn emit_event(state: &AppState, delivery: &Delivery) {
    state
        .metrics
        .status_transitions_total
        .with_label_values(&[delivery.status.as_str()])
        .inc();
    state.publish_event(DeliveryEvent {
        delivery_id: delivery.id,
        order_id: delivery.order_id,
        tracking_id: delivery.tracking_id.clone(),
        status: delivery.status,
        agent_id: delivery.agent_id,
        occurred_at: delivery.updated_at,
    });
}

/// Creates the delivery for a confirmed order and immediately attempts
/// assignment. No eligible agent is not an error; the delivery stays
/// CREATED for the sweep to pick up.
pub fn create_delivery(
    state: &AppState,
    order: Order,
    delivery_address: String,
    delivery_pincode: String,
    delivery_instructions: Option<String>,
) -> Result<Delivery, AppError> {
    if !directory::is_serviceable(state, &delivery_pincode) {
        return Err(AppError::ServiceUnavailable(format!(
            "delivery not available for pincode {delivery_pincode}"
        )));
    }

    let eta_days = directory::eta_days_for(state, &delivery_pincode, DeliveryTier::Standard)?;
    let now = Utc::now();
    let id = Uuid::new_v4();

    // One delivery per order; the index entry is claimed before the record
    // is built so two concurrent creates cannot both pass the check.
    match state.order_index.entry(order.id) {
        dashmap::mapref::entry::Entry::Occupied(_) => {
            return Err(AppError::Conflict(format!(
                "order {} already has a delivery",
                order.id
            )));
        }
        dashmap::mapref::entry::Entry::Vacant(vacant) => {
            vacant.insert(id);
        }
    }

    let delivery = Delivery {
        id,
        order_id: order.id,
        agent_id: None,
        status: DeliveryStatus::Created,
        pickup_address: order.seller_address,
        pickup_pincode: order.seller_pincode,
        delivery_address,
        delivery_pincode,
        buyer_name: order.buyer_name,
        buyer_phone: order.buyer_phone,
        seller_name: order.seller_name,
        seller_phone: order.seller_phone,
        tracking_id: generate_tracking_id(id, now),
        current_location: None,
        estimated_delivery_time: now + Duration::days(i64::from(eta_days)),
        created_at: now,
        assigned_at: None,
        accepted_at: None,
        picked_up_at: None,
        in_transit_at: None,
        out_for_delivery_at: None,
        delivered_at: None,
        completed_at: None,
        delivery_instructions,
        agent_notes: None,
        attempt_count: 0,
        failure_reason: None,
        buyer_rating: None,
        buyer_feedback: None,
        updated_at: now,
    };

    state
        .tracking_index
        .insert(delivery.tracking_id.clone(), id);
    state.deliveries.insert(id, delivery.clone());
    info!(delivery_id = %id, order_id = %delivery.order_id, tracking_id = %delivery.tracking_id, "delivery created");
    emit_event(state, &delivery);

    assign_best_agent(state, id)
}

/// Strict status update: the transition must be legal from the current
/// status. CREATED and ASSIGNED are never set here; attachment changes go
/// through the assignment engine or `reassign_delivery`.
pub fn update_status(
    state: &AppState,
    delivery_id: Uuid,
    new_status: DeliveryStatus,
    notes: Option<String>,
) -> Result<Delivery, AppError> {
    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if matches!(
        new_status,
        DeliveryStatus::Created | DeliveryStatus::Assigned
    ) {
        return Err(AppError::InvalidTransition(format!(
            "{} is set by the assignment engine, not by status update",
            new_status.as_str()
        )));
    }

    if !delivery.status.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} cannot move from {} to {}",
            delivery.status.as_str(),
            new_status.as_str()
        )));
    }

    let now = Utc::now();
    delivery.apply_status(new_status, now);

    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        if new_status == DeliveryStatus::Failed {
            delivery.failure_reason = Some(notes.clone());
        }
        delivery.agent_notes = Some(match delivery.agent_notes.take() {
            Some(existing) => format!("{existing}\n{notes}"),
            None => notes,
        });
    }

    if new_status == DeliveryStatus::Failed {
        delivery.attempt_count += 1;
    }

    match new_status {
        DeliveryStatus::AcceptedByAgent => {
            if let Some(agent_id) = delivery.agent_id {
                if let Some(mut agent) = state.agents.get_mut(&agent_id) {
                    agent.status = AgentStatus::Busy;
                    agent.updated_at = now;
                }
            }
        }
        status if status.is_terminal() => {
            if let Some(agent_id) = delivery.agent_id {
                release_agent_slot(state, agent_id, status == DeliveryStatus::Completed);
            }
        }
        _ => {}
    }

    info!(delivery_id = %delivery_id, status = new_status.as_str(), "delivery status updated");
    emit_event(state, &delivery);
    Ok(delivery.clone())
}

/// Explicit acknowledgment from the agent-facing client.
pub fn accept_delivery(
    state: &AppState,
    delivery_id: Uuid,
    agent_id: Uuid,
) -> Result<Delivery, AppError> {
    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if !delivery.can_be_accepted() {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is not awaiting acceptance"
        )));
    }
    if delivery.agent_id != Some(agent_id) {
        return Err(AppError::InvalidTransition(format!(
            "agent {agent_id} is not assigned to delivery {delivery_id}"
        )));
    }

    let now = Utc::now();
    {
        let mut agent = state
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| AppError::NotFound(format!("agent {agent_id} not found")))?;
        agent.status = AgentStatus::Busy;
        agent.last_active_at = now;
        agent.updated_at = now;
    }

    delivery.apply_status(DeliveryStatus::AcceptedByAgent, now);
    info!(delivery_id = %delivery_id, agent_id = %agent_id, "delivery accepted");
    emit_event(state, &delivery);
    Ok(delivery.clone())
}

/// Administrative escape hatch: moves an in-progress delivery to another
/// agent without eligibility checks.
pub fn reassign_delivery(
    state: &AppState,
    delivery_id: Uuid,
    new_agent_id: Uuid,
) -> Result<Delivery, AppError> {
    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if !delivery.is_in_progress() {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is already {}",
            delivery.status.as_str()
        )));
    }
    if !state.agents.contains_key(&new_agent_id) {
        return Err(AppError::NotFound(format!("agent {new_agent_id} not found")));
    }

    if let Some(old_agent_id) = delivery.agent_id {
        release_agent_slot(state, old_agent_id, false);
    }

    {
        let mut agent = state
            .agents
            .get_mut(&new_agent_id)
            .ok_or_else(|| AppError::NotFound(format!("agent {new_agent_id} not found")))?;
        agent.status = AgentStatus::Assigned;
        agent.increment_workload();
        state
            .metrics
            .agent_workload
            .with_label_values(&[&new_agent_id.to_string()])
            .set(f64::from(agent.current_workload));
    }

    delivery.agent_id = Some(new_agent_id);
    delivery.apply_status(DeliveryStatus::Assigned, Utc::now());
    info!(delivery_id = %delivery_id, agent_id = %new_agent_id, "delivery reassigned");
    emit_event(state, &delivery);
    Ok(delivery.clone())
}

/// FIFO pass over unassigned deliveries, oldest first.
pub fn process_automatic_assignments(state: &AppState) {
    let mut pending: Vec<(DateTime<Utc>, Uuid)> = state
        .deliveries
        .iter()
        .filter(|entry| entry.value().can_be_assigned())
        .map(|entry| (entry.value().created_at, entry.value().id))
        .collect();
    pending.sort_by_key(|(created_at, _)| *created_at);

    for (_, delivery_id) in pending {
        if let Err(err) = assign_best_agent(state, delivery_id) {
            warn!(delivery_id = %delivery_id, error = %err, "automatic assignment failed");
        }
    }
}

/// Releases deliveries whose agent never accepted within the window:
/// back to CREATED with the agent's slot freed. Any status change before
/// the deadline makes this a no-op for that delivery.
pub fn release_expired_assignments(state: &AppState, now: DateTime<Utc>, timeout_secs: i64) {
    let expired: Vec<Uuid> = state
        .deliveries
        .iter()
        .filter(|entry| {
            let d = entry.value();
            d.status == DeliveryStatus::Assigned
                && d.assigned_at
                    .is_some_and(|at| at + Duration::seconds(timeout_secs) < now)
        })
        .map(|entry| entry.value().id)
        .collect();

    for delivery_id in expired {
        let Some(mut delivery) = state.deliveries.get_mut(&delivery_id) else {
            continue;
        };
        // Re-check under the guard; acceptance may have landed meanwhile.
        let still_expired = delivery.status == DeliveryStatus::Assigned
            && delivery
                .assigned_at
                .is_some_and(|at| at + Duration::seconds(timeout_secs) < now);
        if !still_expired {
            continue;
        }

        if let Some(agent_id) = delivery.agent_id.take() {
            release_agent_slot(state, agent_id, false);
            warn!(delivery_id = %delivery_id, agent_id = %agent_id, "acceptance window elapsed; assignment released");
        }
        delivery.status = DeliveryStatus::Created;
        delivery.updated_at = now;
        emit_event(state, &delivery);
    }
}

pub fn get_overdue_deliveries(state: &AppState, now: DateTime<Utc>) -> Vec<Delivery> {
    state
        .deliveries
        .iter()
        .filter(|entry| {
            let d = entry.value();
            d.estimated_delivery_time < now
                && !matches!(
                    d.status,
                    DeliveryStatus::Delivered
                        | DeliveryStatus::Completed
                        | DeliveryStatus::Failed
                        | DeliveryStatus::Cancelled
                )
        })
        .map(|entry| entry.value().clone())
        .collect()
}

pub fn get_retryable_deliveries(state: &AppState) -> Vec<Delivery> {
    state
        .deliveries
        .iter()
        .filter(|entry| {
            let d = entry.value();
            d.status == DeliveryStatus::Failed && d.attempt_count < MAX_DELIVERY_ATTEMPTS
        })
        .map(|entry| entry.value().clone())
        .collect()
}

/// Resubmits a failed delivery for assignment. Callers drive this; the
/// controller never retries on its own.
pub fn retry_delivery(state: &AppState, delivery_id: Uuid) -> Result<Delivery, AppError> {
    {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

        if delivery.status != DeliveryStatus::Failed
            || delivery.attempt_count >= MAX_DELIVERY_ATTEMPTS
        {
            return Err(AppError::InvalidTransition(format!(
                "delivery {delivery_id} is not retryable"
            )));
        }

        delivery.agent_id = None;
        delivery.status = DeliveryStatus::Created;
        delivery.updated_at = Utc::now();
        info!(delivery_id = %delivery_id, attempt = delivery.attempt_count, "failed delivery resubmitted");
        emit_event(state, &delivery);
    }

    assign_best_agent(state, delivery_id)
}

/// Lookup by tracking id first, then by raw delivery id.
pub fn track(state: &AppState, query: &str) -> Result<Delivery, AppError> {
    let by_tracking = state.tracking_index.get(query).map(|entry| *entry.value());
    if let Some(id) = by_tracking {
        if let Some(delivery) = state.deliveries.get(&id) {
            return Ok(delivery.clone());
        }
    }

    Uuid::parse_str(query)
        .ok()
        .and_then(|id| state.deliveries.get(&id).map(|entry| entry.value().clone()))
        .ok_or_else(|| AppError::NotFound(format!("no delivery matches {query}")))
}

/// Post-delivery buyer feedback; folds the rating into the agent's
/// running average. One rating per delivery.
pub fn rate_delivery(
    state: &AppState,
    delivery_id: Uuid,
    rating: u8,
    feedback: Option<String>,
) -> Result<Delivery, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }

    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if !matches!(
        delivery.status,
        DeliveryStatus::Delivered | DeliveryStatus::Completed
    ) {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} has not been delivered yet"
        )));
    }
    if delivery.buyer_rating.is_some() {
        return Err(AppError::Conflict(format!(
            "delivery {delivery_id} is already rated"
        )));
    }

    delivery.buyer_rating = Some(rating);
    delivery.buyer_feedback = feedback;
    delivery.updated_at = Utc::now();

    if let Some(agent_id) = delivery.agent_id {
        if let Some(mut agent) = state.agents.get_mut(&agent_id) {
            agent.record_rating(rating);
        }
    }

    Ok(delivery.clone())
}

/// Agent-reported position while the delivery is underway.
pub fn update_delivery_location(
    state: &AppState,
    delivery_id: Uuid,
    location: GeoPoint,
) -> Result<Delivery, AppError> {
    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if !delivery.is_in_progress() {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is already {}",
            delivery.status.as_str()
        )));
    }

    delivery.current_location = Some(location);
    delivery.updated_at = Utc::now();
    Ok(delivery.clone())
}

pub fn deliveries_for_agent(state: &AppState, agent_id: Uuid) -> Vec<Delivery> {
    state
        .deliveries
        .iter()
        .filter(|entry| entry.value().agent_id == Some(agent_id))
        .map(|entry| entry.value().clone())
        .collect()
}

/// Deliveries physically on the move.
pub fn active_deliveries(state: &AppState) -> Vec<Delivery> {
    state
        .deliveries
        .iter()
        .filter(|entry| {
            matches!(
                entry.value().status,
                DeliveryStatus::PickedUp
                    | DeliveryStatus::InTransit
                    | DeliveryStatus::OutForDelivery
            )
        })
        .map(|entry| entry.value().clone())
        .collect()
}

fn release_agent_slot(state: &AppState, agent_id: Uuid, completed: bool) {
    let Some(mut agent) = state.agents.get_mut(&agent_id) else {
        return;
    };
    agent.decrement_workload();
    if completed {
        agent.total_deliveries += 1;
    }
    if agent.current_workload == 0
        && matches!(agent.status, AgentStatus::Assigned | AgentStatus::Busy)
    {
        agent.status = AgentStatus::Free;
    }
    state
        .metrics
        .agent_workload
        .with_label_values(&[&agent_id.to_string()])
        .set(f64::from(agent.current_workload));
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::models::agent::DeliveryAgent;
    use crate::models::area::ServiceableArea;

    fn test_area(pincode: &str) -> ServiceableArea {
        let now = Utc::now();
        ServiceableArea {
            pincode: pincode.to_string(),
            area_name: "Connaught Place".to_string(),
            city: Some("New Delhi".to_string()),
            state: Some("Delhi".to_string()),
            is_active: true,
            is_premium: false,
            standard_delivery_days: 3,
            express_delivery_days: 1,
            standard_charge: 50.0,
            express_charge: 100.0,
            location: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_agent(pincode: &str, workload: u8) -> DeliveryAgent {
        let now = Utc::now();
        DeliveryAgent {
            id: Uuid::new_v4(),
            name: "Kiran".to_string(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            phone: "9876543210".to_string(),
            current_pincode: pincode.to_string(),
            status: AgentStatus::Free,
            current_workload: workload,
            rating: 4.5,
            rating_count: 0,
            total_deliveries: 20,
            is_online: true,
            vehicle_type: None,
            vehicle_number: None,
            current_location: None,
            serviceable_pincodes: HashSet::from([pincode.to_string()]),
            last_active_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_order() -> Order {
        Order {
            id: Uuid::new_v4(),
            buyer_name: "Asha".to_string(),
            buyer_phone: "8888888888".to_string(),
            seller_name: "Ravi".to_string(),
            seller_phone: "7777777777".to_string(),
            seller_address: "12 Market Road".to_string(),
            seller_pincode: "110001".to_string(),
            amount: 499.0,
        }
    }

    fn state_with_area() -> AppState {
        let state = AppState::new(64);
        state
            .areas
            .insert("110001".to_string(), test_area("110001"));
        state
    }

    #[test]
    fn create_rejects_non_serviceable_pincode() {
        let state = state_with_area();
        let result = create_delivery(
            &state,
            test_order(),
            "7 Lake View".to_string(),
            "999999".to_string(),
            None,
        );
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }

    #[test]
    fn create_sets_estimate_tracking_id_and_assigns() {
        let state = state_with_area();
        let agent = test_agent("110001", 0);
        let agent_id = agent.id;
        state.agents.insert(agent_id, agent);

        let before = Utc::now();
        let delivery = create_delivery(
            &state,
            test_order(),
            "7 Lake View".to_string(),
            "110001".to_string(),
            Some("leave at the gate".to_string()),
        )
        .unwrap();

        assert!(delivery.tracking_id.starts_with("VV"));
        let expected = before + Duration::days(3);
        let drift = (delivery.estimated_delivery_time - expected).num_seconds().abs();
        assert!(drift < 5);

        // An eligible agent existed, so the immediate attempt assigned it.
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert_eq!(delivery.agent_id, Some(agent_id));
        assert!(delivery.assigned_at.is_some());
        assert_eq!(state.agents.get(&agent_id).unwrap().current_workload, 1);
    }

    #[test]
    fn create_without_agents_stays_created() {
        let state = state_with_area();
        let delivery = create_delivery(
            &state,
            test_order(),
            "7 Lake View".to_string(),
            "110001".to_string(),
            None,
        )
        .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Created);
        assert!(delivery.agent_id.is_none());
    }

    #[test]
    fn one_delivery_per_order() {
        let state = state_with_area();
        let order = test_order();
        create_delivery(
            &state,
            order.clone(),
            "7 Lake View".to_string(),
            "110001".to_string(),
            None,
        )
        .unwrap();
        let second = create_delivery(
            &state,
            order,
            "7 Lake View".to_string(),
            "110001".to_string(),
            None,
        );
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    fn assigned_delivery(state: &AppState) -> (Uuid, Uuid) {
        let agent = test_agent("110001", 0);
        let agent_id = agent.id;
        state.agents.insert(agent_id, agent);
        let delivery = create_delivery(
            state,
            test_order(),
            "7 Lake View".to_string(),
            "110001".to_string(),
            None,
        )
        .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        (delivery.id, agent_id)
    }

    fn drive_to(state: &AppState, delivery_id: Uuid, agent_id: Uuid, target: DeliveryStatus) {
        accept_delivery(state, delivery_id, agent_id).unwrap();
        let path = [
            DeliveryStatus::PickedUp,
            DeliveryStatus::InTransit,
            DeliveryStatus::OutForDelivery,
            DeliveryStatus::Delivered,
            DeliveryStatus::Completed,
        ];
        for status in path {
            update_status(state, delivery_id, status, None).unwrap();
            if status == target {
                break;
            }
        }
    }

    #[test]
    fn illegal_jumps_are_rejected() {
        let state = state_with_area();
        let (delivery_id, _) = assigned_delivery(&state);

        // ASSIGNED -> DELIVERED skips the whole middle of the lifecycle.
        let result = update_status(&state, delivery_id, DeliveryStatus::Delivered, None);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));

        // Direct ASSIGNED writes are reserved for the assignment engine.
        let result = update_status(&state, delivery_id, DeliveryStatus::Assigned, None);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn terminal_deliveries_reject_further_updates() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);
        drive_to(&state, delivery_id, agent_id, DeliveryStatus::Completed);

        let result = update_status(&state, delivery_id, DeliveryStatus::Cancelled, None);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn completion_releases_the_agent_and_counts_the_delivery() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);
        drive_to(&state, delivery_id, agent_id, DeliveryStatus::Completed);

        let agent = state.agents.get(&agent_id).unwrap();
        assert_eq!(agent.current_workload, 0);
        assert_eq!(agent.status, AgentStatus::Free);
        assert_eq!(agent.total_deliveries, 21);

        let delivery = state.deliveries.get(&delivery_id).unwrap();
        assert!(delivery.delivered_at.is_some());
        assert!(delivery.completed_at.is_some());
    }

    #[test]
    fn acceptance_requires_the_assigned_agent() {
        let state = state_with_area();
        let (delivery_id, _) = assigned_delivery(&state);
        let stranger = Uuid::new_v4();
        let result = accept_delivery(&state, delivery_id, stranger);
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn failure_increments_attempts_and_enables_retry() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);

        update_status(
            &state,
            delivery_id,
            DeliveryStatus::Failed,
            Some("buyer unreachable".to_string()),
        )
        .unwrap();

        {
            let delivery = state.deliveries.get(&delivery_id).unwrap();
            assert_eq!(delivery.attempt_count, 1);
            assert_eq!(
                delivery.failure_reason.as_deref(),
                Some("buyer unreachable")
            );
        }
        assert_eq!(state.agents.get(&agent_id).unwrap().current_workload, 0);

        let retryable = get_retryable_deliveries(&state);
        assert_eq!(retryable.len(), 1);

        let retried = retry_delivery(&state, delivery_id).unwrap();
        // The agent freed up, so the resubmission assigned straight away.
        assert_eq!(retried.status, DeliveryStatus::Assigned);
        assert_eq!(retried.agent_id, Some(agent_id));
    }

    #[test]
    fn overdue_excludes_delivered_and_terminal() {
        let state = state_with_area();
        let (done_id, agent_id) = assigned_delivery(&state);
        drive_to(&state, done_id, agent_id, DeliveryStatus::Delivered);

        let (moving_id, agent2_id) = assigned_delivery(&state);
        accept_delivery(&state, moving_id, agent2_id).unwrap();
        update_status(&state, moving_id, DeliveryStatus::PickedUp, None).unwrap();
        update_status(&state, moving_id, DeliveryStatus::InTransit, None).unwrap();

        // Both estimates are in the past from a vantage point 10 days out.
        let later = Utc::now() + Duration::days(10);
        let overdue = get_overdue_deliveries(&state, later);
        let ids: Vec<Uuid> = overdue.iter().map(|d| d.id).collect();
        assert!(ids.contains(&moving_id));
        assert!(!ids.contains(&done_id));
    }

    #[test]
    fn expired_assignment_reverts_to_created_and_frees_the_agent() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);

        // Not yet expired: nothing happens.
        release_expired_assignments(&state, Utc::now(), 300);
        assert_eq!(
            state.deliveries.get(&delivery_id).unwrap().status,
            DeliveryStatus::Assigned
        );

        // Past the window: the assignment is released.
        release_expired_assignments(&state, Utc::now() + Duration::seconds(301), 300);
        let delivery = state.deliveries.get(&delivery_id).unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Created);
        assert!(delivery.agent_id.is_none());
        let agent = state.agents.get(&agent_id).unwrap();
        assert_eq!(agent.current_workload, 0);
        assert_eq!(agent.status, AgentStatus::Free);
    }

    #[test]
    fn accepted_delivery_is_not_released_by_the_sweep() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);
        accept_delivery(&state, delivery_id, agent_id).unwrap();

        release_expired_assignments(&state, Utc::now() + Duration::days(1), 300);
        assert_eq!(
            state.deliveries.get(&delivery_id).unwrap().status,
            DeliveryStatus::AcceptedByAgent
        );
    }

    #[test]
    fn track_finds_by_tracking_id_and_raw_id() {
        let state = state_with_area();
        let delivery = create_delivery(
            &state,
            test_order(),
            "7 Lake View".to_string(),
            "110001".to_string(),
            None,
        )
        .unwrap();

        assert_eq!(track(&state, &delivery.tracking_id).unwrap().id, delivery.id);
        assert_eq!(
            track(&state, &delivery.id.to_string()).unwrap().id,
            delivery.id
        );
        assert!(matches!(
            track(&state, "VV0000"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn rating_requires_delivery_and_updates_the_agent_average() {
        let state = state_with_area();
        let (delivery_id, agent_id) = assigned_delivery(&state);

        let early = rate_delivery(&state, delivery_id, 5, None);
        assert!(matches!(early, Err(AppError::InvalidTransition(_))));

        drive_to(&state, delivery_id, agent_id, DeliveryStatus::Delivered);
        rate_delivery(&state, delivery_id, 3, Some("late".to_string())).unwrap();

        let agent = state.agents.get(&agent_id).unwrap();
        assert_eq!(agent.rating_count, 1);
        assert!((agent.rating - 3.0).abs() < 1e-9);

        let again = rate_delivery(&state, delivery_id, 5, None);
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[test]
    fn concurrent_assignment_produces_exactly_one_increment() {
        // Single eligible agent with one capacity slot left; two callers
        // race on the same CREATED delivery.
        let state = Arc::new(state_with_area());
        let agent = test_agent("110001", 2);
        let agent_id = agent.id;
        state.agents.insert(agent_id, agent);

        let delivery = {
            // No agents yet eligible race-free path: build via create with
            // the agent temporarily offline so creation defers.
            state.agents.get_mut(&agent_id).unwrap().is_online = false;
            let d = create_delivery(
                &state,
                test_order(),
                "7 Lake View".to_string(),
                "110001".to_string(),
                None,
            )
            .unwrap();
            state.agents.get_mut(&agent_id).unwrap().is_online = true;
            d
        };
        assert_eq!(delivery.status, DeliveryStatus::Created);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let state = Arc::clone(&state);
                let id = delivery.id;
                std::thread::spawn(move || assign_best_agent(&state, id).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let agent = state.agents.get(&agent_id).unwrap();
        assert_eq!(agent.current_workload, 3);
        assert_eq!(agent.status, AgentStatus::Busy);
        let delivery = state.deliveries.get(&delivery.id).unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Assigned);
        assert_eq!(delivery.agent_id, Some(agent_id));
    }
}
