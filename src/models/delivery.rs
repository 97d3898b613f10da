use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Created,
    Assigned,
    AcceptedByAgent,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Completed,
    Failed,
    Returned,
    Cancelled,
}

impl DeliveryStatus {
    /// COMPLETED, FAILED and CANCELLED free the agent's workload slot and
    /// accept no further transitions. RETURNED is a branch, not an end state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Completed | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }

    /// Wire/metrics label, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Created => "CREATED",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::AcceptedByAgent => "ACCEPTED_BY_AGENT",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Completed => "COMPLETED",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::Returned => "RETURNED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    /// Exact predecessor required by each forward state; the three branch
    /// states are reachable from any in-progress state.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            DeliveryStatus::Created => false,
            DeliveryStatus::Assigned => self == DeliveryStatus::Created,
            DeliveryStatus::AcceptedByAgent => self == DeliveryStatus::Assigned,
            DeliveryStatus::PickedUp => self == DeliveryStatus::AcceptedByAgent,
            DeliveryStatus::InTransit => self == DeliveryStatus::PickedUp,
            DeliveryStatus::OutForDelivery => self == DeliveryStatus::InTransit,
            DeliveryStatus::Delivered => self == DeliveryStatus::OutForDelivery,
            DeliveryStatus::Completed => self == DeliveryStatus::Delivered,
            DeliveryStatus::Failed | DeliveryStatus::Returned | DeliveryStatus::Cancelled => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub status: DeliveryStatus,

    pub pickup_address: String,
    pub pickup_pincode: String,
    pub delivery_address: String,
    pub delivery_pincode: String,

    // Contact snapshots taken at creation; later profile edits must not
    // rewrite delivery history.
    pub buyer_name: String,
    pub buyer_phone: String,
    pub seller_name: String,
    pub seller_phone: String,

    pub tracking_id: String,
    pub current_location: Option<GeoPoint>,
    pub estimated_delivery_time: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub out_for_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub delivery_instructions: Option<String>,
    pub agent_notes: Option<String>,
    pub attempt_count: u32,
    pub failure_reason: Option<String>,

    pub buyer_rating: Option<u8>,
    pub buyer_feedback: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn can_be_assigned(&self) -> bool {
        self.status == DeliveryStatus::Created
    }

    pub fn can_be_accepted(&self) -> bool {
        self.status == DeliveryStatus::Assigned
    }

    pub fn can_be_picked_up(&self) -> bool {
        self.status == DeliveryStatus::AcceptedByAgent
    }

    pub fn can_be_delivered(&self) -> bool {
        self.status == DeliveryStatus::OutForDelivery
    }

    pub fn is_in_progress(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Sets the new status and stamps the matching timestamp field.
    /// Timestamps are append-only; an earlier stamp is never cleared.
    pub fn apply_status(&mut self, status: DeliveryStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;

        match status {
            DeliveryStatus::Created => {}
            DeliveryStatus::Assigned => self.assigned_at = Some(now),
            DeliveryStatus::AcceptedByAgent => self.accepted_at = Some(now),
            DeliveryStatus::PickedUp => self.picked_up_at = Some(now),
            DeliveryStatus::InTransit => self.in_transit_at = Some(now),
            DeliveryStatus::OutForDelivery => self.out_for_delivery_at = Some(now),
            DeliveryStatus::Delivered => self.delivered_at = Some(now),
            DeliveryStatus::Completed => self.completed_at = Some(now),
            DeliveryStatus::Failed | DeliveryStatus::Returned | DeliveryStatus::Cancelled => {}
        }
    }

    pub fn progress_percent(&self) -> u8 {
        match self.status {
            DeliveryStatus::Created => 0,
            DeliveryStatus::Assigned => 10,
            DeliveryStatus::AcceptedByAgent => 20,
            DeliveryStatus::PickedUp => 40,
            DeliveryStatus::InTransit => 60,
            DeliveryStatus::OutForDelivery => 80,
            DeliveryStatus::Delivered => 90,
            DeliveryStatus::Completed => 100,
            DeliveryStatus::Failed | DeliveryStatus::Returned | DeliveryStatus::Cancelled => 0,
        }
    }
}

/// Tracking ids are shared externally and must be unique across restarts:
/// creation-time millis plus the head of the record's own uuid.
pub fn generate_tracking_id(delivery_id: Uuid, created_at: DateTime<Utc>) -> String {
    let id_hex = delivery_id.simple().to_string();
    format!("VV{}{}", created_at.timestamp_millis(), &id_hex[..8])
}
