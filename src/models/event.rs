use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;

/// Broadcast on every status change. External notifiers (email, push) and
/// the websocket feed consume these; this crate never dispatches directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub tracking_id: String,
    pub status: DeliveryStatus,
    pub agent_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}
