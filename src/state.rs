use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::agent::DeliveryAgent;
use crate::models::area::ServiceableArea;
use crate::models::delivery::Delivery;
use crate::models::event::DeliveryEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub deliveries: DashMap<Uuid, Delivery>,
    pub agents: DashMap<Uuid, DeliveryAgent>,
    pub areas: DashMap<String, ServiceableArea>,
    /// tracking id -> delivery id
    pub tracking_index: DashMap<String, Uuid>,
    /// order id -> delivery id; enforces one delivery per order
    pub order_index: DashMap<Uuid, Uuid>,
    pub delivery_events_tx: broadcast::Sender<DeliveryEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let (delivery_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            deliveries: DashMap::new(),
            agents: DashMap::new(),
            areas: DashMap::new(),
            tracking_index: DashMap::new(),
            order_index: DashMap::new(),
            delivery_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn publish_event(&self, event: DeliveryEvent) {
        // Nobody listening is fine; the feed is best-effort.
        let _ = self.delivery_events_tx.send(event);
    }
}
