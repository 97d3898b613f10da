use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard ceiling on concurrent non-terminal deliveries per agent.
pub const MAX_CONCURRENT_DELIVERIES: u8 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Free,
    Assigned,
    Busy,
    Offline,
    OnBreak,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Bike,
    Scooter,
    Bicycle,
    Walking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAgent {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub current_pincode: String,
    pub status: AgentStatus,
    pub current_workload: u8,
    pub rating: f64,
    pub rating_count: u64,
    pub total_deliveries: u64,
    pub is_online: bool,
    pub vehicle_type: Option<VehicleType>,
    pub vehicle_number: Option<String>,
    pub current_location: Option<GeoPoint>,
    pub serviceable_pincodes: HashSet<String>,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
    pub fn can_take_new_order(&self) -> bool {
        self.is_online
            && self.status == AgentStatus::Free
            && self.current_workload < MAX_CONCURRENT_DELIVERIES
    }

    pub fn services_area(&self, pincode: &str) -> bool {
        self.serviceable_pincodes.contains(pincode)
    }

    pub fn increment_workload(&mut self) {
        self.current_workload = self.current_workload.saturating_add(1);
        if self.current_workload >= MAX_CONCURRENT_DELIVERIES {
            self.status = AgentStatus::Busy;
        }
        self.updated_at = Utc::now();
    }

    pub fn decrement_workload(&mut self) {
        self.current_workload = self.current_workload.saturating_sub(1);
        if self.current_workload < MAX_CONCURRENT_DELIVERIES && self.status == AgentStatus::Busy {
            self.status = AgentStatus::Free;
        }
        self.updated_at = Utc::now();
    }

    /// Folds a new buyer rating into the running average.
    pub fn record_rating(&mut self, rating: u8) {
        let total = self.rating * self.rating_count as f64 + f64::from(rating);
        self.rating_count += 1;
        self.rating = total / self.rating_count as f64;
        self.updated_at = Utc::now();
    }
}
