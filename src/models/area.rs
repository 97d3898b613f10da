use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::agent::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryTier {
    Standard,
    Express,
}

/// Reference data keyed by pincode. A pincode is serviceable iff a record
/// exists and `is_active` is true; charge/ETA are undefined otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceableArea {
    pub pincode: String,
    pub area_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub is_active: bool,
    pub is_premium: bool,
    pub standard_delivery_days: u32,
    pub express_delivery_days: u32,
    pub standard_charge: f64,
    pub express_charge: f64,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceableArea {
    pub fn is_serviceable(&self) -> bool {
        self.is_active
    }

    pub fn charge_for(&self, tier: DeliveryTier) -> f64 {
        match tier {
            DeliveryTier::Standard => self.standard_charge,
            DeliveryTier::Express => self.express_charge,
        }
    }

    pub fn eta_days_for(&self, tier: DeliveryTier) -> u32 {
        match tier {
            DeliveryTier::Standard => self.standard_delivery_days,
            DeliveryTier::Express => self.express_delivery_days,
        }
    }
}
