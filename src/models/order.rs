use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confirmed order handed over by the order-management component. Only the
/// fields a delivery snapshots at creation; this crate never stores orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_name: String,
    pub buyer_phone: String,
    pub seller_name: String,
    pub seller_phone: String,
    pub seller_address: String,
    pub seller_pincode: String,
    pub amount: f64,
}
