use serde::{Deserialize, Serialize};

use crate::models::agent::{DeliveryAgent, MAX_CONCURRENT_DELIVERIES};
use crate::models::delivery::Delivery;

// Composite weighting: spare capacity 0.4, rating 0.3, locality 0.2,
// experience 0.1, on a 0-100-ish scale.
const WORKLOAD_POINTS_PER_SLOT: f64 = 4.0;
const RATING_MULTIPLIER: f64 = 3.0;
const LOCALITY_BONUS: f64 = 20.0;
const EXPERIENCE_UNIT: f64 = 10.0;
const EXPERIENCE_CAP: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub workload_score: f64,
    pub rating_score: f64,
    pub locality_score: f64,
    pub experience_score: f64,
}

pub fn compute_score(agent: &DeliveryAgent, delivery: &Delivery) -> (f64, ScoreBreakdown) {
    let breakdown = ScoreBreakdown {
        workload_score: workload_score(agent.current_workload),
        rating_score: agent.rating * RATING_MULTIPLIER,
        locality_score: locality_score(agent, delivery),
        experience_score: experience_score(agent.total_deliveries),
    };

    let score = breakdown.workload_score
        + breakdown.rating_score
        + breakdown.locality_score
        + breakdown.experience_score;
    (score, breakdown)
}

fn workload_score(current_workload: u8) -> f64 {
    let spare = MAX_CONCURRENT_DELIVERIES.saturating_sub(current_workload);
    f64::from(spare) * WORKLOAD_POINTS_PER_SLOT
}

fn locality_score(agent: &DeliveryAgent, delivery: &Delivery) -> f64 {
    if agent.current_pincode == delivery.pickup_pincode {
        LOCALITY_BONUS
    } else {
        0.0
    }
}

fn experience_score(total_deliveries: u64) -> f64 {
    (total_deliveries as f64 / EXPERIENCE_UNIT).min(EXPERIENCE_CAP)
}
