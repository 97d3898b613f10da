//! Serviceable-area directory: pure reads over the pincode table.
//!
//! Charge and ETA lookups on unknown or inactive pincodes are
//! `ServiceUnavailable`, never a default price. Callers are expected to
//! check serviceability first.

use crate::error::AppError;
use crate::models::area::DeliveryTier;
use crate::state::AppState;

pub fn is_serviceable(state: &AppState, pincode: &str) -> bool {
    state
        .areas
        .get(pincode)
        .is_some_and(|area| area.is_serviceable())
}

pub fn charge_for(state: &AppState, pincode: &str, tier: DeliveryTier) -> Result<f64, AppError> {
    state
        .areas
        .get(pincode)
        .filter(|area| area.is_serviceable())
        .map(|area| area.charge_for(tier))
        .ok_or_else(|| AppError::ServiceUnavailable(format!("pincode {pincode} is not serviceable")))
}

pub fn eta_days_for(state: &AppState, pincode: &str, tier: DeliveryTier) -> Result<u32, AppError> {
    state
        .areas
        .get(pincode)
        .filter(|area| area.is_serviceable())
        .map(|area| area.eta_days_for(tier))
        .ok_or_else(|| AppError::ServiceUnavailable(format!("pincode {pincode} is not serviceable")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::area::ServiceableArea;

    fn area(pincode: &str, active: bool) -> ServiceableArea {
        let now = Utc::now();
        ServiceableArea {
            pincode: pincode.to_string(),
            area_name: "Connaught Place".to_string(),
            city: Some("New Delhi".to_string()),
            state: Some("Delhi".to_string()),
            is_active: active,
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

    #[test]
    fn active_record_is_serviceable_with_tier_pricing() {
        let state = AppState::new(16);
        state.areas.insert("110001".to_string(), area("110001", true));

        assert!(is_serviceable(&state, "110001"));
        assert_eq!(
            charge_for(&state, "110001", DeliveryTier::Standard).unwrap(),
            50.0
        );
        assert_eq!(
            charge_for(&state, "110001", DeliveryTier::Express).unwrap(),
            100.0
        );
        assert_eq!(
            eta_days_for(&state, "110001", DeliveryTier::Standard).unwrap(),
            3
        );
    }

    #[test]
    fn unknown_pincode_is_not_serviceable_and_has_no_price() {
        let state = AppState::new(16);

        assert!(!is_serviceable(&state, "000000"));
        assert!(matches!(
            charge_for(&state, "000000", DeliveryTier::Standard),
            Err(AppError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            eta_days_for(&state, "000000", DeliveryTier::Express),
            Err(AppError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn inactive_record_is_treated_as_unknown() {
        let state = AppState::new(16);
        state.areas.insert("400001".to_string(), area("400001", false));

        assert!(!is_serviceable(&state, "400001"));
        assert!(charge_for(&state, "400001", DeliveryTier::Standard).is_err());
    }
}
