//! # Application State
//!
//! The single store every front end reads from. One slice per domain.
//!
//! ```text
//! Store
//! ├── auth: AuthSlice            // user, token, sign-in flags
//! ├── ride: RideSlice            // catalog, current ride, estimate, history
//! ├── driver: DriverSlice        // availability state machine
//! ├── location: LocationSlice    // position, destination search, route
//! ├── payment: PaymentSlice      // saved payment methods
//! ├── onboarding: OnboardingProgress
//! ├── onboarding_errors: BTreeMap // field → message from the last attempt
//! └── status_message: String     // one-line status for the front end
//! ```
//!
//! State changes only happen through `update(store, action)` in action.rs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::core::auth::AuthSlice;
use crate::core::config::ResolvedConfig;
use crate::core::driver::DriverSlice;
use crate::core::location::LocationSlice;
use crate::core::onboarding::OnboardingProgress;
use crate::core::payment::PaymentSlice;
use crate::core::ride::RideSlice;

#[derive(Debug)]
pub struct Store {
    pub auth: AuthSlice,
    pub ride: RideSlice,
    pub driver: DriverSlice,
    pub location: LocationSlice,
    pub payment: PaymentSlice,
    pub onboarding: OnboardingProgress,
    pub onboarding_errors: BTreeMap<String, String>,
    pub status_message: String,
}

impl Store {
    pub fn new(request_countdown_secs: u32, now: DateTime<Utc>) -> Self {
        Self {
            auth: AuthSlice::default(),
            ride: RideSlice::default(),
            driver: DriverSlice::new(request_countdown_secs),
            location: LocationSlice::default(),
            payment: PaymentSlice::default(),
            onboarding: OnboardingProgress::new(now),
            onboarding_errors: BTreeMap::new(),
            status_message: String::new(),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.request_countdown_secs, Utc::now())
    }

    /// Signed-in user's id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.auth.user.as_ref().map(|u| u.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::DriverStatus;
    use crate::core::onboarding::StepId;

    #[test]
    fn test_store_new_defaults() {
        let store = Store::new(15, Utc::now());
        assert_eq!(store.driver.status, DriverStatus::Offline);
        assert_eq!(store.driver.countdown_secs, 15);
        assert!(store.ride.current_ride.is_none());
        assert_eq!(store.onboarding.current_step, StepId::Welcome);
        assert!(store.user_id().is_none());
    }
}
