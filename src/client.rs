//! # Effect Runtime
//!
//! `perform()` is the only place effects touch the outside world. It runs one
//! [`Effect`] against the [`Services`] and hands back the action carrying the
//! result, which goes straight back into `update()`.
//!
//! [`RideController`] drives that loop to completion for callers that want a
//! plain async API (the CLI, integration tests):
//!
//! ```text
//! controller.book_ride(..)
//!     └─ update(BookRide)        → Effect::SubmitBooking
//!        perform(SubmitBooking)  → Action::BookingFinished
//!        update(BookingFinished) → Effect::None   (done)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use crate::api::RideApi;
use crate::core::action::{Action, Effect, update};
use crate::core::auth::{AuthSession, RegisterRequest, User};
use crate::core::geo::{Coordinates, Location};
use crate::core::location::Place;
use crate::core::onboarding::StepId;
use crate::core::payment::NewPaymentMethod;
use crate::core::ride::{BookingError, BookingReceipt, BookingRequest, EstimateRequest};
use crate::core::state::Store;
use crate::core::storage::{AUTH_TOKEN_KEY, SecureStorage, StorageError, USER_DATA_KEY};

/// Handles to everything outside the process.
#[derive(Clone)]
pub struct Services {
    pub api: Arc<dyn RideApi>,
    pub storage: Arc<dyn SecureStorage>,
}

impl Services {
    pub fn new(api: Arc<dyn RideApi>, storage: Arc<dyn SecureStorage>) -> Self {
        Self { api, storage }
    }
}

/// Runs one effect. Returns the follow-up action, if any.
pub async fn perform(services: &Services, effect: Effect) -> Option<Action> {
    let api = &services.api;
    match effect {
        Effect::None => None,

        // Auth
        Effect::Login { email, password } => {
            Some(Action::AuthFinished(api.login(&email, &password).await))
        }
        Effect::Register(request) => Some(Action::AuthFinished(api.register(&request).await)),
        Effect::PersistSession(session) => {
            api.set_token(Some(session.token.clone()));
            if let Err(e) = persist_session(services.storage.as_ref(), &session) {
                warn!("Failed to persist session: {}", e);
            }
            None
        }
        Effect::LoadStoredSession => {
            let session = match load_session(services.storage.as_ref()) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Failed to read stored session: {}", e);
                    None
                }
            };
            if let Some(session) = &session {
                api.set_token(Some(session.token.clone()));
            }
            Some(Action::SessionRestored(session))
        }
        Effect::ClearCredentials => {
            api.set_token(None);
            if let Err(e) = clear_session(services.storage.as_ref()) {
                warn!("Failed to clear stored session: {}", e);
            }
            None
        }

        // Rides
        Effect::FetchRideOptions => Some(Action::RideOptionsLoaded(api.ride_options().await)),
        Effect::SubmitBooking(request) => {
            let result = api.book_ride(&request).await;
            Some(Action::BookingFinished {
                result,
                at: Utc::now(),
            })
        }
        Effect::BookingRejected(err) => {
            debug!("Booking not submitted: {}", err);
            None
        }
        Effect::CancelRide { ride_id, reason } => {
            let result = api.cancel_ride(&ride_id, &reason).await;
            Some(Action::CancelFinished { ride_id, result })
        }
        Effect::FetchEstimate(request) => {
            let result = api.ride_estimate(&request).await;
            Some(Action::EstimateLoaded {
                option_ids: request.option_ids,
                result,
            })
        }
        Effect::FetchRideHistory => Some(Action::RideHistoryLoaded(api.ride_history().await)),
        Effect::FetchRideDetails { ride_id } => {
            Some(Action::RideRefreshed(api.ride_details(&ride_id).await))
        }
        Effect::RideEnded { ride_id, status } => {
            info!("Ride {} ended: {:?}", ride_id, status);
            None
        }

        // Driver
        Effect::ReportAvailability { online } => Some(Action::AvailabilityReported {
            online,
            result: api.set_availability(online).await,
        }),
        Effect::RespondToRequest { request_id, accept } => {
            let result = api.respond_to_request(&request_id, accept).await;
            Some(Action::RequestResponseReported {
                request_id,
                accepted: accept,
                result,
            })
        }

        // Location
        Effect::SearchPlaces { query, near } => {
            let result = api.search_places(&query, near).await;
            Some(Action::SearchResults { query, result })
        }
        Effect::FetchRoute { from, to } => Some(Action::RouteLoaded(api.route(from, to).await)),

        // Payment
        Effect::FetchPaymentMethods => {
            Some(Action::PaymentMethodsLoaded(api.payment_methods().await))
        }
        Effect::AddPaymentMethod(method) => Some(Action::PaymentMethodAdded(
            api.add_payment_method(&method).await,
        )),
        Effect::RemovePaymentMethod(id) => {
            let result = api.remove_payment_method(&id).await;
            Some(Action::PaymentMethodRemoved { id, result })
        }
        Effect::SetDefaultPaymentMethod(id) => {
            let result = api.set_default_payment_method(&id).await;
            Some(Action::DefaultPaymentMethodSet { id, result })
        }
    }
}

fn persist_session(storage: &dyn SecureStorage, session: &AuthSession) -> Result<(), StorageError> {
    let user = serde_json::to_string(&session.user).map_err(StorageError::Corrupt)?;
    storage.set(AUTH_TOKEN_KEY, &session.token)?;
    storage.set(USER_DATA_KEY, &user)?;
    Ok(())
}

/// Both keys must be present; a token without a user is treated as signed out.
fn load_session(storage: &dyn SecureStorage) -> Result<Option<AuthSession>, StorageError> {
    let (Some(token), Some(user)) = (storage.get(AUTH_TOKEN_KEY)?, storage.get(USER_DATA_KEY)?)
    else {
        return Ok(None);
    };
    let user: User = serde_json::from_str(&user).map_err(StorageError::Corrupt)?;
    Ok(Some(AuthSession { user, token }))
}

fn clear_session(storage: &dyn SecureStorage) -> Result<(), StorageError> {
    storage.remove(AUTH_TOKEN_KEY)?;
    storage.remove(USER_DATA_KEY)
}

// ============================================================================
// Controller
// ============================================================================

/// Owns the store and runs each action until no effect is left.
pub struct RideController {
    pub store: Store,
    services: Services,
}

impl RideController {
    pub fn new(store: Store, services: Services) -> Self {
        Self { store, services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Feeds `action` through update/perform until the chain settles.
    pub async fn dispatch(&mut self, action: Action) {
        let mut next = Some(action);
        while let Some(action) = next {
            let effect = update(&mut self.store, action);
            next = perform(&self.services, effect).await;
        }
    }

    // ── Auth ────────────────────────────────────────────────────────────────

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), String> {
        self.dispatch(Action::Login {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await;
        let auth = &self.store.auth;
        if auth.is_authenticated {
            Ok(())
        } else {
            Err(failure(&auth.error, "Sign-in failed."))
        }
    }

    pub async fn register(&mut self, request: RegisterRequest) -> Result<(), String> {
        self.dispatch(Action::Register(request)).await;
        let auth = &self.store.auth;
        if auth.is_authenticated {
            Ok(())
        } else {
            Err(failure(&auth.error, "Registration failed."))
        }
    }

    pub async fn logout(&mut self) {
        self.dispatch(Action::Logout).await;
    }

    /// True if a stored session was found.
    pub async fn restore_session(&mut self) -> bool {
        self.dispatch(Action::RestoreSession).await;
        self.store.auth.is_authenticated
    }

    // ── Rides ───────────────────────────────────────────────────────────────

    pub async fn fetch_ride_options(&mut self) -> Result<(), String> {
        self.dispatch(Action::FetchRideOptions).await;
        slice_result(&self.store.ride.error)
    }

    /// Books a ride for the signed-in user unless `user_id` is given.
    pub async fn book_ride(
        &mut self,
        pickup: Location,
        dropoff: Location,
        option_id: &str,
        user_id: Option<&str>,
        notes: Option<String>,
    ) -> Result<BookingReceipt, BookingError> {
        let user_id = user_id.or(self.store.user_id()).unwrap_or_default().to_string();
        let mut request = BookingRequest::new(pickup, dropoff, option_id, &user_id);
        request.notes = notes;
        request.payment_method_id = self.store.payment.default_method().map(|m| m.id.clone());
        self.submit_booking(request).await
    }

    pub async fn submit_booking(
        &mut self,
        request: BookingRequest,
    ) -> Result<BookingReceipt, BookingError> {
        self.dispatch(Action::BookRide(request)).await;
        if let Some(err) = self.store.ride.booking_error.clone() {
            return Err(err);
        }
        self.store
            .ride
            .current_ride
            .as_ref()
            .map(|ride| BookingReceipt {
                ride_id: ride.id.clone(),
            })
            .ok_or_else(|| BookingError::Server("Booking did not produce a ride.".to_string()))
    }

    pub async fn cancel_ride(&mut self, ride_id: &str, reason: &str) -> Result<(), String> {
        self.dispatch(Action::CancelRide {
            ride_id: ride_id.to_string(),
            reason: reason.to_string(),
        })
        .await;
        // Set both when the slice refuses the cancel and when the backend fails it.
        if let Some(msg) = &self.store.ride.error {
            return Err(msg.clone());
        }
        if self.store.ride.current_ride.as_ref().is_some_and(|r| r.id == ride_id) {
            return Err("Could not cancel the ride.".to_string());
        }
        Ok(())
    }

    pub async fn get_ride_estimate(
        &mut self,
        pickup: Location,
        dropoff: Location,
        option_ids: Vec<String>,
    ) -> Result<(), String> {
        self.dispatch(Action::GetRideEstimate(EstimateRequest {
            pickup,
            dropoff,
            option_ids,
        }))
        .await;
        slice_result(&self.store.ride.estimate_error)
    }

    pub async fn fetch_ride_history(&mut self) -> Result<(), String> {
        self.dispatch(Action::FetchRideHistory).await;
        slice_result(&self.store.ride.error)
    }

    pub async fn refresh_ride(&mut self, ride_id: &str) {
        self.dispatch(Action::RefreshRide {
            ride_id: ride_id.to_string(),
        })
        .await;
    }

    /// Applies a cancel or refresh replayed by a status watcher. Rides this
    /// store does not track (a watch started from a ride id alone) go straight
    /// to the backend; anything else is dispatched as usual.
    pub async fn apply_watch_action(&mut self, action: Action) -> Result<(), String> {
        let tracked = |store: &Store, id: &str| {
            store.ride.current_ride.as_ref().is_some_and(|r| r.id == id)
        };
        match action {
            Action::CancelRide { ride_id, reason } if tracked(&self.store, &ride_id) => {
                self.cancel_ride(&ride_id, &reason).await
            }
            Action::CancelRide { ride_id, reason } => {
                self.services
                    .api
                    .cancel_ride(&ride_id, &reason)
                    .await
                    .map_err(|e| e.user_message())?;
                info!("Ride cancelled: {}", ride_id);
                self.store.status_message = "Ride cancelled".to_string();
                Ok(())
            }
            Action::RefreshRide { ride_id } if !tracked(&self.store, &ride_id) => {
                let update = self
                    .services
                    .api
                    .ride_details(&ride_id)
                    .await
                    .map_err(|e| e.user_message())?;
                self.store.status_message = format!("{}: {}", ride_id, update.status.label());
                Ok(())
            }
            other => {
                self.dispatch(other).await;
                Ok(())
            }
        }
    }

    // ── Driver ──────────────────────────────────────────────────────────────

    pub async fn go_online(&mut self) -> Result<(), String> {
        self.dispatch(Action::GoOnline).await;
        slice_result(&self.store.driver.error)
    }

    pub async fn go_offline(&mut self) -> Result<(), String> {
        self.dispatch(Action::GoOffline).await;
        slice_result(&self.store.driver.error)
    }

    pub async fn accept_request(&mut self) -> Result<(), String> {
        self.dispatch(Action::AcceptRequest).await;
        slice_result(&self.store.driver.error)
    }

    pub async fn reject_request(&mut self) -> Result<(), String> {
        self.dispatch(Action::RejectRequest).await;
        slice_result(&self.store.driver.error)
    }

    // ── Location ────────────────────────────────────────────────────────────

    pub async fn search_destination(&mut self, query: &str) -> Result<&[Place], String> {
        self.dispatch(Action::SearchDestination(query.to_string()))
            .await;
        slice_result(&self.store.location.error)?;
        Ok(&self.store.location.search_results)
    }

    pub async fn select_destination(&mut self, place: Place) {
        self.dispatch(Action::SelectDestination(place)).await;
    }

    pub async fn fetch_route(&mut self, from: Coordinates, to: Coordinates) -> Result<(), String> {
        self.dispatch(Action::FetchRoute { from, to }).await;
        slice_result(&self.store.location.error)
    }

    // ── Payment ─────────────────────────────────────────────────────────────

    pub async fn fetch_payment_methods(&mut self) -> Result<(), String> {
        self.dispatch(Action::FetchPaymentMethods).await;
        slice_result(&self.store.payment.error)
    }

    pub async fn add_payment_method(&mut self, method: NewPaymentMethod) -> Result<(), String> {
        self.dispatch(Action::AddPaymentMethod(method)).await;
        slice_result(&self.store.payment.error)
    }

    pub async fn remove_payment_method(&mut self, id: &str) -> Result<(), String> {
        self.dispatch(Action::RemovePaymentMethod(id.to_string()))
            .await;
        slice_result(&self.store.payment.error)
    }

    pub async fn set_default_payment_method(&mut self, id: &str) -> Result<(), String> {
        self.dispatch(Action::SetDefaultPaymentMethod(id.to_string()))
            .await;
        slice_result(&self.store.payment.error)
    }

    // ── Onboarding ──────────────────────────────────────────────────────────

    /// True if the step is now complete. Field errors land in
    /// `store.onboarding_errors`.
    pub async fn complete_onboarding_step(
        &mut self,
        step: StepId,
        form: HashMap<String, String>,
    ) -> bool {
        self.dispatch(Action::CompleteOnboardingStep {
            step,
            form,
            at: Utc::now(),
        })
        .await;
        self.store.onboarding.completed_steps.contains(&step)
    }
}

fn slice_result(error: &Option<String>) -> Result<(), String> {
    match error {
        Some(msg) => Err(msg.clone()),
        None => Ok(()),
    }
}

fn failure(error: &Option<String>, fallback: &str) -> String {
    error.clone().unwrap_or_else(|| fallback.to_string())
}
