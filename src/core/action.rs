//! # Actions
//!
//! Everything that can happen in the app becomes an `Action`.
//! Rider taps "Book"? That's `Action::BookRide(request)`.
//! Backend answers? That's `Action::BookingFinished { .. }`.
//!
//! `update()` takes the store and an action, mutates the store and returns
//! the `Effect` the runtime must perform next. No I/O happens here.
//!
//! ```text
//! Store + Action  →  update()  →  Store' + Effect
//! ```
//!
//! Results of effects come back as more actions, so every state change can
//! be logged and replayed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::api::ApiError;
use crate::core::auth::{self, AuthSession, RegisterRequest};
use crate::core::driver::DriverRequest;
use crate::core::geo::{Coordinates, Location};
use crate::core::location::{Place, Route};
use crate::core::onboarding::{self, StepError, StepId};
use crate::core::payment::{self, NewPaymentMethod, PaymentMethodInfo};
use crate::core::ride::{
    BookingConfirmation, BookingError, BookingRequest, EstimateRequest, RideEstimate, RideOption,
    RideRecord, RideStatus, RideUpdate,
};
use crate::core::state::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Auth
    Login { email: String, password: String },
    Register(RegisterRequest),
    AuthFinished(Result<AuthSession, ApiError>),
    Logout,
    RestoreSession,
    SessionRestored(Option<AuthSession>),

    // Rides
    FetchRideOptions,
    RideOptionsLoaded(Result<Vec<RideOption>, ApiError>),
    BookRide(BookingRequest),
    BookingFinished {
        result: Result<BookingConfirmation, ApiError>,
        at: DateTime<Utc>,
    },
    CancelRide { ride_id: String, reason: String },
    CancelFinished { ride_id: String, result: Result<(), ApiError> },
    GetRideEstimate(EstimateRequest),
    EstimateLoaded {
        option_ids: Vec<String>,
        result: Result<RideEstimate, ApiError>,
    },
    FetchRideHistory,
    RideHistoryLoaded(Result<Vec<RideRecord>, ApiError>),
    RefreshRide { ride_id: String },
    RideRefreshed(Result<RideUpdate, ApiError>),
    RideStatusChanged { ride_id: String, status: RideStatus },
    DriverLocationUpdated {
        ride_id: String,
        location: Coordinates,
        eta_min: Option<u32>,
    },

    // Driver
    GoOnline,
    GoOffline,
    AvailabilityReported { online: bool, result: Result<(), ApiError> },
    RequestReceived(DriverRequest),
    Tick,
    AcceptRequest,
    RejectRequest,
    RequestResponseReported {
        request_id: String,
        accepted: bool,
        result: Result<(), ApiError>,
    },
    StartTrip,
    CompleteTrip,

    // Location
    SetCurrentLocation(Location),
    SearchDestination(String),
    SearchResults { query: String, result: Result<Vec<Place>, ApiError> },
    SelectDestination(Place),
    ClearDestination,
    FetchRoute { from: Coordinates, to: Coordinates },
    RouteLoaded(Result<Route, ApiError>),

    // Payment
    FetchPaymentMethods,
    PaymentMethodsLoaded(Result<Vec<PaymentMethodInfo>, ApiError>),
    AddPaymentMethod(NewPaymentMethod),
    PaymentMethodAdded(Result<PaymentMethodInfo, ApiError>),
    RemovePaymentMethod(String),
    PaymentMethodRemoved { id: String, result: Result<(), ApiError> },
    SetDefaultPaymentMethod(String),
    DefaultPaymentMethodSet { id: String, result: Result<(), ApiError> },

    // Onboarding
    CompleteOnboardingStep {
        step: StepId,
        form: HashMap<String, String>,
        at: DateTime<Utc>,
    },
}

/// I/O the runtime performs after an update. Results return as actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Login { email: String, password: String },
    Register(RegisterRequest),
    PersistSession(AuthSession),
    LoadStoredSession,
    ClearCredentials,
    FetchRideOptions,
    SubmitBooking(BookingRequest),
    /// Guards refused the booking; nothing to perform.
    BookingRejected(BookingError),
    CancelRide { ride_id: String, reason: String },
    FetchEstimate(EstimateRequest),
    FetchRideHistory,
    FetchRideDetails { ride_id: String },
    /// Ride reached a terminal status through the event stream.
    RideEnded { ride_id: String, status: RideStatus },
    ReportAvailability { online: bool },
    RespondToRequest { request_id: String, accept: bool },
    SearchPlaces { query: String, near: Option<Coordinates> },
    FetchRoute { from: Coordinates, to: Coordinates },
    FetchPaymentMethods,
    AddPaymentMethod(NewPaymentMethod),
    RemovePaymentMethod(String),
    SetDefaultPaymentMethod(String),
}

pub fn update(store: &mut Store, action: Action) -> Effect {
    debug!("update: {:?}", action);
    match action {
        // ── Auth ────────────────────────────────────────────────────────────
        Action::Login { email, password } => {
            let email = email.trim().to_string();
            if store.auth.begin(auth::validate_credentials(&email, &password)) {
                Effect::Login { email, password }
            } else {
                Effect::None
            }
        }
        Action::Register(request) => {
            if store.auth.begin(auth::validate_registration(&request)) {
                Effect::Register(request)
            } else {
                Effect::None
            }
        }
        Action::AuthFinished(result) => match store.auth.finish(result) {
            Some(session) => {
                store.status_message = format!("Signed in as {}", session.user.name);
                Effect::PersistSession(session)
            }
            None => Effect::None,
        },
        Action::Logout => {
            store.auth.logout();
            store.ride = Default::default();
            store.payment = Default::default();
            store.status_message = "Signed out".to_string();
            Effect::ClearCredentials
        }
        Action::RestoreSession => Effect::LoadStoredSession,
        Action::SessionRestored(session) => {
            if let Some(session) = session {
                info!("Restored session for {}", session.user.email);
                store.auth.restore(session);
            }
            Effect::None
        }

        // ── Rides ───────────────────────────────────────────────────────────
        Action::FetchRideOptions => {
            if store.ride.is_loading_options {
                return Effect::None;
            }
            store.ride.is_loading_options = true;
            store.ride.error = None;
            Effect::FetchRideOptions
        }
        Action::RideOptionsLoaded(result) => {
            store.ride.finish_options(result);
            Effect::None
        }
        Action::BookRide(request) => match store.ride.begin_booking(request) {
            Ok(request) => {
                store.status_message = "Requesting a ride...".to_string();
                Effect::SubmitBooking(request)
            }
            Err(err) => Effect::BookingRejected(err),
        },
        Action::BookingFinished { result, at } => {
            store.status_message = match store.ride.finish_booking(result, at) {
                Ok(receipt) => format!("Ride {} requested", receipt.ride_id),
                Err(err) => err.user_message(),
            };
            Effect::None
        }
        Action::CancelRide { ride_id, reason } => match store.ride.begin_cancel(&ride_id) {
            Ok(()) => Effect::CancelRide { ride_id, reason },
            Err(_) => Effect::None,
        },
        Action::CancelFinished { ride_id, result } => {
            let ok = result.is_ok();
            store.ride.finish_cancel(&ride_id, result);
            if ok {
                store.status_message = "Ride cancelled".to_string();
            }
            Effect::None
        }
        Action::GetRideEstimate(request) => {
            if store.ride.begin_estimate(&request) {
                Effect::FetchEstimate(request)
            } else {
                Effect::None
            }
        }
        Action::EstimateLoaded { option_ids, result } => {
            store.ride.finish_estimate(&option_ids, result);
            Effect::None
        }
        Action::FetchRideHistory => {
            if store.ride.is_loading_history {
                return Effect::None;
            }
            store.ride.is_loading_history = true;
            store.ride.error = None;
            Effect::FetchRideHistory
        }
        Action::RideHistoryLoaded(result) => {
            store.ride.finish_history(result);
            Effect::None
        }
        Action::RefreshRide { ride_id } => {
            if store.ride.current_ride.as_ref().is_some_and(|r| r.id == ride_id) {
                Effect::FetchRideDetails { ride_id }
            } else {
                Effect::None
            }
        }
        Action::RideRefreshed(result) => {
            match result {
                Ok(update) => store.ride.apply_refresh(update),
                Err(e) => store.ride.error = Some(e.user_message()),
            }
            Effect::None
        }
        Action::RideStatusChanged { ride_id, status } => {
            if store.ride.apply_status(&ride_id, status) {
                store.status_message = status.label().to_string();
                if status.is_terminal() {
                    return Effect::RideEnded { ride_id, status };
                }
            }
            Effect::None
        }
        Action::DriverLocationUpdated { ride_id, location, eta_min } => {
            store.ride.apply_driver_location(&ride_id, location, eta_min);
            Effect::None
        }

        // ── Driver ──────────────────────────────────────────────────────────
        Action::GoOnline => match store.driver.go_online() {
            Ok(()) => Effect::ReportAvailability { online: true },
            Err(_) => Effect::None,
        },
        Action::GoOffline => match store.driver.go_offline() {
            Ok(()) => Effect::ReportAvailability { online: false },
            Err(_) => Effect::None,
        },
        Action::AvailabilityReported { online, result } => {
            if let Err(e) = result {
                store.driver.availability_failed(online, &e);
            }
            Effect::None
        }
        Action::RequestReceived(request) => {
            if store.driver.receive_request(request) {
                store.status_message = "New ride request".to_string();
            }
            Effect::None
        }
        Action::Tick => {
            if let Some(expired) = store.driver.tick() {
                store.status_message = "Request expired".to_string();
                return Effect::RespondToRequest {
                    request_id: expired,
                    accept: false,
                };
            }
            Effect::None
        }
        Action::AcceptRequest => match store.driver.accept_request() {
            Ok(request_id) => Effect::RespondToRequest { request_id, accept: true },
            Err(_) => Effect::None,
        },
        Action::RejectRequest => match store.driver.reject_request() {
            Ok(request_id) => Effect::RespondToRequest { request_id, accept: false },
            Err(_) => Effect::None,
        },
        Action::RequestResponseReported { request_id, accepted, result } => {
            if let Err(e) = result {
                if accepted {
                    store.driver.accept_failed(&request_id, &e);
                } else {
                    debug!("Reject of {} not acknowledged: {}", request_id, e);
                }
            }
            Effect::None
        }
        Action::StartTrip => {
            let _ = store.driver.start_trip();
            Effect::None
        }
        Action::CompleteTrip => {
            let _ = store.driver.complete_trip();
            Effect::None
        }

        // ── Location ────────────────────────────────────────────────────────
        Action::SetCurrentLocation(location) => {
            store.location.set_current_location(location);
            Effect::None
        }
        Action::SearchDestination(query) => match store.location.begin_search(&query) {
            Some(query) => Effect::SearchPlaces {
                query,
                near: store.location.current_location.as_ref().map(|l| l.coordinates),
            },
            None => Effect::None,
        },
        Action::SearchResults { query, result } => {
            store.location.finish_search(&query, result);
            Effect::None
        }
        Action::SelectDestination(place) => {
            let to = place.coordinates;
            store.location.select_destination(place);
            match store.location.current_location.as_ref().map(|l| l.coordinates) {
                Some(from) if store.location.begin_route(&from, &to) => Effect::FetchRoute { from, to },
                _ => Effect::None,
            }
        }
        Action::ClearDestination => {
            store.location.clear_destination();
            Effect::None
        }
        Action::FetchRoute { from, to } => {
            if store.location.begin_route(&from, &to) {
                Effect::FetchRoute { from, to }
            } else {
                Effect::None
            }
        }
        Action::RouteLoaded(result) => {
            store.location.finish_route(result);
            Effect::None
        }

        // ── Payment ─────────────────────────────────────────────────────────
        Action::FetchPaymentMethods => {
            if store.payment.begin() {
                Effect::FetchPaymentMethods
            } else {
                Effect::None
            }
        }
        Action::PaymentMethodsLoaded(result) => {
            match result {
                Ok(methods) => store.payment.set_methods(methods),
                Err(e) => store.payment.fail(&e),
            }
            Effect::None
        }
        Action::AddPaymentMethod(method) => {
            if let Err(msg) = payment::validate_new_method(&method) {
                store.payment.error = Some(msg);
                return Effect::None;
            }
            if store.payment.begin() {
                Effect::AddPaymentMethod(method)
            } else {
                Effect::None
            }
        }
        Action::PaymentMethodAdded(result) => {
            match result {
                Ok(method) => store.payment.added(method),
                Err(e) => store.payment.fail(&e),
            }
            Effect::None
        }
        Action::RemovePaymentMethod(id) => {
            if store.payment.begin() {
                Effect::RemovePaymentMethod(id)
            } else {
                Effect::None
            }
        }
        Action::PaymentMethodRemoved { id, result } => {
            match result {
                Ok(()) => store.payment.removed(&id),
                Err(e) => store.payment.fail(&e),
            }
            Effect::None
        }
        Action::SetDefaultPaymentMethod(id) => {
            if store.payment.begin() {
                Effect::SetDefaultPaymentMethod(id)
            } else {
                Effect::None
            }
        }
        Action::DefaultPaymentMethodSet { id, result } => {
            match result {
                Ok(()) => store.payment.default_set(&id),
                Err(e) => store.payment.fail(&e),
            }
            Effect::None
        }

        // ── Onboarding ──────────────────────────────────────────────────────
        Action::CompleteOnboardingStep { step, form, at } => {
            store.onboarding_errors.clear();
            match onboarding::complete_step(&mut store.onboarding, step, &form, at) {
                Ok(()) => {
                    store.status_message = format!(
                        "Onboarding {}% complete",
                        onboarding::progress_percentage(&store.onboarding)
                    );
                }
                Err(StepError::Locked(missing)) => {
                    store.status_message = format!("Finish {:?} first", missing);
                }
                Err(StepError::Invalid(result)) => {
                    store.onboarding_errors = result.errors;
                }
            }
            Effect::None
        }
    }
}
