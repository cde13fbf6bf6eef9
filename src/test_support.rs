//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{ApiError, RideApi};
use crate::core::auth::{AuthSession, RegisterRequest, User, UserRole};
use crate::core::driver::DriverRequest;
use crate::core::geo::{Coordinates, Location};
use crate::core::location::{Place, Route};
use crate::core::payment::{NewPaymentMethod, PaymentMethodInfo};
use crate::core::ride::{
    ActiveRide, BookingConfirmation, BookingRequest, EstimateRequest, FareBreakdown, RideEstimate,
    RideOption, RideRecord, RideStatus, RideUpdate,
};
use crate::core::state::Store;

/// Store with the default 30 s countdown.
pub fn test_store() -> Store {
    Store::new(30, Utc::now())
}

pub fn lux_option() -> RideOption {
    RideOption {
        id: "lux".into(),
        name: "Lux".into(),
        description: "Premium sedan".into(),
        base_price: 5.0,
        per_km_price: 2.5,
        per_minute_price: 0.5,
        capacity: 4,
    }
}

/// Lower Manhattan to Times Square on the "lux" option.
pub fn manhattan_booking() -> BookingRequest {
    BookingRequest::new(
        Location::new(40.7128, -74.006),
        Location::new(40.7589, -73.9851),
        "lux",
        "user-1",
    )
}

pub fn active_ride(id: &str, status: RideStatus) -> ActiveRide {
    ActiveRide {
        id: id.into(),
        status,
        option_id: "lux".into(),
        pickup: Location::new(40.7128, -74.006),
        destination: Location::new(40.7589, -73.9851),
        driver: None,
        fare: Some(FareBreakdown {
            base_fare: 5.0,
            distance_fare: 14.0,
            time_fare: 7.0,
            surge_multiplier: 1.0,
            total: 26.0,
            currency: "USD".into(),
        }),
        distance_km: 5.6,
        duration_min: 14.0,
        notes: None,
        payment_method_id: None,
        driver_location: None,
        driver_eta_min: None,
        requested_at: Utc::now(),
    }
}

pub fn driver_request(id: &str, price: f64) -> DriverRequest {
    DriverRequest {
        id: id.into(),
        rider_name: "Ada".into(),
        pickup_address: "1 Centre St".into(),
        dropoff_address: "1560 Broadway".into(),
        estimated_price: price,
        estimated_minutes: 14,
        countdown: 0,
    }
}

pub fn auth_session() -> AuthSession {
    AuthSession {
        user: User {
            id: "user-1".into(),
            name: "Rider One".into(),
            email: "rider@example.com".into(),
            phone: Some("+15551234567".into()),
            role: UserRole::Rider,
        },
        token: "token-abc".into(),
    }
}

// ============================================================================
// MockApi
// ============================================================================

/// Scripted backend. Each endpoint returns its canned result and records the
/// call by name. Unscripted endpoints answer with an empty success where one
/// exists, otherwise `ApiError::Server("not scripted")`.
pub struct MockApi {
    login: Mutex<Result<AuthSession, ApiError>>,
    booking: Mutex<Result<BookingConfirmation, ApiError>>,
    estimate: Mutex<Result<RideEstimate, ApiError>>,
    availability: Mutex<Result<(), ApiError>>,
    token: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            login: Mutex::new(Err(not_scripted())),
            booking: Mutex::new(Err(not_scripted())),
            estimate: Mutex::new(Err(not_scripted())),
            availability: Mutex::new(Ok(())),
            token: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }
}

fn not_scripted() -> ApiError {
    ApiError::Server("not scripted".into())
}

impl MockApi {
    pub fn set_login(&self, result: Result<AuthSession, ApiError>) {
        *self.login.lock().unwrap() = result;
    }

    pub fn set_booking(&self, result: Result<BookingConfirmation, ApiError>) {
        *self.booking.lock().unwrap() = result;
    }

    pub fn set_estimate(&self, result: Result<RideEstimate, ApiError>) {
        *self.estimate.lock().unwrap() = result;
    }

    pub fn set_availability(&self, result: Result<(), ApiError>) {
        *self.availability.lock().unwrap() = result;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl RideApi for MockApi {
    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn login(&self, _email: &str, _password: &str) -> Result<AuthSession, ApiError> {
        self.record("login");
        self.login.lock().unwrap().clone()
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<AuthSession, ApiError> {
        self.record("register");
        self.login.lock().unwrap().clone()
    }

    async fn ride_options(&self) -> Result<Vec<RideOption>, ApiError> {
        self.record("ride_options");
        Ok(vec![lux_option()])
    }

    async fn book_ride(&self, _request: &BookingRequest) -> Result<BookingConfirmation, ApiError> {
        self.record("book_ride");
        self.booking.lock().unwrap().clone()
    }

    async fn cancel_ride(&self, ride_id: &str, _reason: &str) -> Result<(), ApiError> {
        self.record(format!("cancel_ride({ride_id})"));
        Ok(())
    }

    async fn ride_estimate(&self, _request: &EstimateRequest) -> Result<RideEstimate, ApiError> {
        self.record("ride_estimate");
        self.estimate.lock().unwrap().clone()
    }

    async fn ride_history(&self) -> Result<Vec<RideRecord>, ApiError> {
        self.record("ride_history");
        Ok(Vec::new())
    }

    async fn ride_details(&self, ride_id: &str) -> Result<RideUpdate, ApiError> {
        self.record(format!("ride_details({ride_id})"));
        Err(not_scripted())
    }

    async fn search_places(
        &self,
        query: &str,
        _near: Option<Coordinates>,
    ) -> Result<Vec<Place>, ApiError> {
        self.record(format!("search_places({query})"));
        Ok(Vec::new())
    }

    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<Route, ApiError> {
        self.record("route");
        Ok(Route {
            points: vec![from, to],
            distance_km: from.distance_km(&to),
            duration_min: 10.0,
        })
    }

    async fn set_availability(&self, online: bool) -> Result<(), ApiError> {
        self.record(format!("set_availability({online})"));
        self.availability.lock().unwrap().clone()
    }

    async fn respond_to_request(&self, request_id: &str, accept: bool) -> Result<(), ApiError> {
        self.record(format!("respond_to_request({request_id}, {accept})"));
        Ok(())
    }

    async fn payment_methods(&self) -> Result<Vec<PaymentMethodInfo>, ApiError> {
        self.record("payment_methods");
        Ok(Vec::new())
    }

    async fn add_payment_method(
        &self,
        _method: &NewPaymentMethod,
    ) -> Result<PaymentMethodInfo, ApiError> {
        self.record("add_payment_method");
        Err(not_scripted())
    }

    async fn remove_payment_method(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("remove_payment_method({id})"));
        Ok(())
    }

    async fn set_default_payment_method(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("set_default_payment_method({id})"));
        Ok(())
    }
}
