use async_trait::async_trait;

use super::ApiError;
use crate::core::auth::{AuthSession, RegisterRequest};
use crate::core::geo::Coordinates;
use crate::core::location::{Place, Route};
use crate::core::payment::{NewPaymentMethod, PaymentMethodInfo};
use crate::core::ride::{
    BookingConfirmation, BookingRequest, EstimateRequest, RideEstimate, RideOption, RideRecord,
    RideUpdate,
};

/// Everything the app asks of the backend.
///
/// Implementations must be cheap to share (`Arc<dyn RideApi>`) and safe to
/// call from spawned tasks.
#[async_trait]
pub trait RideApi: Send + Sync {
    /// Attach (or clear) the bearer token used by subsequent calls.
    fn set_token(&self, token: Option<String>);

    // Auth
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError>;
    async fn register(&self, request: &RegisterRequest) -> Result<AuthSession, ApiError>;

    // Rides
    async fn ride_options(&self) -> Result<Vec<RideOption>, ApiError>;
    async fn book_ride(&self, request: &BookingRequest) -> Result<BookingConfirmation, ApiError>;
    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> Result<(), ApiError>;
    async fn ride_estimate(&self, request: &EstimateRequest) -> Result<RideEstimate, ApiError>;
    async fn ride_history(&self) -> Result<Vec<RideRecord>, ApiError>;
    async fn ride_details(&self, ride_id: &str) -> Result<RideUpdate, ApiError>;

    // Location
    async fn search_places(
        &self,
        query: &str,
        near: Option<Coordinates>,
    ) -> Result<Vec<Place>, ApiError>;
    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<Route, ApiError>;

    // Driver
    async fn set_availability(&self, online: bool) -> Result<(), ApiError>;
    async fn respond_to_request(&self, request_id: &str, accept: bool) -> Result<(), ApiError>;

    // Payment
    async fn payment_methods(&self) -> Result<Vec<PaymentMethodInfo>, ApiError>;
    async fn add_payment_method(
        &self,
        method: &NewPaymentMethod,
    ) -> Result<PaymentMethodInfo, ApiError>;
    async fn remove_payment_method(&self, id: &str) -> Result<(), ApiError>;
    async fn set_default_payment_method(&self, id: &str) -> Result<(), ApiError>;
}
