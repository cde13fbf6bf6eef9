//! # Ride Slice
//!
//! Ride catalog, booking, cancellation, estimates and history.
//!
//! ```text
//! RideSlice
//! ├── ride_options: Vec<RideOption>      // catalog, fetched per session
//! ├── current_ride: Option<ActiveRide>   // at most one non-terminal ride
//! ├── current_estimate: Option<RideEstimate>
//! ├── estimate_error: Option<String>
//! ├── ride_history: Vec<RideRecord>      // newest first
//! ├── is_loading_*: bool                 // re-entrancy guards
//! └── error / booking_error              // last failure, user-safe
//! ```
//!
//! The `begin_*` methods run guards and flip loading flags; the `finish_*`
//! methods fold the backend result back in. Neither does I/O.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::ApiError;
use crate::core::geo::{Coordinates, Location};

/// Pickup and dropoff closer than this are rejected as the same place.
pub const MIN_TRIP_DISTANCE_KM: f64 = 0.05;

/// Rough city speed used when the backend omits a duration.
const FALLBACK_SPEED_KMH: f64 = 30.0;

// ============================================================================
// Types
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    DriverArriving,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
    /// Any status string this client does not know. Ignored by the reducer.
    #[serde(other)]
    Unknown,
}

impl RideStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            RideStatus::Pending => "Finding your driver",
            RideStatus::Accepted => "Driver assigned",
            RideStatus::DriverArriving => "Driver on the way",
            RideStatus::Arrived => "Driver has arrived",
            RideStatus::InProgress => "On trip",
            RideStatus::Completed => "Trip completed",
            RideStatus::Cancelled => "Ride cancelled",
            RideStatus::Unknown => "Unknown",
        }
    }
}

/// A selectable service tier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_price: f64,
    pub per_km_price: f64,
    #[serde(default)]
    pub per_minute_price: f64,
    pub capacity: u8,
}

impl RideOption {
    /// Local fare for a trip, used when the backend leaves an option unquoted.
    pub fn quote(&self, distance_km: f64, duration_min: f64, surge_multiplier: f64) -> FareBreakdown {
        let surge = if surge_multiplier.is_finite() && surge_multiplier >= 1.0 {
            surge_multiplier
        } else {
            1.0
        };
        let base_fare = round_cents(self.base_price);
        let distance_fare = round_cents(self.per_km_price * distance_km.max(0.0));
        let time_fare = round_cents(self.per_minute_price * duration_min.max(0.0));
        FareBreakdown {
            base_fare,
            distance_fare,
            time_fare,
            surge_multiplier: surge,
            total: round_cents((base_fare + distance_fare + time_fare) * surge),
            currency: default_currency(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub distance_fare: f64,
    #[serde(default)]
    pub time_fare: f64,
    #[serde(default = "one")]
    pub surge_multiplier: f64,
    pub total: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl FareBreakdown {
    pub fn display_total(&self) -> String {
        format!("{:.2} {}", self.total, self.currency)
    }
}

fn one() -> f64 {
    1.0
}

fn default_currency() -> String {
    "USD".to_string()
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle: String,
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub rating: f32,
}

/// The ride currently in progress for this session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRide {
    pub id: String,
    pub status: RideStatus,
    pub option_id: String,
    pub pickup: Location,
    pub destination: Location,
    pub driver: Option<DriverInfo>,
    pub fare: Option<FareBreakdown>,
    pub distance_km: f64,
    pub duration_min: f64,
    pub notes: Option<String>,
    pub payment_method_id: Option<String>,
    pub driver_location: Option<Coordinates>,
    pub driver_eta_min: Option<u32>,
    pub requested_at: DateTime<Utc>,
}

/// Everything `book_ride` needs. Sent as the booking request body.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub pickup: Location,
    pub dropoff: Location,
    pub option_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

impl BookingRequest {
    pub fn new(pickup: Location, dropoff: Location, option_id: &str, user_id: &str) -> Self {
        Self {
            pickup,
            dropoff,
            option_id: option_id.to_string(),
            user_id: user_id.to_string(),
            notes: None,
            payment_method_id: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Backend acknowledgement of a booking.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub ride_id: String,
    #[serde(default = "pending")]
    pub status: RideStatus,
    #[serde(default)]
    pub fare: Option<FareBreakdown>,
    #[serde(default)]
    pub driver: Option<DriverInfo>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub duration_min: Option<f64>,
    #[serde(default)]
    pub eta_min: Option<u32>,
}

fn pending() -> RideStatus {
    RideStatus::Pending
}

/// Returned to the caller of `book_ride` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingReceipt {
    pub ride_id: String,
}

/// Fresh server-side view of a ride, used by refresh.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideUpdate {
    pub ride_id: String,
    pub status: RideStatus,
    #[serde(default)]
    pub driver: Option<DriverInfo>,
    #[serde(default)]
    pub driver_location: Option<Coordinates>,
    #[serde(default)]
    pub eta_min: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRequest {
    pub pickup: Location,
    pub dropoff: Location,
    pub option_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptionQuote {
    pub option_id: String,
    pub fare: FareBreakdown,
    #[serde(default)]
    pub eta_min: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
    #[serde(default = "one")]
    pub surge_multiplier: f64,
    #[serde(default)]
    pub quotes: Vec<OptionQuote>,
}

impl RideEstimate {
    pub fn quote_for(&self, option_id: &str) -> Option<&OptionQuote> {
        self.quotes.iter().find(|q| q.option_id == option_id)
    }

    /// Adds catalog-computed quotes for requested options the backend left out.
    pub fn fill_missing_quotes(&mut self, requested: &[String], catalog: &[RideOption]) {
        for option_id in requested {
            if self.quote_for(option_id).is_some() {
                continue;
            }
            if let Some(option) = catalog.iter().find(|o| &o.id == option_id) {
                debug!("Quoting {} locally", option_id);
                let fare = option.quote(self.distance_km, self.duration_min, self.surge_multiplier);
                self.quotes.push(OptionQuote {
                    option_id: option_id.clone(),
                    fare,
                    eta_min: None,
                });
            }
        }
    }
}

/// A finished ride as shown in history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRecord {
    pub id: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub status: RideStatus,
    pub total_fare: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub duration_min: f64,
}

impl RideRecord {
    fn from_ride(ride: &ActiveRide, status: RideStatus) -> Self {
        let (total_fare, currency) = match (&ride.fare, status) {
            (Some(fare), RideStatus::Completed) => (fare.total, fare.currency.clone()),
            (Some(fare), _) => (0.0, fare.currency.clone()),
            (None, _) => (0.0, default_currency()),
        };
        Self {
            id: ride.id.clone(),
            pickup_address: ride.pickup.label(),
            dropoff_address: ride.destination.label(),
            status,
            total_fare,
            currency,
            date: ride.requested_at,
            driver_name: ride.driver.as_ref().map(|d| d.name.clone()),
            distance_km: ride.distance_km,
            duration_min: ride.duration_min,
        }
    }
}

// ============================================================================
// Booking Errors
// ============================================================================

/// Why a booking did not go through. Returned, never thrown.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingError {
    /// A booking is already in flight.
    ConcurrentRequest,
    /// A non-terminal ride already exists for this session.
    ActiveRideExists,
    /// Required fields were empty.
    MissingFields(Vec<&'static str>),
    /// Coordinates out of range, or pickup and dropoff are the same place.
    InvalidLocation(String),
    /// The option id is not in the loaded catalog.
    InvalidOption(String),
    /// Connectivity or timeout.
    Network(String),
    /// Backend rejected the booking.
    Server(String),
}

impl BookingError {
    pub fn user_message(&self) -> String {
        match self {
            BookingError::ConcurrentRequest => {
                "A booking is already in progress. Please wait.".to_string()
            }
            BookingError::ActiveRideExists => {
                "You already have an active ride. Cancel or finish it before booking another."
                    .to_string()
            }
            BookingError::MissingFields(fields) => {
                format!("Please provide: {}.", fields.join(", "))
            }
            BookingError::InvalidLocation(reason) => format!("Invalid location: {reason}."),
            BookingError::InvalidOption(id) => format!("Ride option \"{id}\" is not available."),
            BookingError::Network(msg) | BookingError::Server(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::ConcurrentRequest => write!(f, "booking already in progress"),
            BookingError::ActiveRideExists => write!(f, "active ride exists"),
            BookingError::MissingFields(fields) => {
                write!(f, "missing fields: {}", fields.join(", "))
            }
            BookingError::InvalidLocation(reason) => write!(f, "invalid location: {reason}"),
            BookingError::InvalidOption(id) => write!(f, "unknown ride option: {id}"),
            BookingError::Network(msg) => write!(f, "network error: {msg}"),
            BookingError::Server(msg) => write!(f, "server error: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<ApiError> for BookingError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Network(_) | ApiError::Timeout => BookingError::Network(e.user_message()),
            _ => BookingError::Server(e.user_message()),
        }
    }
}

// ============================================================================
// Slice
// ============================================================================

#[derive(Debug, Default)]
pub struct RideSlice {
    pub ride_options: Vec<RideOption>,
    pub current_ride: Option<ActiveRide>,
    pub current_estimate: Option<RideEstimate>,
    pub estimate_error: Option<String>,
    pub ride_history: Vec<RideRecord>,
    pub is_loading_options: bool,
    pub is_loading_ride: bool,
    pub is_loading_estimate: bool,
    pub is_loading_history: bool,
    pub is_cancelling: bool,
    pub error: Option<String>,
    /// Typed reason for the last failed booking, cleared on the next attempt.
    pub booking_error: Option<BookingError>,
    pending_booking: Option<BookingRequest>,
}

impl RideSlice {
    /// True if there is a ride that has not completed or been cancelled.
    pub fn has_active_ride(&self) -> bool {
        self.current_ride
            .as_ref()
            .is_some_and(|ride| !ride.status.is_terminal())
    }

    pub fn option(&self, id: &str) -> Option<&RideOption> {
        self.ride_options.iter().find(|o| o.id == id)
    }

    /// Guards for a new booking, checked in order.
    pub fn check_booking(&self, request: &BookingRequest) -> Result<(), BookingError> {
        if self.is_loading_ride {
            return Err(BookingError::ConcurrentRequest);
        }
        if self.has_active_ride() {
            return Err(BookingError::ActiveRideExists);
        }

        let mut missing = Vec::new();
        if request.option_id.trim().is_empty() {
            missing.push("ride option");
        }
        if request.user_id.trim().is_empty() {
            missing.push("user");
        }
        if !missing.is_empty() {
            return Err(BookingError::MissingFields(missing));
        }

        if !request.pickup.coordinates.is_valid() {
            return Err(BookingError::InvalidLocation("pickup coordinates are out of range".into()));
        }
        if !request.dropoff.coordinates.is_valid() {
            return Err(BookingError::InvalidLocation("dropoff coordinates are out of range".into()));
        }
        if request.pickup.coordinates.distance_km(&request.dropoff.coordinates) < MIN_TRIP_DISTANCE_KM {
            return Err(BookingError::InvalidLocation(
                "pickup and dropoff are the same place".into(),
            ));
        }

        if !self.ride_options.is_empty() && self.option(&request.option_id).is_none() {
            return Err(BookingError::InvalidOption(request.option_id.clone()));
        }
        Ok(())
    }

    /// Runs the guards. On success the slice is marked loading and keeps the
    /// request until the backend answers.
    pub fn begin_booking(&mut self, request: BookingRequest) -> Result<BookingRequest, BookingError> {
        if let Err(err) = self.check_booking(&request) {
            warn!("Booking rejected: {}", err);
            // A concurrent attempt must not clobber the in-flight booking's state.
            if err != BookingError::ConcurrentRequest {
                self.error = Some(err.user_message());
            }
            self.booking_error = Some(err.clone());
            return Err(err);
        }
        self.is_loading_ride = true;
        self.error = None;
        self.booking_error = None;
        self.pending_booking = Some(request.clone());
        Ok(request)
    }

    pub fn finish_booking(
        &mut self,
        result: Result<BookingConfirmation, ApiError>,
        now: DateTime<Utc>,
    ) -> Result<BookingReceipt, BookingError> {
        self.is_loading_ride = false;
        let request = self.pending_booking.take();

        let confirmation = match result {
            Ok(c) => c,
            Err(e) => {
                warn!("Booking failed: {}", e);
                let err = BookingError::from(e);
                self.error = Some(err.user_message());
                self.booking_error = Some(err.clone());
                return Err(err);
            }
        };

        let Some(request) = request else {
            let err = BookingError::Server("Booking response arrived without a request".into());
            self.booking_error = Some(err.clone());
            return Err(err);
        };

        let distance_km = confirmation
            .distance_km
            .unwrap_or_else(|| request.pickup.coordinates.distance_km(&request.dropoff.coordinates));
        let duration_min = confirmation
            .duration_min
            .unwrap_or(distance_km / FALLBACK_SPEED_KMH * 60.0);
        let fare = confirmation.fare.or_else(|| {
            self.option(&request.option_id)
                .map(|o| o.quote(distance_km, duration_min, 1.0))
        });

        info!("Ride booked: {} ({:?})", confirmation.ride_id, confirmation.status);
        self.current_ride = Some(ActiveRide {
            id: confirmation.ride_id.clone(),
            status: confirmation.status,
            option_id: request.option_id,
            pickup: request.pickup,
            destination: request.dropoff,
            driver: confirmation.driver,
            fare,
            distance_km,
            duration_min,
            notes: request.notes,
            payment_method_id: request.payment_method_id,
            driver_location: None,
            driver_eta_min: confirmation.eta_min,
            requested_at: now,
        });
        self.current_estimate = None;
        Ok(BookingReceipt {
            ride_id: confirmation.ride_id,
        })
    }

    /// Only the current, non-terminal ride can be cancelled.
    pub fn begin_cancel(&mut self, ride_id: &str) -> Result<(), String> {
        let result = match &self.current_ride {
            _ if self.is_cancelling => Err("A cancellation is already in progress.".to_string()),
            Some(ride) if ride.id == ride_id && !ride.status.is_terminal() => Ok(()),
            Some(ride) if ride.id == ride_id => Err("This ride has already ended.".to_string()),
            _ => Err("No active ride to cancel.".to_string()),
        };
        match &result {
            Ok(()) => {
                self.is_cancelling = true;
                self.error = None;
            }
            Err(msg) => self.error = Some(msg.clone()),
        }
        result
    }

    pub fn finish_cancel(&mut self, ride_id: &str, result: Result<(), ApiError>) {
        self.is_cancelling = false;
        match result {
            Ok(()) => {
                info!("Ride cancelled: {}", ride_id);
                self.close_current(ride_id, RideStatus::Cancelled);
            }
            Err(e) => {
                warn!("Cancel failed for {}: {}", ride_id, e);
                self.error = Some(e.user_message());
            }
        }
    }

    /// Returns false (and sets `estimate_error`) if the request can't be sent.
    pub fn begin_estimate(&mut self, request: &EstimateRequest) -> bool {
        if self.is_loading_estimate {
            return false;
        }
        if !request.pickup.coordinates.is_valid() || !request.dropoff.coordinates.is_valid() {
            self.estimate_error = Some("Invalid pickup or dropoff location.".to_string());
            return false;
        }
        if request.option_ids.is_empty() {
            self.estimate_error = Some("Select at least one ride option.".to_string());
            return false;
        }
        self.is_loading_estimate = true;
        true
    }

    /// On failure `current_estimate` keeps its previous value.
    pub fn finish_estimate(&mut self, requested: &[String], result: Result<RideEstimate, ApiError>) {
        self.is_loading_estimate = false;
        match result {
            Ok(mut estimate) => {
                estimate.fill_missing_quotes(requested, &self.ride_options);
                self.current_estimate = Some(estimate);
                self.estimate_error = None;
            }
            Err(e) => {
                warn!("Estimate failed: {}", e);
                self.estimate_error = Some(e.user_message());
            }
        }
    }

    pub fn finish_options(&mut self, result: Result<Vec<RideOption>, ApiError>) {
        self.is_loading_options = false;
        match result {
            Ok(options) => {
                debug!("Loaded {} ride options", options.len());
                self.ride_options = options;
            }
            Err(e) => {
                warn!("Failed to load ride options: {}", e);
                self.error = Some(e.user_message());
            }
        }
    }

    pub fn finish_history(&mut self, result: Result<Vec<RideRecord>, ApiError>) {
        self.is_loading_history = false;
        match result {
            Ok(mut records) => {
                records.sort_by(|a, b| b.date.cmp(&a.date));
                self.ride_history = records;
            }
            Err(e) => {
                warn!("Failed to load ride history: {}", e);
                self.error = Some(e.user_message());
            }
        }
    }

    /// Moves the current ride forward. Returns true if the status changed.
    pub fn apply_status(&mut self, ride_id: &str, status: RideStatus) -> bool {
        if status == RideStatus::Unknown {
            debug!("Ignoring unknown status for {}", ride_id);
            return false;
        }
        let Some(ride) = self.current_ride.as_mut().filter(|r| r.id == ride_id) else {
            debug!("Status {:?} for {} does not match the current ride", status, ride_id);
            return false;
        };
        if ride.status == status || ride.status.is_terminal() {
            return false;
        }
        ride.status = status;
        if status.is_terminal() {
            self.close_current(ride_id, status);
        }
        true
    }

    pub fn apply_refresh(&mut self, update: RideUpdate) {
        let ride_id = update.ride_id.clone();
        if let Some(ride) = self.current_ride.as_mut().filter(|r| r.id == ride_id) {
            if update.driver.is_some() {
                ride.driver = update.driver;
            }
            if update.driver_location.is_some() {
                ride.driver_location = update.driver_location;
            }
            if update.eta_min.is_some() {
                ride.driver_eta_min = update.eta_min;
            }
        }
        self.apply_status(&ride_id, update.status);
    }

    pub fn apply_driver_location(&mut self, ride_id: &str, location: Coordinates, eta_min: Option<u32>) {
        if let Some(ride) = self.current_ride.as_mut().filter(|r| r.id == ride_id) {
            ride.driver_location = Some(location);
            if eta_min.is_some() {
                ride.driver_eta_min = eta_min;
            }
        }
    }

    /// Records the current ride in history and clears it.
    fn close_current(&mut self, ride_id: &str, status: RideStatus) {
        if let Some(ride) = self.current_ride.take_if(|r| r.id == ride_id) {
            self.ride_history.retain(|r| r.id != ride.id);
            self.ride_history.insert(0, RideRecord::from_ride(&ride, status));
        }
    }
}
