//! # Driver Slice
//!
//! Availability state machine for the driver side of the app.
//!
//! ```text
//!  offline ──go_online──▶ online ──receive_request──▶ incoming_request
//!     ▲                    │  ▲                          │   │   │
//!     └────go_offline──────┘  ├──────reject / tick→0─────┘   │   │
//!                             │                              │ accept
//!                             │                              ▼
//!                             └──complete_trip── in_progress ◀─start_trip── accepted
//! ```
//!
//! The countdown on an incoming request is decremented by an external tick
//! (one per second in the console). It never goes below zero.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::ApiError;

pub const DEFAULT_REQUEST_COUNTDOWN_SECS: u32 = 30;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    #[default]
    Offline,
    Online,
    IncomingRequest,
    Accepted,
    InProgress,
}

impl DriverStatus {
    pub fn label(self) -> &'static str {
        match self {
            DriverStatus::Offline => "Offline",
            DriverStatus::Online => "Online",
            DriverStatus::IncomingRequest => "Incoming request",
            DriverStatus::Accepted => "Heading to pickup",
            DriverStatus::InProgress => "On trip",
        }
    }
}

/// A ride request offered to this driver. Lives only until accepted,
/// rejected or timed out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverRequest {
    pub id: String,
    pub rider_name: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub estimated_price: f64,
    pub estimated_minutes: u32,
    /// Seconds left to respond. Overwritten with the configured default on arrival.
    #[serde(default)]
    pub countdown: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DriverStatus,
    pub action: &'static str,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} while {}", self.action, self.from.label().to_lowercase())
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug)]
pub struct DriverSlice {
    pub status: DriverStatus,
    pub incoming_request: Option<DriverRequest>,
    /// The accepted job, kept through `accepted` and `in_progress`.
    pub current_job: Option<DriverRequest>,
    pub countdown_secs: u32,
    pub earnings_today: f64,
    pub trips_today: u32,
    pub error: Option<String>,
}

impl Default for DriverSlice {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_COUNTDOWN_SECS)
    }
}

impl DriverSlice {
    /// A countdown of zero is raised to one second so every offer can expire.
    pub fn new(countdown_secs: u32) -> Self {
        Self {
            status: DriverStatus::Offline,
            incoming_request: None,
            current_job: None,
            countdown_secs: countdown_secs.max(1),
            earnings_today: 0.0,
            trips_today: 0,
            error: None,
        }
    }

    fn transition(
        &mut self,
        allowed: DriverStatus,
        to: DriverStatus,
        action: &'static str,
    ) -> Result<(), TransitionError> {
        if self.status != allowed {
            let err = TransitionError { from: self.status, action };
            warn!("Driver transition refused: {}", err);
            self.error = Some(err.to_string());
            return Err(err);
        }
        debug!("Driver {:?} -> {:?}", self.status, to);
        self.status = to;
        self.error = None;
        Ok(())
    }

    pub fn go_online(&mut self) -> Result<(), TransitionError> {
        self.transition(DriverStatus::Offline, DriverStatus::Online, "go online")
    }

    pub fn go_offline(&mut self) -> Result<(), TransitionError> {
        self.transition(DriverStatus::Online, DriverStatus::Offline, "go offline")
    }

    /// Backend refused an availability change: put the previous state back.
    pub fn availability_failed(&mut self, wanted_online: bool, error: &ApiError) {
        warn!("Availability change failed: {}", error);
        match (wanted_online, self.status) {
            (true, DriverStatus::Online) => self.status = DriverStatus::Offline,
            (false, DriverStatus::Offline) => self.status = DriverStatus::Online,
            _ => {}
        }
        self.error = Some(error.user_message());
    }

    /// Offers a request. Ignored unless the driver is online and idle.
    pub fn receive_request(&mut self, mut request: DriverRequest) -> bool {
        if self.status != DriverStatus::Online {
            debug!("Ignoring request {} while {:?}", request.id, self.status);
            return false;
        }
        info!("Incoming request {} from {}", request.id, request.rider_name);
        request.countdown = self.countdown_secs;
        self.incoming_request = Some(request);
        self.status = DriverStatus::IncomingRequest;
        true
    }

    /// One second passes. Returns the id of a request that just expired.
    pub fn tick(&mut self) -> Option<String> {
        let request = self.incoming_request.as_mut()?;
        request.countdown = request.countdown.saturating_sub(1);
        if request.countdown > 0 {
            return None;
        }
        let expired = self.incoming_request.take().map(|r| r.id);
        if self.status == DriverStatus::IncomingRequest {
            self.status = DriverStatus::Online;
        }
        info!("Request expired: {:?}", expired);
        expired
    }

    /// Returns the accepted request's id.
    pub fn accept_request(&mut self) -> Result<String, TransitionError> {
        self.transition(DriverStatus::IncomingRequest, DriverStatus::Accepted, "accept a request")?;
        let request = self.incoming_request.take();
        let id = request.as_ref().map(|r| r.id.clone()).unwrap_or_default();
        self.current_job = request;
        Ok(id)
    }

    /// Returns the rejected request's id.
    pub fn reject_request(&mut self) -> Result<String, TransitionError> {
        self.transition(DriverStatus::IncomingRequest, DriverStatus::Online, "reject a request")?;
        Ok(self.incoming_request.take().map(|r| r.id).unwrap_or_default())
    }

    /// Backend refused the acceptance (rider cancelled, someone else took it).
    pub fn accept_failed(&mut self, request_id: &str, error: &ApiError) {
        if self.status == DriverStatus::Accepted
            && self.current_job.as_ref().is_some_and(|j| j.id == request_id)
        {
            warn!("Acceptance of {} failed: {}", request_id, error);
            self.current_job = None;
            self.status = DriverStatus::Online;
            self.error = Some("This request is no longer available.".to_string());
        }
    }

    pub fn start_trip(&mut self) -> Result<(), TransitionError> {
        self.transition(DriverStatus::Accepted, DriverStatus::InProgress, "start a trip")
    }

    pub fn complete_trip(&mut self) -> Result<(), TransitionError> {
        self.transition(DriverStatus::InProgress, DriverStatus::Online, "complete a trip")?;
        if let Some(job) = self.current_job.take() {
            self.earnings_today += job.estimated_price;
            self.trips_today += 1;
            info!("Trip {} completed, earnings today {:.2}", job.id, self.earnings_today);
        }
        Ok(())
    }
}
