//! # Console Components
//!
//! Stateless, props-based widgets for the driver console:
//! - `StatusBar`: driver state and the latest status or error
//! - `RequestCard`: the offered request and its countdown gauge

pub mod request_card;
pub mod status_bar;

pub use request_card::RequestCard;
pub use status_bar::StatusBar;
