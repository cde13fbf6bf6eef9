//! # Backend API
//!
//! Thin client for the REST/JSON backend. Every response is a
//! `{success, data?, error?}` envelope; [`types::Envelope`] unwraps it.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::RideApi;
pub use error::ApiError;
pub use http::HttpApi;
pub use types::Envelope;
