//! RideKit library exports for the binary and integration tests

pub mod api;
pub mod client;
pub mod console;
pub mod core;
pub mod realtime;

#[cfg(test)]
pub mod test_support;
