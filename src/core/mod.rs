//! # Core Application Logic
//!
//! This module contains ridekit's business logic.
//! It knows nothing about HTTP, terminals or any specific UI technology.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • Store (slices)       │
//!                    │  • Action (events)      │
//!                    │  • update() (reducer)   │
//!                    │  • Effect (I/O intent)  │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │    CLI     │      │  Console   │      │  Realtime  │
//!     │  (clap)    │      │ (ratatui)  │      │  watcher   │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`state`]: The `Store` struct, all application state in one place
//! - [`action`]: The `Action` enum, `Effect` enum and `update()`
//! - [`ride`], [`driver`], [`location`], [`auth`], [`payment`]: the slices
//! - [`onboarding`]: step contracts, validation and progress
//! - [`storage`]: credential storage
//! - [`config`]: settings resolution

pub mod action;
pub mod auth;
pub mod config;
pub mod driver;
pub mod geo;
pub mod location;
pub mod onboarding;
pub mod payment;
pub mod ride;
pub mod state;
pub mod storage;
