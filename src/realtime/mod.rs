//! # Real-time Updates
//!
//! Ride status, driver position and incoming driver requests arrive over a
//! server-sent-event stream. This module turns them into `Action`s.
//!
//! - [`channel`]: the `StatusChannel` trait and the SSE implementation
//! - [`events`]: decoded stream payloads and topics
//! - [`monitor`]: connection state and the pending-action queue
//! - [`feedback`]: haptic/sound cues per status
//! - [`watcher`]: the reconnecting task that ties them together

pub mod channel;
pub mod events;
pub mod feedback;
pub mod monitor;
pub mod watcher;

pub use channel::{SseChannel, StatusChannel};
pub use events::{ChannelSignal, StreamEvent, Topic};
pub use feedback::{Feedback, FeedbackSink, LogFeedback};
pub use monitor::{ConnectionState, RideStatusMonitor};
pub use watcher::{ReconnectPolicy, StatusWatcher, WatchHandle, WatchOutcome};
