//! Haptic and sound cues for ride status changes.
//!
//! The core only names the cue. A [`FeedbackSink`] plays it, fire-and-forget.

use log::info;

use crate::core::ride::RideStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Haptic {
    Light,
    Medium,
    Heavy,
    Success,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Searching,
    DriverFound,
    DriverArriving,
    DriverArrived,
    TripStarted,
    TripCompleted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub haptic: Haptic,
    pub sound: Sound,
}

/// Cue for a status. `Unknown` has none.
pub fn feedback_for(status: RideStatus) -> Option<Feedback> {
    let (haptic, sound) = match status {
        RideStatus::Pending => (Haptic::Light, Sound::Searching),
        RideStatus::Accepted => (Haptic::Success, Sound::DriverFound),
        RideStatus::DriverArriving => (Haptic::Light, Sound::DriverArriving),
        RideStatus::Arrived => (Haptic::Heavy, Sound::DriverArrived),
        RideStatus::InProgress => (Haptic::Medium, Sound::TripStarted),
        RideStatus::Completed => (Haptic::Success, Sound::TripCompleted),
        RideStatus::Cancelled => (Haptic::Warning, Sound::Cancelled),
        RideStatus::Unknown => return None,
    };
    Some(Feedback { haptic, sound })
}

pub trait FeedbackSink: Send + Sync {
    fn play(&self, feedback: Feedback);
}

/// Writes cues to the log. Used where no device output exists.
#[derive(Debug, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn play(&self, feedback: Feedback) {
        info!("Feedback: {:?} haptic, {:?} sound", feedback.haptic, feedback.sound);
    }
}
