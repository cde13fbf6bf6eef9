//! # Status Watcher
//!
//! Background task that follows one ride over a [`StatusChannel`].
//!
//! ```text
//! ┌──────────────┐  ChannelSignal   ┌────────────────┐   Action    ┌───────────┐
//! │ StatusChannel│ ───────────────▶ │  watcher task  │ ──────────▶ │ app loop  │
//! └──────────────┘                  │ (monitor+sink) │             └───────────┘
//!                                   └────────────────┘
//!                                          ▲ WatchCommand
//!                                          │
//!                                     WatchHandle
//! ```
//!
//! When the stream drops, the task reconnects with exponential backoff. After
//! `max_attempts` consecutive failures it gives up and reports
//! `Disconnected`. A terminal status ends the task and fires the finish
//! callback.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::channel::StatusChannel;
use super::events::{ChannelSignal, StreamEvent, Topic};
use super::feedback::FeedbackSink;
use super::monitor::{ConnectionState, PendingKind, RideStatusMonitor};
use crate::core::action::Action;
use crate::core::config::ResolvedConfig;
use crate::core::ride::RideStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            base: config.reconnect_base,
            max: config.reconnect_max,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Cancel { reason: String },
    Refresh,
    Stop,
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchStatus {
    pub state: ConnectionState,
    pub pending: usize,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The ride reached a terminal status.
    Finished(RideStatus),
    /// Stopped by command or because the action receiver went away.
    Stopped,
    /// Reconnect attempts exhausted.
    GaveUp,
}

pub type FinishCallback = Box<dyn FnOnce(RideStatus) + Send>;

pub struct StatusWatcher {
    channel: Arc<dyn StatusChannel>,
    feedback: Arc<dyn FeedbackSink>,
    policy: ReconnectPolicy,
    pending_ttl: Duration,
}

impl StatusWatcher {
    pub fn new(
        channel: Arc<dyn StatusChannel>,
        feedback: Arc<dyn FeedbackSink>,
        policy: ReconnectPolicy,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            channel,
            feedback,
            policy,
            pending_ttl,
        }
    }

    /// Starts following `ride_id`. Status and location updates are sent to
    /// `actions`; `on_finished` runs once when the ride completes or is cancelled.
    pub fn spawn(
        self,
        ride_id: &str,
        actions: mpsc::Sender<Action>,
        on_finished: Option<FinishCallback>,
    ) -> WatchHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(WatchStatus::default());
        let monitor = RideStatusMonitor::new(ride_id, self.pending_ttl);
        let task = WatchTask {
            watcher: self,
            monitor,
            actions,
            commands: command_rx,
            commands_open: true,
            status: status_tx,
            on_finished,
        };
        let join = tokio::spawn(task.run());
        WatchHandle {
            commands: command_tx,
            status: status_rx,
            join,
        }
    }
}

pub struct WatchHandle {
    commands: mpsc::Sender<WatchCommand>,
    status: watch::Receiver<WatchStatus>,
    join: JoinHandle<WatchOutcome>,
}

impl WatchHandle {
    pub async fn cancel(&self, reason: &str) {
        self.send(WatchCommand::Cancel {
            reason: reason.to_string(),
        })
        .await;
    }

    pub async fn refresh(&self) {
        self.send(WatchCommand::Refresh).await;
    }

    pub async fn stop(&self) {
        self.send(WatchCommand::Stop).await;
    }

    async fn send(&self, command: WatchCommand) {
        if self.commands.send(command).await.is_err() {
            debug!("Watcher already finished; command dropped");
        }
    }

    pub fn status(&self) -> WatchStatus {
        *self.status.borrow()
    }

    /// Receiver for status snapshots (console, tests).
    pub fn subscribe_status(&self) -> watch::Receiver<WatchStatus> {
        self.status.clone()
    }

    /// Waits for the task to end.
    pub async fn join(self) -> WatchOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Watcher task failed: {}", e);
                WatchOutcome::Stopped
            }
        }
    }
}

// ============================================================================
// Task
// ============================================================================

struct WatchTask {
    watcher: StatusWatcher,
    monitor: RideStatusMonitor,
    actions: mpsc::Sender<Action>,
    commands: mpsc::Receiver<WatchCommand>,
    commands_open: bool,
    status: watch::Sender<WatchStatus>,
    on_finished: Option<FinishCallback>,
}

/// Why an inner session loop returned.
enum SessionEnd {
    Dropped,
    Done(WatchOutcome),
}

impl WatchTask {
    async fn run(mut self) -> WatchOutcome {
        let ride_id = self.monitor.ride_id().to_string();
        info!("Watching ride {}", ride_id);

        let mut attempt = 0u32;
        loop {
            self.monitor.begin_attempt(attempt > 0);
            self.publish(attempt);

            let (signal_tx, signal_rx) = mpsc::channel(32);
            let channel = self.watcher.channel.clone();
            let topic = Topic::Ride(ride_id.clone());
            let subscription =
                tokio::spawn(async move { channel.subscribe(&topic, signal_tx).await });

            let mut connected = false;
            let end = self.session(signal_rx, &mut connected).await;
            subscription.abort();
            match subscription.await {
                Ok(Err(e)) => warn!("Stream for {} failed: {}", ride_id, e),
                Ok(Ok(())) => debug!("Stream for {} ended", ride_id),
                Err(_) => {}
            }

            if let SessionEnd::Done(outcome) = end {
                self.monitor.on_disconnected();
                self.publish(attempt);
                info!("Watcher for {} done: {:?}", ride_id, outcome);
                return outcome;
            }

            attempt = if connected { 1 } else { attempt + 1 };
            if attempt > self.watcher.policy.max_attempts {
                warn!("Giving up on {} after {} attempts", ride_id, attempt - 1);
                self.monitor.on_disconnected();
                self.publish(attempt - 1);
                return WatchOutcome::GaveUp;
            }

            self.monitor.on_dropped();
            self.publish(attempt);
            let delay = self.watcher.policy.delay(attempt);
            debug!("Reconnecting to {} in {:?} (attempt {})", ride_id, delay, attempt);
            if let Some(outcome) = self.wait(delay).await {
                self.monitor.on_disconnected();
                self.publish(attempt);
                return outcome;
            }
        }
    }

    /// Runs until the subscription ends or the watch is over.
    async fn session(
        &mut self,
        mut signals: mpsc::Receiver<ChannelSignal>,
        connected: &mut bool,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(ChannelSignal::Open) => {
                        *connected = true;
                        if let Some(outcome) = self.on_open().await {
                            return SessionEnd::Done(outcome);
                        }
                    }
                    Some(ChannelSignal::Event(event)) => {
                        if let Some(outcome) = self.on_event(event).await {
                            return SessionEnd::Done(outcome);
                        }
                    }
                    None => return SessionEnd::Dropped,
                },
                command = self.commands.recv(), if self.commands_open => {
                    if let Some(outcome) = self.on_command(command).await {
                        return SessionEnd::Done(outcome);
                    }
                }
            }
        }
    }

    /// Sleeps through a backoff delay while still accepting commands.
    async fn wait(&mut self, delay: Duration) -> Option<WatchOutcome> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.commands.recv(), if self.commands_open => {
                    if let Some(outcome) = self.on_command(command).await {
                        return Some(outcome);
                    }
                }
            }
        }
    }

    async fn on_open(&mut self) -> Option<WatchOutcome> {
        let ride_id = self.monitor.ride_id().to_string();
        let replay = self.monitor.on_connected(Utc::now());
        info!("Connected to {} ({} queued actions)", ride_id, replay.len());
        self.publish(0);
        for pending in replay {
            debug!("Replaying {} ({:?})", pending.id, pending.kind);
            if !self.emit(pending.kind.into_action(&ride_id)).await {
                return Some(WatchOutcome::Stopped);
            }
        }
        None
    }

    async fn on_event(&mut self, event: StreamEvent) -> Option<WatchOutcome> {
        let ride_id = self.monitor.ride_id().to_string();
        match &event {
            StreamEvent::RideStatus { .. } => {
                let reaction = self.monitor.handle_event(&event)?;
                if let Some(feedback) = reaction.feedback {
                    self.watcher.feedback.play(feedback);
                }
                let action = Action::RideStatusChanged {
                    ride_id,
                    status: reaction.status,
                };
                if !self.emit(action).await {
                    return Some(WatchOutcome::Stopped);
                }
                if reaction.terminal {
                    if let Some(callback) = self.on_finished.take() {
                        callback(reaction.status);
                    }
                    return Some(WatchOutcome::Finished(reaction.status));
                }
                None
            }
            StreamEvent::RideLocation {
                ride_id: event_ride,
                location,
                eta_min,
            } if *event_ride == ride_id => {
                let action = Action::DriverLocationUpdated {
                    ride_id,
                    location: *location,
                    eta_min: *eta_min,
                };
                if self.emit(action).await {
                    None
                } else {
                    Some(WatchOutcome::Stopped)
                }
            }
            other => {
                debug!("Ignoring event on ride stream: {:?}", other);
                None
            }
        }
    }

    async fn on_command(&mut self, command: Option<WatchCommand>) -> Option<WatchOutcome> {
        let kind = match command {
            Some(WatchCommand::Cancel { reason }) => PendingKind::Cancel { reason },
            Some(WatchCommand::Refresh) => PendingKind::Refresh,
            Some(WatchCommand::Stop) => return Some(WatchOutcome::Stopped),
            None => {
                self.commands_open = false;
                return None;
            }
        };
        let ride_id = self.monitor.ride_id().to_string();
        match self.monitor.submit(kind, Utc::now()) {
            Some(kind) => {
                if !self.emit(kind.into_action(&ride_id)).await {
                    return Some(WatchOutcome::Stopped);
                }
            }
            None => self.publish(0),
        }
        None
    }

    /// False if the receiving side is gone.
    async fn emit(&mut self, action: Action) -> bool {
        if self.actions.send(action).await.is_err() {
            warn!("Action receiver dropped; stopping watcher");
            return false;
        }
        true
    }

    fn publish(&self, attempt: u32) {
        let status = WatchStatus {
            state: self.monitor.state(),
            pending: self.monitor.pending().len(),
            attempt,
        };
        self.status.send_replace(status);
    }
}

// ============================================================================
// Driver feed
// ============================================================================

/// Forwards `driver.request` events for `driver_id` into `actions` as
/// `Action::RequestReceived`, reconnecting per `policy`. Returns when the
/// receiver is dropped or attempts run out.
pub async fn forward_driver_requests(
    channel: Arc<dyn StatusChannel>,
    driver_id: &str,
    policy: ReconnectPolicy,
    actions: mpsc::Sender<Action>,
) {
    let mut attempt = 0u32;
    loop {
        let (signal_tx, mut signal_rx) = mpsc::channel(32);
        let subscriber = channel.clone();
        let topic = Topic::Driver(driver_id.to_string());
        let subscription = tokio::spawn(async move { subscriber.subscribe(&topic, signal_tx).await });

        while let Some(signal) = signal_rx.recv().await {
            match signal {
                ChannelSignal::Open => {
                    info!("Driver feed connected for {}", driver_id);
                    attempt = 0;
                }
                ChannelSignal::Event(StreamEvent::DriverRequest(request)) => {
                    if actions.send(Action::RequestReceived(request)).await.is_err() {
                        subscription.abort();
                        return;
                    }
                }
                ChannelSignal::Event(other) => debug!("Ignoring event on driver feed: {:?}", other),
            }
        }
        if let Ok(Err(e)) = subscription.await {
            warn!("Driver feed failed: {}", e);
        }

        attempt += 1;
        if attempt > policy.max_attempts || actions.is_closed() {
            warn!("Driver feed for {} stopped after {} attempts", driver_id, attempt - 1);
            return;
        }
        tokio::time::sleep(policy.delay(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::ApiError;
    use crate::realtime::feedback::{Feedback, Sound};
    use crate::test_support::driver_request;

    struct Session {
        gate: Option<Arc<Notify>>,
        signals: Vec<ChannelSignal>,
        hold_open: bool,
    }

    /// Plays one scripted session per `subscribe` call, then fails.
    #[derive(Default)]
    struct ScriptedChannel {
        sessions: Mutex<VecDeque<Session>>,
        subscribes: Mutex<u32>,
    }

    impl ScriptedChannel {
        fn with(sessions: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions.into()),
                subscribes: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusChannel for ScriptedChannel {
        async fn subscribe(
            &self,
            _topic: &Topic,
            sender: mpsc::Sender<ChannelSignal>,
        ) -> Result<(), ApiError> {
            *self.subscribes.lock().unwrap() += 1;
            let session = self.sessions.lock().unwrap().pop_front();
            let Some(session) = session else {
                return Err(ApiError::Network("connection refused".into()));
            };
            if let Some(gate) = session.gate {
                gate.notified().await;
            }
            for signal in session.signals {
                if sender.send(signal).await.is_err() {
                    return Ok(());
                }
            }
            if session.hold_open {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Feedback>>);

    impl FeedbackSink for RecordingSink {
        fn play(&self, feedback: Feedback) {
            self.0.lock().unwrap().push(feedback);
        }
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(5),
            max_attempts,
        }
    }

    fn status(status: RideStatus) -> ChannelSignal {
        ChannelSignal::Event(StreamEvent::RideStatus { ride_id: "ride-1".into(), status })
    }

    fn watcher(channel: Arc<ScriptedChannel>, sink: Arc<RecordingSink>, attempts: u32) -> StatusWatcher {
        StatusWatcher::new(channel, sink, fast_policy(attempts), Duration::from_secs(300))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(500),
            max: Duration::from_millis(10_000),
            max_attempts: 8,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(4), Duration::from_millis(4000));
        assert_eq!(policy.delay(6), Duration::from_millis(10_000));
        assert_eq!(policy.delay(40), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_terminal_status_finishes_and_calls_back() {
        let channel = ScriptedChannel::with(vec![Session {
            gate: None,
            signals: vec![
                ChannelSignal::Open,
                status(RideStatus::Accepted),
                status(RideStatus::Completed),
            ],
            hold_open: true,
        }]);
        let sink = Arc::new(RecordingSink::default());
        let (tx, mut rx) = mpsc::channel(16);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let callback: FinishCallback = Box::new(move |status| {
            let _ = done_tx.send(status);
        });

        let handle = watcher(channel, sink.clone(), 3).spawn("ride-1", tx, Some(callback));
        assert_eq!(handle.join().await, WatchOutcome::Finished(RideStatus::Completed));
        assert_eq!(done_rx.await.unwrap(), RideStatus::Completed);

        assert_eq!(
            rx.recv().await.unwrap(),
            Action::RideStatusChanged { ride_id: "ride-1".into(), status: RideStatus::Accepted }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Action::RideStatusChanged { ride_id: "ride-1".into(), status: RideStatus::Completed }
        );
        let sounds: Vec<Sound> = sink.0.lock().unwrap().iter().map(|f| f.sound).collect();
        assert_eq!(sounds, vec![Sound::DriverFound, Sound::TripCompleted]);
    }

    #[tokio::test]
    async fn test_finish_callback_may_hold_unshared_state() {
        let channel = ScriptedChannel::with(vec![Session {
            gate: None,
            signals: vec![ChannelSignal::Open, status(RideStatus::Cancelled)],
            hold_open: true,
        }]);
        let (tx, _rx) = mpsc::channel(16);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        // Cell is Send but not Sync.
        let seen = std::cell::Cell::new(0u32);
        let callback: FinishCallback = Box::new(move |status| {
            seen.set(seen.get() + 1);
            let _ = done_tx.send((status, seen.get()));
        });

        let handle = watcher(channel, Arc::new(RecordingSink::default()), 3)
            .spawn("ride-1", tx, Some(callback));
        assert_eq!(handle.join().await, WatchOutcome::Finished(RideStatus::Cancelled));
        assert_eq!(done_rx.await.unwrap(), (RideStatus::Cancelled, 1));
    }

    #[tokio::test]
    async fn test_commands_queued_while_connecting_are_replayed() {
        let gate = Arc::new(Notify::new());
        let channel = ScriptedChannel::with(vec![Session {
            gate: Some(gate.clone()),
            signals: vec![ChannelSignal::Open],
            hold_open: true,
        }]);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = watcher(channel, Arc::new(RecordingSink::default()), 3).spawn("ride-1", tx, None);
        let mut status = handle.subscribe_status();

        handle.refresh().await;
        status.wait_for(|s| s.pending == 1).await.unwrap();
        gate.notify_one();

        assert_eq!(rx.recv().await.unwrap(), Action::RefreshRide { ride_id: "ride-1".into() });
        status
            .wait_for(|s| s.state == ConnectionState::Connected && s.pending == 0)
            .await
            .unwrap();

        // Connected: commands go straight through.
        handle.cancel("changed plans").await;
        assert_eq!(
            rx.recv().await.unwrap(),
            Action::CancelRide { ride_id: "ride-1".into(), reason: "changed plans".into() }
        );

        handle.stop().await;
        assert_eq!(handle.join().await, WatchOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let channel = ScriptedChannel::with(vec![
            Session { gate: None, signals: vec![ChannelSignal::Open], hold_open: false },
            Session {
                gate: None,
                signals: vec![ChannelSignal::Open, status(RideStatus::Cancelled)],
                hold_open: true,
            },
        ]);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = watcher(channel.clone(), Arc::new(RecordingSink::default()), 3)
            .spawn("ride-1", tx, None);

        assert_eq!(handle.join().await, WatchOutcome::Finished(RideStatus::Cancelled));
        assert_eq!(*channel.subscribes.lock().unwrap(), 2);
        assert!(matches!(
            rx.recv().await,
            Some(Action::RideStatusChanged { status: RideStatus::Cancelled, .. })
        ));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let channel = ScriptedChannel::with(Vec::new());
        let (tx, _rx) = mpsc::channel(16);
        let handle = watcher(channel.clone(), Arc::new(RecordingSink::default()), 2)
            .spawn("ride-1", tx, None);
        let status = handle.subscribe_status();

        assert_eq!(handle.join().await, WatchOutcome::GaveUp);
        assert_eq!(*channel.subscribes.lock().unwrap(), 3);
        assert_eq!(status.borrow().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_driver_feed_forwards_requests() {
        let channel = ScriptedChannel::with(vec![Session {
            gate: None,
            signals: vec![
                ChannelSignal::Open,
                ChannelSignal::Event(StreamEvent::DriverRequest(driver_request("req-1", 9.0))),
            ],
            hold_open: false,
        }]);
        let (tx, mut rx) = mpsc::channel(16);
        forward_driver_requests(channel, "driver-1", fast_policy(0), tx).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            Action::RequestReceived(driver_request("req-1", 9.0))
        );
    }
}
