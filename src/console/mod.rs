//! # Driver Console
//!
//! The ratatui front end for drivers. Handles terminal I/O, renders the
//! store and translates keys into `core::Action` values.
//!
//! ## Loop
//!
//! Each pass draws, waits for input until the next one-second tick, then:
//!
//! 1. Key events become actions and go through `update()`.
//! 2. A due tick sends `Action::Tick` (drives the request countdown).
//! 3. Actions from background tasks (effect results, the driver feed) are
//!    drained and applied.
//!
//! Effects are spawned onto the tokio runtime; their results come back over
//! the same channel as the driver feed.

mod component;
mod components;
mod event;
mod ui;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use crate::client::{Services, perform};
use crate::core::action::{Action, Effect, update};
use crate::core::driver::DriverStatus;
use crate::core::state::Store;
use crate::realtime::watcher::forward_driver_requests;
use crate::realtime::{ReconnectPolicy, StatusChannel};

pub use event::{ConsoleEvent, action_for, map_key};

const TICK: Duration = Duration::from_secs(1);

/// Where incoming requests come from.
pub struct DriverFeed {
    pub channel: Arc<dyn StatusChannel>,
    pub driver_id: String,
    pub policy: ReconnectPolicy,
}

pub fn run(mut store: Store, services: Services, feed: Option<DriverFeed>) -> io::Result<()> {
    let (tx, mut rx) = mpsc::channel::<Action>(64);

    if let Some(feed) = feed {
        let feed_tx = tx.clone();
        tokio::spawn(async move {
            forward_driver_requests(feed.channel, &feed.driver_id, feed.policy, feed_tx).await;
        });
    } else {
        info!("No driver feed; requests will not arrive");
    }

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut store, &services, &tx, &mut rx);
    ratatui::restore();

    if store.driver.status != DriverStatus::Offline {
        warn!("Console closed while {}", store.driver.status.label());
    }
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    store: &mut Store,
    services: &Services,
    tx: &mpsc::Sender<Action>,
    rx: &mut mpsc::Receiver<Action>,
) -> io::Result<()> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui::draw_console(f, store))?;

        let timeout = TICK.saturating_sub(last_tick.elapsed());
        if let Some(event) = event::poll_event(timeout)? {
            if event == ConsoleEvent::Quit {
                info!("Console quit");
                return Ok(());
            }
            if let Some(action) = action_for(event, &store.driver) {
                dispatch(store, action, services, tx);
            }
        }

        if last_tick.elapsed() >= TICK {
            last_tick = Instant::now();
            dispatch(store, Action::Tick, services, tx);
        }

        while let Ok(action) = rx.try_recv() {
            debug!("Event loop received: {:?}", action);
            dispatch(store, action, services, tx);
        }
    }
}

/// Applies an action and spawns whatever effect it produced.
fn dispatch(store: &mut Store, action: Action, services: &Services, tx: &mpsc::Sender<Action>) {
    let effect = update(store, action);
    if effect == Effect::None {
        return;
    }
    let services = services.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Some(next) = perform(&services, effect).await
            && tx.send(next).await.is_err()
        {
            warn!("Failed to deliver effect result: receiver dropped");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;
    use crate::test_support::{MockApi, driver_request, test_store};

    #[tokio::test]
    async fn test_dispatch_round_trips_effects() {
        let api = Arc::new(MockApi::default());
        let services = Services::new(api.clone(), Arc::new(MemoryStorage::default()));
        let (tx, mut rx) = mpsc::channel(8);
        let mut store = test_store();

        dispatch(&mut store, Action::GoOnline, &services, &tx);
        assert_eq!(store.driver.status, DriverStatus::Online);

        let reported = rx.recv().await.unwrap();
        assert!(matches!(reported, Action::AvailabilityReported { online: true, result: Ok(()) }));
        dispatch(&mut store, reported, &services, &tx);

        dispatch(&mut store, Action::RequestReceived(driver_request("req-1", 7.0)), &services, &tx);
        dispatch(&mut store, Action::RejectRequest, &services, &tx);
        let reported = rx.recv().await.unwrap();
        assert!(matches!(
            reported,
            Action::RequestResponseReported { accepted: false, .. }
        ));
        assert_eq!(
            api.calls(),
            vec!["set_availability(true)", "respond_to_request(req-1, false)"]
        );
    }
}
