use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::action::Action;
use crate::core::driver::{DriverSlice, DriverStatus};

/// Console input events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    Quit,
    ToggleOnline,
    Accept,
    Reject,
    StartTrip,
    CompleteTrip,
    Resize,
}

/// Key bindings: `o` online/offline, `a` accept, `r` reject, `s` start,
/// `c` complete, `q`/Esc/Ctrl+C quit.
pub fn map_key(key: KeyEvent) -> Option<ConsoleEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(ConsoleEvent::Quit),
        (_, KeyCode::Char('q')) | (_, KeyCode::Esc) => Some(ConsoleEvent::Quit),
        (_, KeyCode::Char('o')) => Some(ConsoleEvent::ToggleOnline),
        (_, KeyCode::Char('a')) => Some(ConsoleEvent::Accept),
        (_, KeyCode::Char('r')) => Some(ConsoleEvent::Reject),
        (_, KeyCode::Char('s')) => Some(ConsoleEvent::StartTrip),
        (_, KeyCode::Char('c')) => Some(ConsoleEvent::CompleteTrip),
        _ => None,
    }
}

/// Core action for an input event, given the current driver state.
pub fn action_for(event: ConsoleEvent, driver: &DriverSlice) -> Option<Action> {
    match event {
        ConsoleEvent::ToggleOnline if driver.status == DriverStatus::Offline => {
            Some(Action::GoOnline)
        }
        ConsoleEvent::ToggleOnline => Some(Action::GoOffline),
        ConsoleEvent::Accept => Some(Action::AcceptRequest),
        ConsoleEvent::Reject => Some(Action::RejectRequest),
        ConsoleEvent::StartTrip => Some(Action::StartTrip),
        ConsoleEvent::CompleteTrip => Some(Action::CompleteTrip),
        ConsoleEvent::Quit | ConsoleEvent::Resize => None,
    }
}

/// Waits up to `timeout` for an input event.
pub fn poll_event(timeout: Duration) -> io::Result<Option<ConsoleEvent>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    Ok(match event::read()? {
        Event::Key(key) => {
            log::debug!("Key event: {:?} with modifiers {:?}", key.code, key.modifiers);
            map_key(key)
        }
        Event::Resize(_, _) => Some(ConsoleEvent::Resize),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::driver_request;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(map_key(key(KeyCode::Char('o'))), Some(ConsoleEvent::ToggleOnline));
        assert_eq!(map_key(key(KeyCode::Char('a'))), Some(ConsoleEvent::Accept));
        assert_eq!(map_key(key(KeyCode::Esc)), Some(ConsoleEvent::Quit));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ConsoleEvent::Quit)
        );
        assert_eq!(map_key(key(KeyCode::Char('c'))), Some(ConsoleEvent::CompleteTrip));
        assert_eq!(map_key(key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_toggle_depends_on_status() {
        let mut driver = DriverSlice::default();
        assert_eq!(action_for(ConsoleEvent::ToggleOnline, &driver), Some(Action::GoOnline));

        driver.go_online().unwrap();
        assert_eq!(action_for(ConsoleEvent::ToggleOnline, &driver), Some(Action::GoOffline));

        // Refused by the reducer, not here.
        driver.receive_request(driver_request("req-1", 5.0));
        assert_eq!(action_for(ConsoleEvent::ToggleOnline, &driver), Some(Action::GoOffline));
        assert_eq!(action_for(ConsoleEvent::Quit, &driver), None);
    }
}
