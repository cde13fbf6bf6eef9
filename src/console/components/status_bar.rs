//! # StatusBar Component
//!
//! One-line header: driver state and the latest status message or error.
//! Purely presentational.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::console::component::Component;
use crate::core::driver::DriverStatus;

pub struct StatusBar {
    pub driver_status: DriverStatus,
    pub status_message: String,
    pub error: Option<String>,
}

impl StatusBar {
    pub fn new(driver_status: DriverStatus, status_message: String, error: Option<String>) -> Self {
        Self {
            driver_status,
            status_message,
            error,
        }
    }
}

fn status_style(status: DriverStatus) -> Style {
    match status {
        DriverStatus::Offline => Style::default().fg(Color::DarkGray),
        DriverStatus::Online => Style::default().fg(Color::Green),
        DriverStatus::IncomingRequest => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        DriverStatus::Accepted | DriverStatus::InProgress => Style::default().fg(Color::Cyan),
    }
}

impl Component for StatusBar {
    /// Error wins over the status message; both are optional.
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::raw("RideKit Driver | "),
            Span::styled(self.driver_status.label(), status_style(self.driver_status)),
        ];
        if let Some(error) = &self.error {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(error.clone(), Style::default().fg(Color::Red)));
        } else if !self.status_message.is_empty() {
            spans.push(Span::raw(format!(" | {}", self.status_message)));
        }
        frame.render_widget(Line::from(spans), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn rendered(bar: &mut StatusBar) -> String {
        let backend = TestBackend::new(80, 1);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| bar.render(f, f.area())).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_status_bar_shows_state_and_message() {
        let mut bar = StatusBar::new(DriverStatus::Online, "New ride request".into(), None);
        let text = rendered(&mut bar);
        assert!(text.contains("RideKit Driver"));
        assert!(text.contains("Online"));
        assert!(text.contains("New ride request"));
    }

    #[test]
    fn test_status_bar_error_replaces_message() {
        let mut bar = StatusBar::new(
            DriverStatus::Offline,
            "Signed in".into(),
            Some("cannot go offline while offline".into()),
        );
        let text = rendered(&mut bar);
        assert!(text.contains("cannot go offline"));
        assert!(!text.contains("Signed in"));
    }

    #[test]
    fn test_status_bar_without_message_has_one_separator() {
        let mut bar = StatusBar::new(DriverStatus::Offline, String::new(), None);
        let text = rendered(&mut bar);
        assert_eq!(text.matches('|').count(), 1);
    }
}
