//! # RequestCard Component
//!
//! Shows the offered request with a countdown gauge that drains as the
//! one-second ticks arrive.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Gauge, Paragraph};

use crate::console::component::Component;
use crate::core::driver::DriverRequest;

pub struct RequestCard<'a> {
    pub request: Option<&'a DriverRequest>,
    /// Full countdown, for the gauge ratio.
    pub total_secs: u32,
}

impl RequestCard<'_> {
    /// Share of the countdown left, in `0.0..=1.0`.
    pub fn remaining_ratio(&self) -> f64 {
        match self.request {
            Some(request) if self.total_secs > 0 => {
                (f64::from(request.countdown) / f64::from(self.total_secs)).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

impl Component for RequestCard<'_> {
    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title("Incoming request");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(request) = self.request else {
            let idle = Paragraph::new("Waiting for requests...")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(idle, inner);
            return;
        };

        let [details_area, gauge_area, help_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(inner);

        let details = Paragraph::new(vec![
            Line::from(format!("Rider:   {}", request.rider_name)),
            Line::from(format!("Pickup:  {}", request.pickup_address)),
            Line::from(format!("Dropoff: {}", request.dropoff_address)),
            Line::from(format!(
                "Fare:    ${:.2}  (~{} min)",
                request.estimated_price, request.estimated_minutes
            )),
        ]);
        frame.render_widget(details, details_area);

        let color = if request.countdown <= 5 {
            Color::Red
        } else {
            Color::Yellow
        };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(color))
            .ratio(self.remaining_ratio())
            .label(format!("{}s", request.countdown));
        frame.render_widget(gauge, gauge_area);

        frame.render_widget(Paragraph::new("[a] accept  [r] reject"), help_area);
    }
}
