use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Paragraph};

use crate::console::component::Component;
use crate::console::components::{RequestCard, StatusBar};
use crate::core::driver::{DriverSlice, DriverStatus};
use crate::core::state::Store;

const HELP: &str = "[o] online/offline  [a] accept  [r] reject  [s] start  [c] complete  [q] quit";

pub fn draw_console(frame: &mut Frame, store: &Store) {
    use Constraint::{Length, Min, Percentage};
    let [title_area, main_area, help_area] =
        Layout::vertical([Length(1), Min(0), Length(1)]).areas(frame.area());
    let [request_area, trip_area] =
        Layout::horizontal([Percentage(60), Percentage(40)]).areas(main_area);

    let driver = &store.driver;
    StatusBar::new(
        driver.status,
        store.status_message.clone(),
        driver.error.clone(),
    )
    .render(frame, title_area);

    RequestCard {
        request: driver.incoming_request.as_ref(),
        total_secs: driver.countdown_secs,
    }
    .render(frame, request_area);

    draw_trip_panel(frame, trip_area, driver);

    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        help_area,
    );
}

fn draw_trip_panel(frame: &mut Frame, area: Rect, driver: &DriverSlice) {
    let mut lines = match (&driver.current_job, driver.status) {
        (Some(job), DriverStatus::Accepted) => vec![
            Line::from(format!("Pick up {}", job.rider_name)),
            Line::from(job.pickup_address.clone()),
            Line::from("[s] start trip"),
        ],
        (Some(job), DriverStatus::InProgress) => vec![
            Line::from(format!("Driving {}", job.rider_name)),
            Line::from(format!("to {}", job.dropoff_address)),
            Line::from("[c] complete trip"),
        ],
        _ => vec![Line::from("No active trip")],
    };
    lines.push(Line::from(""));
    lines.push(Line::from(format!("Today: ${:.2}", driver.earnings_today)));
    lines.push(Line::from(format!("Trips: {}", driver.trips_today)));

    let panel = Paragraph::new(lines).block(Block::bordered().title("Trip"));
    frame.render_widget(panel, area);
}
