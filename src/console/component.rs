use ratatui::Frame;
use ratatui::layout::Rect;

/// A reusable UI component.
///
/// Components receive data via props (struct fields) and render into a
/// `Frame` within a given `Rect`. `render` takes `&mut self` so a component
/// may update presentation caches during the render pass.
pub trait Component {
    fn render(&mut self, frame: &mut Frame, area: Rect);
}
