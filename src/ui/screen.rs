use ratatui::Frame;
use stride::SessionState;

use crate::{ui::SummaryView, App};

/// A UI Screen boundary: responsible for rendering one phase of the run
pub trait Screen {
    fn render(&self, app: &App, f: &mut Frame);
}

/// Record screen - idle, waiting for permission and live recording
pub struct RecordScreen;

impl Screen for RecordScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        f.render_widget(app, f.area());
    }
}

/// Summary screen - the frozen result until it is acknowledged
pub struct SummaryScreen;

impl Screen for SummaryScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        match app.summary.as_ref() {
            Some(summary) => f.render_widget(SummaryView::new(summary, app.units), f.area()),
            None => f.render_widget(app, f.area()),
        }
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: SessionState) -> Box<dyn Screen> {
    match state {
        SessionState::Idle | SessionState::AwaitingPermission | SessionState::Recording => {
            Box::new(RecordScreen)
        }
        SessionState::Stopped => Box::new(SummaryScreen),
    }
}
