pub mod charting;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use stride::{
    config::DistanceUnit,
    summary::{format_distance, format_pace, format_unit_pace},
    util::format_duration,
    SessionState, WorkoutSummary,
};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

const DESCRIPTION: &str = "Press (s) to begin recording your run. Your route will be tracked and stats will be calculated in real-time.";

impl App {
    /// Pace label in the display unit; km uses the aggregator's own pace.
    pub fn pace_label(&self) -> String {
        match self.units {
            DistanceUnit::Km => format!("{}/km", format_pace(self.live.current_pace)),
            unit => format_unit_pace(
                self.live.total_elapsed_seconds,
                self.live.cumulative_distance_km,
                unit,
            ),
        }
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let italic_dim_style = dim_style.add_modifier(Modifier::ITALIC);
        let state = self.session.state();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Length(1), // status
                Constraint::Length(1), // padding
                Constraint::Length(3), // button
                Constraint::Length(1), // padding
                Constraint::Length(2), // stats
                Constraint::Length(1), // padding
                Constraint::Length(1), // notice
                Constraint::Min(0),    // description
                Constraint::Length(1), // help
            ])
            .split(area);

        Paragraph::new(Span::styled("Record Run", bold_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let status = match state {
            SessionState::Idle => "Track your running activity".to_string(),
            SessionState::AwaitingPermission => "Waiting for location permission...".to_string(),
            SessionState::Recording => format!("● RECORDING   {} fixes", self.session.route().len()),
            SessionState::Stopped => "Run finished".to_string(),
        };
        let status_style = match state {
            SessionState::Recording => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            _ => dim_style,
        };
        Paragraph::new(Span::styled(status, status_style))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        let (label, color) = match state {
            SessionState::Idle => ("START (s)", Color::Green),
            SessionState::AwaitingPermission => ("...", Color::Yellow),
            SessionState::Recording => ("STOP (x)", Color::Red),
            SessionState::Stopped => ("DONE (enter)", Color::Cyan),
        };
        let button_area = centered(chunks[3], 20);
        Paragraph::new(Span::styled(label, bold_style.fg(color)))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)))
            .render(button_area, buf);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ])
            .split(chunks[5]);

        let stats = [
            ("Distance", format_distance(self.live.cumulative_distance_km, self.units)),
            ("Duration", format_duration(self.live.total_elapsed_seconds)),
            ("Pace", self.pace_label()),
        ];
        for ((label, value), column) in stats.into_iter().zip(columns.iter()) {
            Paragraph::new(vec![
                Line::from(Span::styled(label, dim_style)),
                Line::from(Span::styled(value, bold_style)),
            ])
            .alignment(Alignment::Center)
            .render(*column, buf);
        }

        if let Some(notice) = &self.notice {
            Paragraph::new(Span::styled(
                notice.as_str(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[7], buf);
        }

        if state == SessionState::Idle {
            Paragraph::new(Span::styled(DESCRIPTION, dim_style))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .render(chunks[8], buf);
        }

        let help = match state {
            SessionState::Idle => "(s)tart   (q)uit",
            SessionState::AwaitingPermission => "(x) cancel   (q)uit",
            SessionState::Recording => "(x) stop   (q)uit",
            SessionState::Stopped => "(enter) done   (q)uit",
        };
        Paragraph::new(Span::styled(help, italic_dim_style))
            .alignment(Alignment::Center)
            .render(chunks[9], buf);
    }
}

/// Post-run summary with the route drawn as a line chart
pub struct SummaryView<'a> {
    summary: &'a WorkoutSummary,
    units: DistanceUnit,
}

impl<'a> SummaryView<'a> {
    pub fn new(summary: &'a WorkoutSummary, units: DistanceUnit) -> Self {
        Self { summary, units }
    }
}

impl Widget for SummaryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let magenta_style = Style::default().fg(Color::Magenta);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Min(1),    // chart
                Constraint::Length(1), // headline
                Constraint::Length(1), // recorded at
                Constraint::Length(1), // padding
                Constraint::Length(1), // legend
            ])
            .split(area);

        Paragraph::new(Span::styled("Run Summary", bold_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let (x_bounds, y_bounds) = charting::route_bounds(&self.summary.route);
        let points = charting::route_points(&self.summary.route);
        let datasets = vec![Dataset::default()
            .marker(ratatui::symbols::Marker::Braille)
            .style(magenta_style)
            .graph_type(GraphType::Line)
            .data(&points)];

        Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .title("lon")
                    .bounds(x_bounds)
                    .labels(vec![
                        Span::styled(charting::format_label(x_bounds[0]), bold_style),
                        Span::styled(charting::format_label(x_bounds[1]), bold_style),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .title("lat")
                    .bounds(y_bounds)
                    .labels(vec![
                        Span::styled(charting::format_label(y_bounds[0]), bold_style),
                        Span::styled(charting::format_label(y_bounds[1]), bold_style),
                    ]),
            )
            .render(chunks[1], buf);

        Paragraph::new(Span::styled(self.summary.headline(self.units), bold_style))
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        Paragraph::new(Span::styled(
            format!(
                "recorded {}   {} fixes",
                self.summary.recorded_at.format("%Y-%m-%d %H:%M"),
                self.summary.route.len()
            ),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

        Paragraph::new(Span::styled(
            "(enter) done   (q)uit",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        ))
        .alignment(Alignment::Center)
        .render(chunks[5], buf);
    }
}

/// Horizontally centered slice of `area`, at most `width` wide
fn centered(area: Rect, width: u16) -> Rect {
    let width = width.min(area.width);
    Rect {
        x: area.x + (area.width - width) / 2,
        width,
        ..area
    }
}
