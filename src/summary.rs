use chrono::{DateTime, Local};
use serde::Serialize;

use crate::aggregate::{AggregateState, Pace};
use crate::config::DistanceUnit;
use crate::sample::{Coordinate, ValidatedSample};
use crate::util::format_duration;

pub const UNDEFINED_PACE: &str = "-'--\"";

/// Frozen result of one completed recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutSummary {
    pub distance_km: f64,
    pub duration_seconds: u64,
    /// Average pace per kilometer, `M'SS"`.
    pub pace: String,
    pub route: Vec<Coordinate>,
    pub recorded_at: DateTime<Local>,
}

impl WorkoutSummary {
    pub fn freeze(
        aggregate: &AggregateState,
        route: &[ValidatedSample],
        recorded_at: DateTime<Local>,
    ) -> Self {
        Self {
            distance_km: aggregate.cumulative_distance_km,
            duration_seconds: aggregate.total_elapsed_seconds,
            pace: format_pace(aggregate.current_pace),
            route: route.iter().map(Coordinate::from).collect(),
            recorded_at,
        }
    }

    pub fn headline(&self, unit: DistanceUnit) -> String {
        format!(
            "{}   {}   {}",
            format_distance(self.distance_km, unit),
            format_duration(self.duration_seconds),
            format_unit_pace(self.duration_seconds, self.distance_km, unit),
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn format_pace(pace: Option<Pace>) -> String {
    pace.map(|p| p.to_string())
        .unwrap_or_else(|| UNDEFINED_PACE.to_string())
}

/// "1.23 km"
pub fn format_distance(distance_km: f64, unit: DistanceUnit) -> String {
    format!("{:.2} {}", unit.convert(distance_km), unit.abbreviation())
}

/// Average pace in the display unit, e.g. `5'23"/km`.
pub fn format_unit_pace(elapsed_secs: u64, distance_km: f64, unit: DistanceUnit) -> String {
    let pace = Pace::derive(elapsed_secs, unit.convert(distance_km));
    format!("{}/{}", format_pace(pace), unit.abbreviation())
}
