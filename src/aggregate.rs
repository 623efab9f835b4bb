use std::fmt;

use crate::sample::ValidatedSample;
use crate::util::haversine_km;

/// Minutes and whole seconds needed per distance unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    pub minutes: u64,
    pub seconds: u64,
}

impl Pace {
    /// Lifetime average pace. `None` while no distance has been covered.
    pub fn derive(elapsed_secs: u64, distance: f64) -> Option<Pace> {
        if distance <= 0.0 || !distance.is_finite() {
            return None;
        }

        let minutes_per_unit = elapsed_secs as f64 / 60.0 / distance;
        if !minutes_per_unit.is_finite() {
            return None;
        }

        let minutes = minutes_per_unit.floor();
        let seconds = ((minutes_per_unit - minutes) * 60.0).floor();

        Some(Pace {
            minutes: minutes as u64,
            seconds: (seconds as u64).min(59),
        })
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{:02}\"", self.minutes, self.seconds)
    }
}

/// Running totals of the active session.
///
/// `cumulative_distance_km` never decreases and `current_pace` stays `None`
/// until some distance has been covered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AggregateState {
    pub cumulative_distance_km: f64,
    pub total_elapsed_seconds: u64,
    pub current_pace: Option<Pace>,
    pub last_sample: Option<ValidatedSample>,
}

impl AggregateState {
    /// Fold one validated fix into the totals.
    pub fn accept(self, sample: ValidatedSample) -> AggregateState {
        let increment = match self.last_sample {
            Some(prev) => haversine_km(prev.coordinate(), sample.coordinate()),
            None => 0.0,
        };

        // NaN or negative increments cannot happen for validated input, but the
        // total must never go backwards.
        let increment = if increment.is_finite() && increment > 0.0 {
            increment
        } else {
            0.0
        };

        let cumulative_distance_km = self.cumulative_distance_km + increment;

        AggregateState {
            cumulative_distance_km,
            total_elapsed_seconds: self.total_elapsed_seconds,
            current_pace: Pace::derive(self.total_elapsed_seconds, cumulative_distance_km),
            last_sample: Some(sample),
        }
    }

    /// Refresh elapsed time from the wall clock, independent of sample arrival.
    pub fn tick(self, now_millis: i64, started_at_millis: i64) -> AggregateState {
        let total_elapsed_seconds = elapsed_seconds(now_millis, started_at_millis);

        AggregateState {
            total_elapsed_seconds,
            current_pace: Pace::derive(total_elapsed_seconds, self.cumulative_distance_km),
            ..self
        }
    }
}

/// Whole seconds between two millisecond timestamps, clamped at zero.
pub fn elapsed_seconds(now_millis: i64, started_at_millis: i64) -> u64 {
    (now_millis.saturating_sub(started_at_millis).max(0) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::GeoSample;
    use crate::validator::validate;

    fn fold(points: &[(f64, f64)]) -> Vec<AggregateState> {
        let mut state = AggregateState::default();
        let mut out = vec![];
        for (i, &(lat, lon)) in points.iter().enumerate() {
            if let Ok(v) = validate(GeoSample::new(lat, lon, i as i64 * 1000), state.last_sample.as_ref()) {
                state = state.accept(v);
            }
            out.push(state);
        }
        out
    }

    #[test]
    fn first_sample_adds_no_distance() {
        let states = fold(&[(10.0, 10.0)]);
        assert_eq!(states[0].cumulative_distance_km, 0.0);
        assert!(states[0].last_sample.is_some());
        assert_eq!(states[0].current_pace, None);
    }

    #[test]
    fn distance_is_monotonic() {
        let states = fold(&[
            (0.0, 0.0),
            (0.0, 0.001),
            (0.0, 0.0),
            (0.0005, 0.0),
            (0.0005, 0.0),
            (-0.001, 0.002),
        ]);
        for w in states.windows(2) {
            assert!(w[1].cumulative_distance_km >= w[0].cumulative_distance_km);
        }
        // backtracking still counts as movement
        assert!(states[2].cumulative_distance_km > states[1].cumulative_distance_km);
    }

    #[test]
    fn pace_is_undefined_without_distance() {
        let state = AggregateState::default().tick(600_000, 0);
        assert_eq!(state.total_elapsed_seconds, 600);
        assert_eq!(state.current_pace, None);
    }

    #[test]
    fn two_samples_match_haversine_and_pace() {
        let mut state = AggregateState::default();
        let a = validate(GeoSample::new(0.0, 0.0, 0), None).unwrap();
        state = state.accept(a);
        let b = validate(GeoSample::new(0.0, 0.01, 1_000), state.last_sample.as_ref()).unwrap();
        state = state.accept(b);

        let expected = haversine_km(a.coordinate(), b.coordinate());
        assert!((state.cumulative_distance_km - expected).abs() < 1e-12);
        assert!((state.cumulative_distance_km - 1.11).abs() < 0.01);

        // 6 minutes over ~1.112 km is ~5.396 min/km -> 5'23"
        let state = state.tick(360_000, 0);
        let pace_min = 360.0 / 60.0 / state.cumulative_distance_km;
        let pace = state.current_pace.unwrap();
        assert_eq!(pace.minutes, pace_min.floor() as u64);
        assert_eq!(pace.seconds, ((pace_min - pace_min.floor()) * 60.0).floor() as u64);
        assert_eq!(pace.to_string(), "5'23\"");
    }

    #[test]
    fn accepted_sample_recomputes_pace_with_latest_elapsed() {
        let a = validate(GeoSample::new(0.0, 0.0, 0), None).unwrap();
        let state = AggregateState::default().accept(a).tick(120_000, 0);
        assert_eq!(state.current_pace, None);

        let b = validate(GeoSample::new(0.0, 0.01, 1), state.last_sample.as_ref()).unwrap();
        let state = state.accept(b);
        assert!(state.current_pace.is_some());
        assert_eq!(state.total_elapsed_seconds, 120);
    }

    #[test]
    fn tick_clamps_clock_going_backwards() {
        assert_eq!(elapsed_seconds(1_000, 5_000), 0);
        assert_eq!(elapsed_seconds(5_999, 1_000), 4);
    }

    #[test]
    fn pace_display() {
        assert_eq!(Pace { minutes: 5, seconds: 7 }.to_string(), "5'07\"");
        assert_eq!(Pace::derive(0, 1.0), Some(Pace { minutes: 0, seconds: 0 }));
        assert_eq!(Pace::derive(300, 0.0), None);
    }
}
