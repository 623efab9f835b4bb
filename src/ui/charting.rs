use itertools::{Itertools, MinMaxResult};
use stride::Coordinate;

/// Fraction of the span added on each side so the route doesn't touch the frame
const PADDING: f64 = 0.05;

/// X (longitude) and Y (latitude) bounds for the route chart
pub fn route_bounds(route: &[Coordinate]) -> ([f64; 2], [f64; 2]) {
    let x = padded(route.iter().map(|c| c.longitude).minmax());
    let y = padded(route.iter().map(|c| c.latitude).minmax());
    (x, y)
}

fn padded(range: MinMaxResult<f64>) -> [f64; 2] {
    let (lo, hi) = match range {
        MinMaxResult::NoElements => return [0.0, 1.0],
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };

    let span = hi - lo;
    if span <= f64::EPSILON {
        // a single spot still needs a visible window (~100 m)
        return [lo - 0.001, hi + 0.001];
    }
    [lo - span * PADDING, hi + span * PADDING]
}

/// Chart data as (x, y) = (longitude, latitude)
pub fn route_points(route: &[Coordinate]) -> Vec<(f64, f64)> {
    route.iter().map(|c| (c.longitude, c.latitude)).collect()
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.4}")
    }
}
