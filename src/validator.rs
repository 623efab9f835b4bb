use thiserror::Error;

use crate::sample::{GeoSample, ValidatedSample};

/// Why a candidate fix was kept out of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("latitude or longitude is not a finite number")]
    NonFinite,
    #[error("coordinates outside of the valid latitude/longitude range")]
    OutOfRange,
    #[error("same coordinates as the previous fix")]
    Duplicate,
}

/// Gatekeeper between the raw provider stream and the distance math.
///
/// The first fix of a session (no `previous`) skips the duplicate check only;
/// non-finite and out-of-range fixes are always rejected.
pub fn validate(
    candidate: GeoSample,
    previous: Option<&ValidatedSample>,
) -> Result<ValidatedSample, Rejection> {
    if !candidate.latitude.is_finite() || !candidate.longitude.is_finite() {
        return Err(Rejection::NonFinite);
    }

    if candidate.latitude.abs() > 90.0 || candidate.longitude.abs() > 180.0 {
        return Err(Rejection::OutOfRange);
    }

    if let Some(prev) = previous {
        if prev.latitude() == candidate.latitude && prev.longitude() == candidate.longitude {
            return Err(Rejection::Duplicate);
        }
    }

    Ok(ValidatedSample::new(candidate))
}
