use serde::{Deserialize, Serialize};

/// One position reported by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoSample {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at_millis: i64,
}

impl GeoSample {
    pub fn new(latitude: f64, longitude: f64, captured_at_millis: i64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at_millis,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A sample that made it through validation. Only the validator can build one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedSample(GeoSample);

impl ValidatedSample {
    pub(crate) fn new(sample: GeoSample) -> Self {
        Self(sample)
    }

    pub fn latitude(&self) -> f64 {
        self.0.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.0.longitude
    }

    pub fn captured_at_millis(&self) -> i64 {
        self.0.captured_at_millis
    }

    pub fn coordinate(&self) -> Coordinate {
        self.0.coordinate()
    }

    pub fn into_inner(self) -> GeoSample {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from(v: (f64, f64)) -> Self {
        Coordinate {
            latitude: v.0,
            longitude: v.1,
        }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(c: Coordinate) -> Self {
        (c.latitude, c.longitude)
    }
}

impl From<&ValidatedSample> for Coordinate {
    fn from(s: &ValidatedSample) -> Self {
        s.coordinate()
    }
}
