// Library surface for the recording core; the terminal front end lives in main.rs.
pub mod aggregate;
pub mod app_dirs;
pub mod config;
pub mod location;
pub mod permission;
pub mod runtime;
pub mod sample;
pub mod session;
pub mod summary;
pub mod util;
pub mod validator;

pub use aggregate::{AggregateState, Pace};
pub use sample::{Coordinate, GeoSample, ValidatedSample};
pub use session::{RecordingSession, SessionConfig, SessionState, SessionUpdate};
pub use summary::WorkoutSummary;
