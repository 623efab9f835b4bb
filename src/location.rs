//! Location-stream capability consumed by the recording session.
//!
//! Two delivery modes share one contract: [`ReplayProvider`] pushes fixes as
//! they "happen" (watch mode) and [`PollingProvider`] asks a [`PositionSource`]
//! on a fixed interval. Both tag every update with the subscription id so the
//! session can drop anything that outlives its subscription.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::runtime::{now_millis, RunEvent};
use crate::sample::{Coordinate, GeoSample};
use crate::util::{destination, haversine_km};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read track {path}: {source}")]
    Track {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("track {0} contains no fixes")]
    EmptyTrack(PathBuf),
    #[error("subscription {0:?} is already active")]
    AlreadySubscribed(SubscriptionId),
}

/// What a provider delivers for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationUpdate {
    Fix(GeoSample),
    /// Transient loss of position (GPS blackout, no signal).
    Unavailable(String),
}

/// Minimum spacing between delivered fixes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFilter {
    pub min_distance_m: f64,
    pub min_interval: Duration,
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self {
            min_distance_m: 2.0,
            min_interval: Duration::from_secs(1),
        }
    }
}

impl LocationFilter {
    pub fn unfiltered() -> Self {
        Self {
            min_distance_m: 0.0,
            min_interval: Duration::ZERO,
        }
    }
}

/// Applies a [`LocationFilter`] against the last fix that was let through.
#[derive(Debug, Clone)]
pub struct FixFilter {
    filter: LocationFilter,
    last: Option<GeoSample>,
}

impl FixFilter {
    pub fn new(filter: LocationFilter) -> Self {
        Self { filter, last: None }
    }

    pub fn admit(&mut self, fix: &GeoSample) -> bool {
        if let Some(last) = self.last {
            let interval_ms = fix.captured_at_millis - last.captured_at_millis;
            if interval_ms < self.filter.min_interval.as_millis() as i64 {
                return false;
            }
            let meters = haversine_km(last.coordinate(), fix.coordinate()) * 1000.0;
            // non-finite fixes are left for the validator to reject
            if meters.is_finite() && meters < self.filter.min_distance_m {
                return false;
            }
        }
        self.last = Some(*fix);
        true
    }
}

/// Subscribe/unsubscribe interface to a stream of positions.
pub trait LocationProvider: Send {
    /// Start delivering `RunEvent::Location` events tagged with `id` into `tx`.
    fn subscribe(
        &mut self,
        id: SubscriptionId,
        filter: LocationFilter,
        tx: Sender<RunEvent>,
    ) -> Result<(), ProviderError>;

    /// Stop delivery for `id`. Must not block on the delivery thread.
    fn unsubscribe(&mut self, id: SubscriptionId);
}

impl<P: LocationProvider + ?Sized> LocationProvider for Box<P> {
    fn subscribe(
        &mut self,
        id: SubscriptionId,
        filter: LocationFilter,
        tx: Sender<RunEvent>,
    ) -> Result<(), ProviderError> {
        (**self).subscribe(id, filter, tx)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }
}

/// Cancel flags of running delivery threads.
#[derive(Debug, Default)]
struct Workers {
    running: HashMap<SubscriptionId, Arc<AtomicBool>>,
}

impl Workers {
    fn register(&mut self, id: SubscriptionId) -> Result<Arc<AtomicBool>, ProviderError> {
        if self.running.contains_key(&id) {
            return Err(ProviderError::AlreadySubscribed(id));
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.running.insert(id, flag.clone());
        Ok(flag)
    }

    fn cancel(&mut self, id: SubscriptionId) {
        if let Some(flag) = self.running.remove(&id) {
            flag.store(true, Ordering::Release);
        }
    }

    fn cancel_all(&mut self) {
        for (_, flag) in self.running.drain() {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Load a recorded track from CSV with a `latitude,longitude,captured_at_millis` header.
pub fn load_track<P: AsRef<Path>>(path: P) -> Result<Vec<GeoSample>, ProviderError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| ProviderError::Track {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    read_track(file, path)
}

/// Same as [`load_track`] for an already open reader; `origin` only names it in errors.
pub fn read_track<R: Read>(rdr: R, origin: &Path) -> Result<Vec<GeoSample>, ProviderError> {
    let fixes = csv::Reader::from_reader(rdr)
        .deserialize::<GeoSample>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ProviderError::Track {
            path: origin.to_path_buf(),
            source,
        })?;

    if fixes.is_empty() {
        return Err(ProviderError::EmptyTrack(origin.to_path_buf()));
    }
    Ok(fixes)
}

/// Watch-mode provider that replays a recorded track in (scaled) real time.
/// Delivered fixes are re-stamped with the wall clock.
#[derive(Debug)]
pub struct ReplayProvider {
    track: Arc<Vec<GeoSample>>,
    speed: f64,
    workers: Workers,
}

impl ReplayProvider {
    pub fn new(track: Vec<GeoSample>, speed: f64) -> Self {
        Self {
            track: Arc::new(track),
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
            workers: Workers::default(),
        }
    }

    pub fn from_csv<P: AsRef<Path>>(path: P, speed: f64) -> Result<Self, ProviderError> {
        Ok(Self::new(load_track(path)?, speed))
    }
}

impl LocationProvider for ReplayProvider {
    fn subscribe(
        &mut self,
        id: SubscriptionId,
        filter: LocationFilter,
        tx: Sender<RunEvent>,
    ) -> Result<(), ProviderError> {
        let cancelled = self.workers.register(id)?;
        let track = self.track.clone();
        let speed = self.speed;

        thread::spawn(move || {
            let mut fix_filter = FixFilter::new(filter);
            let mut previous_capture: Option<i64> = None;

            for recorded in track.iter() {
                if let Some(prev) = previous_capture {
                    let gap_ms = (recorded.captured_at_millis - prev).max(0) as f64 / speed;
                    thread::sleep(Duration::from_millis(gap_ms as u64));
                }
                previous_capture = Some(recorded.captured_at_millis);

                if cancelled.load(Ordering::Acquire) {
                    return;
                }

                let fix = GeoSample::new(recorded.latitude, recorded.longitude, now_millis());
                if !fix_filter.admit(&fix) {
                    continue;
                }

                let event = RunEvent::Location {
                    subscription: id,
                    update: LocationUpdate::Fix(fix),
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            log::info!("replay for {id:?} reached end of track");
        });

        Ok(())
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.workers.cancel(id);
    }
}

impl Drop for ReplayProvider {
    fn drop(&mut self) {
        self.workers.cancel_all();
    }
}

/// Something that can be asked "where are we now?".
pub trait PositionSource: Send + 'static {
    fn current_position(&mut self, now_millis: i64) -> Result<GeoSample, ProviderError>;
}

/// Poll-mode provider: asks its source on a fixed interval.
pub struct PollingProvider<S> {
    source: Arc<Mutex<S>>,
    interval: Duration,
    workers: Workers,
}

impl<S: PositionSource> PollingProvider<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            interval,
            workers: Workers::default(),
        }
    }
}

impl<S: PositionSource> LocationProvider for PollingProvider<S> {
    fn subscribe(
        &mut self,
        id: SubscriptionId,
        filter: LocationFilter,
        tx: Sender<RunEvent>,
    ) -> Result<(), ProviderError> {
        let cancelled = self.workers.register(id)?;
        let source = self.source.clone();
        let interval = self.interval;

        thread::spawn(move || {
            let mut fix_filter = FixFilter::new(filter);

            while !cancelled.load(Ordering::Acquire) {
                let polled = match source.lock() {
                    Ok(mut source) => source.current_position(now_millis()),
                    Err(_) => Err(ProviderError::Unavailable("position source poisoned".into())),
                };

                let update = match polled {
                    Ok(fix) if fix_filter.admit(&fix) => Some(LocationUpdate::Fix(fix)),
                    Ok(_) => None,
                    Err(e) => Some(LocationUpdate::Unavailable(e.to_string())),
                };

                if let Some(update) = update {
                    if cancelled.load(Ordering::Acquire) {
                        break;
                    }
                    let event = RunEvent::Location {
                        subscription: id,
                        update,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }

                thread::sleep(interval);
            }
        });

        Ok(())
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.workers.cancel(id);
    }
}

impl<S> Drop for PollingProvider<S> {
    fn drop(&mut self) {
        self.workers.cancel_all();
    }
}

/// Simulated runner moving at constant speed and bearing, with GPS-like jitter
/// and optional periodic signal loss.
#[derive(Debug)]
pub struct SimulatedRunner {
    position: Coordinate,
    speed_mps: f64,
    bearing_deg: f64,
    jitter_m: f64,
    blackout_every: Option<u32>,
    polls: u32,
    last_poll_millis: Option<i64>,
    rng: StdRng,
}

impl SimulatedRunner {
    pub fn new(start: Coordinate, speed_mps: f64, bearing_deg: f64) -> Self {
        Self {
            position: start,
            speed_mps,
            bearing_deg,
            jitter_m: 0.0,
            blackout_every: None,
            polls: 0,
            last_poll_millis: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_jitter(mut self, jitter_m: f64, seed: u64) -> Self {
        self.jitter_m = jitter_m.max(0.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Report the position as unavailable on every `n`th poll.
    pub fn with_blackout_every(mut self, n: u32) -> Self {
        self.blackout_every = (n > 0).then_some(n);
        self
    }
}

impl PositionSource for SimulatedRunner {
    fn current_position(&mut self, now_millis: i64) -> Result<GeoSample, ProviderError> {
        if let Some(last) = self.last_poll_millis {
            let secs = (now_millis - last).max(0) as f64 / 1000.0;
            self.position = destination(self.position, self.bearing_deg, self.speed_mps * secs / 1000.0);
        }
        self.last_poll_millis = Some(now_millis);
        self.polls += 1;

        if let Some(n) = self.blackout_every {
            if self.polls % n == 0 {
                return Err(ProviderError::Unavailable("no GPS signal".into()));
            }
        }

        let reported = if self.jitter_m > 0.0 {
            let offset_m = self.rng.gen_range(0.0..=self.jitter_m);
            let bearing = self.rng.gen_range(0.0..360.0);
            destination(self.position, bearing, offset_m / 1000.0)
        } else {
            self.position
        };

        Ok(GeoSample::new(reported.latitude, reported.longitude, now_millis))
    }
}

/// Test provider: records calls and lets the caller deliver updates by hand.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    shared: Arc<Mutex<Scripted>>,
}

#[derive(Default)]
struct Scripted {
    subscribes: usize,
    unsubscribes: usize,
    active: Vec<SubscriptionId>,
    last: Option<(SubscriptionId, Sender<RunEvent>)>,
    fail_next: Option<String>,
}

impl ScriptedProvider {
    fn with<R>(&self, f: impl FnOnce(&mut Scripted) -> R) -> R {
        let mut guard = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn subscribes(&self) -> usize {
        self.with(|s| s.subscribes)
    }

    pub fn unsubscribes(&self) -> usize {
        self.with(|s| s.unsubscribes)
    }

    /// Subscriptions not yet unsubscribed.
    pub fn active(&self) -> usize {
        self.with(|s| s.active.len())
    }

    pub fn last_subscription(&self) -> Option<SubscriptionId> {
        self.with(|s| s.last.as_ref().map(|(id, _)| *id))
    }

    pub fn fail_next_subscribe(&self, reason: &str) {
        self.with(|s| s.fail_next = Some(reason.to_string()));
    }

    /// Deliver an update on the most recent subscription, even if it has since
    /// been cancelled (a callback that was already in flight).
    pub fn push(&self, update: LocationUpdate) -> bool {
        self.with(|s| match &s.last {
            Some((id, tx)) => tx
                .send(RunEvent::Location {
                    subscription: *id,
                    update,
                })
                .is_ok(),
            None => false,
        })
    }
}

impl LocationProvider for ScriptedProvider {
    fn subscribe(
        &mut self,
        id: SubscriptionId,
        _filter: LocationFilter,
        tx: Sender<RunEvent>,
    ) -> Result<(), ProviderError> {
        self.with(|s| {
            if let Some(reason) = s.fail_next.take() {
                return Err(ProviderError::Unavailable(reason));
            }
            if s.active.contains(&id) {
                return Err(ProviderError::AlreadySubscribed(id));
            }
            s.subscribes += 1;
            s.active.push(id);
            s.last = Some((id, tx));
            Ok(())
        })
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.with(|s| {
            s.unsubscribes += 1;
            s.active.retain(|a| *a != id);
        });
    }
}
