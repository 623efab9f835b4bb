use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::location::{LocationUpdate, SubscriptionId};
use crate::permission::Authorization;

/// Identifies one run of the session's duration timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Unified event type. Every producer (terminal, permission check, location
/// provider, duration timer) pushes into the same queue and the app consumes
/// one event at a time.
#[derive(Clone, Debug)]
pub enum RunEvent {
    Key(KeyEvent),
    Resize,
    /// No event arrived within the runner's tick interval.
    Tick,
    Permission {
        attempt: u64,
        outcome: Authorization,
    },
    Location {
        subscription: SubscriptionId,
        update: LocationUpdate,
    },
    Elapsed {
        timer: TimerId,
    },
}

/// Source of inbound events
pub trait RunEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<RunEvent, RecvTimeoutError>;
}

/// Event source over the app's inbound channel
pub struct ChannelEventSource {
    rx: Receiver<RunEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<RunEvent>) -> Self {
        Self { rx }
    }
}

impl RunEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RunEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Forward terminal key and resize events into the inbound queue.
pub fn spawn_terminal_events(tx: Sender<RunEvent>) {
    thread::spawn(move || loop {
        let evt = match event::read() {
            Ok(CtEvent::Key(key)) => RunEvent::Key(key),
            Ok(CtEvent::Resize(_, _)) => RunEvent::Resize,
            Ok(_) => continue,
            Err(_) => break,
        };

        if tx.send(evt).is_err() {
            break;
        }
    });
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: RunEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: RunEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> RunEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => RunEvent::Tick,
        }
    }
}

/// Periodic `Elapsed` producer owned by a recording session.
/// Cancelled explicitly or when dropped.
#[derive(Debug)]
pub struct IntervalTimer {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
}

impl IntervalTimer {
    pub fn start(id: TimerId, period: Duration, tx: Sender<RunEvent>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        thread::spawn(move || loop {
            thread::sleep(period);
            if flag.load(Ordering::Acquire) {
                break;
            }
            if tx.send(RunEvent::Elapsed { timer: id }).is_err() {
                break;
            }
        });

        Self { id, cancelled }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Wall-clock source in epoch milliseconds
pub trait Clock: Send {
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Hand-driven clock for tests and replays
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
