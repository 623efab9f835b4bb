use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

use crate::aggregate::AggregateState;
use crate::location::{LocationFilter, LocationProvider, LocationUpdate, SubscriptionId};
use crate::permission::{request_in_background, Authorization, PermissionGate};
use crate::runtime::{Clock, IntervalTimer, RunEvent, SystemClock, TimerId};
use crate::sample::ValidatedSample;
use crate::summary::WorkoutSummary;
use crate::validator::validate;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub filter: LocationFilter,
    pub timer_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filter: LocationFilter::default(),
            timer_period: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    Recording,
    Stopped,
}

/// What the presentation layer gets told after a command or event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Fresh totals after a permission grant, accepted fix or timer tick.
    Progress(AggregateState),
    PermissionDenied,
    /// Transient provider trouble; recording carries on.
    ProviderNotice(String),
    /// A command that was ignored in the current state.
    Warning(String),
    Finished(WorkoutSummary),
}

/// Owns the recording lifecycle: Idle -> AwaitingPermission -> Recording -> Stopped.
///
/// All mutation happens through `&mut self`, fed one [`RunEvent`] at a time from
/// the app's single inbound queue. Subscriptions, timers and permission
/// attempts carry ids, and anything tagged with an id that is no longer active
/// is dropped.
pub struct RecordingSession<P: LocationProvider, C: Clock = SystemClock> {
    config: SessionConfig,
    state: SessionState,
    started_at_millis: Option<i64>,
    route: Vec<ValidatedSample>,
    aggregate: AggregateState,
    summary: Option<WorkoutSummary>,

    provider: P,
    gate: Arc<dyn PermissionGate>,
    clock: C,
    tx: Sender<RunEvent>,

    attempt: u64,
    subscription: Option<SubscriptionId>,
    timer: Option<IntervalTimer>,
    next_handle: u64,
}

impl<P: LocationProvider> RecordingSession<P, SystemClock> {
    pub fn new(config: SessionConfig, provider: P, gate: Arc<dyn PermissionGate>, tx: Sender<RunEvent>) -> Self {
        Self::with_clock(config, provider, gate, SystemClock, tx)
    }
}

impl<P: LocationProvider, C: Clock> RecordingSession<P, C> {
    pub fn with_clock(
        config: SessionConfig,
        provider: P,
        gate: Arc<dyn PermissionGate>,
        clock: C,
        tx: Sender<RunEvent>,
    ) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            started_at_millis: None,
            route: Vec::new(),
            aggregate: AggregateState::default(),
            summary: None,
            provider,
            gate,
            clock,
            tx,
            attempt: 0,
            subscription: None,
            timer: None,
            next_handle: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at_millis(&self) -> Option<i64> {
        self.started_at_millis
    }

    pub fn route(&self) -> &[ValidatedSample] {
        &self.route
    }

    pub fn aggregate(&self) -> &AggregateState {
        &self.aggregate
    }

    pub fn summary(&self) -> Option<&WorkoutSummary> {
        self.summary.as_ref()
    }

    pub fn has_active_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn has_active_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Begin a new run. Only valid from `Idle`; the permission answer arrives
    /// later as a `RunEvent::Permission`.
    pub fn start(&mut self) -> Option<SessionUpdate> {
        match self.state {
            SessionState::Idle => {
                self.route.clear();
                self.aggregate = AggregateState::default();
                self.started_at_millis = None;
                self.attempt += 1;
                self.state = SessionState::AwaitingPermission;

                log::info!("start requested, asking for location permission (attempt {})", self.attempt);
                request_in_background(self.gate.clone(), self.attempt, self.tx.clone());
                None
            }
            SessionState::Recording => {
                log::warn!("start() while already recording ignored");
                Some(SessionUpdate::Warning("already recording".into()))
            }
            SessionState::AwaitingPermission => {
                log::warn!("start() while waiting for permission ignored");
                Some(SessionUpdate::Warning("waiting for location permission".into()))
            }
            SessionState::Stopped => {
                log::warn!("start() before the summary was acknowledged ignored");
                Some(SessionUpdate::Warning(
                    "acknowledge the summary before starting a new run".into(),
                ))
            }
        }
    }

    /// Route an inbound event to its handler. Terminal events are not ours.
    pub fn handle(&mut self, event: RunEvent) -> Option<SessionUpdate> {
        match event {
            RunEvent::Permission { attempt, outcome } => self.on_permission(attempt, outcome),
            RunEvent::Location {
                subscription,
                update,
            } => self.on_location(subscription, update),
            RunEvent::Elapsed { timer } => self.on_elapsed(timer),
            RunEvent::Key(_) | RunEvent::Resize | RunEvent::Tick => None,
        }
    }

    pub fn on_permission(&mut self, attempt: u64, outcome: Authorization) -> Option<SessionUpdate> {
        if self.state != SessionState::AwaitingPermission || attempt != self.attempt {
            log::debug!("discarding stale permission answer for attempt {attempt}");
            return None;
        }

        match outcome {
            Authorization::Denied => {
                log::info!("location permission denied");
                self.state = SessionState::Idle;
                self.started_at_millis = None;
                Some(SessionUpdate::PermissionDenied)
            }
            Authorization::Authorized => {
                self.teardown();

                let id = SubscriptionId(self.next_handle());
                if let Err(e) = self.provider.subscribe(id, self.config.filter, self.tx.clone()) {
                    log::warn!("could not subscribe to location updates: {e}");
                    self.state = SessionState::Idle;
                    return Some(SessionUpdate::ProviderNotice(e.to_string()));
                }
                self.subscription = Some(id);

                self.started_at_millis = Some(self.clock.now_millis());
                let timer = TimerId(self.next_handle());
                self.timer = Some(IntervalTimer::start(timer, self.config.timer_period, self.tx.clone()));
                self.state = SessionState::Recording;

                log::info!("recording started ({id:?}, {timer:?})");
                Some(SessionUpdate::Progress(self.aggregate))
            }
        }
    }

    pub fn on_location(&mut self, subscription: SubscriptionId, update: LocationUpdate) -> Option<SessionUpdate> {
        if self.state != SessionState::Recording || self.subscription != Some(subscription) {
            log::debug!("discarding location update from inactive {subscription:?}");
            return None;
        }

        match update {
            LocationUpdate::Fix(sample) => {
                match validate(sample, self.aggregate.last_sample.as_ref()) {
                    Ok(accepted) => {
                        self.aggregate = self.aggregate.accept(accepted);
                        self.route.push(accepted);
                        Some(SessionUpdate::Progress(self.aggregate))
                    }
                    Err(rejection) => {
                        log::debug!("dropped fix {sample:?}: {rejection}");
                        None
                    }
                }
            }
            LocationUpdate::Unavailable(reason) => {
                log::warn!("location provider trouble: {reason}");
                Some(SessionUpdate::ProviderNotice(reason))
            }
        }
    }

    pub fn on_elapsed(&mut self, timer: TimerId) -> Option<SessionUpdate> {
        let active = self.timer.as_ref().map(IntervalTimer::id);
        match (self.state, active, self.started_at_millis) {
            (SessionState::Recording, Some(id), Some(started)) if id == timer => {
                self.aggregate = self.aggregate.tick(self.clock.now_millis(), started);
                Some(SessionUpdate::Progress(self.aggregate))
            }
            _ => {
                log::debug!("discarding tick from inactive {timer:?}");
                None
            }
        }
    }

    /// Finish the run. Unsubscribes and cancels the timer before returning, so
    /// nothing queued afterwards can touch the frozen summary.
    pub fn stop(&mut self) -> Option<SessionUpdate> {
        match self.state {
            SessionState::Recording => {
                self.teardown();

                let now = self.clock.now_millis();
                if let Some(started) = self.started_at_millis {
                    self.aggregate = self.aggregate.tick(now, started);
                }

                let recorded_at: DateTime<Local> =
                    Local.timestamp_millis_opt(now).single().unwrap_or_else(Local::now);
                let summary = WorkoutSummary::freeze(&self.aggregate, &self.route, recorded_at);
                self.summary = Some(summary.clone());
                self.state = SessionState::Stopped;

                log::info!(
                    "recording stopped: {:.3} km in {} s, {} fixes",
                    summary.distance_km,
                    summary.duration_seconds,
                    summary.route.len()
                );
                Some(SessionUpdate::Finished(summary))
            }
            SessionState::AwaitingPermission => {
                log::info!("start attempt {} abandoned", self.attempt);
                self.state = SessionState::Idle;
                None
            }
            SessionState::Idle | SessionState::Stopped => {
                log::debug!("stop() in {} ignored", self.state);
                None
            }
        }
    }

    /// Drop the summary and everything recorded, returning to `Idle`.
    pub fn acknowledge(&mut self) -> bool {
        if self.state != SessionState::Stopped {
            log::warn!("acknowledge() in {} ignored", self.state);
            return false;
        }

        self.summary = None;
        self.route.clear();
        self.aggregate = AggregateState::default();
        self.started_at_millis = None;
        self.state = SessionState::Idle;
        true
    }

    fn teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.provider.unsubscribe(id);
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl<P: LocationProvider, C: Clock> Drop for RecordingSession<P, C> {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.provider.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ScriptedProvider;
    use crate::permission::FixedPermissionGate;
    use crate::runtime::ManualClock;
    use crate::sample::GeoSample;
    use assert_matches::assert_matches;
    use std::sync::mpsc::{self, Receiver};

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        session: RecordingSession<ScriptedProvider, ManualClock>,
        provider: ScriptedProvider,
        clock: ManualClock,
        rx: Receiver<RunEvent>,
    }

    fn harness(gate: FixedPermissionGate) -> Harness {
        let (tx, rx) = mpsc::channel();
        let provider = ScriptedProvider::default();
        let clock = ManualClock::new(T0);
        let config = SessionConfig {
            filter: LocationFilter::unfiltered(),
            // long enough that real ticks never show up mid-test
            timer_period: Duration::from_secs(3600),
        };
        let session =
            RecordingSession::with_clock(config, provider.clone(), Arc::new(gate), clock.clone(), tx);
        Harness {
            session,
            provider,
            clock,
            rx,
        }
    }

    impl Harness {
        fn next_event(&self) -> RunEvent {
            self.rx
                .recv_timeout(Duration::from_secs(2))
                .expect("expected an event")
        }

        fn start_and_grant(&mut self) -> Option<SessionUpdate> {
            assert_eq!(self.session.start(), None);
            let ev = self.next_event();
            self.session.handle(ev)
        }

        fn fix(&mut self, lat: f64, lon: f64) -> Option<SessionUpdate> {
            let sub = self.provider.last_subscription().expect("subscribed");
            let sample = GeoSample::new(lat, lon, self.clock.now_millis());
            self.session.on_location(sub, LocationUpdate::Fix(sample))
        }
    }

    #[test]
    fn starts_idle() {
        let h = harness(FixedPermissionGate::granting());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(!h.session.has_active_subscription());
    }

    #[test]
    fn grant_moves_to_recording() {
        let mut h = harness(FixedPermissionGate::granting());
        assert_eq!(h.session.start(), None);
        assert_eq!(h.session.state(), SessionState::AwaitingPermission);
        assert_eq!(h.session.started_at_millis(), None);

        let update = h.session.handle(h.next_event());
        assert_matches!(update, Some(SessionUpdate::Progress(agg)) if agg == AggregateState::default());
        assert_eq!(h.session.state(), SessionState::Recording);
        assert_eq!(h.session.started_at_millis(), Some(T0));
        assert!(h.session.has_active_subscription());
        assert!(h.session.has_active_timer());
        assert_eq!(h.provider.subscribes(), 1);
    }

    #[test]
    fn denial_returns_to_idle() {
        let mut h = harness(FixedPermissionGate::denying());
        h.session.start();
        let update = h.session.handle(h.next_event());
        assert_eq!(update, Some(SessionUpdate::PermissionDenied));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.started_at_millis(), None);
        assert!(!h.session.has_active_subscription());
        assert_eq!(h.provider.subscribes(), 0);
    }

    #[test]
    fn fixes_are_validated_and_appended() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();

        assert_matches!(h.fix(0.0, 0.0), Some(SessionUpdate::Progress(_)));
        // duplicate and garbage are dropped silently
        assert_eq!(h.fix(0.0, 0.0), None);
        assert_eq!(h.fix(f64::NAN, 0.0), None);
        let before = *h.session.aggregate();

        h.clock.advance(Duration::from_secs(1));
        assert_matches!(h.fix(0.0, 0.01), Some(SessionUpdate::Progress(_)));
        assert_eq!(h.session.route().len(), 2);
        assert!(h.session.aggregate().cumulative_distance_km > before.cumulative_distance_km);
    }

    #[test]
    fn duplicate_leaves_aggregate_untouched() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        h.fix(1.0, 1.0);
        h.fix(1.0, 1.001);
        let before = *h.session.aggregate();
        assert_eq!(h.fix(1.0, 1.001), None);
        assert_eq!(*h.session.aggregate(), before);
        assert_eq!(h.session.route().len(), 2);
    }

    #[test]
    fn provider_outage_keeps_recording() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        let sub = h.provider.last_subscription().unwrap();
        let update = h
            .session
            .on_location(sub, LocationUpdate::Unavailable("no GPS signal".into()));
        assert_eq!(update, Some(SessionUpdate::ProviderNotice("no GPS signal".into())));
        assert_eq!(h.session.state(), SessionState::Recording);
        assert_matches!(h.fix(3.0, 3.0), Some(SessionUpdate::Progress(_)));
    }

    #[test]
    fn subscribe_failure_aborts_the_attempt() {
        let mut h = harness(FixedPermissionGate::granting());
        h.provider.fail_next_subscribe("location services off");
        h.session.start();
        let update = h.session.handle(h.next_event());
        assert_matches!(update, Some(SessionUpdate::ProviderNotice(msg)) if msg.contains("location services off"));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(!h.session.has_active_timer());
    }

    #[test]
    fn timer_tick_refreshes_elapsed_without_samples() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        h.clock.advance(Duration::from_secs(42));

        let timer = h.session.timer.as_ref().map(IntervalTimer::id).unwrap();
        let update = h.session.on_elapsed(timer);
        assert_matches!(update, Some(SessionUpdate::Progress(agg)) if agg.total_elapsed_seconds == 42 && agg.current_pace.is_none());

        // stale timer ids are ignored
        assert_eq!(h.session.on_elapsed(TimerId(999)), None);
    }

    #[test]
    fn start_while_recording_does_not_resubscribe() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        assert_eq!(
            h.session.start(),
            Some(SessionUpdate::Warning("already recording".into()))
        );
        assert_eq!(h.provider.subscribes(), 1);
        h.session.stop();
        assert_eq!(h.provider.unsubscribes(), 1);
    }

    #[test]
    fn stop_freezes_summary() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        h.fix(0.0, 0.0);
        h.clock.advance(Duration::from_secs(360));
        h.fix(0.0, 0.01);

        let update = h.session.stop();
        let summary = match update {
            Some(SessionUpdate::Finished(s)) => s,
            other => panic!("expected Finished, got {other:?}"),
        };
        assert_eq!(summary.duration_seconds, 360);
        assert_eq!(summary.pace, "5'23\"");
        assert_eq!(summary.route.len(), 2);
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert!(!h.session.has_active_subscription());
        assert!(!h.session.has_active_timer());
        assert_eq!(h.session.summary(), Some(&summary));
    }

    #[test]
    fn late_callbacks_after_stop_are_discarded() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        h.fix(0.0, 0.0);
        let sub = h.provider.last_subscription().unwrap();
        h.session.stop();
        let frozen = h.session.summary().cloned();

        h.clock.advance(Duration::from_secs(30));
        let late = LocationUpdate::Fix(GeoSample::new(0.0, 0.5, h.clock.now_millis()));
        assert_eq!(h.session.on_location(sub, late), None);
        assert_eq!(h.session.on_elapsed(TimerId(2)), None);
        assert_eq!(h.session.summary().cloned(), frozen);
        assert_eq!(h.session.route().len(), 1);
    }

    #[test]
    fn acknowledge_then_restart_starts_clean() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        h.fix(0.0, 0.0);
        h.fix(0.0, 0.01);
        h.session.stop();

        // start is refused until acknowledged
        assert_matches!(h.session.start(), Some(SessionUpdate::Warning(_)));
        assert!(h.session.acknowledge());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.summary(), None);

        h.start_and_grant();
        assert!(h.session.route().is_empty());
        assert_eq!(*h.session.aggregate(), AggregateState::default());
        assert_eq!(h.provider.subscribes(), 2);
    }

    #[test]
    fn stop_while_awaiting_permission_abandons_attempt() {
        let mut h = harness(FixedPermissionGate::granting());
        h.session.start();
        assert_eq!(h.session.stop(), None);
        assert_eq!(h.session.state(), SessionState::Idle);

        // the answer still arrives, but belongs to an abandoned attempt
        assert_eq!(h.session.handle(h.next_event()), None);
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.provider.subscribes(), 0);
    }

    #[test]
    fn acknowledge_outside_stopped_is_ignored() {
        let mut h = harness(FixedPermissionGate::granting());
        assert!(!h.session.acknowledge());
        h.start_and_grant();
        assert!(!h.session.acknowledge());
        assert_eq!(h.session.state(), SessionState::Recording);
    }

    #[test]
    fn dropping_session_unsubscribes() {
        let mut h = harness(FixedPermissionGate::granting());
        h.start_and_grant();
        let provider = h.provider.clone();
        drop(h);
        assert_eq!(provider.unsubscribes(), 1);
        assert_eq!(provider.active(), 0);
    }
}
