//! Sensor update scheduling. Every re-arm or cancel bumps a signal's
//! generation, so a wake-up issued before it is ignored.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cache::ReversalCache;
use crate::config::TrackerConfig;
use crate::detector::{monotonic_direction, next_solar_event};
use crate::error::Result;
use crate::oracle::PositionOracle;
use crate::revalidation::RevalidationScheduler;
use crate::search::{find_next_crossing, Crossing, SearchParams};
use crate::seasons::solstices_around;
use crate::store::{reversal_cache_key, KeyValueStore};
use crate::types::{
    Direction, SignalKind, SignalSnapshot, SignalState, SolarEvent, SolsticeWindow, TimerPhase,
};

/// Delay before the first retry of a failed signal; doubled on each further failure.
pub const RETRY_DELAY_MINUTES: i64 = 5;
/// Retries before a failing signal is parked until the next revalidation.
pub const MAX_RETRIES: u32 = 3;

/// A search extremum this close before a cached reversal is that reversal.
const REVERSAL_SNAP_MINUTES: i64 = 1;
const ELEVATION_LOOKAHEAD_SECONDS: i64 = 60;

pub type SharedOracle = Arc<dyn PositionOracle + Send + Sync>;

/// Minutes until the retry after the `failures`-th consecutive failure.
pub fn retry_delay_minutes(failures: u32) -> i64 {
    RETRY_DELAY_MINUTES << failures.saturating_sub(1).min(MAX_RETRIES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeEvent {
    Signal { kind: SignalKind, generation: u64 },
    Revalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeUp {
    pub at: DateTime<Utc>,
    pub event: WakeEvent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Crossing { value: f64, extremum: bool },
    Retry,
}

/// Result of a successful search for one signal.
#[derive(Debug, Clone, Copy)]
struct Plan {
    sampled: f64,
    crossing: Crossing,
    direction: Direction,
    reversal_time: Option<DateTime<Utc>>,
    solar_event: Option<SolarEvent>,
    solstices: Option<SolsticeWindow>,
}

/// What a signal carries from its previous arming into the next plan.
#[derive(Debug, Clone, Copy, Default)]
struct Hints {
    turned: Option<Direction>,
    solar_event: Option<SolarEvent>,
    solstices: Option<SolsticeWindow>,
}

/// Timer and last published state of one signal.
#[derive(Debug, Clone)]
pub struct SignalScheduler {
    kind: SignalKind,
    phase: TimerPhase,
    generation: u64,
    wake_at: Option<DateTime<Utc>>,
    pending: Option<Pending>,
    state: Option<SignalState>,
    /// Direction to resume with after an extremum fired.
    turned: Option<Direction>,
    failures: u32,
}

impl SignalScheduler {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            phase: TimerPhase::Idle,
            generation: 0,
            wake_at: None,
            pending: None,
            state: None,
            turned: None,
            failures: 0,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn wake_at(&self) -> Option<DateTime<Utc>> {
        self.wake_at
    }

    pub fn state(&self) -> Option<&SignalState> {
        self.state.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.available)
    }

    /// Consecutive failed arming attempts.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Gave up retrying; only revalidation or reconfiguration arms it again.
    pub fn is_parked(&self) -> bool {
        self.failures > MAX_RETRIES && self.phase == TimerPhase::Idle
    }

    /// Drops the pending wake-up; any wake-up already issued becomes stale.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.phase = TimerPhase::Idle;
        self.wake_at = None;
        self.pending = None;
    }

    fn wake_up(&self) -> Option<WakeUp> {
        let at = self.wake_at?;
        (self.phase == TimerPhase::Armed).then_some(WakeUp {
            at,
            event: WakeEvent::Signal {
                kind: self.kind,
                generation: self.generation,
            },
        })
    }

    fn hints(&mut self) -> Hints {
        Hints {
            turned: self.turned.take(),
            solar_event: self.state.as_ref().and_then(|s| s.solar_event),
            solstices: self.state.as_ref().and_then(|s| s.solstices),
        }
    }

    fn arm(&mut self, plan: Plan, step: f64, now: DateTime<Utc>, keep_value: bool) {
        let current_value = match &self.state {
            Some(s) if keep_value && s.available => s.current_value,
            _ => plan.sampled,
        };
        self.state = Some(SignalState {
            current_value,
            step_size: step,
            last_update: now,
            next_target: plan.crossing.value(),
            next_update: plan.crossing.time(),
            direction: plan.direction,
            reversal_time: plan.reversal_time,
            solar_event: plan.solar_event,
            solstices: plan.solstices,
            available: true,
        });
        self.failures = 0;
        self.pending = Some(Pending::Crossing {
            value: plan.crossing.value(),
            extremum: plan.crossing.is_extremum(),
        });
        self.wake_at = Some(plan.crossing.time());
        self.phase = TimerPhase::Armed;
    }

    /// Marks the signal unavailable and schedules a retry with backoff.
    /// Returns the retry time, or `None` once the signal is parked.
    fn fail(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(state) = self.state.as_mut() {
            state.available = false;
            state.last_update = now;
        }
        self.turned = None;
        self.failures = self.failures.saturating_add(1);
        if self.failures > MAX_RETRIES {
            self.phase = TimerPhase::Idle;
            self.pending = None;
            self.wake_at = None;
            return None;
        }
        let at = now + Duration::minutes(retry_delay_minutes(self.failures));
        self.pending = Some(Pending::Retry);
        self.wake_at = Some(at);
        self.phase = TimerPhase::Armed;
        Some(at)
    }

    fn take_due(&mut self, generation: u64) -> Option<Pending> {
        if self.phase != TimerPhase::Armed || generation != self.generation {
            return None;
        }
        self.phase = TimerPhase::Fired;
        self.wake_at = None;
        self.pending.take()
    }

    fn publish(&mut self, value: f64, extremum: bool, now: DateTime<Utc>) {
        if let Some(state) = self.state.as_mut() {
            state.current_value = value;
            state.last_update = now;
            if extremum {
                self.turned = Some(state.direction.reversed());
            }
        }
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        match &self.state {
            Some(s) if s.available => SignalSnapshot {
                kind: self.kind,
                current_value: Some(s.current_value),
                next_update: Some(s.next_update),
                next_target: Some(s.next_target),
                reversal_time: s.reversal_time,
                next_solar_event: s.solar_event,
                previous_solstice: s.solstices.map(|w| w.previous),
                next_solstice: s.solstices.map(|w| w.next),
                available: true,
            },
            _ => SignalSnapshot {
                kind: self.kind,
                current_value: None,
                next_update: None,
                next_target: None,
                reversal_time: None,
                next_solar_event: None,
                previous_solstice: None,
                next_solstice: None,
                available: false,
            },
        }
    }
}

/// All signals of one configured location, plus its reversal cache.
pub struct Tracker<S> {
    oracle: SharedOracle,
    config: TrackerConfig,
    cache: ReversalCache<S>,
    revalidation: RevalidationScheduler,
    signals: [SignalScheduler; 3],
}

fn slot(kind: SignalKind) -> usize {
    match kind {
        SignalKind::Elevation => 0,
        SignalKind::Azimuth => 1,
        SignalKind::SeasonalCurve => 2,
    }
}

impl<S: KeyValueStore> Tracker<S> {
    pub fn new(config: TrackerConfig, oracle: SharedOracle, store: S, instance_id: &str) -> Self {
        let cache = ReversalCache::new(
            reversal_cache_key(instance_id),
            config.location,
            config.cache_capacity,
            store,
        );
        Self {
            oracle,
            revalidation: RevalidationScheduler::new(config.time_zone),
            config,
            cache,
            signals: SignalKind::ALL.map(SignalScheduler::new),
        }
    }

    /// Loads the reversal cache and arms every signal.
    #[instrument(skip(self), fields(latitude = self.config.location.latitude))]
    pub fn start(&mut self, now: DateTime<Utc>) {
        let oracle = Arc::clone(&self.oracle);
        if let Err(err) = self.cache.load(oracle.as_ref(), now) {
            warn!(error = %err, "reversal cache unavailable at startup");
        }
        self.revalidation.schedule(self.config.location.latitude, now);
        self.arm_all(now);
        info!("tracker started");
    }

    pub fn arm_all(&mut self, now: DateTime<Utc>) {
        for kind in SignalKind::ALL {
            self.arm(kind, now, false);
        }
    }

    fn arm(&mut self, kind: SignalKind, now: DateTime<Utc>, keep_value: bool) {
        let idx = slot(kind);
        let hints = self.signals[idx].hints();
        self.signals[idx].cancel();

        let step = self.config.steps.for_kind(kind);
        match self.plan(kind, now, hints) {
            Ok(plan) => {
                debug!(
                    ?kind,
                    target = plan.crossing.value(),
                    at = %plan.crossing.time(),
                    direction = ?plan.direction,
                    "armed"
                );
                self.signals[idx].arm(plan, step, now, keep_value);
            }
            Err(err) => match self.signals[idx].fail(now) {
                Some(retry_at) => {
                    let failures = self.signals[idx].failures;
                    warn!(?kind, error = %err, failures, %retry_at, "signal unavailable");
                }
                None => warn!(?kind, error = %err, "signal unavailable until next revalidation"),
            },
        }
    }

    fn plan(&mut self, kind: SignalKind, now: DateTime<Utc>, hints: Hints) -> Result<Plan> {
        let oracle = Arc::clone(&self.oracle);
        let loc = self.config.location;
        let step = self.config.steps.for_kind(kind);
        let params = SearchParams::for_signal(kind);

        match kind {
            SignalKind::Elevation => {
                let sample = |t: DateTime<Utc>| -> Result<f64> { Ok(oracle.position_at(t, &loc)?.elevation) };
                let v0 = sample(now)?;
                let direction = match hints.turned {
                    Some(direction) => direction,
                    None => {
                        let ahead = sample(now + Duration::seconds(ELEVATION_LOOKAHEAD_SECONDS))?;
                        Direction::from_delta(ahead - v0)
                    }
                };
                let crossing = find_next_crossing(sample, now, v0, step, direction, false, &params)?;
                let solar_event = match hints.solar_event {
                    Some(event) if event.time > now => event,
                    _ => next_solar_event(oracle.as_ref(), &loc, now)?,
                };
                Ok(Plan {
                    sampled: v0,
                    crossing,
                    direction,
                    reversal_time: None,
                    solar_event: Some(solar_event),
                    solstices: None,
                })
            }
            SignalKind::Azimuth => {
                let position = oracle.position_at(now, &loc)?;
                let v0 = position.azimuth;
                let direction = if self.cache.is_active() {
                    self.cache.ensure_capacity(oracle.as_ref(), now)?;
                    let cached = self.cache.direction_at(oracle.as_ref(), now)?;
                    match hints.turned {
                        Some(turned) if turned != cached => {
                            info!(?turned, ?cached, "azimuth turned away from cached reversals, rebuilding");
                            self.cache.rebuild(oracle.as_ref(), now)?;
                            turned
                        }
                        _ => cached,
                    }
                } else {
                    hints
                        .turned
                        .unwrap_or_else(|| monotonic_direction(&loc, position.declination))
                };
                let sample = |t: DateTime<Utc>| -> Result<f64> { Ok(oracle.position_at(t, &loc)?.azimuth) };
                let mut crossing = find_next_crossing(sample, now, v0, step, direction, true, &params)?;

                let next_reversal = self.cache.next_turn(now, direction).copied();
                if let Some(reversal) = next_reversal {
                    let snap = crossing.is_extremum()
                        && reversal.timestamp - crossing.time() <= Duration::minutes(REVERSAL_SNAP_MINUTES);
                    if reversal.timestamp <= crossing.time() || snap {
                        crossing = Crossing::Extremum {
                            time: reversal.timestamp,
                            value: reversal.azimuth,
                        };
                    }
                }
                Ok(Plan {
                    sampled: v0,
                    crossing,
                    direction,
                    reversal_time: next_reversal.map(|c| c.timestamp),
                    solar_event: None,
                    solstices: None,
                })
            }
            SignalKind::SeasonalCurve => {
                let latitude = loc.latitude;
                let window = match hints.solstices {
                    Some(window) if window.previous <= now && now < window.next => window,
                    _ => solstices_around(oracle.as_ref(), &loc, now)?,
                };
                let sample = |t: DateTime<Utc>| -> Result<f64> {
                    Ok(window.normalize(oracle.position_at(t, &loc)?.declination, latitude))
                };
                let v0 = sample(now)?;
                let direction = hints.turned.unwrap_or_else(|| window.direction(latitude));
                let crossing = find_next_crossing(sample, now, v0, step, direction, false, &params)?;
                Ok(Plan {
                    sampled: v0,
                    crossing,
                    direction,
                    reversal_time: None,
                    solar_event: None,
                    solstices: Some(window),
                })
            }
        }
    }

    /// Handles a wake-up for `kind`. Returns false when the wake-up is stale.
    pub fn fire(&mut self, kind: SignalKind, generation: u64, now: DateTime<Utc>) -> bool {
        let signal = &mut self.signals[slot(kind)];
        let Some(pending) = signal.take_due(generation) else {
            debug!(?kind, generation, current = signal.generation, "ignoring stale wake-up");
            return false;
        };
        match pending {
            Pending::Crossing { value, extremum } => {
                signal.publish(value, extremum, now);
                self.arm(kind, now, true);
            }
            Pending::Retry => self.arm(kind, now, false),
        }
        true
    }

    /// Runs cache maintenance; the azimuth is re-armed when the cache was
    /// rebuilt, and parked signals get a fresh round of retries.
    pub fn revalidate(&mut self, now: DateTime<Utc>) {
        let oracle = Arc::clone(&self.oracle);
        let rebuilt = match self.revalidation.run(&mut self.cache, oracle.as_ref(), now) {
            Ok(outcome) => outcome.rebuilt,
            Err(err) => {
                warn!(error = %err, "revalidation failed");
                self.revalidation.schedule(self.config.location.latitude, now);
                false
            }
        };
        for kind in SignalKind::ALL {
            let signal = &mut self.signals[slot(kind)];
            if signal.is_parked() {
                info!(?kind, "retrying parked signal");
                signal.failures = 0;
                self.arm(kind, now, false);
            } else if rebuilt && kind == SignalKind::Azimuth {
                self.arm(kind, now, false);
            }
        }
    }

    /// Replaces the configuration: cancels every wake-up first, then
    /// rebuilds the cache if the location changed and re-arms from `now`.
    #[instrument(skip(self, config), fields(latitude = config.location.latitude))]
    pub fn reconfigure(&mut self, config: TrackerConfig, now: DateTime<Utc>) {
        let location_changed = config.location.fingerprint() != self.config.location.fingerprint();
        for signal in &mut self.signals {
            signal.cancel();
            signal.turned = None;
            signal.failures = 0;
            if location_changed {
                signal.state = None;
            }
        }
        self.revalidation.cancel();

        self.revalidation.set_time_zone(config.time_zone);
        self.cache.set_capacity(config.cache_capacity);
        self.config = config;

        if location_changed {
            let oracle = Arc::clone(&self.oracle);
            if let Err(err) = self.cache.reconfigure(self.config.location, oracle.as_ref(), now) {
                warn!(error = %err, "reversal cache rebuild failed after reconfiguration");
            }
        }
        self.revalidation.schedule(self.config.location.latitude, now);
        self.arm_all(now);
        info!(location_changed, "tracker reconfigured");
    }

    /// Earliest pending wake-up across signals and revalidation.
    pub fn next_wakeup(&self) -> Option<WakeUp> {
        let revalidation = self.revalidation.next_run().map(|at| WakeUp {
            at,
            event: WakeEvent::Revalidate,
        });
        self.signals
            .iter()
            .filter_map(SignalScheduler::wake_up)
            .chain(revalidation)
            .min_by_key(|w| w.at)
    }

    pub fn handle(&mut self, wake: WakeUp, now: DateTime<Utc>) -> bool {
        match wake.event {
            WakeEvent::Signal { kind, generation } => self.fire(kind, generation, now),
            WakeEvent::Revalidate => {
                if !self.revalidation.is_due(now) {
                    return false;
                }
                self.revalidate(now);
                true
            }
        }
    }

    pub fn snapshots(&self) -> Vec<SignalSnapshot> {
        self.signals.iter().map(SignalScheduler::snapshot).collect()
    }

    pub fn signal(&self, kind: SignalKind) -> &SignalScheduler {
        &self.signals[slot(kind)]
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ReversalCache<S> {
        &self.cache
    }

    pub fn revalidation(&self) -> &RevalidationScheduler {
        &self.revalidation
    }
}

impl<S> std::fmt::Debug for Tracker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
