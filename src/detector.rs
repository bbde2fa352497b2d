use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use crate::angles::angle_delta;
use crate::error::{Result, SolError};
use crate::oracle::PositionOracle;
use crate::search::locate_extremum;
use crate::types::{Checkpoint, CheckpointKind, Direction, LocationConfig, SolarEvent, SolarEventKind};

/// Inclusive: a location exactly on the threshold is tropical.
pub const TROPICAL_LATITUDE_THRESHOLD: f64 = 23.45;
pub const AZIMUTH_DEGREE_TOLERANCE: f64 = 0.001;
pub const REVERSAL_SEARCH_MAX_ITERATIONS: usize = 60;
/// Reversal brackets are narrowed at least this far, however flat the turn.
pub const REVERSAL_TIME_TOLERANCE_MS: i64 = 1_000;

const DERIVATIVE_STEP_MS: i64 = 50;
const NOON_SAMPLE_MINUTES: i64 = 10;
const NOON_SCAN_MINUTES: i64 = 10;
const NOON_SEARCH_HOURS: i64 = 26;

pub fn is_tropical(latitude: f64) -> bool {
    latitude.abs() <= TROPICAL_LATITUDE_THRESHOLD
}

/// Azimuth direction outside the tropics, where it never reverses.
///
/// Observers north of the sun see it sweep east → south → west (increasing);
/// observers south of it see east → north → west (decreasing).
pub fn monotonic_direction(cfg: &LocationConfig, declination: f64) -> Direction {
    if cfg.latitude > declination {
        Direction::Increasing
    } else {
        Direction::Decreasing
    }
}

/// Direction from the finite difference of azimuth across `[t - half, t + half]`.
pub fn sampled_direction(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    t: DateTime<Utc>,
    half_window: Duration,
) -> Result<Direction> {
    let before = oracle.position_at(t - half_window, cfg)?.azimuth;
    let after = oracle.position_at(t + half_window, cfg)?.azimuth;
    Ok(Direction::from_delta(angle_delta(before, after)))
}

/// Instantaneous direction of azimuth travel at `t`.
pub fn derivative_sign(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    t: DateTime<Utc>,
) -> Result<Direction> {
    let now = oracle.position_at(t, cfg)?.azimuth;
    let later = oracle.position_at(t + Duration::milliseconds(DERIVATIVE_STEP_MS), cfg)?.azimuth;
    Ok(Direction::from_delta(angle_delta(now, later)))
}

/// First upper transit (elevation maximum) strictly after `after`.
pub fn next_solar_noon(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    next_transit(oracle, cfg, after, true)
}

/// First lower transit (elevation minimum) strictly after `after`.
pub fn next_solar_midnight(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    next_transit(oracle, cfg, after, false)
}

/// Whichever transit comes first after `after`, with the elevation there.
pub fn next_solar_event(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    after: DateTime<Utc>,
) -> Result<SolarEvent> {
    let noon = next_solar_noon(oracle, cfg, after)?;
    let midnight = next_solar_midnight(oracle, cfg, after)?;
    let (kind, time) = if noon <= midnight {
        (SolarEventKind::Noon, noon)
    } else {
        (SolarEventKind::Midnight, midnight)
    };
    Ok(SolarEvent {
        kind,
        time,
        elevation: oracle.position_at(time, cfg)?.elevation,
    })
}

fn next_transit(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    after: DateTime<Utc>,
    upper: bool,
) -> Result<DateTime<Utc>> {
    let elevation = |t: DateTime<Utc>| -> Result<f64> { Ok(oracle.position_at(t, cfg)?.elevation) };
    let toward = |e: f64, previous: f64| if upper { e > previous } else { e < previous };
    let step = Duration::minutes(NOON_SCAN_MINUTES);
    let deadline = after + Duration::hours(NOON_SEARCH_HOURS);

    let mut t_before = after;
    let mut t_prev = after;
    let mut e_prev = elevation(after)?;
    let mut approaching = false;

    while t_prev < deadline {
        let t = t_prev + step;
        let e = elevation(t)?;
        if toward(e, e_prev) {
            approaching = true;
        } else if approaching {
            let (transit, _) = locate_extremum(
                &elevation,
                t_before,
                t,
                upper,
                false,
                Duration::milliseconds(250),
            )?;
            if transit > after {
                return Ok(transit);
            }
            approaching = false;
        }
        t_before = t_prev;
        t_prev = t;
        e_prev = e;
    }

    Err(SolError::oracle(format!(
        "no solar transit within {NOON_SEARCH_HOURS} h of {after}"
    )))
}

/// Most recent upper transit at or before `t`.
pub fn solar_noon_at_or_before(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    t: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let mut noon = next_solar_noon(oracle, cfg, t - Duration::hours(NOON_SEARCH_HOURS))?;
    loop {
        let next = next_solar_noon(oracle, cfg, noon + Duration::hours(1))?;
        if next > t {
            return Ok(noon);
        }
        noon = next;
    }
}

/// Solar-noon checkpoint carrying the direction sampled around the transit.
pub fn noon_checkpoint(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    noon: DateTime<Utc>,
) -> Result<Checkpoint> {
    let direction = sampled_direction(oracle, cfg, noon, Duration::minutes(NOON_SAMPLE_MINUTES))?;
    Ok(Checkpoint {
        timestamp: noon,
        kind: CheckpointKind::SolarNoon,
        direction_after: direction,
        azimuth: oracle.position_at(noon, cfg)?.azimuth,
    })
}

pub struct ReversalDetector<'a> {
    oracle: &'a dyn PositionOracle,
    cfg: &'a LocationConfig,
    scan_interval: Duration,
}

impl<'a> ReversalDetector<'a> {
    pub fn new(oracle: &'a dyn PositionOracle, cfg: &'a LocationConfig) -> Self {
        Self {
            oracle,
            cfg,
            scan_interval: Duration::minutes(5),
        }
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    fn azimuth(&self, t: DateTime<Utc>) -> Result<f64> {
        Ok(self.oracle.position_at(t, self.cfg)?.azimuth)
    }

    /// All reversals in `(start, end]`, given the direction of travel at `start`.
    #[instrument(skip(self), fields(latitude = self.cfg.latitude))]
    pub fn find_reversals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        start_direction: Direction,
    ) -> Result<Vec<Checkpoint>> {
        let mut found = Vec::new();
        let mut current = start_direction;
        let mut t_before = start;
        let mut t_prev = start;
        let mut az_prev = self.azimuth(start)?;

        while t_prev < end {
            let t = (t_prev + self.scan_interval).min(end);
            let az = self.azimuth(t)?;
            let delta = angle_delta(az_prev, az);

            if delta != 0.0 && Direction::from_delta(delta) != current {
                let timestamp = self.bisect_reversal(t_before, t, current)?;
                current = current.reversed();
                if timestamp > start {
                    found.push(Checkpoint {
                        timestamp,
                        kind: CheckpointKind::Reversal,
                        direction_after: current,
                        azimuth: self.azimuth(timestamp)?,
                    });
                }
            }

            t_before = t_prev;
            t_prev = t;
            az_prev = az;
        }

        debug!(count = found.len(), %start, %end, "reversal scan finished");
        Ok(found)
    }

    /// Narrows a bracket whose left edge moves `before` and right edge moves
    /// the other way. Stops once the bracket is no wider than
    /// [`REVERSAL_TIME_TOLERANCE_MS`] and the azimuth varies by at most
    /// [`AZIMUTH_DEGREE_TOLERANCE`] across it.
    fn bisect_reversal(
        &self,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
        before: Direction,
    ) -> Result<DateTime<Utc>> {
        let time_tolerance = Duration::milliseconds(REVERSAL_TIME_TOLERANCE_MS);
        for _ in 0..REVERSAL_SEARCH_MAX_ITERATIONS {
            if hi - lo <= Duration::milliseconds(1) {
                break;
            }
            if hi - lo <= time_tolerance {
                let variation = angle_delta(self.azimuth(lo)?, self.azimuth(hi)?).abs();
                if variation <= AZIMUTH_DEGREE_TOLERANCE {
                    break;
                }
            }
            let mid = lo + (hi - lo) / 2;
            if derivative_sign(self.oracle, self.cfg, mid)? == before {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(lo + (hi - lo) / 2)
    }
}
