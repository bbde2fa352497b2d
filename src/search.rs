//! Threshold crossing search.

use chrono::{DateTime, Duration, Utc};

use crate::angles::{angle_delta, normalize_angle};
use crate::error::{Result, SolError};
use crate::types::{Direction, SignalKind};

const GRID_EPSILON: f64 = 1e-9;
const MAX_REFINE_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub scan_step: Duration,
    pub lookahead: Duration,
    pub tolerance: Duration,
}

impl SearchParams {
    pub fn for_signal(kind: SignalKind) -> Self {
        match kind {
            SignalKind::Elevation | SignalKind::Azimuth => Self::default(),
            SignalKind::SeasonalCurve => Self {
                scan_step: Duration::hours(6),
                lookahead: Duration::days(200),
                tolerance: Duration::milliseconds(250),
            },
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            scan_step: Duration::minutes(10),
            lookahead: Duration::hours(36),
            tolerance: Duration::milliseconds(250),
        }
    }
}

/// Outcome of a step search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crossing {
    /// The signal reaches `value` at `time`.
    Target { time: DateTime<Utc>, value: f64 },
    /// The signal turns at `time` before reaching the step; re-arm from here
    /// in the opposite direction.
    Extremum { time: DateTime<Utc>, value: f64 },
}

impl Crossing {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Crossing::Target { time, .. } | Crossing::Extremum { time, .. } => *time,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Crossing::Target { value, .. } | Crossing::Extremum { value, .. } => *value,
        }
    }

    pub fn is_extremum(&self) -> bool {
        matches!(self, Crossing::Extremum { .. })
    }
}

/// Next grid boundary strictly beyond `v0` in `direction`.
pub fn next_step_target(v0: f64, step: f64, direction: Direction) -> f64 {
    let ratio = v0 / step;
    let k = match direction {
        Direction::Increasing => (ratio + GRID_EPSILON).floor() + 1.0,
        Direction::Decreasing => (ratio - GRID_EPSILON).ceil() - 1.0,
    };
    ((k * step) * 1e9).round() / 1e9
}

/// Tracks a continuous version of a possibly circular signal.
struct Unwrapper {
    circular: bool,
    last_raw: f64,
    last: f64,
}

impl Unwrapper {
    fn new(circular: bool, raw: f64, unwrapped: f64) -> Self {
        Self {
            circular,
            last_raw: raw,
            last: unwrapped,
        }
    }

    fn push(&mut self, raw: f64) -> f64 {
        self.last = self.peek(raw);
        self.last_raw = raw;
        self.last
    }

    /// Unwrapped value of `raw` relative to the last pushed sample.
    fn peek(&self, raw: f64) -> f64 {
        if self.circular {
            self.last + angle_delta(self.last_raw, raw)
        } else {
            raw
        }
    }
}

fn output_value(unwrapped: f64, circular: bool) -> f64 {
    if circular {
        normalize_angle(unwrapped)
    } else {
        unwrapped
    }
}

/// Finds the earliest time after `t0` at which the signal reaches the next
/// step boundary beyond `v0` in `direction`.
///
/// `sample` must be a pure function of time. `v0` is the signal's value at
/// `t0`.
pub fn find_next_crossing<F>(
    sample: F,
    t0: DateTime<Utc>,
    v0: f64,
    step: f64,
    direction: Direction,
    circular: bool,
    params: &SearchParams,
) -> Result<Crossing>
where
    F: Fn(DateTime<Utc>) -> Result<f64>,
{
    let sign = direction.sign();
    let target = next_step_target(v0, step, direction);
    let reached = |u: f64| (u - target) * sign >= 0.0;
    let deadline = t0 + params.lookahead;

    let mut scan = Unwrapper::new(circular, v0, v0);
    let mut before_prev = t0;
    let mut prev_t = t0;
    let mut prev_u = v0;

    while prev_t < deadline {
        let t = (prev_t + params.scan_step).min(deadline);
        let u = scan.push(sample(t)?);

        if reached(u) {
            let time = refine_crossing(&sample, prev_t, prev_u, t, &reached, circular, params.tolerance)?;
            return Ok(Crossing::Target {
                time,
                value: output_value(target, circular),
            });
        }

        if (u - prev_u) * sign < 0.0 {
            let maximize = direction == Direction::Increasing;
            let (ext_t, ext_raw) =
                locate_extremum(&sample, before_prev, t, maximize, circular, params.tolerance)?;
            let origin = Unwrapper::new(circular, prev_u, prev_u);
            let ext_u = origin.peek(ext_raw);
            if reached(ext_u) {
                // overshot and came back between two samples
                let time = refine_crossing(
                    &sample,
                    before_prev,
                    v_at(&sample, before_prev, &origin)?,
                    ext_t,
                    &reached,
                    circular,
                    params.tolerance,
                )?;
                return Ok(Crossing::Target {
                    time: time.max(t0 + params.tolerance),
                    value: output_value(target, circular),
                });
            }
            return Ok(Crossing::Extremum {
                time: ext_t.max(t0 + params.tolerance),
                value: output_value(ext_u, circular),
            });
        }

        before_prev = prev_t;
        prev_t = t;
        prev_u = u;
    }

    Err(SolError::NoCrossingFound {
        target,
        lookahead_hours: params.lookahead.num_hours(),
    })
}

fn v_at<F>(sample: &F, t: DateTime<Utc>, origin: &Unwrapper) -> Result<f64>
where
    F: Fn(DateTime<Utc>) -> Result<f64>,
{
    Ok(origin.peek(sample(t)?))
}

/// Narrows `[lo, hi]`, where the signal has not reached the target at `lo`
/// and has at `hi`, to the tolerance. Returns the first time known to be at
/// or past the target.
fn refine_crossing<F, R>(
    sample: &F,
    mut lo: DateTime<Utc>,
    lo_u: f64,
    mut hi: DateTime<Utc>,
    reached: &R,
    circular: bool,
    tolerance: Duration,
) -> Result<DateTime<Utc>>
where
    F: Fn(DateTime<Utc>) -> Result<f64>,
    R: Fn(f64) -> bool,
{
    let mut base = Unwrapper::new(circular, output_value(lo_u, circular), lo_u);
    let mut iterations = 0;

    while hi - lo > tolerance && iterations < MAX_REFINE_ITERATIONS {
        iterations += 1;
        let third = (hi - lo) / 3;
        let m1 = lo + third;
        let m2 = hi - third;

        let raw1 = sample(m1)?;
        let u1 = base.peek(raw1);
        if reached(u1) {
            hi = m1;
            continue;
        }
        let raw2 = sample(m2)?;
        if reached(base.peek(raw2)) {
            lo = m1;
            hi = m2;
            base.push(raw1);
        } else {
            lo = m2;
            base.push(raw2);
        }
    }

    Ok(hi)
}

/// Ternary search for the extremum of a unimodal signal inside `[lo, hi]`.
///
/// Returns the time of the extremum and the raw sample there.
pub fn locate_extremum<F>(
    sample: &F,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    maximize: bool,
    circular: bool,
    tolerance: Duration,
) -> Result<(DateTime<Utc>, f64)>
where
    F: Fn(DateTime<Utc>) -> Result<f64>,
{
    let reference_raw = sample(lo)?;
    let reference = Unwrapper::new(circular, reference_raw, reference_raw);
    let score = |raw: f64| {
        let u = reference.peek(raw);
        if maximize {
            u
        } else {
            -u
        }
    };
    let mut iterations = 0;

    while hi - lo > tolerance && iterations < MAX_REFINE_ITERATIONS {
        iterations += 1;
        let third = (hi - lo) / 3;
        let m1 = lo + third;
        let m2 = hi - third;
        if score(sample(m1)?) < score(sample(m2)?) {
            lo = m1;
        } else {
            hi = m2;
        }
    }

    let mid = lo + (hi - lo) / 2;
    Ok((mid, sample(mid)?))
}
