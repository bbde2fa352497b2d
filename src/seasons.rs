use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{Result, SolError};
use crate::oracle::PositionOracle;
use crate::search::locate_extremum;
use crate::types::{LocationConfig, SolsticeWindow};

const SCAN_DAYS: i64 = 200;
const LOOKBACK_DAYS: i64 = 190;
const SOLSTICE_TOLERANCE_SECONDS: i64 = 60;
const MAX_WINDOW_STEPS: usize = 4;

/// First declination extremum strictly after `after`, with the declination there.
pub fn next_solstice(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    after: DateTime<Utc>,
) -> Result<(DateTime<Utc>, f64)> {
    let declination = |t: DateTime<Utc>| -> Result<f64> { Ok(oracle.position_at(t, cfg)?.declination) };
    let start = after - Duration::days(1);
    let deadline = after + Duration::days(SCAN_DAYS);

    let mut t_before = start;
    let mut t_prev = start;
    let mut d_prev = declination(start)?;
    let mut rising: Option<bool> = None;

    while t_prev < deadline {
        let t = t_prev + Duration::days(1);
        let d = declination(t)?;
        let now_rising = d > d_prev;
        if d != d_prev {
            if let Some(was_rising) = rising.filter(|r| *r != now_rising) {
                let (solstice, value) = locate_extremum(
                    &declination,
                    t_before,
                    t,
                    was_rising,
                    false,
                    Duration::seconds(SOLSTICE_TOLERANCE_SECONDS),
                )?;
                if solstice > after {
                    return Ok((solstice, value));
                }
            }
            rising = Some(now_rising);
        }
        t_before = t_prev;
        t_prev = t;
        d_prev = d;
    }

    Err(SolError::oracle(format!("no solstice within {SCAN_DAYS} days of {after}")))
}

/// The solstices bracketing `t`: `previous <= t < next`.
pub fn solstices_around(
    oracle: &dyn PositionOracle,
    cfg: &LocationConfig,
    t: DateTime<Utc>,
) -> Result<SolsticeWindow> {
    let (mut previous, mut previous_declination) = next_solstice(oracle, cfg, t - Duration::days(LOOKBACK_DAYS))?;
    if previous > t {
        return Err(SolError::oracle(format!("no solstice within {LOOKBACK_DAYS} days before {t}")));
    }

    for _ in 0..MAX_WINDOW_STEPS {
        let (next, next_declination) = next_solstice(oracle, cfg, previous)?;
        if next > t {
            debug!(%previous, %next, "solstice window");
            return Ok(SolsticeWindow {
                previous,
                next,
                previous_declination,
                next_declination,
            });
        }
        previous = next;
        previous_declination = next_declination;
    }

    Err(SolError::oracle(format!("solstices do not bracket {t}")))
}
