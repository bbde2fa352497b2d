use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::cache::ReversalCache;
use crate::detector::{is_tropical, sampled_direction};
use crate::error::Result;
use crate::oracle::PositionOracle;
use crate::store::KeyValueStore;

pub const GROUND_TRUTH_HALF_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
}

impl Cadence {
    pub fn for_latitude(latitude: f64) -> Self {
        if is_tropical(latitude) {
            Cadence::Daily
        } else {
            Cadence::Weekly
        }
    }

    fn days(self) -> i64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 7,
        }
    }
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    // midnight can fall into a DST gap; take the first valid instant after it
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

/// The local midnight `cadence` days after today's date in `tz`.
pub fn next_midnight(now: DateTime<Utc>, tz: &Tz, cadence: Cadence) -> DateTime<Utc> {
    let today = now.with_timezone(tz).date_naive();
    today
        .checked_add_signed(Duration::days(cadence.days()))
        .and_then(|date| local_midnight(tz, date))
        .filter(|t| *t > now)
        .unwrap_or(now + Duration::days(cadence.days()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevalidationOutcome {
    pub pruned: usize,
    pub appended: usize,
    pub rebuilt: bool,
    pub next_run: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RevalidationScheduler {
    tz: Tz,
    next_run: Option<DateTime<Utc>>,
}

impl RevalidationScheduler {
    pub fn new(tz: Tz) -> Self {
        Self { tz, next_run: None }
    }

    pub fn schedule(&mut self, latitude: f64, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = next_midnight(now, &self.tz, Cadence::for_latitude(latitude));
        self.next_run = Some(next);
        next
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_run
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|t| t <= now)
    }

    pub fn cancel(&mut self) {
        self.next_run = None;
    }

    pub fn set_time_zone(&mut self, tz: Tz) {
        self.tz = tz;
    }

    pub fn run<S: KeyValueStore>(
        &mut self,
        cache: &mut ReversalCache<S>,
        oracle: &dyn PositionOracle,
        now: DateTime<Utc>,
    ) -> Result<RevalidationOutcome> {
        let latitude = cache.location().latitude;
        let mut outcome = RevalidationOutcome {
            pruned: 0,
            appended: 0,
            rebuilt: false,
            next_run: now,
        };

        if cache.is_active() {
            outcome.pruned = cache.prune(now);
            outcome.appended = cache.ensure_capacity(oracle, now)?;

            let half = Duration::minutes(GROUND_TRUTH_HALF_WINDOW_MINUTES);
            let near_checkpoint = cache
                .checkpoints()
                .iter()
                .any(|c| c.timestamp >= now - half && c.timestamp <= now + half);
            if !near_checkpoint {
                let truth = sampled_direction(oracle, cache.location(), now, half)?;
                let cached = cache.direction_at(oracle, now)?;
                if truth != cached {
                    warn!(?truth, ?cached, %now, "reversal cache drifted from oracle, rebuilding");
                    cache.rebuild(oracle, now)?;
                    outcome.rebuilt = true;
                }
            }
        }

        outcome.next_run = self.schedule(latitude, now);
        debug!(?outcome, "revalidation finished");
        Ok(outcome)
    }
}
