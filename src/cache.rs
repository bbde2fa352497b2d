//! Durable azimuth checkpoint cache. Untrusted snapshots are rebuilt, never repaired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::detector::{
    is_tropical, next_solar_noon, noon_checkpoint, sampled_direction, solar_noon_at_or_before,
    ReversalDetector,
};
use crate::error::{Result, SolError};
use crate::oracle::PositionOracle;
use crate::store::KeyValueStore;
use crate::types::{Checkpoint, CheckpointKind, Direction, LocationConfig};

pub const DEFAULT_CAPACITY: usize = 4;
pub const SNAPSHOT_VERSION: u32 = 1;
pub const SEARCH_HORIZON_DAYS: i64 = 30;
pub const SOLAR_DAY_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    fingerprint: String,
    checkpoints: Vec<Checkpoint>,
}

/// Checks ordering and alternation of a checkpoint sequence.
pub fn check_invariants(checkpoints: &[Checkpoint]) -> Result<()> {
    for pair in checkpoints.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.timestamp <= a.timestamp {
            return Err(SolError::corrupt(format!(
                "checkpoint at {} does not follow {}",
                b.timestamp, a.timestamp
            )));
        }
        if b.kind == CheckpointKind::Reversal && b.direction_after == a.direction_after {
            return Err(SolError::corrupt(format!(
                "reversal at {} does not change direction",
                b.timestamp
            )));
        }
    }
    Ok(())
}

pub struct ReversalCache<S> {
    key: String,
    store: S,
    cfg: LocationConfig,
    capacity: usize,
    checkpoints: Vec<Checkpoint>,
    detector_runs: usize,
}

impl<S: KeyValueStore> ReversalCache<S> {
    /// Empty cache; nothing is loaded or computed until first use.
    pub fn new(key: impl Into<String>, cfg: LocationConfig, capacity: usize, store: S) -> Self {
        Self {
            key: key.into(),
            store,
            cfg,
            capacity: capacity.max(1),
            checkpoints: Vec::new(),
            detector_runs: 0,
        }
    }

    /// Restores the persisted cache if it can be trusted, otherwise rebuilds
    /// it, then prunes and tops it up. Outside the tropics this is a no-op.
    #[instrument(skip(self, oracle), fields(key = %self.key))]
    pub fn load(&mut self, oracle: &dyn PositionOracle, now: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            self.checkpoints.clear();
            return Ok(());
        }
        match self.restore(now) {
            Ok(checkpoints) => {
                debug!(count = checkpoints.len(), "restored reversal cache");
                self.checkpoints = checkpoints;
                self.prune(now);
                self.ensure_capacity(oracle, now)?;
            }
            Err(err) => {
                info!(reason = %err, "discarding persisted reversal cache");
                self.rebuild(oracle, now)?;
            }
        }
        Ok(())
    }

    fn restore(&self, now: DateTime<Utc>) -> Result<Vec<Checkpoint>> {
        let bytes = self
            .store
            .load(&self.key)?
            .ok_or_else(|| SolError::stale("no snapshot"))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|err| SolError::corrupt(err.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SolError::corrupt(format!("unknown version {}", snapshot.version)));
        }
        if snapshot.fingerprint != self.cfg.fingerprint() {
            return Err(SolError::stale("location changed"));
        }
        let anchor = snapshot
            .checkpoints
            .first()
            .ok_or_else(|| SolError::corrupt("empty snapshot"))?;
        if now - anchor.timestamp > Duration::hours(SOLAR_DAY_HOURS) {
            return Err(SolError::stale(format!("anchor {} too old", anchor.timestamp)));
        }
        check_invariants(&snapshot.checkpoints)?;
        Ok(snapshot.checkpoints)
    }

    fn persist(&self) {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            fingerprint: self.cfg.fingerprint(),
            checkpoints: self.checkpoints.clone(),
        };
        let result = serde_json::to_vec(&snapshot)
            .map_err(|err| SolError::store(err.to_string()))
            .and_then(|bytes| self.store.save(&self.key, &bytes));
        if let Err(err) = result {
            warn!(key = %self.key, error = %err, "failed to persist reversal cache");
        }
    }

    /// Discards everything and starts again from the most recent solar noon.
    #[instrument(skip(self, oracle), fields(key = %self.key))]
    pub fn rebuild(&mut self, oracle: &dyn PositionOracle, now: DateTime<Utc>) -> Result<usize> {
        self.checkpoints.clear();
        if !self.is_active() {
            self.persist();
            return Ok(0);
        }
        let noon = solar_noon_at_or_before(oracle, &self.cfg, now)?;
        self.checkpoints.push(noon_checkpoint(oracle, &self.cfg, noon)?);
        let appended = self.extend(oracle, now)?;
        self.drop_consumed(now);
        self.persist();
        info!(anchor = %noon, count = self.checkpoints.len(), "rebuilt reversal cache");
        Ok(appended + 1)
    }

    /// Replaces the location and rebuilds; the old contents are never reused.
    pub fn reconfigure(
        &mut self,
        cfg: LocationConfig,
        oracle: &dyn PositionOracle,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.cfg = cfg;
        if self.is_active() {
            self.rebuild(oracle, now)?;
        } else {
            self.checkpoints.clear();
            if let Err(err) = self.store.remove(&self.key) {
                warn!(key = %self.key, error = %err, "failed to remove reversal cache");
            }
        }
        Ok(())
    }

    /// Tops up forward-looking checkpoints. A full cache is left untouched
    /// and nothing is written.
    pub fn ensure_capacity(&mut self, oracle: &dyn PositionOracle, now: DateTime<Utc>) -> Result<usize> {
        if !self.is_active() {
            return Ok(0);
        }
        if self.checkpoints.is_empty() {
            return self.rebuild(oracle, now);
        }
        if self.future_count(now) >= self.capacity {
            return Ok(0);
        }
        let appended = self.extend(oracle, now)?;
        if appended > 0 {
            self.persist();
        }
        Ok(appended)
    }

    fn extend(&mut self, oracle: &dyn PositionOracle, now: DateTime<Utc>) -> Result<usize> {
        let before = self.checkpoints.len();

        if let Some(last) = self.checkpoints.last() {
            if last.timestamp < now {
                let noon = solar_noon_at_or_before(oracle, &self.cfg, now)?;
                if noon > last.timestamp {
                    self.checkpoints.push(noon_checkpoint(oracle, &self.cfg, noon)?);
                }
            }
        }

        let horizon = now + Duration::days(SEARCH_HORIZON_DAYS);
        while self.future_count(now) < self.capacity {
            let Some(last) = self.checkpoints.last().copied() else {
                break;
            };
            if last.timestamp >= horizon {
                break;
            }
            let noon = next_solar_noon(oracle, &self.cfg, last.timestamp + Duration::minutes(1))?;
            self.detector_runs += 1;
            let reversals = ReversalDetector::new(oracle, &self.cfg).find_reversals(
                last.timestamp,
                noon - Duration::seconds(1),
                last.direction_after,
            )?;
            for reversal in reversals {
                if self.future_count(now) >= self.capacity {
                    break;
                }
                self.checkpoints.push(reversal);
            }
            if self.future_count(now) < self.capacity {
                let checkpoint = noon_checkpoint(oracle, &self.cfg, noon)?;
                if checkpoint.timestamp > last.timestamp {
                    self.checkpoints.push(checkpoint);
                }
            }
        }

        let appended = self.checkpoints.len() - before;
        debug!(appended, total = self.checkpoints.len(), "extended reversal cache");
        Ok(appended)
    }

    /// Drops consumed checkpoints, keeping the most recent one as the anchor.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.drop_consumed(now);
        if removed > 0 {
            self.persist();
        }
        removed
    }

    fn drop_consumed(&mut self, now: DateTime<Utc>) -> usize {
        let consumed = self.checkpoints.iter().take_while(|c| c.timestamp < now).count();
        if consumed <= 1 {
            return 0;
        }
        self.checkpoints.drain(..consumed - 1);
        consumed - 1
    }

    /// Direction of azimuth travel at `t`: the latest solar-noon anchor at or
    /// before `t`, flipped once for every reversal between it and `t`. A
    /// checkpoint exactly at `t` already applies.
    pub fn direction_at(&mut self, oracle: &dyn PositionOracle, t: DateTime<Utc>) -> Result<Direction> {
        let beyond = self.checkpoints.last().map_or(true, |c| t > c.timestamp);
        if beyond {
            self.ensure_capacity(oracle, t)?;
        }
        let Some(first) = self.checkpoints.first() else {
            return sampled_direction(oracle, &self.cfg, t, Duration::minutes(5));
        };
        if t < first.timestamp {
            return sampled_direction(oracle, &self.cfg, t, Duration::minutes(5));
        }

        let reached: Vec<&Checkpoint> = self.checkpoints.iter().take_while(|c| c.timestamp <= t).collect();
        let anchor_idx = reached
            .iter()
            .rposition(|c| c.kind == CheckpointKind::SolarNoon)
            .unwrap_or(0);
        let flips = reached[anchor_idx + 1..].iter().filter(|c| c.is_reversal()).count();
        let direction = reached[anchor_idx].direction_after;
        Ok(if flips % 2 == 0 { direction } else { direction.reversed() })
    }

    pub fn next_reversal(&self, now: DateTime<Utc>) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.is_reversal() && c.timestamp > now)
    }

    /// First reversal after `now` that turns travel away from `direction`.
    pub fn next_turn(&self, now: DateTime<Utc>, direction: Direction) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .find(|c| c.is_reversal() && c.timestamp > now && c.direction_after != direction)
    }

    pub fn future_count(&self, now: DateTime<Utc>) -> usize {
        self.checkpoints.iter().filter(|c| c.timestamp > now).count()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn is_active(&self) -> bool {
        is_tropical(self.cfg.latitude)
    }

    pub fn detector_runs(&self) -> usize {
        self.detector_runs
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes effect at the next top-up; surplus checkpoints are kept.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    pub fn location(&self) -> &LocationConfig {
        &self.cfg
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
