//! Synthetic oracles and helpers shared by the integration tests.
#![allow(dead_code)]

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use sol_tracker::{
    analytic_oracle, KeyValueStore, LocationConfig, PositionOracle, Result, SolError, SolarPosition,
    TrackerConfig,
};

pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("sol_tracker=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn location(latitude: f64, longitude: f64) -> LocationConfig {
    LocationConfig {
        latitude,
        longitude,
        ..LocationConfig::default()
    }
}

pub fn tracker_config(latitude: f64, longitude: f64) -> TrackerConfig {
    TrackerConfig::new(location(latitude, longitude))
}

pub fn shared_analytic() -> Arc<dyn PositionOracle + Send + Sync> {
    Arc::new(analytic_oracle())
}

fn day_fraction(t: DateTime<Utc>) -> f64 {
    (t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9) / 86_400.0
}

/// Sun with noon at 12:00 UTC and four azimuth reversals a day, at 03:00,
/// 09:00, 15:00 and 21:00. Azimuth increases through noon.
#[derive(Debug, Clone, Copy)]
pub struct SinusoidOracle {
    /// -1.0 mirrors the azimuth curve, so it decreases through noon.
    pub sense: f64,
}

impl SinusoidOracle {
    pub fn new() -> Self {
        Self { sense: 1.0 }
    }

    pub fn mirrored() -> Self {
        Self { sense: -1.0 }
    }

    pub fn azimuth_rising(&self, t: DateTime<Utc>) -> bool {
        (4.0 * PI * day_fraction(t)).cos() * self.sense > 0.0
    }
}

impl PositionOracle for SinusoidOracle {
    fn position_at(&self, t: DateTime<Utc>, _cfg: &LocationConfig) -> Result<SolarPosition> {
        let x = day_fraction(t);
        Ok(SolarPosition {
            elevation: 60.0 * (2.0 * PI * (x - 0.5)).cos(),
            azimuth: 90.0 + self.sense * 20.0 * (4.0 * PI * x).sin(),
            declination: 20.0,
        })
    }
}

/// Azimuth falls until `turn`, then rises: `100 + rate * |t - turn|` with rate
/// 0.25° per minute. Elevation is the same daily curve as [`SinusoidOracle`].
#[derive(Debug, Clone, Copy)]
pub struct VeeOracle {
    pub turn: DateTime<Utc>,
}

pub const VEE_MINIMUM: f64 = 100.0;

impl PositionOracle for VeeOracle {
    fn position_at(&self, t: DateTime<Utc>, _cfg: &LocationConfig) -> Result<SolarPosition> {
        let minutes = (t - self.turn).num_milliseconds().abs() as f64 / 60_000.0;
        Ok(SolarPosition {
            elevation: 60.0 * (2.0 * PI * (day_fraction(t) - 0.5)).cos(),
            azimuth: VEE_MINIMUM + 0.25 * minutes,
            declination: 20.0,
        })
    }
}

/// Real elevation and declination, but an azimuth that never moves.
#[derive(Debug, Clone, Copy)]
pub struct FrozenAzimuthOracle;

impl PositionOracle for FrozenAzimuthOracle {
    fn position_at(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<SolarPosition> {
        let real = analytic_oracle().position_at(t, cfg)?;
        Ok(SolarPosition {
            azimuth: 123.0,
            ..real
        })
    }
}

/// Fails every call.
#[derive(Debug, Clone, Copy)]
pub struct BrokenOracle;

impl PositionOracle for BrokenOracle {
    fn position_at(&self, t: DateTime<Utc>, _cfg: &LocationConfig) -> Result<SolarPosition> {
        Err(SolError::oracle(format!("ephemeris offline at {t}")))
    }
}

/// Counts calls into the wrapped oracle.
#[derive(Debug, Default)]
pub struct CountingOracle<O> {
    pub inner: O,
    pub calls: AtomicUsize,
}

impl<O> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<O: PositionOracle> PositionOracle for CountingOracle<O> {
    fn position_at(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<SolarPosition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.position_at(t, cfg)
    }
}

/// Store whose writes always fail; reads find nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyStore;

impl KeyValueStore for ReadOnlyStore {
    fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save(&self, key: &str, _bytes: &[u8]) -> Result<()> {
        Err(SolError::store(format!("{key}: read-only")))
    }

    fn remove(&self, key: &str) -> Result<()> {
        Err(SolError::store(format!("{key}: read-only")))
    }
}

pub fn within(a: DateTime<Utc>, b: DateTime<Utc>, tolerance: Duration) -> bool {
    (a - b).num_milliseconds().abs() <= tolerance.num_milliseconds()
}
