use chrono::{DateTime, Utc};

use crate::angles;
use crate::error::{Result, SolError};
use crate::types::{LocationConfig, Observation, SolarPosition};

/// External ephemeris: time and observer in, raw sun coordinates out.
pub trait Ephemeris {
    fn observe(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<Observation>;
}

/// Deterministic sun position as seen from a configured location.
pub trait PositionOracle {
    fn position_at(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<SolarPosition>;
}

pub fn validate_location(cfg: &LocationConfig) -> Result<()> {
    let lat_ok = cfg.latitude.is_finite() && (-90.0..=90.0).contains(&cfg.latitude);
    let lon_ok = cfg.longitude.is_finite() && (-180.0..=180.0).contains(&cfg.longitude);
    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(SolError::InvalidLocation {
            latitude: cfg.latitude,
            longitude: cfg.longitude,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OracleAdapter<E> {
    ephemeris: E,
}

impl<E: Ephemeris> OracleAdapter<E> {
    pub fn new(ephemeris: E) -> Self {
        Self { ephemeris }
    }

    pub fn ephemeris(&self) -> &E {
        &self.ephemeris
    }
}

impl<E: Ephemeris> PositionOracle for OracleAdapter<E> {
    fn position_at(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<SolarPosition> {
        validate_location(cfg)?;
        let obs = self.ephemeris.observe(t, cfg)?;
        let (elevation, azimuth) = if cfg.refraction_enabled() {
            (obs.apparent_elevation, obs.apparent_azimuth)
        } else {
            (obs.true_elevation, obs.true_azimuth)
        };
        if !(elevation.is_finite() && azimuth.is_finite() && obs.declination.is_finite()) {
            return Err(SolError::oracle(format!("non-finite position at {t}")));
        }
        Ok(SolarPosition {
            elevation: elevation.clamp(-90.0, 90.0),
            azimuth: angles::normalize_angle(azimuth),
            declination: obs.declination,
        })
    }
}

/// Low-precision analytic solar ephemeris with Saemundsson refraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticEphemeris;

impl Ephemeris for AnalyticEphemeris {
    fn observe(&self, t: DateTime<Utc>, cfg: &LocationConfig) -> Result<Observation> {
        let (elevation, azimuth, declination) = angles::true_position(cfg.latitude, cfg.longitude, &t);
        let apparent = elevation + angles::refraction(elevation, cfg.pressure, cfg.temperature);
        Ok(Observation {
            true_elevation: elevation,
            true_azimuth: azimuth,
            apparent_elevation: apparent.min(90.0),
            // refraction only lifts the sun vertically
            apparent_azimuth: azimuth,
            declination,
        })
    }
}

/// The oracle the crate uses when none is injected.
pub fn analytic_oracle() -> OracleAdapter<AnalyticEphemeris> {
    OracleAdapter::new(AnalyticEphemeris)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_out_of_range_location() {
        let oracle = analytic_oracle();
        let cfg = LocationConfig {
            latitude: 91.0,
            ..LocationConfig::default()
        };
        let t = Utc.with_ymd_and_hms(2026, 3, 21, 12, 0, 0).unwrap();
        let err = oracle.position_at(t, &cfg).unwrap_err();
        assert!(matches!(err, SolError::InvalidLocation { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn refraction_lifts_low_sun() {
        let oracle = analytic_oracle();
        let refracted = LocationConfig {
            latitude: 45.0,
            ..LocationConfig::default()
        };
        let geometric = LocationConfig {
            pressure: 0.0,
            ..refracted
        };
        let t = Utc.with_ymd_and_hms(2026, 3, 21, 6, 0, 0).unwrap();
        let a = oracle.position_at(t, &refracted).unwrap();
        let g = oracle.position_at(t, &geometric).unwrap();
        if g.elevation > -1.0 && g.elevation < 5.0 {
            assert!(a.elevation > g.elevation);
        }
        assert_eq!(a.azimuth, g.azimuth);
    }
}
