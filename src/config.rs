use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::angles::pressure_from_elevation;
use crate::cache::DEFAULT_CAPACITY;
use crate::error::{Result, SolError};
use crate::oracle::validate_location;
use crate::types::{LocationConfig, StepSizes};

pub const MIN_ELEVATION_STEP: f64 = 0.1;
pub const DEFAULT_ELEVATION_STEP: f64 = 0.5;
pub const DEFAULT_AZIMUTH_STEP: f64 = 1.0;
pub const DEFAULT_SEASONAL_STEP: f64 = 0.01;
pub const DEFAULT_TEMPERATURE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureKeyword {
    Auto,
}

/// Either `"auto"` (derived from elevation) or an explicit value in mbar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PressureSetting {
    Millibars(f64),
    Keyword(PressureKeyword),
}

impl Default for PressureSetting {
    fn default() -> Self {
        PressureSetting::Keyword(PressureKeyword::Auto)
    }
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_elevation_step() -> f64 {
    DEFAULT_ELEVATION_STEP
}

fn default_azimuth_step() -> f64 {
    DEFAULT_AZIMUTH_STEP
}

fn default_seasonal_step() -> f64 {
    DEFAULT_SEASONAL_STEP
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub pressure: PressureSetting,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub horizon: f64,
    #[serde(default = "default_elevation_step")]
    pub elevation_step: f64,
    #[serde(default = "default_azimuth_step")]
    pub azimuth_step: f64,
    #[serde(default = "default_seasonal_step")]
    pub seasonal_step: f64,
    /// IANA name, used for local-midnight revalidation.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Settings {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: 0.0,
            pressure: PressureSetting::default(),
            temperature: DEFAULT_TEMPERATURE,
            horizon: 0.0,
            elevation_step: DEFAULT_ELEVATION_STEP,
            azimuth_step: DEFAULT_AZIMUTH_STEP,
            seasonal_step: DEFAULT_SEASONAL_STEP,
            time_zone: default_time_zone(),
            cache_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| SolError::config(err.to_string()))
    }

    pub fn validate(&self) -> Result<TrackerConfig> {
        let location = self.location()?;

        if !(self.elevation_step.is_finite() && self.elevation_step >= MIN_ELEVATION_STEP && self.elevation_step <= 90.0) {
            return Err(SolError::config(format!(
                "elevation step {} must be between {MIN_ELEVATION_STEP} and 90",
                self.elevation_step
            )));
        }
        if !(self.azimuth_step.is_finite() && self.azimuth_step > 0.0 && self.azimuth_step <= 90.0) {
            return Err(SolError::config(format!(
                "azimuth step {} must be in (0, 90]",
                self.azimuth_step
            )));
        }
        if !(self.seasonal_step.is_finite() && self.seasonal_step > 0.0 && self.seasonal_step <= 1.0) {
            return Err(SolError::config(format!(
                "seasonal step {} must be in (0, 1]",
                self.seasonal_step
            )));
        }
        if self.cache_capacity == 0 {
            return Err(SolError::config("cache capacity must be at least 1"));
        }
        let time_zone: Tz = self
            .time_zone
            .parse()
            .map_err(|_| SolError::config(format!("unknown time zone {}", self.time_zone)))?;

        Ok(TrackerConfig {
            location,
            steps: StepSizes {
                elevation: self.elevation_step,
                azimuth: self.azimuth_step,
                seasonal: self.seasonal_step,
            },
            time_zone,
            cache_capacity: self.cache_capacity,
        })
    }

    fn location(&self) -> Result<LocationConfig> {
        let pressure = match self.pressure {
            PressureSetting::Keyword(PressureKeyword::Auto) => pressure_from_elevation(self.elevation),
            PressureSetting::Millibars(mbar) => mbar,
        };
        let location = LocationConfig {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation: self.elevation,
            pressure,
            temperature: self.temperature,
            horizon: self.horizon,
        };
        validate_location(&location)?;

        if !self.elevation.is_finite() {
            return Err(SolError::config("elevation must be finite"));
        }
        if !(pressure.is_finite() && pressure >= 0.0) {
            return Err(SolError::config(format!("pressure {pressure} must be >= 0")));
        }
        if !(self.temperature.is_finite() && self.temperature > -100.0 && self.temperature < 100.0) {
            return Err(SolError::config(format!(
                "temperature {} out of range",
                self.temperature
            )));
        }
        if !(self.horizon.is_finite() && self.horizon.abs() < 90.0) {
            return Err(SolError::config(format!("horizon {} out of range", self.horizon)));
        }
        Ok(location)
    }
}

/// Validated, immutable configuration for one tracked location.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub location: LocationConfig,
    pub steps: StepSizes,
    pub time_zone: Tz,
    pub cache_capacity: usize,
}

impl TrackerConfig {
    pub fn new(location: LocationConfig) -> Self {
        Self {
            location,
            steps: StepSizes::default(),
            time_zone: Tz::UTC,
            cache_capacity: DEFAULT_CAPACITY,
        }
    }
}
