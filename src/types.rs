use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observer location and atmosphere. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub elevation: f64,
    /// mbar; 0 disables refraction.
    pub pressure: f64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Horizon offset in degrees. Informational only: carried for rise/set
    /// consumers, never read by the tracker and not part of the fingerprint.
    pub horizon: f64,
}

impl LocationConfig {
    /// Stable identity of everything a reversal cache depends on.
    pub fn fingerprint(&self) -> String {
        format!(
            "{:.6}:{:.6}:{:.1}:{:.2}:{:.2}",
            self.latitude, self.longitude, self.elevation, self.pressure, self.temperature
        )
    }

    pub fn refraction_enabled(&self) -> bool {
        self.pressure > 0.0
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            elevation: 0.0,
            pressure: 1013.25,
            temperature: 15.0,
            horizon: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Degrees in [-90, 90].
    pub elevation: f64,
    /// Degrees in [0, 360), clockwise from north.
    pub azimuth: f64,
    pub declination: f64,
}

/// Raw ephemeris output carrying both refracted and geometric coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub true_elevation: f64,
    pub true_azimuth: f64,
    pub apparent_elevation: f64,
    pub apparent_azimuth: f64,
    pub declination: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn from_delta(delta: f64) -> Self {
        if delta >= 0.0 {
            Direction::Increasing
        } else {
            Direction::Decreasing
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Increasing => 1.0,
            Direction::Decreasing => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    SolarNoon,
    Reversal,
}

/// A moment after which azimuth moves in `direction_after` until the next checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub kind: CheckpointKind,
    pub direction_after: Direction,
    pub azimuth: f64,
}

impl Checkpoint {
    pub fn is_reversal(&self) -> bool {
        self.kind == CheckpointKind::Reversal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Elevation,
    Azimuth,
    SeasonalCurve,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [
        SignalKind::Elevation,
        SignalKind::Azimuth,
        SignalKind::SeasonalCurve,
    ];

    /// Azimuth wraps at 360°; the other signals are linear.
    pub fn is_circular(self) -> bool {
        self == SignalKind::Azimuth
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Armed,
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarEventKind {
    Noon,
    Midnight,
}

/// Next upper or lower transit and the elevation the sun reaches there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolarEvent {
    pub kind: SolarEventKind,
    pub time: DateTime<Utc>,
    pub elevation: f64,
}

/// The declination extremes on either side of an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolsticeWindow {
    pub previous: DateTime<Utc>,
    pub next: DateTime<Utc>,
    pub previous_declination: f64,
    pub next_declination: f64,
}

impl SolsticeWindow {
    /// Declination mapped onto [-1, 1] between the two solstice declinations:
    /// +1 at the local summer solstice, -1 at the local winter solstice.
    pub fn normalize(&self, declination: f64, latitude: f64) -> f64 {
        let high = self.previous_declination.max(self.next_declination);
        let low = self.previous_declination.min(self.next_declination);
        if high - low <= f64::EPSILON {
            return 0.0;
        }
        let mut unit = (declination - low) / (high - low);
        if latitude < 0.0 {
            unit = 1.0 - unit;
        }
        2.0 * unit.clamp(0.0, 1.0) - 1.0
    }

    /// Travel of the seasonal curve until the next solstice.
    pub fn direction(&self, latitude: f64) -> Direction {
        let northward = Direction::from_delta(self.next_declination - self.previous_declination);
        if latitude < 0.0 {
            northward.reversed()
        } else {
            northward
        }
    }
}

/// Per-signal tracking state, owned by its scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalState {
    pub current_value: f64,
    pub step_size: f64,
    pub last_update: DateTime<Utc>,
    pub next_target: f64,
    pub next_update: DateTime<Utc>,
    pub direction: Direction,
    pub reversal_time: Option<DateTime<Utc>>,
    /// Elevation only.
    pub solar_event: Option<SolarEvent>,
    /// Seasonal curve only.
    pub solstices: Option<SolsticeWindow>,
    pub available: bool,
}

/// What the host renders for one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSnapshot {
    pub kind: SignalKind,
    pub current_value: Option<f64>,
    pub next_update: Option<DateTime<Utc>>,
    pub next_target: Option<f64>,
    pub reversal_time: Option<DateTime<Utc>>,
    pub next_solar_event: Option<SolarEvent>,
    pub previous_solstice: Option<DateTime<Utc>>,
    pub next_solstice: Option<DateTime<Utc>>,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSizes {
    pub elevation: f64,
    pub azimuth: f64,
    pub seasonal: f64,
}

impl StepSizes {
    pub fn for_kind(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Elevation => self.elevation,
            SignalKind::Azimuth => self.azimuth,
            SignalKind::SeasonalCurve => self.seasonal,
        }
    }
}

impl Default for StepSizes {
    fn default() -> Self {
        Self {
            elevation: 0.5,
            azimuth: 1.0,
            seasonal: 0.01,
        }
    }
}
