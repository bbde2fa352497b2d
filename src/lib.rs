pub mod angles;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod oracle;
pub mod revalidation;
pub mod runtime;
pub mod scheduler;
pub mod search;
pub mod seasons;
pub mod store;
pub mod types;

pub use angles::{
    angle_delta, deg_to_rad, normalize_angle, pressure_from_elevation, rad_to_deg, refraction,
    seasonal_day, true_position, DEGREES_PER_HOUR, EARTH_AXIAL_TILT,
};

pub use cache::{check_invariants, ReversalCache, DEFAULT_CAPACITY, SEARCH_HORIZON_DAYS};

pub use config::{PressureKeyword, PressureSetting, Settings, TrackerConfig};

pub use detector::{
    is_tropical, monotonic_direction, next_solar_event, next_solar_midnight, next_solar_noon,
    solar_noon_at_or_before, ReversalDetector, AZIMUTH_DEGREE_TOLERANCE,
    REVERSAL_TIME_TOLERANCE_MS, TROPICAL_LATITUDE_THRESHOLD,
};

pub use error::{Result, SolError};

pub use oracle::{analytic_oracle, AnalyticEphemeris, Ephemeris, OracleAdapter, PositionOracle};

pub use revalidation::{next_midnight, Cadence, RevalidationOutcome, RevalidationScheduler};

pub use runtime::{spawn, Clock, Command, TrackerHandle};

pub use scheduler::{
    retry_delay_minutes, SharedOracle, SignalScheduler, Tracker, WakeEvent, WakeUp, MAX_RETRIES,
    RETRY_DELAY_MINUTES,
};

pub use search::{find_next_crossing, next_step_target, Crossing, SearchParams};

pub use seasons::{next_solstice, solstices_around};

pub use store::{reversal_cache_key, FileStore, KeyValueStore, MemoryStore, STORAGE_KEY_PREFIX};

pub use types::{
    Checkpoint, CheckpointKind, Direction, LocationConfig, Observation, SignalKind, SignalSnapshot,
    SignalState, SolarEvent, SolarEventKind, SolarPosition, SolsticeWindow, StepSizes, TimerPhase,
};
