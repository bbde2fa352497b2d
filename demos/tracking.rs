use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use sol_tracker::{analytic_oracle, MemoryStore, Settings, SignalKind, Tracker, WakeEvent};

fn main() -> sol_tracker::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_json(
        r#"{
            "latitude": 10.0,
            "longitude": -84.0,
            "elevation": 1150.0,
            "pressure": "auto",
            "elevation_step": 0.5,
            "azimuth_step": 1.0,
            "time_zone": "America/Costa_Rica"
        }"#,
    )?;
    let config = settings.validate()?;

    println!("=== Sun Step Tracking Example ===");
    println!(
        "Location: San José ({:.1}°N, {:.1}°W), {:.0} m, {:.1} mbar",
        config.location.latitude,
        -config.location.longitude,
        config.location.elevation,
        config.location.pressure
    );

    let start = Utc
        .with_ymd_and_hms(2026, 6, 21, 10, 0, 0)
        .single()
        .ok_or_else(|| sol_tracker::SolError::config("bad start time"))?;
    let mut tracker = Tracker::new(config, Arc::new(analytic_oracle()), MemoryStore::new(), "demo");
    tracker.start(start);

    println!();
    println!("--- Reversal Cache ---");
    for checkpoint in tracker.cache().checkpoints() {
        println!(
            "{}  {:?} → {:?} at {:.3}°",
            checkpoint.timestamp, checkpoint.kind, checkpoint.direction_after, checkpoint.azimuth
        );
    }

    println!();
    println!("--- Next 12 wake-ups ---");
    for _ in 0..12 {
        let Some(wake) = tracker.next_wakeup() else {
            break;
        };
        tracker.handle(wake, wake.at);
        if let WakeEvent::Signal { kind, .. } = wake.event {
            let snapshot = tracker.signal(kind).snapshot();
            let label = match kind {
                SignalKind::Elevation => "elevation",
                SignalKind::Azimuth => "azimuth",
                SignalKind::SeasonalCurve => "seasonal",
            };
            println!(
                "{}  {:<9} = {:>8.3}  next {:?} at {:?}",
                wake.at,
                label,
                snapshot.current_value.unwrap_or(f64::NAN),
                snapshot.next_target,
                snapshot.next_update
            );
        }
    }

    println!();
    println!("--- Snapshots (JSON) ---");
    let json = serde_json::to_string_pretty(&tracker.snapshots())
        .map_err(|err| sol_tracker::SolError::config(err.to_string()))?;
    println!("{json}");
    Ok(())
}
