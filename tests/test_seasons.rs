mod common;

use chrono::Duration;
use common::{location, utc, SinusoidOracle};
use sol_tracker::*;

macro_rules! assert_approx {
    ($left:expr, $right:expr, $tol:expr) => {
        let (l, r) = ($left as f64, $right as f64);
        assert!(
            (l - r).abs() <= $tol,
            "assertion failed: |{} - {}| = {} > {}",
            l,
            r,
            (l - r).abs(),
            $tol
        );
    };
}

fn window_around(t: chrono::DateTime<chrono::Utc>) -> SolsticeWindow {
    solstices_around(&analytic_oracle(), &location(40.0, 0.0), t).unwrap()
}

// ── Solstice search ──

#[test]
fn test_solstices_bracket_the_march_equinox() {
    let now = utc(2026, 3, 21, 9, 0);
    let window = window_around(now);

    assert!(window.previous <= now && now < window.next);
    assert!(common::within(window.previous, utc(2025, 12, 21, 0, 0), Duration::days(2)), "{}", window.previous);
    assert!(common::within(window.next, utc(2026, 6, 21, 0, 0), Duration::days(2)), "{}", window.next);
    assert_approx!(window.previous_declination, -EARTH_AXIAL_TILT, 0.01);
    assert_approx!(window.next_declination, EARTH_AXIAL_TILT, 0.01);
}

#[test]
fn test_window_moves_on_after_the_solstice() {
    let before = window_around(utc(2026, 3, 21, 9, 0));
    let after = window_around(before.next + Duration::hours(1));

    assert!(common::within(after.previous, before.next, Duration::minutes(2)), "{}", after.previous);
    assert!(common::within(after.next, utc(2026, 12, 21, 0, 0), Duration::days(2)), "{}", after.next);
    assert_eq!(after.direction(40.0), Direction::Decreasing);
}

#[test]
fn test_next_solstice_is_strictly_after() {
    let oracle = analytic_oracle();
    let cfg = location(40.0, 0.0);
    let (june, declination) = next_solstice(&oracle, &cfg, utc(2026, 3, 21, 0, 0)).unwrap();
    assert!(declination > 23.4, "{}", declination);

    let (december, _) = next_solstice(&oracle, &cfg, june).unwrap();
    assert!(december > june + Duration::days(170), "{}", december);
}

#[test]
fn test_constant_declination_has_no_solstice() {
    let err = next_solstice(&SinusoidOracle::new(), &location(40.0, 0.0), utc(2026, 3, 21, 0, 0)).unwrap_err();
    assert!(matches!(err, SolError::Oracle { .. }));
}

// ── Normalization ──

#[test]
fn test_normalize_spans_the_solstice_declinations() {
    let window = window_around(utc(2026, 3, 21, 9, 0));
    let low = window.previous_declination;
    let high = window.next_declination;

    assert_approx!(window.normalize(high, 40.0), 1.0, 1e-12);
    assert_approx!(window.normalize(low, 40.0), -1.0, 1e-12);
    assert_approx!(window.normalize((low + high) / 2.0, 40.0), 0.0, 1e-12);
    // beyond the window's extremes clamps
    assert_approx!(window.normalize(high + 1.0, 40.0), 1.0, 1e-12);
}

#[test]
fn test_southern_hemisphere_inverts() {
    let window = window_around(utc(2026, 3, 21, 9, 0));
    assert_approx!(window.normalize(window.next_declination, -33.0), -1.0, 1e-12);
    assert_approx!(window.normalize(window.previous_declination, -33.0), 1.0, 1e-12);
    assert_eq!(window.direction(40.0), Direction::Increasing);
    assert_eq!(window.direction(-33.0), Direction::Decreasing);
}

#[test]
fn test_degenerate_window_is_flat() {
    let t = utc(2026, 3, 21, 0, 0);
    let window = SolsticeWindow {
        previous: t - Duration::days(90),
        next: t + Duration::days(90),
        previous_declination: 20.0,
        next_declination: 20.0,
    };
    assert_eq!(window.normalize(20.0, 40.0), 0.0);
    assert_eq!(window.normalize(-5.0, -40.0), 0.0);
}
