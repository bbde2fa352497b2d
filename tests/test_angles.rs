use chrono::{DateTime, TimeZone, Utc};
use sol_tracker::angles::*;

macro_rules! assert_approx {
    ($left:expr, $right:expr, $tol:expr) => {
        let (l, r) = ($left as f64, $right as f64);
        assert!(
            (l - r).abs() <= $tol,
            "assert_approx failed: left={}, right={}, diff={}, tol={}",
            l, r, (l - r).abs(), $tol
        );
    };
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

// ── NormalizeAngle ──

#[test]
fn test_normalize_angle_basic() {
    let cases: &[(f64, f64)] = &[
        (0.0, 0.0),
        (45.0, 45.0),
        (360.0, 0.0),
        (361.0, 1.0),
        (-1.0, 359.0),
        (-90.0, 270.0),
        (405.0, 45.0),
        (-180.0, 180.0),
    ];
    for &(input, expected) in cases {
        assert_approx!(normalize_angle(input), expected, 1e-9);
    }
}

#[test]
fn test_normalize_angle_large() {
    let cases: &[(f64, f64)] = &[(720.0, 0.0), (810.0, 90.0), (-720.0, 0.0), (-450.0, 270.0)];
    for &(input, expected) in cases {
        assert_approx!(normalize_angle(input), expected, 1e-9);
    }
}

#[test]
fn test_normalize_angle_small_near_zero() {
    assert_approx!(normalize_angle(0.001), 0.001, 1e-6);
    assert_approx!(normalize_angle(-0.001), 359.999, 1e-6);
}

// ── AngleDelta ──

#[test]
fn test_angle_delta_short_way_round() {
    assert_approx!(angle_delta(359.0, 1.0), 2.0, 1e-9);
    assert_approx!(angle_delta(1.0, 359.0), -2.0, 1e-9);
    assert_approx!(angle_delta(90.0, 120.0), 30.0, 1e-9);
    assert_approx!(angle_delta(120.0, 90.0), -30.0, 1e-9);
}

#[test]
fn test_angle_delta_half_turn_is_positive() {
    assert_approx!(angle_delta(0.0, 180.0), 180.0, 1e-9);
    assert_approx!(angle_delta(180.0, 0.0), 180.0, 1e-9);
}

// ── SeasonalDay ──

#[test]
fn test_seasonal_day_epoch() {
    assert_approx!(seasonal_day(&utc(2000, 1, 1, 0, 0)), 1.0, 1e-9);
    assert_approx!(seasonal_day(&utc(2000, 1, 1, 12, 0)), 1.5, 1e-9);
}

#[test]
fn test_seasonal_day_is_continuous_and_bounded() {
    let mut t = utc(2026, 1, 1, 0, 0);
    let mut prev = seasonal_day(&t);
    for _ in 0..(366 * 4) {
        t += chrono::Duration::hours(6);
        let n = seasonal_day(&t);
        assert!((1.0..1.0 + TROPICAL_YEAR_DAYS).contains(&n), "n={}", n);
        let step = n - prev;
        // either a quarter day forward, or the wrap back to the start of the year
        assert!((step - 0.25).abs() < 1e-6 || step < -300.0, "step={}", step);
        prev = n;
    }
}

// ── SolarDeclination ──

#[test]
fn test_solar_declination_solstices_equinoxes() {
    assert_approx!(solar_declination(172.3), 23.45, 0.05);
    assert_approx!(solar_declination(355.0), -23.45, 0.05);
    assert_approx!(solar_declination(81.0), 0.0, 1.0);
    assert_approx!(solar_declination(264.0), 0.0, 1.0);
}

#[test]
fn test_solar_declination_bounded_all_days() {
    for n in 1..=365 {
        let decl = solar_declination(n as f64);
        assert!((-EARTH_AXIAL_TILT..=EARTH_AXIAL_TILT).contains(&decl), "Day {}: {}", n, decl);
    }
}

// ── EquationOfTime ──

#[test]
fn test_equation_of_time_bounded() {
    for n in 1..=365 {
        let eot = equation_of_time(n as f64);
        assert!(eot.abs() < 17.0, "Day {}: {}", n, eot);
    }
}

#[test]
fn test_equation_of_time_early_november_peak() {
    assert!(equation_of_time(307.0) > 15.0);
}

// ── TruePosition — Springfield Equinox ──

fn springfield(t: DateTime<Utc>) -> (f64, f64, f64) {
    true_position(39.8, -89.6, &t)
}

#[test]
fn test_springfield_equinox_declination() {
    let (_, _, decl) = springfield(utc(2026, 3, 21, 18, 0));
    assert_approx!(decl, 0.0, 1.0);
}

#[test]
fn test_springfield_equinox_altitude() {
    let (alt, _, _) = springfield(utc(2026, 3, 21, 18, 0));
    assert_approx!(alt, 50.0, 2.0);
}

#[test]
fn test_springfield_equinox_azimuth() {
    let (_, az, _) = springfield(utc(2026, 3, 21, 18, 0));
    assert!((174.0..=185.0).contains(&az), "azimuth={}", az);
}

#[test]
fn test_springfield_morning_east_afternoon_west() {
    let (_, morning, _) = springfield(utc(2026, 3, 21, 15, 0));
    let (_, afternoon, _) = springfield(utc(2026, 3, 21, 21, 0));
    assert!(morning < 180.0, "morning azimuth={}", morning);
    assert!(afternoon > 180.0, "afternoon azimuth={}", afternoon);
}

// ── Summer / Winter solstice ──

#[test]
fn test_summer_solstice() {
    let (alt, _, decl) = springfield(utc(2026, 6, 21, 18, 0));
    assert_approx!(decl, 23.45, 1.0);
    assert!(alt > 70.0, "altitude={}", alt);
}

#[test]
fn test_winter_solstice() {
    let (alt, _, decl) = springfield(utc(2026, 12, 21, 18, 0));
    assert_approx!(decl, -23.45, 1.0);
    assert!(alt < 30.0, "altitude={}", alt);
}

// ── HourAngle ──

#[test]
fn test_hour_angle_solar_noon() {
    assert_approx!(hour_angle(12.0), 0.0, 1e-9);
}

#[test]
fn test_hour_angle_known_values() {
    assert_approx!(hour_angle(6.0), -90.0, 1e-9);
    assert_approx!(hour_angle(18.0), 90.0, 1e-9);
    assert_approx!(hour_angle(13.0), DEGREES_PER_HOUR, 1e-9);
}

// ── DegRad roundtrip ──

#[test]
fn test_known_conversions() {
    assert_approx!(deg_to_rad(180.0), std::f64::consts::PI, 1e-12);
    assert_approx!(rad_to_deg(std::f64::consts::FRAC_PI_2), 90.0, 1e-12);
}

// ── Equator solar noon equinox ──

#[test]
fn test_equator_sun_overhead() {
    let (alt, _, _) = true_position(0.0, 0.0, &utc(2026, 3, 21, 12, 7));
    assert!(alt > 88.0, "altitude={}", alt);
}

// ── Polar latitude ──

#[test]
fn test_polar_summer_midnight_sun() {
    let (alt, az, _) = true_position(70.0, 0.0, &utc(2026, 6, 21, 0, 0));
    assert!(alt > 0.0, "altitude={}", alt);
    assert!(az > 350.0 || az < 10.0, "azimuth={}", az);
}

#[test]
fn test_polar_winter_noon_below_horizon() {
    let (alt, _, _) = true_position(70.0, 0.0, &utc(2026, 12, 21, 12, 0));
    assert!(alt < 0.0, "altitude={}", alt);
}

// ── Southern hemisphere ──

#[test]
fn test_southern_hemisphere_reversed_seasons() {
    let (december, _, _) = true_position(-33.9, 151.2, &utc(2026, 12, 21, 2, 0));
    let (june, june_az, _) = true_position(-33.9, 151.2, &utc(2026, 6, 21, 2, 0));
    assert!(december > june + 40.0, "december={} june={}", december, june);
    // noon sun is to the north
    assert!(june_az > 350.0 || june_az < 10.0, "azimuth={}", june_az);
}

// ── Midnight ──

#[test]
fn test_midnight_below_horizon() {
    let (alt, _, _) = springfield(utc(2026, 3, 22, 6, 0));
    assert!(alt < -40.0, "altitude={}", alt);
}

// ── Refraction ──

#[test]
fn test_refraction_at_horizon() {
    assert_approx!(refraction(0.0, STANDARD_PRESSURE_MBAR, 15.0), 0.476, 0.01);
}

#[test]
fn test_refraction_disabled_without_pressure() {
    assert_eq!(refraction(0.0, 0.0, 15.0), 0.0);
    assert_eq!(refraction(30.0, 0.0, 15.0), 0.0);
}

#[test]
fn test_refraction_tapers_below_horizon() {
    let at_minus_one = refraction(-1.0, STANDARD_PRESSURE_MBAR, 15.0);
    assert!(at_minus_one > 0.0);
    assert_approx!(refraction(-2.0, STANDARD_PRESSURE_MBAR, 15.0), at_minus_one / 2.0, 1e-9);
    assert_eq!(refraction(-3.0, STANDARD_PRESSURE_MBAR, 15.0), 0.0);
    assert_eq!(refraction(-10.0, STANDARD_PRESSURE_MBAR, 15.0), 0.0);
}

#[test]
fn test_refraction_shrinks_with_altitude() {
    let low = refraction(5.0, STANDARD_PRESSURE_MBAR, 15.0);
    let high = refraction(45.0, STANDARD_PRESSURE_MBAR, 15.0);
    assert!(low > high);
    assert!(high < 0.02, "high={}", high);
}

// ── PressureFromElevation ──

#[test]
fn test_pressure_from_elevation() {
    assert_approx!(pressure_from_elevation(0.0), STANDARD_PRESSURE_MBAR, 1e-9);
    assert_approx!(pressure_from_elevation(1000.0), 898.7, 0.5);
    assert!(pressure_from_elevation(3000.0) < pressure_from_elevation(1000.0));
}
