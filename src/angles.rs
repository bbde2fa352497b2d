use chrono::{DateTime, TimeZone, Timelike, Utc};

pub const EARTH_AXIAL_TILT: f64 = 23.45;
pub const DEGREES_PER_HOUR: f64 = 15.0;
pub const TROPICAL_YEAR_DAYS: f64 = 365.2422;
pub const STANDARD_PRESSURE_MBAR: f64 = 1013.25;

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * (std::f64::consts::PI / 180.0)
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * (180.0 / std::f64::consts::PI)
}

pub fn normalize_angle(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Signed change from `from` to `to`, taking the short way round, in (-180, 180].
pub fn angle_delta(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(360.0);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Continuous day-of-year: 1.0 at 2000-01-01T00:00Z, wrapping every tropical year.
pub fn seasonal_day(t: &DateTime<Utc>) -> f64 {
    let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single();
    let days = match epoch {
        Some(epoch) => (*t - epoch).num_milliseconds() as f64 / 86_400_000.0,
        None => 0.0,
    };
    1.0 + days.rem_euclid(TROPICAL_YEAR_DAYS)
}

pub fn utc_hours(t: &DateTime<Utc>) -> f64 {
    t.num_seconds_from_midnight() as f64 / 3600.0 + t.nanosecond() as f64 / 3.6e12
}

pub fn intermediate_angle_b(n: f64) -> f64 {
    deg_to_rad((n - 1.0) * (360.0 / TROPICAL_YEAR_DAYS))
}

/// Minutes.
pub fn equation_of_time(n: f64) -> f64 {
    let b = intermediate_angle_b(n);
    229.18
        * (0.000075
            + 0.001868 * b.cos()
            - 0.032077 * b.sin()
            - 0.014615 * (2.0 * b).cos()
            - 0.040849 * (2.0 * b).sin())
}

/// Hours to add to UTC to get local solar time.
pub fn utc_lst_correction(longitude: f64, eot: f64) -> f64 {
    (4.0 * longitude + eot) / 60.0
}

pub fn hour_angle(local_solar_time: f64) -> f64 {
    DEGREES_PER_HOUR * (local_solar_time - 12.0)
}

pub fn solar_declination(n: f64) -> f64 {
    EARTH_AXIAL_TILT * deg_to_rad(360.0 * ((284.0 + n) / TROPICAL_YEAR_DAYS)).sin()
}

pub fn solar_zenith_angle(latitude: f64, declination: f64, hour_angle: f64) -> f64 {
    let lat_rad = deg_to_rad(latitude);
    let dec_rad = deg_to_rad(declination);
    let ha_rad = deg_to_rad(hour_angle);
    let cos_zenith =
        lat_rad.sin() * dec_rad.sin() + lat_rad.cos() * dec_rad.cos() * ha_rad.cos();
    rad_to_deg(cos_zenith.clamp(-1.0, 1.0).acos())
}

pub fn solar_altitude(zenith_angle: f64) -> f64 {
    90.0 - zenith_angle
}

pub fn solar_azimuth(latitude: f64, declination: f64, hour_angle: f64) -> f64 {
    let lat_rad = deg_to_rad(latitude);
    let dec_rad = deg_to_rad(declination);
    let ha_rad = deg_to_rad(hour_angle);
    let sin_az = -dec_rad.cos() * ha_rad.sin();
    let cos_az = dec_rad.sin() * lat_rad.cos() - dec_rad.cos() * lat_rad.sin() * ha_rad.cos();
    let az_rad = sin_az.atan2(cos_az);
    normalize_angle(rad_to_deg(az_rad))
}

/// Geometric `(elevation, azimuth, declination)` of the sun at `t`.
pub fn true_position(latitude: f64, longitude: f64, t: &DateTime<Utc>) -> (f64, f64, f64) {
    let n = seasonal_day(t);
    let eot = equation_of_time(n);
    let decl = solar_declination(n);
    let lst = (utc_hours(t) + utc_lst_correction(longitude, eot)).rem_euclid(24.0);
    let ha = hour_angle(lst);
    let alt = solar_altitude(solar_zenith_angle(latitude, decl, ha));
    let azim = solar_azimuth(latitude, decl, ha);
    (alt, azim, decl)
}

/// Atmospheric refraction in degrees for a geometric elevation.
///
/// Saemundsson's formula scaled by pressure and temperature. Below -1° the
/// correction tapers linearly to zero at -3° so apparent elevation stays
/// continuous and monotonic in the true elevation.
pub fn refraction(true_elevation: f64, pressure: f64, temperature: f64) -> f64 {
    if pressure <= 0.0 || true_elevation <= -3.0 {
        return 0.0;
    }
    let scale = (pressure / 1010.0) * (283.0 / (273.0 + temperature));
    let saemundsson = |h: f64| {
        let arcmin = 1.02 / deg_to_rad(h + 10.3 / (h + 5.11)).tan();
        arcmin / 60.0
    };
    let r = if true_elevation >= -1.0 {
        saemundsson(true_elevation)
    } else {
        saemundsson(-1.0) * (true_elevation + 3.0) / 2.0
    };
    (r * scale).max(0.0)
}

/// ISA barometric pressure in mbar at `elevation_m` meters.
pub fn pressure_from_elevation(elevation_m: f64) -> f64 {
    STANDARD_PRESSURE_MBAR * (1.0 - 2.25577e-5 * elevation_m).max(0.0).powf(5.25588)
}
