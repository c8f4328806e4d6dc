//! Human-readable renderings of raw extracted values.
//!
//! Extractors call these before handing results to the coordinator. Every
//! function accepts an `Option` and renders `None` as [`UNKNOWN`].

use std::fmt;
use std::str::FromStr;

pub const UNKNOWN: &str = "Unknown";

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// A signed fraction as stored in EXIF rationals and `"n/d"` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub denom: i64,
}

impl Rational {
    pub fn new(num: i64, denom: i64) -> Self {
        Self { num, denom }
    }

    /// `None` when the denominator is zero.
    pub fn to_f64(self) -> Option<f64> {
        (self.denom != 0).then(|| self.num as f64 / self.denom as f64)
    }

    /// Lowest terms with a positive denominator. Left unchanged when the
    /// denominator is zero or the reduced form does not fit in `i64`.
    pub fn reduced(self) -> Self {
        if self.denom == 0 {
            return self;
        }
        let (num, denom) = (i128::from(self.num), i128::from(self.denom));
        let divisor = gcd(num.unsigned_abs(), denom.unsigned_abs()).max(1) as i128;
        let sign = denom.signum();
        match (
            i64::try_from(sign * num / divisor),
            i64::try_from(sign * denom / divisor),
        ) {
            (Ok(num), Ok(denom)) => Self { num, denom },
            _ => self,
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRationalError(String);

impl fmt::Display for ParseRationalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rational '{}'", self.0)
    }
}

impl std::error::Error for ParseRationalError {}

impl FromStr for Rational {
    type Err = ParseRationalError;

    /// Accepts `"n/d"` or a bare integer `"n"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRationalError(s.to_string());
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((num, denom)) => Ok(Rational::new(
                num.trim().parse().map_err(|_| err())?,
                denom.trim().parse().map_err(|_| err())?,
            )),
            None => Ok(Rational::new(trimmed.parse().map_err(|_| err())?, 1)),
        }
    }
}

fn scaled(value: f64, unit: &str, kilo: &str, mega: &str, giga: &str) -> String {
    if value < KIB {
        format!("{} {}", value as u64, unit)
    } else if value < MIB {
        format!("{:.2} {}", value / KIB, kilo)
    } else if value < GIB {
        format!("{:.2} {}", value / MIB, mega)
    } else {
        format!("{:.2} {}", value / GIB, giga)
    }
}

/// `512 B`, `1.50 KB`, `2.00 MB`, `1.00 GB`.
pub fn format_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => scaled(bytes as f64, "B", "KB", "MB", "GB"),
        None => UNKNOWN.to_string(),
    }
}

/// `45 sec`, `2 min 5 sec`, `1 hr 0 min 12 sec`.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| s.is_finite() && *s >= 0.0) else {
        return UNKNOWN.to_string();
    };
    let total = seconds as u64;
    if seconds < 60.0 {
        format!("{} sec", total)
    } else if seconds < 3600.0 {
        format!("{} min {} sec", total / 60, total % 60)
    } else {
        format!(
            "{} hr {} min {} sec",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

pub fn format_framerate(fps: Option<f64>) -> String {
    match fps {
        Some(fps) => format!("{:.2} fps", fps),
        None => UNKNOWN.to_string(),
    }
}

/// Same 1024 thresholds as [`format_size`].
pub fn format_bitrate(bits_per_second: Option<u64>) -> String {
    match bits_per_second {
        Some(bps) => scaled(bps as f64, "bps", "Kbps", "Mbps", "Gbps"),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_samplerate(hertz: Option<f64>) -> String {
    match hertz {
        Some(hz) => format!("{:.2} KHz", hz / 1000.0),
        None => UNKNOWN.to_string(),
    }
}

/// Whole seconds render as `N sec`, fractions as `1/N sec`.
pub fn format_exposure_time(exposure: Option<Rational>) -> String {
    let Some(exposure) = exposure.filter(|r| r.denom != 0).map(Rational::reduced) else {
        return UNKNOWN.to_string();
    };
    if exposure.denom == 1 {
        return format!("{} sec", exposure.num);
    }
    if exposure.num == 1 {
        return format!("1/{} sec", exposure.denom);
    }
    match exposure.to_f64() {
        Some(secs) if secs > 0.0 && secs < 1.0 => format!("1/{} sec", (1.0 / secs).round() as u64),
        Some(secs) => format!("{:.2} sec", secs),
        None => UNKNOWN.to_string(),
    }
}

/// One decimal below 10 mm, whole millimetres above.
pub fn format_focal_length(focal: Option<Rational>) -> String {
    match focal.and_then(Rational::to_f64) {
        Some(mm) if mm < 10.0 => format!("{:.1} mm", mm),
        Some(mm) => format!("{} mm", mm as i64),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_brightness_value(brightness: Option<Rational>) -> String {
    match brightness.and_then(Rational::to_f64) {
        Some(value) => format!("{:.2}", value),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_aperture_value(aperture: Option<Rational>) -> String {
    match aperture.and_then(Rational::to_f64) {
        Some(value) => format!("f/{:.2}", value),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_shutter_speed(speed: Option<Rational>) -> String {
    match speed.and_then(Rational::to_f64) {
        Some(secs) if secs >= 1.0 => format!("{} sec", secs as i64),
        Some(secs) if secs > 0.0 => format!("1/{} sec", (1.0 / secs).round() as u64),
        Some(_) => "0 sec".to_string(),
        None => UNKNOWN.to_string(),
    }
}

/// Degrees/minutes/seconds to degrees and decimal minutes, e.g. `37°46.4940'N`.
pub fn convert_gps(
    degrees: Option<f64>,
    minutes: Option<f64>,
    seconds: Option<f64>,
    direction: Option<&str>,
) -> String {
    match (degrees, minutes, seconds, direction) {
        (Some(degrees), Some(minutes), Some(seconds), Some(direction)) => {
            let decimal_minutes = minutes + seconds / 60.0;
            format!("{}°{:.4}'{}", degrees, decimal_minutes, direction)
        }
        _ => UNKNOWN.to_string(),
    }
}

/// Turns an ISO 6709 location such as `+37.7749-122.4194+010.000/` into a
/// map search link.
pub fn format_gps_iso6709(location: Option<&str>) -> String {
    let Some((latitude, longitude)) = location.and_then(split_iso6709) else {
        return UNKNOWN.to_string();
    };
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        latitude, longitude
    )
}

fn split_iso6709(location: &str) -> Option<(&str, &str)> {
    let body = location.trim().trim_end_matches('/');
    // Each component starts with an explicit sign.
    let starts: Vec<usize> = body
        .char_indices()
        .filter(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i)
        .collect();
    if starts.len() < 2 || starts[0] != 0 {
        return None;
    }
    let end = starts.get(2).copied().unwrap_or(body.len());
    let latitude = &body[starts[0]..starts[1]];
    let longitude = &body[starts[1]..end];
    let valid = |part: &str| part.len() > 1 && part[1..].parse::<f64>().is_ok();
    (valid(latitude) && valid(longitude)).then(|| {
        (
            latitude.trim_start_matches('+'),
            longitude.trim_start_matches('+'),
        )
    })
}
