//! Wire payload for `onLocationUpdate`.
//!
//! Every key is present on every dispatch. Unsupported dimensions carry a sentinel:
//! `0.0` for altitude, `-1.0` for everything else.

use fixrpc::Value;

use crate::fix::LocationFix;
use crate::fix::PlatformCaps;

pub const LAT: &str = "lat";
pub const LON: &str = "lon";
pub const ALT: &str = "alt";
pub const HORIZONTAL_ACCURACY: &str = "horizontal_accuracy";
pub const VERTICAL_ACCURACY: &str = "vertical_accuracy";
pub const COURSE: &str = "course";
pub const COURSE_ACCURACY: &str = "course_accuracy";
pub const SPEED: &str = "speed";
pub const SPEED_ACCURACY: &str = "speed_accuracy";
pub const LOGGING_ENABLED: &str = "logging_enabled";

/// Marks a dimension the source or platform cannot report.
pub const UNSUPPORTED: f64 = -1.0;

const NO_ALTITUDE: f64 = 0.0;

/// Builds the payload map for one fix.
pub fn encode_fix(fix: &LocationFix, caps: &PlatformCaps, logging_enabled: bool) -> Value {
    let gated = |supported: bool, v: Option<f64>| if supported { v } else { None };

    Value::map([
        (LAT, Value::F64(fix.latitude)),
        (LON, Value::F64(fix.longitude)),
        (ALT, Value::F64(fix.altitude.unwrap_or(NO_ALTITUDE))),
        (HORIZONTAL_ACCURACY, sentinel(fix.horizontal_accuracy)),
        (VERTICAL_ACCURACY, sentinel(gated(caps.vertical_accuracy, fix.vertical_accuracy))),
        (COURSE, sentinel(fix.course)),
        (COURSE_ACCURACY, sentinel(gated(caps.course_accuracy, fix.course_accuracy))),
        (SPEED, sentinel(fix.speed)),
        (SPEED_ACCURACY, sentinel(gated(caps.speed_accuracy, fix.speed_accuracy))),
        (LOGGING_ENABLED, Value::Bool(logging_enabled)),
    ])
}

fn sentinel(v: Option<f64>) -> Value {
    Value::F64(v.unwrap_or(UNSUPPORTED))
}
