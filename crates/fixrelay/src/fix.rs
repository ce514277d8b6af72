//! Location fixes as produced by a sensor source.

use serde::Deserialize;
use serde::Serialize;

/// One coordinate fix.
///
/// Each optional dimension is `None` when the producing source does not support
/// it. Accuracy, course and speed values are non-negative when present.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub horizontal_accuracy: Option<f64>,
    pub vertical_accuracy: Option<f64>,
    pub course: Option<f64>,
    pub course_accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub speed_accuracy: Option<f64>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, ..Self::default() }
    }

    pub fn with_altitude(mut self, meters: f64) -> Self {
        self.altitude = Some(meters);
        self
    }

    pub fn with_horizontal_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = non_negative(meters);
        self
    }

    pub fn with_vertical_accuracy(mut self, meters: f64) -> Self {
        self.vertical_accuracy = non_negative(meters);
        self
    }

    pub fn with_course(mut self, degrees: f64) -> Self {
        self.course = non_negative(degrees);
        self
    }

    pub fn with_course_accuracy(mut self, degrees: f64) -> Self {
        self.course_accuracy = non_negative(degrees);
        self
    }

    pub fn with_speed(mut self, meters_per_second: f64) -> Self {
        self.speed = non_negative(meters_per_second);
        self
    }

    pub fn with_speed_accuracy(mut self, meters_per_second: f64) -> Self {
        self.speed_accuracy = non_negative(meters_per_second);
        self
    }
}

/// A negative reading would collide with the `-1.0` "unsupported" sentinel on the
/// wire, so it is recorded as unsupported instead.
fn non_negative(v: f64) -> Option<f64> {
    (v >= 0.0).then_some(v)
}

/// Which accuracy dimensions the host platform can report at all.
///
/// A dimension is sent only when both the source and the platform support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCaps {
    pub vertical_accuracy: bool,
    pub course_accuracy: bool,
    pub speed_accuracy: bool,
}

impl Default for PlatformCaps {
    fn default() -> Self {
        Self {
            vertical_accuracy: true,
            course_accuracy: true,
            speed_accuracy: true,
        }
    }
}

impl PlatformCaps {
    /// A platform that reports none of the extended accuracy dimensions.
    pub fn basic() -> Self {
        Self {
            vertical_accuracy: false,
            course_accuracy: false,
            speed_accuracy: false,
        }
    }
}
