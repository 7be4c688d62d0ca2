//! Dead-reckoning from the Create's distance and angle packets
//!
//! Angles are in degrees with 0 pointing along +Y, so a straight run at
//! heading 0 grows `y` and a heading of 90 grows `x`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Accumulated pose, always read and written as a whole under one lock
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OdometryState {
    /// Total distance travelled (mm)
    pub distance_mm: i32,
    /// Heading (degrees), kept in (-360, 360)
    pub angle_deg: i32,
    /// Position (mm)
    pub x: f64,
    pub y: f64,
}

impl OdometryState {
    /// Apply one telemetry frame's deltas
    ///
    /// The heading is updated first; the frame's distance is then projected
    /// along the new heading.
    pub fn integrate(&mut self, distance: Option<i16>, angle: Option<i16>) {
        let distance = distance.map_or(0, i32::from);
        self.distance_mm = self.distance_mm.wrapping_add(distance);
        if let Some(angle) = angle {
            self.angle_deg = (self.angle_deg + i32::from(angle)) % 360;
        }

        let heading = f64::from(self.angle_deg).to_radians();
        self.x += f64::from(distance) * heading.sin();
        self.y += f64::from(distance) * heading.cos();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `<epochMillis>:<distMm>:<angleDeg>:<x>:<y>`
    pub fn format(&self, timestamp_ms: u128) -> String {
        format!(
            "{}:{}:{}:{:?}:{:?}",
            timestamp_ms, self.distance_mm, self.angle_deg, self.x, self.y
        )
    }
}

/// Wall-clock milliseconds since the Unix epoch
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
