//! Yaw-only line following law.
//!
//! `offset = gain * (center_x - centroid_x)`; offsets with magnitude below the
//! dead band become zero; the yaw command is `-offset` clamped to the
//! saturation limit. Forward speed is constant, lateral and vertical are zero.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Continuous velocity setpoint, each component in roughly [-100, 100].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    pub lateral: i32,
    pub forward: i32,
    pub vertical: i32,
    pub yaw: i32,
}

impl Velocity {
    pub const fn new(lateral: i32, forward: i32, vertical: i32, yaw: i32) -> Self {
        Self {
            lateral,
            forward,
            vertical,
            yaw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteeringLaw {
    pub gain: f64,
    /// Horizontal centre of the working frame.
    pub center_x: f64,
    pub dead_band: f64,
    pub saturation: f64,
    pub forward_speed: i32,
}

impl Default for SteeringLaw {
    fn default() -> Self {
        Self {
            gain: 0.3,
            center_x: 240.0,
            dead_band: 20.0,
            saturation: 100.0,
            forward_speed: 30,
        }
    }
}

impl SteeringLaw {
    pub fn validate(&self) -> Result<()> {
        if !(self.gain > 0.0) {
            return Err(anyhow!("steering gain must be positive"));
        }
        if !(self.dead_band >= 0.0 && self.dead_band < self.saturation) {
            return Err(anyhow!(
                "dead band {} must be in [0, saturation {})",
                self.dead_band,
                self.saturation
            ));
        }
        if self.saturation > 100.0 {
            return Err(anyhow!("saturation {} exceeds actuator range", self.saturation));
        }
        if self.forward_speed.abs() > 100 {
            return Err(anyhow!("forward speed {} exceeds actuator range", self.forward_speed));
        }
        Ok(())
    }

    /// Yaw rate for a centroid at `centroid_x`, within +/- saturation.
    pub fn yaw_rate(&self, centroid_x: i32) -> i32 {
        let offset = self.gain * (self.center_x - centroid_x as f64);
        let offset = if offset.abs() < self.dead_band {
            0.0
        } else {
            offset
        };
        (-offset).clamp(-self.saturation, self.saturation) as i32
    }

    /// Full setpoint for a centroid at `centroid_x`.
    pub fn velocity(&self, centroid_x: i32) -> Velocity {
        Velocity::new(0, self.forward_speed, 0, self.yaw_rate(centroid_x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_band_yields_zero() {
        let law = SteeringLaw::default();
        // |0.3 * (240 - x)| < 20  <=>  174 < x < 306
        for x in 174..=306 {
            let offset = 0.3 * (240.0 - x as f64);
            if offset.abs() < 20.0 {
                assert_eq!(law.yaw_rate(x), 0, "x={}", x);
            }
        }
        assert_eq!(law.yaw_rate(240), 0);
        assert_eq!(law.yaw_rate(200), 0);
        assert_eq!(law.yaw_rate(290), 0);
    }

    #[test]
    fn dead_band_edge_passes_through() {
        let law = SteeringLaw {
            gain: 1.0,
            ..SteeringLaw::default()
        };
        assert_eq!(law.yaw_rate(220), -20);
        assert_eq!(law.yaw_rate(221), 0);
    }

    #[test]
    fn offset_outside_dead_band_is_negated() {
        let law = SteeringLaw::default();
        assert_eq!(law.yaw_rate(0), -72);
        assert_eq!(law.yaw_rate(100), -42);
        assert_eq!(law.yaw_rate(99), -42);
        assert_eq!(law.yaw_rate(479), 71);
    }

    #[test]
    fn output_is_saturated() {
        let law = SteeringLaw::default();
        assert_eq!(law.yaw_rate(-1000), -100);
        assert_eq!(law.yaw_rate(2000), 100);
    }

    #[test]
    fn yaw_is_monotonic_in_centroid() {
        let law = SteeringLaw::default();
        let mut previous = law.yaw_rate(-2000);
        for x in -1999..2500 {
            let yaw = law.yaw_rate(x);
            assert!(yaw >= previous, "x={} yaw={} previous={}", x, yaw, previous);
            assert!((-100..=100).contains(&yaw));
            previous = yaw;
        }
    }

    #[test]
    fn velocity_is_forward_plus_yaw() {
        let law = SteeringLaw::default();
        assert_eq!(law.velocity(100), Velocity::new(0, 30, 0, -42));
        assert_eq!(law.velocity(240), Velocity::new(0, 30, 0, 0));
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let law = SteeringLaw {
            dead_band: 150.0,
            ..SteeringLaw::default()
        };
        assert!(law.validate().is_err());
        let law = SteeringLaw {
            gain: 0.0,
            ..SteeringLaw::default()
        };
        assert!(law.validate().is_err());
        assert!(SteeringLaw::default().validate().is_ok());
    }
}
