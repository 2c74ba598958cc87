//! Differential drive mixing between (translate, rotate) and wheel power.
//!
//! Velocities are unitless in [-1, 1]. Wheel power is the same range shifted
//! by one and scaled by 100, so 0 is full reverse, 100 is stopped and 200 is
//! full forward.

use crate::error::EncodingError;

const POWER_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelPower {
    pub left: f64,
    pub right: f64,
}

impl WheelPower {
    /// `SET_MOTORS` operands: right wheel first. Fractions are truncated.
    pub fn operands(&self) -> [i64; 2] {
        [self.right as i64, self.left as i64]
    }
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn to_power(v: f64) -> f64 {
    (v + 1.0) * POWER_SCALE
}

fn from_power(p: f64) -> f64 {
    p / POWER_SCALE - 1.0
}

pub fn mix(translate: f64, rotate: f64) -> WheelPower {
    let left = clamp_unit(translate - rotate);
    let right = clamp_unit(translate + rotate);

    WheelPower {
        left: to_power(left),
        right: to_power(right),
    }
}

/// Inverse of [`mix`] for unclamped values.
pub fn unmix(left_power: f64, right_power: f64) -> (f64, f64) {
    motors(from_power(left_power), from_power(right_power))
}

/// Wheel velocities to (translate, rotate).
pub fn motors(left: f64, right: f64) -> (f64, f64) {
    ((left + right) / 2.0, (right - left) / 2.0)
}

pub fn check_finite(values: &[f64]) -> Result<(), EncodingError> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&v) => Err(EncodingError::NonFinite(v)),
        None => Ok(()),
    }
}

/// Last commanded velocities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    pub translate: f64,
    pub rotate: f64,
}

impl MotionState {
    pub fn power(&self) -> WheelPower {
        mix(self.translate, self.rotate)
    }

    pub fn is_stopped(&self) -> bool {
        self.translate == 0.0 && self.rotate == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn straight_and_spin() {
        assert_eq!(
            mix(1.0, 0.0),
            WheelPower {
                left: 200.0,
                right: 200.0
            }
        );
        assert_eq!(
            mix(0.0, 0.0),
            WheelPower {
                left: 100.0,
                right: 100.0
            }
        );
        assert_eq!(
            mix(0.0, 1.0),
            WheelPower {
                left: 0.0,
                right: 200.0
            }
        );
    }

    #[test]
    fn clamped_power() {
        let power = mix(0.5, 0.5);
        assert_eq!(power.left, 100.0);
        assert_eq!(power.right, 200.0);
        assert_eq!(power.operands(), [200, 100]);

        let power = mix(-5.0, 3.0);
        assert_eq!(power.left, 0.0);
        assert_eq!(power.right, 0.0);
    }

    #[test]
    fn operands_truncate() {
        let power = mix(0.123, 0.0);
        assert_eq!(power.operands(), [112, 112]);
    }

    #[test]
    fn wheel_velocities() {
        assert_eq!(motors(1.0, 1.0), (1.0, 0.0));
        assert_eq!(motors(-1.0, 1.0), (0.0, 1.0));
        assert_eq!(motors(0.5, 0.0), (0.25, -0.25));
    }

    #[test]
    fn non_finite_rejected() {
        assert!(check_finite(&[0.5, -1.0]).is_ok());
        assert!(matches!(
            check_finite(&[0.5, f64::INFINITY]),
            Err(EncodingError::NonFinite(v)) if v.is_infinite()
        ));
        assert!(check_finite(&[f64::NAN]).is_err());
    }

    proptest! {
        #[test]
        fn unmix_inverts_mix(translate in -1.0f64..=1.0, rotate in -1.0f64..=1.0) {
            let power = mix(translate, rotate);
            prop_assert!((0.0..=200.0).contains(&power.left));
            prop_assert!((0.0..=200.0).contains(&power.right));

            let left = (translate - rotate).clamp(-1.0, 1.0);
            let right = (translate + rotate).clamp(-1.0, 1.0);
            let (t, r) = unmix(power.left, power.right);
            prop_assert!((t - (left + right) / 2.0).abs() < EPS);
            prop_assert!((r - (right - left) / 2.0).abs() < EPS);

            if (translate - rotate).abs() <= 1.0 && (translate + rotate).abs() <= 1.0 {
                prop_assert!((t - translate).abs() < EPS);
                prop_assert!((r - rotate).abs() < EPS);
            }
        }

        #[test]
        fn mixing_is_idempotent_after_clamp(translate in -3.0f64..=3.0, rotate in -3.0f64..=3.0) {
            let power = mix(translate, rotate);
            let (t, r) = unmix(power.left, power.right);
            let again = mix(t, r);
            prop_assert!((again.left - power.left).abs() < EPS);
            prop_assert!((again.right - power.right).abs() < EPS);
        }
    }
}
