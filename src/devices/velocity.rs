use serde::{Deserialize, Serialize};

use crate::utils::error::ModbusError;

/// Three implied decimal digits in the fractional register.
pub const FRACTION_SCALE: f64 = 1000.0;
/// Six (integer, fraction) pairs.
pub const VELOCITY_REGISTER_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Twist {
    /// Components in register-pair order: linear x, y, z then angular x, y, z.
    pub fn components(&self) -> [(&'static str, f64); 6] {
        [
            ("linear.x", self.linear.x),
            ("linear.y", self.linear.y),
            ("linear.z", self.linear.z),
            ("angular.x", self.angular.x),
            ("angular.y", self.angular.y),
            ("angular.z", self.angular.z),
        ]
    }
}

/// Combines an integer register and a thousandths register into one value.
///
/// A zero integer part cannot carry a sign, so in that case a negative
/// fraction alone encodes values in (-1.0, 0.0). Otherwise the fraction is
/// added as-is, so `(-2, 500)` yields `-1.5`.
pub fn to_float(integer_part: i16, fractional_part: i16) -> f64 {
    if integer_part == 0 && fractional_part < 0 {
        f64::from(fractional_part) / FRACTION_SCALE
    } else {
        f64::from(integer_part) + f64::from(fractional_part) / FRACTION_SCALE
    }
}

/// Converts the first twelve registers into a twist. Extra registers are ignored.
pub fn convert(registers: &[i16]) -> Result<Twist, ModbusError> {
    if registers.len() < VELOCITY_REGISTER_COUNT {
        return Err(ModbusError::InvalidRegisterCount {
            expected: VELOCITY_REGISTER_COUNT,
            actual: registers.len(),
        });
    }

    let pair = |i: usize| to_float(registers[2 * i], registers[2 * i + 1]);

    Ok(Twist {
        linear: Vector3 {
            x: pair(0),
            y: pair(1),
            z: pair(2),
        },
        angular: Vector3 {
            x: pair(3),
            y: pair(4),
            z: pair(5),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float_cases() {
        assert_eq!(to_float(0, -500), -0.5);
        assert_eq!(to_float(2, 500), 2.5);
        assert_eq!(to_float(-2, 500), -1.5);
        assert_eq!(to_float(0, 0), 0.0);
        assert_eq!(to_float(0, 250), 0.25);
        assert_eq!(to_float(-1, -250), -1.25);
    }

    #[test]
    fn test_convert_pair_order() {
        let registers = [0, -500, 2, 500, 1, 250, 0, 0, -1, -250, 3, 0];
        let twist = convert(&registers).unwrap();
        assert_eq!(twist.linear, Vector3 { x: -0.5, y: 2.5, z: 1.25 });
        assert_eq!(twist.angular, Vector3 { x: 0.0, y: -1.25, z: 3.0 });
    }

    #[test]
    fn test_convert_ignores_extra_registers() {
        let mut registers = vec![1i16; 12];
        registers.extend_from_slice(&[99, 99]);
        let twist = convert(&registers).unwrap();
        assert!(twist.components().iter().all(|(_, v)| (*v - 1.001).abs() < 1e-12));
    }

    #[test]
    fn test_convert_too_few_registers() {
        match convert(&[0i16; 11]) {
            Err(ModbusError::InvalidRegisterCount { expected, actual }) => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 11);
            }
            other => panic!("expected InvalidRegisterCount, got {:?}", other),
        }
        assert!(convert(&[]).is_err());
    }
}
