//! TSL2561 ambient light sensor (I2C)
//!
//! The conversion from raw channel counts to lux follows the datasheet
//! approximation for the T/FN/CL package. It is kept as a pure function so it
//! can be checked on any host; bus access needs the `hardware` feature.

use std::time::Duration;

/// Default I2C address (ADDR pin floating)
pub const DEFAULT_ADDRESS: u16 = 0x39;

/// Analog gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Low,
    High,
}

impl Gain {
    fn timing_bits(self) -> u8 {
        match self {
            Gain::Low => 0x00,
            Gain::High => 0x10,
        }
    }

    /// Factor that brings counts to the 16x reference used by the datasheet
    fn scale(self) -> f64 {
        match self {
            Gain::Low => 16.0,
            Gain::High => 1.0,
        }
    }
}

/// ADC integration window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationTime {
    Ms13,
    Ms101,
    Ms402,
}

impl IntegrationTime {
    fn timing_bits(self) -> u8 {
        match self {
            IntegrationTime::Ms13 => 0x00,
            IntegrationTime::Ms101 => 0x01,
            IntegrationTime::Ms402 => 0x02,
        }
    }

    /// Factor that brings counts to the 402 ms reference used by the datasheet
    fn scale(self) -> f64 {
        match self {
            IntegrationTime::Ms13 => 402.0 / 13.7,
            IntegrationTime::Ms101 => 402.0 / 101.0,
            IntegrationTime::Ms402 => 1.0,
        }
    }

    /// Time to wait for a fresh conversion (window plus margin)
    pub fn settle_time(self) -> Duration {
        match self {
            IntegrationTime::Ms13 => Duration::from_millis(15),
            IntegrationTime::Ms101 => Duration::from_millis(120),
            IntegrationTime::Ms402 => Duration::from_millis(450),
        }
    }

    /// Raw count at which channel 0 saturates
    fn clip_threshold(self) -> u16 {
        match self {
            IntegrationTime::Ms13 => 4900,
            IntegrationTime::Ms101 => 37000,
            IntegrationTime::Ms402 => 65000,
        }
    }
}

/// Convert raw broadband (`ch0`) and infrared (`ch1`) counts to lux.
///
/// Returns `None` when either channel is saturated.
pub fn calculate_lux(ch0: u16, ch1: u16, gain: Gain, integration: IntegrationTime) -> Option<f64> {
    let clip = integration.clip_threshold();
    if ch0 > clip || ch1 > clip {
        return None;
    }
    if ch0 == 0 {
        return Some(0.0);
    }

    let scale = gain.scale() * integration.scale();
    let broadband = f64::from(ch0) * scale;
    let infrared = f64::from(ch1) * scale;
    let ratio = infrared / broadband;

    let lux = if ratio <= 0.50 {
        0.0304 * broadband - 0.062 * broadband * ratio.powf(1.4)
    } else if ratio <= 0.61 {
        0.0224 * broadband - 0.031 * infrared
    } else if ratio <= 0.80 {
        0.0128 * broadband - 0.0153 * infrared
    } else if ratio <= 1.30 {
        0.00146 * broadband - 0.00112 * infrared
    } else {
        0.0
    };

    Some(lux.max(0.0))
}

/// Value written to the timing register
pub fn timing_register(gain: Gain, integration: IntegrationTime) -> u8 {
    gain.timing_bits() | integration.timing_bits()
}

#[cfg(feature = "hardware")]
pub use driver::Tsl2561;

#[cfg(feature = "hardware")]
mod driver {
    use super::*;
    use crate::sensor::{LightSensor, SensorError};
    use rppal::i2c::I2c;

    const COMMAND_BIT: u8 = 0x80;
    const WORD_BIT: u8 = 0x20;
    const REGISTER_CONTROL: u8 = 0x00;
    const REGISTER_TIMING: u8 = 0x01;
    const REGISTER_CHAN0_LOW: u8 = 0x0C;
    const REGISTER_CHAN1_LOW: u8 = 0x0E;
    const CONTROL_POWER_ON: u8 = 0x03;

    /// TSL2561 on a Raspberry Pi I2C bus
    pub struct Tsl2561 {
        i2c: I2c,
        gain: Gain,
        integration: IntegrationTime,
    }

    impl Tsl2561 {
        /// Open the bus, power the sensor up and configure 1x gain / 402 ms
        pub fn open(bus: u8, address: u16) -> Result<Self, SensorError> {
            let mut i2c = I2c::with_bus(bus).map_err(|e| {
                SensorError::HardwareUnavailable(format!("I2C bus {bus} unavailable: {e}"))
            })?;
            i2c.set_slave_address(address).map_err(|e| {
                SensorError::HardwareUnavailable(format!(
                    "TSL2561 address 0x{address:02X} rejected: {e}"
                ))
            })?;

            let sensor = Self {
                i2c,
                gain: Gain::Low,
                integration: IntegrationTime::Ms402,
            };
            sensor.configure().map_err(|e| {
                SensorError::HardwareUnavailable(format!(
                    "TSL2561 not responding at 0x{address:02X}: {e}"
                ))
            })?;
            Ok(sensor)
        }

        fn configure(&self) -> Result<(), rppal::i2c::Error> {
            self.i2c
                .smbus_write_byte(COMMAND_BIT | REGISTER_CONTROL, CONTROL_POWER_ON)?;
            self.i2c.smbus_write_byte(
                COMMAND_BIT | REGISTER_TIMING,
                timing_register(self.gain, self.integration),
            )
        }

        fn read_channels(&self) -> Result<(u16, u16), rppal::i2c::Error> {
            let ch0 = self
                .i2c
                .smbus_read_word(COMMAND_BIT | WORD_BIT | REGISTER_CHAN0_LOW)?;
            let ch1 = self
                .i2c
                .smbus_read_word(COMMAND_BIT | WORD_BIT | REGISTER_CHAN1_LOW)?;
            Ok((ch0, ch1))
        }
    }

    impl LightSensor for Tsl2561 {
        fn read_lux(&mut self) -> Result<f64, SensorError> {
            std::thread::sleep(self.integration.settle_time());
            let (ch0, ch1) = self
                .read_channels()
                .map_err(|e| SensorError::Bus(format!("TSL2561 read failed: {e}")))?;

            calculate_lux(ch0, ch1, self.gain, self.integration).ok_or_else(|| {
                SensorError::Bus(format!("TSL2561 saturated (ch0={ch0}, ch1={ch1})"))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_reads_zero() {
        assert_eq!(
            calculate_lux(0, 0, Gain::Low, IntegrationTime::Ms402),
            Some(0.0)
        );
    }

    #[test]
    fn test_low_ratio_segment() {
        // ratio 0 -> 0.0304 * ch0 at the 16x/402ms reference
        let lux = calculate_lux(1000, 0, Gain::High, IntegrationTime::Ms402).unwrap();
        assert!((lux - 30.4).abs() < 1e-9);
    }

    #[test]
    fn test_low_gain_scales_by_sixteen() {
        let high = calculate_lux(100, 10, Gain::High, IntegrationTime::Ms402).unwrap();
        let low = calculate_lux(100, 10, Gain::Low, IntegrationTime::Ms402).unwrap();
        assert!((low - high * 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_mid_ratio_segment() {
        // ratio 0.7 -> 0.0128 * ch0 - 0.0153 * ch1
        let lux = calculate_lux(1000, 700, Gain::High, IntegrationTime::Ms402).unwrap();
        assert!((lux - (12.8 - 10.71)).abs() < 1e-9);
    }

    #[test]
    fn test_infrared_dominated_reads_zero() {
        assert_eq!(
            calculate_lux(100, 200, Gain::High, IntegrationTime::Ms402),
            Some(0.0)
        );
    }

    #[test]
    fn test_saturation_detected() {
        assert_eq!(
            calculate_lux(65535, 100, Gain::Low, IntegrationTime::Ms402),
            None
        );
        assert_eq!(
            calculate_lux(5000, 100, Gain::Low, IntegrationTime::Ms13),
            None
        );
    }

    #[test]
    fn test_timing_register_bits() {
        assert_eq!(timing_register(Gain::Low, IntegrationTime::Ms402), 0x02);
        assert_eq!(timing_register(Gain::High, IntegrationTime::Ms13), 0x10);
    }
}
