//! DHT11 humidity/temperature sensor (single-wire GPIO)
//!
//! The host pulls the data line low to request a sample, then the sensor
//! answers with 40 bits whose value is encoded in the width of each high
//! pulse (~26 µs for 0, ~70 µs for 1). Userspace timing on Linux is jittery,
//! so instead of fixed thresholds the bit boundary is the midpoint between the
//! shortest and longest high pulse observed in the frame. Corrupted frames are
//! caught by the checksum and reported as invalid readings.

use super::live::HumidityReading;
use std::time::Duration;

/// Bits in one DHT11 transmission
pub const FRAME_BITS: usize = 40;

/// Why a captured pulse train could not be turned into a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    MissingData { pulses: usize },
    Checksum { expected: u8, actual: u8 },
}

/// Decode the high-pulse widths of one transmission into five bytes.
///
/// Leading pulses (the sensor's response preamble) are skipped; only the last
/// [`FRAME_BITS`] pulses are decoded.
pub fn decode_pulses(high_pulses: &[Duration]) -> Result<[u8; 5], FrameError> {
    if high_pulses.len() < FRAME_BITS {
        return Err(FrameError::MissingData {
            pulses: high_pulses.len(),
        });
    }

    let data = &high_pulses[high_pulses.len() - FRAME_BITS..];
    let shortest = data.iter().min().copied().unwrap_or_default();
    let longest = data.iter().max().copied().unwrap_or_default();
    let threshold = shortest + (longest - shortest) / 2;

    let mut frame = [0u8; 5];
    for (index, pulse) in data.iter().enumerate() {
        if *pulse > threshold {
            frame[index / 8] |= 1 << (7 - index % 8);
        }
    }

    Ok(frame)
}

/// Verify the checksum byte of a frame
pub fn verify_checksum(frame: &[u8; 5]) -> Result<(), FrameError> {
    let expected = frame[..4]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    if expected != frame[4] {
        return Err(FrameError::Checksum {
            expected,
            actual: frame[4],
        });
    }
    Ok(())
}

/// Convert a frame to a reading; a bad checksum yields an invalid reading
pub fn parse_frame(frame: &[u8; 5]) -> HumidityReading {
    if verify_checksum(frame).is_err() {
        return HumidityReading::invalid();
    }

    let humidity = f64::from(frame[0]) + f64::from(frame[1]) / 10.0;
    let temperature = f64::from(frame[2]) + f64::from(frame[3]) / 10.0;
    HumidityReading::valid(temperature, humidity)
}

/// Full decode path from captured pulses to a reading
pub fn reading_from_pulses(high_pulses: &[Duration]) -> HumidityReading {
    match decode_pulses(high_pulses) {
        Ok(frame) => parse_frame(&frame),
        Err(e) => {
            tracing::trace!(error = ?e, "DHT11 frame incomplete");
            HumidityReading::invalid()
        }
    }
}

#[cfg(feature = "hardware")]
pub use driver::Dht11;

#[cfg(feature = "hardware")]
mod driver {
    use super::*;
    use crate::sensor::{HumidityTemperatureSensor, SensorError};
    use rppal::gpio::{Gpio, IoPin, Mode, PullUpDown};
    use std::time::Instant;

    /// Whole transmission fits comfortably in this window
    const CAPTURE_WINDOW: Duration = Duration::from_millis(10);
    const START_SIGNAL_LOW: Duration = Duration::from_millis(20);

    /// DHT11 on a BCM GPIO pin
    pub struct Dht11 {
        pin: IoPin,
    }

    impl Dht11 {
        pub fn open(bcm_pin: u8) -> Result<Self, SensorError> {
            let gpio = Gpio::new()
                .map_err(|e| SensorError::HardwareUnavailable(format!("GPIO unavailable: {e}")))?;
            let pin = gpio
                .get(bcm_pin)
                .map_err(|e| {
                    SensorError::HardwareUnavailable(format!("GPIO pin {bcm_pin} unavailable: {e}"))
                })?
                .into_io(Mode::Output);
            Ok(Self { pin })
        }

        fn request_sample(&mut self) {
            self.pin.set_mode(Mode::Output);
            self.pin.set_low();
            std::thread::sleep(START_SIGNAL_LOW);
            self.pin.set_high();
            self.pin.set_mode(Mode::Input);
            self.pin.set_pullupdown(PullUpDown::PullUp);
        }

        /// Busy-wait on the line and record the width of every high pulse
        fn capture_high_pulses(&self) -> Vec<Duration> {
            let mut pulses = Vec::with_capacity(FRAME_BITS + 2);
            let deadline = Instant::now() + CAPTURE_WINDOW;
            let mut level = self.pin.is_high();
            let mut edge = Instant::now();

            while Instant::now() < deadline {
                let current = self.pin.is_high();
                if current != level {
                    let now = Instant::now();
                    if level {
                        pulses.push(now - edge);
                    }
                    edge = now;
                    level = current;
                }
            }
            pulses
        }
    }

    impl HumidityTemperatureSensor for Dht11 {
        fn read(&mut self) -> HumidityReading {
            self.request_sample();
            let pulses = self.capture_high_pulses();
            reading_from_pulses(&pulses)
        }
    }
}
