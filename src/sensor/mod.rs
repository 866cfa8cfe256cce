//! Sensor acquisition
//!
//! A [`SensorSource`] produces one [`SensorReading`] per poll cycle. Two
//! variants exist: [`DemoSensorSource`] returns fixed synthetic values without
//! touching any hardware, [`LiveSensorSource`] reads the TSL2561 light sensor
//! and the DHT11 humidity/temperature sensor of a Raspberry Pi.

pub mod dht11;
pub mod live;
pub mod tsl2561;

pub use live::{HumidityReading, HumidityTemperatureSensor, LightSensor, LiveSensorSource};

use crate::config::SensorsSection;
use crate::shutdown::ShutdownRx;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Snapshot of all sensor values for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    /// Illuminance in lux
    pub lux: f64,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
}

/// Sensor layer errors
#[derive(Debug, Error)]
pub enum SensorError {
    /// Required hardware interface cannot be opened (fatal at startup)
    #[error("{0}")]
    HardwareUnavailable(String),
    /// A single bus transaction failed; the current cycle is skipped
    #[error("Sensor bus error: {0}")]
    Bus(String),
    /// Shutdown was requested while waiting for a valid reading
    #[error("Sensor acquisition cancelled by shutdown")]
    Cancelled,
}

/// Capability to produce a reading on demand
#[async_trait]
pub trait SensorSource: Send {
    /// Acquire a complete reading, blocking until every component is valid.
    ///
    /// Returns [`SensorError::Cancelled`] if `shutdown` fires while waiting.
    async fn acquire(&mut self, shutdown: &ShutdownRx) -> Result<SensorReading, SensorError>;

    /// Whether this source serves synthetic data
    fn is_demo(&self) -> bool;
}

/// Fixed synthetic readings for running without hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoSensorSource;

impl DemoSensorSource {
    pub const READING: SensorReading = SensorReading {
        lux: 123.45,
        temperature: 12.34,
        humidity: 45.67,
    };

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SensorSource for DemoSensorSource {
    async fn acquire(&mut self, _shutdown: &ShutdownRx) -> Result<SensorReading, SensorError> {
        Ok(Self::READING)
    }

    fn is_demo(&self) -> bool {
        true
    }
}

/// Build the sensor source selected on the command line.
///
/// Live mode opens the hardware immediately so a missing bus fails startup
/// instead of the first cycle.
pub fn open_sensor_source(
    demo: bool,
    config: &SensorsSection,
) -> Result<Box<dyn SensorSource>, SensorError> {
    if demo {
        tracing::info!("Demo mode: publishing fixed sensor readings");
        return Ok(Box::new(DemoSensorSource::new()));
    }

    let source = live::open_hardware(config)?;
    tracing::info!(
        i2c_bus = config.i2c_bus,
        tsl2561_address = format_args!("0x{:02X}", config.tsl2561_address),
        dht11_gpio_pin = config.dht11_gpio_pin,
        "Live sensors initialized"
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;

    #[tokio::test]
    async fn test_demo_source_is_deterministic() {
        let (_tx, rx) = shutdown_channel();
        let mut source = DemoSensorSource::new();

        for _ in 0..5 {
            let reading = source.acquire(&rx).await.unwrap();
            assert_eq!(reading.lux, 123.45);
            assert_eq!(reading.temperature, 12.34);
            assert_eq!(reading.humidity, 45.67);
        }
        assert!(source.is_demo());
    }

    #[tokio::test]
    async fn test_demo_source_ignores_shutdown() {
        let (tx, rx) = shutdown_channel();
        tx.send(true).unwrap();

        let mut source = DemoSensorSource::new();
        assert_eq!(
            source.acquire(&rx).await.unwrap(),
            DemoSensorSource::READING
        );
    }

    #[test]
    fn test_open_demo_source() {
        let source = open_sensor_source(true, &SensorsSection::default()).unwrap();
        assert!(source.is_demo());
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_open_live_source_without_hardware_support_fails() {
        let result = open_sensor_source(false, &SensorsSection::default());
        match result {
            Err(SensorError::HardwareUnavailable(message)) => {
                assert!(message.contains("--demo"));
            }
            _ => panic!("live source must not open without hardware support"),
        }
    }
}
