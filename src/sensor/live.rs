//! Hardware-backed sensor source
//!
//! The light sensor is read once per cycle. The humidity/temperature sensor
//! is flaky by nature: it is re-read after a fixed delay until it reports a
//! valid frame. There is no attempt cap; the wait ends only on a
//! valid read or on shutdown.
//!
//! Driver calls sleep and busy-wait, so they run on the blocking pool.

use super::{SensorError, SensorReading, SensorSource};
use crate::config::SensorsSection;
use crate::shutdown::{interruptible_sleep, ShutdownRx};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Illuminance sensor driver
pub trait LightSensor: Send {
    fn read_lux(&mut self) -> Result<f64, SensorError>;
}

/// Combined humidity/temperature sensor driver
pub trait HumidityTemperatureSensor: Send {
    /// Perform one read. Bus failures are reported as an invalid reading.
    fn read(&mut self) -> HumidityReading;
}

/// One humidity/temperature sample plus the sensor's validity flag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityReading {
    pub temperature: f64,
    pub humidity: f64,
    pub valid: bool,
}

impl HumidityReading {
    pub fn valid(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
            valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            valid: false,
        }
    }
}

/// Run one driver call on the blocking pool
async fn blocking_read<D, T, F>(driver: &Arc<Mutex<D>>, read: F) -> Result<T, SensorError>
where
    D: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut D) -> T + Send + 'static,
{
    let driver = Arc::clone(driver);
    tokio::task::spawn_blocking(move || -> Result<T, SensorError> {
        let mut guard = driver
            .lock()
            .map_err(|_| SensorError::Bus("sensor driver lock poisoned".to_string()))?;
        Ok(read(&mut *guard))
    })
    .await
    .map_err(|e| SensorError::Bus(format!("sensor read task failed: {e}")))?
}

/// Sensor source reading real peripherals
pub struct LiveSensorSource<L, H> {
    light: Arc<Mutex<L>>,
    climate: Arc<Mutex<H>>,
    retry_delay: Duration,
}

impl<L, H> LiveSensorSource<L, H>
where
    L: LightSensor + 'static,
    H: HumidityTemperatureSensor + 'static,
{
    pub fn new(light: L, climate: H, retry_delay: Duration) -> Self {
        Self {
            light: Arc::new(Mutex::new(light)),
            climate: Arc::new(Mutex::new(climate)),
            retry_delay,
        }
    }

    /// Read the humidity sensor until it reports a valid frame
    async fn read_until_valid(
        &mut self,
        shutdown: &ShutdownRx,
    ) -> Result<HumidityReading, SensorError> {
        let mut attempt = 1u32;
        loop {
            let reading = blocking_read(&self.climate, |sensor| sensor.read()).await?;
            if reading.valid {
                if attempt > 1 {
                    debug!(attempts = attempt, "Humidity sensor returned a valid reading");
                }
                return Ok(reading);
            }

            debug!(
                attempt = attempt,
                retry_delay_ms = self.retry_delay.as_millis() as u64,
                "Invalid humidity sensor reading, retrying"
            );

            if !interruptible_sleep(shutdown.clone(), self.retry_delay).await {
                warn!(attempts = attempt, "Shutdown requested while waiting for humidity sensor");
                return Err(SensorError::Cancelled);
            }
            attempt = attempt.saturating_add(1);
        }
    }
}

#[async_trait]
impl<L, H> SensorSource for LiveSensorSource<L, H>
where
    L: LightSensor + 'static,
    H: HumidityTemperatureSensor + 'static,
{
    async fn acquire(&mut self, shutdown: &ShutdownRx) -> Result<SensorReading, SensorError> {
        let lux = blocking_read(&self.light, |sensor| sensor.read_lux()).await??;
        let climate = self.read_until_valid(shutdown).await?;

        Ok(SensorReading {
            lux,
            temperature: climate.temperature,
            humidity: climate.humidity,
        })
    }

    fn is_demo(&self) -> bool {
        false
    }
}

/// Open the Raspberry Pi peripherals described by `config`
#[cfg(feature = "hardware")]
pub fn open_hardware(config: &SensorsSection) -> Result<Box<dyn SensorSource>, SensorError> {
    use super::dht11::Dht11;
    use super::tsl2561::Tsl2561;

    let light = Tsl2561::open(config.i2c_bus, config.tsl2561_address)?;
    let climate = Dht11::open(config.dht11_gpio_pin)?;

    Ok(Box::new(LiveSensorSource::new(
        light,
        climate,
        Duration::from_millis(config.retry_delay_ms),
    )))
}

/// Without the `hardware` feature there is no peripheral access at all
#[cfg(not(feature = "hardware"))]
pub fn open_hardware(_config: &SensorsSection) -> Result<Box<dyn SensorSource>, SensorError> {
    Err(SensorError::HardwareUnavailable(
        "built without the `hardware` feature; GPIO/I2C are unavailable. Please add option \"--demo\"."
            .to_string(),
    ))
}
