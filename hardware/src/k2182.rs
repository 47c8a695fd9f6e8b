//! Keithley 2182/2182A nanovoltmeter driver.
//!
//! The meter is the sensor in every four-probe measurement: configured
//! once for DC voltage on one channel, then read with `:READ?` per sample.
//! The NPLC setting trades reading speed against line-noise rejection; a
//! `:READ?` at high NPLC can take several power-line cycles to return, so
//! the socket timeout is sized generously.

use std::net::ToSocketAddrs;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::info;

use sweep::{HardwareResult, Sensor};

use crate::scpi::{ScpiDevice, ScpiResult};

/// Channel name the meter reports through the [`Sensor`] trait.
pub const VOLTAGE_CHANNEL: &str = "Voltage (V)";

/// Driver for the Keithley 2182 nanovoltmeter.
pub struct K2182 {
    device: ScpiDevice,
}

impl K2182 {
    /// Connect and log the instrument identification.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> ScpiResult<Self> {
        let mut device = ScpiDevice::connect(addr)?;
        device.set_timeout(Duration::from_secs(10))?;
        let idn = device.idn()?;
        info!("Connected to: {}", idn);
        Ok(Self { device })
    }

    /// Reset to power-up settings.
    pub fn reset(&mut self) -> ScpiResult<()> {
        self.device.reset()
    }

    /// Configure DC voltage measurement on one input channel.
    ///
    /// `nplc` is the integration time in power-line cycles (0.1 / 1 / 10);
    /// more cycles means slower but quieter readings.
    pub fn configure_voltage(&mut self, channel: u8, nplc: f64) -> ScpiResult<()> {
        self.device.command(":SENS:FUNC 'VOLT'")?;
        self.device.command(&format!(":SENS:CHAN {channel}"))?;
        self.device.command(":SENS:VOLT:RANG:AUTO ON")?;
        self.device.command(&format!(":SENS:VOLT:NPLC {nplc}"))
    }

    /// Trigger and fetch one voltage reading.
    pub fn read_voltage(&mut self) -> ScpiResult<f64> {
        let response = self.device.query(":READ?")?;
        ScpiDevice::parse_f64(&response)
    }
}

impl Sensor for K2182 {
    fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
        let voltage = self.read_voltage()?;
        Ok(IndexMap::from([(VOLTAGE_CHANNEL.to_string(), voltage)]))
    }
}
