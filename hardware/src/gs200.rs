//! Yokogawa GS200 programmable DC source driver.
//!
//! Supplies the fixed excitation current in four-probe sweeps and acts as
//! the swept axis in IV staircases. A programmed source has no physical
//! settling to speak of: the readback is the level query, so a sweep over
//! it converges in a single poll per step.

use std::net::ToSocketAddrs;

use tracing::info;

use sweep::{Amps, HardwareResult, SetpointInstrument};

use crate::scpi::{ScpiDevice, ScpiResult};

/// Source function: constant current or constant voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Current,
    Voltage,
}

impl SourceMode {
    fn scpi(self) -> &'static str {
        match self {
            Self::Current => "CURR",
            Self::Voltage => "VOLT",
        }
    }
}

/// Driver for the Yokogawa GS200.
pub struct Gs200 {
    device: ScpiDevice,
}

impl Gs200 {
    /// Connect and log the instrument identification.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> ScpiResult<Self> {
        let mut device = ScpiDevice::connect(addr)?;
        let idn = device.idn()?;
        info!("Connected to: {}", idn);
        Ok(Self { device })
    }

    /// Reset to power-up settings.
    pub fn reset(&mut self) -> ScpiResult<()> {
        self.device.reset()
    }

    /// Select current or voltage sourcing.
    pub fn set_source_mode(&mut self, mode: SourceMode) -> ScpiResult<()> {
        self.device
            .command(&format!(":SOUR:FUNC {}", mode.scpi()))
    }

    /// Set the source range. The range is the maximum source level; the
    /// instrument truncates to its discrete range steps.
    pub fn set_source_range(&mut self, range: f64) -> ScpiResult<()> {
        self.device.command(&format!(":SOUR:RANG {range}"))
    }

    /// Program the output level in the active mode's unit.
    pub fn set_source_level(&mut self, level: f64) -> ScpiResult<()> {
        self.device.command(&format!(":SOUR:LEV {level}"))
    }

    /// Programmed output level.
    pub fn source_level(&mut self) -> ScpiResult<f64> {
        let response = self.device.query(":SOUR:LEV?")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Voltage compliance limit (applies in current mode).
    pub fn set_voltage_protection(&mut self, volts: f64) -> ScpiResult<()> {
        self.device
            .command(&format!(":SOUR:PROT:VOLT {volts}"))
    }

    /// Current compliance limit (applies in voltage mode).
    pub fn set_current_protection(&mut self, current: Amps) -> ScpiResult<()> {
        self.device
            .command(&format!(":SOUR:PROT:CURR {}", current.value()))
    }

    /// Enable or disable the output relay.
    pub fn set_output_enabled(&mut self, enabled: bool) -> ScpiResult<()> {
        self.device
            .command(&format!(":OUTP:STAT {}", enabled as u8))
    }

    /// Zero the level and open the output relay.
    pub fn shutdown(&mut self) -> ScpiResult<()> {
        self.set_source_level(0.0)?;
        self.set_output_enabled(false)
    }
}

/// The source is the swept axis in IV staircases: targets and readbacks
/// are the programmed level.
impl SetpointInstrument for Gs200 {
    fn move_to(&mut self, target: f64) -> HardwareResult<()> {
        self.set_source_level(target)?;
        Ok(())
    }

    fn readback(&mut self) -> HardwareResult<f64> {
        Ok(self.source_level()?)
    }
}
