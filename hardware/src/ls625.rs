//! Lakeshore 625/643/648 electromagnet power supply driver.
//!
//! The supply programs the magnet in field units directly (`SETF`) and
//! ramps its output current at a configured rate until the field readback
//! (`RDGF?`) reaches the setpoint. Sweeps poll that readback rather than
//! guessing the ramp duration from the coil constant.
//!
//! # Example
//!
//! ```no_run
//! use hardware::Ls625;
//! use sweep::{Amps, AmpsPerSecond, Tesla};
//!
//! let mut magnet = Ls625::connect("192.168.0.12:7777")?;
//! magnet.set_limits(Amps(60.0), AmpsPerSecond(0.5))?;
//! magnet.set_ramp_rate(AmpsPerSecond(0.1))?;
//! magnet.set_field(Tesla(0.1))?;
//! println!("field readback: {}", magnet.measured_field()?);
//! # Ok::<(), hardware::ScpiError>(())
//! ```

use std::net::ToSocketAddrs;

use tracing::info;

use sweep::{Amps, AmpsPerSecond, HardwareResult, SetpointInstrument, Tesla};

use crate::scpi::{ScpiDevice, ScpiResult};

/// Driver for the Lakeshore electromagnet power supply family.
pub struct Ls625 {
    device: ScpiDevice,
}

impl Ls625 {
    /// Connect and log the instrument identification.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> ScpiResult<Self> {
        let mut device = ScpiDevice::connect(addr)?;
        let idn = device.idn()?;
        info!("Connected to: {}", idn);
        Ok(Self { device })
    }

    /// Program the magnetic field setpoint. The supply starts ramping
    /// toward it immediately at the configured ramp rate.
    pub fn set_field(&mut self, field: Tesla) -> ScpiResult<()> {
        self.device.command(&format!("SETF {}", field.value()))
    }

    /// Measured magnetic field at the sample.
    pub fn measured_field(&mut self) -> ScpiResult<Tesla> {
        let response = self.device.query("RDGF?")?;
        Ok(Tesla(ScpiDevice::parse_f64(&response)?))
    }

    /// Program the output current setpoint directly.
    pub fn set_current(&mut self, current: Amps) -> ScpiResult<()> {
        self.device.command(&format!("SETI {}", current.value()))
    }

    /// Output current setting (not the measured output).
    pub fn current_setting(&mut self) -> ScpiResult<Amps> {
        let response = self.device.query("SETI?")?;
        Ok(Amps(ScpiDevice::parse_f64(&response)?))
    }

    /// Actual measured output current.
    pub fn measured_current(&mut self) -> ScpiResult<Amps> {
        let response = self.device.query("RDGI?")?;
        Ok(Amps(ScpiDevice::parse_f64(&response)?))
    }

    /// Actual output voltage at the supply terminals.
    pub fn measured_voltage(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("RDGV?")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Set the output current ramp rate.
    pub fn set_ramp_rate(&mut self, rate: AmpsPerSecond) -> ScpiResult<()> {
        self.device.command(&format!("RATE {}", rate.value()))
    }

    /// Output current ramp rate.
    pub fn ramp_rate(&mut self) -> ScpiResult<AmpsPerSecond> {
        let response = self.device.query("RATE?")?;
        Ok(AmpsPerSecond(ScpiDevice::parse_f64(&response)?))
    }

    /// Set the upper limits for output current and ramp rate.
    pub fn set_limits(&mut self, max_current: Amps, max_rate: AmpsPerSecond) -> ScpiResult<()> {
        self.device.command(&format!(
            "LIMIT {},{}",
            max_current.value(),
            max_rate.value()
        ))
    }

    /// Upper limits for output current and ramp rate.
    pub fn limits(&mut self) -> ScpiResult<(Amps, AmpsPerSecond)> {
        let response = self.device.query("LIMIT?")?;
        let values = ScpiDevice::parse_f64_list(&response)?;
        if values.len() < 2 {
            return Err(crate::scpi::ScpiError::InvalidResponse(response));
        }
        Ok((Amps(values[0]), AmpsPerSecond(values[1])))
    }

    /// Stop the output current ramp where it is.
    pub fn stop_ramp(&mut self) -> ScpiResult<()> {
        self.device.command("STOP")
    }

    /// Reset to power-up settings.
    pub fn reset(&mut self) -> ScpiResult<()> {
        self.device.reset()
    }
}

/// The magnet is the swept axis in field sweeps: targets and readbacks
/// are in tesla.
impl SetpointInstrument for Ls625 {
    fn move_to(&mut self, target: f64) -> HardwareResult<()> {
        self.set_field(Tesla(target))?;
        Ok(())
    }

    fn readback(&mut self) -> HardwareResult<f64> {
        Ok(self.measured_field()?.value())
    }
}
