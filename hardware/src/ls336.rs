//! Lakeshore 336 temperature controller driver.
//!
//! The 336 runs closed-loop heater control: each heater output is tied to
//! an input channel, and the controller slews the sample stage toward the
//! programmed setpoint (`SETP`), optionally at a bounded ramp rate
//! (`RAMP`). Sweeps poll the kelvin readback (`KRDG?`).
//!
//! # Example
//!
//! ```no_run
//! use hardware::{
//!     HeaterOutputUnits, HeaterRange, HeaterResistance, InputChannel, Ls336,
//! };
//! use sweep::{Amps, Kelvin};
//!
//! let mut tctrl = Ls336::connect("192.168.0.14:7777")?;
//! tctrl.set_heater_pid(2, 50.0, 50.0, 0.0)?;
//! tctrl.set_heater_setup(2, HeaterResistance::R25, Amps(1.414), HeaterOutputUnits::Power)?;
//! tctrl.set_heater_output_mode(2, InputChannel::A, true)?;
//! tctrl.set_control_setpoint(2, Kelvin(10.0))?;
//! tctrl.set_heater_range(2, HeaterRange::Low)?;
//! println!("sample stage: {}", tctrl.kelvin_reading(InputChannel::A)?);
//! # Ok::<(), hardware::ScpiError>(())
//! ```

use std::net::ToSocketAddrs;

use tracing::info;

use sweep::{Amps, HardwareResult, Kelvin, SetpointInstrument};

use crate::scpi::{ScpiDevice, ScpiResult};

/// Sensor input channels A-D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChannel {
    A,
    B,
    C,
    D,
}

impl InputChannel {
    /// Letter used by readback queries (`KRDG? A`).
    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }

    /// Number used by `OUTMODE` (A = 1).
    pub fn number(self) -> u8 {
        match self {
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::D => 4,
        }
    }
}

/// Heater output range. `Off` de-energizes the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterRange {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

/// Heater load resistance setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterResistance {
    R25 = 1,
    R50 = 2,
}

/// Heater output display/limit units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterOutputUnits {
    Current = 1,
    Power = 2,
}

/// Driver for the Lakeshore 336.
pub struct Ls336 {
    device: ScpiDevice,
}

impl Ls336 {
    /// Connect and log the instrument identification.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> ScpiResult<Self> {
        let mut device = ScpiDevice::connect(addr)?;
        let idn = device.idn()?;
        info!("Connected to: {}", idn);
        Ok(Self { device })
    }

    /// Kelvin reading of one input channel.
    pub fn kelvin_reading(&mut self, input: InputChannel) -> ScpiResult<Kelvin> {
        let response = self.device.query(&format!("KRDG? {}", input.letter()))?;
        Ok(Kelvin(ScpiDevice::parse_f64(&response)?))
    }

    /// Program the control setpoint for a heater output loop.
    pub fn set_control_setpoint(&mut self, output: u8, setpoint: Kelvin) -> ScpiResult<()> {
        self.device
            .command(&format!("SETP {output},{}", setpoint.value()))
    }

    /// Control setpoint of a heater output loop.
    pub fn control_setpoint(&mut self, output: u8) -> ScpiResult<Kelvin> {
        let response = self.device.query(&format!("SETP? {output}"))?;
        Ok(Kelvin(ScpiDevice::parse_f64(&response)?))
    }

    /// Set the closed-loop PID parameters for a heater output.
    pub fn set_heater_pid(&mut self, output: u8, p: f64, i: f64, d: f64) -> ScpiResult<()> {
        self.device.command(&format!("PID {output},{p},{i},{d}"))
    }

    /// Configure the heater load and output limit.
    pub fn set_heater_setup(
        &mut self,
        output: u8,
        resistance: HeaterResistance,
        max_current: Amps,
        units: HeaterOutputUnits,
    ) -> ScpiResult<()> {
        // Max-current code 0 selects the user limit in the fourth field.
        self.device.command(&format!(
            "HTRSET {output},{},0,{},{}",
            resistance as u8,
            max_current.value(),
            units as u8
        ))
    }

    /// Tie a heater output to an input channel in closed-loop mode.
    ///
    /// `powerup_enable` keeps the output configured across power cycles.
    pub fn set_heater_output_mode(
        &mut self,
        output: u8,
        input: InputChannel,
        powerup_enable: bool,
    ) -> ScpiResult<()> {
        // Mode 1 = closed loop PID.
        self.device.command(&format!(
            "OUTMODE {output},1,{},{}",
            input.number(),
            powerup_enable as u8
        ))
    }

    /// Set the heater range (power level) for an output; `Off` disables it.
    pub fn set_heater_range(&mut self, output: u8, range: HeaterRange) -> ScpiResult<()> {
        self.device
            .command(&format!("RANGE {output},{}", range as u8))
    }

    /// Enable or disable setpoint ramping for an output, with the ramp
    /// rate in kelvin per minute.
    pub fn set_setpoint_ramp(
        &mut self,
        output: u8,
        enabled: bool,
        rate_k_per_min: f64,
    ) -> ScpiResult<()> {
        self.device
            .command(&format!("RAMP {output},{},{rate_k_per_min}", enabled as u8))
    }

    /// Turn every heater output off.
    ///
    /// Covers all four outputs of the Model 336; the analog outputs 3 and 4
    /// take `RANGE n,0` the same way as the heater loops.
    pub fn all_heaters_off(&mut self) -> ScpiResult<()> {
        for output in 1..=4 {
            self.set_heater_range(output, HeaterRange::Off)?;
        }
        Ok(())
    }

    /// Reset to power-up settings.
    pub fn reset(&mut self) -> ScpiResult<()> {
        self.device.reset()
    }
}

/// One control loop of an [`Ls336`] viewed as a swept axis.
///
/// Pairs the heater output being programmed with the input channel whose
/// kelvin reading is the physical readback. Borrows the controller so the
/// bench regains it for shutdown after the sweep.
pub struct TemperatureAxis<'a> {
    ctrl: &'a mut Ls336,
    output: u8,
    input: InputChannel,
}

impl<'a> TemperatureAxis<'a> {
    pub fn new(ctrl: &'a mut Ls336, output: u8, input: InputChannel) -> Self {
        Self {
            ctrl,
            output,
            input,
        }
    }

    /// Access the underlying controller, e.g. to disable heaters from a
    /// sweep's cancellation hook.
    pub fn controller(&mut self) -> &mut Ls336 {
        self.ctrl
    }

    /// Heater output loop this axis programs.
    pub fn output(&self) -> u8 {
        self.output
    }
}

impl SetpointInstrument for TemperatureAxis<'_> {
    fn move_to(&mut self, target: f64) -> HardwareResult<()> {
        self.ctrl.set_control_setpoint(self.output, Kelvin(target))?;
        Ok(())
    }

    fn readback(&mut self) -> HardwareResult<f64> {
        Ok(self.ctrl.kelvin_reading(self.input)?.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Minimal line-protocol instrument: answers queries, records every
    /// message it receives.
    fn fake_controller() -> (std::net::SocketAddr, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let msg = line.trim().to_string();
                if msg.contains('?') {
                    let reply = if msg.starts_with("*IDN?") {
                        "LSCI,MODEL336,LSA0000,1.0"
                    } else {
                        "4.20"
                    };
                    writeln!(stream, "{reply}").unwrap();
                }
                let _ = tx.send(msg);
            }
        });
        (addr, rx)
    }

    #[test]
    fn all_heaters_off_covers_every_output() {
        let (addr, rx) = fake_controller();
        let mut tctrl = Ls336::connect(addr).unwrap();
        tctrl.all_heaters_off().unwrap();
        // The reply round trip proves the prior commands were consumed.
        tctrl.kelvin_reading(InputChannel::A).unwrap();

        let sent: Vec<String> = rx.try_iter().collect();
        for output in 1..=4 {
            assert!(
                sent.contains(&format!("RANGE {output},0")),
                "output {output} not de-energized: {sent:?}"
            );
        }
    }
}
