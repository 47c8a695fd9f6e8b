//! Stanford Research SR830 lock-in amplifier driver.
//!
//! The lock-in replaces the nanovoltmeter when the four-probe signal is
//! buried in noise: it measures the in-phase (X) and quadrature (Y)
//! components at the reference frequency, plus the magnitude R. One
//! `SNAP?` query reads all three atomically, so the channels in a record
//! are coherent.

use std::net::ToSocketAddrs;

use indexmap::IndexMap;
use tracing::info;

use sweep::{HardwareResult, Sensor};

use crate::scpi::{ScpiDevice, ScpiError, ScpiResult};

/// Channel names the lock-in reports through the [`Sensor`] trait.
pub const X_CHANNEL: &str = "X (V)";
pub const Y_CHANNEL: &str = "Y (V)";
pub const MAGNITUDE_CHANNEL: &str = "R (V)";

/// Driver for the Stanford Research SR830.
pub struct Sr830 {
    device: ScpiDevice,
}

impl Sr830 {
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

    /// In-phase component in volts.
    pub fn x(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("OUTP? 1")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Quadrature component in volts.
    pub fn y(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("OUTP? 2")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Signal magnitude R in volts.
    pub fn magnitude(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("OUTP? 3")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Reference phase shift in degrees.
    pub fn phase(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("PHAS?")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Reference frequency in hertz.
    pub fn frequency(&mut self) -> ScpiResult<f64> {
        let response = self.device.query("FREQ?")?;
        ScpiDevice::parse_f64(&response)
    }

    /// Set the internal reference frequency in hertz.
    pub fn set_frequency(&mut self, hz: f64) -> ScpiResult<()> {
        self.device.command(&format!("FREQ {hz}"))
    }

    /// Read X, Y and R in one atomic query.
    pub fn snap_xyr(&mut self) -> ScpiResult<(f64, f64, f64)> {
        let response = self.device.query("SNAP? 1,2,3")?;
        let values = ScpiDevice::parse_f64_list(&response)?;
        if values.len() < 3 {
            return Err(ScpiError::InvalidResponse(response));
        }
        Ok((values[0], values[1], values[2]))
    }
}

impl Sensor for Sr830 {
    fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
        let (x, y, r) = self.snap_xyr()?;
        Ok(IndexMap::from([
            (X_CHANNEL.to_string(), x),
            (Y_CHANNEL.to_string(), y),
            (MAGNITUDE_CHANNEL.to_string(), r),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    fn fake_lockin() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let reply = match line.trim() {
                    "*IDN?" => "Stanford_Research_Systems,SR830,s/n00001,ver1.07",
                    "SNAP? 1,2,3" => "1.5e-6,-2.5e-7,1.52e-6",
                    msg if msg.contains('?') => "0.0",
                    _ => continue,
                };
                writeln!(stream, "{reply}").unwrap();
            }
        });
        addr
    }

    #[test]
    fn sample_reports_coherent_xyr_channels() {
        let mut lockin = Sr830::connect(fake_lockin()).unwrap();
        let channels = lockin.sample().unwrap();

        let names: Vec<&str> = channels.keys().map(String::as_str).collect();
        assert_eq!(names, [X_CHANNEL, Y_CHANNEL, MAGNITUDE_CHANNEL]);
        assert_relative_eq!(channels[X_CHANNEL], 1.5e-6);
        assert_relative_eq!(channels[Y_CHANNEL], -2.5e-7);
        assert_relative_eq!(channels[MAGNITUDE_CHANNEL], 1.52e-6);
    }
}
