//! SCPI line-protocol transport for bench instruments.
//!
//! All of the bench instruments speak newline-terminated ASCII: commands
//! are short mnemonics (`SETF 0.5`, `:READ?`), queries append a `?`, and
//! replies are a single line. This module implements that framing over a
//! raw TCP socket - either the instrument's own LAN port or a LAN-to-GPIB
//! gateway in front of the older meters.
//!
//! # Response format
//!
//! One line per reply, terminated with LF (`\n`); some instruments send
//! CRLF, which [`read`](ScpiDevice::read) strips. Multi-value replies are
//! comma-separated (`LIMIT?` returns `60.0,0.5`), parsed with
//! [`parse_f64_list`](ScpiDevice::parse_f64_list).
//!
//! # Example
//!
//! ```no_run
//! use hardware::ScpiDevice;
//!
//! let mut device = ScpiDevice::connect("192.168.0.12:7777")?;
//!
//! // Query device identification
//! let idn = device.query("*IDN?")?;
//! println!("Device: {}", idn.trim());
//!
//! // Query the field readback and parse it
//! let response = device.query("RDGF?")?;
//! let field = ScpiDevice::parse_f64(&response)?;
//! println!("Field: {} T", field);
//!
//! // Send a command (no response expected)
//! device.command("SETF 0.1")?;
//! # Ok::<(), hardware::ScpiError>(())
//! ```

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

/// Default timeout for instrument round trips.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors that can occur during SCPI communication.
#[derive(Error, Debug)]
pub enum ScpiError {
    /// Low-level I/O error (socket read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish the TCP connection to the instrument.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No complete reply within the timeout period.
    #[error("Timeout waiting for response")]
    Timeout,

    /// Reply doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to parse reply values.
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for SCPI operations.
pub type ScpiResult<T> = Result<T, ScpiError>;

/// Line-oriented SCPI device over TCP.
///
/// Handles message framing and reply parsing; the per-instrument drivers
/// layer typed methods on top of [`query`](Self::query) and
/// [`command`](Self::command).
pub struct ScpiDevice {
    stream: TcpStream,
}

impl ScpiDevice {
    /// Connect to an instrument at the given address.
    ///
    /// # Errors
    ///
    /// Returns [`ScpiError::ConnectionFailed`] if the TCP connection cannot
    /// be established.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> ScpiResult<Self> {
        let stream = TcpStream::connect(&addr)
            .map_err(|e| ScpiError::ConnectionFailed(format!("Failed to connect: {e}")))?;

        stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_TIMEOUT))?;

        debug!("Connected to SCPI instrument via TCP");

        Ok(Self { stream })
    }

    /// Set the timeout for read/write operations.
    ///
    /// The default is 3 seconds. High-NPLC meter readings can take longer
    /// than that per `:READ?`.
    pub fn set_timeout(&mut self, timeout: Duration) -> ScpiResult<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    /// Send a raw command string, appending a newline if not present.
    ///
    /// Does not wait for or read any reply; use [`query`](Self::query) for
    /// commands that return data.
    pub fn send(&mut self, command: &str) -> ScpiResult<()> {
        let mut msg = command.to_string();
        if !msg.ends_with('\n') {
            msg.push('\n');
        }

        debug!("SCPI send: {:?}", msg.trim());
        self.stream.write_all(msg.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one reply line from the instrument.
    ///
    /// Reads bytes until LF, stripping a trailing CR. A closed socket or an
    /// expired read timeout surfaces as [`ScpiError::Timeout`].
    pub fn read(&mut self) -> ScpiResult<String> {
        let mut buf = [0u8; 1];
        let mut bytes = Vec::new();

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(ScpiError::Timeout),
                Ok(_) => {
                    if buf[0] == b'\n' {
                        break;
                    }
                    bytes.push(buf[0]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(ScpiError::Timeout);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Err(ScpiError::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }

        let response: String = bytes.iter().map(|&b| b as char).collect();
        trace!("SCPI recv: {:?}", response);
        Ok(response)
    }

    /// Send a query and read the one-line reply.
    pub fn query(&mut self, command: &str) -> ScpiResult<String> {
        self.send(command)?;
        self.read()
    }

    /// Send a set command that returns no data.
    pub fn command(&mut self, command: &str) -> ScpiResult<()> {
        self.send(command)
    }

    /// Query device identification (`*IDN?`).
    pub fn idn(&mut self) -> ScpiResult<String> {
        let response = self.query("*IDN?")?;
        Ok(response.trim().to_string())
    }

    /// Reset the instrument to power-up settings (`*RST`).
    pub fn reset(&mut self) -> ScpiResult<()> {
        self.command("*RST")
    }

    /// Clear the instrument's status and error registers (`*CLS`).
    pub fn clear_status(&mut self) -> ScpiResult<()> {
        self.command("*CLS")
    }

    /// Parse a single float reply, tolerating surrounding whitespace and
    /// instrument exponent notation (`+1.234560E-03`).
    ///
    /// # Example
    ///
    /// ```
    /// use hardware::ScpiDevice;
    ///
    /// let value = ScpiDevice::parse_f64(" +5.000000E-01\r").unwrap();
    /// assert_eq!(value, 0.5);
    /// ```
    pub fn parse_f64(response: &str) -> ScpiResult<f64> {
        let trimmed = response.trim();
        trimmed
            .parse()
            .map_err(|_| ScpiError::ParseError(format!("Invalid number: {trimmed}")))
    }

    /// Parse a comma-separated float reply.
    ///
    /// # Example
    ///
    /// ```
    /// use hardware::ScpiDevice;
    ///
    /// let values = ScpiDevice::parse_f64_list("60.0,0.5").unwrap();
    /// assert_eq!(values, vec![60.0, 0.5]);
    /// ```
    pub fn parse_f64_list(response: &str) -> ScpiResult<Vec<f64>> {
        response
            .trim()
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse()
                    .map_err(|_| ScpiError::ParseError(format!("Invalid number: {part}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parse_f64_accepts_instrument_notation() {
        assert_relative_eq!(ScpiDevice::parse_f64("+1.234560E-03").unwrap(), 1.23456e-3);
        assert_relative_eq!(ScpiDevice::parse_f64(" -0.5 \r").unwrap(), -0.5);
        assert_relative_eq!(ScpiDevice::parse_f64("10").unwrap(), 10.0);
    }

    #[test]
    fn parse_f64_rejects_garbage() {
        assert!(ScpiDevice::parse_f64("").is_err());
        assert!(ScpiDevice::parse_f64("ERR").is_err());
    }

    #[test]
    fn parse_f64_list_splits_on_commas() {
        let values = ScpiDevice::parse_f64_list("60.0, 0.5\r").unwrap();
        assert_eq!(values.len(), 2);
        assert_relative_eq!(values[0], 60.0);
        assert_relative_eq!(values[1], 0.5);
    }

    #[test]
    fn parse_f64_list_rejects_partial_garbage() {
        assert!(ScpiDevice::parse_f64_list("1.0,x").is_err());
    }
}
