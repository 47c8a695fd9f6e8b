//! Instrument drivers for the cryogenic measurement bench.
//!
//! Each driver is a thin wrapper over the instrument's SCPI/ASCII command
//! set, reached through a raw TCP socket (LAN instrument port or a
//! LAN-to-GPIB gateway). Drivers format commands, parse replies, and
//! implement the `sweep` collaborator traits where the instrument plays
//! that role on the bench:
//!
//! - [`Ls625`] - Lakeshore 625/643/648 electromagnet power supply
//!   (field axis, `SetpointInstrument`)
//! - [`Ls336`] - Lakeshore 336 temperature controller; a
//!   [`TemperatureAxis`] view over one control loop is a
//!   `SetpointInstrument`
//! - [`K2182`] - Keithley 2182 nanovoltmeter (`Sensor`)
//! - [`Sr830`] - Stanford Research SR830 lock-in amplifier (`Sensor`)
//! - [`Gs200`] - Yokogawa GS200 programmable source
//!   (current axis for IV staircases, `SetpointInstrument`)
//!
//! The shared line-protocol transport lives in [`scpi`].

pub mod gs200;
pub mod k2182;
pub mod ls336;
pub mod ls625;
pub mod scpi;
pub mod sr830;

pub use gs200::{Gs200, SourceMode};
pub use k2182::{K2182, VOLTAGE_CHANNEL};
pub use ls336::{HeaterOutputUnits, HeaterRange, HeaterResistance, InputChannel, Ls336, TemperatureAxis};
pub use ls625::Ls625;
pub use scpi::{ScpiDevice, ScpiError, ScpiResult};
pub use sr830::{Sr830, MAGNITUDE_CHANNEL, X_CHANNEL, Y_CHANNEL};
