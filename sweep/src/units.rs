//! Physical-unit newtypes for sweep configuration.
//!
//! The bench scripts these replaced carried conversion constants as bare
//! numeric literals (`6.6472` amps per tesla and friends). Here every
//! configuration field that crosses a unit boundary carries its unit in the
//! type, and the one conversion the domain actually needs (field step to
//! coil current to ramp duration) is spelled out as methods.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Magnetic field in tesla.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Tesla(pub f64);

/// Temperature in kelvin.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Kelvin(pub f64);

/// Current in amperes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amps(pub f64);

/// Coil constant of an electromagnet, in amperes per tesla.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AmpsPerTesla(pub f64);

/// Current ramp rate in amperes per second.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AmpsPerSecond(pub f64);

impl Tesla {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Kelvin {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Amps {
    pub fn value(self) -> f64 {
        self.0
    }

    /// Time a supply ramping at `rate` needs to slew this much current.
    ///
    /// Returns `None` for a non-positive rate. Used by the bench to derive
    /// settle timeouts for field steps.
    pub fn ramp_time(self, rate: AmpsPerSecond) -> Option<Duration> {
        if rate.0 <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64((self.0 / rate.0).abs()))
    }
}

impl AmpsPerTesla {
    pub fn value(self) -> f64 {
        self.0
    }

    /// Coil current that produces the given field.
    pub fn current_for(self, field: Tesla) -> Amps {
        Amps(self.0 * field.0)
    }
}

impl AmpsPerSecond {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Tesla {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} T", self.0)
    }
}

impl fmt::Display for Kelvin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} K", self.0)
    }
}

impl fmt::Display for Amps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A", self.0)
    }
}

impl fmt::Display for AmpsPerTesla {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A/T", self.0)
    }
}

impl fmt::Display for AmpsPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} A/s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn coil_current_scales_with_field() {
        let coil = AmpsPerTesla(13.2944);
        assert_relative_eq!(coil.current_for(Tesla(0.5)).value(), 6.6472);
        assert_relative_eq!(coil.current_for(Tesla(-0.5)).value(), -6.6472);
    }

    #[test]
    fn ramp_time_from_rate() {
        let slew = Amps(1.0).ramp_time(AmpsPerSecond(0.1)).unwrap();
        assert_relative_eq!(slew.as_secs_f64(), 10.0);

        // Negative slews take the same time as positive ones.
        let slew = Amps(-1.0).ramp_time(AmpsPerSecond(0.1)).unwrap();
        assert_relative_eq!(slew.as_secs_f64(), 10.0);
    }

    #[test]
    fn ramp_time_rejects_stalled_supply() {
        assert!(Amps(1.0).ramp_time(AmpsPerSecond(0.0)).is_none());
        assert!(Amps(1.0).ramp_time(AmpsPerSecond(-0.1)).is_none());
    }
}
