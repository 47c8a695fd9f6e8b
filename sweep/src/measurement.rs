//! Measurement records and derived channels.

use indexmap::IndexMap;
use serde::Serialize;

/// One emitted measurement record.
///
/// Channels preserve insertion order; sinks rely on it for stable column
/// layout. Records are append-only: the controller builds one, hands it to
/// the sink, and never touches it again.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    /// Target of the setpoint governing this record.
    pub setpoint: f64,
    /// Named channel readings, e.g. `"Voltage (V)"`.
    pub channels: IndexMap<String, f64>,
}

impl Measurement {
    pub fn new(setpoint: f64) -> Self {
        Self {
            setpoint,
            channels: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.channels.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.channels.get(name).copied()
    }
}

/// A channel computed from sampled channels at emission time.
///
/// Degenerate divisions are not faults: a zero denominator (the classic
/// case being resistance at a zero-current point) reports as `NaN` in the
/// record and the sweep continues.
#[derive(Debug, Clone)]
pub enum DerivedChannel {
    /// `source` channel divided by a fixed reference value.
    ///
    /// Four-probe resistance with a fixed excitation current:
    /// `Resistance (ohm) = Voltage (V) / set_current`.
    Ratio {
        name: String,
        source: String,
        reference: f64,
    },
    /// One sampled channel divided by another.
    ///
    /// IV-curve resistance, where the denominator changes every step:
    /// `Resistance (ohm) = Voltage (V) / Current (A)`.
    ChannelRatio {
        name: String,
        numerator: String,
        denominator: String,
    },
}

impl DerivedChannel {
    pub fn ratio(
        name: impl Into<String>,
        source: impl Into<String>,
        reference: f64,
    ) -> Self {
        Self::Ratio {
            name: name.into(),
            source: source.into(),
            reference,
        }
    }

    pub fn channel_ratio(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self::ChannelRatio {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }

    /// Compute this channel and append it to the record.
    pub fn apply(&self, measurement: &mut Measurement) {
        match self {
            Self::Ratio {
                name,
                source,
                reference,
            } => {
                let value = match measurement.get(source) {
                    Some(v) if *reference != 0.0 => v / reference,
                    _ => f64::NAN,
                };
                measurement.insert(name.clone(), value);
            }
            Self::ChannelRatio {
                name,
                numerator,
                denominator,
            } => {
                let value = match (measurement.get(numerator), measurement.get(denominator)) {
                    (Some(n), Some(d)) if d != 0.0 => n / d,
                    _ => f64::NAN,
                };
                measurement.insert(name.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn channels_keep_insertion_order() {
        let mut m = Measurement::new(0.1);
        m.insert("Magnetic Field (T)", 0.099);
        m.insert("Voltage (V)", 2.0e-5);
        let names: Vec<&str> = m.channels.keys().map(String::as_str).collect();
        assert_eq!(names, ["Magnetic Field (T)", "Voltage (V)"]);
    }

    #[test]
    fn ratio_divides_by_fixed_reference() {
        let mut m = Measurement::new(0.0);
        m.insert("Voltage (V)", 2.0e-4);
        DerivedChannel::ratio("Resistance (ohm)", "Voltage (V)", 1.0e-4).apply(&mut m);
        assert_relative_eq!(m.get("Resistance (ohm)").unwrap(), 2.0);
    }

    #[test]
    fn zero_reference_reports_nan_not_error() {
        let mut m = Measurement::new(0.0);
        m.insert("Voltage (V)", 1.0e-3);
        DerivedChannel::ratio("Resistance (ohm)", "Voltage (V)", 0.0).apply(&mut m);
        assert!(m.get("Resistance (ohm)").unwrap().is_nan());
    }

    #[test]
    fn channel_ratio_tracks_denominator_channel() {
        let mut m = Measurement::new(2.0e-5);
        m.insert("Current (A)", 2.0e-5);
        m.insert("Voltage (V)", 1.0e-4);
        DerivedChannel::channel_ratio("Resistance (ohm)", "Voltage (V)", "Current (A)")
            .apply(&mut m);
        assert_relative_eq!(m.get("Resistance (ohm)").unwrap(), 5.0);
    }

    #[test]
    fn missing_source_channel_reports_nan() {
        let mut m = Measurement::new(0.0);
        DerivedChannel::ratio("Resistance (ohm)", "Voltage (V)", 1.0e-4).apply(&mut m);
        assert!(m.get("Resistance (ohm)").unwrap().is_nan());
    }
}
