//! Collaborator interfaces for the sweep controller.
//!
//! Abstract the bench hardware and data path so sweeps are testable without
//! instruments. The controller receives its collaborators explicitly at
//! construction; nothing is resolved from ambient state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::HardwareResult;
use crate::measurement::Measurement;

/// The instrument being swept: a magnet supply, a temperature control loop
/// or a programmable source.
///
/// The contract is a synchronous request/response pair; the transport
/// behind it (GPIB gateway, LAN socket, serial) is the driver's concern.
pub trait SetpointInstrument {
    /// Command the instrument toward `target`. Returns once the command is
    /// accepted, not once the hardware arrives there.
    fn move_to(&mut self, target: f64) -> HardwareResult<()>;

    /// Read the instrument's physical readback in the same unit as
    /// [`move_to`](Self::move_to) targets.
    fn readback(&mut self) -> HardwareResult<f64>;
}

/// The measured quantity: a voltmeter, a lock-in, a multi-channel meter.
pub trait Sensor {
    /// Take one reading of every channel, in emission order.
    fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>>;
}

/// Receiver for emitted measurement records. Append-only.
pub trait ResultSink {
    fn emit(&mut self, measurement: Measurement) -> HardwareResult<()>;
}

/// Operator stop request. Polled and side-effect-free; cancellation is
/// cooperative and takes effect at the next loop iteration.
pub trait CancelSource {
    fn should_stop(&self) -> bool;
}

impl<T: SetpointInstrument + ?Sized> SetpointInstrument for &mut T {
    fn move_to(&mut self, target: f64) -> HardwareResult<()> {
        (**self).move_to(target)
    }

    fn readback(&mut self) -> HardwareResult<f64> {
        (**self).readback()
    }
}

impl<T: Sensor + ?Sized> Sensor for &mut T {
    fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
        (**self).sample()
    }
}

impl<T: ResultSink + ?Sized> ResultSink for &mut T {
    fn emit(&mut self, measurement: Measurement) -> HardwareResult<()> {
        (**self).emit(measurement)
    }
}

impl<T: CancelSource + ?Sized> CancelSource for &T {
    fn should_stop(&self) -> bool {
        (**self).should_stop()
    }
}

/// Cancel source for unattended sweeps: never stops.
pub struct NeverCancel;

impl CancelSource for NeverCancel {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Shared stop flag, settable from another thread (signal handler, stdin
/// watcher, GUI button).
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl CancelSource for StopFlag {
    fn should_stop(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sink that discards every record. Used for stabilization-only runs where
/// the settling is the point and the sample is noise.
pub struct NullSink;

impl ResultSink for NullSink {
    fn emit(&mut self, _measurement: Measurement) -> HardwareResult<()> {
        Ok(())
    }
}

/// Sensor with no channels, for runs that only drive a setpoint.
pub struct NoSensor;

impl Sensor for NoSensor {
    fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
        Ok(IndexMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_is_shared_across_clones() {
        let flag = StopFlag::new();
        let remote = flag.clone();
        assert!(!flag.should_stop());
        remote.request_stop();
        assert!(flag.should_stop());
    }
}
