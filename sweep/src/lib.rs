//! Setpoint sweep execution for transport measurements.
//!
//! This crate implements the control loop shared by every measurement on the
//! cryogenic bench: drive an instrument (magnet supply, temperature
//! controller, current source) through an ordered sequence of setpoints,
//! wait for the physical readback to converge on each one, then sample a
//! sensor and hand the record to a result sink.
//!
//! The crate is hardware-free. Instruments, sensors, sinks and the operator
//! stop request are all reached through the traits in [`interface`], so the
//! controller can be exercised entirely against mocks. The `hardware` crate
//! implements those traits for the bench instruments.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sweep::{
//!     NeverCancel, NullSink, SweepConfig, SweepController, SweepPlan,
//! };
//! # use indexmap::IndexMap;
//! # use sweep::{HardwareResult, Sensor, SetpointInstrument};
//! # #[derive(Default)]
//! # struct Echo(f64);
//! # impl SetpointInstrument for Echo {
//! #     fn move_to(&mut self, target: f64) -> HardwareResult<()> {
//! #         self.0 = target;
//! #         Ok(())
//! #     }
//! #     fn readback(&mut self) -> HardwareResult<f64> {
//! #         Ok(self.0)
//! #     }
//! # }
//! # struct Meter;
//! # impl Sensor for Meter {
//! #     fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
//! #         Ok(IndexMap::from([("Voltage (V)".to_string(), 0.0)]))
//! #     }
//! # }
//!
//! let plan = SweepPlan::ramp(0.0, 0.5, 0.1, 0.005);
//! let config = SweepConfig {
//!     poll_interval: Duration::from_millis(1),
//!     sample_interval: Duration::from_millis(1),
//!     ..SweepConfig::default()
//! };
//! let mut controller = SweepController::new(Echo::default(), Meter, NeverCancel, config);
//! let outcome = controller.run(&plan, &mut NullSink, |_, _| Ok(()))?;
//! assert_eq!(outcome.emitted(), 5);
//! # Ok::<(), sweep::SweepError>(())
//! ```

pub mod controller;
pub mod error;
pub mod interface;
pub mod measurement;
pub mod plan;
pub mod units;

pub use controller::{SweepConfig, SweepController, SweepOutcome, SweepPhase};
pub use error::{HardwareResult, SweepError, SweepResult};
pub use interface::{
    CancelSource, NeverCancel, NoSensor, NullSink, ResultSink, Sensor, SetpointInstrument,
    StopFlag,
};
pub use measurement::{DerivedChannel, Measurement};
pub use plan::{Setpoint, SettleStrategy, SweepPlan};
pub use units::{Amps, AmpsPerSecond, AmpsPerTesla, Kelvin, Tesla};
