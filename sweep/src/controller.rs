//! The sweep execution loop.
//!
//! One controller drives one instrument through one plan at a time. The
//! model is single-threaded and blocking: every phase (move, settle poll,
//! sample) is a synchronous round trip to a collaborator, and the loop
//! suspends only on explicit timed sleeps. Settle deadlines are wall-clock
//! checks between polls, never interruption of a blocked hardware call.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{HardwareResult, SweepError};
use crate::interface::{CancelSource, ResultSink, Sensor, SetpointInstrument};
use crate::measurement::{DerivedChannel, Measurement};
use crate::plan::{Setpoint, SettleStrategy, SweepPlan};

/// Controller phase, per setpoint:
/// `Idle -> Moving -> Settling -> Sampling -> Moving(next) | terminal`.
///
/// `Settling` always precedes `Sampling` for a newly issued setpoint, and
/// records are only ever emitted from `Sampling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Moving,
    Settling,
    Sampling,
    Done,
    Cancelled,
    Faulted,
}

/// Timing and channel configuration for a run.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Delay between convergence polls while settling.
    pub poll_interval: Duration,
    /// Extra pause after numeric convergence, for thermal/magnetic settling
    /// the readback cannot see. Hardware-specific; defaults to zero.
    pub post_settle_delay: Duration,
    /// Delay after each sample before the next step or re-sample.
    pub sample_interval: Duration,
    /// When set, each record carries the instrument readback under this
    /// channel name (e.g. `"Magnetic Field (T)"`), read at sample time.
    pub readback_channel: Option<String>,
    /// Channels computed from sampled ones at emission time.
    pub derived: Vec<DerivedChannel>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            post_settle_delay: Duration::ZERO,
            sample_interval: Duration::from_millis(100),
            readback_channel: None,
            derived: Vec::new(),
        }
    }
}

/// How a run ended when no fault occurred. Both variants carry the number
/// of records handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every setpoint in the plan was executed.
    Completed { emitted: usize },
    /// The operator requested a stop between iterations.
    Cancelled { emitted: usize },
}

impl SweepOutcome {
    /// Number of records handed to the sink, whichever way the run ended.
    pub fn emitted(&self) -> usize {
        match self {
            SweepOutcome::Completed { emitted } | SweepOutcome::Cancelled { emitted } => *emitted,
        }
    }
}

enum StepFlow {
    Continue,
    Stopped,
}

/// Executes a [`SweepPlan`] against hardware, emitting a time-ordered
/// stream of [`Measurement`]s to a sink.
///
/// The controller exclusively owns (or mutably borrows) its instrument and
/// sensor for the duration of a run, which is what enforces the one
/// sweep per instrument rule.
pub struct SweepController<I, S, C> {
    instrument: I,
    sensor: S,
    cancel: C,
    config: SweepConfig,
    phase: SweepPhase,
}

impl<I, S, C> SweepController<I, S, C>
where
    I: SetpointInstrument,
    S: Sensor,
    C: CancelSource,
{
    pub fn new(instrument: I, sensor: S, cancel: C, config: SweepConfig) -> Self {
        Self {
            instrument,
            sensor,
            cancel,
            config,
            phase: SweepPhase::Idle,
        }
    }

    /// Current controller phase. Terminal after [`run`](Self::run) returns.
    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    /// Execute `plan` in order, emitting one or more records per setpoint.
    ///
    /// `on_cancel` runs exactly once if the operator stops the sweep; it
    /// receives the instrument and sensor so it can de-energize outputs
    /// before the run returns. Faults propagate immediately with no retry;
    /// the caller owns hardware-safe shutdown after a fault.
    pub fn run<K, F>(
        &mut self,
        plan: &SweepPlan,
        sink: &mut K,
        mut on_cancel: F,
    ) -> Result<SweepOutcome, SweepError>
    where
        K: ResultSink,
        F: FnMut(&mut I, &mut S) -> HardwareResult<()>,
    {
        self.phase = SweepPhase::Idle;
        let result = self.drive(plan, sink, &mut on_cancel);
        self.phase = match &result {
            Ok(SweepOutcome::Completed { .. }) => SweepPhase::Done,
            Ok(SweepOutcome::Cancelled { .. }) => SweepPhase::Cancelled,
            Err(_) => SweepPhase::Faulted,
        };
        result
    }

    fn drive<K, F>(
        &mut self,
        plan: &SweepPlan,
        sink: &mut K,
        on_cancel: &mut F,
    ) -> Result<SweepOutcome, SweepError>
    where
        K: ResultSink,
        F: FnMut(&mut I, &mut S) -> HardwareResult<()>,
    {
        let mut emitted = 0usize;
        info!(setpoints = plan.len(), "starting sweep");

        for setpoint in plan.iter() {
            let flow = if self.cancel.should_stop() {
                StepFlow::Stopped
            } else {
                match setpoint.strategy {
                    SettleStrategy::Settle => self.step_settled(setpoint, sink, &mut emitted)?,
                    SettleStrategy::Track => self.step_tracked(setpoint, sink, &mut emitted)?,
                }
            };

            if let StepFlow::Stopped = flow {
                warn!(emitted, "stop requested, aborting sweep");
                on_cancel(&mut self.instrument, &mut self.sensor)?;
                return Ok(SweepOutcome::Cancelled { emitted });
            }
        }

        info!(emitted, "sweep complete");
        Ok(SweepOutcome::Completed { emitted })
    }

    /// Discrete step: command, settle, pause, sample once.
    fn step_settled<K: ResultSink>(
        &mut self,
        setpoint: &Setpoint,
        sink: &mut K,
        emitted: &mut usize,
    ) -> Result<StepFlow, SweepError> {
        self.phase = SweepPhase::Moving;
        debug!(target_value = setpoint.target, "moving to setpoint");
        self.instrument.move_to(setpoint.target)?;

        self.phase = SweepPhase::Settling;
        self.wait_settled(setpoint)?;

        if !self.config.post_settle_delay.is_zero() {
            thread::sleep(self.config.post_settle_delay);
        }

        self.phase = SweepPhase::Sampling;
        self.sample_and_emit(setpoint, sink, None, emitted)?;
        thread::sleep(self.config.sample_interval);
        Ok(StepFlow::Continue)
    }

    /// Ramp step: sample at the configured cadence while the instrument
    /// slews itself, until the readback reaches the target. The same
    /// convergence check as [`wait_settled`](Self::wait_settled) decides
    /// when the step is over, here evaluated once per sample.
    fn step_tracked<K: ResultSink>(
        &mut self,
        setpoint: &Setpoint,
        sink: &mut K,
        emitted: &mut usize,
    ) -> Result<StepFlow, SweepError> {
        self.phase = SweepPhase::Moving;
        debug!(target_value = setpoint.target, "ramping toward setpoint");
        self.instrument.move_to(setpoint.target)?;

        let start = Instant::now();
        loop {
            if self.cancel.should_stop() {
                return Ok(StepFlow::Stopped);
            }

            self.phase = SweepPhase::Settling;
            let reading = self.instrument.readback()?;
            let settled = setpoint.is_settled(reading);

            self.phase = SweepPhase::Sampling;
            self.sample_and_emit(setpoint, sink, Some(reading), emitted)?;

            if settled {
                debug!(
                    target_value = setpoint.target,
                    reading, "target readback reached"
                );
                return Ok(StepFlow::Continue);
            }

            if let Some(limit) = setpoint.timeout {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    return Err(SweepError::SettleTimeout {
                        target: setpoint.target,
                        elapsed,
                    });
                }
            }

            thread::sleep(self.config.sample_interval);
        }
    }

    /// Poll the readback until it converges on the setpoint.
    ///
    /// The first check happens immediately, so a setpoint already within
    /// tolerance resolves in exactly one readback with no sleep.
    fn wait_settled(&mut self, setpoint: &Setpoint) -> Result<(), SweepError> {
        let start = Instant::now();
        loop {
            let reading = self.instrument.readback()?;
            if setpoint.is_settled(reading) {
                debug!(target_value = setpoint.target, reading, "setpoint settled");
                return Ok(());
            }

            if let Some(limit) = setpoint.timeout {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    return Err(SweepError::SettleTimeout {
                        target: setpoint.target,
                        elapsed,
                    });
                }
            }

            debug!(
                target_value = setpoint.target,
                reading, "waiting for settle"
            );
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Build one record and hand it to the sink.
    ///
    /// `readback` carries a reading already taken this iteration (tracked
    /// steps); otherwise the instrument is read fresh when a readback
    /// channel is configured.
    fn sample_and_emit<K: ResultSink>(
        &mut self,
        setpoint: &Setpoint,
        sink: &mut K,
        readback: Option<f64>,
        emitted: &mut usize,
    ) -> Result<(), SweepError> {
        let mut measurement = Measurement::new(setpoint.target);

        if let Some(name) = &self.config.readback_channel {
            let value = match readback {
                Some(value) => value,
                None => self.instrument.readback()?,
            };
            measurement.insert(name.clone(), value);
        }

        for (name, value) in self.sensor.sample()? {
            measurement.insert(name, value);
        }
        for derived in &self.config.derived {
            derived.apply(&mut measurement);
        }

        debug!(setpoint = setpoint.target, "emitting measurement");
        sink.emit(measurement)?;
        *emitted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{NeverCancel, NoSensor, NullSink, StopFlag};
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Collaborator events, shared between mocks to check ordering.
    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Move(f64),
        Read,
        Emit(f64),
    }

    type EventLog = Rc<RefCell<Vec<Event>>>;

    /// Instrument whose readback is exactly the last commanded target.
    #[derive(Default)]
    struct EchoInstrument {
        last: f64,
        reads: usize,
        log: Option<EventLog>,
    }

    impl SetpointInstrument for EchoInstrument {
        fn move_to(&mut self, target: f64) -> HardwareResult<()> {
            self.last = target;
            if let Some(log) = &self.log {
                log.borrow_mut().push(Event::Move(target));
            }
            Ok(())
        }

        fn readback(&mut self) -> HardwareResult<f64> {
            self.reads += 1;
            if let Some(log) = &self.log {
                log.borrow_mut().push(Event::Read);
            }
            Ok(self.last)
        }
    }

    /// Instrument stuck far from every target.
    struct StuckInstrument;

    impl SetpointInstrument for StuckInstrument {
        fn move_to(&mut self, _target: f64) -> HardwareResult<()> {
            Ok(())
        }

        fn readback(&mut self) -> HardwareResult<f64> {
            Ok(999.0)
        }
    }

    /// Instrument that slews toward the target by a fixed increment per
    /// readback, like a supply ramping at constant rate.
    struct RampInstrument {
        position: f64,
        target: f64,
        step: f64,
    }

    impl SetpointInstrument for RampInstrument {
        fn move_to(&mut self, target: f64) -> HardwareResult<()> {
            self.target = target;
            Ok(())
        }

        fn readback(&mut self) -> HardwareResult<f64> {
            let delta = self.target - self.position;
            self.position += delta.clamp(-self.step, self.step);
            Ok(self.position)
        }
    }

    struct FixedSensor {
        voltage: f64,
    }

    impl Sensor for FixedSensor {
        fn sample(&mut self) -> HardwareResult<IndexMap<String, f64>> {
            Ok(IndexMap::from([("Voltage (V)".to_string(), self.voltage)]))
        }
    }

    #[derive(Default)]
    struct VecSink {
        records: Vec<Measurement>,
        log: Option<EventLog>,
        stop_after: Option<(usize, StopFlag)>,
    }

    impl ResultSink for VecSink {
        fn emit(&mut self, measurement: Measurement) -> HardwareResult<()> {
            if let Some(log) = &self.log {
                log.borrow_mut().push(Event::Emit(measurement.setpoint));
            }
            self.records.push(measurement);
            if let Some((count, flag)) = &self.stop_after {
                if self.records.len() >= *count {
                    flag.request_stop();
                }
            }
            Ok(())
        }
    }

    fn fast_config() -> SweepConfig {
        SweepConfig {
            poll_interval: Duration::from_millis(1),
            post_settle_delay: Duration::ZERO,
            sample_interval: Duration::ZERO,
            readback_channel: None,
            derived: Vec::new(),
        }
    }

    fn field_plan() -> SweepPlan {
        SweepPlan::from_setpoints(
            [0.1, 0.5, -0.5, 0.0]
                .into_iter()
                .map(|t| Setpoint::new(t, 0.005))
                .collect(),
        )
    }

    #[test]
    fn four_setpoint_field_scenario() {
        let mut sink = VecSink::default();
        let mut instrument = EchoInstrument::default();
        {
            let mut controller = SweepController::new(
                &mut instrument,
                FixedSensor { voltage: 2.0e-5 },
                NeverCancel,
                fast_config(),
            );
            let outcome = controller
                .run(&field_plan(), &mut sink, |_, _| Ok(()))
                .unwrap();
            assert_eq!(outcome, SweepOutcome::Completed { emitted: 4 });
            assert_eq!(controller.phase(), SweepPhase::Done);
        }

        let setpoints: Vec<f64> = sink.records.iter().map(|m| m.setpoint).collect();
        assert_eq!(setpoints, [0.1, 0.5, -0.5, 0.0]);
        for record in &sink.records {
            assert_relative_eq!(record.get("Voltage (V)").unwrap(), 2.0e-5);
        }
    }

    #[test]
    fn converged_setpoint_settles_in_one_poll() {
        let mut instrument = EchoInstrument::default();
        let plan = field_plan();
        {
            let mut controller = SweepController::new(
                &mut instrument,
                NoSensor,
                NeverCancel,
                fast_config(),
            );
            controller.run(&plan, &mut NullSink, |_, _| Ok(())).unwrap();
        }
        // Echo adapter converges instantly: one settle readback per setpoint,
        // and no readback channel is configured, so nothing else reads.
        assert_eq!(instrument.reads, plan.len());
    }

    #[test]
    fn settlement_precedes_every_emission() {
        let log: EventLog = Rc::new(RefCell::new(Vec::new()));
        let instrument = EchoInstrument {
            log: Some(log.clone()),
            ..EchoInstrument::default()
        };
        let mut sink = VecSink {
            log: Some(log.clone()),
            ..VecSink::default()
        };

        let mut controller =
            SweepController::new(instrument, NoSensor, NeverCancel, fast_config());
        controller
            .run(&field_plan(), &mut sink, |_, _| Ok(()))
            .unwrap();

        // Strict per-setpoint ordering: command, converged readback, emit.
        let events = log.borrow();
        let expected: Vec<Event> = [0.1, 0.5, -0.5, 0.0]
            .into_iter()
            .flat_map(|t| [Event::Move(t), Event::Read, Event::Emit(t)])
            .collect();
        assert_eq!(*events, expected);
    }

    #[test]
    fn settle_timeout_is_bounded_by_poll_interval() {
        let timeout = Duration::from_millis(50);
        let poll = Duration::from_millis(20);
        let plan = SweepPlan::from_setpoints(vec![
            Setpoint::new(1.0, 0.005).with_timeout(timeout)
        ]);
        let config = SweepConfig {
            poll_interval: poll,
            ..fast_config()
        };

        let mut controller =
            SweepController::new(StuckInstrument, NoSensor, NeverCancel, config);
        let err = controller
            .run(&plan, &mut NullSink, |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(controller.phase(), SweepPhase::Faulted);

        match err {
            SweepError::SettleTimeout { target, elapsed } => {
                assert_relative_eq!(target, 1.0);
                // No earlier than the deadline, no later than the deadline
                // plus one poll (with scheduling slack).
                assert!(elapsed >= timeout);
                assert!(elapsed < timeout + poll + Duration::from_millis(50));
            }
            other => panic!("expected SettleTimeout, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_between_steps_stops_cleanly() {
        let flag = StopFlag::new();
        let mut sink = VecSink {
            stop_after: Some((2, flag.clone())),
            ..VecSink::default()
        };
        let mut cancel_calls = 0usize;

        let mut controller = SweepController::new(
            EchoInstrument::default(),
            FixedSensor { voltage: 1.0e-5 },
            flag,
            fast_config(),
        );
        let outcome = controller
            .run(&field_plan(), &mut sink, |_, _| {
                cancel_calls += 1;
                Ok(())
            })
            .unwrap();

        // Stop requested after the second emission takes effect at the next
        // iteration: exactly two records, shutdown hook exactly once.
        assert_eq!(outcome, SweepOutcome::Cancelled { emitted: 2 });
        assert_eq!(controller.phase(), SweepPhase::Cancelled);
        assert_eq!(sink.records.len(), 2);
        assert_eq!(cancel_calls, 1);
    }

    #[test]
    fn zero_reference_current_yields_nan_resistance() {
        let mut sink = VecSink::default();
        let config = SweepConfig {
            derived: vec![DerivedChannel::ratio(
                "Resistance (ohm)",
                "Voltage (V)",
                0.0,
            )],
            ..fast_config()
        };
        let plan = SweepPlan::from_setpoints(vec![Setpoint::new(0.1, 0.005)]);

        let mut controller = SweepController::new(
            EchoInstrument::default(),
            FixedSensor { voltage: 1.0e-3 },
            NeverCancel,
            config,
        );
        controller.run(&plan, &mut sink, |_, _| Ok(())).unwrap();

        let record = &sink.records[0];
        assert_relative_eq!(record.get("Voltage (V)").unwrap(), 1.0e-3);
        assert!(record.get("Resistance (ohm)").unwrap().is_nan());
    }

    #[test]
    fn tracked_setpoint_samples_until_target_readback() {
        let mut sink = VecSink::default();
        let instrument = RampInstrument {
            position: 0.0,
            target: 0.0,
            step: 0.5,
        };
        let config = SweepConfig {
            readback_channel: Some("Temperature (K)".to_string()),
            ..fast_config()
        };
        let plan =
            SweepPlan::from_setpoints(vec![Setpoint::new(1.0, 0.25)]).tracked();

        let mut controller =
            SweepController::new(instrument, FixedSensor { voltage: 3.0e-6 }, NeverCancel, config);
        let outcome = controller.run(&plan, &mut sink, |_, _| Ok(())).unwrap();

        // Readbacks go 0.5 (not settled, emitted) then 1.0 (settled, emitted).
        assert_eq!(outcome, SweepOutcome::Completed { emitted: 2 });
        assert_relative_eq!(sink.records[0].get("Temperature (K)").unwrap(), 0.5);
        assert_relative_eq!(sink.records[1].get("Temperature (K)").unwrap(), 1.0);
    }

    #[test]
    fn hardware_fault_aborts_run() {
        struct FaultyInstrument;
        impl SetpointInstrument for FaultyInstrument {
            fn move_to(&mut self, _target: f64) -> HardwareResult<()> {
                Err("link down".into())
            }
            fn readback(&mut self) -> HardwareResult<f64> {
                Err("link down".into())
            }
        }

        let mut controller =
            SweepController::new(FaultyInstrument, NoSensor, NeverCancel, fast_config());
        let err = controller
            .run(&field_plan(), &mut NullSink, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SweepError::Hardware(_)));
        assert_eq!(controller.phase(), SweepPhase::Faulted);
    }

    #[test]
    fn empty_plan_completes_immediately() {
        let mut controller = SweepController::new(
            EchoInstrument::default(),
            NoSensor,
            NeverCancel,
            fast_config(),
        );
        let outcome = controller
            .run(&SweepPlan::new(), &mut NullSink, |_, _| Ok(()))
            .unwrap();
        assert_eq!(outcome, SweepOutcome::Completed { emitted: 0 });
        assert_eq!(controller.phase(), SweepPhase::Done);
    }
}
