//! Setpoints and sweep plans.

use std::time::Duration;

/// How the controller treats a setpoint once the move is commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Wait for the readback to converge, then sample exactly once.
    ///
    /// This is the discrete-step mode used by field and current staircases.
    Settle,
    /// Sample at the configured cadence while the instrument ramps on its
    /// own, stopping once the readback reaches the target.
    ///
    /// Used for temperature ramps where the controller hardware slews the
    /// setpoint internally and the interesting data is the approach itself.
    Track,
}

/// A single target for the controlled instrument.
///
/// Immutable once issued to the controller. The target is a bare `f64` in
/// whatever unit the instrument speaks (tesla, kelvin, amperes); plans are
/// built from typed values at the bench layer.
#[derive(Debug, Clone, Copy)]
pub struct Setpoint {
    /// Target value in instrument units.
    pub target: f64,
    /// Convergence window: settled when `|readback - target| < tolerance`.
    pub tolerance: f64,
    /// Wall-clock deadline for convergence. `None` polls forever.
    pub timeout: Option<Duration>,
    /// Step behavior, see [`SettleStrategy`].
    pub strategy: SettleStrategy,
}

impl Setpoint {
    /// A settle-then-sample setpoint with no timeout.
    pub fn new(target: f64, tolerance: f64) -> Self {
        Self {
            target,
            tolerance,
            timeout: None,
            strategy: SettleStrategy::Settle,
        }
    }

    /// Attach a convergence deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Switch this setpoint to [`SettleStrategy::Track`].
    pub fn tracked(mut self) -> Self {
        self.strategy = SettleStrategy::Track;
        self
    }

    /// Convergence check shared by both strategies.
    pub fn is_settled(&self, readback: f64) -> bool {
        (readback - self.target).abs() < self.tolerance
    }
}

/// An ordered sequence of setpoints.
///
/// Order is significant: the plan defines the monotonic physical path the
/// hardware follows, not just the endpoints. Plans are built by
/// concatenating sub-ranges, mirroring how the bench sweeps are described
/// (ramp up, ramp down, return to zero).
#[derive(Debug, Clone, Default)]
pub struct SweepPlan {
    setpoints: Vec<Setpoint>,
}

impl SweepPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_setpoints(setpoints: Vec<Setpoint>) -> Self {
        Self { setpoints }
    }

    /// Linear staircase from `start` toward `stop` in increments of `step`.
    ///
    /// `start` is included, `stop` is not (the next sub-range starts there).
    /// The sign of `step` is inferred from the direction of travel; a zero
    /// step yields an empty plan.
    pub fn ramp(start: f64, stop: f64, step: f64, tolerance: f64) -> Self {
        let mut setpoints = Vec::new();
        if step != 0.0 {
            let step = if stop >= start { step.abs() } else { -step.abs() };
            let mut value = start;
            while (step > 0.0 && value < stop) || (step < 0.0 && value > stop) {
                setpoints.push(Setpoint::new(value, tolerance));
                value += step;
            }
        }
        Self { setpoints }
    }

    /// The full there-and-back field path: `0 -> max -> min -> 0`.
    ///
    /// Ends with an explicit zero setpoint so the sweep itself returns the
    /// hardware to a de-energized state; the zero step follows the same
    /// settle contract as every other step.
    pub fn loop_through_zero(max: f64, min: f64, step: f64, tolerance: f64) -> Self {
        let mut plan = Self::ramp(0.0, max, step, tolerance);
        plan.extend(Self::ramp(max, min, step, tolerance));
        plan.extend(Self::ramp(min, 0.0, step, tolerance));
        plan.push(Setpoint::new(0.0, tolerance));
        plan
    }

    pub fn push(&mut self, setpoint: Setpoint) {
        self.setpoints.push(setpoint);
    }

    /// Append another plan, preserving its order.
    pub fn extend(&mut self, other: SweepPlan) {
        self.setpoints.extend(other.setpoints);
    }

    /// Apply a convergence deadline to every setpoint.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        for setpoint in &mut self.setpoints {
            setpoint.timeout = Some(timeout);
        }
        self
    }

    /// Switch every setpoint to [`SettleStrategy::Track`].
    pub fn tracked(mut self) -> Self {
        for setpoint in &mut self.setpoints {
            setpoint.strategy = SettleStrategy::Track;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Setpoint> {
        self.setpoints.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn targets(plan: &SweepPlan) -> Vec<f64> {
        plan.iter().map(|sp| sp.target).collect()
    }

    #[test]
    fn ramp_excludes_stop() {
        let plan = SweepPlan::ramp(0.0, 0.5, 0.1, 0.005);
        let targets = targets(&plan);
        assert_eq!(targets.len(), 5);
        assert_relative_eq!(targets[0], 0.0);
        assert_relative_eq!(targets[4], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn ramp_infers_direction() {
        let plan = SweepPlan::ramp(0.5, -0.5, 0.25, 0.005);
        let targets = targets(&plan);
        assert_eq!(targets.len(), 4);
        assert!(targets.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn zero_step_yields_empty_plan() {
        assert!(SweepPlan::ramp(0.0, 1.0, 0.0, 0.005).is_empty());
    }

    #[test]
    fn loop_sweep_ends_at_zero() {
        let plan = SweepPlan::loop_through_zero(0.5, -0.5, 0.25, 0.005);
        let targets = targets(&plan);
        // 0, 0.25 | 0.5, 0.25, 0, -0.25 | -0.5, -0.25 | 0
        assert_eq!(targets.len(), 9);
        assert_relative_eq!(*targets.last().unwrap(), 0.0);
        assert_relative_eq!(targets[2], 0.5, epsilon = 1e-12);
        assert_relative_eq!(targets[6], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn with_timeout_applies_to_every_setpoint() {
        let plan =
            SweepPlan::ramp(0.0, 0.3, 0.1, 0.005).with_timeout(Duration::from_secs(30));
        assert!(plan
            .iter()
            .all(|sp| sp.timeout == Some(Duration::from_secs(30))));
    }

    #[test]
    fn settled_window_is_exclusive() {
        let sp = Setpoint::new(1.0, 0.1);
        assert!(sp.is_settled(0.95));
        assert!(sp.is_settled(1.05));
        assert!(!sp.is_settled(1.1));
        assert!(!sp.is_settled(0.9));
    }
}
