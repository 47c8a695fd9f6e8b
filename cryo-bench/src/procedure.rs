//! Startup and shutdown sequences shared by the bench binaries.
//!
//! Every experiment starts the same way: configure the sample heater
//! loop, settle the stage at the working temperature, and (when the magnet
//! is involved) verify it is cold enough to energize. The stabilization
//! wait reuses the sweep controller with a single setpoint and a null
//! sink - settling is the point, the sample is discarded.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;

use hardware::{
    HeaterOutputUnits, HeaterResistance, InputChannel, Ls336, Ls625, TemperatureAxis,
};
use sweep::{
    Amps, Kelvin, NeverCancel, NoSensor, NullSink, Setpoint, SweepConfig, SweepController,
    SweepPlan, Tesla,
};

/// Superconducting magnet temperature above which it must not be
/// energized.
pub const MAGNET_COOLDOWN_CEILING: Kelvin = Kelvin(5.1);

/// Configure a heater output as the closed-loop sample stage controller.
///
/// PID settings are the low-range values used on this cryostat; adjust
/// when running the high heater range.
pub fn configure_sample_heater(
    tctrl: &mut Ls336,
    output: u8,
    input: InputChannel,
    max_current: Amps,
) -> Result<()> {
    tctrl.set_heater_pid(output, 50.0, 50.0, 0.0)?;
    tctrl.set_heater_setup(output, HeaterResistance::R25, max_current, HeaterOutputUnits::Power)?;
    tctrl.set_heater_output_mode(output, input, true)?;
    tctrl.set_setpoint_ramp(output, false, 0.0)?;
    Ok(())
}

/// Block until the stage input reads within `tolerance` of `target`,
/// then soak there before returning.
///
/// The soak covers thermal gradients the readback cannot see; the source
/// scripts sat 10-30 s at temperature before trusting a measurement.
pub fn stabilize_temperature(
    tctrl: &mut Ls336,
    output: u8,
    input: InputChannel,
    target: Kelvin,
    tolerance: f64,
    soak: Duration,
) -> Result<()> {
    info!(%target, "waiting for sample stage to stabilize");

    let plan = SweepPlan::from_setpoints(vec![Setpoint::new(target.value(), tolerance)]);
    let config = SweepConfig {
        poll_interval: Duration::from_secs(1),
        post_settle_delay: soak,
        sample_interval: Duration::ZERO,
        readback_channel: None,
        derived: Vec::new(),
    };

    let axis = TemperatureAxis::new(tctrl, output, input);
    let mut controller = SweepController::new(axis, NoSensor, NeverCancel, config);
    controller.run(&plan, &mut NullSink, |_, _| Ok(()))?;

    info!(%target, "sample stage stabilized");
    Ok(())
}

/// Program a fixed applied field and block until the readback reaches it.
///
/// Used by ramp experiments that hold one field for the whole run; the
/// supply slews at its configured ramp rate, so this is the same settle
/// run as a single step of a field sweep.
pub fn energize_magnet(
    magnet: &mut Ls625,
    field: Tesla,
    tolerance: f64,
    timeout: Duration,
) -> Result<()> {
    info!(%field, "energizing magnet");

    let plan = SweepPlan::from_setpoints(vec![
        Setpoint::new(field.value(), tolerance).with_timeout(timeout),
    ]);
    let config = SweepConfig {
        poll_interval: Duration::from_millis(500),
        post_settle_delay: Duration::ZERO,
        sample_interval: Duration::ZERO,
        readback_channel: None,
        derived: Vec::new(),
    };

    let mut controller = SweepController::new(&mut *magnet, NoSensor, NeverCancel, config);
    controller.run(&plan, &mut NullSink, |_, _| Ok(()))?;

    info!(%field, "applied field reached");
    Ok(())
}

/// Refuse to energize the magnet unless it is below `ceiling`.
///
/// Surfaced as an ordinary error for the caller to handle; the bench
/// never kills the process from inside a safety check.
pub fn check_magnet_cooldown(
    tctrl: &mut Ls336,
    magnet_input: InputChannel,
    ceiling: Kelvin,
) -> Result<Kelvin> {
    let temperature = tctrl.kelvin_reading(magnet_input)?;
    if temperature.value() > ceiling.value() {
        bail!(
            "magnet at {temperature}, above the {ceiling} cooldown ceiling; refusing to energize"
        );
    }
    info!(%temperature, "magnet cold enough to energize");
    Ok(temperature)
}
