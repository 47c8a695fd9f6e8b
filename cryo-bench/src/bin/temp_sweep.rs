//! Four-probe voltage vs temperature during a controlled ramp.
//!
//! Stabilizes the stage at the low end, then enables the controller's
//! setpoint ramp and tracks the climb to the high end, sampling the
//! nanovoltmeter continuously until the readback reaches the target.
//! With `--field` the magnet supply holds a fixed applied field for the
//! whole ramp (critical temperature vs field), energized after the stage
//! stabilizes and zeroed on every exit path. Press Enter to stop; heaters
//! are shut off on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cryo_bench::procedure::{self, MAGNET_COOLDOWN_CEILING};
use cryo_bench::sink::{CsvSink, LogSink, TeeSink};
use cryo_bench::stop_on_enter;
use hardware::{HeaterRange, InputChannel, K2182, Ls336, Ls625, TemperatureAxis, VOLTAGE_CHANNEL};
use sweep::{
    Amps, AmpsPerSecond, AmpsPerTesla, Kelvin, Setpoint, StopFlag, SweepConfig, SweepController,
    SweepOutcome, SweepPlan, Tesla,
};

const TEMPERATURE_CHANNEL: &str = "Temperature (K)";

const SAMPLE_HEATER_OUTPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "temp_sweep")]
#[command(about = "Four-probe measurement across a temperature ramp")]
struct Args {
    /// Temperature controller address
    #[arg(long, default_value = "192.168.0.14:7777")]
    tctrl_addr: String,

    /// Nanovoltmeter address
    #[arg(long, default_value = "192.168.0.17:7777")]
    meter_addr: String,

    /// Magnet supply address, required with --field
    #[arg(long)]
    magnet_addr: Option<String>,

    /// Fixed applied field in tesla for the whole ramp
    #[arg(long, requires = "magnet_addr")]
    field: Option<f64>,

    /// Field convergence window in tesla
    #[arg(long, default_value_t = 0.005)]
    field_tolerance: f64,

    /// Magnet coil constant in amperes per tesla
    #[arg(long, default_value_t = 13.2944)]
    field_constant: f64,

    /// Magnet ramp rate in amperes per second
    #[arg(long, default_value_t = 0.1)]
    field_ramp_rate: f64,

    /// Starting temperature in kelvin
    #[arg(long, default_value_t = 8.0)]
    min_temperature: f64,

    /// Final temperature in kelvin
    #[arg(long, default_value_t = 10.0)]
    max_temperature: f64,

    /// Setpoint ramp rate in kelvin per minute
    #[arg(long, default_value_t = 0.5)]
    ramp_rate: f64,

    /// Temperature convergence window in kelvin
    #[arg(long, default_value_t = 0.1)]
    temperature_tolerance: f64,

    /// Meter integration time in power-line cycles
    #[arg(long, default_value_t = 1.0)]
    nplc: f64,

    /// Sample heater current limit in amperes
    #[arg(long, default_value_t = 1.414)]
    heater_current: f64,

    /// Pause between samples in milliseconds
    #[arg(long, default_value_t = 100)]
    time_per_measurement_ms: u64,

    /// Soak time at the starting temperature in seconds
    #[arg(long, default_value_t = 30)]
    soak_secs: u64,

    /// Abort if the ramp has not finished after this many seconds
    #[arg(long)]
    settle_timeout_secs: Option<u64>,

    /// Output CSV path
    #[arg(long, default_value = "temp_sweep.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut tctrl = Ls336::connect(&args.tctrl_addr).context("temperature controller")?;
    let mut meter = K2182::connect(&args.meter_addr).context("nanovoltmeter")?;
    let mut magnet = match (&args.magnet_addr, args.field) {
        (Some(addr), Some(_)) => Some(Ls625::connect(addr).context("magnet supply")?),
        _ => None,
    };

    meter.reset()?;
    meter.configure_voltage(1, args.nplc)?;

    procedure::configure_sample_heater(
        &mut tctrl,
        SAMPLE_HEATER_OUTPUT,
        InputChannel::A,
        Amps(args.heater_current),
    )?;
    tctrl.set_control_setpoint(SAMPLE_HEATER_OUTPUT, Kelvin(args.min_temperature))?;
    tctrl.set_heater_range(SAMPLE_HEATER_OUTPUT, HeaterRange::Low)?;
    procedure::stabilize_temperature(
        &mut tctrl,
        SAMPLE_HEATER_OUTPUT,
        InputChannel::A,
        Kelvin(args.min_temperature),
        args.temperature_tolerance,
        Duration::from_secs(args.soak_secs),
    )?;

    // The applied field goes on after the stage has stabilized, so the
    // cooldown check sees the working thermal state.
    if let (Some(magnet), Some(field)) = (magnet.as_mut(), args.field) {
        procedure::check_magnet_cooldown(&mut tctrl, InputChannel::B, MAGNET_COOLDOWN_CEILING)?;
        magnet.set_ramp_rate(AmpsPerSecond(args.field_ramp_rate))?;
        let slew = AmpsPerTesla(args.field_constant)
            .current_for(Tesla(field))
            .ramp_time(AmpsPerSecond(args.field_ramp_rate))
            .unwrap_or(Duration::from_secs(60));
        procedure::energize_magnet(
            magnet,
            Tesla(field),
            args.field_tolerance,
            slew * 2 + Duration::from_secs(10),
        )?;
    }

    // The controller ramps its own setpoint toward the target; the sweep
    // tracks the readback, sampling as it climbs.
    tctrl.set_setpoint_ramp(SAMPLE_HEATER_OUTPUT, true, args.ramp_rate)?;

    let mut target = Setpoint::new(args.max_temperature, args.temperature_tolerance).tracked();
    if let Some(secs) = args.settle_timeout_secs {
        target = target.with_timeout(Duration::from_secs(secs));
    }
    let plan = SweepPlan::from_setpoints(vec![target]);

    let config = SweepConfig {
        sample_interval: Duration::from_millis(args.time_per_measurement_ms),
        readback_channel: Some(TEMPERATURE_CHANNEL.to_string()),
        ..SweepConfig::default()
    };

    let csv = CsvSink::create(&args.output, &[TEMPERATURE_CHANNEL, VOLTAGE_CHANNEL])?;
    let mut sink = TeeSink(csv, LogSink);

    let stop = StopFlag::new();
    stop_on_enter(stop.clone());

    info!(
        from = args.min_temperature,
        to = args.max_temperature,
        rate_k_per_min = args.ramp_rate,
        "starting temperature sweep (press Enter to stop)"
    );

    let run_result = {
        let axis = TemperatureAxis::new(&mut tctrl, SAMPLE_HEATER_OUTPUT, InputChannel::A);
        let mut controller = SweepController::new(axis, &mut meter, stop.clone(), config);
        controller.run(&plan, &mut sink, |axis, meter| {
            let output = axis.output();
            let ctrl = axis.controller();
            ctrl.set_setpoint_ramp(output, false, 0.0)?;
            ctrl.set_control_setpoint(output, Kelvin(0.0))?;
            ctrl.all_heaters_off()?;
            meter.reset()?;
            Ok(())
        })
    };

    let shutdown_result = shutdown(&mut tctrl, &mut meter, magnet.as_mut());

    let outcome = run_result?;
    shutdown_result?;

    match outcome {
        SweepOutcome::Completed { emitted } => {
            info!(emitted, output = %args.output.display(), "temperature sweep complete")
        }
        SweepOutcome::Cancelled { emitted } => {
            warn!(emitted, output = %args.output.display(), "temperature sweep stopped by operator")
        }
    }
    Ok(())
}

fn shutdown(tctrl: &mut Ls336, meter: &mut K2182, magnet: Option<&mut Ls625>) -> Result<()> {
    info!("shutting down");
    if let Some(magnet) = magnet {
        magnet.set_field(Tesla(0.0))?;
    }
    tctrl.set_setpoint_ramp(SAMPLE_HEATER_OUTPUT, false, 0.0)?;
    tctrl.set_control_setpoint(SAMPLE_HEATER_OUTPUT, Kelvin(0.0))?;
    tctrl.all_heaters_off()?;
    meter.reset()?;
    Ok(())
}
