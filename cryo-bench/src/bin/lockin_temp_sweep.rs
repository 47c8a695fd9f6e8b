//! Lock-in four-probe measurement across a temperature ramp.
//!
//! Same ramp as `temp_sweep`, but the sensor is a Stanford SR830 lock-in
//! instead of the nanovoltmeter: each sample snaps the coherent X/Y/R
//! channels at the reference frequency, for signals too small for a DC
//! measurement. The excitation source supplies the fixed probe current.
//! Press Enter to stop; heaters and source are shut off on every exit
//! path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cryo_bench::procedure;
use cryo_bench::sink::{CsvSink, LogSink, TeeSink};
use cryo_bench::stop_on_enter;
use hardware::{
    Gs200, HeaterRange, InputChannel, Ls336, SourceMode, Sr830, TemperatureAxis,
    MAGNITUDE_CHANNEL, X_CHANNEL, Y_CHANNEL,
};
use sweep::{
    Amps, DerivedChannel, Kelvin, Setpoint, StopFlag, SweepConfig, SweepController,
    SweepOutcome, SweepPlan,
};

const TEMPERATURE_CHANNEL: &str = "Temperature (K)";
const RESISTANCE_CHANNEL: &str = "Resistance (ohm)";

const SAMPLE_HEATER_OUTPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "lockin_temp_sweep")]
#[command(about = "Lock-in four-probe measurement across a temperature ramp")]
struct Args {
    /// Temperature controller address
    #[arg(long, default_value = "192.168.0.14:7777")]
    tctrl_addr: String,

    /// Lock-in amplifier address
    #[arg(long, default_value = "192.168.0.18:7777")]
    lockin_addr: String,

    /// Excitation source address
    #[arg(long, default_value = "192.168.0.13:7777")]
    source_addr: String,

    /// Excitation current in amperes
    #[arg(long, default_value_t = 1e-3)]
    set_current: f64,

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

    /// Sample heater current limit in amperes
    #[arg(long, default_value_t = 1.414)]
    heater_current: f64,

    /// Pause between samples in milliseconds
    #[arg(long, default_value_t = 100)]
    time_per_measurement_ms: u64,

    /// Soak time at the starting temperature in seconds
    #[arg(long, default_value_t = 10)]
    soak_secs: u64,

    /// Abort if the ramp has not finished after this many seconds
    #[arg(long)]
    settle_timeout_secs: Option<u64>,

    /// Output CSV path
    #[arg(long, default_value = "lockin_temp_sweep.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut tctrl = Ls336::connect(&args.tctrl_addr).context("temperature controller")?;
    let mut lockin = Sr830::connect(&args.lockin_addr).context("lock-in amplifier")?;
    let mut source = Gs200::connect(&args.source_addr).context("excitation source")?;

    lockin.reset()?;

    source.reset()?;
    source.set_source_mode(SourceMode::Current)?;
    source.set_source_range(args.set_current)?;
    source.set_source_level(args.set_current)?;
    source.set_output_enabled(true)?;

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

    tctrl.set_setpoint_ramp(SAMPLE_HEATER_OUTPUT, true, args.ramp_rate)?;

    let mut target = Setpoint::new(args.max_temperature, args.temperature_tolerance).tracked();
    if let Some(secs) = args.settle_timeout_secs {
        target = target.with_timeout(Duration::from_secs(secs));
    }
    let plan = SweepPlan::from_setpoints(vec![target]);

    let config = SweepConfig {
        sample_interval: Duration::from_millis(args.time_per_measurement_ms),
        readback_channel: Some(TEMPERATURE_CHANNEL.to_string()),
        derived: vec![DerivedChannel::ratio(
            RESISTANCE_CHANNEL,
            MAGNITUDE_CHANNEL,
            args.set_current,
        )],
        ..SweepConfig::default()
    };

    let csv = CsvSink::create(
        &args.output,
        &[
            TEMPERATURE_CHANNEL,
            X_CHANNEL,
            Y_CHANNEL,
            MAGNITUDE_CHANNEL,
            RESISTANCE_CHANNEL,
        ],
    )?;
    let mut sink = TeeSink(csv, LogSink);

    let stop = StopFlag::new();
    stop_on_enter(stop.clone());

    info!(
        from = args.min_temperature,
        to = args.max_temperature,
        rate_k_per_min = args.ramp_rate,
        "starting lock-in temperature sweep (press Enter to stop)"
    );

    let run_result = {
        let axis = TemperatureAxis::new(&mut tctrl, SAMPLE_HEATER_OUTPUT, InputChannel::A);
        let mut controller = SweepController::new(axis, &mut lockin, stop.clone(), config);
        controller.run(&plan, &mut sink, |axis, lockin| {
            let output = axis.output();
            let ctrl = axis.controller();
            ctrl.set_setpoint_ramp(output, false, 0.0)?;
            ctrl.set_control_setpoint(output, Kelvin(0.0))?;
            ctrl.all_heaters_off()?;
            lockin.reset()?;
            Ok(())
        })
    };

    let shutdown_result = shutdown(&mut tctrl, &mut source);

    let outcome = run_result?;
    shutdown_result?;

    match outcome {
        SweepOutcome::Completed { emitted } => {
            info!(emitted, output = %args.output.display(), "lock-in temperature sweep complete")
        }
        SweepOutcome::Cancelled { emitted } => {
            warn!(emitted, output = %args.output.display(), "lock-in temperature sweep stopped by operator")
        }
    }
    Ok(())
}

fn shutdown(tctrl: &mut Ls336, source: &mut Gs200) -> Result<()> {
    info!("shutting down");
    source.shutdown()?;
    tctrl.set_setpoint_ramp(SAMPLE_HEATER_OUTPUT, false, 0.0)?;
    tctrl.set_control_setpoint(SAMPLE_HEATER_OUTPUT, Kelvin(0.0))?;
    tctrl.all_heaters_off()?;
    Ok(())
}
