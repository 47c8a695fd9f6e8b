//! Four-probe resistance vs magnetic field at fixed temperature.
//!
//! Stabilizes the sample stage, verifies the magnet cooldown, then steps
//! the field `0 -> max -> min -> 0` with a fixed excitation current,
//! recording field, voltage and resistance per step. Press Enter to stop
//! the sweep; the field is zeroed before the program exits on every path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cryo_bench::procedure::{self, MAGNET_COOLDOWN_CEILING};
use cryo_bench::sink::{CsvSink, LogSink, TeeSink};
use cryo_bench::stop_on_enter;
use hardware::{Gs200, HeaterRange, InputChannel, K2182, Ls336, Ls625, SourceMode, VOLTAGE_CHANNEL};
use sweep::{
    Amps, AmpsPerSecond, AmpsPerTesla, DerivedChannel, Kelvin, StopFlag, SweepConfig,
    SweepController, SweepOutcome, SweepPlan, Tesla,
};

const FIELD_CHANNEL: &str = "Magnetic Field (T)";
const RESISTANCE_CHANNEL: &str = "Resistance (ohm)";

/// Heater output loop driving the sample stage.
const SAMPLE_HEATER_OUTPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "field_sweep")]
#[command(about = "Four-probe field sweep at fixed temperature")]
struct Args {
    /// Magnet supply address
    #[arg(long, default_value = "192.168.0.12:7777")]
    magnet_addr: String,

    /// Temperature controller address
    #[arg(long, default_value = "192.168.0.14:7777")]
    tctrl_addr: String,

    /// Nanovoltmeter address
    #[arg(long, default_value = "192.168.0.17:7777")]
    meter_addr: String,

    /// Excitation source address
    #[arg(long, default_value = "192.168.0.13:7777")]
    source_addr: String,

    /// Sample name, for the log
    #[arg(long, default_value = "DefaultSample")]
    sample_name: String,

    /// Sample stage temperature in kelvin
    #[arg(long, default_value_t = 10.0)]
    set_temperature: f64,

    /// Temperature convergence window in kelvin
    #[arg(long, default_value_t = 0.05)]
    temperature_tolerance: f64,

    /// Excitation current in amperes
    #[arg(long, default_value_t = 1e-4)]
    set_current: f64,

    /// Maximum field in tesla
    #[arg(long, default_value_t = 0.5)]
    max_field: f64,

    /// Minimum field in tesla
    #[arg(long, default_value_t = -0.5)]
    min_field: f64,

    /// Field step in tesla
    #[arg(long, default_value_t = 0.01)]
    field_step: f64,

    /// Field convergence window in tesla
    #[arg(long, default_value_t = 0.005)]
    field_tolerance: f64,

    /// Magnet coil constant in amperes per tesla
    #[arg(long, default_value_t = 13.2944)]
    field_constant: f64,

    /// Magnet ramp rate in amperes per second
    #[arg(long, default_value_t = 0.1)]
    ramp_rate: f64,

    /// Meter integration time in power-line cycles
    #[arg(long, default_value_t = 5.0)]
    nplc: f64,

    /// Sample heater current limit in amperes
    #[arg(long, default_value_t = 1.414)]
    heater_current: f64,

    /// Field readback poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,

    /// Pause between samples in milliseconds
    #[arg(long, default_value_t = 20)]
    sample_interval_ms: u64,

    /// Output CSV path
    #[arg(long, default_value = "field_sweep.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut magnet = Ls625::connect(&args.magnet_addr).context("magnet supply")?;
    let mut tctrl = Ls336::connect(&args.tctrl_addr).context("temperature controller")?;
    let mut meter = K2182::connect(&args.meter_addr).context("nanovoltmeter")?;
    let mut source = Gs200::connect(&args.source_addr).context("excitation source")?;

    // Startup: magnet de-energized, meter and source configured, stage
    // settled at the working temperature, magnet verified cold.
    magnet.set_field(Tesla(0.0))?;
    magnet.set_ramp_rate(AmpsPerSecond(args.ramp_rate))?;

    meter.reset()?;
    meter.configure_voltage(1, args.nplc)?;

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
    tctrl.set_control_setpoint(SAMPLE_HEATER_OUTPUT, Kelvin(args.set_temperature))?;
    tctrl.set_heater_range(SAMPLE_HEATER_OUTPUT, HeaterRange::Low)?;
    procedure::stabilize_temperature(
        &mut tctrl,
        SAMPLE_HEATER_OUTPUT,
        InputChannel::A,
        Kelvin(args.set_temperature),
        args.temperature_tolerance,
        Duration::from_secs(10),
    )?;
    procedure::check_magnet_cooldown(&mut tctrl, InputChannel::B, MAGNET_COOLDOWN_CEILING)?;

    // One field step slews (step * coil constant) of current at the ramp
    // rate; allow five times that plus slack before calling a step stuck.
    let coil = AmpsPerTesla(args.field_constant);
    let step_slew = coil
        .current_for(Tesla(args.field_step))
        .ramp_time(AmpsPerSecond(args.ramp_rate))
        .unwrap_or(Duration::from_secs(60));
    let settle_timeout = step_slew * 5 + Duration::from_secs(10);

    let plan = SweepPlan::loop_through_zero(
        args.max_field,
        args.min_field,
        args.field_step,
        args.field_tolerance,
    )
    .with_timeout(settle_timeout);

    let config = SweepConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        post_settle_delay: Duration::ZERO,
        sample_interval: Duration::from_millis(args.sample_interval_ms),
        readback_channel: Some(FIELD_CHANNEL.to_string()),
        derived: vec![DerivedChannel::ratio(
            RESISTANCE_CHANNEL,
            VOLTAGE_CHANNEL,
            args.set_current,
        )],
    };

    let csv = CsvSink::create(
        &args.output,
        &[FIELD_CHANNEL, VOLTAGE_CHANNEL, RESISTANCE_CHANNEL],
    )?;
    let mut sink = TeeSink(csv, LogSink);

    let stop = StopFlag::new();
    stop_on_enter(stop.clone());

    info!(
        sample = %args.sample_name,
        setpoints = plan.len(),
        "starting field sweep (press Enter to stop)"
    );

    let run_result = {
        let mut controller =
            SweepController::new(&mut magnet, &mut meter, stop.clone(), config);
        controller.run(&plan, &mut sink, |magnet, _meter| {
            // De-energize before the run returns; the rest of the
            // shutdown sequence follows below.
            magnet.set_field(Tesla(0.0))?;
            Ok(())
        })
    };

    // Hardware-safe shutdown runs on every exit path, fault included.
    let shutdown_result = shutdown(&mut magnet, &mut tctrl, &mut meter, &mut source);

    let outcome = run_result?;
    shutdown_result?;

    match outcome {
        SweepOutcome::Completed { emitted } => {
            info!(emitted, output = %args.output.display(), "field sweep complete")
        }
        SweepOutcome::Cancelled { emitted } => {
            warn!(emitted, output = %args.output.display(), "field sweep stopped by operator")
        }
    }
    Ok(())
}

fn shutdown(
    magnet: &mut Ls625,
    tctrl: &mut Ls336,
    meter: &mut K2182,
    source: &mut Gs200,
) -> Result<()> {
    info!("shutting down");
    magnet.set_field(Tesla(0.0))?;
    source.shutdown()?;
    tctrl.set_control_setpoint(SAMPLE_HEATER_OUTPUT, Kelvin(0.0))?;
    tctrl.all_heaters_off()?;
    meter.reset()?;
    Ok(())
}
