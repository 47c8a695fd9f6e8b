//! Current-voltage characteristic of a cryogenic sample.
//!
//! Steps the source current `0 -> max -> min -> 0`, reading the voltage
//! drop at each step and computing the point resistance from the two
//! measured channels. Press Enter to stop; the source output is zeroed
//! and disabled on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cryo_bench::sink::{CsvSink, LogSink, TeeSink};
use cryo_bench::stop_on_enter;
use hardware::{Gs200, K2182, SourceMode, VOLTAGE_CHANNEL};
use sweep::{
    DerivedChannel, StopFlag, SweepConfig, SweepController, SweepOutcome, SweepPlan,
};

const CURRENT_CHANNEL: &str = "Current (A)";
const RESISTANCE_CHANNEL: &str = "Resistance (ohm)";

#[derive(Parser, Debug)]
#[command(name = "iv_sweep")]
#[command(about = "Current-voltage sweep through zero")]
struct Args {
    /// Current source address
    #[arg(long, default_value = "192.168.0.13:7777")]
    source_addr: String,

    /// Nanovoltmeter address
    #[arg(long, default_value = "192.168.0.17:7777")]
    meter_addr: String,

    /// Maximum source current in amperes
    #[arg(long, default_value_t = 1e-3)]
    max_current: f64,

    /// Minimum source current in amperes
    #[arg(long, default_value_t = -1e-3)]
    min_current: f64,

    /// Current step in amperes
    #[arg(long, default_value_t = 2e-5)]
    current_step: f64,

    /// Current convergence window in amperes
    #[arg(long, default_value_t = 1e-8)]
    current_tolerance: f64,

    /// Dwell after each step in milliseconds
    #[arg(long, default_value_t = 20)]
    delay_ms: u64,

    /// Meter integration time in power-line cycles
    #[arg(long, default_value_t = 1.0)]
    nplc: f64,

    /// Source compliance voltage in volts
    #[arg(long, default_value_t = 1.0)]
    voltage_protection: f64,

    /// Output CSV path
    #[arg(long, default_value = "iv_sweep.csv")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut source = Gs200::connect(&args.source_addr).context("current source")?;
    let mut meter = K2182::connect(&args.meter_addr).context("nanovoltmeter")?;

    meter.reset()?;
    meter.configure_voltage(1, args.nplc)?;

    source.reset()?;
    source.set_source_mode(SourceMode::Current)?;
    source.set_source_range(args.max_current)?;
    source.set_voltage_protection(args.voltage_protection)?;
    source.set_source_level(0.0)?;
    source.set_output_enabled(true)?;

    // Source levels apply immediately; the timeout only guards against a
    // wedged instrument.
    let plan = SweepPlan::loop_through_zero(
        args.max_current,
        args.min_current,
        args.current_step,
        args.current_tolerance,
    )
    .with_timeout(Duration::from_secs(5));

    let config = SweepConfig {
        post_settle_delay: Duration::from_millis(args.delay_ms),
        sample_interval: Duration::ZERO,
        readback_channel: Some(CURRENT_CHANNEL.to_string()),
        derived: vec![DerivedChannel::channel_ratio(
            RESISTANCE_CHANNEL,
            VOLTAGE_CHANNEL,
            CURRENT_CHANNEL,
        )],
        ..SweepConfig::default()
    };

    let csv = CsvSink::create(
        &args.output,
        &[CURRENT_CHANNEL, VOLTAGE_CHANNEL, RESISTANCE_CHANNEL],
    )?;
    let mut sink = TeeSink(csv, LogSink);

    let stop = StopFlag::new();
    stop_on_enter(stop.clone());

    info!(
        setpoints = plan.len(),
        max = args.max_current,
        min = args.min_current,
        "starting IV sweep (press Enter to stop)"
    );

    let run_result = {
        let mut controller =
            SweepController::new(&mut source, &mut meter, stop.clone(), config);
        controller.run(&plan, &mut sink, |source, meter| {
            source.shutdown()?;
            meter.reset()?;
            Ok(())
        })
    };

    let shutdown_result = shutdown(&mut source, &mut meter);

    let outcome = run_result?;
    shutdown_result?;

    match outcome {
        SweepOutcome::Completed { emitted } => {
            info!(emitted, output = %args.output.display(), "IV sweep complete")
        }
        SweepOutcome::Cancelled { emitted } => {
            warn!(emitted, output = %args.output.display(), "IV sweep stopped by operator")
        }
    }
    Ok(())
}

fn shutdown(source: &mut Gs200, meter: &mut K2182) -> Result<()> {
    info!("shutting down");
    source.shutdown()?;
    meter.reset()?;
    Ok(())
}
