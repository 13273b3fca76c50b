mod utils {
    pub mod errors;
    pub mod logger;
    pub mod psutils;
    pub mod tick_trace;
}

mod accumulator;
mod cli;
mod collectors;
mod config;
mod monitor;
mod report;

use clap::Parser;
use cli::Args;
use collectors::SysinfoTable;
use log::{error, info, warn};
use monitor::{EXIT_INVALID_INVOCATION, FootprintMonitor, Shutdown};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit with code 2 before anything is observed
    let args = Args::parse();
    utils::logger::setup_logger();
    info!("Application started");

    let config = match args.footprint_config(SysinfoTable::cpu_count()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_INVALID_INVOCATION);
        }
    };

    info!(
        "{} CPUs, {} W maximum power, {} kgCO2/kWh",
        config.cpu_count(),
        config.max_power_watts(),
        config.kg_co2_per_kwh()
    );

    if !FootprintMonitor::<SysinfoTable>::is_available() {
        warn!("Process enumeration is not supported on this system; nothing will match");
    }

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    let mut monitor = FootprintMonitor::new(SysinfoTable::new(), args.monitor_options(), shutdown);
    println!("{}", report::banner(&args.cmdname));
    let observation = monitor.run().await;

    print!("{}", report::render(&observation, &config));

    if let Some(path) = &args.trace_csv {
        match monitor.trace_mut() {
            Some(trace) => match trace.write_csv(path) {
                Ok(()) => info!("Wrote {} ticks to {}", trace.row_count(), path.display()),
                Err(e) => warn!("{}", e),
            },
            None => warn!("No tick trace recorded; {} not written", path.display()),
        }
    }

    if let Some(peak) = monitor.trace_mut().and_then(|trace| trace.peak_cpu_percent()) {
        info!("Peak %CPU of '{}': {:.2}", observation.target, peak);
    }
    info!(
        "Program ended after {} ticks: {}",
        observation.ticks, observation.stop_reason
    );
    ExitCode::from(observation.exit_code())
}
