//! Command-line interface: `footprint CMDNAME [LOGTIME]` plus machine constants.

use crate::config::{DEFAULT_KG_CO2_PER_KWH, DEFAULT_MAX_POWER_WATTS, FootprintConfig};
use crate::monitor::MonitorOptions;
use crate::utils::errors::FootprintError;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "footprint",
    version,
    about = "Energy consumption and carbon emissions of a command, from its CPU time",
    long_about = "Scans the process table once per second for processes whose command line \
                  contains CMDNAME and adds up their CPU time, including processes that have \
                  already exited. Logging stops when CMDNAME disappears, when LOGTIME is \
                  exceeded, or on ctrl+c. The CPU time is then converted into energy and \
                  greenhouse gas emissions for this machine."
)]
pub struct Args {
    /// Command to observe, matched against the full command line (e.g. firefox, stress)
    pub cmdname: String,

    /// Maximum logging time in seconds, 0 = until CMDNAME ends
    #[arg(value_parser = parse_log_time, default_value_t = 0.0)]
    pub logtime: f64,

    /// Maximum power draw of this machine in watts
    #[arg(long, default_value_t = DEFAULT_MAX_POWER_WATTS)]
    pub max_power: f64,

    /// Carbon intensity of the power grid in kgCO2/kWh
    #[arg(long, default_value_t = DEFAULT_KG_CO2_PER_KWH)]
    pub carbon_intensity: f64,

    /// Number of CPUs or CPU cores (detected if omitted)
    #[arg(long)]
    pub cpu_count: Option<usize>,

    /// Write one row per observed tick to this CSV file when logging ends
    #[arg(long)]
    pub trace_csv: Option<PathBuf>,
}

/// An empty LOGTIME means unbounded, like an omitted one.
pub fn parse_log_time(value: &str) -> Result<f64, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(seconds),
        _ => Err("LOGTIME must be a number (maximum log time in seconds)".to_string()),
    }
}

impl Args {
    pub fn footprint_config(&self, detected_cpus: usize) -> Result<FootprintConfig, FootprintError> {
        FootprintConfig::new(
            self.max_power,
            self.cpu_count.unwrap_or(detected_cpus),
            self.carbon_intensity,
        )
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions::new(self.cmdname.clone()).with_time_budget(self.logtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_target_only() {
        let args = Args::try_parse_from(["footprint", "stress"]).unwrap();
        assert_eq!(args.cmdname, "stress");
        assert_eq!(args.logtime, 0.0);
        let options = args.monitor_options();
        assert_eq!(options.target, "stress");
        assert_eq!(options.time_budget, 0.0);
        assert_eq!(options.observer_pid, std::process::id());
    }

    #[test]
    fn test_target_and_log_time() {
        let args = Args::try_parse_from(["footprint", "firefox", "60"]).unwrap();
        assert_eq!(args.logtime, 60.0);
        assert_eq!(args.monitor_options().time_budget, 60.0);
    }

    #[test]
    fn test_empty_log_time_is_unbounded() {
        let args = Args::try_parse_from(["footprint", "stress", ""]).unwrap();
        assert_eq!(args.monitor_options().time_budget, 0.0);
    }

    #[test]
    fn test_non_numeric_log_time_is_usage_error() {
        let err = Args::try_parse_from(["footprint", "firefox", "soon"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_target_is_usage_error() {
        let err = Args::try_parse_from(["footprint"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_log_time() {
        assert_eq!(parse_log_time("1.5"), Ok(1.5));
        assert_eq!(parse_log_time("0"), Ok(0.0));
        assert!(parse_log_time("-3").is_err());
        assert!(parse_log_time("inf").is_err());
        assert_eq!(parse_log_time(""), Ok(0.0));
        assert_eq!(parse_log_time("  "), Ok(0.0));
    }

    #[test]
    fn test_constants_override() {
        let args = Args::try_parse_from([
            "footprint",
            "stress",
            "--max-power",
            "65",
            "--carbon-intensity",
            "0.4",
            "--cpu-count",
            "16",
        ])
        .unwrap();
        let config = args.footprint_config(4).unwrap();
        assert_eq!(config.max_power_watts(), 65.0);
        assert_eq!(config.cpu_count(), 16);
        assert_eq!(config.kg_co2_per_kwh(), 0.4);

        let detected = Args::try_parse_from(["footprint", "stress"]).unwrap();
        assert_eq!(detected.footprint_config(4).unwrap().cpu_count(), 4);
    }

    #[test]
    fn test_invalid_constant_rejected() {
        let args = Args::try_parse_from(["footprint", "stress", "--max-power", "0"]).unwrap();
        assert!(matches!(
            args.footprint_config(4),
            Err(FootprintError::InvalidArgument(_))
        ));
    }
}
