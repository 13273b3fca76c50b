use crate::accumulator::PidBreakdown;
use crate::config::FootprintConfig;
use crate::monitor::{Observation, StopReason};
use crate::utils::tick_trace::TickRow;

const SEPARATOR: &str = "----------------------------------------------------------";

/// Energy and emissions derived from accumulated CPU time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    /// Watt-seconds
    pub energy_ws: f64,
    /// Grams of CO2 equivalent
    pub emissions_g_co2: f64,
}

impl Footprint {
    /// energy = cpu time / cpu count * max power
    pub fn derive(cpu_time: f64, config: &FootprintConfig) -> Self {
        let energy_ws = cpu_time * config.max_power_watts() / config.cpu_count() as f64;
        Self {
            energy_ws,
            emissions_g_co2: energy_ws * config.g_co2_per_ws(),
        }
    }
}

pub fn banner(target: &str) -> String {
    format!(
        "\nStart the software '{target}' from another terminal window!\n\
         Stop this logging by ending '{target}' or by pressing ctrl+c\n"
    )
}

pub fn waiting_notice(target: &str) -> String {
    format!("waiting for '{}' to appear in process list", target)
}

pub fn tick_header() -> String {
    format!("\n{}\ntime\ttimestamp\t%CPU\tCPUTIME\tPIDs", SEPARATOR)
}

pub fn tick_line(row: &TickRow) -> String {
    format!(
        "{:.2}\t{:.2}\t{:.2}\t{:.2}\t{}",
        row.elapsed,
        row.timestamp,
        row.cpu_percent,
        row.total_cpu_time,
        row.joined_pids()
    )
}

pub fn finished_notice(target: &str) -> String {
    format!("{}\n\nLogging for command '{}' finished", SEPARATOR, target)
}

pub fn interrupted_notice() -> String {
    "\nbreak".to_string()
}

pub fn breakdown_table(rows: &[PidBreakdown]) -> String {
    let mut out = String::from("PID\tcpuTime\tCommand\tUser\n");
    for row in rows {
        out.push_str(&format!(
            "{}\t{:.2}\t{}\t{}\n",
            row.pid,
            row.cpu_time,
            row.command,
            row.user.as_deref().unwrap_or("-")
        ));
    }
    out
}

pub fn summary(observation: &Observation, config: &FootprintConfig) -> String {
    let footprint = Footprint::derive(observation.total_cpu_time, config);
    format!(
        "Time\tCPU\t\tcpuTime\n\
         [s]\t[%*s]\t\t[s]\n\
         {:.2}\t{:.2}\t\t{:.2}\n\
         \n\
         This computer has {} CPUs or CPU cores and a maximum power of {} Watt\n\
         energy consumption = cpuTime / cpu_number * max_power\n\
         \n\
         Software footprint of '{}' on this computer:\n\
         Energy consumption:\t{}\tWs\n\
         Carbon emissions:\t{:.3}\tgCO2e\n",
        observation.sum_real_time,
        observation.sum_cpu_percent_integral,
        observation.total_cpu_time,
        config.cpu_count(),
        config.max_power_watts(),
        observation.target,
        footprint.energy_ws.trunc() as i64,
        footprint.emissions_g_co2,
    )
}

/// Final report: per-PID table followed by the summary.
pub fn render(observation: &Observation, config: &FootprintConfig) -> String {
    let mut out = String::new();
    if observation.stop_reason == StopReason::StillWaiting {
        out.push_str(&format!(
            "Observation of '{}' has not finished\n",
            observation.target
        ));
    }
    out.push('\n');
    out.push_str(&breakdown_table(&observation.breakdown));
    out.push('\n');
    out.push_str(&summary(observation, config));
    out
}
