//! Tick Trace Module
//!
//! Keeps one row per observed tick in a DataFrame so a run can be exported
//! once it has finished.
//!
//! # Examples
//!
//! ```ignore
//! let mut trace = TickTrace::new()?;
//! trace.append(&row)?;
//! trace.write_csv(Path::new("run.csv"))?;
//! ```

use crate::utils::errors::FootprintError;
use itertools::Itertools;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// One observed tick: elapsed | timestamp | cpu_percent | total_cpu_time | pids
#[derive(Debug, Clone)]
pub struct TickRow {
    pub elapsed: f64,
    /// Seconds since UNIX_EPOCH
    pub timestamp: f64,
    pub cpu_percent: f64,
    pub total_cpu_time: f64,
    pub pids: Vec<u32>,
}

impl TickRow {
    /// PIDs joined with underscores, the form used in the live tick line
    pub fn joined_pids(&self) -> String {
        self.pids.iter().join("_")
    }
}

pub struct TickTrace {
    /// DataFrame: elapsed | timestamp | cpu_percent | total_cpu_time | pids
    data: DataFrame,
}

impl TickTrace {
    pub fn new() -> Result<Self, FootprintError> {
        let data = df![
            "elapsed" => Vec::<f64>::new(),
            "timestamp" => Vec::<f64>::new(),
            "cpu_percent" => Vec::<f64>::new(),
            "total_cpu_time" => Vec::<f64>::new(),
            "pids" => Vec::<String>::new(),
        ]
        .map_err(|e| FootprintError::Trace(format!("Failed to create tick trace: {}", e)))?;

        Ok(Self { data })
    }

    #[cfg(test)]
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn row_count(&self) -> usize {
        self.data.height()
    }

    pub fn append(&mut self, row: &TickRow) -> Result<(), FootprintError> {
        let new_data = df![
            "elapsed" => vec![row.elapsed],
            "timestamp" => vec![row.timestamp],
            "cpu_percent" => vec![row.cpu_percent],
            "total_cpu_time" => vec![row.total_cpu_time],
            "pids" => vec![row.joined_pids()],
        ]
        .map_err(|e| FootprintError::Trace(format!("Failed to create tick row: {}", e)))?;

        self.data = self
            .data
            .clone()
            .vstack(&new_data)
            .map_err(|e| FootprintError::Trace(format!("Failed to append tick row: {}", e)))?;

        Ok(())
    }

    /// Highest summed %CPU seen on any tick
    pub fn peak_cpu_percent(&self) -> Option<f64> {
        self.data
            .column("cpu_percent")
            .ok()
            .and_then(|col| col.f64().ok())
            .and_then(|s| s.max())
    }

    pub fn write_csv(&mut self, path: &Path) -> Result<(), FootprintError> {
        let mut file = File::create(path).map_err(|e| {
            FootprintError::Trace(format!("Failed to create {}: {}", path.display(), e))
        })?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut self.data)
            .map_err(|e| FootprintError::Trace(format!("Failed to write {}: {}", path.display(), e)))
    }
}
