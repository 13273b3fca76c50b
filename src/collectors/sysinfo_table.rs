use crate::accumulator::{ProcessRecord, Snapshot};
use crate::monitor::SnapshotProvider;
use crate::utils::errors::FootprintError;
use crate::utils::psutils::resolve_username;
use async_trait::async_trait;
use log::{debug, trace, warn};
use std::ffi::OsString;
use sysinfo::{
    CpuRefreshKind, Process, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
    UpdateKind,
};
use users::UsersCache;

/// Reads the OS process table through `sysinfo`.
pub struct SysinfoTable {
    system: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first sample already has a baseline
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        Self { system }
    }

    /// Number of logical CPUs on this machine
    pub fn cpu_count() -> usize {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        system.cpus().len().max(1)
    }

    fn to_record(
        process: &Process,
        users_cache: &UsersCache,
    ) -> Result<ProcessRecord, FootprintError> {
        let pid = process.pid().as_u32();
        let command_line = command_line_of(pid, process.cmd())?;
        let user = process
            .user_id()
            .map(|uid| resolve_username(**uid, users_cache))
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ProcessRecord::new(
            pid,
            command_line,
            process.accumulated_cpu_time() as f64 / 1000.0,
            process.cpu_usage() as f64,
        )
        .with_user(user))
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The command line is re-read every refresh: `exec` keeps the PID but
/// replaces the command line.
fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cpu()
        .with_cmd(UpdateKind::Always)
        .with_user(UpdateKind::OnlyIfNotSet)
}

/// Kernel threads, zombies and processes we may not inspect have no command line
fn command_line_of(pid: u32, cmd: &[OsString]) -> Result<Vec<String>, FootprintError> {
    if cmd.is_empty() {
        return Err(FootprintError::SnapshotUnavailable {
            pid,
            reason: "command line unavailable".to_string(),
        });
    }
    Ok(cmd
        .iter()
        .map(|token| token.to_string_lossy().to_string())
        .collect())
}

/// Builds a PID-ordered snapshot, dropping the processes that could not be read.
fn collect_snapshot<I>(results: I) -> Snapshot
where
    I: IntoIterator<Item = Result<ProcessRecord, FootprintError>>,
{
    let mut skipped = 0;
    let mut records = Vec::new();
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                trace!("{}", e);
                skipped += 1;
            }
        }
    }
    records.sort_by_key(|record| record.pid);
    debug!(
        "Sampled {} processes, skipped {} without a command line",
        records.len(),
        skipped
    );
    Snapshot::new(records)
}

#[async_trait]
impl SnapshotProvider for SysinfoTable {
    async fn sample(&mut self) -> Snapshot {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

        let users_cache = UsersCache::new();
        let snapshot = collect_snapshot(
            self.system
                .processes()
                .values()
                .map(|process| Self::to_record(process, &users_cache)),
        );
        if snapshot.is_empty() {
            warn!("Process table could not be read; treating this tick as empty");
        }
        snapshot
    }

    fn is_available() -> bool {
        sysinfo::IS_SUPPORTED_SYSTEM
    }
}
