use crate::utils::psutils::{command_line_matches, short_command_line};
use std::collections::BTreeMap;

/// One process as seen at a single instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command_line: Vec<String>,
    /// User + system CPU seconds since the process started
    pub cumulative_cpu_time: f64,
    /// Instantaneous utilization, not cumulative
    pub instant_cpu_percent: f64,
    pub user: Option<String>,
}

impl ProcessRecord {
    pub fn new(
        pid: u32,
        command_line: Vec<String>,
        cumulative_cpu_time: f64,
        instant_cpu_percent: f64,
    ) -> Self {
        Self {
            pid,
            command_line,
            cumulative_cpu_time,
            instant_cpu_percent,
            user: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Enumeration of the process table at one instant. Discarded after folding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<ProcessRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<ProcessRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records of a snapshot whose joined command line contains the target,
/// excluding the observer itself.
#[derive(Debug)]
pub struct MatchSet<'a> {
    records: Vec<&'a ProcessRecord>,
}

impl<'a> MatchSet<'a> {
    pub fn select(snapshot: &'a Snapshot, target: &str, observer_pid: u32) -> Self {
        let records = snapshot
            .records
            .iter()
            .filter(|record| record.pid != observer_pid)
            .filter(|record| command_line_matches(&record.command_line, target))
            .collect();
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cpu_percent(&self) -> f64 {
        self.records
            .iter()
            .fold(0.0, |total, r| total + r.instant_cpu_percent)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.pid).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ProcessRecord> + '_ {
        self.records.iter().copied()
    }
}

/// What one tick contributed, for the live tick line.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub cpu_percent_now: f64,
    pub total_cpu_time: f64,
    pub matched_pids: Vec<u32>,
    /// Elapsed observation time after this tick
    pub elapsed: f64,
}

impl TickOutcome {
    pub fn is_matched(&self) -> bool {
        !self.matched_pids.is_empty()
    }
}

/// One row of the final per-PID table.
#[derive(Debug, Clone, PartialEq)]
pub struct PidBreakdown {
    pub pid: u32,
    pub cpu_time: f64,
    pub command: String,
    pub user: Option<String>,
}

/// Running totals over every PID that ever matched the target.
///
/// Entries are never removed: a PID that exits keeps its last sampled CPU time,
/// so the grand total never drops when processes come and go. Identity is the
/// PID alone; if the OS hands an exited PID to a new process that also matches
/// the target, the new process is treated as a continuation of the old entry.
#[derive(Debug)]
pub struct Accumulator {
    target: String,
    observer_pid: u32,
    every_pid_cpu_time: BTreeMap<u32, f64>,
    every_pid_command_line: BTreeMap<u32, String>,
    every_pid_user: BTreeMap<u32, String>,
    sum_real_time: f64,
    sum_cpu_percent_integral: f64,
    has_ever_matched: bool,
}

impl Accumulator {
    pub fn new(target: impl Into<String>, observer_pid: u32) -> Self {
        Self {
            target: target.into(),
            observer_pid,
            every_pid_cpu_time: BTreeMap::new(),
            every_pid_command_line: BTreeMap::new(),
            every_pid_user: BTreeMap::new(),
            sum_real_time: 0.0,
            sum_cpu_percent_integral: 0.0,
            has_ever_matched: false,
        }
    }

    /// Folds one snapshot into the running totals. `delta_secs` is the wall-clock
    /// time since the previous tick and only counts when the target is present.
    pub fn fold(&mut self, snapshot: &Snapshot, delta_secs: f64) -> TickOutcome {
        let matches = MatchSet::select(snapshot, &self.target, self.observer_pid);
        let cpu_percent_now = matches.cpu_percent();

        for record in matches.iter() {
            self.every_pid_cpu_time
                .insert(record.pid, record.cumulative_cpu_time);
            self.every_pid_command_line
                .entry(record.pid)
                .or_insert_with(|| short_command_line(&record.command_line));
            if let Some(user) = &record.user {
                self.every_pid_user
                    .entry(record.pid)
                    .or_insert_with(|| user.clone());
            }
        }

        if !matches.is_empty() {
            self.has_ever_matched = true;
            self.sum_real_time += delta_secs;
            self.sum_cpu_percent_integral += delta_secs * cpu_percent_now;
        }

        TickOutcome {
            cpu_percent_now,
            total_cpu_time: self.total_cpu_time(),
            matched_pids: matches.pids(),
            elapsed: self.sum_real_time,
        }
    }

    /// Sum of the last known CPU time of every PID ever matched.
    /// Starts from +0.0 so an empty run never reports `-0.00`.
    pub fn total_cpu_time(&self) -> f64 {
        self.every_pid_cpu_time
            .values()
            .fold(0.0, |total, cpu_time| total + cpu_time)
    }

    pub fn sum_real_time(&self) -> f64 {
        self.sum_real_time
    }

    /// Percent-seconds: instantaneous %CPU weighted by the time each tick covered.
    pub fn sum_cpu_percent_integral(&self) -> f64 {
        self.sum_cpu_percent_integral
    }

    pub fn has_ever_matched(&self) -> bool {
        self.has_ever_matched
    }

    #[cfg(test)]
    pub fn cpu_time_of(&self, pid: u32) -> Option<f64> {
        self.every_pid_cpu_time.get(&pid).copied()
    }

    /// Per-PID rows ordered by PID.
    pub fn breakdown(&self) -> Vec<PidBreakdown> {
        self.every_pid_cpu_time
            .iter()
            .map(|(&pid, &cpu_time)| PidBreakdown {
                pid,
                cpu_time,
                command: self
                    .every_pid_command_line
                    .get(&pid)
                    .cloned()
                    .unwrap_or_default(),
                user: self.every_pid_user.get(&pid).cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const OBSERVER: u32 = 4242;

    fn record(pid: u32, cmd: &[&str], cpu_time: f64, percent: f64) -> ProcessRecord {
        ProcessRecord::new(
            pid,
            cmd.iter().map(|s| s.to_string()).collect(),
            cpu_time,
            percent,
        )
    }

    #[test]
    fn test_match_set_excludes_observer_and_non_matching() {
        let snapshot = Snapshot::new(vec![
            record(10, &["stress", "--cpu", "2"], 1.0, 90.0),
            record(OBSERVER, &["footprint", "stress"], 0.1, 1.0),
            record(11, &["bash"], 5.0, 0.0),
            record(12, &[], 3.0, 10.0),
        ]);
        let matches = MatchSet::select(&snapshot, "stress", OBSERVER);
        assert_eq!(matches.pids(), vec![10]);
        assert_eq!(matches.cpu_percent(), 90.0);
    }

    #[test]
    fn test_empty_match_set_does_not_advance_time() {
        let mut acc = Accumulator::new("stress", OBSERVER);
        let outcome = acc.fold(&Snapshot::new(vec![record(1, &["bash"], 9.0, 5.0)]), 1.0);
        assert!(!outcome.is_matched());
        assert_eq!(outcome.cpu_percent_now, 0.0);
        assert_eq!(acc.sum_real_time(), 0.0);
        assert_eq!(acc.sum_cpu_percent_integral(), 0.0);
        assert!(!acc.has_ever_matched());
        assert!(acc.breakdown().is_empty());
    }

    #[test]
    fn test_empty_totals_are_positive_zero() {
        let mut acc = Accumulator::new("stress", OBSERVER);
        assert!(acc.total_cpu_time().is_sign_positive());
        let outcome = acc.fold(&Snapshot::default(), 1.0);
        assert!(outcome.total_cpu_time.is_sign_positive());
        assert!(outcome.cpu_percent_now.is_sign_positive());
    }

    #[test]
    fn test_stress_scenario_totals() {
        let mut acc = Accumulator::new("stress", OBSERVER);
        acc.fold(&Snapshot::new(vec![record(100, &["stress", "--cpu", "1"], 2.0, 50.0)]), 0.0);
        let second = acc.fold(&Snapshot::new(vec![record(100, &["stress", "--cpu", "1"], 3.0, 60.0)]), 1.0);
        assert_eq!(second.total_cpu_time, 3.0);
        assert_eq!(second.cpu_percent_now, 60.0);
        assert_eq!(acc.sum_real_time(), 1.0);
        assert_eq!(acc.sum_cpu_percent_integral(), 60.0);

        let third = acc.fold(&Snapshot::default(), 1.0);
        assert!(!third.is_matched());
        assert_eq!(third.total_cpu_time, 3.0);
        assert!(acc.has_ever_matched());
    }

    #[test]
    fn test_exited_pid_keeps_last_value() {
        let mut acc = Accumulator::new("worker", OBSERVER);
        acc.fold(
            &Snapshot::new(vec![
                record(1, &["worker", "a"], 4.0, 100.0),
                record(2, &["worker", "b"], 1.5, 100.0),
            ]),
            1.0,
        );
        // pid 1 has exited, pid 3 appeared
        let outcome = acc.fold(
            &Snapshot::new(vec![
                record(2, &["worker", "b"], 2.5, 100.0),
                record(3, &["worker", "c"], 0.5, 50.0),
            ]),
            1.0,
        );
        assert_eq!(acc.cpu_time_of(1), Some(4.0));
        assert_eq!(acc.cpu_time_of(2), Some(2.5));
        assert_eq!(outcome.total_cpu_time, 7.0);
        assert_eq!(outcome.matched_pids, vec![2, 3]);
    }

    #[test]
    fn test_first_command_line_wins() {
        let mut acc = Accumulator::new("job", OBSERVER);
        acc.fold(&Snapshot::new(vec![record(7, &["job", "--first", "x"], 1.0, 0.0).with_user("alice")]), 1.0);
        acc.fold(&Snapshot::new(vec![record(7, &["job", "--second"], 2.0, 0.0).with_user("bob")]), 1.0);
        let rows = acc.breakdown();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "job --first");
        assert_eq!(rows[0].user.as_deref(), Some("alice"));
        assert_eq!(rows[0].cpu_time, 2.0);
    }

    #[test]
    fn test_breakdown_sorted_by_pid() {
        let mut acc = Accumulator::new("x", OBSERVER);
        acc.fold(
            &Snapshot::new(vec![
                record(30, &["x"], 1.0, 0.0),
                record(4, &["x"], 1.0, 0.0),
                record(17, &["x"], 1.0, 0.0),
            ]),
            1.0,
        );
        let pids: Vec<u32> = acc.breakdown().iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![4, 17, 30]);
    }

    #[test]
    fn test_grand_total_never_decreases_under_churn() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let mut acc = Accumulator::new("load", OBSERVER);
            // pid -> cumulative cpu time while alive
            let mut alive: BTreeMap<u32, f64> = BTreeMap::new();
            let mut next_pid = 100;
            let mut previous_total = 0.0;

            for _ in 0..40 {
                alive.retain(|_, _| rng.gen_bool(0.8));
                for _ in 0..rng.gen_range(0..3) {
                    alive.insert(next_pid, 0.0);
                    next_pid += 1;
                }
                for cpu_time in alive.values_mut() {
                    *cpu_time += rng.gen_range(0.0..1.0);
                }

                let mut records: Vec<ProcessRecord> = alive
                    .iter()
                    .map(|(&pid, &cpu_time)| record(pid, &["load", "--busy"], cpu_time, 25.0))
                    .collect();
                records.push(record(1, &["init"], 1000.0, 0.0));
                let seen_before: Vec<u32> = acc.breakdown().iter().map(|r| r.pid).collect();

                let outcome = acc.fold(&Snapshot::new(records), 1.0);
                assert!(outcome.total_cpu_time >= previous_total);
                for pid in seen_before {
                    assert!(acc.cpu_time_of(pid).is_some());
                }
                previous_total = outcome.total_cpu_time;
            }
        }
    }
}
