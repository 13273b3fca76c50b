use crate::accumulator::{Accumulator, PidBreakdown, Snapshot, TickOutcome};
use crate::report;
use crate::utils::errors::FootprintError;
use crate::utils::tick_trace::{TickRow, TickTrace};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub const EXIT_INTERRUPTED: u8 = 0;
pub const EXIT_FINISHED: u8 = 1;
pub const EXIT_INVALID_INVOCATION: u8 = 2;

#[async_trait]
pub trait SnapshotProvider: Send + 'static {
    /// Enumerate the live processes. A process that cannot be queried is left
    /// out of the snapshot; sampling itself never fails.
    async fn sample(&mut self) -> Snapshot;

    /// Check if this provider can enumerate processes on the system
    fn is_available() -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Not terminal: the run has not finished yet
    StillWaiting,
    TimeBudgetExceeded,
    TargetVanishedAfterMatch,
    Interrupted,
}

impl StopReason {
    pub fn exit_code(self) -> Option<u8> {
        match self {
            StopReason::StillWaiting => None,
            StopReason::Interrupted => Some(EXIT_INTERRUPTED),
            StopReason::TimeBudgetExceeded | StopReason::TargetVanishedAfterMatch => {
                Some(EXIT_FINISHED)
            }
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::StillWaiting => "still waiting",
            StopReason::TimeBudgetExceeded => "time budget exceeded",
            StopReason::TargetVanishedAfterMatch => "target vanished",
            StopReason::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    /// Target has not appeared yet; `announced` is set once the waiting notice is out
    Waiting { announced: bool },
    Observing,
    Finished(StopReason),
}

impl MonitorState {
    /// State after one tick. `Finished` is absorbing.
    pub fn next(
        self,
        matched: bool,
        has_ever_matched: bool,
        sum_real_time: f64,
        time_budget: f64,
    ) -> MonitorState {
        match (self, matched) {
            (MonitorState::Finished(reason), _) => MonitorState::Finished(reason),
            (_, false) if has_ever_matched => {
                MonitorState::Finished(StopReason::TargetVanishedAfterMatch)
            }
            (_, false) => MonitorState::Waiting { announced: true },
            (_, true) if time_budget > 0.0 && sum_real_time >= time_budget => {
                MonitorState::Finished(StopReason::TimeBudgetExceeded)
            }
            (_, true) => MonitorState::Observing,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, MonitorState::Finished(_))
    }
}

/// Cancellation handle shared between the signal listener and the tick loop.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called.
    pub async fn triggered(&self) {
        let notified = self.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// Triggers on ctrl+c, and on SIGTERM where available.
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(()) => {
                    info!("Interrupt received, finishing the current tick");
                    shutdown.trigger();
                }
                Err(e) => warn!("Failed to listen for interrupt signals: {}", e),
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let terminate = signal(SignalKind::terminate()).map(|mut sigterm| async move {
        sigterm.recv().await;
    });
    first_signal(tokio::signal::ctrl_c(), terminate).await
}

/// Resolves on whichever signal comes first. Without a SIGTERM handler
/// ctrl+c alone still stops the run.
#[cfg(unix)]
async fn first_signal<C, T>(ctrl_c: C, terminate: std::io::Result<T>) -> std::io::Result<()>
where
    C: Future<Output = std::io::Result<()>>,
    T: Future<Output = ()>,
{
    match terminate {
        Ok(terminate) => tokio::select! {
            result = ctrl_c => result,
            _ = terminate => Ok(()),
        },
        Err(e) => {
            warn!("Failed to listen for SIGTERM, only ctrl+c will stop logging: {}", e);
            ctrl_c.await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Substring searched for in each joined command line
    pub target: String,
    /// Seconds of observation before stopping, 0 = unbounded
    pub time_budget: f64,
    pub tick_interval: Duration,
    /// Never matched, so the monitor does not count itself
    pub observer_pid: u32,
}

impl MonitorOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            time_budget: 0.0,
            tick_interval: Duration::from_secs(1),
            observer_pid: std::process::id(),
        }
    }

    pub fn with_time_budget(mut self, seconds: f64) -> Self {
        self.time_budget = seconds;
        self
    }

    #[cfg(test)]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    #[cfg(test)]
    pub fn with_observer_pid(mut self, observer_pid: u32) -> Self {
        self.observer_pid = observer_pid;
        self
    }
}

/// Accumulated record of a finished run, handed to the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub target: String,
    pub stop_reason: StopReason,
    pub total_cpu_time: f64,
    pub sum_real_time: f64,
    pub sum_cpu_percent_integral: f64,
    pub breakdown: Vec<PidBreakdown>,
    pub ticks: u64,
}

impl Observation {
    pub fn exit_code(&self) -> u8 {
        self.stop_reason.exit_code().unwrap_or(EXIT_FINISHED)
    }
}

/// Drives the sample, fold, decide, sleep cycle for one target command.
/// # Type Parameters
/// * `T` - A process table source that implements `SnapshotProvider`
pub struct FootprintMonitor<T: SnapshotProvider> {
    options: MonitorOptions,
    provider: T,
    accumulator: Accumulator,
    state: MonitorState,
    shutdown: Shutdown,
    /// Observed ticks, kept for export after the run
    trace: Option<TickTrace>,
    last_tick: Option<Instant>,
    ticks: u64,
}

impl<T: SnapshotProvider> FootprintMonitor<T> {
    pub fn new(provider: T, options: MonitorOptions, shutdown: Shutdown) -> Self {
        let trace = match TickTrace::new() {
            Ok(trace) => Some(trace),
            Err(e) => {
                warn!("{}; continuing without a tick trace", e);
                None
            }
        };
        let accumulator = Accumulator::new(options.target.clone(), options.observer_pid);

        Self {
            options,
            provider,
            accumulator,
            state: MonitorState::Idle,
            shutdown,
            trace,
            last_tick: None,
            ticks: 0,
        }
    }

    /// Check if the underlying provider is available on the system
    pub fn is_available() -> bool {
        T::is_available()
    }

    #[cfg(test)]
    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stop_reason(&self) -> StopReason {
        match self.state {
            MonitorState::Finished(reason) => reason,
            _ => StopReason::StillWaiting,
        }
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn trace_mut(&mut self) -> Option<&mut TickTrace> {
        self.trace.as_mut()
    }

    /// Idle -> Waiting. Time is measured from here.
    pub fn start(&mut self) {
        if self.state == MonitorState::Idle {
            info!(
                "Observing processes whose command line contains '{}'",
                self.options.target
            );
            self.state = MonitorState::Waiting { announced: false };
        }
        self.last_tick = Some(Instant::now());
    }

    /// One sample and fold. Δt is the wall-clock time since the previous tick,
    /// so sampling latency is counted rather than lost.
    pub async fn tick(&mut self) -> MonitorState {
        if self.state.is_finished() {
            return self.state;
        }

        let snapshot = self.provider.sample().await;
        let now = Instant::now();
        let delta_secs = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        let outcome = self.accumulator.fold(&snapshot, delta_secs);
        self.ticks += 1;
        debug!(
            "Tick {}: {} processes sampled, {} matched",
            self.ticks,
            snapshot.len(),
            outcome.matched_pids.len()
        );

        let next = self.state.next(
            outcome.is_matched(),
            self.accumulator.has_ever_matched(),
            self.accumulator.sum_real_time(),
            self.options.time_budget,
        );
        self.enter(next, &outcome);
        next
    }

    fn enter(&mut self, next: MonitorState, outcome: &TickOutcome) {
        let previous = self.state;

        if previous == (MonitorState::Waiting { announced: false })
            && next == (MonitorState::Waiting { announced: true })
        {
            println!("{}", report::waiting_notice(&self.options.target));
        }
        if previous != MonitorState::Observing && outcome.is_matched() {
            println!("{}", report::tick_header());
        }

        if outcome.is_matched() || self.accumulator.has_ever_matched() {
            let row = TickRow {
                elapsed: outcome.elapsed,
                timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
                cpu_percent: outcome.cpu_percent_now,
                total_cpu_time: outcome.total_cpu_time,
                pids: outcome.matched_pids.clone(),
            };
            println!("{}", report::tick_line(&row));
            let failed = self.trace.as_mut().and_then(|trace| trace.append(&row).err());
            if let Some(e) = failed {
                warn!("{}; dropping the tick trace", e);
                self.trace = None;
            }
        }

        if let MonitorState::Finished(reason) = next {
            info!("Observation finished: {}", reason);
            println!("{}", report::finished_notice(&self.options.target));
        }
        self.state = next;
    }

    fn interrupt(&mut self) {
        if !self.state.is_finished() {
            info!("{}, producing the final report", FootprintError::Interrupted);
            println!("{}", report::interrupted_notice());
            self.state = MonitorState::Finished(StopReason::Interrupted);
        }
    }

    /// Ticks until a stop condition holds or the shutdown handle fires,
    /// then returns the accumulated record. Always returns a record.
    pub async fn run(&mut self) -> Observation {
        self.start();
        let shutdown = self.shutdown.clone();

        loop {
            if self.tick().await.is_finished() {
                break;
            }
            if shutdown.is_triggered() {
                self.interrupt();
                break;
            }

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(self.options.tick_interval) => false,
                _ = shutdown.triggered() => true,
            };
            if interrupted {
                self.interrupt();
                break;
            }
        }

        self.observation()
    }

    pub fn observation(&self) -> Observation {
        Observation {
            target: self.options.target.clone(),
            stop_reason: self.stop_reason(),
            total_cpu_time: self.accumulator.total_cpu_time(),
            sum_real_time: self.accumulator.sum_real_time(),
            sum_cpu_percent_integral: self.accumulator.sum_cpu_percent_integral(),
            breakdown: self.accumulator.breakdown(),
            ticks: self.ticks,
        }
    }
}
