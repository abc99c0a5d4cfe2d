use crate::config::MetricsConfig;
use crate::errors::AppResult;
use crate::formatter::format_number;
use crate::models::NewMetricRecord;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub type JobResult = anyhow::Result<()>;

/// Destination for execution samples.
pub trait MetricSink: Send + Sync {
    fn record(&self, record: &NewMetricRecord) -> AppResult<()>;
}

pub trait MemoryProbe: Send + Sync {
    /// Highest resident memory observed so far, in bytes.
    fn peak_bytes(&self) -> u64;
}

/// Peak resident memory of the current process. Uses the kernel's
/// `ru_maxrss` where available, so memory freed before a reading still counts.
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    peak: AtomicU64,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(error) => {
                tracing::warn!(error = %error, "current pid unavailable, memory samples will be zero");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
            peak: AtomicU64::new(0),
        }
    }

    fn current_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let Ok(mut system) = self.system.lock() else {
            return 0;
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|process| process.memory()).unwrap_or(0)
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn peak_bytes(&self) -> u64 {
        let current = self.current_bytes().max(kernel_peak_bytes());
        self.peak.fetch_max(current, Ordering::Relaxed).max(current)
    }
}

/// Peak resident set size the kernel has recorded for this process.
#[cfg(unix)]
fn kernel_peak_bytes() -> u64 {
    use nix::sys::resource::{getrusage, UsageWho};

    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let max_rss = u64::try_from(usage.max_rss()).unwrap_or(0);
            // Darwin reports bytes, everything else kilobytes.
            if cfg!(any(target_os = "macos", target_os = "ios")) {
                max_rss
            } else {
                max_rss.saturating_mul(1024)
            }
        }
        Err(error) => {
            tracing::debug!(error = %error, "getrusage failed, falling back to sampled memory");
            0
        }
    }
}

#[cfg(not(unix))]
fn kernel_peak_bytes() -> u64 {
    0
}

/// Name and queue of the job being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub queue: Option<String>,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>, queue: Option<&str>) -> Self {
        Self {
            name: name.into(),
            queue: queue.map(ToString::to_string),
        }
    }
}

pub trait Job: Send {
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn queue(&self) -> Option<&str> {
        None
    }

    fn run(&mut self) -> JobResult;
}

pub trait JobMiddleware: Send + Sync {
    fn handle(&self, job: &JobDescriptor, next: Next<'_>) -> JobResult;
}

/// The remainder of a middleware chain followed by the job itself.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn JobMiddleware>],
    job: &'a JobDescriptor,
    run: &'a mut dyn FnMut() -> JobResult,
}

impl<'a> Next<'a> {
    pub fn run(self) -> JobResult {
        match self.middleware.split_first() {
            Some((head, rest)) => head.handle(
                self.job,
                Next {
                    middleware: rest,
                    job: self.job,
                    run: self.run,
                },
            ),
            None => (self.run)(),
        }
    }
}

/// Runs jobs through a fixed, ordered middleware list.
#[derive(Clone, Default)]
pub struct JobHarness {
    middleware: Vec<Arc<dyn JobMiddleware>>,
}

impl JobHarness {
    pub fn new(middleware: Vec<Arc<dyn JobMiddleware>>) -> Self {
        Self { middleware }
    }

    pub fn execute(&self, job: &mut dyn Job) -> JobResult {
        let descriptor = JobDescriptor {
            name: job.name(),
            queue: job.queue().map(ToString::to_string),
        };
        let mut run = || job.run();
        Next {
            middleware: &self.middleware,
            job: &descriptor,
            run: &mut run,
        }
        .run()
    }
}

pub struct MetricTracker {
    config: MetricsConfig,
    sink: Arc<dyn MetricSink>,
    probe: Arc<dyn MemoryProbe>,
}

impl MetricTracker {
    pub fn new(config: MetricsConfig, sink: Arc<dyn MetricSink>, probe: Arc<dyn MemoryProbe>) -> Self {
        Self { config, sink, probe }
    }

    /// Times `work` and records one sample. Recording failures never reach the caller.
    pub fn track<T>(&self, job: &JobDescriptor, work: impl FnOnce() -> T) -> T {
        if !self.config.track_jobs_metrics {
            return work();
        }

        let started = Instant::now();
        let result = work();
        self.record(job, started);
        result
    }

    pub async fn track_future<T, F>(&self, job: &JobDescriptor, work: F) -> T
    where
        F: Future<Output = T>,
    {
        if !self.config.track_jobs_metrics {
            return work.await;
        }

        let started = Instant::now();
        let result = work.await;
        self.record(job, started);
        result
    }

    fn record(&self, job: &JobDescriptor, started: Instant) {
        let elapsed = started.elapsed();
        let record = NewMetricRecord {
            job: job.name.clone(),
            queue: job.queue.clone(),
            duration_ms: format_number(elapsed.as_secs_f64() * 1000.0),
            memory_mb: format_number(self.probe.peak_bytes() as f64 / BYTES_PER_MB),
        };

        if let Err(error) = self.sink.record(&record) {
            if self.config.log_errors {
                tracing::error!(job = %record.job, error = %error, "failed to create job metric");
            }
        }
    }
}

impl JobMiddleware for MetricTracker {
    fn handle(&self, job: &JobDescriptor, next: Next<'_>) -> JobResult {
        self.track(job, || next.run())
    }
}
