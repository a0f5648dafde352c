//! Adaptive job dispatcher.
//!
//! [`Dispatcher`] decides which worker of a fixed pool receives each incoming
//! job and keeps per-worker and per-job bookkeeping as jobs start and finish.
//! It learns each worker's bandwidth on the fly by timing a probe job, then
//! ranks workers by a priority derived from that estimate.
//!
//! # Placement
//! 1. **Force-feed**: while some worker has never received a probe, a
//!    known-size job goes to the first such worker (pool order).
//!    Unknown-size jobs skip this phase.
//! 2. **Priority**: otherwise the worker with the strictly greatest priority
//!    wins; ties go to the earlier worker in pool order.
//!
//! See [`worker`] for the attribution scheme and the priority formula.
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | State | One explicitly constructed `Dispatcher` owns workers and the job index |
//! | Concurrency | `&mut self` on every mutation, single writer, no interior mutability |
//! | Worker order | `Vec` in bootstrap order, deterministic force-feed and tie-breaking |
//! | Time | Injected [`Clock`] so tests drive attribution deterministically |
//! | Errors | `Result<_, DispatchError>`, checked before any mutation |
//!
//! # Example
//! ```rust,ignore
//! let mut d = Dispatcher::new(["A", "B"], PolicyConfig::default())?;
//! let worker = d.assign("job1", JobSize::Known(100.0))?.to_string();
//! d.complete("job1")?;
//! ```

pub mod error;
pub mod worker;

pub use error::DispatchError;
pub use worker::{ProbingState, Worker};

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::PolicyConfig;
use crate::job::{JobRecord, JobSize};

use worker::{base_priority, completion_share, probe_bandwidth};

// ── Snapshot types ────────────────────────────────────────────────────────────

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub name: String,
    pub active_jobs: u32,
    pub assigned_jobs: u64,
    pub completed_jobs: u64,
    pub bandwidth: f64,
    pub probing: bool,
    pub force_fed: bool,
    pub priority: f64,
}

/// Point-in-time view of the whole dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSnapshot {
    pub workers: Vec<WorkerSnapshot>,
    pub tracked_jobs: usize,
    pub total_completions: u64,
    pub completed_load: f64,
    pub warmed_up: bool,
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The placement engine.  Performs no I/O; driven entirely by
/// [`assign`](Self::assign) and [`complete`](Self::complete).
pub struct Dispatcher<C: Clock = MonotonicClock> {
    config: PolicyConfig,
    clock: C,
    /// Bootstrap order is the force-feed and tie-break order.
    workers: Vec<Worker>,
    worker_index: HashMap<String, usize>,
    jobs: HashMap<String, JobRecord>,
    total_completions: u64,
    completed_load: f64,
    /// Running sum/count of known declared sizes, for the unknown-size fallback.
    known_size_sum: f64,
    known_size_count: u64,
}

impl Dispatcher<MonotonicClock> {
    /// Create a dispatcher over `workers` using the wall clock.
    pub fn new<I, S>(workers: I, config: PolicyConfig) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_clock(workers, config, MonotonicClock)
    }
}

impl<C: Clock> Dispatcher<C> {
    /// Create a dispatcher over `workers` with an explicit time source.
    ///
    /// # Errors
    /// [`DispatchError::EmptyPool`] for an empty list,
    /// [`DispatchError::DuplicateWorker`] if a name repeats.
    pub fn with_clock<I, S>(workers: I, config: PolicyConfig, clock: C) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = clock.now();
        let mut list = Vec::new();
        let mut worker_index = HashMap::new();
        for name in workers {
            let name = name.into();
            if worker_index.contains_key(&name) {
                return Err(DispatchError::DuplicateWorker { name });
            }
            worker_index.insert(name.clone(), list.len());
            list.push(Worker::new(name, config.default_bandwidth, now));
        }
        if list.is_empty() {
            return Err(DispatchError::EmptyPool);
        }

        let mut dispatcher = Self {
            config,
            clock,
            workers: list,
            worker_index,
            jobs: HashMap::new(),
            total_completions: 0,
            completed_load: 0.0,
            known_size_sum: 0.0,
            known_size_count: 0,
        };
        dispatcher.refresh_priorities();

        info!(
            worker_count = dispatcher.workers.len(),
            workers = ?dispatcher.workers.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            default_bandwidth = dispatcher.config.default_bandwidth,
            "dispatcher initialised"
        );
        Ok(dispatcher)
    }

    // ── Public operations ─────────────────────────────────────────────────────

    /// Place `job` on a worker and return the worker's name.
    ///
    /// # Errors
    /// [`DispatchError::DuplicateJob`] if `job` is already tracked; nothing
    /// is mutated in that case.
    pub fn assign(&mut self, job: &str, size: JobSize) -> Result<&str, DispatchError> {
        if self.jobs.contains_key(job) {
            return Err(DispatchError::DuplicateJob {
                job: job.to_string(),
            });
        }

        let now = self.clock.now();
        let (idx, force_fed) = match self.select_force_feed(size) {
            Some(idx) => (idx, true),
            None => (self.select_by_priority(), false),
        };

        let load = match size {
            JobSize::Known(v) => {
                self.known_size_sum += v;
                self.known_size_count += 1;
                v
            }
            JobSize::Unknown => self.default_load(),
        };

        let w = &mut self.workers[idx];
        if force_fed {
            w.force_fed = true;
        }
        w.advance_attribution(now);
        if size.is_known() {
            w.track_probe(job);
        }
        w.active_jobs += 1;
        w.assigned_jobs += 1;

        self.jobs.insert(
            job.to_string(),
            JobRecord {
                worker: idx,
                size,
                load,
            },
        );
        self.refresh_priorities();

        let w = &self.workers[idx];
        debug!(
            job = %job,
            size = %size,
            worker = %w.name,
            force_fed,
            active = w.active_jobs,
            priority = w.priority,
            "job assigned"
        );
        Ok(w.name.as_str())
    }

    /// Record that `job` finished.
    ///
    /// If `job` is a known-size job on a probing worker, the worker's
    /// bandwidth is finalised from the job's attributed time.
    ///
    /// # Errors
    /// [`DispatchError::UnknownJob`] if `job` is not tracked; nothing is
    /// mutated in that case.
    pub fn complete(&mut self, job: &str) -> Result<(), DispatchError> {
        let record = self
            .jobs
            .remove(job)
            .ok_or_else(|| DispatchError::UnknownJob {
                job: job.to_string(),
            })?;

        let now = self.clock.now();
        let w = &mut self.workers[record.worker];

        // Attribution covers the interval that ended now, so it runs while
        // the completing job still counts as active.
        let attributed = if w.is_probing() {
            w.advance_attribution(now);
            w.take_attribution(job)
        } else {
            None
        };

        w.active_jobs = w.active_jobs.saturating_sub(1);
        w.completed_jobs += 1;
        self.total_completions += 1;
        self.completed_load += record.load;

        if let (JobSize::Known(size), Some(attributed_us)) = (record.size, attributed) {
            match probe_bandwidth(size, attributed_us) {
                Some(bw) => {
                    w.resolve(bw);
                    info!(
                        worker = %w.name,
                        job = %job,
                        size,
                        attributed_us,
                        bandwidth = bw,
                        "probe resolved worker bandwidth"
                    );
                }
                None => {
                    warn!(
                        worker = %w.name,
                        job = %job,
                        size,
                        attributed_us,
                        "inconclusive probe (zero size or zero time), worker keeps probing"
                    );
                }
            }
        }

        self.refresh_priorities();

        let w = &self.workers[record.worker];
        debug!(
            job = %job,
            worker = %w.name,
            active = w.active_jobs,
            probing = w.is_probing(),
            priority = w.priority,
            "job completed"
        );
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Workers in pool order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Look up a worker by name.
    pub fn worker(&self, name: &str) -> Result<&Worker, DispatchError> {
        self.worker_index
            .get(name)
            .map(|&i| &self.workers[i])
            .ok_or_else(|| DispatchError::UnknownWorker {
                name: name.to_string(),
            })
    }

    pub fn is_tracked(&self, job: &str) -> bool {
        self.jobs.contains_key(job)
    }

    pub fn tracked_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Name of the worker `job` was placed on, if it is still tracked.
    pub fn assigned_worker(&self, job: &str) -> Option<&str> {
        self.jobs
            .get(job)
            .map(|r| self.workers[r.worker].name.as_str())
    }

    /// Load value an unknown-size job would be charged right now: the mean
    /// of all known sizes seen so far, or the configured seed before any.
    pub fn default_load(&self) -> f64 {
        if self.known_size_count == 0 {
            self.config.default_job_size
        } else {
            self.known_size_sum / self.known_size_count as f64
        }
    }

    /// Whether completion-share scaling is in effect.
    pub fn is_warmed_up(&self) -> bool {
        self.total_completions > 0 && self.completed_load > self.config.warmup_load
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            workers: self
                .workers
                .iter()
                .map(|w| WorkerSnapshot {
                    name: w.name.clone(),
                    active_jobs: w.active_jobs,
                    assigned_jobs: w.assigned_jobs,
                    completed_jobs: w.completed_jobs,
                    bandwidth: w.bandwidth,
                    probing: w.is_probing(),
                    force_fed: w.force_fed,
                    priority: w.priority,
                })
                .collect(),
            tracked_jobs: self.jobs.len(),
            total_completions: self.total_completions,
            completed_load: self.completed_load,
            warmed_up: self.is_warmed_up(),
        }
    }

    /// Emit the current state at `info` level, one line per worker.
    pub fn log_status(&self) {
        let snap = self.snapshot();
        info!(
            tracked_jobs = snap.tracked_jobs,
            total_completions = snap.total_completions,
            completed_load = snap.completed_load,
            warmed_up = snap.warmed_up,
            "dispatcher status"
        );
        for w in &snap.workers {
            info!(
                "  [{name}]  active={active}  assigned={assigned}  completed={completed}  \
                 bandwidth={bw:.2}  probing={probing}  priority={prio:.3}",
                name = w.name,
                active = w.active_jobs,
                assigned = w.assigned_jobs,
                completed = w.completed_jobs,
                bw = w.bandwidth,
                probing = w.probing,
                prio = w.priority,
            );
        }
    }

    /// Check the bookkeeping invariants.  Returns a description of the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut per_worker = vec![0u32; self.workers.len()];
        for r in self.jobs.values() {
            per_worker[r.worker] += 1;
        }
        for (w, &count) in self.workers.iter().zip(&per_worker) {
            if w.active_jobs != count {
                return Err(format!(
                    "worker '{}' active_jobs={} but {} tracked jobs reference it",
                    w.name, w.active_jobs, count
                ));
            }
            if w.assigned_jobs < w.active_jobs as u64 {
                return Err(format!(
                    "worker '{}' assigned_jobs={} < active_jobs={}",
                    w.name, w.assigned_jobs, w.active_jobs
                ));
            }
            if !(w.bandwidth.is_finite() && w.bandwidth > 0.0) {
                return Err(format!("worker '{}' bandwidth={}", w.name, w.bandwidth));
            }
            if let ProbingState::Probing { attribution, .. } = &w.probing {
                let expected: HashSet<&str> = self
                    .jobs
                    .iter()
                    .filter(|(_, r)| r.worker == self.worker_index[&w.name] && r.size.is_known())
                    .map(|(id, _)| id.as_str())
                    .collect();
                let actual: HashSet<&str> = attribution.keys().map(String::as_str).collect();
                if expected != actual {
                    return Err(format!(
                        "worker '{}' attribution keys {:?} != active known-size jobs {:?}",
                        w.name, actual, expected
                    ));
                }
            }
        }
        Ok(())
    }

    // ── Selection helpers ─────────────────────────────────────────────────────

    /// First worker (pool order) that still needs its probe, if `size` can
    /// serve as one.
    fn select_force_feed(&self, size: JobSize) -> Option<usize> {
        if !size.is_known() {
            return None;
        }
        self.workers.iter().position(|w| !w.force_fed)
    }

    /// Worker with the strictly greatest priority; the earliest wins ties.
    fn select_by_priority(&self) -> usize {
        let mut best = 0usize;
        let mut best_priority = f64::NEG_INFINITY;
        for (i, w) in self.workers.iter().enumerate() {
            if w.priority > best_priority {
                best = i;
                best_priority = w.priority;
            }
        }
        best
    }

    /// Recompute every worker's priority.  All of them, because the
    /// completion-share factor depends on global totals.
    fn refresh_priorities(&mut self) {
        let warmed_up = self.is_warmed_up();
        let total = self.total_completions;
        let bonus = self.config.idle_bonus;
        let epsilon = self.config.completion_epsilon;

        for w in &mut self.workers {
            let mut p = base_priority(w.bandwidth, w.active_jobs, bonus);
            if warmed_up {
                p *= completion_share(w.completed_jobs, total, epsilon);
            }
            w.priority = p;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
