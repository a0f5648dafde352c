/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-worker state and the pure pieces of the placement policy.
//!
//! # Bandwidth probing
//! A worker starts out [`ProbingState::Probing`].  While probing, every
//! known-size job running on it owns an accumulator of "processing time".
//! Whenever the worker's active set changes, the wall time since the last
//! change is split evenly over the jobs that were active during that
//! interval:
//!
//! ```text
//! t0        t1             t2
//! |--job a--|----job a-----|
//!           |----job b-----|
//! a += (t1-t0)/1 + (t2-t1)/2
//! b +=             (t2-t1)/2
//! ```
//!
//! When a known-size job finishes, its accumulated share is its effective
//! processing time and `size / share` is the worker's bandwidth.  The worker
//! then moves to [`ProbingState::Resolved`] for good.
//!
//! # Priority
//! ```text
//! priority = (bandwidth + bonus·[active == 0]) / max(1, active) · share
//! share    = (completed + ε) / total_completed   once warm, else 1
//! ```

use std::collections::HashMap;
use std::time::Instant;

use crate::clock::{elapsed_micros, MICROS_PER_SEC};

// ── Probing state ─────────────────────────────────────────────────────────────

/// Whether a worker's bandwidth is still being measured.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbingState {
    Probing {
        /// job id → accumulated processing time in µs.  Only known-size jobs.
        attribution: HashMap<String, f64>,
        /// Last instant `attribution` was advanced.
        last_update: Instant,
    },
    Resolved,
}

impl ProbingState {
    pub fn probing(now: Instant) -> Self {
        ProbingState::Probing {
            attribution: HashMap::new(),
            last_update: now,
        }
    }

    pub fn is_probing(&self) -> bool {
        matches!(self, ProbingState::Probing { .. })
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// One member of the worker pool.  Created at bootstrap, never destroyed.
#[derive(Debug, Clone)]
pub struct Worker {
    pub name: String,
    pub active_jobs: u32,
    /// Cumulative placements, monotonic.
    pub assigned_jobs: u64,
    /// Cumulative completions, monotonic.
    pub completed_jobs: u64,
    /// Size units per second.
    pub bandwidth: f64,
    pub probing: ProbingState,
    pub priority: f64,
    pub force_fed: bool,
}

impl Worker {
    pub fn new(name: impl Into<String>, bandwidth: f64, now: Instant) -> Self {
        Self {
            name: name.into(),
            active_jobs: 0,
            assigned_jobs: 0,
            completed_jobs: 0,
            bandwidth,
            probing: ProbingState::probing(now),
            priority: 0.0,
            force_fed: false,
        }
    }

    pub fn is_probing(&self) -> bool {
        self.probing.is_probing()
    }

    /// Split the time since the last update over the jobs active during that
    /// interval.  `active_jobs` must still hold the interval's count, so call
    /// this before changing it.
    ///
    /// No-op once resolved.  With zero active jobs nothing ran, so the
    /// interval is skipped but the timestamp still moves.
    pub fn advance_attribution(&mut self, now: Instant) {
        let active = self.active_jobs;
        if let ProbingState::Probing {
            attribution,
            last_update,
        } = &mut self.probing
        {
            if active > 0 {
                let share = elapsed_micros(*last_update, now) as f64 / active as f64;
                if share > 0.0 {
                    for acc in attribution.values_mut() {
                        *acc += share;
                    }
                }
            }
            *last_update = now;
        }
    }

    /// Start a zero accumulator for a newly placed known-size job.
    pub fn track_probe(&mut self, job: &str) {
        if let ProbingState::Probing { attribution, .. } = &mut self.probing {
            attribution.insert(job.to_string(), 0.0);
        }
    }

    /// Remove and return the accumulated time of `job`, if it was tracked.
    pub fn take_attribution(&mut self, job: &str) -> Option<f64> {
        match &mut self.probing {
            ProbingState::Probing { attribution, .. } => attribution.remove(job),
            ProbingState::Resolved => None,
        }
    }

    /// Accumulated time for `job` without removing it.
    #[cfg(test)]
    pub(crate) fn attribution_of(&self, job: &str) -> Option<f64> {
        match &self.probing {
            ProbingState::Probing { attribution, .. } => attribution.get(job).copied(),
            ProbingState::Resolved => None,
        }
    }

    /// Finish probing with a measured bandwidth.  Drops the attribution map
    /// and timestamp; the worker never probes again.
    pub fn resolve(&mut self, bandwidth: f64) {
        self.bandwidth = bandwidth;
        self.probing = ProbingState::Resolved;
    }
}

// ── Policy functions ──────────────────────────────────────────────────────────

/// Bandwidth implied by a probe of `size` units that took `attributed_us`.
///
/// Returns `None` when the measurement is inconclusive (zero time or zero
/// size), which would otherwise produce an infinite or zero estimate.
pub fn probe_bandwidth(size: f64, attributed_us: f64) -> Option<f64> {
    if attributed_us <= 0.0 || size <= 0.0 {
        return None;
    }
    let bw = size / (attributed_us / MICROS_PER_SEC);
    (bw.is_finite() && bw > 0.0).then_some(bw)
}

/// Unscaled priority of a worker.
pub fn base_priority(bandwidth: f64, active_jobs: u32, idle_bonus: f64) -> f64 {
    let bonus = if active_jobs == 0 { idle_bonus } else { 0.0 };
    (bandwidth + bonus) / active_jobs.max(1) as f64
}

/// Completion-share factor applied after warm-up.
pub fn completion_share(worker_completions: u64, total_completions: u64, epsilon: f64) -> f64 {
    if total_completions == 0 {
        return 1.0;
    }
    (worker_completions as f64 + epsilon) / total_completions as f64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
