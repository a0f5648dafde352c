/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core job data structures for the dispatcher.
//!
//! Two distinct types model the two sides of the placement pipeline:
//!
//! ```text
//! pool server ──("job,size")──►  JobSize  ──(Dispatcher)──►  Placement  ──("worker,job,size")──►  pool server
//!                                  ↑ decoded once              ↑ output
//!                                  at the router boundary      wire-ready
//! ```
//!
//! # Ownership model
//! A job is tracked by the [`Dispatcher`](crate::dispatcher::Dispatcher) from
//! the moment it is assigned until its completion record arrives.  The index
//! entry ([`JobRecord`]) is owned by the dispatcher's job map; the worker only
//! holds a count and, while probing, a per-job attribution accumulator keyed
//! by the same id.

use std::fmt;

/// Wire literal used by the pool server for "size unknown".
pub const UNKNOWN_SIZE_LITERAL: &str = "-1";

// ── Job size ──────────────────────────────────────────────────────────────────

/// Declared size of a job.
///
/// Replaces the `-1` sentinel of the wire format with a typed value.  The
/// conversion happens exactly once, in the router; the engine never sees the
/// string form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobSize {
    /// Non-negative, finite size in size units.
    Known(f64),
    /// The client did not declare a size.  Never used as a probe.
    Unknown,
}

impl JobSize {
    /// Parse the wire representation.
    ///
    /// `"-1"` maps to [`JobSize::Unknown`]; any other value must be a
    /// non-negative finite decimal.  Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == UNKNOWN_SIZE_LITERAL {
            return Some(JobSize::Unknown);
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Some(JobSize::Known(v)),
            _ => None,
        }
    }

    /// Returns `true` for [`JobSize::Known`].
    pub fn is_known(&self) -> bool {
        matches!(self, JobSize::Known(_))
    }
}

impl fmt::Display for JobSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSize::Known(v) => write!(f, "{}", v),
            JobSize::Unknown => f.write_str(UNKNOWN_SIZE_LITERAL),
        }
    }
}

// ── JobRecord (engine index entry) ────────────────────────────────────────────

/// Entry in the dispatcher's job index.
///
/// `worker` is the position of the assigned worker in the dispatcher's worker
/// table and never changes after placement.
#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub worker: usize,
    pub size: JobSize,
    /// Load counted towards the warm-up total on completion.  Equals the
    /// declared size for known jobs and the default-load fallback at arrival
    /// time for unknown ones.
    pub load: f64,
}

// ── Placement (output / wire-ready) ──────────────────────────────────────────

/// A placement decision ready to be sent back to the pool server.
///
/// `raw_size` keeps the size exactly as it was received so the server sees
/// its own token echoed back (`100`, `100.0` and `-1` all round-trip).
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub worker: String,
    pub job: String,
    pub raw_size: String,
}

impl Placement {
    /// Encode as one outbound line, newline included.
    pub fn to_line(&self) -> String {
        format!("{},{},{}\n", self.worker, self.job, self.raw_size)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
