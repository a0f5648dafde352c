/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for the dispatcher engine.
//!
//! Every variant means the caller broke the event contract (a job id used
//! twice, a completion for a job that was never placed, ...).  The engine
//! returns the error **before** touching any state, so a rejected call leaves
//! workers and the job index exactly as they were.

use thiserror::Error;

/// Error returned by [`Dispatcher`](super::Dispatcher) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// The worker list supplied at bootstrap was empty.
    #[error("worker pool is empty, at least one worker is required")]
    EmptyPool,

    /// The same worker name appeared twice in the bootstrap list.
    #[error("worker '{name}' listed more than once")]
    DuplicateWorker { name: String },

    /// `assign` was called with a job id that is already tracked.
    #[error("job '{job}' is already tracked (duplicate arrival)")]
    DuplicateJob { job: String },

    /// `complete` was called with a job id that is not tracked.
    #[error("job '{job}' is not tracked (completion for unknown job)")]
    UnknownJob { job: String },

    /// A worker name was looked up that is not part of the pool.
    #[error("worker '{name}' is not part of the pool")]
    UnknownWorker { name: String },
}
