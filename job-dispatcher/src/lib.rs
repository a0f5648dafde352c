/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Job dispatcher – adaptive placement of file jobs on a worker pool
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/         – YAML policy tunables
//! ├── dispatcher/     – placement engine (probing, priorities, bookkeeping)
//! ├── job.rs          – job size / placement types
//! ├── clock.rs        – monotonic and manual time sources
//! ├── router.rs       – line protocol decoding and batching
//! └── transport.rs    – TCP session with the worker pool server
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod job;
pub mod router;
pub mod transport;
