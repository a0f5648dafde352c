/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Event router: the text protocol in front of the [`Dispatcher`].
//!
//! Inbound lines are one of:
//!
//! | Line | Meaning |
//! |---|---|
//! | `job7,1024` | arrival of `job7` with declared size 1024 |
//! | `job8,-1` | arrival of `job8`, size unknown |
//! | `Fjob7` | `job7` finished |
//!
//! A line containing a comma is always an arrival, so job ids that happen to
//! start with `F` are still placed correctly.  Outbound placements are
//! `worker,job,size` lines, sent as one batch per inbound batch.
//!
//! The router does no scheduling; it decodes, forwards, and collects.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::PolicyConfig;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::job::{JobSize, Placement};

/// Leading marker of a completion line.
pub const COMPLETION_MARKER: char = 'F';

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why an inbound line (or the handshake) was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed line: '{line}'")]
    MalformedLine { line: String },

    #[error("invalid size '{value}' in line '{line}' (expected a non-negative number or -1)")]
    InvalidSize { line: String, value: String },

    #[error("job event received before the worker list handshake")]
    NotBootstrapped,

    #[error("worker list handshake received twice")]
    AlreadyBootstrapped,

    #[error("worker list handshake names no workers")]
    EmptyHandshake,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// ── Events ────────────────────────────────────────────────────────────────────

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Arrival {
        job: String,
        size: JobSize,
        /// Size token as received, echoed back in the placement.
        raw_size: String,
    },
    Completion {
        job: String,
    },
}

/// Decode one line (without its newline).
pub fn decode_line(line: &str) -> Result<Event, ProtocolError> {
    let malformed = || ProtocolError::MalformedLine {
        line: line.to_string(),
    };

    if line.contains(',') {
        let mut fields = line.split(',');
        let (Some(job), Some(raw_size), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };
        let job = job.trim();
        let raw_size = raw_size.trim();
        if job.is_empty() {
            return Err(malformed());
        }
        let size = JobSize::parse(raw_size).ok_or_else(|| ProtocolError::InvalidSize {
            line: line.to_string(),
            value: raw_size.to_string(),
        })?;
        return Ok(Event::Arrival {
            job: job.to_string(),
            size,
            raw_size: raw_size.to_string(),
        });
    }

    match line.strip_prefix(COMPLETION_MARKER) {
        Some(job) if !job.trim().is_empty() => Ok(Event::Completion {
            job: job.trim().to_string(),
        }),
        _ => Err(malformed()),
    }
}

/// Parse the bootstrap worker list: `name1,name2,...,`.
///
/// The trailing separator, surrounding whitespace and empty names are
/// ignored.
pub fn parse_worker_list(handshake: &str) -> Result<Vec<String>, ProtocolError> {
    let names: Vec<String> = handshake
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() {
        return Err(ProtocolError::EmptyHandshake);
    }
    Ok(names)
}

// ── Batch results ─────────────────────────────────────────────────────────────

/// A line the router refused, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLine {
    pub line: String,
    pub error: ProtocolError,
}

/// Everything produced by one inbound batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub placements: Vec<Placement>,
    pub completions: usize,
    pub rejected: Vec<RejectedLine>,
}

impl BatchOutcome {
    /// All placements as one outbound buffer.  Empty when nothing was placed.
    pub fn encode(&self) -> String {
        self.placements.iter().map(Placement::to_line).collect()
    }
}

// ── EventRouter ───────────────────────────────────────────────────────────────

/// Routes decoded events into a [`Dispatcher`] it owns.
///
/// The dispatcher does not exist until the worker list handshake arrives;
/// job events before that are rejected with
/// [`ProtocolError::NotBootstrapped`].
pub struct EventRouter<C: Clock + Clone = MonotonicClock> {
    config: PolicyConfig,
    clock: C,
    dispatcher: Option<Dispatcher<C>>,
}

impl EventRouter<MonotonicClock> {
    pub fn new(config: PolicyConfig) -> Self {
        Self::with_clock(config, MonotonicClock)
    }
}

impl<C: Clock + Clone> EventRouter<C> {
    pub fn with_clock(config: PolicyConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            dispatcher: None,
        }
    }

    /// Wrap an already constructed dispatcher; the handshake is considered
    /// done.
    #[cfg(test)]
    pub(crate) fn with_dispatcher(dispatcher: Dispatcher<C>, clock: C) -> Self {
        Self {
            config: dispatcher.config().clone(),
            clock,
            dispatcher: Some(dispatcher),
        }
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher<C>> {
        self.dispatcher.as_ref()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Seed the worker pool from the handshake text.  Must happen exactly
    /// once.
    pub fn bootstrap(&mut self, handshake: &str) -> Result<&Dispatcher<C>, ProtocolError> {
        if self.dispatcher.is_some() {
            return Err(ProtocolError::AlreadyBootstrapped);
        }
        let names = parse_worker_list(handshake)?;
        info!(workers = ?names, "worker list received");
        let dispatcher =
            Dispatcher::with_clock(names, self.config.clone(), self.clock.clone())?;
        Ok(self.dispatcher.insert(dispatcher))
    }

    /// Decode and apply one line.  Returns the placement for an arrival.
    pub fn handle_line(&mut self, line: &str) -> Result<Option<Placement>, ProtocolError> {
        let event = decode_line(line)?;
        let dispatcher = self
            .dispatcher
            .as_mut()
            .ok_or(ProtocolError::NotBootstrapped)?;

        match event {
            Event::Arrival {
                job,
                size,
                raw_size,
            } => {
                let worker = dispatcher.assign(&job, size)?.to_string();
                debug!(job = %job, worker = %worker, "routing placement");
                Ok(Some(Placement {
                    worker,
                    job,
                    raw_size,
                }))
            }
            Event::Completion { job } => {
                dispatcher.complete(&job)?;
                Ok(None)
            }
        }
    }

    /// Apply every line of `batch` in order.
    ///
    /// Blank lines are skipped.  A rejected line is recorded and logged but
    /// does not stop the rest of the batch.
    pub fn handle_batch(&mut self, batch: &str) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for line in batch.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            match self.handle_line(line) {
                Ok(Some(placement)) => outcome.placements.push(placement),
                Ok(None) => outcome.completions += 1,
                Err(error) => {
                    warn!(line = %line, error = %error, "dropping inbound line");
                    outcome.rejected.push(RejectedLine {
                        line: line.to_string(),
                        error,
                    });
                }
            }
        }
        outcome
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn router() -> (EventRouter<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            EventRouter::with_clock(PolicyConfig::default(), clock.clone()),
            clock,
        )
    }

    // ── decode_line ───────────────────────────────────────────────────────────

    #[test]
    fn decodes_known_arrival() {
        assert_eq!(
            decode_line("file1,100").unwrap(),
            Event::Arrival {
                job: "file1".into(),
                size: JobSize::Known(100.0),
                raw_size: "100".into(),
            }
        );
    }

    #[test]
    fn decodes_unknown_arrival() {
        assert_eq!(
            decode_line("file2,-1").unwrap(),
            Event::Arrival {
                job: "file2".into(),
                size: JobSize::Unknown,
                raw_size: "-1".into(),
            }
        );
    }

    #[test]
    fn decodes_completion() {
        assert_eq!(
            decode_line("Ffile1").unwrap(),
            Event::Completion {
                job: "file1".into()
            }
        );
    }

    #[test]
    fn completion_strips_only_the_leading_marker() {
        assert_eq!(
            decode_line("FFoo").unwrap(),
            Event::Completion { job: "Foo".into() }
        );
    }

    #[test]
    fn arrival_with_f_prefixed_id_is_still_an_arrival() {
        assert!(matches!(
            decode_line("File9,10").unwrap(),
            Event::Arrival { ref job, .. } if job == "File9"
        ));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for line in ["garbage", "F", "a,b,c", ",10", "x"] {
            assert!(
                matches!(decode_line(line), Err(ProtocolError::MalformedLine { .. })),
                "expected MalformedLine for {line:?}"
            );
        }
    }

    #[test]
    fn bad_size_is_rejected() {
        assert_eq!(
            decode_line("j,-5").unwrap_err(),
            ProtocolError::InvalidSize {
                line: "j,-5".into(),
                value: "-5".into()
            }
        );
        assert!(matches!(
            decode_line("j,big"),
            Err(ProtocolError::InvalidSize { .. })
        ));
    }

    // ── parse_worker_list ─────────────────────────────────────────────────────

    #[test]
    fn worker_list_ignores_trailing_separator() {
        assert_eq!(
            parse_worker_list("server1,server2,server3,").unwrap(),
            vec!["server1", "server2", "server3"]
        );
    }

    #[test]
    fn worker_list_without_trailing_separator() {
        assert_eq!(parse_worker_list("a,b\n").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn empty_worker_list_is_rejected() {
        assert_eq!(parse_worker_list(",").unwrap_err(), ProtocolError::EmptyHandshake);
        assert_eq!(parse_worker_list("").unwrap_err(), ProtocolError::EmptyHandshake);
    }

    // ── EventRouter ───────────────────────────────────────────────────────────

    #[test]
    fn job_events_before_handshake_are_rejected() {
        let (mut r, _) = router();
        assert_eq!(
            r.handle_line("j1,10").unwrap_err(),
            ProtocolError::NotBootstrapped
        );
        assert_eq!(
            r.handle_line("Fj1").unwrap_err(),
            ProtocolError::NotBootstrapped
        );
        assert!(!r.is_bootstrapped());
    }

    #[test]
    fn second_handshake_is_rejected() {
        let (mut r, _) = router();
        r.bootstrap("A,B,").unwrap();
        assert_eq!(
            r.bootstrap("C,").err().unwrap(),
            ProtocolError::AlreadyBootstrapped
        );
        assert_eq!(r.dispatcher().unwrap().workers().len(), 2);
    }

    #[test]
    fn duplicate_worker_in_handshake_is_a_dispatch_error() {
        let (mut r, _) = router();
        assert_eq!(
            r.bootstrap("A,A,").err().unwrap(),
            ProtocolError::Dispatch(DispatchError::DuplicateWorker { name: "A".into() })
        );
        assert!(!r.is_bootstrapped());
    }

    #[test]
    fn batch_produces_placements_in_order() {
        let (mut r, _) = router();
        r.bootstrap("A,B,").unwrap();

        let out = r.handle_batch("job1,100\njob2,100\n");
        assert_eq!(out.completions, 0);
        assert!(out.rejected.is_empty());
        assert_eq!(out.encode(), "A,job1,100\nB,job2,100\n");
    }

    #[test]
    fn batch_mixes_completions_and_arrivals() {
        let (mut r, clock) = router();
        r.bootstrap("A,B,").unwrap();
        r.handle_batch("job1,100\njob2,100\n");

        clock.advance_micros(2_000_000);
        let out = r.handle_batch("Fjob1\njob3,-1\n");
        assert_eq!(out.completions, 1);
        assert_eq!(
            out.placements,
            vec![Placement {
                worker: "A".into(),
                job: "job3".into(),
                raw_size: "-1".into(),
            }]
        );

        let d = r.dispatcher().unwrap();
        assert!((d.worker("A").unwrap().bandwidth - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bad_lines_are_dropped_without_touching_state() {
        let (mut r, _) = router();
        r.bootstrap("A,").unwrap();
        r.handle_batch("j1,10\n");
        let before = r.dispatcher().unwrap().snapshot();

        let out = r.handle_batch("j1,10\nFghost\nnonsense\nj2,abc\n\n");
        assert!(out.placements.is_empty());
        assert_eq!(out.rejected.len(), 4);
        assert_eq!(
            out.rejected[0].error,
            ProtocolError::Dispatch(DispatchError::DuplicateJob { job: "j1".into() })
        );
        assert_eq!(
            out.rejected[1].error,
            ProtocolError::Dispatch(DispatchError::UnknownJob {
                job: "ghost".into()
            })
        );
        assert_eq!(r.dispatcher().unwrap().snapshot(), before);
    }

    #[test]
    fn carriage_returns_are_tolerated() {
        let (mut r, _) = router();
        r.bootstrap("A,\r\n").unwrap();
        let out = r.handle_batch("j1,5\r\n");
        assert_eq!(out.encode(), "A,j1,5\n");
    }

    #[test]
    fn with_dispatcher_skips_handshake() {
        let clock = ManualClock::new();
        let d = Dispatcher::with_clock(["X"], PolicyConfig::default(), clock.clone()).unwrap();
        let mut r = EventRouter::with_dispatcher(d, clock);
        assert!(r.is_bootstrapped());
        assert_eq!(r.handle_batch("j,1\n").encode(), "X,j,1\n");
    }

    #[test]
    fn empty_batch_encodes_to_nothing() {
        let (mut r, _) = router();
        r.bootstrap("A,").unwrap();
        assert_eq!(r.handle_batch("").encode(), "");
    }
}
