/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Byte-stream transport between the worker pool server and the router.
//!
//! The server speaks newline-delimited text over one duplex stream:
//!
//! ```text
//! server ──"A,B,C,"──────────────►  handshake (once)
//! server ──"job1,100\nFjob0\n"───►  batch of events
//!        ◄─"A,job1,100\n"───────── batch of placements
//! ```
//!
//! Reads are chunked; a trailing partial line is kept until the rest arrives.
//! Optionally a `printAll` control line is sent on a fixed period so the
//! servers dump their status.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::job::JobSize;
use crate::router::EventRouter;

/// Maximum bytes taken from the stream per read.
pub const READ_CHUNK: usize = 4096;

/// Longest unterminated line kept while waiting for its newline.  Anything
/// longer is dropped up to the next newline.
pub const MAX_PENDING: usize = 4 * READ_CHUNK;

/// Control line asking every server to print its status.
pub const PRINT_ALL: &[u8] = b"printAll\n";

/// Counters for one transport session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub batches: u64,
    pub placements: u64,
    pub completions: u64,
    pub rejected_lines: u64,
}

/// Connect to `addr` and serve until the server closes the connection.
pub async fn connect_and_run<C: Clock + Clone>(
    addr: &str,
    router: &mut EventRouter<C>,
    status_interval: Option<Duration>,
) -> Result<SessionSummary> {
    info!(addr = %addr, "connecting to worker pool server");
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Cannot connect to {}", addr))?;
    stream.set_nodelay(true).ok();
    run_session(stream, router, status_interval).await
}

/// Drive `router` from `stream`: handshake first, then event batches until
/// EOF.
///
/// The worker list has no terminator of its own, so the first read is taken
/// as the handshake up to its first newline.  A worker list that shares its
/// read with the first arrival line is separated again when that line has the
/// `job,size` shape; a completion glued onto the worker list cannot be told
/// apart from a worker name.
///
/// A zero `status_interval` disables the periodic `printAll`.
pub async fn run_session<S, C>(
    mut stream: S,
    router: &mut EventRouter<C>,
    status_interval: Option<Duration>,
) -> Result<SessionSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Clock + Clone,
{
    let mut summary = SessionSummary::default();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();

    // ── Handshake ─────────────────────────────────────────────────────────────
    let n = stream
        .read(&mut buf)
        .await
        .context("Failed to read worker list")?;
    if n == 0 {
        bail!("connection closed before the worker list was received");
    }
    let (handshake, rest) = split_handshake(&buf[..n]);
    router
        .bootstrap(&String::from_utf8_lossy(handshake))
        .context("Invalid worker list handshake")?;
    pending.extend_from_slice(rest);
    if !pending.is_empty() {
        process_pending(&mut stream, router, &mut pending, &mut summary).await?;
    }

    // ── Event loop ────────────────────────────────────────────────────────────
    let status_interval = status_interval.filter(|d| !d.is_zero());
    let status_enabled = status_interval.is_some();
    let mut ticker = tokio::time::interval(status_interval.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;
    let mut discarding = false;

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                let n = read.context("Failed to read from worker pool server")?;
                if n == 0 {
                    if !pending.is_empty() {
                        warn!(
                            bytes = pending.len(),
                            "connection closed with an unterminated line, discarding it"
                        );
                    }
                    info!(?summary, "worker pool server closed the connection");
                    break;
                }
                buffer_chunk(&mut pending, &buf[..n], &mut discarding);
                process_pending(&mut stream, router, &mut pending, &mut summary).await?;
                if pending.len() > MAX_PENDING {
                    warn!(
                        bytes = pending.len(),
                        limit = MAX_PENDING,
                        "line exceeds the length limit, dropping it"
                    );
                    pending.clear();
                    discarding = true;
                    summary.rejected_lines += 1;
                }
            }
            _ = ticker.tick(), if status_enabled => {
                if let Err(e) = stream.write_all(PRINT_ALL).await {
                    warn!(error = %e, "failed to send printAll, treating connection as closed");
                    break;
                }
                if let Some(d) = router.dispatcher() {
                    d.log_status();
                }
            }
        }
    }

    Ok(summary)
}

/// Split the first read into the worker list and whatever events followed it.
///
/// `"A,B,\njob1,5\n"` and `"A,B,job1,5\n"` both yield `"A,B,"` and
/// `"job1,5\n"`.  Without a newline the whole read is the worker list.
fn split_handshake(first: &[u8]) -> (&[u8], &[u8]) {
    let Some(pos) = first.iter().position(|&b| b == b'\n') else {
        return (first, &first[first.len()..]);
    };
    let line = &first[..pos];
    if line.ends_with(b",") {
        return (line, &first[pos + 1..]);
    }
    // "A,B,job1,5": the last two fields are an arrival when the last parses
    // as a size and at least one worker name precedes them.
    let Some(last_comma) = line.iter().rposition(|&b| b == b',') else {
        return (line, &first[pos + 1..]);
    };
    let Some(job_start) = line[..last_comma].iter().rposition(|&b| b == b',').map(|i| i + 1)
    else {
        return (line, &first[pos + 1..]);
    };
    let size = String::from_utf8_lossy(&line[last_comma + 1..]);
    if job_start < last_comma && JobSize::parse(&size).is_some() {
        debug!(
            split_at = job_start,
            "worker list arrived together with the first arrival line"
        );
        return (&line[..job_start], &first[job_start..]);
    }
    (line, &first[pos + 1..])
}

/// Append `chunk` to `pending`, skipping the remainder of a line that was
/// already dropped for being too long.
fn buffer_chunk(pending: &mut Vec<u8>, chunk: &[u8], discarding: &mut bool) {
    let chunk = if *discarding {
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                *discarding = false;
                &chunk[pos + 1..]
            }
            None => return,
        }
    } else {
        chunk
    };
    pending.extend_from_slice(chunk);
}

/// Route every complete line in `pending` and write the resulting
/// placements as one buffer.  Leaves any trailing partial line in place.
async fn process_pending<S, C>(
    stream: &mut S,
    router: &mut EventRouter<C>,
    pending: &mut Vec<u8>,
    summary: &mut SessionSummary,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
    C: Clock + Clone,
{
    let Some(last_newline) = pending.iter().rposition(|&b| b == b'\n') else {
        return Ok(());
    };
    let complete: Vec<u8> = pending.drain(..=last_newline).collect();
    let text = String::from_utf8_lossy(&complete);
    debug!(batch = %text, "received batch");

    let outcome = router.handle_batch(&text);
    summary.batches += 1;
    summary.placements += outcome.placements.len() as u64;
    summary.completions += outcome.completions as u64;
    summary.rejected_lines += outcome.rejected.len() as u64;

    let out = outcome.encode();
    if !out.is_empty() {
        stream
            .write_all(out.as_bytes())
            .await
            .context("Failed to send placements")?;
        stream.flush().await.context("Failed to flush placements")?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
