//! Scoped subprocess execution for fnforge.
//!
//! External build tools can run for minutes, hang, or spew unbounded output.
//! [`run_scoped`] owns the child process for its entire lifetime: output
//! streams are drained on background threads, the child is polled against a
//! wall-clock budget and a cancellation flag, and it is killed and reaped on
//! every early exit path.

use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::UtilError;

/// Poll interval while waiting for a child process to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a scoped process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The process exited on its own.
    Completed {
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Whether the exit status was success (code zero).
        success: bool,
    },
    /// The wall-clock budget elapsed; the process was killed.
    TimedOut,
    /// The cancellation flag was raised; the process was killed.
    Canceled,
}

/// Outcome of a scoped process run.
#[derive(Debug)]
pub struct RunOutcome {
    /// How the run ended.
    pub status: RunStatus,
    /// Combined stdout and stderr, truncated to the capture cap with head
    /// and tail preserved.
    pub diagnostics: String,
}

/// Run a command to completion within `budget`, capturing combined output.
///
/// Output capture is bounded by `capture_cap` bytes; when exceeded, the head
/// and tail of the output are kept and the middle is elided. A non-zero exit
/// is **not** an error; inspect [`RunOutcome::status`].
///
/// # Errors
/// Returns an error only if the process cannot be spawned (e.g. binary not
/// found) or its output streams cannot be captured.
pub fn run_scoped(
    cmd: &mut Command,
    budget: Duration,
    cancel: &AtomicBool,
    capture_cap: usize,
) -> Result<RunOutcome, UtilError> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| UtilError::CommandSpawn {
            program: program.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(UtilError::CommandPipes { program });
    };

    // Drain both pipes off-thread so the child never blocks on a full pipe.
    let out_handle = thread::spawn(move || drain(stdout, capture_cap));
    let err_handle = thread::spawn(move || drain(stderr, capture_cap));

    let deadline = Instant::now() + budget;
    let status = wait_with_deadline(&mut child, deadline, cancel, &program)?;

    let mut combined = out_handle.join().unwrap_or_default();
    let err_bytes = err_handle.join().unwrap_or_default();
    if !combined.is_empty() && !err_bytes.is_empty() {
        combined.push(b'\n');
    }
    combined.extend_from_slice(&err_bytes);

    let diagnostics = truncate_head_tail(&String::from_utf8_lossy(&combined), capture_cap);

    Ok(RunOutcome {
        status,
        diagnostics,
    })
}

/// Drain a stream to completion while holding at most `cap` bytes of it:
/// the first `cap / 2` bytes plus a rolling tail of the same size, with the
/// elided middle counted. The stream is always consumed fully so the child
/// never blocks on a full pipe; memory stays bounded no matter how much the
/// tool writes. A `cap` of zero disables the bound.
fn drain(mut stream: impl Read, cap: usize) -> Vec<u8> {
    if cap == 0 {
        let mut all = Vec::new();
        let _ = stream.read_to_end(&mut all);
        return all;
    }

    let keep = cap / 2;
    let mut head: Vec<u8> = Vec::new();
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(keep);
    let mut elided: usize = 0;
    let mut buf = [0_u8; 8192];

    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for &byte in buf.iter().take(n) {
                    if head.len() < keep {
                        head.push(byte);
                    } else if keep > 0 {
                        if tail.len() >= keep {
                            tail.pop_front();
                            elided += 1;
                        }
                        tail.push_back(byte);
                    } else {
                        elided += 1;
                    }
                }
            }
        }
    }

    if elided > 0 {
        let marker = format!("\n... [{elided} bytes elided] ...\n");
        head.extend_from_slice(marker.as_bytes());
    }
    head.extend(tail);
    head
}

/// Poll the child until it exits, the deadline passes, or cancellation is
/// requested. On deadline or cancellation, the child is killed and reaped
/// before returning.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
    cancel: &AtomicBool,
    program: &str,
) -> Result<RunStatus, UtilError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(RunStatus::Completed {
                    exit_code: status.code(),
                    success: status.success(),
                });
            }
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(UtilError::CommandSpawn {
                    program: program.to_owned(),
                    source,
                });
            }
        }

        if cancel.load(Ordering::Relaxed) {
            kill_and_reap(child);
            return Ok(RunStatus::Canceled);
        }

        if Instant::now() >= deadline {
            kill_and_reap(child);
            return Ok(RunStatus::TimedOut);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child and wait for it so no zombie is left behind.
fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Truncate `text` to at most roughly `cap` bytes, keeping the head and tail
/// and eliding the middle. Cuts land on char boundaries.
pub fn truncate_head_tail(text: &str, cap: usize) -> String {
    if text.len() <= cap || cap == 0 {
        return text.to_owned();
    }

    let keep = cap / 2;
    let mut head_end = keep.min(text.len());
    while head_end > 0 && !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len().saturating_sub(keep);
    while tail_start < text.len() && !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    let head = text.get(..head_end).unwrap_or("");
    let tail = text.get(tail_start..).unwrap_or("");
    let elided = text.len().saturating_sub(head.len() + tail.len());

    format!("{head}\n... [{elided} bytes elided] ...\n{tail}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;

    const CAP: usize = 64 * 1024;

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn run_scoped_success() {
        let cancel = no_cancel();
        let outcome = run_scoped(
            Command::new("echo").arg("hello"),
            Duration::from_secs(5),
            &cancel,
            CAP,
        )
        .unwrap();

        assert_eq!(
            outcome.status,
            RunStatus::Completed {
                exit_code: Some(0),
                success: true
            }
        );
        assert!(outcome.diagnostics.contains("hello"));
    }

    #[test]
    fn run_scoped_nonzero_exit() {
        let cancel = no_cancel();
        let outcome = run_scoped(
            Command::new("sh").arg("-c").arg("echo boom >&2; exit 3"),
            Duration::from_secs(5),
            &cancel,
            CAP,
        )
        .unwrap();

        assert_eq!(
            outcome.status,
            RunStatus::Completed {
                exit_code: Some(3),
                success: false
            }
        );
        assert!(outcome.diagnostics.contains("boom"));
    }

    #[test]
    fn run_scoped_missing_binary() {
        let cancel = no_cancel();
        let result = run_scoped(
            &mut Command::new("nonexistent_binary_xyz_123"),
            Duration::from_secs(1),
            &cancel,
            CAP,
        );
        assert!(result.is_err());
    }

    #[test]
    fn run_scoped_timeout_kills_process() {
        let cancel = no_cancel();
        let start = Instant::now();
        let outcome = run_scoped(
            Command::new("sleep").arg("30"),
            Duration::from_millis(200),
            &cancel,
            CAP,
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::TimedOut);
        // The child was killed, not waited for 30 seconds.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn run_scoped_cancellation_kills_process() {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        let outcome = run_scoped(
            Command::new("sleep").arg("30"),
            Duration::from_secs(60),
            &cancel,
            CAP,
        )
        .unwrap();

        assert_eq!(outcome.status, RunStatus::Canceled);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn run_scoped_captures_both_streams() {
        let cancel = no_cancel();
        let outcome = run_scoped(
            Command::new("sh").arg("-c").arg("echo out; echo err >&2"),
            Duration::from_secs(5),
            &cancel,
            CAP,
        )
        .unwrap();

        assert!(outcome.diagnostics.contains("out"));
        assert!(outcome.diagnostics.contains("err"));
    }

    #[test]
    fn run_scoped_bounded_capture() {
        let cancel = no_cancel();
        let outcome = run_scoped(
            Command::new("sh")
                .arg("-c")
                .arg("yes abcdefgh | head -c 200000"),
            Duration::from_secs(10),
            &cancel,
            1024,
        )
        .unwrap();

        assert!(outcome.diagnostics.len() < 2048);
        assert!(outcome.diagnostics.contains("elided"));
    }

    #[test]
    fn drain_keeps_head_and_tail_of_large_stream() {
        let input = format!("HEAD{}TAIL", "x".repeat(1_000_000));
        let out = drain(std::io::Cursor::new(input.into_bytes()), 1024);

        // The full megabyte was consumed but never held.
        assert!(out.len() < 2048);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HEAD"));
        assert!(text.ends_with("TAIL"));
        assert!(text.contains("elided"));
    }

    #[test]
    fn drain_small_stream_passes_through() {
        let out = drain(std::io::Cursor::new(b"hello".to_vec()), 1024);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate_head_tail("short", 100), "short");
    }

    #[test]
    fn truncate_keeps_head_and_tail() {
        let text = format!("HEAD{}TAIL", "x".repeat(1000));
        let out = truncate_head_tail(&text, 100);
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains("elided"));
        assert!(out.len() < text.len());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(200);
        let out = truncate_head_tail(&text, 51);
        // Must not panic and must remain valid UTF-8 (guaranteed by String).
        assert!(out.contains("elided"));
    }
}
