//! Helpers for running a child process with streamed stdout and a timeout.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

/// Outcome of a streamed child process run.
#[derive(Debug)]
pub struct StreamedOutput {
    /// Exit status. Reflects the kill signal when `timed_out` is set.
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Spawn `cmd`, write `stdin` fully and close it, then feed every stdout
/// line to `on_line` as it arrives.
///
/// Stderr is drained concurrently (bounded by `stderr_limit_bytes`) to avoid
/// pipe deadlocks. When `timeout` elapses before the child exits, the child
/// is forcibly killed; lines collected before the kill have already been
/// delivered to `on_line`, and the result carries `timed_out = true`.
pub fn run_streaming(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Option<Duration>,
    stderr_limit_bytes: usize,
    on_line: &mut dyn FnMut(&str),
) -> Result<StreamedOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning agent process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn agent process");
            return Err(e).context("spawn agent process");
        }
    };
    let start = Instant::now();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (line_tx, line_rx) = mpsc::channel::<String>();
    let stdout_handle = thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            // Receiver gone means the caller gave up on the run.
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    let stderr_handle = thread::spawn(move || read_limited(stderr, stderr_limit_bytes));

    write_stdin(&mut child, stdin)?;

    let mut timed_out = false;
    loop {
        let received = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    timed_out = true;
                    break;
                }
                match line_rx.recv_timeout(remaining) {
                    Ok(line) => Some(line),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        timed_out = true;
                        break;
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => None,
                }
            }
            None => line_rx.recv().ok(),
        };
        match received {
            Some(line) => on_line(&line),
            None => break,
        }
    }

    if timed_out {
        warn!(timeout_secs = ?timeout.map(|t| t.as_secs()), "agent timed out, killing");
        child.kill().context("kill agent process")?;
        let status = child.wait().context("wait agent process after kill")?;
        // Deliver whatever the reader collected before the kill.
        for line in line_rx.try_iter() {
            on_line(&line);
        }
        // Orphaned grandchildren can keep the pipes open past the kill, so
        // the reader threads are abandoned rather than joined here. Stderr
        // is dropped; stdout lines were already streamed.
        debug!(exit_code = ?status.code(), "agent process killed on timeout");
        return Ok(StreamedOutput {
            status,
            stderr: Vec::new(),
            stderr_truncated: 0,
            timed_out: true,
        });
    }

    let status = {
        // Stdout closed; bound the remaining wait by what is left of the
        // timeout budget.
        match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                match child
                    .wait_timeout(remaining)
                    .context("wait for agent process")?
                {
                    Some(status) => status,
                    None => {
                        warn!("agent closed stdout but did not exit, killing");
                        child.kill().context("kill agent process")?;
                        let status = child.wait().context("wait agent process after kill")?;
                        return Ok(StreamedOutput {
                            status,
                            stderr: Vec::new(),
                            stderr_truncated: 0,
                            timed_out: true,
                        });
                    }
                }
            }
            None => child.wait().context("wait for agent process")?,
        }
    };

    if stdout_handle.join().is_err() {
        return Err(anyhow!("stdout reader thread panicked"));
    }
    let (stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow!("stderr reader thread panicked"))?
        .context("read stderr")?;

    if stderr_truncated > 0 {
        warn!(stderr_truncated, "stderr truncated");
    }
    debug!(exit_code = ?status.code(), timed_out, "agent process finished");
    Ok(StreamedOutput {
        status,
        stderr,
        stderr_truncated,
        timed_out,
    })
}

/// Write the full instruction document and close the pipe to signal
/// end-of-input. A child that exits before reading everything surfaces as a
/// broken pipe, which is reported through the exit code instead.
fn write_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    match child_stdin.write_all(input) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            warn!("agent closed stdin before reading full instructions");
            Ok(())
        }
        Err(e) => Err(e).context("write instructions to agent stdin"),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    /// Lines stream through the callback and stdin round-trips.
    #[test]
    fn run_streaming_delivers_lines_and_stdin() {
        let mut lines = Vec::new();
        let output = run_streaming(
            sh("cat; echo done"),
            b"alpha\nbeta\n",
            Some(Duration::from_secs(10)),
            10_000,
            &mut |line| lines.push(line.to_string()),
        )
        .expect("run");

        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(lines, vec!["alpha", "beta", "done"]);
    }

    /// A hung child is killed at the timeout; earlier lines are preserved.
    #[test]
    fn run_streaming_kills_on_timeout() {
        let mut lines = Vec::new();
        let output = run_streaming(
            sh("echo early; sleep 30"),
            b"",
            Some(Duration::from_millis(300)),
            10_000,
            &mut |line| lines.push(line.to_string()),
        )
        .expect("run");

        assert!(output.timed_out);
        assert_eq!(lines, vec!["early"]);
    }

    #[test]
    fn run_streaming_captures_bounded_stderr() {
        let output = run_streaming(
            sh("echo oops >&2; printf 'x%.0s' $(seq 1 100) >&2"),
            b"",
            Some(Duration::from_secs(10)),
            16,
            &mut |_| {},
        )
        .expect("run");

        assert_eq!(output.stderr.len(), 16);
        assert!(output.stderr_truncated > 0);
        assert!(String::from_utf8_lossy(&output.stderr).starts_with("oops"));
    }

    #[test]
    fn run_streaming_reports_missing_executable() {
        let err = run_streaming(
            Command::new("definitely-not-a-real-binary-4242"),
            b"",
            None,
            10_000,
            &mut |_| {},
        )
        .expect_err("spawn should fail");
        let io_err = err
            .downcast_ref::<std::io::Error>()
            .expect("io error in chain");
        assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn run_streaming_reports_exit_code() {
        let output = run_streaming(sh("exit 7"), b"", None, 10_000, &mut |_| {}).expect("run");
        assert_eq!(output.status.code(), Some(7));
    }
}
