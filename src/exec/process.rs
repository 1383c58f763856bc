// src/exec/process.rs

//! Single child process runner.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PatchrunError, Result};
use crate::exec::{
    BoundedLines, CaptureOptions, KILLED_BY_SIGNAL, OutputLine, OutputStream, ProcessInvocation,
    ProcessOutput,
};

/// How long to keep reading inherited pipes after the child itself exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run one process to completion, capturing its output.
///
/// - Cancellation is checked before spawning; a token that is already
///   cancelled never launches anything.
/// - If the token fires while the child runs, the child is killed and reaped
///   and `PatchrunError::Cancelled` is returned. No partial output is
///   reported for a cancelled run.
/// - Cancellation is honoured until the output pipes are drained, not just
///   until the child exits.
/// - A child killed by a signal reports [`KILLED_BY_SIGNAL`] as its exit
///   code, with the signal number in `ProcessOutput::signal`.
/// - A spawn failure is reported as `PatchrunError::Launch`.
pub async fn run_process(
    invocation: ProcessInvocation,
    capture: CaptureOptions,
) -> Result<ProcessOutput> {
    let ProcessInvocation {
        program,
        args,
        working_dir,
        env,
        stdin,
        cancel,
    } = invocation;

    if cancel.is_cancelled() {
        debug!(%program, "cancelled before launch");
        return Err(PatchrunError::Cancelled);
    }

    info!(%program, ?args, ?working_dir, "launching process");

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.envs(env);
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| PatchrunError::Launch {
        program: program.clone(),
        source,
    })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let name = program.clone();
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                warn!(program = %name, error = %e, "failed to write stdin");
            }
            // Dropping the pipe closes the child's stdin.
        });
    }

    let stop_readers = CancellationToken::new();
    let stdout_reader = child.stdout.take().map(|out| {
        spawn_line_reader(
            out,
            OutputStream::Stdout,
            capture.stdout_limit,
            capture.stream.clone(),
            program.clone(),
            stop_readers.clone(),
        )
    });
    let stderr_reader = child.stderr.take().map(|err| {
        spawn_line_reader(
            err,
            OutputStream::Stderr,
            capture.stderr_limit,
            capture.stream.clone(),
            program.clone(),
            stop_readers.clone(),
        )
    });

    // Either the process exits on its own, or the caller gives up on it.
    let status = tokio::select! {
        status_res = child.wait() => status_res?,

        _ = cancel.cancelled() => {
            info!(%program, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(%program, error = %e, "failed to kill child process on cancellation");
            }
            stop_readers.cancel();
            return Err(PatchrunError::Cancelled);
        }
    };

    // A grandchild can inherit the pipes and keep them open after the child
    // exits. Draining stays cancellable and is bounded by OUTPUT_DRAIN_TIMEOUT.
    let drained = async {
        let stdout = join_reader(stdout_reader, capture.stdout_limit).await;
        let stderr = join_reader(stderr_reader, capture.stderr_limit).await;
        (stdout, stderr)
    };
    tokio::pin!(drained);

    let (stdout, stderr) = tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            info!(%program, "cancellation requested while draining output");
            stop_readers.cancel();
            return Err(PatchrunError::Cancelled);
        }

        out = &mut drained => out,

        _ = sleep(OUTPUT_DRAIN_TIMEOUT) => {
            warn!(%program, "output pipes still open after exit; closing them");
            stop_readers.cancel();
            drained.await
        }
    };
    let (stdout, stdout_dropped) = stdout?;
    let (stderr, stderr_dropped) = stderr?;

    if stdout_dropped > 0 || stderr_dropped > 0 {
        warn!(%program, stdout_dropped, stderr_dropped, "captured output truncated");
    }

    let signal = terminating_signal(&status);
    let exit_code = match (status.code(), signal) {
        (Some(code), _) => code,
        (None, signal) => {
            warn!(%program, ?signal, "process terminated by a signal");
            KILLED_BY_SIGNAL
        }
    };
    info!(%program, exit_code, success = status.success(), "process exited");

    Ok(ProcessOutput {
        exit_code,
        signal,
        stdout,
        stderr,
        stdout_dropped,
        stderr_dropped,
    })
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Reads one pipe to EOF, or until `stop` fires.
///
/// Lines are split on raw bytes and decoded lossily, so a child printing
/// invalid UTF-8 keeps its pipe drained and is never killed by SIGPIPE.
fn spawn_line_reader<R>(
    reader: R,
    stream: OutputStream,
    limit: Option<usize>,
    tx: Option<mpsc::UnboundedSender<OutputLine>>,
    program: String,
    stop: CancellationToken,
) -> JoinHandle<BoundedLines>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut captured = BoundedLines::new(limit);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    debug!(%program, ?stream, "{}", line);
                    if let Some(tx) = &tx {
                        let _ = tx.send(OutputLine {
                            stream,
                            line: line.clone(),
                        });
                    }
                    captured.push(line);
                }
                Err(e) => {
                    warn!(%program, ?stream, error = %e, "stopped reading output");
                    break;
                }
            }
        }

        captured
    })
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

async fn join_reader(
    reader: Option<JoinHandle<BoundedLines>>,
    limit: Option<usize>,
) -> Result<(Vec<String>, usize)> {
    match reader {
        Some(handle) => {
            let lines = handle
                .await
                .map_err(|e| anyhow!("output reader task failed: {e}"))?;
            Ok(lines.into_parts())
        }
        None => Ok(BoundedLines::new(limit).into_parts()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_line_strips_line_endings() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"windows\r\n"), "windows");
        assert_eq!(decode_line(b"last line"), "last line");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn decode_line_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"a\xffb\n"), "a\u{fffd}b");
    }
}
