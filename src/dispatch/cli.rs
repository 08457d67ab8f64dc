use std::time::{Duration, Instant};

use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::dispatch::Invocation;
use crate::error::P4Error;

pub struct CliDispatch;

impl Default for CliDispatch {
    fn default() -> Self {
        Self
    }
}

impl CliDispatch {
    pub fn new() -> Self {
        Self
    }

    /// Run one subprocess to completion and return its stdout.
    ///
    /// - No shell: `Command::new` + `.args()`
    /// - Environment is cleared and replaced by `req.env`
    /// - The child leads its own process group; timeout, cancellation and
    ///   the output cap kill the whole group
    /// - stdout and stderr are each read up to `req.max_output_bytes`
    /// - A non-zero exit becomes [`P4Error::Invocation`] carrying stdout
    ///   followed by stderr
    pub async fn run(&self, mut req: Invocation) -> Result<Vec<u8>, P4Error> {
        let start = Instant::now();

        let timeout = req
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| *d > Duration::from_millis(10))
            .ok_or(P4Error::Timeout(0))?;

        let command = req.command_line();
        let limit = req.max_output_bytes;

        let mut cmd = Command::new(&req.executable);
        cmd.args(&req.global_args)
            .args(&req.args)
            .env_clear()
            .envs(req.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if req.stdin.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        tracing::debug!(
            executable = %req.executable,
            global_args = ?req.global_args,
            args = ?req.args,
            "spawning"
        );

        let mut child = cmd.spawn().map_err(|source| P4Error::Spawn {
            executable: req.executable.clone(),
            source,
        })?;

        // Feed stdin from its own task so a child that writes before it has
        // drained stdin can't deadlock against us. The secret is zeroized
        // when the task drops it, on every path.
        if let Some(secret) = req.stdin.take() {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| std::io::Error::other("stdin was not piped"))?;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(secret.expose_secret().as_bytes()).await {
                    tracing::debug!("stdin write failed: {e}");
                }
                // drop closes the pipe, the child sees EOF
            });
        }

        // process_group(0) makes the child its own group leader (pgid == pid).
        let child_pid = child.id();

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout was not piped"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr was not piped"))?;

        let read_future = async {
            let stdout_handle = tokio::spawn(read_capped(stdout_pipe, limit, child_pid));
            let stderr_handle = tokio::spawn(read_capped(stderr_pipe, limit, child_pid));
            let (stdout_buf, stderr_buf) = tokio::join!(stdout_handle, stderr_handle);
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((
                stdout_buf.unwrap_or_default(),
                stderr_buf.unwrap_or_default(),
                status,
            ))
        };

        let cancelled = async {
            match &req.cancellation_token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, read_future) => result,
            () = cancelled => {
                kill_process_group(child_pid);
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::debug!(executable = %req.executable, elapsed_ms, "cancelled");
                return Err(P4Error::Cancelled(elapsed_ms));
            }
        };

        let (stdout, stderr, status) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                kill_process_group(child_pid);
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(executable = %req.executable, elapsed_ms, "timed out");
                return Err(P4Error::Timeout(elapsed_ms));
            }
        };

        if stdout.len() > limit || stderr.len() > limit {
            tracing::warn!(executable = %req.executable, limit, "output cap exceeded");
            return Err(P4Error::OutputTooLarge { limit });
        }

        if !status.success() {
            let mut output = String::from_utf8_lossy(&stdout).into_owned();
            output.push_str(&String::from_utf8_lossy(&stderr));
            tracing::warn!(
                executable = %req.executable,
                code = ?status.code(),
                "p4 process failed"
            );
            return Err(P4Error::Invocation {
                command,
                status: status.code(),
                output,
            });
        }

        // Warnings (e.g. "no such file(s)") land here even on success.
        if !stderr.is_empty() {
            tracing::debug!(
                executable = %req.executable,
                stderr = %String::from_utf8_lossy(&stderr),
                "p4 stderr output"
            );
        }

        Ok(stdout)
    }
}

/// Read a pipe to EOF, keeping at most `limit + 1` bytes so the caller can
/// tell "exactly at the cap" from "over it". Going over kills the group:
/// the child would otherwise block on the full pipe and never exit.
async fn read_capped<R>(pipe: R, limit: usize, pid: Option<u32>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    let mut capped = pipe.take(limit as u64 + 1);
    if let Err(e) = capped.read_to_end(&mut buf).await {
        tracing::warn!("pipe read error: {e}");
    }
    if buf.len() > limit {
        kill_process_group(pid);
    }
    buf
}

fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // Negative pid addresses the whole group, so grandchildren holding
        // the pipes open die too.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}
