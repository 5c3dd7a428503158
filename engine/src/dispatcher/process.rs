use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use super::DispatchRequest;

pub struct Capture {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

pub struct TimeoutCapture {
    pub stderr: String,
}

/// Spawn `binary` with the OS-native pipe/pipe/pipe stdio model, write
/// `stdin_payload` then close stdin, and accumulate stdout/stderr to
/// completion or to a forceful kill at `timeout`.
///
/// Stdout/stderr are drained on background tasks into shared buffers so a
/// timeout can still report whatever was captured before the kill (§4.F:
/// "deliver a forceful kill signal, mark status timeout, and synthesize a
/// failure result with the captured stderr").
pub async fn spawn_and_capture(
    binary: &str,
    request: &DispatchRequest,
    stdin_payload: &str,
    timeout: Duration,
) -> Result<Capture, TimeoutCapture> {
    debug!(binary, agent = %request.agent, "spawn_and_capture: spawning");
    let mut command = Command::new(binary);
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env_overrides {
        command.env(key, value);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(error = %e, "spawn_and_capture: spawn failed");
            return Err(TimeoutCapture { stderr: format!("failed to spawn {binary}: {e}") });
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(stdin_payload.as_bytes()).await;
        // dropping `stdin` here closes the pipe so the child sees EOF.
    }

    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));

    if let Some(mut out) = child.stdout.take() {
        let buf = stdout_buf.clone();
        tokio::spawn(async move {
            let mut chunk = String::new();
            let _ = out.read_to_string(&mut chunk).await;
            *buf.lock().await = chunk;
        });
    }
    if let Some(mut err) = child.stderr.take() {
        let buf = stderr_buf.clone();
        tokio::spawn(async move {
            let mut chunk = String::new();
            let _ = err.read_to_string(&mut chunk).await;
            *buf.lock().await = chunk;
        });
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            // Reader tasks finish at/just after EOF, which coincides with
            // process exit; a short join point keeps this deterministic.
            let stdout = stdout_buf.lock().await.clone();
            let stderr = stderr_buf.lock().await.clone();
            Ok(Capture {
                stdout,
                stderr,
                exit_code: status.ok().and_then(|s| s.code()),
            })
        }
        Err(_) => {
            debug!("spawn_and_capture: timeout elapsed, killing child");
            let _ = child.kill().await;
            let stderr = stderr_buf.lock().await.clone();
            Err(TimeoutCapture { stderr })
        }
    }
}
