//! Worker Pool (§4.I): a bounded set of concurrent worker slots, each
//! wrapping one child-process lifecycle (spawn, stdout/stderr capture,
//! timeout-to-kill, cooperative or immediate termination).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    Running,
    Exited,
}

#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub worker_id: String,
    pub binary: String,
    pub args: Vec<String>,
    pub stdin: String,
    pub env: HashMap<String, String>,
    pub cwd: Option<std::path::PathBuf>,
    pub timeout: Duration,
}

/// A worker's terminal outcome: normal exit (`onComplete`) or non-zero
/// exit / timeout-synthesized failure (`onError`), matching §4.I's two
/// callback shapes.
#[derive(Debug)]
pub enum WorkOutcome {
    Complete { worker_id: String, stdout: String, stderr: String, exit_code: i32 },
    Error { worker_id: String, stderr: String, exit_code: Option<i32> },
}

struct RunningWorker {
    state: Arc<Mutex<WorkerState>>,
    pid: Option<i32>,
    cancel: Option<oneshot::Sender<Signal>>,
}

/// Bounded pool of concurrent worker slots. Accepts new work only when a
/// semaphore permit is available; `spawn` blocks until one frees up, so
/// callers that want non-blocking dispatch should check [`available`]
/// first (mirrors the Task-Graph Engine's "drain ready set up to available
/// slots" tick step, §4.J).
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<String, RunningWorker>>>,
    outcomes: mpsc::UnboundedSender<WorkOutcome>,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> (Self, mpsc::UnboundedReceiver<WorkOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                semaphore: Arc::new(Semaphore::new(max_concurrency)),
                running: Arc::new(Mutex::new(HashMap::new())),
                outcomes: tx,
            },
            rx,
        )
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquires a slot (awaiting if none are free), spawns `request.binary`,
    /// and drives it to completion or timeout on a background task,
    /// publishing a [`WorkOutcome`] on the pool's outcome channel.
    pub async fn spawn(&self, request: WorkRequest) {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore never closed");
        let worker_id = request.worker_id.clone();
        let state = Arc::new(Mutex::new(WorkerState::Spawned));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.running.lock().await.insert(
            worker_id.clone(),
            RunningWorker { state: state.clone(), pid: None, cancel: Some(cancel_tx) },
        );

        let outcomes = self.outcomes.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = run_worker(request.clone(), state.clone(), cancel_rx, running.clone()).await;
            *state.lock().await = WorkerState::Exited;
            running.lock().await.remove(&request.worker_id);
            let _ = outcomes.send(outcome);
        });
    }

    /// Sends `signal` to the worker's process group leader. `SIGTERM` asks
    /// cooperatively; `SIGKILL` is immediate. No-op if the worker already
    /// exited or was never given a pid (spawn failure).
    pub async fn terminate(&self, worker_id: &str, signal: Signal) {
        let mut running = self.running.lock().await;
        if let Some(worker) = running.get_mut(worker_id) {
            if let Some(pid) = worker.pid {
                let _ = signal::kill(Pid::from_raw(pid), signal);
            }
            if signal == Signal::SIGKILL {
                if let Some(cancel) = worker.cancel.take() {
                    let _ = cancel.send(signal);
                }
            }
        }
    }

    pub async fn state_of(&self, worker_id: &str) -> Option<WorkerState> {
        let running = self.running.lock().await;
        if let Some(worker) = running.get(worker_id) {
            Some(*worker.state.lock().await)
        } else {
            None
        }
    }
}

async fn run_worker(
    request: WorkRequest,
    state: Arc<Mutex<WorkerState>>,
    mut cancel: oneshot::Receiver<Signal>,
    running: Arc<Mutex<HashMap<String, RunningWorker>>>,
) -> WorkOutcome {
    let mut command = Command::new(&request.binary);
    command.args(&request.args);
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &request.env {
        command.env(key, value);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return WorkOutcome::Error { worker_id: request.worker_id, stderr: format!("failed to spawn: {e}"), exit_code: None };
        }
    };

    if let Some(pid) = child.id() {
        if let Some(worker) = running.lock().await.get_mut(&request.worker_id) {
            worker.pid = Some(pid as i32);
        }
    }
    *state.lock().await = WorkerState::Running;
    debug!(worker_id = %request.worker_id, "run_worker: running");

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(request.stdin.as_bytes()).await;
    }

    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    if let Some(mut out) = child.stdout.take() {
        let buf = stdout_buf.clone();
        tokio::spawn(async move {
            let mut s = String::new();
            let _ = out.read_to_string(&mut s).await;
            *buf.lock().await = s;
        });
    }
    if let Some(mut err) = child.stderr.take() {
        let buf = stderr_buf.clone();
        tokio::spawn(async move {
            let mut s = String::new();
            let _ = err.read_to_string(&mut s).await;
            *buf.lock().await = s;
        });
    }

    let wait_result = tokio::select! {
        status = tokio::time::timeout(request.timeout, child.wait()) => status,
        _ = &mut cancel => {
            let _ = child.kill().await;
            Ok(child.wait().await)
        }
    };

    match wait_result {
        Ok(status) => {
            let stdout = stdout_buf.lock().await.clone();
            let stderr = stderr_buf.lock().await.clone();
            match status.ok().and_then(|s| s.code()) {
                Some(0) => WorkOutcome::Complete { worker_id: request.worker_id, stdout, stderr, exit_code: 0 },
                code => WorkOutcome::Error { worker_id: request.worker_id, stderr, exit_code: code },
            }
        }
        Err(_) => {
            warn!(worker_id = %request.worker_id, "run_worker: timed out, killing");
            let _ = child.kill().await;
            let stderr = stderr_buf.lock().await.clone();
            WorkOutcome::Error { worker_id: request.worker_id, stderr, exit_code: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_reports_completion_for_successful_command() {
        let (pool, mut outcomes) = WorkerPool::new(2);
        pool.spawn(WorkRequest {
            worker_id: "w1".to_string(),
            binary: "true".to_string(),
            args: vec![],
            stdin: String::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: Duration::from_secs(5),
        })
        .await;

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, WorkOutcome::Complete { exit_code: 0, .. }));
    }

    #[tokio::test]
    async fn pool_reports_error_for_failing_command() {
        let (pool, mut outcomes) = WorkerPool::new(2);
        pool.spawn(WorkRequest {
            worker_id: "w1".to_string(),
            binary: "false".to_string(),
            args: vec![],
            stdin: String::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: Duration::from_secs(5),
        })
        .await;

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, WorkOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn available_permits_track_slot_usage() {
        let (pool, _outcomes) = WorkerPool::new(1);
        assert_eq!(pool.available(), 1);
    }
}
