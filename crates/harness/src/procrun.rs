//! External process runs with live, tagged output streaming.
//!
//! One [`RunRequest`] maps to one subprocess. Output chunks are delivered in
//! arrival order, tagged with their source stream, and every run resolves
//! exactly one [`TerminalStatus`], spawn failures and timeouts included.
//! Runs are fully independent: each owns its subprocess handle and channel,
//! so concurrent runs never interfere.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Size of one read from a child pipe; chunks are delivered as read.
const READ_BUF: usize = 8 * 1024;
/// Grace period for a killed child to exit.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Output channel depth before the pumps see backpressure.
const CHANNEL_DEPTH: usize = 64;

/// Which child stream a chunk arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamSource {
	Stdout,
	Stderr,
}

/// One chunk of child output, tagged with its source stream.
///
/// A stream's own chunks are never reordered; chunks from the two streams
/// interleave in arrival order.
#[derive(Clone, Debug)]
pub struct OutputChunk {
	pub source: StreamSource,
	pub data: Vec<u8>,
}

/// Final classification of one process run. Exactly one per run.
#[derive(Clone, Debug, Default)]
pub struct TerminalStatus {
	/// Exit code when the process exited normally.
	pub exit_code: Option<i32>,
	/// True only for a normal exit with code zero.
	pub success: bool,
	/// Spawn or wait failure, set instead of an exit code.
	pub error: Option<String>,
	/// True when the run was killed at its timeout.
	pub timed_out: bool,
}

impl TerminalStatus {
	fn exited(code: Option<i32>) -> Self {
		Self {
			exit_code: code,
			success: code == Some(0),
			error: None,
			timed_out: false,
		}
	}

	fn spawn_error(command: &str, err: io::Error) -> Self {
		Self {
			error: Some(format!("failed to spawn {command}: {err}")),
			..Self::default()
		}
	}

	fn timeout() -> Self {
		Self {
			timed_out: true,
			..Self::default()
		}
	}

	/// One-line verdict for live consumers.
	pub fn summary(&self) -> String {
		if let Some(error) = &self.error {
			format!("error: {error}")
		} else if self.timed_out {
			"timed out".to_string()
		} else {
			match self.exit_code {
				Some(code) => format!("exit code {code} ({})", if self.success { "passed" } else { "failed" }),
				None => "killed by signal".to_string(),
			}
		}
	}
}

/// One external command invocation.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
	pub command: String,
	pub args: Vec<String>,
	/// Overlay on the inherited environment; these keys win on conflict.
	pub env: Vec<(String, String)>,
	pub cwd: Option<PathBuf>,
	/// Total wall-clock bound; the child is killed at expiry.
	pub timeout: Option<Duration>,
}

impl RunRequest {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			..Self::default()
		}
	}

	/// Sets the argument vector.
	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Adds one environment overlay entry.
	pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.push((key.into(), value.into()));
		self
	}

	/// Sets the working directory.
	pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
		self.cwd = Some(dir.into());
		self
	}

	/// Sets the total wall-clock bound.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}

/// Spawns process runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
	/// Starts `request` and returns the live run handle.
	///
	/// Never fails at the call site: spawn errors surface through the
	/// terminal status so consumers can still render whatever output was
	/// produced before the failure.
	pub fn spawn(request: RunRequest) -> ProcessRun {
		let (chunk_tx, chunk_rx) = mpsc::channel(CHANNEL_DEPTH);
		let status = tokio::spawn(drive(request, chunk_tx));
		ProcessRun {
			output: chunk_rx,
			status,
		}
	}
}

/// A live process run: tagged output plus the pending terminal status.
pub struct ProcessRun {
	/// Tagged output chunks; closed once both pipes reach EOF.
	pub output: mpsc::Receiver<OutputChunk>,
	status: JoinHandle<TerminalStatus>,
}

impl ProcessRun {
	/// Runs `request` with `lock` held for the whole run, forwarding its
	/// output. Serializes runs that share a mutable target.
	pub(crate) fn locked(lock: &'static Mutex<()>, request: RunRequest) -> Self {
		let (chunk_tx, chunk_rx) = mpsc::channel(CHANNEL_DEPTH);
		let status = tokio::spawn(async move {
			let _guard = lock.lock().await;
			let mut inner = ProcessRunner::spawn(request);
			while let Some(chunk) = inner.output.recv().await {
				// Receiver gone: keep draining so the child is still reaped.
				let _ = chunk_tx.send(chunk).await;
			}
			inner.wait().await
		});
		Self {
			output: chunk_rx,
			status,
		}
	}

	/// Resolves the terminal status once the run completes.
	pub async fn wait(mut self) -> TerminalStatus {
		// Stop accepting chunks so the pumps drain freely even when the
		// caller never consumed the output.
		self.output.close();
		match self.status.await {
			Ok(status) => status,
			Err(err) => TerminalStatus {
				error: Some(format!("run task failed: {err}")),
				..TerminalStatus::default()
			},
		}
	}

	/// Drains all output, then resolves the terminal status.
	pub async fn collect(mut self) -> (Vec<OutputChunk>, TerminalStatus) {
		let mut chunks = Vec::new();
		while let Some(chunk) = self.output.recv().await {
			chunks.push(chunk);
		}
		let status = self.wait().await;
		(chunks, status)
	}
}

async fn drive(request: RunRequest, chunks: mpsc::Sender<OutputChunk>) -> TerminalStatus {
	let mut command = Command::new(&request.command);
	command
		.args(&request.args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	for (key, value) in &request.env {
		command.env(key, value);
	}
	if let Some(dir) = &request.cwd {
		command.current_dir(dir);
	}

	let mut child = match command.spawn() {
		Ok(child) => child,
		Err(err) => {
			debug!(target = "e2e.run", command = %request.command, error = %err, "spawn failed");
			return TerminalStatus::spawn_error(&request.command, err);
		}
	};

	let stdout_pump = tokio::spawn(pump(child.stdout.take(), StreamSource::Stdout, chunks.clone()));
	let stderr_pump = tokio::spawn(pump(child.stderr.take(), StreamSource::Stderr, chunks));

	let status = match request.timeout {
		Some(bound) => match tokio::time::timeout(bound, child.wait()).await {
			Ok(waited) => finish(waited),
			Err(_) => {
				warn!(
					target = "e2e.run",
					command = %request.command,
					timeout_ms = bound.as_millis() as u64,
					"run timed out, killing child"
				);
				let _ = child.start_kill();
				let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
				TerminalStatus::timeout()
			}
		},
		None => finish(child.wait().await),
	};

	// Let the pumps flush whatever the child wrote before exiting. After a
	// kill, surviving grandchildren may hold the pipes open; bound the drain
	// so the status still resolves.
	if status.timed_out {
		for mut pump in [stdout_pump, stderr_pump] {
			if tokio::time::timeout(KILL_GRACE, &mut pump).await.is_err() {
				pump.abort();
			}
		}
	} else {
		let _ = stdout_pump.await;
		let _ = stderr_pump.await;
	}

	debug!(
		target = "e2e.run",
		command = %request.command,
		summary = %status.summary(),
		"run finished"
	);
	status
}

fn finish(waited: io::Result<std::process::ExitStatus>) -> TerminalStatus {
	match waited {
		Ok(status) => TerminalStatus::exited(status.code()),
		Err(err) => TerminalStatus {
			error: Some(format!("wait failed: {err}")),
			..TerminalStatus::default()
		},
	}
}

async fn pump<R>(pipe: Option<R>, source: StreamSource, chunks: mpsc::Sender<OutputChunk>)
where
	R: AsyncRead + Unpin,
{
	let Some(mut pipe) = pipe else { return };
	let mut buf = vec![0u8; READ_BUF];
	loop {
		match pipe.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				// Receiver gone: keep reading so the child never blocks on a
				// full pipe.
				let _ = chunks
					.send(OutputChunk {
						source,
						data: buf[..n].to_vec(),
					})
					.await;
			}
			Err(err) => {
				debug!(target = "e2e.run", source = ?source, error = %err, "pipe read failed");
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn summary_reports_verdicts() {
		assert_eq!(TerminalStatus::exited(Some(0)).summary(), "exit code 0 (passed)");
		assert_eq!(TerminalStatus::exited(Some(2)).summary(), "exit code 2 (failed)");
		assert_eq!(TerminalStatus::exited(None).summary(), "killed by signal");
		assert_eq!(TerminalStatus::timeout().summary(), "timed out");
		let spawn = TerminalStatus::spawn_error("mytool", io::Error::new(io::ErrorKind::NotFound, "missing"));
		assert!(spawn.summary().starts_with("error: failed to spawn mytool"));
	}

	#[test]
	fn success_requires_exit_zero() {
		assert!(TerminalStatus::exited(Some(0)).success);
		assert!(!TerminalStatus::exited(Some(1)).success);
		assert!(!TerminalStatus::exited(None).success);
		assert!(!TerminalStatus::timeout().success);
	}

	#[test]
	fn request_builders_accumulate() {
		let request = RunRequest::new("cargo")
			.with_args(["test", "--workspace"])
			.with_env("CI", "true")
			.with_cwd("/tmp")
			.with_timeout(Duration::from_secs(60));
		assert_eq!(request.command, "cargo");
		assert_eq!(request.args, vec!["test", "--workspace"]);
		assert_eq!(request.env, vec![("CI".to_string(), "true".to_string())]);
		assert_eq!(request.cwd, Some(PathBuf::from("/tmp")));
		assert_eq!(request.timeout, Some(Duration::from_secs(60)));
	}
}
