//! Browser engine provisioning: discovery, trial launch, bounded install.
//!
//! The provisioner never fails hard: it answers whether an engine is
//! launchable, installing it first when necessary. Callers decide what a
//! `false` answer means; typically the subsequent real launch fails with a
//! clearer error at the point of use.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::detection::{DetectionOptions, default_executable};
use futures::StreamExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::procrun::{ProcessRun, RunRequest};
use crate::types::EngineKind;

/// Trial launches give up quickly; a working install answers well within this.
const TRIAL_LAUNCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Hard wall-clock bound for one installation subprocess.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
/// Grace period for a killed installer to exit.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// One install lock per engine kind. Installs for the same engine mutate the
/// same target directory and must never interleave.
static INSTALL_LOCKS: [Mutex<()>; 3] = [Mutex::const_new(()), Mutex::const_new(()), Mutex::const_new(())];

fn install_lock(engine: EngineKind) -> &'static Mutex<()> {
	&INSTALL_LOCKS[engine as usize]
}

/// Outcome of one installation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
	Installed,
	Failed,
	TimedOut,
}

/// Ephemeral record of one installation attempt. Logged by the caller,
/// never persisted.
#[derive(Debug)]
pub struct InstallationRecord {
	pub engine: EngineKind,
	pub outcome: InstallOutcome,
	pub elapsed: Duration,
}

/// Ensures browser engines are launchable before a scenario needs them.
pub struct BrowserProvisioner {
	config: HarnessConfig,
}

impl BrowserProvisioner {
	pub fn new(config: HarnessConfig) -> Self {
		Self { config }
	}

	/// Locates the engine executable: the configured install directory
	/// first, then well-known names and paths, then generic detection for
	/// plain chromium.
	pub fn resolve_executable(&self, engine: EngineKind) -> Option<PathBuf> {
		if let Some(root) = &self.config.browsers_path {
			if let Some(path) = find_managed_install(root, engine) {
				return Some(path);
			}
		}

		for candidate in executable_candidates(engine) {
			let path = Path::new(&candidate);
			if path.is_absolute() {
				if path.exists() {
					return Some(path.to_path_buf());
				}
			} else if let Ok(found) = which::which(&candidate) {
				return Some(found);
			}
		}

		if engine == EngineKind::Chromium {
			// Any chromium-family browser satisfies the plain chromium kind.
			let options = DetectionOptions {
				msedge: false,
				unstable: false,
			};
			if let Ok(path) = default_executable(options) {
				return Some(path);
			}
		}

		None
	}

	/// Trial launch-and-close probe; no install attempt.
	pub async fn probe(&self, engine: EngineKind) -> bool {
		self.trial_launch(engine).await
	}

	/// Returns true when `engine` is launchable, installing it on demand.
	///
	/// A working install short-circuits without any installation
	/// subprocess. Install attempts for the same engine are serialized; the
	/// probe is repeated under the lock in case another task finished the
	/// install while this one waited.
	pub async fn ensure_available(&self, engine: EngineKind) -> bool {
		if self.trial_launch(engine).await {
			debug!(target = "e2e.provision", engine = %engine, "engine already available");
			return true;
		}

		let _guard = install_lock(engine).lock().await;

		if self.trial_launch(engine).await {
			debug!(target = "e2e.provision", engine = %engine, "engine installed while waiting for lock");
			return true;
		}

		let record = self.install_locked(engine).await;
		match record.outcome {
			InstallOutcome::Installed => {
				debug!(
					target = "e2e.provision",
					engine = %engine,
					elapsed_ms = record.elapsed.as_millis() as u64,
					"engine installed"
				);
				self.trial_launch(engine).await
			}
			outcome => {
				warn!(
					target = "e2e.provision",
					engine = %engine,
					outcome = ?outcome,
					elapsed_ms = record.elapsed.as_millis() as u64,
					"engine installation did not complete"
				);
				false
			}
		}
	}

	/// Runs one installation subprocess with the per-engine lock held,
	/// streaming its output. Backs the operator-facing install surface.
	pub fn install_streaming(&self, engine: EngineKind) -> io::Result<ProcessRun> {
		let request = self.installer_request(engine)?;
		Ok(ProcessRun::locked(install_lock(engine), request))
	}

	/// Command line for the preferred available installer.
	pub fn installer_request(&self, engine: EngineKind) -> io::Result<RunRequest> {
		let (program, leading_args) = installer_program()?;
		let mut args: Vec<String> = leading_args.iter().map(|arg| arg.to_string()).collect();
		args.push("install".to_string());
		args.push(engine.installer_channel().to_string());

		let mut request = RunRequest::new(program.to_string_lossy())
			.with_args(args)
			.with_timeout(INSTALL_TIMEOUT);
		if let Some(path) = &self.config.browsers_path {
			request = request.with_env("PLAYWRIGHT_BROWSERS_PATH", path.to_string_lossy());
		}
		Ok(request)
	}

	/// Runs one installation attempt for `engine`, serialized with other
	/// installs of the same engine. The returned record is for the caller's
	/// log; it is not retained.
	pub async fn install(&self, engine: EngineKind) -> InstallationRecord {
		let _guard = install_lock(engine).lock().await;
		self.install_locked(engine).await
	}

	async fn trial_launch(&self, engine: EngineKind) -> bool {
		let Some(executable) = self.resolve_executable(engine) else {
			debug!(target = "e2e.provision", engine = %engine, "no executable found");
			return false;
		};

		let config = BrowserConfig::builder()
			.chrome_executable(&executable)
			.no_sandbox()
			.launch_timeout(TRIAL_LAUNCH_TIMEOUT)
			.build();
		let config = match config {
			Ok(config) => config,
			Err(err) => {
				warn!(target = "e2e.provision", engine = %engine, error = %err, "launch config rejected");
				return false;
			}
		};

		match Browser::launch(config).await {
			Ok((mut browser, mut handler)) => {
				let events = tokio::spawn(async move { while let Some(Ok(())) = handler.next().await {} });
				if let Err(err) = browser.close().await {
					debug!(target = "e2e.provision", engine = %engine, error = %err, "trial close failed");
				}
				let _ = tokio::time::timeout(KILL_GRACE, browser.wait()).await;
				events.abort();
				true
			}
			Err(err) => {
				debug!(
					target = "e2e.provision",
					engine = %engine,
					executable = %executable.display(),
					error = %err,
					"trial launch failed"
				);
				false
			}
		}
	}

	/// Runs one installation attempt for `engine`.
	///
	/// The installer CLI on the path is the primary mechanism, with `npx` as
	/// the fallback. The fallback runs only when the primary demonstrably
	/// never started: a primary that ran and then failed may have partially
	/// populated the install directory, and layering a second mechanism on
	/// top of that is not known to be safe.
	async fn install_locked(&self, engine: EngineKind) -> InstallationRecord {
		let started = Instant::now();
		let outcome = match self.run_primary_installer(engine).await {
			Ok(outcome) => outcome,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				debug!(
					target = "e2e.provision",
					engine = %engine,
					"primary installer unavailable, trying npx fallback"
				);
				match self.run_fallback_installer(engine).await {
					Ok(outcome) => outcome,
					Err(err) => {
						warn!(target = "e2e.provision", engine = %engine, error = %err, "fallback installer failed to start");
						InstallOutcome::Failed
					}
				}
			}
			Err(err) => {
				warn!(target = "e2e.provision", engine = %engine, error = %err, "installer failed to start");
				InstallOutcome::Failed
			}
		};
		InstallationRecord {
			engine,
			outcome,
			elapsed: started.elapsed(),
		}
	}

	async fn run_primary_installer(&self, engine: EngineKind) -> io::Result<InstallOutcome> {
		let cli = which::which("playwright").map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
		let mut command = Command::new(cli);
		command.arg("install").arg(engine.installer_channel());
		self.run_installer(engine, command, "playwright-cli", INSTALL_TIMEOUT).await
	}

	async fn run_fallback_installer(&self, engine: EngineKind) -> io::Result<InstallOutcome> {
		let npx = which::which("npx").map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
		let mut command = Command::new(npx);
		command.arg("playwright").arg("install").arg(engine.installer_channel());
		self.run_installer(engine, command, "npx", INSTALL_TIMEOUT).await
	}

	async fn run_installer(
		&self,
		engine: EngineKind,
		mut command: Command,
		installer: &'static str,
		timeout: Duration,
	) -> io::Result<InstallOutcome> {
		command
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);
		if let Some(path) = &self.config.browsers_path {
			command.env("PLAYWRIGHT_BROWSERS_PATH", path);
		}

		let mut child = command.spawn()?;
		match tokio::time::timeout(timeout, child.wait()).await {
			Ok(Ok(status)) if status.success() => Ok(InstallOutcome::Installed),
			Ok(Ok(status)) => {
				warn!(
					target = "e2e.provision",
					engine = %engine,
					installer,
					status = %status,
					"installer exited unsuccessfully"
				);
				Ok(InstallOutcome::Failed)
			}
			Ok(Err(err)) => {
				warn!(target = "e2e.provision", engine = %engine, installer, error = %err, "installer wait failed");
				Ok(InstallOutcome::Failed)
			}
			Err(_) => {
				warn!(
					target = "e2e.provision",
					engine = %engine,
					installer,
					timeout_s = timeout.as_secs(),
					"installer timed out, killing it"
				);
				let _ = child.start_kill();
				let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
				Ok(InstallOutcome::TimedOut)
			}
		}
	}
}

/// Installer program on the path: the playwright CLI directly when present,
/// otherwise `npx`.
fn installer_program() -> io::Result<(PathBuf, &'static [&'static str])> {
	if let Ok(cli) = which::which("playwright") {
		return Ok((cli, &[]));
	}
	let npx = which::which("npx").map_err(|err| io::Error::new(io::ErrorKind::NotFound, err))?;
	Ok((npx, &["playwright"]))
}

/// Well-known executable names and locations per engine kind.
fn executable_candidates(engine: EngineKind) -> Vec<String> {
	let candidates: Vec<&str> = if cfg!(target_os = "macos") {
		match engine {
			EngineKind::Chromium => vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
			EngineKind::Chrome => vec!["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"],
			EngineKind::Edge => vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
		}
	} else if cfg!(target_os = "windows") {
		match engine {
			EngineKind::Chromium => vec!["chromium.exe", "chrome.exe"],
			EngineKind::Chrome => vec!["chrome.exe"],
			EngineKind::Edge => vec!["msedge.exe"],
		}
	} else {
		match engine {
			EngineKind::Chromium => vec![
				"chromium",
				"chromium-browser",
				"/usr/bin/chromium",
				"/usr/bin/chromium-browser",
				"/snap/bin/chromium",
			],
			EngineKind::Chrome => vec![
				"google-chrome-stable",
				"google-chrome",
				"/usr/bin/google-chrome-stable",
				"/usr/bin/google-chrome",
			],
			EngineKind::Edge => vec![
				"microsoft-edge",
				"microsoft-edge-stable",
				"/usr/bin/microsoft-edge",
				"/usr/bin/microsoft-edge-stable",
			],
		}
	};

	candidates.into_iter().map(str::to_string).collect()
}

/// Scans a managed install directory (the playwright browsers layout:
/// `<channel>-<build>/...`) for an engine executable.
fn find_managed_install(root: &Path, engine: EngineKind) -> Option<PathBuf> {
	let prefix = format!("{}-", engine.installer_channel());
	let mut builds: Vec<PathBuf> = std::fs::read_dir(root)
		.ok()?
		.flatten()
		.map(|entry| entry.path())
		.filter(|path| {
			path.is_dir()
				&& path
					.file_name()
					.and_then(|name| name.to_str())
					.is_some_and(|name| name.starts_with(&prefix))
		})
		.collect();
	// Prefer the newest build when several are installed.
	builds.sort();
	builds.reverse();

	let suffixes: &[&str] = if cfg!(target_os = "macos") {
		&[
			"chrome-mac/Chromium.app/Contents/MacOS/Chromium",
			"chrome-mac/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
		]
	} else if cfg!(target_os = "windows") {
		&["chrome-win/chrome.exe"]
	} else {
		&["chrome-linux/chrome", "chrome-linux/headless_shell"]
	};

	for build in builds {
		for suffix in suffixes {
			let path = build.join(suffix);
			if path.exists() {
				return Some(path);
			}
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_lock_per_engine() {
		let mut seen = std::collections::HashSet::new();
		for engine in EngineKind::ALL {
			let index = engine as usize;
			assert!(index < INSTALL_LOCKS.len());
			assert!(seen.insert(index), "{engine} shares a lock slot");
		}
	}

	#[test]
	fn candidates_are_engine_specific() {
		let chromium = executable_candidates(EngineKind::Chromium);
		let edge = executable_candidates(EngineKind::Edge);
		assert!(!chromium.is_empty());
		assert!(!edge.is_empty());
		assert!(chromium.iter().all(|c| !c.contains("edge")));
	}

	#[test]
	fn managed_install_scan_finds_newest_build() {
		let temp = tempfile::TempDir::new().unwrap();
		let old_build = temp.path().join("chromium-1000").join("chrome-linux");
		let new_build = temp.path().join("chromium-1001").join("chrome-linux");
		for build in [&old_build, &new_build] {
			std::fs::create_dir_all(build).unwrap();
			std::fs::write(build.join("chrome"), b"").unwrap();
		}

		if cfg!(target_os = "linux") {
			let found = find_managed_install(temp.path(), EngineKind::Chromium).unwrap();
			assert!(found.starts_with(temp.path().join("chromium-1001")));
		}
		assert!(find_managed_install(temp.path(), EngineKind::Edge).is_none());
	}

	#[test]
	fn managed_install_scan_ignores_missing_root() {
		assert!(find_managed_install(Path::new("/definitely/missing"), EngineKind::Chromium).is_none());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn installer_timeout_kills_within_grace() {
		let provisioner = BrowserProvisioner::new(HarnessConfig::default());
		let mut command = Command::new("sleep");
		command.arg("30");

		let bound = Duration::from_millis(200);
		let started = Instant::now();
		let outcome = provisioner
			.run_installer(EngineKind::Chromium, command, "test", bound)
			.await
			.unwrap();

		assert_eq!(outcome, InstallOutcome::TimedOut);
		assert!(
			started.elapsed() < bound + KILL_GRACE + Duration::from_secs(2),
			"installer was not killed within the grace period"
		);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn installer_nonzero_exit_is_failed() {
		let provisioner = BrowserProvisioner::new(HarnessConfig::default());
		let mut command = Command::new("sh");
		command.arg("-c").arg("exit 7");

		let outcome = provisioner
			.run_installer(EngineKind::Chrome, command, "test", Duration::from_secs(5))
			.await
			.unwrap();
		assert_eq!(outcome, InstallOutcome::Failed);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn installer_zero_exit_is_installed() {
		let provisioner = BrowserProvisioner::new(HarnessConfig::default());
		let outcome = provisioner
			.run_installer(EngineKind::Edge, Command::new("true"), "test", Duration::from_secs(5))
			.await
			.unwrap();
		assert_eq!(outcome, InstallOutcome::Installed);
	}

	#[tokio::test]
	async fn missing_installer_surfaces_not_found() {
		let provisioner = BrowserProvisioner::new(HarnessConfig::default());
		let command = Command::new("definitely-not-a-real-installer-binary");
		let err = provisioner
			.run_installer(EngineKind::Chromium, command, "test", Duration::from_secs(5))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
	}
}
