//! Session orchestration: acquisition, failure evidence, guaranteed teardown.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::{debug, warn};

use super::recording::Recording;
use super::{Session, SessionOptions, SessionState, artifact_slug};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::provision::BrowserProvisioner;
use crate::types::EngineKind;

/// Launch attempts give up after this bound; a healthy install answers well
/// within it.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period for a closed browser process to exit.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Creates and destroys scenario-scoped sessions.
///
/// Managers are independent units: hosts may run one per concurrent scenario
/// without cross-manager locking, or share one across scenarios. The only
/// state shared between sessions is the per-engine install lock inside the
/// provisioner.
pub struct SessionLifecycleManager {
	config: HarnessConfig,
	provisioner: BrowserProvisioner,
	active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLifecycleManager {
	/// Creates a manager from owned configuration.
	pub fn new(config: HarnessConfig) -> Self {
		let provisioner = BrowserProvisioner::new(config.clone());
		Self {
			config,
			provisioner,
			active: Arc::new(Mutex::new(HashSet::new())),
		}
	}

	/// Resolved configuration this manager was built with.
	pub fn config(&self) -> &HarnessConfig {
		&self.config
	}

	/// Starts a session for one scenario.
	///
	/// Provisioning re-enters itself at most once: when the first launch
	/// fails and the provisioner reports the engine available after an
	/// install, the launch is retried. Any remaining failure surfaces as
	/// [`HarnessError::Provisioning`] and the scenario must not proceed.
	pub async fn start(&self, scenario_id: &str, engine: EngineKind, options: SessionOptions) -> Result<Session> {
		{
			let mut active = self.active.lock().unwrap();
			if !active.insert(scenario_id.to_string()) {
				return Err(HarnessError::ScenarioActive {
					scenario: scenario_id.to_string(),
				});
			}
		}

		match self.provision(scenario_id, engine, &options).await {
			Ok(session) => {
				debug!(
					target = "e2e.session",
					scenario = scenario_id,
					engine = %engine,
					"session ready"
				);
				Ok(session)
			}
			Err(err) => {
				self.active.lock().unwrap().remove(scenario_id);
				Err(err)
			}
		}
	}

	async fn provision(&self, scenario_id: &str, engine: EngineKind, options: &SessionOptions) -> Result<Session> {
		debug!(
			target = "e2e.session",
			scenario = scenario_id,
			engine = %engine,
			headless = options.headless,
			"provisioning session"
		);

		let first = match self.launch(scenario_id, engine, options).await {
			Ok(session) => return Ok(session),
			Err(err) => err,
		};

		if !self.provisioner.ensure_available(engine).await {
			return Err(HarnessError::Provisioning {
				engine,
				reason: format!("engine unavailable and installation did not recover it: {first}"),
			});
		}

		// Re-enter provisioning once now that the engine is installed.
		self.launch(scenario_id, engine, options)
			.await
			.map_err(|err| HarnessError::Provisioning {
				engine,
				reason: err.to_string(),
			})
	}

	async fn launch(&self, scenario_id: &str, engine: EngineKind, options: &SessionOptions) -> Result<Session> {
		let executable = self
			.provisioner
			.resolve_executable(engine)
			.ok_or_else(|| HarnessError::BrowserLaunch(format!("no {engine} executable found")))?;

		let viewport = Viewport {
			width: options.viewport_width,
			height: options.viewport_height,
			..Viewport::default()
		};
		let mut builder = BrowserConfig::builder()
			.chrome_executable(&executable)
			// Containers commonly run the harness as root, where the engine
			// refuses its own sandbox.
			.no_sandbox()
			.window_size(options.viewport_width, options.viewport_height)
			.viewport(viewport)
			.launch_timeout(LAUNCH_TIMEOUT);
		// The builder launches headless unless asked for a visible window.
		if !options.headless {
			builder = builder.with_head();
		}
		let config = builder.build().map_err(HarnessError::BrowserLaunch)?;

		let (mut browser, mut handler) = Browser::launch(config).await?;
		let events = tokio::spawn(async move { while let Some(Ok(())) = handler.next().await {} });

		let prepared = async {
			// One isolated context per scenario; cookies and cache never
			// leak across sessions.
			browser.start_incognito_context().await?;
			let page: Page = browser.new_page("about:blank").await?;
			let recording = match &options.video_dir {
				Some(dir) => Some(Recording::start(&page, dir.clone()).await?),
				None => None,
			};
			Ok::<_, HarnessError>((page, recording))
		}
		.await;

		match prepared {
			Ok((page, recording)) => Ok(Session::new(
				browser,
				events,
				page,
				recording,
				engine,
				scenario_id.to_string(),
				options.clone(),
			)),
			Err(err) => {
				// Partial acquisition: release what exists before surfacing.
				let _ = browser.close().await;
				let _ = tokio::time::timeout(CLOSE_GRACE, browser.wait()).await;
				events.abort();
				Err(err)
			}
		}
	}

	/// Best-effort failure screenshot, named deterministically from `label`.
	///
	/// Never errors: evidence capture must not mask the failure it is
	/// documenting. Internal failures are logged and swallowed.
	pub async fn capture_failure_evidence(&self, session: &mut Session, label: &str) -> Option<PathBuf> {
		let dir = self.config.screenshots_dir();
		if let Err(err) = std::fs::create_dir_all(&dir) {
			warn!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				error = %err,
				"evidence capture skipped: screenshot dir unavailable"
			);
			return None;
		}

		let name = format!("{}-failure", artifact_slug(label));
		match session.screenshot(&dir, &name).await {
			Ok(path) => {
				debug!(
					target = "e2e.session",
					scenario = session.scenario_id(),
					path = %path.display(),
					"failure evidence captured"
				);
				Some(path)
			}
			Err(err) => {
				warn!(
					target = "e2e.session",
					scenario = session.scenario_id(),
					error = %err,
					"evidence capture failed"
				);
				None
			}
		}
	}

	/// Releases page, context, and engine handle in that order.
	///
	/// Each release is attempted independently; a failed release never stops
	/// the remaining ones. Idempotent: calling this on an already-closed
	/// session is a no-op.
	pub async fn teardown(&self, session: &mut Session) {
		if !session.state.needs_teardown() {
			debug!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				state = %session.state,
				"teardown already done, ignoring"
			);
			return;
		}
		session.state = SessionState::TearingDown;

		if let Some(recording) = session.recording.take() {
			recording.stop(&session.page).await;
		}

		if let Err(err) = session.page.clone().close().await {
			warn!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				error = %err,
				"page release failed"
			);
		}
		if let Err(err) = session.browser.quit_incognito_context().await {
			warn!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				error = %err,
				"context release failed"
			);
		}
		if let Err(err) = session.browser.close().await {
			warn!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				error = %err,
				"browser close failed"
			);
		}
		if tokio::time::timeout(CLOSE_GRACE, session.browser.wait()).await.is_err() {
			warn!(
				target = "e2e.session",
				scenario = session.scenario_id(),
				"browser did not exit in time, killing it"
			);
			let _ = session.browser.kill().await;
		}
		session.events.abort();

		session.state = SessionState::Closed;
		self.active.lock().unwrap().remove(session.scenario_id());
		debug!(target = "e2e.session", scenario = session.scenario_id(), "session closed");
	}
}
