//! Scenario-scoped browser sessions.
//!
//! A [`Session`] owns one engine instance, one isolated (incognito) context,
//! and one page, bound to exactly one scenario. Sessions are created and
//! destroyed by the [`SessionLifecycleManager`]; steps interact with them
//! through the capability set (`navigate`, `element_visible`,
//! `wait_for_visible`, `screenshot`) only.

mod manager;
mod recording;
mod state;

pub use manager::SessionLifecycleManager;
pub use state::SessionState;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chromiumoxide::browser::Browser;
use chromiumoxide::page::{Page, ScreenshotParams};
use tokio::task::JoinHandle;

use self::recording::Recording;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::types::EngineKind;

/// How often a visibility wait re-checks the page.
const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// Per-session launch options.
#[derive(Debug, Clone)]
pub struct SessionOptions {
	/// Whether the engine launches headless.
	pub headless: bool,
	/// Viewport width in pixels.
	pub viewport_width: u32,
	/// Viewport height in pixels.
	pub viewport_height: u32,
	/// Directory to record session screencast frames into, when requested.
	pub video_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self::from_config(&HarnessConfig::default())
	}
}

impl SessionOptions {
	/// Derives options from resolved harness configuration.
	pub fn from_config(config: &HarnessConfig) -> Self {
		Self {
			headless: config.headless,
			viewport_width: config.viewport_width,
			viewport_height: config.viewport_height,
			video_dir: None,
		}
	}

	/// Requests a screencast recording under `dir`.
	pub fn with_video_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.video_dir = Some(dir.into());
		self
	}
}

/// One engine instance + one isolated context + one page, scoped to exactly
/// one scenario. Never shared across scenarios, never reused after teardown.
#[derive(Debug)]
pub struct Session {
	pub(crate) browser: Browser,
	// Drives the CDP connection; aborted once the browser is gone.
	pub(crate) events: JoinHandle<()>,
	pub(crate) page: Page,
	pub(crate) recording: Option<Recording>,
	engine: EngineKind,
	scenario_id: String,
	options: SessionOptions,
	created_at: SystemTime,
	pub(crate) state: SessionState,
}

impl Session {
	pub(crate) fn new(
		browser: Browser,
		events: JoinHandle<()>,
		page: Page,
		recording: Option<Recording>,
		engine: EngineKind,
		scenario_id: String,
		options: SessionOptions,
	) -> Self {
		Self {
			browser,
			events,
			page,
			recording,
			engine,
			scenario_id,
			options,
			created_at: SystemTime::now(),
			state: SessionState::Ready,
		}
	}

	/// Engine this session was launched with.
	pub fn engine(&self) -> EngineKind {
		self.engine
	}

	/// Scenario this session is scoped to.
	pub fn scenario_id(&self) -> &str {
		&self.scenario_id
	}

	/// Options this session was launched with.
	pub fn options(&self) -> &SessionOptions {
		&self.options
	}

	/// Time the session reached `Ready`.
	pub fn created_at(&self) -> SystemTime {
		self.created_at
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Gate for the capability set: live sessions proceed and move to
	/// `InUse`; anything else fails loudly.
	fn capability(&mut self, operation: &'static str) -> Result<&Page> {
		if !self.state.accepts_capabilities() {
			return Err(HarnessError::SessionState {
				operation,
				state: self.state,
			});
		}
		self.state = SessionState::InUse;
		Ok(&self.page)
	}

	/// Navigates the page and waits for the load to settle.
	pub async fn navigate(&mut self, url: &str) -> Result<()> {
		let page = self.capability("navigate")?;
		let navigated = async {
			page.goto(url).await?;
			page.wait_for_navigation().await?;
			Ok(())
		}
		.await;
		navigated.map_err(|err| HarnessError::Navigation {
			url: url.to_string(),
			source: err,
		})
	}

	/// Returns whether `selector` currently matches a visible element.
	/// A selector matching nothing is `false`, not an error.
	pub async fn element_visible(&mut self, selector: &str) -> Result<bool> {
		let page = self.capability("element_visible")?;
		Ok(selector_visible(page, selector).await)
	}

	/// Waits until `selector` is visible, failing with a timeout error once
	/// `timeout` elapses.
	pub async fn wait_for_visible(&mut self, selector: &str, timeout: Duration) -> Result<()> {
		let ms = timeout.as_millis() as u64;
		let page = self.capability("wait_for_visible")?;
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			if selector_visible(page, selector).await {
				return Ok(());
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(HarnessError::Timeout {
					ms,
					condition: format!("selector {selector} visible"),
				});
			}
			tokio::time::sleep(VISIBILITY_POLL).await;
		}
	}

	/// Captures a full-page screenshot into `dir`, named after `label`.
	pub async fn screenshot(&mut self, dir: &Path, label: &str) -> Result<PathBuf> {
		let path = dir.join(format!("{}.png", artifact_slug(label)));
		let page = self.capability("screenshot")?;
		page.save_screenshot(ScreenshotParams::builder().full_page(true).build(), &path)
			.await
			.map_err(|err| HarnessError::Screenshot {
				path: path.clone(),
				source: err,
			})?;
		Ok(path)
	}
}

/// A selector is visible when it resolves to an element with a layout box;
/// elements that are missing or not rendered have none.
async fn selector_visible(page: &Page, selector: &str) -> bool {
	match page.find_element(selector).await {
		Ok(element) => element.bounding_box().await.is_ok(),
		Err(_) => false,
	}
}

/// Deterministic artifact name for a scenario label: non-alphanumeric runs
/// collapse to a single `-`.
pub(crate) fn artifact_slug(label: &str) -> String {
	let mut slug = String::with_capacity(label.len());
	let mut pending_dash = false;
	for c in label.chars() {
		if c.is_ascii_alphanumeric() {
			if pending_dash && !slug.is_empty() {
				slug.push('-');
			}
			pending_dash = false;
			slug.push(c);
		} else {
			pending_dash = true;
		}
	}
	if slug.is_empty() { "scenario".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn artifact_slug_collapses_runs() {
		assert_eq!(artifact_slug("Login works (happy path)"), "Login-works-happy-path");
		assert_eq!(artifact_slug("checkout/cart: empty"), "checkout-cart-empty");
	}

	#[test]
	fn artifact_slug_is_deterministic_and_never_empty() {
		assert_eq!(artifact_slug("a b"), artifact_slug("a b"));
		assert_eq!(artifact_slug("???"), "scenario");
		assert_eq!(artifact_slug(""), "scenario");
	}

	#[test]
	fn artifact_slug_drops_leading_and_trailing_separators() {
		assert_eq!(artifact_slug("  spaced out  "), "spaced-out");
	}

	#[test]
	fn options_follow_config() {
		let config = HarnessConfig {
			headless: false,
			viewport_width: 800,
			viewport_height: 600,
			..Default::default()
		};
		let options = SessionOptions::from_config(&config);
		assert!(!options.headless);
		assert_eq!((options.viewport_width, options.viewport_height), (800, 600));
		assert!(options.video_dir.is_none());
	}

	#[test]
	fn options_video_dir_is_opt_in() {
		let options = SessionOptions::default().with_video_dir("test-results/videos/example");
		assert_eq!(options.video_dir, Some(PathBuf::from("test-results/videos/example")));
	}
}
