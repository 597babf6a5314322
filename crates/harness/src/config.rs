//! Harness configuration resolved once at startup.
//!
//! Engine selection, headless mode, and the install-path override used to be
//! ambient environment reads scattered across call sites; they are resolved
//! here into one owned struct handed to the lifecycle manager and
//! provisioner at construction.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::Result;
use crate::types::EngineKind;

/// Environment variable selecting the default engine kind.
pub const ENV_BROWSER: &str = "E2E_BROWSER";
/// Environment variable disabling headless mode (`false` or `0`).
pub const ENV_HEADLESS: &str = "E2E_HEADLESS";
/// Environment variable overriding the browser install directory.
pub const ENV_BROWSERS_PATH: &str = "E2E_BROWSERS_PATH";
/// Environment variable overriding the artifacts root directory.
pub const ENV_ARTIFACTS_DIR: &str = "E2E_ARTIFACTS_DIR";

/// Fully owned harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
	/// Default engine for new sessions. Defaults to the first of the
	/// supported set.
	pub engine: EngineKind,
	/// Whether browsers launch headless. Defaults to true unless explicitly
	/// disabled.
	pub headless: bool,
	/// Default viewport width in pixels.
	pub viewport_width: u32,
	/// Default viewport height in pixels.
	pub viewport_height: u32,
	/// Install-directory override, exported to driver subprocesses as
	/// `PLAYWRIGHT_BROWSERS_PATH`.
	pub browsers_path: Option<PathBuf>,
	/// Root directory for persisted artifacts (screenshots, videos).
	pub artifacts_dir: PathBuf,
}

impl Default for HarnessConfig {
	fn default() -> Self {
		Self {
			engine: EngineKind::default(),
			headless: true,
			viewport_width: 1280,
			viewport_height: 720,
			browsers_path: None,
			artifacts_dir: PathBuf::from("test-results"),
		}
	}
}

impl HarnessConfig {
	/// Reads configuration from the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Builds configuration from an arbitrary key lookup.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let mut config = Self::default();

		if let Some(raw) = lookup(ENV_BROWSER) {
			match raw.parse() {
				Ok(engine) => config.engine = engine,
				Err(err) => warn!(target = "e2e.config", error = %err, "ignoring invalid engine selection"),
			}
		}
		if let Some(raw) = lookup(ENV_HEADLESS) {
			config.headless = !matches!(raw.trim(), "false" | "0");
		}
		if let Some(raw) = lookup(ENV_BROWSERS_PATH) {
			if !raw.is_empty() {
				config.browsers_path = Some(PathBuf::from(raw));
			}
		}
		if let Some(raw) = lookup(ENV_ARTIFACTS_DIR) {
			if !raw.is_empty() {
				config.artifacts_dir = PathBuf::from(raw);
			}
		}

		config
	}

	/// Directory failure screenshots are written to.
	pub fn screenshots_dir(&self) -> PathBuf {
		self.artifacts_dir.join("screenshots")
	}

	/// Directory session video recordings are written to.
	pub fn videos_dir(&self) -> PathBuf {
		self.artifacts_dir.join("videos")
	}

	/// Creates the artifact directory tree ahead of a run.
	pub fn ensure_artifact_dirs(&self) -> Result<()> {
		let dirs = [self.artifacts_dir.clone(), self.screenshots_dir(), self.videos_dir()];
		for dir in &dirs {
			fs::create_dir_all(dir)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
		move |key| {
			pairs
				.iter()
				.find(|(name, _)| *name == key)
				.map(|(_, value)| value.to_string())
		}
	}

	#[test]
	fn defaults_are_headless_chromium() {
		let config = HarnessConfig::from_lookup(|_| None);
		assert_eq!(config.engine, EngineKind::Chromium);
		assert!(config.headless);
		assert_eq!((config.viewport_width, config.viewport_height), (1280, 720));
		assert_eq!(config.artifacts_dir, PathBuf::from("test-results"));
		assert!(config.browsers_path.is_none());
	}

	#[test]
	fn engine_and_dirs_come_from_lookup() {
		let config = HarnessConfig::from_lookup(lookup_from(&[
			(ENV_BROWSER, "edge"),
			(ENV_BROWSERS_PATH, "/opt/browsers"),
			(ENV_ARTIFACTS_DIR, "out"),
		]));
		assert_eq!(config.engine, EngineKind::Edge);
		assert_eq!(config.browsers_path, Some(PathBuf::from("/opt/browsers")));
		assert_eq!(config.screenshots_dir(), PathBuf::from("out/screenshots"));
		assert_eq!(config.videos_dir(), PathBuf::from("out/videos"));
	}

	#[test]
	fn headless_only_disabled_explicitly() {
		for (raw, expected) in [("false", false), ("0", false), ("true", true), ("yes", true), ("", true)] {
			let config = HarnessConfig::from_lookup(lookup_from(&[(ENV_HEADLESS, raw)]));
			assert_eq!(config.headless, expected, "E2E_HEADLESS={raw}");
		}
	}

	#[test]
	fn invalid_engine_keeps_default() {
		let config = HarnessConfig::from_lookup(lookup_from(&[(ENV_BROWSER, "netscape")]));
		assert_eq!(config.engine, EngineKind::Chromium);
	}

	#[test]
	fn ensure_artifact_dirs_creates_tree() {
		let temp = tempfile::TempDir::new().unwrap();
		let config = HarnessConfig {
			artifacts_dir: temp.path().join("artifacts"),
			..Default::default()
		};
		config.ensure_artifact_dirs().unwrap();
		assert!(config.screenshots_dir().is_dir());
		assert!(config.videos_dir().is_dir());
	}
}
