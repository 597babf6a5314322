use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;
use crate::types::EngineKind;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
	/// Engine unavailable and installation failed or timed out. Fatal to the
	/// scenario; the caller must not proceed to steps.
	#[error("provisioning failed for {engine}: {reason}")]
	Provisioning { engine: EngineKind, reason: String },

	#[error("browser launch failed: {0}")]
	BrowserLaunch(String),

	/// Capability invoked on a session that cannot serve it. Programming
	/// error, always surfaced.
	#[error("{operation} called on {state} session")]
	SessionState {
		operation: &'static str,
		state: SessionState,
	},

	/// A second live session was requested for a scenario that already owns one.
	#[error("scenario {scenario} already has a live session")]
	ScenarioActive { scenario: String },

	#[error("navigation failed: {url}")]
	Navigation {
		url: String,
		#[source]
		source: chromiumoxide::error::CdpError,
	},

	#[error("screenshot failed: {path}")]
	Screenshot {
		path: PathBuf,
		#[source]
		source: chromiumoxide::error::CdpError,
	},

	#[error("timeout after {ms}ms waiting for: {condition}")]
	Timeout { ms: u64, condition: String },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Cdp(#[from] chromiumoxide::error::CdpError),
}
