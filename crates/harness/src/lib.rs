//! Browser end-to-end scenario harness.
//!
//! The harness owns the three stateful concerns of a scenario run: the
//! per-scenario browser session lifecycle ([`session`]), on-demand engine
//! provisioning ([`provision`]), and external test-run orchestration with
//! live output streaming ([`procrun`]). Step definitions, page objects, and
//! report rendering are collaborators outside this crate; they call into the
//! session capability set and consume the artifacts it produces.

pub mod config;
pub mod error;
pub mod procrun;
pub mod provision;
pub mod session;
pub mod types;

pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use procrun::{OutputChunk, ProcessRun, ProcessRunner, RunRequest, StreamSource, TerminalStatus};
pub use provision::{BrowserProvisioner, InstallOutcome, InstallationRecord};
pub use session::{Session, SessionLifecycleManager, SessionOptions, SessionState};
pub use types::EngineKind;
