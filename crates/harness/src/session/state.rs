/// Lifecycle state of a scenario-scoped browser session.
///
/// Transitions are strictly sequential:
/// `Uninitialized → Provisioning → Ready → (InUse) → TearingDown → Closed`.
/// `Provisioning` may re-enter itself once when the engine had to be
/// installed first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
	/// No resources acquired yet.
	#[default]
	Uninitialized,
	/// Engine handles are being acquired.
	Provisioning,
	/// All handles live; no capability has run yet.
	Ready,
	/// At least one capability has run against the session.
	InUse,
	/// Resource release in progress.
	TearingDown,
	/// All resources released; the session is never reused.
	Closed,
}

impl SessionState {
	/// Returns true when step capabilities may run in this state.
	pub fn accepts_capabilities(self) -> bool {
		matches!(self, SessionState::Ready | SessionState::InUse)
	}

	/// Returns true when teardown still has resources to release.
	pub fn needs_teardown(self) -> bool {
		!matches!(self, SessionState::Uninitialized | SessionState::Closed)
	}
}

impl std::fmt::Display for SessionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			SessionState::Uninitialized => "uninitialized",
			SessionState::Provisioning => "provisioning",
			SessionState::Ready => "ready",
			SessionState::InUse => "in-use",
			SessionState::TearingDown => "tearing-down",
			SessionState::Closed => "closed",
		};
		f.write_str(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_live_states_accept_capabilities() {
		assert!(SessionState::Ready.accepts_capabilities());
		assert!(SessionState::InUse.accepts_capabilities());
		for state in [
			SessionState::Uninitialized,
			SessionState::Provisioning,
			SessionState::TearingDown,
			SessionState::Closed,
		] {
			assert!(!state.accepts_capabilities(), "{state} must reject capabilities");
		}
	}

	#[test]
	fn closed_and_uninitialized_skip_teardown() {
		assert!(!SessionState::Closed.needs_teardown());
		assert!(!SessionState::Uninitialized.needs_teardown());
		assert!(SessionState::Ready.needs_teardown());
		assert!(SessionState::InUse.needs_teardown());
	}
}
