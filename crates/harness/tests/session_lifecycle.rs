//! End-to-end session lifecycle against a real browser install.
//!
//! These tests launch an actual engine; run them with
//! `cargo test -p e2e-harness -- --ignored` on a machine with browsers
//! installed (`e2e check --install`).

use e2e::{EngineKind, HarnessConfig, HarnessError, SessionLifecycleManager, SessionOptions, SessionState};

fn manager_with_artifacts(dir: &std::path::Path) -> SessionLifecycleManager {
	let config = HarnessConfig {
		artifacts_dir: dir.to_path_buf(),
		..Default::default()
	};
	SessionLifecycleManager::new(config)
}

#[tokio::test]
#[ignore = "requires an installed chromium"]
async fn chromium_scenario_lifecycle() {
	let temp = tempfile::TempDir::new().unwrap();
	let manager = manager_with_artifacts(temp.path());

	let mut session = manager
		.start("lifecycle-check", EngineKind::Chromium, SessionOptions::default())
		.await
		.expect("session should start");
	assert_eq!(session.state(), SessionState::Ready);
	assert_eq!(session.scenario_id(), "lifecycle-check");

	session
		.navigate("data:text/html,<h1 id='title'>ok</h1>")
		.await
		.expect("navigation should succeed");
	assert!(session.element_visible("#title").await.unwrap());
	assert!(!session.element_visible("#missing").await.unwrap());
	assert_eq!(session.state(), SessionState::InUse);

	manager.teardown(&mut session).await;
	assert_eq!(session.state(), SessionState::Closed);

	// Capabilities on a closed session are a programming error.
	let err = session.element_visible("#missing").await.unwrap_err();
	assert!(matches!(err, HarnessError::SessionState { .. }));

	// Teardown is idempotent; the second call is a no-op.
	manager.teardown(&mut session).await;
	assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
#[ignore = "requires an installed chromium"]
async fn failure_evidence_is_named_after_the_scenario() {
	let temp = tempfile::TempDir::new().unwrap();
	let manager = manager_with_artifacts(temp.path());

	let mut session = manager
		.start("Evidence: capture works!", EngineKind::Chromium, SessionOptions::default())
		.await
		.expect("session should start");
	session
		.navigate("data:text/html,<p>failing page</p>")
		.await
		.expect("navigation should succeed");

	let path = manager
		.capture_failure_evidence(&mut session, "Evidence: capture works!")
		.await
		.expect("evidence capture should produce a file");
	assert!(path.ends_with("Evidence-capture-works-failure.png"));
	assert!(path.exists());

	manager.teardown(&mut session).await;

	// On a closed session, capture logs and returns nothing instead of failing.
	assert!(manager.capture_failure_evidence(&mut session, "after close").await.is_none());
}

#[tokio::test]
#[ignore = "requires an installed chromium"]
async fn second_session_for_same_scenario_is_rejected() {
	let temp = tempfile::TempDir::new().unwrap();
	let manager = manager_with_artifacts(temp.path());

	let mut session = manager
		.start("exclusive", EngineKind::Chromium, SessionOptions::default())
		.await
		.expect("session should start");

	let err = manager
		.start("exclusive", EngineKind::Chromium, SessionOptions::default())
		.await
		.unwrap_err();
	assert!(matches!(err, HarnessError::ScenarioActive { .. }));

	manager.teardown(&mut session).await;
}
