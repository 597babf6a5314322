//! Tests for the HTTP trigger surface. Streaming endpoints are exercised
//! with browserless commands; `/health` drives the real driver probe and is
//! ignored by default.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use e2e::HarnessConfig;
use e2e_cli::server::{AppState, router};
use tower::ServiceExt;

fn state_running(command: &str, args: &[&str]) -> AppState {
	AppState {
		config: HarnessConfig::default(),
		run_command: command.to_string(),
		run_args: args.iter().map(|arg| arg.to_string()).collect(),
		run_timeout: Duration::from_secs(30),
	}
}

async fn body_text(response: axum::response::Response) -> String {
	let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
	String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
#[tokio::test]
async fn run_streams_output_and_verdict() {
	let app = router(state_running("sh", &["-c", "echo suite output; echo warning 1>&2"]));
	let response = app
		.oneshot(Request::builder().method("POST").uri("/run").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let text = body_text(response).await;
	assert!(text.contains("suite output"), "missing stdout in: {text}");
	assert!(text.contains("[stderr] warning"), "missing tagged stderr in: {text}");
	assert!(text.trim_end().ends_with("exit code 0 (passed)"), "missing verdict in: {text}");
}

#[cfg(unix)]
#[tokio::test]
async fn run_reports_failures_in_the_verdict() {
	let app = router(state_running("sh", &["-c", "echo boom; exit 2"]));
	let response = app
		.oneshot(Request::builder().method("POST").uri("/run").body(Body::empty()).unwrap())
		.await
		.unwrap();

	let text = body_text(response).await;
	assert!(text.contains("boom"));
	assert!(text.trim_end().ends_with("exit code 2 (failed)"));
}

#[tokio::test]
async fn run_answers_even_when_spawn_fails() {
	let app = router(state_running("definitely-not-a-real-test-runner", &[]));
	let response = app
		.oneshot(Request::builder().method("POST").uri("/run").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let text = body_text(response).await;
	assert!(
		text.contains("error: failed to spawn definitely-not-a-real-test-runner"),
		"missing spawn error in: {text}"
	);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
	let app = router(state_running("true", &[]));
	let response = app
		.oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_engine_availability() {
	let app = router(state_running("true", &[]));
	let response = app
		.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let text = body_text(response).await;
	let json: serde_json::Value = serde_json::from_str(&text).unwrap();
	assert_eq!(json["status"], "healthy");
	assert_eq!(json["engine"], "chromium");
	for engine in ["chromium", "chrome", "edge"] {
		assert!(json["engines"][engine]["available"].is_boolean());
	}
}
