//! HTTP trigger surface.
//!
//! One request maps to exactly one process run. The run's combined output is
//! streamed back as a chunked text body in arrival order, stderr chunks
//! tagged, always terminated by a summary verdict line. The surface never
//! hangs and never answers with a mid-stream error.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use e2e::{BrowserProvisioner, EngineKind, HarnessConfig, ProcessRun, ProcessRunner, RunRequest, StreamSource};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

/// Shared server state: resolved config plus the triggered-run command line.
#[derive(Clone)]
pub struct AppState {
	pub config: HarnessConfig,
	pub run_command: String,
	pub run_args: Vec<String>,
	pub run_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/run", post(run_tests))
		.route("/install", post(install_engine))
		.with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
	let app = router(state);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!(target = "e2e.server", %addr, "trigger surface listening");
	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	info!(target = "e2e.server", "shutdown signal received");
}

/// Service health plus per-engine availability from executable discovery.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
	let provisioner = BrowserProvisioner::new(state.config.clone());
	let mut engines = serde_json::Map::new();
	for engine in EngineKind::ALL {
		let executable = provisioner.resolve_executable(engine);
		engines.insert(
			engine.to_string(),
			json!({
				"available": executable.is_some(),
				"executable": executable,
			}),
		);
	}

	Json(json!({
		"status": "healthy",
		"version": env!("CARGO_PKG_VERSION"),
		"engine": state.config.engine.to_string(),
		"engines": engines,
	}))
}

/// Triggers one test run and streams its combined output live.
async fn run_tests(State(state): State<AppState>) -> Response {
	let request = RunRequest::new(&state.run_command)
		.with_args(state.run_args.clone())
		.with_env("CI", "true")
		.with_env("E2E_HEADLESS", "true")
		.with_timeout(state.run_timeout);
	let banner = format!("$ {} {}", state.run_command, state.run_args.join(" "));
	info!(target = "e2e.server", command = %state.run_command, "test run triggered");
	stream_run(ProcessRunner::spawn(request), banner)
}

/// Streams an installation run for the configured engine.
async fn install_engine(State(state): State<AppState>) -> Response {
	let engine = state.config.engine;
	let provisioner = BrowserProvisioner::new(state.config.clone());
	match provisioner.install_streaming(engine) {
		Ok(run) => {
			info!(target = "e2e.server", engine = %engine, "engine install triggered");
			stream_run(run, format!("installing {engine}"))
		}
		Err(err) => (
			StatusCode::INTERNAL_SERVER_ERROR,
			format!("installer unavailable: {err}\n"),
		)
			.into_response(),
	}
}

fn stream_run(mut run: ProcessRun, banner: String) -> Response {
	let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(64);
	tokio::spawn(async move {
		let _ = tx.send(Ok(Bytes::from(format!("{banner}\n")))).await;
		while let Some(chunk) = run.output.recv().await {
			let bytes = match chunk.source {
				StreamSource::Stdout => Bytes::from(chunk.data),
				StreamSource::Stderr => {
					let mut tagged = b"[stderr] ".to_vec();
					tagged.extend_from_slice(&chunk.data);
					Bytes::from(tagged)
				}
			};
			if tx.send(Ok(bytes)).await.is_err() {
				// Client went away; the run finishes on its own.
				return;
			}
		}
		let status = run.wait().await;
		let _ = tx.send(Ok(Bytes::from(format!("\n{}\n", status.summary())))).await;
	});

	(
		[(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
		Body::from_stream(ReceiverStream::new(rx)),
	)
		.into_response()
}
