//! `e2e serve`: run the HTTP trigger surface.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use e2e::HarnessConfig;

use crate::cli::ServeArgs;
use crate::server::{AppState, serve};

pub async fn execute(args: ServeArgs) -> Result<()> {
	let config = HarnessConfig::from_env();
	config.ensure_artifact_dirs()?;

	let state = AppState {
		config,
		run_command: args.command,
		run_args: args.args,
		run_timeout: Duration::from_secs(args.run_timeout),
	};
	let addr = SocketAddr::new(args.host, args.port);
	serve(addr, state).await
}
