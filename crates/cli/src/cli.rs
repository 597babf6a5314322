use std::net::IpAddr;

use clap::{Args, Parser, Subcommand};
use e2e::EngineKind;

/// Root CLI for the e2e harness.
#[derive(Parser, Debug)]
#[command(name = "e2e")]
#[command(about = "Browser end-to-end scenario harness")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve the HTTP trigger surface.
	Serve(ServeArgs),
	/// Probe browser engine availability, optionally installing on miss.
	Check(CheckArgs),
	/// Run a command once, streaming its output to the terminal.
	Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Address to bind.
	#[arg(long, default_value = "127.0.0.1")]
	pub host: IpAddr,

	/// Port to bind.
	#[arg(long, default_value_t = 8080)]
	pub port: u16,

	/// Test-run command spawned by POST /run.
	#[arg(long, default_value = "cargo")]
	pub command: String,

	/// Argument for the test-run command (repeatable).
	#[arg(long = "arg", value_name = "ARG", default_values_t = ["test".to_string(), "--workspace".to_string()])]
	pub args: Vec<String>,

	/// Wall-clock bound for one triggered run, in seconds.
	#[arg(long, default_value_t = 1800)]
	pub run_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
	/// Engine to probe (defaults to the configured engine).
	#[arg(long, value_parser = parse_engine)]
	pub engine: Option<EngineKind>,

	/// Install the engine when the probe fails.
	#[arg(long)]
	pub install: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
	/// Command to run.
	pub command: String,

	/// Arguments passed through to the command.
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	pub args: Vec<String>,

	/// Wall-clock bound in seconds.
	#[arg(long)]
	pub timeout: Option<u64>,
}

fn parse_engine(raw: &str) -> Result<EngineKind, String> {
	raw.parse().map_err(|err: e2e::types::ParseEngineError| err.to_string())
}
