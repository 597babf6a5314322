//! Command dispatch.

pub mod check;
pub mod run;
pub mod serve;

use anyhow::Result;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => serve::execute(args).await,
		Commands::Check(args) => check::execute(args).await,
		Commands::Run(args) => run::execute(args).await,
	}
}
