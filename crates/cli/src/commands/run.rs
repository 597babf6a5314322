//! `e2e run`: one-shot process run with live output on the terminal.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use e2e::{ProcessRunner, RunRequest, StreamSource};

use crate::cli::RunArgs;

pub async fn execute(args: RunArgs) -> Result<()> {
	let mut request = RunRequest::new(args.command).with_args(args.args);
	if let Some(secs) = args.timeout {
		request = request.with_timeout(Duration::from_secs(secs));
	}

	let mut run = ProcessRunner::spawn(request);
	while let Some(chunk) = run.output.recv().await {
		match chunk.source {
			StreamSource::Stdout => {
				let mut out = std::io::stdout();
				let _ = out.write_all(&chunk.data);
				let _ = out.flush();
			}
			StreamSource::Stderr => {
				let mut err = std::io::stderr();
				let _ = err.write_all(&chunk.data);
				let _ = err.flush();
			}
		}
	}

	let status = run.wait().await;
	println!("{}", status.summary());
	if status.success {
		Ok(())
	} else {
		anyhow::bail!("run did not succeed: {}", status.summary())
	}
}
