//! `e2e check`: probe engine availability, optionally installing on miss.

use anyhow::Result;
use e2e::{BrowserProvisioner, HarnessConfig};

use crate::cli::CheckArgs;

pub async fn execute(args: CheckArgs) -> Result<()> {
	let config = HarnessConfig::from_env();
	let engine = args.engine.unwrap_or(config.engine);
	let provisioner = BrowserProvisioner::new(config);

	let available = if args.install {
		provisioner.ensure_available(engine).await
	} else {
		provisioner.probe(engine).await
	};

	if available {
		println!("{engine}: available");
		Ok(())
	} else if args.install {
		anyhow::bail!("{engine}: unavailable (installation failed or timed out)")
	} else {
		anyhow::bail!("{engine}: unavailable (rerun with --install to install it)")
	}
}
