//! Session video recording via the DevTools screencast.
//!
//! Frames arrive as base64 jpeg images and are written to the requested
//! directory as a numbered sequence. Every frame must be acknowledged or the
//! browser stops sending more.

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{
	EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams, StopScreencastParams,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A live screencast recording for one session.
#[derive(Debug)]
pub(crate) struct Recording {
	dir: PathBuf,
	writer: JoinHandle<usize>,
}

impl Recording {
	/// Starts the screencast and the frame writer task.
	pub(crate) async fn start(page: &Page, dir: PathBuf) -> crate::error::Result<Self> {
		std::fs::create_dir_all(&dir)?;

		let mut frames = page.event_listener::<EventScreencastFrame>().await?;
		let ack_page = page.clone();
		let frame_dir = dir.clone();
		let writer = tokio::spawn(async move {
			let mut written = 0usize;
			while let Some(frame) = frames.next().await {
				let ack = ScreencastFrameAckParams::new(frame.session_id);
				if ack_page.execute(ack).await.is_err() {
					break;
				}
				let data: &str = frame.data.as_ref();
				match BASE64.decode(data) {
					Ok(image) => {
						let path = frame_dir.join(format!("frame-{:05}.jpeg", written));
						if let Err(err) = std::fs::write(&path, image) {
							warn!(target = "e2e.session", error = %err, "dropping screencast frame");
							continue;
						}
						written += 1;
					}
					Err(err) => {
						warn!(target = "e2e.session", error = %err, "undecodable screencast frame");
					}
				}
			}
			written
		});

		page.execute(
			StartScreencastParams::builder()
				.format(StartScreencastFormat::Jpeg)
				.build(),
		)
		.await?;

		Ok(Self { dir, writer })
	}

	/// Stops the screencast and waits briefly for the writer to drain.
	pub(crate) async fn stop(self, page: &Page) {
		let Recording { dir, mut writer } = self;
		if let Err(err) = page.execute(StopScreencastParams::default()).await {
			debug!(target = "e2e.session", error = %err, "screencast stop failed");
		}

		// The frame stream only ends once the page goes away; give the
		// writer a beat to flush, then stop it so teardown can continue.
		match tokio::time::timeout(std::time::Duration::from_secs(2), &mut writer).await {
			Ok(Ok(written)) => {
				debug!(
					target = "e2e.session",
					dir = %dir.display(),
					frames = written,
					"recording finished"
				);
			}
			Ok(Err(_)) => {
				debug!(target = "e2e.session", dir = %dir.display(), "recording writer task failed");
			}
			Err(_) => {
				writer.abort();
				debug!(target = "e2e.session", dir = %dir.display(), "recording writer stopped at teardown");
			}
		}
	}
}
