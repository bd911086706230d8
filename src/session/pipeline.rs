//! Media pipeline supervisor (C6).
//!
//! Launches the external encoder/muxer/sender pipeline as a child process,
//! watches for it exiting unexpectedly, and tears it down with `SIGTERM` on
//! session teardown or pause.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::PipelineConfig;
use crate::error::{Result, WfdError};
use crate::session::{DisplaySource, PeerLink};

/// Set to skip actually launching the configured pipeline program; the
/// session proceeds as though a pipeline were running. Exists for exercising
/// the session/dispatch state machine without a working GStreamer install.
const DO_NOT_LAUNCH_ENV: &str = "DO_NOT_LAUNCH_GST";

/// Sent on the exit channel when the child process exits on its own, i.e.
/// not as a result of `PipelineHandle::kill`.
pub struct PipelineExited {
	pub status: std::process::ExitStatus,
}

pub struct PipelineHandle {
	pid: Option<u32>,
	detached: Arc<AtomicBool>,
}

fn substitute(template: &str, display: &DisplaySource, peer: &PeerLink, stream_port: u16) -> String {
	template
		.replace("{x}", &display.x.to_string())
		.replace("{y}", &display.y.to_string())
		.replace("{end_x}", &display.width.saturating_sub(1).to_string())
		.replace("{end_y}", &display.height.saturating_sub(1).to_string())
		.replace("{host}", &peer.remote_address.to_string())
		.replace("{port}", &stream_port.to_string())
}

impl PipelineHandle {
	/// Launches the configured pipeline, substituting the display region and
	/// destination host/port into its argument template.
	///
	/// Returns a receiver that yields once if the child exits on its own;
	/// it never yields if `kill` was called first, and never exists at all
	/// when `DO_NOT_LAUNCH_GST` is set.
	pub fn launch(
		config: &PipelineConfig,
		display: &DisplaySource,
		peer: &PeerLink,
		stream_port: u16,
	) -> Result<(Self, Option<mpsc::Receiver<PipelineExited>>)> {
		let detached = Arc::new(AtomicBool::new(false));

		if std::env::var_os(DO_NOT_LAUNCH_ENV).is_some() {
			tracing::info!("{DO_NOT_LAUNCH_ENV} set, not launching media pipeline");
			return Ok((Self { pid: None, detached }, None));
		}

		let args: Vec<String> = config.args.iter().map(|arg| substitute(arg, display, peer, stream_port)).collect();

		tracing::info!(program = %config.program, ?args, "launching media pipeline");

		let mut child = Command::new(&config.program)
			.args(&args)
			.kill_on_drop(true)
			.spawn()
			.map_err(|_| WfdError::PipelineFailed)?;

		let pid = child.id();

		let (exit_tx, exit_rx) = mpsc::channel(1);
		let detached_for_watch = detached.clone();

		tokio::spawn(async move {
			match child.wait().await {
				Ok(status) => {
					if !detached_for_watch.load(Ordering::SeqCst) {
						let _ = exit_tx.send(PipelineExited { status }).await;
					}
				},
				Err(e) => tracing::warn!("failed to wait on media pipeline child: {e}"),
			}
		});

		Ok((Self { pid, detached }, Some(exit_rx)))
	}

	/// Sends `SIGTERM` to the child and marks the exit watch detached, so a
	/// subsequent natural exit doesn't get reported as unexpected.
	pub fn kill(&mut self) {
		self.detached.store(true, Ordering::SeqCst);

		let Some(pid) = self.pid else { return };

		// SAFETY: `pid` is a child of this process, obtained directly from
		// the `Child` handle at spawn time.
		let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
		if result != 0 {
			tracing::warn!("failed to send SIGTERM to media pipeline (pid {pid})");
		}
	}
}
