pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod resolution;
pub mod rtsp_io;
pub mod session;
pub mod subelement;

use session::{DisplaySource, PeerLink, Session};

pub use config::SessionConfig;
pub use error::{Result, WfdError};

/// Top-level handle to a single outgoing WFD session.
///
/// Wires together the sink's already-negotiated RTSP port, the RTSP
/// connection, and the session actor that drives the M1-M16 dispatch.
pub struct WfdOutSession {
	session: Session,
}

impl WfdOutSession {
	/// Connects to a peer that a P2P/WFD discovery layer outside this crate
	/// has already resolved, and starts negotiating a stream for `display`.
	pub async fn connect(config: SessionConfig, display: DisplaySource, peer: PeerLink) -> Result<Self> {
		let session = Session::spawn(config, display, peer).await?;
		session.initiate_io().await?;
		session.handle_io().await?;
		session.initiate_request().await?;
		Ok(Self { session })
	}

	pub async fn resume(&self) -> Result<()> {
		self.session.resume().await
	}

	pub async fn pause(&self) -> Result<()> {
		self.session.pause().await
	}

	pub async fn teardown(&self) -> Result<()> {
		self.session.teardown().await
	}
}
