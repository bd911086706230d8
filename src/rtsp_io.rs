//! Thin RTSP transport glue.
//!
//! The generic RTSP transport (framing, keepalive, retransmission policy) is
//! an external collaborator outside the scope of this core; this module
//! supplies just enough of it — reading/writing whole `rtsp-types` messages
//! over a single TCP connection, in arrival order — to drive the dispatcher
//! and state machine in C4/C5.

use rtsp_types::{Message, Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, WfdError};

pub type RtspRequest = Request<Vec<u8>>;
pub type RtspResponse = Response<Vec<u8>>;

/// A single RTSP connection, framing whole messages on top of a `TcpStream`.
pub struct RtspConnection {
	stream: TcpStream,
	read_buffer: Vec<u8>,
}

impl RtspConnection {
	pub fn new(stream: TcpStream) -> Self {
		Self { stream, read_buffer: Vec::new() }
	}

	/// Reads and returns the next complete RTSP message, buffering partial
	/// reads across calls.
	pub async fn read_message(&mut self) -> Result<Message<Vec<u8>>> {
		loop {
			if !self.read_buffer.is_empty() {
				match Message::parse(&self.read_buffer) {
					Ok((message, consumed)) => {
						self.read_buffer.drain(..consumed);
						return Ok(message);
					},
					Err(rtsp_types::ParseError::Incomplete(_)) => {},
					Err(e) => return Err(WfdError::ProtocolError(format!("failed to parse RTSP message: {e}"))),
				}
			}

			let mut chunk = [0u8; 4096];
			let bytes_read = self.stream.read(&mut chunk).await.map_err(WfdError::OsIo)?;
			if bytes_read == 0 {
				return Err(WfdError::ProtocolError("peer closed the RTSP connection".into()));
			}
			self.read_buffer.extend_from_slice(&chunk[..bytes_read]);
		}
	}

	pub async fn send_request(&mut self, request: &RtspRequest) -> Result<()> {
		let mut buffer = Vec::new();
		request
			.write(&mut buffer)
			.map_err(|e| WfdError::ProtocolError(format!("failed to serialize RTSP request: {e}")))?;
		self.stream.write_all(&buffer).await.map_err(WfdError::OsIo)?;
		Ok(())
	}

	pub async fn send_response(&mut self, response: &RtspResponse) -> Result<()> {
		let mut buffer = Vec::new();
		response
			.write(&mut buffer)
			.map_err(|e| WfdError::ProtocolError(format!("failed to serialize RTSP response: {e}")))?;
		self.stream.write_all(&buffer).await.map_err(WfdError::OsIo)?;
		Ok(())
	}
}
