use thiserror::Error;

/// Errors that can occur anywhere in the outgoing WFD session core.
#[derive(Error, Debug)]
pub enum WfdError {
	#[error("invalid input: {0}")]
	InvalidInput(&'static str),

	#[error("peer is not connected")]
	NotConnected,

	/// Not reachable while `PeerLink`/`DisplaySource` only carry IPv4
	/// addresses; kept for parity with the WFD core's error enumeration.
	#[error("address family not supported")]
	BadAddressFamily,

	#[error("operation already in progress")]
	InProgress,

	#[error("I/O error")]
	OsIo(#[from] std::io::Error),

	#[error("protocol error: {0}")]
	ProtocolError(String),

	#[error("resolution {width}x{height} is not in the WFD resolution table")]
	UnsupportedResolution { width: u16, height: u16 },

	#[error("sink does not support the required WFD option set")]
	OptionNotSupported,

	#[error("message kind is not implemented by this session")]
	NotImplemented,

	/// Not reachable from safe Rust allocation failure paths; kept for parity
	/// with the WFD core's error enumeration.
	#[error("out of memory")]
	OutOfMemory,

	#[error("media pipeline failed to launch")]
	PipelineFailed,
}

pub type Result<T> = std::result::Result<T, WfdError>;
