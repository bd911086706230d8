//! Outgoing WFD session core (C5).
//!
//! A `Session` is a spawned actor task: it owns the single RTSP connection
//! to the sink, the state machine, and the media pipeline supervisor, driven
//! over a command channel from the handle returned to callers.

pub mod pipeline;

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::config::SessionConfig;
use crate::dispatch::{self, Directive, MKind, RequestArgs};
use crate::error::{Result, WfdError};
use crate::resolution::{self, ResolutionStandard};
use crate::rtsp_io::RtspConnection;
use crate::subelement::Subelements;

use pipeline::{PipelineExited, PipelineHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	Init,
	Negotiating,
	Established,
	Playing,
	Paused,
	TearingDown,
	Dead,
}

/// The display capture backend a `DisplaySource` names.
///
/// Only X11 screen capture is implemented; other schemes are rejected at
/// construction so an unsupported display never reaches the pipeline
/// supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayScheme {
	X,
}

impl std::str::FromStr for DisplayScheme {
	type Err = WfdError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"x" => Ok(DisplayScheme::X),
			_ => Err(WfdError::InvalidInput("unsupported display scheme")),
		}
	}
}

/// The screen region this session mirrors to the sink.
#[derive(Clone, Debug)]
pub struct DisplaySource {
	pub scheme: DisplayScheme,
	pub name: String,
	pub x: u16,
	pub y: u16,
	pub width: u16,
	pub height: u16,
}

impl DisplaySource {
	pub fn parse(spec: &str, x: u16, y: u16, width: u16, height: u16) -> Result<Self> {
		let (scheme, name) = spec
			.split_once("://")
			.ok_or(WfdError::InvalidInput("display spec must be '<scheme>://<name>'"))?;

		if width == 0 || height == 0 {
			return Err(WfdError::InvalidInput("display region must have nonzero size"));
		}

		Ok(Self { scheme: scheme.parse()?, name: name.to_string(), x, y, width, height })
	}
}

/// The sink this session is connecting to, discovered out-of-band (e.g. by
/// a P2P/WFD discovery layer this core does not implement).
#[derive(Clone, Debug)]
pub struct PeerLink {
	pub local_address: Ipv4Addr,
	pub remote_address: Ipv4Addr,
	pub connected: bool,
	pub wfd_subelements: Vec<u8>,
}

/// WFD only ever negotiates a single primary stream per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamId {
	Primary,
}

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// All of a session's mutable negotiation state, owned exclusively by its
/// actor task.
pub(crate) struct SessionData {
	pub config: SessionConfig,
	pub display: DisplaySource,
	pub peer: PeerLink,
	pub standard: ResolutionStandard,
	pub mask: u32,
	pub session_id: u32,
	pub state: SessionState,
	pub cseq: i32,
	pub outstanding: Option<MKind>,
	pub vformats: Option<String>,
	pub acodecs: Option<String>,
	pub rtp_ports: Option<(u16, u16)>,
	pub stream_rtp_port: Option<u16>,
	pub stream_url: Option<String>,
}

impl SessionData {
	pub(crate) fn new(config: SessionConfig, display: DisplaySource, peer: PeerLink) -> Result<Self> {
		let (standard, mask) = resolution::resolve(display.width, display.height)?;
		let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

		Ok(Self {
			config,
			display,
			peer,
			standard,
			mask,
			session_id,
			state: SessionState::Init,
			cseq: 0,
			outstanding: None,
			vformats: None,
			acodecs: None,
			rtp_ports: None,
			stream_rtp_port: None,
			stream_url: None,
		})
	}
}

enum SessionCommand {
	InitiateIo(oneshot::Sender<Result<()>>),
	HandleIo(oneshot::Sender<Result<()>>),
	InitiateRequest(oneshot::Sender<Result<()>>),
	Resume(oneshot::Sender<Result<()>>),
	Pause(oneshot::Sender<Result<()>>),
	Teardown(oneshot::Sender<Result<()>>),
}

/// A handle to a running session actor.
#[derive(Clone)]
pub struct Session {
	command_tx: mpsc::Sender<SessionCommand>,
}

/// Binds a listening socket to `peer.local_address`, on the port the sink
/// advertised in its `DEVICE_INFO` subelement.
async fn bind_rtsp_listener(data: &SessionData) -> Result<TcpListener> {
	if !data.peer.connected {
		return Err(WfdError::NotConnected);
	}

	let port = Subelements::parse(&data.peer.wfd_subelements)?.rtsp_port()?;

	let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(WfdError::OsIo)?;
	socket.set_reuse_address(true).map_err(WfdError::OsIo)?;
	socket.set_reuse_port(true).map_err(WfdError::OsIo)?;
	socket.set_nonblocking(true).map_err(WfdError::OsIo)?;
	socket
		.bind(&std::net::SocketAddr::from((data.peer.local_address, port)).into())
		.map_err(WfdError::OsIo)?;
	socket.listen(data.config.listen_backlog as i32).map_err(WfdError::OsIo)?;

	TcpListener::from_std(socket.into()).map_err(WfdError::OsIo)
}

impl Session {
	/// Spawns the session actor in `SessionState::Init`. No I/O is performed
	/// until the caller drives `initiate_io`/`handle_io`/`initiate_request`.
	pub async fn spawn(config: SessionConfig, display: DisplaySource, peer: PeerLink) -> Result<Self> {
		let data = SessionData::new(config, display, peer)?;

		let (command_tx, command_rx) = mpsc::channel(8);
		let actor = SessionActor {
			data,
			listener: None,
			connection: None,
			command_rx,
			pipeline: None,
			pipeline_exit_rx: None,
			arm_rx: None,
		};
		tokio::spawn(actor.run());

		Ok(Self { command_tx })
	}

	async fn send_command<F>(&self, make: F) -> Result<()>
	where
		F: FnOnce(oneshot::Sender<Result<()>>) -> SessionCommand,
	{
		let (reply_tx, reply_rx) = oneshot::channel();
		self.command_tx
			.send(make(reply_tx))
			.await
			.map_err(|_| WfdError::ProtocolError("session actor has already stopped".into()))?;
		reply_rx.await.map_err(|_| WfdError::ProtocolError("session actor dropped its reply".into()))?
	}

	/// Binds the session's RTSP listening socket. Fails with
	/// `WfdError::InProgress` if I/O has already been initiated on this
	/// session.
	pub async fn initiate_io(&self) -> Result<()> {
		self.send_command(SessionCommand::InitiateIo).await
	}

	/// Accepts the sink's single inbound RTSP connection and drops the
	/// listener; a WFD session never accepts a second connection.
	pub async fn handle_io(&self) -> Result<()> {
		self.send_command(SessionCommand::HandleIo).await
	}

	/// Issues the M1 `OPTIONS` request, starting negotiation.
	pub async fn initiate_request(&self) -> Result<()> {
		self.send_command(SessionCommand::InitiateRequest).await
	}

	/// Triggers an M5 `PLAY`, resuming a paused session.
	pub async fn resume(&self) -> Result<()> {
		self.send_command(SessionCommand::Resume).await
	}

	/// Triggers an M5 `PAUSE`.
	pub async fn pause(&self) -> Result<()> {
		self.send_command(SessionCommand::Pause).await
	}

	/// Triggers an M5 `TEARDOWN` and stops the session actor.
	pub async fn teardown(&self) -> Result<()> {
		self.send_command(SessionCommand::Teardown).await
	}
}

async fn recv_optional<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
	match rx {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}

async fn read_optional(connection: &mut Option<RtspConnection>) -> Option<Result<rtsp_types::Message<Vec<u8>>>> {
	match connection {
		Some(connection) => Some(connection.read_message().await),
		None => std::future::pending().await,
	}
}

struct SessionActor {
	data: SessionData,
	listener: Option<TcpListener>,
	connection: Option<RtspConnection>,
	command_rx: mpsc::Receiver<SessionCommand>,
	pipeline: Option<PipelineHandle>,
	pipeline_exit_rx: Option<mpsc::Receiver<PipelineExited>>,
	arm_rx: Option<mpsc::Receiver<()>>,
}

impl SessionActor {
	async fn run(mut self) {
		loop {
			tokio::select! {
				command = self.command_rx.recv() => {
					match command {
						Some(command) => self.handle_command(command).await,
						None => break,
					}
				},

				message = read_optional(&mut self.connection) => {
					if let Some(message) = message {
						match message {
							Ok(message) => {
								if let Err(e) = self.handle_message(message).await {
									tracing::warn!("error handling RTSP message: {e}");
									self.data.state = SessionState::TearingDown;
								}
							},
							Err(e) => {
								tracing::warn!("RTSP connection failed: {e}");
								self.data.state = SessionState::TearingDown;
							},
						}
					}
				},

				Some(exited) = recv_optional(&mut self.pipeline_exit_rx) => {
					tracing::warn!(status = %exited.status, "media pipeline exited unexpectedly");
					if self.data.state != SessionState::Paused {
						self.data.state = SessionState::TearingDown;
					}
				},

				Some(()) = recv_optional(&mut self.arm_rx) => {
					self.launch_pipeline();
				},
			}

			if matches!(self.data.state, SessionState::TearingDown | SessionState::Dead) {
				break;
			}
		}

		if let Some(pipeline) = &mut self.pipeline {
			pipeline.kill();
		}
		self.data.state = SessionState::Dead;
		tracing::info!(session_id = self.data.session_id, "session actor stopped");
	}

	/// Binds the RTSP listening socket. Fails with `WfdError::InProgress` if
	/// a listener or connection already exists for this session.
	async fn initiate_io(&mut self) -> Result<()> {
		if self.listener.is_some() || self.connection.is_some() {
			return Err(WfdError::InProgress);
		}
		self.listener = Some(bind_rtsp_listener(&self.data).await?);
		Ok(())
	}

	/// Accepts the sink's single inbound RTSP connection and transitions to
	/// `Negotiating`.
	async fn handle_io(&mut self) -> Result<()> {
		let Some(listener) = self.listener.take() else {
			return Err(WfdError::NotConnected);
		};
		let (stream, addr) = listener.accept().await.map_err(WfdError::OsIo)?;
		tracing::info!(peer = %addr, "accepted RTSP connection from sink");
		self.connection = Some(RtspConnection::new(stream));
		self.data.state = SessionState::Negotiating;
		Ok(())
	}

	/// Issues the M1 `OPTIONS` request over the accepted connection.
	async fn initiate_request(&mut self) -> Result<()> {
		if self.connection.is_none() {
			return Err(WfdError::NotConnected);
		}
		self.send_outstanding(MKind::M1, None).await
	}

	async fn send_outstanding(&mut self, kind: MKind, args: Option<RequestArgs>) -> Result<()> {
		if let Some(request) = dispatch::build_request(&mut self.data, kind, args)? {
			let connection = self.connection.as_mut().ok_or(WfdError::NotConnected)?;
			connection.send_request(&request).await?;
		}
		Ok(())
	}

	async fn handle_message(&mut self, message: rtsp_types::Message<Vec<u8>>) -> Result<()> {
		match message {
			rtsp_types::Message::Request(request) => {
				let kind = classify_inbound(&request);
				let (response, directives) = dispatch::handle_inbound_request(&mut self.data, kind, &request)?;
				let connection = self.connection.as_mut().ok_or(WfdError::NotConnected)?;
				connection.send_response(&response).await?;
				if response.status_code().is_success() {
					self.apply_directives(directives).await?;
				}
			},

			rtsp_types::Message::Response(response) => {
				let Some(kind) = self.data.outstanding else {
					return Err(WfdError::ProtocolError("reply received with no outstanding request".into()));
				};
				let directives = dispatch::handle_reply(&mut self.data, kind, &response)?;
				self.apply_directives(directives).await?;
			},

			rtsp_types::Message::Data(_) => {},
		}
		Ok(())
	}

	async fn apply_directives(&mut self, directives: Vec<Directive>) -> Result<()> {
		let args = directives.iter().find_map(|d| match d {
			Directive::RequestArgs(args) => Some(*args),
			_ => None,
		});

		for directive in directives {
			match directive {
				Directive::NewState(state) => {
					tracing::info!(session_id = self.data.session_id, ?state, "session state transition");
					self.data.state = state;
				},
				Directive::NextRequest(kind) => self.send_outstanding(kind, args).await?,
				Directive::RequestArgs(_) => {},
				Directive::ArmPipelineTimer => self.arm_pipeline_timer(),
				Directive::KillPipeline => {
					if let Some(mut pipeline) = self.pipeline.take() {
						pipeline.kill();
					}
				},
			}
		}
		Ok(())
	}

	fn arm_pipeline_timer(&mut self) {
		let (arm_tx, arm_rx) = mpsc::channel(1);
		self.arm_rx = Some(arm_rx);
		let delay = self.data.config.pipeline_arm_delay;
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let _ = arm_tx.send(()).await;
		});
	}

	fn launch_pipeline(&mut self) {
		let Some(port) = self.data.stream_rtp_port else {
			tracing::warn!("pipeline armed with no negotiated RTP port, not launching");
			return;
		};

		match PipelineHandle::launch(&self.data.config.pipeline, &self.data.display, &self.data.peer, port) {
			Ok((handle, exit_rx)) => {
				self.pipeline = Some(handle);
				self.pipeline_exit_rx = exit_rx;
			},
			Err(e) => tracing::error!("failed to launch media pipeline: {e}"),
		}
	}

	/// Handles a command from the `Session` handle.
	///
	/// Per the state machine's transition rules, `resume`/`pause`/`teardown`
	/// only issue the M5 trigger; they never change state or touch the
	/// pipeline directly — that happens when the sink's resulting M7/M9/M8
	/// request comes back in, via `KillPipeline`/`NewState` directives.
	async fn handle_command(&mut self, command: SessionCommand) {
		match command {
			SessionCommand::InitiateIo(reply) => {
				let result = self.initiate_io().await;
				let _ = reply.send(result);
			},
			SessionCommand::HandleIo(reply) => {
				let result = self.handle_io().await;
				let _ = reply.send(result);
			},
			SessionCommand::InitiateRequest(reply) => {
				let result = self.initiate_request().await;
				let _ = reply.send(result);
			},
			SessionCommand::Resume(reply) => {
				let result = self.send_outstanding(MKind::M5, Some(RequestArgs::Trigger(crate::capability::TriggerMethod::Play))).await;
				let _ = reply.send(result);
			},
			SessionCommand::Pause(reply) => {
				let result = self.send_outstanding(MKind::M5, Some(RequestArgs::Trigger(crate::capability::TriggerMethod::Pause))).await;
				let _ = reply.send(result);
			},
			SessionCommand::Teardown(reply) => {
				let result = self.send_outstanding(MKind::M5, Some(RequestArgs::Trigger(crate::capability::TriggerMethod::Teardown))).await;
				let _ = reply.send(result);
			},
		}
	}
}

fn classify_inbound(request: &rtsp_types::Request<Vec<u8>>) -> MKind {
	use rtsp_types::Method;

	match request.method() {
		Method::Options => MKind::M2,
		Method::Setup => MKind::M6,
		Method::Play => MKind::M7,
		Method::Teardown => MKind::M8,
		Method::Pause => MKind::M9,
		Method::GetParameter => MKind::M14,
		// M10-M13/M15 all resolve to the same "unsupported SET_PARAMETER" handling.
		_ => MKind::M10,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn peer() -> PeerLink {
		PeerLink { local_address: Ipv4Addr::new(127, 0, 0, 1), remote_address: Ipv4Addr::new(127, 0, 0, 1), connected: false, wfd_subelements: Vec::new() }
	}

	#[test]
	fn display_source_rejects_zero_size() {
		assert!(DisplaySource::parse("x://0", 0, 0, 0, 1080).is_err());
	}

	#[test]
	fn display_source_rejects_unknown_scheme() {
		assert!(DisplaySource::parse("wayland://0", 0, 0, 1920, 1080).is_err());
	}

	#[test]
	fn display_source_parses_x_scheme() {
		let display = DisplaySource::parse("x://0", 0, 0, 1920, 1080).unwrap();
		assert_eq!(display.scheme, DisplayScheme::X);
		assert_eq!(display.name, "0");
	}

	#[tokio::test]
	async fn initiate_io_rejects_disconnected_peer() {
		let config = SessionConfig::default();
		let display = DisplaySource::parse("x://0", 0, 0, 1920, 1080).unwrap();
		let data = SessionData::new(config, display, peer()).unwrap();
		assert!(matches!(bind_rtsp_listener(&data).await, Err(WfdError::NotConnected)));
	}

	fn device_info_blob(port: u16) -> Vec<u8> {
		let mut payload = vec![0x00, 0x00];
		payload.extend_from_slice(&port.to_be_bytes());
		let mut blob = vec![0x00];
		blob.extend_from_slice(&(payload.len() as u16).to_be_bytes());
		blob.extend_from_slice(&payload);
		blob
	}

	#[tokio::test]
	async fn initiate_io_twice_is_in_progress() {
		let config = SessionConfig::default();
		let display = DisplaySource::parse("x://0", 0, 0, 1920, 1080).unwrap();
		let connected_peer = PeerLink {
			local_address: Ipv4Addr::new(127, 0, 0, 1),
			remote_address: Ipv4Addr::new(127, 0, 0, 1),
			connected: true,
			wfd_subelements: device_info_blob(0),
		};

		let session = Session::spawn(config, display, connected_peer).await.unwrap();
		session.initiate_io().await.unwrap();
		assert!(matches!(session.initiate_io().await, Err(WfdError::InProgress)));
	}
}
