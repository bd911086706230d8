//! WFD capability codec (C2).
//!
//! WFD parameter bodies are carried as CRLF-terminated `key: value` lines
//! inside RTSP `GET_PARAMETER`/`SET_PARAMETER` bodies. Missing optional keys
//! are silently accepted; malformed values are rejected.

use crate::error::{Result, WfdError};
use crate::resolution::ResolutionStandard;

/// A parsed reply to the M3 `GET_PARAMETER` request.
///
/// Any field may be absent if the sink's reply didn't carry that key.
#[derive(Clone, Debug, Default)]
pub struct GetParameterReply {
	pub video_formats: Option<String>,
	pub audio_codecs: Option<String>,
	pub client_rtp_ports: Option<(u16, u16)>,
}

/// A validated `wfd_trigger_method` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMethod {
	Setup,
	Play,
	Pause,
	Teardown,
}

impl TriggerMethod {
	fn as_str(self) -> &'static str {
		match self {
			TriggerMethod::Setup => "SETUP",
			TriggerMethod::Play => "PLAY",
			TriggerMethod::Pause => "PAUSE",
			TriggerMethod::Teardown => "TEARDOWN",
		}
	}
}

fn find_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
	body.lines().find_map(|line| {
		let (k, v) = line.split_once(':')?;
		(k.trim() == key).then(|| v.trim())
	})
}

/// Formats the single `wfd_video_formats` row the source emits, placing
/// `mask` in the column matching `standard` and zeroing the others.
pub fn format_video_formats(standard: ResolutionStandard, mask: u32) -> String {
	let cea = if standard == ResolutionStandard::Cea { mask } else { 0 };
	let vesa = if standard == ResolutionStandard::Vesa { mask } else { 0 };
	let hh = if standard == ResolutionStandard::Hh { mask } else { 0 };

	format!(
		"wfd_video_formats: 00 00 02 10 {cea:08X} {vesa:08X} {hh:08X} 00 0000 0000 00 none none"
	)
}

/// Formats the `wfd_presentation_URL` line carrying the source's stream URL.
pub fn format_presentation_url(url: &str) -> String {
	format!("wfd_presentation_URL: {url} none")
}

/// Formats the `wfd_client_rtp_ports` line the source echoes back at M4.
pub fn format_client_rtp_ports(ports: (u16, u16)) -> String {
	format!("wfd_client_rtp_ports: {} {} mode=play", ports.0, ports.1)
}

pub fn format_trigger_method(method: TriggerMethod) -> String {
	format!("wfd_trigger_method: {}", method.as_str())
}

/// Parses a `wfd_client_rtp_ports` value of the form
/// `RTP/AVP/UDP;unicast <port0> <port1> mode=play`.
fn parse_client_rtp_ports(value: &str) -> Result<(u16, u16)> {
	let value = value
		.strip_prefix("RTP/AVP/UDP;unicast")
		.ok_or_else(|| WfdError::ProtocolError("wfd_client_rtp_ports has wrong transport prefix".into()))?
		.trim_start();

	let mut tokens = value.split_whitespace();
	let port0: u16 = tokens
		.next()
		.ok_or_else(|| WfdError::ProtocolError("wfd_client_rtp_ports missing first port".into()))?
		.parse()
		.map_err(|_| WfdError::ProtocolError("wfd_client_rtp_ports first port is not a number".into()))?;
	let port1: u16 = tokens
		.next()
		.ok_or_else(|| WfdError::ProtocolError("wfd_client_rtp_ports missing second port".into()))?
		.parse()
		.map_err(|_| WfdError::ProtocolError("wfd_client_rtp_ports second port is not a number".into()))?;
	let mode = tokens
		.next()
		.ok_or_else(|| WfdError::ProtocolError("wfd_client_rtp_ports missing mode token".into()))?;

	if !mode.starts_with("mode=play") {
		return Err(WfdError::ProtocolError("wfd_client_rtp_ports mode is not 'play'".into()));
	}

	if port0 == 0 && port1 == 0 {
		return Err(WfdError::ProtocolError("wfd_client_rtp_ports both ports are zero".into()));
	}

	Ok((port0, port1))
}

/// Parses the body of an M3 reply, extracting whichever of
/// `wfd_video_formats` / `wfd_audio_codecs` / `wfd_client_rtp_ports` are
/// present. Any key that is present but malformed is rejected.
pub fn parse_get_parameter_reply(body: &str) -> Result<GetParameterReply> {
	let video_formats = find_value(body, "wfd_video_formats").map(str::to_string);
	let audio_codecs = find_value(body, "wfd_audio_codecs").map(str::to_string);
	let client_rtp_ports = find_value(body, "wfd_client_rtp_ports")
		.map(parse_client_rtp_ports)
		.transpose()?;

	Ok(GetParameterReply { video_formats, audio_codecs, client_rtp_ports })
}
