//! RTSP dispatcher (C4).
//!
//! One row per WFD M-kind: an optional outbound-request builder, an
//! optional inbound-request handler, an optional inbound-reply handler, and
//! a post-transition rule-list. Rows are expressed as `match` arms rather
//! than a literal table of function pointers — the idiomatic Rust
//! replacement for the original's array of dispatch-entry structs.

use rtsp_types::{headers, Method, Request, StatusCode, Version};
use url::Url;

use crate::capability::{self, TriggerMethod};
use crate::error::{Result, WfdError};
use crate::rtsp_io::{RtspRequest, RtspResponse};
use crate::session::{SessionData, SessionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MKind {
	M1,
	M2,
	M3,
	M4,
	M5,
	M6,
	M7,
	M8,
	M9,
	M10,
	M11,
	M12,
	M13,
	M14,
	M15,
	M16,
}

/// Arguments threaded into a `build_request` call by a prior rule-list's
/// `REQUEST_ARGS` directive.
#[derive(Clone, Copy, Debug)]
pub enum RequestArgs {
	Trigger(TriggerMethod),
}

/// A directive applied after a dispatcher handler succeeds.
#[derive(Clone, Copy, Debug)]
pub enum Directive {
	NextRequest(MKind),
	NewState(SessionState),
	RequestArgs(RequestArgs),
	ArmPipelineTimer,
	KillPipeline,
}

fn wfd_url(path: &str) -> Result<Url> {
	Url::parse(path).map_err(|e| WfdError::ProtocolError(format!("invalid WFD URL '{path}': {e}")))
}

fn next_cseq(session: &mut SessionData) -> i32 {
	session.cseq += 1;
	session.cseq
}

fn request_cseq(request: &Request<Vec<u8>>) -> Result<i32> {
	request
		.header(&headers::CSEQ)
		.ok_or_else(|| WfdError::ProtocolError("RTSP request has no CSeq header".into()))?
		.as_str()
		.parse()
		.map_err(|_| WfdError::ProtocolError("RTSP CSeq header is not a number".into()))
}

/// Rejects an inbound request addressed to `kind` unless the session is
/// currently in one of `allowed`. Enforces the legal state graph from the
/// distilled spec's §4.5 — e.g. an M6 `SETUP` arriving while `PLAYING` is a
/// protocol error, not a silent re-SETUP.
fn ensure_state(session: &SessionData, kind: MKind, allowed: &[SessionState]) -> Result<()> {
	if allowed.contains(&session.state) {
		Ok(())
	} else {
		Err(WfdError::ProtocolError(format!("{kind:?} received in illegal state {:?}", session.state)))
	}
}

fn not_implemented(request: &RtspRequest) -> Result<RtspResponse> {
	Ok(rtsp_types::Response::builder(request.version(), StatusCode::NotImplemented)
		.header(headers::CSEQ, request_cseq(request)?.to_string())
		.build(Vec::new()))
}

/// Builds the outbound request for an M-kind the source originates.
///
/// Returns `Ok(None)` for kinds the source never originates. Fails with
/// `PROTOCOL_ERROR` if a different request is already outstanding — at most
/// one RTSP operation may be in flight per session.
pub fn build_request(session: &mut SessionData, kind: MKind, args: Option<RequestArgs>) -> Result<Option<RtspRequest>> {
	if !matches!(kind, MKind::M1 | MKind::M3 | MKind::M4 | MKind::M5) {
		return Ok(None);
	}

	if let Some(outstanding) = session.outstanding {
		return Err(WfdError::ProtocolError(format!(
			"cannot issue {kind:?} while {outstanding:?} is still outstanding"
		)));
	}

	let cseq = next_cseq(session);

	let request = match kind {
		MKind::M1 => Request::builder(Method::Options, Version::V1_0)
			.header(headers::CSEQ, cseq.to_string())
			.header(headers::REQUIRE, "org.wfa.wfd1.0")
			.build(Vec::new()),

		MKind::M3 => Request::builder(Method::GetParameter, Version::V1_0)
			.request_uri(wfd_url("rtsp://localhost/wfd1.0")?)
			.header(headers::CSEQ, cseq.to_string())
			.build(b"wfd_video_formats\nwfd_audio_codecs\nwfd_client_rtp_ports".to_vec()),

		MKind::M4 => {
			let url = format!("rtsp://{}/wfd1.0/streamid=0", session.peer.local_address);
			session.stream_url = Some(url.clone());

			let rtp_ports = session
				.rtp_ports
				.ok_or_else(|| WfdError::ProtocolError("M4 requires a prior M3 reply with client RTP ports".into()))?;

			let mut body = capability::format_video_formats(session.standard, session.mask);
			body.push('\n');
			body.push_str(&capability::format_presentation_url(&url));
			body.push('\n');
			body.push_str(&capability::format_client_rtp_ports(rtp_ports));

			Request::builder(Method::SetParameter, Version::V1_0)
				.request_uri(wfd_url("rtsp://localhost/wfd1.0")?)
				.header(headers::CSEQ, cseq.to_string())
				.build(body.into_bytes())
		},

		MKind::M5 => {
			let Some(RequestArgs::Trigger(method)) = args else {
				return Err(WfdError::ProtocolError("M5 requires a trigger method argument".into()));
			};
			let url = session
				.stream_url
				.clone()
				.ok_or_else(|| WfdError::ProtocolError("M5 requires a stream URL set by M4".into()))?;

			Request::builder(Method::SetParameter, Version::V1_0)
				.request_uri(wfd_url(&url)?)
				.header(headers::CSEQ, cseq.to_string())
				.build(capability::format_trigger_method(method).into_bytes())
		},

		MKind::M2 | MKind::M6 | MKind::M7 | MKind::M8 | MKind::M9 | MKind::M10 | MKind::M11 | MKind::M12
		| MKind::M13 | MKind::M14 | MKind::M15 | MKind::M16 => unreachable!("filtered out above"),
	};

	session.outstanding = Some(kind);
	Ok(Some(request))
}

/// Handles an inbound request addressed to the given M-kind.
///
/// Returns the response to send and the rule-list to apply (only applied by
/// the caller if the response is a success).
pub fn handle_inbound_request(
	session: &mut SessionData,
	kind: MKind,
	request: &RtspRequest,
) -> Result<(RtspResponse, Vec<Directive>)> {
	match kind {
		MKind::M2 => {
			ensure_state(session, kind, &[SessionState::Negotiating])?;

			let require = request
				.header(&headers::REQUIRE)
				.map(|v| v.as_str())
				.unwrap_or_default();

			if require != "org.wfa.wfd1.0" {
				let response = rtsp_types::Response::builder(request.version(), StatusCode::OptionNotSupported)
					.header(headers::CSEQ, request_cseq(request)?.to_string())
					.build(Vec::new());
				return Ok((response, Vec::new()));
			}

			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.header(
					headers::PUBLIC,
					"org.wfa.wfd1.0, SETUP, TEARDOWN, PLAY, PAUSE, GET_PARAMETER, SET_PARAMETER",
				)
				.build(Vec::new());
			Ok((response, vec![Directive::NextRequest(MKind::M3)]))
		},

		MKind::M6 => {
			ensure_state(session, kind, &[SessionState::Established])?;

			let transport = request
				.header(&headers::TRANSPORT)
				.ok_or_else(|| WfdError::ProtocolError("M6 SETUP missing Transport header".into()))?
				.as_str();

			let client_port = transport
				.strip_prefix("RTP/AVP/UDP;unicast;client_port=")
				.ok_or_else(|| WfdError::ProtocolError("M6 SETUP has unsupported Transport value".into()))?
				.parse::<u16>()
				.map_err(|_| WfdError::ProtocolError("M6 SETUP client_port is not a number".into()))?;

			session.stream_rtp_port = Some(client_port);

			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.header(headers::SESSION, format!("{:X};timeout={}", session.session_id, session.config.session_timeout_secs))
				.header(headers::TRANSPORT, format!("RTP/AVP/UDP;unicast;client_port={client_port}"))
				.build(Vec::new());
			Ok((response, Vec::new()))
		},

		MKind::M7 => {
			ensure_state(session, kind, &[SessionState::Established, SessionState::Paused])?;

			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.header(headers::SESSION, format!("{:X};timeout={}", session.session_id, session.config.session_timeout_secs))
				.header(headers::RANGE, "ntp=now-")
				.build(Vec::new());
			Ok((response, vec![Directive::NewState(SessionState::Playing), Directive::ArmPipelineTimer]))
		},

		MKind::M8 => {
			ensure_state(
				session,
				kind,
				&[SessionState::Negotiating, SessionState::Established, SessionState::Playing, SessionState::Paused],
			)?;

			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.build(Vec::new());
			Ok((response, vec![Directive::KillPipeline, Directive::NewState(SessionState::TearingDown)]))
		},

		MKind::M9 => {
			ensure_state(session, kind, &[SessionState::Playing])?;

			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.build(Vec::new());
			Ok((response, vec![Directive::KillPipeline, Directive::NewState(SessionState::Paused)]))
		},

		MKind::M10 | MKind::M11 | MKind::M12 | MKind::M13 | MKind::M15 => Ok((not_implemented(request)?, Vec::new())),

		MKind::M14 | MKind::M16 => {
			let response = rtsp_types::Response::builder(request.version(), StatusCode::Ok)
				.header(headers::CSEQ, request_cseq(request)?.to_string())
				.build(Vec::new());
			Ok((response, Vec::new()))
		},

		MKind::M1 | MKind::M3 | MKind::M4 | MKind::M5 => Ok((not_implemented(request)?, Vec::new())),
	}
}

/// Handles the reply to an outbound request the source itself issued.
pub fn handle_reply(session: &mut SessionData, kind: MKind, reply: &RtspResponse) -> Result<Vec<Directive>> {
	if session.outstanding != Some(kind) {
		return Err(WfdError::ProtocolError(format!("received unexpected reply for {kind:?}")));
	}
	session.outstanding = None;

	if !reply.status_code().is_success() {
		return Err(WfdError::ProtocolError(format!("{kind:?} reply carried non-success status {:?}", reply.status_code())));
	}

	match kind {
		MKind::M1 => {
			let public = reply
				.header(&headers::PUBLIC)
				.ok_or_else(|| WfdError::ProtocolError("M1 reply missing Public header".into()))?
				.as_str();
			let methods: Vec<&str> = public.split(',').map(str::trim).collect();
			let required = ["org.wfa.wfd1.0", "GET_PARAMETER", "SET_PARAMETER"];
			if !required.iter().all(|m| methods.contains(m)) {
				return Err(WfdError::ProtocolError("M1 reply does not advertise required methods".into()));
			}
			Ok(Vec::new())
		},

		MKind::M3 => {
			let body = std::str::from_utf8(reply.body())
				.map_err(|_| WfdError::ProtocolError("M3 reply body is not valid UTF-8".into()))?;
			let parsed = capability::parse_get_parameter_reply(body)?;

			if let Some(vformats) = parsed.video_formats {
				if session.vformats.is_some() {
					tracing::debug!("overwriting previously negotiated wfd_video_formats");
				}
				session.vformats = Some(vformats);
			}
			if let Some(acodecs) = parsed.audio_codecs {
				if session.acodecs.is_some() {
					tracing::debug!("overwriting previously negotiated wfd_audio_codecs");
				}
				session.acodecs = Some(acodecs);
			}
			if let Some(rtp_ports) = parsed.client_rtp_ports {
				session.rtp_ports = Some(rtp_ports);
			}

			Ok(vec![Directive::NextRequest(MKind::M4)])
		},

		MKind::M4 => Ok(vec![
			Directive::NewState(SessionState::Established),
			Directive::NextRequest(MKind::M5),
			Directive::RequestArgs(RequestArgs::Trigger(TriggerMethod::Setup)),
		]),

		MKind::M5 => Ok(Vec::new()),

		_ => Err(WfdError::ProtocolError(format!("{kind:?} is never an outstanding request"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SessionConfig;
	use crate::session::{DisplayScheme, DisplaySource, PeerLink};
	use std::net::Ipv4Addr;

	fn test_session() -> SessionData {
		let mut session = SessionData::new(
			SessionConfig::default(),
			DisplaySource { scheme: DisplayScheme::X, name: String::new(), x: 0, y: 0, width: 1920, height: 1080 },
			PeerLink {
				local_address: Ipv4Addr::new(192, 168, 1, 2),
				remote_address: Ipv4Addr::new(192, 168, 1, 3),
				connected: true,
				wfd_subelements: Vec::new(),
			},
		)
		.unwrap();
		session.state = SessionState::Negotiating;
		session
	}

	#[test]
	fn m2_with_bad_require_is_option_not_supported() {
		let mut session = test_session();
		let request = Request::builder(Method::Options, Version::V1_0)
			.header(headers::CSEQ, "1")
			.header(headers::REQUIRE, "org.example")
			.build(Vec::new());

		let (response, directives) = handle_inbound_request(&mut session, MKind::M2, &request).unwrap();
		assert_eq!(response.status_code(), StatusCode::OptionNotSupported);
		assert!(directives.is_empty());
	}

	#[test]
	fn m2_with_good_require_advances_to_m3() {
		let mut session = test_session();
		let request = Request::builder(Method::Options, Version::V1_0)
			.header(headers::CSEQ, "1")
			.header(headers::REQUIRE, "org.wfa.wfd1.0")
			.build(Vec::new());

		let (response, directives) = handle_inbound_request(&mut session, MKind::M2, &request).unwrap();
		assert_eq!(response.status_code(), StatusCode::Ok);
		assert!(matches!(directives.as_slice(), [Directive::NextRequest(MKind::M3)]));
	}

	#[test]
	fn unimplemented_kinds_reply_501() {
		let mut session = test_session();
		let request = Request::builder(Method::SetParameter, Version::V1_0)
			.header(headers::CSEQ, "9")
			.build(Vec::new());

		let (response, directives) = handle_inbound_request(&mut session, MKind::M10, &request).unwrap();
		assert_eq!(response.status_code(), StatusCode::NotImplemented);
		assert!(directives.is_empty());
	}

	#[test]
	fn m6_received_while_playing_is_a_protocol_error() {
		let mut session = test_session();
		session.state = SessionState::Playing;
		let request = Request::builder(Method::Setup, Version::V1_0)
			.header(headers::CSEQ, "1")
			.header(headers::TRANSPORT, "RTP/AVP/UDP;unicast;client_port=50000")
			.build(Vec::new());

		let err = handle_inbound_request(&mut session, MKind::M6, &request).unwrap_err();
		assert!(matches!(err, WfdError::ProtocolError(_)));
	}

	#[test]
	fn m9_received_while_established_is_a_protocol_error() {
		let mut session = test_session();
		session.state = SessionState::Established;
		let request = Request::builder(Method::Pause, Version::V1_0).header(headers::CSEQ, "1").build(Vec::new());

		let err = handle_inbound_request(&mut session, MKind::M9, &request).unwrap_err();
		assert!(matches!(err, WfdError::ProtocolError(_)));
	}

	#[test]
	fn build_request_rejects_new_request_while_one_is_outstanding() {
		let mut session = test_session();
		build_request(&mut session, MKind::M1, None).unwrap();
		let err = build_request(&mut session, MKind::M3, None).unwrap_err();
		assert!(matches!(err, WfdError::ProtocolError(_)));
	}
}
