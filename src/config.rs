use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WfdError};

/// Configuration for an outgoing WFD session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
	/// Backlog passed to `listen()` on the RTSP listening socket.
	#[serde(default = "default_listen_backlog")]
	pub listen_backlog: u32,

	/// RTSP session timeout advertised in `Session` headers, in seconds.
	#[serde(default = "default_session_timeout_secs")]
	pub session_timeout_secs: u64,

	/// Delay between the M7 `PLAY` reply and launching the media pipeline.
	#[serde(default = "default_pipeline_arm_delay_ms", with = "duration_millis")]
	pub pipeline_arm_delay: Duration,

	/// Media pipeline configuration.
	#[serde(default)]
	pub pipeline: PipelineConfig,
}

impl SessionConfig {
	pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let contents = std::fs::read_to_string(path).map_err(WfdError::OsIo)?;
		let config: Self = toml::from_str(&contents)
			.map_err(|e| WfdError::ProtocolError(format!("failed to parse configuration file: {e}")))?;
		Ok(config)
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			listen_backlog: default_listen_backlog(),
			session_timeout_secs: default_session_timeout_secs(),
			pipeline_arm_delay: Duration::from_millis(default_pipeline_arm_delay_ms()),
			pipeline: PipelineConfig::default(),
		}
	}
}

fn default_listen_backlog() -> u32 {
	10
}

fn default_session_timeout_secs() -> u64 {
	30
}

fn default_pipeline_arm_delay_ms() -> u64 {
	100
}

/// Configuration for the external encoder/muxer/sender pipeline (C6).
///
/// The default `program`/`args` template mirrors a `gst-launch-1.0` pipeline
/// that captures a screen region, re-samples to YV12, H.264-encodes,
/// MPEG-TS muxes, RTP-payloads and UDP-sinks it. Placeholders `{x}`, `{y}`,
/// `{end_x}`, `{end_y}`, `{host}`, `{port}` are substituted per-session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
	pub program: String,
	pub args: Vec<String>,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			program: "gst-launch-1.0".to_string(),
			args: vec![
				"ximagesrc".to_string(),
				"use-damage=false".to_string(),
				"show-pointer=false".to_string(),
				"startx={x}".to_string(),
				"starty={y}".to_string(),
				"endx={end_x}".to_string(),
				"endy={end_y}".to_string(),
				"!".to_string(),
				"vaapipostproc".to_string(),
				"!".to_string(),
				"video/x-raw,format=YV12".to_string(),
				"!".to_string(),
				"vaapih264enc".to_string(),
				"!".to_string(),
				"mpegtsmux".to_string(),
				"!".to_string(),
				"rtpmp2tpay".to_string(),
				"!".to_string(),
				"udpsink".to_string(),
				"host={host}".to_string(),
				"port={port}".to_string(),
			],
		}
	}
}

mod duration_millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
		let millis = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(millis))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_round_trips_through_toml() {
		let config = SessionConfig::default();
		let serialized = toml::to_string(&config).unwrap();
		let deserialized: SessionConfig = toml::from_str(&serialized).unwrap();
		assert_eq!(deserialized.listen_backlog, config.listen_backlog);
		assert_eq!(deserialized.session_timeout_secs, config.session_timeout_secs);
	}

	#[test]
	fn reads_config_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("wfd-session.toml");
		std::fs::write(&path, "listen_backlog = 5\nsession_timeout_secs = 45\n").unwrap();

		let config = SessionConfig::read_from_file(&path).unwrap();
		assert_eq!(config.listen_backlog, 5);
		assert_eq!(config.session_timeout_secs, 45);
	}
}
