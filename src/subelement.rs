//! WFD subelement codec (C1).
//!
//! Subelements are length-tagged binary blobs carried out-of-band in the
//! `WfdSubelements` property during P2P discovery. This core only needs to
//! read the sink's `DEVICE_INFO` subelement, to extract the RTSP TCP port it
//! advertises.

use crate::error::{Result, WfdError};

const SUBELEMENT_ID_DEVICE_INFO: u8 = 0;

/// A single parsed `DEVICE_INFO` subelement.
#[derive(Clone, Copy, Debug)]
struct DeviceInfo {
	_session_availability_bitmap: u16,
	rtsp_port: u16,
}

/// The set of subelements carried in a peer's `WfdSubelements` blob.
pub struct Subelements {
	device_info: Option<DeviceInfo>,
}

impl Subelements {
	/// Parses a raw subelement blob.
	///
	/// Each entry is `id: u8, length: u16 (big-endian), payload: [u8; length]`.
	/// Unknown subelement ids are skipped; only `DEVICE_INFO` is decoded.
	pub fn parse(bytes: &[u8]) -> Result<Self> {
		let mut device_info = None;
		let mut cursor = bytes;

		while !cursor.is_empty() {
			let &[id, len_hi, len_lo, ref rest @ ..] = cursor else {
				return Err(WfdError::ProtocolError("malformed subelement header".into()));
			};
			let len = u16::from_be_bytes([len_hi, len_lo]) as usize;
			if rest.len() < len {
				return Err(WfdError::ProtocolError("subelement payload truncated".into()));
			}
			let (payload, remainder) = rest.split_at(len);

			if id == SUBELEMENT_ID_DEVICE_INFO {
				if payload.len() < 4 {
					return Err(WfdError::ProtocolError("DEVICE_INFO subelement too short".into()));
				}
				let session_availability_bitmap = u16::from_be_bytes([payload[0], payload[1]]);
				let rtsp_port = u16::from_be_bytes([payload[2], payload[3]]);
				device_info = Some(DeviceInfo {
					_session_availability_bitmap: session_availability_bitmap,
					rtsp_port,
				});
			}

			cursor = remainder;
		}

		Ok(Self { device_info })
	}

	/// Returns the sink's advertised RTSP TCP port.
	pub fn rtsp_port(&self) -> Result<u16> {
		self.device_info
			.as_ref()
			.map(|info| info.rtsp_port)
			.ok_or(WfdError::ProtocolError("DEVICE_INFO subelement missing".into()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn device_info_blob(bitmap: u16, port: u16) -> Vec<u8> {
		let mut payload = Vec::new();
		payload.extend_from_slice(&bitmap.to_be_bytes());
		payload.extend_from_slice(&port.to_be_bytes());

		let mut blob = vec![SUBELEMENT_ID_DEVICE_INFO];
		blob.extend_from_slice(&(payload.len() as u16).to_be_bytes());
		blob.extend_from_slice(&payload);
		blob
	}

	#[test]
	fn parses_rtsp_port_from_device_info() {
		let blob = device_info_blob(0x0001, 7236);
		let subelements = Subelements::parse(&blob).unwrap();
		assert_eq!(subelements.rtsp_port().unwrap(), 7236);
	}

	#[test]
	fn missing_device_info_is_an_error() {
		let subelements = Subelements::parse(&[]).unwrap();
		assert!(matches!(subelements.rtsp_port(), Err(WfdError::ProtocolError(_))));
	}

	#[test]
	fn truncated_subelement_is_malformed() {
		let blob = vec![SUBELEMENT_ID_DEVICE_INFO, 0x00, 0x10];
		assert!(matches!(Subelements::parse(&blob), Err(WfdError::ProtocolError(_))));
	}

	#[test]
	fn skips_unknown_subelement_ids() {
		let mut blob = vec![0x99, 0x00, 0x02, 0xAA, 0xBB];
		blob.extend(device_info_blob(0, 9999));
		let subelements = Subelements::parse(&blob).unwrap();
		assert_eq!(subelements.rtsp_port().unwrap(), 9999);
	}
}
