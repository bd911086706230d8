//! WFD 1.0 resolution catalogue (C3).
//!
//! Maps a `(width, height)` pair to the WFD resolution standard it belongs
//! to (CEA, VESA or "handheld") and the bitmask identifying it within that
//! standard's row of `wfd_video_formats`. The table is fixed compile-time
//! data, carried over from the WFD 1.0 specification's resolution
//! catalogues.

use crate::error::{Result, WfdError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionStandard {
	Cea,
	Vesa,
	Hh,
}

/// `(width, height, standard, bit index within the standard's mask)`.
///
/// WFD 1.0's actual CEA/VESA/HH tables enumerate several refresh-rate
/// variants per resolution, each its own bit; since this catalogue is keyed
/// by `(width, height)` alone, only the first (highest-priority) refresh
/// variant of each distinct resolution is kept.
const RESOLUTIONS: &[(u16, u16, ResolutionStandard, u32)] = &[
	// CEA-861 modes, as enumerated by WFD 1.0 table 5-36.
	(1920, 1080, ResolutionStandard::Cea, 0),
	(1280, 720, ResolutionStandard::Cea, 1),
	(720, 576, ResolutionStandard::Cea, 2),
	(720, 480, ResolutionStandard::Cea, 3),
	(640, 480, ResolutionStandard::Cea, 4),
	// VESA modes, WFD 1.0 table 5-37.
	(800, 600, ResolutionStandard::Vesa, 0),
	(1024, 768, ResolutionStandard::Vesa, 1),
	(1152, 864, ResolutionStandard::Vesa, 2),
	(1280, 768, ResolutionStandard::Vesa, 3),
	(1280, 800, ResolutionStandard::Vesa, 4),
	(1360, 768, ResolutionStandard::Vesa, 5),
	(1366, 768, ResolutionStandard::Vesa, 6),
	(1280, 1024, ResolutionStandard::Vesa, 7),
	(1400, 1050, ResolutionStandard::Vesa, 8),
	(1440, 900, ResolutionStandard::Vesa, 9),
	(1600, 900, ResolutionStandard::Vesa, 10),
	(1600, 1200, ResolutionStandard::Vesa, 11),
	(1680, 1024, ResolutionStandard::Vesa, 12),
	(1680, 1050, ResolutionStandard::Vesa, 13),
	(1920, 1200, ResolutionStandard::Vesa, 14),
	// Handheld modes, WFD 1.0 table 5-38.
	(800, 480, ResolutionStandard::Hh, 0),
	(854, 480, ResolutionStandard::Hh, 1),
	(864, 480, ResolutionStandard::Hh, 2),
	(640, 360, ResolutionStandard::Hh, 3),
	(960, 540, ResolutionStandard::Hh, 4),
	(848, 480, ResolutionStandard::Hh, 5),
];

/// Resolves `(width, height)` to its WFD standard and bitmask.
///
/// The bitmask has exactly one bit set, at the position the resolution
/// occupies within its standard's 32-bit `wfd_video_formats` column.
pub fn resolve(width: u16, height: u16) -> Result<(ResolutionStandard, u32)> {
	RESOLUTIONS
		.iter()
		.find(|(w, h, _, _)| *w == width && *h == height)
		.map(|(_, _, standard, bit)| (*standard, 1u32 << bit))
		.ok_or(WfdError::UnsupportedResolution { width, height })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_known_cea_resolution() {
		let (standard, mask) = resolve(1920, 1080).unwrap();
		assert_eq!(standard, ResolutionStandard::Cea);
		assert_eq!(mask.count_ones(), 1);
	}

	#[test]
	fn rejects_unknown_resolution() {
		let err = resolve(37, 42).unwrap_err();
		assert!(matches!(err, WfdError::UnsupportedResolution { width: 37, height: 42 }));
	}

	#[test]
	fn every_table_entry_round_trips() {
		for &(w, h, expected_standard, bit) in RESOLUTIONS {
			let (standard, mask) = resolve(w, h).unwrap();
			assert_eq!(standard, expected_standard);
			assert_eq!(mask, 1u32 << bit);
		}
	}
}
