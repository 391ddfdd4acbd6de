// Licensed under the Apache-2.0 license

use flash_image::{
    ImageHeader, HASH_ALGO_SHA256, IMAGE_HEADER_MAGIC, IMAGE_TYPE_IMG, MAX_VER_MAJOR,
    MAX_VER_MINOR,
};
use log::warn;
use mcu_error::{FormatError, McuError};

/// Verifies the integrity of an image header and its version against the
/// anti-rollback watermark.
///
/// Parameters:
///   header:     Raw bytes read from the start of the image slot
///   watermark:  Lowest image version the device may still run
///
/// Returns:
///   The parsed header if every check passes. A structurally broken header
///   is an `McuError::Format`; a sound but superseded one is
///   `McuError::Stale`.
pub trait ImageVerifier {
    fn verify_header(&self, header: &[u8], watermark: u32) -> Result<ImageHeader, McuError>;
}

/// Checks the fixed image header format.
pub struct HeaderVerifier {
    expected_type: u8,
}

impl HeaderVerifier {
    pub const fn new(expected_type: u8) -> Self {
        HeaderVerifier { expected_type }
    }
}

impl Default for HeaderVerifier {
    fn default() -> Self {
        HeaderVerifier::new(IMAGE_TYPE_IMG)
    }
}

impl ImageVerifier for HeaderVerifier {
    fn verify_header(&self, header: &[u8], watermark: u32) -> Result<ImageHeader, McuError> {
        let parsed =
            ImageHeader::parse(header).ok_or(FormatError::BadLength(header.len() as u32))?;
        if parsed.magic != IMAGE_HEADER_MAGIC {
            return Err(FormatError::BadMagic.into());
        }
        if parsed.image_type != self.expected_type {
            return Err(FormatError::WrongImageType(parsed.image_type).into());
        }
        if parsed.hash_algorithm != HASH_ALGO_SHA256 {
            return Err(FormatError::UnsupportedHash(parsed.hash_algorithm).into());
        }
        if parsed.version_major > MAX_VER_MAJOR || parsed.version_minor > MAX_VER_MINOR {
            return Err(FormatError::VersionOutOfRange.into());
        }
        if !parsed.checksum_ok() {
            return Err(FormatError::BadChecksum.into());
        }
        let version = parsed.version();
        if version < watermark {
            warn!(
                "image version {:#010x} is below watermark {:#010x}",
                version, watermark
            );
            return Err(McuError::Stale {
                image: version,
                watermark,
            });
        }
        Ok(parsed)
    }
}
