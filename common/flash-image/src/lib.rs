// Licensed under the Apache-2.0 license
#![no_std]

//! Wire format of the 32-byte header prefixed to every firmware image, and
//! the XOR-fold checksum shared with the status store.

use core::mem::offset_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IMAGE_HEADER_MAGIC: u32 = 0x96f3_b83d;
pub const IMAGE_HEADER_SIZE: usize = core::mem::size_of::<ImageHeader>();
pub const MANIFEST_VERSION: u8 = 1;

pub const IMAGE_TYPE_MBL: u8 = 0x1;
pub const IMAGE_TYPE_PROT: u8 = 0x2;
pub const IMAGE_TYPE_AROT: u8 = 0x4;
pub const IMAGE_TYPE_NSPE: u8 = 0x8;
/// Type of the application image held in the two boot slots.
pub const IMAGE_TYPE_IMG: u8 = IMAGE_TYPE_NSPE;

pub const HASH_ALGO_SHA256: u8 = 1;
pub const HASH_ALGO_SHA512: u8 = 2;
pub const SIGN_ALGO_ED25519: u8 = 1;

pub const MAX_VER_MAJOR: u8 = 254;
pub const MAX_VER_MINOR: u8 = 254;

/// XOR of the little-endian 32-bit words of `data`. A trailing partial word
/// is zero-padded.
pub fn checksum_fold(data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(4);
    let mut acc = chunks
        .by_ref()
        .fold(0u32, |acc, w| acc ^ u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut last = [0u8; 4];
        last[..rem.len()].copy_from_slice(rem);
        acc ^= u32::from_le_bytes(last);
    }
    acc
}

/// Packs a version triple into the form compared against anti-rollback
/// watermarks.
pub const fn encode_version(major: u8, minor: u8, revision: u16) -> u32 {
    ((major as u32) << 24) | ((minor as u32) << 16) | revision as u32
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ImageHeader {
    pub magic: u32,
    pub total_size: u32,
    pub manifest_version: u8,
    pub image_type: u8,
    pub hash_algorithm: u8,
    pub signature_algorithm: u8,
    pub header_size: u16,
    pub protected_tlv_size: u16,
    pub image_size: u32,
    pub version_major: u8,
    pub version_minor: u8,
    pub version_revision: u16,
    pub reserved: u32,
    pub checksum: u32,
}

impl ImageHeader {
    /// Builds a header for `image_size` payload bytes with a checksum that
    /// makes the whole header fold to zero.
    pub fn build(image_type: u8, image_size: u32, version: (u8, u8, u16)) -> Self {
        let mut header = ImageHeader {
            magic: IMAGE_HEADER_MAGIC,
            total_size: image_size.saturating_add(IMAGE_HEADER_SIZE as u32),
            manifest_version: MANIFEST_VERSION,
            image_type,
            hash_algorithm: HASH_ALGO_SHA256,
            signature_algorithm: SIGN_ALGO_ED25519,
            header_size: IMAGE_HEADER_SIZE as u16,
            protected_tlv_size: 0,
            image_size,
            version_major: version.0,
            version_minor: version.1,
            version_revision: version.2,
            reserved: 0,
            checksum: 0,
        };
        header.seal();
        header
    }

    /// Recomputes `checksum` over the other fields.
    pub fn seal(&mut self) {
        self.checksum = checksum_fold(&self.as_bytes()[..offset_of!(ImageHeader, checksum)]);
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        ImageHeader::read_from_prefix(bytes).ok().map(|(h, _)| h)
    }

    pub fn version(&self) -> u32 {
        encode_version(
            self.version_major,
            self.version_minor,
            self.version_revision,
        )
    }

    /// True when the fold over all 32 bytes, checksum included, is zero.
    pub fn checksum_ok(&self) -> bool {
        checksum_fold(self.as_bytes()) == 0
    }
}
