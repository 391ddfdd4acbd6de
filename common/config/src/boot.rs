// Licensed under the Apache-2.0 license

use bitflags::bitflags;
use mcu_error::FormatError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// One of the two firmware image slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SlotId {
    Slot0 = 0,
    Slot1 = 1,
}

impl SlotId {
    pub const ALL: [SlotId; 2] = [SlotId::Slot0, SlotId::Slot1];

    pub const fn other(self) -> SlotId {
        match self {
            SlotId::Slot0 => SlotId::Slot1,
            SlotId::Slot1 => SlotId::Slot0,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Raw bits of a persisted image slot status item.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageFlags: u8 {
        const NEWER = 0x01;
        const VERIFY_OK = 0x02;
        const VERIFY_FAIL = 0x04;
        const ATTEST_OK = 0x08;
        const ATTEST_FAIL = 0x10;

        const NEWER_MASK = Self::NEWER.bits();
        const VERIFY_MASK = Self::VERIFY_OK.bits() | Self::VERIFY_FAIL.bits();
        const ATTEST_MASK = Self::ATTEST_OK.bits() | Self::ATTEST_FAIL.bits();
    }
}

impl ImageFlags {
    /// Freshness bit cleared; named for symmetry with `NEWER`.
    pub const OLDER: ImageFlags = ImageFlags::empty();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Older,
    Newer,
}

/// Outcome of a verification or attestation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    None,
    Ok,
    Fail,
}

/// A slot status that is known to be one of the legal flag combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStatus {
    pub freshness: Freshness,
    pub verify: CheckState,
    pub attest: CheckState,
}

/// The only bit patterns a slot status may take.
const LEGAL_STATUS_BITS: [u8; 9] = [0x00, 0x01, 0x03, 0x02, 0x05, 0x0d, 0x0b, 0x0a, 0x13];

impl ImageStatus {
    /// Status of a slot nothing has been recorded for.
    pub const RESET: ImageStatus = ImageStatus {
        freshness: Freshness::Older,
        verify: CheckState::None,
        attest: CheckState::None,
    };

    pub fn bits(&self) -> u8 {
        let mut flags = ImageFlags::empty();
        if self.freshness == Freshness::Newer {
            flags |= ImageFlags::NEWER;
        }
        flags |= match self.verify {
            CheckState::None => ImageFlags::empty(),
            CheckState::Ok => ImageFlags::VERIFY_OK,
            CheckState::Fail => ImageFlags::VERIFY_FAIL,
        };
        flags |= match self.attest {
            CheckState::None => ImageFlags::empty(),
            CheckState::Ok => ImageFlags::ATTEST_OK,
            CheckState::Fail => ImageFlags::ATTEST_FAIL,
        };
        flags.bits()
    }

    pub fn is_newer(&self) -> bool {
        self.freshness == Freshness::Newer
    }

    pub fn has_failure(&self) -> bool {
        self.verify == CheckState::Fail || self.attest == CheckState::Fail
    }

    /// Verified and attested: a valid rollback target.
    pub fn is_known_good(&self) -> bool {
        self.verify == CheckState::Ok && self.attest == CheckState::Ok
    }

    /// Replaces the bits selected by `mask` with `flags` and validates the
    /// result.
    pub fn apply(&self, mask: ImageFlags, flags: ImageFlags) -> Result<ImageStatus, FormatError> {
        let bits = (self.bits() & !mask.bits()) | (flags.bits() & mask.bits());
        ImageStatus::try_from(bits)
    }
}

impl Default for ImageStatus {
    fn default() -> Self {
        ImageStatus::RESET
    }
}

impl TryFrom<u8> for ImageStatus {
    type Error = FormatError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        if !LEGAL_STATUS_BITS.contains(&bits) {
            return Err(FormatError::IllegalImageStatus(bits));
        }
        let flags = ImageFlags::from_bits_retain(bits);
        let check = |ok: ImageFlags, fail: ImageFlags| {
            if flags.contains(ok) {
                CheckState::Ok
            } else if flags.contains(fail) {
                CheckState::Fail
            } else {
                CheckState::None
            }
        };
        Ok(ImageStatus {
            freshness: if flags.contains(ImageFlags::NEWER) {
                Freshness::Newer
            } else {
                Freshness::Older
            },
            verify: check(ImageFlags::VERIFY_OK, ImageFlags::VERIFY_FAIL),
            attest: check(ImageFlags::ATTEST_OK, ImageFlags::ATTEST_FAIL),
        })
    }
}
