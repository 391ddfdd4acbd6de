// Licensed under the Apache-2.0 license

use core::fmt;

use mcu_config::{ErrorPolicy, ImageStatus, SlotId, TraceLevel};
use mcu_error::FormatError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::status::record::{INVALID_TAG, MAX_VALUE_SIZE};

/// Tags with a meaning to the bootloader. Any other tag below 0xFF is free
/// for applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum StatusTag {
    ErrorPolicy = 1,
    TraceLevel = 2,
    Slot0Status = 3,
    Slot1Status = 4,
    RunningSlot = 5,
    MblVersion = 6,
    ImageVersion = 7,
    MblKeyVersion = 8,
    ArotKeyVersion = 9,
    TrngSeed = 10,
    AutoConnect = 11,
    Ssid1 = 12,
    Ssid2 = 13,
    Password1 = 14,
    Password2 = 15,
    Password3 = 16,
    Password4 = 17,
    IpAddress = 18,
}

impl StatusTag {
    pub const fn slot_status(slot: SlotId) -> StatusTag {
        match slot {
            SlotId::Slot0 => StatusTag::Slot0Status,
            SlotId::Slot1 => StatusTag::Slot1Status,
        }
    }

    /// Items that only their validating setter may change.
    pub const fn is_protected(self) -> bool {
        matches!(
            self,
            StatusTag::Slot0Status
                | StatusTag::Slot1Status
                | StatusTag::MblVersion
                | StatusTag::ImageVersion
                | StatusTag::MblKeyVersion
                | StatusTag::ArotKeyVersion
        )
    }

    /// Exact value length for fixed-size items.
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            StatusTag::ErrorPolicy
            | StatusTag::TraceLevel
            | StatusTag::Slot0Status
            | StatusTag::Slot1Status
            | StatusTag::RunningSlot
            | StatusTag::TrngSeed
            | StatusTag::AutoConnect => Some(1),
            StatusTag::MblVersion
            | StatusTag::ImageVersion
            | StatusTag::MblKeyVersion
            | StatusTag::ArotKeyVersion
            | StatusTag::IpAddress => Some(4),
            _ => None,
        }
    }
}

/// Monotonic anti-rollback counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Mbl,
    Image,
    MblKey,
    ArotKey,
}

impl VersionKind {
    pub const fn tag(self) -> StatusTag {
        match self {
            VersionKind::Mbl => StatusTag::MblVersion,
            VersionKind::Image => StatusTag::ImageVersion,
            VersionKind::MblKey => StatusTag::MblKeyVersion,
            VersionKind::ArotKey => StatusTag::ArotKeyVersion,
        }
    }
}

/// A stored item decoded according to its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem<'a> {
    ErrorPolicy(ErrorPolicy),
    TraceLevel(TraceLevel),
    ImageStatus(SlotId, ImageStatus),
    RunningSlot(SlotId),
    Version(VersionKind, u32),
    TrngSeed(bool),
    AutoConnect(bool),
    /// Part index and bytes of a split Wi-Fi SSID.
    Ssid(u8, &'a [u8]),
    Password(u8, &'a [u8]),
    IpAddress([u8; 4]),
    Application(u8, &'a [u8]),
}

fn flag(tag: u8, value: u8) -> Result<bool, FormatError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(FormatError::InvalidValue(tag)),
    }
}

impl<'a> StatusItem<'a> {
    pub fn decode(tag: u8, value: &'a [u8]) -> Result<Self, FormatError> {
        if tag == INVALID_TAG {
            return Err(FormatError::IllegalTag(tag));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(FormatError::OversizedValue(value.len()));
        }
        let Ok(known) = StatusTag::try_from(tag) else {
            return Ok(StatusItem::Application(tag, value));
        };
        if known.fixed_len().is_some_and(|len| len != value.len()) {
            return Err(FormatError::InvalidValue(tag));
        }
        let invalid = FormatError::InvalidValue(tag);
        let word = || u32::from_le_bytes([value[0], value[1], value[2], value[3]]);

        let item = match known {
            StatusTag::ErrorPolicy => {
                StatusItem::ErrorPolicy(ErrorPolicy::try_from(value[0]).map_err(|_| invalid)?)
            }
            StatusTag::TraceLevel => {
                StatusItem::TraceLevel(TraceLevel::try_from(value[0]).map_err(|_| invalid)?)
            }
            StatusTag::Slot0Status => {
                StatusItem::ImageStatus(SlotId::Slot0, ImageStatus::try_from(value[0])?)
            }
            StatusTag::Slot1Status => {
                StatusItem::ImageStatus(SlotId::Slot1, ImageStatus::try_from(value[0])?)
            }
            StatusTag::RunningSlot => {
                StatusItem::RunningSlot(SlotId::try_from(value[0]).map_err(|_| invalid)?)
            }
            StatusTag::MblVersion => StatusItem::Version(VersionKind::Mbl, word()),
            StatusTag::ImageVersion => StatusItem::Version(VersionKind::Image, word()),
            StatusTag::MblKeyVersion => StatusItem::Version(VersionKind::MblKey, word()),
            StatusTag::ArotKeyVersion => StatusItem::Version(VersionKind::ArotKey, word()),
            StatusTag::TrngSeed => StatusItem::TrngSeed(flag(tag, value[0])?),
            StatusTag::AutoConnect => StatusItem::AutoConnect(flag(tag, value[0])?),
            StatusTag::Ssid1 | StatusTag::Ssid2 => {
                StatusItem::Ssid(tag - StatusTag::Ssid1 as u8, value)
            }
            StatusTag::Password1
            | StatusTag::Password2
            | StatusTag::Password3
            | StatusTag::Password4 => StatusItem::Password(tag - StatusTag::Password1 as u8, value),
            StatusTag::IpAddress => StatusItem::IpAddress([value[0], value[1], value[2], value[3]]),
        };
        Ok(item)
    }
}

struct Printable<'a>(&'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for StatusItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusItem::ErrorPolicy(p) => write!(f, "error policy: {p:?}"),
            StatusItem::TraceLevel(l) => write!(f, "trace level: {l:?}"),
            StatusItem::ImageStatus(slot, s) => write!(
                f,
                "image {} status: {:#04x} ({:?}, verify {:?}, attest {:?})",
                slot.index(),
                s.bits(),
                s.freshness,
                s.verify,
                s.attest
            ),
            StatusItem::RunningSlot(slot) => write!(f, "running image: {}", slot.index()),
            StatusItem::Version(kind, v) => write!(f, "{kind:?} version: {v:#010x}"),
            StatusItem::TrngSeed(on) => write!(f, "trng seed: {on}"),
            StatusItem::AutoConnect(on) => write!(f, "auto connect: {on}"),
            StatusItem::Ssid(part, v) => write!(f, "ssid[{part}]: {}", Printable(v)),
            // never echo credentials
            StatusItem::Password(part, v) => write!(f, "password[{part}]: <{} bytes>", v.len()),
            StatusItem::IpAddress([a, b, c, d]) => write!(f, "ip address: {a}.{b}.{c}.{d}"),
            StatusItem::Application(tag, v) => {
                write!(f, "application item {tag:#04x}:")?;
                v.iter().try_for_each(|b| write!(f, " {b:02x}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_items() {
        assert_eq!(
            StatusItem::decode(1, &[1]),
            Ok(StatusItem::ErrorPolicy(ErrorPolicy::Halt))
        );
        assert_eq!(
            StatusItem::decode(4, &[0x0b]),
            Ok(StatusItem::ImageStatus(
                SlotId::Slot1,
                ImageStatus::try_from(0x0b).unwrap()
            ))
        );
        assert_eq!(
            StatusItem::decode(7, &0x0102_0003u32.to_le_bytes()),
            Ok(StatusItem::Version(VersionKind::Image, 0x0102_0003))
        );
        assert_eq!(
            StatusItem::decode(17, b"secret"),
            Ok(StatusItem::Password(3, b"secret"))
        );
        assert_eq!(
            StatusItem::decode(0x40, &[9, 9]),
            Ok(StatusItem::Application(0x40, &[9, 9]))
        );
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        assert_eq!(StatusItem::decode(0xff, &[0]), Err(FormatError::IllegalTag(0xff)));
        assert_eq!(StatusItem::decode(2, &[9]), Err(FormatError::InvalidValue(2)));
        assert_eq!(StatusItem::decode(5, &[2]), Err(FormatError::InvalidValue(5)));
        assert_eq!(StatusItem::decode(7, &[1, 2]), Err(FormatError::InvalidValue(7)));
        assert_eq!(
            StatusItem::decode(3, &[0x0c]),
            Err(FormatError::IllegalImageStatus(0x0c))
        );
        assert_eq!(
            StatusItem::decode(12, &[0u8; 17]),
            Err(FormatError::OversizedValue(17))
        );
    }

    #[test]
    fn test_display_hides_passwords() {
        let item = StatusItem::decode(14, b"hunter2").unwrap();
        let text = format!("{item}");
        assert!(!text.contains("hunter2"));
        assert_eq!(
            format!("{}", StatusItem::decode(18, &[192, 168, 0, 1]).unwrap()),
            "ip address: 192.168.0.1"
        );
    }

    #[test]
    fn test_protected_tags() {
        assert!(StatusTag::Slot0Status.is_protected());
        assert!(StatusTag::ImageVersion.is_protected());
        assert!(!StatusTag::TraceLevel.is_protected());
        assert!(!StatusTag::RunningSlot.is_protected());
    }
}
