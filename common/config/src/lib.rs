// Licensed under the Apache-2.0 license

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod boot;

pub use boot::{CheckState, Freshness, ImageFlags, ImageStatus, SlotId};

use mcu_error::McuError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Size of one status record region. Each region is one erase granule.
pub const STATUS_AREA_SIZE: u32 = 0x1000;

/// Verbosity persisted in the status store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum TraceLevel {
    Always = 1,
    Error = 2,
    #[default]
    Warn = 3,
    Info = 4,
    Debug = 5,
}

impl From<TraceLevel> for log::LevelFilter {
    fn from(level: TraceLevel) -> Self {
        match level {
            // "always" messages are logged at error level
            TraceLevel::Always | TraceLevel::Error => log::LevelFilter::Error,
            TraceLevel::Warn => log::LevelFilter::Warn,
            TraceLevel::Info => log::LevelFilter::Info,
            TraceLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

/// What the bootloader does once it has no bootable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrorPolicy {
    /// Hand control to the recovery/re-download path.
    #[default]
    Redownload = 0,
    /// Stop and wait for a debugger or power cycle.
    Halt = 1,
}

/// Runtime settings loaded once from the status store at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootContext {
    pub trace_level: TraceLevel,
    pub error_policy: ErrorPolicy,
}

/// Placement of the status areas and image slots in flash.
///
/// All offsets are relative to the start of the flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlashLayout {
    /// CPU address at which flash offset 0 is mapped for execution.
    pub flash_base: u32,
    /// Offset of the "ping" status region; "pong" follows it directly and
    /// the version-lock word sits in the four bytes before it.
    pub status_offset: u32,
    pub slot_offsets: [u32; 2],
    pub slot_size: u32,
    /// Bytes of image header in front of each image, 0 when verification is
    /// disabled.
    pub image_header_size: u32,
}

impl Default for FlashLayout {
    fn default() -> Self {
        FlashLayout {
            flash_base: 0x0800_0000,
            status_offset: 0x8000,
            slot_offsets: [0x1_0000, 0x10_0000],
            slot_size: 0xf_0000,
            image_header_size: 32,
        }
    }
}

impl FlashLayout {
    pub const fn ping_offset(&self) -> u32 {
        self.status_offset
    }

    pub fn pong_offset(&self) -> Result<u32, McuError> {
        self.status_offset
            .checked_add(STATUS_AREA_SIZE)
            .ok_or(out_of_range(self.status_offset, 2 * STATUS_AREA_SIZE))
    }

    pub fn version_lock_offset(&self) -> Result<u32, McuError> {
        self.status_offset
            .checked_sub(4)
            .ok_or(out_of_range(self.status_offset, 4))
    }

    pub const fn slot_offset(&self, slot: SlotId) -> u32 {
        self.slot_offsets[slot.index()]
    }

    pub const fn verification_enabled(&self) -> bool {
        self.image_header_size != 0
    }

    /// CPU address of the first instruction-stream byte of `slot`.
    pub fn image_base(&self, slot: SlotId) -> Result<u32, McuError> {
        let offset = self.slot_offset(slot);
        self.flash_base
            .checked_add(offset)
            .and_then(|base| base.checked_add(self.image_header_size))
            .ok_or(out_of_range(offset, self.image_header_size))
    }

    /// CPU address one past the last byte of `slot`.
    pub fn slot_end(&self, slot: SlotId) -> Result<u32, McuError> {
        let offset = self.slot_offset(slot);
        self.flash_base
            .checked_add(offset)
            .and_then(|base| base.checked_add(self.slot_size))
            .ok_or(out_of_range(offset, self.slot_size))
    }

    /// Checks that every derived offset and address is representable.
    pub fn check(&self) -> Result<(), McuError> {
        self.pong_offset()?;
        self.version_lock_offset()?;
        for slot in SlotId::ALL {
            self.image_base(slot)?;
            self.slot_end(slot)?;
        }
        Ok(())
    }
}

const fn out_of_range(offset: u32, len: u32) -> McuError {
    McuError::Range {
        offset: offset as usize,
        len: len as usize,
    }
}
