// Licensed under the Apache-2.0 license

//! Generic interface for flash storage access.

use core::result::Result;
use mcu_error::McuError;

/// Simple interface for reading, writing and erasing arbitrary lengths of
/// data on flash storage. Offsets are relative to the start of the device.
pub trait FlashStorage {
    /// Read from the flash storage, filling the provided buffer with data
    fn read(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError>;

    /// Write the full contents of the buffer, starting at the specified
    /// offset. Bytes outside `[offset, offset + buffer.len())` are preserved.
    fn write(&self, buffer: &[u8], offset: usize) -> Result<(), McuError>;

    /// Erase every erase granule overlapping `[offset, offset + length)`.
    fn erase(&self, offset: usize, length: usize) -> Result<(), McuError>;

    /// Returns the size of the flash storage in bytes.
    fn capacity(&self) -> usize;

    /// Returns the size of the smallest erasable unit in bytes.
    fn erase_granularity(&self) -> usize;

    /// Read with any read cache bypassed, for data that was just programmed.
    fn read_uncached(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError> {
        self.read(buffer, offset)
    }
}

/// Register-level access to memory-mapped internal flash that is programmed
/// one 32-bit word at a time.
pub trait WordFlashDevice {
    fn size(&self) -> usize;

    fn page_size(&self) -> usize;

    /// Reads the aligned word at `offset`.
    fn read_word(&self, offset: usize) -> u32;

    fn read_byte(&self, offset: usize) -> u8;

    /// Programs the aligned word at `offset`.
    fn program_word(&self, offset: usize, word: u32) -> Result<(), McuError>;

    /// Erases the page starting at the page-aligned `offset`.
    fn erase_page(&self, offset: usize) -> Result<(), McuError>;
}

/// Command-level access to a serial (SPI/QSPI) NOR flash.
pub trait SerialFlashDevice {
    fn size(&self) -> usize;

    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<(), McuError>;

    /// Issues a page program command. `data` never crosses a program page.
    fn page_program(&self, offset: usize, data: &[u8]) -> Result<(), McuError>;

    /// Issues a sector erase command for the sector-aligned `offset`.
    fn sector_erase(&self, offset: usize) -> Result<(), McuError>;

    /// True while a program or erase command is still executing.
    fn is_busy(&self) -> bool;
}

/// Rejects empty accesses and accesses reaching past `capacity`.
pub fn check_range(offset: usize, len: usize, capacity: usize) -> Result<(), McuError> {
    match offset.checked_add(len) {
        Some(end) if len != 0 && end <= capacity => Ok(()),
        _ => Err(McuError::Range { offset, len }),
    }
}
