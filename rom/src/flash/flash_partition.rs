// Licensed under the Apache-2.0 license

use crate::flash::hil::FlashStorage;
use mcu_error::McuError;

/// Represents a partition within the flash memory.
///
/// A `FlashPartition` provides a view into a contiguous region of the
/// underlying flash, such as one firmware image slot. All operations are
/// checked to ensure they do not exceed the partition's boundaries and
/// offsets are relative to the start of the partition.
pub struct FlashPartition<'a> {
    driver: &'a dyn FlashStorage,
    name: &'static str,
    base_offset: usize,
    length: usize,
}

impl<'a> FlashPartition<'a> {
    /// Creates a new `FlashPartition`.
    ///
    /// Returns `McuError::Range` if the partition does not fit in the flash.
    pub fn new(
        driver: &'a dyn FlashStorage,
        name: &'static str,
        base_offset: usize,
        length: usize,
    ) -> Result<Self, McuError> {
        match base_offset.checked_add(length) {
            Some(end) if end <= driver.capacity() => Ok(FlashPartition {
                driver,
                name,
                base_offset,
                length,
            }),
            _ => Err(McuError::Range {
                offset: base_offset,
                len: length,
            }),
        }
    }

    fn check(&self, partition_offset: usize, len: usize) -> Result<usize, McuError> {
        match partition_offset.checked_add(len) {
            Some(end) if end <= self.length => Ok(self.base_offset + partition_offset),
            _ => Err(McuError::Range {
                offset: self.base_offset.saturating_add(partition_offset),
                len,
            }),
        }
    }

    /// Reads data from the partition into `buf`, starting at `partition_offset`.
    pub fn read(&self, partition_offset: usize, buf: &mut [u8]) -> Result<(), McuError> {
        let offset = self.check(partition_offset, buf.len())?;
        self.driver.read(buf, offset)
    }

    /// Like [`FlashPartition::read`] but bypasses the flash read cache.
    pub fn read_uncached(&self, partition_offset: usize, buf: &mut [u8]) -> Result<(), McuError> {
        let offset = self.check(partition_offset, buf.len())?;
        self.driver.read_uncached(buf, offset)
    }

    /// Writes `buf` to the partition, starting at `partition_offset`.
    pub fn write(&self, partition_offset: usize, buf: &[u8]) -> Result<(), McuError> {
        let offset = self.check(partition_offset, buf.len())?;
        self.driver.write(buf, offset)
    }

    /// Erases `len` bytes of the partition, starting at `partition_offset`.
    ///
    /// The erase is rounded out to whole erase granules by the driver, so
    /// the partition should be granule aligned.
    pub fn erase(&self, partition_offset: usize, len: usize) -> Result<(), McuError> {
        let offset = self.check(partition_offset, len)?;
        self.driver.erase(offset, len)
    }

    /// Erases the whole partition.
    pub fn erase_all(&self) -> Result<(), McuError> {
        self.erase(0, self.length)
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base_offset(&self) -> usize {
        self.base_offset
    }
}
