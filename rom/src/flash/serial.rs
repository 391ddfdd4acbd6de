// Licensed under the Apache-2.0 license

//! Serial NOR flash driven through page program and sector erase commands.
//!
//! A command sequence must not be interleaved with other bus traffic, so each
//! command and its completion poll run inside a critical section.

use crate::flash::cache::{CacheGuard, FlashCache};
use crate::flash::hil::{check_range, FlashStorage, SerialFlashDevice};
use mcu_error::McuError;

pub const SERIAL_PAGE_SIZE: usize = 0x100;
pub const SERIAL_SECTOR_SIZE: usize = 0x1000;
pub const DEFAULT_POLL_BUDGET: u32 = 1_000_000;

pub struct SerialFlash<'a, D: SerialFlashDevice> {
    device: D,
    cache: Option<&'a dyn FlashCache>,
    poll_budget: u32,
}

impl<'a, D: SerialFlashDevice> SerialFlash<'a, D> {
    pub fn new(device: D) -> Self {
        SerialFlash {
            device,
            cache: None,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }

    pub fn with_cache(device: D, cache: &'a dyn FlashCache) -> Self {
        SerialFlash {
            device,
            cache: Some(cache),
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }

    /// Number of busy polls tolerated after a command before giving up.
    pub fn set_poll_budget(&mut self, polls: u32) {
        self.poll_budget = polls;
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    fn wait_ready(&self) -> Result<(), McuError> {
        for _ in 0..self.poll_budget {
            if !self.device.is_busy() {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(McuError::Timeout(self.poll_budget))
    }
}

impl<D: SerialFlashDevice> FlashStorage for SerialFlash<'_, D> {
    fn read(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError> {
        check_range(offset, buffer.len(), self.device.size())?;
        self.wait_ready()?;
        self.device.read(offset, buffer)
    }

    fn write(&self, buffer: &[u8], offset: usize) -> Result<(), McuError> {
        check_range(offset, buffer.len(), self.device.size())?;

        let mut done = 0;
        while done < buffer.len() {
            let addr = offset + done;
            let room = SERIAL_PAGE_SIZE - addr % SERIAL_PAGE_SIZE;
            let chunk = room.min(buffer.len() - done);
            critical_section::with(|_| {
                self.device.page_program(addr, &buffer[done..done + chunk])?;
                self.wait_ready()
            })?;
            done += chunk;
        }
        Ok(())
    }

    fn erase(&self, offset: usize, length: usize) -> Result<(), McuError> {
        check_range(offset, length, self.device.size())?;

        let end = offset + length;
        let mut addr = offset - offset % SERIAL_SECTOR_SIZE;
        while addr < end {
            critical_section::with(|_| {
                self.device.sector_erase(addr)?;
                self.wait_ready()
            })?;
            addr += SERIAL_SECTOR_SIZE;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.device.size()
    }

    fn erase_granularity(&self) -> usize {
        SERIAL_SECTOR_SIZE
    }

    fn read_uncached(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError> {
        let _guard = self.cache.map(CacheGuard::disable);
        self.read(buffer, offset)
    }
}
