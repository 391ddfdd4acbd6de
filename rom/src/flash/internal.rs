// Licensed under the Apache-2.0 license

//! Internal, memory-mapped flash programmed one word at a time.
//!
//! ```text
//!   offset                                      offset + len
//!     |                                              |
//!  ...|xx|xxxx|xxxx|xxxx|xx..                        |
//!  head word     middle words          tail word
//!  (merged)   (programmed as is)       (merged)
//! ```
//!
//! Partial head and tail words are merged with the bytes already in flash so
//! that nothing outside the requested range changes.

use crate::flash::cache::{CacheGuard, FlashCache};
use crate::flash::hil::{check_range, FlashStorage, WordFlashDevice};
use mcu_error::McuError;

const WORD: usize = core::mem::size_of::<u32>();

pub struct InternalFlash<'a, D: WordFlashDevice> {
    device: D,
    cache: Option<&'a dyn FlashCache>,
}

impl<'a, D: WordFlashDevice> InternalFlash<'a, D> {
    pub fn new(device: D) -> Self {
        InternalFlash {
            device,
            cache: None,
        }
    }

    pub fn with_cache(device: D, cache: &'a dyn FlashCache) -> Self {
        InternalFlash {
            device,
            cache: Some(cache),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: WordFlashDevice> FlashStorage for InternalFlash<'_, D> {
    fn read(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError> {
        check_range(offset, buffer.len(), self.device.size())?;

        let len = buffer.len();
        let mut pos = 0;
        while pos < len && (offset + pos) % WORD != 0 {
            buffer[pos] = self.device.read_byte(offset + pos);
            pos += 1;
        }
        while len - pos >= WORD {
            let word = self.device.read_word(offset + pos);
            buffer[pos..pos + WORD].copy_from_slice(&word.to_le_bytes());
            pos += WORD;
        }
        while pos < len {
            buffer[pos] = self.device.read_byte(offset + pos);
            pos += 1;
        }
        Ok(())
    }

    fn write(&self, buffer: &[u8], offset: usize) -> Result<(), McuError> {
        check_range(offset, buffer.len(), self.device.size())?;

        let end = offset + buffer.len();
        let mut addr = offset - offset % WORD;
        while addr < end {
            let lo = addr.max(offset);
            let hi = (addr + WORD).min(end);
            let mut bytes = if lo == addr && hi == addr + WORD {
                [0u8; WORD]
            } else {
                self.device.read_word(addr).to_le_bytes()
            };
            bytes[lo - addr..hi - addr].copy_from_slice(&buffer[lo - offset..hi - offset]);
            self.device
                .program_word(addr, u32::from_le_bytes(bytes))?;
            addr += WORD;
        }
        Ok(())
    }

    fn erase(&self, offset: usize, length: usize) -> Result<(), McuError> {
        check_range(offset, length, self.device.size())?;

        let page = self.device.page_size();
        let end = offset + length;
        let mut addr = offset - offset % page;
        while addr < end {
            self.device.erase_page(addr)?;
            addr += page;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.device.size()
    }

    fn erase_granularity(&self) -> usize {
        self.device.page_size()
    }

    fn read_uncached(&self, buffer: &mut [u8], offset: usize) -> Result<(), McuError> {
        let _guard = self.cache.map(CacheGuard::disable);
        self.read(buffer, offset)
    }
}
