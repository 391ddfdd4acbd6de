// Licensed under the Apache-2.0 license

//! In-memory flash devices with NOR semantics for host builds and tests.
//!
//! Erase sets bytes to 0xFF and programming can only clear bits. Both devices
//! can simulate a power cut: once the armed command budget is used up, every
//! further program or erase command fails without touching the array.

use crate::flash::cache::FlashCache;
use crate::flash::hil::{SerialFlashDevice, WordFlashDevice};
use crate::flash::serial::{SERIAL_PAGE_SIZE, SERIAL_SECTOR_SIZE};
use mcu_error::{FlashOp, McuError};
use std::cell::{Cell, RefCell};

pub const SIM_PAGE_SIZE: usize = 0x1000;

#[derive(Default)]
struct PowerBudget(Cell<Option<usize>>);

impl PowerBudget {
    fn consume(&self, op: FlashOp, offset: usize) -> Result<(), McuError> {
        match self.0.get() {
            Some(0) => Err(McuError::Hardware { op, offset }),
            Some(n) => {
                self.0.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Word-programmable flash with 4 KiB pages.
pub struct SimWordFlash {
    mem: RefCell<Vec<u8>>,
    power: PowerBudget,
    rejected_erase: Cell<Option<usize>>,
    programs: Cell<usize>,
    erases: Cell<usize>,
}

impl SimWordFlash {
    pub fn new(size: usize) -> Self {
        Self::from_image(vec![0xff; size])
    }

    /// Wraps an existing flash dump, e.g. the array of a device that "lost
    /// power".
    pub fn from_image(image: Vec<u8>) -> Self {
        SimWordFlash {
            mem: RefCell::new(image),
            power: PowerBudget::default(),
            rejected_erase: Cell::new(None),
            programs: Cell::new(0),
            erases: Cell::new(0),
        }
    }

    pub fn image(&self) -> Vec<u8> {
        self.mem.borrow().clone()
    }

    /// Lets `commands` more program/erase commands succeed, then fails the
    /// rest.
    pub fn cut_power_after(&self, commands: usize) {
        self.power.0.set(Some(commands));
    }

    pub fn restore_power(&self) {
        self.power.0.set(None);
    }

    pub fn reject_erase_at(&self, offset: usize) {
        self.rejected_erase.set(Some(offset));
    }

    pub fn program_count(&self) -> usize {
        self.programs.get()
    }

    pub fn erase_count(&self) -> usize {
        self.erases.get()
    }
}

impl WordFlashDevice for SimWordFlash {
    fn size(&self) -> usize {
        self.mem.borrow().len()
    }

    fn page_size(&self) -> usize {
        SIM_PAGE_SIZE
    }

    fn read_word(&self, offset: usize) -> u32 {
        let mem = self.mem.borrow();
        u32::from_le_bytes([
            mem[offset],
            mem[offset + 1],
            mem[offset + 2],
            mem[offset + 3],
        ])
    }

    fn read_byte(&self, offset: usize) -> u8 {
        self.mem.borrow()[offset]
    }

    fn program_word(&self, offset: usize, word: u32) -> Result<(), McuError> {
        self.power.consume(FlashOp::Program, offset)?;
        let mut mem = self.mem.borrow_mut();
        for (cell, byte) in mem[offset..offset + 4].iter_mut().zip(word.to_le_bytes()) {
            *cell &= byte;
        }
        self.programs.set(self.programs.get() + 1);
        Ok(())
    }

    fn erase_page(&self, offset: usize) -> Result<(), McuError> {
        if self.rejected_erase.get() == Some(offset) {
            return Err(McuError::Hardware {
                op: FlashOp::Erase,
                offset,
            });
        }
        self.power.consume(FlashOp::Erase, offset)?;
        let mut mem = self.mem.borrow_mut();
        let end = (offset + SIM_PAGE_SIZE).min(mem.len());
        mem[offset..end].fill(0xff);
        self.erases.set(self.erases.get() + 1);
        Ok(())
    }
}

/// Serial NOR flash with 256-byte program pages and 4 KiB sectors.
pub struct SimSerialFlash {
    mem: RefCell<Vec<u8>>,
    power: PowerBudget,
    busy_polls: Cell<u32>,
    busy_left: Cell<u32>,
    program_log: RefCell<Vec<(usize, usize)>>,
}

impl SimSerialFlash {
    pub fn new(size: usize) -> Self {
        SimSerialFlash {
            mem: RefCell::new(vec![0xff; size]),
            power: PowerBudget::default(),
            busy_polls: Cell::new(0),
            busy_left: Cell::new(0),
            program_log: RefCell::new(Vec::new()),
        }
    }

    pub fn image(&self) -> Vec<u8> {
        self.mem.borrow().clone()
    }

    /// Number of status polls that report busy after each command.
    pub fn set_busy_polls(&self, polls: u32) {
        self.busy_polls.set(polls);
    }

    pub fn cut_power_after(&self, commands: usize) {
        self.power.0.set(Some(commands));
    }

    /// `(offset, len)` of every page program command issued so far.
    pub fn program_log(&self) -> Vec<(usize, usize)> {
        self.program_log.borrow().clone()
    }
}

impl SerialFlashDevice for SimSerialFlash {
    fn size(&self) -> usize {
        self.mem.borrow().len()
    }

    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<(), McuError> {
        buffer.copy_from_slice(&self.mem.borrow()[offset..offset + buffer.len()]);
        Ok(())
    }

    fn page_program(&self, offset: usize, data: &[u8]) -> Result<(), McuError> {
        if data.is_empty() || offset / SERIAL_PAGE_SIZE != (offset + data.len() - 1) / SERIAL_PAGE_SIZE
        {
            return Err(McuError::InvalidArgument("page program crosses a page"));
        }
        self.power.consume(FlashOp::Program, offset)?;
        let mut mem = self.mem.borrow_mut();
        for (cell, byte) in mem[offset..offset + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        self.program_log.borrow_mut().push((offset, data.len()));
        self.busy_left.set(self.busy_polls.get());
        Ok(())
    }

    fn sector_erase(&self, offset: usize) -> Result<(), McuError> {
        self.power.consume(FlashOp::Erase, offset)?;
        let mut mem = self.mem.borrow_mut();
        let end = (offset + SERIAL_SECTOR_SIZE).min(mem.len());
        mem[offset..end].fill(0xff);
        self.busy_left.set(self.busy_polls.get());
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let left = self.busy_left.get();
        if left == 0 {
            return false;
        }
        if left != u32::MAX {
            self.busy_left.set(left - 1);
        }
        true
    }
}

/// Read cache model that counts how often it was switched off.
pub struct SimCache {
    enabled: Cell<bool>,
    disables: Cell<u32>,
}

impl SimCache {
    pub fn new(enabled: bool) -> Self {
        SimCache {
            enabled: Cell::new(enabled),
            disables: Cell::new(0),
        }
    }

    pub fn disable_count(&self) -> u32 {
        self.disables.get()
    }
}

impl FlashCache for SimCache {
    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        if !enabled {
            self.disables.set(self.disables.get() + 1);
        }
        self.enabled.set(enabled);
    }
}
