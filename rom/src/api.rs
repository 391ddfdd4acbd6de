// Licensed under the Apache-2.0 license

//! Services the bootloader keeps available to the running image.

use core::fmt::Write;

use mcu_config::{ErrorPolicy, FlashLayout, ImageFlags, SlotId, TraceLevel};
use mcu_error::{FormatError, McuError};

use crate::flash::{FlashPartition, FlashStorage};
use crate::status::{Lookup, RecordCipher, SaltedAes128, StatusStore, StatusTag, VersionKind};

/// Status store and flash access exported to runtime code such as the OTA
/// updater.
pub trait MblApi {
    fn status_get(&self, tag: u8, out: &mut [u8]) -> Result<Lookup, McuError>;

    fn status_set(&self, tag: u8, value: &[u8]) -> Result<(), McuError>;

    fn image_status_set(
        &self,
        slot: SlotId,
        mask: ImageFlags,
        flags: ImageFlags,
    ) -> Result<(), McuError>;

    fn running_slot_set(&self, slot: SlotId) -> Result<(), McuError>;

    fn fw_version_set(&self, kind: VersionKind, version: u32) -> Result<(), McuError>;

    fn trace_level_set(&self, level: TraceLevel) -> Result<(), McuError>;

    fn error_policy_set(&self, policy: ErrorPolicy) -> Result<(), McuError>;

    fn trng_seed_set(&self, enabled: bool) -> Result<(), McuError>;

    fn status_show(&self, out: &mut dyn Write) -> Result<(), McuError>;

    fn flash_read(&self, offset: usize, buf: &mut [u8]) -> Result<(), McuError>;

    fn flash_read_uncached(&self, offset: usize, buf: &mut [u8]) -> Result<(), McuError>;

    fn flash_write(&self, offset: usize, data: &[u8]) -> Result<(), McuError>;

    fn flash_erase(&self, offset: usize, len: usize) -> Result<(), McuError>;

    fn flash_capacity(&self) -> usize;

    /// Flash offset and length of `slot`.
    fn slot_extent(&self, slot: SlotId) -> (usize, usize);

    fn running_slot(&self) -> Result<Option<SlotId>, McuError> {
        let mut raw = [0u8; 1];
        match self.status_get(StatusTag::RunningSlot.into(), &mut raw)? {
            Lookup::Found(_) => SlotId::try_from(raw[0])
                .map(Some)
                .map_err(|_| FormatError::InvalidValue(raw[0]).into()),
            Lookup::NotFound => Ok(None),
        }
    }
}

pub struct Mbl<'a, C: RecordCipher = SaltedAes128> {
    store: StatusStore<'a, C>,
    flash: &'a dyn FlashStorage,
    layout: FlashLayout,
}

impl<'a, C: RecordCipher> Mbl<'a, C> {
    pub fn new(flash: &'a dyn FlashStorage, layout: FlashLayout, cipher: C) -> Result<Self, McuError> {
        let store = StatusStore::new(flash, &layout, cipher)?;
        Ok(Mbl {
            store,
            flash,
            layout,
        })
    }

    pub fn store(&self) -> &StatusStore<'a, C> {
        &self.store
    }

    pub fn flash(&self) -> &'a dyn FlashStorage {
        self.flash
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    pub fn slot_partition(&self, slot: SlotId) -> Result<FlashPartition<'a>, McuError> {
        let (offset, len) = self.slot_extent(slot);
        let name = match slot {
            SlotId::Slot0 => "image0",
            SlotId::Slot1 => "image1",
        };
        FlashPartition::new(self.flash, name, offset, len)
    }
}

impl<C: RecordCipher> MblApi for Mbl<'_, C> {
    fn status_get(&self, tag: u8, out: &mut [u8]) -> Result<Lookup, McuError> {
        self.store.get(tag, out)
    }

    fn status_set(&self, tag: u8, value: &[u8]) -> Result<(), McuError> {
        self.store.set(tag, value)
    }

    fn image_status_set(
        &self,
        slot: SlotId,
        mask: ImageFlags,
        flags: ImageFlags,
    ) -> Result<(), McuError> {
        self.store.set_image_status(slot, mask, flags).map(|_| ())
    }

    fn running_slot_set(&self, slot: SlotId) -> Result<(), McuError> {
        self.store.set_running_slot(slot)
    }

    fn fw_version_set(&self, kind: VersionKind, version: u32) -> Result<(), McuError> {
        self.store.set_version(kind, version)
    }

    fn trace_level_set(&self, level: TraceLevel) -> Result<(), McuError> {
        self.store.set_trace_level(level)
    }

    fn error_policy_set(&self, policy: ErrorPolicy) -> Result<(), McuError> {
        self.store.set_error_policy(policy)
    }

    fn trng_seed_set(&self, enabled: bool) -> Result<(), McuError> {
        self.store.set_trng_seed(enabled)
    }

    fn status_show(&self, out: &mut dyn Write) -> Result<(), McuError> {
        self.store.show(out)
    }

    fn flash_read(&self, offset: usize, buf: &mut [u8]) -> Result<(), McuError> {
        self.flash.read(buf, offset)
    }

    fn flash_read_uncached(&self, offset: usize, buf: &mut [u8]) -> Result<(), McuError> {
        self.flash.read_uncached(buf, offset)
    }

    fn flash_write(&self, offset: usize, data: &[u8]) -> Result<(), McuError> {
        self.flash.write(data, offset)
    }

    fn flash_erase(&self, offset: usize, len: usize) -> Result<(), McuError> {
        self.flash.erase(offset, len)
    }

    fn flash_capacity(&self) -> usize {
        self.flash.capacity()
    }

    fn slot_extent(&self, slot: SlotId) -> (usize, usize) {
        (
            self.layout.slot_offset(slot) as usize,
            self.layout.slot_size as usize,
        )
    }
}
