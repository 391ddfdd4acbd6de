/*++

Licensed under the Apache-2.0 license.

File Name:

    boot_select.rs

Abstract:

    Chooses which image slot to boot from the persisted slot status and
    validates the choice before it is handed to the launcher.

--*/

use flash_image::IMAGE_HEADER_SIZE;
use log::{info, warn};
use mcu_config::{FlashLayout, ImageFlags, ImageStatus, SlotId};
use mcu_error::{ErrorKind, FormatError, McuError};

use crate::flash::FlashStorage;
use crate::image_verifier::ImageVerifier;
use crate::status::{RecordCipher, StatusStore, VersionKind};

/// Why a slot was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Nothing recorded for either slot: slot 0 is assumed to hold the
    /// factory image.
    FirstBoot,
    /// The only slot marked newer, with no recorded failure.
    Newer,
    /// Verified and attested on an earlier boot.
    KnownGood,
}

/// Pure selection over the recorded statuses, `None` meaning nothing has
/// been recorded for that slot. A `disqualified` slot is never chosen.
///
/// Image 1 is only ever written by an update running from image 0, so a
/// status for image 1 without one for image 0 selects nothing.
pub fn select_slot(
    statuses: [Option<ImageStatus>; 2],
    disqualified: Option<SlotId>,
) -> Option<(SlotId, Selection)> {
    if is_unpaired(&statuses) {
        return None;
    }
    if disqualified.is_none() && statuses.iter().all(Option::is_none) {
        return Some((SlotId::Slot0, Selection::FirstBoot));
    }
    let status = |slot: SlotId| statuses[slot.index()].unwrap_or(ImageStatus::RESET);
    let eligible = |slot: SlotId| disqualified != Some(slot);

    let mut newer = SlotId::ALL.into_iter().filter(|s| status(*s).is_newer());
    if let (Some(slot), None) = (newer.next(), newer.next()) {
        if eligible(slot) && !status(slot).has_failure() {
            return Some((slot, Selection::Newer));
        }
    }

    SlotId::ALL
        .into_iter()
        .find(|s| eligible(*s) && status(*s).is_known_good())
        .map(|s| (s, Selection::KnownGood))
}

fn is_unpaired(statuses: &[Option<ImageStatus>; 2]) -> bool {
    statuses[0].is_none() && statuses[1].is_some()
}

/// A validated slot ready to be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootTarget {
    pub slot: SlotId,
    pub selection: Selection,
    /// Header version, `None` when header verification is disabled.
    pub version: Option<u32>,
    /// Address of the reset handler from the image's vector table.
    pub entry_point: u32,
}

pub struct BootSelector<'s, 'a, C: RecordCipher> {
    store: &'s StatusStore<'a, C>,
    flash: &'a dyn FlashStorage,
    layout: &'s FlashLayout,
    verifier: &'s dyn ImageVerifier,
}

impl<'s, 'a, C: RecordCipher> BootSelector<'s, 'a, C> {
    pub fn new(
        store: &'s StatusStore<'a, C>,
        flash: &'a dyn FlashStorage,
        layout: &'s FlashLayout,
        verifier: &'s dyn ImageVerifier,
    ) -> Self {
        BootSelector {
            store,
            flash,
            layout,
            verifier,
        }
    }

    /// Selects and validates a slot. A slot that fails validation is marked
    /// failed and selection is retried once without it.
    pub fn select(&self) -> Result<BootTarget, McuError> {
        let mut disqualified = None;
        for _ in 0..2 {
            let statuses = [
                self.store.image_status(SlotId::Slot0)?,
                self.store.image_status(SlotId::Slot1)?,
            ];
            if is_unpaired(&statuses) {
                return Err(FormatError::UnpairedImageStatus.into());
            }
            let (slot, selection) =
                select_slot(statuses, disqualified).ok_or(McuError::NoBootableImage)?;
            info!("selected image {} ({:?})", slot.index(), selection);
            if selection == Selection::FirstBoot {
                self.store
                    .set_image_status(slot, ImageFlags::NEWER_MASK, ImageFlags::NEWER)?;
            }

            match self.validate(slot) {
                Ok((version, entry_point)) => {
                    return Ok(BootTarget {
                        slot,
                        selection,
                        version,
                        entry_point,
                    })
                }
                Err(e) if matches!(e.kind(), ErrorKind::Format | ErrorKind::Stale) => {
                    warn!("image {} rejected: {}", slot.index(), e);
                    self.mark_failed(slot)?;
                    disqualified = Some(slot);
                }
                Err(e) => return Err(e),
            }
        }
        Err(McuError::NoBootableImage)
    }

    fn mark_failed(&self, slot: SlotId) -> Result<(), McuError> {
        match self
            .store
            .set_image_status(slot, ImageFlags::VERIFY_MASK, ImageFlags::VERIFY_FAIL)
        {
            Ok(_) => Ok(()),
            // e.g. an older image has no legal "failed" encoding
            Err(McuError::Format(FormatError::IllegalImageStatus(bits))) => {
                warn!(
                    "image {} failure not recorded ({:#04x} is not a legal status)",
                    slot.index(),
                    bits
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the header version and the entry point of `slot`.
    fn validate(&self, slot: SlotId) -> Result<(Option<u32>, u32), McuError> {
        let slot_offset = self.layout.slot_offset(slot) as usize;

        let version = if self.layout.verification_enabled() {
            let watermark = self.store.version(VersionKind::Image)?;
            let mut raw = [0u8; IMAGE_HEADER_SIZE];
            self.flash.read_uncached(&mut raw, slot_offset)?;
            Some(self.verifier.verify_header(&raw, watermark)?.version())
        } else {
            None
        };

        // second word of the vector table is the reset handler
        let mut vectors = [0u8; 8];
        self.flash.read(
            &mut vectors,
            slot_offset + self.layout.image_header_size as usize,
        )?;
        let entry_point = u32::from_le_bytes([vectors[4], vectors[5], vectors[6], vectors[7]]);
        let start = self.layout.image_base(slot)?;
        let end = self.layout.slot_end(slot)?;
        // thumb entry points carry the low bit
        if !(start..end).contains(&(entry_point & !1)) {
            return Err(FormatError::BadEntryPoint(entry_point).into());
        }
        Ok((version, entry_point))
    }
}
