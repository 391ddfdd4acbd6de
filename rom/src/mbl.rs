/*++

Licensed under the Apache-2.0 license.

File Name:

    mbl.rs

Abstract:

    Main bootloader flow: check the status store, apply the persisted
    settings, select and validate an image, record the outcome and jump.

--*/

use log::{error, info};
use mcu_config::{BootContext, ErrorPolicy, FlashLayout, ImageFlags};
use mcu_error::McuError;

use crate::api::Mbl;
use crate::boot_select::{BootSelector, BootTarget};
use crate::flash::FlashStorage;
use crate::image_verifier::ImageVerifier;
use crate::status::{RecordCipher, SaltedAes128, VersionKind};

/// Transfers control to a validated image.
pub trait ImageLauncher {
    fn launch(&mut self, target: &BootTarget) -> !;
}

/// Called when no image can be booted. `policy` is the persisted error
/// policy, or the default when the store itself is unreadable.
pub trait FatalErrorHandler {
    fn fatal_error(&mut self, code: u32, policy: ErrorPolicy) -> !;
}

pub struct MainBootloader<'a, C: RecordCipher = SaltedAes128> {
    mbl: Mbl<'a, C>,
    verifier: &'a dyn ImageVerifier,
    context: BootContext,
}

impl<'a, C: RecordCipher> MainBootloader<'a, C> {
    pub fn new(
        flash: &'a dyn FlashStorage,
        layout: FlashLayout,
        cipher: C,
        verifier: &'a dyn ImageVerifier,
    ) -> Result<Self, McuError> {
        Ok(MainBootloader {
            mbl: Mbl::new(flash, layout, cipher)?,
            verifier,
            context: BootContext::default(),
        })
    }

    pub fn context(&self) -> BootContext {
        self.context
    }

    /// Runtime services backed by the same store.
    pub fn api(&self) -> &Mbl<'a, C> {
        &self.mbl
    }

    /// Runs everything up to the jump and returns the image to launch.
    pub fn boot(&mut self) -> Result<BootTarget, McuError> {
        let store = self.mbl.store();
        store.check()?;
        self.context = store.load_context()?;
        log::set_max_level(self.context.trace_level.into());
        info!(
            "boot context: trace {:?}, on error {:?}",
            self.context.trace_level, self.context.error_policy
        );

        let target = BootSelector::new(
            store,
            self.mbl.flash(),
            self.mbl.layout(),
            self.verifier,
        )
        .select()?;

        store.set_image_status(target.slot, ImageFlags::VERIFY_MASK, ImageFlags::VERIFY_OK)?;
        store.set_running_slot(target.slot)?;
        if let Some(version) = target.version {
            store.set_version(VersionKind::Image, version)?;
        }
        info!(
            "booting image {} at {:#010x}",
            target.slot.index(),
            target.entry_point
        );
        Ok(target)
    }

    pub fn run(mut self, launcher: &mut dyn ImageLauncher, handler: &mut dyn FatalErrorHandler) -> ! {
        match self.boot() {
            Ok(target) => launcher.launch(&target),
            Err(e) => {
                error!("boot failed: {}", e);
                handler.fatal_error(e.into(), self.context.error_policy)
            }
        }
    }
}
