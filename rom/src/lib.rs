/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Common libraries for the main bootloader: flash access, the boot status
    store, image header verification and slot selection.

--*/

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod api;
pub use api::{Mbl, MblApi};
pub mod boot_select;
pub use boot_select::{select_slot, BootSelector, BootTarget, Selection};
pub mod flash;
pub use flash::*;
pub mod image_verifier;
pub use image_verifier::{HeaderVerifier, ImageVerifier};
mod mbl;
pub use mbl::{FatalErrorHandler, ImageLauncher, MainBootloader};
pub mod status;
pub use status::{Lookup, StatusStore, StatusTag, VersionKind};
