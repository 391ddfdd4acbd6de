// Licensed under the Apache-2.0 license

pub mod cache;
pub mod flash_partition;
pub mod hil;
pub mod internal;
pub mod serial;
#[cfg(not(target_arch = "riscv32"))]
pub mod sim;

pub use cache::{CacheGuard, FlashCache};
pub use flash_partition::FlashPartition;
pub use hil::{check_range, FlashStorage, SerialFlashDevice, WordFlashDevice};
pub use internal::InternalFlash;
pub use serial::SerialFlash;
