// Licensed under the Apache-2.0 license

#![cfg_attr(target_arch = "riscv32", no_std)]

extern crate alloc;

pub mod error;
pub mod http;
pub mod task;
pub mod transport;
pub mod updater;

pub use error::OtaError;
pub use task::{spawn_update, TaskSpawner};
pub use transport::Transport;
pub use updater::{OtaUpdater, UpdateReport};
