// Licensed under the Apache-2.0 license

use alloc::boxed::Box;
use alloc::string::String;

use log::{error, info};

use crate::error::OtaError;
use crate::updater::UpdateReport;

pub const OTA_TASK_NAME: &str = "ota_update";
pub const OTA_TASK_STACK_WORDS: usize = 512;
pub const OTA_TASK_PRIORITY: u8 = 4;

pub type Job = Box<dyn FnOnce()>;

/// Runs work on a task of the host RTOS.
pub trait TaskSpawner {
    fn create_task(
        &self,
        name: &'static str,
        stack_words: usize,
        priority: u8,
        job: Job,
    ) -> Result<(), OtaError>;
}

/// Starts `update` for `image` on its own task and returns immediately. The
/// outcome is only logged.
pub fn spawn_update<F>(spawner: &dyn TaskSpawner, image: &str, update: F) -> Result<(), OtaError>
where
    F: FnOnce(&str) -> Result<UpdateReport, OtaError> + 'static,
{
    let image = String::from(image);
    spawner.create_task(
        OTA_TASK_NAME,
        OTA_TASK_STACK_WORDS,
        OTA_TASK_PRIORITY,
        Box::new(move || match update(&image) {
            Ok(report) => info!("update of {} done: {:?}", image, report),
            Err(e) => error!("update of {} failed: {}", image, e),
        }),
    )
}
