// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{build_image, Device};
    use mcu_config::SlotId;
    use mcu_rom_common::MblApi;

    /// Device running 1.0.0 from slot 0 with nothing in slot 1.
    fn first_update() -> Device {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        device
    }

    /// Device running 1.1.0 from slot 1 with the attested 1.0.0 kept in
    /// slot 0 as its rollback target.
    fn second_update() -> Device {
        let device = first_update();
        device.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();
        assert_eq!(device.boot().unwrap().slot, SlotId::Slot1);
        assert_eq!(device.status(SlotId::Slot0), 0x0a);
        device
    }

    /// Cuts power after every possible number of flash commands while
    /// downloading `version` into the idle slot. The next boot must always
    /// start the running image, and a retry after it must go through.
    fn sweep_update(prepare: fn() -> Device, version: (u8, u8, u16)) {
        let reference = prepare();
        let running = reference.api().running_slot().unwrap().unwrap();
        let target = running.other();
        let image = build_image(target, version);
        let before = reference.flash_commands();
        reference.ota(&image).unwrap();
        let total = reference.flash_commands() - before;
        assert!(total > 0);

        for budget in 0..total {
            let device = prepare();
            let watermark = device.watermark();

            device.sim().cut_power_after(budget);
            let result = device.ota(&image);
            device.sim().restore_power();
            assert!(result.is_err(), "budget {budget} completed the update");

            let booted = device
                .boot()
                .unwrap_or_else(|e| panic!("no boot after cut at {budget}: {e}"));
            assert_eq!(booted.slot, running, "budget {budget}");
            assert_eq!(device.watermark(), watermark, "budget {budget}");

            device.ota(&image).unwrap();
            assert_eq!(device.boot().unwrap().slot, target, "budget {budget}");
        }
    }

    #[test]
    fn test_power_loss_during_first_update() {
        sweep_update(first_update, (1, 1, 0));
    }

    #[test]
    fn test_power_loss_during_second_update() {
        sweep_update(second_update, (1, 2, 0));
    }

    /// Cuts power while the bootloader itself records the boot of a freshly
    /// downloaded image.
    #[test]
    fn test_power_loss_during_boot() {
        let reference = Device::new((1, 0, 0));
        reference.boot().unwrap();
        reference.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();
        let before = reference.flash_commands();
        reference.boot().unwrap();
        let total = reference.flash_commands() - before;

        for budget in 0..total {
            let device = Device::new((1, 0, 0));
            device.boot().unwrap();
            device.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();

            device.sim().cut_power_after(budget);
            assert!(device.boot().is_err(), "budget {budget}");
            device.sim().restore_power();

            let target = device.boot().unwrap();
            assert_eq!(target.slot, SlotId::Slot1, "budget {budget}");
            assert_eq!(device.status(SlotId::Slot1), 0x03);
            assert_eq!(device.api().running_slot(), Ok(Some(SlotId::Slot1)));
        }
    }
}
