// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use crate::test::{build_image, entry_point, Device};
    use flash_image::encode_version;
    use mcu_config::{ImageFlags, SlotId};
    use mcu_error::McuError;
    use mcu_rom_common::{MblApi, Selection};

    #[test]
    fn test_first_boot_then_two_updates() {
        let device = Device::new((1, 0, 0));

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(target.selection, Selection::FirstBoot);
        assert_eq!(target.entry_point, entry_point(SlotId::Slot0));
        assert_eq!(device.status(SlotId::Slot0), 0x03);
        assert_eq!(device.watermark(), encode_version(1, 0, 0));

        // 1.0.0 in slot 0 downloads 1.1.0 into slot 1
        let report = device.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();
        assert_eq!(report.running, SlotId::Slot0);
        assert_eq!(report.target, SlotId::Slot1);
        assert_eq!(device.status(SlotId::Slot0), 0x0a);
        assert_eq!(device.status(SlotId::Slot1), 0x01);

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot1);
        assert_eq!(target.selection, Selection::Newer);
        assert_eq!(target.entry_point, entry_point(SlotId::Slot1));
        assert_eq!(device.status(SlotId::Slot1), 0x03);
        assert_eq!(device.api().running_slot(), Ok(Some(SlotId::Slot1)));
        assert_eq!(device.watermark(), encode_version(1, 1, 0));

        // and back the other way
        device.ota(&build_image(SlotId::Slot0, (1, 2, 0))).unwrap();
        assert_eq!(device.status(SlotId::Slot1), 0x0a);
        assert_eq!(device.status(SlotId::Slot0), 0x01);
        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(device.watermark(), encode_version(1, 2, 0));

        // a plain reboot keeps running the same image
        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
    }

    #[test]
    fn test_attestation_failure_rolls_back() {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        device.ota(&build_image(SlotId::Slot1, (1, 0, 0))).unwrap();
        assert_eq!(device.boot().unwrap().slot, SlotId::Slot1);

        // the new image fails its runtime checks
        device
            .api()
            .image_status_set(SlotId::Slot1, ImageFlags::ATTEST_MASK, ImageFlags::ATTEST_FAIL)
            .unwrap();

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(target.selection, Selection::KnownGood);
        assert_eq!(device.api().running_slot(), Ok(Some(SlotId::Slot0)));
    }

    #[test]
    fn test_rollback_below_watermark_is_refused() {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        device.ota(&build_image(SlotId::Slot1, (2, 0, 0))).unwrap();
        assert_eq!(device.boot().unwrap().slot, SlotId::Slot1);
        device
            .api()
            .image_status_set(SlotId::Slot1, ImageFlags::ATTEST_MASK, ImageFlags::ATTEST_FAIL)
            .unwrap();

        // slot 0 still holds 1.0.0, below the recorded 2.0.0
        assert_eq!(device.boot(), Err(McuError::NoBootableImage));
    }

    #[test]
    fn test_downgrade_download_is_not_booted() {
        let device = Device::new((1, 1, 0));
        device.boot().unwrap();
        device.ota(&build_image(SlotId::Slot1, (1, 0, 5))).unwrap();

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(target.selection, Selection::KnownGood);
        assert_eq!(device.status(SlotId::Slot1), 0x05);
        assert_eq!(device.watermark(), encode_version(1, 1, 0));
    }

    #[test]
    fn test_corrupt_download_falls_back() {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        let mut image = build_image(SlotId::Slot1, (1, 1, 0));
        image[12] ^= 0xff;
        device.ota(&image).unwrap();

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(device.status(SlotId::Slot1), 0x05);

        // a good image can still be installed afterwards
        device.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();
        assert_eq!(device.boot().unwrap().slot, SlotId::Slot1);
    }

    #[test]
    fn test_image_linked_for_wrong_slot_is_rejected() {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        device.ota(&build_image(SlotId::Slot0, (1, 1, 0))).unwrap();

        let target = device.boot().unwrap();
        assert_eq!(target.slot, SlotId::Slot0);
        assert_eq!(device.status(SlotId::Slot1), 0x05);
    }

    #[test]
    fn test_context_survives_updates() {
        let device = Device::new((1, 0, 0));
        device.boot().unwrap();
        device
            .api()
            .trace_level_set(mcu_config::TraceLevel::Debug)
            .unwrap();
        device.ota(&build_image(SlotId::Slot1, (1, 1, 0))).unwrap();
        device.boot().unwrap();

        assert_eq!(
            device.store().load_context().unwrap().trace_level,
            mcu_config::TraceLevel::Debug
        );
    }
}
