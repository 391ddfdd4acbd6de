// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test_ota_cycle;
#[cfg(test)]
mod test_power_loss;

#[cfg(test)]
mod test {
    use flash_image::{ImageHeader, IMAGE_TYPE_IMG};
    use mcu_config::{FlashLayout, SlotId};
    use mcu_error::{McuError, TransportError};
    use mcu_rom_common::flash::sim::SimWordFlash;
    use mcu_rom_common::flash::{FlashStorage, InternalFlash};
    use mcu_rom_common::status::SaltedAes128;
    use mcu_rom_common::{
        BootTarget, HeaderVerifier, MainBootloader, Mbl, StatusStore, VersionKind,
    };
    use ota_lib::{OtaError, OtaUpdater, Transport, UpdateReport};
    use std::sync::Once;
    use zerocopy::IntoBytes;

    pub const FLASH_SIZE: usize = 0x2_0000;
    pub const SERVER_URL: &str = "http://10.0.0.2:8000/fw/";
    const PAYLOAD_LEN: usize = 0x200;
    const CHUNK: usize = 700;

    static LOGGER: Once = Once::new();

    pub fn init_logger() {
        LOGGER.call_once(|| {
            let _ = simple_logger::SimpleLogger::new()
                .with_level(log::LevelFilter::Info)
                .init();
        });
    }

    pub fn layout() -> FlashLayout {
        FlashLayout {
            flash_base: 0x0800_0000,
            status_offset: 0x2000,
            slot_offsets: [0x8000, 0x1_4000],
            slot_size: 0xc000,
            image_header_size: 32,
        }
    }

    /// Entry point the images built for `slot` jump to.
    pub fn entry_point(slot: SlotId) -> u32 {
        layout().image_base(slot).unwrap() + 0x41
    }

    /// A headered image linked to run from `slot`.
    pub fn build_image(slot: SlotId, version: (u8, u8, u16)) -> Vec<u8> {
        let mut payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i * 13 + 5) as u8).collect();
        payload[..4].copy_from_slice(&0x2000_4000u32.to_le_bytes());
        payload[4..8].copy_from_slice(&entry_point(slot).to_le_bytes());
        let header = ImageHeader::build(IMAGE_TYPE_IMG, PAYLOAD_LEN as u32, version);
        let mut image = header.as_bytes().to_vec();
        image.extend_from_slice(&payload);
        image
    }

    /// Serves one canned HTTP response in fixed-size pieces.
    pub struct ImageServer {
        response: Vec<u8>,
        cursor: usize,
        pub request: Vec<u8>,
        pub closed: bool,
    }

    impl ImageServer {
        pub fn new(body: &[u8]) -> Self {
            let mut response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(body);
            ImageServer {
                response,
                cursor: 0,
                request: Vec::new(),
                closed: false,
            }
        }
    }

    impl Transport for ImageServer {
        fn connect(&mut self, _host: &str, _port: u16) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.request.extend_from_slice(data);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let rest = &self.response[self.cursor..];
            let n = rest.len().min(buf.len()).min(CHUNK);
            buf[..n].copy_from_slice(&rest[..n]);
            self.cursor += n;
            Ok(n)
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    /// A board with simulated internal flash that can be rebooted and
    /// updated over and over.
    pub struct Device {
        flash: InternalFlash<'static, SimWordFlash>,
    }

    impl Device {
        /// Factory state: slot 0 programmed, status area blank.
        pub fn new(version: (u8, u8, u16)) -> Self {
            init_logger();
            let device = Device {
                flash: InternalFlash::new(SimWordFlash::new(FLASH_SIZE)),
            };
            device.program(SlotId::Slot0, &build_image(SlotId::Slot0, version));
            device
        }

        pub fn sim(&self) -> &SimWordFlash {
            self.flash.device()
        }

        /// Program and erase commands issued so far.
        pub fn flash_commands(&self) -> usize {
            self.sim().program_count() + self.sim().erase_count()
        }

        pub fn program(&self, slot: SlotId, image: &[u8]) {
            let layout = layout();
            let offset = layout.slot_offset(slot) as usize;
            self.flash.erase(offset, layout.slot_size as usize).unwrap();
            self.flash.write(image, offset).unwrap();
        }

        pub fn boot(&self) -> Result<BootTarget, McuError> {
            let verifier = HeaderVerifier::default();
            let mut mbl =
                MainBootloader::new(&self.flash, layout(), SaltedAes128::default(), &verifier)?;
            mbl.boot()
        }

        pub fn api(&self) -> Mbl<'_> {
            Mbl::new(&self.flash, layout(), SaltedAes128::default()).unwrap()
        }

        pub fn store(&self) -> StatusStore<'_> {
            StatusStore::new(&self.flash, &layout(), SaltedAes128::default()).unwrap()
        }

        pub fn status(&self, slot: SlotId) -> u8 {
            self.store()
                .image_status(slot)
                .unwrap()
                .unwrap_or_default()
                .bits()
        }

        pub fn watermark(&self) -> u32 {
            self.store().version(VersionKind::Image).unwrap()
        }

        /// Downloads `image` into the idle slot the way the running
        /// application does.
        pub fn ota(&self, image: &[u8]) -> Result<UpdateReport, OtaError> {
            let api = self.api();
            let mut updater = OtaUpdater::new(&api, ImageServer::new(image), SERVER_URL);
            let result = updater.update("app.img");
            assert!(updater.transport().closed);
            result
        }
    }
}
