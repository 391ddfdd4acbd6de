// Licensed under the Apache-2.0 license

#![allow(dead_code)]

use mcu_config::{FlashLayout, SlotId};
use mcu_error::TransportError;
use mcu_rom_common::flash::sim::SimWordFlash;
use mcu_rom_common::flash::InternalFlash;
use mcu_rom_common::status::SaltedAes128;
use mcu_rom_common::{Mbl, MblApi};
use ota_lib::Transport;
use std::collections::VecDeque;
use std::sync::Once;

pub const FLASH_SIZE: usize = 0xc000;
pub const SLOT_SIZE: usize = 0x4000;
pub const URL: &str = "http://192.168.110.24:8000/ota/";

pub fn layout() -> FlashLayout {
    FlashLayout {
        flash_base: 0x0800_0000,
        status_offset: 0x1000,
        slot_offsets: [0x4000, 0x8000],
        slot_size: SLOT_SIZE as u32,
        image_header_size: 32,
    }
}

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    });
}

pub fn new_flash() -> InternalFlash<'static, SimWordFlash> {
    InternalFlash::new(SimWordFlash::new(FLASH_SIZE))
}

/// Initializes the store and records `running` as the booted slot with a
/// verified status.
pub fn provision<'a>(flash: &'a InternalFlash<'static, SimWordFlash>, running: SlotId) -> Mbl<'a> {
    let mbl = Mbl::new(flash, layout(), SaltedAes128::default()).unwrap();
    mbl.store().check().unwrap();
    mbl.running_slot_set(running).unwrap();
    mbl.image_status_set(
        running,
        mcu_config::ImageFlags::all(),
        mcu_config::ImageFlags::NEWER | mcu_config::ImageFlags::VERIFY_OK,
    )
    .unwrap();
    mbl
}

pub fn image_status(mbl: &Mbl<'_>, slot: SlotId) -> u8 {
    mbl.store()
        .image_status(slot)
        .unwrap()
        .unwrap_or_default()
        .bits()
}

/// Scripted byte stream. Each `recv` hands out at most one queued chunk.
#[derive(Default)]
pub struct MockTransport {
    pub incoming: VecDeque<Result<Vec<u8>, TransportError>>,
    pub sent: Vec<u8>,
    pub connected_to: Option<(String, u16)>,
    pub refuse_connect: bool,
    pub close_count: usize,
}

impl MockTransport {
    pub fn serving(response: &[u8], chunk: usize) -> Self {
        let mut mock = MockTransport::default();
        for piece in response.chunks(chunk) {
            mock.incoming.push_back(Ok(piece.to_vec()));
        }
        mock
    }

    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Connect);
        }
        self.connected_to = Some((host.to_string(), port));
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.connected_to.is_none() {
            return Err(TransportError::Send);
        }
        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.incoming.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.incoming.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) {
        self.close_count += 1;
    }
}

pub fn http_response(status: &str, body: &[u8], with_length: bool) -> Vec<u8> {
    let mut response = format!("HTTP/1.0 {status}\r\nServer: SimpleHTTP/0.6 Python/3.10\r\n");
    if with_length {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("\r\n");
    let mut bytes = response.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}
