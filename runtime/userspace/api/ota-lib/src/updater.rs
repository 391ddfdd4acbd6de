// Licensed under the Apache-2.0 license

use log::{debug, info, warn};
use mcu_config::{ImageFlags, SlotId};
use mcu_error::{McuError, TransportError};
use mcu_rom_common::MblApi;

use crate::error::OtaError;
use crate::http::{build_request, parse_response_head, DownloadUrl, RECV_BUFFER_LEN};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub running: SlotId,
    pub target: SlotId,
    pub length: usize,
}

/// Downloads an image into the slot that is not running and marks it to be
/// tried on the next boot.
pub struct OtaUpdater<'a, T: Transport> {
    mbl: &'a dyn MblApi,
    transport: T,
    url: &'a str,
}

impl<'a, T: Transport> OtaUpdater<'a, T> {
    /// `url` is the directory the image is served from, e.g.
    /// `http://192.168.1.10/`.
    pub fn new(mbl: &'a dyn MblApi, transport: T, url: &'a str) -> Self {
        OtaUpdater {
            mbl,
            transport,
            url,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Flags are only touched once the whole image is in flash. The
    /// connection is closed whatever the outcome.
    pub fn update(&mut self, image: &str) -> Result<UpdateReport, OtaError> {
        let downloaded = self.download(image);
        self.transport.close();
        let report = downloaded.inspect_err(|e| warn!("download of {} failed: {}", image, e))?;

        self.mark_downloaded(report.running)?;
        info!(
            "image {} holds {} new bytes; reboot to apply",
            report.target.index(),
            report.length
        );
        Ok(report)
    }

    fn download(&mut self, image: &str) -> Result<UpdateReport, OtaError> {
        let running = self
            .mbl
            .running_slot()?
            .ok_or(OtaError::RunningSlotUnknown)?;
        let target = running.other();
        let url = DownloadUrl::parse(self.url)?;

        self.transport.connect(url.host, url.port)?;
        let request = build_request(&url, image)?;
        debug!("request: {}", request.trim_end());
        self.transport.send(request.as_bytes())?;

        let mut buf = [0u8; RECV_BUFFER_LEN];
        let mut filled = 0;
        let head = loop {
            if filled == buf.len() {
                return Err(OtaError::MalformedResponse);
            }
            let n = self.transport.recv(&mut buf[filled..])?;
            if n == 0 {
                return Err(TransportError::Closed.into());
            }
            filled += n;
            if let Some(head) = parse_response_head(&buf[..filled])? {
                break head;
            }
        };
        if head.status != 200 {
            return Err(OtaError::HttpStatus(head.status));
        }
        let (slot_offset, slot_len) = self.mbl.slot_extent(target);
        let len = head.content_length.ok_or(OtaError::MissingContentLength)?;
        if len == 0 || len > slot_len {
            return Err(OtaError::BadContentLength {
                len,
                slot: slot_len,
            });
        }

        info!(
            "running image {}, writing {} bytes to image {}",
            running.index(),
            len,
            target.index()
        );
        self.mbl.flash_erase(slot_offset, slot_len)?;

        let first = &buf[head.header_len..filled];
        let first = &first[..first.len().min(len)];
        if !first.is_empty() {
            self.mbl.flash_write(slot_offset, first)?;
        }
        let mut written = first.len();

        while written < len {
            let want = (len - written).min(RECV_BUFFER_LEN);
            let n = self.transport.recv(&mut buf[..want])?;
            if n == 0 {
                return Err(OtaError::Incomplete {
                    received: written,
                    expected: len,
                });
            }
            self.mbl.flash_write(slot_offset + written, &buf[..n])?;
            written += n;
        }

        Ok(UpdateReport {
            running,
            target,
            length: len,
        })
    }

    /// Demotes the running image to a confirmed older one and makes the
    /// downloaded image the only newer slot.
    ///
    /// The target's stale status is cleared before the running slot is
    /// demoted. Otherwise an interruption between the two writes could leave
    /// both slots known-good and the unattested download would win the tie.
    fn mark_downloaded(&self, running: SlotId) -> Result<(), McuError> {
        let target = running.other();
        self.mbl
            .image_status_set(target, ImageFlags::all(), ImageFlags::empty())?;
        self.mbl.image_status_set(
            running,
            ImageFlags::ATTEST_MASK | ImageFlags::NEWER_MASK,
            ImageFlags::ATTEST_OK | ImageFlags::OLDER,
        )?;
        self.mbl
            .image_status_set(target, ImageFlags::NEWER_MASK, ImageFlags::NEWER)
    }
}
