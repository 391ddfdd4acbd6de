/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    Power-fail safe key/value store for boot state.

    Two flash regions ("ping" and "pong") each hold one encrypted record.
    Every update rewrites the whole record into the region that is not
    active, header block last, so that an interrupted update leaves the
    previous record in force.

--*/

pub mod crypt;
pub mod item;
pub mod record;

pub use crypt::{RecordCipher, SaltedAes128, BLOCK_SIZE, STATUS_KEY_SALT};
pub use item::{StatusItem, StatusTag, VersionKind};
pub use record::{Region, AREA_SIZE, MAX_VALUE_SIZE};

use core::fmt::Write;

use flash_image::checksum_fold;
use log::{debug, info, warn};
use mcu_config::{
    BootContext, ErrorPolicy, FlashLayout, ImageFlags, ImageStatus, SlotId, TraceLevel,
};
use mcu_error::{FlashOp, FormatError, McuError};
use zerocopy::IntoBytes;

use crate::flash::{check_range, FlashStorage};
use record::{
    next_counter, padded_len, select_active, RecordHeader, FILL_BYTE, HEADER_SIZE,
    INVALID_TAG, ITEM_HEADER_SIZE, STATUS_MAGIC, VERSION_LOCK_SET,
};

/// Outcome of a lookup. Absence is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Number of bytes copied into the caller's buffer.
    Found(usize),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

fn sink_error(_: core::fmt::Error) -> McuError {
    McuError::InvalidArgument("output sink rejected write")
}

pub struct StatusStore<'a, C: RecordCipher = SaltedAes128> {
    flash: &'a dyn FlashStorage,
    cipher: C,
    ping: usize,
    pong: usize,
    version_lock: usize,
    verify_writes: bool,
}

impl<'a, C: RecordCipher> StatusStore<'a, C> {
    pub fn new(flash: &'a dyn FlashStorage, layout: &FlashLayout, cipher: C) -> Result<Self, McuError> {
        let version_lock = layout.version_lock_offset()? as usize;
        let ping = layout.ping_offset() as usize;
        let pong = layout.pong_offset()? as usize;
        check_range(version_lock, 4 + 2 * AREA_SIZE, flash.capacity())?;

        // each region must be erasable without touching the other one
        let granule = flash.erase_granularity();
        if granule == 0 || granule > AREA_SIZE || ping % granule != 0 || AREA_SIZE % granule != 0 {
            return Err(McuError::InvalidArgument("status regions not erase aligned"));
        }

        Ok(StatusStore {
            flash,
            cipher,
            ping,
            pong,
            version_lock,
            verify_writes: true,
        })
    }

    /// Enables or disables reading back every committed record.
    pub fn set_verify_writes(&mut self, verify: bool) {
        self.verify_writes = verify;
    }

    pub fn region_offset(&self, region: Region) -> usize {
        match region {
            Region::Ping => self.ping,
            Region::Pong => self.pong,
        }
    }

    /// Decrypts only the header block of `region`. Returns `None` when the
    /// magic does not match.
    fn read_header(&self, region: Region) -> Result<Option<RecordHeader>, McuError> {
        let mut block = [0u8; BLOCK_SIZE];
        self.flash.read_uncached(&mut block, self.region_offset(region))?;
        self.cipher.decrypt(&mut block)?;
        Ok(RecordHeader::parse(&block).filter(|h| h.magic == STATUS_MAGIC))
    }

    /// The region holding the current record and its header.
    pub fn active(&self) -> Result<(Region, RecordHeader), McuError> {
        let ping = self.read_header(Region::Ping)?;
        let pong = self.read_header(Region::Pong)?;
        let region = select_active(ping.map(|h| h.counter), pong.map(|h| h.counter))
            .ok_or(FormatError::BadMagic)?;
        let header = match region {
            Region::Ping => ping,
            Region::Pong => pong,
        }
        .ok_or(FormatError::BadMagic)?;
        Ok((region, header))
    }

    /// Reads, decrypts and validates the active record into `buf`.
    fn load(&self, buf: &mut [u8; AREA_SIZE]) -> Result<(Region, RecordHeader), McuError> {
        let (region, header) = self.active()?;
        let total = header.total_len()?;
        let padded = padded_len(total);
        self.flash
            .read_uncached(&mut buf[..padded], self.region_offset(region))?;
        self.cipher.decrypt(&mut buf[..padded])?;
        record::validate(&buf[..total])?;
        Ok((region, header))
    }

    /// Erases `region` and writes `data` to it. The first block carries the
    /// header and is programmed last.
    fn commit(&self, region: Region, data: &[u8]) -> Result<(), McuError> {
        let base = self.region_offset(region);
        self.flash.erase(base, AREA_SIZE)?;
        if data.len() > BLOCK_SIZE {
            self.flash.write(&data[BLOCK_SIZE..], base + BLOCK_SIZE)?;
        }
        self.flash.write(&data[..BLOCK_SIZE], base)?;

        if self.verify_writes {
            let mut chunk = [0u8; BLOCK_SIZE];
            for (i, expected) in data.chunks(BLOCK_SIZE).enumerate() {
                let offset = base + i * BLOCK_SIZE;
                self.flash.read_uncached(&mut chunk[..expected.len()], offset)?;
                if chunk[..expected.len()] != *expected {
                    warn!("status {} readback mismatch at {:#x}", region.name(), offset);
                    return Err(McuError::Hardware {
                        op: FlashOp::Program,
                        offset,
                    });
                }
            }
        }
        Ok(())
    }

    /// Writes an empty record to both regions.
    pub fn init(&self) -> Result<(), McuError> {
        let mut block = [FILL_BYTE; BLOCK_SIZE];
        block.copy_from_slice(RecordHeader::empty().as_bytes());
        self.cipher.encrypt(&mut block)?;
        self.commit(Region::Ping, &block)?;
        self.commit(Region::Pong, &block)?;
        Ok(())
    }

    /// Startup integrity check. Initializes the store on first boot, which
    /// is recognised by an erased version-lock word.
    pub fn check(&self) -> Result<(), McuError> {
        let mut word = [0u8; 4];
        self.flash.read_uncached(&mut word, self.version_lock)?;
        if u32::from_le_bytes(word) == u32::MAX {
            info!("status store is blank, initializing");
            self.init()?;
            self.set_version(VersionKind::Image, 1)?;
            self.flash
                .write(&VERSION_LOCK_SET.to_le_bytes(), self.version_lock)?;
            return Ok(());
        }
        let mut buf = [FILL_BYTE; AREA_SIZE];
        let (region, header) = self.load(&mut buf)?;
        debug!(
            "status store ok: {} counter {:#x} len {:#x}",
            region.name(),
            header.counter,
            header.total_len
        );
        Ok(())
    }

    /// Copies the value stored under `tag` into `out`, truncating to the
    /// shorter of the two. `out` is zero-filled first.
    pub fn get(&self, tag: impl Into<u8>, out: &mut [u8]) -> Result<Lookup, McuError> {
        let tag = tag.into();
        out.fill(0);
        if tag == INVALID_TAG {
            return Err(FormatError::IllegalTag(tag).into());
        }
        let mut buf = [FILL_BYTE; AREA_SIZE];
        let (_, header) = self.load(&mut buf)?;
        let total = header.total_len()?;
        match record::find(&buf[..total], tag)? {
            Some(item) => {
                let n = item.value.len().min(out.len());
                out[..n].copy_from_slice(&item.value[..n]);
                Ok(Lookup::Found(n))
            }
            None => Ok(Lookup::NotFound),
        }
    }

    /// Like [`Self::get`] for fixed-size values; a stored value of another
    /// length is a format error.
    fn get_exact<const N: usize>(&self, tag: StatusTag) -> Result<Option<[u8; N]>, McuError> {
        let mut value = [0u8; N];
        let mut scratch = [0u8; MAX_VALUE_SIZE];
        match self.get(tag, &mut scratch)? {
            Lookup::Found(n) if n == N => {
                value.copy_from_slice(&scratch[..N]);
                Ok(Some(value))
            }
            Lookup::Found(_) => Err(FormatError::InvalidValue(tag.into()).into()),
            Lookup::NotFound => Ok(None),
        }
    }

    /// Stores an item. Image status and version counters are refused here;
    /// they must go through their validating setters.
    pub fn set(&self, tag: impl Into<u8>, value: &[u8]) -> Result<(), McuError> {
        let tag = tag.into();
        if value.is_empty() {
            return Err(McuError::InvalidArgument("empty status value"));
        }
        if StatusTag::try_from(tag).is_ok_and(StatusTag::is_protected) {
            return Err(FormatError::ProtectedItem(tag).into());
        }
        StatusItem::decode(tag, value)?;
        self.write_item(tag, value)
    }

    fn write_item(&self, tag: u8, value: &[u8]) -> Result<(), McuError> {
        if value.is_empty() {
            return Err(McuError::InvalidArgument("empty status value"));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(FormatError::OversizedValue(value.len()).into());
        }
        if tag == INVALID_TAG {
            return Err(FormatError::IllegalTag(tag).into());
        }

        let mut buf = [FILL_BYTE; AREA_SIZE];
        let (region, header) = self.load(&mut buf)?;
        let total = header.total_len()?;

        let existing = record::find(&buf[..total], tag)?.map(|i| (i.offset, i.value.len()));
        let new_total = match existing {
            Some((offset, len)) if len == value.len() => {
                buf[offset..offset + len].copy_from_slice(value);
                total
            }
            Some((_, len)) => {
                return Err(FormatError::LengthMismatch {
                    tag,
                    stored: len as u8,
                    requested: value.len() as u8,
                }
                .into())
            }
            None => {
                let new_total = total + ITEM_HEADER_SIZE + value.len();
                if new_total > AREA_SIZE {
                    return Err(FormatError::NoSpace.into());
                }
                buf[total] = tag;
                buf[total + 1] = value.len() as u8;
                buf[total + ITEM_HEADER_SIZE..new_total].copy_from_slice(value);
                new_total
            }
        };

        let padded = padded_len(new_total);
        buf[new_total..padded].fill(FILL_BYTE);
        let mut next = RecordHeader {
            total_len: new_total as u32,
            counter: next_counter(header.counter),
            magic: STATUS_MAGIC,
            checksum: 0,
        };
        buf[..HEADER_SIZE].copy_from_slice(next.as_bytes());
        next.checksum = checksum_fold(&buf[..new_total]);
        buf[..HEADER_SIZE].copy_from_slice(next.as_bytes());

        self.cipher.encrypt(&mut buf[..padded])?;
        let target = region.other();
        self.commit(target, &buf[..padded])?;
        debug!(
            "status item {:#04x} written to {} (counter {:#x})",
            tag,
            target.name(),
            next.counter
        );
        Ok(())
    }

    /// Stored status of `slot`, `None` when nothing has been recorded.
    pub fn image_status(&self, slot: SlotId) -> Result<Option<ImageStatus>, McuError> {
        match self.get_exact::<1>(StatusTag::slot_status(slot))? {
            Some([bits]) => Ok(Some(ImageStatus::try_from(bits)?)),
            None => Ok(None),
        }
    }

    /// Replaces the `mask` bits of the slot status with `flags`. The result
    /// must be one of the legal combinations; otherwise nothing is written.
    pub fn set_image_status(
        &self,
        slot: SlotId,
        mask: ImageFlags,
        flags: ImageFlags,
    ) -> Result<ImageStatus, McuError> {
        let current = self.image_status(slot)?.unwrap_or(ImageStatus::RESET);
        let updated = current.apply(mask, flags)?;
        if updated != current {
            self.write_item(StatusTag::slot_status(slot).into(), &[updated.bits()])?;
            info!(
                "image {} status {:#04x} -> {:#04x}",
                slot.index(),
                current.bits(),
                updated.bits()
            );
        }
        Ok(updated)
    }

    pub fn running_slot(&self) -> Result<Option<SlotId>, McuError> {
        match self.get_exact::<1>(StatusTag::RunningSlot)? {
            Some([raw]) => Ok(Some(
                SlotId::try_from(raw).map_err(|_| FormatError::InvalidValue(raw))?,
            )),
            None => Ok(None),
        }
    }

    pub fn set_running_slot(&self, slot: SlotId) -> Result<(), McuError> {
        if self.running_slot()? == Some(slot) {
            return Ok(());
        }
        self.write_item(StatusTag::RunningSlot.into(), &[slot.into()])
    }

    /// Current watermark; 0 when none has been recorded.
    pub fn version(&self, kind: VersionKind) -> Result<u32, McuError> {
        Ok(self
            .get_exact::<4>(kind.tag())?
            .map(u32::from_le_bytes)
            .unwrap_or(0))
    }

    /// Raises a watermark. Values not above the stored one are ignored.
    pub fn set_version(&self, kind: VersionKind, version: u32) -> Result<(), McuError> {
        let current = self.version(kind)?;
        if version <= current {
            return Ok(());
        }
        self.write_item(kind.tag().into(), &version.to_le_bytes())?;
        info!("{:?} version {:#010x} -> {:#010x}", kind, current, version);
        Ok(())
    }

    pub fn set_error_policy(&self, policy: ErrorPolicy) -> Result<(), McuError> {
        self.write_item(StatusTag::ErrorPolicy.into(), &[policy.into()])
    }

    pub fn set_trace_level(&self, level: TraceLevel) -> Result<(), McuError> {
        self.write_item(StatusTag::TraceLevel.into(), &[level.into()])
    }

    pub fn set_trng_seed(&self, enabled: bool) -> Result<(), McuError> {
        self.write_item(StatusTag::TrngSeed.into(), &[enabled as u8])
    }

    /// Settings the bootloader applies before selecting an image. Missing or
    /// unreadable entries fall back to defaults.
    pub fn load_context(&self) -> Result<BootContext, McuError> {
        let mut context = BootContext::default();
        if let Some([raw]) = self.get_exact::<1>(StatusTag::TraceLevel)? {
            match TraceLevel::try_from(raw) {
                Ok(level) => context.trace_level = level,
                Err(_) => warn!("ignoring stored trace level {raw}"),
            }
        }
        if let Some([raw]) = self.get_exact::<1>(StatusTag::ErrorPolicy)? {
            // anything but an explicit re-download request halts
            context.error_policy = if raw == u8::from(ErrorPolicy::Redownload) {
                ErrorPolicy::Redownload
            } else {
                ErrorPolicy::Halt
            };
        }
        Ok(context)
    }

    /// Human-readable listing of the active record.
    pub fn show(&self, out: &mut dyn Write) -> Result<(), McuError> {
        let mut buf = [FILL_BYTE; AREA_SIZE];
        let (region, header) = self.load(&mut buf)?;
        let total = header.total_len()?;
        writeln!(out, "status record ({})", region.name()).map_err(sink_error)?;
        writeln!(
            out,
            "  length {:#x}, counter {:#x}, checksum {:#010x}",
            header.total_len, header.counter, header.checksum
        )
        .map_err(sink_error)?;
        for entry in record::Items::new(&buf[..total]) {
            let entry = entry?;
            let written = match StatusItem::decode(entry.tag, entry.value) {
                Ok(decoded) => writeln!(out, "  {decoded}"),
                Err(e) => writeln!(out, "  item {:#04x}: {e}", entry.tag),
            };
            written.map_err(sink_error)?;
        }
        Ok(())
    }

    /// Hex dump of the decrypted record in `region`, whether or not it is
    /// the active one.
    pub fn dump(&self, region: Region, out: &mut dyn Write) -> Result<(), McuError> {
        let header = self.read_header(region)?.ok_or(FormatError::BadMagic)?;
        let total = header.total_len()?;
        let padded = padded_len(total);
        let mut buf = [FILL_BYTE; AREA_SIZE];
        self.flash
            .read_uncached(&mut buf[..padded], self.region_offset(region))?;
        self.cipher.decrypt(&mut buf[..padded])?;

        writeln!(
            out,
            "{} region at {:#x}, counter {:#x}",
            region.name(),
            self.region_offset(region),
            header.counter
        )
        .map_err(sink_error)?;
        for (i, line) in buf[..total].chunks(16).enumerate() {
            write!(out, "{:04x}:", i * 16).map_err(sink_error)?;
            for b in line {
                write!(out, " {b:02x}").map_err(sink_error)?;
            }
            writeln!(out).map_err(sink_error)?;
        }
        Ok(())
    }
}
