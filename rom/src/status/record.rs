/*++

Licensed under the Apache-2.0 license.

File Name:

    record.rs

Abstract:

    On-flash layout of a status record and the ping/pong arbitration rules.

    A record is a 16-byte header followed by tag/length/value items, padded
    with 0xFF to the cipher block size:

        +-----------+---------+-------+----------+-----+-----+-------+-----
        | total_len | counter | magic | checksum | tag | len | value | ...
        +-----------+---------+-------+----------+-----+-----+-------+-----

--*/

use flash_image::checksum_fold;
use mcu_config::STATUS_AREA_SIZE;
use mcu_error::{FormatError, McuError};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::status::crypt::BLOCK_SIZE;

pub const STATUS_MAGIC: u32 = 0x1934_2750;
pub const HEADER_SIZE: usize = core::mem::size_of::<RecordHeader>();
pub const ITEM_HEADER_SIZE: usize = 2;
pub const MAX_VALUE_SIZE: usize = 16;
pub const AREA_SIZE: usize = STATUS_AREA_SIZE as usize;
pub const FILL_BYTE: u8 = 0xff;
/// Tag value that never names an item; it is what erased flash reads as.
pub const INVALID_TAG: u8 = 0xff;
/// Written to the version-lock word once the store has been initialized.
pub const VERSION_LOCK_SET: u32 = 0xcdcd_cdcd;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RecordHeader {
    pub total_len: u32,
    pub counter: u32,
    pub magic: u32,
    pub checksum: u32,
}

impl RecordHeader {
    /// Header of a record with no items.
    pub fn empty() -> Self {
        RecordHeader {
            total_len: HEADER_SIZE as u32,
            counter: 0,
            magic: STATUS_MAGIC,
            checksum: HEADER_SIZE as u32 ^ STATUS_MAGIC,
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        RecordHeader::read_from_prefix(bytes).ok().map(|(h, _)| h)
    }

    pub fn total_len(&self) -> Result<usize, FormatError> {
        let len = self.total_len as usize;
        if (HEADER_SIZE..=AREA_SIZE).contains(&len) {
            Ok(len)
        } else {
            Err(FormatError::BadLength(self.total_len))
        }
    }
}

/// Successor of an activity counter. Values at or above 0xFFFFFFFE wrap to 0
/// so that an erased word is never produced.
pub const fn next_counter(counter: u32) -> u32 {
    if counter >= 0xffff_fffe {
        0
    } else {
        counter + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ping,
    Pong,
}

impl Region {
    pub const fn other(self) -> Region {
        match self {
            Region::Ping => Region::Pong,
            Region::Pong => Region::Ping,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Region::Ping => "ping",
            Region::Pong => "pong",
        }
    }
}

/// Picks the region holding the most recent record given the counters of
/// the regions whose header is intact.
pub fn select_active(ping: Option<u32>, pong: Option<u32>) -> Option<Region> {
    match (ping, pong) {
        (Some(ping), Some(pong)) => {
            // an all-ones counter was never written by us, treat it as zero
            let ping = if ping == u32::MAX { 0 } else { ping };
            let pong = if pong == u32::MAX { 0 } else { pong };
            let ahead = next_counter(pong);
            if ping == ahead || ping == next_counter(ahead) {
                Some(Region::Ping)
            } else {
                Some(Region::Pong)
            }
        }
        (Some(_), None) => Some(Region::Ping),
        (None, Some(_)) => Some(Region::Pong),
        (None, None) => None,
    }
}

pub const fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item<'a> {
    pub tag: u8,
    /// Offset of the value within the record.
    pub offset: usize,
    pub value: &'a [u8],
}

/// Walks the items of a decrypted record. Stops after the first error.
pub struct Items<'a> {
    record: &'a [u8],
    pos: usize,
}

impl<'a> Items<'a> {
    /// `record` must cover exactly `total_len` bytes, header included.
    pub fn new(record: &'a [u8]) -> Self {
        Items {
            record,
            pos: HEADER_SIZE.min(record.len()),
        }
    }

    fn parse_next(&mut self) -> Result<Item<'a>, FormatError> {
        let rest = &self.record[self.pos..];
        let [tag, len, ..] = *rest else {
            return Err(FormatError::TruncatedItems);
        };
        if tag == INVALID_TAG {
            return Err(FormatError::IllegalTag(tag));
        }
        let len = len as usize;
        if len > MAX_VALUE_SIZE {
            return Err(FormatError::OversizedValue(len));
        }
        let offset = self.pos + ITEM_HEADER_SIZE;
        let value = self
            .record
            .get(offset..offset + len)
            .ok_or(FormatError::TruncatedItems)?;
        self.pos = offset + len;
        Ok(Item { tag, offset, value })
    }
}

impl<'a> Iterator for Items<'a> {
    type Item = Result<Item<'a>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.record.len() {
            return None;
        }
        let item = self.parse_next();
        if item.is_err() {
            self.pos = self.record.len();
        }
        Some(item)
    }
}

/// Finds `tag` in a decrypted record.
pub fn find(record: &[u8], tag: u8) -> Result<Option<Item<'_>>, FormatError> {
    for item in Items::new(record) {
        let item = item?;
        if item.tag == tag {
            return Ok(Some(item));
        }
    }
    Ok(None)
}

/// Checks a decrypted record of exactly `total_len` bytes.
pub fn validate(record: &[u8]) -> Result<(), McuError> {
    let header = RecordHeader::parse(record).ok_or(FormatError::BadLength(record.len() as u32))?;
    if header.magic != STATUS_MAGIC {
        return Err(FormatError::BadMagic.into());
    }
    if header.total_len()? != record.len() {
        return Err(FormatError::BadLength(header.total_len).into());
    }
    if checksum_fold(record) != 0 {
        return Err(FormatError::BadChecksum.into());
    }
    for item in Items::new(record) {
        item?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(items: &[(u8, &[u8])]) -> Vec<u8> {
        let mut data = RecordHeader::empty().as_bytes().to_vec();
        for (tag, value) in items {
            data.push(*tag);
            data.push(value.len() as u8);
            data.extend_from_slice(value);
        }
        let mut header = RecordHeader::empty();
        header.total_len = data.len() as u32;
        header.checksum = 0;
        data[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        header.checksum = checksum_fold(&data);
        data[..HEADER_SIZE].copy_from_slice(header.as_bytes());
        data
    }

    #[test]
    fn test_empty_header_folds_to_zero() {
        assert_eq!(checksum_fold(RecordHeader::empty().as_bytes()), 0);
        assert!(validate(RecordHeader::empty().as_bytes()).is_ok());
    }

    #[test]
    fn test_next_counter_wraps_before_erased_value() {
        assert_eq!(next_counter(0), 1);
        assert_eq!(next_counter(0xffff_fffd), 0xffff_fffe);
        assert_eq!(next_counter(0xffff_fffe), 0);
        assert_eq!(next_counter(0xffff_ffff), 0);
    }

    #[test]
    fn test_select_active_pairs() {
        let cases = [
            (0, 0, Region::Pong),
            (1, 0, Region::Ping),
            (2, 0, Region::Ping),
            (3, 0, Region::Pong),
            (0, 1, Region::Pong),
            (0, 0xffff_fffe, Region::Ping),
            (0, 0xffff_fffd, Region::Ping),
            (0xffff_fffe, 0, Region::Pong),
            (0xffff_ffff, 0xffff_fffe, Region::Ping),
            (7, 6, Region::Ping),
            (6, 7, Region::Pong),
        ];
        for (ping, pong, expected) in cases {
            assert_eq!(
                select_active(Some(ping), Some(pong)),
                Some(expected),
                "ping={ping:#x} pong={pong:#x}"
            );
        }
        assert_eq!(select_active(Some(5), None), Some(Region::Ping));
        assert_eq!(select_active(None, Some(5)), Some(Region::Pong));
        assert_eq!(select_active(None, None), None);
    }

    #[test]
    fn test_items_and_find() {
        let data = record(&[(1, &[0]), (12, b"network"), (3, &[0x0b])]);
        validate(&data).unwrap();
        let tags: Vec<u8> = Items::new(&data).map(|i| i.unwrap().tag).collect();
        assert_eq!(tags, [1, 12, 3]);

        let item = find(&data, 12).unwrap().unwrap();
        assert_eq!(item.value, b"network");
        assert_eq!(&data[item.offset..item.offset + 7], b"network");
        assert_eq!(find(&data, 4).unwrap(), None);
    }

    #[test]
    fn test_validate_rejects_corruption() {
        let good = record(&[(2, &[3])]);

        let mut data = good.clone();
        data[HEADER_SIZE + 2] ^= 1;
        assert_eq!(validate(&data), Err(FormatError::BadChecksum.into()));

        let mut data = good.clone();
        data[8] ^= 0xff;
        assert_eq!(validate(&data), Err(FormatError::BadMagic.into()));

        assert_eq!(
            validate(&good[..good.len() - 1]),
            Err(FormatError::BadLength(good.len() as u32).into())
        );
    }

    #[test]
    fn test_items_reject_bad_entries() {
        let data = record(&[(INVALID_TAG, &[1])]);
        assert_eq!(validate(&data), Err(FormatError::IllegalTag(0xff).into()));

        let data = record(&[(5, &[0u8; 17])]);
        assert_eq!(validate(&data), Err(FormatError::OversizedValue(17).into()));

        // length byte runs past the end of the record
        let mut data = record(&[(5, &[1, 2, 3])]);
        data[HEADER_SIZE + 1] = 4;
        let mut items = Items::new(&data);
        assert_eq!(items.next(), Some(Err(FormatError::TruncatedItems)));
        assert_eq!(items.next(), None);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(16), 16);
        assert_eq!(padded_len(17), 32);
        assert_eq!(padded_len(AREA_SIZE), AREA_SIZE);
    }
}
