// Licensed under the Apache-2.0 license

//! Error taxonomy shared by the bootloader and runtime crates.
//!
//! Every failure the status store, flash layer, header validator and boot
//! selector can report is an [`McuError`]. "Item not found" is deliberately
//! absent: lookups report it as a normal outcome.

#![cfg_attr(target_arch = "riscv32", no_std)]

use thiserror::Error;

/// Flash command that was rejected by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Read,
    Program,
    Erase,
}

/// Structural problems in persisted records or image headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("bad magic")]
    BadMagic,
    #[error("checksum does not fold to zero")]
    BadChecksum,
    #[error("total length {0:#x} out of bounds")]
    BadLength(u32),
    #[error("illegal item tag {0:#04x}")]
    IllegalTag(u8),
    #[error("item value of {0} bytes exceeds the item size limit")]
    OversizedValue(usize),
    #[error("item list does not end at the record length")]
    TruncatedItems,
    #[error("item {tag:#04x} is {stored} bytes, refusing a {requested} byte replacement")]
    LengthMismatch { tag: u8, stored: u8, requested: u8 },
    #[error("illegal image status bits {0:#04x}")]
    IllegalImageStatus(u8),
    #[error("item {0:#04x} must be written through its dedicated setter")]
    ProtectedItem(u8),
    #[error("invalid value for item {0:#04x}")]
    InvalidValue(u8),
    #[error("status area has no room left")]
    NoSpace,
    #[error("wrong image type {0:#04x}")]
    WrongImageType(u8),
    #[error("unsupported hash algorithm {0}")]
    UnsupportedHash(u8),
    #[error("image version field out of range")]
    VersionOutOfRange,
    #[error("image entry point {0:#010x} lies outside its slot")]
    BadEntryPoint(u32),
    #[error("image 1 has a recorded status but image 0 has none")]
    UnpairedImageStatus,
}

/// Failures of the byte-stream transport used for downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed")]
    Connect,
    #[error("send failed")]
    Send,
    #[error("receive failed")]
    Recv,
    #[error("peer closed the connection")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum McuError {
    #[error("flash range {offset:#x}+{len:#x} is out of bounds")]
    Range { offset: usize, len: usize },
    #[error("flash {op:?} command rejected at {offset:#x}")]
    Hardware { op: FlashOp, offset: usize },
    #[error("flash still busy after {0} polls")]
    Timeout(u32),
    #[error("cipher input of {0} bytes is not block aligned")]
    Crypto(usize),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("image version {image:#010x} is below the watermark {watermark:#010x}")]
    Stale { image: u32, watermark: u32 },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("no image is known to be good")]
    NoBootableImage,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Coarse classification used by callers that only care about the class of
/// failure, e.g. telling a corrupt header from a superseded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Range,
    Hardware,
    Crypto,
    Format,
    Stale,
    Transport,
    Boot,
    Argument,
}

impl McuError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            McuError::Range { .. } => ErrorKind::Range,
            McuError::Hardware { .. } | McuError::Timeout(_) => ErrorKind::Hardware,
            McuError::Crypto(_) => ErrorKind::Crypto,
            McuError::Format(_) => ErrorKind::Format,
            McuError::Stale { .. } => ErrorKind::Stale,
            McuError::Transport(_) => ErrorKind::Transport,
            McuError::NoBootableImage => ErrorKind::Boot,
            McuError::InvalidArgument(_) => ErrorKind::Argument,
        }
    }

    pub const fn is_format(&self) -> bool {
        matches!(self, McuError::Format(_))
    }
}

impl FormatError {
    const fn code(&self) -> u32 {
        match self {
            FormatError::BadMagic => 0x01,
            FormatError::BadChecksum => 0x02,
            FormatError::BadLength(_) => 0x03,
            FormatError::IllegalTag(_) => 0x04,
            FormatError::OversizedValue(_) => 0x05,
            FormatError::TruncatedItems => 0x06,
            FormatError::LengthMismatch { .. } => 0x07,
            FormatError::IllegalImageStatus(_) => 0x08,
            FormatError::ProtectedItem(_) => 0x09,
            FormatError::InvalidValue(_) => 0x0a,
            FormatError::NoSpace => 0x0b,
            FormatError::WrongImageType(_) => 0x0c,
            FormatError::UnsupportedHash(_) => 0x0d,
            FormatError::VersionOutOfRange => 0x0e,
            FormatError::BadEntryPoint(_) => 0x0f,
            FormatError::UnpairedImageStatus => 0x10,
        }
    }
}

impl TransportError {
    const fn code(&self) -> u32 {
        match self {
            TransportError::Connect => 0x01,
            TransportError::Send => 0x02,
            TransportError::Recv => 0x03,
            TransportError::Closed => 0x04,
        }
    }
}

/// Fatal error codes reported to the platform error handler.
impl From<McuError> for u32 {
    fn from(err: McuError) -> u32 {
        match err {
            McuError::Range { .. } => 0xf001_0001,
            McuError::Hardware {
                op: FlashOp::Read, ..
            } => 0xf001_0002,
            McuError::Hardware {
                op: FlashOp::Program,
                ..
            } => 0xf001_0003,
            McuError::Hardware {
                op: FlashOp::Erase, ..
            } => 0xf001_0004,
            McuError::Timeout(_) => 0xf001_0005,
            McuError::Crypto(_) => 0xf002_0001,
            McuError::Format(f) => 0xf003_0000 | f.code(),
            McuError::Stale { .. } => 0xf004_0001,
            McuError::Transport(t) => 0xf005_0000 | t.code(),
            McuError::NoBootableImage => 0xf006_0001,
            McuError::InvalidArgument(_) => 0xf007_0001,
        }
    }
}
