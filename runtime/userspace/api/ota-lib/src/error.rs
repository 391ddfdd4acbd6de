// Licensed under the Apache-2.0 license

use mcu_error::{McuError, TransportError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtaError {
    #[error("download url must look like http://host[:port]/path/")]
    BadUrl,
    #[error("running image is not recorded")]
    RunningSlotUnknown,
    #[error("request does not fit the request buffer")]
    RequestTooLong,
    #[error("malformed http response")]
    MalformedResponse,
    #[error("server answered with status {0}")]
    HttpStatus(u16),
    #[error("response has no content length")]
    MissingContentLength,
    #[error("content length {len} does not fit a {slot} byte slot")]
    BadContentLength { len: usize, slot: usize },
    #[error("connection ended after {received} of {expected} bytes")]
    Incomplete { received: usize, expected: usize },
    #[error("could not create the update task")]
    Spawn,
    #[error(transparent)]
    Mcu(#[from] McuError),
}

impl From<TransportError> for OtaError {
    fn from(e: TransportError) -> Self {
        OtaError::Mcu(McuError::Transport(e))
    }
}
