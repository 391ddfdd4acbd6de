// Licensed under the Apache-2.0 license

//! The minimal HTTP/1.1 subset needed to fetch one image with a GET.

use core::fmt::Write;

use arrayvec::ArrayString;

use crate::error::OtaError;

pub const DEFAULT_PORT: u16 = 80;
pub const MAX_REQUEST_LEN: usize = 1024;
/// One Ethernet frame worth of TCP payload.
pub const RECV_BUFFER_LEN: usize = 1516;

const SCHEME: &str = "http://";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Pieces of a `http://host[:port]/path/` download location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Starts with `/`. The image name is appended to it verbatim.
    pub path: &'a str,
}

impl<'a> DownloadUrl<'a> {
    pub fn parse(url: &'a str) -> Result<Self, OtaError> {
        let rest = url.strip_prefix(SCHEME).ok_or(OtaError::BadUrl)?;
        let slash = rest.find('/').ok_or(OtaError::BadUrl)?;
        let (authority, path) = rest.split_at(slash);
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| OtaError::BadUrl)?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(OtaError::BadUrl);
        }
        Ok(DownloadUrl { host, port, path })
    }
}

pub fn build_request(
    url: &DownloadUrl<'_>,
    image: &str,
) -> Result<ArrayString<MAX_REQUEST_LEN>, OtaError> {
    let mut request = ArrayString::new();
    write!(
        request,
        "GET {}{} HTTP/1.1\r\nHost:{}:{}\r\nConnection: keep-alive\r\n\r\n",
        url.path, image, url.host, url.port
    )
    .map_err(|_| OtaError::RequestTooLong)?;
    Ok(request)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Bytes up to and including the blank line.
    pub header_len: usize,
    pub content_length: Option<usize>,
}

/// Parses the status line and headers at the start of `buf`. Returns
/// `Ok(None)` while the blank line ending the headers has not arrived.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<ResponseHead>, OtaError> {
    let Some(end) = buf.windows(HEADER_END.len()).position(|w| w == HEADER_END) else {
        return Ok(None);
    };
    let header_len = end + HEADER_END.len();
    let head = core::str::from_utf8(&buf[..end]).map_err(|_| OtaError::MalformedResponse)?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().ok_or(OtaError::MalformedResponse)?;
    let mut fields = status_line.split(' ').filter(|f| !f.is_empty());
    let version = fields.next().ok_or(OtaError::MalformedResponse)?;
    if !version.starts_with("HTTP/1.") {
        return Err(OtaError::MalformedResponse);
    }
    let status = fields
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(OtaError::MalformedResponse)?;

    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let len = value
                .trim()
                .parse()
                .map_err(|_| OtaError::MalformedResponse)?;
            content_length = Some(len);
        }
    }

    Ok(Some(ResponseHead {
        status,
        header_len,
        content_length,
    }))
}
