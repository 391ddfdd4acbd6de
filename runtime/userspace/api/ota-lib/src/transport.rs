// Licensed under the Apache-2.0 license

use mcu_error::TransportError;

// The updater only needs an ordered byte stream to one server. The network
// stack providing it lives outside this crate.
//
//     OtaUpdater
//         |
//     Transport      (TCP socket, or a mock in tests)
//         |
//     network stack

pub trait Transport {
    /// Opens a connection to `host:port`. `host` is a dotted IPv4 address
    /// or a name the stack can resolve.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Sends all of `data`.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Receives up to `buf.len()` bytes. `Ok(0)` means the peer closed the
    /// connection.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Closes the connection. Always succeeds; closing twice is harmless.
    fn close(&mut self);
}
