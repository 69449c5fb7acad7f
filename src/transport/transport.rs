use crate::errors::HTTPError;

use std::net::SocketAddr;
use std::time::Duration;

/// Completion of a transport request, delivered by `wait`.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    /// Bytes answering an earlier `read` request.
    Read(Vec<u8>),
    /// A `write` of this many bytes finished.
    Wrote(usize),
    /// The peer closed the connection.
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

/// A byte stream to one host, owned by the connection that opened it.
///
/// Requests (`open`, `read`, `write`) only start work; their completions come back one at a time from
/// `wait`, in the order they happened.
pub trait Transport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), HTTPError>;
    /// Asks for the next bytes. Asking again before they arrive changes nothing.
    fn read(&mut self) -> Result<(), HTTPError>;
    fn write(&mut self, buf: &[u8]) -> Result<(), HTTPError>;
    /// The next event, or `None` if nothing happened within `timeout`.
    fn wait(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, HTTPError>;
    fn close(&mut self) -> Result<(), HTTPError>;
    fn query(&self) -> Option<ConnectionInfo>;

    fn is_open(&self) -> bool {
        self.query().is_some()
    }
}
