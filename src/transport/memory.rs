use crate::errors::HTTPError;
use crate::transport::transport::{ConnectionInfo, Transport, TransportEvent};

use std::collections::VecDeque;
use std::time::Duration;

/// What a scripted peer does in answer to bytes written to it.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Data(Vec<u8>),
    Close,
}

/// The far end of a `MemoryTransport`.
pub trait Peer {
    /// A new connection was opened to this peer.
    fn connected(&mut self) {}
    fn received(&mut self, bytes: &[u8]) -> Vec<Reply>;
}

impl<F> Peer for F
where
    F: FnMut(&[u8]) -> Vec<Reply>,
{
    fn received(&mut self, bytes: &[u8]) -> Vec<Reply> {
        self(bytes)
    }
}

/// An in-process transport whose peer is a script. Never blocks: `wait` with nothing to deliver
/// reports a timeout immediately.
pub struct MemoryTransport {
    peer: Box<dyn Peer>,
    info: Option<ConnectionInfo>,
    events: VecDeque<TransportEvent>,
    incoming: VecDeque<Reply>,
    read_pending: bool,
    max_read: usize,
    opens: usize,
    written: Vec<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new<P: Peer + 'static>(peer: P) -> Self {
        Self {
            peer: Box::new(peer),
            info: None,
            events: VecDeque::new(),
            incoming: VecDeque::new(),
            read_pending: false,
            max_read: usize::MAX,
            opens: 0,
            written: Vec::new(),
        }
    }

    /// Delivers at most `max_read` bytes per read.
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    /// How many times the transport was opened.
    pub fn opens(&self) -> usize {
        self.opens
    }

    /// Every buffer written, in order.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), HTTPError> {
        self.opens += 1;
        self.info = Some(ConnectionInfo {
            host: host.to_string(),
            port,
            local_addr: None,
            peer_addr: None,
        });
        self.events.clear();
        self.incoming.clear();
        self.read_pending = false;
        self.peer.connected();
        self.events.push_back(TransportEvent::Connected);
        Ok(())
    }

    fn read(&mut self) -> Result<(), HTTPError> {
        if self.info.is_none() {
            return Err(HTTPError::NotOpen);
        }
        self.read_pending = true;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), HTTPError> {
        if self.info.is_none() {
            return Err(HTTPError::NotOpen);
        }
        self.written.push(buf.to_vec());
        self.events.push_back(TransportEvent::Wrote(buf.len()));
        let replies = self.peer.received(buf);
        self.incoming.extend(replies);
        Ok(())
    }

    fn wait(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>, HTTPError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        if !self.read_pending {
            return Ok(None);
        }
        match self.incoming.pop_front() {
            None => Ok(None),
            Some(Reply::Close) => {
                self.read_pending = false;
                self.info = None;
                self.incoming.clear();
                Ok(Some(TransportEvent::Closed))
            }
            Some(Reply::Data(mut bytes)) => {
                self.read_pending = false;
                if bytes.len() > self.max_read {
                    let rest = bytes.split_off(self.max_read);
                    self.incoming.push_front(Reply::Data(rest));
                }
                Ok(Some(TransportEvent::Read(bytes)))
            }
        }
    }

    fn close(&mut self) -> Result<(), HTTPError> {
        self.info = None;
        self.events.clear();
        self.incoming.clear();
        self.read_pending = false;
        Ok(())
    }

    fn query(&self) -> Option<ConnectionInfo> {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::transport::memory::{MemoryTransport, Reply};
    use crate::transport::transport::{Transport, TransportEvent};

    use std::time::Duration;

    #[test]
    fn replies_are_split_and_delivered_on_read() {
        let mut transport = MemoryTransport::new(|bytes: &[u8]| vec![Reply::Data(bytes.to_vec()), Reply::Close]).with_max_read(3);
        let timeout = Duration::from_millis(1);
        assert!(transport.write(b"x").is_err());

        transport.open("example.com", 80).expect("open failed");
        assert_eq!(transport.wait(timeout).expect("wait failed"), Some(TransportEvent::Connected));
        transport.write(b"hello").expect("write failed");
        assert_eq!(transport.wait(timeout).expect("wait failed"), Some(TransportEvent::Wrote(5)));
        assert_eq!(transport.wait(timeout).expect("wait failed"), None);

        let mut events = Vec::new();
        for _ in 0..3 {
            transport.read().expect("read failed");
            events.push(transport.wait(timeout).expect("wait failed"));
        }
        assert_eq!(
            events,
            vec![
                Some(TransportEvent::Read(b"hel".to_vec())),
                Some(TransportEvent::Read(b"lo".to_vec())),
                Some(TransportEvent::Closed)
            ]
        );
        assert!(!transport.is_open());
        assert_eq!(transport.opens(), 1);
        assert_eq!(transport.written(), &[b"hello".to_vec()]);
    }
}
