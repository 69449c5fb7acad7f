use crate::errors::HTTPError;
use crate::transport::transport::{ConnectionInfo, Transport, TransportEvent};

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Blocking std sockets behind the event interface: `wait` performs the pending read.
pub struct TcpTransport {
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    info: Option<ConnectionInfo>,
    events: VecDeque<TransportEvent>,
    read_pending: bool,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            stream: None,
            info: None,
            events: VecDeque::new(),
            read_pending: false,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, HTTPError> {
        self.stream.as_mut().ok_or(HTTPError::NotOpen)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<(), HTTPError> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host));
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("connected to {} ({})", host, addr);
                    self.info = Some(ConnectionInfo {
                        host: host.to_string(),
                        port,
                        local_addr: stream.local_addr().ok(),
                        peer_addr: Some(addr),
                    });
                    self.stream = Some(stream);
                    self.events.clear();
                    self.events.push_back(TransportEvent::Connected);
                    self.read_pending = false;
                    return Ok(());
                }
                Err(e) => last_error = e,
            }
        }
        Err(last_error.into())
    }

    fn read(&mut self) -> Result<(), HTTPError> {
        self.stream()?;
        self.read_pending = true;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), HTTPError> {
        self.stream()?.write_all(buf)?;
        self.events.push_back(TransportEvent::Wrote(buf.len()));
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, HTTPError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        if !self.read_pending {
            return Ok(None);
        }
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout))?;
        let mut buf = vec![0; READ_BUFFER_SIZE];
        match stream.read(&mut buf) {
            Ok(0) => {
                self.read_pending = false;
                self.stream = None;
                self.info = None;
                Ok(Some(TransportEvent::Closed))
            }
            Ok(n) => {
                self.read_pending = false;
                buf.truncate(n);
                Ok(Some(TransportEvent::Read(buf)))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<(), HTTPError> {
        self.read_pending = false;
        self.events.clear();
        self.info = None;
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Err(ref e) if e.kind() != io::ErrorKind::NotConnected => debug!("shutdown failed: {}", e),
                _ => {}
            }
        }
        Ok(())
    }

    fn query(&self) -> Option<ConnectionInfo> {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::HTTPError;
    use crate::transport::tcp::TcpTransport;
    use crate::transport::transport::{Transport, TransportEvent};

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn events_arrive_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("local_addr failed").port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept failed");
            let mut buf = [0; 4];
            socket.read_exact(&mut buf).expect("read failed");
            socket.write_all(&buf).expect("write failed");
        });

        let mut transport = TcpTransport::new(TIMEOUT);
        assert_eq!(transport.read().err().map(|e| e.to_string()), Some(HTTPError::NotOpen.to_string()));
        transport.open("127.0.0.1", port).expect("open failed");
        assert_eq!(transport.query().map(|info| info.port), Some(port));
        assert_eq!(transport.wait(TIMEOUT).expect("wait failed"), Some(TransportEvent::Connected));

        transport.write(b"ping").expect("write failed");
        assert_eq!(transport.wait(TIMEOUT).expect("wait failed"), Some(TransportEvent::Wrote(4)));
        // Nothing was asked for, so nothing is read.
        assert_eq!(transport.wait(TIMEOUT).expect("wait failed"), None);

        let mut echoed = Vec::new();
        while echoed.len() < 4 {
            transport.read().expect("read failed");
            match transport.wait(TIMEOUT).expect("wait failed") {
                Some(TransportEvent::Read(bytes)) => echoed.extend(bytes),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(echoed, b"ping".to_vec());

        server.join().expect("server panicked");
        transport.read().expect("read failed");
        assert_eq!(transport.wait(TIMEOUT).expect("wait failed"), Some(TransportEvent::Closed));
        assert!(!transport.is_open());
    }
}
