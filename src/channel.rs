//! The byte channel between a transport and HTTP: either the transport itself, or TLS on top of it.

use crate::cipher;
use crate::client::TlsClient;
use crate::errors::HTTPError;
use crate::transport::transport::{Transport, TransportEvent};

use std::collections::VecDeque;
use tracing::debug;

/// An event as HTTP sees it.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Ready for application data; for TLS, once the handshake is done.
    Connected,
    Data(Vec<u8>),
    /// An application write completed.
    Wrote,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Write {
    Protocol,
    Application,
}

pub struct Channel {
    tls: Option<Box<TlsClient>>,
    writes: VecDeque<Write>,
    ready: bool,
}

impl Channel {
    pub fn plain() -> Self {
        Self {
            tls: None,
            writes: VecDeque::new(),
            ready: false,
        }
    }

    pub fn tls(cipher_suites: &[cipher::CipherName]) -> Self {
        Self {
            tls: Some(Box::new(TlsClient::new(cipher_suites))),
            writes: VecDeque::new(),
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn send(&mut self, transport: &mut dyn Transport, bytes: &[u8], kind: Write) -> Result<(), HTTPError> {
        if bytes.is_empty() {
            return Ok(());
        }
        transport.write(bytes)?;
        self.writes.push_back(kind);
        Ok(())
    }

    /// Translates one transport event, doing any TLS work it causes, into what HTTP should see.
    pub fn handle_event(&mut self, event: TransportEvent, transport: &mut dyn Transport) -> Result<Vec<ChannelEvent>, HTTPError> {
        let mut events = Vec::new();
        match event {
            TransportEvent::Connected => match self.tls.as_mut() {
                None => {
                    self.ready = true;
                    events.push(ChannelEvent::Connected);
                }
                Some(tls) => {
                    let hello = tls.connect()?;
                    debug!("sending ClientHello");
                    self.send(transport, &hello, Write::Protocol)?;
                    transport.read()?;
                }
            },
            TransportEvent::Read(bytes) => match self.tls.as_mut() {
                None => events.push(ChannelEvent::Data(bytes)),
                Some(tls) => {
                    let output = tls.handle_input(&bytes)?;
                    self.send(transport, &output.send, Write::Protocol)?;
                    if output.established {
                        self.ready = true;
                        events.push(ChannelEvent::Connected);
                    }
                    if !output.data.is_empty() {
                        events.push(ChannelEvent::Data(output.data));
                    }
                    if output.closed {
                        self.ready = false;
                        events.push(ChannelEvent::Closed);
                    }
                }
            },
            TransportEvent::Wrote(_) => {
                if self.writes.pop_front() == Some(Write::Application) {
                    events.push(ChannelEvent::Wrote);
                }
            }
            TransportEvent::Closed => {
                self.ready = false;
                events.push(ChannelEvent::Closed);
            }
        }
        // Partial records and handshake flights produce nothing upward, so keep reading for them.
        if events.is_empty() && self.tls.is_some() && transport.is_open() {
            transport.read()?;
        }
        Ok(events)
    }

    pub fn write(&mut self, data: &[u8], transport: &mut dyn Transport) -> Result<(), HTTPError> {
        if !self.ready {
            return Err(HTTPError::NotOpen);
        }
        let bytes = match self.tls.as_mut() {
            None => data.to_vec(),
            Some(tls) => tls.write(data)?,
        };
        self.send(transport, &bytes, Write::Application)
    }

    /// Sends close_notify if TLS is up, then closes the transport.
    pub fn close(&mut self, transport: &mut dyn Transport) -> Result<(), HTTPError> {
        if let Some(tls) = self.tls.as_mut() {
            let notify = tls.close();
            if !notify.is_empty() && transport.is_open() {
                if let Err(e) = transport.write(&notify) {
                    debug!("close_notify not sent: {}", e);
                }
            }
        }
        self.ready = false;
        self.writes.clear();
        transport.close()
    }
}
