//! The connection: a transport, the channel on it and the HTTP exchange, driven one event at a time.
//!
//! `dispatch` waits for a single transport event and runs everything it causes. Each step is
//! reported to the awake callback, if one is set. `request` loops on `dispatch` for callers that just
//! want the response.

use crate::channel::{Channel, ChannelEvent};
use crate::config::Config;
use crate::errors::HTTPError;
use crate::http::{HttpOutcome, HttpPort, HttpState, Request, Response};
use crate::transport::transport::{ConnectionInfo, Transport, TransportEvent};

use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// What the awake callback is told.
#[derive(Clone, Debug)]
pub enum Event {
    /// The channel is ready; for https, the handshake finished.
    Connected,
    /// Response bytes, as decrypted.
    Read(Vec<u8>),
    Done(Response),
    /// A redirect is being followed to this URL.
    Redirected(Url),
    Error(HTTPError),
    Closed,
}

/// A snapshot of the connection.
#[derive(Clone, Debug)]
pub struct Query {
    pub state: HttpState,
    pub response: Option<Response>,
    pub error: Option<HTTPError>,
    pub connection: Option<ConnectionInfo>,
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

pub struct Connection<T: Transport> {
    config: Config,
    transport: T,
    channel: Option<Channel>,
    http: HttpPort,
    origin: Option<Url>,
    /// Request bytes waiting for the channel to become ready.
    pending: Option<Vec<u8>>,
    awake: Option<Box<dyn FnMut(&Event)>>,
    events: Vec<Event>,
}

impl<T: Transport> Connection<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self {
            http: HttpPort::new(config.clone()),
            config,
            transport,
            channel: None,
            origin: None,
            pending: None,
            awake: None,
            events: Vec::new(),
        }
    }

    /// Sets the callback run for every event.
    pub fn set_awake<F>(&mut self, awake: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.awake = Some(Box::new(awake));
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some() && self.transport.is_open()
    }

    /// Opens a connection to the origin of `url`, closing any current one.
    pub fn open(&mut self, url: &Url) -> Result<(), HTTPError> {
        let channel = match url.scheme() {
            "https" => Channel::tls(&self.config.cipher_suites),
            "http" => Channel::plain(),
            scheme => return Err(HTTPError::InvalidUrl(format!("unsupported scheme {}", scheme))),
        };
        let host = url
            .host_str()
            .ok_or_else(|| HTTPError::InvalidUrl(format!("{} has no host", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HTTPError::InvalidUrl(format!("{} has no port", url)))?;
        if self.channel.is_some() {
            self.close()?;
        }
        info!("opening {}://{}:{}", url.scheme(), host, port);
        self.transport.open(host, port)?;
        self.channel = Some(channel);
        self.origin = Some(url.clone());
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), HTTPError> {
        self.pending = None;
        match self.channel.take() {
            Some(mut channel) => channel.close(&mut self.transport),
            None => self.transport.close(),
        }
    }

    /// Starts `request` on the open connection. It is sent once the channel is ready.
    pub fn write(&mut self, request: Request) -> Result<(), HTTPError> {
        let origin = match (&self.channel, &self.origin) {
            (Some(_), Some(origin)) => origin,
            _ => return Err(HTTPError::NotOpen),
        };
        if !same_origin(origin, &request.url) {
            return Err(HTTPError::InvalidUrl(format!("{} is not on the open connection", request.url)));
        }
        let bytes = self.http.start(request)?;
        self.send(bytes)
    }

    fn send(&mut self, bytes: Vec<u8>) -> Result<(), HTTPError> {
        match self.channel.as_mut() {
            Some(channel) if channel.is_ready() => channel.write(&bytes, &mut self.transport),
            Some(_) => {
                self.pending = Some(bytes);
                Ok(())
            }
            None => Err(HTTPError::NotOpen),
        }
    }

    /// Asks the transport for more bytes.
    pub fn read(&mut self) -> Result<(), HTTPError> {
        self.transport.read()
    }

    pub fn query(&self) -> Query {
        Query {
            state: self.http.state(),
            response: self.http.response().cloned(),
            error: self.http.last_error().cloned(),
            connection: self.transport.query(),
        }
    }

    fn emit(&mut self, event: Event) {
        if let Some(awake) = self.awake.as_mut() {
            awake(&event);
        }
        self.events.push(event);
    }

    /// Waits up to `timeout` for one transport event and handles it, returning the events it
    /// caused, or `None` if nothing happened in time.
    ///
    /// An error ends the exchange and closes the connection before it is returned.
    pub fn dispatch(&mut self, timeout: Duration) -> Result<Option<Vec<Event>>, HTTPError> {
        if self.channel.is_none() {
            return Err(HTTPError::NotOpen);
        }
        self.events.clear();
        let result = match self.transport.wait(timeout) {
            Ok(Some(event)) => self.handle(event).map(|_| Some(std::mem::take(&mut self.events))),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.fail(e.clone());
        }
        result
    }

    fn fail(&mut self, e: HTTPError) {
        error!("connection failed: {}", e);
        self.http.fail(e.clone());
        if let Err(close_error) = self.close() {
            debug!("close after failure: {}", close_error);
        }
        self.emit(Event::Error(e));
    }

    fn handle(&mut self, event: TransportEvent) -> Result<(), HTTPError> {
        let channel = self.channel.as_mut().ok_or(HTTPError::NotOpen)?;
        let events = channel.handle_event(event, &mut self.transport)?;
        for event in events {
            match event {
                ChannelEvent::Connected => {
                    self.emit(Event::Connected);
                    if let Some(bytes) = self.pending.take() {
                        self.send(bytes)?;
                    }
                }
                ChannelEvent::Wrote => {
                    self.http.wrote();
                    self.transport.read()?;
                }
                ChannelEvent::Data(bytes) => {
                    self.emit(Event::Read(bytes.clone()));
                    let outcome = self.http.receive(&bytes)?;
                    self.follow(outcome)?;
                }
                ChannelEvent::Closed => {
                    debug!("channel closed");
                    let outcome = self.http.closed();
                    self.close()?;
                    self.emit(Event::Closed);
                    self.follow(outcome?)?;
                }
            }
        }
        Ok(())
    }

    fn follow(&mut self, outcome: HttpOutcome) -> Result<(), HTTPError> {
        match outcome {
            HttpOutcome::Continue => {
                let reading = matches!(self.http.state(), HttpState::ReadingHeaders | HttpState::ReadingData);
                if reading && self.transport.is_open() {
                    self.transport.read()?;
                }
            }
            HttpOutcome::Done => {
                if let Some(response) = self.http.response().cloned() {
                    self.emit(Event::Done(response));
                }
            }
            HttpOutcome::Redirect(url, bytes) => {
                self.emit(Event::Redirected(url.clone()));
                if !self.is_open() {
                    self.open(&url)?;
                }
                self.send(bytes)?;
            }
        }
        Ok(())
    }

    /// Sends `request` and runs the connection until its response is complete, opening a
    /// connection to its origin first if needed.
    pub fn request(&mut self, request: Request) -> Result<Response, HTTPError> {
        let reusable = self.is_open() && self.origin.as_ref().map_or(false, |origin| same_origin(origin, &request.url));
        if !reusable {
            self.open(&request.url)?;
        }
        self.write(request)?;
        loop {
            match self.http.state() {
                HttpState::Ready => return self.http.response().cloned().ok_or(HTTPError::NotOpen),
                HttpState::Close => {
                    return Err(self.http.last_error().cloned().unwrap_or(HTTPError::ServerClosedConnection))
                }
                _ => {}
            }
            if self.dispatch(self.config.timeout)?.is_none() {
                self.fail(HTTPError::Timeout);
                return Err(HTTPError::Timeout);
            }
        }
    }
}
