//! HTTP/1.1 over a byte channel: request encoding, response parsing and the per-request state
//! machine.
//!
//! Nothing here blocks or reads a socket. Response bytes are handed to `HttpPort::receive` as they
//! arrive, in whatever pieces the transport produced, and parsing resumes where it stopped.

use crate::config::Config;
use crate::errors::HTTPError;

use bytes::BytesMut;
use std::fmt;
use tracing::{debug, info};
use url::Url;

/// Header sections longer than this are rejected rather than buffered.
const MAX_HEADER_LENGTH: usize = 64 * 1024;
const MAX_CHUNK_LINE_LENGTH: usize = 4 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, HTTPError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(HTTPError::InvalidUrl(format!("unsupported scheme {}", scheme))),
        }
        if url.host_str().is_none() {
            return Err(HTTPError::InvalidUrl(format!("{} has no host", url)));
        }
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn get(url: &str) -> Result<Self, HTTPError> {
        Self::new(Method::Get, url)
    }

    pub fn head(url: &str) -> Result<Self, HTTPError> {
        Self::new(Method::Head, url)
    }

    /// Adds a header. A caller header replaces the default of the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) if port != 80 && port != 443 => format!("{}:{}", host, port),
            _ => host.to_string(),
        }
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// The request as it goes on the wire.
    pub fn encode(&self, config: &Config) -> Result<Vec<u8>, HTTPError> {
        if self.headers.iter().any(|(k, v)| [k, v].iter().any(|s| s.contains('\r') || s.contains('\n'))) {
            return Err(HTTPError::InvalidUrl("header contains a line break".to_string()));
        }
        let mut head = format!("{} {} HTTP/1.1\r\n", self.method, self.target());
        let defaults = [
            ("Accept", config.accept.clone()),
            ("Accept-Charset", config.accept_charset.clone()),
            ("Host", self.host_header()),
            ("User-Agent", config.user_agent.clone()),
        ];
        for (name, value) in defaults.iter() {
            if !self.has_header(name) {
                head.push_str(&format!("{}: {}\r\n", name, value));
            }
        }
        for (name, value) in self.headers.iter() {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if let Some(body) = &self.body {
            if !self.has_header("Content-Length") {
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }
        Ok(bytes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StatusClass {
    Informational,
    Ok,
    NoContent,
    Redirect,
    SeeOther,
    NotModified,
    UseProxy,
    Unauthorized,
    ProxyAuthenticationRequired,
    ClientError,
    ServerError,
    Unsupported,
}

pub fn classify(code: u16) -> StatusClass {
    match code {
        100..=199 => StatusClass::Informational,
        204 => StatusClass::NoContent,
        200..=299 => StatusClass::Ok,
        301 | 302 => StatusClass::Redirect,
        303 => StatusClass::SeeOther,
        304 => StatusClass::NotModified,
        305 => StatusClass::UseProxy,
        401 => StatusClass::Unauthorized,
        407 => StatusClass::ProxyAuthenticationRequired,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unsupported,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub url: Url,
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub content_length: Option<usize>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn status_class(&self) -> StatusClass {
        classify(self.status)
    }

    /// The first header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .map(|v| v.split(',').any(|coding| coding.trim().eq_ignore_ascii_case("chunked")))
            .unwrap_or(false)
    }
}

fn find(data: &[u8], needle: &[u8]) -> Option<usize> {
    data.windows(needle.len()).position(|w| w == needle)
}

/// Parses a complete header section, the terminating blank line excluded.
fn parse_head(url: &Url, data: &[u8]) -> Result<Response, HTTPError> {
    let text = std::str::from_utf8(data).map_err(|_| HTTPError::MalformedResponse("header section is not UTF-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HTTPError::UnsupportedVersion(version.to_string()));
    }
    let code = parts.next().unwrap_or_default();
    if code.len() != 3 {
        return Err(HTTPError::MalformedResponse("status code is not three digits"));
    }
    let status = code.parse::<u16>().map_err(|_| HTTPError::MalformedResponse("status code is not three digits"))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or(HTTPError::MalformedResponse("header line without a colon"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut response = Response {
        url: url.clone(),
        version: version.to_string(),
        status,
        reason,
        headers,
        content_length: None,
        last_modified: None,
        body: Vec::new(),
    };
    if let Some(length) = response.header("Content-Length") {
        let length = length
            .parse::<usize>()
            .map_err(|_| HTTPError::MalformedResponse("Content-Length is not a number"))?;
        response.content_length = Some(length);
    }
    response.last_modified = response.header("Last-Modified").map(str::to_string);
    Ok(response)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ChunkState {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
    Done,
}

/// Decodes a chunked body incrementally. Bytes it cannot use yet are left in the buffer.
#[derive(Clone, Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self { state: ChunkState::Size }
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    fn line(buffer: &mut BytesMut) -> Result<Option<BytesMut>, HTTPError> {
        match find(&buffer[..], b"\r\n") {
            Some(end) => {
                let mut line = buffer.split_to(end + 2);
                line.truncate(end);
                Ok(Some(line))
            }
            None if buffer.len() > MAX_CHUNK_LINE_LENGTH => Err(HTTPError::MalformedResponse("chunk line too long")),
            None => Ok(None),
        }
    }

    /// Moves decoded body bytes from `buffer` to `body`. Returns true once the last chunk and its
    /// trailer have been consumed.
    pub fn decode(&mut self, buffer: &mut BytesMut, body: &mut Vec<u8>) -> Result<bool, HTTPError> {
        loop {
            match self.state {
                ChunkState::Size => {
                    let line = match Self::line(buffer)? {
                        Some(line) => line,
                        None => return Ok(false),
                    };
                    let line = std::str::from_utf8(&line).map_err(|_| HTTPError::MalformedResponse("chunk size is not UTF-8"))?;
                    // Chunk extensions are ignored.
                    let size = line.split(';').next().unwrap_or_default().trim();
                    let size = usize::from_str_radix(size, 16).map_err(|_| HTTPError::MalformedResponse("chunk size is not hex"))?;
                    self.state = if size == 0 { ChunkState::Trailer } else { ChunkState::Data(size) };
                }
                ChunkState::Data(remaining) => {
                    if buffer.is_empty() {
                        return Ok(false);
                    }
                    let n = remaining.min(buffer.len());
                    body.extend_from_slice(&buffer.split_to(n));
                    self.state = if n == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(remaining - n)
                    };
                }
                ChunkState::DataEnd => {
                    if buffer.len() < 2 {
                        return Ok(false);
                    }
                    if &buffer[..2] != b"\r\n" {
                        return Err(HTTPError::MalformedResponse("chunk not followed by CRLF"));
                    }
                    let _ = buffer.split_to(2);
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => match Self::line(buffer)? {
                    None => return Ok(false),
                    Some(line) if line.is_empty() => self.state = ChunkState::Done,
                    Some(_) => {}
                },
                ChunkState::Done => return Ok(true),
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HttpState {
    Idle,
    DoingRequest,
    ReadingHeaders,
    ReadingData,
    Ready,
    Close,
}

#[derive(Clone, Debug)]
enum Framing {
    Empty,
    Length(usize),
    Chunked(ChunkedDecoder),
    UntilClose,
}

/// What the connection should do after handing bytes or a close to the port.
#[derive(Clone, Debug, PartialEq)]
pub enum HttpOutcome {
    /// More bytes are needed.
    Continue,
    /// A redirect is being followed: write these bytes, the request for `Url`, on the same host.
    Redirect(Url, Vec<u8>),
    /// The response is complete.
    Done,
}

/// One request/response exchange at a time over an open channel.
pub struct HttpPort {
    config: Config,
    state: HttpState,
    request: Option<Request>,
    response: Option<Response>,
    framing: Framing,
    buffer: BytesMut,
    redirects: usize,
    last_error: Option<HTTPError>,
}

impl HttpPort {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: HttpState::Idle,
            request: None,
            response: None,
            framing: Framing::Empty,
            buffer: BytesMut::new(),
            redirects: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> HttpState {
        self.state
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn last_error(&self) -> Option<&HTTPError> {
        self.last_error.as_ref()
    }

    fn set_state(&mut self, state: HttpState) {
        if self.state != state {
            debug!("http {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Begins a new exchange and returns the bytes to write.
    pub fn start(&mut self, request: Request) -> Result<Vec<u8>, HTTPError> {
        match self.state {
            HttpState::DoingRequest | HttpState::ReadingHeaders | HttpState::ReadingData => {
                return Err(HTTPError::MalformedResponse("a request is already in progress"))
            }
            _ => {}
        }
        self.redirects = 0;
        self.issue(request)
    }

    fn issue(&mut self, request: Request) -> Result<Vec<u8>, HTTPError> {
        let bytes = request.encode(&self.config)?;
        debug!("{} {}", request.method, request.url);
        self.request = Some(request);
        self.response = None;
        self.framing = Framing::Empty;
        self.buffer.clear();
        self.last_error = None;
        self.set_state(HttpState::DoingRequest);
        Ok(bytes)
    }

    /// The request finished writing.
    pub fn wrote(&mut self) {
        if self.state == HttpState::DoingRequest {
            self.set_state(HttpState::ReadingHeaders);
        }
    }

    /// Records a fatal error. The exchange cannot continue.
    pub fn fail(&mut self, error: HTTPError) {
        self.last_error = Some(error);
        self.set_state(HttpState::Close);
    }

    pub fn receive(&mut self, data: &[u8]) -> Result<HttpOutcome, HTTPError> {
        self.buffer.extend_from_slice(data);
        let outcome = self.process();
        if let Err(e) = &outcome {
            self.fail(e.clone());
        }
        outcome
    }

    /// The connection closed under the exchange.
    pub fn closed(&mut self) -> Result<HttpOutcome, HTTPError> {
        let outcome = match (self.state, &self.framing) {
            (HttpState::ReadingData, Framing::UntilClose) => self.complete(),
            (HttpState::DoingRequest, _) | (HttpState::ReadingHeaders, _) | (HttpState::ReadingData, _) => {
                Err(HTTPError::ServerClosedConnection)
            }
            _ => Ok(HttpOutcome::Continue),
        };
        if let Err(e) = &outcome {
            self.fail(e.clone());
        }
        outcome
    }

    fn process(&mut self) -> Result<HttpOutcome, HTTPError> {
        loop {
            match self.state {
                HttpState::DoingRequest | HttpState::ReadingHeaders => {
                    self.set_state(HttpState::ReadingHeaders);
                    let end = match find(&self.buffer[..], b"\r\n\r\n") {
                        Some(end) => end,
                        None if self.buffer.len() > MAX_HEADER_LENGTH => {
                            return Err(HTTPError::MalformedResponse("header section too long"))
                        }
                        None => return Ok(HttpOutcome::Continue),
                    };
                    let head = self.buffer.split_to(end + 4);
                    let request = self.request.as_ref().ok_or(HTTPError::NotOpen)?;
                    let response = parse_head(&request.url, &head[..end])?;
                    debug!("{} {} {}", response.version, response.status, response.reason);
                    if response.status_class() == StatusClass::Informational {
                        continue;
                    }
                    let framing = self.framing_for(request.method, &response)?;
                    self.response = Some(response);
                    self.framing = framing;
                    self.set_state(HttpState::ReadingData);
                }
                HttpState::ReadingData => {
                    let response = self.response.as_mut().ok_or(HTTPError::NotOpen)?;
                    let done = match &mut self.framing {
                        Framing::Empty => true,
                        Framing::Length(length) => {
                            let n = (*length - response.body.len()).min(self.buffer.len());
                            response.body.extend_from_slice(&self.buffer.split_to(n));
                            response.body.len() == *length
                        }
                        Framing::Chunked(decoder) => decoder.decode(&mut self.buffer, &mut response.body)?,
                        Framing::UntilClose => {
                            response.body.extend_from_slice(&self.buffer.split_to(self.buffer.len()));
                            false
                        }
                    };
                    return if done { self.complete() } else { Ok(HttpOutcome::Continue) };
                }
                // Bytes outside an exchange have nothing to belong to.
                HttpState::Idle | HttpState::Ready | HttpState::Close => {
                    if !self.buffer.is_empty() {
                        debug!("discarding {} unexpected bytes", self.buffer.len());
                        self.buffer.clear();
                    }
                    return Ok(HttpOutcome::Continue);
                }
            }
        }
    }

    /// Rejects the statuses that end the exchange in an error and picks how the body is delimited.
    fn framing_for(&self, method: Method, response: &Response) -> Result<Framing, HTTPError> {
        match response.status_class() {
            StatusClass::UseProxy => return Err(HTTPError::UnsupportedFeature("use proxy")),
            StatusClass::ProxyAuthenticationRequired => return Err(HTTPError::UnsupportedFeature("proxy authentication")),
            StatusClass::Unauthorized => return Err(HTTPError::Unauthorized),
            StatusClass::Unsupported => return Err(HTTPError::UnsupportedStatus(response.status)),
            StatusClass::ClientError | StatusClass::ServerError if self.config.fail_on_status => {
                return Err(HTTPError::Status {
                    code: response.status,
                    reason: response.reason.clone(),
                })
            }
            _ => {}
        }
        let class = response.status_class();
        Ok(if method == Method::Head || class == StatusClass::NoContent || class == StatusClass::NotModified {
            Framing::Empty
        } else if response.is_chunked() {
            Framing::Chunked(ChunkedDecoder::new())
        } else if let Some(length) = response.content_length {
            Framing::Length(length)
        } else {
            Framing::UntilClose
        })
    }

    /// The body is complete: either the exchange is over or a redirect is followed.
    fn complete(&mut self) -> Result<HttpOutcome, HTTPError> {
        let (class, location) = match &self.response {
            Some(response) => (response.status_class(), response.header("Location").map(str::to_string)),
            None => return Err(HTTPError::ServerClosedConnection),
        };
        let is_redirect = class == StatusClass::Redirect || class == StatusClass::SeeOther;
        if !is_redirect || !self.config.follow_redirects {
            self.set_state(HttpState::Ready);
            return Ok(HttpOutcome::Done);
        }

        let request = self.request.clone().ok_or(HTTPError::NotOpen)?;
        let location = location.ok_or(HTTPError::MalformedResponse("redirect without Location"))?;
        let target = request.url.join(&location)?;
        let same_origin = target.scheme() == request.url.scheme()
            && target.host_str() == request.url.host_str()
            && target.port_or_known_default() == request.url.port_or_known_default();
        let method_allowed = class == StatusClass::SeeOther || request.method == Method::Get || request.method == Method::Head;
        if !same_origin || !method_allowed {
            return Err(HTTPError::RedirectRequiresManualIntervention {
                location: target.to_string(),
            });
        }

        self.redirects += 1;
        if self.redirects > self.config.max_redirects {
            return Err(HTTPError::TooManyRedirects(self.config.max_redirects));
        }
        info!("following redirect to {}", target);
        let mut next = Request {
            url: target.clone(),
            ..request
        };
        if class == StatusClass::SeeOther {
            next.method = Method::Get;
            next.body = None;
            next.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Content-Length"));
        }
        let redirects = self.redirects;
        let bytes = self.issue(next)?;
        self.redirects = redirects;
        Ok(HttpOutcome::Redirect(target, bytes))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::errors::HTTPError;
    use crate::http::{self, ChunkedDecoder, HttpOutcome, HttpPort, HttpState, Method, Request, StatusClass};

    use bytes::BytesMut;
    use proptest::prelude::*;

    fn port() -> HttpPort {
        HttpPort::new(Config::default())
    }

    fn started(request: Request) -> HttpPort {
        let mut port = port();
        port.start(request).expect("start failed");
        port.wrote();
        port
    }

    fn get(url: &str) -> Request {
        Request::get(url).expect("bad url")
    }

    #[test]
    fn request_has_default_headers() {
        let bytes = get("https://example.com/a/b?c=d").encode(&Config::default()).expect("encode failed");
        let text = String::from_utf8(bytes).expect("not utf-8");
        assert!(text.starts_with("GET /a/b?c=d HTTP/1.1\r\n"));
        assert!(text.contains("\r\nHost: example.com\r\n"));
        assert!(text.contains("\r\nAccept: */*\r\n"));
        assert!(text.contains("\r\nAccept-Charset: utf-8\r\n"));
        assert!(text.contains("\r\nUser-Agent: awake-https/"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn host_keeps_non_default_port() {
        let text = String::from_utf8(get("http://example.com:8080/").encode(&Config::default()).expect("encode failed"))
            .expect("not utf-8");
        assert!(text.contains("\r\nHost: example.com:8080\r\n"));
    }

    #[test]
    fn caller_headers_replace_defaults() {
        let request = Request::new(Method::Post, "http://example.com/submit")
            .expect("bad url")
            .with_header("accept", "text/plain")
            .with_body(b"x=1".to_vec());
        let text = String::from_utf8(request.encode(&Config::default()).expect("encode failed")).expect("not utf-8");
        assert!(!text.contains("Accept: */*"));
        assert!(text.contains("\r\naccept: text/plain\r\n"));
        assert!(text.contains("\r\nContent-Length: 3\r\n\r\nx=1"));
        assert!(get("http://example.com/").with_header("X", "a\r\nb").encode(&Config::default()).is_err());
    }

    #[test]
    fn non_http_urls_are_rejected() {
        assert!(Request::get("ftp://example.com/").is_err());
        assert!(Request::get("not a url").is_err());
    }

    #[test]
    fn status_classes() {
        assert_eq!(http::classify(100), StatusClass::Informational);
        assert_eq!(http::classify(200), StatusClass::Ok);
        assert_eq!(http::classify(204), StatusClass::NoContent);
        assert_eq!(http::classify(302), StatusClass::Redirect);
        assert_eq!(http::classify(303), StatusClass::SeeOther);
        assert_eq!(http::classify(304), StatusClass::NotModified);
        assert_eq!(http::classify(305), StatusClass::UseProxy);
        assert_eq!(http::classify(401), StatusClass::Unauthorized);
        assert_eq!(http::classify(404), StatusClass::ClientError);
        assert_eq!(http::classify(407), StatusClass::ProxyAuthenticationRequired);
        assert_eq!(http::classify(503), StatusClass::ServerError);
        assert_eq!(http::classify(600), StatusClass::Unsupported);
    }

    #[test]
    fn content_length_body() {
        let mut port = started(get("http://example.com/"));
        let outcome = port
            .receive(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nLast-Modified: Tue, 15 Nov 1994 12:45:26 GMT\r\n\r\nhel")
            .expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Continue);
        assert_eq!(port.state(), HttpState::ReadingData);
        assert_eq!(port.receive(b"lo").expect("receive failed"), HttpOutcome::Done);
        let response = port.response().expect("no response");
        assert_eq!(response.body, b"hello".to_vec());
        assert_eq!(response.last_modified.as_deref(), Some("Tue, 15 Nov 1994 12:45:26 GMT"));
        assert_eq!(port.state(), HttpState::Ready);
    }

    #[test]
    fn informational_responses_are_skipped() {
        let mut port = started(get("http://example.com/"));
        let outcome = port
            .receive(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Done);
        assert_eq!(port.response().map(|r| r.status), Some(200));
    }

    #[test]
    fn head_response_has_no_body() {
        let mut port = started(Request::head("http://example.com/").expect("bad url"));
        let outcome = port.receive(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n").expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Done);
        assert_eq!(port.state(), HttpState::Ready);
        assert!(port.response().expect("no response").body.is_empty());
    }

    #[test]
    fn no_content_and_not_modified_have_no_body() {
        for status in [&b"204 No Content"[..], &b"304 Not Modified"[..]].iter() {
            let mut port = started(get("http://example.com/"));
            let head = [&b"HTTP/1.1 "[..], *status, &b"\r\n\r\n"[..]].concat();
            assert_eq!(port.receive(&head).expect("receive failed"), HttpOutcome::Done);
        }
    }

    #[test]
    fn empty_chunked_body() {
        let mut port = started(get("http://example.com/"));
        let outcome = port
            .receive(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n")
            .expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Done);
        assert_eq!(port.state(), HttpState::Ready);
        assert!(port.response().expect("no response").body.is_empty());
    }

    #[test]
    fn chunk_extensions_and_trailers_are_ignored() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"4;name=value\r\nWiki\r\n5\r\npedia\r\n0\r\nExpires: never\r\n\r\nrest"[..]);
        let mut body = Vec::new();
        assert!(decoder.decode(&mut buffer, &mut body).expect("decode failed"));
        assert!(decoder.is_done());
        assert_eq!(body, b"Wikipedia".to_vec());
        assert_eq!(&buffer[..], b"rest");
    }

    #[test]
    fn malformed_chunk_size_fails() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"zz\r\n"[..]);
        assert!(decoder.decode(&mut buffer, &mut Vec::new()).is_err());
    }

    #[test]
    fn close_semantics() {
        // Before the request finished writing.
        let mut port = port();
        port.start(get("http://example.com/")).expect("start failed");
        assert!(matches!(port.closed(), Err(HTTPError::ServerClosedConnection)));
        assert_eq!(port.state(), HttpState::Close);

        // Mid headers.
        let mut port = started(get("http://example.com/"));
        port.receive(b"HTTP/1.1 200 OK\r\n").expect("receive failed");
        assert!(matches!(port.closed(), Err(HTTPError::ServerClosedConnection)));
        assert_eq!(port.state(), HttpState::Close);

        // Mid body of known length.
        let mut port = started(get("http://example.com/"));
        port.receive(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").expect("receive failed");
        assert!(matches!(port.closed(), Err(HTTPError::ServerClosedConnection)));

        // Body delimited by the close itself.
        let mut port = started(get("http://example.com/"));
        port.receive(b"HTTP/1.0 200 OK\r\n\r\nabc").expect("receive failed");
        assert_eq!(port.closed().expect("close failed"), HttpOutcome::Done);
        assert_eq!(port.response().expect("no response").body, b"abc".to_vec());
        assert_eq!(port.state(), HttpState::Ready);
    }

    #[test]
    fn error_statuses() {
        let mut port = started(get("http://example.com/"));
        match port.receive(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n") {
            Err(HTTPError::Status { code: 404, reason }) => assert_eq!(reason, "Not Found"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(port.state(), HttpState::Close);
        assert!(port.last_error().is_some());

        let mut port = started(get("http://example.com/"));
        assert!(matches!(port.receive(b"HTTP/1.1 401 Unauthorized\r\n\r\n"), Err(HTTPError::Unauthorized)));
        let mut port = started(get("http://example.com/"));
        assert!(matches!(
            port.receive(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n"),
            Err(HTTPError::UnsupportedFeature("proxy authentication"))
        ));
        let mut port = started(get("http://example.com/"));
        assert!(matches!(port.receive(b"HTTP/2 200 OK\r\n\r\n"), Err(HTTPError::UnsupportedVersion(_))));
    }

    #[test]
    fn error_status_can_be_a_response() {
        let config = Config::builder().with_fail_on_status(false).build().expect("build failed");
        let mut port = HttpPort::new(config);
        port.start(get("http://example.com/")).expect("start failed");
        let outcome = port
            .receive(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\noops")
            .expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Done);
        assert_eq!(port.response().map(|r| r.status), Some(500));
    }

    #[test]
    fn same_origin_redirect_is_reissued() {
        let mut port = started(get("http://example.com/old"));
        let outcome = port
            .receive(b"HTTP/1.1 302 Found\r\nLocation: /new\r\nContent-Length: 3\r\n\r\nbye")
            .expect("receive failed");
        match outcome {
            HttpOutcome::Redirect(url, bytes) => {
                assert_eq!(url.as_str(), "http://example.com/new");
                assert!(bytes.starts_with(b"GET /new HTTP/1.1\r\n"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(port.state(), HttpState::DoingRequest);
    }

    #[test]
    fn see_other_becomes_get() {
        let mut port = started(
            Request::new(Method::Post, "http://example.com/form")
                .expect("bad url")
                .with_body(b"a=b".to_vec()),
        );
        match port.receive(b"HTTP/1.1 303 See Other\r\nLocation: http://example.com/done\r\nContent-Length: 0\r\n\r\n") {
            Ok(HttpOutcome::Redirect(_, bytes)) => {
                let text = String::from_utf8(bytes).expect("not utf-8");
                assert!(text.starts_with("GET /done HTTP/1.1\r\n"));
                assert!(!text.contains("Content-Length"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn redirects_needing_the_caller() {
        // Another host.
        let mut port = started(get("http://example.com/"));
        match port.receive(b"HTTP/1.1 301 Moved\r\nLocation: http://other.example/\r\nContent-Length: 0\r\n\r\n") {
            Err(HTTPError::RedirectRequiresManualIntervention { location }) => assert_eq!(location, "http://other.example/"),
            other => panic!("unexpected {:?}", other),
        }
        // Another port on the same host.
        let mut port = started(get("http://example.com/"));
        assert!(port
            .receive(b"HTTP/1.1 302 Found\r\nLocation: http://example.com:81/\r\nContent-Length: 0\r\n\r\n")
            .is_err());
        // A POST answered with 302.
        let mut port = started(Request::new(Method::Post, "http://example.com/").expect("bad url"));
        assert!(port
            .receive(b"HTTP/1.1 302 Found\r\nLocation: /x\r\nContent-Length: 0\r\n\r\n")
            .is_err());
    }

    #[test]
    fn redirect_loop_is_bounded() {
        let config = Config::builder().with_max_redirects(2).build().expect("build failed");
        let mut port = HttpPort::new(config);
        port.start(get("http://example.com/loop")).expect("start failed");
        let redirect = b"HTTP/1.1 302 Found\r\nLocation: /loop\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(port.receive(redirect), Ok(HttpOutcome::Redirect(..))));
        assert!(matches!(port.receive(redirect), Ok(HttpOutcome::Redirect(..))));
        assert!(matches!(port.receive(redirect), Err(HTTPError::TooManyRedirects(2))));
    }

    #[test]
    fn redirect_not_followed_when_disabled() {
        let config = Config::builder().with_follow_redirects(false).build().expect("build failed");
        let mut port = HttpPort::new(config);
        port.start(get("http://example.com/")).expect("start failed");
        let outcome = port
            .receive(b"HTTP/1.1 302 Found\r\nLocation: /x\r\nContent-Length: 0\r\n\r\n")
            .expect("receive failed");
        assert_eq!(outcome, HttpOutcome::Done);
        assert_eq!(port.response().and_then(|r| r.header("location")), Some("/x"));
    }

    const CHUNKED: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nX-Test: yes\r\n\r\n\
        1a\r\nabcdefghijklmnopqrstuvwxyz\r\n3;ext=1\r\n123\r\n10\r\n0123456789abcdef\r\n0\r\nTrailer: x\r\n\r\n";

    proptest! {
        #[test]
        fn chunked_decoding_is_resumable(cuts in proptest::collection::btree_set(1usize..CHUNKED.len(), 0..20)) {
            let mut whole = started(get("http://example.com/"));
            prop_assert_eq!(whole.receive(CHUNKED).expect("receive failed"), HttpOutcome::Done);

            let mut split = started(get("http://example.com/"));
            let mut start = 0;
            let mut outcome = HttpOutcome::Continue;
            for end in cuts.iter().cloned().chain(std::iter::once(CHUNKED.len())) {
                prop_assert_eq!(outcome.clone(), HttpOutcome::Continue);
                outcome = split.receive(&CHUNKED[start..end]).expect("receive failed");
                start = end;
            }
            prop_assert_eq!(outcome, HttpOutcome::Done);
            prop_assert_eq!(split.response(), whole.response());
            prop_assert_eq!(
                split.response().map(|r| r.body.clone()),
                Some(b"abcdefghijklmnopqrstuvwxyz1230123456789abcdef".to_vec())
            );
        }
    }
}
