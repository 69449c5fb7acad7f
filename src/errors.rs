use crate::alert::{AlertDescription, AlertLevel};
use crate::fields;
use crate::state::{Direction, ProtocolState};

use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TLSError {
    #[error("illegal {:?} transition {:?} -> {:?}", direction, from, to)]
    ProtocolStateError {
        direction: Direction,
        from: ProtocolState,
        to: ProtocolState,
    },
    #[error("bad record MAC")]
    BadRecordMAC,
    #[error("handshake failure: {}", _0)]
    HandshakeFailure(String),
    #[error("unsupported feature: {}", _0)]
    UnsupportedFeature(&'static str),
    #[error("alert received: {:?} {:?}", level, description)]
    AlertReceived { level: AlertLevel, description: AlertDescription },

    #[error("Cipher not supported: {:x?}", _0)]
    CipherNotSupportedError(fields::Uint16),
    #[error("Unsupported protocol version {}.{}", _0, _1)]
    UnsupportedVersionError(u8, u8),
    #[error("Unspecified ring error")]
    UnspecifiedRingError,
    #[error("Session keys are not established")]
    SessionError,
    #[error("Malformed DER: {}", _0)]
    Asn1Error(&'static str),

    #[error("invalid length")]
    InvalidLengthError,
    #[error("Invalid handshake type.")]
    InvalidHandshakeTypeError,
    #[error("Invalid compression method.")]
    InvalidCompressionMethodError,
    #[error("Invalid content type.")]
    InvalidContentTypeError,
    #[error("{}", _0)]
    TryFromIntError(#[from] std::num::TryFromIntError),
    #[error("system clock is before the unix epoch")]
    SystemTimeError,
}

impl From<std::time::SystemTimeError> for TLSError {
    fn from(_: std::time::SystemTimeError) -> Self {
        TLSError::SystemTimeError
    }
}

impl From<ring::error::Unspecified> for TLSError {
    fn from(_: ring::error::Unspecified) -> Self {
        TLSError::UnspecifiedRingError
    }
}

#[derive(Error, Debug, Clone)]
pub enum HTTPError {
    #[error("{}", _0)]
    Tls(#[from] TLSError),
    #[error("redirect to {} requires a new request", location)]
    RedirectRequiresManualIntervention { location: String },
    #[error("timeout")]
    Timeout,
    #[error("server closed connection")]
    ServerClosedConnection,
    #[error("unsupported feature: {}", _0)]
    UnsupportedFeature(&'static str),
    #[error("not authorized")]
    Unauthorized,
    #[error("server returned {} {}", code, reason)]
    Status { code: u16, reason: String },
    #[error("unsupported status code {}", _0)]
    UnsupportedStatus(u16),
    #[error("unsupported HTTP version {}", _0)]
    UnsupportedVersion(String),
    #[error("gave up after {} redirects", _0)]
    TooManyRedirects(usize),
    #[error("malformed response: {}", _0)]
    MalformedResponse(&'static str),
    #[error("invalid url: {}", _0)]
    InvalidUrl(String),
    #[error("invalid config: {}", _0)]
    InvalidConfig(&'static str),
    #[error("connection is not open")]
    NotOpen,
    #[error("{}", _0)]
    Io(Arc<io::Error>),
}

impl From<io::Error> for HTTPError {
    fn from(e: io::Error) -> Self {
        HTTPError::Io(Arc::new(e))
    }
}

impl From<url::ParseError> for HTTPError {
    fn from(e: url::ParseError) -> Self {
        HTTPError::InvalidUrl(e.to_string())
    }
}
