//!# awake-https
//! An HTTP/1.1 client over TLS 1.0, driven by events.
//!
//! A `Connection` owns a `Transport`, the TLS session (for https URLs) and the HTTP exchange.
//! `Connection::dispatch` handles one transport event at a time and reports progress to an
//! optional awake callback. `Connection::request` does the same in a loop until the response is
//! complete.
//!
//! The TLS implementation uses ring, RustCrypto and rsa. It offers RSA and DHE key exchange with
//! AES-CBC or RC4, and does not validate server certificates.
//!

#[macro_use]
extern crate enum_primitive_derive;
extern crate num_traits;

mod alert;
mod asn1;
mod bulk;
mod change_cipher_spec;
mod channel;
mod cipher;
mod client;
mod config;
mod crypto;
mod errors;
mod fields;
mod handshake;
mod handshaker;
mod http;
mod key_exchange;
mod pack;
mod port;
mod record;
mod session;
mod state;
mod tls;
mod x509;
pub mod transport {
    pub mod memory;
    pub mod tcp;
    pub mod transport;
}

pub use crate::cipher::{
    CipherName, SUPPORTED, TLS_DHE_DSS_WITH_AES_128_CBC_SHA, TLS_DHE_DSS_WITH_AES_256_CBC_SHA,
    TLS_DHE_RSA_WITH_AES_128_CBC_SHA, TLS_DHE_RSA_WITH_AES_256_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA, TLS_RSA_WITH_RC4_128_MD5, TLS_RSA_WITH_RC4_128_SHA,
};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::errors::{HTTPError, TLSError};
pub use crate::http::{classify, HttpState, Method, Request, Response, StatusClass};
pub use crate::port::{Connection, Event, Query};
