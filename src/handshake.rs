use crate::errors;
use crate::fields;
use crate::pack::{self, Pack};
use crate::record;

use num_traits::FromPrimitive;
use ring::rand::SecureRandom;
use std::convert::TryFrom;
use std::time::SystemTime;

pub const HANDSHAKE_HEADER_LENGTH: usize = 4;
/// Longest handshake body accepted. Certificate chains are the largest messages a client receives.
pub const MAX_HANDSHAKE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificates = 11, // made plural because Certificate message is actually a list of Certificates
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}
impl Pack for HandshakeType {
    fn empty() -> Self {
        HandshakeType::HelloRequest
    }

    fn pack(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::take(v, 1)?;
        *self = Self::from_u8(field[0]).ok_or(errors::TLSError::InvalidHandshakeTypeError)?;
        Ok(rest)
    }
}

pub trait ValidMessage {
    fn into_handshake_type() -> HandshakeType;
}
macro_rules! new_handshake_trait {
    ($name: ident) => {
        impl ValidMessage for $name {
            fn into_handshake_type() -> HandshakeType {
                HandshakeType::$name
            }
        }
    };
}
// Ensures we can statically pack/unpack valid Handshake messages
new_handshake_trait!(ClientHello);
new_handshake_trait!(ServerHello);
new_handshake_trait!(Certificates);
new_handshake_trait!(ServerKeyExchange);
new_handshake_trait!(ServerHelloDone);
new_handshake_trait!(ClientKeyExchange);
new_handshake_trait!(Finished);

pub type Length = fields::Uint24;

#[derive(Clone, Debug, PartialEq)]
pub struct Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    pub msg_type: HandshakeType,
    pub length: Length,
    pub body: Body,
}

impl<Body> Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    pub fn new(body: Body) -> Result<Handshake<Body>, errors::TLSError> {
        let body_length = u32::try_from(body.len())?;
        if body_length > 0x00ff_ffff {
            return Err(errors::TLSError::InvalidLengthError);
        }
        Ok(Self {
            msg_type: Body::into_handshake_type(),
            length: fields::uint24_from_u32(body_length),
            body,
        })
    }
}

impl<Body> Pack for Handshake<Body>
where
    Body: ValidMessage + Pack,
{
    fn empty() -> Self {
        Self {
            msg_type: HandshakeType::empty(),
            length: Length::empty(),
            body: Body::empty(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.msg_type.pack());
        v.extend_from_slice(&self.length.pack());
        v.extend_from_slice(&self.body.pack());
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let mut v = self.msg_type.unpack(v)?;
        if self.msg_type != Body::into_handshake_type() {
            return Err(errors::TLSError::InvalidHandshakeTypeError);
        }
        let mut v = self.length.unpack(&mut v)?;
        let (mut body, rest) = pack::take(&mut v, fields::uint24_to_u32(self.length) as usize)?;
        let trailing = self.body.unpack(&mut body)?;
        if !trailing.is_empty() {
            return Err(errors::TLSError::InvalidLengthError);
        }
        Ok(rest)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Random {
    pub gmt_unix_time: fields::Uint32,
    pub random_bytes: fields::Random,
}

impl Random {
    pub fn new(rand: &dyn SecureRandom) -> Result<Random, errors::TLSError> {
        let mut random_bytes: [u8; 28] = [0; 28];
        rand.fill(&mut random_bytes)?;
        let random_bytes = fields::Random(random_bytes);

        let gmt_unix_time = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH)?;
        let gmt_unix_time = u32::try_from(gmt_unix_time.as_secs())?;
        let gmt_unix_time = fields::Uint32(gmt_unix_time);
        Ok(Random { gmt_unix_time, random_bytes })
    }
}

impl Pack for Random {
    fn empty() -> Self {
        Self {
            gmt_unix_time: fields::Uint32::empty(),
            random_bytes: fields::Random::empty(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.gmt_unix_time.pack());
        v.extend_from_slice(&self.random_bytes.pack());
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let mut v = self.gmt_unix_time.unpack(v)?;
        self.random_bytes.unpack(&mut v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionID {
    pub session_id: Vec<u8>,
}

impl Pack for SessionID {
    fn empty() -> Self {
        Self { session_id: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        pack::pack_opaque(&self.session_id, 1)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (session_id, rest) = pack::unpack_opaque(v, 1)?;
        if session_id.len() > 32 {
            return Err(errors::TLSError::InvalidLengthError);
        }
        self.session_id = session_id;
        Ok(rest)
    }
}

pub type CipherSuite = fields::Uint16;

#[derive(Clone, Debug, PartialEq)]
pub struct CipherSuites {
    pub cipher_suites: Vec<CipherSuite>,
}

impl Pack for CipherSuites {
    fn empty() -> Self {
        Self { cipher_suites: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        let ext: Vec<u8> = self.cipher_suites.iter().flat_map(|i| i.pack()).collect();
        pack::pack_opaque(&ext, 2)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::unpack_opaque(v, 2)?;
        if field.len() % 2 != 0 {
            return Err(errors::TLSError::InvalidLengthError);
        }
        self.cipher_suites = field.chunks_exact(2).map(|i| fields::Uint16(u16::from_be_bytes([i[0], i[1]]))).collect();
        Ok(rest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Primitive)]
#[repr(u8)]
pub enum CompressionMethod {
    Null = 0,
}

impl Pack for CompressionMethod {
    fn empty() -> Self {
        CompressionMethod::Null
    }

    fn pack(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::take(v, 1)?;
        *self = CompressionMethod::from_u8(field[0]).ok_or(errors::TLSError::InvalidCompressionMethodError)?;
        Ok(rest)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompressionMethods {
    pub compression_methods: Vec<CompressionMethod>,
}

impl Pack for CompressionMethods {
    fn empty() -> Self {
        Self {
            compression_methods: Vec::new(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let ext: Vec<u8> = self.compression_methods.iter().map(|i| *i as u8).collect();
        pack::pack_opaque(&ext, 1)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::unpack_opaque(v, 1)?;
        self.compression_methods = field
            .into_iter()
            .map(|e| CompressionMethod::from_u8(e).ok_or(errors::TLSError::InvalidCompressionMethodError))
            .collect::<Result<_, _>>()?;
        Ok(rest)
    }
}

//
// Handshake messages
//

#[derive(Clone, Debug, PartialEq)]
pub struct ClientHello {
    pub client_version: record::ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suites: CipherSuites,
    pub compression_methods: CompressionMethods,
}
impl Pack for ClientHello {
    fn empty() -> Self {
        Self {
            client_version: record::ProtocolVersion::empty(),
            random: Random::empty(),
            session_id: SessionID::empty(),
            cipher_suites: CipherSuites::empty(),
            compression_methods: CompressionMethods::empty(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.client_version.pack());
        v.extend_from_slice(&self.random.pack());
        v.extend_from_slice(&self.session_id.pack());
        v.extend_from_slice(&self.cipher_suites.pack());
        v.extend_from_slice(&self.compression_methods.pack());
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let mut v = self.client_version.unpack(v)?;
        let mut v = self.random.unpack(&mut v)?;
        let mut v = self.session_id.unpack(&mut v)?;
        let mut v = self.cipher_suites.unpack(&mut v)?;
        self.compression_methods.unpack(&mut v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHello {
    pub server_version: record::ProtocolVersion,
    pub random: Random,
    pub session_id: SessionID,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    /// Extension bytes, if the server sent any. We offer none, so they are kept but never interpreted.
    pub extensions: Vec<u8>,
}
impl Pack for ServerHello {
    fn empty() -> Self {
        Self {
            server_version: record::ProtocolVersion::empty(),
            random: Random::empty(),
            session_id: SessionID::empty(),
            cipher_suite: CipherSuite::empty(),
            compression_method: CompressionMethod::empty(),
            extensions: Vec::new(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&self.server_version.pack());
        v.extend_from_slice(&self.random.pack());
        v.extend_from_slice(&self.session_id.pack());
        v.extend_from_slice(&self.cipher_suite.pack());
        v.extend_from_slice(&self.compression_method.pack());
        v.extend_from_slice(&self.extensions);
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let mut v = self.server_version.unpack(v)?;
        let mut v = self.random.unpack(&mut v)?;
        let mut v = self.session_id.unpack(&mut v)?;
        let mut v = self.cipher_suite.unpack(&mut v)?;
        let v = self.compression_method.unpack(&mut v)?;
        self.extensions = v;
        Ok(Vec::new())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Certificate {
    pub certificate: Vec<u8>,
}

impl Pack for Certificate {
    fn empty() -> Self {
        Self { certificate: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        pack::pack_opaque(&self.certificate, 3)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (certificate, rest) = pack::unpack_opaque(v, 3)?;
        self.certificate = certificate;
        Ok(rest)
    }
}

/// The server's certificate chain, its own certificate first.
#[derive(Clone, Debug, PartialEq)]
pub struct Certificates {
    pub certificates: Vec<Certificate>,
}

impl Pack for Certificates {
    fn empty() -> Self {
        Self { certificates: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        let ext: Vec<u8> = self.certificates.iter().flat_map(|i| i.pack()).collect();
        pack::pack_opaque(&ext, 3)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (mut field, rest) = pack::unpack_opaque(v, 3)?;
        self.certificates.clear();
        while !field.is_empty() {
            let mut certificate = Certificate::empty();
            field = certificate.unpack(&mut field)?;
            self.certificates.push(certificate);
        }
        Ok(rest)
    }
}

/// ServerDHParams followed by the server's signature over them.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerKeyExchange {
    pub dh_p: Vec<u8>,
    pub dh_g: Vec<u8>,
    pub dh_ys: Vec<u8>,
    pub signature: Vec<u8>,
}
impl Pack for ServerKeyExchange {
    fn empty() -> Self {
        Self {
            dh_p: Vec::new(),
            dh_g: Vec::new(),
            dh_ys: Vec::new(),
            signature: Vec::new(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&pack::pack_opaque(&self.dh_p, 2));
        v.extend_from_slice(&pack::pack_opaque(&self.dh_g, 2));
        v.extend_from_slice(&pack::pack_opaque(&self.dh_ys, 2));
        v.extend_from_slice(&pack::pack_opaque(&self.signature, 2));
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (dh_p, mut v) = pack::unpack_opaque(v, 2)?;
        let (dh_g, mut v) = pack::unpack_opaque(&mut v, 2)?;
        let (dh_ys, mut v) = pack::unpack_opaque(&mut v, 2)?;
        let (signature, rest) = pack::unpack_opaque(&mut v, 2)?;
        self.dh_p = dh_p;
        self.dh_g = dh_g;
        self.dh_ys = dh_ys;
        self.signature = signature;
        Ok(rest)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerHelloDone;
impl Pack for ServerHelloDone {
    fn empty() -> Self {
        ServerHelloDone {}
    }
    fn pack(&self) -> Vec<u8> {
        Vec::new()
    }
    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        Ok(v.to_vec())
    }
}

/// Either the RSA-encrypted pre-master secret or the client's DH public value, both length-prefixed.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientKeyExchange {
    pub exchange_keys: Vec<u8>,
}

impl Pack for ClientKeyExchange {
    fn empty() -> Self {
        Self { exchange_keys: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        pack::pack_opaque(&self.exchange_keys, 2)
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (exchange_keys, rest) = pack::unpack_opaque(v, 2)?;
        self.exchange_keys = exchange_keys;
        Ok(rest)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Pack for Finished {
    fn empty() -> Self {
        Self { verify_data: Vec::new() }
    }

    fn pack(&self) -> Vec<u8> {
        self.verify_data.clone()
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (verify_data, rest) = pack::take(v, crate::crypto::VERIFY_DATA_LENGTH)?;
        self.verify_data = verify_data;
        Ok(rest)
    }
}

/// One complete handshake message as it arrived, header included.
#[derive(Clone, Debug, PartialEq)]
pub struct RawHandshake {
    pub msg_type: HandshakeType,
    pub raw: Vec<u8>,
}

impl RawHandshake {
    pub fn body(&self) -> &[u8] {
        &self.raw[HANDSHAKE_HEADER_LENGTH..]
    }

    /// Unpacks the message as `Body`, failing if it is some other message or has trailing bytes.
    pub fn parse<Body: ValidMessage + Pack>(&self) -> Result<Body, errors::TLSError> {
        let mut handshake = Handshake::<Body>::empty();
        let rest = handshake.unpack(&mut self.raw.clone())?;
        if !rest.is_empty() {
            return Err(errors::TLSError::InvalidLengthError);
        }
        Ok(handshake.body)
    }
}

/// Splits the handshake byte stream into messages. A record may carry several messages, and one
/// message may span several records.
#[derive(Debug, Default)]
pub struct HandshakeReader {
    buffer: Vec<u8>,
}

impl HandshakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn next_message(&mut self) -> Result<Option<RawHandshake>, errors::TLSError> {
        if self.buffer.len() < HANDSHAKE_HEADER_LENGTH {
            return Ok(None);
        }
        let msg_type = HandshakeType::from_u8(self.buffer[0]).ok_or(errors::TLSError::InvalidHandshakeTypeError)?;
        let length = fields::uint24_to_u32(fields::uint24_from_be_bytes([self.buffer[1], self.buffer[2], self.buffer[3]])) as usize;
        if length > MAX_HANDSHAKE_LENGTH {
            return Err(errors::TLSError::InvalidLengthError);
        }
        let total = HANDSHAKE_HEADER_LENGTH + length;
        if self.buffer.len() < total {
            return Ok(None);
        }
        let rest = self.buffer.split_off(total);
        let raw = std::mem::replace(&mut self.buffer, rest);
        Ok(Some(RawHandshake { msg_type, raw }))
    }
}
