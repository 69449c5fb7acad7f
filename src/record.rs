use crate::errors;
use crate::fields;
use crate::pack::{self, Pack};

use num_traits::FromPrimitive;
use std::convert::TryFrom;
use std::num::TryFromIntError;

pub const RECORD_HEADER_LENGTH: usize = 5;
pub const MAX_FRAGMENT_LENGTH: usize = 1 << 14;
// Plaintext limit plus the expansion a TLS 1.0 cipher may add.
pub const MAX_CIPHERTEXT_LENGTH: usize = MAX_FRAGMENT_LENGTH + 2048;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProtocolVersion {
    pub major: fields::Uint8,
    pub minor: fields::Uint8,
}
impl Pack for ProtocolVersion {
    fn empty() -> Self {
        Self {
            major: fields::Uint8(0),
            minor: fields::Uint8(0),
        }
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.major.0, self.minor.0]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::take(v, 2)?;
        self.major = fields::Uint8(field[0]);
        self.minor = fields::Uint8(field[1]);
        Ok(rest)
    }
}

pub const TLS_1_0: ProtocolVersion = ProtocolVersion {
    major: fields::Uint8(3),
    minor: fields::Uint8(1),
};

#[derive(Debug, Copy, Clone, Primitive, PartialEq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}
impl Pack for ContentType {
    fn empty() -> Self {
        ContentType::Handshake
    }

    fn pack(&self) -> Vec<u8> {
        vec![*self as u8]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::take(v, 1)?;
        *self = Self::from_u8(field[0]).ok_or(errors::TLSError::InvalidContentTypeError)?;
        Ok(rest)
    }
}

pub type Length = fields::Uint16;

/// A TLSPlaintext or TLSCiphertext: 5-byte header followed by exactly `length` bytes of fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct TLSRecord {
    pub r#type: ContentType,
    pub version: ProtocolVersion,
    pub length: Length,
    pub fragment: Vec<u8>,
}

impl TLSRecord {
    pub fn new(r#type: ContentType, version: ProtocolVersion, fragment: Vec<u8>) -> Result<TLSRecord, TryFromIntError> {
        let length: Length = fields::Uint16(u16::try_from(fragment.len())?);
        Ok(TLSRecord {
            r#type,
            version,
            length,
            fragment,
        })
    }
}

impl Pack for TLSRecord {
    fn empty() -> Self {
        Self {
            r#type: ContentType::empty(),
            version: ProtocolVersion::empty(),
            length: Length::empty(),
            fragment: Vec::new(),
        }
    }

    fn pack(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(RECORD_HEADER_LENGTH + self.fragment.len());
        v.extend_from_slice(&self.r#type.pack());
        v.extend_from_slice(&self.version.pack());
        v.extend_from_slice(&self.length.pack());
        v.extend_from_slice(&self.fragment);
        v
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let mut v = self.r#type.unpack(v)?;
        let mut v = self.version.unpack(&mut v)?;
        let mut v = self.length.unpack(&mut v)?;
        let (fragment, rest) = pack::take(&mut v, self.length.0 as usize)?;
        self.fragment = fragment;
        Ok(rest)
    }
}

/// Accumulates raw transport reads and yields records only once their declared length has arrived.
#[derive(Debug, Default)]
pub struct RecordReader {
    buffer: Vec<u8>,
}

impl RecordReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete record, `None` if more bytes are needed.
    pub fn next_record(&mut self) -> Result<Option<TLSRecord>, errors::TLSError> {
        if self.buffer.len() < RECORD_HEADER_LENGTH {
            return Ok(None);
        }
        // Reject garbage before waiting on a length that will never arrive.
        ContentType::from_u8(self.buffer[0]).ok_or(errors::TLSError::InvalidContentTypeError)?;
        let length = u16::from_be_bytes([self.buffer[3], self.buffer[4]]) as usize;
        if length > MAX_CIPHERTEXT_LENGTH {
            return Err(errors::TLSError::InvalidLengthError);
        }
        if self.buffer.len() < RECORD_HEADER_LENGTH + length {
            return Ok(None);
        }
        let mut record = TLSRecord::empty();
        let rest = record.unpack(&mut self.buffer.clone())?;
        self.buffer = rest;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TLSError;
    use crate::pack::Pack;
    use crate::record;

    #[test]
    fn content_type_unpack() {
        let mut content_type = record::ContentType::empty();
        let rest = content_type.unpack(&mut vec![23, 2]).expect("unpack failed");
        assert_eq!(content_type, record::ContentType::ApplicationData);
        assert_eq!(rest, vec![2]);
        assert_eq!(content_type.unpack(&mut vec![99]).err(), Some(TLSError::InvalidContentTypeError));
    }

    #[test]
    fn record_header_wire_form() {
        let r = record::TLSRecord::new(record::ContentType::Handshake, record::TLS_1_0, vec![0xaa; 3]).expect("record failed");
        assert_eq!(r.pack(), vec![0x16, 0x03, 0x01, 0x00, 0x03, 0xaa, 0xaa, 0xaa]);
    }

    #[test]
    fn reader_waits_for_declared_length() {
        let mut reader = record::RecordReader::new();
        reader.push(&[0x17, 0x03]);
        assert_eq!(reader.next_record(), Ok(None));
        reader.push(&[0x01, 0x00, 0x04, 1, 2]);
        assert_eq!(reader.next_record(), Ok(None));
        reader.push(&[3, 4, 0x15]);
        let r = reader.next_record().expect("read failed").expect("record incomplete");
        assert_eq!(r.r#type, record::ContentType::ApplicationData);
        assert_eq!(r.fragment, vec![1, 2, 3, 4]);
        // The trailing byte belongs to the next record.
        assert_eq!(reader.buffered(), 1);
        assert_eq!(reader.next_record(), Ok(None));
    }

    #[test]
    fn reader_rejects_unknown_content_type() {
        let mut reader = record::RecordReader::new();
        reader.push(&[0x42, 0x03, 0x01, 0x00, 0x00]);
        assert_eq!(reader.next_record(), Err(TLSError::InvalidContentTypeError));
    }
}
