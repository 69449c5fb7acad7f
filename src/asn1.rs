//! A DER decoder producing a tree of tagged nodes.
//!
//! Its only input is certificate bytes received during the handshake, so every length is checked
//! against the bytes actually present before anything is read.

use crate::errors;

const MAX_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Class {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// Universal tag numbers used by X.509.
pub mod universal {
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x10;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tag {
    pub class: Class,
    pub number: u8,
}

impl Tag {
    pub fn universal(number: u8) -> Self {
        Self {
            class: Class::Universal,
            number,
        }
    }

    fn from_byte(byte: u8) -> Self {
        let class = match byte >> 6 {
            0 => Class::Universal,
            1 => Class::Application,
            2 => Class::ContextSpecific,
            _ => Class::Private,
        };
        Self {
            class,
            number: byte & 0x1f,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Primitive(Vec<u8>),
    Constructed(Vec<Node>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub tag: Tag,
    pub constructed: bool,
    /// Offset of the tag byte within the decoded buffer.
    pub offset: usize,
    pub header_len: usize,
    pub length: usize,
    pub content: Content,
}

impl Node {
    pub fn is(&self, number: u8) -> bool {
        self.tag == Tag::universal(number)
    }

    pub fn children(&self) -> &[Node] {
        match &self.content {
            Content::Constructed(children) => children,
            Content::Primitive(_) => &[],
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Primitive(value) => Some(value),
            Content::Constructed(_) => None,
        }
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn read_byte(&mut self) -> Result<u8, errors::TLSError> {
        let byte = *self.data.get(self.pos).ok_or(errors::TLSError::Asn1Error("unexpected end of data"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_length(&mut self) -> Result<usize, errors::TLSError> {
        let first_byte = self.read_byte()?;
        if first_byte < 0x80 {
            return Ok(first_byte as usize);
        }
        if first_byte == 0x80 {
            return Err(errors::TLSError::Asn1Error("indefinite length"));
        }
        let num_length_bytes = (first_byte & 0x7f) as usize;
        if num_length_bytes > 4 {
            return Err(errors::TLSError::Asn1Error("length too long"));
        }
        let mut length = 0usize;
        for _ in 0..num_length_bytes {
            length = (length << 8) | self.read_byte()? as usize;
        }
        Ok(length)
    }

    fn read_node(&mut self, base: usize, depth: usize) -> Result<Node, errors::TLSError> {
        if depth > MAX_DEPTH {
            return Err(errors::TLSError::Asn1Error("nesting too deep"));
        }
        let start = self.pos;
        let tag_byte = self.read_byte()?;
        if tag_byte & 0x1f == 0x1f {
            return Err(errors::TLSError::Asn1Error("high tag number form"));
        }
        let length = self.read_length()?;
        let header_len = self.pos - start;
        let remaining = self.data.len() - self.pos;
        if length > remaining {
            return Err(errors::TLSError::Asn1Error("length runs past end of data"));
        }
        let body = &self.data[self.pos..self.pos + length];
        let constructed = tag_byte & 0x20 != 0;
        let content = if constructed {
            Content::Constructed(decode_all(body, base + self.pos, depth + 1)?)
        } else {
            Content::Primitive(body.to_vec())
        };
        self.pos += length;
        Ok(Node {
            tag: Tag::from_byte(tag_byte),
            constructed,
            offset: base + start,
            header_len,
            length,
            content,
        })
    }
}

fn decode_all(data: &[u8], base: usize, depth: usize) -> Result<Vec<Node>, errors::TLSError> {
    let mut decoder = Decoder { data, pos: 0 };
    let mut nodes = Vec::new();
    while decoder.pos < data.len() {
        nodes.push(decoder.read_node(base, depth)?);
    }
    Ok(nodes)
}

/// Decodes every top-level element of `data`.
pub fn decode(data: &[u8]) -> Result<Vec<Node>, errors::TLSError> {
    decode_all(data, 0, 0)
}

/// Strips the sign-padding zero bytes of a DER INTEGER.
pub fn unsigned_integer(node: &Node) -> Result<Vec<u8>, errors::TLSError> {
    if !node.is(universal::INTEGER) {
        return Err(errors::TLSError::Asn1Error("expected INTEGER"));
    }
    let value = node.value().unwrap_or(&[]);
    let first_nonzero = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    Ok(value[first_nonzero..].to_vec())
}
