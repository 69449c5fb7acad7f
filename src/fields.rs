use byteorder::{BigEndian, ByteOrder};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uint8(pub u8);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Uint16(pub u16);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uint32(pub u32);

// In network order (Big Endian)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uint24(pub [u8; 3]);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Random(pub [u8; 28]);

pub fn uint24_to_u32(i: Uint24) -> u32 {
    BigEndian::read_u24(&i.0)
}

pub fn uint24_from_u32(i: u32) -> Uint24 {
    let mut buf = [0; 3];
    BigEndian::write_u24(&mut buf, i);
    Uint24(buf)
}

pub fn uint24_from_be_bytes(bytes: [u8; 3]) -> Uint24 {
    Uint24(bytes)
}

/// The 8-byte big-endian form of a record sequence number, as fed to the MAC.
pub fn sequence_number_bytes(seq_num: u64) -> [u8; 8] {
    let mut buf = [0; 8];
    BigEndian::write_u64(&mut buf, seq_num);
    buf
}
