use crate::errors;
use crate::fields;

use byteorder::{BigEndian, ByteOrder};

// Every unpack returns the bytes it did not consume, so wire structures unpack field by field.
pub trait Pack {
    fn empty() -> Self;
    fn len(&self) -> usize {
        self.pack().len()
    }
    fn pack(&self) -> Vec<u8>;
    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError>;
}

/// Splits `n` bytes off the front of `v`, failing instead of reading past its end.
pub fn take(v: &mut Vec<u8>, n: usize) -> Result<(Vec<u8>, Vec<u8>), errors::TLSError> {
    if v.len() < n {
        return Err(errors::TLSError::InvalidLengthError);
    }
    let rest: Vec<u8> = v.drain(n..).collect();
    Ok((v.clone(), rest))
}

/// Unpacks a `<0..2^(8*length_bytes)-1>` opaque vector, returning (contents, rest).
pub fn unpack_opaque(v: &mut Vec<u8>, length_bytes: usize) -> Result<(Vec<u8>, Vec<u8>), errors::TLSError> {
    let (length, mut rest) = take(v, length_bytes)?;
    let length = match length_bytes {
        1 => length[0] as usize,
        2 => BigEndian::read_u16(&length) as usize,
        3 => BigEndian::read_u24(&length) as usize,
        _ => return Err(errors::TLSError::InvalidLengthError),
    };
    take(&mut rest, length)
}

pub fn pack_opaque(data: &[u8], length_bytes: usize) -> Vec<u8> {
    let mut v = Vec::with_capacity(length_bytes + data.len());
    match length_bytes {
        1 => v.push(data.len() as u8),
        2 => v.extend_from_slice(&fields::Uint16(data.len() as u16).pack()),
        _ => v.extend_from_slice(&fields::uint24_from_u32(data.len() as u32).pack()),
    }
    v.extend_from_slice(data);
    v
}

impl Pack for fields::Uint8 {
    fn empty() -> Self {
        fields::Uint8(0)
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.0]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = take(v, 1)?;
        self.0 = field[0];
        Ok(rest)
    }
}

impl Pack for fields::Uint16 {
    fn empty() -> Self {
        fields::Uint16(0)
    }

    fn pack(&self) -> Vec<u8> {
        let mut bytes: [u8; 2] = [0; 2];
        BigEndian::write_u16(&mut bytes, self.0);
        bytes.to_vec()
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = take(v, 2)?;
        self.0 = BigEndian::read_u16(&field);
        Ok(rest)
    }
}

impl Pack for fields::Uint24 {
    fn empty() -> Self {
        fields::Uint24([0; 3])
    }

    fn pack(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = take(v, 3)?;
        *self = fields::uint24_from_be_bytes([field[0], field[1], field[2]]);
        Ok(rest)
    }
}

impl Pack for fields::Uint32 {
    fn empty() -> Self {
        fields::Uint32(0)
    }

    fn pack(&self) -> Vec<u8> {
        let mut bytes: [u8; 4] = [0; 4];
        BigEndian::write_u32(&mut bytes, self.0);
        bytes.to_vec()
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = take(v, 4)?;
        self.0 = BigEndian::read_u32(&field);
        Ok(rest)
    }
}

impl Pack for fields::Random {
    fn empty() -> Self {
        fields::Random([0; 28])
    }

    fn pack(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = take(v, 28)?;
        self.0.copy_from_slice(&field);
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TLSError;
    use crate::fields;
    use crate::pack::{self, Pack};

    #[test]
    fn uint16_unpack_leaves_rest() {
        let mut i = fields::Uint16::empty();
        let rest = i.unpack(&mut vec![0x03, 0x01, 0xff]).expect("unpack failed");
        assert_eq!(i, fields::Uint16(0x0301));
        assert_eq!(rest, vec![0xff]);
    }

    #[test]
    fn short_input_is_rejected() {
        let mut i = fields::Uint32::empty();
        assert_eq!(i.unpack(&mut vec![1, 2, 3]), Err(TLSError::InvalidLengthError));
        let mut r = fields::Random::empty();
        assert_eq!(r.unpack(&mut vec![0; 27]), Err(TLSError::InvalidLengthError));
    }

    #[test]
    fn opaque_vector_bounds() {
        let (field, rest) = pack::unpack_opaque(&mut vec![0, 2, 0xaa, 0xbb, 0xcc], 2).expect("unpack failed");
        assert_eq!(field, vec![0xaa, 0xbb]);
        assert_eq!(rest, vec![0xcc]);

        // Declared length runs past the buffer.
        assert_eq!(pack::unpack_opaque(&mut vec![0, 9, 0xaa], 2), Err(TLSError::InvalidLengthError));
        assert_eq!(pack::pack_opaque(&[1, 2, 3], 3), vec![0, 0, 3, 1, 2, 3]);
    }
}
