use crate::errors;
use crate::pack::{self, Pack};

use num_traits::FromPrimitive;

#[derive(Debug, Copy, Clone, PartialEq, Primitive)]
#[repr(u8)]
pub enum Type {
    ChangeCipherSpec = 1,
}

#[derive(Clone, Debug)]
pub struct ChangeCipherSpec {
    pub r#type: Type,
}

impl Pack for ChangeCipherSpec {
    fn empty() -> Self {
        Self {
            r#type: Type::ChangeCipherSpec,
        }
    }

    fn pack(&self) -> Vec<u8> {
        vec![self.r#type as u8]
    }

    fn unpack(&mut self, v: &mut Vec<u8>) -> Result<Vec<u8>, errors::TLSError> {
        let (field, rest) = pack::take(v, 1)?;
        self.r#type = Type::from_u8(field[0]).ok_or(errors::TLSError::InvalidContentTypeError)?;
        Ok(rest)
    }
}
