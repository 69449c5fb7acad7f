//! Bulk cipher state for one direction of a connection.
//!
//! RC4 is a true stream: its keystream position carries over from record to record. AES-CBC in TLS 1.0
//! chains the same way, since each record's IV is the last ciphertext block of the record before it.

use crate::cipher;
use crate::errors;

use aes::{Aes128, Aes256};
use block_modes::block_padding::NoPadding;
use block_modes::{BlockMode, Cbc};
use rc4::cipher::consts::U16;
use rc4::cipher::{KeyInit, StreamCipher};
use rc4::Rc4;

const AES_BLOCK_LENGTH: usize = 16;

type Aes128Cbc = Cbc<Aes128, NoPadding>;
type Aes256Cbc = Cbc<Aes256, NoPadding>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

enum Engine {
    Rc4(Box<Rc4<U16>>),
    AesCbc { key: Vec<u8>, iv: Vec<u8> },
}

pub struct CipherState {
    operation: Operation,
    engine: Engine,
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let engine = match self.engine {
            Engine::Rc4(_) => "rc4",
            Engine::AesCbc { .. } => "aes-cbc",
        };
        f.debug_struct("CipherState").field("operation", &self.operation).field("engine", &engine).finish()
    }
}

impl CipherState {
    pub fn new(operation: Operation, parameters: &cipher::CipherParameters, key: &[u8], iv: &[u8]) -> Result<Self, errors::TLSError> {
        let engine = match parameters.bulk_cipher_algorithm {
            cipher::BulkCipherAlgorithm::Rc4 => {
                let rc4 = Rc4::<U16>::new_from_slice(key).map_err(|_| errors::TLSError::InvalidLengthError)?;
                Engine::Rc4(Box::new(rc4))
            }
            cipher::BulkCipherAlgorithm::Aes => {
                if !(key.len() == 16 || key.len() == 32) || iv.len() != AES_BLOCK_LENGTH {
                    return Err(errors::TLSError::InvalidLengthError);
                }
                Engine::AesCbc {
                    key: key.to_vec(),
                    iv: iv.to_vec(),
                }
            }
        };
        Ok(Self { operation, engine })
    }

    /// Runs `data` through the cipher, advancing its state.
    ///
    /// Block input must be a whole number of blocks. A misaligned ciphertext is reported as
    /// `BadRecordMAC` so that it is indistinguishable from any other tampered record.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        match &mut self.engine {
            Engine::Rc4(rc4) => {
                let mut buf = data.to_vec();
                rc4.apply_keystream(&mut buf);
                Ok(buf)
            }
            Engine::AesCbc { key, iv } => {
                if data.len() % AES_BLOCK_LENGTH != 0 {
                    return match self.operation {
                        Operation::Encrypt => Err(errors::TLSError::InvalidLengthError),
                        Operation::Decrypt => Err(errors::TLSError::BadRecordMAC),
                    };
                }
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                let output = match (self.operation, key.len()) {
                    (Operation::Encrypt, 16) => Aes128Cbc::new_var(key, iv).map_err(|_| errors::TLSError::InvalidLengthError)?.encrypt_vec(data),
                    (Operation::Encrypt, _) => Aes256Cbc::new_var(key, iv).map_err(|_| errors::TLSError::InvalidLengthError)?.encrypt_vec(data),
                    (Operation::Decrypt, 16) => Aes128Cbc::new_var(key, iv)
                        .map_err(|_| errors::TLSError::InvalidLengthError)?
                        .decrypt_vec(data)
                        .map_err(|_| errors::TLSError::BadRecordMAC)?,
                    (Operation::Decrypt, _) => Aes256Cbc::new_var(key, iv)
                        .map_err(|_| errors::TLSError::InvalidLengthError)?
                        .decrypt_vec(data)
                        .map_err(|_| errors::TLSError::BadRecordMAC)?,
                };
                let chained = match self.operation {
                    Operation::Encrypt => &output[output.len() - AES_BLOCK_LENGTH..],
                    Operation::Decrypt => &data[data.len() - AES_BLOCK_LENGTH..],
                };
                iv.copy_from_slice(chained);
                Ok(output)
            }
        }
    }

    /// Ends the stream and wipes the key material it held.
    pub fn finish(mut self) {
        if let Engine::AesCbc { key, iv } = &mut self.engine {
            key.iter_mut().for_each(|b| *b = 0);
            iv.iter_mut().for_each(|b| *b = 0);
        }
    }
}
