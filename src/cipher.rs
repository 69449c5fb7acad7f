use crate::errors;
use crate::fields;

pub type CipherName = fields::Uint16;

pub const TLS_RSA_WITH_RC4_128_MD5: CipherName = fields::Uint16(0x0004);
pub const TLS_RSA_WITH_RC4_128_SHA: CipherName = fields::Uint16(0x0005);
pub const TLS_RSA_WITH_AES_128_CBC_SHA: CipherName = fields::Uint16(0x002f);
pub const TLS_RSA_WITH_AES_256_CBC_SHA: CipherName = fields::Uint16(0x0035);
pub const TLS_DHE_DSS_WITH_AES_128_CBC_SHA: CipherName = fields::Uint16(0x0032);
pub const TLS_DHE_DSS_WITH_AES_256_CBC_SHA: CipherName = fields::Uint16(0x0038);
pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: CipherName = fields::Uint16(0x0033);
pub const TLS_DHE_RSA_WITH_AES_256_CBC_SHA: CipherName = fields::Uint16(0x0039);

/// Every suite this client can negotiate, most preferred first.
pub const SUPPORTED: [CipherName; 8] = [
    TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
    TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
    TLS_DHE_DSS_WITH_AES_256_CBC_SHA,
    TLS_DHE_DSS_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_AES_256_CBC_SHA,
    TLS_RSA_WITH_AES_128_CBC_SHA,
    TLS_RSA_WITH_RC4_128_SHA,
    TLS_RSA_WITH_RC4_128_MD5,
];

pub fn is_supported(cipher: CipherName) -> bool {
    SUPPORTED.contains(&cipher)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyExchangeAlgorithm {
    Rsa,
    DheDss,
    DheRsa,
}

impl KeyExchangeAlgorithm {
    pub fn is_ephemeral(self) -> bool {
        self != KeyExchangeAlgorithm::Rsa
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BulkCipherAlgorithm {
    Rc4,
    Aes,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CipherType {
    Stream,
    Block,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MACAlgorithm {
    HmacMd5,
    HmacSha1,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CipherParameters {
    pub key_exchange_algorithm: KeyExchangeAlgorithm,
    pub bulk_cipher_algorithm: BulkCipherAlgorithm,
    pub cipher_type: CipherType,
    pub enc_key_length: fields::Uint8,
    pub block_length: fields::Uint8,
    pub fixed_iv_length: fields::Uint8,
    pub mac_algorithm: MACAlgorithm,
    pub mac_length: fields::Uint8,
    pub mac_key_length: fields::Uint8,
}

impl CipherParameters {
    fn rc4(mac_algorithm: MACAlgorithm) -> Self {
        let mac_length = match mac_algorithm {
            MACAlgorithm::HmacMd5 => 16,
            MACAlgorithm::HmacSha1 => 20,
        };
        Self {
            key_exchange_algorithm: KeyExchangeAlgorithm::Rsa,
            bulk_cipher_algorithm: BulkCipherAlgorithm::Rc4,
            cipher_type: CipherType::Stream,
            enc_key_length: fields::Uint8(16),
            block_length: fields::Uint8(0),
            fixed_iv_length: fields::Uint8(0),
            mac_algorithm,
            mac_length: fields::Uint8(mac_length),
            mac_key_length: fields::Uint8(mac_length),
        }
    }

    fn aes_cbc_sha(key_exchange_algorithm: KeyExchangeAlgorithm, enc_key_length: u8) -> Self {
        Self {
            key_exchange_algorithm,
            bulk_cipher_algorithm: BulkCipherAlgorithm::Aes,
            cipher_type: CipherType::Block,
            enc_key_length: fields::Uint8(enc_key_length),
            block_length: fields::Uint8(16),
            fixed_iv_length: fields::Uint8(16), // IVs same for block ciphers
            mac_algorithm: MACAlgorithm::HmacSha1,
            mac_length: fields::Uint8(20),
            mac_key_length: fields::Uint8(20),
        }
    }

    /// Length of the key block: both MAC keys, both write keys, both IVs.
    pub fn key_block_length(&self) -> usize {
        2 * (self.mac_key_length.0 as usize + self.enc_key_length.0 as usize + self.fixed_iv_length.0 as usize)
    }
}

pub fn parameters(cipher: CipherName) -> Result<CipherParameters, errors::TLSError> {
    use KeyExchangeAlgorithm::*;
    match cipher {
        TLS_RSA_WITH_RC4_128_MD5 => Ok(CipherParameters::rc4(MACAlgorithm::HmacMd5)),
        TLS_RSA_WITH_RC4_128_SHA => Ok(CipherParameters::rc4(MACAlgorithm::HmacSha1)),
        TLS_RSA_WITH_AES_128_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(Rsa, 16)),
        TLS_RSA_WITH_AES_256_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(Rsa, 32)),
        TLS_DHE_DSS_WITH_AES_128_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(DheDss, 16)),
        TLS_DHE_DSS_WITH_AES_256_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(DheDss, 32)),
        TLS_DHE_RSA_WITH_AES_128_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(DheRsa, 16)),
        TLS_DHE_RSA_WITH_AES_256_CBC_SHA => Ok(CipherParameters::aes_cbc_sha(DheRsa, 32)),
        _ => Err(errors::TLSError::CipherNotSupportedError(cipher)),
    }
}
