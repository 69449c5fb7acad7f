use crate::cipher;
use crate::errors;
use crate::fields;
use crate::handshake;
use crate::pack::Pack;
use crate::record::{ContentType, ProtocolVersion};

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use ring::{digest, hmac as ring_hmac};
use std::convert::TryFrom;

pub const VERIFY_DATA_LENGTH: usize = 12;
pub const MASTER_SECRET_STR: &[u8; 13] = b"master secret";
pub const MASTER_SECRET_LEN: usize = 48;
pub const KEY_BLOCK_STR: &[u8; 13] = b"key expansion";
pub const CLIENT_FINISHED_LABEL: &[u8; 15] = b"client finished";
pub const SERVER_FINISHED_LABEL: &[u8; 15] = b"server finished";

pub type MasterSecret = [u8; MASTER_SECRET_LEN];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
}

impl From<cipher::MACAlgorithm> for HashAlgorithm {
    fn from(mac: cipher::MACAlgorithm) -> Self {
        match mac {
            cipher::MACAlgorithm::HmacMd5 => HashAlgorithm::Md5,
            cipher::MACAlgorithm::HmacSha1 => HashAlgorithm::Sha1,
        }
    }
}

/// HMAC over the concatenation of `parts`.
pub fn hmac(algorithm: HashAlgorithm, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, errors::TLSError> {
    match algorithm {
        HashAlgorithm::Md5 => {
            let mut mac = Hmac::<Md5>::new_varkey(key).map_err(|_| errors::TLSError::InvalidLengthError)?;
            for part in parts {
                mac.input(part);
            }
            Ok(mac.result().code().to_vec())
        }
        HashAlgorithm::Sha1 => {
            let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
            let mut ctx = ring_hmac::Context::with_key(&key);
            for part in parts {
                ctx.update(part);
            }
            Ok(ctx.sign().as_ref().to_vec())
        }
    }
}

// P_hash(secret, seed) = HMAC(secret, A(1) + seed) + HMAC(secret, A(2) + seed) + ...
// A(0) = seed, A(i) = HMAC(secret, A(i-1))
pub fn p_hash(algorithm: HashAlgorithm, secret: &[u8], seed: &[u8], output_length: usize) -> Result<Vec<u8>, errors::TLSError> {
    let mut result = Vec::with_capacity(output_length);
    let mut a = hmac(algorithm, secret, &[seed])?;
    while result.len() < output_length {
        result.extend_from_slice(&hmac(algorithm, secret, &[&a[..], seed])?);
        a = hmac(algorithm, secret, &[&a[..]])?;
    }
    result.truncate(output_length);
    Ok(result)
}

/// The TLS 1.0 PRF: P_MD5 over the first half of the secret XOR P_SHA1 over the second half.
///
/// For an odd-length secret the halves share the middle byte.
pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], output_length: usize) -> Result<Vec<u8>, errors::TLSError> {
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];
    let label_seed = [label, seed].concat();

    let md5_stream = p_hash(HashAlgorithm::Md5, s1, &label_seed, output_length)?;
    let sha1_stream = p_hash(HashAlgorithm::Sha1, s2, &label_seed, output_length)?;
    Ok(md5_stream.iter().zip(sha1_stream.iter()).map(|(a, b)| a ^ b).collect())
}

//master_secret = PRF(pre_master_secret, "master secret", ClientHello.random + ServerHello.random)[0..47];
pub fn master_secret(
    pre_master_secret: &[u8],
    client_random: &handshake::Random,
    server_random: &handshake::Random,
) -> Result<MasterSecret, errors::TLSError> {
    let seed = [client_random.pack(), server_random.pack()].concat();
    let result = prf(pre_master_secret, MASTER_SECRET_STR, &seed, MASTER_SECRET_LEN)?;

    let mut master_secret = [0; MASTER_SECRET_LEN];
    master_secret.copy_from_slice(&result);
    Ok(master_secret)
}

#[derive(Clone, Debug)]
pub struct KeyBlock {
    pub client_write_mac_key: Vec<u8>,
    pub server_write_mac_key: Vec<u8>,
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

impl KeyBlock {
    pub fn new(
        parameters: &cipher::CipherParameters,
        master_secret: &MasterSecret,
        client_random: &handshake::Random,
        server_random: &handshake::Random,
    ) -> Result<Self, errors::TLSError> {
        let mac_key_length = parameters.mac_key_length.0 as usize;
        let write_key_length = parameters.enc_key_length.0 as usize;
        let write_iv_length = parameters.fixed_iv_length.0 as usize;

        // Note the seed order is reversed relative to the master secret.
        let seed = [server_random.pack(), client_random.pack()].concat();
        let unparsed_block = prf(master_secret, KEY_BLOCK_STR, &seed, parameters.key_block_length())?;

        let mut i = 0;
        let mut next = |n: usize| {
            let slice = unparsed_block[i..i + n].to_vec();
            i += n;
            slice
        };
        let client_write_mac_key = next(mac_key_length);
        let server_write_mac_key = next(mac_key_length);
        let client_write_key = next(write_key_length);
        let server_write_key = next(write_key_length);
        let client_write_iv = next(write_iv_length);
        let server_write_iv = next(write_iv_length);
        Ok(Self {
            client_write_mac_key,
            server_write_mac_key,
            client_write_key,
            server_write_key,
            client_write_iv,
            server_write_iv,
        })
    }
}

/// MD5(handshake_messages) + SHA1(handshake_messages), the seed of the Finished PRF.
pub fn handshake_hash(handshake_messages: &[u8]) -> Vec<u8> {
    let md5 = Md5::digest(handshake_messages);
    let sha1 = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, handshake_messages);
    [md5.as_slice(), sha1.as_ref()].concat()
}

pub fn verify_data(master_secret: &MasterSecret, finished_label: &[u8], handshake_messages: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    prf(master_secret, finished_label, &handshake_hash(handshake_messages), VERIFY_DATA_LENGTH)
}

/// HMAC(seq_num + type + version + length + fragment) under one direction's MAC key.
pub fn mac(
    algorithm: HashAlgorithm,
    mac_key: &[u8],
    seq_num: u64,
    r#type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
) -> Result<Vec<u8>, errors::TLSError> {
    let length = fields::Uint16(u16::try_from(fragment.len())?);
    hmac(
        algorithm,
        mac_key,
        &[
            &fields::sequence_number_bytes(seq_num)[..],
            &r#type.pack()[..],
            &version.pack()[..],
            &length.pack()[..],
            fragment,
        ],
    )
}
