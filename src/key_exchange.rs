use crate::errors;
use crate::record;

use num_bigint_dig::BigUint;
use rand_core::OsRng;
use ring::rand::SecureRandom;
use rsa::{PaddingScheme, PublicKey, RSAPublicKey};
use tracing::debug;

pub const PRE_MASTER_SECRET_LEN: usize = 48;

/// The RSA pre-master secret: the offered protocol version followed by 46 random bytes.
pub fn rsa_pre_master_secret(version: record::ProtocolVersion, rng: &dyn SecureRandom) -> Result<Vec<u8>, errors::TLSError> {
    let mut pre_master_secret = vec![0; PRE_MASTER_SECRET_LEN];
    pre_master_secret[0] = version.major.0;
    pre_master_secret[1] = version.minor.0;
    rng.fill(&mut pre_master_secret[2..])?;
    Ok(pre_master_secret)
}

/// PKCS#1 v1.5 encryption of the pre-master secret under the server certificate's key.
pub fn rsa_encrypt(modulus: &[u8], exponent: &[u8], pre_master_secret: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    let key = RSAPublicKey::new(BigUint::from_bytes_be(modulus), BigUint::from_bytes_be(exponent))
        .map_err(|e| errors::TLSError::HandshakeFailure(format!("server RSA key rejected: {}", e)))?;
    key.encrypt(&mut OsRng, PaddingScheme::new_pkcs1v15_encrypt(), pre_master_secret)
        .map_err(|e| errors::TLSError::HandshakeFailure(format!("RSA encryption failed: {}", e)))
}

/// Server DH parameters as sent in ServerKeyExchange, big-endian and unsigned.
#[derive(Clone, Debug, PartialEq)]
pub struct DhParameters {
    pub p: Vec<u8>,
    pub g: Vec<u8>,
    pub ys: Vec<u8>,
}

/// Our half of an ephemeral Diffie-Hellman exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct DhAgreement {
    pub yc: Vec<u8>,
    pub shared_secret: Vec<u8>,
}

pub fn dh_agree(parameters: &DhParameters, rng: &dyn SecureRandom) -> Result<DhAgreement, errors::TLSError> {
    let p = BigUint::from_bytes_be(&parameters.p);
    let g = BigUint::from_bytes_be(&parameters.g);
    let ys = BigUint::from_bytes_be(&parameters.ys);
    let one = BigUint::from(1u32);
    let p_minus_one = if p > one { &p - &one } else { BigUint::from(0u32) };
    if p_minus_one <= one || g <= one || g >= p_minus_one || ys <= one || ys >= p_minus_one {
        return Err(errors::TLSError::HandshakeFailure("degenerate DH parameters".to_string()));
    }

    // A private exponent as wide as p, reduced into [1, p - 2].
    let mut x_bytes = vec![0; parameters.p.len()];
    rng.fill(&mut x_bytes)?;
    let x = BigUint::from_bytes_be(&x_bytes) % (&p_minus_one - &one) + &one;

    let yc = g.modpow(&x, &p);
    // to_bytes_be drops leading zero bytes, as TLS requires of the pre-master secret.
    let shared_secret = ys.modpow(&x, &p).to_bytes_be();
    debug!("DH agreement over a {} bit group", p.bits());
    Ok(DhAgreement {
        yc: yc.to_bytes_be(),
        shared_secret,
    })
}

#[cfg(test)]
mod tests {
    use crate::key_exchange::{self, DhParameters};
    use crate::record;
    use crate::test;

    use num_bigint_dig::BigUint;
    use rand_core::OsRng;
    use ring::rand::SystemRandom;
    use rsa::{PaddingScheme, PublicKeyParts, RSAPrivateKey};

    #[test]
    fn rsa_pre_master_secret_starts_with_version() {
        let pms = key_exchange::rsa_pre_master_secret(record::TLS_1_0, &SystemRandom::new()).expect("pre-master failed");
        assert_eq!(pms.len(), 48);
        assert_eq!(&pms[..2], &[3, 1]);
    }

    #[test]
    fn rsa_encrypt_decrypts_with_private_key() {
        let private_key = RSAPrivateKey::new(&mut OsRng, 512).expect("keygen failed");
        let pms = key_exchange::rsa_pre_master_secret(record::TLS_1_0, &SystemRandom::new()).expect("pre-master failed");
        let ciphertext = key_exchange::rsa_encrypt(&private_key.n().to_bytes_be(), &private_key.e().to_bytes_be(), &pms)
            .expect("encrypt failed");
        assert_eq!(ciphertext.len(), 64);
        let decrypted = private_key.decrypt(PaddingScheme::new_pkcs1v15_encrypt(), &ciphertext).expect("decrypt failed");
        assert_eq!(decrypted, pms);
    }

    #[test]
    fn dh_both_sides_agree() {
        let p = test::modp_768();
        let g = vec![2];
        let server_x = BigUint::from_bytes_be(&[0x5a; 32]);
        let p_int = BigUint::from_bytes_be(&p);
        let ys = BigUint::from_bytes_be(&g).modpow(&server_x, &p_int).to_bytes_be();

        let parameters = DhParameters { p, g, ys };
        let agreement = key_exchange::dh_agree(&parameters, &SystemRandom::new()).expect("agree failed");
        let server_secret = BigUint::from_bytes_be(&agreement.yc).modpow(&server_x, &p_int).to_bytes_be();
        assert_eq!(agreement.shared_secret, server_secret);
        assert_ne!(agreement.shared_secret.first(), Some(&0));
    }

    #[test]
    fn dh_rejects_trivial_server_value() {
        let parameters = DhParameters {
            p: vec![0x17],
            g: vec![5],
            ys: vec![1],
        };
        assert!(key_exchange::dh_agree(&parameters, &SystemRandom::new()).is_err());
    }
}
