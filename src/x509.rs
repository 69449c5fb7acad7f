//! Just enough X.509 to find the server's public key.
//!
//! Nothing here validates the certificate: not its signature, chain, validity period or name.

use crate::asn1::{self, universal, Node};
use crate::errors;

// 1.2.840.113549.1.1.1
pub const RSA_ENCRYPTION_OID: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

#[derive(Clone, Debug, PartialEq)]
pub struct SubjectPublicKeyInfo {
    pub algorithm: Vec<u8>,
    /// The BIT STRING contents with the unused-bits byte removed.
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RsaPublicKey {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

fn is_spki(node: &Node) -> bool {
    if !node.is(universal::SEQUENCE) {
        return false;
    }
    match node.children() {
        [algorithm, key, ..] => {
            algorithm.is(universal::SEQUENCE)
                && algorithm.children().first().map(|oid| oid.is(universal::OID)).unwrap_or(false)
                && key.is(universal::BIT_STRING)
        }
        _ => false,
    }
}

/// Walks tbsCertificate for the first child shaped like SubjectPublicKeyInfo.
///
/// The position of the key varies with the optional version and issuer/subject unique ID fields,
/// so the walk matches on structure instead of a fixed index.
pub fn subject_public_key_info(certificate: &[u8]) -> Result<SubjectPublicKeyInfo, errors::TLSError> {
    let nodes = asn1::decode(certificate)?;
    let tbs = nodes
        .first()
        .filter(|cert| cert.is(universal::SEQUENCE))
        .and_then(|cert| cert.children().first())
        .filter(|tbs| tbs.is(universal::SEQUENCE))
        .ok_or(errors::TLSError::Asn1Error("not a certificate"))?;
    let spki = tbs
        .children()
        .iter()
        .find(|node| is_spki(node))
        .ok_or(errors::TLSError::Asn1Error("no SubjectPublicKeyInfo"))?;

    let children = spki.children();
    let algorithm = children[0].children()[0].value().unwrap_or(&[]).to_vec();
    let bit_string = children[1].value().unwrap_or(&[]);
    match bit_string.split_first() {
        Some((&0, public_key)) => Ok(SubjectPublicKeyInfo {
            algorithm,
            public_key: public_key.to_vec(),
        }),
        _ => Err(errors::TLSError::Asn1Error("public key is not a whole number of bytes")),
    }
}

/// Extracts the RSAPublicKey { modulus, publicExponent } of an rsaEncryption certificate.
pub fn rsa_public_key(certificate: &[u8]) -> Result<RsaPublicKey, errors::TLSError> {
    let spki = subject_public_key_info(certificate)?;
    if spki.algorithm != RSA_ENCRYPTION_OID {
        return Err(errors::TLSError::HandshakeFailure("server certificate does not carry an RSA key".to_string()));
    }
    let nodes = asn1::decode(&spki.public_key)?;
    let key = nodes
        .first()
        .filter(|key| key.is(universal::SEQUENCE))
        .ok_or(errors::TLSError::Asn1Error("RSAPublicKey is not a SEQUENCE"))?;
    match key.children() {
        [modulus, exponent] => Ok(RsaPublicKey {
            modulus: asn1::unsigned_integer(modulus)?,
            exponent: asn1::unsigned_integer(exponent)?,
        }),
        _ => Err(errors::TLSError::Asn1Error("RSAPublicKey must hold two INTEGERs")),
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TLSError;
    use crate::test;
    use crate::x509;

    #[test]
    fn rsa_key_from_real_certificate() {
        let key = x509::rsa_public_key(&test::rsa_certificate()).expect("rsa_public_key failed");
        assert_eq!(key.modulus.len(), 256);
        assert_eq!(key.modulus[..4], test::RSA_CERTIFICATE_MODULUS_PREFIX);
        assert_eq!(key.exponent, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn key_is_found_without_version_field() {
        // A v1 certificate has no [0] version, so every tbsCertificate field shifts left by one.
        let cert = test::certificate_der(&[0xc3; 64], &[0x03], false);
        let key = x509::rsa_public_key(&cert).expect("rsa_public_key failed");
        assert_eq!(key.modulus, vec![0xc3; 64]);
        assert_eq!(key.exponent, vec![0x03]);
    }

    #[test]
    fn truncated_certificate_is_rejected() {
        let cert = test::rsa_certificate();
        assert!(x509::rsa_public_key(&cert[..cert.len() - 10]).is_err());
        assert_eq!(
            x509::subject_public_key_info(&[0x30, 0x00]),
            Err(TLSError::Asn1Error("not a certificate"))
        );
    }
}
