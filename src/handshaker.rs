//! Builds the client's handshake messages and checks the server's.

use crate::cipher;
use crate::errors;
use crate::handshake;
use crate::key_exchange;
use crate::record;
use crate::x509;

use ring::rand;
use tracing::{debug, warn};

pub fn client_hello(
    rand: &dyn rand::SecureRandom,
    cipher_suites: &[cipher::CipherName],
) -> Result<handshake::Handshake<handshake::ClientHello>, errors::TLSError> {
    let client_hello = handshake::ClientHello {
        client_version: record::TLS_1_0,
        random: handshake::Random::new(rand)?,
        session_id: handshake::SessionID { session_id: Vec::new() },
        cipher_suites: handshake::CipherSuites {
            cipher_suites: cipher_suites.to_vec(),
        },
        compression_methods: handshake::CompressionMethods {
            compression_methods: vec![handshake::CompressionMethod::Null],
        },
    };
    handshake::Handshake::new(client_hello)
}

pub fn client_key_exchange(exchange_keys: Vec<u8>) -> Result<handshake::Handshake<handshake::ClientKeyExchange>, errors::TLSError> {
    handshake::Handshake::new(handshake::ClientKeyExchange { exchange_keys })
}

pub fn finished(verify_data: Vec<u8>) -> Result<handshake::Handshake<handshake::Finished>, errors::TLSError> {
    handshake::Handshake::new(handshake::Finished { verify_data })
}

/// Accepts a ServerHello only for TLS 1.0, no compression, and one of the suites we offered.
pub fn parse_server_hello(
    message: &handshake::RawHandshake,
    offered: &[cipher::CipherName],
) -> Result<handshake::ServerHello, errors::TLSError> {
    let server_hello = message.parse::<handshake::ServerHello>()?;
    if server_hello.server_version != record::TLS_1_0 {
        return Err(errors::TLSError::UnsupportedVersionError(
            server_hello.server_version.major.0,
            server_hello.server_version.minor.0,
        ));
    }
    if !offered.contains(&server_hello.cipher_suite) {
        return Err(errors::TLSError::HandshakeFailure(format!(
            "server chose cipher suite {:#06x}, which was not offered",
            server_hello.cipher_suite.0
        )));
    }
    debug!("server chose cipher suite {:#06x}", server_hello.cipher_suite.0);
    Ok(server_hello)
}

/// Decodes the server's own certificate. RSA suites need its key; DHE suites only need it to be
/// well formed, since the key is only used for the signature we do not check.
pub fn parse_certificate(
    message: &handshake::RawHandshake,
    key_exchange: cipher::KeyExchangeAlgorithm,
) -> Result<Option<x509::RsaPublicKey>, errors::TLSError> {
    let certificates = message.parse::<handshake::Certificates>()?;
    let leaf = certificates
        .certificates
        .first()
        .ok_or_else(|| errors::TLSError::HandshakeFailure("server sent an empty certificate chain".to_string()))?;
    warn!("server certificate chain and host name are not validated");
    match key_exchange {
        cipher::KeyExchangeAlgorithm::Rsa => Ok(Some(x509::rsa_public_key(&leaf.certificate)?)),
        _ => {
            x509::subject_public_key_info(&leaf.certificate)?;
            Ok(None)
        }
    }
}

pub fn parse_server_key_exchange(message: &handshake::RawHandshake) -> Result<key_exchange::DhParameters, errors::TLSError> {
    let server_key_exchange = message.parse::<handshake::ServerKeyExchange>()?;
    warn!(
        "ServerKeyExchange signature ({} bytes) is not verified",
        server_key_exchange.signature.len()
    );
    Ok(key_exchange::DhParameters {
        p: server_key_exchange.dh_p,
        g: server_key_exchange.dh_g,
        ys: server_key_exchange.dh_ys,
    })
}

pub fn parse_server_hello_done(message: &handshake::RawHandshake) -> Result<(), errors::TLSError> {
    if !message.body().is_empty() {
        return Err(errors::TLSError::InvalidLengthError);
    }
    message.parse::<handshake::ServerHelloDone>().map(|_| ())
}

#[cfg(test)]
mod tests {
    use crate::cipher;
    use crate::errors::TLSError;
    use crate::fields;
    use crate::handshake;
    use crate::handshaker;
    use crate::pack::Pack;
    use crate::record;
    use crate::test;

    use ring::rand::SystemRandom;

    fn raw<Body: handshake::ValidMessage + Pack>(body: Body) -> handshake::RawHandshake {
        let mut reader = handshake::HandshakeReader::new();
        reader.push(&handshake::Handshake::new(body).expect("new failed").pack());
        reader.next_message().expect("read failed").expect("message incomplete")
    }

    fn server_hello(version: record::ProtocolVersion, suite: cipher::CipherName) -> handshake::ServerHello {
        handshake::ServerHello {
            server_version: version,
            random: handshake::Random::empty(),
            session_id: handshake::SessionID::empty(),
            cipher_suite: suite,
            compression_method: handshake::CompressionMethod::Null,
            extensions: Vec::new(),
        }
    }

    #[test]
    fn client_hello_offers_suites_without_session() {
        let hello = handshaker::client_hello(&SystemRandom::new(), &cipher::SUPPORTED).expect("client_hello failed");
        let packed = hello.pack();
        // type, length, version, random, empty session id, then 8 suites.
        assert_eq!(packed[0], 1);
        assert_eq!(&packed[4..6], &[3, 1]);
        assert_eq!(packed[38], 0);
        assert_eq!(&packed[39..41], &[0, 16]);
        assert_eq!(&packed[packed.len() - 2..], &[1, 0]);
        assert_eq!(hello.body.random.pack().len(), 32);
    }

    #[test]
    fn server_hello_must_pick_an_offered_suite() {
        let offered = [cipher::TLS_RSA_WITH_AES_128_CBC_SHA];
        assert!(handshaker::parse_server_hello(&raw(server_hello(record::TLS_1_0, cipher::TLS_RSA_WITH_AES_128_CBC_SHA)), &offered).is_ok());
        match handshaker::parse_server_hello(&raw(server_hello(record::TLS_1_0, cipher::TLS_RSA_WITH_RC4_128_MD5)), &offered) {
            Err(TLSError::HandshakeFailure(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        let tls_1_2 = record::ProtocolVersion {
            major: fields::Uint8(3),
            minor: fields::Uint8(3),
        };
        assert_eq!(
            handshaker::parse_server_hello(&raw(server_hello(tls_1_2, cipher::TLS_RSA_WITH_AES_128_CBC_SHA)), &offered),
            Err(TLSError::UnsupportedVersionError(3, 3))
        );
    }

    #[test]
    fn certificate_yields_rsa_key_only_for_rsa_suites() {
        let chain = handshake::Certificates {
            certificates: vec![handshake::Certificate {
                certificate: test::rsa_certificate(),
            }],
        };
        let message = raw(chain);
        let key = handshaker::parse_certificate(&message, cipher::KeyExchangeAlgorithm::Rsa).expect("parse failed");
        assert_eq!(key.map(|k| k.exponent), Some(vec![1, 0, 1]));
        assert_eq!(handshaker::parse_certificate(&message, cipher::KeyExchangeAlgorithm::DheRsa), Ok(None));

        let empty = raw(handshake::Certificates { certificates: Vec::new() });
        assert!(handshaker::parse_certificate(&empty, cipher::KeyExchangeAlgorithm::Rsa).is_err());
    }

    #[test]
    fn server_hello_done_has_no_body() {
        assert_eq!(handshaker::parse_server_hello_done(&raw(handshake::ServerHelloDone)), Ok(()));
        let not_empty = handshake::RawHandshake {
            msg_type: handshake::HandshakeType::ServerHelloDone,
            raw: vec![14, 0, 0, 1, 0],
        };
        assert_eq!(handshaker::parse_server_hello_done(&not_empty), Err(TLSError::InvalidLengthError));
    }
}
