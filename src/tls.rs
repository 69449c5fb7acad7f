use crate::alert;
use crate::change_cipher_spec;
use crate::cipher;
use crate::errors;
use crate::handshaker;
use crate::key_exchange;
use crate::pack::Pack;
use crate::record::{self, ContentType, TLSRecord};
use crate::session::Session;
use crate::state::{Direction, ProtocolState};

use ring::rand;

/// Frames a plaintext fragment in a record header, splitting it if it is longer than a record allows.
pub fn plaintext_records(r#type: ContentType, version: record::ProtocolVersion, data: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
    let mut out = Vec::with_capacity(data.len() + record::RECORD_HEADER_LENGTH);
    for chunk in data.chunks(record::MAX_FRAGMENT_LENGTH) {
        out.extend_from_slice(&TLSRecord::new(r#type, version, chunk.to_vec())?.pack());
    }
    Ok(out)
}

/// Builds the client's outgoing records, moving the session through the write table as it goes.
pub struct Tls {
    pub rand: rand::SystemRandom,
}

impl Tls {
    pub fn new() -> Tls {
        Tls {
            rand: rand::SystemRandom::new(),
        }
    }

    pub fn client_hello(&self, session: &mut Session, cipher_suites: &[cipher::CipherName]) -> Result<Vec<u8>, errors::TLSError> {
        if session.state() != ProtocolState::ClientHello {
            return Err(errors::TLSError::ProtocolStateError {
                direction: Direction::Write,
                from: session.state(),
                to: ProtocolState::ClientHello,
            });
        }
        let handshake = handshaker::client_hello(&self.rand, cipher_suites)?;
        let body = handshake.pack();
        session.client_random = Some(handshake.body.random);
        session.add_handshake_message(&body);
        plaintext_records(ContentType::Handshake, session.version, &body)
    }

    /// Computes the pre-master secret for the negotiated key exchange, derives the session keys and
    /// returns the ClientKeyExchange record.
    pub fn client_key_exchange(&self, session: &mut Session) -> Result<Vec<u8>, errors::TLSError> {
        session.transition(Direction::Write, ProtocolState::ClientKeyExchange)?;
        let parameters = session.parameters()?;
        let (exchange_keys, pre_master_secret) = if parameters.key_exchange_algorithm.is_ephemeral() {
            let dh_parameters = session
                .dh_parameters
                .as_ref()
                .ok_or_else(|| errors::TLSError::HandshakeFailure("no ServerKeyExchange for an ephemeral suite".to_string()))?;
            let agreement = key_exchange::dh_agree(dh_parameters, &self.rand)?;
            (agreement.yc, agreement.shared_secret)
        } else {
            let server_key = session
                .server_key
                .as_ref()
                .ok_or_else(|| errors::TLSError::HandshakeFailure("no server RSA key".to_string()))?;
            let pre_master_secret = key_exchange::rsa_pre_master_secret(session.version, &self.rand)?;
            let encrypted = key_exchange::rsa_encrypt(&server_key.modulus, &server_key.exponent, &pre_master_secret)?;
            (encrypted, pre_master_secret)
        };

        let body = handshaker::client_key_exchange(exchange_keys)?.pack();
        session.add_handshake_message(&body);
        session.establish_keys(pre_master_secret)?;
        plaintext_records(ContentType::Handshake, session.version, &body)
    }

    /// The ChangeCipherSpec record. Everything written after it is protected.
    pub fn change_cipher_spec(&self, session: &mut Session) -> Result<Vec<u8>, errors::TLSError> {
        session.transition(Direction::Write, ProtocolState::ChangeCipherSpec)?;
        let body = change_cipher_spec::ChangeCipherSpec::empty().pack();
        let record = plaintext_records(ContentType::ChangeCipherSpec, session.version, &body)?;
        session.activate_write()?;
        Ok(record)
    }

    pub fn finished(&self, session: &mut Session) -> Result<Vec<u8>, errors::TLSError> {
        session.transition(Direction::Write, ProtocolState::Finished)?;
        let verify_data = session.finished(false)?;
        let body = handshaker::finished(verify_data)?.pack();
        session.add_handshake_message(&body);
        session.encode_record(ContentType::Handshake, &body)
    }

    pub fn application_data(&self, session: &mut Session, data: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        session.transition(Direction::Write, ProtocolState::Application)?;
        let mut out = Vec::new();
        for chunk in data.chunks(record::MAX_FRAGMENT_LENGTH) {
            out.extend(session.encode_record(ContentType::ApplicationData, chunk)?);
        }
        Ok(out)
    }

    /// A protected warning close_notify, leaving the session in CloseNotify.
    pub fn close_notify(&self, session: &mut Session) -> Result<Vec<u8>, errors::TLSError> {
        session.transition(Direction::Write, ProtocolState::Alert)?;
        let record = session.encode_record(ContentType::Alert, &alert::Alert::close_notify().pack())?;
        session.transition(Direction::Write, ProtocolState::CloseNotify)?;
        Ok(record)
    }
}
