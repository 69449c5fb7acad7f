//! Per-connection TLS state: negotiated parameters, secrets, keys, record sequence numbers and the
//! single protocol state value. It is only ever touched by the connection that owns it.

use crate::bulk;
use crate::cipher;
use crate::crypto;
use crate::errors;
use crate::handshake;
use crate::key_exchange;
use crate::record::{self, ContentType, TLSRecord};
use crate::state::{self, Direction, ProtocolState};
use crate::x509;

use ring::constant_time;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectionEnd {
    #[allow(dead_code)]
    Server,
    Client,
}

pub struct Session {
    pub entity: ConnectionEnd,
    pub version: record::ProtocolVersion,
    pub cipher_suite: Option<cipher::CipherName>,
    pub cipher_parameters: Option<cipher::CipherParameters>,

    pub client_random: Option<handshake::Random>,
    pub server_random: Option<handshake::Random>,
    pub pre_master_secret: Option<Vec<u8>>,
    pub master_secret: Option<crypto::MasterSecret>,
    pub key_block: Option<crypto::KeyBlock>,

    pub server_key: Option<x509::RsaPublicKey>,
    pub dh_parameters: Option<key_exchange::DhParameters>,

    /// Every handshake message sent or received so far, headers included.
    pub handshake_messages: Vec<u8>,

    read_sequence_number: u64,
    write_sequence_number: u64,
    read_cipher: Option<bulk::CipherState>,
    write_cipher: Option<bulk::CipherState>,

    state: ProtocolState,
}

impl Session {
    pub fn new(entity: ConnectionEnd) -> Self {
        Self {
            entity,
            version: record::TLS_1_0,
            cipher_suite: None,
            cipher_parameters: None,
            client_random: None,
            server_random: None,
            pre_master_secret: None,
            master_secret: None,
            key_block: None,
            server_key: None,
            dh_parameters: None,
            handshake_messages: Vec::new(),
            read_sequence_number: 0,
            write_sequence_number: 0,
            read_cipher: None,
            write_cipher: None,
            state: ProtocolState::ClientHello,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Moves to `to` if the table for `direction` allows it. On failure nothing changes.
    pub fn transition(&mut self, direction: Direction, to: ProtocolState) -> Result<(), errors::TLSError> {
        let next = state::transition(direction, self.state, to)?;
        debug!("{:?} {:?} -> {:?}", direction, self.state, next);
        self.state = next;
        Ok(())
    }

    #[cfg(test)]
    pub fn read_sequence_number(&self) -> u64 {
        self.read_sequence_number
    }

    #[cfg(test)]
    pub fn write_sequence_number(&self) -> u64 {
        self.write_sequence_number
    }

    pub fn is_read_protected(&self) -> bool {
        self.read_cipher.is_some()
    }

    #[cfg(test)]
    pub fn is_write_protected(&self) -> bool {
        self.write_cipher.is_some()
    }

    pub fn set_cipher_suite(&mut self, suite: cipher::CipherName) -> Result<(), errors::TLSError> {
        self.cipher_parameters = Some(cipher::parameters(suite)?);
        self.cipher_suite = Some(suite);
        Ok(())
    }

    pub fn parameters(&self) -> Result<cipher::CipherParameters, errors::TLSError> {
        self.cipher_parameters.ok_or(errors::TLSError::SessionError)
    }

    pub fn add_handshake_message(&mut self, raw: &[u8]) {
        self.handshake_messages.extend_from_slice(raw);
    }

    /// Derives the master secret and key block from the pre-master secret, then discards the latter.
    pub fn establish_keys(&mut self, pre_master_secret: Vec<u8>) -> Result<(), errors::TLSError> {
        let parameters = self.parameters()?;
        let (client_random, server_random) = match (&self.client_random, &self.server_random) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(errors::TLSError::SessionError),
        };
        let master_secret = crypto::master_secret(&pre_master_secret, client_random, server_random)?;
        let key_block = crypto::KeyBlock::new(&parameters, &master_secret, client_random, server_random)?;
        self.master_secret = Some(master_secret);
        self.key_block = Some(key_block);
        self.pre_master_secret = None;
        Ok(())
    }

    /// verify_data for the Finished message sent by the client or by the server, over the transcript so far.
    pub fn finished(&self, is_server: bool) -> Result<Vec<u8>, errors::TLSError> {
        let master_secret = self.master_secret.as_ref().ok_or(errors::TLSError::SessionError)?;
        let label: &[u8] = if is_server {
            crypto::SERVER_FINISHED_LABEL
        } else {
            crypto::CLIENT_FINISHED_LABEL
        };
        crypto::verify_data(master_secret, label, &self.handshake_messages)
    }

    fn keys(&self, writing: bool) -> Result<(&[u8], &[u8], &[u8]), errors::TLSError> {
        let key_block = self.key_block.as_ref().ok_or(errors::TLSError::SessionError)?;
        // The client writes with the client keys and reads with the server's; a server the reverse.
        let client_side = writing == (self.entity == ConnectionEnd::Client);
        Ok(if client_side {
            (&key_block.client_write_mac_key, &key_block.client_write_key, &key_block.client_write_iv)
        } else {
            (&key_block.server_write_mac_key, &key_block.server_write_key, &key_block.server_write_iv)
        })
    }

    /// Switches outgoing records to the negotiated cipher; called as ChangeCipherSpec is sent.
    pub fn activate_write(&mut self) -> Result<(), errors::TLSError> {
        let parameters = self.parameters()?;
        let (_, key, iv) = self.keys(true)?;
        let cipher = bulk::CipherState::new(bulk::Operation::Encrypt, &parameters, key, iv)?;
        self.write_cipher = Some(cipher);
        self.write_sequence_number = 0;
        Ok(())
    }

    /// Switches incoming records to the negotiated cipher; called as ChangeCipherSpec is received.
    pub fn activate_read(&mut self) -> Result<(), errors::TLSError> {
        let parameters = self.parameters()?;
        let (_, key, iv) = self.keys(false)?;
        let cipher = bulk::CipherState::new(bulk::Operation::Decrypt, &parameters, key, iv)?;
        self.read_cipher = Some(cipher);
        self.read_sequence_number = 0;
        Ok(())
    }

    /// MACs, pads and encrypts one fragment, returning the complete record.
    pub fn encode_record(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        if plaintext.len() > record::MAX_FRAGMENT_LENGTH {
            return Err(errors::TLSError::InvalidLengthError);
        }
        let parameters = self.parameters()?;
        let (mac_key, _, _) = self.keys(true)?;
        let mac = crypto::mac(
            parameters.mac_algorithm.into(),
            mac_key,
            self.write_sequence_number,
            content_type,
            self.version,
            plaintext,
        )?;

        let mut fragment = Vec::with_capacity(plaintext.len() + mac.len() + 16);
        fragment.extend_from_slice(plaintext);
        fragment.extend_from_slice(&mac);
        if parameters.cipher_type == cipher::CipherType::Block {
            let block_length = parameters.block_length.0 as usize;
            let pad_length = (block_length - (fragment.len() + 1) % block_length) % block_length;
            fragment.extend(std::iter::repeat(pad_length as u8).take(pad_length + 1));
        }

        let cipher = self.write_cipher.as_mut().ok_or(errors::TLSError::SessionError)?;
        let ciphertext = cipher.update(&fragment)?;
        let record = TLSRecord::new(content_type, self.version, ciphertext)?;
        self.write_sequence_number += 1;
        Ok(crate::pack::Pack::pack(&record))
    }

    /// Decrypts one record and checks its padding and MAC. Every failure is `BadRecordMAC`.
    pub fn decode_record(&mut self, record: &TLSRecord) -> Result<Vec<u8>, errors::TLSError> {
        let parameters = self.parameters()?;
        let mac_length = parameters.mac_length.0 as usize;
        let cipher = self.read_cipher.as_mut().ok_or(errors::TLSError::SessionError)?;
        let mut plaintext = cipher.update(&record.fragment)?;

        if parameters.cipher_type == cipher::CipherType::Block {
            let pad_length = *plaintext.last().ok_or(errors::TLSError::BadRecordMAC)? as usize;
            if pad_length + 1 + mac_length > plaintext.len() {
                return Err(errors::TLSError::BadRecordMAC);
            }
            let padding_start = plaintext.len() - pad_length - 1;
            if plaintext[padding_start..].iter().any(|b| *b as usize != pad_length) {
                return Err(errors::TLSError::BadRecordMAC);
            }
            plaintext.truncate(padding_start);
        }
        if plaintext.len() < mac_length {
            return Err(errors::TLSError::BadRecordMAC);
        }
        let received_mac = plaintext.split_off(plaintext.len() - mac_length);

        let (mac_key, _, _) = self.keys(false)?;
        let expected_mac = crypto::mac(
            parameters.mac_algorithm.into(),
            mac_key,
            self.read_sequence_number,
            record.r#type,
            record.version,
            &plaintext,
        )?;
        constant_time::verify_slices_are_equal(&expected_mac, &received_mac).map_err(|_| errors::TLSError::BadRecordMAC)?;
        self.read_sequence_number += 1;
        Ok(plaintext)
    }

    /// Releases both cipher states and wipes the secrets.
    pub fn close(&mut self) {
        if let Some(cipher) = self.read_cipher.take() {
            cipher.finish();
        }
        if let Some(cipher) = self.write_cipher.take() {
            cipher.finish();
        }
        self.pre_master_secret = None;
        self.master_secret = None;
        self.key_block = None;
        self.state = ProtocolState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use crate::cipher;
    use crate::errors::TLSError;
    use crate::fields;
    use crate::handshake;
    use crate::pack::Pack;
    use crate::record::{self, ContentType, TLSRecord};
    use crate::session::{ConnectionEnd, Session};
    use crate::state::{Direction, ProtocolState};

    use proptest::prelude::*;

    fn random(byte: u8) -> handshake::Random {
        handshake::Random {
            gmt_unix_time: fields::Uint32(0),
            random_bytes: fields::Random([byte; 28]),
        }
    }

    /// A client and a server session sharing keys, with both directions protected.
    pub fn session_pair(suite: cipher::CipherName, pre_master_secret: &[u8]) -> (Session, Session) {
        let mut pair = Vec::new();
        for entity in [ConnectionEnd::Client, ConnectionEnd::Server].iter() {
            let mut session = Session::new(*entity);
            session.set_cipher_suite(suite).expect("set_cipher_suite failed");
            session.client_random = Some(random(1));
            session.server_random = Some(random(2));
            session.establish_keys(pre_master_secret.to_vec()).expect("establish_keys failed");
            session.activate_write().expect("activate_write failed");
            session.activate_read().expect("activate_read failed");
            pair.push(session);
        }
        let server = pair.pop().expect("server missing");
        let client = pair.pop().expect("client missing");
        (client, server)
    }

    fn unpack(bytes: &[u8]) -> TLSRecord {
        let mut record = TLSRecord::empty();
        record.unpack(&mut bytes.to_vec()).expect("unpack failed");
        record
    }

    #[test]
    fn sequence_numbers_advance_once_per_record() {
        let (mut client, mut server) = session_pair(cipher::TLS_RSA_WITH_AES_128_CBC_SHA, &[3; 48]);
        for i in 0..3u64 {
            assert_eq!(client.write_sequence_number(), i);
            let bytes = client.encode_record(ContentType::ApplicationData, b"ping").expect("encode failed");
            assert_eq!(server.decode_record(&unpack(&bytes)).expect("decode failed"), b"ping".to_vec());
            assert_eq!(server.read_sequence_number(), i + 1);
        }
    }

    #[test]
    fn block_padding_fills_the_last_block() {
        let (mut client, _) = session_pair(cipher::TLS_RSA_WITH_AES_256_CBC_SHA, &[3; 48]);
        // 11 bytes + 20 MAC + 1 length byte = 32: a single padding byte of 0.
        let record = unpack(&client.encode_record(ContentType::ApplicationData, &[0; 11]).expect("encode failed"));
        assert_eq!(record.fragment.len(), 32);
        // 12 bytes overflow into a third block.
        let record = unpack(&client.encode_record(ContentType::ApplicationData, &[0; 12]).expect("encode failed"));
        assert_eq!(record.fragment.len(), 48);
    }

    #[test]
    fn replayed_record_fails_the_mac() {
        let (mut client, mut server) = session_pair(cipher::TLS_RSA_WITH_RC4_128_MD5, &[3; 48]);
        let first = unpack(&client.encode_record(ContentType::ApplicationData, b"once").expect("encode failed"));
        assert!(server.decode_record(&first).is_ok());
        // The RC4 keystream and the sequence number have both moved on.
        assert_eq!(server.decode_record(&first), Err(TLSError::BadRecordMAC));
    }

    #[test]
    fn keys_are_required() {
        let mut session = Session::new(ConnectionEnd::Client);
        assert_eq!(session.encode_record(ContentType::ApplicationData, b"x"), Err(TLSError::SessionError));
        assert_eq!(session.finished(false), Err(TLSError::SessionError));
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let (mut client, _) = session_pair(cipher::TLS_RSA_WITH_AES_128_CBC_SHA, &[3; 48]);
        let key_block = format!("{:?}", client.key_block);
        let err = client.transition(Direction::Read, ProtocolState::Application);
        assert_eq!(
            err,
            Err(TLSError::ProtocolStateError {
                direction: Direction::Read,
                from: ProtocolState::ClientHello,
                to: ProtocolState::Application,
            })
        );
        assert_eq!(client.state(), ProtocolState::ClientHello);
        assert_eq!(format!("{:?}", client.key_block), key_block);
    }

    #[test]
    fn close_releases_keys() {
        let (mut client, _) = session_pair(cipher::TLS_DHE_DSS_WITH_AES_128_CBC_SHA, &[3; 64]);
        client.close();
        assert!(!client.is_write_protected() && !client.is_read_protected());
        assert!(client.key_block.is_none());
        assert_eq!(client.state(), ProtocolState::Closed);
    }

    fn suites() -> impl Strategy<Value = cipher::CipherName> {
        proptest::sample::select(cipher::SUPPORTED.to_vec())
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            suite in suites(),
            pre_master_secret in proptest::collection::vec(any::<u8>(), 48),
            messages in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..600), 1..6),
        ) {
            let (mut client, mut server) = session_pair(suite, &pre_master_secret);
            for message in messages.iter() {
                let bytes = client.encode_record(ContentType::ApplicationData, message).expect("encode failed");
                prop_assert_eq!(server.decode_record(&unpack(&bytes)).expect("decode failed"), message.clone());
            }
        }

        #[test]
        fn any_flipped_bit_is_a_bad_mac(
            suite in suites(),
            message in proptest::collection::vec(any::<u8>(), 0..200),
            position in any::<proptest::sample::Index>(),
            bit in 0u8..8,
        ) {
            let (mut client, mut server) = session_pair(suite, &[7; 48]);
            let mut record = unpack(&client.encode_record(ContentType::ApplicationData, &message).expect("encode failed"));
            let i = position.index(record.fragment.len());
            record.fragment[i] ^= 1 << bit;
            prop_assert_eq!(server.decode_record(&record), Err(TLSError::BadRecordMAC));
        }
    }

    #[test]
    fn record_version_is_tls_1_0() {
        let (mut client, _) = session_pair(cipher::TLS_RSA_WITH_RC4_128_SHA, &[3; 48]);
        let record = unpack(&client.encode_record(ContentType::Handshake, b"x").expect("encode failed"));
        assert_eq!(record.version, record::TLS_1_0);
    }
}
