//! The TLS layer's event handler.
//!
//! `TlsClient` never touches a socket. Bytes read from the transport go in through `handle_input`,
//! and everything it wants written comes back out in the returned `TlsOutput`, so the dispatcher above
//! decides when I/O happens.

use crate::alert::Alert;
use crate::change_cipher_spec::ChangeCipherSpec;
use crate::cipher;
use crate::errors;
use crate::handshake::{self, HandshakeType, RawHandshake};
use crate::handshaker;
use crate::pack::Pack;
use crate::record::{ContentType, RecordReader, TLSRecord};
use crate::session::{ConnectionEnd, Session};
use crate::state::{Direction, ProtocolState};
use crate::tls;

use ring::constant_time;
use tracing::{debug, info};

/// What one call into the client produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlsOutput {
    /// Records to write to the transport, in order.
    pub send: Vec<u8>,
    /// Decrypted application data.
    pub data: Vec<u8>,
    /// The handshake completed during this call.
    pub established: bool,
    /// The server sent close_notify.
    pub closed: bool,
}

pub struct TlsClient {
    tls: tls::Tls,
    session: Session,
    cipher_suites: Vec<cipher::CipherName>,
    records: RecordReader,
    handshakes: handshake::HandshakeReader,
}

impl TlsClient {
    pub fn new(cipher_suites: &[cipher::CipherName]) -> Self {
        Self {
            tls: tls::Tls::new(),
            session: Session::new(ConnectionEnd::Client),
            cipher_suites: cipher_suites.to_vec(),
            records: RecordReader::new(),
            handshakes: handshake::HandshakeReader::new(),
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_established(&self) -> bool {
        self.session.state().is_established()
    }

    /// Starts a fresh session and returns the ClientHello record.
    pub fn connect(&mut self) -> Result<Vec<u8>, errors::TLSError> {
        self.session = Session::new(ConnectionEnd::Client);
        self.records = RecordReader::new();
        self.handshakes = handshake::HandshakeReader::new();
        self.tls.client_hello(&mut self.session, &self.cipher_suites)
    }

    /// Feeds raw transport bytes through the record layer.
    pub fn handle_input(&mut self, bytes: &[u8]) -> Result<TlsOutput, errors::TLSError> {
        let mut output = TlsOutput::default();
        self.records.push(bytes);
        while let Some(record) = self.records.next_record()? {
            if self.session.state() == ProtocolState::Closed {
                debug!("discarding {:?} record after close", record.r#type);
                break;
            }
            self.handle_record(record, &mut output)?;
        }
        Ok(output)
    }

    fn fragment(&mut self, record: &TLSRecord) -> Result<Vec<u8>, errors::TLSError> {
        if self.session.is_read_protected() {
            self.session.decode_record(record)
        } else {
            Ok(record.fragment.clone())
        }
    }

    fn handle_record(&mut self, record: TLSRecord, output: &mut TlsOutput) -> Result<(), errors::TLSError> {
        debug!("record {:?} ({} bytes)", record.r#type, record.fragment.len());
        match record.r#type {
            ContentType::Handshake => {
                let fragment = self.fragment(&record)?;
                self.handshakes.push(&fragment);
                while let Some(message) = self.handshakes.next_message()? {
                    self.handle_handshake(message, output)?;
                }
            }
            ContentType::ChangeCipherSpec => {
                let mut fragment = self.fragment(&record)?;
                ChangeCipherSpec::empty().unpack(&mut fragment)?;
                if !self.handshakes.is_empty() {
                    return Err(errors::TLSError::HandshakeFailure(
                        "ChangeCipherSpec inside a handshake message".to_string(),
                    ));
                }
                self.session.transition(Direction::Read, ProtocolState::ChangeCipherSpec)?;
                self.session.activate_read()?;
            }
            ContentType::ApplicationData => {
                // Checked before decryption so that early data never reaches the cipher.
                self.session.transition(Direction::Read, ProtocolState::Application)?;
                let data = self.session.decode_record(&record)?;
                output.data.extend_from_slice(&data);
            }
            ContentType::Alert => {
                let mut fragment = self.fragment(&record)?;
                let mut alert = Alert::empty();
                alert.unpack(&mut fragment)?;
                self.handle_alert(alert, output)?;
            }
        }
        Ok(())
    }

    fn handle_alert(&mut self, alert: Alert, output: &mut TlsOutput) -> Result<(), errors::TLSError> {
        if alert.is_close_notify() && self.session.transition(Direction::Read, ProtocolState::Closed).is_ok() {
            info!("server sent close_notify");
            self.session.close();
            output.closed = true;
            return Ok(());
        }
        Err(errors::TLSError::AlertReceived {
            level: alert.level,
            description: alert.description,
        })
    }

    fn handle_handshake(&mut self, message: RawHandshake, output: &mut TlsOutput) -> Result<(), errors::TLSError> {
        debug!("handshake message {:?} ({} bytes)", message.msg_type, message.raw.len());
        match message.msg_type {
            HandshakeType::HelloRequest => return Err(errors::TLSError::UnsupportedFeature("session renegotiation")),
            HandshakeType::CertificateRequest => return Err(errors::TLSError::UnsupportedFeature("client certificates")),
            HandshakeType::ServerHello => {
                self.session.transition(Direction::Read, ProtocolState::ServerHello)?;
                let server_hello = handshaker::parse_server_hello(&message, &self.cipher_suites)?;
                self.session.set_cipher_suite(server_hello.cipher_suite)?;
                self.session.server_random = Some(server_hello.random);
            }
            HandshakeType::Certificates => {
                self.session.transition(Direction::Read, ProtocolState::Certificate)?;
                let key_exchange = self.session.parameters()?.key_exchange_algorithm;
                self.session.server_key = handshaker::parse_certificate(&message, key_exchange)?;
            }
            HandshakeType::ServerKeyExchange => {
                self.session.transition(Direction::Read, ProtocolState::ServerKeyExchange)?;
                if !self.session.parameters()?.key_exchange_algorithm.is_ephemeral() {
                    return Err(errors::TLSError::HandshakeFailure(
                        "ServerKeyExchange for an RSA key exchange".to_string(),
                    ));
                }
                self.session.dh_parameters = Some(handshaker::parse_server_key_exchange(&message)?);
            }
            HandshakeType::ServerHelloDone => {
                self.session.transition(Direction::Read, ProtocolState::ServerHelloDone)?;
                handshaker::parse_server_hello_done(&message)?;
                self.session.add_handshake_message(&message.raw);
                output.send.extend(self.tls.client_key_exchange(&mut self.session)?);
                output.send.extend(self.tls.change_cipher_spec(&mut self.session)?);
                output.send.extend(self.tls.finished(&mut self.session)?);
                return Ok(());
            }
            HandshakeType::Finished => {
                self.session.transition(Direction::Read, ProtocolState::EncryptedHandshake)?;
                let finished = message.parse::<handshake::Finished>()?;
                let expected = self.session.finished(true)?;
                constant_time::verify_slices_are_equal(&expected, &finished.verify_data)
                    .map_err(|_| errors::TLSError::HandshakeFailure("server Finished does not verify".to_string()))?;
                self.session.add_handshake_message(&message.raw);
                self.session.transition(Direction::Read, ProtocolState::Application)?;
                info!(
                    "TLS handshake complete, cipher suite {:#06x}",
                    self.session.cipher_suite.map(|suite| suite.0).unwrap_or(0)
                );
                output.established = true;
                return Ok(());
            }
            _ => return Err(errors::TLSError::InvalidHandshakeTypeError),
        }
        self.session.add_handshake_message(&message.raw);
        Ok(())
    }

    /// Protects application data for sending.
    pub fn write(&mut self, data: &[u8]) -> Result<Vec<u8>, errors::TLSError> {
        self.tls.application_data(&mut self.session, data)
    }

    /// Ends the session, returning a close_notify record if one can still be sent.
    pub fn close(&mut self) -> Vec<u8> {
        let record = if self.is_established() {
            self.tls.close_notify(&mut self.session).unwrap_or_default()
        } else {
            Vec::new()
        };
        self.session.close();
        record
    }
}

#[cfg(test)]
mod tests {
    use crate::alert::{AlertDescription, AlertLevel};
    use crate::cipher;
    use crate::client::TlsClient;
    use crate::errors::TLSError;
    use crate::state::ProtocolState;
    use crate::test::TestServer;

    fn handshake(client: &mut TlsClient, server: &mut TestServer) {
        let hello = client.connect().expect("connect failed");
        let flight = server.receive(&hello).expect("server hello failed");
        let output = client.handle_input(&flight).expect("client flight failed");
        assert!(!output.send.is_empty());
        let reply = server.receive(&output.send).expect("server finished failed");
        let output = client.handle_input(&reply).expect("server finished rejected");
        assert!(output.established);
    }

    #[test]
    fn handshake_and_echo_for_every_rsa_suite() {
        for suite in [
            cipher::TLS_RSA_WITH_RC4_128_MD5,
            cipher::TLS_RSA_WITH_RC4_128_SHA,
            cipher::TLS_RSA_WITH_AES_128_CBC_SHA,
            cipher::TLS_RSA_WITH_AES_256_CBC_SHA,
        ]
        .iter()
        {
            let mut client = TlsClient::new(&[*suite]);
            let mut server = TestServer::new();
            handshake(&mut client, &mut server);
            assert!(client.is_established());

            let record = client.write(b"hello").expect("write failed");
            assert_eq!(server.receive(&record).expect("server read failed"), Vec::<u8>::new());
            assert_eq!(server.application_data(), b"hello".to_vec());

            let reply = server.send(b"world").expect("server write failed");
            assert_eq!(client.handle_input(&reply).expect("read failed").data, b"world".to_vec());
        }
    }

    #[test]
    fn dhe_handshake_completes() {
        let mut client = TlsClient::new(&[cipher::TLS_DHE_RSA_WITH_AES_128_CBC_SHA]);
        let mut server = TestServer::new();
        handshake(&mut client, &mut server);
        assert_eq!(client.session().cipher_suite, Some(cipher::TLS_DHE_RSA_WITH_AES_128_CBC_SHA));
    }

    #[test]
    fn input_may_arrive_one_byte_at_a_time() {
        let mut client = TlsClient::new(&[cipher::TLS_RSA_WITH_AES_128_CBC_SHA]);
        let mut server = TestServer::new();
        let flight = server.receive(&client.connect().expect("connect failed")).expect("server hello failed");
        let mut send = Vec::new();
        for byte in flight.iter() {
            send.extend(client.handle_input(&[*byte]).expect("client flight failed").send);
        }
        let reply = server.receive(&send).expect("server finished failed");
        let mut established = false;
        for byte in reply.iter() {
            established |= client.handle_input(&[*byte]).expect("read failed").established;
        }
        assert!(established);
    }

    #[test]
    fn application_data_before_change_cipher_spec_is_rejected() {
        let mut client = TlsClient::new(&cipher::SUPPORTED);
        client.connect().expect("connect failed");
        let early = [0x17, 0x03, 0x01, 0x00, 0x02, 0xaa, 0xbb];
        match client.handle_input(&early) {
            Err(TLSError::ProtocolStateError { from, to, .. }) => {
                assert_eq!((from, to), (ProtocolState::ClientHello, ProtocolState::Application));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.session().key_block.is_none());
    }

    #[test]
    fn tampered_server_finished_fails() {
        let mut client = TlsClient::new(&[cipher::TLS_RSA_WITH_AES_128_CBC_SHA]);
        let mut server = TestServer::new();
        let flight = server.receive(&client.connect().expect("connect failed")).expect("server hello failed");
        let output = client.handle_input(&flight).expect("client flight failed");
        let mut reply = server.receive(&output.send).expect("server finished failed");
        let last = reply.len() - 1;
        reply[last] ^= 0x01;
        assert_eq!(client.handle_input(&reply), Err(TLSError::BadRecordMAC));
    }

    #[test]
    fn fatal_alert_is_surfaced() {
        let mut client = TlsClient::new(&cipher::SUPPORTED);
        client.connect().expect("connect failed");
        assert_eq!(
            client.handle_input(&[0x15, 0x03, 0x01, 0x00, 0x02, 0x02, 0x28]),
            Err(TLSError::AlertReceived {
                level: AlertLevel::Fatal,
                description: AlertDescription::HandshakeFailure,
            })
        );
    }

    #[test]
    fn server_key_exchange_out_of_order_is_a_state_error() {
        let mut client = TlsClient::new(&cipher::SUPPORTED);
        client.connect().expect("connect failed");
        match client.handle_input(&[0x16, 0x03, 0x01, 0x00, 0x04, 0x0c, 0x00, 0x00, 0x00]) {
            Err(TLSError::ProtocolStateError { from, to, .. }) => {
                assert_eq!((from, to), (ProtocolState::ClientHello, ProtocolState::ServerKeyExchange));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn hello_request_is_unsupported() {
        let mut client = TlsClient::new(&cipher::SUPPORTED);
        client.connect().expect("connect failed");
        assert_eq!(
            client.handle_input(&[0x16, 0x03, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]),
            Err(TLSError::UnsupportedFeature("session renegotiation"))
        );
    }

    #[test]
    fn close_notify_in_both_directions() {
        let mut client = TlsClient::new(&[cipher::TLS_RSA_WITH_RC4_128_SHA]);
        let mut server = TestServer::new();
        handshake(&mut client, &mut server);

        let notify = server.close_notify().expect("server close failed");
        let output = client.handle_input(&notify).expect("close_notify rejected");
        assert!(output.closed);
        assert_eq!(client.session().state(), ProtocolState::Closed);
        // Nothing can be sent once the session is gone.
        assert!(client.close().is_empty());
    }

    #[test]
    fn client_close_sends_close_notify() {
        let mut client = TlsClient::new(&[cipher::TLS_RSA_WITH_AES_256_CBC_SHA]);
        let mut server = TestServer::new();
        handshake(&mut client, &mut server);
        let notify = client.close();
        assert_eq!(notify[0], 0x15);
        assert!(server.receive(&notify).expect("server read failed").is_empty());
        assert!(server.saw_close_notify());
    }
}
