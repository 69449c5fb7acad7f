//! Client protocol state and the two direction-specific transition tables.
//!
//! A connection holds exactly one `ProtocolState`. Reading a message from the server moves it through
//! the read table, sending a message moves it through the write table, and anything else is an error.

use crate::errors;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProtocolState {
    ClientHello,
    ServerHello,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    ChangeCipherSpec,
    Finished,
    EncryptedHandshake,
    Application,
    Alert,
    CloseNotify,
    Closed,
}

impl ProtocolState {
    pub const ALL: [ProtocolState; 13] = [
        ProtocolState::ClientHello,
        ProtocolState::ServerHello,
        ProtocolState::Certificate,
        ProtocolState::ServerKeyExchange,
        ProtocolState::ServerHelloDone,
        ProtocolState::ClientKeyExchange,
        ProtocolState::ChangeCipherSpec,
        ProtocolState::Finished,
        ProtocolState::EncryptedHandshake,
        ProtocolState::Application,
        ProtocolState::Alert,
        ProtocolState::CloseNotify,
        ProtocolState::Closed,
    ];

    pub fn is_established(self) -> bool {
        self == ProtocolState::Application
    }
}

fn read_targets(from: ProtocolState) -> &'static [ProtocolState] {
    use ProtocolState::*;
    match from {
        ClientHello => &[ServerHello],
        ServerHello => &[Certificate],
        Certificate => &[ServerHelloDone, ServerKeyExchange],
        ServerKeyExchange => &[ServerHelloDone],
        ServerHelloDone => &[Closed],
        Finished => &[ChangeCipherSpec, Alert],
        ChangeCipherSpec => &[EncryptedHandshake],
        EncryptedHandshake => &[Application, Closed],
        Application => &[Application, Alert, Closed],
        _ => &[],
    }
}

fn write_targets(from: ProtocolState) -> &'static [ProtocolState] {
    use ProtocolState::*;
    match from {
        ServerHelloDone => &[ClientKeyExchange],
        ClientKeyExchange => &[ChangeCipherSpec],
        ChangeCipherSpec => &[Finished],
        EncryptedHandshake => &[Application],
        Application => &[Application, Alert],
        Alert => &[CloseNotify],
        _ => &[],
    }
}

pub fn is_legal_transition(direction: Direction, from: ProtocolState, to: ProtocolState) -> bool {
    let targets = match direction {
        Direction::Read => read_targets(from),
        Direction::Write => write_targets(from),
    };
    targets.contains(&to)
}

/// Returns `to` when the table for `direction` allows it.
pub fn transition(direction: Direction, from: ProtocolState, to: ProtocolState) -> Result<ProtocolState, errors::TLSError> {
    if is_legal_transition(direction, from, to) {
        Ok(to)
    } else {
        Err(errors::TLSError::ProtocolStateError { direction, from, to })
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::TLSError;
    use crate::state::{is_legal_transition, transition, Direction, ProtocolState};

    #[test]
    fn rsa_handshake_path_is_legal() {
        use ProtocolState::*;
        let path = [
            (Direction::Read, ClientHello, ServerHello),
            (Direction::Read, ServerHello, Certificate),
            (Direction::Read, Certificate, ServerHelloDone),
            (Direction::Write, ServerHelloDone, ClientKeyExchange),
            (Direction::Write, ClientKeyExchange, ChangeCipherSpec),
            (Direction::Write, ChangeCipherSpec, Finished),
            (Direction::Read, Finished, ChangeCipherSpec),
            (Direction::Read, ChangeCipherSpec, EncryptedHandshake),
            (Direction::Read, EncryptedHandshake, Application),
            (Direction::Write, Application, Application),
            (Direction::Write, Application, Alert),
            (Direction::Write, Alert, CloseNotify),
        ];
        for (direction, from, to) in path.iter() {
            assert_eq!(transition(*direction, *from, *to), Ok(*to), "{:?} {:?} -> {:?}", direction, from, to);
        }
    }

    #[test]
    fn application_data_before_change_cipher_spec_is_rejected() {
        assert_eq!(
            transition(Direction::Read, ProtocolState::Finished, ProtocolState::Application),
            Err(TLSError::ProtocolStateError {
                direction: Direction::Read,
                from: ProtocolState::Finished,
                to: ProtocolState::Application,
            })
        );
        assert!(!is_legal_transition(Direction::Write, ProtocolState::ClientHello, ProtocolState::Application));
    }

    #[test]
    fn tables_are_direction_specific() {
        // ServerHelloDone -> ClientKeyExchange is a write, never a read.
        assert!(is_legal_transition(Direction::Write, ProtocolState::ServerHelloDone, ProtocolState::ClientKeyExchange));
        assert!(!is_legal_transition(Direction::Read, ProtocolState::ServerHelloDone, ProtocolState::ClientKeyExchange));
    }

    #[test]
    fn closed_is_terminal() {
        for to in ProtocolState::ALL.iter() {
            assert!(!is_legal_transition(Direction::Read, ProtocolState::Closed, *to));
            assert!(!is_legal_transition(Direction::Write, ProtocolState::Closed, *to));
        }
    }
}
