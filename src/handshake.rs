//! The three-message exchange that upgrades a TCP connection to
//! symmetric encryption.
//!
//! Each step travels as an ordinary OSC message on a reserved address;
//! the first argument is the protocol version, the second the sender's
//! public key as a blob. The wire identifies steps by address string
//! alone. Handshake messages are consumed before dispatch and never
//! reach the application, and they always travel unencrypted: the
//! session cipher switches on only after `begin`.
//!
//! Initiator:  None --request--> AwaitingApprove --approve-->
//!             ReadyToBegin --begin--> Complete
//! Responder:  None --request--> AwaitingBegin --begin--> Complete
//!             (sending approve on the request)

use crate::encrypt::{Keypair, SessionCipher};
use crate::errors::OscError;
use crate::types::{OscMessage, OscValue};

/// The only protocol revision this library speaks.
pub const PROTOCOL_VERSION: i32 = 1;

const ADDR_PREFIX: &[u8] = b"/!encryption/";
const REQUEST_ADDR: &str = "/!encryption/request";
const APPROVE_ADDR: &str = "/!encryption/approve";
const BEGIN_ADDR: &str = "/!encryption/begin";

/// Classifies a decoded frame payload as a handshake message by its
/// leading address bytes, in constant time over the prefix, without
/// decoding anything.
pub fn is_handshake_frame(frame: &[u8]) -> bool {
    if frame.len() < ADDR_PREFIX.len() {
        return false;
    }
    let mut diff = 0u8;
    for (byte, expected) in frame.iter().zip(ADDR_PREFIX) {
        diff |= byte ^ expected;
    }
    diff == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No handshake traffic yet.
    None,
    /// Initiator sent `request` and waits for `approve`.
    AwaitingApprove,
    /// Initiator holds the peer key and owes the peer a `begin`.
    ReadyToBegin,
    /// Responder approved and waits for `begin`.
    AwaitingBegin,
    /// Both sides hold the session key.
    Complete,
}

/// What the driving loop must do after feeding a handshake message to
/// [`Handshake::process`].
#[derive(Debug)]
pub enum HandshakeAction {
    /// Responder: send this approval back, still in the clear.
    Reply(OscMessage),
    /// Initiator: call [`Handshake::begin_message`], send it, then
    /// activate the cipher.
    SendBegin,
    /// The exchange is complete; activate the cipher.
    Activate,
}

/// Per-connection handshake state machine. Drives either role: the
/// side that calls [`Handshake::request_message`] becomes the
/// initiator, the side that first processes a `request` becomes the
/// responder.
#[derive(Debug)]
pub struct Handshake {
    keypair: Keypair,
    state: HandshakeState,
    peer_key: Option<Vec<u8>>,
}

impl Handshake {
    pub fn new(keypair: Keypair) -> Self {
        Handshake {
            keypair,
            state: HandshakeState::None,
            peer_key: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    /// Whether an exchange has started but not yet finished; reads on
    /// the connection should be under the handshake deadline while this
    /// holds.
    pub fn in_flight(&self) -> bool {
        !matches!(
            self.state,
            HandshakeState::None | HandshakeState::Complete
        )
    }

    /// Initiator entry point: produces the `request` message.
    pub fn request_message(&mut self) -> Result<OscMessage, OscError> {
        if self.state != HandshakeState::None {
            return Err(OscError::ProtocolError("encryption was already requested"));
        }
        self.state = HandshakeState::AwaitingApprove;
        Ok(self.step_message(REQUEST_ADDR))
    }

    /// Initiator: produces the `begin` message once the approval has
    /// been processed. Moves the machine to `Complete`; the caller must
    /// send the message before activating the cipher.
    pub fn begin_message(&mut self) -> Result<OscMessage, OscError> {
        if self.state != HandshakeState::ReadyToBegin {
            return Err(OscError::ProtocolError("no approval to begin from"));
        }
        self.state = HandshakeState::Complete;
        Ok(self.step_message(BEGIN_ADDR))
    }

    /// Feeds one received handshake message through the state machine.
    ///
    /// A version other than [`PROTOCOL_VERSION`] fails with
    /// `UnsupportedProtocol`; any step arriving out of order (including
    /// anything after `Complete`) fails with `ProtocolError`. Either
    /// way the connection must be closed.
    pub fn process(&mut self, msg: &OscMessage) -> Result<HandshakeAction, OscError> {
        let peer_key = check_payload(msg)?;

        match (msg.addr.as_str(), self.state) {
            (REQUEST_ADDR, HandshakeState::None) => {
                self.peer_key = Some(peer_key);
                self.state = HandshakeState::AwaitingBegin;
                Ok(HandshakeAction::Reply(self.step_message(APPROVE_ADDR)))
            }
            (APPROVE_ADDR, HandshakeState::AwaitingApprove) => {
                self.peer_key = Some(peer_key);
                self.state = HandshakeState::ReadyToBegin;
                Ok(HandshakeAction::SendBegin)
            }
            (BEGIN_ADDR, HandshakeState::AwaitingBegin) => {
                // The peer's key was stored on the request; the begin
                // carries it again and must not have changed.
                if self.peer_key.as_deref() != Some(peer_key.as_slice()) {
                    return Err(OscError::ProtocolError(
                        "public key changed between request and begin",
                    ));
                }
                self.state = HandshakeState::Complete;
                Ok(HandshakeAction::Activate)
            }
            (REQUEST_ADDR | APPROVE_ADDR | BEGIN_ADDR, _) => {
                Err(OscError::ProtocolError("handshake message out of order"))
            }
            _ => Err(OscError::ProtocolError("unknown handshake step")),
        }
    }

    /// Derives the symmetric cipher for this connection. Only valid
    /// once a peer key has been received.
    pub fn session_cipher(&self) -> Result<SessionCipher, OscError> {
        let peer_key = self
            .peer_key
            .as_ref()
            .ok_or(OscError::ProtocolError("no peer key received yet"))?;
        self.keypair.session(peer_key)
    }

    fn step_message(&self, addr: &str) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args: vec![
                OscValue::Int(PROTOCOL_VERSION),
                OscValue::Blob(self.keypair.public_bytes().to_vec()),
            ],
        }
    }
}

fn check_payload(msg: &OscMessage) -> Result<Vec<u8>, OscError> {
    let (version, key) = match msg.args.as_slice() {
        [OscValue::Int(version), OscValue::Blob(key)] => (*version, key),
        _ => {
            return Err(OscError::ProtocolError(
                "handshake message has malformed arguments",
            ))
        }
    };
    if version != PROTOCOL_VERSION {
        return Err(OscError::UnsupportedProtocol(version));
    }
    Ok(key.clone())
}
