//! Fixed-layout wire messages exchanged between host, opponent and spectators.
//!
//! Every frame on the socket is `[type:u8][payload_len:u16-LE][payload]`, the
//! payload never longer than [`MAX_MSG_PAYLOAD`]. Name fields occupy exactly
//! [`MAX_NAME_LEN`] bytes, NUL-padded and always NUL-terminated; over-long
//! names are truncated silently. Packing and unpacking are pure byte
//! operations with no I/O so the codec can be tested byte-for-byte.

use crate::{MAX_MSG_PAYLOAD, MAX_NAME_LEN, MSG_HEADER_SIZE};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload of {len} bytes is too short for {kind:?}")]
    ShortPayload { kind: MsgType, len: usize },
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("unknown client role {0}")]
    UnknownRole(u8),
    #[error("state snapshot of {0} bytes exceeds the payload limit")]
    OversizedState(usize),
    #[error("truncated frame header")]
    ShortHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Hello = 1,
    Welcome = 2,
    GameStart = 3,
    Input = 4,
    State = 5,
    GameOver = 6,
    Pause = 7,
    Resume = 8,
    Quit = 9,
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(MsgType::Hello),
            2 => Ok(MsgType::Welcome),
            3 => Ok(MsgType::GameStart),
            4 => Ok(MsgType::Input),
            5 => Ok(MsgType::State),
            6 => Ok(MsgType::GameOver),
            7 => Ok(MsgType::Pause),
            8 => Ok(MsgType::Resume),
            9 => Ok(MsgType::Quit),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// What a connecting peer wants to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Role {
    #[default]
    Player = 0,
    Spectator = 1,
}

impl TryFrom<u8> for Role {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Role::Player),
            1 => Ok(Role::Spectator),
            other => Err(ProtocolError::UnknownRole(other)),
        }
    }
}

/// Pause reason carried in [`Message::Pause`]; only one exists today.
pub const PAUSE_REASON_DISCONNECT: u8 = 0;

/// The 3-byte frame header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u8,
    pub payload_len: u16,
}

impl Header {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < MSG_HEADER_SIZE {
            return Err(ProtocolError::ShortHeader);
        }
        Ok(Header {
            kind: bytes[0],
            payload_len: u16::from_le_bytes([bytes[1], bytes[2]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello {
        name: String,
        role: Role,
    },
    Welcome {
        host_name: String,
        opponent_name: String,
        assigned_id: u8,
    },
    GameStart {
        game_type: u8,
        p1_name: String,
        p2_name: String,
    },
    Input {
        key: i32,
    },
    /// Opaque game snapshot; layout belongs to the game implementation.
    State {
        snapshot: Vec<u8>,
    },
    GameOver {
        winner_id: u8,
        winner_name: String,
    },
    Pause {
        reason: u8,
    },
    Resume,
    Quit,
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Hello { .. } => MsgType::Hello,
            Message::Welcome { .. } => MsgType::Welcome,
            Message::GameStart { .. } => MsgType::GameStart,
            Message::Input { .. } => MsgType::Input,
            Message::State { .. } => MsgType::State,
            Message::GameOver { .. } => MsgType::GameOver,
            Message::Pause { .. } => MsgType::Pause,
            Message::Resume => MsgType::Resume,
            Message::Quit => MsgType::Quit,
        }
    }

    /// Packs the message into a complete header + payload frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::with_capacity(2 * MAX_NAME_LEN + 1);
        match self {
            Message::Hello { name, role } => {
                put_name(&mut payload, name);
                payload.push(*role as u8);
            }
            Message::Welcome {
                host_name,
                opponent_name,
                assigned_id,
            } => {
                put_name(&mut payload, host_name);
                put_name(&mut payload, opponent_name);
                payload.push(*assigned_id);
            }
            Message::GameStart {
                game_type,
                p1_name,
                p2_name,
            } => {
                payload.push(*game_type);
                put_name(&mut payload, p1_name);
                put_name(&mut payload, p2_name);
            }
            Message::Input { key } => payload.extend_from_slice(&key.to_le_bytes()),
            Message::State { snapshot } => {
                if snapshot.len() > MAX_MSG_PAYLOAD {
                    return Err(ProtocolError::OversizedState(snapshot.len()));
                }
                payload.extend_from_slice(snapshot);
            }
            Message::GameOver {
                winner_id,
                winner_name,
            } => {
                payload.push(*winner_id);
                put_name(&mut payload, winner_name);
            }
            Message::Pause { reason } => payload.push(*reason),
            Message::Resume | Message::Quit => {}
        }

        debug_assert!(payload.len() <= MAX_MSG_PAYLOAD);
        let mut frame = Vec::with_capacity(MSG_HEADER_SIZE + payload.len());
        frame.push(self.msg_type() as u8);
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Unpacks one payload whose type byte was already read from the header.
    pub fn decode(kind: u8, payload: &[u8]) -> Result<Message, ProtocolError> {
        let kind = MsgType::try_from(kind)?;
        let need = |min: usize| -> Result<(), ProtocolError> {
            if payload.len() < min {
                Err(ProtocolError::ShortPayload {
                    kind,
                    len: payload.len(),
                })
            } else {
                Ok(())
            }
        };

        match kind {
            MsgType::Hello => {
                need(MAX_NAME_LEN + 1)?;
                Ok(Message::Hello {
                    name: get_name(&payload[..MAX_NAME_LEN]),
                    role: Role::try_from(payload[MAX_NAME_LEN])?,
                })
            }
            MsgType::Welcome => {
                need(2 * MAX_NAME_LEN + 1)?;
                Ok(Message::Welcome {
                    host_name: get_name(&payload[..MAX_NAME_LEN]),
                    opponent_name: get_name(&payload[MAX_NAME_LEN..2 * MAX_NAME_LEN]),
                    assigned_id: payload[2 * MAX_NAME_LEN],
                })
            }
            MsgType::GameStart => {
                need(1 + 2 * MAX_NAME_LEN)?;
                Ok(Message::GameStart {
                    game_type: payload[0],
                    p1_name: get_name(&payload[1..1 + MAX_NAME_LEN]),
                    p2_name: get_name(&payload[1 + MAX_NAME_LEN..1 + 2 * MAX_NAME_LEN]),
                })
            }
            MsgType::Input => {
                need(4)?;
                Ok(Message::Input {
                    key: i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }
            MsgType::State => Ok(Message::State {
                snapshot: payload.to_vec(),
            }),
            MsgType::GameOver => {
                need(1 + MAX_NAME_LEN)?;
                Ok(Message::GameOver {
                    winner_id: payload[0],
                    winner_name: get_name(&payload[1..1 + MAX_NAME_LEN]),
                })
            }
            MsgType::Pause => {
                need(1)?;
                Ok(Message::Pause { reason: payload[0] })
            }
            MsgType::Resume => Ok(Message::Resume),
            MsgType::Quit => Ok(Message::Quit),
        }
    }
}

/// Appends a fixed-width, NUL-padded name field. Over-long names lose their
/// tail so the final byte stays a terminator.
fn put_name(buf: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; MAX_NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(MAX_NAME_LEN - 1);
    field[..n].copy_from_slice(&bytes[..n]);
    buf.extend_from_slice(&field);
}

fn get_name(field: &[u8]) -> String {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(MAX_NAME_LEN - 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
