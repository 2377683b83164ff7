//! Wire format of the terminal socket: one `directory:verb:argument` line in,
//! the command output verbatim out, on the same frame type.
//!
//! There is no escaping. Only the first two colons separate fields, so the
//! argument keeps any colons it contains.

use axum::extract::ws::Message;

pub const MALFORMED_REPLY: &str = "malformed command";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub directory: String,
    pub verb: String,
    pub argument: String,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected directory:verb:argument, got {segments} segment(s)")]
    Malformed { segments: usize },
}

impl CommandRequest {
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(directory), Some(verb), Some(argument)) => Ok(Self {
                directory: directory.to_string(),
                verb: verb.to_string(),
                argument: argument.to_string(),
            }),
            (_, Some(_), None) => Err(DecodeError::Malformed { segments: 2 }),
            _ => Err(DecodeError::Malformed { segments: 1 }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Payload of an inbound data frame, or `None` for control frames.
pub fn frame_text(msg: &Message) -> Option<(FrameKind, String)> {
    match msg {
        Message::Text(text) => Some((FrameKind::Text, text.clone())),
        Message::Binary(bytes) => Some((FrameKind::Binary, String::from_utf8_lossy(bytes).into_owned())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

pub fn encode_reply(kind: FrameKind, body: String) -> Message {
    match kind {
        FrameKind::Text => Message::Text(body),
        FrameKind::Binary => Message::Binary(body.into_bytes()),
    }
}
