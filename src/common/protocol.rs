//! # Wire Protocol
//!
//! Defines the control-plane message set: one message per line, UTF-8 text
//! terminated by a newline. A line is either a bare header or a header
//! followed by a single space and a JSON body:
//!
//! ```text
//! LOGIN {"username":"alice"}
//! PING
//! ```
//!
//! Inbound lines are parsed into a [`Request`]; outbound messages are built
//! from typed payload structs with [`encode`]. A known header with a body
//! that fails to deserialize is a recoverable parse error, reported back to
//! the client as `PARSE_ERROR` without dropping the connection.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Map;

// ============================================================================
// HEADERS
// ============================================================================

pub const LOGIN: &str = "LOGIN";
pub const LOGIN_RESP: &str = "LOGIN_RESP";
pub const WELCOME: &str = "WELCOME";
pub const PING: &str = "PING";
pub const PONG: &str = "PONG";
pub const PONG_ERROR: &str = "PONG_ERROR";
pub const BYE: &str = "BYE";
pub const BYE_RESP: &str = "BYE_RESP";
pub const JOINED: &str = "JOINED";
pub const LEFT: &str = "LEFT";
pub const BROADCAST_REQ: &str = "BROADCAST_REQ";
pub const BROADCAST: &str = "BROADCAST";
pub const BROADCAST_RESP: &str = "BROADCAST_RESP";
pub const LIST_USERS_REQ: &str = "LIST_USERS_REQ";
pub const LIST_USERS_RESP: &str = "LIST_USERS_RESP";
pub const PRIVATE_MESSAGE_REQ: &str = "PRIVATE_MESSAGE_REQ";
pub const PRIVATE_MESSAGE: &str = "PRIVATE_MESSAGE";
pub const PRIVATE_MESSAGE_RESP: &str = "PRIVATE_MESSAGE_RESP";
pub const START_GAME_REQ: &str = "START_GAME_REQ";
pub const START_GAME_RESP: &str = "START_GAME_RESP";
pub const JOIN_GAME_REQ: &str = "JOIN_GAME_REQ";
pub const JOIN_GAME_RESP: &str = "JOIN_GAME_RESP";
pub const GUESS_NUMBER_REQ: &str = "GUESS_NUMBER_REQ";
pub const GUESS_NUMBER_RESP: &str = "GUESS_NUMBER_RESP";
pub const GAME_NOTIFICATION: &str = "GAME_NOTIFICATION";
pub const GAME_RESULTS: &str = "GAME_RESULTS";
pub const FILE_TRANSFER_REQUEST: &str = "FILE_TRANSFER_REQUEST";
pub const FILE_TRANSFER_RESPONSE: &str = "FILE_TRANSFER_RESPONSE";
pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

/// Leaderboard sentinel for participants without a recorded correct guess.
pub const TIMED_OUT_SENTINEL: &str = "-timed out-";

// ============================================================================
// REQUEST PAYLOADS (client -> server)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessageRequest {
    pub receiver: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessRequest {
    /// Guessed value. Parsed as i64 so out-of-range values survive parsing
    /// and can be answered with the proper out-of-range response.
    pub guess: i64,
}

/// Control-plane half of the file-transfer handshake, forwarded between the
/// two clients. The server fills `sender` before routing to the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub receiver: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

/// Accept/reject answer to a [`FileTransferRequest`]. On acceptance the
/// server mints the transfer identifier both data-plane connections must
/// present to the rendezvous listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferResponse {
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

// ============================================================================
// RESPONSE PAYLOADS (server -> client)
// ============================================================================

/// Minimal `{status, code}` body shared by LOGIN_RESP, BROADCAST_RESP,
/// BYE_RESP, START_GAME_RESP, JOIN_GAME_RESP and PONG_ERROR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    pub code: u32,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "OK".into(),
            code: super::codes::OK,
        }
    }

    pub fn error(code: u32) -> Self {
        Self {
            status: "ERROR".into(),
            code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Welcome {
    pub message: String,
}

/// Body of JOINED and LEFT presence notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessageResponse {
    pub status: String,
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Game announcements and game-flow errors. `code` is zero on purely
/// informational notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameNotification {
    pub status: String,
    #[serde(default)]
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GameNotification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            status: "OK".into(),
            code: super::codes::OK,
            message: Some(message.into()),
        }
    }

    pub fn error(code: u32) -> Self {
        Self {
            status: "ERROR".into(),
            code,
            message: None,
        }
    }
}

/// Answer to a guess: a textual status (`TOO_LOW`, `TOO_HIGH`, `CORRECT`,
/// `OUT_OF_RANGE`) plus the ternary comparison of guess vs. target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<i32>,
}

/// Final leaderboard. `results` maps username to `"<millis> ms"` or the
/// timed-out sentinel; insertion order is the published ranking, which is
/// why the crate enables serde_json's `preserve_order` feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResults {
    pub status: String,
    pub results: Map<String, serde_json::Value>,
}

/// Empty body for PARSE_ERROR responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// INBOUND LINE PARSING
// ============================================================================

/// A fully parsed inbound control-plane message.
#[derive(Debug, Clone)]
pub enum Request {
    Login(LoginRequest),
    Pong,
    Bye,
    Broadcast(BroadcastRequest),
    ListUsers,
    PrivateMessage(PrivateMessageRequest),
    StartGame,
    JoinGame,
    Guess(GuessRequest),
    FileTransferRequest(FileTransferRequest),
    FileTransferResponse(FileTransferResponse),
}

/// Why an inbound line could not be turned into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// Known header, body failed to deserialize.
    Malformed { header: String },
    /// Header not part of the protocol. Logged and dropped, no response.
    UnknownHeader { header: String },
}

/// Split an inbound line into its header token and optional JSON body, then
/// deserialize the body for headers that require one.
///
/// # Arguments
/// - `line`: one complete line with the trailing newline already stripped
///
/// # Returns
/// - `Ok(Request)`: the parsed message
/// - `Err(LineError)`: malformed body or unknown header
pub fn parse_line(line: &str) -> Result<Request, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (header, body) = match line.split_once(' ') {
        Some((h, b)) => (h, b),
        None => (line, ""),
    };

    fn body_of<T: for<'de> Deserialize<'de>>(header: &str, body: &str) -> Result<T, LineError> {
        serde_json::from_str(body).map_err(|_| LineError::Malformed {
            header: header.to_string(),
        })
    }

    match header {
        LOGIN => Ok(Request::Login(body_of(header, body)?)),
        PONG => Ok(Request::Pong),
        BYE => Ok(Request::Bye),
        BROADCAST_REQ => Ok(Request::Broadcast(body_of(header, body)?)),
        LIST_USERS_REQ => Ok(Request::ListUsers),
        PRIVATE_MESSAGE_REQ => Ok(Request::PrivateMessage(body_of(header, body)?)),
        START_GAME_REQ => Ok(Request::StartGame),
        JOIN_GAME_REQ => Ok(Request::JoinGame),
        GUESS_NUMBER_REQ => Ok(Request::Guess(body_of(header, body)?)),
        FILE_TRANSFER_REQUEST => Ok(Request::FileTransferRequest(body_of(header, body)?)),
        FILE_TRANSFER_RESPONSE => Ok(Request::FileTransferResponse(body_of(header, body)?)),
        other => Err(LineError::UnknownHeader {
            header: other.to_string(),
        }),
    }
}

// ============================================================================
// OUTBOUND ENCODING
// ============================================================================

/// Encode a header plus JSON body into one wire line (without the newline).
pub fn encode<T: Serialize>(header: &str, body: &T) -> Result<String> {
    let json = serde_json::to_string(body)?;
    Ok(format!("{} {}", header, json))
}

/// Username format rule: 3-14 characters, ASCII letters, digits, underscore.
pub fn is_valid_username(name: &str) -> bool {
    (3..=14).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
