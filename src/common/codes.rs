//! # Status-Code Catalog
//!
//! Every response carries a `status` of `OK`/`ERROR` plus an integer code
//! from this catalog. The catalog is closed: codes are part of the wire
//! contract and must not be renumbered.

/// Generic success code, sent with `"status": "OK"`.
pub const OK: u32 = 0;

// ========== LOGIN ERRORS (5xxx) ==========

/// Username is already held by another live session.
pub const USER_ALREADY_LOGGED_IN: u32 = 5000;
/// Username fails the format check (3-14 chars, letters/digits/underscore).
pub const USERNAME_INVALID_FORMAT_OR_LENGTH: u32 = 5001;
/// This connection already completed a login.
pub const USER_CANNOT_LOGIN_TWICE: u32 = 5002;

// ========== SESSION / ROUTING ERRORS (6xxx) ==========

/// The request requires a completed login.
pub const USER_NOT_LOGGED_IN: u32 = 6000;
/// The named recipient is not currently online.
pub const RECIPIENT_NOT_FOUND: u32 = 6001;
/// Fewer than two players enrolled before the join window closed.
pub const INSUFFICIENT_PLAYERS_TO_START_THE_GAME: u32 = 6002;
/// A game is already in progress; it cannot be started or joined.
pub const GAME_HAS_ALREADY_STARTED_CANNOT_JOIN: u32 = 6003;
/// The client is already enrolled in the pending game.
pub const USER_ALREADY_JOINED: u32 = 6004;
/// No game is accepting this action right now.
pub const NO_RUNNING_GAME: u32 = 6005;
/// The client is not enrolled in the running game.
pub const NOT_A_PARTICIPANT: u32 = 6006;
/// Private messages to oneself are rejected.
pub const SEND_TO_SELF_ERROR: u32 = 6007;
/// Private message body is empty or whitespace only.
pub const EMPTY_MESSAGE_BODY_ERROR: u32 = 6008;

// ========== PROTOCOL ERRORS (7xxx / 8xxx) ==========

/// Heartbeat acknowledgment did not arrive in time (client-facing catalog
/// entry; the server closes the connection without sending it).
pub const PONG_TIMEOUT: u32 = 7000;
/// A line arrived without a terminating newline before the peer closed.
pub const UNTERMINATED_MESSAGE: u32 = 7001;
/// Guess value lies outside the playable range.
pub const NUMBER_OUT_OF_ALLOWED_RANGE: u32 = 7007;
/// PONG received while no PING was outstanding.
pub const PONG_WITHOUT_PING: u32 = 8000;

// ========== GAME COMPLETION (9xxx) ==========

/// The round timer expired before every participant guessed correctly.
pub const GAME_TIMEOUT_WAS_REACHED: u32 = 9000;
