//! # chatlink
//!
//! A multi-client, line-oriented messaging server: clients log in with a
//! unique username, broadcast, exchange private messages, play a timed
//! multiplayer number-guessing game, and transfer files through a separate
//! data-plane rendezvous listener.
//!
//! ## Modules
//!
//! - [`common`]: wire protocol, status-code catalog, configuration, and the
//!   line-framed connection wrapper shared by the server and test clients
//! - [`server`]: control-plane session engine, user registry, game
//!   orchestrator, and file-transfer rendezvous

pub mod common;
pub mod server;

pub use common::config::ServerConfig;
pub use server::Server;

/// Protocol version announced in the WELCOME message.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
