//! # Common Components
//!
//! Shared building blocks used by the server and by protocol test clients.
//!
//! ## Modules
//!
//! - [`protocol`]: message headers, payload structs, and line encode/parse
//! - [`codes`]: the closed status-code catalog
//! - [`connection`]: line-framed TCP connection wrapper
//! - [`config`]: TOML configuration structures and loading

pub mod codes;
pub mod config;
pub mod connection;
pub mod protocol;
