//! # Server Components
//!
//! - [`server`]: both TCP listeners and their accept loops
//! - [`session`]: per-connection control-plane session and heartbeat monitor
//! - [`registry`]: process-wide map of logged-in users
//! - [`game`]: guessing-game orchestrator state machine
//! - [`rendezvous`]: data-plane file-transfer pairing and relay

pub mod game;
pub mod registry;
pub mod rendezvous;
pub mod server;
pub mod session;

pub use game::GameOrchestrator;
pub use registry::Registry;
pub use rendezvous::Rendezvous;
pub use server::Server;
pub use session::Session;
