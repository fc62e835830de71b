//! chatroom-relay — room-based WebSocket chat relay
//!
//! Browser clients connect over WebSocket, join a room by name and exchange
//! text/file messages with everyone else in that room. The relay tracks which
//! room each connection is in and fans events out to the right subset.

pub mod protocol;
pub mod relay;
pub mod rooms;
pub mod server;
pub mod service;
pub mod session;

pub use relay::{ConnectionState, Relay, RelayError, RelayEvent, RelayStats};
pub use server::RelayServer;
pub use service::RelayHandle;
