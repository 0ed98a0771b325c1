//! Local stream transport: owning listeners and framed connections.

pub mod connection;
pub mod socket;

pub use connection::{Connection, ConnectionError, Received, Sent};
pub use socket::{ListenError, Listener};
