// coedit Gateway - shout relay for shared documents
//
// This crate implements the WebSocket relay that gives every client of a
// document the "shout" broadcast primitive, and the client side that plugs a
// relay connection into a presence hub.

pub mod client;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::{ConnectionGuard, RelayClient, RelayConnection, RelayShout};
pub use protocol::*;
pub use server::RelayServer;
pub use session::{DocumentRegistry, RelayedShout};
