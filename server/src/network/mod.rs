//! Networking module for client-server communication.

mod server;

pub use server::{ClientConnection, ConnectionState, Server};
