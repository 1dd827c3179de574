//! Connections.
//!
//! - [`transport`]: the `Transport`/`Connection` capability the engine is
//!   written against
//! - [`client`]: raw-socket transport, one fresh connection per exchange
//! - [`connectjob`]: DNS → TCP → proxy handshake → TLS
//! - [`proxy`]: HTTP and SOCKS5 proxy settings
//! - [`tls`]: certificate verification options for BoringSSL
//! - [`mock`]: scripted in-memory transport

pub mod client;
pub mod connectjob;
pub mod mock;
pub mod proxy;
pub mod tls;
pub mod transport;

pub use client::SocketTransport;
pub use mock::MockTransport;
pub use transport::{ConnectTarget, Connection, Transport};
