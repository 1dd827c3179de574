//! The request API.
//!
//! - [`request`]: [`URLRequest`], built up by the caller and sent
//! - [`config`]: named configuration parameters
//! - [`adapter`]: what performs the send (socket engine or mock queue)

pub mod adapter;
pub mod config;
pub mod request;

pub use adapter::{Adapter, MockAdapter, SocketAdapter};
pub use config::{ConfigValue, RequestConfig};
pub use request::URLRequest;
