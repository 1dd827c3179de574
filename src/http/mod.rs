//! HTTP/1.1 message handling.
//!
//! - [`orderedheaders`]: case-insensitive header multimap
//! - [`chunked`]: chunked transfer coding
//! - [`multipart`]: streamed `multipart/form-data` bodies
//! - [`requestbody`]: request body sources and the read cursor
//! - [`response`]: response type and line-oriented parser
//! - [`auth`], [`digestauth`]: credentials, Basic and Digest
//! - [`events`]: lifecycle events and observers
//! - [`transaction`]: the exchange state machine

pub mod auth;
pub mod chunked;
pub mod digestauth;
pub mod events;
pub mod multipart;
pub mod orderedheaders;
pub mod requestbody;
pub mod response;
pub mod transaction;

// Re-exports for convenience
pub use auth::{AuthCredentials, AuthScheme};
pub use events::{EventBus, NetEvent, Observer};
pub use orderedheaders::HeaderMultimap;
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use transaction::HttpTransaction;
