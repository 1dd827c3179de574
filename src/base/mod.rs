//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): error taxonomy (connection, message, logic)
//! - [`LoadState`](loadstate::LoadState): states of one logical send

pub mod context;
pub mod loadstate;
pub mod neterror;
