//! # wirenet
//!
//! An HTTP/1.1 client engine that speaks the protocol itself over raw
//! TCP/TLS sockets.
//!
//! One [`send`](urlrequest::URLRequest::send) runs a chain of exchanges,
//! each on a fresh connection: it follows redirects (default or strict
//! policy), answers a Digest challenge once, rewinds the body when it has
//! to be sent again, swallows interim `1xx` responses and reports every
//! step to attached observers.
//!
//! ## Features
//!
//! - **Framing**: `Content-Length`, chunked coding both ways, streamed
//!   `multipart/form-data` uploads, `Expect: 100-continue`
//! - **Cookies**: thread-safe jar shared between requests, public-suffix
//!   guard, JSON persistence
//! - **Auth**: pre-emptive Basic, challenge-driven Digest (MD5, SHA-256)
//! - **Proxies**: HTTP (absolute-form and CONNECT) and SOCKS5
//! - **TLS**: BoringSSL with peer/host verification switches
//! - **Testing**: scripted [`MockTransport`](socket::MockTransport) and
//!   canned-response [`MockAdapter`](urlrequest::MockAdapter)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirenet::urlrequest::URLRequest;
//!
//! # async fn run() -> Result<(), wirenet::base::neterror::NetError> {
//! let mut request = URLRequest::with_url("https://example.com/", "GET")?;
//! request.set_config("follow_redirects", true)?;
//! let response = request.send().await?;
//! println!("Status: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`NetError`](base::neterror::NetError) in one of
//! three categories: connection (DNS, connect, TLS handshake), message
//! (malformed response, timeout, redirect limits) and logic (misuse and
//! misconfiguration).

pub mod base;
pub mod cookies;
pub mod http;
pub mod socket;
pub mod urlrequest;
