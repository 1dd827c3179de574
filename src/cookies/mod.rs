//! Cookie storage and matching.
//!
//! - [`CookieRecord`](canonicalcookie::CookieRecord): a single cookie, parsed
//!   from `Set-Cookie` or built by hand
//! - [`CookieJar`](monster::CookieJar): thread-safe jar shared across requests
//! - [`psl`]: public-suffix guard for cookie domains
//! - [`persistence`]: JSON import and export
//!
//! # Example
//!
//! ```rust
//! use wirenet::cookies::canonicalcookie::CookieRecord;
//! use wirenet::cookies::monster::CookieJar;
//! use url::Url;
//!
//! let jar = CookieJar::new();
//! let url = Url::parse("http://example.com/a/page").unwrap();
//! jar.store(CookieRecord::new("id", "42"), &url).unwrap();
//! assert_eq!(jar.get_matching_header(&url).as_deref(), Some("id=42"));
//! ```

pub mod canonicalcookie;
pub mod monster;
pub mod persistence;
pub mod psl;

pub use canonicalcookie::CookieRecord;
pub use monster::CookieJar;
