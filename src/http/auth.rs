//! Request credentials for server and proxy authentication.
//!
//! Basic credentials are sent pre-emptively; Digest credentials are held
//! until a challenge arrives (see [`crate::http::digestauth`]).

use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use zeroize::Zeroizing;

/// Authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// Basic authentication (base64 encoded)
    #[default]
    Basic,
    /// Digest authentication (challenge-response)
    Digest,
}

impl AuthScheme {
    /// Parse a scheme name as used in configuration (`basic`, `digest`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "digest" => Some(Self::Digest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Digest => "digest",
        }
    }
}

/// User, password and scheme for one request.
#[derive(Clone)]
pub struct AuthCredentials {
    user: String,
    password: Zeroizing<String>,
    scheme: AuthScheme,
}

impl AuthCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>, scheme: AuthScheme) -> Self {
        Self {
            user: user.into(),
            password: Zeroizing::new(password.into()),
            scheme,
        }
    }

    /// Create a basic auth entry.
    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(user, password, AuthScheme::Basic)
    }

    pub fn digest(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(user, password, AuthScheme::Digest)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// `Basic base64(user:password)`, usable for both `Authorization` and
    /// `Proxy-Authorization`.
    pub fn basic_header(&self) -> String {
        basic_header(&self.user, &self.password)
    }
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("scheme", &self.scheme)
            .finish()
    }
}

pub(crate) fn basic_header(user: &str, password: &str) -> String {
    let creds = format!("{}:{}", user, password);
    format!("Basic {}", general_purpose::STANDARD.encode(creds))
}
