use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A single cookie.
///
/// `domain` and `path` are optional on a freshly parsed `Set-Cookie` line;
/// the jar fills them in from the request URL when the cookie is stored, so
/// every stored record has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    #[serde(with = "time::serde::timestamp::option")]
    pub expires: Option<OffsetDateTime>,
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Set when no `Domain` attribute was given, so only the exact host matches.
    #[serde(default)]
    pub host_only: bool,
    #[serde(with = "time::serde::timestamp", default = "OffsetDateTime::now_utc")]
    pub creation_time: OffsetDateTime,
}

impl CookieRecord {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
            host_only: false,
            creation_time: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_expires(mut self, expires: OffsetDateTime) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Parse one `Set-Cookie` header value.
    ///
    /// `Max-Age` wins over `Expires` when both are present.
    pub fn parse_set_cookie(line: &str) -> Result<Self, NetError> {
        let parsed = cookie::Cookie::parse(line)
            .map_err(|e| NetError::InvalidArgument(format!("bad Set-Cookie '{}': {}", line, e)))?;
        let now = OffsetDateTime::now_utc();

        let expires = match parsed.max_age() {
            Some(age) => Some(now + Duration::seconds(age.whole_seconds())),
            None => parsed.expires().and_then(|e| e.datetime()),
        };

        Ok(Self {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain: parsed
                .domain()
                .filter(|d| !d.is_empty())
                .map(|d| d.to_ascii_lowercase()),
            path: parsed
                .path()
                .filter(|p| p.starts_with('/'))
                .map(str::to_string),
            expires,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only: false,
            creation_time: now,
        })
    }

    pub fn is_expired(&self, current_time: OffsetDateTime) -> bool {
        match self.expires {
            Some(expiry) => expiry <= current_time,
            None => false,
        }
    }

    /// Session cookies carry no expiry and live only as long as the jar.
    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }

    /// `name=value` as sent in a `Cookie` header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Whether `name` is a valid cookie name (an RFC 7230 token).
pub fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
}
