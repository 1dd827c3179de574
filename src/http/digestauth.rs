//! HTTP Digest Authentication (RFC 7616).
//!
//! Parses a `WWW-Authenticate`/`Proxy-Authenticate` Digest challenge and
//! computes the matching `Authorization`/`Proxy-Authorization` value. A fresh
//! client nonce is drawn for every challenge; nothing is cached across
//! unrelated requests.
//!
//! ## Supported Features
//! - MD5 and SHA-256 algorithms
//! - qop=auth (quality of protection) and the legacy qop-less form
//! - Session-based algorithms (MD5-sess, SHA-256-sess)

use crate::base::neterror::NetError;
use boring::hash::{hash, MessageDigest};
use rand::Rng;

/// Digest authentication algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// Unspecified - defaults to MD5
    #[default]
    Unspecified,
    /// MD5
    Md5,
    /// MD5-sess (session-based)
    Md5Sess,
    /// SHA-256
    Sha256,
    /// SHA-256-sess (session-based)
    Sha256Sess,
}

impl DigestAlgorithm {
    /// Parse algorithm from header value.
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "md5-sess" => Some(Self::Md5Sess),
            "sha-256" => Some(Self::Sha256),
            "sha-256-sess" => Some(Self::Sha256Sess),
            _ => None,
        }
    }

    /// Get the algorithm name for the Authorization header.
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
            Self::Sha256 => "SHA-256",
            Self::Sha256Sess => "SHA-256-sess",
        }
    }

    /// Check if this is a session-based algorithm.
    fn is_session(&self) -> bool {
        matches!(self, Self::Md5Sess | Self::Sha256Sess)
    }
}

/// Quality of Protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qop {
    /// Unspecified
    #[default]
    Unspecified,
    /// Authentication only
    Auth,
    /// Authentication with integrity
    AuthInt,
}

impl Qop {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Auth => "auth",
            Self::AuthInt => "auth-int",
        }
    }
}

/// A parsed Digest challenge, ready to answer.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: DigestAlgorithm,
    qop: Qop,
    stale: bool,
    nonce_count: u32,
}

impl DigestChallenge {
    /// Pick the Digest challenge out of one or more `WWW-Authenticate` values.
    ///
    /// Other schemes offered next to it (e.g. `Basic realm="x"`) are skipped.
    pub fn from_headers<'a, I>(values: I) -> Option<Result<Self, NetError>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        values.into_iter().find_map(|value| {
            let start = find_scheme(value, "digest")?;
            Some(Self::parse_challenge(&value[start..]))
        })
    }

    /// Parse a Digest challenge.
    ///
    /// # Arguments
    /// * `header` - The header value after the "Digest " prefix
    ///
    /// # Example
    /// ```ignore
    /// let challenge = DigestChallenge::parse_challenge(
    ///     r#"realm="test", nonce="abc123", qop="auth", algorithm=MD5"#
    /// )?;
    /// ```
    pub fn parse_challenge(header: &str) -> Result<Self, NetError> {
        let mut challenge = Self {
            realm: String::new(),
            nonce: String::new(),
            opaque: None,
            algorithm: DigestAlgorithm::default(),
            qop: Qop::default(),
            stale: false,
            nonce_count: 0,
        };

        for part in split_challenge(header) {
            let Some((key, value)) = parse_param(part) else {
                // Another scheme's challenge follows.
                break;
            };
            match key.to_lowercase().as_str() {
                "realm" => challenge.realm = value.to_string(),
                "nonce" => challenge.nonce = value.to_string(),
                "opaque" => challenge.opaque = Some(value.to_string()),
                "algorithm" => {
                    challenge.algorithm = DigestAlgorithm::from_str(value).ok_or_else(|| {
                        NetError::MalformedResponse(format!(
                            "unsupported digest algorithm '{}'",
                            value
                        ))
                    })?;
                }
                "qop" => {
                    // Comma-separated list; only "auth" is supported
                    if value
                        .split(',')
                        .any(|q| q.trim().eq_ignore_ascii_case("auth"))
                    {
                        challenge.qop = Qop::Auth;
                    }
                }
                "stale" => challenge.stale = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if challenge.nonce.is_empty() {
            return Err(NetError::MalformedResponse(
                "digest challenge without nonce".into(),
            ));
        }

        Ok(challenge)
    }

    /// Generate the `Authorization` header value, including the "Digest " prefix.
    ///
    /// `uri` is the request target exactly as sent on the request line.
    pub fn generate_auth_token(
        &mut self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<String, NetError> {
        self.nonce_count += 1;
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = generate_cnonce();
        let response = self.compute_response(method, uri, username, password, &cnonce, &nc)?;
        Ok(self.assemble_credentials(username, uri, &response, &cnonce, &nc))
    }

    fn compute_response(
        &self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        cnonce: &str,
        nc: &str,
    ) -> Result<String, NetError> {
        // HA1 = H(user:realm:password)
        let mut ha1 = self.hex_hash(&format!("{}:{}:{}", username, self.realm, password))?;

        // For session algorithms: HA1 = H(H(user:realm:pass):nonce:cnonce)
        if self.algorithm.is_session() {
            ha1 = self.hex_hash(&format!("{}:{}:{}", ha1, self.nonce, cnonce))?;
        }

        // HA2 = H(method:uri)
        let ha2 = self.hex_hash(&format!("{}:{}", method, uri))?;

        let response_input = if self.qop != Qop::Unspecified {
            format!(
                "{}:{}:{}:{}:{}:{}",
                ha1,
                self.nonce,
                nc,
                cnonce,
                self.qop.as_str(),
                ha2
            )
        } else {
            format!("{}:{}:{}", ha1, self.nonce, ha2)
        };

        self.hex_hash(&response_input)
    }

    /// Compute hex-encoded hash using the configured algorithm.
    fn hex_hash(&self, input: &str) -> Result<String, NetError> {
        let md = match self.algorithm {
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha256Sess => MessageDigest::sha256(),
            _ => MessageDigest::md5(),
        };

        let digest = hash(md, input.as_bytes())
            .map_err(|e| NetError::InvalidArgument(format!("digest hashing failed: {}", e)))?;
        Ok(digest.iter().map(|byte| format!("{:02x}", byte)).collect())
    }

    fn assemble_credentials(
        &self,
        username: &str,
        uri: &str,
        response: &str,
        cnonce: &str,
        nc: &str,
    ) -> String {
        let mut auth = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
            username, self.realm, self.nonce, uri
        );

        if self.algorithm != DigestAlgorithm::Unspecified {
            auth.push_str(&format!(", algorithm={}", self.algorithm.as_str()));
        }

        auth.push_str(&format!(", response=\"{}\"", response));

        if let Some(ref opaque) = self.opaque {
            auth.push_str(&format!(", opaque=\"{}\"", opaque));
        }

        if self.qop != Qop::Unspecified {
            auth.push_str(&format!(
                ", qop={}, nc={}, cnonce=\"{}\"",
                self.qop.as_str(),
                nc,
                cnonce
            ));
        }

        auth
    }

    /// Check if this challenge indicates stale credentials (nonce expired).
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Get the realm for this challenge.
    pub fn realm(&self) -> &str {
        &self.realm
    }
}

/// Offset just past `scheme` in a challenge header, if the scheme is offered.
fn find_scheme(value: &str, scheme: &str) -> Option<usize> {
    let lower = value.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(scheme) {
        let idx = from + pos;
        let end = idx + scheme.len();
        let at_start = idx == 0 || matches!(lower.as_bytes()[idx - 1], b' ' | b',');
        let followed = lower.as_bytes().get(end).map_or(true, |b| *b == b' ');
        if at_start && followed {
            return Some(end);
        }
        from = end;
    }
    None
}

/// Split challenge into individual parameters.
fn split_challenge(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in header.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                let part = header[start..i].trim();
                if !part.is_empty() {
                    parts.push(part);
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    let part = header[start..].trim();
    if !part.is_empty() {
        parts.push(part);
    }

    parts
}

/// Parse a single key=value or key="value" parameter.
fn parse_param(param: &str) -> Option<(&str, &str)> {
    let eq_pos = param.find('=')?;
    let key = param[..eq_pos].trim();
    if key.contains(' ') {
        return None;
    }
    let mut value = param[eq_pos + 1..].trim();

    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value = &value[1..value.len() - 1];
    }

    Some((key, value))
}

/// Generate a random 16-hex-digit client nonce.
fn generate_cnonce() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}
