//! HTTP response and the line-oriented message parser.
//!
//! A response starts life from its status line
//! ([`HttpResponse::from_status_line`]); header lines are then fed one at a
//! time to [`HttpResponse::parse_header_line`] until the blank line, after
//! which [`HttpResponse::body_mode`] tells the reader how the body is framed.

use crate::base::neterror::NetError;
use crate::cookies::canonicalcookie::CookieRecord;
use crate::http::orderedheaders::HeaderMultimap;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use url::Url;

/// How the body of a response is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body at all (HEAD, 1xx, 204, 304).
    None,
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// `Content-Length: N`.
    Length(u64),
    /// Delimited by the server closing the connection.
    Close,
}

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    version: String,
    status: u16,
    reason: String,
    headers: HeaderMultimap,
    body: BytesMut,
    effective_url: Option<Url>,
    cookies: Vec<CookieRecord>,
    last_header: Option<String>,
    headers_complete: bool,
}

impl HttpResponse {
    /// Parse `HTTP/<ver> <code> [reason]`.
    pub fn from_status_line(line: &str) -> Result<Self, NetError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let malformed = || NetError::MalformedResponse(format!("Malformed response: {:?}", line));

        let rest = line.strip_prefix("HTTP/").ok_or_else(malformed)?;
        let mut parts = rest.splitn(3, ' ');
        let version = parts.next().ok_or_else(malformed)?;
        if !is_version(version) {
            return Err(malformed());
        }
        let code = parts.next().ok_or_else(malformed)?;
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let status: u16 = code.parse().map_err(|_| malformed())?;
        if status < 100 {
            return Err(malformed());
        }

        let reason = match parts.next().map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => reason.to_string(),
            None => StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
                .to_string(),
        };

        Ok(Self {
            version: version.to_string(),
            status,
            reason,
            headers: HeaderMultimap::new(),
            body: BytesMut::new(),
            effective_url: None,
            cookies: Vec::new(),
            last_header: None,
            headers_complete: false,
        })
    }

    /// Feed one header line. Returns `true` once the blank line ending the
    /// header block has been seen.
    ///
    /// A line starting with whitespace continues the previous header value.
    pub fn parse_header_line(&mut self, line: &str) -> Result<bool, NetError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            self.finish_headers();
            return Ok(true);
        }

        if line.starts_with([' ', '\t']) {
            let Some(name) = self.last_header.clone() else {
                return Err(NetError::MalformedResponse(format!(
                    "continuation line without a header: {:?}",
                    line
                )));
            };
            self.headers.extend_last(&name, line.trim());
            return Ok(false);
        }

        let (name, value) = line.split_once(':').ok_or_else(|| {
            NetError::MalformedResponse(format!("header line without colon: {:?}", line))
        })?;
        let name = name.trim();
        self.headers
            .append(name, value.trim())
            .map_err(|_| NetError::MalformedResponse(format!("invalid header line: {:?}", line)))?;
        self.last_header = Some(name.to_ascii_lowercase());
        Ok(false)
    }

    /// Folded values are only final once the header block ends, so cookies
    /// are extracted here rather than line by line.
    fn finish_headers(&mut self) {
        if self.headers_complete {
            return;
        }
        self.headers_complete = true;
        self.last_header = None;
        if let Some(lines) = self.headers.get_all("set-cookie") {
            for line in lines {
                match CookieRecord::parse_set_cookie(line) {
                    Ok(cookie) => self.cookies.push(cookie),
                    Err(e) => tracing::debug!(error = %e, "ignoring Set-Cookie"),
                }
            }
        }
    }

    /// Build a response from its full text: status line, header lines
    /// separated by LF or CRLF, a blank line, then the body.
    pub fn from_raw(raw: &str) -> Result<Self, NetError> {
        let (head, body) = split_head(raw);
        let mut lines = head.split('\n');
        let status_line = lines
            .next()
            .ok_or_else(|| NetError::MalformedResponse("empty response".into()))?;
        let mut response = Self::from_status_line(status_line)?;
        for line in lines {
            response.parse_header_line(line)?;
        }
        response.parse_header_line("")?;
        if let Some(body) = body {
            response.append_body(body.as_bytes());
        }
        Ok(response)
    }

    /// Select the body framing. `head_request` marks a response to HEAD.
    pub fn body_mode(&self, head_request: bool) -> Result<BodyMode, NetError> {
        if head_request || self.is_informational() || self.status == 204 || self.status == 304 {
            return Ok(BodyMode::None);
        }

        let chunked = self
            .headers
            .get("transfer-encoding")
            .map(|te| {
                te.split(',')
                    .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false);
        if chunked {
            return Ok(BodyMode::Chunked);
        }

        match self.headers.get_all("content-length") {
            Some(values) => {
                let mut length: Option<u64> = None;
                for value in values.iter().flat_map(|v| v.split(',')) {
                    let parsed: u64 = value.trim().parse().map_err(|_| {
                        NetError::MalformedResponse(format!("invalid Content-Length {:?}", value))
                    })?;
                    if length.is_some_and(|l| l != parsed) {
                        return Err(NetError::MalformedResponse(
                            "conflicting Content-Length headers".into(),
                        ));
                    }
                    length = Some(parsed);
                }
                Ok(length.map_or(BodyMode::Close, BodyMode::Length))
            }
            None => Ok(BodyMode::Close),
        }
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub(crate) fn set_effective_url(&mut self, url: Url) {
        self.effective_url = Some(url);
    }

    /// Get the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    /// Protocol version from the status line, e.g. `"1.1"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMultimap {
        &self.headers
    }

    /// All values of `name` joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Last URL requested after following redirects.
    pub fn effective_url(&self) -> Option<&Url> {
        self.effective_url.as_ref()
    }

    /// Cookies from the `Set-Cookie` headers.
    pub fn cookies(&self) -> &[CookieRecord] {
        &self.cookies
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        is_redirect_status(self.status)
    }

    /// Whether the server asked to close the connection after this response.
    pub fn wants_close(&self) -> bool {
        match self.headers.get("connection") {
            Some(value) => value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("close")),
            None => self.version == "1.0",
        }
    }
}

/// Status codes followed as redirects.
pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn is_version(version: &str) -> bool {
    match version.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        None => version.len() == 1 && version.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Split raw response text at the first blank line.
fn split_head(raw: &str) -> (&str, Option<&str>) {
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let lf = raw.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((idx, len)) => (&raw[..idx], Some(&raw[idx + len..])),
        None => (raw, None),
    }
}
