//! One logical send: a chain of HTTP/1.1 exchanges over fresh connections.
//!
//! Every exchange walks the same states: build the request head, connect,
//! write the head, optionally wait for `100 Continue`, stream the body, read
//! the response head (skipping interim responses), read the body, close.
//! Redirects and a single Digest re-authentication start another exchange
//! within the same send.

use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::cookies::monster::CookieJar;
use crate::http::auth::{AuthCredentials, AuthScheme};
use crate::http::chunked::{ChunkedDecoder, ChunkedEncoder};
use crate::http::digestauth::DigestChallenge;
use crate::http::events::{EventBus, NetEvent};
use crate::http::orderedheaders::HeaderMultimap;
use crate::http::requestbody::{BodyCursor, RequestBody};
use crate::http::response::{BodyMode, HttpResponse};
use crate::socket::proxy::{ProxySettings, ProxyType};
use crate::socket::transport::{ConnectTarget, Connection, Transport};
use crate::urlrequest::config::{ProtocolVersion, RequestConfig};
use bytes::BytesMut;
use http::Method;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::{Host, Url};

/// Longest status or header line accepted from a server.
const MAX_LINE: usize = 64 * 1024;

/// Bodies larger than this are preceded by `Expect: 100-continue`.
const EXPECT_CONTINUE_THRESHOLD: u64 = 1024 * 1024;

/// How long to wait for an interim response before sending the body anyway.
const CONTINUE_WAIT: Duration = Duration::from_secs(1);

/// Serialized request head plus what it committed the exchange to.
struct RequestHead {
    text: String,
    chunked: bool,
    expect_continue: bool,
}

enum Next {
    Done,
    Redirect(Url),
    Reauthenticate,
}

/// Drives one send to its final response.
pub struct HttpTransaction<'a> {
    transport: &'a dyn Transport,
    config: &'a RequestConfig,
    headers: &'a HeaderMultimap,
    events: Option<&'a EventBus>,
    jar: Option<&'a CookieJar>,
    credentials: Option<&'a AuthCredentials>,
    body: BodyCursor<'a>,
    method: Method,
    url: Url,
    proxy: Option<ProxySettings>,
    state: LoadState,
    deadline: Option<Instant>,
    redirects: u32,
    body_dropped: bool,
    body_touched: bool,
    authorization: Option<String>,
    proxy_authorization: Option<String>,
    digest_retried: bool,
    proxy_digest_retried: bool,
}

impl<'a> HttpTransaction<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        config: &'a RequestConfig,
        method: Method,
        url: Url,
        headers: &'a HeaderMultimap,
        body: &'a mut RequestBody,
    ) -> Self {
        Self {
            transport,
            config,
            headers,
            events: None,
            jar: None,
            credentials: None,
            body: BodyCursor::new(body),
            method,
            url,
            proxy: None,
            state: LoadState::Idle,
            deadline: None,
            redirects: 0,
            body_dropped: false,
            body_touched: false,
            authorization: None,
            proxy_authorization: None,
            digest_retried: false,
            proxy_digest_retried: false,
        }
    }

    pub fn with_events(mut self, events: &'a EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cookie_jar(mut self, jar: Option<&'a CookieJar>) -> Self {
        self.jar = jar;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<&'a AuthCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Body was rewound before an earlier send already consumed it.
    pub fn with_body_consumed(mut self, consumed: bool) -> Self {
        self.body_touched = consumed;
        self
    }

    pub fn load_state(&self) -> LoadState {
        self.state
    }

    /// Run exchanges until a final response is produced.
    pub async fn start(mut self) -> Result<HttpResponse, NetError> {
        self.proxy = self.config.proxy_settings()?;
        self.deadline = self.config.timeout.map(|t| Instant::now() + t);

        loop {
            let response = self.exchange().await?;
            match self.next_action(&response)? {
                Next::Done => {
                    self.set_state(LoadState::Done);
                    return Ok(response);
                }
                Next::Redirect(target) => {
                    self.set_state(LoadState::Redirecting);
                    self.url = target;
                }
                Next::Reauthenticate => self.set_state(LoadState::Reauthenticating),
            }
        }
    }

    /// One request/response round trip on a fresh connection.
    async fn exchange(&mut self) -> Result<HttpResponse, NetError> {
        self.set_state(LoadState::Building);
        if self.sends_body() && self.body_touched {
            self.body.rewind().await?;
            self.body_touched = false;
        }
        let head = self.build_head()?;

        self.set_state(LoadState::Connecting);
        let target = self.connect_target()?;
        let connect = within(self.deadline, self.transport.connect(&target));
        let mut conn = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(conn) => conn?,
            Err(_) => {
                debug!(host = %target.host, port = target.port, "connect timed out");
                return Err(NetError::TimedOut);
            }
        };

        let result = self.converse(conn.as_mut(), &head).await;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "error closing connection");
        }
        let response = result?;

        if let Some(jar) = self.jar {
            let stored = jar.add_cookies_from_response(&response);
            if stored > 0 {
                debug!(stored, url = %self.url, "stored response cookies");
            }
        }
        Ok(response)
    }

    async fn converse(
        &mut self,
        conn: &mut dyn Connection,
        head: &RequestHead,
    ) -> Result<HttpResponse, NetError> {
        self.set_state(LoadState::Sending);
        write_all(self.deadline, conn, head.text.as_bytes()).await?;
        self.publish(&NetEvent::SentHeaders(&head.text))?;

        let mut early = None;
        if self.sends_body() {
            if head.expect_continue {
                early = self.await_continue(conn).await?;
            }
            match early {
                None => self.send_body(conn, head.chunked).await?,
                Some(_) => self.publish(&NetEvent::SentBody(0))?,
            }
        }

        let mut response = match early {
            Some(response) => response,
            None => self.read_head(conn).await?,
        };
        response.set_effective_url(self.url.clone());
        self.publish(&NetEvent::ReceivedHeaders(&response))?;

        self.read_body(conn, &mut response).await?;
        self.publish(&NetEvent::ReceivedBody(&response))?;
        Ok(response)
    }

    fn sends_body(&self) -> bool {
        !self.body_dropped && !self.body.body().is_empty()
    }

    /// Wait briefly for the server's verdict on `Expect: 100-continue`.
    ///
    /// Returns a final response if the server answered without asking for
    /// the body; `None` means the body should be sent.
    async fn await_continue(
        &mut self,
        conn: &mut dyn Connection,
    ) -> Result<Option<HttpResponse>, NetError> {
        self.set_state(LoadState::AwaitingStatusLine);
        let line = match tokio::time::timeout(CONTINUE_WAIT, conn.read_line(MAX_LINE)).await {
            Err(_) => {
                debug!("no interim response, sending body");
                return Ok(None);
            }
            Ok(line) => line?,
        };
        let Some(line) = line else {
            return Err(NetError::MalformedResponse(
                "connection closed before a status line".into(),
            ));
        };
        let response = self.read_head_after(conn, line).await?;
        if response.is_informational() {
            Ok(None)
        } else {
            debug!(status = response.status(), "final response before the body was sent");
            Ok(Some(response))
        }
    }

    async fn send_body(&mut self, conn: &mut dyn Connection, chunked: bool) -> Result<(), NetError> {
        let size = self.config.buffer_size.max(1);
        let encoder = ChunkedEncoder::new(size);
        let mut total = 0u64;
        self.body_touched = true;

        loop {
            let data = within(self.deadline, self.body.read(size)).await?;
            if data.is_empty() {
                break;
            }
            if chunked {
                let mut framed = BytesMut::with_capacity(data.len() + 16);
                encoder.encode_chunk(&data, &mut framed);
                write_all(self.deadline, conn, &framed).await?;
            } else {
                write_all(self.deadline, conn, &data).await?;
            }
            total += data.len() as u64;
            self.publish(&NetEvent::SentBodyPart(data.len()))?;
        }

        if chunked {
            let mut last = BytesMut::new();
            encoder.encode_last(&mut last);
            write_all(self.deadline, conn, &last).await?;
        }
        if let Some(expected) = self.body.body().content_length() {
            if !chunked && expected != total {
                return Err(NetError::WriteError(format!(
                    "body produced {} bytes, {} were announced",
                    total, expected
                )));
            }
        }
        self.publish(&NetEvent::SentBody(total))?;
        Ok(())
    }

    /// Read response heads until a final (non-1xx) one arrives.
    async fn read_head(&mut self, conn: &mut dyn Connection) -> Result<HttpResponse, NetError> {
        loop {
            self.set_state(LoadState::AwaitingStatusLine);
            let line = within(self.deadline, conn.read_line(MAX_LINE))
                .await?
                .ok_or_else(|| {
                    NetError::MalformedResponse("connection closed before a status line".into())
                })?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.read_head_after(conn, line).await?;
            if response.is_informational() {
                debug!(status = response.status(), "skipping interim response");
                continue;
            }
            return Ok(response);
        }
    }

    /// Parse `status_line` and the header block that follows it.
    async fn read_head_after(
        &mut self,
        conn: &mut dyn Connection,
        status_line: String,
    ) -> Result<HttpResponse, NetError> {
        let mut response = HttpResponse::from_status_line(&status_line)?;
        self.set_state(LoadState::ReceivingHeaders);
        loop {
            let line = within(self.deadline, conn.read_line(MAX_LINE))
                .await?
                .ok_or_else(|| {
                    NetError::MalformedResponse("connection closed inside the header block".into())
                })?;
            if response.parse_header_line(&line)? {
                return Ok(response);
            }
        }
    }

    async fn read_body(
        &mut self,
        conn: &mut dyn Connection,
        response: &mut HttpResponse,
    ) -> Result<(), NetError> {
        let mode = response.body_mode(self.method == Method::HEAD)?;
        let size = self.config.buffer_size.max(1);
        self.set_state(LoadState::ReceivingBody);

        match mode {
            BodyMode::None => {}
            BodyMode::Length(length) => {
                let mut remaining = length;
                while remaining > 0 {
                    let want = remaining.min(size as u64) as usize;
                    let data = within(self.deadline, conn.read_exactly(want)).await?;
                    remaining -= data.len() as u64;
                    if !data.is_empty() {
                        self.body_fragment(response, &data)?;
                    }
                    if data.len() < want {
                        self.truncated(&format!(
                            "response body ended {} bytes short of Content-Length",
                            remaining
                        ))?;
                        break;
                    }
                }
            }
            BodyMode::Chunked => {
                let mut decoder = ChunkedDecoder::new();
                let mut pending = BytesMut::new();
                loop {
                    while let Some(data) = decoder.decode(&mut pending)? {
                        self.body_fragment(response, &data)?;
                    }
                    if decoder.is_done() {
                        break;
                    }
                    let more = within(self.deadline, conn.read_available(size)).await?;
                    if more.is_empty() {
                        decoder.finish_at_eof();
                        self.truncated("chunked response body ended without the last chunk")?;
                        break;
                    }
                    pending.extend_from_slice(&more);
                }
            }
            BodyMode::Close => loop {
                let data = within(self.deadline, conn.read_available(size)).await?;
                if data.is_empty() {
                    break;
                }
                self.body_fragment(response, &data)?;
            },
        }
        Ok(())
    }

    fn body_fragment(&self, response: &mut HttpResponse, data: &[u8]) -> Result<(), NetError> {
        if self.config.store_body {
            response.append_body(data);
        }
        self.publish(&NetEvent::ReceivedBodyPart(data))
    }

    /// Short bodies are delivered as they are.
    fn truncated(&self, message: &str) -> Result<(), NetError> {
        warn!(url = %self.url, "{}", message);
        self.publish(&NetEvent::Warning(message))
    }

    fn next_action(&mut self, response: &HttpResponse) -> Result<Next, NetError> {
        if self.config.follow_redirects && response.is_redirect() {
            if let Some(location) = response.header("location") {
                return self.redirect(response.status(), &location).map(Next::Redirect);
            }
        }

        match response.status() {
            401 => self.reauthenticate(response),
            407 => self.reauthenticate_proxy(response),
            _ => Ok(Next::Done),
        }
    }

    fn redirect(&mut self, status: u16, location: &str) -> Result<Url, NetError> {
        if self.redirects >= self.config.max_redirects {
            return Err(NetError::TooManyRedirects(self.config.max_redirects));
        }
        let mut target = self.url.join(location).map_err(|e| {
            NetError::MalformedResponse(format!("invalid Location {:?}: {}", location, e))
        })?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(NetError::NonHttpRedirect(target.to_string()));
        }
        target.set_fragment(None);
        self.redirects += 1;

        if !self.config.strict_redirects
            && matches!(status, 301 | 302 | 303)
            && self.method != Method::GET
            && self.method != Method::HEAD
        {
            debug!(status, from = %self.method, "redirect switches method to GET");
            self.method = Method::GET;
            self.body_dropped = true;
        }

        if target.origin() != self.url.origin() && self.credentials.is_some() {
            debug!(to = %target, "dropping credentials on cross-origin redirect");
            self.credentials = None;
            self.authorization = None;
        }
        self.digest_retried = false;
        debug!(status, from = %self.url, to = %target, redirects = self.redirects, "following redirect");
        Ok(target)
    }

    fn reauthenticate(&mut self, response: &HttpResponse) -> Result<Next, NetError> {
        let Some(credentials) = self.credentials else {
            return Ok(Next::Done);
        };
        if credentials.scheme() != AuthScheme::Digest || self.digest_retried {
            return Ok(Next::Done);
        }
        let Some(values) = response.headers().get_all("www-authenticate") else {
            return Ok(Next::Done);
        };
        let Some(challenge) = DigestChallenge::from_headers(values) else {
            return Ok(Next::Done);
        };
        let mut challenge = challenge?;
        let uri = self.request_target();
        self.authorization = Some(challenge.generate_auth_token(
            self.method.as_str(),
            &uri,
            credentials.user(),
            credentials.password(),
        )?);
        self.digest_retried = true;
        debug!(realm = challenge.realm(), "answering digest challenge");
        Ok(Next::Reauthenticate)
    }

    fn reauthenticate_proxy(&mut self, response: &HttpResponse) -> Result<Next, NetError> {
        if self.proxy_digest_retried || !self.uses_forward_proxy() {
            return Ok(Next::Done);
        }
        let Some(proxy) = self.proxy.as_ref() else {
            return Ok(Next::Done);
        };
        if proxy.auth_scheme != AuthScheme::Digest {
            return Ok(Next::Done);
        }
        let Some((user, pass)) = proxy.get_socks5_auth() else {
            return Ok(Next::Done);
        };
        let Some(values) = response.headers().get_all("proxy-authenticate") else {
            return Ok(Next::Done);
        };
        let Some(challenge) = DigestChallenge::from_headers(values) else {
            return Ok(Next::Done);
        };
        let mut challenge = challenge?;
        let uri = self.request_target();
        let token = challenge.generate_auth_token(self.method.as_str(), &uri, user, pass)?;
        self.proxy_authorization = Some(token);
        self.proxy_digest_retried = true;
        debug!(realm = challenge.realm(), "answering proxy digest challenge");
        Ok(Next::Reauthenticate)
    }

    /// Plain http through an HTTP proxy: absolute-form targets, no tunnel.
    fn uses_forward_proxy(&self) -> bool {
        self.url.scheme() == "http"
            && self
                .proxy
                .as_ref()
                .is_some_and(|p| p.proxy_type == ProxyType::Http)
    }

    fn request_target(&self) -> String {
        if self.uses_forward_proxy() {
            let mut absolute = self.url.clone();
            absolute.set_fragment(None);
            return absolute.to_string();
        }
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    fn connect_target(&self) -> Result<ConnectTarget, NetError> {
        let host = match self.url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(NetError::InvalidArgument(format!(
                    "URL {} has no host",
                    self.url
                )))
            }
        };
        let port = self.url.port_or_known_default().ok_or_else(|| {
            NetError::InvalidArgument(format!("URL {} has no port", self.url))
        })?;
        let mut target = ConnectTarget::new(host, port, self.url.scheme() == "https");
        target.tls_options = self.config.tls_options();
        target.proxy = self.proxy.clone();
        target.local_ip = self.config.local_ip;
        Ok(target)
    }

    fn build_head(&self) -> Result<RequestHead, NetError> {
        let http11 = self.config.protocol_version == ProtocolVersion::Http11;
        let mut headers = HeaderMultimap::new();
        headers.insert("host", &host_header(&self.url)?)?;
        for (name, value) in self.headers.all() {
            if name != "host" {
                headers.insert(name, &value)?;
            }
        }
        if !headers.contains("accept-encoding") {
            headers.insert("accept-encoding", "identity")?;
        }

        if let Some(from_jar) = self.jar.and_then(|jar| jar.get_matching_header(&self.url)) {
            let value = match headers.get("cookie") {
                Some(explicit) if !explicit.is_empty() => format!("{}; {}", explicit, from_jar),
                _ => from_jar,
            };
            headers.insert("cookie", &value)?;
        }

        if let Some(value) = &self.authorization {
            headers.insert("authorization", value)?;
        } else if let Some(credentials) = self.credentials {
            if credentials.scheme() == AuthScheme::Basic {
                headers.insert("authorization", &credentials.basic_header())?;
            }
        }

        if self.uses_forward_proxy() {
            let value = self
                .proxy_authorization
                .clone()
                .or_else(|| self.proxy.as_ref().and_then(|p| p.get_auth_header()));
            if let Some(value) = value {
                headers.insert("proxy-authorization", &value)?;
            }
        }

        let mut chunked = false;
        let mut expect_continue = false;
        let body = self.body.body();
        if self.sends_body() {
            if let Some(content_type) = body.content_type() {
                if !headers.contains("content-type") {
                    headers.insert("content-type", &content_type)?;
                }
            }
            let caller_chunked = headers
                .get("transfer-encoding")
                .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
            match body.content_length() {
                Some(length) if !caller_chunked => {
                    headers.remove("transfer-encoding");
                    headers.insert("content-length", &length.to_string())?;
                }
                _ if !http11 => {
                    return Err(NetError::Misconfiguration(
                        "HTTP/1.0 cannot send a chunked body".into(),
                    ));
                }
                _ => {
                    headers.remove("content-length");
                    headers.insert("transfer-encoding", "chunked")?;
                    chunked = true;
                }
            }

            match headers.get("expect") {
                Some(value) if value.trim().is_empty() => headers.remove("expect"),
                Some(value) => expect_continue = value.trim().eq_ignore_ascii_case("100-continue"),
                None if http11
                    && body
                        .content_length()
                        .is_some_and(|length| length > EXPECT_CONTINUE_THRESHOLD) =>
                {
                    headers.insert("expect", "100-continue")?;
                    expect_continue = true;
                }
                None => {}
            }
        } else {
            headers.remove("expect");
            headers.remove("transfer-encoding");
            if self.body_dropped {
                headers.remove("content-type");
            }
            if matches!(self.method, Method::POST | Method::PUT | Method::PATCH) {
                headers.insert("content-length", "0")?;
            } else {
                headers.remove("content-length");
            }
        }

        if !headers.contains("connection") {
            headers.insert("connection", "close")?;
        }

        let mut text = format!(
            "{} {} HTTP/{}\r\n",
            self.method.as_str(),
            self.request_target(),
            self.config.protocol_version.as_str()
        );
        headers.write_wire(&mut text);
        text.push_str("\r\n");
        Ok(RequestHead {
            text,
            chunked,
            expect_continue,
        })
    }

    fn publish(&self, event: &NetEvent<'_>) -> Result<(), NetError> {
        match self.events {
            Some(events) => events.publish(event),
            None => Ok(()),
        }
    }

    fn set_state(&mut self, state: LoadState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, url = %self.url, "transaction state");
            self.state = state;
        }
    }
}

/// `Host` value for `url`: the port is included only when it is not the
/// scheme default.
fn host_header(url: &Url) -> Result<String, NetError> {
    let host = url
        .host_str()
        .ok_or_else(|| NetError::InvalidArgument(format!("URL {} has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Bound `fut` by the send deadline, if any.
async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| NetError::TimedOut)?,
        None => fut.await,
    }
}

async fn write_all(
    deadline: Option<Instant>,
    conn: &mut dyn Connection,
    mut data: &[u8],
) -> Result<(), NetError> {
    while !data.is_empty() {
        let n = within(deadline, conn.write(data)).await?;
        if n == 0 {
            return Err(NetError::WriteError("connection closed while writing".into()));
        }
        data = &data[n..];
    }
    Ok(())
}
