//! The seam between [`URLRequest`](crate::urlrequest::request::URLRequest)
//! and whatever actually produces responses.
//!
//! [`SocketAdapter`] runs the HTTP/1.1 engine over a [`Transport`];
//! [`MockAdapter`] replays canned responses without touching the network.

use crate::base::neterror::NetError;
use crate::cookies::monster::CookieJar;
use crate::http::auth::AuthCredentials;
use crate::http::events::EventBus;
use crate::http::orderedheaders::HeaderMultimap;
use crate::http::requestbody::RequestBody;
use crate::http::response::HttpResponse;
use crate::http::transaction::HttpTransaction;
use crate::socket::client::SocketTransport;
use crate::socket::transport::{IoFuture, Transport};
use crate::urlrequest::config::RequestConfig;
use http::Method;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// A request as handed to an adapter.
pub struct Outgoing<'a> {
    pub method: Method,
    pub url: Url,
    pub headers: &'a HeaderMultimap,
    pub config: &'a RequestConfig,
    pub credentials: Option<&'a AuthCredentials>,
    pub cookie_jar: Option<&'a CookieJar>,
    pub events: &'a EventBus,
    /// The body was read by an earlier send and must be rewound first.
    pub body_consumed: bool,
}

/// Produces the response for one send.
pub trait Adapter: Send + Sync {
    fn send<'a>(
        &'a self,
        request: Outgoing<'a>,
        body: &'a mut RequestBody,
    ) -> IoFuture<'a, HttpResponse>;
}

/// Runs the HTTP/1.1 engine over a transport. The default transport opens
/// real TCP/TLS connections.
#[derive(Clone)]
pub struct SocketAdapter {
    transport: Arc<dyn Transport>,
}

impl Default for SocketAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketAdapter {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(SocketTransport::new()),
        }
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl fmt::Debug for SocketAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketAdapter").finish_non_exhaustive()
    }
}

impl Adapter for SocketAdapter {
    fn send<'a>(
        &'a self,
        request: Outgoing<'a>,
        body: &'a mut RequestBody,
    ) -> IoFuture<'a, HttpResponse> {
        Box::pin(async move {
            HttpTransaction::new(
                self.transport.as_ref(),
                request.config,
                request.method,
                request.url,
                request.headers,
                body,
            )
            .with_events(request.events)
            .with_cookie_jar(request.cookie_jar)
            .with_credentials(request.credentials)
            .with_body_consumed(request.body_consumed)
            .start()
            .await
        })
    }
}

type Canned = (Result<HttpResponse, NetError>, Option<Url>);

/// Replays queued responses or errors in FIFO order.
///
/// An entry bound to a URL is only handed out for that exact URL. When no
/// entry fits, the answer is `HTTP/1.1 400 Bad Request` with no headers.
#[derive(Debug, Default)]
pub struct MockAdapter {
    queue: Mutex<VecDeque<Canned>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response given as its full text.
    pub fn add_response(&self, raw: &str, url: Option<&str>) -> Result<&Self, NetError> {
        let response = HttpResponse::from_raw(raw)?;
        self.push(Ok(response), url)
    }

    /// Queue a response read from a file holding its full text.
    pub fn add_response_file(
        &self,
        path: impl AsRef<Path>,
        url: Option<&str>,
    ) -> Result<&Self, NetError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            NetError::InvalidArgument(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.add_response(&String::from_utf8_lossy(&raw), url)
    }

    /// Queue an already built response.
    pub fn add_http_response(
        &self,
        response: HttpResponse,
        url: Option<&str>,
    ) -> Result<&Self, NetError> {
        self.push(Ok(response), url)
    }

    /// Queue an error the matching send fails with.
    pub fn add_error(&self, error: NetError, url: Option<&str>) -> Result<&Self, NetError> {
        self.push(Err(error), url)
    }

    /// Entries not yet handed out.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn push(&self, outcome: Result<HttpResponse, NetError>, url: Option<&str>) -> Result<&Self, NetError> {
        let url = url
            .map(|u| {
                Url::parse(u).map_err(|e| NetError::InvalidArgument(format!("{}: {}", u, e)))
            })
            .transpose()?;
        self.lock().push_back((outcome, url));
        Ok(self)
    }

    fn take(&self, url: &Url) -> Option<Result<HttpResponse, NetError>> {
        let mut queue = self.lock();
        let index = queue
            .iter()
            .position(|(_, bound)| bound.as_ref().map_or(true, |b| b == url))?;
        queue.remove(index).map(|(outcome, _)| outcome)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Canned>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Adapter for MockAdapter {
    fn send<'a>(
        &'a self,
        request: Outgoing<'a>,
        _body: &'a mut RequestBody,
    ) -> IoFuture<'a, HttpResponse> {
        Box::pin(async move {
            let mut response = match self.take(&request.url) {
                Some(outcome) => outcome?,
                None => HttpResponse::from_raw("HTTP/1.1 400 Bad Request\r\n\r\n")?,
            };
            response.set_effective_url(request.url.clone());
            if let Some(jar) = request.cookie_jar {
                jar.add_cookies_from_response(&response);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing<'a>(
        url: &str,
        headers: &'a HeaderMultimap,
        config: &'a RequestConfig,
        events: &'a EventBus,
    ) -> Outgoing<'a> {
        Outgoing {
            method: Method::GET,
            url: Url::parse(url).unwrap(),
            headers,
            config,
            credentials: None,
            cookie_jar: None,
            events,
            body_consumed: false,
        }
    }

    #[tokio::test]
    async fn test_default_response() {
        let mock = MockAdapter::new();
        let (headers, config, events) = (HeaderMultimap::new(), RequestConfig::new(), EventBus::new());
        let mut body = RequestBody::Empty;

        let response = mock
            .send(outgoing("http://www.example.com/", &headers, &config, &events), &mut body)
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_bound_entries_wait_for_their_url() {
        let mock = MockAdapter::new();
        mock.add_response("HTTP/1.1 200 OK\r\n\r\nfrom org", Some("http://example.org/"))
            .unwrap();
        let (headers, config, events) = (HeaderMultimap::new(), RequestConfig::new(), EventBus::new());
        let mut body = RequestBody::Empty;

        let other = mock
            .send(outgoing("http://localhost/", &headers, &config, &events), &mut body)
            .await
            .unwrap();
        assert_eq!(other.status(), 400);
        assert_eq!(mock.remaining(), 1);

        let org = mock
            .send(outgoing("http://example.org", &headers, &config, &events), &mut body)
            .await
            .unwrap();
        assert_eq!(org.text(), "from org");
        assert_eq!(org.effective_url().map(Url::as_str), Some("http://example.org/"));
    }

    #[tokio::test]
    async fn test_queued_error_is_returned() {
        let mock = MockAdapter::new();
        mock.add_error(NetError::Aborted("backend unavailable".into()), None)
            .unwrap();
        let (headers, config, events) = (HeaderMultimap::new(), RequestConfig::new(), EventBus::new());
        let mut body = RequestBody::Empty;

        let err = mock
            .send(outgoing("http://www.example.com/", &headers, &config, &events), &mut body)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
    }
}
