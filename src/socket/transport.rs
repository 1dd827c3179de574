//! The byte transport the exchange engine runs over.
//!
//! [`Transport`] opens connections; [`Connection`] is a connected byte pipe
//! with line and length oriented reads. Both use boxed futures so they can
//! be held as trait objects, letting the engine run unchanged over real
//! sockets ([`crate::socket::client::SocketTransport`]) or scripted bytes
//! ([`crate::socket::mock::MockTransport`]).

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::TlsOptions;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Alias for the `Future` type returned by transport operations.
pub type IoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NetError>> + Send + 'a>>;

/// Where and how to connect for one exchange.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    /// Wrap the connection in TLS (after any proxy tunnel).
    pub tls: bool,
    pub tls_options: TlsOptions,
    pub proxy: Option<ProxySettings>,
    /// Local address to bind the outgoing socket to.
    pub local_ip: Option<IpAddr>,
}

impl ConnectTarget {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            tls_options: TlsOptions::default(),
            proxy: None,
            local_ip: None,
        }
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Opens connections.
pub trait Transport: Send + Sync {
    fn connect<'a>(&'a self, target: &'a ConnectTarget) -> IoFuture<'a, Box<dyn Connection>>;
}

/// A connected byte pipe.
///
/// Reads are cancellation safe: bytes received before a read future is
/// dropped stay buffered for the next read.
pub trait Connection: Send {
    /// Write all of `data`, returning the number of bytes written.
    fn write<'a>(&'a mut self, data: &'a [u8]) -> IoFuture<'a, usize>;

    /// Read one line without its terminator. `None` at end of stream.
    fn read_line(&mut self, max: usize) -> IoFuture<'_, Option<String>>;

    /// Read `n` bytes, or fewer if the peer closes first.
    fn read_exactly(&mut self, n: usize) -> IoFuture<'_, Bytes>;

    /// Read whatever is available, at most `max` bytes. Empty at end of stream.
    fn read_available(&mut self, max: usize) -> IoFuture<'_, Bytes>;

    fn close(&mut self) -> IoFuture<'_, ()>;
}

/// [`Connection`] over any async byte stream, with a read buffer.
pub struct BufferedConnection<S> {
    stream: S,
    buf: BytesMut,
    eof: bool,
}

impl<S> BufferedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(8192),
            eof: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Pull more bytes into the buffer. Returns false at end of stream.
    async fn fill(&mut self) -> Result<bool, NetError> {
        if self.eof {
            return Ok(false);
        }
        self.buf.reserve(8192);
        let n = self.stream.read_buf(&mut self.buf).await.read_context()?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }
}

impl<S: fmt::Debug> fmt::Debug for BufferedConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedConnection")
            .field("stream", &self.stream)
            .field("buffered", &self.buf.len())
            .field("eof", &self.eof)
            .finish()
    }
}

impl<S> Connection for BufferedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn write<'a>(&'a mut self, data: &'a [u8]) -> IoFuture<'a, usize> {
        Box::pin(async move {
            self.stream.write_all(data).await.write_context()?;
            self.stream.flush().await.write_context()?;
            Ok(data.len())
        })
    }

    fn read_line(&mut self, max: usize) -> IoFuture<'_, Option<String>> {
        Box::pin(async move {
            loop {
                if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                    let raw = self.buf.split_to(pos + 1);
                    let line = String::from_utf8_lossy(&raw[..pos]);
                    return Ok(Some(line.trim_end_matches('\r').to_string()));
                }
                if self.buf.len() > max {
                    return Err(NetError::MalformedResponse(format!(
                        "line exceeds {} bytes",
                        max
                    )));
                }
                if !self.fill().await? {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let raw = self.buf.split();
                    let line = String::from_utf8_lossy(&raw);
                    return Ok(Some(line.trim_end_matches('\r').to_string()));
                }
            }
        })
    }

    fn read_exactly(&mut self, n: usize) -> IoFuture<'_, Bytes> {
        Box::pin(async move {
            while self.buf.len() < n {
                if !self.fill().await? {
                    break;
                }
            }
            let take = n.min(self.buf.len());
            Ok(self.buf.split_to(take).freeze())
        })
    }

    fn read_available(&mut self, max: usize) -> IoFuture<'_, Bytes> {
        Box::pin(async move {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = max.min(self.buf.len());
            Ok(self.buf.split_to(take).freeze())
        })
    }

    fn close(&mut self) -> IoFuture<'_, ()> {
        Box::pin(async move {
            // The peer may already be gone; nothing useful to report then.
            if let Err(e) = self.stream.shutdown().await {
                tracing::debug!(error = %e, "shutdown after exchange failed");
            }
            Ok(())
        })
    }
}
