//! Scripted in-memory transport.
//!
//! Each `connect` consumes the next scripted reply: the bytes the "server"
//! sends back, a reply that stalls after its bytes (to exercise timeouts),
//! or a connection error. Everything the engine writes is recorded per
//! connection.

use crate::base::neterror::NetError;
use crate::socket::transport::{BufferedConnection, ConnectTarget, Connection, IoFuture, Transport};
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug)]
enum Script {
    Reply { data: Bytes, stall: bool },
    Fail(NetError),
}

/// A [`Transport`] that replays scripted server bytes.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Script>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    targets: Mutex<Vec<ConnectTarget>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the raw bytes the next connection will receive.
    pub fn push_response(&self, raw: impl Into<Bytes>) -> &Self {
        lock(&self.script).push_back(Script::Reply {
            data: raw.into(),
            stall: false,
        });
        self
    }

    /// Queue bytes after which the connection never sends or closes.
    pub fn push_stalled(&self, raw: impl Into<Bytes>) -> &Self {
        lock(&self.script).push_back(Script::Reply {
            data: raw.into(),
            stall: true,
        });
        self
    }

    /// Make the next `connect` fail.
    pub fn push_error(&self, error: NetError) -> &Self {
        lock(&self.script).push_back(Script::Fail(error));
        self
    }

    /// Bytes written on each connection so far, in connection order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        lock(&self.written).clone()
    }

    /// Like [`requests`](Self::requests), lossily decoded.
    pub fn request_texts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }

    pub fn targets(&self) -> Vec<ConnectTarget> {
        lock(&self.targets).clone()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.targets).len()
    }

    /// Scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl Transport for MockTransport {
    fn connect<'a>(&'a self, target: &'a ConnectTarget) -> IoFuture<'a, Box<dyn Connection>> {
        Box::pin(async move {
            lock(&self.targets).push(target.clone());
            let next = lock(&self.script).pop_front();
            match next {
                Some(Script::Reply { data, stall }) => {
                    let index = {
                        let mut written = lock(&self.written);
                        written.push(Vec::new());
                        written.len() - 1
                    };
                    let stream = MockStream {
                        incoming: data,
                        stall,
                        written: self.written.clone(),
                        index,
                    };
                    Ok(Box::new(BufferedConnection::new(stream)) as Box<dyn Connection>)
                }
                Some(Script::Fail(e)) => Err(e),
                None => Err(NetError::ConnectionRefused),
            }
        })
    }
}

#[derive(Debug)]
struct MockStream {
    incoming: Bytes,
    stall: bool,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    index: usize,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.incoming.is_empty() {
            // A stalled peer never wakes the reader; only a timeout ends the wait.
            return if self.stall {
                Poll::Pending
            } else {
                Poll::Ready(Ok(()))
            };
        }
        let n = buf.remaining().min(self.incoming.len());
        buf.put_slice(&self.incoming[..n]);
        self.incoming.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if let Some(sink) = lock(&self.written).get_mut(self.index) {
            sink.extend_from_slice(buf);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
