//! Request body sources.
//!
//! A body is empty, in-memory bytes, a readable byte stream, or a multipart
//! form. Every variant can be read in bounded pieces and, where the
//! underlying source allows it, rewound so redirects and auth retries can
//! replay identical bytes.

use crate::base::neterror::NetError;
use crate::http::multipart::MultipartBody;
use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Readers that can also seek back to their start.
pub trait SeekableRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableRead for T {}

enum SourceKind {
    Memory(Bytes),
    File {
        path: PathBuf,
        file: Option<tokio::fs::File>,
    },
    Seekable(Box<dyn SeekableRead>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

/// A readable byte source with a known or unknown length.
pub struct ByteSource {
    kind: SourceKind,
    length: Option<u64>,
    consumed: u64,
}

impl ByteSource {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            length: Some(data.len() as u64),
            kind: SourceKind::Memory(data),
            consumed: 0,
        }
    }

    /// A file on disk; it is opened lazily and re-opened on rewind.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, NetError> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|e| {
            NetError::InvalidArgument(format!("Cannot open file {}: {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(NetError::InvalidArgument(format!(
                "Cannot open file {}: not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            kind: SourceKind::File {
                path: path.to_path_buf(),
                file: None,
            },
            length: Some(meta.len()),
            consumed: 0,
        })
    }

    /// A reader that can seek back to offset zero.
    pub fn seekable<R: SeekableRead + 'static>(reader: R, length: Option<u64>) -> Self {
        Self {
            kind: SourceKind::Seekable(Box::new(reader)),
            length,
            consumed: 0,
        }
    }

    /// A forward-only reader; it can be rewound only before the first read.
    pub fn stream<R: AsyncRead + Send + Unpin + 'static>(reader: R, length: Option<u64>) -> Self {
        Self {
            kind: SourceKind::Stream(Box::new(reader)),
            length,
            consumed: 0,
        }
    }

    pub fn len(&self) -> Option<u64> {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// File name to advertise in a multipart part, if the source has one.
    pub fn file_name(&self) -> Option<String> {
        match &self.kind {
            SourceKind::File { path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    pub fn is_rewindable(&self) -> bool {
        match self.kind {
            SourceKind::Stream(_) => self.consumed == 0,
            _ => true,
        }
    }

    /// Read up to `max` bytes. An empty result means end of source.
    pub async fn read(&mut self, max: usize) -> Result<Bytes, NetError> {
        let mut want = max;
        if let Some(len) = self.length {
            want = want.min(len.saturating_sub(self.consumed) as usize);
        }
        if want == 0 {
            return Ok(Bytes::new());
        }

        let chunk = match &mut self.kind {
            SourceKind::Memory(data) => {
                let start = self.consumed as usize;
                let end = (start + want).min(data.len());
                data.slice(start..end)
            }
            SourceKind::File { path, file } => {
                if file.is_none() {
                    let opened = tokio::fs::File::open(&*path).await.map_err(|e| {
                        NetError::ReadError(format!("{}: {}", path.display(), e))
                    })?;
                    *file = Some(opened);
                }
                match file {
                    Some(f) => read_some(f, want).await?,
                    None => Bytes::new(),
                }
            }
            SourceKind::Seekable(reader) => read_some(reader, want).await?,
            SourceKind::Stream(reader) => read_some(reader, want).await?,
        };
        self.consumed += chunk.len() as u64;
        Ok(chunk)
    }

    /// Reset to the first byte.
    pub async fn rewind(&mut self) -> Result<(), NetError> {
        match &mut self.kind {
            SourceKind::Memory(_) => {}
            SourceKind::File { file, .. } => *file = None,
            SourceKind::Seekable(reader) => {
                reader
                    .seek(SeekFrom::Start(0))
                    .await
                    .map_err(|e| NetError::NonRewindableBody(e.to_string()))?;
            }
            SourceKind::Stream(_) if self.consumed > 0 => {
                return Err(NetError::NonRewindableBody(format!(
                    "forward-only stream already consumed {} bytes",
                    self.consumed
                )));
            }
            SourceKind::Stream(_) => {}
        }
        self.consumed = 0;
        Ok(())
    }
}

async fn read_some<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    want: usize,
) -> Result<Bytes, NetError> {
    let mut buf = vec![0u8; want];
    let n = reader
        .read(&mut buf)
        .await
        .map_err(|e| NetError::ReadError(e.to_string()))?;
    buf.truncate(n);
    Ok(Bytes::from(buf))
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            SourceKind::Memory(_) => "memory",
            SourceKind::File { .. } => "file",
            SourceKind::Seekable(_) => "seekable",
            SourceKind::Stream(_) => "stream",
        };
        f.debug_struct("ByteSource")
            .field("kind", &kind)
            .field("length", &self.length)
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// Request body for HTTP methods that send data.
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Body with raw bytes.
    Bytes(Bytes),
    /// Streamed body, possibly of unknown length.
    Stream(ByteSource),
    /// `multipart/form-data` body.
    Multipart(MultipartBody),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::from(s.to_owned()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<ByteSource> for RequestBody {
    fn from(s: ByteSource) -> Self {
        RequestBody::Stream(s)
    }
}

impl From<MultipartBody> for RequestBody {
    fn from(m: MultipartBody) -> Self {
        RequestBody::Multipart(m)
    }
}

impl RequestBody {
    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Bytes(b) => b.is_empty(),
            _ => false,
        }
    }

    /// Total length in bytes, `None` when it cannot be known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(b) => Some(b.len() as u64),
            RequestBody::Stream(s) => s.len(),
            RequestBody::Multipart(m) => m.content_length(),
        }
    }

    /// Content type implied by the body itself.
    pub fn content_type(&self) -> Option<String> {
        match self {
            RequestBody::Multipart(m) => Some(m.content_type()),
            _ => None,
        }
    }

    pub fn is_rewindable(&self) -> bool {
        match self {
            RequestBody::Stream(s) => s.is_rewindable(),
            RequestBody::Multipart(m) => m.is_rewindable(),
            _ => true,
        }
    }
}

/// Read position over a [`RequestBody`] for one logical send.
#[derive(Debug)]
pub struct BodyCursor<'a> {
    body: &'a mut RequestBody,
    offset: usize,
}

impl<'a> BodyCursor<'a> {
    pub fn new(body: &'a mut RequestBody) -> Self {
        Self { body, offset: 0 }
    }

    pub fn body(&self) -> &RequestBody {
        self.body
    }

    /// Read up to `max` bytes. An empty result means the body is exhausted.
    pub async fn read(&mut self, max: usize) -> Result<Bytes, NetError> {
        match &mut *self.body {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Bytes(data) => {
                let end = (self.offset + max).min(data.len());
                let chunk = data.slice(self.offset.min(end)..end);
                self.offset = end;
                Ok(chunk)
            }
            RequestBody::Stream(source) => source.read(max).await,
            RequestBody::Multipart(form) => form.read(max).await,
        }
    }

    /// Reset to the first byte so the body can be sent again.
    pub async fn rewind(&mut self) -> Result<(), NetError> {
        self.offset = 0;
        match &mut *self.body {
            RequestBody::Stream(source) => source.rewind().await,
            RequestBody::Multipart(form) => form.rewind().await,
            _ => Ok(()),
        }
    }
}
