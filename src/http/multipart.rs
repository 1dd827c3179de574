//! Multipart form data support.
//!
//! Builds an RFC 7578 `multipart/form-data` body that is read lazily, part by
//! part, so file uploads are streamed from their source instead of being
//! loaded into memory.
//!
//! # Example
//! ```ignore
//! use wirenet::http::multipart::MultipartBody;
//! use wirenet::http::requestbody::ByteSource;
//!
//! let form = MultipartBody::new()
//!     .text("username", "user123")
//!     .file("upload", ByteSource::file("doc.txt")?, Some("doc.txt"), "text/plain");
//! ```

use crate::base::neterror::NetError;
use crate::http::requestbody::ByteSource;
use bytes::{Bytes, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::borrow::Cow;

/// One part of a multipart form.
#[derive(Debug)]
pub enum MultipartPart {
    Field {
        name: String,
        value: String,
    },
    File {
        field_name: String,
        filename: Option<String>,
        content_type: String,
        source: ByteSource,
    },
}

impl MultipartPart {
    fn name(&self) -> &str {
        match self {
            MultipartPart::Field { name, .. } => name,
            MultipartPart::File { field_name, .. } => field_name,
        }
    }

    /// `--boundary` line plus the part headers and the blank line.
    fn head(&self, boundary: &str) -> String {
        let mut head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            boundary,
            escape_quotes(self.name())
        );
        if let MultipartPart::File {
            filename,
            content_type,
            ..
        } = self
        {
            if let Some(filename) = filename {
                head.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
            }
            head.push_str(&format!("\r\nContent-Type: {}", content_type));
        }
        head.push_str("\r\n\r\n");
        head
    }

    fn data_len(&self) -> Option<u64> {
        match self {
            MultipartPart::Field { value, .. } => Some(value.len() as u64),
            MultipartPart::File { source, .. } => source.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Head,
    Data,
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Part { index: usize, phase: Phase },
    Closing,
    Finished,
}

/// A lazily readable `multipart/form-data` body.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<MultipartPart>,
    position: Position,
    pending: BytesMut,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    /// Create a new empty form.
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    /// Create a form with a caller-chosen boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
            position: Position::Part {
                index: 0,
                phase: Phase::Head,
            },
            pending: BytesMut::new(),
        }
    }

    /// Get the boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name, value);
        self
    }

    /// Add a file part.
    pub fn file(
        mut self,
        field_name: impl Into<String>,
        source: ByteSource,
        filename: Option<&str>,
        content_type: &str,
    ) -> Self {
        self.push_file(field_name, source, filename, content_type);
        self
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(MultipartPart::Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Add a file part. Without an explicit `filename` the source's own file
    /// name is used when it has one.
    pub fn push_file(
        &mut self,
        field_name: impl Into<String>,
        source: ByteSource,
        filename: Option<&str>,
        content_type: &str,
    ) {
        let filename = filename.map(str::to_string).or_else(|| source.file_name());
        self.parts.push(MultipartPart::File {
            field_name: field_name.into(),
            filename,
            content_type: content_type.to_string(),
            source,
        });
    }

    pub fn push_part(&mut self, part: MultipartPart) {
        self.parts.push(part);
    }

    /// Give the parts back, e.g. to rebuild the form around new fields.
    pub fn into_parts(self) -> Vec<MultipartPart> {
        self.parts
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Compute the total content length if possible.
    ///
    /// Returns None if any part has unknown length.
    pub fn content_length(&self) -> Option<u64> {
        let mut length = 0u64;
        for part in &self.parts {
            length += part.head(&self.boundary).len() as u64;
            length += part.data_len()?;
            // \r\n
            length += 2;
        }
        // Final boundary: --boundary--\r\n
        length += 2 + self.boundary.len() as u64 + 4;
        Some(length)
    }

    pub fn is_rewindable(&self) -> bool {
        self.parts.iter().all(|part| match part {
            MultipartPart::Field { .. } => true,
            MultipartPart::File { source, .. } => source.is_rewindable(),
        })
    }

    /// Read up to `max` bytes. An empty result means the body is complete.
    pub async fn read(&mut self, max: usize) -> Result<Bytes, NetError> {
        let max = max.max(1);
        loop {
            if !self.pending.is_empty() {
                let take = max.min(self.pending.len());
                return Ok(self.pending.split_to(take).freeze());
            }

            match self.position {
                Position::Part { index, .. } if index >= self.parts.len() => {
                    self.position = Position::Closing;
                }
                Position::Part {
                    index,
                    phase: Phase::Head,
                } => {
                    let head = self.parts[index].head(&self.boundary);
                    self.pending.extend_from_slice(head.as_bytes());
                    self.position = Position::Part {
                        index,
                        phase: Phase::Data,
                    };
                }
                Position::Part {
                    index,
                    phase: Phase::Data,
                } => match &mut self.parts[index] {
                    MultipartPart::Field { value, .. } => {
                        self.pending.extend_from_slice(value.as_bytes());
                        self.position = Position::Part {
                            index,
                            phase: Phase::Tail,
                        };
                    }
                    MultipartPart::File { source, .. } => {
                        let chunk = source.read(max).await?;
                        if !chunk.is_empty() {
                            return Ok(chunk);
                        }
                        self.position = Position::Part {
                            index,
                            phase: Phase::Tail,
                        };
                    }
                },
                Position::Part {
                    index,
                    phase: Phase::Tail,
                } => {
                    self.pending.extend_from_slice(b"\r\n");
                    self.position = Position::Part {
                        index: index + 1,
                        phase: Phase::Head,
                    };
                }
                Position::Closing => {
                    self.pending
                        .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
                    self.position = Position::Finished;
                }
                Position::Finished => return Ok(Bytes::new()),
            }
        }
    }

    /// Read the whole remaining body into memory.
    pub async fn read_to_end(&mut self) -> Result<Bytes, NetError> {
        let mut out = BytesMut::new();
        loop {
            let chunk = self.read(16 * 1024).await?;
            if chunk.is_empty() {
                return Ok(out.freeze());
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Restart from the first part, re-opening every file source.
    ///
    /// Fails without touching any source when one of them cannot go back to
    /// its start.
    pub async fn rewind(&mut self) -> Result<(), NetError> {
        if !self.is_rewindable() {
            return Err(NetError::NonRewindableBody(
                "multipart upload contains a consumed forward-only stream".into(),
            ));
        }
        for part in &mut self.parts {
            if let MultipartPart::File { source, .. } = part {
                source.rewind().await?;
            }
        }
        self.pending.clear();
        self.position = Position::Part {
            index: 0,
            phase: Phase::Head,
        };
        Ok(())
    }
}

/// Escape quotes and backslashes in a string.
fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains('"') || s.contains('\\') || s.contains('\r') || s.contains('\n') {
        Cow::Owned(
            s.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\r', "\\r")
                .replace('\n', "\\n"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

/// Generate a random boundary string.
fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("----wirenet-{}", token)
}
