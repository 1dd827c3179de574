//! Chunked transfer coding.
//!
//! [`ChunkedEncoder`] frames outgoing body bytes; [`ChunkedDecoder`] is a
//! push parser fed from the connection buffer that yields body fragments as
//! soon as they are complete.

use crate::base::neterror::NetError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Longest chunk-size line accepted before the CRLF shows up.
const MAX_SIZE_LINE: usize = 4096;

/// Upper bound on the whole trailer section after the last chunk.
const MAX_TRAILER_BYTES: usize = 16 * 1024;

/// Frames body bytes as `<hex-length>\r\n<bytes>\r\n`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedEncoder {
    chunk_size: usize,
}

impl ChunkedEncoder {
    /// `chunk_size` bounds a single chunk; zero is treated as one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Append one framed chunk. Empty input writes nothing, since a
    /// zero-length chunk would terminate the body.
    pub fn encode_chunk(&self, data: &[u8], out: &mut BytesMut) {
        for piece in data.chunks(self.chunk_size) {
            out.reserve(piece.len() + 12);
            out.put_slice(format!("{:x}\r\n", piece.len()).as_bytes());
            out.put_slice(piece);
            out.put_slice(b"\r\n");
        }
    }

    /// Append the terminating zero-length chunk.
    pub fn encode_last(&self, out: &mut BytesMut) {
        out.put_slice(b"0\r\n\r\n");
    }

    /// Encode a complete body including the terminator.
    pub fn encode(&self, data: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(data.len() + 16);
        self.encode_chunk(data, &mut out);
        self.encode_last(&mut out);
        out.freeze()
    }
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    ReadSize,
    ReadData { remaining: u64 },
    /// CRLF after a data chunk, or the trailer section after the last chunk.
    ReadTrailerCrlf { last: bool },
    Done,
}

#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    trailers: Vec<(String, String)>,
    trailer_bytes: usize,
    truncated: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::ReadSize,
            trailers: Vec::new(),
            trailer_bytes: 0,
            truncated: false,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Whether the body ended without the terminating zero chunk.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Trailer fields seen after the last chunk.
    pub fn trailers(&self) -> &[(String, String)] {
        &self.trailers
    }

    /// Consume as much of `buf` as possible and return the next body
    /// fragment. `Ok(None)` means more input is needed or the body is done.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, NetError> {
        loop {
            match self.state {
                ChunkState::ReadSize => {
                    let line_end = match find_crlf(buf) {
                        Some(n) => n,
                        None if buf.len() > MAX_SIZE_LINE => {
                            return Err(NetError::MalformedResponse(
                                "chunk size line too long".into(),
                            ))
                        }
                        None => return Ok(None),
                    };
                    let line = buf.split_to(line_end + 2);
                    let size = parse_chunk_size(&line[..line_end])?;
                    self.state = if size == 0 {
                        ChunkState::ReadTrailerCrlf { last: true }
                    } else {
                        ChunkState::ReadData { remaining: size }
                    };
                }
                ChunkState::ReadData { remaining } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(buf.len() as u64) as usize;
                    let fragment = buf.split_to(take).freeze();
                    let left = remaining - take as u64;
                    self.state = if left == 0 {
                        ChunkState::ReadTrailerCrlf { last: false }
                    } else {
                        ChunkState::ReadData { remaining: left }
                    };
                    return Ok(Some(fragment));
                }
                ChunkState::ReadTrailerCrlf { last: false } => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(NetError::MalformedResponse(
                            "missing CRLF after chunk data".into(),
                        ));
                    }
                    buf.advance(2);
                    self.state = ChunkState::ReadSize;
                }
                ChunkState::ReadTrailerCrlf { last: true } => {
                    let line_end = match find_crlf(buf) {
                        Some(n) => n,
                        None if self.trailer_bytes + buf.len() > MAX_TRAILER_BYTES
                            || buf.len() > MAX_SIZE_LINE =>
                        {
                            return Err(NetError::MalformedResponse(
                                "chunked trailer section too long".into(),
                            ))
                        }
                        None => return Ok(None),
                    };
                    self.trailer_bytes += line_end + 2;
                    if self.trailer_bytes > MAX_TRAILER_BYTES {
                        return Err(NetError::MalformedResponse(
                            "chunked trailer section too long".into(),
                        ));
                    }
                    let line = buf.split_to(line_end + 2);
                    if line_end == 0 {
                        self.state = ChunkState::Done;
                        return Ok(None);
                    }
                    let text = String::from_utf8_lossy(&line[..line_end]);
                    if let Some((name, value)) = text.split_once(':') {
                        self.trailers
                            .push((name.trim().to_string(), value.trim().to_string()));
                    }
                }
                ChunkState::Done => return Ok(None),
            }
        }
    }

    /// Signal that the peer closed the stream.
    ///
    /// Servers that never send the zero-length chunk are common enough that
    /// the body read so far is accepted as complete.
    pub fn finish_at_eof(&mut self) {
        if self.state != ChunkState::Done {
            tracing::warn!(state = ?self.state, "chunked body ended without terminating chunk");
            self.truncated = true;
            self.state = ChunkState::Done;
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of the first CRLF in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, NetError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| NetError::MalformedResponse("chunk size is not ASCII".into()))?;
    let hex = text.split(';').next().unwrap_or("").trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(NetError::MalformedResponse(format!(
            "invalid chunk length '{}'",
            hex
        )));
    }
    u64::from_str_radix(hex, 16)
        .map_err(|_| NetError::MalformedResponse(format!("chunk length '{}' overflows", hex)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut ChunkedDecoder, input: &[u8], split: usize) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for piece in input.chunks(split.max(1)) {
            buf.extend_from_slice(piece);
            while let Some(fragment) = decoder.decode(&mut buf).unwrap() {
                out.extend_from_slice(&fragment);
            }
        }
        out
    }

    #[test]
    fn test_encode_single_chunk() {
        let encoder = ChunkedEncoder::new(1024);
        assert_eq!(&encoder.encode(b"hello")[..], b"5\r\nhello\r\n0\r\n\r\n");
    }

    #[test]
    fn test_encode_respects_chunk_size() {
        let encoder = ChunkedEncoder::new(4);
        assert_eq!(
            &encoder.encode(b"abcdefghij")[..],
            b"4\r\nabcd\r\n4\r\nefgh\r\n2\r\nij\r\n0\r\n\r\n"
        );
    }

    #[test]
    fn test_encode_empty_body() {
        let encoder = ChunkedEncoder::new(16);
        assert_eq!(&encoder.encode(b"")[..], b"0\r\n\r\n");
    }

    #[test]
    fn test_round_trip_any_split() {
        let body: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        for chunk_size in [1usize, 7, 100, 512, 4096] {
            let encoded = ChunkedEncoder::new(chunk_size).encode(&body);
            for split in [1usize, 2, 3, 5, 13, 64, 1000, encoded.len()] {
                let mut decoder = ChunkedDecoder::new();
                let decoded = decode_all(&mut decoder, &encoded, split);
                assert_eq!(decoded, body, "chunk={} split={}", chunk_size, split);
                assert!(decoder.is_done());
                assert!(!decoder.was_truncated());
            }
        }
    }

    #[test]
    fn test_chunk_extensions_and_trailers() {
        let input = b"3;name=value\r\nabc\r\n0\r\nX-Checksum: 42\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(decode_all(&mut decoder, input, input.len()), b"abc");
        assert!(decoder.is_done());
        assert_eq!(
            decoder.trailers(),
            &[("X-Checksum".to_string(), "42".to_string())]
        );
    }

    #[test]
    fn test_uppercase_hex() {
        let input = b"A\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(decode_all(&mut decoder, input, 3), b"0123456789");
    }

    #[test]
    fn test_leftover_bytes_untouched_after_done() {
        let mut buf = BytesMut::from(&b"1\r\nx\r\n0\r\n\r\nHTTP/1.1"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"x");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_done());
        assert_eq!(&buf[..], b"HTTP/1.1");
    }

    #[test]
    fn test_missing_terminal_chunk_is_lenient() {
        let input = b"e\r\nThis is a test\r\n";
        let mut decoder = ChunkedDecoder::new();
        let body = decode_all(&mut decoder, input, 4);
        assert!(!decoder.is_done());
        decoder.finish_at_eof();
        assert!(decoder.is_done());
        assert!(decoder.was_truncated());
        assert_eq!(body, b"This is a test");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut decoder = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"zz\r\nabc"[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(NetError::MalformedResponse(_))
        ));

        let mut decoder = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"\r\n"[..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_unterminated_trailer_line_is_rejected() {
        let mut decoder = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"1\r\nx\r\n0\r\n"[..]);
        assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap()[..], b"x");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        let mut result = Ok(None);
        for _ in 0..4 {
            buf.extend_from_slice(&[b'a'; 2048]);
            result = decoder.decode(&mut buf);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(NetError::MalformedResponse(_))));
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_trailer_section_is_capped() {
        let mut decoder = ChunkedDecoder::new();
        let mut input = b"0\r\n".to_vec();
        for i in 0..1000 {
            input.extend_from_slice(format!("X-Trailer-{}: value\r\n", i).as_bytes());
        }
        input.extend_from_slice(b"\r\n");
        let mut buf = BytesMut::from(&input[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(NetError::MalformedResponse(_))
        ));
        assert!(decoder.trailers().len() < 1000);
    }

    #[test]
    fn test_missing_crlf_after_data() {
        let mut decoder = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"3\r\nabcXY0\r\n\r\n"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_some());
        assert!(decoder.decode(&mut buf).is_err());
    }
}
