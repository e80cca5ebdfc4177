//! Content-Length message framing.
//!
//! Every message on the server's input and output streams is wrapped as
//!
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of JSON>
//! ```
//!
//! This module performs no I/O. [`encode`] produces the bytes for one frame,
//! [`decode_header`] and [`decode_body`] classify the two halves of a frame,
//! and [`FrameDecoder`] ties them together as an incremental two-phase state
//! machine that is fed whatever bytes the transport happens to deliver.

use crate::message::Message;

/// Default upper bound on a single frame body (64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Longest header line accepted before the decoder gives up looking for `\n`.
const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// Framing-level faults. Each variant carries the offending raw bytes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header line did not have the `Key: Value` shape, or its
    /// `Content-Length` value was not a usable byte count.
    #[error("malformed header line {:?}", String::from_utf8_lossy(.raw))]
    MalformedHeader {
        /// The raw header line, including any line terminator.
        raw: Vec<u8>,
    },

    /// Fewer body bytes were available than the header declared.
    #[error("truncated body: header declared {expected} bytes, only {} arrived", .raw.len())]
    TruncatedBody {
        /// Declared `Content-Length`.
        expected: usize,
        /// The partial body that did arrive.
        raw: Vec<u8>,
    },

    /// The body bytes are not a JSON object.
    #[error("invalid payload: {source}; body was {:?}", String::from_utf8_lossy(.raw))]
    InvalidPayload {
        /// The underlying parse error.
        source: serde_json::Error,
        /// The complete body as declared by the header.
        raw: Vec<u8>,
    },

    /// The message could not be serialized for sending.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Classification of a single header-section line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// `Content-Length: N`.
    Length(usize),
    /// Any other well-formed `Key: Value` header (e.g. `Content-Type`).
    Other,
    /// An empty line: the header/body separator, or nothing yet to decode.
    Blank,
}

/// Phase of the incremental decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Reading header lines. `length` is set once `Content-Length` has been
    /// seen and the decoder is waiting for the blank separator.
    AwaitingHeader { length: Option<usize> },
    /// Header section complete; waiting for exactly this many body bytes.
    AwaitingBody(usize),
}

/// Serialize `message` and prepend its `Content-Length` header.
///
/// The declared length is the byte length of the serialized body, never its
/// character count.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if serialization fails.
pub fn encode(message: &Message) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Classify one header line (with or without its `\r\n` terminator).
///
/// # Errors
///
/// Returns [`FrameError::MalformedHeader`] when a non-empty line is not shaped
/// `Key: Value`, or when a `Content-Length` value is not a decimal integer no
/// larger than `max_frame_bytes`.
pub fn decode_header(line: &[u8], max_frame_bytes: usize) -> Result<Header, FrameError> {
    let malformed = || FrameError::MalformedHeader { raw: line.to_vec() };

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let text = text.trim_end_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(Header::Blank);
    }

    let (key, value) = text.split_once(':').ok_or_else(malformed)?;
    let is_token = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !is_token {
        return Err(malformed());
    }

    if key.eq_ignore_ascii_case(CONTENT_LENGTH) {
        let length: usize = value.trim().parse().map_err(|_| malformed())?;
        if length > max_frame_bytes {
            return Err(malformed());
        }
        return Ok(Header::Length(length));
    }
    Ok(Header::Other)
}

/// Decode the first `length` bytes of `bytes` as a [`Message`].
///
/// # Errors
///
/// - [`FrameError::TruncatedBody`] if fewer than `length` bytes are available.
/// - [`FrameError::InvalidPayload`] if the bytes are not a JSON message object.
pub fn decode_body(bytes: &[u8], length: usize) -> Result<Message, FrameError> {
    if bytes.len() < length {
        return Err(FrameError::TruncatedBody {
            expected: length,
            raw: bytes.to_vec(),
        });
    }
    let body = &bytes[..length];
    serde_json::from_slice(body).map_err(|source| FrameError::InvalidPayload {
        source,
        raw: body.to_vec(),
    })
}

fn is_content_length_line(line: &[u8]) -> bool {
    let key = line.split(|&b| b == b':').next().unwrap_or_default();
    key.eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes())
}

/// Offset of a `Content-Length:` key embedded after the start of `line`.
fn find_content_length(line: &[u8]) -> Option<usize> {
    let key = CONTENT_LENGTH.as_bytes();
    (1..line.len()).find(|&i| {
        line.len() - i > key.len()
            && line[i..i + key.len()].eq_ignore_ascii_case(key)
            && line[i + key.len()] == b':'
    })
}

/// Incremental frame decoder over a growing byte buffer.
///
/// Feed bytes with [`FrameDecoder::push`] in whatever chunks the transport
/// delivers and pull complete messages with [`FrameDecoder::next_message`].
/// Bytes that arrive before a `Content-Length` header and do not form one are
/// framing noise: they are logged and skipped, never merged into a body.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    state: DecodeState,
    max_frame_bytes: usize,
    noise_lines: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects bodies larger than `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: DecodeState::AwaitingHeader { length: None },
            max_frame_bytes,
            noise_lines: 0,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Current decoder phase.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of noise lines skipped so far.
    pub fn noise_lines(&self) -> u64 {
        self.noise_lines
    }

    /// Decode the next complete message, or `Ok(None)` if more bytes are needed.
    ///
    /// After an error the decoder resynchronises on the next header, so the
    /// caller may keep reading.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::MalformedHeader`] for an unusable `Content-Length`
    /// header or a malformed line inside a header section, and
    /// [`FrameError::InvalidPayload`] for a body that fails to parse.
    pub fn next_message(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader { length } => {
                    let Some(line) = self.take_line(length.is_some())? else {
                        return Ok(None);
                    };
                    match decode_header(&line, self.max_frame_bytes) {
                        Ok(Header::Length(n)) if length.is_none() => {
                            self.state = DecodeState::AwaitingHeader { length: Some(n) };
                        }
                        Ok(Header::Length(_)) => {
                            self.reset();
                            return Err(FrameError::MalformedHeader { raw: line });
                        }
                        Ok(Header::Other) => {
                            tracing::trace!(
                                header = %String::from_utf8_lossy(&line).trim_end(),
                                "ignoring header"
                            );
                        }
                        Ok(Header::Blank) => {
                            if let Some(n) = length {
                                self.state = DecodeState::AwaitingBody(n);
                            }
                        }
                        Err(e) if length.is_none() && !is_content_length_line(&line) => {
                            self.noise_lines += 1;
                            tracing::warn!("skipping framing noise: {e}");
                            // An unterminated tail left by a short body can be glued
                            // onto the next header; keep the header.
                            if let Some(pos) = find_content_length(&line) {
                                self.buf.splice(0..0, line[pos..].iter().copied());
                            }
                        }
                        Err(e) => {
                            self.reset();
                            return Err(e);
                        }
                    }
                }
                DecodeState::AwaitingBody(length) => {
                    if self.buf.len() < length {
                        return Ok(None);
                    }
                    let body: Vec<u8> = self.buf.drain(..length).collect();
                    self.state = DecodeState::AwaitingHeader { length: None };
                    return decode_body(&body, length).map(Some);
                }
            }
        }
    }

    /// Signal end-of-stream.
    ///
    /// Discards buffered noise and resets the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TruncatedBody`] if a header was read but its body
    /// never fully arrived.
    pub fn finish(&mut self) -> Result<(), FrameError> {
        let expected = match self.state {
            DecodeState::AwaitingBody(n) => Some(n),
            DecodeState::AwaitingHeader { length } => length,
        };
        let partial = std::mem::take(&mut self.buf);
        self.reset();
        match expected {
            Some(expected) => Err(FrameError::TruncatedBody {
                expected,
                raw: partial,
            }),
            None => {
                if !partial.is_empty() {
                    self.noise_lines += 1;
                    tracing::warn!(
                        bytes = partial.len(),
                        "discarding unterminated framing noise at end of stream"
                    );
                }
                Ok(())
            }
        }
    }

    /// Remove and return the next `\n`-terminated line, if one is buffered.
    fn take_line(&mut self, in_header_section: bool) -> Result<Option<Vec<u8>>, FrameError> {
        if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            return Ok(Some(self.buf.drain(..=pos).collect()));
        }
        if self.buf.len() > MAX_HEADER_LINE_BYTES {
            let raw = std::mem::take(&mut self.buf);
            if in_header_section {
                self.reset();
                return Err(FrameError::MalformedHeader { raw });
            }
            self.noise_lines += 1;
            tracing::warn!(bytes = raw.len(), "skipping oversized framing noise");
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.state = DecodeState::AwaitingHeader { length: None };
    }
}
