//! Newline-delimited framing for the stdio transport.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so that
//! an unterminated or maliciously large message from a misbehaving peer cannot
//! exhaust memory.
//!
//! # Usage
//!
//! Use [`FrameDecoder`] with [`tokio_util::codec::FramedRead`] (inbound) and
//! [`LineCodec`] with [`tokio_util::codec::FramedWrite`] (outbound).  Both
//! directions use UTF-8 lines delimited by `\n`.
//!
//! `FramedRead` ends the stream after any decoder error, so [`FrameDecoder`]
//! hands over-long lines up as `Err` items instead.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use mcp_switchboard::protocol::framing::FrameDecoder;
//!
//! let frames = FramedRead::new(tokio::io::stdin(), FrameDecoder::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default maximum line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited JSON codec.
///
/// # Decoder
///
/// Inbound lines longer than the configured limit return
/// [`AppError::Codec`]`("line too long: …")`; the codec then discards input
/// up to the next newline so the following frame decodes normally.
/// I/O errors are mapped to [`AppError::Io`].
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`.  The limit is a decoder-side
/// concern and is not enforced during encoding.
#[derive(Debug)]
pub struct LineCodec {
    inner: LinesCodec,
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn map_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Codec(format!(
                "line too long: exceeded {} bytes",
                self.max_length
            )),
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|e| self.map_error(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|e| self.map_error(e))
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(item, dst).map_err(|e| self.map_error(e))
    }
}

/// Inbound decoder that yields recoverable framing errors as items.
///
/// Each item is a line or an [`AppError::Codec`] for a line over the limit;
/// only I/O failures end the stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineCodec,
}

impl FrameDecoder {
    /// Create a decoder with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LineCodec::with_max_length(max_length),
        }
    }

    fn lift(decoded: Result<Option<String>>) -> Result<Option<Result<String>>> {
        match decoded {
            Ok(line) => Ok(line.map(Ok)),
            Err(err) if err.is_recoverable() => Ok(Some(Err(err))),
            Err(err) => Err(err),
        }
    }
}

impl Decoder for FrameDecoder {
    type Item = Result<String>;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Self::lift(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Self::lift(self.lines.decode_eof(src))
    }
}
