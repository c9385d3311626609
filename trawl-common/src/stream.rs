//! Lazily decoded page content returned by every fetch.

use std::fmt;
use std::io::{self, Read};

use encoding_rs::{Decoder, Encoding, UTF_8};

const DECODE_CHUNK: usize = 8 * 1024;

/// Single-pass reader yielding the page as UTF-8.
///
/// The raw body is held in memory and transcoded chunk by chunk as the
/// caller reads, using the encoding resolved by the fetch strategy.
///
/// ```
/// use std::io::Read;
/// use trawl_common::PageStream;
///
/// let bytes = b"caf\xe9".to_vec();
/// let mut stream = PageStream::new(bytes, encoding_rs::WINDOWS_1252);
/// assert_eq!(stream.encoding().name(), "windows-1252");
/// let mut text = String::new();
/// stream.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "café");
/// ```
pub struct PageStream {
    source: Vec<u8>,
    position: usize,
    encoding: &'static Encoding,
    decoder: Decoder,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl PageStream {
    /// Wrap raw bytes that will be decoded with `encoding`. A byte order
    /// mark matching `encoding` is stripped.
    pub fn new(source: Vec<u8>, encoding: &'static Encoding) -> Self {
        Self {
            source,
            position: 0,
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        }
    }

    /// Wrap content that is already text, e.g. markup serialized by a browser.
    pub fn from_text(text: String) -> Self {
        Self::new(text.into_bytes(), UTF_8)
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Drain the remaining content into a string.
    pub fn into_string(mut self) -> io::Result<String> {
        let mut out = String::new();
        self.read_to_string(&mut out)?;
        Ok(out)
    }

    fn fill(&mut self) {
        let end = (self.position + DECODE_CHUNK).min(self.source.len());
        let last = end == self.source.len();
        let src = &self.source[self.position..end];

        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        self.pending.clear();
        self.pending.resize(capacity, 0);
        self.pending_pos = 0;

        let (_, read, written, _) = self.decoder.decode_to_utf8(src, &mut self.pending, last);
        self.pending.truncate(written);
        self.position += read;
        if last && self.position == self.source.len() {
            self.finished = true;
        }
    }
}

impl Read for PageStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending_pos == self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            self.fill();
        }
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}

impl fmt::Debug for PageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageStream")
            .field("encoding", &self.encoding.name())
            .field("len", &self.source.len())
            .field("position", &self.position)
            .field("finished", &self.finished)
            .finish()
    }
}
