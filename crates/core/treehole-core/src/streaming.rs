//! Streaming response support

use crate::{Result, TreeholeError};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

/// Raw body fragments as they arrive from the transport
pub type FragmentStream = BoxStream<'static, Result<Bytes>>;

/// Build a fragment stream from in-memory parts
pub fn fragments_from<I, B>(parts: I) -> FragmentStream
where
    I: IntoIterator<Item = B>,
    I::IntoIter: Send + 'static,
    B: Into<Bytes>,
{
    stream::iter(parts.into_iter().map(|p| Ok(p.into()))).boxed()
}

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder
///
/// Multi-byte sequences split across fragments are held back until complete.
/// Invalid sequences decode to U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// New decoder with nothing buffered
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one fragment, returning whatever text is complete so far
    pub fn decode(&mut self, fragment: &[u8]) -> String {
        self.pending.extend_from_slice(fragment);
        let mut out = String::new();
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            start = valid_end + bad;
                        }
                        None => {
                            // incomplete sequence at the end, wait for more bytes
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush anything still buffered once the stream has ended
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Bytes held back waiting for the rest of a sequence
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// Collect a whole fragment stream into a string
pub async fn collect_text(mut stream: FragmentStream) -> Result<String> {
    let mut decoder = Utf8StreamDecoder::new();
    let mut result = String::new();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        result.push_str(&decoder.decode(&fragment));
    }
    result.push_str(&decoder.finish());

    Ok(result)
}

/// Collect raw bytes, capped at `limit`
pub async fn collect_bytes(mut stream: FragmentStream, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if out.len() + fragment.len() > limit {
            return Err(TreeholeError::other(format!(
                "Response body exceeds {} bytes",
                limit
            )));
        }
        out.extend_from_slice(&fragment);
    }
    Ok(out)
}
