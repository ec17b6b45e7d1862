//! Byte-to-text normalization
//!
//! Network data is decoded as UTF-8. Bytes that are not valid UTF-8 fall
//! back to a single-byte code page (Latin-1) so every byte produces a
//! character and decoding never stalls. C1 points in the fallback would be
//! control codes, so they are shown as U+FFFD instead.

/// Stateful decoder that survives UTF-8 sequences split across reads.
#[derive(Debug, Default)]
pub struct TextDecoder {
    /// Leading bytes of an incomplete UTF-8 sequence from the last chunk
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk. A trailing incomplete UTF-8 sequence is held back
    /// until the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to marks a char boundary
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(len) => {
                            tracing::trace!("Invalid UTF-8, decoding {} byte(s) as Latin-1", len);
                            out.extend(after[..len].iter().map(|&b| fallback_char(b)));
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the input
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush any held-back bytes using the fallback code page.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        pending.into_iter().map(fallback_char).collect()
    }

    /// Discard held-back bytes.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Decode a complete buffer in one go.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut decoder = TextDecoder::new();
    let mut text = decoder.decode(bytes);
    text.push_str(&decoder.finish());
    text
}

fn fallback_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => char::REPLACEMENT_CHARACTER,
        _ => char::from(byte),
    }
}
