//! Incremental NDJSON decoding for streamed chat replies.
//!
//! Bytes arrive in chunks of arbitrary size. [`Utf8Decoder`] carries a
//! multi-byte character split across two chunks over to the next call, and
//! [`NdjsonDecoder`] buffers text until a full line is available.

use serde::Deserialize;

use crate::error::ChatError;

/// One record of the reply stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Fragment {
    /// The backend sends `null` on its last delta, so missing and null are
    /// both read as an empty fragment.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stateful UTF-8 decoder.
///
/// Invalid sequences are replaced with U+FFFD; an incomplete sequence at the
/// end of a chunk is held back until more bytes arrive or [`finish`] is called.
///
/// [`finish`]: Utf8Decoder::finish
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` and append the result to `out`.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut String) {
        if bytes.is_empty() {
            return;
        }

        let joined;
        let mut input: &[u8] = if self.pending.is_empty() {
            bytes
        } else {
            self.pending.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.pending);
            &joined
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    // valid_up_to guarantees this prefix is well-formed
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Flush at end of stream. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

/// Splits decoded text into lines and parses each as a [`Fragment`].
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    utf8: Utf8Decoder,
    accumulated_text: String,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and hand every fragment completed by it to
    /// `on_fragment`, in order.
    ///
    /// Fragments before a malformed line are delivered before its error is
    /// returned. An empty chunk, or one without a newline, yields nothing.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_fragment: F) -> Result<(), ChatError>
    where
        F: FnMut(Fragment),
    {
        self.utf8.decode_into(chunk, &mut self.accumulated_text);

        while let Some(pos) = self.accumulated_text.find('\n') {
            let line: String = self.accumulated_text.drain(..=pos).collect();
            if let Some(fragment) = parse_line(&line[..pos])? {
                on_fragment(fragment);
            }
        }
        Ok(())
    }

    /// Text received after the last newline, not yet confirmed as a record.
    pub fn pending(&self) -> &str {
        &self.accumulated_text
    }

    /// End of stream: parse whatever is left, since the last record has no
    /// trailing newline guarantee.
    pub fn finish(&mut self) -> Result<Option<Fragment>, ChatError> {
        self.utf8.finish(&mut self.accumulated_text);
        let rest = std::mem::take(&mut self.accumulated_text);
        parse_line(&rest)
    }
}

fn parse_line(line: &str) -> Result<Option<Fragment>, ChatError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| ChatError::Decode {
            line: line.to_string(),
            source,
        })
}
