//! Incremental frame decoding
//!
//! Reassembles raw upstream chunks into complete logical units, tolerating
//! units (and UTF-8 characters) split across chunk boundaries.

mod lines;
mod messages;

pub use lines::LineDecoder;
pub use messages::{classify_unit, MessageDecoder, UnitKind};

/// One complete record: a JSON line or one provider-framed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalUnit(pub String);

impl LogicalUnit {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Incremental decoder from raw chunks to logical units
pub trait FrameDecoder: Send {
    /// Feed one chunk, returning every unit it completed
    fn push(&mut self, chunk: &[u8]) -> Vec<LogicalUnit>;

    /// Flush whatever is left once the upstream has ended
    fn finish(&mut self) -> Vec<LogicalUnit>;
}

/// Accumulates bytes and hands out text only up to the last complete
/// UTF-8 character
#[derive(Debug, Default)]
struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Append `chunk` and take all decodable text
    fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        // Invalid sequence: replace it and keep going
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Incomplete character at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Take any trailing bytes, lossily
    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
