//! Message-stream mode: blank-line separated blocks (token streams)
//!
//! Blocks that are already SSE-shaped pass through untouched; anything else
//! is raw payload for the encoder to wrap.

use super::{FrameDecoder, LogicalUnit, Utf8Accumulator};

/// Classification of a message-stream unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Already an SSE frame, forwarded unmodified
    PassThrough,
    /// Raw text to be wrapped in `data:` lines
    RawPayload,
}

/// Decide whether a unit is already SSE-shaped
pub fn classify_unit(unit: &LogicalUnit) -> UnitKind {
    let trimmed = unit.as_str().trim();
    if trimmed.starts_with("data:") || trimmed.starts_with("event:") || trimmed.starts_with(':') {
        UnitKind::PassThrough
    } else {
        UnitKind::RawPayload
    }
}

/// Splits accumulated text on blank lines (`\n\n` or `\r\n\r\n`)
#[derive(Debug, Default)]
pub struct MessageDecoder {
    utf8: Utf8Accumulator,
    buffer: String,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position and length of the leftmost block separator
    fn next_separator(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.find("\n\n").map(|pos| (pos, 2));
        let crlf = self.buffer.find("\r\n\r\n").map(|pos| (pos, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    fn drain_blocks(&mut self, units: &mut Vec<LogicalUnit>) {
        while let Some((pos, len)) = self.next_separator() {
            let block: String = self.buffer.drain(..pos + len).collect();
            let block = &block[..pos];
            if !block.trim().is_empty() {
                units.push(LogicalUnit(block.to_string()));
            }
        }
    }
}

impl FrameDecoder for MessageDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<LogicalUnit> {
        let text = self.utf8.push(chunk);
        self.buffer.push_str(&text);

        let mut units = Vec::new();
        self.drain_blocks(&mut units);
        units
    }

    fn finish(&mut self) -> Vec<LogicalUnit> {
        let rest = self.utf8.finish();
        self.buffer.push_str(&rest);

        let mut units = Vec::new();
        self.drain_blocks(&mut units);

        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim_end_matches(['\r', '\n']);
        if !tail.trim().is_empty() {
            units.push(LogicalUnit(tail.to_string()));
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = MessageDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out.extend(decoder.finish());
        out.into_iter().map(LogicalUnit::into_string).collect()
    }

    #[test]
    fn test_classify_unit() {
        let unit = |s: &str| LogicalUnit(s.to_string());
        assert_eq!(classify_unit(&unit("data: {\"x\":1}")), UnitKind::PassThrough);
        assert_eq!(classify_unit(&unit("  event: message\ndata: hi")), UnitKind::PassThrough);
        assert_eq!(classify_unit(&unit(": ping")), UnitKind::PassThrough);
        assert_eq!(classify_unit(&unit("hello world")), UnitKind::RawPayload);
        assert_eq!(classify_unit(&unit("{\"data\": 1}")), UnitKind::RawPayload);
    }

    #[test]
    fn test_blocks_split_on_blank_lines() {
        let units = decode_all(&[b"data: a\n\ndata: b\r\n\r\nevent: x\ndata: c\n\n"]);
        assert_eq!(units, vec!["data: a", "data: b", "event: x\ndata: c"]);
    }

    #[test]
    fn test_tail_flushed_on_finish() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.push(b"plain tok").is_empty());
        assert!(decoder.push(b"ens\n").is_empty());
        assert_eq!(decoder.finish(), vec![LogicalUnit("plain tokens".into())]);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let input = "data: {\"type\":\"text-delta\",\"delta\":\"Hé\"}\n\n: keepalive\r\n\r\nraw line one\nraw line two\n\n\n\ndata: [DONE]";
        let bytes = input.as_bytes();
        let whole = decode_all(&[bytes]);
        assert_eq!(whole.len(), 4);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(decode_all(&[a, b]), whole, "split at {}", split);
        }

        for size in [1, 2, 5, 7] {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(decode_all(&chunks), whole, "chunk size {}", size);
        }
    }
}
