//! Line mode: newline-delimited JSON records (progress feeds)

use super::{FrameDecoder, LogicalUnit, Utf8Accumulator};

/// Splits accumulated text on `\n`, keeping the incomplete tail buffered
#[derive(Debug, Default)]
pub struct LineDecoder {
    utf8: Utf8Accumulator,
    /// Text after the last newline seen so far
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn drain_lines(&mut self, units: &mut Vec<LogicalUnit>) {
        while let Some(idx) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=idx).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            if !line.trim().is_empty() {
                units.push(LogicalUnit(line.to_string()));
            }
        }
    }
}

impl FrameDecoder for LineDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<LogicalUnit> {
        let text = self.utf8.push(chunk);
        self.buffer.push_str(&text);

        let mut units = Vec::new();
        self.drain_lines(&mut units);
        units
    }

    fn finish(&mut self) -> Vec<LogicalUnit> {
        let rest = self.utf8.finish();
        self.buffer.push_str(&rest);

        let mut units = Vec::new();
        self.drain_lines(&mut units);

        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim_end_matches('\r');
        if !tail.trim().is_empty() {
            units.push(LogicalUnit(tail.to_string()));
        }
        units
    }
}
