//! Decode + normalize pipelines, one per upstream type

use tracing::{debug, warn};

use crate::decode::{FrameDecoder, LineDecoder, LogicalUnit, MessageDecoder};
use crate::normalize::{MessageNormalizer, NormalizedEvent, ProgressNormalizer};

/// Turns raw upstream chunks into normalized events, preserving unit order
pub trait EventPipeline: Send {
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<NormalizedEvent>;

    /// Flush buffered state once the upstream has ended
    fn finish(&mut self) -> Vec<NormalizedEvent>;
}

/// Line-mode progress feed (model pulls)
#[derive(Debug, Default)]
pub struct ProgressPipeline {
    decoder: LineDecoder,
    normalizer: ProgressNormalizer,
    dropped: usize,
}

impl ProgressPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records skipped because they were not valid JSON
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn normalize_all(&mut self, units: Vec<LogicalUnit>) -> Vec<NormalizedEvent> {
        let mut events = Vec::with_capacity(units.len());
        for unit in units {
            match self.normalizer.normalize(&unit) {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.dropped += 1;
                    warn!("Skipping progress record: {}", e);
                }
            }
        }
        events
    }
}

impl EventPipeline for ProgressPipeline {
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<NormalizedEvent> {
        let units = self.decoder.push(chunk);
        self.normalize_all(units)
    }

    fn finish(&mut self) -> Vec<NormalizedEvent> {
        let units = self.decoder.finish();
        let events = self.normalize_all(units);
        if self.dropped > 0 {
            debug!("Progress feed finished, {} malformed records dropped", self.dropped);
        }
        events
    }
}

/// Message-stream token feed (agent chat)
#[derive(Debug, Default)]
pub struct TokenPipeline {
    decoder: MessageDecoder,
    normalizer: MessageNormalizer,
}

impl TokenPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize_all(&self, units: Vec<LogicalUnit>) -> Vec<NormalizedEvent> {
        units
            .into_iter()
            .filter_map(|unit| self.normalizer.normalize(unit))
            .collect()
    }
}

impl EventPipeline for TokenPipeline {
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<NormalizedEvent> {
        let units = self.decoder.push(chunk);
        self.normalize_all(units)
    }

    fn finish(&mut self) -> Vec<NormalizedEvent> {
        let units = self.decoder.finish();
        self.normalize_all(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Payload;

    fn run(pipeline: &mut dyn EventPipeline, chunks: &[&[u8]]) -> Vec<NormalizedEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(pipeline.push_chunk(chunk));
        }
        events.extend(pipeline.finish());
        events
    }

    #[test]
    fn test_progress_then_success() {
        let mut pipeline = ProgressPipeline::new();
        let events = run(
            &mut pipeline,
            &[
                b"{\"completed\":50,\"total\":100,\"status\":\"downloading\"}\n",
                b"{\"status\":\"success\"}\n",
            ],
        );
        assert_eq!(
            events,
            vec![
                NormalizedEvent::Progress {
                    percent: 50,
                    detail: "downloading".into()
                },
                NormalizedEvent::Success,
            ]
        );
    }

    #[test]
    fn test_malformed_line_dropped() {
        let mut pipeline = ProgressPipeline::new();
        let events = run(
            &mut pipeline,
            &[b"{\"completed\":\n", b"{\"status\":\"success\"}\n"],
        );
        assert_eq!(events, vec![NormalizedEvent::Success]);
        assert_eq!(pipeline.dropped(), 1);
    }

    #[test]
    fn test_progress_non_decreasing() {
        let total = 1_000u64;
        let feed: String = (0..=total)
            .step_by(37)
            .map(|c| format!("{{\"status\":\"pulling abc\",\"completed\":{},\"total\":{}}}\n", c, total))
            .collect();

        let mut pipeline = ProgressPipeline::new();
        let chunks: Vec<&[u8]> = feed.as_bytes().chunks(11).collect();
        let events = run(&mut pipeline, &chunks);

        let mut last = 0u8;
        for event in events {
            match event {
                NormalizedEvent::Progress { percent, .. } => {
                    assert!(percent >= last);
                    assert!(percent <= 100);
                    last = percent;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_token_stream_order_preserved() {
        let mut pipeline = TokenPipeline::new();
        let events = run(
            &mut pipeline,
            &[b"data: one\n\nda", b"ta: two\n\nthree\n\n", b"data: {\"type\":\"error\",\"errorText\":\"x\"}\n\n"],
        );
        assert_eq!(
            events,
            vec![
                NormalizedEvent::Data {
                    payload: Payload::PassThrough("data: one".into())
                },
                NormalizedEvent::Data {
                    payload: Payload::PassThrough("data: two".into())
                },
                NormalizedEvent::Data {
                    payload: Payload::Raw("three".into())
                },
                NormalizedEvent::Error {
                    message: "x".into()
                },
            ]
        );
    }
}
