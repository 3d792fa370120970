use crate::batch::types::{Batch, LogLine};
use crate::config::types::BatchConfig;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Cuts an ordered line stream into fixed-size batches that overlap by `window` lines.
///
/// The batcher owns the sliding buffer and the batch counter. After every cut the
/// buffer starts with the last `window` lines of the batch that was just emitted,
/// so context spanning a cut point is seen by both batches.
pub struct LineBatcher {
    batch_size: usize,
    window: usize,
    max_batches: Option<usize>,
    buffer: VecDeque<LogLine>,
    // Leading lines of `buffer` that were already part of the previous batch
    carried: usize,
    next_seq: u64,
    emitted: usize,
}

impl LineBatcher {
    /// A zero batch size is raised to one and the window is clamped below the
    /// batch size, so every cut drops at least one line from the buffer.
    pub fn new(batch_size: usize, window: usize, max_batches: Option<usize>) -> Self {
        let batch_size = batch_size.max(1);
        if window >= batch_size {
            warn!(batch_size, window, "Overlap window must be smaller than the batch size, clamping");
        }
        let window = window.min(batch_size - 1);

        Self {
            batch_size,
            window,
            max_batches,
            buffer: VecDeque::with_capacity(batch_size + window),
            carried: 0,
            next_seq: 0,
            emitted: 0,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.size, config.window, config.max_batches)
    }

    /// Add a line to the buffer.
    /// Returns a full batch once the buffer holds `batch_size + window` lines.
    pub fn push_line(&mut self, text: impl Into<String>) -> Option<Batch> {
        if self.is_exhausted() {
            return None;
        }

        self.next_seq += 1;
        self.buffer.push_back(LogLine {
            seq: self.next_seq,
            text: text.into(),
        });

        if self.buffer.len() >= self.batch_size + self.window {
            Some(self.cut(self.batch_size))
        } else {
            None
        }
    }

    /// Force a cut regardless of the ready threshold.
    ///
    /// Used by continuous mode on growth bursts and idle timeouts. Cuts at most
    /// `batch_size` lines, and only if the buffer holds more than the overlap window.
    pub fn evaluate(&mut self) -> Option<Batch> {
        if self.is_exhausted() || self.buffer.len() <= self.window {
            return None;
        }

        let take = self.buffer.len().min(self.batch_size);
        Some(self.cut(take))
    }

    /// Flush the buffer at end of input, one batch per call.
    ///
    /// While more than `batch_size` lines remain, full batches are cut exactly as in
    /// `push_line`. What is left then becomes a final batch only if it holds lines
    /// beyond the overlap window; a residual made of overlap alone was already
    /// covered by the previous batch and is discarded. Returns `None` once drained.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.is_exhausted() || self.buffer.len() <= self.window {
            if !self.buffer.is_empty() {
                debug!(lines = self.buffer.len(), "Discarding residual lines at end of input");
            }
            self.buffer.clear();
            self.carried = 0;
            return None;
        }

        if self.buffer.len() > self.batch_size {
            return Some(self.cut(self.batch_size));
        }

        let take = self.buffer.len();
        let batch = self.cut(take);
        self.buffer.clear();
        self.carried = 0;
        Some(batch)
    }

    /// Whether the configured batch cap has been reached
    pub fn is_exhausted(&self) -> bool {
        self.max_batches
            .map(|max| self.emitted >= max)
            .unwrap_or(false)
    }

    /// Number of lines currently buffered (overlap head included)
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of batches emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Cut the first `take` lines as a batch and keep the last `window` of them
    /// at the head of the buffer. Callers guarantee `window < take <= buffer.len()`.
    fn cut(&mut self, take: usize) -> Batch {
        let keep = self.window.min(take);
        let dropped = take - keep;

        let mut lines: Vec<LogLine> = self.buffer.drain(..dropped).collect();
        lines.extend(self.buffer.iter().take(keep).cloned());

        let overlap = self.carried.min(take);
        self.carried = keep;
        self.emitted += 1;

        let batch = Batch {
            number: self.emitted as u64,
            overlap,
            lines,
        };

        debug!(
            batch = batch.number,
            lines = batch.len(),
            overlap = batch.overlap,
            retained = self.buffer.len(),
            "Cut batch"
        );

        batch
    }
}
