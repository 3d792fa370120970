/// One line read from the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Position of the line in the input, starting at 1
    pub seq: u64,

    /// Raw text with the line terminator removed
    pub text: String,
}

/// A group of consecutive log lines submitted together for analysis.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Batch number, starts at 1 and increments by 1 per emitted batch
    pub number: u64,

    /// Count of leading lines carried over from the previous batch
    pub overlap: usize,

    /// Lines in input order
    pub lines: Vec<LogLine>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line texts in order, without sequence numbers
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.text.as_str())
    }

    /// Sequence range covered by this batch (first, last)
    pub fn seq_range(&self) -> Option<(u64, u64)> {
        let first = self.lines.first()?.seq;
        let last = self.lines.last()?.seq;
        Some((first, last))
    }
}
