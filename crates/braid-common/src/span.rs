use serde::{Deserialize, Serialize};

/// Byte-offset range `[start, end)` into one source file.
///
/// The binder attaches a span to every AST node it hands to the resolver;
/// synthesized nodes inherit the span of the declaration they were built from.
/// Nodes with no source position carry `Span::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Span { start, end }
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// The span as a `usize` range clamped to a source of `source_len` bytes.
    pub fn to_range(self, source_len: usize) -> std::ops::Range<usize> {
        let start = (self.start as usize).min(source_len);
        let end = (self.end as usize).min(source_len).max(start);
        start..end
    }
}

/// Offsets of line starts, for turning a byte offset into a 1-based
/// line and column.
#[derive(Debug)]
pub struct LineIndex {
    starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i as u32 + 1))
            .collect();
        LineIndex { starts }
    }

    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        (line as u32 + 1, offset - self.starts[line] + 1)
    }
}
