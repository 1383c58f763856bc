// src/exec/lines.rs

/// Line capture with an optional upper bound.
///
/// Lines past the limit are discarded as they arrive (only counted), so the
/// memory held never exceeds `limit` lines no matter how much a child prints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedLines {
    lines: Vec<String>,
    limit: Option<usize>,
    dropped: usize,
}

impl BoundedLines {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            lines: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Record a line. Returns false if it was dropped.
    pub fn push(&mut self, line: String) -> bool {
        match self.limit {
            Some(limit) if self.lines.len() >= limit => {
                self.dropped += 1;
                false
            }
            _ => {
                self.lines.push(line);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_parts(self) -> (Vec<String>, usize) {
        (self.lines, self.dropped)
    }
}
