use std::sync::Arc;

/// Shared immutable source text with a name for diagnostics.
/// All source ranges in tokens and locations are byte offsets into `source`.
#[derive(Debug)]
pub struct Script {
    pub name: String,
    pub source: String,
}

impl Script {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Arc<Script> {
        Arc::new(Script {
            name: name.into(),
            source: source.into(),
        })
    }

    /// 1-based line number of a byte offset.
    pub(crate) fn line_of(&self, byte: usize) -> usize {
        let upto = byte.min(self.source.len());
        1 + self.source.as_bytes()[..upto]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_of_counts_newlines() {
        let script = Script::new("t", "a\nbb\nccc");
        assert_eq!(script.line_of(0), 1);
        assert_eq!(script.line_of(2), 2);
        assert_eq!(script.line_of(5), 3);
    }
}
