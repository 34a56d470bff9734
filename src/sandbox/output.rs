//! Bounded capture of console output from executed code.

/// Bytes of console output kept per run. The rest is counted and dropped.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Output buffer that stops growing at a fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CappedOutput {
    buf: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl CappedOutput {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Appends what fits under the limit and counts the remainder.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        let keep = room.min(chunk.len());
        self.buf.extend_from_slice(&chunk[..keep]);
        self.dropped = self.dropped.saturating_add(chunk.len() - keep);
    }

    pub(crate) fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Decodes the kept bytes, followed by a marker line if anything was dropped.
    pub(crate) fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buf).into_owned();
        if self.dropped > 0 {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!(
                "[output truncated: {} more bytes not shown]\n",
                self.dropped
            ));
        }
        text
    }
}

impl Default for CappedOutput {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_is_unchanged() {
        let mut output = CappedOutput::new(16);
        output.push(b"4\n");
        output.push(b"5\n");
        assert!(!output.is_truncated());
        assert_eq!(output.into_string(), "4\n5\n");
    }

    #[test]
    fn test_stops_growing_at_limit() {
        let mut output = CappedOutput::new(8);
        for _ in 0..1000 {
            output.push(b"spam spam spam\n");
        }
        assert!(output.is_truncated());
        assert_eq!(output.buf.len(), 8);
        assert_eq!(
            output.into_string(),
            "spam spa\n[output truncated: 14992 more bytes not shown]\n"
        );
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let mut output = CappedOutput::new(4);
        output.push(b"abcd");
        output.push(b"");
        assert!(!output.is_truncated());
        assert_eq!(output.into_string(), "abcd");
    }

    #[test]
    fn test_split_multibyte_char_is_lossy() {
        let mut output = CappedOutput::new(1);
        output.push("é".as_bytes());
        let text = output.into_string();
        assert!(text.starts_with('\u{fffd}'));
        assert!(text.contains("1 more bytes"));
    }
}
