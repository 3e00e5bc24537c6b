//! Line splitting for streamed response bodies.

/// Accumulates body chunks and hands back complete lines.
///
/// Bytes stay buffered until a newline arrives, so a multi-byte character
/// split across two chunks decodes intact. Lines come back without their
/// `\n` or `\r\n` terminator; blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.extend(decode(&raw[..pos]));
        }
        lines
    }

    /// The unterminated tail left when the body ends.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        decode(&rest)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    (!line.trim().is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_complete_across_chunks() {
        let mut lines = LineBuffer::new();
        assert!(lines.push(b"data: {\"content\":\"Hel").is_empty());
        assert_eq!(
            lines.push(b"lo\"}\r\n\r\ndata: [DONE]\n"),
            vec!["data: {\"content\":\"Hello\"}", "data: [DONE]"]
        );
        assert!(lines.is_empty());
    }

    #[test]
    fn split_multibyte_character_survives() {
        let text = "data: café\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut lines = LineBuffer::new();
        assert!(lines.push(&text[..split]).is_empty());
        assert_eq!(lines.push(&text[split..]), vec!["data: café"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut lines = LineBuffer::new();
        lines.push(b"first\nsecond");
        assert_eq!(lines.finish().as_deref(), Some("second"));
        assert_eq!(lines.finish(), None);

        lines.push(b"   ");
        assert_eq!(lines.finish(), None);
    }
}
