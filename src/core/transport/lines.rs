//! CR/LF line framing shared by the byte-stream transports

use bytes::{Buf, BytesMut};

/// Accumulates raw bytes and yields complete lines
///
/// Lines end at `\n`; a trailing `\r` is stripped. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Direct access for `read_buf`-style readers
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Pop the next complete, non-empty line
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw = self.buf.split_to(pos);
            self.buf.advance(1);
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches('\r').trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Bytes held without a terminating newline yet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_crlf_lines() {
        let mut lines = LineBuffer::new();
        lines.extend(b"C3\r\nAMUT1\r\nV4 A4");
        assert_eq!(lines.next_line().as_deref(), Some("C3"));
        assert_eq!(lines.next_line().as_deref(), Some("AMUT1"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 5);

        lines.extend(b" T1\n");
        assert_eq!(lines.next_line().as_deref(), Some("V4 A4 T1"));
    }

    #[test]
    fn test_skips_blank_lines() {
        let mut lines = LineBuffer::new();
        lines.extend(b"\r\n\r\n  \nOut2 In3 Vid\r\n");
        assert_eq!(lines.next_line().as_deref(), Some("Out2 In3 Vid"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 0);
    }
}
