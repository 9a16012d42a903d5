use docket_core::error::{DocketError, Result};

/// Longest line accepted before the stream is treated as broken.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a streamed response body into message payloads.
///
/// Accepts Server-Sent Events (`data:` lines) and newline-delimited JSON.
/// Blank lines, `:` comments, the other SSE fields and the `[DONE]`
/// sentinel produce nothing. Bytes are buffered until a full line arrives,
/// so chunk boundaries may fall anywhere, including inside a UTF-8
/// sequence.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to contain no newline.
    scanned: usize,
    max_line: usize,
}

const SSE_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineFramer {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Feed one chunk and return every message it completes. Fails once
    /// an unterminated line grows past the configured maximum.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if let Some(message) = payload(&self.buffer[start..=end]) {
                messages.push(message);
            }
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            return Err(DocketError::Stream(format!(
                "line exceeds {} bytes without a newline",
                self.max_line
            )));
        }
        Ok(messages)
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        payload(&rest)
    }
}

fn payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);

    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    if SSE_FIELDS.iter().any(|field| line.starts_with(field)) {
        return None;
    }

    let data = match line.strip_prefix("data:") {
        Some(data) => data.strip_prefix(' ').unwrap_or(data),
        None => line,
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_lines() {
        let mut framer = LineFramer::default();
        let out = framer
            .push(b": keepalive\nevent: message\ndata: {\"type\":\"llm_start\"}\n\n")
            .unwrap();
        assert_eq!(out, vec![r#"{"type":"llm_start"}"#]);
    }

    #[test]
    fn test_ndjson_lines_with_crlf() {
        let mut framer = LineFramer::default();
        let out = framer.push(b"{\"a\":1}\r\n{\"b\":2}\r\n").unwrap();
        assert_eq!(out, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"data: {\"type\":\"llm_tok").unwrap().is_empty());
        assert!(framer.push(b"en\",\"text\":\"\xc3").unwrap().is_empty());
        let out = framer.push(b"\xa9\"}\n").unwrap();
        assert_eq!(out, vec![r#"{"type":"llm_token","text":"é"}"#]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"data: [DONE]\n{\"type\":\"error\"}").unwrap().is_empty());
        assert_eq!(framer.finish().as_deref(), Some(r#"{"type":"error"}"#));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_long_line_in_small_chunks() {
        let mut framer = LineFramer::default();
        assert!(framer.push(b"data: {\"text\":\"").unwrap().is_empty());
        for _ in 0..1000 {
            assert!(framer.push(b"xy").unwrap().is_empty());
        }
        let out = framer.push(b"\"}\ndata: {\"type\":\"llm_").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), r#"{"text":""}"#.len() + 2000);

        let out = framer.push(b"start\"}\n").unwrap();
        assert_eq!(out, vec![r#"{"type":"llm_start"}"#]);
    }

    #[test]
    fn test_oversized_line_is_an_error() {
        let mut framer = LineFramer::with_max_line(16);
        assert_eq!(framer.push(b"{\"a\":1}\n0123456789").unwrap().len(), 1);
        match framer.push(b"0123456789") {
            Err(DocketError::Stream(msg)) => assert!(msg.contains("16 bytes")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
