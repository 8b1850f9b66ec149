//! Incremental framing for streamed response bodies
//!
//! Network reads split lines, JSON objects and even UTF-8 sequences at
//! arbitrary points; the decoders here buffer until a unit is complete.

/// Carries incomplete UTF-8 sequences across chunk boundaries
#[derive(Debug, Default)]
struct Utf8Buffer {
    incomplete: Vec<u8>,
}

impl Utf8Buffer {
    /// Decode as much of `chunk` (plus any carried bytes) as forms valid UTF-8
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.incomplete);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        // Truncated sequence at the end: wait for the rest
                        None => {
                            self.incomplete = after.to_vec();
                            break;
                        }
                        Some(len) => {
                            tracing::warn!("Invalid UTF-8 in stream body, replacing");
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                    }
                }
            }
        }

        out
    }

    fn flush(&mut self) -> String {
        let bytes = std::mem::take(&mut self.incomplete);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Splits a byte stream into text lines
#[derive(Debug, Default)]
pub(crate) struct LineDecoder {
    utf8: Utf8Buffer,
    buffer: String,
}

impl LineDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every line completed by them
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Unterminated trailing line, if any, once the body has ended
    pub(crate) fn finish(&mut self) -> Option<String> {
        let tail = self.utf8.flush();
        self.buffer.push_str(&tail);

        let line = std::mem::take(&mut self.buffer);
        let line = line.trim_end_matches('\r');
        (!line.trim().is_empty()).then(|| line.to_string())
    }
}

/// Payload of an SSE `data:` line; `None` for comments, other fields and blanks
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    (!data.trim().is_empty()).then_some(data)
}

/// Extracts top-level JSON objects from a body that is either
/// newline-delimited objects or a single JSON array of objects
///
/// Anything outside an object (array brackets, commas, whitespace, stray
/// text) is ignored. Braces inside string literals are not counted.
///
/// A broken object is dropped rather than swallowing the rest of the body:
/// a raw newline inside a string literal, or a `{` in the first column while
/// an object is still open, discards the partial object and resynchronizes.
/// Nested objects of pretty-printed bodies are always indented.
#[derive(Debug)]
pub(crate) struct JsonObjectScanner {
    utf8: Utf8Buffer,
    current: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    line_start: bool,
    discarded: usize,
}

impl Default for JsonObjectScanner {
    fn default() -> Self {
        Self {
            utf8: Utf8Buffer::default(),
            current: String::new(),
            depth: 0,
            in_string: false,
            escaped: false,
            line_start: true,
            discarded: 0,
        }
    }
}

impl JsonObjectScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the text of every object completed by them
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(chunk);
        let mut objects = Vec::new();

        for c in text.chars() {
            let line_start = std::mem::replace(&mut self.line_start, c == '\n');

            if self.depth > 0 {
                let truncated_string = self.in_string && c == '\n';
                let restarted = !self.in_string && line_start && c == '{';
                if truncated_string || restarted {
                    self.discard();
                }
            }

            if self.depth == 0 {
                if c == '{' {
                    self.depth = 1;
                    self.current.push(c);
                }
                continue;
            }

            self.current.push(c);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        objects.push(std::mem::take(&mut self.current));
                    }
                }
                _ => {}
            }
        }

        objects
    }

    /// Whether an object was left open when the body ended
    pub(crate) fn has_partial(&self) -> bool {
        self.depth > 0
    }

    /// Number of broken objects dropped so far
    pub(crate) fn discarded(&self) -> usize {
        self.discarded
    }

    fn discard(&mut self) {
        tracing::warn!(
            partial_length = self.current.len(),
            "Discarding incomplete JSON object in stream"
        );
        self.current.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.discarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = LineDecoder::new();

        assert!(decoder.feed(b"data: {\"a\"").is_empty());
        let lines = decoder.feed(b": 1}\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\": 1}", "data: [DONE]"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_unterminated_last_line_is_flushed() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("data: tail"));
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        let text = "héllo\n".as_bytes();

        // Split inside the two-byte 'é'
        assert!(decoder.feed(&text[..2]).is_empty());
        let lines = decoder.feed(&text[2..]);
        assert_eq!(lines, vec!["héllo"]);
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("event: message_start"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("data: "), None);
        assert_eq!(sse_data(""), None);
    }

    #[test]
    fn test_scanner_json_array_body() {
        let mut scanner = JsonObjectScanner::new();
        let body = b"[{\"a\": 1}\n,\r\n{\"b\": {\"c\": 2}}\n]";

        let objects = scanner.feed(body);
        assert_eq!(objects, vec!["{\"a\": 1}", "{\"b\": {\"c\": 2}}"]);
        assert!(!scanner.has_partial());
    }

    #[test]
    fn test_scanner_jsonl_body_split_mid_object() {
        let mut scanner = JsonObjectScanner::new();

        assert!(scanner.feed(b"{\"a\": ").is_empty());
        assert!(scanner.has_partial());
        let objects = scanner.feed(b"1}\n{\"b\": 2}\n");
        assert_eq!(objects, vec!["{\"a\": 1}", "{\"b\": 2}"]);
    }

    #[test]
    fn test_scanner_ignores_braces_in_strings() {
        let mut scanner = JsonObjectScanner::new();
        let objects = scanner.feed(br#"{"text": "a } b { \" }"}"#);
        assert_eq!(objects.len(), 1);

        let parsed: serde_json::Value = serde_json::from_str(&objects[0]).unwrap();
        assert_eq!(parsed["text"], "a } b { \" }");
    }

    #[test]
    fn test_scanner_skips_text_outside_objects() {
        let mut scanner = JsonObjectScanner::new();
        let objects = scanner.feed(b"garbage line\n{\"ok\": true}\n");
        assert_eq!(objects, vec!["{\"ok\": true}"]);
    }

    #[test]
    fn test_scanner_resyncs_after_unbalanced_line() {
        let mut scanner = JsonObjectScanner::new();
        let objects = scanner.feed(b"{\"a\": 1}\n{not json\n{\"b\": 2}\n");

        assert_eq!(objects, vec!["{\"a\": 1}", "{\"b\": 2}"]);
        assert_eq!(scanner.discarded(), 1);
        assert!(!scanner.has_partial());
    }

    #[test]
    fn test_scanner_resyncs_after_truncated_string() {
        let mut scanner = JsonObjectScanner::new();

        let mut objects = scanner.feed(b"{\"parts\": [{\"text\": \"trunc\n");
        objects.extend(scanner.feed(b"{\"b\": \"x\"}\n"));

        assert_eq!(objects, vec!["{\"b\": \"x\"}"]);
        assert_eq!(scanner.discarded(), 1);
    }

    #[test]
    fn test_scanner_keeps_indented_nested_objects() {
        let mut scanner = JsonObjectScanner::new();
        let body = b"[{\n  \"a\": {\n    \"b\": 1\n  }\n}\n,\n{\n  \"c\": 2\n}\n]";

        let objects = scanner.feed(body);
        assert_eq!(objects.len(), 2);
        assert_eq!(scanner.discarded(), 0);

        let first: serde_json::Value = serde_json::from_str(&objects[0]).unwrap();
        assert_eq!(first["a"]["b"], 1);
    }
}
