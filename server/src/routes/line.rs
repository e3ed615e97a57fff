use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Longest line a client may send, not counting the line terminator.
pub const MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A complete line without its terminator. Bytes that are not UTF-8 are
    /// replaced so the parser can answer with an error.
    Text(String),
    /// A line over [`MAX_LINE_LENGTH`] bytes. Its content is discarded.
    TooLong,
}

/// Splits client input into lines of bounded length.
///
/// `next_line` is cancel safe: bytes read before a cancelled call stay
/// buffered and are part of the next line returned.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    overflowed: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Returns the next line, or `None` once the peer has closed and every
    /// buffered byte has been returned.
    pub async fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        loop {
            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                if self.buf.is_empty() && !self.overflowed {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            let (used, complete) = match chunk.iter().position(|&b| b == b'\n') {
                Some(end) => (end + 1, true),
                None => (chunk.len(), false),
            };
            if !self.overflowed {
                if self.buf.len() + used > MAX_LINE_LENGTH + 2 {
                    self.overflowed = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&chunk[..used]);
                }
            }
            self.reader.consume(used);

            if complete {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> Line {
        if std::mem::take(&mut self.overflowed) {
            return Line::TooLong;
        }

        let mut bytes = std::mem::take(&mut self.buf);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }
        if bytes.len() > MAX_LINE_LENGTH {
            return Line::TooLong;
        }
        match String::from_utf8(bytes) {
            Ok(text) => Line::Text(text),
            Err(e) => Line::Text(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8]) -> Vec<Line> {
        let mut reader = LineReader::new(input);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    fn text(s: &str) -> Line {
        Line::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_splits_lines() {
        assert_eq!(
            collect(b"look\r\ndig 1 2\n\nbye").await,
            [text("look"), text("dig 1 2"), text(""), text("bye")]
        );
        assert!(collect(b"").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        assert_eq!(
            collect(b"dig \xff\xfe 1\nlook\n").await,
            [text("dig \u{FFFD}\u{FFFD} 1"), text("look")]
        );
    }

    #[tokio::test]
    async fn test_long_line_is_dropped() {
        let mut input = vec![b'a'; MAX_LINE_LENGTH * 4];
        input.extend_from_slice(b"\nlook\n");
        assert_eq!(collect(&input).await, [Line::TooLong, text("look")]);

        let mut input = vec![b'a'; MAX_LINE_LENGTH];
        input.extend_from_slice(b"\r\n");
        assert_eq!(
            collect(&input).await,
            [text(&"a".repeat(MAX_LINE_LENGTH))]
        );

        let input = vec![b'a'; MAX_LINE_LENGTH + 1];
        assert_eq!(collect(&input).await, [Line::TooLong]);
    }
}
