//! Incremental message framing for the STDIO transport.
//!
//! Servers write newline-delimited JSON. Some older servers frame messages
//! with a `Content-Length` header instead; both are accepted.

use crate::discovery::adapters::jsonrpc::MAX_MESSAGE_SIZE;
use crate::discovery::ports::{SessionError, SessionResult};

const CONTENT_LENGTH: &[u8] = b"content-length:";

/// Buffers raw stdout bytes and yields complete message frames.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete frame, or `None` when more input is needed.
    pub(crate) fn next_frame(&mut self) -> SessionResult<Option<Vec<u8>>> {
        loop {
            let leading = self
                .buffer
                .iter()
                .take_while(|byte| matches!(byte, b'\n' | b'\r'))
                .count();
            self.buffer.drain(..leading);

            if self.buffer.is_empty() {
                return Ok(None);
            }

            if starts_with_ignore_case(&self.buffer, CONTENT_LENGTH) {
                return self.next_length_prefixed();
            }

            let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') else {
                return self.ensure_within_limit(self.buffer.len()).map(|()| None);
            };

            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            while line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn next_length_prefixed(&mut self) -> SessionResult<Option<Vec<u8>>> {
        let Some((header_end, delimiter_len)) = find_header_end(&self.buffer) else {
            return self.ensure_within_limit(self.buffer.len()).map(|()| None);
        };

        let parsed_length = {
            let headers =
                String::from_utf8_lossy(self.buffer.get(..header_end).unwrap_or_default());
            headers.lines().find_map(|line| {
                let (field, value) = line.split_once(':')?;
                field
                    .trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
        };
        let Some(content_length) = parsed_length else {
            self.buffer.clear();
            return Err(SessionError::Malformed(
                "invalid Content-Length header".to_owned(),
            ));
        };
        self.ensure_within_limit(content_length)?;

        let body_start = header_end + delimiter_len;
        let frame_end = body_start + content_length;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let mut frame: Vec<u8> = self.buffer.drain(..frame_end).collect();
        Ok(Some(frame.split_off(body_start)))
    }

    fn ensure_within_limit(&mut self, size: usize) -> SessionResult<()> {
        if size <= MAX_MESSAGE_SIZE {
            return Ok(());
        }
        self.buffer.clear();
        Err(SessionError::Malformed(format!(
            "message exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )))
    }
}

fn starts_with_ignore_case(buffer: &[u8], prefix: &[u8]) -> bool {
    buffer
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn find_header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    find_subsequence(buffer, b"\r\n\r\n")
        .map(|position| (position, 4))
        .or_else(|| find_subsequence(buffer, b"\n\n").map(|position| (position, 2)))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_newline_delimited_messages() {
        let mut decoder = FrameDecoder::default();
        decoder.push(b"{\"id\":1}\r\n\n{\"id\":2}\n");

        assert_eq!(
            decoder.next_frame().expect("frame"),
            Some(b"{\"id\":1}".to_vec())
        );
        assert_eq!(
            decoder.next_frame().expect("frame"),
            Some(b"{\"id\":2}".to_vec())
        );
        assert_eq!(decoder.next_frame().expect("frame"), None);
    }

    #[test]
    fn waits_for_the_rest_of_a_split_line() {
        let mut decoder = FrameDecoder::default();
        decoder.push(b"{\"id\":");
        assert_eq!(decoder.next_frame().expect("frame"), None);

        decoder.push(b"1}\n");
        assert_eq!(
            decoder.next_frame().expect("frame"),
            Some(b"{\"id\":1}".to_vec())
        );
    }

    #[test]
    fn decodes_content_length_framed_message() {
        let body = b"{\"jsonrpc\":\"2.0\",\"id\":1}";
        let mut decoder = FrameDecoder::default();
        decoder.push(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        decoder.push(body);

        assert_eq!(decoder.next_frame().expect("frame"), Some(body.to_vec()));
        assert_eq!(decoder.next_frame().expect("frame"), None);
    }

    #[test]
    fn partial_content_length_body_needs_more_input() {
        let mut decoder = FrameDecoder::default();
        decoder.push(b"Content-Length: 10\r\n\r\n{\"id\"");

        assert_eq!(decoder.next_frame().expect("frame"), None);
    }

    #[test]
    fn oversized_content_length_is_rejected() {
        let mut decoder = FrameDecoder::default();
        decoder.push(format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1).as_bytes());

        assert!(matches!(
            decoder.next_frame(),
            Err(SessionError::Malformed(_))
        ));
    }
}
