//! Newline-delimited line codec
//!
//! Frames are `\n`-terminated; a trailing `\r` is stripped. A line longer than
//! the configured maximum is reported once as [`Line::TooLong`] and the rest of
//! it is discarded up to the next newline, so one oversized line never ends the
//! session. Invalid UTF-8 is replaced rather than treated as a stream error.

use std::cmp;
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(String),
    TooLong,
}

#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline
    next_index: usize,
    /// Inside an oversized line, dropping bytes until `\n`
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

/// Frame contents without the `\n` terminator and an optional `\r`
fn content(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

fn to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl LineCodec {
    /// No `\n` within reach can end the current line inside the limit.
    /// One byte past the limit is tolerated only when it is the `\r` of a
    /// CRLF ending still waiting for its `\n`.
    fn overflows(&self, buf: &BytesMut) -> bool {
        let limit = self.max_length;
        buf.len() > limit.saturating_add(1) || (buf.len() == limit + 1 && buf[limit] != b'\r')
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, io::Error> {
        loop {
            if self.discarding {
                match buf.iter().position(|b| *b == b'\n') {
                    Some(offset) => {
                        buf.advance(offset + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        buf.clear();
                        return Ok(None);
                    }
                }
            }

            // The limit applies to the line contents, so leave room for "\r\n"
            let read_to = cmp::min(self.max_length.saturating_add(2), buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            return match newline {
                Some(offset) => {
                    let index = self.next_index + offset;
                    self.next_index = 0;
                    let frame = buf.split_to(index + 1);
                    let line = content(&frame);
                    if line.len() > self.max_length {
                        Ok(Some(Line::TooLong))
                    } else {
                        Ok(Some(Line::Text(to_text(line))))
                    }
                }
                None if self.overflows(buf) => {
                    self.next_index = 0;
                    self.discarding = true;
                    Ok(Some(Line::TooLong))
                }
                None => {
                    self.next_index = read_to;
                    Ok(None)
                }
            };
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        // Peer closed mid-line: hand over what it sent unless we were discarding
        self.next_index = 0;
        if buf.is_empty() || self.discarding {
            buf.clear();
            self.discarding = false;
            return Ok(None);
        }
        let frame = buf.split_to(buf.len());
        let line = content(&frame);
        if line.len() > self.max_length {
            return Ok(Some(Line::TooLong));
        }
        Ok(Some(Line::Text(to_text(line))))
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), io::Error> {
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<Line> {
        let mut out = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_splits_on_newline_and_strips_cr() {
        let mut codec = LineCodec::new(294);
        let mut buf = BytesMut::from("who\r\nlogin alice pw1\npartial");
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![
                Line::Text("who".to_string()),
                Line::Text("login alice pw1".to_string())
            ]
        );
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from("12345678\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Line::Text("12345678".to_string()))
        );
    }

    #[test]
    fn test_oversized_line_reported_once_then_recovers() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from("0123456789abcdef");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::TooLong));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ghij\nwho\n");
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![Line::Text("who".to_string())]
        );
    }

    #[test]
    fn test_eof_flushes_unterminated_line() {
        let mut codec = LineCodec::new(294);
        let mut buf = BytesMut::from("logout");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Line::Text("logout".to_string()))
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new(294);
        let mut buf = BytesMut::new();
        codec.encode("login confirmed.".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"login confirmed.\n");
    }

    #[test]
    fn test_crlf_does_not_count_toward_limit() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from("12345678\r");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\n123456789\r\nwho\r\n");
        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![
                Line::Text("12345678".to_string()),
                Line::TooLong,
                Line::Text("who".to_string())
            ]
        );
    }

    #[test]
    fn test_byte_past_limit_that_is_not_cr_overflows() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from("123456789");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Line::TooLong));
    }
}
