//! Incremental STOMP frame decoder.

use bytes::{Buf, Bytes, BytesMut};

use super::{
    constants::{CR, HEADER_CONTENT_LENGTH, LF, NULL},
    frame::{Command, Frame, unescape},
};
use crate::error::{ChannelError, ChannelResult};

/// One unit decoded from the byte stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame.
    Frame(Frame),
    /// A bare EOL sent as a heartbeat.
    Heartbeat,
}

/// Buffers transport data and yields complete frames.
///
/// A WebSocket message usually holds exactly one frame, but nothing in the
/// protocol guarantees it, so partial and batched input are both handled.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder that rejects frames larger than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append transport data.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next unit, or `Ok(None)` if more data is needed.
    pub fn decode(&mut self) -> ChannelResult<Option<Decoded>> {
        // Trailing NUL padding some brokers emit between frames.
        let padding = self
            .buf
            .iter()
            .position(|&b| b != NULL)
            .unwrap_or(self.buf.len());
        self.buf.advance(padding);

        match self.buf.first() {
            None => return Ok(None),
            Some(&LF) => {
                self.buf.advance(1);
                return Ok(Some(Decoded::Heartbeat));
            }
            Some(&CR) => {
                return match self.buf.get(1) {
                    None => Ok(None),
                    Some(&LF) => {
                        self.buf.advance(2);
                        Ok(Some(Decoded::Heartbeat))
                    }
                    Some(_) => Err(ChannelError::frame("stray carriage return")),
                };
            }
            Some(_) => {}
        }

        let Some(head) = split_head(&self.buf) else {
            return self.need_more();
        };

        let command_line = std::str::from_utf8(head.command)?;
        let command = Command::parse(command_line)
            .ok_or_else(|| ChannelError::frame(format!("unknown command: {command_line}")))?;

        let mut headers = Vec::with_capacity(head.header_lines.len());
        for line in &head.header_lines {
            let line = std::str::from_utf8(line)?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChannelError::frame(format!("malformed header line: {line}")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let body_start = head.body_start;
        let content_length = headers
            .iter()
            .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ChannelError::frame(format!("invalid content-length: {v}")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if len > self.max_frame_size {
                    return Err(self.too_large(len));
                }
                if self.buf.len() < body_start + len + 1 {
                    return self.need_more();
                }
                if self.buf[body_start + len] != NULL {
                    return Err(ChannelError::frame("body not terminated by NUL"));
                }
                body_start + len
            }
            None => match memchr::memchr(NULL, &self.buf[body_start..]) {
                Some(offset) => body_start + offset,
                None => return self.need_more(),
            },
        };

        let mut raw = self.buf.split_to(body_end + 1);
        raw.truncate(body_end);
        let body: Bytes = raw.split_off(body_start).freeze();

        Ok(Some(Decoded::Frame(Frame {
            command,
            headers,
            body,
        })))
    }

    fn need_more(&self) -> ChannelResult<Option<Decoded>> {
        if self.buf.len() > self.max_frame_size {
            return Err(self.too_large(self.buf.len()));
        }
        Ok(None)
    }

    fn too_large(&self, size: usize) -> ChannelError {
        ChannelError::frame(format!(
            "frame of {size} bytes exceeds limit of {} bytes",
            self.max_frame_size
        ))
    }
}

/// Command line, header lines and body offset of a buffered frame.
struct FrameHead<'a> {
    command: &'a [u8],
    header_lines: Vec<&'a [u8]>,
    body_start: usize,
}

/// Splits the head of the frame at the start of `buf`. Returns `None` until
/// the blank line ending the headers has arrived.
fn split_head(buf: &[u8]) -> Option<FrameHead<'_>> {
    let (command_end, mut pos) = find_eol(buf)?;
    let command = &buf[..command_end];
    let mut header_lines = Vec::new();

    loop {
        let (line_end, next) = find_eol(&buf[pos..])?;
        if line_end == 0 {
            return Some(FrameHead {
                command,
                header_lines,
                body_start: pos + next,
            });
        }
        header_lines.push(&buf[pos..pos + line_end]);
        pos += next;
    }
}

/// Finds the next end-of-line in `bytes`.
///
/// Returns `(line_end, remainder_start)`, where `line_end` excludes an
/// optional CR before the LF.
fn find_eol(bytes: &[u8]) -> Option<(usize, usize)> {
    let lf = memchr::memchr(LF, bytes)?;
    let line_end = if lf > 0 && bytes[lf - 1] == CR {
        lf - 1
    } else {
        lf
    };
    Some((line_end, lf + 1))
}
