//! STOMP frame representation and encoding.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{
    ACCEPT_VERSION, HEADER_ACCEPT_VERSION, HEADER_CONTENT_LENGTH, HEADER_DESTINATION,
    HEADER_HEART_BEAT, HEADER_HOST, HEADER_ID, HEADER_MESSAGE, HEADER_RECEIPT,
    HEADER_SUBSCRIPTION, LF, NULL,
};
use crate::error::{ChannelError, ChannelResult};

/// STOMP frame commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    pub fn parse(s: &str) -> Option<Self> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(command)
    }

    /// `CONNECT` and `CONNECTED` frames carry raw header values.
    pub(crate) fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order; on repeated names the first occurrence
/// wins, as STOMP 1.2 requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `destination` header.
    pub fn destination(&self) -> Option<&str> {
        self.get(HEADER_DESTINATION)
    }

    /// `subscription` header of a `MESSAGE` frame.
    pub fn subscription(&self) -> Option<&str> {
        self.get(HEADER_SUBSCRIPTION)
    }

    /// Short description carried by an `ERROR` frame.
    pub fn error_message(&self) -> Option<&str> {
        self.get(HEADER_MESSAGE)
    }

    /// Body as UTF-8 text.
    pub fn body_text(&self) -> ChannelResult<&str> {
        Ok(std::str::from_utf8(&self.body)?)
    }

    /// Build a `CONNECT` frame.
    pub fn connect<'a>(
        host: &str,
        heart_beat: &str,
        extra: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut frame = Self::new(Command::Connect)
            .header(HEADER_ACCEPT_VERSION, ACCEPT_VERSION)
            .header(HEADER_HOST, host)
            .header(HEADER_HEART_BEAT, heart_beat);
        for (name, value) in extra {
            frame = frame.header(name, value);
        }
        frame
    }

    /// Build a `SUBSCRIBE` frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header(HEADER_ID, id)
            .header(HEADER_DESTINATION, destination)
    }

    /// Build an `UNSUBSCRIBE` frame.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header(HEADER_ID, id)
    }

    /// Build a `DISCONNECT` frame, optionally asking for a receipt.
    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Self::new(Command::Disconnect);
        match receipt {
            Some(receipt) => frame.header(HEADER_RECEIPT, receipt),
            None => frame,
        }
    }

    /// Serialize to wire bytes, terminated by NUL.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        buf.put_slice(self.command.as_str().as_bytes());
        buf.put_u8(LF);

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                put_escaped(&mut buf, name);
                buf.put_u8(b':');
                put_escaped(&mut buf, value);
            } else {
                buf.put_slice(name.as_bytes());
                buf.put_u8(b':');
                buf.put_slice(value.as_bytes());
            }
            buf.put_u8(LF);
        }
        if !self.body.is_empty() && self.get(HEADER_CONTENT_LENGTH).is_none() {
            buf.put_slice(format!("{HEADER_CONTENT_LENGTH}:{}", self.body.len()).as_bytes());
            buf.put_u8(LF);
        }

        buf.put_u8(LF);
        buf.put_slice(&self.body);
        buf.put_u8(NULL);
        buf
    }

    /// Serialize for a WebSocket text message.
    pub fn to_text(&self) -> ChannelResult<String> {
        String::from_utf8(self.encode().to_vec())
            .map_err(|e| ChannelError::frame(format!("frame is not valid UTF-8: {e}")))
    }
}

fn put_escaped(buf: &mut BytesMut, s: &str) {
    for b in s.bytes() {
        match b {
            b'\\' => buf.put_slice(b"\\\\"),
            b'\r' => buf.put_slice(b"\\r"),
            b'\n' => buf.put_slice(b"\\n"),
            b':' => buf.put_slice(b"\\c"),
            other => buf.put_u8(other),
        }
    }
}

/// Reverse of [`put_escaped`]. Undefined escape sequences are a fatal
/// protocol error in STOMP 1.2.
pub(crate) fn unescape(s: &str) -> ChannelResult<String> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChannelError::frame(format!(
                    "undefined header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        for command in [
            Command::Connect,
            Command::Subscribe,
            Command::Unsubscribe,
            Command::Disconnect,
            Command::Connected,
            Command::Message,
            Command::Receipt,
            Command::Error,
        ] {
            assert_eq!(Command::parse(command.as_str()), Some(command));
        }
        assert_eq!(Command::parse("HELLO"), None);
    }

    #[test]
    fn test_encode_subscribe() {
        let frame = Frame::subscribe("sub-0", "/topic/alertes/global");
        assert_eq!(
            frame.to_text().unwrap(),
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/alertes/global\n\n\0"
        );
    }

    #[test]
    fn test_encode_connect_does_not_escape() {
        let frame = Frame::connect("localhost", "10000,10000", [("Authorization", "Bearer a:b")]);
        let text = frame.to_text().unwrap();
        assert!(text.starts_with("CONNECT\naccept-version:1.2,1.1\nhost:localhost\n"));
        assert!(text.contains("heart-beat:10000,10000\n"));
        assert!(text.contains("Authorization:Bearer a:b\n"));
    }

    #[test]
    fn test_encode_escapes_and_content_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/a:b")
            .with_body("{}");
        assert_eq!(
            frame.to_text().unwrap(),
            "SEND\ndestination:/app/a\\cb\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn test_first_header_wins() {
        let frame = Frame::new(Command::Message)
            .header("destination", "/first")
            .header("destination", "/second");
        assert_eq!(frame.destination(), Some("/first"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\cb\\nc\\\\").unwrap(), "a:b\nc\\");
        assert!(unescape("bad\\t").is_err());
        assert!(unescape("dangling\\").is_err());
    }

    #[test]
    fn test_disconnect_receipt() {
        assert_eq!(Frame::disconnect(None).headers.len(), 0);
        assert_eq!(
            Frame::disconnect(Some("bye")).get("receipt"),
            Some("bye")
        );
    }
}
