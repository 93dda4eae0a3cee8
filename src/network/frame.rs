//! STOMP 1.2 frame encoding and parsing.
//!
//! A frame is `COMMAND EOL *(header EOL) EOL body NUL`. Any number of EOLs may
//! sit between frames; those are heart-beats.

use std::fmt;

use crate::error::FrameError;

/// What a client sends when it has nothing else to say.
pub const HEARTBEAT: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let command = match raw {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    // CONNECT and CONNECTED headers are taken literally.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header named `name`; later repeats are ignored.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Serialise to wire text. A `content-length` header is added for
    /// non-empty bodies unless one was set explicitly.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decode every frame in `input`, skipping heart-beat EOLs between them.
///
/// A malformed frame becomes an `Err` entry and decoding resumes after its
/// NUL terminator, so the frames around it are kept in order.
pub fn decode_frames(input: &str) -> Vec<Result<Frame, FrameError>> {
    let bytes = input.as_bytes();
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && matches!(bytes[pos], b'\n' | b'\r') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        match parse_one(&input[pos..]) {
            Ok((frame, consumed)) => {
                frames.push(Ok(frame));
                pos += consumed;
            }
            Err(err) => {
                frames.push(Err(err));
                match bytes[pos..].iter().position(|byte| *byte == 0) {
                    Some(nul) => pos += nul + 1,
                    None => break,
                }
            }
        }
    }

    frames
}

/// Strict variant of [`decode_frames`]: the first malformed frame fails the
/// whole input.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, FrameError> {
    decode_frames(input).into_iter().collect()
}

fn parse_one(input: &str) -> Result<(Frame, usize), FrameError> {
    let mut cursor = 0;
    let command_line = read_line(input, &mut cursor).ok_or(FrameError::UnterminatedHeaders)?;
    let command = Command::parse(command_line)?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(input, &mut cursor).ok_or(FrameError::UnterminatedHeaders)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut frame = Frame {
        command,
        headers,
        body: String::new(),
    };

    let rest = &input.as_bytes()[cursor..];
    let body_len = match frame.header("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
            if rest.len() <= len || rest[len] != 0 {
                return Err(FrameError::MissingNul);
            }
            len
        }
        None => rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(FrameError::MissingNul)?,
    };

    frame.body = String::from_utf8_lossy(&rest[..body_len]).into_owned();
    Ok((frame, cursor + body_len + 1))
}

fn read_line<'a>(input: &'a str, cursor: &mut usize) -> Option<&'a str> {
    let start = *cursor;
    let end = start + input[start..].find('\n')?;
    *cursor = end + 1;
    let line = &input[start..end];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frame_encodes_with_content_length() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/app/chat.sendMessage")
            .with_header("content-type", "application/json")
            .with_body("{\"a\":1}");

        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.sendMessage\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = Frame::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1")
            .with_header("host", "localhost:8080");
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2,1.1\nhost:localhost:8080\n\n\0"
        );
    }

    #[test]
    fn parses_frames_separated_by_heartbeats() {
        let wire = "\n\nCONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0\n\
                    MESSAGE\ndestination:/topic/public\nsubscription:sub-0\n\nhello\0\n";

        let frames = parse_frames(wire).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Connected);
        assert_eq!(frames[0].header("version"), Some("1.2"));
        assert_eq!(frames[1].command, Command::Message);
        assert_eq!(frames[1].header("subscription"), Some("sub-0"));
        assert_eq!(frames[1].body, "hello");
    }

    #[test]
    fn heartbeat_only_input_yields_no_frames() {
        assert!(parse_frames(HEARTBEAT).unwrap().is_empty());
        assert!(parse_frames("\r\n\n").unwrap().is_empty());
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let wire = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = parse_frames(wire).unwrap();
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn escaped_headers_survive_the_wire() {
        let frame = Frame::new(Command::Message).with_header("note", "a:b\\c\nd");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\\\c\\nd\n"));

        let parsed = parse_frames(&encoded).unwrap();
        assert_eq!(parsed[0].header("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frames = parse_frames("MESSAGE\nfoo:first\nfoo:second\n\n\0").unwrap();
        assert_eq!(frames[0].header("foo"), Some("first"));
        assert_eq!(frames[0].headers().len(), 2);
    }

    #[test]
    fn broken_frame_does_not_take_its_neighbours_down() {
        let wire = "MESSAGE\nsubscription:s\n\n{\"a\":1}\0\nBOGUS\n\n\0\nRECEIPT\nreceipt-id:r-1\n\n\0";

        let decoded = decode_frames(wire);
        assert_eq!(decoded.len(), 3);
        let first = decoded[0].as_ref().unwrap();
        assert_eq!(first.command, Command::Message);
        assert_eq!(first.body, "{\"a\":1}");
        assert_eq!(
            decoded[1],
            Err(FrameError::UnknownCommand("BOGUS".to_string()))
        );
        assert_eq!(
            decoded[2].as_ref().unwrap().header("receipt-id"),
            Some("r-1")
        );
    }

    #[test]
    fn unterminated_tail_is_one_error() {
        let decoded = decode_frames("MESSAGE\n\nok\0MESSAGE\n\nno terminator");
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_ok());
        assert_eq!(decoded[1], Err(FrameError::MissingNul));
    }

    #[test]
    fn rejects_broken_frames() {
        assert_eq!(
            parse_frames("BOGUS\n\n\0"),
            Err(FrameError::UnknownCommand("BOGUS".to_string()))
        );
        assert_eq!(parse_frames("MESSAGE\n\nbody"), Err(FrameError::MissingNul));
        assert_eq!(
            parse_frames("MESSAGE\nfoo"),
            Err(FrameError::UnterminatedHeaders)
        );
        assert_eq!(
            parse_frames("MESSAGE\nbad header\n\n\0"),
            Err(FrameError::MalformedHeader("bad header".to_string()))
        );
        assert_eq!(
            parse_frames("MESSAGE\ncontent-length:x\n\n\0"),
            Err(FrameError::InvalidContentLength("x".to_string()))
        );
        assert_eq!(
            parse_frames("MESSAGE\nfoo:\\t\n\n\0"),
            Err(FrameError::InvalidEscape("\\t".to_string()))
        );
    }
}
