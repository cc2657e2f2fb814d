//! RFC 5424 syslog message parsing
//!
//! ```text
//! SYSLOG-MSG = HEADER SP STRUCTURED-DATA [SP MSG]
//! HEADER     = PRI VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID
//! PRI        = "<" 1*3DIGIT ">"
//! ```
//!
//! Header fields may be the nil value `-`. Only the host name and the message
//! body matter for routing; the remaining fields are kept for logging.
//!
//! Reference: RFC 5424 Section 6

use crate::hub::{IngestedMessage, RoutingKey};

/// Highest valid PRI value (facility 23, severity 7)
const MAX_PRIORITY: u16 = 191;

/// Byte order mark allowed at the start of MSG
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Error type for syslog parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Datagram was empty
    Empty,
    /// PRI missing, not numeric, or out of range
    InvalidPriority,
    /// VERSION is not 1
    UnsupportedVersion,
    /// A header field is missing
    MissingField(&'static str),
    /// STRUCTURED-DATA is not `-` or a well-formed element list
    InvalidStructuredData,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "Empty syslog message"),
            ParseError::InvalidPriority => write!(f, "Invalid syslog priority"),
            ParseError::UnsupportedVersion => write!(f, "Unsupported syslog version"),
            ParseError::MissingField(field) => write!(f, "Missing syslog field: {}", field),
            ParseError::InvalidStructuredData => write!(f, "Invalid structured data"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A parsed RFC 5424 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogMessage {
    /// Raw PRI value (facility * 8 + severity)
    pub priority: u8,
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    /// STRUCTURED-DATA as it appeared on the wire, if not nil
    pub structured_data: Option<String>,
    /// MSG with BOM and trailing line terminator removed
    pub message: String,
}

impl SyslogMessage {
    /// Facility code
    pub fn facility(&self) -> u8 {
        self.priority >> 3
    }

    /// Severity code
    pub fn severity(&self) -> u8 {
        self.priority & 0x07
    }

    /// Turn into a hub record keyed by host name
    ///
    /// Returns `None` when the message carries no host name.
    pub fn into_ingested(self) -> Option<IngestedMessage> {
        let hostname = self.hostname?;
        Some(IngestedMessage::new(RoutingKey::from(hostname), self.message))
    }
}

/// Parse one RFC 5424 message
pub fn parse(input: &[u8]) -> Result<SyslogMessage, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut cursor = Cursor { input, pos: 0 };

    let priority = cursor.priority()?;
    let version = cursor.field("version")?;
    if version != b"1" {
        return Err(ParseError::UnsupportedVersion);
    }

    let timestamp = nil_or_string(cursor.field("timestamp")?);
    let hostname = nil_or_string(cursor.field("hostname")?);
    let app_name = nil_or_string(cursor.field("app-name")?);
    let proc_id = nil_or_string(cursor.field("procid")?);
    let msg_id = nil_or_string(cursor.field("msgid")?);
    let structured_data = nil_or_string(cursor.structured_data()?);
    let message = decode_message(cursor.rest());

    Ok(SyslogMessage {
        priority,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id,
        structured_data,
        message,
    })
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn priority(&mut self) -> Result<u8, ParseError> {
        if self.input.first() != Some(&b'<') {
            return Err(ParseError::InvalidPriority);
        }

        let digits_start = 1;
        let close = self.input[digits_start..]
            .iter()
            .position(|&b| b == b'>')
            .map(|i| i + digits_start)
            .ok_or(ParseError::InvalidPriority)?;

        let digits = &self.input[digits_start..close];
        if digits.is_empty() || digits.len() > 3 || !digits.iter().all(u8::is_ascii_digit) {
            return Err(ParseError::InvalidPriority);
        }

        let value = digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
        if value > MAX_PRIORITY {
            return Err(ParseError::InvalidPriority);
        }

        // VERSION follows PRI directly, without a separator
        self.pos = close + 1;
        Ok(value as u8)
    }

    /// Read up to the next space and step over it
    fn field(&mut self, name: &'static str) -> Result<&'a [u8], ParseError> {
        let input = self.input;
        let remaining = &input[self.pos..];
        let end = remaining
            .iter()
            .position(|&b| b == b' ')
            .ok_or(ParseError::MissingField(name))?;
        if end == 0 {
            return Err(ParseError::MissingField(name));
        }

        self.pos += end + 1;
        Ok(&remaining[..end])
    }

    /// Read STRUCTURED-DATA and the space after it, if any
    fn structured_data(&mut self) -> Result<&'a [u8], ParseError> {
        let input = self.input;
        let remaining = &input[self.pos..];
        match remaining.first() {
            None => Err(ParseError::MissingField("structured-data")),
            Some(b'-') => {
                if remaining.len() > 1 && remaining[1] != b' ' {
                    return Err(ParseError::InvalidStructuredData);
                }
                self.advance_past_separator(1);
                Ok(&remaining[..1])
            }
            Some(b'[') => {
                let end = sd_elements_end(remaining)?;
                self.advance_past_separator(end);
                Ok(&remaining[..end])
            }
            Some(_) => Err(ParseError::InvalidStructuredData),
        }
    }

    fn advance_past_separator(&mut self, len: usize) {
        self.pos += len;
        if self.input.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn rest(&self) -> &'a [u8] {
        let input = self.input;
        &input[self.pos..]
    }
}

/// Length of a run of `[...]` elements, honouring quoted, escaped values
fn sd_elements_end(input: &[u8]) -> Result<usize, ParseError> {
    let mut pos = 0;

    while input.get(pos) == Some(&b'[') {
        let mut in_quotes = false;
        let mut escaped = false;
        pos += 1;

        loop {
            let &b = input.get(pos).ok_or(ParseError::InvalidStructuredData)?;
            pos += 1;

            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' if in_quotes => escaped = true,
                b'"' => in_quotes = !in_quotes,
                b']' if !in_quotes => break,
                _ => {}
            }
        }
    }

    match input.get(pos) {
        None | Some(b' ') => Ok(pos),
        Some(_) => Err(ParseError::InvalidStructuredData),
    }
}

fn nil_or_string(field: &[u8]) -> Option<String> {
    if field == b"-" {
        None
    } else {
        Some(String::from_utf8_lossy(field).into_owned())
    }
}

fn decode_message(raw: &[u8]) -> String {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    let raw = raw
        .strip_suffix(b"\r\n")
        .or_else(|| raw.strip_suffix(b"\n"))
        .unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_message() {
        let input = b"<34>1 2003-10-11T22:14:15.003Z mymachine.example.com su - ID47 - 'su root' failed for lonvick on /dev/pts/8";
        let msg = parse(input).unwrap();

        assert_eq!(msg.priority, 34);
        assert_eq!(msg.facility(), 4);
        assert_eq!(msg.severity(), 2);
        assert_eq!(msg.timestamp.as_deref(), Some("2003-10-11T22:14:15.003Z"));
        assert_eq!(msg.hostname.as_deref(), Some("mymachine.example.com"));
        assert_eq!(msg.app_name.as_deref(), Some("su"));
        assert_eq!(msg.proc_id, None);
        assert_eq!(msg.msg_id.as_deref(), Some("ID47"));
        assert_eq!(msg.structured_data, None);
        assert_eq!(
            msg.message,
            "'su root' failed for lonvick on /dev/pts/8"
        );
    }

    #[test]
    fn test_parse_structured_data() {
        let input = br#"<165>1 2003-10-11T22:14:15.003Z task-foo evntslog - ID47 [exampleSDID@32473 iut="3" eventSource="Application" eventID="1011"][examplePriority@32473 class="high"] An application event"#;
        let msg = parse(input).unwrap();

        assert_eq!(msg.hostname.as_deref(), Some("task-foo"));
        assert_eq!(
            msg.structured_data.as_deref(),
            Some(r#"[exampleSDID@32473 iut="3" eventSource="Application" eventID="1011"][examplePriority@32473 class="high"]"#)
        );
        assert_eq!(msg.message, "An application event");
    }

    #[test]
    fn test_parse_escaped_bracket_in_sd_value() {
        let input = br#"<14>1 - host app 1 - [x@1 v="a\]b \"q\""] body"#;
        let msg = parse(input).unwrap();

        assert_eq!(msg.structured_data.as_deref(), Some(r#"[x@1 v="a\]b \"q\""]"#));
        assert_eq!(msg.message, "body");
    }

    #[test]
    fn test_parse_without_message() {
        let msg = parse(b"<14>1 - host app - - -").unwrap();
        assert_eq!(msg.hostname.as_deref(), Some("host"));
        assert_eq!(msg.message, "");

        let msg = parse(b"<14>1 - host app - - [a@1 b=\"c\"]").unwrap();
        assert_eq!(msg.message, "");
    }

    #[test]
    fn test_parse_strips_bom_and_newline() {
        let mut input = b"<14>1 - host app - - - ".to_vec();
        input.extend_from_slice(UTF8_BOM);
        input.extend_from_slice("héllo\n".as_bytes());

        let msg = parse(&input).unwrap();
        assert_eq!(msg.message, "héllo");
    }

    #[test]
    fn test_parse_invalid_utf8_is_replaced() {
        let msg = parse(b"<14>1 - host app - - - bad \xff byte").unwrap();
        assert_eq!(msg.message, "bad \u{FFFD} byte");
    }

    #[test]
    fn test_parse_nil_hostname() {
        let msg = parse(b"<14>1 - - app - - - hello").unwrap();
        assert_eq!(msg.hostname, None);
        assert!(msg.into_ingested().is_none());
    }

    #[test]
    fn test_into_ingested() {
        let msg = parse(b"<14>1 - web-1 app - - - hello world").unwrap();
        let ingested = msg.into_ingested().unwrap();

        assert_eq!(ingested.key.as_str(), "web-1");
        assert_eq!(&*ingested.text, "hello world");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(b""), Err(ParseError::Empty));
        assert_eq!(parse(b"hello"), Err(ParseError::InvalidPriority));
        assert_eq!(parse(b"<>1 - h a - - -"), Err(ParseError::InvalidPriority));
        assert_eq!(parse(b"<192>1 - h a - - -"), Err(ParseError::InvalidPriority));
        assert_eq!(parse(b"<1x>1 - h a - - -"), Err(ParseError::InvalidPriority));
        assert_eq!(
            parse(b"<34>Oct 11 22:14:15 mymachine su: legacy"),
            Err(ParseError::UnsupportedVersion)
        );
        assert_eq!(
            parse(b"<14>1 - host"),
            Err(ParseError::MissingField("hostname"))
        );
        assert_eq!(
            parse(b"<14>1 - host app - -"),
            Err(ParseError::MissingField("msgid"))
        );
        assert_eq!(
            parse(b"<14>1 - host app - - x"),
            Err(ParseError::InvalidStructuredData)
        );
        assert_eq!(
            parse(b"<14>1 - host app - - [unterminated"),
            Err(ParseError::InvalidStructuredData)
        );
        assert_eq!(
            parse(b"<14>1 - host app - - -body"),
            Err(ParseError::InvalidStructuredData)
        );
    }
}
