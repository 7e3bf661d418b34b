//! The worker's line protocol.
//!
//! One command per line. The first line of a connection must be the startup
//! greeting `HELLO <protocol-major>`; everything after it is a command.
//!
//! Replies are text lines, but while the watchdog is enabled the server may
//! write a status frame at any point between or ahead of them:
//!
//! - `S` followed by a big-endian `u32` length (counting itself) and two
//!   NUL-terminated strings, for peers that greeted with major 3 or later;
//! - `N` followed by one NUL-terminated string, for older peers.
//!
//! No reply line starts with `S` or `N`, so a client tells the two apart by
//! the first byte and skips the frames.

use peerguard_watchdog::CommandKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Long-running unit of work.
    Sleep { secs: u64 },
    Ping,
    SetEnabled(bool),
    SetInterval(u32),
    Show,
    Quit,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or("empty command")?.to_ascii_uppercase();
        let request = match verb.as_str() {
            "SLEEP" => Self::Sleep {
                secs: parse_arg(words.next(), "SLEEP <seconds>")?,
            },
            "PING" => Self::Ping,
            "SHOW" => Self::Show,
            "QUIT" => Self::Quit,
            "SET" => match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("enable") => Self::SetEnabled(parse_switch(words.next())?),
                Some("interval") => {
                    Self::SetInterval(parse_arg(words.next(), "SET interval <seconds>")?)
                }
                _ => return Err("usage: SET enable on|off | SET interval <seconds>".into()),
            },
            other => return Err(format!("unknown command {other}")),
        };

        if words.next().is_some() {
            return Err("too many arguments".into());
        }
        Ok(request)
    }

    /// Administrative commands finish immediately and are not watched.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Sleep { .. } => CommandKind::Statement,
            _ => CommandKind::Utility,
        }
    }
}

/// Parse the startup greeting and return the peer's protocol major version.
pub fn parse_hello(line: &str) -> Result<u16, String> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some(verb) if verb.eq_ignore_ascii_case("HELLO") => {}
        _ => return Err("expected HELLO <protocol-major>".into()),
    }
    let major = parse_arg(words.next(), "HELLO <protocol-major>")?;
    if words.next().is_some() {
        return Err("too many arguments".into());
    }
    Ok(major)
}

/// Read the next reply line, skipping status frames in front of it.
///
/// Returns `None` once the server has closed the connection.
#[cfg(test)]
pub fn read_reply<R: std::io::BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    use peerguard_probe::encoder::{NOTICE_TAG, PARAMETER_STATUS_TAG};
    use std::io::{self, Read};

    loop {
        let Some(&tag) = reader.fill_buf()?.first() else {
            return Ok(None);
        };
        match tag {
            PARAMETER_STATUS_TAG => {
                let mut header = [0u8; 5];
                reader.read_exact(&mut header)?;
                let [_, a, b, c, d] = header;
                let body = u64::from(u32::from_be_bytes([a, b, c, d])).saturating_sub(4);
                io::copy(&mut reader.by_ref().take(body), &mut io::sink())?;
            }
            NOTICE_TAG => {
                let mut notice = Vec::new();
                reader.read_until(0, &mut notice)?;
            }
            _ => {
                let mut line = String::new();
                reader.read_line(&mut line)?;
                return Ok(Some(line.trim_end().to_string()));
            }
        }
    }
}

fn parse_arg<T: std::str::FromStr>(word: Option<&str>, usage: &str) -> Result<T, String> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| format!("usage: {usage}"))
}

fn parse_switch(word: Option<&str>) -> Result<bool, String> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "true" | "1") => Ok(true),
        Some("off" | "false" | "0") => Ok(false),
        _ => Err("usage: SET enable on|off".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Request::parse("SLEEP 5"), Ok(Request::Sleep { secs: 5 }));
        assert_eq!(Request::parse("ping"), Ok(Request::Ping));
        assert_eq!(Request::parse("SET enable on"), Ok(Request::SetEnabled(true)));
        assert_eq!(Request::parse("set ENABLE off"), Ok(Request::SetEnabled(false)));
        assert_eq!(Request::parse("SET interval 0"), Ok(Request::SetInterval(0)));
        assert_eq!(Request::parse("SHOW"), Ok(Request::Show));
        assert_eq!(Request::parse("QUIT"), Ok(Request::Quit));
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(Request::parse("").is_err());
        assert!(Request::parse("SLEEP").is_err());
        assert!(Request::parse("SLEEP -1").is_err());
        assert!(Request::parse("SET interval 99999999999").is_err());
        assert!(Request::parse("SET colour blue").is_err());
        assert!(Request::parse("PING now").is_err());
        assert!(Request::parse("DROP TABLE").is_err());
    }

    #[test]
    fn only_sleep_is_a_statement() {
        assert_eq!(Request::Sleep { secs: 1 }.kind(), CommandKind::Statement);
        assert_eq!(Request::Ping.kind(), CommandKind::Utility);
        assert_eq!(Request::SetEnabled(true).kind(), CommandKind::Utility);
    }

    #[test]
    fn reply_reader_skips_status_frames() -> Result<(), Box<dyn std::error::Error>> {
        use peerguard_probe::{FramingVariant, ProbeEncoder};
        use std::io::Cursor;

        let encoder = ProbeEncoder::new();
        let modern = encoder.encode(FramingVariant::Modern)?;
        let legacy = encoder.encode(FramingVariant::Legacy)?;

        let mut wire = Vec::new();
        wire.extend_from_slice(b"OK modern\n");
        wire.extend_from_slice(modern.as_bytes());
        wire.extend_from_slice(modern.as_bytes());
        wire.extend_from_slice(b"DONE 2000\n");
        wire.extend_from_slice(legacy.as_bytes());
        wire.extend_from_slice(b"PONG\n");

        let mut reader = Cursor::new(wire);
        assert_eq!(read_reply(&mut reader)?.as_deref(), Some("OK modern"));
        assert_eq!(read_reply(&mut reader)?.as_deref(), Some("DONE 2000"));
        assert_eq!(read_reply(&mut reader)?.as_deref(), Some("PONG"));
        assert_eq!(read_reply(&mut reader)?, None);
        Ok(())
    }

    #[test]
    fn parses_hello() {
        assert_eq!(parse_hello("HELLO 3"), Ok(3));
        assert_eq!(parse_hello("hello 2"), Ok(2));
        assert!(parse_hello("PING").is_err());
        assert!(parse_hello("HELLO").is_err());
        assert!(parse_hello("HELLO three").is_err());
    }
}
