//! Turns framed lines into a populated [`Task`], one `feed_line` call at a time.
//!
//! The original dispatches on the first character of the command/header name as a
//! micro-optimization; we use a direct case-insensitive table lookup instead, per the redesign
//! note in `DESIGN.md` — the observable behavior is identical.

use std::net::Ipv4Addr;
use std::str::FromStr;

use log::debug;
use nom::branch::alt;
use nom::bytes::complete::tag_no_case;
use nom::character::complete::char;
use nom::combinator::{opt, rest, value};
use nom::sequence::preceded;
use nom::IResult;
use spamc_types::{
    Command, Dialect, ErrorCode, ErrorKind, ProtocolVersion, Task, TaskError, TaskState,
};

use crate::registry::CommandRegistry;

/// Drives a [`Task`]'s state machine one line at a time.
#[derive(Debug)]
pub struct RequestParser<'r> {
    registry: &'r CommandRegistry,
}

impl<'r> RequestParser<'r> {
    pub fn new(registry: &'r CommandRegistry) -> Self {
        Self { registry }
    }

    /// Feeds one already-unframed line (no trailing CR/LF) to the task.
    ///
    /// Returns `Err(InvalidState)` if called outside `ReadCommand`/`ReadHeader` — the caller
    /// should instead call this only while [`TaskState::accepts_request_lines`] holds.
    pub fn feed_line(&self, task: &mut Task, line: &[u8]) -> Result<(), TaskError> {
        match task.state {
            TaskState::ReadCommand => self.read_command(task, line),
            TaskState::ReadHeader => self.read_header(task, line),
            _ => {
                let err = TaskError::new(
                    ErrorKind::InvalidState,
                    ErrorCode::PROTOCOL_ERROR,
                    "feed_line called outside ReadCommand/ReadHeader",
                );
                task.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Called once the empty line terminating the header block has been observed.
    ///
    /// Transitions to `ReadMessage` (body-bearing command with a usable `Content-Length`),
    /// `WriteReply` (`Ping`/`Skip`), or `WriteError` (missing/zero `Content-Length`).
    pub fn feed_blank_line(&self, task: &mut Task) {
        match task.command {
            Some(Command::Ping) | Some(Command::Skip) => {
                task.state = TaskState::WriteReply;
            }
            _ => match task.content_length {
                Some(len) if len > 0 => {
                    task.state = TaskState::ReadMessage;
                }
                _ => {
                    task.fail(TaskError::length_error());
                }
            },
        }
    }

    /// Attaches the body once the framer has collected exactly `content_length` bytes.
    pub fn feed_body(&self, task: &mut Task, bytes: Vec<u8>) -> Result<(), TaskError> {
        if task.state != TaskState::ReadMessage {
            let err = TaskError::new(
                ErrorKind::InvalidState,
                ErrorCode::PROTOCOL_ERROR,
                "feed_body called outside ReadMessage",
            );
            task.fail(err.clone());
            return Err(err);
        }
        task.body = Some(bytes);
        task.state = TaskState::WriteReply;
        Ok(())
    }

    fn read_command(&self, task: &mut Task, line: &[u8]) -> Result<(), TaskError> {
        let line = std::str::from_utf8(line).map_err(|_| {
            let err = TaskError::protocol_error("command line is not valid UTF-8");
            task.fail(err.clone());
            err
        })?;

        let (token, rest) = split_once_ascii(line, ' ');
        let rest = rest.trim_start();

        let command = self.registry.lookup(token).ok_or_else(|| {
            let err = TaskError::protocol_error(format!("bad command: {token}"));
            task.fail(err.clone());
            err
        })?;
        task.command = Some(command);
        task.custom_command = match command {
            Command::Custom(id) => Some(id),
            _ => None,
        };

        let (dialect, version, version_token) = parse_dialect(rest).map_err(|message| {
            let err = TaskError::protocol_error(message);
            task.fail(err.clone());
            err
        })?;
        task.dialect = Some(dialect);
        task.version = version;
        task.version_token = version_token;

        task.state = TaskState::ReadHeader;
        debug!(
            "parsed command line: command={:?} dialect={:?} version={:?}",
            task.command, task.dialect, task.version_token
        );
        Ok(())
    }

    fn read_header(&self, task: &mut Task, line: &[u8]) -> Result<(), TaskError> {
        let line = std::str::from_utf8(line).map_err(|_| {
            let err = TaskError::protocol_error("header line is not valid UTF-8");
            task.fail(err.clone());
            err
        })?;

        let (name, value) = split_once_ascii(line, ':');
        let name = name.trim();
        let value = value.trim();

        if let Err(message) = apply_header(task, name, value) {
            let err = TaskError::protocol_error(message);
            task.fail(err.clone());
            return Err(err);
        }
        Ok(())
    }
}

fn split_once_ascii(s: &str, sep: char) -> (&str, &str) {
    match s.find(sep) {
        Some(idx) => (&s[..idx], &s[idx + sep.len_utf8()..]),
        None => (s, ""),
    }
}

/// `dialect = "RSPAMC" / "SPAMC"`, case-insensitive.
fn dialect_tag(input: &str) -> IResult<&str, Dialect> {
    alt((
        value(Dialect::Rspamc, tag_no_case("RSPAMC")),
        value(Dialect::Spamc, tag_no_case("SPAMC")),
    ))(input)
}

/// `version-suffix = "/" 1*VCHAR`, the raw text following the slash.
fn version_suffix(input: &str) -> IResult<&str, &str> {
    preceded(char('/'), rest)(input)
}

/// Parses the dialect token and optional version suffix that follows the command on the
/// preamble line, e.g. `RSPAMC/1.1` or `SPAMC`.
fn parse_dialect(input: &str) -> Result<(Dialect, Option<ProtocolVersion>, Option<String>), String> {
    let (remainder, dialect) =
        dialect_tag(input).map_err(|_| format!("unrecognized dialect: {input}"))?;
    let version_text = opt(version_suffix)(remainder)
        .map(|(_, text)| text)
        .unwrap_or(None);

    match dialect {
        Dialect::Rspamc => {
            let (version, token) = match version_text {
                Some(text) => (Some(recognize_version(text)), Some(text.to_owned())),
                None => (Some(ProtocolVersion::V1_0), None),
            };
            Ok((Dialect::Rspamc, version, token))
        }
        Dialect::Spamc => Ok((Dialect::Spamc, None, version_text.map(str::to_owned))),
    }
}

/// Only `1.1` is recognized; anything else (including unparseable text) defaults to `1.0`,
/// matching the original's prefix-match-only version detection.
fn recognize_version(text: &str) -> ProtocolVersion {
    if text.starts_with("1.1") {
        ProtocolVersion::V1_1
    } else {
        ProtocolVersion::V1_0
    }
}

fn apply_header(task: &mut Task, name: &str, value: &str) -> Result<(), String> {
    if name.eq_ignore_ascii_case("Content-Length") {
        if task.content_length.is_none() {
            let len: u64 = value
                .parse()
                .map_err(|_| format!("bad Content-Length: {value}"))?;
            task.content_length = Some(len);
        }
    } else if name.eq_ignore_ascii_case("Deliver-To") {
        task.deliver_to = Some(value.to_owned());
    } else if name.eq_ignore_ascii_case("Helo") {
        task.helo = Some(value.to_owned());
    } else if name.eq_ignore_ascii_case("From") {
        task.from = Some(value.to_owned());
    } else if name.eq_ignore_ascii_case("Queue-ID") {
        task.queue_id = Some(value.to_owned());
    } else if name.eq_ignore_ascii_case("Rcpt") {
        task.rcpt.push(value.to_owned());
    } else if name.eq_ignore_ascii_case("Recipient-Number") {
        task.nrcpt = Some(
            value
                .parse()
                .map_err(|_| format!("bad Recipient-Number: {value}"))?,
        );
    } else if name.eq_ignore_ascii_case("IP") {
        task.from_ip = Some(
            Ipv4Addr::from_str(value).map_err(|_| format!("bad IP: {value}"))?,
        );
    } else if name.eq_ignore_ascii_case("Pass") {
        if value.eq_ignore_ascii_case("all") {
            task.pass_all_filters = true;
        }
        // any other value is silently ignored, per the documented asymmetry
    } else if name.eq_ignore_ascii_case("Subject") {
        task.subject = Some(value.to_owned());
    } else if name.eq_ignore_ascii_case("User") {
        task.user = Some(value.to_owned());
    } else {
        return Err(format!("unrecognized header: {name}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(registry: &CommandRegistry) -> RequestParser<'_> {
        RequestParser::new(registry)
    }

    #[test]
    fn parses_check_rspamc_with_version() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        assert_eq!(task.command, Some(Command::Check));
        assert_eq!(task.dialect, Some(Dialect::Rspamc));
        assert_eq!(task.version, Some(ProtocolVersion::V1_1));
        assert_eq!(task.version_token.as_deref(), Some("1.1"));
        assert_eq!(task.state, TaskState::ReadHeader);
    }

    #[test]
    fn spamc_echoes_raw_version_without_parsing_it() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK SPAMC/1.2").unwrap();
        assert_eq!(task.dialect, Some(Dialect::Spamc));
        assert_eq!(task.version, None);
        assert_eq!(task.version_token.as_deref(), Some("1.2"));
    }

    #[test]
    fn rspamc_without_slash_defaults_to_1_0() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"PING RSPAMC").unwrap();
        assert_eq!(task.version, Some(ProtocolVersion::V1_0));
        assert_eq!(task.version_token, None);
    }

    #[test]
    fn unknown_command_is_protocol_error() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        let err = p.feed_line(&mut task, b"BOGUS RSPAMC/1.1").unwrap_err();
        assert_eq!(err.kind, spamc_types::ErrorKind::Protocol);
        assert_eq!(task.state, TaskState::WriteError);
    }

    #[test]
    fn content_length_ignored_on_repeat() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        p.feed_line(&mut task, b"Content-Length: 4").unwrap();
        p.feed_line(&mut task, b"Content-Length: 999").unwrap();
        assert_eq!(task.content_length, Some(4));
    }

    #[test]
    fn ip_overwritten_on_repeat() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        p.feed_line(&mut task, b"IP: 1.2.3.4").unwrap();
        p.feed_line(&mut task, b"IP: 5.6.7.8").unwrap();
        assert_eq!(task.from_ip, Some(Ipv4Addr::new(5, 6, 7, 8)));
    }

    #[test]
    fn pass_ignores_unknown_values_without_erroring() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        p.feed_line(&mut task, b"Pass: some-other-value").unwrap();
        assert!(!task.pass_all_filters);
        assert_eq!(task.state, TaskState::ReadHeader);
    }

    #[test]
    fn pass_all_sets_flag() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        p.feed_line(&mut task, b"Pass: ALL").unwrap();
        assert!(task.pass_all_filters);
    }

    #[test]
    fn unrecognized_header_is_protocol_error() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        let err = p.feed_line(&mut task, b"X-Foo: bar").unwrap_err();
        assert_eq!(err.kind, spamc_types::ErrorKind::Protocol);
        assert_eq!(task.state, TaskState::WriteError);
    }

    #[test]
    fn blank_line_without_content_length_is_length_error() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.0").unwrap();
        p.feed_blank_line(&mut task);
        assert_eq!(task.state, TaskState::WriteError);
        assert_eq!(task.error.as_ref().unwrap().message, "Unknown content length");
    }

    #[test]
    fn blank_line_for_ping_goes_straight_to_write_reply() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"PING RSPAMC/1.1").unwrap();
        p.feed_blank_line(&mut task);
        assert_eq!(task.state, TaskState::WriteReply);
    }

    #[test]
    fn rcpt_header_appends() {
        let registry = CommandRegistry::new();
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"CHECK RSPAMC/1.1").unwrap();
        p.feed_line(&mut task, b"Rcpt: a@example.com").unwrap();
        p.feed_line(&mut task, b"Rcpt: b@example.com").unwrap();
        assert_eq!(task.rcpt, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn custom_command_falls_back_to_registry() {
        let mut registry = CommandRegistry::new();
        let id = registry.register_command("learn", |_task, _stats| crate::writer::Reply {
            bytes: Vec::new(),
            log_line: String::new(),
            x_spam_status: None,
        });
        let p = parser(&registry);
        let mut task = Task::new();
        p.feed_line(&mut task, b"LEARN RSPAMC/1.1").unwrap();
        assert_eq!(task.command, Some(Command::Custom(id)));
        assert_eq!(task.custom_command, Some(id));
    }
}
