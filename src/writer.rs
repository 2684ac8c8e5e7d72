//! Serializes a completed [`Task`] into reply bytes.
//!
//! Every logical line is composed into an owned buffer bounded at
//! [`MAX_LINE_LENGTH`] bytes; an oversized line is truncated and its last two bytes are forced
//! to `CRLF` so framing is never violated, mirroring the original's fixed `outbuf[OUTBUFSIZ]`
//! stack buffer.

use std::time::Duration;

use log::info;
use spamc_types::{
    Command, Dialect, ErrorCode, ErrorKind, MetricResult, ProtocolVersion, Stats, Task, TaskError,
    TaskState,
};

use crate::registry::CommandRegistry;

const CRLF: &str = "\r\n";
/// `OUTBUFSIZ` in the original: every physical line (folded continuations included) is bounded
/// by this many bytes.
pub const MAX_LINE_LENGTH: usize = 1000;
/// `OUTBUFSIZ - 3`: the point at which the Urls block folds onto a continuation line.
const URL_FOLD_THRESHOLD: usize = MAX_LINE_LENGTH - 3;

/// The serialized result of [`write_reply`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    /// Bytes ready to hand to the transport, in order.
    pub bytes: Vec<u8>,
    /// The single structured log line the writer assembled while serializing.
    pub log_line: String,
    /// Set only for `Process` replies: the default-metric line that would have been attached to
    /// the outbound message as an `X-Spam-Status` header, left for the host to apply.
    pub x_spam_status: Option<String>,
}

/// Formats `task`'s reply, or a dialect-correct error response if `task.error` is set.
///
/// `elapsed` is the already-measured time between the task's start and this checkpoint, supplied
/// by the host's clock collaborator (§6); it is only used to fill the log line's `time:` field.
/// `registry` resolves `Command::Custom` tasks to the handler they were registered with.
///
/// Consumes the task into `Done`. Calling this again on an already-`Done` task is rejected with
/// `InvalidState`, satisfying the idempotence property (§8): an error reply cannot be emitted
/// twice.
pub fn write_reply(
    task: &mut Task,
    stats: &mut Stats,
    registry: &CommandRegistry,
    elapsed: Duration,
) -> Result<Reply, TaskError> {
    if task.state == TaskState::Done {
        return Err(TaskError::new(
            ErrorKind::InvalidState,
            ErrorCode::PROTOCOL_ERROR,
            "write_reply called twice for the same task",
        ));
    }
    if !matches!(task.state, TaskState::WriteReply | TaskState::WriteError) {
        return Err(TaskError::new(
            ErrorKind::InvalidState,
            ErrorCode::PROTOCOL_ERROR,
            "write_reply called outside WriteReply/WriteError",
        ));
    }

    let dialect = task.dialect.unwrap_or(Dialect::Rspamc);
    let version_text = canonical_version_text(task, dialect);

    if let Some(error) = task.error.clone() {
        let bytes = write_error_reply(dialect, &version_text, &error);
        task.state = TaskState::Done;
        return Ok(Reply {
            bytes,
            log_line: format!("error: {}", error.message),
            x_spam_status: None,
        });
    }

    let reply = match task.command {
        Some(Command::Ping) => Reply {
            bytes: banner_line(dialect, &version_text, 0, "PONG"),
            log_line: "ping".to_owned(),
            x_spam_status: None,
        },
        Some(Command::Skip) => Reply {
            bytes: banner_line(dialect, &version_text, 0, "SKIP"),
            log_line: "skip".to_owned(),
            x_spam_status: None,
        },
        Some(Command::Process) => {
            write_process_reply(task, dialect, &version_text, stats, elapsed)
        }
        Some(Command::Custom(id)) => match registry.invoke_custom(id, task, stats) {
            Some(reply) => reply,
            None => {
                return Err(TaskError::new(
                    ErrorKind::InvalidState,
                    ErrorCode::PROTOCOL_ERROR,
                    "custom command has no registered handler",
                ));
            }
        },
        Some(_) => write_check_reply(task, dialect, &version_text, stats, elapsed),
        None => {
            return Err(TaskError::new(
                ErrorKind::InvalidState,
                ErrorCode::PROTOCOL_ERROR,
                "write_reply called before a command was parsed",
            ));
        }
    };

    task.state = TaskState::Done;
    info!("{}", reply.log_line);
    Ok(reply)
}

/// The text to echo after the dialect name and slash in the banner.
///
/// `version_token` (the raw text observed after the slash, if any) wins when present. An Rspamc
/// task that named no version at all still echoes its canonical default (`task.version`, itself
/// defaulting to `1.0`) rather than leaving the slash dangling with nothing after it; Spamc
/// carries no canonical version, so its banner is left with an empty version field instead
/// (`examples/original_source/src/protocol.c:203-213` sets `task->proto_ver` unconditionally the
/// instant RSPAMC is recognized, version suffix or not).
fn canonical_version_text(task: &Task, dialect: Dialect) -> String {
    if let Some(token) = &task.version_token {
        return token.clone();
    }
    match dialect {
        Dialect::Rspamc => task.version.unwrap_or(ProtocolVersion::V1_0).to_string(),
        Dialect::Spamc => String::new(),
    }
}

fn write_error_reply(dialect: Dialect, version_text: &str, error: &TaskError) -> Vec<u8> {
    let mut buf = banner_line(dialect, version_text, error.code.0, error_tag(error.kind));
    if dialect == Dialect::Rspamc {
        push_bounded_line(&mut buf, &format!("Error: {}", error.message));
    }
    buf.extend_from_slice(CRLF.as_bytes());
    buf
}

fn error_tag(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Length => "LENGTH_ERROR",
        ErrorKind::Protocol => "PROTOCOL_ERROR",
        ErrorKind::Transport => "TRANSPORT_ERROR",
        ErrorKind::InvalidState => "INVALID_STATE",
    }
}

fn banner_line(dialect: Dialect, version_text: &str, code: u16, text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    push_bounded_line(
        &mut buf,
        &format!("{}/{} {} {}", dialect.banner(), version_text, code, text),
    );
    buf
}

fn write_check_reply(
    task: &Task,
    dialect: Dialect,
    version_text: &str,
    stats: &mut Stats,
    elapsed: Duration,
) -> Reply {
    let mut buf = banner_line(dialect, version_text, 0, "OK");
    let version = task.version.unwrap_or(ProtocolVersion::V1_0);
    let want_symbols = matches!(task.command, Some(Command::Symbols));

    let default_result = resolve_default_metric(task);
    let is_spam = default_result.is_spam();
    write_metric_line(&mut buf, dialect, version, task.is_skipped, &default_result);
    if want_symbols {
        write_symbols_block(&mut buf, dialect, &default_result);
    }

    let log_line = build_log_line(task, &default_result, elapsed);

    if dialect == Dialect::Rspamc {
        for (name, result) in task.results.iter() {
            if name == "default" {
                continue;
            }
            write_metric_line(&mut buf, dialect, version, task.is_skipped, result);
            if want_symbols {
                write_symbols_block(&mut buf, dialect, result);
            }
        }
        for message in &task.messages {
            push_bounded_line(&mut buf, &format!("Message: {message}"));
        }
        write_urls_block(&mut buf, &task.urls);
    }

    buf.extend_from_slice(CRLF.as_bytes());
    stats.record(is_spam);

    Reply {
        bytes: buf,
        log_line,
        x_spam_status: None,
    }
}

fn write_process_reply(
    task: &Task,
    dialect: Dialect,
    version_text: &str,
    stats: &mut Stats,
    elapsed: Duration,
) -> Reply {
    let body_len = task.body.as_ref().map(Vec::len).unwrap_or(0);
    let mut buf = Vec::new();
    push_bounded_line(
        &mut buf,
        &format!("{}/{} 0 OK", dialect.banner(), version_text),
    );
    push_bounded_line(&mut buf, &format!("Content-Length: {body_len}"));

    let version = task.version.unwrap_or(ProtocolVersion::V1_0);
    let default_result = resolve_default_metric(task);
    let is_spam = default_result.is_spam();
    let log_line = build_log_line(task, &default_result, elapsed);

    let mut header_section = Vec::new();
    write_metric_line(
        &mut header_section,
        dialect,
        version,
        task.is_skipped,
        &default_result,
    );
    let x_spam_status = String::from_utf8_lossy(&header_section).trim_end().to_owned();

    if dialect == Dialect::Rspamc {
        for (name, result) in task.results.iter() {
            if name == "default" {
                continue;
            }
            write_metric_line(&mut header_section, dialect, version, task.is_skipped, result);
        }
        for message in &task.messages {
            push_bounded_line(&mut header_section, &format!("Message: {message}"));
        }
    }
    buf.extend_from_slice(&header_section);

    buf.extend_from_slice(CRLF.as_bytes());
    if let Some(body) = &task.body {
        buf.extend_from_slice(body);
    }

    stats.record(is_spam);

    Reply {
        bytes: buf,
        log_line,
        x_spam_status: Some(x_spam_status),
    }
}

/// Looks up the `default` metric, synthesizing a zero-score placeholder if the pipeline never
/// populated one (the original falls back to the configured metric defaults here; lacking a
/// config object, this crate falls back to a zero-threshold placeholder instead).
fn resolve_default_metric(task: &Task) -> MetricResult {
    task.result("default")
        .cloned()
        .unwrap_or_else(|| MetricResult::new("default", 0.0, 0.0))
}

/// Assembles the single structured log record for a reply: `msg ok, id: ..., (metric: verdict:
/// [...] [...]), len: ..., time: ..., part: <hash>, ...` with the trailing separator stripped.
///
/// `text_parts` entries are treated as the fuzzy hash the pipeline produced for that part, per
/// the original's per-part hash logging; parts without a hash are simply absent from the list
/// upstream, not filtered here.
fn build_log_line(task: &Task, default_result: &MetricResult, elapsed: Duration) -> String {
    let message_id = task.message_id.as_deref().unwrap_or("");
    let verdict = verdict_letter(task.is_skipped, default_result.is_spam());
    let body_len = task.body.as_ref().map(Vec::len).unwrap_or(0);

    let mut line = format!(
        "msg ok, id: <{}>, ({}: {}: [{:.2}/{:.2}/{:.2}] [{}]), len: {}, time: {:.3}",
        message_id,
        default_result.metric_name,
        verdict,
        default_result.score,
        default_result.required_score,
        default_result.reject_score,
        symbol_names_for_log(default_result),
        body_len,
        elapsed.as_secs_f64(),
    );
    for hash in &task.text_parts {
        line.push_str(", part: ");
        line.push_str(hash);
    }
    line
}

fn symbol_names_for_log(result: &MetricResult) -> String {
    result
        .symbols
        .keys()
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

fn verdict_letter(is_skipped: bool, is_spam: bool) -> &'static str {
    if is_skipped {
        "S"
    } else if is_spam {
        "T"
    } else {
        "F"
    }
}

fn write_metric_line(
    buf: &mut Vec<u8>,
    dialect: Dialect,
    version: ProtocolVersion,
    is_skipped: bool,
    result: &MetricResult,
) {
    let line = match dialect {
        Dialect::Spamc => format!(
            "Spam: {} ; {:.2} / {:.2}",
            verdict_word(is_skipped, result.is_spam()),
            result.score,
            result.required_score,
        ),
        Dialect::Rspamc if version.supports_reject_score() => format!(
            "Metric: {}; {}; {:.2} / {:.2} / {:.2}",
            result.metric_name,
            verdict_word(is_skipped, result.is_spam()),
            result.score,
            result.required_score,
            result.reject_score,
        ),
        Dialect::Rspamc => format!(
            "Metric: {}; {}; {:.2} / {:.2}",
            result.metric_name,
            verdict_word(is_skipped, result.is_spam()),
            result.score,
            result.required_score,
        ),
    };
    push_bounded_line(buf, &line);
}

fn verdict_word(is_skipped: bool, is_spam: bool) -> &'static str {
    if is_skipped {
        "Skip"
    } else if is_spam {
        "True"
    } else {
        "False"
    }
}

fn write_symbols_block(buf: &mut Vec<u8>, dialect: Dialect, result: &MetricResult) {
    match dialect {
        Dialect::Rspamc => {
            for symbol in result.symbols.values() {
                if symbol.options.is_empty() {
                    push_bounded_line(buf, &format!("Symbol: {}", symbol.name));
                } else {
                    push_bounded_line(
                        buf,
                        &format!("Symbol: {}; {}", symbol.name, symbol.options.join(",")),
                    );
                }
            }
        }
        Dialect::Spamc => {
            let names: Vec<&str> = result.symbols.keys().map(String::as_str).collect();
            if !names.is_empty() {
                push_bounded_line(buf, &names.join(","));
            }
        }
    }
}

/// Appends the `Urls:` block, deduplicating hosts via an ordered set keyed on `(hostlen, bytes)`
/// and folding continuation lines once the running line would cross [`URL_FOLD_THRESHOLD`].
fn write_urls_block(buf: &mut Vec<u8>, urls: &[String]) {
    use std::collections::BTreeSet;

    let mut unique: BTreeSet<(usize, &str)> = BTreeSet::new();
    for host in urls {
        if host.len() > MAX_LINE_LENGTH {
            continue;
        }
        unique.insert((host.len(), host.as_str()));
    }
    if unique.is_empty() {
        return;
    }

    let mut line = String::from("Urls: ");
    let mut first = true;
    for (_, host) in unique {
        let separator = if first { "" } else { ", " };
        if line.len() + separator.len() + host.len() >= URL_FOLD_THRESHOLD {
            line.push_str(CRLF);
            line.push(' ');
        } else {
            line.push_str(separator);
        }
        line.push_str(host);
        first = false;
    }
    push_bounded_line(buf, &line);
}

/// Appends `line` plus `CRLF`, truncating and forcing the trailing `CRLF` if the combination
/// would exceed [`MAX_LINE_LENGTH`] bytes.
fn push_bounded_line(buf: &mut Vec<u8>, line: &str) {
    let mut bytes = line.as_bytes().to_vec();
    if bytes.len() + 2 > MAX_LINE_LENGTH {
        bytes.truncate(MAX_LINE_LENGTH - 2);
    }
    buf.extend_from_slice(&bytes);
    buf.extend_from_slice(CRLF.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use spamc_types::{Dialect as D, ProtocolVersion as V, Symbol};

    fn base_task(command: Command, dialect: D, version: Option<V>, version_token: &str) -> Task {
        let mut task = Task::new();
        task.command = Some(command);
        task.dialect = Some(dialect);
        task.version = version;
        task.version_token = Some(version_token.to_owned());
        task.state = TaskState::WriteReply;
        task
    }

    fn no_elapsed() -> Duration {
        Duration::from_millis(0)
    }

    #[test]
    fn spamc_check_non_spam() {
        let mut task = base_task(Command::Check, D::Spamc, None, "1.2");
        task.set_result(MetricResult::new("default", 5.0, 0.0));
        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "SPAMD/1.2 0 OK\r\nSpam: False ; 0.00 / 5.00\r\n\r\n"
        );
        assert_eq!(stats.messages_ham, 1);
    }

    #[test]
    fn rspamc_symbols_spam() {
        let mut task = base_task(Command::Symbols, D::Rspamc, Some(V::V1_1), "1.1");
        let mut result = MetricResult::new("default", 5.0, 10.0);
        result.score = 7.0;
        result.add_symbol(Symbol::with_options(
            "R_TEST",
            vec!["o1".into(), "o2".into()],
        ));
        task.set_result(result);

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "RSPAMD/1.1 0 OK\r\nMetric: default; True; 7.00 / 5.00 / 10.00\r\nSymbol: R_TEST; o1,o2\r\n\r\n"
        );
        assert_eq!(stats.messages_spam, 1);
    }

    #[test]
    fn rspamc_symbols_emitted_for_every_metric() {
        let mut task = base_task(Command::Symbols, D::Rspamc, Some(V::V1_1), "1.1");

        let mut default_result = MetricResult::new("default", 5.0, 10.0);
        default_result.score = 7.0;
        default_result.add_symbol(Symbol::new("R_DEFAULT"));
        task.set_result(default_result);

        let mut other_result = MetricResult::new("other", 2.0, 4.0);
        other_result.score = 3.0;
        other_result.add_symbol(Symbol::new("R_OTHER"));
        task.set_result(other_result);

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        let text = String::from_utf8(reply.bytes).unwrap();

        assert!(text.contains("Symbol: R_DEFAULT"));
        assert!(text.contains("Symbol: R_OTHER"));
    }

    #[test]
    fn ping_reply() {
        let mut task = base_task(Command::Ping, D::Rspamc, Some(V::V1_1), "1.1");
        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "RSPAMD/1.1 0 PONG\r\n"
        );
    }

    #[test]
    fn rspamc_without_version_token_echoes_canonical_default() {
        let mut task = Task::new();
        task.command = Some(Command::Ping);
        task.dialect = Some(D::Rspamc);
        task.version = Some(V::V1_0);
        task.version_token = None;
        task.state = TaskState::WriteReply;

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "RSPAMD/1.0 0 PONG\r\n"
        );
    }

    #[test]
    fn missing_content_length_error_reply() {
        let mut task = base_task(Command::Check, D::Rspamc, Some(V::V1_0), "1.0");
        task.fail(TaskError::length_error());
        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "RSPAMD/1.0 1 LENGTH_ERROR\r\nError: Unknown content length\r\n\r\n"
        );
    }

    #[test]
    fn write_reply_is_not_idempotent() {
        let mut task = base_task(Command::Ping, D::Rspamc, Some(V::V1_1), "1.1");
        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        let err = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn urls_block_dedups_and_folds() {
        let mut task = base_task(Command::Check, D::Rspamc, Some(V::V1_1), "1.1");
        task.set_result(MetricResult::new("default", 5.0, 10.0));
        for i in 0..200 {
            task.urls.push(format!("host-{i:016}.example.com"));
        }
        task.urls.push("host-0000000000000000.example.com".to_owned());

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        let text = String::from_utf8(reply.bytes).unwrap();

        for line in text.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH);
        }
        assert_eq!(
            text.matches("host-0000000000000000.example.com").count(),
            1
        );
    }

    #[test]
    fn process_reply_carries_content_length_and_body() {
        let mut task = base_task(Command::Process, D::Rspamc, Some(V::V1_1), "1.1");
        task.body = Some(b"hello world".to_vec());
        task.set_result(MetricResult::new("default", 5.0, 10.0));

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        let text = String::from_utf8(reply.bytes.clone()).unwrap();
        assert!(text.starts_with("RSPAMD/1.1 0 OK\r\nContent-Length: 11\r\n"));
        assert!(reply.bytes.ends_with(b"hello world"));
        assert!(reply.x_spam_status.unwrap().starts_with("Metric: default;"));
    }

    #[test]
    fn log_line_carries_measured_elapsed_time() {
        let mut task = base_task(Command::Ping, D::Rspamc, Some(V::V1_1), "1.1");
        task.command = Some(Command::Check);
        task.set_result(MetricResult::new("default", 5.0, 10.0));

        let mut stats = Stats::new();
        let registry = CommandRegistry::new();
        let reply = write_reply(
            &mut task,
            &mut stats,
            &registry,
            Duration::from_millis(250),
        )
        .unwrap();
        assert!(reply.log_line.contains("time: 0.250"));
    }

    #[test]
    fn custom_command_dispatches_to_registered_handler() {
        let mut registry = CommandRegistry::new();
        let id = registry.register_command("learn", |_task: &Task, _stats: &mut Stats| Reply {
            bytes: b"RSPAMD/1.1 0 LEARNED\r\n".to_vec(),
            log_line: "learn".to_owned(),
            x_spam_status: None,
        });

        let mut task = base_task(Command::Custom(id), D::Rspamc, Some(V::V1_1), "1.1");
        let mut stats = Stats::new();
        let reply = write_reply(&mut task, &mut stats, &registry, no_elapsed()).unwrap();
        assert_eq!(
            String::from_utf8(reply.bytes).unwrap(),
            "RSPAMD/1.1 0 LEARNED\r\n"
        );
        assert_eq!(reply.log_line, "learn");
    }
}
