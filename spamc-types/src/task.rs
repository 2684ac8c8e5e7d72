//! The in-memory request/response record and its lifecycle states.

use std::net::Ipv4Addr;

use crate::command::{Command, CustomCommandId};
use crate::dialect::{Dialect, ProtocolVersion};
use crate::error::TaskError;
use crate::metric::MetricResult;

/// Where a [`Task`] sits in its request/response lifecycle.
///
/// Starts at `ReadCommand`, ends at `Done`. Once a task reaches `WriteError`, no further request
/// lines are consumed (§3 invariant).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskState {
    ReadCommand,
    ReadHeader,
    ReadMessage,
    WriteReply,
    WriteError,
    Done,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done)
    }

    /// Whether `feed_line` still makes sense to call: only `ReadCommand` and `ReadHeader`.
    pub fn accepts_request_lines(self) -> bool {
        matches!(self, TaskState::ReadCommand | TaskState::ReadHeader)
    }
}

/// One client request, from the moment its connection is accepted to the moment its reply has
/// been fully flushed.
///
/// Populated incrementally: the Request Parser fills the command/dialect/header fields, the
/// external scanning pipeline fills `results`/`messages`/`text_parts`/`urls`, and the Reply
/// Writer only ever reads.
#[derive(Clone, Debug)]
pub struct Task {
    pub state: TaskState,
    pub dialect: Option<Dialect>,
    /// The parsed, canonical version used to pick a wire format (Rspamc only; recognizes only
    /// `1.1`, defaulting to `1.0` otherwise, per the original's prefix match).
    pub version: Option<ProtocolVersion>,
    /// The literal version text observed after the slash, echoed verbatim in the banner line.
    /// `None` when the request named no version at all.
    pub version_token: Option<String>,
    pub command: Option<Command>,
    pub custom_command: Option<CustomCommandId>,

    pub content_length: Option<u64>,
    pub helo: Option<String>,
    pub from: Option<String>,
    pub deliver_to: Option<String>,
    pub queue_id: Option<String>,
    pub subject: Option<String>,
    pub user: Option<String>,
    pub from_ip: Option<Ipv4Addr>,
    pub nrcpt: Option<u32>,
    pub pass_all_filters: bool,
    pub is_skipped: bool,
    pub message_id: Option<String>,
    pub rcpt: Vec<String>,

    pub body: Option<Vec<u8>>,
    pub error: Option<TaskError>,

    pub results: Vec<(String, MetricResult)>,
    pub messages: Vec<String>,
    pub text_parts: Vec<String>,
    pub urls: Vec<String>,
}

impl Task {
    /// A fresh task as it exists right after connection accept: `ReadCommand`, nothing else set.
    pub fn new() -> Self {
        Self {
            state: TaskState::ReadCommand,
            dialect: None,
            version: None,
            version_token: None,
            command: None,
            custom_command: None,
            content_length: None,
            helo: None,
            from: None,
            deliver_to: None,
            queue_id: None,
            subject: None,
            user: None,
            from_ip: None,
            nrcpt: None,
            pass_all_filters: false,
            is_skipped: false,
            message_id: None,
            rcpt: Vec::new(),
            body: None,
            error: None,
            results: Vec::new(),
            messages: Vec::new(),
            text_parts: Vec::new(),
            urls: Vec::new(),
        }
    }

    /// Everything but `Ping` and `Skip` requires a `Content-Length` body.
    pub fn is_body_bearing(&self) -> bool {
        self.command.map(Command::is_body_bearing).unwrap_or(true)
    }

    /// Attaches `error`, forcing the task into `WriteError`.
    pub fn fail(&mut self, error: TaskError) {
        self.error = Some(error);
        self.state = TaskState::WriteError;
    }

    pub fn result(&self, metric_name: &str) -> Option<&MetricResult> {
        self.results
            .iter()
            .find(|(name, _)| name == metric_name)
            .map(|(_, result)| result)
    }

    pub fn set_result(&mut self, result: MetricResult) {
        if let Some(slot) = self
            .results
            .iter_mut()
            .find(|(name, _)| *name == result.metric_name)
        {
            slot.1 = result;
        } else {
            self.results.push((result.metric_name.clone(), result));
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}
