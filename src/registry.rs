//! Static built-in commands plus a dynamic table of externally registered custom commands.
//!
//! The original implementation kept custom commands in a process-wide `GList`, prepending each
//! new registration. Here the registry is an explicitly owned value the host constructs once at
//! startup and hands to the parser; registration order is preserved (first match wins), rather
//! than the original's reversed prepend order (a REDESIGN FLAG).

use std::fmt::{self, Debug, Formatter};

use spamc_types::{Command, CommandKind, CustomCommandId, Stats, Task};

use crate::writer::Reply;

const BUILTIN_COMMANDS: &[(&str, CommandKind)] = &[
    ("check", CommandKind::Check),
    ("symbols", CommandKind::Symbols),
    ("report", CommandKind::Report),
    ("report_ifspam", CommandKind::ReportIfSpam),
    ("skip", CommandKind::Skip),
    ("ping", CommandKind::Ping),
    ("process", CommandKind::Process),
];

/// A custom command's handler: given the completed task and the host's running stats, produces
/// the reply that goes out on the wire. Takes the place of `write_reply`'s built-in dispatch for
/// `Command::Custom` (§4.4).
type Handler = Box<dyn Fn(&Task, &mut Stats) -> Reply + Send + Sync>;

/// A registered custom command: a name and the handler that produces its reply.
struct CustomCommand {
    name: String,
    handler: Handler,
}

impl Debug for CustomCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCommand")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps command tokens to [`Command`]s.
///
/// Built at startup, then read-only for the lifetime of the process (§5, "Shared mutable
/// state").
#[derive(Debug, Default)]
pub struct CommandRegistry {
    custom: Vec<CustomCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { custom: Vec::new() }
    }

    /// Registers a new custom command and its handler. Returns the handle to use when
    /// dispatching it.
    ///
    /// Names are matched case-insensitively at lookup time; registering the same name twice
    /// creates two entries and the earlier one keeps winning, since lookup is first-match.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Task, &mut Stats) -> Reply + Send + Sync + 'static,
    ) -> CustomCommandId {
        self.custom.push(CustomCommand {
            name: name.into(),
            handler: Box::new(handler),
        });
        CustomCommandId::from_index(self.custom.len() - 1)
    }

    /// Resolves a command token: built-ins first, then the custom table in registration order.
    pub fn lookup(&self, token: &str) -> Option<Command> {
        if let Some((_, kind)) = BUILTIN_COMMANDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
        {
            return Some(kind.into_command());
        }

        self.custom
            .iter()
            .position(|cmd| cmd.name.eq_ignore_ascii_case(token))
            .map(|idx| Command::Custom(CustomCommandId::from_index(idx)))
    }

    pub fn custom_name(&self, id: CustomCommandId) -> Option<&str> {
        self.custom.get(id.index()).map(|cmd| cmd.name.as_str())
    }

    /// Invokes the handler registered for `id`, producing its reply. `None` if `id` doesn't name
    /// a still-registered custom command.
    pub fn invoke_custom(&self, id: CustomCommandId, task: &Task, stats: &mut Stats) -> Option<Reply> {
        self.custom.get(id.index()).map(|cmd| (cmd.handler)(task, stats))
    }
}
