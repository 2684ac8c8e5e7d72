//! The commands a request preamble may name.

use std::fmt::{self, Display, Formatter};

/// A handle into the command registry's dynamic (custom) command table.
///
/// Opaque on purpose: callers never construct one directly, they get it back from looking a
/// token up in a `CommandRegistry`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CustomCommandId(pub(crate) usize);

impl CustomCommandId {
    /// Used by a `CommandRegistry` implementation to mint the handle for a newly registered
    /// command. Not meant for callers matching on a parsed `Command`.
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Exposes the raw index, e.g. for logging.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The command a request preamble names, after matching against the built-in set and falling
/// back to the custom command registry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Check,
    Symbols,
    Report,
    ReportIfSpam,
    Skip,
    Ping,
    Process,
    /// A name that matched an externally registered command instead of a built-in one.
    Custom(CustomCommandId),
}

impl Command {
    /// Every command except `Ping` and `Skip` requires a body of `Content-Length` bytes.
    pub fn is_body_bearing(self) -> bool {
        !matches!(self, Command::Ping | Command::Skip)
    }

    /// The built-in command kind, if this isn't a custom command.
    pub fn kind(self) -> Option<CommandKind> {
        match self {
            Command::Check => Some(CommandKind::Check),
            Command::Symbols => Some(CommandKind::Symbols),
            Command::Report => Some(CommandKind::Report),
            Command::ReportIfSpam => Some(CommandKind::ReportIfSpam),
            Command::Skip => Some(CommandKind::Skip),
            Command::Ping => Some(CommandKind::Ping),
            Command::Process => Some(CommandKind::Process),
            Command::Custom(_) => None,
        }
    }
}

/// The seven built-in command tokens, independent of any particular `Command` instance.
///
/// Kept distinct from [`Command`] so the static lookup table in the registry can be a plain
/// `[(&str, CommandKind); 7]` without needing a `CustomCommandId` to fill in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CommandKind {
    Check,
    Symbols,
    Report,
    ReportIfSpam,
    Skip,
    Ping,
    Process,
}

impl CommandKind {
    pub fn into_command(self) -> Command {
        match self {
            CommandKind::Check => Command::Check,
            CommandKind::Symbols => Command::Symbols,
            CommandKind::Report => Command::Report,
            CommandKind::ReportIfSpam => Command::ReportIfSpam,
            CommandKind::Skip => Command::Skip,
            CommandKind::Ping => Command::Ping,
            CommandKind::Process => Command::Process,
        }
    }
}

impl Display for CommandKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandKind::Check => "check",
            CommandKind::Symbols => "symbols",
            CommandKind::Report => "report",
            CommandKind::ReportIfSpam => "report_ifspam",
            CommandKind::Skip => "skip",
            CommandKind::Ping => "ping",
            CommandKind::Process => "process",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_bearing() {
        assert!(!Command::Ping.is_body_bearing());
        assert!(!Command::Skip.is_body_bearing());
        assert!(Command::Check.is_body_bearing());
        assert!(Command::Process.is_body_bearing());
        assert!(Command::Custom(CustomCommandId(0)).is_body_bearing());
    }

    #[test]
    fn kind_round_trip() {
        for kind in [
            CommandKind::Check,
            CommandKind::Symbols,
            CommandKind::Report,
            CommandKind::ReportIfSpam,
            CommandKind::Skip,
            CommandKind::Ping,
            CommandKind::Process,
        ] {
            assert_eq!(kind.into_command().kind(), Some(kind));
        }
    }
}
