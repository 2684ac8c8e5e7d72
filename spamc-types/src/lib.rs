#![deny(missing_debug_implementations)]
//! Data structures for the SPAMC/RSPAMC spam-filter wire protocol.
//!
//! This crate only describes *what* a request or reply looks like in memory: the dialect a
//! client spoke, the command it issued, the headers it sent, and the per-metric results a
//! scanning pipeline produced. Parsing bytes into these types and serializing them back out
//! lives in `spamc-proto`.

pub mod command;
pub mod dialect;
pub mod error;
pub mod metric;
pub mod stats;
pub mod task;

pub use command::{Command, CommandKind, CustomCommandId};
pub use dialect::{Dialect, ProtocolVersion};
pub use error::{ErrorCode, ErrorKind, TaskError};
pub use metric::{MetricResult, Symbol};
pub use stats::Stats;
pub use task::{Task, TaskState};
