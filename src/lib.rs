#![deny(missing_debug_implementations)]
//! A streaming parser, command registry, and reply writer for the SPAMC/RSPAMC spam-filter wire
//! protocol.
//!
//! Bytes flow through three pieces in sequence: a [`framer::LineFramer`] splits an inbound byte
//! stream into request lines and a fixed-length body chunk; a [`parser::RequestParser`] feeds
//! those lines into a [`spamc_types::Task`]'s state machine; and [`writer::write_reply`]
//! serializes the completed task (plus whatever an external scanning pipeline populated) back
//! into reply bytes. None of this crate performs I/O itself — it is driven by a host event loop.

pub mod config;
pub mod framer;
pub mod parser;
pub mod registry;
pub mod writer;

pub mod testing;

pub use config::EngineConfig;
pub use framer::{Frame, LineFramer};
pub use parser::RequestParser;
pub use registry::CommandRegistry;
pub use writer::{write_reply, Reply};
