//! Splits an inbound byte stream into request lines, then a fixed-length body chunk.
//!
//! Modeled on `imap-codec`'s `Fragmentizer`: an explicit buffer of not-yet-parsed bytes, advanced
//! by repeatedly calling [`LineFramer::progress`] until it returns `None`, at which point the
//! caller enqueues more bytes and tries again. Unlike `Fragmentizer`, there is no literal
//! announcement embedded in the stream telling us how long the body is; the caller learns
//! `content_length` from the Request Parser and tells the framer to expect it via
//! [`LineFramer::begin_body`].

use std::collections::VecDeque;

use spamc_types::{ErrorCode, ErrorKind, TaskError};

/// One unit the framer hands back to the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// A header or command line, with the trailing CR and/or LF stripped.
    Line(Vec<u8>),
    /// The blank line that terminates the header block. Consumed, not re-delivered as a `Line`.
    BlankLine,
    /// Exactly the requested number of body bytes.
    Body(Vec<u8>),
}

/// A stateful line-then-body framer for one request.
#[derive(Debug)]
pub struct LineFramer {
    unparsed: VecDeque<u8>,
    max_line_length: usize,
    mode: ModeTag,
    remaining_body: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ModeTag {
    Lines,
    Body,
}

impl LineFramer {
    /// RFC 2822's conventional line length cap, and this protocol's default.
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 1000;

    pub fn new(max_line_length: usize) -> Self {
        Self {
            unparsed: VecDeque::new(),
            max_line_length,
            mode: ModeTag::Lines,
            remaining_body: 0,
        }
    }

    /// Enqueues bytes received from the transport.
    pub fn enqueue_bytes(&mut self, bytes: &[u8]) {
        self.unparsed.extend(bytes);
    }

    /// Tells the framer the header block is done and the next `content_length` bytes are the
    /// body. Called by the driving loop once the Request Parser transitions to `ReadMessage`.
    pub fn begin_body(&mut self, content_length: u64) {
        self.mode = ModeTag::Body;
        self.remaining_body = content_length;
    }

    /// Advances parsing as far as the buffered bytes allow.
    ///
    /// Returns `Ok(None)` when more bytes must be enqueued first. An overlong line is reported
    /// as a [`TaskError`] with [`ErrorKind::Protocol`]; the framer does not attempt to recover,
    /// the caller should fail the task.
    pub fn progress(&mut self) -> Result<Option<Frame>, TaskError> {
        match self.mode {
            ModeTag::Lines => self.progress_line(),
            ModeTag::Body => Ok(self.progress_body()),
        }
    }

    fn progress_line(&mut self) -> Result<Option<Frame>, TaskError> {
        if let Some(idx) = self.unparsed.iter().position(|&b| b == b'\n') {
            if idx > self.max_line_length {
                self.unparsed.drain(..=idx);
                return Err(overlong_line_error());
            }
            let mut line: Vec<u8> = self.unparsed.drain(..idx).collect();
            // drop the LF itself
            self.unparsed.pop_front();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                return Ok(Some(Frame::BlankLine));
            }
            return Ok(Some(Frame::Line(line)));
        }

        if self.unparsed.len() > self.max_line_length {
            self.unparsed.clear();
            return Err(overlong_line_error());
        }

        Ok(None)
    }

    fn progress_body(&mut self) -> Option<Frame> {
        if (self.unparsed.len() as u64) < self.remaining_body {
            return None;
        }
        let body: Vec<u8> = self
            .unparsed
            .drain(..self.remaining_body as usize)
            .collect();
        self.remaining_body = 0;
        self.mode = ModeTag::Lines;
        Some(Frame::Body(body))
    }
}

fn overlong_line_error() -> TaskError {
    TaskError::new(
        ErrorKind::Protocol,
        ErrorCode::PROTOCOL_ERROR,
        format!(
            "line exceeds maximum length of {} bytes",
            LineFramer::DEFAULT_MAX_LINE_LENGTH
        ),
    )
}
