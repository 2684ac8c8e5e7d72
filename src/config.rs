//! Typed engine configuration.
//!
//! Not a file format: the host constructs one of these directly (e.g. from its own config
//! parsing layer) and hands it to [`crate::framer::LineFramer::new`]. Grounded on
//! `imap-codec::fragmentizer::Fragmentizer::new`'s `max_message_size` parameter, generalized to
//! this protocol's two independent bounds.

/// Resource limits the Line Framer enforces while reading one request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// Maximum bytes for a single command or header line, CRLF excluded. RFC 2822 convention is
    /// 1000; that is also this protocol's outbound line bound.
    pub max_line_length: usize,
    /// Maximum bytes the host will accept for a request body, independent of what
    /// `Content-Length` claims. The framer itself does not enforce this; the host should reject
    /// a `Content-Length` exceeding it before calling `begin_body`.
    pub max_body_size: u64,
}

impl EngineConfig {
    pub fn new(max_line_length: usize, max_body_size: u64) -> Self {
        Self {
            max_line_length,
            max_body_size,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_line_length: crate::framer::LineFramer::DEFAULT_MAX_LINE_LENGTH,
            max_body_size: 50 * 1024 * 1024,
        }
    }
}
