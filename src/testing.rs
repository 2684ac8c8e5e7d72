//! Test helpers shared across this crate's integration tests.
//!
//! Modeled on `imap-codec`'s `testing` module: a small assertion that prints both sides clearly
//! on mismatch instead of relying on `assert_eq!`'s default `Debug` dump, which is unreadable for
//! long CRLF-laden byte strings.

/// Asserts that a [`crate::Reply`]'s bytes exactly equal `expected`, printing both sides with
/// visible `\r\n` escapes on failure.
pub fn assert_reply_eq(reply: &crate::Reply, expected: &[u8]) {
    let got = reply.bytes.as_slice();
    if got != expected {
        panic!(
            "reply mismatch\nexpected: {:?}\ngot:      {:?}",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(got),
        );
    }
}
