// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Diagnostic line parsing.
//!
//! The tracing facility writes one event per line, with the accessed path as
//! the first double-quoted token after the call name:
//!
//! ```text
//! [pid  4242] openat(AT_FDCWD, "/home/alice/.bashrc", O_RDONLY) = 3
//! ```
//!
//! Anything else that ends up on the diagnostic stream, e.g., the traced
//! program's own error output, exit notices, or garbage, is simply not an
//! event.

/// Single file access observed by the tracing facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Path exactly as the tracing facility printed it.
    pub raw_path: String,
}

/// Extract file access event from one diagnostic line.
///
/// Returns `None` when the line does not hold at least one complete
/// double-quoted token. Never fails.
pub fn parse_line(line: &str) -> Option<TraceEvent> {
    let mut fragments = line.split('"');
    let _call = fragments.next()?;
    let raw_path = fragments.next()?;

    // INVARIANT: Closing quote must exist, i.e., at least 3 fragments.
    fragments.next()?;

    Some(TraceEvent {
        raw_path: raw_path.to_owned(),
    })
}
