// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Traced process supervision.
//!
//! Launch a program under the tracing facility and hand out its diagnostic
//! stream one line at a time. The child's standard input and output stay
//! attached to the invoking terminal. Only its error stream is captured,
//! because that is where the tracing facility writes its events.
//!
//! # Lifetime
//!
//! A [`TracedProcess`] exclusively owns both the child handle and the reader
//! over its diagnostic stream. The child is spawned with `kill_on_drop`, so
//! dropping a traced process on any exit path kills the child and closes
//! the stream. Reaping goes through [`TracedProcess::wait`], which consumes
//! the process and always drains the stream to end-of-stream first. A child
//! blocked on a full, unread pipe can therefore never deadlock the wait.

use crate::trace::{Result, TraceError};

use std::{
    ffi::{OsStr, OsString},
    process::{ExitStatus, Stdio},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, Command},
};
use tracing::{debug, instrument};

/// Program to run under the tracing facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    program: OsString,
    args: Vec<OsString>,
}

impl TraceRequest {
    /// Construct new trace request.
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Construct trace request from raw command line tokens.
    ///
    /// First token is the program, the rest are its arguments.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::EmptyCommand`] if no tokens are given.
    pub fn try_from_tokens(tokens: impl IntoIterator<Item = impl Into<OsString>>) -> Result<Self> {
        let mut tokens = tokens.into_iter().map(Into::into);
        let program = tokens.next().ok_or(TraceError::EmptyCommand)?;

        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Program to trace.
    pub fn program(&self) -> &OsStr {
        self.program.as_os_str()
    }

    /// Arguments of program to trace.
    pub fn args(&self) -> &[OsString] {
        self.args.as_slice()
    }
}

/// Running child under observation.
#[derive(Debug)]
pub struct TracedProcess {
    child: Child,
    diagnostics: BufReader<ChildStderr>,
    drained: bool,
}

impl TracedProcess {
    /// OS-assigned process identifier of the tracing facility.
    ///
    /// Returns `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Read next line of diagnostic stream.
    ///
    /// Suspends until a full line is available or the stream closes. Trailing
    /// line terminators are chomped. Invalid UTF-8 is replaced lossily, since
    /// traced paths can hold arbitrary bytes. A final line without a
    /// terminator is still returned.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::ReadDiagnostics`] if reading the stream fails.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if self.drained {
            return Ok(None);
        }

        let mut buffer = Vec::new();
        let read = self
            .diagnostics
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(TraceError::ReadDiagnostics)?;
        if read == 0 {
            debug!("diagnostic stream reached end-of-stream");
            self.drained = true;
            return Ok(None);
        }

        // INVARIANT: Chomp trailing newlines.
        if buffer.last() == Some(&b'\n') {
            buffer.pop();
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
    }

    /// Drain diagnostic stream, then reap child.
    ///
    /// Unread lines are discarded.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::ReadDiagnostics`] if draining the stream fails.
    /// - Return [`TraceError::Wait`] if the child cannot be reaped.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let mut discarded = 0_usize;
        while self.next_line().await?.is_some() {
            discarded += 1;
        }

        if discarded > 0 {
            debug!("discarded {discarded} unread diagnostic lines");
        }

        self.child.wait().await.map_err(TraceError::Wait)
    }

    /// Kill child without draining, then reap it.
    ///
    /// Draining is skipped on purpose: programs spawned by the traced program
    /// may hold the diagnostic stream open long after the tracing facility
    /// itself is gone.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::Wait`] if the child cannot be reaped.
    pub async fn terminate(mut self) -> Result<ExitStatus> {
        if let Err(error) = self.child.start_kill() {
            debug!("traced process already gone: {error}");
        }

        self.child.wait().await.map_err(TraceError::Wait)
    }
}

/// Launch program under tracing facility.
///
/// Both the tracing facility and the target program must resolve to
/// executables through `$PATH` before anything is spawned. The child runs
/// `tracer filter_args... program args...`.
///
/// # Errors
///
/// - Return [`TraceError::TracerUnavailable`] if tracing facility cannot be
///   found.
/// - Return [`TraceError::TargetUnavailable`] if target program cannot be
///   found or is not executable.
/// - Return [`TraceError::Spawn`] if the child cannot be spawned.
/// - Return [`TraceError::MissingDiagnostics`] if the diagnostic stream
///   cannot be captured.
#[instrument(skip(tracer, filter_args, request), level = "debug")]
pub fn launch(
    tracer: impl AsRef<OsStr>,
    filter_args: &[OsString],
    request: &TraceRequest,
) -> Result<TracedProcess> {
    let tracer = tracer.as_ref();
    let tracer_path = which::which(tracer).map_err(|source| TraceError::TracerUnavailable {
        tracer: tracer.to_owned(),
        source,
    })?;
    let program_path =
        which::which(request.program()).map_err(|source| TraceError::TargetUnavailable {
            program: request.program().to_owned(),
            source,
        })?;
    debug!(
        "trace {} through {}",
        program_path.display(),
        tracer_path.display()
    );

    let mut child = Command::new(&tracer_path)
        .args(filter_args)
        .arg(request.program())
        .args(request.args())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TraceError::Spawn {
            tracer: tracer_path.clone(),
            source,
        })?;

    // INVARIANT: Dropping child here kills it, nothing leaks on failure.
    let stderr = child.stderr.take().ok_or(TraceError::MissingDiagnostics)?;
    debug!("spawned traced process {:?}", child.id());

    Ok(TracedProcess {
        child,
        diagnostics: BufReader::new(stderr),
        drained: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn trace_request_from_tokens() -> anyhow::Result<()> {
        let result = TraceRequest::try_from_tokens(["cat", "/etc/passwd"])?;
        assert_eq!(result, TraceRequest::new("cat", ["/etc/passwd"]));
        assert_eq!(result.program(), OsStr::new("cat"));
        assert_eq!(result.args(), &[OsString::from("/etc/passwd")]);

        Ok(())
    }

    #[test]
    fn trace_request_requires_program() {
        let result = TraceRequest::try_from_tokens(Vec::<OsString>::new());
        assert!(matches!(result, Err(TraceError::EmptyCommand)));
    }

    #[tokio::test]
    async fn launch_rejects_missing_tracer() {
        let request = TraceRequest::new("sh", ["-c", "true"]);
        let result = launch("sdf-no-such-tracer", &[], &request);
        assert!(matches!(
            result,
            Err(TraceError::TracerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn launch_rejects_missing_target() {
        let request = TraceRequest::new("sdf-no-such-program", Vec::<OsString>::new());
        let result = launch("sh", &[], &request);
        assert!(matches!(
            result,
            Err(TraceError::TargetUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn wait_drains_unread_lines() -> anyhow::Result<()> {
        let request = TraceRequest::new("sh", ["-c", "echo one >&2; echo two >&2; exit 3"]);
        let mut process = launch("env", &[], &request)?;
        assert!(process.id().is_some());
        assert_eq!(process.next_line().await?, Some("one".to_string()));

        let status = process.wait().await?;
        assert_eq!(status.code(), Some(3));

        Ok(())
    }

    #[tokio::test]
    async fn next_line_replaces_invalid_utf8() -> anyhow::Result<()> {
        let request = TraceRequest::new("sh", ["-c", r"printf 'a\377b\r\nlast' >&2"]);
        let mut process = launch("env", &[], &request)?;
        assert_eq!(process.next_line().await?, Some("a\u{fffd}b".to_string()));
        assert_eq!(process.next_line().await?, Some("last".to_string()));
        assert_eq!(process.next_line().await?, None);
        assert_eq!(process.next_line().await?, None);
        process.wait().await?;

        Ok(())
    }
}
