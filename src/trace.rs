// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File access tracer.
//!
//! Discover which configuration files a program actually touches by running
//! it under a syscall tracing facility, `strace` by default, and watching the
//! files it opens inside the home directory.
//!
//! # Pipeline
//!
//! Data flows strictly downstream, one line at a time:
//!
//! 1. [`supervise`] launches `strace -f -e trace=openat <program> [args]...`
//!    and reads its diagnostic stream line by line.
//! 2. [`parse`] extracts the quoted path of each event, skipping lines that
//!    do not hold one.
//! 3. [`normalize`] keeps paths inside the home directory and makes them
//!    relative to it.
//!
//! The resulting [`Trace`] is a lazy, finite sequence. Each candidate is
//! handed out as soon as its line is read, in the order the lines were
//! produced. Repeated accesses to the same file are reported every time.
//!
//! # Deadlines
//!
//! By default a trace runs for as long as the traced program does. A
//! [`Tracer`] can be given a deadline, after which the traced process is
//! killed and the sequence ends with [`TraceError::DeadlineExceeded`].

pub mod normalize;
pub mod parse;
pub mod supervise;

pub use normalize::{normalize, CandidatePath};
pub use parse::{parse_line, TraceEvent};
pub use supervise::{launch, TraceRequest, TracedProcess};

use futures::{stream, Stream};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Default tracing facility.
pub const DEFAULT_TRACER: &str = "strace";

/// Default call filter: only report file opens, follow child processes.
pub const DEFAULT_FILTER: [&str; 3] = ["-f", "-e", "trace=openat"];

/// File access tracer.
///
/// Immutable once built, so one tracer can serve any number of independent
/// traces.
#[derive(Debug, Clone)]
pub struct Tracer {
    tracer: OsString,
    filter_args: Vec<OsString>,
    home_dir: PathBuf,
    deadline: Option<Duration>,
}

impl Tracer {
    /// Construct new tracer reporting paths relative to home directory.
    ///
    /// Uses [`DEFAULT_TRACER`] with [`DEFAULT_FILTER`] and no deadline.
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracer: DEFAULT_TRACER.into(),
            filter_args: DEFAULT_FILTER.iter().map(OsString::from).collect(),
            home_dir: home_dir.into(),
            deadline: None,
        }
    }

    /// Use another tracing facility.
    pub fn with_tracer(mut self, tracer: impl Into<OsString>) -> Self {
        self.tracer = tracer.into();
        self
    }

    /// Use another call filter.
    pub fn with_filter_args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.filter_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill traced process once deadline elapses.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Home directory that candidates are relative to.
    pub fn home_dir(&self) -> &Path {
        self.home_dir.as_path()
    }

    /// Start tracing a program.
    ///
    /// Nothing is spawned unless both the tracing facility and the program
    /// can be found.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::TracerUnavailable`] if tracing facility cannot
    ///   be found.
    /// - Return [`TraceError::TargetUnavailable`] if program cannot be found.
    /// - Return [`TraceError::Spawn`] or [`TraceError::MissingDiagnostics`]
    ///   if the traced process cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub fn trace(&self, request: TraceRequest) -> Result<Trace> {
        let process = launch(&self.tracer, &self.filter_args, &request)?;
        match process.id() {
            Some(pid) => info!("tracing {:?} under pid {pid}", request.program()),
            None => info!("tracing {:?}", request.program()),
        }

        Ok(Trace {
            process: Some(process),
            home_dir: self.home_dir.clone(),
            deadline: self
                .deadline
                .map(|timeout| (timeout, Instant::now() + timeout)),
        })
    }
}

/// Lazy sequence of candidate paths discovered by one traced process.
///
/// Exhausted once the diagnostic stream reaches end-of-stream and the child
/// has been reaped. Cannot be restarted.
#[derive(Debug)]
pub struct Trace {
    process: Option<TracedProcess>,
    home_dir: PathBuf,
    deadline: Option<(Duration, Instant)>,
}

impl Trace {
    /// Produce next candidate path.
    ///
    /// Returns `Ok(None)` once the traced process is done. The exit status of
    /// the traced program is logged, not reported.
    ///
    /// # Errors
    ///
    /// - Return [`TraceError::ReadDiagnostics`] or [`TraceError::Wait`] if
    ///   the traced process cannot be read from or reaped.
    /// - Return [`TraceError::DeadlineExceeded`] if the deadline elapses.
    pub async fn next(&mut self) -> Result<Option<CandidatePath>> {
        while let Some(line) = self.next_line().await? {
            match parse_line(&line) {
                Some(event) => {
                    if let Some(candidate) = normalize(&event.raw_path, &self.home_dir) {
                        debug!("candidate {:?}", candidate.as_path().display());
                        return Ok(Some(candidate));
                    }
                }
                None => debug!("skip line without path: {line:?}"),
            }
        }

        Ok(None)
    }

    /// Adapt trace into a [`Stream`] of candidate paths.
    pub fn into_stream(self) -> impl Stream<Item = Result<CandidatePath>> {
        stream::try_unfold(self, |mut trace| async move {
            let candidate = trace.next().await?;
            Ok::<_, TraceError>(candidate.map(|candidate| (candidate, trace)))
        })
    }

    /// Check if traced process has been reaped.
    pub fn is_finished(&self) -> bool {
        self.process.is_none()
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        let Some(process) = self.process.as_mut() else {
            return Ok(None);
        };

        let line = match self.deadline {
            Some((timeout, deadline)) => match timeout_at(deadline, process.next_line()).await {
                Ok(line) => line,
                Err(_) => {
                    if let Some(process) = self.process.take() {
                        let status = process.terminate().await?;
                        warn!("traced process killed after {timeout:?}: {status}");
                    }
                    return Err(TraceError::DeadlineExceeded(timeout));
                }
            },
            None => process.next_line().await,
        };

        match line {
            Ok(Some(line)) => Ok(Some(line)),
            Ok(None) => {
                if let Some(process) = self.process.take() {
                    let status = process.wait().await?;
                    debug!("traced process exited: {status}");
                }
                Ok(None)
            }
            Err(error) => {
                // INVARIANT: Dropping the process kills it, sequence ends here.
                self.process = None;
                Err(error)
            }
        }
    }
}

/// File access tracer error types.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// No program was given to trace.
    #[error("no program given to trace")]
    EmptyCommand,

    /// Tracing facility cannot be found on `$PATH`.
    #[error("{} not found, check your $PATH or install it", tracer.to_string_lossy())]
    TracerUnavailable {
        tracer: OsString,
        #[source]
        source: which::Error,
    },

    /// Program to trace cannot be found or is not executable.
    #[error("{} is not executable or does not exist", program.to_string_lossy())]
    TargetUnavailable {
        program: OsString,
        #[source]
        source: which::Error,
    },

    /// Traced process cannot be spawned.
    #[error("failed to spawn {:?}", tracer.display())]
    Spawn {
        tracer: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Diagnostic stream of traced process cannot be captured.
    #[error("diagnostic stream of traced process is unavailable")]
    MissingDiagnostics,

    /// Diagnostic stream cannot be read.
    #[error("failed to read diagnostic stream of traced process")]
    ReadDiagnostics(#[source] std::io::Error),

    /// Traced process cannot be reaped.
    #[error("failed to wait on traced process")]
    Wait(#[source] std::io::Error),

    /// Traced process outlived its deadline and was killed.
    #[error("traced process killed after exceeding deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl TraceError {
    /// Check if error was raised before anything was spawned.
    ///
    /// These are user-facing conditions, not failures of the tool itself.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::EmptyCommand | Self::TracerUnavailable { .. } | Self::TargetUnavailable { .. }
        )
    }
}

/// Friendly result alias :3
pub type Result<T, E = TraceError> = std::result::Result<T, E>;
