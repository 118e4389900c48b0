use crate::exit::{ExitCode, ExitErrorKind, exit_error_kind};
use crate::options::EffectiveOptions;
use std::fmt;
use std::io;
use thiserror::Error;

/// Which output stream an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamName::Stdout => f.write_str("stdout"),
            StreamName::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors produced while resolving, launching or waiting on a command.
#[derive(Error, Debug)]
pub enum Error {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error(transparent)]
    ExitStatus(Box<ExitStatusError>),

    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O failure ({context}) for `{cmd}`: {source}")]
    Io {
        cmd: String,
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{stream} of `{cmd}` was not captured: {reason}")]
    NotCaptured {
        cmd: String,
        stream: StreamName,
        reason: String,
    },

    #[error("cannot convert output of `{cmd}` to {target}: {text:?}")]
    Conversion {
        cmd: String,
        target: &'static str,
        text: String,
    },
}

impl Error {
    /// The exit status, if this is an exit-status error.
    pub fn exit_code(&self) -> Option<ExitCode> {
        match self {
            Error::ExitStatus(e) => Some(e.code()),
            _ => None,
        }
    }

    /// The memoized exit-N identity, if this is an exit-status error.
    pub fn exit_kind(&self) -> Option<&'static ExitErrorKind> {
        match self {
            Error::ExitStatus(e) => Some(e.kind()),
            _ => None,
        }
    }
}

impl From<ExitStatusError> for Error {
    fn from(e: ExitStatusError) -> Self {
        Error::ExitStatus(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Longest stdout/stderr preview shown in an [`ExitStatusError`] message.
pub const TRUNCATE_CAP: usize = 200;

/// A process finished with a status outside the accepted set.
///
/// The full captured output stays available through [`stdout`](Self::stdout)
/// and [`stderr`](Self::stderr); only the message is truncated.
#[derive(Debug, Clone)]
pub struct ExitStatusError {
    command_line: String,
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    stdout_note: String,
    stderr_note: String,
    options: EffectiveOptions,
    kind: &'static ExitErrorKind,
}

impl ExitStatusError {
    /// `stdout`/`stderr` are `None` when the stream was not captured; the
    /// matching note then says where it went instead.
    pub(crate) fn new(
        command_line: String,
        code: ExitCode,
        stdout: (Option<Vec<u8>>, String),
        stderr: (Option<Vec<u8>>, String),
        options: EffectiveOptions,
    ) -> Self {
        Self {
            command_line,
            stdout: stdout.0,
            stderr: stderr.0,
            stdout_note: stdout.1,
            stderr_note: stderr.1,
            options,
            kind: exit_error_kind(code),
        }
    }

    pub fn code(&self) -> ExitCode {
        self.kind.code()
    }

    pub fn kind(&self) -> &'static ExitErrorKind {
        self.kind
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn stdout(&self) -> Option<&[u8]> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&[u8]> {
        self.stderr.as_deref()
    }

    pub fn options(&self) -> &EffectiveOptions {
        &self.options
    }
}

fn preview(data: Option<&[u8]>, note: &str, stream: StreamName) -> String {
    match data {
        None => note.to_string(),
        Some(data) => {
            let shown = &data[..data.len().min(TRUNCATE_CAP)];
            let mut text = String::from_utf8_lossy(shown).into_owned();
            let omitted = data.len() - shown.len();
            if omitted > 0 {
                text.push_str(&format!(
                    "... ({} more bytes, see ExitStatusError::{}())",
                    omitted, stream
                ));
            }
            text
        }
    }
}

impl fmt::Display for ExitStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n\nRan: {}\n\nSTDOUT:\n\n  {}\n\nSTDERR:\n\n  {}",
            self.kind,
            self.command_line,
            preview(self.stdout.as_deref(), &self.stdout_note, StreamName::Stdout),
            preview(self.stderr.as_deref(), &self.stderr_note, StreamName::Stderr),
        )
    }
}

impl std::error::Error for ExitStatusError {}
