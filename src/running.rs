use crate::error::{Error, ExitStatusError, Result, StreamName};
use crate::exit::{ExitCode, status_code};
use crate::io_adapters::{self, InputSource};
use crate::options::EffectiveOptions;
use crate::prefix::PrefixGuard;
use std::fs::File;
use std::io::{self, PipeReader};
use std::process::{self, Child, Stdio};
use std::thread::JoinHandle;
use tracing::debug;

/// How a piped invocation received its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    /// Upstream was still running in the background; its stdout pipe was
    /// connected straight to this process and both ran concurrently.
    Live,
    /// Upstream had finished (or was waited on first); its captured stdout
    /// was fed to this process as stdin data.
    Buffered,
}

/// State of one output stream of a process.
#[derive(Debug)]
enum StreamState {
    /// Captured through a pipe that has not been drained yet.
    Pending(PipeReader),
    Captured(Vec<u8>),
    /// Sent to a file; holds the target's description.
    Redirected(String),
    /// The child wrote to the caller's own stream.
    Inherited,
    /// stderr shares stdout's destination.
    Merged,
    /// stdout was handed to a downstream process.
    PipedAway,
    /// No process was started, or the handle was abandoned.
    Detached,
    /// Reading the pipe failed; holds the error text.
    Unreadable(String),
}

impl StreamState {
    fn take_pending(&mut self) -> Option<PipeReader> {
        match std::mem::replace(self, StreamState::Detached) {
            StreamState::Pending(reader) => Some(reader),
            other => {
                *self = other;
                None
            }
        }
    }

    fn captured(&self) -> Option<&[u8]> {
        match self {
            StreamState::Captured(data) => Some(data),
            _ => None,
        }
    }

    /// Placeholder used in error messages for streams that were not captured.
    fn note(&self) -> String {
        match self {
            StreamState::Pending(_) | StreamState::Captured(_) => String::new(),
            StreamState::Redirected(target) => format!("<redirected to '{}'>", target),
            StreamState::Inherited => "<not captured: foreground>".to_string(),
            StreamState::Merged => "<merged into stdout>".to_string(),
            StreamState::PipedAway => "<piped to another command>".to_string(),
            StreamState::Detached => "<no process>".to_string(),
            StreamState::Unreadable(error) => format!("<read failed: {}>", error),
        }
    }

    fn not_captured_reason(&self) -> String {
        match self {
            StreamState::Pending(_) => "the process has not finished".to_string(),
            StreamState::Captured(_) => String::new(),
            StreamState::Redirected(target) => format!("redirected to '{}'", target),
            StreamState::Inherited => "inherited by the child (foreground)".to_string(),
            StreamState::Merged => "merged into stdout".to_string(),
            StreamState::PipedAway => "consumed by a downstream command".to_string(),
            StreamState::Detached => "no process was started".to_string(),
            StreamState::Unreadable(error) => format!("reading it failed: {}", error),
        }
    }
}

/// Handle to one launched process (or a scoped-prefix placeholder).
///
/// A handle is `RUNNING` until [`wait`](Self::wait) completes, then
/// `TERMINATED` for good. Output accessors wait implicitly. Only one owner
/// should wait; the `&mut self` receivers enforce that within safe code.
///
/// Dropping a handle that was never waited on closes its pipes and reaps the
/// process on a detached thread.
#[derive(Debug)]
pub struct RunningCommand {
    command_line: String,
    child: Option<Child>,
    stdout: StreamState,
    stderr: StreamState,
    feeder: Option<JoinHandle<io::Result<()>>>,
    options: EffectiveOptions,
    status: Option<ExitCode>,
    failure: Option<ExitStatusError>,
    pipe_mode: Option<PipeMode>,
    /// Set when draining the output pipes failed; `wait` keeps reporting it.
    read_failure: Option<(io::ErrorKind, String)>,
    _prefix: Option<PrefixGuard>,
}

/// Where stdout ended up, so stderr can follow it when merged.
enum StdoutDest {
    Pipe(io::PipeWriter),
    File(File),
    Inherit,
}

impl RunningCommand {
    /// Launch `argv` with the given options. Never waits.
    pub(crate) fn spawn(
        argv: Vec<String>,
        options: EffectiveOptions,
        input: InputSource,
        pipe_mode: Option<PipeMode>,
    ) -> Result<Self> {
        let command_line = argv.join(" ");
        let io_err = |context: &str, source: io::Error| Error::Io {
            cmd: command_line.clone(),
            context: context.to_string(),
            source,
        };

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::CommandNotFound(String::new()))?;
        let mut cmd = process::Command::new(program);
        cmd.args(args);
        if let Some(env) = &options.env {
            cmd.env_clear();
            cmd.envs(env.iter());
        }
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let (stdin, stdin_data) = input.stdio();
        cmd.stdin(stdin);

        let (stdout_state, stdout_dest) = match &options.stdout {
            Some(target) => {
                let file = target
                    .open()
                    .map_err(|e| io_err("opening stdout target", e))?;
                (StreamState::Redirected(target.to_string()), StdoutDest::File(file))
            }
            None if options.foreground => (StreamState::Inherited, StdoutDest::Inherit),
            None => {
                let (reader, writer) = io::pipe().map_err(|e| io_err("creating stdout pipe", e))?;
                (StreamState::Pending(reader), StdoutDest::Pipe(writer))
            }
        };

        let (stderr_state, stderr_stdio) = if options.merge_stderr {
            let stdio = match &stdout_dest {
                StdoutDest::Pipe(writer) => Stdio::from(
                    writer
                        .try_clone()
                        .map_err(|e| io_err("sharing stdout pipe", e))?,
                ),
                StdoutDest::File(file) => Stdio::from(
                    file.try_clone()
                        .map_err(|e| io_err("sharing stdout target", e))?,
                ),
                StdoutDest::Inherit => Stdio::from(io::stdout()),
            };
            (StreamState::Merged, stdio)
        } else {
            match &options.stderr {
                Some(target) => (
                    StreamState::Redirected(target.to_string()),
                    target
                        .stdio()
                        .map_err(|e| io_err("opening stderr target", e))?,
                ),
                None if options.foreground => (StreamState::Inherited, Stdio::inherit()),
                None => {
                    let (reader, writer) =
                        io::pipe().map_err(|e| io_err("creating stderr pipe", e))?;
                    (StreamState::Pending(reader), Stdio::from(writer))
                }
            }
        };

        cmd.stdout(match stdout_dest {
            StdoutDest::Pipe(writer) => Stdio::from(writer),
            StdoutDest::File(file) => Stdio::from(file),
            StdoutDest::Inherit => Stdio::inherit(),
        });
        cmd.stderr(stderr_stdio);

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            cmd: command_line.clone(),
            source,
        })?;
        // Our copies of the pipe write ends live in `cmd`; close them so the
        // readers see EOF when the child exits.
        drop(cmd);

        let feeder = match (stdin_data, child.stdin.take()) {
            (Some(data), Some(stdin)) => Some(io_adapters::feed_stdin(stdin, data)),
            _ => None,
        };

        debug!(
            command = %command_line,
            pid = child.id(),
            background = options.background,
            pipe = ?pipe_mode,
            "spawned"
        );

        Ok(Self {
            command_line,
            child: Some(child),
            stdout: stdout_state,
            stderr: stderr_state,
            feeder,
            options,
            status: None,
            failure: None,
            pipe_mode,
            read_failure: None,
            _prefix: None,
        })
    }

    /// A handle with no process behind it; keeps a scoped prefix alive.
    pub(crate) fn placeholder(
        command_line: String,
        options: EffectiveOptions,
        guard: PrefixGuard,
    ) -> Self {
        Self {
            command_line,
            child: None,
            stdout: StreamState::Detached,
            stderr: StreamState::Detached,
            feeder: None,
            options,
            status: None,
            failure: None,
            pipe_mode: None,
            read_failure: None,
            _prefix: Some(guard),
        }
    }

    /// Block until the process exits, collect its output and check the
    /// status against the accepted codes.
    ///
    /// Idempotent: once terminated, returns the same outcome again without
    /// blocking. A placeholder handle returns `Ok(())` immediately.
    pub fn wait(&mut self) -> Result<()> {
        if let Some((kind, message)) = &self.read_failure {
            return Err(Error::Io {
                cmd: self.command_line.clone(),
                context: "reading output".to_string(),
                source: io::Error::new(*kind, message.clone()),
            });
        }
        if self.status.is_none() && self.child.is_some() {
            let stdout = self.stdout.take_pending();
            let stderr = self.stderr.take_pending();
            let taken = (stdout.is_some(), stderr.is_some());
            let drained = io_adapters::drain(stdout, stderr);
            self.store_output(taken, drained)?;
            self.reap()?;
        }

        match &self.failure {
            Some(failure) => Err(failure.clone().into()),
            None => Ok(()),
        }
    }

    /// Record the result of draining the pipes taken out of `stdout`/`stderr`.
    /// A failure marks those streams unreadable for good.
    fn store_output(
        &mut self,
        taken: (bool, bool),
        drained: io::Result<(Option<Vec<u8>>, Option<Vec<u8>>)>,
    ) -> Result<()> {
        match drained {
            Ok((out, err)) => {
                if let Some(out) = out {
                    self.stdout = StreamState::Captured(out);
                }
                if let Some(err) = err {
                    self.stderr = StreamState::Captured(err);
                }
                Ok(())
            }
            Err(source) => {
                let message = source.to_string();
                if taken.0 {
                    self.stdout = StreamState::Unreadable(message.clone());
                }
                if taken.1 {
                    self.stderr = StreamState::Unreadable(message.clone());
                }
                self.read_failure = Some((source.kind(), message));
                Err(Error::Io {
                    cmd: self.command_line.clone(),
                    context: "reading output".to_string(),
                    source,
                })
            }
        }
    }

    /// Wait for the child, join the stdin writer and classify the status.
    fn reap(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let exit_status = child.wait().map_err(|source| Error::Io {
            cmd: self.command_line.clone(),
            context: "waiting for exit".to_string(),
            source,
        })?;
        if let Some(feeder) = self.feeder.take() {
            let fed = feeder
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            fed.map_err(|source| Error::Io {
                cmd: self.command_line.clone(),
                context: "writing stdin".to_string(),
                source,
            })?;
        }

        let code = status_code(exit_status);
        self.status = Some(code);
        debug!(command = %self.command_line, status = code, "terminated");

        if !self.options.ok_codes.contains(code) {
            self.failure = Some(ExitStatusError::new(
                self.command_line.clone(),
                code,
                (self.stdout.captured().map(<[u8]>::to_vec), self.stdout.note()),
                (self.stderr.captured().map(<[u8]>::to_vec), self.stderr.note()),
                self.options.clone(),
            ));
        }
        Ok(())
    }

    /// True once the process has been waited on.
    pub fn is_terminated(&self) -> bool {
        self.status.is_some()
    }

    /// The exit status, once terminated.
    pub fn exit_code(&self) -> Option<ExitCode> {
        self.status
    }

    /// The command line that was run (or registered, for a placeholder).
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// The options this invocation ran with, after layering.
    pub fn options(&self) -> &EffectiveOptions {
        &self.options
    }

    /// Whether `invoke` returned without waiting.
    pub fn is_background(&self) -> bool {
        self.options.background
    }

    /// `Some` when this invocation was fed by another command.
    pub fn pipe_mode(&self) -> Option<PipeMode> {
        self.pipe_mode
    }

    /// OS process id; `None` for a scoped-prefix placeholder.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn stream(&mut self, name: StreamName) -> Result<&[u8]> {
        self.wait()?;
        let state = match name {
            StreamName::Stdout => &self.stdout,
            StreamName::Stderr => &self.stderr,
        };
        match state {
            StreamState::Captured(data) => Ok(data),
            other => Err(Error::NotCaptured {
                cmd: self.command_line.clone(),
                stream: name,
                reason: other.not_captured_reason(),
            }),
        }
    }

    /// Captured stdout bytes; waits first if needed.
    pub fn stdout_bytes(&mut self) -> Result<&[u8]> {
        self.stream(StreamName::Stdout)
    }

    /// Captured stderr bytes; waits first if needed.
    pub fn stderr_bytes(&mut self) -> Result<&[u8]> {
        self.stream(StreamName::Stderr)
    }

    /// Captured stdout decoded as UTF-8 (invalid sequences replaced).
    pub fn stdout(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.stdout_bytes()?).into_owned())
    }

    /// Captured stderr decoded as UTF-8 (invalid sequences replaced).
    pub fn stderr(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.stderr_bytes()?).into_owned())
    }

    /// The output text, the same as [`stdout`](Self::stdout).
    pub fn text(&mut self) -> Result<String> {
        self.stdout()
    }

    /// Parse the trimmed output as an integer.
    pub fn as_int(&mut self) -> Result<i64> {
        let text = self.stdout()?;
        text.trim().parse::<i64>().map_err(|_| Error::Conversion {
            cmd: self.command_line.clone(),
            target: "integer",
            text,
        })
    }

    /// Parse the trimmed output as a float.
    pub fn as_float(&mut self) -> Result<f64> {
        let text = self.stdout()?;
        text.trim().parse::<f64>().map_err(|_| Error::Conversion {
            cmd: self.command_line.clone(),
            target: "float",
            text,
        })
    }

    /// Substring test against the decoded output.
    pub fn contains(&mut self, needle: &str) -> Result<bool> {
        Ok(self.stdout()?.contains(needle))
    }

    /// Length of the decoded stdout, in bytes.
    pub fn output_len(&mut self) -> Result<usize> {
        Ok(self.stdout()?.len())
    }

    /// Compare the stdout text of two handles, waiting on both first.
    ///
    /// This is the comparison to use for background handles; `==` never
    /// waits and so treats unfinished handles as unequal.
    pub fn same_output(&mut self, other: &mut Self) -> Result<bool> {
        let mine = self.stdout()?;
        Ok(mine == other.stdout()?)
    }

    /// Hand this process's stdout pipe to a downstream process. Only possible
    /// while the output is still unread.
    pub(crate) fn take_stdout_pipe(&mut self) -> Option<PipeReader> {
        if self.is_terminated() {
            return None;
        }
        match std::mem::replace(&mut self.stdout, StreamState::PipedAway) {
            StreamState::Pending(reader) => Some(reader),
            other => {
                self.stdout = other;
                None
            }
        }
    }

    fn live_child(&mut self) -> Result<Option<&mut Child>> {
        if self.is_terminated() {
            return Ok(None);
        }
        match self.child.as_mut() {
            Some(child) => Ok(Some(child)),
            None => Err(Error::Io {
                cmd: self.command_line.clone(),
                context: "signalling".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no process attached"),
            }),
        }
    }

    /// Forcefully kill the process (SIGKILL on unix). Does not wait.
    pub fn kill(&mut self) -> Result<()> {
        let cmd = self.command_line.clone();
        if let Some(child) = self.live_child()? {
            child.kill().map_err(|source| Error::Io {
                cmd,
                context: "killing".to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Ask the process to stop with SIGTERM. Does not wait.
    #[cfg(unix)]
    pub fn terminate(&mut self) -> Result<()> {
        self.send_signal(libc::SIGTERM)
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> Result<()> {
        self.kill()
    }

    /// Deliver an arbitrary signal. Fire-and-forget; call `wait` afterwards.
    /// A no-op once the process has been waited on.
    #[cfg(unix)]
    pub fn send_signal(&mut self, signal: i32) -> Result<()> {
        let cmd = self.command_line.clone();
        if let Some(child) = self.live_child()? {
            let pid = child.id() as libc::pid_t;
            // SAFETY: `pid` is our own un-reaped child, so it cannot have been recycled.
            let rc = unsafe { libc::kill(pid, signal) };
            if rc != 0 {
                return Err(Error::Io {
                    cmd,
                    context: format!("sending signal {}", signal),
                    source: io::Error::last_os_error(),
                });
            }
            debug!(pid, signal, "signal sent");
        }
        Ok(())
    }
}

impl Drop for RunningCommand {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        let Some(mut child) = self.child.take() else {
            return;
        };
        // Close our ends so a child blocked on a full pipe gets EPIPE.
        self.stdout = StreamState::Detached;
        self.stderr = StreamState::Detached;
        drop(child.stdin.take());
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        debug!(command = %self.command_line, pid = child.id(), "reaping abandoned process");
        std::thread::spawn(move || {
            let _ = child.wait();
        });
    }
}

/// `==` compares stdout that has already been captured and never waits: a
/// handle still running in the background (or one whose stdout went elsewhere)
/// is unequal to everything. Use [`RunningCommand::same_output`] to wait
/// and compare.
impl PartialEq for RunningCommand {
    fn eq(&self, other: &Self) -> bool {
        match (self.stdout.captured(), other.stdout.captured()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq<str> for RunningCommand {
    fn eq(&self, other: &str) -> bool {
        self.stdout.captured() == Some(other.as_bytes())
    }
}

impl PartialEq<&str> for RunningCommand {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_read_failure_is_reported_on_every_wait() {
        let options = EffectiveOptions {
            background: true,
            ..EffectiveOptions::default()
        };
        let argv = ["sh", "-c", "echo lost"].map(String::from).to_vec();
        let mut running = RunningCommand::spawn(argv, options, InputSource::Null, None).unwrap();

        let stdout = running.stdout.take_pending();
        let stderr = running.stderr.take_pending();
        assert!(stdout.is_some() && stderr.is_some());
        drop((stdout, stderr));

        let err = running
            .store_output((true, true), Err(io::Error::other("pipe went away")))
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));

        let again = running.wait().unwrap_err();
        assert!(again.to_string().contains("pipe went away"));
        assert!(!running.is_terminated());
        match running.stdout() {
            Err(Error::Io { context, .. }) => assert_eq!(context, "reading output"),
            other => panic!("expected the read failure again, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_stream_notes() {
        let state = StreamState::Unreadable("broken".to_string());
        assert_eq!(state.note(), "<read failed: broken>");
        assert!(state.captured().is_none());
        assert!(state.not_captured_reason().contains("broken"));
    }
}
