use crate::env::Environment;
use crate::exit::AcceptedCodes;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

/// Where a redirected output stream goes.
///
/// Either way the output is not captured in memory.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Opened for writing when the process is spawned, created if missing, truncated.
    Path(PathBuf),
    /// An already-open writable file; the child writes to a duplicate of it.
    File(Arc<File>),
}

impl OutputTarget {
    /// Convert into a [`Stdio`] handle for `std::process::Command`.
    pub(crate) fn open(&self) -> io::Result<File> {
        match self {
            OutputTarget::Path(path) => File::create(path),
            OutputTarget::File(file) => file.try_clone(),
        }
    }

    pub(crate) fn stdio(&self) -> io::Result<Stdio> {
        self.open().map(Stdio::from)
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Path(path) => write!(f, "{}", path.display()),
            OutputTarget::File(file) => write!(f, "{:?}", file),
        }
    }
}

impl PartialEq for OutputTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (OutputTarget::Path(a), OutputTarget::Path(b)) => a == b,
            (OutputTarget::File(a), OutputTarget::File(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for OutputTarget {
    fn from(path: &str) -> Self {
        OutputTarget::Path(PathBuf::from(path))
    }
}

impl From<String> for OutputTarget {
    fn from(path: String) -> Self {
        OutputTarget::Path(PathBuf::from(path))
    }
}

impl From<&Path> for OutputTarget {
    fn from(path: &Path) -> Self {
        OutputTarget::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for OutputTarget {
    fn from(path: PathBuf) -> Self {
        OutputTarget::Path(path)
    }
}

impl From<File> for OutputTarget {
    fn from(file: File) -> Self {
        OutputTarget::File(Arc::new(file))
    }
}

impl From<Arc<File>> for OutputTarget {
    fn from(file: Arc<File>) -> Self {
        OutputTarget::File(file)
    }
}

/// Per-invocation configuration. Every field is optional so that layers can
/// be stacked: crate defaults, then baked options, then call-time options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOptions {
    /// Inherit the caller's stdout/stderr instead of capturing.
    pub foreground: Option<bool>,
    /// Spawn and return without waiting.
    pub background: Option<bool>,
    /// Do not run; prepend this command to every command invoked while the
    /// returned handle is alive.
    pub scoped_prefix: Option<bool>,
    pub stdout: Option<OutputTarget>,
    pub stderr: Option<OutputTarget>,
    /// stderr goes wherever stdout goes.
    pub merge_stderr: Option<bool>,
    /// Data written to the child's stdin.
    pub input: Option<Vec<u8>>,
    /// Replacement environment for the child.
    pub env: Option<Environment>,
    pub cwd: Option<PathBuf>,
    pub ok_codes: Option<AcceptedCodes>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `over` on top of `self`; fields set in `over` win.
    pub fn overlay(&self, over: &CallOptions) -> CallOptions {
        CallOptions {
            foreground: over.foreground.or(self.foreground),
            background: over.background.or(self.background),
            scoped_prefix: over.scoped_prefix.or(self.scoped_prefix),
            stdout: over.stdout.clone().or_else(|| self.stdout.clone()),
            stderr: over.stderr.clone().or_else(|| self.stderr.clone()),
            merge_stderr: over.merge_stderr.or(self.merge_stderr),
            input: over.input.clone().or_else(|| self.input.clone()),
            env: over.env.clone().or_else(|| self.env.clone()),
            cwd: over.cwd.clone().or_else(|| self.cwd.clone()),
            ok_codes: over.ok_codes.clone().or_else(|| self.ok_codes.clone()),
        }
    }

    /// Fill every unset field with the crate default.
    pub fn resolve(&self) -> EffectiveOptions {
        EffectiveOptions {
            foreground: self.foreground.unwrap_or(false),
            background: self.background.unwrap_or(false),
            scoped_prefix: self.scoped_prefix.unwrap_or(false),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            merge_stderr: self.merge_stderr.unwrap_or(false),
            input: self.input.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
            ok_codes: self.ok_codes.clone().unwrap_or_default(),
        }
    }
}

/// The concrete options a process was launched with.
///
/// `env: None` means the child inherited the caller's environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveOptions {
    pub foreground: bool,
    pub background: bool,
    pub scoped_prefix: bool,
    pub stdout: Option<OutputTarget>,
    pub stderr: Option<OutputTarget>,
    pub merge_stderr: bool,
    pub input: Option<Vec<u8>>,
    pub env: Option<Environment>,
    pub cwd: Option<PathBuf>,
    pub ok_codes: AcceptedCodes,
}

impl Default for EffectiveOptions {
    fn default() -> Self {
        CallOptions::default().resolve()
    }
}

impl fmt::Display for EffectiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ok_codes={}", self.ok_codes)?;
        if self.foreground {
            f.write_str(" foreground")?;
        }
        if self.background {
            f.write_str(" background")?;
        }
        if self.scoped_prefix {
            f.write_str(" scoped_prefix")?;
        }
        if let Some(out) = &self.stdout {
            write!(f, " stdout={}", out)?;
        }
        if let Some(err) = &self.stderr {
            write!(f, " stderr={}", err)?;
        }
        if self.merge_stderr {
            f.write_str(" merge_stderr")?;
        }
        if let Some(input) = &self.input {
            write!(f, " input=<{} bytes>", input.len())?;
        }
        if let Some(env) = &self.env {
            write!(f, " env=<{} vars>", env.len())?;
        }
        if let Some(cwd) = &self.cwd {
            write!(f, " cwd={}", cwd.display())?;
        }
        Ok(())
    }
}
