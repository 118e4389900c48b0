use crate::args::{Args, compile_args};
use crate::error::{Error, Result};
use crate::io_adapters::InputSource;
use crate::options::CallOptions;
use crate::prefix::{self, PrefixGuard};
use crate::registry::{CommandRegistry, PathRegistry};
use crate::running::{PipeMode, RunningCommand};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An external program plus everything baked into it so far.
///
/// A `Command` is immutable: [`bake`](Self::bake) returns a new, more
/// specialized command and leaves the receiver untouched.
///
/// Example
/// ```no_run
/// use shellcall::{Args, Command};
/// let ls = Command::create("ls")?.bake(Args::new().flag("l"));
/// let mut listing = ls.invoke(Args::new().arg("/tmp"))?;
/// println!("{}", listing.stdout()?);
/// # Ok::<(), shellcall::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    path: PathBuf,
    baked: Vec<String>,
    baked_options: CallOptions,
}

impl Command {
    /// Wrap an executable path as-is, without looking it up.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baked: Vec::new(),
            baked_options: CallOptions::default(),
        }
    }

    /// Resolve `name` on the current `PATH` (trying `a-b` for `a_b` too).
    pub fn create(name: &str) -> Result<Self> {
        Self::create_with(&PathRegistry::from_env(), name)
    }

    /// Resolve `name` through a custom registry.
    pub fn create_with(registry: &dyn CommandRegistry, name: &str) -> Result<Self> {
        registry
            .resolve(name)
            .map(Self::new)
            .ok_or_else(|| Error::CommandNotFound(name.to_string()))
    }

    /// The resolved executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tokens baked in so far, already compiled.
    pub fn baked_args(&self) -> &[String] {
        &self.baked
    }

    /// Options baked in so far; per-call options override them.
    pub fn baked_options(&self) -> &CallOptions {
        &self.baked_options
    }

    fn program(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Partially apply arguments and options.
    pub fn bake(&self, args: Args) -> Command {
        let program = self.program();
        let (positional, keyword, options) = args.into_parts();
        let mut baked = self.baked.clone();
        baked.extend(compile_args(&program, &positional, &keyword));
        Command {
            path: self.path.clone(),
            baked,
            baked_options: self.baked_options.overlay(&options),
        }
    }

    /// Run the command. Blocks until it exits unless the options ask for
    /// background mode; a non-accepted exit status is returned as
    /// [`Error::ExitStatus`].
    pub fn invoke(&self, args: Args) -> Result<RunningCommand> {
        self.launch(args, None)
    }

    /// Run with plain positional arguments.
    pub fn run<I, T>(&self, args: I) -> Result<RunningCommand>
    where
        I: IntoIterator<Item = T>,
        T: Into<crate::args::Arg>,
    {
        self.invoke(Args::new().args(args))
    }

    /// Run with `upstream`'s stdout as this command's stdin.
    ///
    /// If `upstream` is a background process whose stdout has not been read,
    /// the two are connected by a live pipe and this invocation runs in the
    /// background as well ([`PipeMode::Live`]). Otherwise `upstream` is waited
    /// on and its captured stdout is fed in full ([`PipeMode::Buffered`]).
    /// Explicit input data in `args` takes precedence and leaves `upstream`
    /// untouched.
    pub fn pipe(&self, upstream: &mut RunningCommand, args: Args) -> Result<RunningCommand> {
        let explicit_input = args.call_options().input.is_some() || self.baked_options.input.is_some();
        if explicit_input {
            warn!(
                upstream = %upstream.command_line(),
                "explicit input given; upstream output is not used"
            );
            return self.launch(args, None);
        }

        if upstream.is_background() {
            if let Some(reader) = upstream.take_stdout_pipe() {
                return self.launch(args, Some((InputSource::Pipe(reader), PipeMode::Live)));
            }
        }

        let data = upstream.stdout_bytes()?.to_vec();
        self.launch(args, Some((InputSource::Data(data), PipeMode::Buffered)))
    }

    /// Prepend this command's path to every command invoked until the guard
    /// is dropped.
    pub fn as_scoped_prefix(&self) -> PrefixGuard {
        prefix::push(vec![self.program()])
    }

    /// Run `body` with this command as a scoped prefix. The prefix is removed
    /// however `body` exits, including by panic.
    pub fn scoped<R>(&self, body: impl FnOnce() -> R) -> R {
        let _guard = self.as_scoped_prefix();
        body()
    }

    fn launch(
        &self,
        args: Args,
        upstream: Option<(InputSource, PipeMode)>,
    ) -> Result<RunningCommand> {
        let program = self.program();
        let (positional, keyword, call_options) = args.into_parts();
        let mut options = self.baked_options.overlay(&call_options).resolve();

        let mut own = vec![program.clone()];
        own.extend(self.baked.iter().cloned());
        own.extend(compile_args(&program, &positional, &keyword));

        if options.scoped_prefix {
            let command_line = own.join(" ");
            let guard = prefix::push(own);
            return Ok(RunningCommand::placeholder(command_line, options, guard));
        }

        let mut argv = prefix::active_prefix();
        argv.extend(own);

        let (input, pipe_mode) = match upstream {
            Some((source, mode)) => {
                if mode == PipeMode::Live {
                    options.background = true;
                }
                (source, Some(mode))
            }
            None => match &options.input {
                Some(data) => (InputSource::Data(data.clone()), None),
                None if options.foreground => (InputSource::Inherit, None),
                None => (InputSource::Null, None),
            },
        };

        let background = options.background;
        let mut running = RunningCommand::spawn(argv, options, input, pipe_mode)?;
        if !background {
            running.wait()?;
        } else {
            debug!(command = %running.command_line(), "left running in background");
        }
        Ok(running)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        for arg in &self.baked {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl PartialEq<str> for Command {
    fn eq(&self, other: &str) -> bool {
        self.to_string() == other
    }
}

impl PartialEq<&str> for Command {
    fn eq(&self, other: &&str) -> bool {
        self.to_string() == *other
    }
}

impl PartialEq<RunningCommand> for Command {
    /// True when `other`'s captured stdout equals this command's textual form.
    fn eq(&self, other: &RunningCommand) -> bool {
        *other == *self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::tests::serial;

    #[cfg(unix)]
    fn sh() -> Command {
        Command::create("sh").expect("sh on PATH")
    }

    #[test]
    fn test_create_missing_command() {
        let err = Command::create("this_command_does_not_exist_xyz").unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(ref name) if name == "this_command_does_not_exist_xyz"));
    }

    #[test]
    fn test_bake_does_not_mutate() {
        let base = Command::new("/usr/bin/ls");
        let baked = base.bake(Args::new().flag("l").kw("color", "never"));
        assert_eq!(base.to_string(), "/usr/bin/ls");
        assert_eq!(baked.to_string(), "/usr/bin/ls -l --color=never");
        assert_eq!(baked.baked_args(), ["-l", "--color=never"]);

        let twice = baked.bake(Args::new().arg("dir"));
        assert_eq!(twice, "/usr/bin/ls -l --color=never dir");
        assert_eq!(baked, "/usr/bin/ls -l --color=never");
    }

    #[test]
    fn test_bake_merges_options() {
        let base = Command::new("/bin/true").bake(Args::new().ok_codes(1).cwd("/tmp"));
        let more = base.bake(Args::new().ok_codes([0, 2]));
        assert_eq!(more.baked_options().cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(
            more.baked_options().ok_codes,
            Some(crate::exit::AcceptedCodes::from([0, 2]))
        );
        assert!(more.baked_args().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_invoke_captures_stdout() {
        let _lock = serial();
        let mut out = sh()
            .invoke(Args::new().arg("-c").arg("echo hello world"))
            .unwrap();
        assert!(out.is_terminated());
        assert_eq!(out.exit_code(), Some(0));
        assert_eq!(out.stdout().unwrap(), "hello world\n");
        assert_eq!(out.stderr().unwrap(), "");
    }

    #[test]
    #[cfg(unix)]
    fn test_bake_then_invoke_equals_single_invoke() {
        let _lock = serial();
        let printer = sh().bake(Args::new().arg("-c").arg("echo \"$@\"").arg("sh"));
        let mut baked = printer.bake(Args::new().arg("a")).invoke(Args::new().arg("b")).unwrap();
        let mut single = printer.invoke(Args::new().arg("a").arg("b")).unwrap();
        assert_eq!(baked.stdout().unwrap(), "a b\n");
        assert!(baked == single);
        assert_eq!(single.stdout().unwrap(), "a b\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_scoped_prefix_guard() {
        let _lock = serial();
        let env_cmd = Command::create("env").expect("env on PATH");
        let echo = Command::create("echo").expect("echo on PATH");
        let mut out = env_cmd.scoped(|| echo.invoke(Args::new().arg("inside")).unwrap());
        assert!(out.command_line().ends_with("echo inside"));
        assert!(out.command_line().contains("env "));
        assert_eq!(out.stdout().unwrap(), "inside\n");
        assert!(prefix::active_prefix().is_empty());

        let mut after = echo.invoke(Args::new().arg("outside")).unwrap();
        assert!(!after.command_line().contains("env "));
        assert_eq!(after.stdout().unwrap(), "outside\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_scoped_prefix_option_returns_placeholder() {
        let _lock = serial();
        let env_cmd = Command::create("env").expect("env on PATH");
        {
            let mut scope = env_cmd
                .invoke(Args::new().arg("FOO=bar").scoped_prefix())
                .unwrap();
            assert!(scope.pid().is_none());
            assert!(scope.wait().is_ok());
            assert!(matches!(scope.stdout(), Err(Error::NotCaptured { .. })));

            let mut out = sh()
                .invoke(Args::new().arg("-c").arg("echo $FOO"))
                .unwrap();
            assert_eq!(out.stdout().unwrap(), "bar\n");
        }
        assert!(prefix::active_prefix().is_empty());
    }

    #[test]
    fn test_display_and_equality() {
        let a = Command::new("/bin/echo").bake(Args::new().arg("x"));
        let b = Command::new("/bin/echo").bake(Args::new().arg("x"));
        assert_eq!(a, b);
        assert_eq!(a, "/bin/echo x");
        assert_ne!(a, Command::new("/bin/echo"));
    }
}
