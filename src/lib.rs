//! Call external programs as if they were functions.
//!
//! A [`Command`] wraps a resolved executable. Invoking it compiles positional
//! and keyword [`Args`] into an argument vector (never through a shell),
//! spawns the process and returns a [`RunningCommand`] that owns the captured
//! output. Commands can be partially applied with [`Command::bake`], chained
//! with [`Command::pipe`], run in the background, and used as scoped prefixes
//! for other commands.
//!
//! Exit statuses outside the accepted set surface as [`Error::ExitStatus`];
//! each status code has one memoized [`ExitErrorKind`] identity (see
//! [`exit_error_kind`]).
//!
//! ```no_run
//! use shellcall::{Args, Command};
//! let echo = Command::create("echo")?;
//! let mut greeting = echo.invoke(Args::new().arg("piped data"))?;
//! let sed = Command::create("sed")?;
//! let mut out = sed.pipe(&mut greeting, Args::new().arg("s/^/received: /"))?;
//! assert_eq!(out.stdout()?, "received: piped data\n");
//! # Ok::<(), shellcall::Error>(())
//! ```

mod args;
mod command;
mod env;
mod error;
mod exit;
mod io_adapters;
mod options;
mod prefix;
mod registry;
mod running;

pub use args::{Arg, Args, KwValue, compile_args};
pub use command::Command;
pub use env::Environment;
pub use error::{Error, ExitStatusError, Result, StreamName, TRUNCATE_CAP};
pub use exit::{
    AcceptedCodes, ExitCode, ExitErrorKind, exit_error_kind, exit_error_kind_by_name, status_code,
};
pub use options::{CallOptions, EffectiveOptions, OutputTarget};
pub use prefix::{PrefixGuard, active_prefix};
pub use registry::{CommandRegistry, PathRegistry, find_command_path, resolve_program, which};
pub use running::{PipeMode, RunningCommand};
