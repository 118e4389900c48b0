use anyhow::{Context, Result};
use argh::FromArgs;
use shellcall::{Args, Command, Error};
use std::io::Write;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Run an external program and report its captured output and exit status.
struct Cli {
    #[argh(switch)]
    /// let the program write straight to this terminal instead of capturing.
    fg: bool,

    #[argh(switch)]
    /// start the program in the background, then wait for it explicitly.
    bg: bool,

    #[argh(option)]
    /// exit status to accept as success; repeatable, defaults to 0.
    ok_code: Vec<i32>,

    #[argh(option)]
    /// write the program's stdout to this file.
    out: Option<String>,

    #[argh(option)]
    /// write the program's stderr to this file.
    err: Option<String>,

    #[argh(switch)]
    /// send stderr wherever stdout goes.
    err_to_out: bool,

    #[argh(option)]
    /// working directory for the program.
    cwd: Option<String>,

    #[argh(option)]
    /// text fed to the program's stdin.
    input: Option<String>,

    #[argh(positional)]
    /// program name or path.
    program: String,

    #[argh(positional, greedy)]
    /// arguments passed through unchanged.
    args: Vec<String>,
}

fn build_args(cli: &Cli) -> Args {
    let mut args = Args::new().args(cli.args.iter().map(String::as_str));
    if cli.fg {
        args = args.foreground();
    }
    if cli.bg {
        args = args.background();
    }
    if !cli.ok_code.is_empty() {
        args = args.ok_codes(cli.ok_code.clone());
    }
    if let Some(out) = &cli.out {
        args = args.stdout(out.as_str());
    }
    if let Some(err) = &cli.err {
        args = args.stderr(err.as_str());
    }
    if cli.err_to_out {
        args = args.merge_stderr();
    }
    if let Some(cwd) = &cli.cwd {
        args = args.cwd(cwd);
    }
    if let Some(input) = &cli.input {
        args = args.input(input.as_str());
    }
    args
}

/// Copy a captured stream to `sink`; streams that were not captured are skipped.
fn forward(captured: shellcall::Result<&[u8]>, sink: &mut dyn Write) -> Result<()> {
    match captured {
        Ok(data) => sink.write_all(data)?,
        Err(Error::NotCaptured { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    let command = Command::create(&cli.program)
        .with_context(|| format!("cannot run '{}'", cli.program))?;
    let mut running = command.invoke(build_args(&cli))?;
    if cli.bg {
        info!(pid = ?running.pid(), "started in background");
        running.wait()?;
    }
    forward(running.stdout_bytes(), &mut std::io::stdout())?;
    forward(running.stderr_bytes(), &mut std::io::stderr())?;
    Ok(running.exit_code().unwrap_or(0))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli: Cli = argh::from_env();
    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::ExitStatus(failure)) => {
                eprintln!("{}", failure);
                ExitCode::from(failure.code() as u8)
            }
            Some(Error::CommandNotFound(_)) => {
                eprintln!("shellcall: {:#}", e);
                ExitCode::from(127)
            }
            _ => {
                eprintln!("shellcall: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}
