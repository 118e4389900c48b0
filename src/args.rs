use crate::options::{CallOptions, OutputTarget};
use crate::env::Environment;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A positional argument: either a single value or a sequence that is
/// flattened in place when the argument vector is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    One(String),
    Many(Vec<String>),
}

macro_rules! arg_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Arg {
                fn from(value: $t) -> Self {
                    Arg::One(value.to_string())
                }
            }

            impl From<$t> for KwValue {
                fn from(value: $t) -> Self {
                    KwValue::Text(value.to_string())
                }
            }
        )*
    };
}

arg_from_display!(&str, String, &String, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::One(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Arg {
    fn from(value: PathBuf) -> Self {
        Arg::from(value.as_path())
    }
}

impl<T: ToString> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Arg::Many(values.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString> From<&[T]> for Arg {
    fn from(values: &[T]) -> Self {
        Arg::Many(values.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for Arg {
    fn from(values: [T; N]) -> Self {
        Arg::Many(values.iter().map(ToString::to_string).collect())
    }
}

/// Value of a keyword argument.
///
/// `Flag` is the boolean `true` case: the flag is emitted without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KwValue {
    Flag,
    Text(String),
}

impl From<bool> for KwValue {
    fn from(value: bool) -> Self {
        if value {
            KwValue::Flag
        } else {
            KwValue::Text(value.to_string())
        }
    }
}

impl From<&Path> for KwValue {
    fn from(value: &Path) -> Self {
        KwValue::Text(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for KwValue {
    fn from(value: PathBuf) -> Self {
        KwValue::from(value.as_path())
    }
}

/// Everything passed to a single `bake` or `invoke`: positional values,
/// keyword flags in insertion order and the call options.
///
/// Call options never reach the argument compiler.
///
/// ```
/// use shellcall::Args;
/// let args = Args::new().arg("-l").kw("color", "never").kw("a", true);
/// assert_eq!(args.compile("ls"), vec!["-l", "--color=never", "-a"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Arg>,
    keyword: Vec<(String, KwValue)>,
    options: CallOptions,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one positional value (a sequence is flattened when compiled).
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Append several scalar positional values in order.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a keyword entry. Later entries with the same name are kept,
    /// they render as repeated flags.
    pub fn kw(mut self, name: impl Into<String>, value: impl Into<KwValue>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    /// Shorthand for `kw(name, true)`.
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.kw(name, KwValue::Flag)
    }

    /// Replace the call options wholesale.
    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Let the child use this process's stdin, stdout and stderr directly.
    pub fn foreground(mut self) -> Self {
        self.options.foreground = Some(true);
        self
    }

    /// Return from `invoke` right after spawning; call `wait` later.
    pub fn background(mut self) -> Self {
        self.options.background = Some(true);
        self
    }

    /// Do not run; prepend this command line to later invocations while the
    /// returned handle lives.
    pub fn scoped_prefix(mut self) -> Self {
        self.options.scoped_prefix = Some(true);
        self
    }

    /// Send stdout to a file path or an already open file.
    pub fn stdout(mut self, target: impl Into<OutputTarget>) -> Self {
        self.options.stdout = Some(target.into());
        self
    }

    /// Send stderr to a file path or an already open file.
    pub fn stderr(mut self, target: impl Into<OutputTarget>) -> Self {
        self.options.stderr = Some(target.into());
        self
    }

    /// Send stderr wherever stdout goes.
    pub fn merge_stderr(mut self) -> Self {
        self.options.merge_stderr = Some(true);
        self
    }

    /// Bytes written to the child's stdin.
    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.options.input = Some(data.into());
        self
    }

    /// Replace the child's environment entirely.
    pub fn env(mut self, env: Environment) -> Self {
        self.options.env = Some(env);
        self
    }

    /// Working directory for the child.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(dir.into());
        self
    }

    /// Exit statuses that count as success (default `{0}`).
    pub fn ok_codes(mut self, codes: impl Into<crate::exit::AcceptedCodes>) -> Self {
        self.options.ok_codes = Some(codes.into());
        self
    }

    /// Options set so far on this call.
    pub fn call_options(&self) -> &CallOptions {
        &self.options
    }

    pub(crate) fn into_parts(self) -> (Vec<Arg>, Vec<(String, KwValue)>, CallOptions) {
        (self.positional, self.keyword, self.options)
    }

    /// Render the positional and keyword parts into argument tokens.
    /// `program` is only used for the empty-sequence diagnostic.
    pub fn compile(&self, program: &str) -> Vec<String> {
        compile_args(program, &self.positional, &self.keyword)
    }
}

/// Turn positional and keyword arguments into an argument vector.
///
/// Positional values come first, in order, with sequences flattened one
/// level. Keyword entries follow in insertion order: a one-letter name becomes
/// `-k value` (or just `-k` for a flag), a longer name becomes `--long-name=value`
/// (or `--long-name`) with underscores rewritten to hyphens.
pub fn compile_args(program: &str, positional: &[Arg], keyword: &[(String, KwValue)]) -> Vec<String> {
    let mut tokens = Vec::new();

    for arg in positional {
        match arg {
            Arg::One(value) => tokens.push(value.clone()),
            Arg::Many(values) => {
                if values.is_empty() {
                    warn!(
                        program = %program,
                        "empty list passed as an argument; it contributes no tokens"
                    );
                }
                tokens.extend(values.iter().cloned());
            }
        }
    }

    for (name, value) in keyword {
        if name.chars().count() == 1 {
            tokens.push(format!("-{}", name));
            if let KwValue::Text(text) = value {
                tokens.push(text.clone());
            }
        } else {
            let name = name.replace('_', "-");
            match value {
                KwValue::Flag => tokens.push(format!("--{}", name)),
                KwValue::Text(text) => tokens.push(format!("--{}={}", name, text)),
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(args: Args) -> Vec<String> {
        args.compile("prog")
    }

    #[test]
    fn test_positional_order_and_flattening() {
        let tokens = compile(
            Args::new()
                .arg("a")
                .arg(vec!["b", "c"])
                .arg(42)
                .arg(["d"])
                .arg(1.5),
        );
        assert_eq!(tokens, vec!["a", "b", "c", "42", "d", "1.5"]);
    }

    #[test]
    fn test_empty_sequence_is_not_fatal() {
        let empty: Vec<String> = Vec::new();
        let tokens = compile(Args::new().arg("x").arg(empty).arg("y"));
        assert_eq!(tokens, vec!["x", "y"]);
    }

    #[test]
    fn test_short_flags() {
        let tokens = compile(Args::new().kw("d", "\t").kw("v", true).kw("n", 3));
        assert_eq!(tokens, vec!["-d", "\t", "-v", "-n", "3"]);
    }

    #[test]
    fn test_short_flag_false_keeps_value_token() {
        let tokens = compile(Args::new().kw("v", false));
        assert_eq!(tokens, vec!["-v", "false"]);
    }

    #[test]
    fn test_long_flags_rewrite_underscores() {
        let tokens = compile(
            Args::new()
                .kw("no_create_home", true)
                .kw("max_depth", 2)
                .kw("name", "test"),
        );
        assert_eq!(tokens, vec!["--no-create-home", "--max-depth=2", "--name=test"]);
    }

    #[test]
    fn test_keywords_follow_positionals() {
        let tokens = compile(Args::new().flag("l").arg("dir"));
        assert_eq!(tokens, vec!["dir", "-l"]);
    }

    #[test]
    fn test_options_do_not_render() {
        let tokens = compile(Args::new().arg("x").background().ok_codes(1).input("data"));
        assert_eq!(tokens, vec!["x"]);
    }

    #[test]
    fn test_values_are_not_escaped() {
        let tokens = compile(Args::new().arg("a b; rm -rf /").kw("pattern", "$HOME *"));
        assert_eq!(tokens, vec!["a b; rm -rf /", "--pattern=$HOME *"]);
    }
}
