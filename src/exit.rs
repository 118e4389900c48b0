//! Exit-status taxonomy.
//!
//! Every non-accepted exit status maps to an [`ExitErrorKind`] identity. The
//! lookup is memoized: asking twice for the same code yields the same
//! `&'static` value, so identities can be compared with `std::ptr::eq` as well
//! as with `==`.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::process::ExitStatus;
use std::sync::{Mutex, OnceLock};

/// Conventional process exit code type used by this crate.
pub type ExitCode = i32;

/// Identity of one concrete "exit-N" error.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ExitErrorKind {
    code: ExitCode,
    name: String,
}

impl ExitErrorKind {
    pub fn code(&self) -> ExitCode {
        self.code
    }

    /// `exit-N`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ExitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn kind_cache() -> &'static Mutex<HashMap<ExitCode, &'static ExitErrorKind>> {
    static CACHE: OnceLock<Mutex<HashMap<ExitCode, &'static ExitErrorKind>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Return the error identity for `code`, creating it on first use.
pub fn exit_error_kind(code: ExitCode) -> &'static ExitErrorKind {
    let mut cache = kind_cache()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *cache.entry(code).or_insert_with(|| {
        // One leaked allocation per distinct code.
        &*Box::leak(Box::new(ExitErrorKind {
            code,
            name: format!("exit-{}", code),
        }))
    })
}

/// Look an identity up by name. Accepts `exit-N` and the older
/// `ErrorReturnCode_N` spelling.
pub fn exit_error_kind_by_name(name: &str) -> Option<&'static ExitErrorKind> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| {
        Regex::new(r"^(?:exit-|ErrorReturnCode_)(-?\d+)$").expect("static regex is valid")
    });
    let caps = re.captures(name)?;
    let code = caps[1].parse::<ExitCode>().ok()?;
    Some(exit_error_kind(code))
}

/// The set of exit statuses treated as success for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedCodes(BTreeSet<ExitCode>);

impl AcceptedCodes {
    pub fn contains(&self, code: ExitCode) -> bool {
        self.0.contains(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = ExitCode> + '_ {
        self.0.iter().copied()
    }
}

impl Default for AcceptedCodes {
    fn default() -> Self {
        Self(BTreeSet::from([0]))
    }
}

impl From<ExitCode> for AcceptedCodes {
    fn from(code: ExitCode) -> Self {
        Self(BTreeSet::from([code]))
    }
}

impl From<&[ExitCode]> for AcceptedCodes {
    fn from(codes: &[ExitCode]) -> Self {
        Self(codes.iter().copied().collect())
    }
}

impl<const N: usize> From<[ExitCode; N]> for AcceptedCodes {
    fn from(codes: [ExitCode; N]) -> Self {
        Self(codes.into_iter().collect())
    }
}

impl From<Vec<ExitCode>> for AcceptedCodes {
    fn from(codes: Vec<ExitCode>) -> Self {
        Self(codes.into_iter().collect())
    }
}

impl From<BTreeSet<ExitCode>> for AcceptedCodes {
    fn from(codes: BTreeSet<ExitCode>) -> Self {
        Self(codes)
    }
}

impl fmt::Display for AcceptedCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", codes.join(", "))
    }
}

/// Collapse an OS exit status into one integer: the exit code, or
/// `128 + signal` for a process killed by a signal (`-1` if neither is known).
#[cfg(unix)]
pub fn status_code(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

/// Collapse an OS exit status into one integer (`-1` if there is no code).
#[cfg(not(unix))]
pub fn status_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_code_same_identity() {
        let a = exit_error_kind(2);
        let b = exit_error_kind(2);
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.name(), "exit-2");
        assert_eq!(a.code(), 2);
    }

    #[test]
    fn test_different_codes_distinct_identities() {
        let a = exit_error_kind(1);
        let b = exit_error_kind(3);
        assert!(!std::ptr::eq(a, b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_lookup_by_name() {
        assert!(std::ptr::eq(
            exit_error_kind_by_name("exit-7").unwrap(),
            exit_error_kind(7)
        ));
        assert!(std::ptr::eq(
            exit_error_kind_by_name("ErrorReturnCode_7").unwrap(),
            exit_error_kind(7)
        ));
        assert!(exit_error_kind_by_name("exit-").is_none());
        assert!(exit_error_kind_by_name("something-else").is_none());
    }

    #[test]
    fn test_accepted_codes_normalization() {
        assert!(AcceptedCodes::default().contains(0));
        assert!(!AcceptedCodes::default().contains(1));

        let single = AcceptedCodes::from(3);
        assert!(single.contains(3));
        assert!(!single.contains(0));

        let many = AcceptedCodes::from([0, 1, 2, 1]);
        assert_eq!(many.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(many.to_string(), "{0, 1, 2}");
    }

    #[test]
    #[cfg(unix)]
    fn test_status_code_from_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(status_code(ExitStatus::from_raw(9)), 128 + 9);
    }
}
