use std::collections::BTreeMap;
use std::env as stdenv;

/// A complete set of environment variables handed to a child process.
///
/// When passed as a call option it *replaces* the child's environment; to add
/// a single variable, start from [`Environment::capture`] and modify the copy.
///
/// ```
/// use shellcall::Environment;
/// let env = Environment::capture().with_var("GREETING", "hi");
/// assert_eq!(env.get_var("GREETING").as_deref(), Some("hi"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the calling process's current environment.
    pub fn capture() -> Self {
        Self {
            vars: stdenv::vars().collect(),
        }
    }

    /// An environment with no variables at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn remove_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn with_var(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.set_var(key, val);
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
