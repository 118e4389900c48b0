use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves a bare program name to an executable path.
///
/// Implementations can use any strategy; [`PathRegistry`] searches `PATH`.
pub trait CommandRegistry {
    /// Return the path of the executable for `name`, or `None` if not found.
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// The default registry: searches a `PATH`-style list of directories.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    search_paths: OsString,
}

impl PathRegistry {
    pub fn new(search_paths: impl Into<OsString>) -> Self {
        Self {
            search_paths: search_paths.into(),
        }
    }

    /// Use the calling process's `PATH` as it is right now.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PATH").unwrap_or_default())
    }
}

impl CommandRegistry for PathRegistry {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        resolve_program(&self.search_paths, name)
    }
}

/// Locate `program` on the current `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    let search_paths = std::env::var_os("PATH").unwrap_or_default();
    find_command_path(&search_paths, Path::new(program))
}

/// Like [`which`], but if `name` contains underscores and is not found, also
/// try the hyphenated spelling (`apt_get` finds `apt-get`).
pub fn resolve_program(search_paths: &OsStr, name: &str) -> Option<PathBuf> {
    let found = find_command_path(search_paths, Path::new(name)).or_else(|| {
            if name.contains('_') {
                let hyphenated = name.replace('_', "-");
                find_command_path(search_paths, Path::new(&hyphenated))
            } else {
                None
            }
        });
    debug!(name = %name, resolved = ?found, "resolve program");
    found
}

/// Find the executable that `program` names.
///
/// A bare name (one path component, no separator) is looked up in each
/// directory of `search_paths` in order. Anything containing a separator,
/// such as `/usr/bin/env`, `bin/tool` or `./tool`, is taken as written
/// (relative to the current directory) and only checked for the execute bit.
/// The empty name never resolves.
pub fn find_command_path(search_paths: &OsStr, program: &Path) -> Option<PathBuf> {
    let mut components = program.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(Component::Normal(name)), None) => std::env::split_paths(search_paths)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate)),
        _ => is_executable(program).then(|| program.to_path_buf()),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
