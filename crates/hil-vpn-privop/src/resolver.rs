//! Locating external executables without trusting the caller
//!
//! Executables are only ever run from a fixed set of system directories,
//! which on a normal host are writable by root alone. A lookup that lands
//! anywhere else is an error and the program is never started.

use std::env;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The search path the helper runs with, whatever its caller set
pub const SAFE_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";

/// Directories an executable may be resolved to
pub const ALLOWED_DIRS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/local/bin",
    "/usr/local/sbin",
];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid executable name {0:?}")]
    InvalidName(String),

    #[error("could not find {0:?} executable")]
    NotFound(String),

    #[error("{name:?} executable is in a non-standard location: {}", .path.display())]
    Disallowed { name: String, path: PathBuf },
}

/// Find `name` on `$PATH` and check it lives in an allowed directory
pub fn resolve(name: &str) -> Result<PathBuf, ResolveError> {
    let search = env::var_os("PATH").unwrap_or_else(|| OsString::from(SAFE_PATH));
    resolve_in(name, env::split_paths(&search))
}

/// Find `name` in the first of `dirs` that holds it, then apply the
/// allow-list to the result.
pub fn resolve_in<I>(name: &str, dirs: I) -> Result<PathBuf, ResolveError>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ResolveError::InvalidName(name.to_string()));
    }

    let path = dirs
        .into_iter()
        .map(|dir| dir.as_ref().join(name))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;

    if !is_allowed(&path, name) {
        return Err(ResolveError::Disallowed {
            name: name.to_string(),
            path,
        });
    }
    Ok(path)
}

/// `path` is exactly `<allowed dir>/<name>`
pub fn is_allowed(path: &Path, name: &str) -> bool {
    ALLOWED_DIRS
        .iter()
        .any(|dir| path == Path::new(dir).join(name))
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
