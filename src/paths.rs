//! Path normalization used to compare report entries with editor paths.

use std::path::{Component, Path, PathBuf};

/// Normalize a path for comparison: absolute, `.`/`..` resolved, symlinks
/// resolved as far as the path exists, and case-folded on platforms whose
/// default filesystems are case-insensitive.
///
/// Never fails. Parts of the path that do not exist keep their lexical form.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = absolute(path);
    let lexical = lexical_normalize(&absolute);
    case_fold(resolve_existing_prefix(&lexical))
}

/// Join a relative path onto the current directory. If the current directory
/// cannot be read the path is returned unchanged.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Resolve `.` and `..` without touching the filesystem. `..` at the root
/// stays at the root.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest prefix of `path` that exists and re-append the
/// remainder.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let mut missing = Vec::new();
    let mut current = path;
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_os_string());
        }
        if let Ok(mut resolved) = std::fs::canonicalize(parent) {
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
        current = parent;
    }
    path.to_path_buf()
}

#[cfg(any(windows, target_os = "macos"))]
fn case_fold(path: PathBuf) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn case_fold(path: PathBuf) -> PathBuf {
    path
}
