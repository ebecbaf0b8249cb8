//! Track discovery on disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extensions recognised as single-source tracks.
pub const TRACK_EXTENSIONS: &[&str] = &["wav"];

/// Sorted list of files under `directory` whose extension matches one of
/// `extensions`, compared case-insensitively.
///
/// A missing directory yields an empty list; other read failures are
/// returned.
pub fn find_files(directory: &Path, extensions: &[&str], recurse: bool) -> crate::Result<Vec<PathBuf>> {
    let wanted: BTreeSet<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut found = BTreeSet::new();
    if directory.is_dir() {
        collect(directory, &wanted, recurse, &mut found)?;
    }
    Ok(found.into_iter().collect())
}

/// `~/` at the start of a path is replaced with `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

fn matches_extension(path: &Path, wanted: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| wanted.contains(&e.to_lowercase()))
}

fn collect(
    dir: &Path,
    wanted: &BTreeSet<String>,
    recurse: bool,
    out: &mut BTreeSet<PathBuf>,
) -> crate::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recurse {
                collect(&path, wanted, recurse, out)?;
            }
        } else if matches_extension(&path, wanted) {
            out.insert(path);
        }
    }
    Ok(())
}
