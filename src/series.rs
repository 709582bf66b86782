//! The `series` file: an ordered, flat list of patch names with optional
//! recursive `-i <relpath>` includes.
//!
//! Mutation always goes through [`mutate`], which guarantees the file is
//! rewritten (and staged) on every exit path of the caller's closure,
//! including failure — a partially-applied in-memory mutation is never
//! silently dropped.

use crate::error::SeriesError;
use crate::git_driver::GitDriver;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

const INCLUDE_DIRECTIVE: &str = "-i ";

/// Read the flat (non-recursive) list of entries in `path`, skipping blank
/// lines. An include directive (`-i <relpath>`) is returned verbatim, not
/// expanded; use [`recursive_entries`] for the expanded view.
pub fn read_flat(path: &Utf8Path) -> Result<Vec<String>, SeriesError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn write_flat(path: &Utf8Path, entries: &[String]) -> Result<(), SeriesError> {
    let mut contents = String::new();
    for entry in entries {
        contents.push_str(entry);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Load the flat list at `path`, hand it to `f`, then rewrite (and stage
/// via `git`) the file from whatever `f` left in the list — whether or not
/// `f` itself returned an error.
pub fn mutate<T, E>(
    git: &GitDriver,
    path: &Utf8Path,
    f: impl FnOnce(&mut Vec<String>) -> Result<T, E>,
) -> Result<T, SeriesError>
where
    E: Into<SeriesError>,
{
    let mut entries = read_flat(path)?;
    let result = f(&mut entries);
    write_flat(path, &entries)?;
    if let Some(relative) = path.strip_prefix(git.repo_path()).ok() {
        git.add(relative.as_str())?;
    } else {
        git.add(path.as_str())?;
    }
    result.map_err(Into::into)
}

/// Depth-first, left-to-right expansion of `-i` includes rooted at `path`,
/// yielding patch names prefixed by the including file's directory.
pub fn recursive_entries(path: &Utf8Path) -> Result<Vec<String>, SeriesError> {
    let mut out = Vec::new();
    expand_into(path, &mut out)?;
    Ok(out)
}

fn expand_into(path: &Utf8Path, out: &mut Vec<String>) -> Result<(), SeriesError> {
    let dir = path.parent().map(Utf8Path::to_path_buf).unwrap_or_default();
    for entry in read_flat(path)? {
        if let Some(included) = entry.strip_prefix(INCLUDE_DIRECTIVE) {
            let child_path = join(&dir, included.trim());
            expand_into(&child_path, out)?;
        } else {
            out.push(join_name(&dir, &entry));
        }
    }
    Ok(())
}

fn join(dir: &Utf8Path, relative: &str) -> Utf8PathBuf {
    if dir.as_str().is_empty() {
        Utf8PathBuf::from(relative)
    } else {
        dir.join(relative)
    }
}

fn join_name(dir: &Utf8Path, name: &str) -> String {
    if dir.as_str().is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
