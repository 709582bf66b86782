//! The patch repo: a git checkout holding a `series` file and the mbox
//! patch files it orders, plus the bookkeeping operations that keep them
//! in sync with a working repo's history.

use crate::error::{GitError, PatchRepoError};
use crate::git_driver::GitDriver;
use crate::meaningful_diff::meaningful_diff;
use crate::series;
use camino::{Utf8Path, Utf8PathBuf};
use slog::{info, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

pub struct PatchRepo {
    path: Utf8PathBuf,
    git: GitDriver,
    logger: Logger,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug)]
pub enum CheckResult {
    Ok,
    Failed {
        missing: BTreeSet<String>,
        orphan: BTreeSet<String>,
    },
}

/// A freshly generated candidate patch, keyed by its intended series name.
pub struct PatchSource {
    pub name: String,
    pub normalized_body: String,
}

impl PatchRepo {
    pub fn new(path: impl Into<Utf8PathBuf>, logger: Logger) -> Self {
        let path = path.into();
        let git = GitDriver::new(path.clone(), logger.clone());
        PatchRepo { path, git, logger }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn git(&self) -> &GitDriver {
        &self.git
    }

    fn series_path(&self) -> Utf8PathBuf {
        self.path.join("series")
    }

    /// `git init` plus an empty, committed `series` file. Idempotent.
    pub fn initialize(&self) -> Result<(), PatchRepoError> {
        if !self.path.join(".git").exists() {
            self.git.init()?;
        }
        let series_path = self.series_path();
        if !series_path.exists() {
            fs::write(&series_path, "")?;
            self.git.add("series")?;
            self.git.commit("Ply init", false, false)?;
        }
        Ok(())
    }

    /// Every `*.patch` file under the repo, relative to its root, in an
    /// unspecified but stable order.
    pub fn patch_names(&self) -> Result<BTreeSet<String>, PatchRepoError> {
        let mut out = BTreeSet::new();
        walk_patch_files(&self.path, &self.path, &mut out)?;
        Ok(out)
    }

    /// The recursively expanded series.
    pub fn series(&self) -> Result<Vec<String>, PatchRepoError> {
        Ok(series::recursive_entries(&self.series_path())?)
    }

    pub fn check(&self) -> Result<CheckResult, PatchRepoError> {
        let series: BTreeSet<String> = self.series()?.into_iter().collect();
        let files = self.patch_names()?;
        let missing: BTreeSet<String> = series.difference(&files).cloned().collect();
        let orphan: BTreeSet<String> = files.difference(&series).cloned().collect();
        if missing.is_empty() && orphan.is_empty() {
            Ok(CheckResult::Ok)
        } else {
            Ok(CheckResult::Failed { missing, orphan })
        }
    }

    /// Reconcile a freshly produced set of patches with the stored series,
    /// classifying each into added/updated/skipped/removed and splicing
    /// the added/updated names into the series immediately after
    /// `parent_patch_name` (or at the front, if `None`).
    ///
    /// Entries at or before `parent_patch_name` in the existing series are
    /// always skipped unconditionally: they belong to the part of history
    /// that isn't being resaved.
    pub fn sync_patches(
        &self,
        sources: &[PatchSource],
        parent_patch_name: Option<&str>,
    ) -> Result<SyncSummary, PatchRepoError> {
        let mut summary = SyncSummary::default();
        let existing_series = self.series()?;
        let frozen_prefix: BTreeSet<&str> = match parent_patch_name {
            Some(parent) => existing_series
                .iter()
                .take_while(|name| name.as_str() != parent)
                .chain(std::iter::once(&parent.to_string()))
                .map(String::as_str)
                .collect(),
            None => BTreeSet::new(),
        };
        let source_names: BTreeSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();

        let mut new_names = Vec::new();
        for source in sources {
            let file_path = self.path.join(&source.name);
            if !file_path.exists() {
                summary.added.push(source.name.clone());
                write_patch_file(&file_path, &source.normalized_body)?;
                self.git.add(&source.name)?;
                new_names.push(source.name.clone());
                continue;
            }
            let stored = fs::read_to_string(&file_path)?;
            if meaningful_diff(&stored, &source.normalized_body) {
                summary.updated.push(source.name.clone());
                write_patch_file(&file_path, &source.normalized_body)?;
                self.git.add(&source.name)?;
                new_names.push(source.name.clone());
            } else {
                summary.skipped.push(source.name.clone());
            }
        }

        for name in &existing_series {
            if frozen_prefix.contains(name.as_str()) || source_names.contains(name.as_str()) {
                continue;
            }
            summary.removed.push(name.clone());
        }
        for name in &summary.removed {
            self.remove_patch_file(name)?;
        }

        series::mutate::<(), crate::error::SeriesError>(&self.git, &self.series_path(), |entries| {
            entries.retain(|name| !new_names.contains(name) && !summary.removed.contains(name));
            let insert_at = match parent_patch_name {
                Some(parent) => entries
                    .iter()
                    .position(|name| name == parent)
                    .map(|idx| idx + 1)
                    .unwrap_or(0),
                None => 0,
            };
            entries.splice(insert_at..insert_at, new_names.iter().cloned());
            Ok(())
        })?;

        info!(self.logger, "synced patches";
            "added" => summary.added.len(), "updated" => summary.updated.len(),
            "skipped" => summary.skipped.len(), "removed" => summary.removed.len());
        Ok(summary)
    }

    pub fn remove_patch(&self, name: &str) -> Result<(), PatchRepoError> {
        self.remove_patch_file(name)?;
        series::mutate::<(), crate::error::SeriesError>(&self.git, &self.series_path(), |entries| {
            entries.retain(|entry| entry != name);
            Ok(())
        })?;
        Ok(())
    }

    fn remove_patch_file(&self, name: &str) -> Result<(), PatchRepoError> {
        let file_path = self.path.join(name);
        if file_path.exists() {
            self.git.rm(name, true)?;
        }
        Ok(())
    }

    /// `file -> [patches touching it]`, in series order, derived from each
    /// patch's `--- a/`/`+++ b/` lines.
    pub fn patch_dependencies(&self) -> Result<BTreeMap<String, Vec<String>>, PatchRepoError> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.series()? {
            let body = fs::read_to_string(self.path.join(&name))?;
            for file in touched_files(&body) {
                map.entry(file).or_default().push(name.clone());
            }
        }
        Ok(map)
    }

    /// A DOT digraph: an edge `dependent -> parent` for every pair of
    /// series-ordered patches that touch a common file.
    pub fn patch_dependency_dot_graph(&self) -> Result<String, PatchRepoError> {
        let deps = self.patch_dependencies()?;
        let mut edges = BTreeSet::new();
        for patches in deps.values() {
            for window in patches.windows(2) {
                if let [parent, dependent] = window {
                    edges.insert((dependent.clone(), parent.clone()));
                }
            }
        }
        let mut out = String::from("digraph patches {\n");
        for (dependent, parent) in edges {
            out.push_str(&format!("    \"{dependent}\" -> \"{parent}\";\n"));
        }
        out.push_str("}\n");
        Ok(out)
    }
}

fn write_patch_file(path: &Utf8Path, body: &str) -> Result<(), GitError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, body).map_err(|cause| GitError::Spawn {
        repo: path.to_path_buf(),
        args: "write patch file".to_string(),
        cause,
    })
}

fn walk_patch_files(
    root: &Utf8Path,
    dir: &Utf8Path,
    out: &mut BTreeSet<String>,
) -> Result<(), PatchRepoError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| PatchRepoError::InvalidPatchName(path))?;
        if path.file_name() == Some(".git") {
            continue;
        }
        if entry.file_type()?.is_dir() {
            walk_patch_files(root, &path, out)?;
        } else if path.extension() == Some("patch") {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.insert(relative.as_str().to_string());
        }
    }
    Ok(())
}

fn touched_files(patch_body: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    for line in patch_body.lines() {
        if let Some(path) = line.strip_prefix("--- a/") {
            files.insert(path.to_string());
        } else if let Some(path) = line.strip_prefix("+++ b/") {
            files.insert(path.to_string());
        }
    }
    files
}
