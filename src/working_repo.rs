//! The working repo: the local fork that receives live commits, detects
//! which of them correspond to patch-repo entries, and drives the
//! save/restore/resolve/skip/abort/rollback lifecycle.

use crate::annotation;
use crate::error::{AmError, PlyError};
use crate::git_driver::{AmMode, AmOutcome, ConfigOp, GitDriver};
use crate::normalize;
use crate::patch_repo::{PatchRepo, PatchSource, SyncSummary};
use bstr::ByteSlice;
use camino::{Utf8Path, Utf8PathBuf};
use slog::{info, warn, Logger};
use std::collections::BTreeSet;
use std::fs;

/// How many unannotated commits to examine, walking backward from HEAD,
/// before concluding that no patches are applied at all. Tunable: see the
/// open design question on whether this heuristic should eventually be
/// replaced by recording the upstream boundary directly in the link
/// config. Both directions remain valid, so the bound stays a parameter.
pub const DEFAULT_NEW_UPPER_BOUND: usize = 50;

const PATCH_REPO_CONFIG_KEY: &str = "ply.patchrepo";
const CONFLICT_SENTINEL: &str = ".patch-conflict";
const RESTORE_STATS: &str = ".restore-stats";

pub struct WorkingRepo {
    path: Utf8PathBuf,
    git: GitDriver,
    logger: Logger,
    new_upper_bound: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoPatchesApplied,
    AllPatchesApplied,
    RestoreInProgress,
}

#[derive(Debug, Default, Clone, Copy)]
struct RestoreStats {
    updated: u32,
    removed: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RestoreReport {
    pub updated: u32,
    pub removed: u32,
}

impl WorkingRepo {
    pub fn new(path: impl Into<Utf8PathBuf>, logger: Logger) -> Self {
        let path = path.into();
        let git = GitDriver::new(path.clone(), logger.clone());
        WorkingRepo {
            path,
            git,
            logger,
            new_upper_bound: DEFAULT_NEW_UPPER_BOUND,
        }
    }

    pub fn with_new_upper_bound(mut self, bound: usize) -> Self {
        self.new_upper_bound = bound;
        self
    }

    pub fn git(&self) -> &GitDriver {
        &self.git
    }

    // --- link / unlink -----------------------------------------------

    pub fn linked_patch_repo(&self) -> Result<Option<Utf8PathBuf>, PlyError> {
        match self.git.config(ConfigOp::Get, PATCH_REPO_CONFIG_KEY, None) {
            Ok(value) => Ok(Some(Utf8PathBuf::from(value.trim()))),
            Err(_) => Ok(None),
        }
    }

    pub fn patch_repo(&self) -> Result<PatchRepo, PlyError> {
        let path = self
            .linked_patch_repo()?
            .ok_or(PlyError::NoLinkedPatchRepo)?;
        Ok(PatchRepo::new(path, self.logger.clone()))
    }

    pub fn link(&self, patch_repo_path: &Utf8Path) -> Result<(), PlyError> {
        if !patch_repo_path.exists() {
            return Err(PlyError::PathNotFound(patch_repo_path.to_path_buf()));
        }
        let canonical = canonicalize(patch_repo_path)?;
        if let Some(existing) = self.linked_patch_repo()? {
            let existing_canonical = canonicalize(&existing)?;
            return Err(if existing_canonical == canonical {
                PlyError::AlreadyLinkedToSamePatchRepo
            } else {
                PlyError::AlreadyLinkedToDifferentPatchRepo(existing)
            });
        }
        self.git
            .config(ConfigOp::Add, PATCH_REPO_CONFIG_KEY, Some(canonical.as_str()))?;
        info!(self.logger, "linked patch repo"; "path" => %canonical);
        Ok(())
    }

    pub fn unlink(&self) -> Result<(), PlyError> {
        if self.linked_patch_repo()?.is_none() {
            return Err(PlyError::NoLinkedPatchRepo);
        }
        self.git.config(ConfigOp::Unset, PATCH_REPO_CONFIG_KEY, None)?;
        Ok(())
    }

    // --- region detection ----------------------------------------------

    /// Applied patches in region A, newest first, as `(commit hash, patch
    /// name)` pairs. Walks backward from HEAD, stopping either at the
    /// first unannotated commit after at least one annotated commit was
    /// found, or after `new_upper_bound` unannotated commits with none
    /// found at all.
    pub fn applied_patches(&self) -> Result<Vec<(String, String)>, PlyError> {
        let mut out = Vec::new();
        let mut skip = 0usize;
        let mut unannotated_seen = 0usize;
        loop {
            let Some((hash, message)) = self.commit_at(skip)? else {
                break;
            };
            match annotation::patch_annotation(&message) {
                Some(name) => {
                    out.push((hash, name));
                    unannotated_seen = 0;
                }
                None => {
                    if !out.is_empty() {
                        break;
                    }
                    unannotated_seen += 1;
                    if unannotated_seen >= self.new_upper_bound {
                        break;
                    }
                }
            }
            skip += 1;
        }
        Ok(out)
    }

    fn commit_at(&self, skip: usize) -> Result<Option<(String, String)>, PlyError> {
        let combined = self.git.log(None, Some(1), skip, "%H%x01%B")?;
        if combined.trim().is_empty() {
            return Ok(None);
        }
        let (hash, message) = combined
            .split_once('\u{1}')
            .unwrap_or((combined.trim(), ""));
        Ok(Some((hash.trim().to_string(), message.to_string())))
    }

    /// The commit one step parent-ward of the oldest entry of region A —
    /// the upstream commit the applied series sits on top of.
    pub fn last_upstream_commit_hash(&self) -> Result<Option<String>, PlyError> {
        let applied = self.applied_patches()?;
        let hash = self.git.log(None, Some(1), applied.len(), "%H")?;
        let hash = hash.trim();
        Ok((!hash.is_empty()).then(|| hash.to_string()))
    }

    pub fn status(&self) -> Result<Status, PlyError> {
        if self.read_conflict_sentinel().is_some() {
            return Ok(Status::RestoreInProgress);
        }
        if self.applied_patches()?.is_empty() {
            Ok(Status::NoPatchesApplied)
        } else {
            Ok(Status::AllPatchesApplied)
        }
    }

    // --- save ------------------------------------------------------------

    pub fn save(&self, since: Option<&str>, prefix: Option<&str>) -> Result<SyncSummary, PlyError> {
        self.ensure_no_uncommitted_changes()?;
        let since_ref = match since {
            Some(reference) => reference.to_string(),
            None => self
                .last_upstream_commit_hash()?
                .ok_or(PlyError::NoPatchesApplied)?,
        };
        let parent_patch_name = self
            .git
            .log(Some(&since_ref), Some(1), 0, "%B")
            .ok()
            .and_then(|message| annotation::patch_annotation(&message));

        let generated = self.git.format_patch(&since_ref, true, true, true)?;
        let mut sources = Vec::with_capacity(generated.len());
        for file in &generated {
            let raw = fs::read(file)?;
            let raw_text = raw.to_str_lossy();
            let existing_name = annotation::patch_annotation(&raw_text);
            let normalized = normalize::normalize(&raw)?;
            let name = existing_name.unwrap_or_else(|| {
                let stripped = strip_numeric_prefix(file.file_name().unwrap_or(""));
                match prefix {
                    Some(prefix) => format!("{prefix}/{stripped}"),
                    None => stripped.to_string(),
                }
            });
            sources.push(PatchSource {
                name,
                normalized_body: normalized.to_str_lossy().into_owned(),
            });
            let _ = fs::remove_file(file);
        }

        let patch_repo = self.patch_repo()?;
        let summary = patch_repo.sync_patches(&sources, parent_patch_name.as_deref())?;

        self.git
            .reset(&format!("HEAD~{}", sources.len()), true)?;
        self.restore(false, None)?;
        Ok(summary)
    }

    // --- restore -----------------------------------------------------

    pub fn restore(
        &self,
        fetch_remotes: bool,
        commit_message: Option<&str>,
    ) -> Result<RestoreReport, PlyError> {
        self.ensure_git_config()?;
        self.ensure_not_rebasing()?;
        self.ensure_no_uncommitted_changes()?;
        if let Some(name) = self.read_conflict_sentinel() {
            return Err(PlyError::RestoreInProgress(name));
        }
        if fetch_remotes {
            self.git.fetch(true)?;
        }

        let patch_repo = self.patch_repo()?;
        let series = patch_repo.series()?;
        let mut applied_names: BTreeSet<String> = self
            .applied_patches()?
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        let mut stats = self.load_restore_stats();

        for name in &series {
            if applied_names.contains(name) {
                continue;
            }
            let patch_path = patch_repo.path().join(name);
            match self.git.am(&[patch_path.as_path()], AmMode::Apply { three_way: true }) {
                Ok(AmOutcome::CleanApply) => {
                    let head_message = self.git.log(None, Some(1), 0, "%B")?;
                    if annotation::patch_annotation(&head_message).is_none() {
                        let annotated = annotation::with_patch_annotation(&head_message, name);
                        self.git.commit(&annotated, true, false)?;
                    }
                    applied_names.insert(name.clone());
                }
                Ok(AmOutcome::AlreadyApplied) => {
                    patch_repo.remove_patch(name)?;
                    stats.removed += 1;
                    self.save_restore_stats(stats)?;
                }
                Err(cause @ AmError::DidNotApplyCleanly { .. }) => {
                    self.write_conflict_sentinel(name)?;
                    stats.updated += 1;
                    self.save_restore_stats(stats)?;
                    warn!(self.logger, "patch conflicted during restore"; "patch" => name);
                    return Err(cause.into());
                }
                Err(cause @ AmError::BlobSha1Invalid { .. }) => {
                    warn!(self.logger, "patch blob missing during restore, needs a fetch"; "patch" => name);
                    return Err(cause.into());
                }
            }
        }

        self.delete_restore_stats();
        self.finish_restore(&patch_repo, commit_message, stats)?;
        Ok(RestoreReport {
            updated: stats.updated,
            removed: stats.removed,
        })
    }

    fn finish_restore(
        &self,
        patch_repo: &PatchRepo,
        commit_message: Option<&str>,
        stats: RestoreStats,
    ) -> Result<(), PlyError> {
        if patch_repo.git().uncommitted_changes()? {
            let message = commit_message.map(String::from).unwrap_or_else(|| {
                format!(
                    "Refreshing patches: {} updated, {} removed",
                    stats.updated, stats.removed
                )
            });
            patch_repo.git().commit(&message, false, false)?;
        }
        if let Some(hash) = self.last_upstream_commit_hash()? {
            let head_message = patch_repo.git().log(None, Some(1), 0, "%B")?;
            if annotation::based_on_annotation(&head_message).as_deref() != Some(hash.as_str()) {
                let annotated = annotation::with_based_on_annotation(&head_message, &hash);
                patch_repo.git().commit(&annotated, true, false)?;
            }
        }
        Ok(())
    }

    // --- resolve / skip / abort ---------------------------------------

    pub fn resolve(&self) -> Result<RestoreReport, PlyError> {
        let conflicted = self
            .read_conflict_sentinel()
            .ok_or(PlyError::NothingToResolve)?;
        self.git.am(&[], AmMode::Resolved)?;

        let patch_repo = self.patch_repo()?;
        let series = patch_repo.series()?;
        let parent = series
            .iter()
            .position(|name| name == &conflicted)
            .and_then(|idx| idx.checked_sub(1))
            .map(|idx| series[idx].clone());

        let head_message = self.git.log(None, Some(1), 0, "%B")?;
        if annotation::patch_annotation(&head_message).is_none() {
            let annotated = annotation::with_patch_annotation(&head_message, &conflicted);
            self.git.commit(&annotated, true, false)?;
        }

        let refreshed = self.git.format_patch("HEAD^", true, true, true)?;
        let mut sources = Vec::with_capacity(refreshed.len());
        for file in &refreshed {
            let raw = fs::read(file)?;
            let normalized = normalize::normalize(&raw)?;
            sources.push(PatchSource {
                name: conflicted.clone(),
                normalized_body: normalized.to_str_lossy().into_owned(),
            });
            let _ = fs::remove_file(file);
        }
        patch_repo.sync_patches(&sources, parent.as_deref())?;

        self.clear_conflict_sentinel();
        self.restore(false, None)
    }

    pub fn skip(&self) -> Result<RestoreReport, PlyError> {
        let conflicted = self
            .read_conflict_sentinel()
            .ok_or(PlyError::NothingToResolve)?;
        self.git.am(&[], AmMode::Skip)?;
        self.patch_repo()?.remove_patch(&conflicted)?;
        self.clear_conflict_sentinel();
        self.restore(false, None)
    }

    pub fn abort(&self) -> Result<(), PlyError> {
        if self.read_conflict_sentinel().is_none() {
            return Err(PlyError::NothingToResolve);
        }
        let _ = self.git.am(&[], AmMode::Abort);
        self.delete_restore_stats();
        self.clear_conflict_sentinel();
        let applied = self.applied_patches()?;
        if !applied.is_empty() {
            if let Some(hash) = self.last_upstream_commit_hash()? {
                self.git.reset(&hash, true)?;
            }
        }
        Ok(())
    }

    // --- rollback -------------------------------------------------------

    pub fn rollback(&self, force: bool) -> Result<(), PlyError> {
        if !force {
            self.ensure_no_uncommitted_changes()?;
        }
        let applied = self.applied_patches()?;
        if applied.is_empty() {
            return if force { Ok(()) } else { Err(PlyError::NoPatchesApplied) };
        }
        let hash = self
            .last_upstream_commit_hash()?
            .expect("non-empty applied patches imply an upstream boundary");
        self.git.reset(&hash, true)?;
        Ok(())
    }

    // --- preconditions ----------------------------------------------

    fn ensure_no_uncommitted_changes(&self) -> Result<(), PlyError> {
        if self.git.uncommitted_changes()? {
            Err(PlyError::UncommittedChanges(self.path.clone()))
        } else {
            Ok(())
        }
    }

    fn ensure_not_rebasing(&self) -> Result<(), PlyError> {
        if self.git.rebase_in_progress() {
            Err(PlyError::RebaseInProgress(self.path.clone()))
        } else {
            Ok(())
        }
    }

    fn ensure_git_config(&self) -> Result<(), PlyError> {
        for key in ["user.name", "user.email"] {
            if self.git.config(ConfigOp::Get, key, None).is_err() {
                return Err(PlyError::GitConfigRequired);
            }
        }
        Ok(())
    }

    // --- sentinel / stats files ---------------------------------------

    fn conflict_sentinel_path(&self) -> Utf8PathBuf {
        self.path.join(CONFLICT_SENTINEL)
    }

    fn restore_stats_path(&self) -> Utf8PathBuf {
        self.path.join(RESTORE_STATS)
    }

    fn read_conflict_sentinel(&self) -> Option<String> {
        fs::read_to_string(self.conflict_sentinel_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn write_conflict_sentinel(&self, patch_name: &str) -> Result<(), PlyError> {
        fs::write(self.conflict_sentinel_path(), format!("{patch_name}\n"))?;
        Ok(())
    }

    fn clear_conflict_sentinel(&self) {
        let _ = fs::remove_file(self.conflict_sentinel_path());
    }

    fn load_restore_stats(&self) -> RestoreStats {
        fs::read_to_string(self.restore_stats_path())
            .ok()
            .and_then(|contents| {
                let mut parts = contents.split_whitespace();
                let updated = parts.next()?.parse().ok()?;
                let removed = parts.next()?.parse().ok()?;
                Some(RestoreStats { updated, removed })
            })
            .unwrap_or_default()
    }

    fn save_restore_stats(&self, stats: RestoreStats) -> Result<(), PlyError> {
        fs::write(
            self.restore_stats_path(),
            format!("{} {}\n", stats.updated, stats.removed),
        )?;
        Ok(())
    }

    fn delete_restore_stats(&self) {
        let _ = fs::remove_file(self.restore_stats_path());
    }
}

fn canonicalize(path: &Utf8Path) -> Result<Utf8PathBuf, PlyError> {
    let canonical = path
        .canonicalize_utf8()
        .map_err(|_| PlyError::PathNotFound(path.to_path_buf()))?;
    Ok(canonical)
}

/// Strip a `git format-patch`-style `NNNN-` numeric prefix, if present.
fn strip_numeric_prefix(file_name: &str) -> &str {
    let digits = file_name
        .as_bytes()
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits > 0 && file_name.as_bytes().get(digits) == Some(&b'-') {
        &file_name[digits + 1..]
    } else {
        file_name
    }
}
