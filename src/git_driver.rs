//! Thin, synchronous invoker of `git` subcommands.
//!
//! Every operation takes an explicit repository path instead of assuming
//! the process's current directory, so a single process can safely drive
//! a working repo and a patch repo at once.

use crate::error::{AmError, GitError};
use camino::{Utf8Path, Utf8PathBuf};
use slog::{debug, Logger};
use std::process::{Command, Output};

#[derive(Clone)]
pub struct GitDriver {
    repo_path: Utf8PathBuf,
    logger: Logger,
}

/// The mutually-exclusive modes of `git am`, replacing the boolean-kwarg
/// surface of the shell wrapper this is grounded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmMode {
    /// Apply the given patch files (three-way merge if `three_way` is set).
    Apply { three_way: bool },
    /// Continue an `am` after the user resolved a conflict by hand.
    Resolved,
    /// Skip the commit that's currently conflicting.
    Skip,
    /// Abort the in-progress `am`, restoring the pre-am state.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmOutcome {
    CleanApply,
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    None,
    Create,
    CreateForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOp {
    Get,
    Add,
    Unset,
}

impl GitDriver {
    pub fn new(repo_path: impl Into<Utf8PathBuf>, logger: Logger) -> Self {
        GitDriver {
            repo_path: repo_path.into(),
            logger,
        }
    }

    pub fn repo_path(&self) -> &Utf8Path {
        &self.repo_path
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(self.logger, "running git command"; "repo" => %self.repo_path, "args" => args.join(" "));
        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()
            .map_err(|cause| GitError::Spawn {
                repo: self.repo_path.clone(),
                args: args.join(" "),
                cause,
            })
    }

    /// Run a command, returning stdout as a UTF-8 string on a zero exit
    /// status and a [`GitError::NonZeroExit`] otherwise.
    fn run_checked(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(GitError::NonZeroExit {
                repo: self.repo_path.clone(),
                args: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| GitError::InvalidUtf8 {
            repo: self.repo_path.clone(),
            args: args.join(" "),
        })
    }

    pub fn add(&self, path: &str) -> Result<(), GitError> {
        self.run_checked(&["add", path]).map(drop)
    }

    pub fn rm(&self, path: &str, force: bool) -> Result<(), GitError> {
        let mut args = vec!["rm"];
        if force {
            args.push("--force");
        }
        args.push(path);
        self.run_checked(&args).map(drop)
    }

    pub fn commit(&self, message: &str, amend: bool, allow_empty: bool) -> Result<(), GitError> {
        let mut args = vec!["commit", "--message", message];
        if amend {
            args.push("--amend");
        }
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run_checked(&args).map(drop)
    }

    /// Invoke `git am`, classifying the failure modes the way the shell
    /// wrapper this is grounded on does: a stdout mention of "atch already
    /// applied" means the series entry is redundant, not broken, and a
    /// stderr mention of missing blob information means the local blob the
    /// three-way merge needs hasn't been fetched yet.
    pub fn am(&self, patch_paths: &[&Utf8Path], mode: AmMode) -> Result<AmOutcome, AmError> {
        let mut args = vec!["am"];
        match mode {
            AmMode::Apply { three_way } => {
                if three_way {
                    args.push("--3way");
                }
                for path in patch_paths {
                    args.push(path.as_str());
                }
            }
            AmMode::Resolved => args.push("--resolved"),
            AmMode::Skip => args.push("--skip"),
            AmMode::Abort => args.push("--abort"),
        }
        let output = self.run(&args).map_err(|cause| AmError::DidNotApplyCleanly {
            stderr: cause.to_string(),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        // `git am --3way` on an already-applied patch reconstructs the base,
        // finds no changes, prints this to stdout, and exits 0 — it's not a
        // conflict, so this check must run before the success early-return.
        if stdout.contains("atch already applied") {
            return Ok(AmOutcome::AlreadyApplied);
        }
        if output.status.success() {
            return Ok(AmOutcome::CleanApply);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("sha1 information is lacking or useless") {
            return Err(AmError::BlobSha1Invalid {
                stderr: stderr.into_owned(),
            });
        }
        Err(AmError::DidNotApplyCleanly {
            stderr: stderr.into_owned(),
        })
    }

    /// Run `git format-patch`, returning the generated file paths in the
    /// order git printed them (one per stdout line).
    pub fn format_patch(
        &self,
        since: &str,
        keep_subject: bool,
        no_numbered: bool,
        no_stat: bool,
    ) -> Result<Vec<Utf8PathBuf>, GitError> {
        let mut args = vec!["format-patch", since];
        if keep_subject {
            args.push("--keep-subject");
        }
        if no_numbered {
            args.push("--no-numbered");
        }
        if no_stat {
            args.push("--no-stat");
        }
        let stdout = self.run_checked(&args)?;
        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| self.repo_path.join(line))
            .collect())
    }

    pub fn log(
        &self,
        range: Option<&str>,
        count: Option<usize>,
        skip: usize,
        pretty: &str,
    ) -> Result<String, GitError> {
        let mut args = vec!["log".to_string(), format!("--pretty={pretty}")];
        if let Some(count) = count {
            args.push(format!("-n{count}"));
        }
        if skip > 0 {
            args.push(format!("--skip={skip}"));
        }
        if let Some(range) = range {
            args.push(range.to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)
    }

    pub fn reset(&self, reference: &str, hard: bool) -> Result<(), GitError> {
        let mut args = vec!["reset"];
        if hard {
            args.push("--hard");
        }
        args.push(reference);
        self.run_checked(&args).map(drop)
    }

    pub fn checkout(&self, branch: &str, create_mode: CreateMode) -> Result<(), GitError> {
        let mut args = vec!["checkout"];
        match create_mode {
            CreateMode::None => {}
            CreateMode::Create => args.push("-b"),
            CreateMode::CreateForce => args.push("-B"),
        }
        args.push(branch);
        self.run_checked(&args).map(drop)
    }

    pub fn fetch(&self, all: bool) -> Result<(), GitError> {
        let mut args = vec!["fetch"];
        if all {
            args.push("--all");
        }
        self.run_checked(&args).map(drop)
    }

    pub fn init(&self) -> Result<(), GitError> {
        self.run_checked(&["init", self.repo_path.as_str()])
            .map(drop)
    }

    pub fn clone_from(&self, src: &str) -> Result<(), GitError> {
        self.run_checked(&["clone", src, self.repo_path.as_str()])
            .map(drop)
    }

    pub fn config(&self, op: ConfigOp, key: &str, value: Option<&str>) -> Result<String, GitError> {
        let mut args = vec!["config"];
        match op {
            ConfigOp::Get => args.push(key),
            ConfigOp::Add => {
                args.push(key);
                args.push(value.expect("value required for ConfigOp::Add"));
            }
            ConfigOp::Unset => {
                args.push("--unset");
                args.push(key);
            }
        }
        self.run_checked(&args)
    }

    /// Paths (relative to the repo root) that differ between the index and
    /// `reference`.
    pub fn diff_index(&self, reference: &str, name_only: bool) -> Result<Vec<String>, GitError> {
        let mut args = vec!["diff-index"];
        if name_only {
            args.push("--name-only");
        }
        args.push(reference);
        let stdout = self.run_checked(&args)?;
        Ok(stdout.lines().map(String::from).collect())
    }

    pub fn rebase_in_progress(&self) -> bool {
        self.repo_path.join(".git").join("rebase-apply").exists()
    }

    pub fn uncommitted_changes(&self) -> Result<bool, GitError> {
        Ok(!self.diff_index("HEAD", true)?.is_empty())
    }
}
