//! The distinguished error kinds shared across the crate.

use camino::Utf8PathBuf;

/// Failure classification for `GitDriver::am`.
///
/// `PatchAlreadyApplied` is deliberately *not* part of this enum: it is a
/// successful, typed [`crate::git_driver::AmOutcome`] rather than an error,
/// since the working repo treats it as an expected branch instead of a
/// propagated failure.
#[derive(Debug, thiserror::Error)]
pub enum AmError {
    #[error("patch did not apply cleanly: {stderr}")]
    DidNotApplyCleanly { stderr: String },
    #[error("patch blob sha1 is invalid or missing: {stderr}")]
    BlobSha1Invalid { stderr: String },
}

/// Failure launching or running a `git` subprocess, outside of the
/// specially-classified `am` outcomes.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("unable to launch `git {args}` in {repo}: {cause}")]
    Spawn {
        repo: Utf8PathBuf,
        args: String,
        #[source]
        cause: std::io::Error,
    },
    #[error("`git {args}` in {repo} failed (exit {status}): {stderr}")]
    NonZeroExit {
        repo: Utf8PathBuf,
        args: String,
        status: i32,
        stderr: String,
    },
    #[error("`git {args}` output in {repo} was not valid UTF-8")]
    InvalidUtf8 { repo: Utf8PathBuf, args: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("patch has no `From ` header line")]
    MissingFromHeader,
    #[error("patch has no `diff --git` line")]
    MissingDiffLine,
}

#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("series file {0} is not valid UTF-8")]
    InvalidUtf8(Utf8PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Git(#[from] GitError),
}

#[derive(Debug, thiserror::Error)]
pub enum PatchRepoError {
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("patch {0} is already present in the series")]
    AlreadyInSeries(String),
    #[error("patch {0} is not a valid UTF-8 path")]
    InvalidPatchName(std::path::PathBuf),
}

/// The top-level error surfaced by [`crate::working_repo::WorkingRepo`]
/// operations, aggregating the distinguished kinds described by the
/// specification's error-handling design.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("working repo has no linked patch repo")]
    NoLinkedPatchRepo,
    #[error("already linked to this patch repo")]
    AlreadyLinkedToSamePatchRepo,
    #[error("already linked to a different patch repo: {0}")]
    AlreadyLinkedToDifferentPatchRepo(Utf8PathBuf),
    #[error("path not found: {0}")]
    PathNotFound(Utf8PathBuf),
    #[error("uncommitted changes present in {0}")]
    UncommittedChanges(Utf8PathBuf),
    #[error("no patches are currently applied")]
    NoPatchesApplied,
    #[error("a restore is already in progress (conflict on {0})")]
    RestoreInProgress(String),
    #[error("nothing to resolve: no restore is in progress")]
    NothingToResolve,
    #[error("git user.name/user.email must be configured before restoring")]
    GitConfigRequired,
    #[error("a rebase is already in progress in {0}")]
    RebaseInProgress(Utf8PathBuf),
    #[error(transparent)]
    Am(#[from] AmError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    PatchRepo(#[from] PatchRepoError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
