use camino::Utf8PathBuf;
use ply_core::git_driver::{ConfigOp, GitDriver};
use ply_core::patch_repo::{CheckResult, PatchRepo};
use ply_core::working_repo::WorkingRepo;
use std::fs;
use testdir::testdir;

fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn init_git_repo(path: &Utf8PathBuf) -> anyhow::Result<GitDriver> {
    let git = GitDriver::new(path.clone(), logger());
    git.init()?;
    git.config(ConfigOp::Add, "user.name", Some("Test User"))?;
    git.config(ConfigOp::Add, "user.email", Some("test@example.com"))?;
    Ok(git)
}

/// Scenario 1 from the specification: a single save, then a rollback and
/// a restore round-trip the working tree back to the saved content.
#[test]
fn save_then_rollback_then_restore() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let file_path = working_dir.join("greeting.txt");
    fs::write(&file_path, "for the aid of their country.\n")?;
    working_git.add("greeting.txt")?;
    working_git.commit("Initial upstream commit", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&file_path, "for the aid of their country!\n")?;
    working_git.add("greeting.txt")?;
    working_git.commit("Exclaim the greeting", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;

    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;

    working_repo.save(Some(&upstream_hash), None)?;

    assert_eq!(fs::read_to_string(&file_path)?, "for the aid of their country!\n");
    let series = patch_repo.series()?;
    assert_eq!(series.len(), 1);

    let patch_repo_git = GitDriver::new(patch_dir.clone(), logger());
    let last_patch_repo_commit = patch_repo_git.log(None, Some(1), 0, "%B")?;
    assert!(last_patch_repo_commit.contains(&format!("Ply-Based-On: {upstream_hash}")));

    working_repo.rollback(false)?;
    assert_eq!(fs::read_to_string(&file_path)?, "for the aid of their country.\n");

    working_repo.restore(false, None)?;
    assert_eq!(fs::read_to_string(&file_path)?, "for the aid of their country!\n");

    Ok(())
}

/// Scenario 6: `check` distinguishes an orphan patch file (present, not
/// in the series) from a missing one (in the series, no file).
#[test]
fn check_detects_orphan_and_missing_entries() -> anyhow::Result<()> {
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;

    assert!(matches!(patch_repo.check()?, CheckResult::Ok));

    fs::write(patch_dir.join("bogus.patch"), "not a real patch\n")?;
    match patch_repo.check()? {
        CheckResult::Failed { missing, orphan } => {
            assert!(missing.is_empty());
            assert!(orphan.contains("bogus.patch"));
        }
        CheckResult::Ok => panic!("expected a Failed check result"),
    }

    fs::remove_file(patch_dir.join("bogus.patch"))?;
    fs::write(
        patch_dir.join("series"),
        "nonexistent.patch\n",
    )?;
    match patch_repo.check()? {
        CheckResult::Failed { missing, orphan } => {
            assert!(orphan.is_empty());
            assert!(missing.contains("nonexistent.patch"));
        }
        CheckResult::Ok => panic!("expected a Failed check result"),
    }

    Ok(())
}

/// Scenario 2: two unsaved commits turn into two series entries, and a
/// rollback/restore round-trip brings both back.
#[test]
fn two_patch_save_and_restore() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let readme = working_dir.join("README");
    fs::write(&readme, "Now is the time for all good men to come to the aid of there country.")?;
    working_git.add("README")?;
    working_git.commit("Adding README", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&readme, "Now is the time for all good men to come to the aid of their country.")?;
    working_git.add("README")?;
    working_git.commit("There -> Their", false, false)?;

    fs::write(&readme, "Now is the time for all good men to come to the aid of their country!")?;
    working_git.add("README")?;
    working_git.commit("Add exclamation point!", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;

    let summary = working_repo.save(Some(&upstream_hash), None)?;
    assert_eq!(summary.added.len(), 2);
    assert_eq!(patch_repo.series()?.len(), 2);

    working_repo.git().reset("HEAD~2", true)?;
    assert_eq!(
        fs::read_to_string(&readme)?,
        "Now is the time for all good men to come to the aid of there country."
    );

    working_repo.restore(false, None)?;
    assert_eq!(
        fs::read_to_string(&readme)?,
        "Now is the time for all good men to come to the aid of their country!"
    );

    let patch_repo_git = GitDriver::new(patch_dir, logger());
    let last_commit = patch_repo_git.log(None, Some(1), 0, "%B")?;
    assert!(last_commit.contains(&format!("Ply-Based-On: {upstream_hash}")));

    Ok(())
}

/// Scenario 3: an upstream change that collides with an already-saved
/// patch raises a conflict; resolving it by hand and calling `resolve`
/// refreshes the patch file and re-bases `Ply-Based-On` onto the new
/// upstream commit.
#[test]
fn conflict_then_resolve() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let readme = working_dir.join("README");
    fs::write(&readme, "Now is the time for all good men to come to the aid of there country.")?;
    working_git.add("README")?;
    working_git.commit("Adding README", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&readme, "Now is the time for all good men to come to the aid of their country.")?;
    working_git.add("README")?;
    working_git.commit("There -> Their", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;
    working_repo.save(Some(&upstream_hash), None)?;

    working_repo.git().reset("HEAD^", true)?;
    assert_eq!(
        fs::read_to_string(&readme)?,
        "Now is the time for all good men to come to the aid of there country."
    );

    fs::write(&readme, "Now is the time for all good men to come to the aid of there country. Fin.")?;
    working_git.add("README")?;
    working_git.commit("Trunk changed", false, false)?;
    let new_upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    let result = working_repo.restore(false, None);
    assert!(result.is_err());
    assert_eq!(working_repo.status()?, ply_core::working_repo::Status::RestoreInProgress);
    assert!(working_dir.join(".patch-conflict").exists());

    fs::write(&readme, "Now is the time for all good men to come to the aid of their country. Fin.")?;
    working_git.add("README")?;
    working_repo.resolve()?;

    assert_eq!(
        fs::read_to_string(&readme)?,
        "Now is the time for all good men to come to the aid of their country. Fin."
    );
    assert!(!working_dir.join(".patch-conflict").exists());
    assert!(!working_dir.join(".restore-stats").exists());

    let patch_repo_git = GitDriver::new(patch_dir, logger());
    let last_commit = patch_repo_git.log(None, Some(1), 0, "%B")?;
    assert!(last_commit.contains(&format!("Ply-Based-On: {new_upstream_hash}")));

    Ok(())
}

/// Scenario 4: when the upstreamed change is identical to an already
/// saved patch, restore detects `AmOutcome::AlreadyApplied`, drops the
/// patch from the series, and the working repo falls back to
/// `NoPatchesApplied`.
#[test]
fn upstreamed_patch_is_removed_from_series() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let readme = working_dir.join("README");
    fs::write(&readme, "Now is the time for all good men to come to the aid of there country.")?;
    working_git.add("README")?;
    working_git.commit("Adding README", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&readme, "Now is the time for all good men to come to the aid of their country.")?;
    working_git.add("README")?;
    working_git.commit("There -> Their", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;
    working_repo.save(Some(&upstream_hash), None)?;
    assert_eq!(patch_repo.series()?.len(), 1);

    working_repo.rollback(false)?;
    assert_eq!(
        working_repo.status()?,
        ply_core::working_repo::Status::NoPatchesApplied
    );

    // The same change lands upstream directly, rather than through ply.
    fs::write(&readme, "Now is the time for all good men to come to the aid of their country.")?;
    working_git.add("README")?;
    working_git.commit("There -> Their", false, false)?;

    working_repo.restore(false, None)?;

    assert!(patch_repo.series()?.is_empty());
    assert_eq!(
        working_repo.status()?,
        ply_core::working_repo::Status::NoPatchesApplied
    );

    Ok(())
}

/// Scenario 5: a conflict partway through a multi-patch series, followed
/// by `abort`, discards the already-applied prefix entirely and leaves
/// the working tree at the newer upstream commit.
#[test]
fn abort_discards_partially_applied_series() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let items = working_dir.join("items.txt");
    fs::write(&items, "A\nB\nC\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Adding items", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&items, "Ax\nB\nC\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Patch A", false, false)?;

    fs::write(&items, "Ax\nBx\nC\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Patch B", false, false)?;

    fs::write(&items, "Ax\nBx\nCx\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Patch C", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;
    working_repo.save(Some(&upstream_hash), None)?;
    assert_eq!(patch_repo.series()?.len(), 3);

    working_repo.rollback(false)?;
    fs::write(&items, "A\nB\nD\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Upstream changed C to D", false, false)?;

    let result = working_repo.restore(false, None);
    assert!(result.is_err());
    assert_eq!(working_repo.status()?, ply_core::working_repo::Status::RestoreInProgress);

    working_repo.abort()?;

    assert_eq!(
        working_repo.status()?,
        ply_core::working_repo::Status::NoPatchesApplied
    );
    assert_eq!(fs::read_to_string(&items)?, "A\nB\nD\n");
    assert!(!working_dir.join(".patch-conflict").exists());
    assert!(!working_dir.join(".restore-stats").exists());
    // Abort never touches the series; all three patches are still listed.
    assert_eq!(patch_repo.series()?.len(), 3);

    Ok(())
}

/// `skip` drops the conflicting patch from the series entirely and lets
/// the remaining series continue applying.
#[test]
fn skip_drops_conflicted_patch_and_continues() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;

    let working_git = init_git_repo(&working_dir)?;
    let items = working_dir.join("items.txt");
    fs::write(&items, "A\nB\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Adding items", false, false)?;
    let upstream_hash = working_git.log(None, Some(1), 0, "%H")?.trim().to_string();

    fs::write(&items, "Ax\nB\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Patch A", false, false)?;

    fs::write(&items, "Ax\nBx\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Patch B", false, false)?;

    let patch_repo = PatchRepo::new(patch_dir.clone(), logger());
    patch_repo.initialize()?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());
    working_repo.link(&patch_dir)?;
    working_repo.save(Some(&upstream_hash), None)?;
    let conflicted_name = patch_repo.series()?[0].clone();
    assert_eq!(patch_repo.series()?.len(), 2);

    working_repo.rollback(false)?;
    fs::write(&items, "Z\nB\n")?;
    working_git.add("items.txt")?;
    working_git.commit("Upstream changed A to Z", false, false)?;

    let result = working_repo.restore(false, None);
    assert!(result.is_err());

    working_repo.skip()?;

    let series = patch_repo.series()?;
    assert!(!series.contains(&conflicted_name));
    assert!(!working_dir.join(".patch-conflict").exists());
    let applied = working_repo
        .git()
        .log(None, None, 0, "%B")?;
    assert!(!applied.contains(&format!("Ply-Patch: {conflicted_name}")));

    Ok(())
}

/// Linking twice to the same patch repo, or to two different ones, is
/// rejected with the distinguished error kinds rather than silently
/// overwriting the link.
#[test]
fn link_rejects_duplicate_and_conflicting_targets() -> anyhow::Result<()> {
    let working_dir: Utf8PathBuf = testdir!().try_into()?;
    let patch_dir: Utf8PathBuf = testdir!().try_into()?;
    let other_patch_dir: Utf8PathBuf = testdir!().try_into()?;

    init_git_repo(&working_dir)?;
    let working_repo = WorkingRepo::new(working_dir.clone(), logger());

    working_repo.link(&patch_dir)?;
    assert!(matches!(
        working_repo.link(&patch_dir),
        Err(ply_core::PlyError::AlreadyLinkedToSamePatchRepo)
    ));
    assert!(matches!(
        working_repo.link(&other_patch_dir),
        Err(ply_core::PlyError::AlreadyLinkedToDifferentPatchRepo(_))
    ));

    working_repo.unlink()?;
    assert!(matches!(
        working_repo.unlink(),
        Err(ply_core::PlyError::NoLinkedPatchRepo)
    ));

    Ok(())
}
