use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use ply_core::patch_repo::{CheckResult, PatchRepo};
use ply_core::working_repo::{Status, WorkingRepo};
use slog::{o, Drain, Level, Logger, OwnedKVList, Record};
use std::convert::Infallible;
use std::env;

pub struct TerminalDrain {
    verbose: bool,
}
impl Drain for TerminalDrain {
    type Ok = ();
    type Err = Infallible;

    fn log(&self, record: &Record, _values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        match record.level() {
            Level::Critical | Level::Error | Level::Warning => {
                eprintln!("{}", record.msg());
            }
            Level::Info => {
                println!("{}", record.msg());
            }
            Level::Debug => {
                if self.verbose || env::var_os("PLY_DEBUG").map_or(false, |s| s == "1") {
                    println!("DEBUG: {}", record.msg());
                }
            }
            Level::Trace => {} // Ignore these
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[clap(name = "ply", about = "A patch-lifecycle manager based on git", version = env!("VERGEN_GIT_DESCRIBE"))]
struct Cli {
    /// Don't fetch remotes before restoring
    #[clap(long = "no-fetch", global = true)]
    no_fetch: bool,
    /// Raise the log level to include debug output
    #[clap(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new patch repo
    Init(PathOpt),
    /// Link the current working repo to a patch repo
    Link(PathOpt),
    /// Remove the link to the patch repo
    Unlink,
    /// Turn unsaved commits into patch-repo entries
    Save(SaveOpts),
    /// Re-apply the patch series onto the working repo
    Restore,
    /// Continue a restore after a conflict has been resolved by hand
    Resolve,
    /// Skip the currently conflicting patch
    Skip,
    /// Abort an in-progress restore
    Abort,
    /// Reset the working repo back to the last upstream commit
    Rollback,
    /// Report whether patches are applied or a restore is in progress
    Status,
    /// Verify the patch repo's series matches its patch files on disk
    Check,
    /// Print a DOT graph of patch file dependencies
    Graph,
}

#[derive(Parser, Debug)]
struct PathOpt {
    path: Utf8PathBuf,
}

#[derive(Parser, Debug)]
struct SaveOpts {
    /// The commit or ref to save since; defaults to the last upstream commit
    #[clap(long)]
    since: Option<String>,
    /// A subdirectory of the patch repo to save new patches under
    #[clap(long)]
    prefix: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::root(
        TerminalDrain {
            verbose: cli.verbose,
        }
        .ignore_res(),
        o!(),
    );
    let cwd = Utf8PathBuf::from_path_buf(env::current_dir().context("unable to detect current dir")?)
        .map_err(|path| anyhow::anyhow!("current dir {path:?} is not valid UTF-8"))?;
    let working_repo = WorkingRepo::new(cwd, logger.clone());

    match cli.command {
        Command::Init(opts) => {
            PatchRepo::new(opts.path, logger).initialize()?;
            println!("Initialized patch repo");
        }
        Command::Link(opts) => {
            working_repo.link(&opts.path)?;
            println!("Linked to {}", opts.path);
        }
        Command::Unlink => {
            working_repo.unlink()?;
            println!("Unlinked");
        }
        Command::Save(opts) => {
            let summary = working_repo.save(opts.since.as_deref(), opts.prefix.as_deref())?;
            println!(
                "Saved: {} added, {} updated, {} skipped, {} removed",
                summary.added.len(),
                summary.updated.len(),
                summary.skipped.len(),
                summary.removed.len()
            );
        }
        Command::Restore => {
            let report = working_repo.restore(!cli.no_fetch, None)?;
            println!(
                "Restored: {} updated, {} removed",
                report.updated, report.removed
            );
        }
        Command::Resolve => {
            let report = working_repo.resolve()?;
            println!(
                "Resolved: {} updated, {} removed",
                report.updated, report.removed
            );
        }
        Command::Skip => {
            let report = working_repo.skip()?;
            println!(
                "Skipped: {} updated, {} removed",
                report.updated, report.removed
            );
        }
        Command::Abort => {
            working_repo.abort()?;
            println!("Aborted");
        }
        Command::Rollback => {
            working_repo.rollback(false)?;
            println!("Rolled back");
        }
        Command::Status => match working_repo.status()? {
            Status::NoPatchesApplied => println!("no patches applied"),
            Status::AllPatchesApplied => println!("all patches applied"),
            Status::RestoreInProgress => println!("restore in progress"),
        },
        Command::Check => match working_repo.patch_repo()?.check()? {
            CheckResult::Ok => println!("ok"),
            CheckResult::Failed { missing, orphan } => {
                if !missing.is_empty() {
                    println!("missing: {}", missing.into_iter().collect::<Vec<_>>().join(", "));
                }
                if !orphan.is_empty() {
                    println!("orphan: {}", orphan.into_iter().collect::<Vec<_>>().join(", "));
                }
                anyhow::bail!("patch repo check failed");
            }
        },
        Command::Graph => {
            print!("{}", working_repo.patch_repo()?.patch_dependency_dot_graph()?);
        }
    }
    Ok(())
}
