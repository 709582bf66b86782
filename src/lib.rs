//! Ply maintains a set of downstream patches on top of a moving upstream
//! git tree using two cooperating working trees: a working repo (the live
//! checkout) and a patch repo (an ordered `series` of mbox patch files).
//!
//! The library is split along the same seams the on-disk model has: a
//! thin [`git_driver`] over `git` itself, a pure [`normalize`] pass and
//! [`meaningful_diff`] comparator for turning commits into stable patch
//! files, a [`series`] file store, and the two domain objects
//! [`patch_repo::PatchRepo`] and [`working_repo::WorkingRepo`] that tie
//! them together into the save/restore/resolve/skip/abort/rollback
//! lifecycle.

pub mod annotation;
pub mod error;
pub mod git_driver;
pub mod meaningful_diff;
pub mod normalize;
pub mod patch_repo;
pub mod series;
mod utils;
pub mod working_repo;

pub use error::PlyError;
pub use patch_repo::PatchRepo;
pub use working_repo::WorkingRepo;
