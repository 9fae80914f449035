// target.rs - A single watched repository.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name-keyed set of repositories for one dispatch.
///
/// A `BTreeMap` keeps iteration sorted by name, so sequential output and
/// failure reports come out in a stable order.
pub type TargetSet = BTreeMap<String, Target>;

/// Location of one repository: where its object database lives and where
/// its checked-out files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Passed to git as `--git-dir`.
    pub gitdir: PathBuf,
    /// Passed to git as `--work-tree`.
    pub workdir: PathBuf,
}

impl Target {
    pub fn new(gitdir: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            gitdir: gitdir.into(),
            workdir: workdir.into(),
        }
    }

    /// Target for a standard checkout whose git-dir is `<worktree>/.git`.
    pub fn from_worktree(worktree: impl AsRef<Path>) -> Self {
        let workdir = worktree.as_ref().to_path_buf();
        Self {
            gitdir: workdir.join(".git"),
            workdir,
        }
    }

    /// Whether the work-tree still exists as a directory.
    pub fn is_present(&self) -> bool {
        self.workdir.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn from_worktree_appends_dot_git() {
        let target = Target::from_worktree("/src/app");
        assert_eq!(target.workdir, PathBuf::from("/src/app"));
        assert_eq!(target.gitdir, PathBuf::from("/src/app/.git"));
    }

    #[test]
    fn presence_tracks_workdir() {
        let dir = tempdir().unwrap();
        let present = Target::from_worktree(dir.path());
        assert!(present.is_present());

        let missing = Target::from_worktree(dir.path().join("gone"));
        assert!(!missing.is_present());
    }

    #[test]
    fn target_set_iterates_by_name() {
        let mut set = TargetSet::new();
        set.insert("zeta".into(), Target::from_worktree("/z"));
        set.insert("alpha".into(), Target::from_worktree("/a"));
        set.insert("mid".into(), Target::from_worktree("/m"));

        let names: Vec<&str> = set.keys().map(String::as_str).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
