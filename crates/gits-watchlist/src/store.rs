// store.rs - Watchlist: persistence and editing of the repository set.
//
// The whole watchlist lives in one JSON file. Every mutating command loads
// it, edits it in memory and writes it back; there is no partial update.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gits_policy::Policy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::WatchlistError;
use crate::target::{Target, TargetSet};

/// Commands the generated template permits.
const TEMPLATE_RESTRICTION: &[&str] = &[
    "status",
    "version",
    "fetch",
    "grep",
    "ls-remote",
    "ls-files",
    "ls-tree",
];

/// The on-disk watchlist: command restriction plus watched repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watchlist {
    /// Allowed first arguments. Empty means every command is allowed.
    #[serde(default)]
    pub restriction: Policy,

    /// Watched repositories by name.
    #[serde(default, rename = "repository")]
    pub repositories: TargetSet,
}

impl Watchlist {
    /// Read and parse a watchlist file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WatchlistError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| WatchlistError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &json)
    }

    /// Like [`Watchlist::load`], but a missing file yields an empty watchlist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, WatchlistError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(path, &json),
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no watchlist yet, starting empty");
                Ok(Self::default())
            }
            Err(source) => Err(WatchlistError::IoError {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_json(path: &Path, json: &str) -> Result<Self, WatchlistError> {
        serde_json::from_str(json).map_err(|source| WatchlistError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pretty JSON (two-space indent, trailing newline).
    pub fn to_json(&self) -> Result<String, WatchlistError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the watchlist to `path`, creating parent directories.
    ///
    /// Overwrites an existing regular file; refuses directories and other
    /// special files.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WatchlistError> {
        let path = path.as_ref();
        if let Ok(meta) = fs::metadata(path) {
            if !meta.is_file() {
                return Err(WatchlistError::NotARegularFile {
                    path: path.to_path_buf(),
                });
            }
        }

        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WatchlistError::IoError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| WatchlistError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), repositories = self.repositories.len(), "saved watchlist");
        Ok(())
    }

    /// Start watching the checkout at `path`. Returns the repository name.
    ///
    /// The path must exist; it is resolved to an absolute path and its final
    /// component becomes the name.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<String, WatchlistError> {
        let path = path.as_ref();
        let worktree = fs::canonicalize(path).map_err(|source| WatchlistError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let name = repository_name(&worktree)?;
        self.insert(name.clone(), Target::from_worktree(&worktree))?;
        Ok(name)
    }

    /// Add a target under an explicit name.
    ///
    /// Both paths must be valid UTF-8.
    pub fn insert(&mut self, name: String, target: Target) -> Result<(), WatchlistError> {
        if let Some(path) = [&target.gitdir, &target.workdir]
            .into_iter()
            .find(|path| path.to_str().is_none())
        {
            return Err(WatchlistError::NonUtf8Path { path: path.clone() });
        }
        if self.repositories.contains_key(&name) {
            return Err(WatchlistError::AlreadyWatched(name));
        }
        self.repositories.insert(name, target);
        Ok(())
    }

    /// Stop watching the repository named by `path_or_name`.
    ///
    /// Accepts either a bare name or a path whose final component is the
    /// name. Returns the removed name.
    pub fn unwatch(&mut self, path_or_name: impl AsRef<Path>) -> Result<String, WatchlistError> {
        let given = path_or_name.as_ref();
        let resolved = fs::canonicalize(given).unwrap_or_else(|_| given.to_path_buf());
        let name = repository_name(&resolved)?;
        if self.repositories.remove(&name).is_none() {
            return Err(WatchlistError::NotWatched(name));
        }
        Ok(name)
    }

    /// Drop every repository whose work-tree no longer exists.
    ///
    /// Returns the removed names in sorted order.
    pub fn prune(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.repositories.retain(|name, target| {
            let keep = target.is_present();
            if !keep {
                tracing::info!(repository = %name, workdir = %target.workdir.display(), "pruning missing repository");
                removed.push(name.clone());
            }
            keep
        });
        removed
    }

    /// Narrow the repository set to exactly `name`.
    pub fn select(&mut self, name: &str) -> Result<(), WatchlistError> {
        let target = self
            .repositories
            .remove(name)
            .ok_or_else(|| WatchlistError::NotWatched(name.to_string()))?;
        self.repositories = TargetSet::from([(name.to_string(), target)]);
        Ok(())
    }

    /// Keep only repositories whose name matches `pattern` (unanchored regex).
    ///
    /// Returns how many repositories remain.
    pub fn retain_matching(&mut self, pattern: &str) -> Result<usize, WatchlistError> {
        let re = Regex::new(pattern).map_err(|source| WatchlistError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.repositories.retain(|name, _| re.is_match(name));
        Ok(self.repositories.len())
    }

    /// A starter watchlist with a read-only command restriction and two
    /// placeholder repositories.
    pub fn template() -> Self {
        let mut repositories = TargetSet::new();
        repositories.insert(
            "repo".to_string(),
            Target::new("/path/to/repo/.git", "/path/to/repo"),
        );
        repositories.insert(
            "repo2".to_string(),
            Target::new("/another/repo2/.git", "/another/repo2"),
        );
        Self {
            restriction: Policy::new(TEMPLATE_RESTRICTION.iter().copied()),
            repositories,
        }
    }
}

impl fmt::Display for Watchlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allow First Arguments:")?;
        writeln!(f, "\t{}", self.restriction)?;
        writeln!(f, "Watch List:")?;
        for name in self.repositories.keys() {
            writeln!(f, "\t[{}]", name)?;
        }
        Ok(())
    }
}

/// Final path component as a repository name.
fn repository_name(path: &Path) -> Result<String, WatchlistError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| WatchlistError::UnnamedPath {
            path: PathBuf::from(path),
        })
}
