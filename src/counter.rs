//! Candidate File Counter
//! Sizes up a directory tree before a fixing run. Subtrees that cannot be
//! listed for lack of permission contribute nothing; any other failure aborts.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::config::FixerConfig;
use crate::error::{FixerError, Result};

/// Files and folders found under a root directory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Survey {
    pub files: u64,
    pub sub_directories: u64,
}

impl Survey {
    pub fn message(&self) -> String {
        if self.sub_directories == 0 {
            format!("Found {} files.", self.files)
        } else {
            format!(
                "Found {} files inside {} subdirectories.",
                self.files, self.sub_directories
            )
        }
    }
}

/// Fail unless `root` exists and is a directory.
pub(crate) fn ensure_directory(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|source| FixerError::Search {
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(FixerError::Search {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(())
}

fn walk_entries<F>(root: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(&DirEntry),
{
    ensure_directory(root)?;

    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => visit(&entry),
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let denied = err
                    .io_error()
                    .map(|e| e.kind() == io::ErrorKind::PermissionDenied)
                    .unwrap_or(false);
                if denied {
                    debug!("Skipping unreadable directory {}", path.display());
                    continue;
                }
                return Err(FixerError::Search {
                    path,
                    source: io::Error::from(err),
                });
            }
        }
    }

    Ok(())
}

/// Number of files carrying the target extension under `root`, at any depth.
pub fn count_files(root: &Path, config: &FixerConfig) -> Result<u64> {
    let mut files = 0u64;
    walk_entries(root, |entry| {
        if entry.file_type().is_file() && config.matches(entry.path()) {
            files += 1;
        }
    })?;
    Ok(files)
}

/// Number of directories below `root`, at any depth, not counting `root`.
pub fn count_sub_directories(root: &Path) -> Result<u64> {
    let mut directories = 0u64;
    walk_entries(root, |entry| {
        if entry.depth() > 0 && entry.file_type().is_dir() {
            directories += 1;
        }
    })?;
    Ok(directories)
}

/// Both counts in one walk.
pub fn survey(root: &Path, config: &FixerConfig) -> Result<Survey> {
    let mut survey = Survey {
        files: 0,
        sub_directories: 0,
    };
    walk_entries(root, |entry| {
        let file_type = entry.file_type();
        if file_type.is_file() && config.matches(entry.path()) {
            survey.files += 1;
        } else if entry.depth() > 0 && file_type.is_dir() {
            survey.sub_directories += 1;
        }
    })?;
    Ok(survey)
}
