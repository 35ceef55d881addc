//! Signature Fixer
//! Walks a directory tree on a background thread and rewrites the header of
//! every candidate file whose leading bytes differ from the configured
//! signature. Progress is streamed to the caller over a channel; the caller
//! can stop the walk cooperatively at any time.
//!
//! Policy:
//! - Permission denied on a file (or on listing a directory) stops the whole run.
//! - Any other I/O failure aborts the run with an error.
//! - Cancellation is polled once per file and once per subdirectory; a header
//!   write that has started is always completed.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::{FixerConfig, ShortFilePolicy};
use crate::counter::count_files;
use crate::error::{FixerError, Result};
use crate::report::FixReport;
use crate::signature::{repair_header, HeaderOutcome};

/// Where a fixer is in its run lifecycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Counting,
    Fixing,
    Cancelling,
    Finished,
}

impl RunState {
    fn is_active(self) -> bool {
        matches!(
            self,
            RunState::Counting | RunState::Fixing | RunState::Cancelling
        )
    }
}

/// How a run ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    DeniedAccess,
    Failed,
}

/// Progress notification sent from the worker thread.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FixEvent {
    Started {
        root: PathBuf,
        files_to_analyze: u64,
    },
    Analyzed {
        path: PathBuf,
        fixed: bool,
        files_analyzed: u64,
        files_fixed: u64,
    },
    Skipped {
        path: PathBuf,
        len: u64,
    },
    DeniedAccess {
        path: PathBuf,
    },
    Failed {
        error: String,
    },
    Finished {
        outcome: RunOutcome,
        files_analyzed: u64,
        files_fixed: u64,
    },
}

/// Final counters of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub files_to_analyze: u64,
    pub files_analyzed: u64,
    pub files_fixed: u64,
    pub outcome: RunOutcome,
}

/// State shared between the controller and the worker thread.
struct Shared {
    keep_going: AtomicBool,
    files_to_analyze: AtomicU64,
    files_analyzed: AtomicU64,
    files_fixed: AtomicU64,
    state: Mutex<RunState>,
    fixed_files: Mutex<Vec<PathBuf>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn new() -> Self {
        Shared {
            keep_going: AtomicBool::new(true),
            files_to_analyze: AtomicU64::new(0),
            files_analyzed: AtomicU64::new(0),
            files_fixed: AtomicU64::new(0),
            state: Mutex::new(RunState::Idle),
            fixed_files: Mutex::new(Vec::new()),
        }
    }

    fn state(&self) -> RunState {
        *lock(&self.state)
    }

    fn set_state(&self, state: RunState) {
        *lock(&self.state) = state;
    }

    fn cancel(&self) {
        self.keep_going.store(false, Ordering::SeqCst);
        let mut state = lock(&self.state);
        if *state == RunState::Fixing {
            *state = RunState::Cancelling;
        }
    }
}

/// Stops a running fix from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

/// Controller for signature fixing runs. Reusable: each `start` resets the
/// counters and the fixed-file log.
pub struct SignatureFixer {
    config: Arc<FixerConfig>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<RunSummary>>>,
}

impl SignatureFixer {
    pub fn new(config: FixerConfig) -> Self {
        SignatureFixer {
            config: Arc::new(config),
            shared: Arc::new(Shared::new()),
            worker: None,
        }
    }

    pub fn config(&self) -> &FixerConfig {
        &self.config
    }

    /// Count the candidate files under `root`, then fix them on a background
    /// thread. Returns the receiving end of the progress channel.
    pub fn start(&mut self, root: &Path) -> Result<Receiver<FixEvent>> {
        if self.shared.state().is_active() {
            return Err(FixerError::Busy);
        }
        self.config.validate()?;
        if let Some(previous) = self.worker.take() {
            // Already past Finished; reap it.
            match previous.join() {
                Ok(Ok(summary)) => debug!("Discarding unwaited run summary {:?}", summary),
                Ok(Err(e)) => warn!("Previous run failed without being waited on: {}", e),
                Err(_) => warn!("Previous fixing worker panicked without being waited on"),
            }
        }

        self.shared.set_state(RunState::Counting);
        let files_to_analyze = match count_files(root, &self.config) {
            Ok(count) => count,
            Err(e) => {
                self.shared.set_state(RunState::Idle);
                return Err(e);
            }
        };

        self.shared
            .files_to_analyze
            .store(files_to_analyze, Ordering::SeqCst);
        self.shared.files_analyzed.store(0, Ordering::SeqCst);
        self.shared.files_fixed.store(0, Ordering::SeqCst);
        lock(&self.shared.fixed_files).clear();
        self.shared.keep_going.store(true, Ordering::SeqCst);
        self.shared.set_state(RunState::Fixing);

        info!(
            "Fixing {} .{} files under {}",
            files_to_analyze,
            self.config.extension,
            root.display()
        );

        let (tx, rx) = mpsc::sync_channel(self.config.event_capacity);
        let worker = Worker::new(Arc::clone(&self.config), Arc::clone(&self.shared), tx);
        let worker_root = root.to_path_buf();

        let spawned = thread::Builder::new()
            .name("signature-fixer".to_string())
            .spawn(move || worker.run(worker_root));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(rx)
            }
            Err(source) => {
                self.shared.set_state(RunState::Idle);
                Err(FixerError::Fix {
                    path: root.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Ask the worker to stop after the file it is on.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until the current run ends. `None` when no run was started since
    /// the last wait.
    pub fn wait(&mut self) -> Result<Option<RunSummary>> {
        match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result.map(Some),
                Err(_) => Err(FixerError::WorkerPanicked),
            },
            None => Ok(None),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    pub fn keep_going(&self) -> bool {
        self.shared.keep_going.load(Ordering::SeqCst)
    }

    pub fn files_to_analyze(&self) -> u64 {
        self.shared.files_to_analyze.load(Ordering::SeqCst)
    }

    pub fn files_analyzed(&self) -> u64 {
        self.shared.files_analyzed.load(Ordering::SeqCst)
    }

    pub fn files_fixed(&self) -> u64 {
        self.shared.files_fixed.load(Ordering::SeqCst)
    }

    /// Files rewritten in the current (or last) run, in fix order.
    pub fn fixed_files(&self) -> Vec<PathBuf> {
        lock(&self.shared.fixed_files).clone()
    }

    /// Save the fix log of the current (or last) run to `destination`.
    pub fn save_log(&self, destination: &Path) -> Result<()> {
        let fixed_files = lock(&self.shared.fixed_files);
        let report = FixReport {
            files_analyzed: self.files_analyzed(),
            files_fixed: self.files_fixed(),
            fixed_files: &fixed_files,
        };
        report.save(destination)?;
        info!("Fix log saved to {}", destination.display());
        Ok(())
    }
}

/// Background half of a run.
struct Worker {
    config: Arc<FixerConfig>,
    shared: Arc<Shared>,
    events: SyncSender<FixEvent>,
    denied: bool,
    interrupted: bool,
}

impl Worker {
    fn new(config: Arc<FixerConfig>, shared: Arc<Shared>, events: SyncSender<FixEvent>) -> Self {
        Worker {
            config,
            shared,
            events,
            denied: false,
            interrupted: false,
        }
    }

    fn run(mut self, root: PathBuf) -> Result<RunSummary> {
        self.emit(FixEvent::Started {
            root: root.clone(),
            files_to_analyze: self.shared.files_to_analyze.load(Ordering::SeqCst),
        });

        let walked = panic::catch_unwind(AssertUnwindSafe(|| self.fix_directory(&root)));

        let result = match walked {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Fixing aborted: {}", e);
                self.emit(FixEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
            Err(_) => {
                error!("Fixing worker panicked");
                self.emit(FixEvent::Failed {
                    error: "Internal error: fixing worker panicked".to_string(),
                });
                Err(FixerError::WorkerPanicked)
            }
        };

        let outcome = self.outcome(result.is_err());

        let summary = RunSummary {
            files_to_analyze: self.shared.files_to_analyze.load(Ordering::SeqCst),
            files_analyzed: self.shared.files_analyzed.load(Ordering::SeqCst),
            files_fixed: self.shared.files_fixed.load(Ordering::SeqCst),
            outcome,
        };
        info!(
            "Fixing finished ({:?}): {} files analyzed, {} files fixed",
            outcome, summary.files_analyzed, summary.files_fixed
        );

        self.emit(FixEvent::Finished {
            outcome,
            files_analyzed: summary.files_analyzed,
            files_fixed: summary.files_fixed,
        });
        // Only after the last send, so a restart never joins a blocked worker.
        self.shared.set_state(RunState::Finished);

        result.map(|()| summary)
    }

    fn outcome(&self, failed: bool) -> RunOutcome {
        if failed {
            RunOutcome::Failed
        } else if self.denied {
            RunOutcome::DeniedAccess
        } else if self.interrupted {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        }
    }

    fn emit(&self, event: FixEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }

    fn should_continue(&mut self) -> bool {
        if self.shared.keep_going.load(Ordering::SeqCst) {
            true
        } else {
            self.interrupted = true;
            false
        }
    }

    fn deny(&mut self, path: &Path) {
        warn!("Access denied to {}; stopping", path.display());
        self.denied = true;
        self.shared.keep_going.store(false, Ordering::SeqCst);
        self.emit(FixEvent::DeniedAccess {
            path: path.to_path_buf(),
        });
    }

    /// Permission denied stops the run quietly; anything else aborts it.
    fn handle_io_error(&mut self, path: &Path, source: io::Error) -> Result<()> {
        if source.kind() == io::ErrorKind::PermissionDenied {
            self.deny(path);
            Ok(())
        } else {
            Err(FixerError::Fix {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Fix this directory's own files first, then descend into each subdirectory.
    fn fix_directory(&mut self, dir: &Path) -> Result<()> {
        debug!("Entering {}", dir.display());

        let (files, sub_directories) = match list_directory(dir, &self.config) {
            Ok(listing) => listing,
            Err(source) => return self.handle_io_error(dir, source),
        };

        for file in files {
            if !self.should_continue() {
                return Ok(());
            }
            self.fix_file(&file)?;
        }

        for sub_directory in sub_directories {
            if !self.should_continue() {
                return Ok(());
            }
            self.fix_directory(&sub_directory)?;
        }

        Ok(())
    }

    fn fix_file(&mut self, path: &Path) -> Result<()> {
        let fixed = match repair_header(path, &self.config.signature) {
            Ok(HeaderOutcome::Intact) => false,
            Ok(HeaderOutcome::Fixed) => {
                info!("Fixed signature of {}", path.display());
                lock(&self.shared.fixed_files).push(path.to_path_buf());
                self.shared.files_fixed.fetch_add(1, Ordering::SeqCst);
                true
            }
            Ok(HeaderOutcome::TooShort { len }) => match self.config.short_files {
                ShortFilePolicy::Fail => {
                    return Err(FixerError::TooShort {
                        path: path.to_path_buf(),
                        len,
                        expected: self.config.signature.len(),
                    })
                }
                ShortFilePolicy::Skip => {
                    warn!("Skipping {}: only {} bytes", path.display(), len);
                    self.emit(FixEvent::Skipped {
                        path: path.to_path_buf(),
                        len,
                    });
                    false
                }
            },
            Err(source) => return self.handle_io_error(path, source),
        };

        let files_analyzed = self.shared.files_analyzed.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(FixEvent::Analyzed {
            path: path.to_path_buf(),
            fixed,
            files_analyzed,
            files_fixed: self.shared.files_fixed.load(Ordering::SeqCst),
        });
        Ok(())
    }
}

/// Candidate files and subdirectories directly inside `dir`, each in file
/// name order. Symbolic links are left out.
fn list_directory(dir: &Path, config: &FixerConfig) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut sub_directories = Vec::new();

    let listing = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in listing {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            sub_directories.push(entry.into_path());
        } else if file_type.is_file() && config.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok((files, sub_directories))
}
