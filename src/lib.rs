//! DDS-Fixer - File Signature Repair Engine
//!
//! Scans a directory tree for files of one type and restores their leading
//! magic bytes when they have been damaged:
//! - Recursive candidate counting that tolerates unreadable subtrees
//! - In-place header repair, one file at a time, on a background thread
//! - Progress events over a channel with cooperative cancellation
//! - Plain text fix log export
//!
//! Defaults target DirectDraw Surface (`.dds`) files; any signature and
//! extension can be configured.

pub mod config;
pub mod counter;
pub mod error;
pub mod fixer;
pub mod report;
pub mod signature;

pub use config::{FixerConfig, ShortFilePolicy, Signature};
pub use counter::{count_files, count_sub_directories, survey, Survey};
pub use error::{FixerError, Result};
pub use fixer::{CancelHandle, FixEvent, RunOutcome, RunState, RunSummary, SignatureFixer};
