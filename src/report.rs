//! Fix log export

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{FixerError, Result};

pub const TOOL_NAME: &str = "DDS-Fixer";

pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

const SEPARATOR: &str = "------------------------------------------";

/// Snapshot of a run's counters and the files it rewrote.
#[derive(Debug, Clone)]
pub struct FixReport<'a> {
    pub files_analyzed: u64,
    pub files_fixed: u64,
    pub fixed_files: &'a [PathBuf],
}

impl FixReport<'_> {
    pub fn render(&self, date: DateTime<Local>) -> String {
        let mut text = String::new();
        text.push_str(&format!("{} v{}\n", TOOL_NAME, TOOL_VERSION));
        text.push_str(&format!("Log Date: {}\n", date.format("%Y-%m-%d %H:%M:%S")));
        text.push_str(&format!("Files Analyzed: {}\n", self.files_analyzed));
        text.push_str(&format!("Fixed Files: {}\n", self.files_fixed));
        text.push_str(SEPARATOR);
        text.push('\n');
        for path in self.fixed_files {
            text.push_str(&path.to_string_lossy());
            text.push('\n');
        }
        text
    }

    /// Write the report, stamped with the current local time, to `destination`.
    pub fn save(&self, destination: &Path) -> Result<()> {
        let export_err = |source| FixerError::Export {
            path: destination.to_path_buf(),
            source,
        };

        let file = File::create(destination).map_err(export_err)?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.render(Local::now()).as_bytes())
            .map_err(export_err)?;
        writer.flush().map_err(export_err)?;
        Ok(())
    }
}

/// Suggested log file name, e.g. `DDS-Fixer_2024_05_01_13_45.txt`.
pub fn default_log_file_name(date: DateTime<Local>) -> String {
    format!("{}_{}.txt", TOOL_NAME, date.format("%Y_%m_%d_%H_%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn fixed_date() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 13, 45, 9).unwrap()
    }

    /// Pull a `Key: value` count back out of a rendered log.
    fn read_count(text: &str, key: &str) -> u64 {
        text.lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.trim_start_matches(':').trim().parse().ok())
            .unwrap()
    }

    #[test]
    fn test_render_layout() {
        let paths = vec![PathBuf::from("a/one.dds"), PathBuf::from("b/two.dds")];
        let report = FixReport {
            files_analyzed: 5,
            files_fixed: 2,
            fixed_files: &paths,
        };

        let text = report.render(fixed_date());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], format!("DDS-Fixer v{}", TOOL_VERSION));
        assert_eq!(lines[1], "Log Date: 2024-05-01 13:45:09");
        assert_eq!(lines[2], "Files Analyzed: 5");
        assert_eq!(lines[3], "Fixed Files: 2");
        assert_eq!(lines[4], SEPARATOR);
        assert_eq!(&lines[5..], &["a/one.dds", "b/two.dds"]);
    }

    #[test]
    fn test_saved_counts_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("fix.log");
        let paths = vec![PathBuf::from("x.dds")];
        let report = FixReport {
            files_analyzed: 12,
            files_fixed: 1,
            fixed_files: &paths,
        };
        report.save(&destination).unwrap();

        let text = fs::read_to_string(&destination).unwrap();
        assert_eq!(read_count(&text, "Files Analyzed"), 12);
        assert_eq!(read_count(&text, "Fixed Files"), 1);
        assert!(text.ends_with("x.dds\n"));
    }

    #[test]
    fn test_save_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = FixReport {
            files_analyzed: 0,
            files_fixed: 0,
            fixed_files: &[],
        };
        let err = report
            .save(&dir.path().join("no/such/dir/fix.log"))
            .unwrap_err();
        assert!(matches!(err, FixerError::Export { .. }));
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(
            default_log_file_name(fixed_date()),
            "DDS-Fixer_2024_05_01_13_45.txt"
        );
    }
}
