//! Header Signature Check & Patch
//! Compares the leading bytes of a single file with the expected signature and
//! rewrites them in place when they differ. Nothing past the signature is touched.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::Signature;

/// What happened to one candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// Signature already present.
    Intact,
    /// Signature was rewritten.
    Fixed,
    /// File ends before the signature would; left unchanged.
    TooShort { len: u64 },
}

/// Read the first `signature.len()` bytes of `path`, overwriting them with the
/// signature if they differ. The file handle is closed before returning.
pub fn repair_header(path: &Path, signature: &Signature) -> io::Result<HeaderOutcome> {
    let expected = signature.as_bytes();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut header = Vec::with_capacity(expected.len());
    file.seek(SeekFrom::Start(0))?;
    (&mut file)
        .take(expected.len() as u64)
        .read_to_end(&mut header)?;

    if header.len() < expected.len() {
        return Ok(HeaderOutcome::TooShort {
            len: header.len() as u64,
        });
    }

    if header == expected {
        return Ok(HeaderOutcome::Intact);
    }

    file.seek(SeekFrom::Start(0))?;
    file.write_all(expected)?;
    file.flush()?;
    Ok(HeaderOutcome::Fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_intact_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.dds");
        fs::write(&path, b"DDS |\x7c\x00\x00\x00rest").unwrap();

        let outcome = repair_header(&path, &Signature::default()).unwrap();
        assert_eq!(outcome, HeaderOutcome::Intact);
        assert_eq!(fs::read(&path).unwrap(), b"DDS |\x7c\x00\x00\x00rest");
    }

    #[test]
    fn test_broken_header_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dds");
        fs::write(&path, b"\x00\x00\x00\x00\x7c\x00\x00\x00pixels").unwrap();

        let outcome = repair_header(&path, &Signature::default()).unwrap();
        assert_eq!(outcome, HeaderOutcome::Fixed);
        assert_eq!(fs::read(&path).unwrap(), b"DDS \x7c\x00\x00\x00pixels");
    }

    #[test]
    fn test_exact_length_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("four.dds");
        fs::write(&path, b"XXXX").unwrap();

        assert_eq!(
            repair_header(&path, &Signature::default()).unwrap(),
            HeaderOutcome::Fixed
        );
        assert_eq!(fs::read(&path).unwrap(), b"DDS ");
    }

    #[test]
    fn test_short_file_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dds");
        fs::write(&path, b"DD").unwrap();

        let outcome = repair_header(&path, &Signature::default()).unwrap();
        assert_eq!(outcome, HeaderOutcome::TooShort { len: 2 });
        assert_eq!(fs::read(&path).unwrap(), b"DD");

        let empty = dir.path().join("empty.dds");
        fs::write(&empty, b"").unwrap();
        assert_eq!(
            repair_header(&empty, &Signature::default()).unwrap(),
            HeaderOutcome::TooShort { len: 0 }
        );
    }

    #[test]
    fn test_custom_signature_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, b"\x00\x00\x00\x00\x0d\x0a\x1a\x0a").unwrap();

        let png = Signature::from_hex("89504E470D0A1A0A").unwrap();
        assert_eq!(repair_header(&path, &png).unwrap(), HeaderOutcome::Fixed);
        assert_eq!(fs::read(&path).unwrap(), b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = repair_header(&dir.path().join("gone.dds"), &Signature::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
