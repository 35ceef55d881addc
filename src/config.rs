//! Fixer configuration
//! The defaults repair DirectDraw Surface files; swapping the signature and
//! extension retargets the same routine at any other file type.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FixerError, Result};

/// DirectDraw Surface magic number ("DDS ").
pub const DDS_SIGNATURE: [u8; 4] = [0x44, 0x44, 0x53, 0x20];

/// DirectDraw Surface file extension.
pub const DDS_EXTENSION: &str = "dds";

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Largest accepted event channel capacity. The channel preallocates every
/// slot, so anything bigger is refused up front.
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// Expected leading bytes of a valid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(FixerError::InvalidSignature(
                "signature must hold at least one byte".to_string(),
            ));
        }
        Ok(Signature(bytes))
    }

    /// Parse a hex string such as `44445320` or `44 44 53 20`.
    pub fn from_hex(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact
            .strip_prefix("0x")
            .or_else(|| compact.strip_prefix("0X"))
            .unwrap_or(compact.as_str());
        let bytes = hex::decode(compact)
            .map_err(|e| FixerError::InvalidSignature(format!("{}: {}", text, e)))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a signature built through `new` or `from_hex`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature(DDS_SIGNATURE.to_vec())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Signature::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// What to do with a candidate file shorter than the signature.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortFilePolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Leave the file alone and keep going.
    Skip,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FixerConfig {
    pub signature: Signature,
    pub extension: String,
    pub short_files: ShortFilePolicy,
    /// Slots in the worker's event channel; 0 makes every event a rendezvous.
    pub event_capacity: usize,
}

impl Default for FixerConfig {
    fn default() -> Self {
        FixerConfig {
            signature: Signature::default(),
            extension: DDS_EXTENSION.to_string(),
            short_files: ShortFilePolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl FixerConfig {
    /// Load a JSON config file. Keys left out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| FixerError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: FixerConfig = serde_json::from_str(&text)?;
        let extension = config.extension.clone();
        config.set_extension(&extension)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(FixerError::InvalidEventCapacity(self.event_capacity));
        }
        Ok(())
    }

    /// Replace the target extension, accepting an optional leading dot.
    pub fn set_extension(&mut self, extension: &str) -> Result<()> {
        let ext = extension.trim().trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(FixerError::InvalidExtension(extension.to_string()));
        }
        self.extension = ext.to_string();
        Ok(())
    }

    /// Whether `path` carries the target extension (ASCII case-insensitive).
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_target_dds() {
        let config = FixerConfig::default();
        assert_eq!(config.signature.as_bytes(), b"DDS ");
        assert_eq!(config.extension, "dds");
        assert_eq!(config.short_files, ShortFilePolicy::Fail);
    }

    #[test]
    fn test_signature_from_hex() {
        assert_eq!(Signature::from_hex("44445320").unwrap(), Signature::default());
        assert_eq!(Signature::from_hex("0x44 44 53 20").unwrap(), Signature::default());
        assert_eq!(Signature::from_hex("89504e47").unwrap().as_bytes(), b"\x89PNG");
        assert!(Signature::from_hex("").is_err());
        assert!(Signature::from_hex("4G").is_err());
        assert!(Signature::from_hex("444").is_err());

        let png = Signature::from_hex("89504e47").unwrap();
        assert_eq!(png.len(), 4);
        assert!(!png.is_empty());
    }

    #[test]
    fn test_extension_matching() {
        let config = FixerConfig::default();
        assert!(config.matches(Path::new("dir/texture.dds")));
        assert!(config.matches(Path::new("dir/TEXTURE.DDS")));
        assert!(!config.matches(Path::new("dir/texture.ddsx")));
        assert!(!config.matches(Path::new("dir/texture.png")));
        assert!(!config.matches(Path::new("dir/dds")));
    }

    #[test]
    fn test_set_extension() {
        let mut config = FixerConfig::default();
        config.set_extension(".png").unwrap();
        assert_eq!(config.extension, "png");
        assert!(config.set_extension("").is_err());
        assert!(config.set_extension("tar.gz").is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"signature": "89504E47", "extension": ".PNG"}}"#).unwrap();
        file.flush().unwrap();

        let config = FixerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.signature.as_bytes(), b"\x89PNG");
        assert_eq!(config.extension, "PNG");
        assert_eq!(config.short_files, ShortFilePolicy::Fail);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_from_file_rejects_bad_signature() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"signature": "zz"}}"#).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            FixerConfig::from_file(file.path()),
            Err(FixerError::Json(_))
        ));
    }

    #[test]
    fn test_event_capacity_limit() {
        let mut config = FixerConfig {
            event_capacity: MAX_EVENT_CAPACITY,
            ..FixerConfig::default()
        };
        assert!(config.validate().is_ok());
        config.event_capacity = 0;
        assert!(config.validate().is_ok());
        config.event_capacity = MAX_EVENT_CAPACITY + 1;
        assert!(matches!(
            config.validate(),
            Err(FixerError::InvalidEventCapacity(n)) if n == MAX_EVENT_CAPACITY + 1
        ));
    }

    #[test]
    fn test_from_file_rejects_huge_event_capacity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"event_capacity": {}}}"#, usize::MAX).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            FixerConfig::from_file(file.path()),
            Err(FixerError::InvalidEventCapacity(n)) if n == usize::MAX
        ));
    }
}
