//! Runtime configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file
//! (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Compression applied to written bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zlib,
}

impl Compression {
    /// Tag byte stored in the bytecode header.
    pub fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Zlib => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zlib),
            _ => None,
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "zlib" => Ok(Compression::Zlib),
            other => Err(format!("unknown compression: {other}")),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zlib => "zlib",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Print the full error chain instead of the one-line message
    pub debug: bool,
    /// Deepest allowed nesting of method and block frames
    pub max_call_depth: usize,
    pub compression: Compression,
    /// Name of the static method execution starts from
    pub entrypoint: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_call_depth: 1000,
            compression: Compression::None,
            entrypoint: "main".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| {
            crate::error::CompileError::io_error(format!("{}: {}", path.display(), e.message()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(!config.debug);
        assert_eq!(config.max_call_depth, 1000);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.entrypoint, "main");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RuntimeConfig::from_toml("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = RuntimeConfig::from_toml("debug = true\ncompression = \"gzip\"\n").unwrap();
        assert!(config.debug);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.max_call_depth, 1000);
    }

    #[test]
    fn test_unknown_compression_rejected() {
        assert!(RuntimeConfig::from_toml("compression = \"lz4\"").is_err());
        assert!("lz4".parse::<Compression>().is_err());
        assert_eq!("ZLIB".parse::<Compression>(), Ok(Compression::Zlib));
    }

    #[test]
    fn test_compression_tag_round_trip() {
        for c in [Compression::None, Compression::Gzip, Compression::Zlib] {
            assert_eq!(Compression::from_tag(c.tag()), Some(c));
        }
        assert_eq!(Compression::from_tag(9), None);
    }
}
