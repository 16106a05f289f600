use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StowConfig {
    #[serde(default)]
    pub source: StorageSource,
}

impl StowConfig {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            source: StorageSource::Directory { path: path.into() },
        }
    }
}

/// Where item bytes are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSource {
    /// Volatile storage, lost when the store is dropped.
    #[default]
    Memory,
    /// One directory on the local file system, created on first write.
    Directory { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StowConfig::default();
        assert_eq!(c.source, StorageSource::Memory);
    }

    #[test]
    fn directory_config() {
        let c = StowConfig::directory("/var/lib/stow");
        assert_eq!(
            c.source,
            StorageSource::Directory { path: PathBuf::from("/var/lib/stow") }
        );
    }

    #[test]
    fn json_shape() {
        let c: StowConfig =
            serde_json::from_str(r#"{"source": {"kind": "directory", "path": "data"}}"#).unwrap();
        assert_eq!(c, StowConfig::directory("data"));

        let c: StowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.source, StorageSource::Memory);

        let json = serde_json::to_string(&StowConfig::default()).unwrap();
        assert_eq!(json, r#"{"source":{"kind":"memory"}}"#);
    }
}
