//! The cache manifest: a JSON side file describing every stored mask.
//!
//! ```json
//! {
//!   "metadata": {
//!     "version": 1,
//!     "totalMasks": 2,
//!     "totalBytes": 5120,
//!     "supersampling": 2.0,
//!     "updatedAt": "2026-01-01T00:00:00+00:00"
//!   },
//!   "entries": {
//!     "phone_s864_ss2.0": {
//!       "createdAt": "2026-01-01T00:00:00+00:00",
//!       "size": 2560,
//!       "originalSize": 746496,
//!       "shape": [864, 864],
//!       "hash": "9f2c..."
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Format version written into new manifests.
pub const MANIFEST_VERSION: u32 = 1;

/// Record describing one stored mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Compressed blob size in bytes.
    pub size: u64,
    /// Raw mask size in bytes.
    pub original_size: u64,
    /// `[width, height]` of the mask.
    pub shape: [u32; 2],
    /// blake3 hex digest of the raw mask bytes.
    pub hash: String,
}

/// Header of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub version: u32,
    pub total_masks: usize,
    pub total_bytes: u64,
    /// Supersampling factor in effect when the manifest was written.
    pub supersampling: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// All known cache entries plus summary metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new(supersampling: f32) -> Self {
        Self {
            metadata: ManifestMetadata {
                version: MANIFEST_VERSION,
                total_masks: 0,
                total_bytes: 0,
                supersampling,
                updated_at: None,
            },
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recomputes totals and stamps the update time.
    pub fn refresh_metadata(&mut self, supersampling: f32) {
        self.metadata.version = MANIFEST_VERSION;
        self.metadata.total_masks = self.entries.len();
        self.metadata.total_bytes = self.entries.values().map(|e| e.size).sum();
        self.metadata.supersampling = supersampling;
        self.metadata.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Serializes the manifest to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a manifest, falling back to an empty one.
    ///
    /// A missing file is the normal first-run case. An unreadable,
    /// malformed or foreign-version file is logged and discarded.
    pub fn load_or_default(path: &Path, supersampling: f32) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::new(supersampling);
            }
            Err(e) => {
                log::warn!("cache: cannot read manifest `{}`: {e}; starting empty", path.display());
                return Self::new(supersampling);
            }
        };

        match Self::from_json(&text) {
            Ok(manifest) if manifest.metadata.version == MANIFEST_VERSION => manifest,
            Ok(manifest) => {
                log::warn!(
                    "cache: manifest version {} is not supported; starting empty",
                    manifest.metadata.version
                );
                Self::new(supersampling)
            }
            Err(e) => {
                log::warn!("cache: manifest `{}` is corrupt: {e}; starting empty", path.display());
                Self::new(supersampling)
            }
        }
    }

    /// Writes the manifest as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io(parent.to_path_buf(), e))?;
        }
        let json = self.to_json_pretty()?;
        fs::write(path, json).map_err(|e| CacheError::Io(path.to_path_buf(), e))
    }
}
