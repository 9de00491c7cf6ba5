//! Persistent fill-mask cache.
//!
//! Computing a fill mask is the expensive part of building a filled icon,
//! and the result only depends on the icon source and the render geometry.
//! Masks are therefore stored on disk as zlib-compressed blobs, one file
//! per [`CacheKey`], and described by a JSON [`Manifest`].
//!
//! Between runs the blob directory travels as a single archive:
//!
//! ```text
//! start of run:  unpack_archive() ─► load_manifest()
//! per task:      load(key) ── miss ─► compute ─► save(mask, key)
//! end of run:    save_manifest() ─► pack_archive()
//! ```
//!
//! Because the supersampled size and the supersampling factor are part of
//! the key, a cache written for one render configuration is never picked
//! up by another.

pub mod archive;
pub mod manifest;

pub use manifest::{CacheEntry, MANIFEST_VERSION, Manifest, ManifestMetadata};

use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::mask::Mask;

/// File extension of mask blobs.
pub const BLOB_EXTENSION: &str = "mask";

/// Keys longer than this are shortened.
const MAX_KEY_LEN: usize = 200;
/// Stem characters kept when a key is shortened.
const SHORT_STEM_LEN: usize = 50;

// ============================================================================
// CacheKey
// ============================================================================

/// Deterministic identifier of a stored mask. Also its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `icon` rendered at `size` pixels with the given
    /// supersampling factor.
    ///
    /// The key is `{stem}_s{size}_ss{factor}`. Characters that are not
    /// letters, digits, `.`, `_` or `-` are dropped from the stem; when that
    /// changes it, a short hash of the original stem is appended. If the key
    /// would exceed a safe file name length, the stem is cut to 50
    /// characters followed by a short hash of the full icon path.
    pub fn compute(icon: &Path, size: u32, supersampling: f32) -> Self {
        let stem = icon
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let factor = format_factor(supersampling);

        let safe: String = stem.chars().filter(|&c| is_key_char(c)).collect();
        let key = if safe == stem {
            format!("{safe}_s{size}_ss{factor}")
        } else {
            format!("{safe}_{}_s{size}_ss{factor}", short_hash(&stem))
        };
        if key.len() <= MAX_KEY_LEN {
            return Self(key);
        }

        let parent = icon
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let short_stem: String = safe.chars().take(SHORT_STEM_LEN).collect();
        let digest = short_hash(&format!("{parent}/{stem}"));
        Self(format!("{short_stem}_{digest}_s{size}_ss{factor}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// First eight hex digits of the blake3 hash of `text`.
fn short_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex()[..8].to_string()
}

/// `2.0` prints as `2.0`, `1.25` as `1.25`: integral factors keep one
/// decimal, others keep full precision so distinct factors never collide.
fn format_factor(factor: f32) -> String {
    if factor.fract() == 0.0 {
        format!("{factor:.1}")
    } else {
        format!("{factor}")
    }
}

// ============================================================================
// MaskCache
// ============================================================================

/// Hit/miss counters for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
}

impl CacheStats {
    /// Fraction of lookups that were hits, `0.0` with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// On-disk fill-mask store.
///
/// Safe to share between worker threads: blobs are written under unique
/// names and the in-memory manifest sits behind a mutex.
pub struct MaskCache {
    dir: PathBuf,
    manifest_path: PathBuf,
    archive_path: PathBuf,
    supersampling: f32,
    manifest: Mutex<Manifest>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    writes: AtomicUsize,
}

static WRITE_SEQ: AtomicUsize = AtomicUsize::new(0);

impl MaskCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
        archive_path: impl Into<PathBuf>,
        supersampling: f32,
    ) -> Self {
        Self {
            dir: dir.into(),
            manifest_path: manifest_path.into(),
            archive_path: archive_path.into(),
            supersampling,
            manifest: Mutex::new(Manifest::new(supersampling)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn supersampling(&self) -> f32 {
        self.supersampling
    }

    /// Key for `icon` at supersampled size `size`, using this cache's factor.
    pub fn key_for(&self, icon: &Path, size: u32) -> CacheKey {
        CacheKey::compute(icon, size, self.supersampling)
    }

    /// Path of the blob stored under `key`.
    pub fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.{BLOB_EXTENSION}"))
    }

    /// Looks up a mask. Any kind of damage is logged and reported as a miss.
    pub fn load(&self, key: &CacheKey) -> Option<Mask> {
        let mask = self.read_blob(key);
        let counter = if mask.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        mask
    }

    fn read_blob(&self, key: &CacheKey) -> Option<Mask> {
        let path = self.blob_path(key);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("cache: cannot read `{}`: {e}", path.display());
                return None;
            }
        };

        let mut raw = Vec::new();
        if let Err(e) = ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut raw) {
            log::warn!("cache: cannot decompress `{}`: {e}", path.display());
            return None;
        }

        let side = raw.len().isqrt();
        if raw.is_empty() || side * side != raw.len() {
            log::warn!(
                "cache: `{}` holds {} bytes, not a square mask",
                path.display(),
                raw.len()
            );
            return None;
        }

        let expected = self
            .manifest
            .lock()
            .get(key.as_str())
            .map(|entry| entry.hash.clone());
        if let Some(expected) = expected {
            if expected != blake3::hash(&raw).to_hex().as_str() {
                log::warn!("cache: content hash mismatch for `{key}`");
                return None;
            }
        }

        Mask::from_raw(side as u32, raw)
    }

    /// Stores `mask` under `key` and records it in the in-memory manifest.
    ///
    /// The manifest only reaches disk on [`save_manifest`](Self::save_manifest).
    pub fn save(&self, mask: &Mask, key: &CacheKey) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io(self.dir.clone(), e))?;

        let raw = mask.as_bytes();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        let path = self.blob_path(key);
        encoder
            .write_all(raw)
            .map_err(|e| CacheError::Io(path.clone(), e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| CacheError::Io(path.clone(), e))?;

        // Written under a unique name, then renamed into place.
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let partial = self
            .dir
            .join(format!("{key}.{}-{seq}.partial", std::process::id()));
        fs::write(&partial, &compressed).map_err(|e| CacheError::Io(partial.clone(), e))?;
        fs::rename(&partial, &path).map_err(|e| CacheError::Io(path.clone(), e))?;

        let entry = CacheEntry {
            created_at: chrono::Utc::now().to_rfc3339(),
            size: compressed.len() as u64,
            original_size: raw.len() as u64,
            shape: [mask.width(), mask.height()],
            hash: blake3::hash(raw).to_hex().to_string(),
        };
        self.manifest.lock().insert(key.as_str(), entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Replaces the in-memory manifest with the one on disk (or an empty one).
    pub fn load_manifest(&self) {
        let manifest = Manifest::load_or_default(&self.manifest_path, self.supersampling);
        log::info!("cache: manifest lists {} masks", manifest.len());
        *self.manifest.lock() = manifest;
    }

    /// Writes the in-memory manifest to disk.
    pub fn save_manifest(&self) -> Result<(), CacheError> {
        let snapshot = {
            let mut manifest = self.manifest.lock();
            manifest.refresh_metadata(self.supersampling);
            manifest.clone()
        };
        snapshot.save(&self.manifest_path)
    }

    /// Returns a copy of the in-memory manifest.
    pub fn manifest(&self) -> Manifest {
        self.manifest.lock().clone()
    }

    /// Bundles all blobs (not the manifest) into the archive file.
    pub fn pack_archive(&self) -> Result<usize, CacheError> {
        let count = archive::pack(&self.dir, BLOB_EXTENSION, &self.archive_path)?;
        log::info!(
            "cache: packed {count} masks into `{}`",
            self.archive_path.display()
        );
        Ok(count)
    }

    /// Restores blobs from the archive. `Ok(false)` when there is none yet.
    pub fn unpack_archive(&self) -> Result<bool, CacheError> {
        let unpacked = archive::unpack(&self.archive_path, &self.dir)?;
        if unpacked {
            log::info!(
                "cache: restored masks from `{}`",
                self.archive_path.display()
            );
        } else {
            log::debug!("cache: no archive at `{}`", self.archive_path.display());
        }
        Ok(unpacked)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MaskCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskCache")
            .field("dir", &self.dir)
            .field("supersampling", &self.supersampling)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir, supersampling: f32) -> MaskCache {
        MaskCache::new(
            dir.path().join("masks"),
            dir.path().join("manifest.json"),
            dir.path().join("masks.tar.gz"),
            supersampling,
        )
    }

    fn checkerboard(side: u32) -> Mask {
        let mut mask = Mask::new(side, side);
        for y in 0..side {
            for x in 0..side {
                mask.set(x, y, (x + y) % 3 == 0);
            }
        }
        mask
    }

    #[test]
    fn key_is_deterministic() {
        let path = Path::new("/icons/svgs/phone.svg");
        assert_eq!(
            CacheKey::compute(path, 864, 2.0),
            CacheKey::compute(path, 864, 2.0)
        );
        assert_eq!(CacheKey::compute(path, 864, 2.0).as_str(), "phone_s864_ss2.0");
    }

    #[test]
    fn key_changes_with_every_input() {
        let base = CacheKey::compute(Path::new("a/phone.svg"), 864, 2.0);
        assert_ne!(base, CacheKey::compute(Path::new("a/camera.svg"), 864, 2.0));
        assert_ne!(base, CacheKey::compute(Path::new("a/phone.svg"), 432, 2.0));
        assert_ne!(base, CacheKey::compute(Path::new("a/phone.svg"), 864, 3.0));
        assert_ne!(base, CacheKey::compute(Path::new("a/phone.svg"), 864, 2.05));
    }

    #[test]
    fn key_strips_unsafe_characters() {
        let key = CacheKey::compute(Path::new("x/we!rd na$me.svg"), 10, 1.0);
        assert!(key.as_str().starts_with("werdname_"));
        assert!(key.as_str().ends_with("_s10_ss1.0"));
        assert!(key.as_str().chars().all(is_key_char));
        assert_ne!(key, CacheKey::compute(Path::new("x/weirdname.svg"), 10, 1.0));
        assert_ne!(key, CacheKey::compute(Path::new("x/we?rd na#me.svg"), 10, 1.0));
    }

    #[test]
    fn non_latin_stems_stay_distinct() {
        let phone = CacheKey::compute(Path::new("svg/电话.svg"), 864, 2.0);
        let camera = CacheKey::compute(Path::new("svg/相机.svg"), 864, 2.0);
        assert_ne!(phone, camera);
        assert_eq!(phone.as_str(), "电话_s864_ss2.0");
    }

    #[test]
    fn long_stems_are_shortened_with_path_hash() {
        let stem = "a".repeat(240);
        let one = CacheKey::compute(&Path::new("one").join(format!("{stem}.svg")), 864, 2.0);
        let two = CacheKey::compute(&Path::new("two").join(format!("{stem}.svg")), 864, 2.0);
        assert!(one.as_str().len() <= MAX_KEY_LEN);
        assert!(one.as_str().starts_with(&"a".repeat(SHORT_STEM_LEN)));
        assert!(one.as_str().ends_with("_s864_ss2.0"));
        assert_ne!(one, two);
    }

    #[test]
    fn long_stems_sharing_a_prefix_stay_distinct() {
        let prefix = "p".repeat(200);
        let left = CacheKey::compute(Path::new(&format!("svg/{prefix}_left.svg")), 864, 2.0);
        let right = CacheKey::compute(Path::new(&format!("svg/{prefix}_right.svg")), 864, 2.0);
        assert!(left.as_str().len() <= MAX_KEY_LEN);
        assert_ne!(left, right);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2.0);
        let mask = checkerboard(48);
        let key = cache.key_for(Path::new("svgs/clock.svg"), 48);

        cache.save(&mask, &key).unwrap();
        assert_eq!(cache.load(&key), Some(mask));

        let entry = cache.manifest().get(key.as_str()).cloned().unwrap();
        assert_eq!(entry.shape, [48, 48]);
        assert_eq!(entry.original_size, 48 * 48);
    }

    #[test]
    fn missing_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2.0);
        assert!(cache.load(&CacheKey("nothing".into())).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn non_square_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2.0);
        let key = CacheKey("broken".into());
        fs::create_dir_all(cache.dir()).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[255u8; 15]).unwrap();
        fs::write(cache.blob_path(&key), encoder.finish().unwrap()).unwrap();

        assert!(cache.load(&key).is_none());
    }

    #[test]
    fn undecodable_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2.0);
        let key = CacheKey("garbage".into());
        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.blob_path(&key), b"definitely not zlib").unwrap();

        assert!(cache.load(&key).is_none());
    }

    #[test]
    fn tampered_blob_fails_hash_check() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 2.0);
        let key = CacheKey("tampered".into());
        cache.save(&checkerboard(8), &key).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[0u8; 64]).unwrap();
        fs::write(cache.blob_path(&key), encoder.finish().unwrap()).unwrap();

        assert!(cache.load(&key).is_none());
    }

    #[test]
    fn manifest_and_archive_survive_a_new_run() {
        let dir = TempDir::new().unwrap();
        let key = CacheKey::compute(Path::new("svgs/mail.svg"), 32, 2.0);
        let mask = checkerboard(32);
        {
            let cache = cache_in(&dir, 2.0);
            cache.save(&mask, &key).unwrap();
            cache.save_manifest().unwrap();
            assert_eq!(cache.pack_archive().unwrap(), 1);
        }
        fs::remove_dir_all(dir.path().join("masks")).unwrap();

        let cache = cache_in(&dir, 2.0);
        assert!(cache.unpack_archive().unwrap());
        cache.load_manifest();
        assert_eq!(cache.manifest().metadata.total_masks, 1);
        assert_eq!(cache.load(&key), Some(mask));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            writes: 0,
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
