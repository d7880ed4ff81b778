//! On-disk artifact store: baselines, current captures and diff overlays.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/baseline/<actor>.png
//! <root>/current/<actor>.png
//! <root>/diff/<actor>.png
//! ```
//!
//! This is the only place that turns actor keys into paths. Every write goes
//! to a temporary file in the destination directory, is flushed and synced,
//! then renamed into place, so readers see either the old file or the new one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{self, CodecError, PixelBuffer};

const EXTENSION: &str = "png";

/// The three parallel artifact sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Baseline,
    Current,
    Diff,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Baseline, ArtifactKind::Current, ArtifactKind::Diff];

    fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Baseline => "baseline",
            ArtifactKind::Current => "current",
            ArtifactKind::Diff => "diff",
        }
    }
}

/// Stable reference to a stored artifact. Resolve with [`BaselineStore::locate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub actor: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, actor: impl Into<String>) -> Self {
        Self {
            kind,
            actor: actor.into(),
        }
    }
}

/// A persisted reference image
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRecord {
    pub actor: String,
    pub image: PixelBuffer,
}

impl BaselineRecord {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// What the baseline policy decided for a capture
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineDecision {
    /// The capture was written as the new baseline; nothing to compare
    Created,
    /// An accepted baseline exists and the capture must be compared to it
    Compare(BaselineRecord),
}

/// Errors from the artifact store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt artifact {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: PathBuf,
}

impl BaselineStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store and make sure all three artifact directories exist
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(root);
        store.ensure_layout()?;
        Ok(store)
    }

    /// Create the baseline, current and diff directories if missing
    pub fn ensure_layout(&self) -> StoreResult<()> {
        for kind in ArtifactKind::ALL {
            let dir = self.dir(kind);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one artifact set
    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Path of one artifact
    pub fn path(&self, kind: ArtifactKind, actor: &str) -> PathBuf {
        self.dir(kind).join(format!("{}.{}", actor, EXTENSION))
    }

    /// Path behind an artifact reference
    pub fn locate(&self, artifact: &ArtifactRef) -> PathBuf {
        self.path(artifact.kind, &artifact.actor)
    }

    /// Read the accepted baseline for `actor`, if any
    pub fn resolve(&self, actor: &str) -> StoreResult<Option<BaselineRecord>> {
        let path = self.path(ArtifactKind::Baseline, actor);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let image = codec::decode_png(&bytes).map_err(|source| StoreError::Codec {
            path: path.clone(),
            source,
        })?;
        Ok(Some(BaselineRecord {
            actor: actor.to_string(),
            image,
        }))
    }

    /// Atomically replace the baseline for `actor`
    pub fn write(&self, actor: &str, image: &PixelBuffer) -> StoreResult<ArtifactRef> {
        self.put(ArtifactKind::Baseline, actor, image)
    }

    /// Persist the latest capture for `actor`
    pub fn write_current(&self, actor: &str, image: &PixelBuffer) -> StoreResult<ArtifactRef> {
        self.put(ArtifactKind::Current, actor, image)
    }

    /// Persist the highlight overlay for `actor`
    pub fn write_diff(&self, actor: &str, image: &PixelBuffer) -> StoreResult<ArtifactRef> {
        self.put(ArtifactKind::Diff, actor, image)
    }

    /// Remove a diff overlay left behind by an earlier run. Missing files are fine.
    pub fn clear_diff(&self, actor: &str) -> StoreResult<()> {
        let path = self.path(ArtifactKind::Diff, actor);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale diff");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Apply the baseline policy: with no baseline, or when `update` is set,
    /// the capture becomes the baseline. Otherwise the existing record is
    /// returned for comparison.
    pub fn decide(&self, actor: &str, current: &PixelBuffer, update: bool) -> StoreResult<BaselineDecision> {
        if !update {
            if let Some(record) = self.resolve(actor)? {
                return Ok(BaselineDecision::Compare(record));
            }
        }
        self.write(actor, current)?;
        Ok(BaselineDecision::Created)
    }

    fn put(&self, kind: ArtifactKind, actor: &str, image: &PixelBuffer) -> StoreResult<ArtifactRef> {
        let target = self.path(kind, actor);
        let bytes = codec::encode_png(image).map_err(|source| StoreError::Codec {
            path: target.clone(),
            source,
        })?;
        write_atomic(&target, &bytes)?;
        debug!(path = %target.display(), bytes = bytes.len(), "artifact written");
        Ok(ArtifactRef::new(kind, actor))
    }
}

/// Mode of every persisted artifact; temp files start out owner-only.
#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o644;

/// Write `bytes` to `target` through a synced temp file and a rename.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(ARTIFACT_MODE))
            .map_err(|e| StoreError::io(tmp.path(), e))?;
    }
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
    if let Err(e) = tmp.persist(target) {
        let error = e.error;
        warn!(path = %target.display(), %error, "atomic rename failed");
        return Err(StoreError::io(target, error));
    }
    Ok(())
}
