//! Pre-rendered image source.
//!
//! Serves `<dir>/<name>.png` for each actor, where `name` is the actor's
//! `capture.file` entry when present and the actor name otherwise. Any process
//! that renders screenshots ahead of time (a browser script, a CI job) can
//! feed the comparison engine through this provider.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::types::{CaptureError, CaptureOutcome, CaptureProvider, CaptureResult};
use crate::actor::Actor;
use crate::codec;

#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that backs `actor`. A `capture.file` override must stay inside
    /// the source directory.
    pub fn source_path(&self, actor: &Actor) -> CaptureOutcome<PathBuf> {
        match actor.capture.get("file").and_then(|v| v.as_str()) {
            Some(file) => {
                let rel = Path::new(file);
                let contained = rel.components().next().is_some()
                    && rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
                if !contained {
                    return Err(CaptureError::InvalidSource(file.to_string()));
                }
                Ok(self.dir.join(rel))
            }
            None => Ok(self.dir.join(format!("{}.png", actor.name))),
        }
    }

    /// Actor names for every PNG in the directory, sorted
    pub fn discover(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl CaptureProvider for DirectorySource {
    fn capture(&self, actor: &Actor) -> CaptureOutcome<CaptureResult> {
        let path = self.source_path(actor)?;
        if !path.is_file() {
            return Err(CaptureError::SourceMissing(path));
        }
        let bytes = fs::read(&path)?;
        let image = codec::decode_png(&bytes)?;

        let mut result = CaptureResult::new(&actor.name, image);
        result.metadata = Some(serde_json::json!({
            "source": path.display().to_string(),
        }));
        Ok(result)
    }

    fn source_type(&self) -> &str {
        "directory"
    }
}
