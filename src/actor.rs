//! Actor descriptors and the run file they are loaded from.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// A configured capture target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// Unique key; also the artifact file stem
    pub name: String,

    /// Grouping label used by the report
    pub category: String,

    /// Provider-specific configuration, passed through untouched
    #[serde(default)]
    pub capture: serde_json::Value,
}

impl Actor {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            capture: serde_json::Value::Null,
        }
    }

    pub fn with_capture(mut self, capture: serde_json::Value) -> Self {
        self.capture = capture;
        self
    }
}

/// Errors from loading or validating actors
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Duplicate actor name: {0}")]
    DuplicateName(String),

    #[error("Invalid actor name {0:?}: names must be non-empty and contain no path separators")]
    InvalidName(String),

    #[error("Failed to read run file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse run file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The ordered, validated actor list for one run. Declaration order is kept.
#[derive(Debug, Clone, Default)]
pub struct ActorSet {
    actors: Vec<Arc<Actor>>,
}

impl ActorSet {
    /// Validate and wrap an actor list.
    pub fn new(actors: Vec<Actor>) -> Result<Self, ActorError> {
        let mut seen = HashSet::new();
        for actor in &actors {
            validate_name(&actor.name)?;
            if !seen.insert(actor.name.as_str()) {
                return Err(ActorError::DuplicateName(actor.name.clone()));
            }
        }
        Ok(Self {
            actors: actors.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Actor>> {
        self.actors.iter()
    }

    /// Position of an actor in declaration order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.actors.iter().position(|a| a.name == name)
    }
}

/// Contents of a run file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    /// Actors in declaration order
    pub actors: Vec<Actor>,

    /// Optional artifact root overriding the configured default
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl RunFile {
    /// Parse a run file from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ActorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a run file from disk
    pub fn load(path: &Path) -> Result<Self, ActorError> {
        let json = fs::read_to_string(path).map_err(|source| ActorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Validate the actor list
    pub fn actor_set(&self) -> Result<ActorSet, ActorError> {
        ActorSet::new(self.actors.clone())
    }
}

fn validate_name(name: &str) -> Result<(), ActorError> {
    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(ActorError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_set_keeps_declaration_order() {
        let set = ActorSet::new(vec![
            Actor::new("Mobile_Lead", "Mobile Originals"),
            Actor::new("Desktop_Star", "Desktop Hits"),
            Actor::new("Tablet_Support", "Tablet Features"),
        ])
        .unwrap();
        let names: Vec<_> = set.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Mobile_Lead", "Desktop_Star", "Tablet_Support"]);
        assert_eq!(set.position("Tablet_Support"), Some(2));
        assert_eq!(set.position("Nobody"), None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ActorSet::new(vec![Actor::new("A", "x"), Actor::new("A", "y")]).unwrap_err();
        assert!(matches!(err, ActorError::DuplicateName(name) if name == "A"));
    }

    #[test]
    fn test_path_like_names_rejected() {
        for name in ["", "  ", "..", "a/b", "a\\b"] {
            let err = ActorSet::new(vec![Actor::new(name, "x")]).unwrap_err();
            assert!(matches!(err, ActorError::InvalidName(_)), "{name:?} accepted");
        }
    }

    #[test]
    fn test_run_file_parse() {
        let run = RunFile::from_json(
            r#"{
                "actors": [
                    { "name": "Mobile_Lead", "category": "Mobile Originals",
                      "capture": { "device": "iPhone 14" } },
                    { "name": "Desktop_Star", "category": "Desktop Hits" }
                ],
                "output_dir": "./dailies"
            }"#,
        )
        .unwrap();
        assert_eq!(run.output_dir, Some(PathBuf::from("./dailies")));
        assert_eq!(run.actors[0].capture["device"], "iPhone 14");
        assert!(run.actors[1].capture.is_null());
        assert_eq!(run.actor_set().unwrap().len(), 2);
    }
}
