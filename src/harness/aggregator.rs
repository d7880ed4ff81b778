//! Collects per-actor results and produces the final report model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::actor::ActorSet;
use crate::outcome::{Status, TestRunResult};

/// Default hero predicate: prefer desktop-class renderings
pub fn default_is_primary(category: &str) -> bool {
    category.contains("Desktop")
}

/// All results sharing a category, in actor declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub results: Vec<TestRunResult>,
}

/// Overall run classification for exit-code decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunVerdict {
    /// Every actor is New or Match
    Clean,
    /// At least one Mismatch, no failures
    Regressed,
    /// At least one actor failed
    Failed,
}

/// Final, immutable output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Categories in order of first appearance
    pub categories: Vec<CategoryGroup>,

    /// Actor name of the headline result
    pub hero: Option<String>,
}

impl ReportModel {
    /// All results, category by category
    pub fn results(&self) -> impl Iterator<Item = &TestRunResult> {
        self.categories.iter().flat_map(|g| g.results.iter())
    }

    pub fn result(&self, actor: &str) -> Option<&TestRunResult> {
        self.results().find(|r| r.actor == actor)
    }

    pub fn hero(&self) -> Option<&TestRunResult> {
        self.hero.as_deref().and_then(|name| self.result(name))
    }

    pub fn count(&self, status: Status) -> usize {
        self.results().filter(|r| r.status == status).count()
    }

    /// Actors that reached a non-failed terminal state
    pub fn completed(&self) -> usize {
        self.results().filter(|r| !r.is_failed()).count()
    }

    pub fn verdict(&self) -> RunVerdict {
        if self.count(Status::Failed) > 0 {
            RunVerdict::Failed
        } else if self.count(Status::Mismatch) > 0 {
            RunVerdict::Regressed
        } else {
            RunVerdict::Clean
        }
    }

    pub fn is_success(&self) -> bool {
        self.verdict() == RunVerdict::Clean
    }
}

#[derive(Debug, Default)]
struct Slots {
    /// One slot per declared actor
    declared: Vec<Option<TestRunResult>>,
    /// Results for actors outside the declared set, in arrival order
    extra: Vec<TestRunResult>,
}

/// Thread-safe accumulator. Results land in actor declaration order no
/// matter which order workers report them in.
#[derive(Debug)]
pub struct Aggregator {
    index: HashMap<String, usize>,
    slots: Mutex<Slots>,
    started_at: DateTime<Utc>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(&ActorSet::default())
    }
}

impl Aggregator {
    pub fn new(actors: &ActorSet) -> Self {
        let index = actors
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        Self {
            index,
            slots: Mutex::new(Slots {
                declared: vec![None; actors.len()],
                extra: Vec::new(),
            }),
            started_at: Utc::now(),
        }
    }

    /// Record one actor's result. A second result for the same actor replaces the first.
    pub fn record(&self, result: TestRunResult) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match self.index.get(&result.actor) {
            Some(&i) => slots.declared[i] = Some(result),
            None => {
                if let Some(existing) = slots.extra.iter_mut().find(|r| r.actor == result.actor) {
                    *existing = result;
                } else {
                    slots.extra.push(result);
                }
            }
        }
    }

    /// Number of results recorded so far
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.declared.iter().flatten().count() + slots.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group results by category and pick the hero.
    ///
    /// The hero is the first result of the first category satisfying
    /// `is_primary`, or the first result overall when none does.
    pub fn finalize<F>(self, is_primary: F) -> ReportModel
    where
        F: Fn(&str) -> bool,
    {
        let slots = self.slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let ordered: Vec<TestRunResult> = slots.declared.into_iter().flatten().chain(slots.extra).collect();

        let mut categories: Vec<CategoryGroup> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for result in ordered {
            let pos = *positions.entry(result.category.clone()).or_insert_with(|| {
                categories.push(CategoryGroup {
                    category: result.category.clone(),
                    results: Vec::new(),
                });
                categories.len() - 1
            });
            categories[pos].results.push(result);
        }

        let hero = categories
            .iter()
            .find(|g| is_primary(&g.category))
            .or_else(|| categories.first())
            .and_then(|g| g.results.first())
            .map(|r| r.actor.clone());

        ReportModel {
            started_at: self.started_at,
            finished_at: Utc::now(),
            categories,
            hero,
        }
    }
}
