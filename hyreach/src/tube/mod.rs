//! Time-indexed sequences of stars.
pub mod bloat;
pub mod builder;

use hystar::prelude::{FeasibilitySolver, Rect, StarSet};
use serde::{Deserialize, Serialize};

pub use bloat::{CornerBloater, StitchRule, TubeBloater};
pub use builder::ReachTubeBuilder;

use crate::{
    dynamics::ModeLabel,
    utils::error::{ReachError, ReachResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubeEntry {
    pub time: f64,
    pub star: StarSet,
}

/// Reach tube of one mode, strictly increasing in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TubeFields")]
pub struct ReachTube {
    mode: ModeLabel,
    entries: Vec<TubeEntry>,
}

#[derive(Deserialize)]
struct TubeFields {
    mode: ModeLabel,
    entries: Vec<TubeEntry>,
}

impl TryFrom<TubeFields> for ReachTube {
    type Error = ReachError;

    /// Stored entries must already be in increasing time order.
    fn try_from(fields: TubeFields) -> ReachResult<Self> {
        let mut tube = ReachTube::new(fields.mode);
        for entry in fields.entries {
            tube.push(entry.time, entry.star)?;
        }
        Ok(tube)
    }
}

impl ReachTube {
    pub fn new(mode: ModeLabel) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    /// Tube over `entries` in any order, e.g. as returned by worker threads.
    pub fn from_entries(mode: ModeLabel, mut entries: Vec<TubeEntry>) -> ReachResult<Self> {
        entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        let mut tube = Self::new(mode);
        for entry in entries {
            tube.push(entry.time, entry.star)?;
        }
        Ok(tube)
    }

    /// Append a star; `time` must exceed the time of the last entry.
    pub fn push(&mut self, time: f64, star: StarSet) -> ReachResult<()> {
        if let Some(last) = self.entries.last() {
            if !(time > last.time) {
                return Err(ReachError::NonMonotonicTube {
                    previous: last.time,
                    next: time,
                });
            }
        }
        self.entries.push(TubeEntry { time, star });
        Ok(())
    }

    pub fn mode(&self) -> &ModeLabel {
        &self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TubeEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TubeEntry> {
        self.entries.iter()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.time)
    }

    pub fn stars(&self) -> impl Iterator<Item = &StarSet> {
        self.entries.iter().map(|e| &e.star)
    }

    pub fn into_entries(self) -> Vec<TubeEntry> {
        self.entries
    }

    /// Bounding box of every entry, as consumed by plotting and trace aggregation.
    pub fn overapprox_rectangles(&self, solver: &FeasibilitySolver) -> ReachResult<Vec<(f64, Rect)>> {
        self.entries
            .iter()
            .map(|e| Ok((e.time, e.star.overapprox_rectangle(solver)?)))
            .collect()
    }
}
