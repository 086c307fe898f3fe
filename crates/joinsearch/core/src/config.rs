// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Join search configuration

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{JoinSearchError, JoinSearchResult};
use crate::partition::constrained_groups;
use crate::relids::MAX_JOIN_RELATIONS;

/// Shape of the join trees a search explores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeShape {
    /// Every join has a single base relation as its inner input
    #[default]
    LeftDeep,
    /// Both inputs of a join may be join results
    Bushy,
}

impl TreeShape {
    /// Numeric selector: 2 for left-deep, 3 for bushy
    pub fn selector(self) -> u8 {
        match self {
            TreeShape::LeftDeep => 2,
            TreeShape::Bushy => 3,
        }
    }

    /// Relations per constrained group, which is also the selector
    pub fn group_size(self) -> usize {
        self.selector() as usize
    }
}

impl TryFrom<u8> for TreeShape {
    type Error = JoinSearchError;

    fn try_from(selector: u8) -> Result<Self, Self::Error> {
        match selector {
            2 => Ok(TreeShape::LeftDeep),
            3 => Ok(TreeShape::Bushy),
            other => Err(JoinSearchError::UnsupportedTreeShape(other)),
        }
    }
}

impl fmt::Display for TreeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeShape::LeftDeep => write!(f, "left-deep"),
            TreeShape::Bushy => write!(f, "bushy"),
        }
    }
}

/// How worker bodies are scheduled on the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExecution {
    /// Workers run in parallel, each on its own planner clone
    #[default]
    Concurrent,
    /// One lock is held for each whole worker body, so workers run one at a time
    Serialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSearchConfig {
    pub workers: usize,
    pub tree_shape: TreeShape,
    pub execution: WorkerExecution,
    /// Pool size, defaults to one thread per worker up to the available cores
    pub threads: Option<usize>,
    /// Use level-by-level search when the relations do not split into whole groups
    pub standard_fallback: bool,
}

impl Default for JoinSearchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            tree_shape: TreeShape::LeftDeep,
            execution: WorkerExecution::Concurrent,
            threads: None,
            standard_fallback: true,
        }
    }
}

impl JoinSearchConfig {
    pub fn new(workers: usize, tree_shape: TreeShape) -> Self {
        Self {
            workers,
            tree_shape,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> JoinSearchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `JOIN_SEARCH_WORKERS`, `JOIN_SEARCH_TREE_SHAPE` and `JOIN_SEARCH_THREADS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the environment keys
    ///
    /// Values that do not parse are logged and leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(workers) = lookup("JOIN_SEARCH_WORKERS") {
            match workers.parse::<usize>() {
                Ok(workers) => config.workers = workers,
                Err(_) => tracing::warn!(value = %workers, "Invalid JOIN_SEARCH_WORKERS, using default"),
            }
        }

        if let Some(shape) = lookup("JOIN_SEARCH_TREE_SHAPE") {
            let parsed = shape
                .parse::<u8>()
                .map_err(|_| JoinSearchError::InvalidConfiguration(format!("tree shape selector {shape}")))
                .and_then(TreeShape::try_from);
            match parsed {
                Ok(shape) => config.tree_shape = shape,
                Err(err) => tracing::warn!(error = %err, "Invalid JOIN_SEARCH_TREE_SHAPE, using default"),
            }
        }

        if let Some(threads) = lookup("JOIN_SEARCH_THREADS") {
            match threads.parse::<usize>() {
                Ok(threads) => config.threads = Some(threads),
                Err(_) => tracing::warn!(value = %threads, "Invalid JOIN_SEARCH_THREADS, using default"),
            }
        }

        config
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tree_shape(mut self, tree_shape: TreeShape) -> Self {
        self.tree_shape = tree_shape;
        self
    }

    pub fn with_execution(mut self, execution: WorkerExecution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_standard_fallback(mut self, enabled: bool) -> Self {
        self.standard_fallback = enabled;
        self
    }

    /// Pool size actually used for a search
    pub fn pool_threads(&self) -> usize {
        let threads = self.threads.unwrap_or_else(|| {
            let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
            self.workers.min(cores)
        });
        threads.max(1)
    }

    /// Checks the configuration against a join of `levels_needed` relations
    ///
    /// Every worker constrains one group per bit of its part id, and each of
    /// those groups has to name relations that exist.
    pub fn validate(&self, levels_needed: usize) -> JoinSearchResult<()> {
        if levels_needed == 0 {
            return Err(JoinSearchError::InvalidConfiguration("no relations to join".to_string()));
        }
        if levels_needed > MAX_JOIN_RELATIONS {
            return Err(JoinSearchError::TooManyRelations {
                count: levels_needed,
                max: MAX_JOIN_RELATIONS,
            });
        }
        if self.workers == 0 {
            return Err(JoinSearchError::InvalidConfiguration("at least one worker is required".to_string()));
        }
        if self.threads == Some(0) {
            return Err(JoinSearchError::InvalidConfiguration("thread pool size must be positive".to_string()));
        }

        let max_workers = 1usize << (MAX_JOIN_RELATIONS / self.tree_shape.group_size());
        if self.workers > max_workers {
            return Err(JoinSearchError::InvalidConfiguration(format!(
                "{} workers requested, {} trees support at most {}",
                self.workers, self.tree_shape, max_workers
            )));
        }

        let constrained = constrained_groups(self.workers) * self.tree_shape.group_size();
        if constrained > levels_needed {
            return Err(JoinSearchError::InvalidConfiguration(format!(
                "{} workers constrain {} relations but only {} are joined",
                self.workers, constrained, levels_needed
            )));
        }

        if !self.workers.is_power_of_two() {
            tracing::warn!(
                workers = self.workers,
                "Worker count is not a power of two, some combinations of group orientations are never explored"
            );
        }

        Ok(())
    }
}
