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

use thiserror::Error;

/// Join search error types
///
/// Only whole-search failures are represented here. A single split that the
/// planner refuses to join is part of normal pruning and never surfaces.
#[derive(Debug, Error)]
pub enum JoinSearchError {
    #[error("Failed to build any {relations}-way join{}", worker_suffix(.worker))]
    UnreachableJoin { relations: usize, worker: Option<usize> },

    #[error("Unsupported tree shape selector: {0} (expected 2 for left-deep or 3 for bushy)")]
    UnsupportedTreeShape(u8),

    #[error("Too many relations to join: {count} (maximum is {max})")]
    TooManyRelations { count: usize, max: usize },

    #[error("Relation count mismatch: expected {expected}, got {actual} input relations")]
    RelationCountMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn worker_suffix(worker: &Option<usize>) -> String {
    worker.map(|w| format!(" in worker {w}")).unwrap_or_default()
}

impl From<serde_json::Error> for JoinSearchError {
    fn from(err: serde_json::Error) -> Self {
        JoinSearchError::Serialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for JoinSearchError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        JoinSearchError::ThreadPool(err.to_string())
    }
}

/// Type alias for join search results
pub type JoinSearchResult<T> = Result<T, JoinSearchError>;
