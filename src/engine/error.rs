use chrono::NaiveDate;
use thiserror::Error;

use crate::storage::entities::{TaskId, UserId};

/// Errors surfaced by the activity engine. Unknown tags and missing aggregates are not errors.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// Other writers kept changing the same day. Retrying the whole request later is fine.
    #[error("aggregate of {user} on {date} kept changing, gave up after {attempts} attempts")]
    Conflict {
        user: UserId,
        date: NaiveDate,
        attempts: usize,
    },

    #[error("task {id} not found")]
    TaskNotFound { id: TaskId },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ActivityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ActivityError::Conflict { .. })
    }
}
