use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = Arc<str>;
pub type TagId = Arc<str>;
pub type TaskId = Arc<str>;

/// Weight per tag. Ordered so that snapshots built from it are deterministic.
pub type TagWeights = BTreeMap<TagId, i64>;

/// The per user, per local day activity record. `total_weight` always equals the sum of
/// `tag_weights`, and neither is ever negative once written.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct DailyAggregateEntity {
    pub user_id: UserId,
    /// Serialized as `%Y-%m-%d`.
    pub date: NaiveDate,
    pub total_weight: i64,
    #[serde(default)]
    pub tag_weights: TagWeights,
    /// Bumped by storage on every successful write. 0 means never written.
    #[serde(default)]
    pub revision: u64,
}

impl DailyAggregateEntity {
    pub fn empty(user_id: UserId, date: NaiveDate) -> Self {
        Self {
            user_id,
            date,
            total_weight: 0,
            tag_weights: TagWeights::new(),
            revision: 0,
        }
    }

    pub fn weight_of(&self, tag: &str) -> i64 {
        self.tag_weights.get(tag).copied().unwrap_or(0)
    }

    /// Adds a signed per tag delta. Any tag that would drop below zero is clamped to zero and
    /// reported back, the total is then recomputed from the breakdown.
    pub fn apply_delta(&mut self, delta: &TagWeights) -> Vec<TagId> {
        let mut clamped = Vec::new();
        for (tag, weight) in delta {
            let entry = self.tag_weights.entry(tag.clone()).or_insert(0);
            *entry += weight;
        }
        for (tag, weight) in self.tag_weights.iter_mut() {
            if *weight < 0 {
                clamped.push(tag.clone());
                *weight = 0;
            }
        }
        self.total_weight = self.tag_weights.values().sum();
        clamped
    }

    pub fn is_consistent(&self) -> bool {
        self.total_weight == self.tag_weights.values().sum::<i64>()
            && self.total_weight >= 0
            && self.tag_weights.values().all(|v| *v >= 0)
    }

    /// Compares the weights of two aggregates treating a missing tag entry as zero.
    pub fn same_weights(&self, other: &DailyAggregateEntity) -> bool {
        self.total_weight == other.total_weight
            && self
                .tag_weights
                .keys()
                .chain(other.tag_weights.keys())
                .all(|tag| self.weight_of(tag) == other.weight_of(tag))
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TaskEntity {
    pub id: TaskId,
    pub title: Arc<str>,
    #[serde(default)]
    pub description: Option<Arc<str>>,
    #[serde(default)]
    pub project_id: Option<Arc<str>>,
    /// Estimated effort in minutes. Informational, it doesn't change any weight.
    #[serde(default)]
    pub duration: Option<u32>,
    pub user_id: UserId,
    /// Duplicates are removed before a task is stored.
    pub tags: Vec<TagId>,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Weights that were added to the daily aggregate when the task was created. Deletion
    /// subtracts exactly these. Older records may miss them.
    #[serde(default)]
    pub applied_weights: Option<TagWeights>,
}
