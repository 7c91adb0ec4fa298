//! Keeps the per day aggregates in sync with task creation and deletion, and serves read-only
//! snapshots of them to presentation code.
//!
//! Every operation takes the reference day explicitly. Aggregates are keyed by the day the
//! mutating action happened, not by the day a task was originally created.

pub mod error;

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, instrument, warn};

use crate::{
    calendar::{
        grid::project_calendar, history::ActivityHistory, streak::current_streak,
        ActivitySummary, CalendarGrid, CalendarOptions,
    },
    storage::{
        aggregate_storage::{AggregateStorage, UpsertOutcome},
        entities::{DailyAggregateEntity, TagId, TagWeights, UserId},
        key_locks::KeyLocks,
    },
    tags::TagRegistry,
};

pub use error::ActivityError;

/// How many times a conditional write is retried when another process wrote the same day.
pub const MAX_UPSERT_ATTEMPTS: usize = 8;

const RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Increment,
    Decrement,
}

impl Sign {
    pub fn factor(self) -> i64 {
        match self {
            Sign::Increment => 1,
            Sign::Decrement => -1,
        }
    }
}

/// What a single delta did to the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedDelta {
    /// The aggregate as it was written.
    pub aggregate: DailyAggregateEntity,
    /// Signed weight per tag that was added.
    pub delta: TagWeights,
    /// Tags that would have dropped below zero and were clamped instead.
    pub clamped: Vec<TagId>,
}

pub struct AggregationEngine<S> {
    storage: S,
    registry: TagRegistry,
    locks: KeyLocks<(UserId, NaiveDate)>,
}

impl<S: AggregateStorage + Sync> AggregationEngine<S> {
    pub fn new(storage: S, registry: TagRegistry) -> Self {
        Self {
            storage,
            registry,
            locks: KeyLocks::new(),
        }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Positive weight per known tag. Unknown ids are skipped and repeated ids count once.
    pub fn resolve_weights(&self, tag_ids: &[TagId]) -> TagWeights {
        let mut weights = TagWeights::new();
        for id in tag_ids {
            if weights.contains_key(id) {
                continue;
            }
            match self.registry.get(id) {
                Some(tag) => {
                    weights.insert(tag.id.clone(), i64::from(tag.weight));
                }
                None => warn!("Ignoring unknown tag {id:?}"),
            }
        }
        weights
    }

    pub async fn record_task_created(
        &self,
        user_id: &str,
        tag_ids: &[TagId],
        today: NaiveDate,
    ) -> Result<AppliedDelta, ActivityError> {
        self.apply_delta(user_id, tag_ids, Sign::Increment, today)
            .await
    }

    pub async fn record_task_deleted(
        &self,
        user_id: &str,
        tag_ids: &[TagId],
        today: NaiveDate,
    ) -> Result<AppliedDelta, ActivityError> {
        self.apply_delta(user_id, tag_ids, Sign::Decrement, today)
            .await
    }

    /// Moves a task from `old_tags` to `new_tags` as two separate deltas on `today`.
    pub async fn record_task_retagged(
        &self,
        user_id: &str,
        old_tags: &[TagId],
        new_tags: &[TagId],
        today: NaiveDate,
    ) -> Result<(AppliedDelta, AppliedDelta), ActivityError> {
        let removed = self
            .apply_delta(user_id, old_tags, Sign::Decrement, today)
            .await?;
        let added = self
            .apply_delta(user_id, new_tags, Sign::Increment, today)
            .await?;
        Ok((removed, added))
    }

    pub async fn apply_delta(
        &self,
        user_id: &str,
        tag_ids: &[TagId],
        sign: Sign,
        today: NaiveDate,
    ) -> Result<AppliedDelta, ActivityError> {
        let weights = self.resolve_weights(tag_ids);
        self.apply_weights(user_id, &weights, sign, today).await
    }

    /// Adds `sign * weight` for every entry of `weights` to the aggregate of `today`. All tags
    /// of one call land in a single write.
    #[instrument(skip(self, weights), fields(tags = weights.len()))]
    pub async fn apply_weights(
        &self,
        user_id: &str,
        weights: &TagWeights,
        sign: Sign,
        today: NaiveDate,
    ) -> Result<AppliedDelta, ActivityError> {
        let user: UserId = user_id.into();
        let delta = weights
            .iter()
            .map(|(tag, weight)| (tag.clone(), sign.factor() * weight))
            .collect::<TagWeights>();

        // Writers of this process queue here, the revision check covers other processes.
        let _guard = self.locks.lock((user.clone(), today)).await;

        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            let current = self.storage.get_aggregate(user_id, today).await?;
            let expected_revision = current.as_ref().map(|v| v.revision);
            let mut aggregate =
                current.unwrap_or_else(|| DailyAggregateEntity::empty(user.clone(), today));

            let clamped = aggregate.apply_delta(&delta);

            match self
                .storage
                .upsert_aggregate(aggregate.clone(), expected_revision)
                .await?
            {
                UpsertOutcome::Written { revision } => {
                    aggregate.revision = revision;
                    if !clamped.is_empty() {
                        warn!(
                            "Aggregate of {user} on {today} would have gone negative for {clamped:?}, clamped to zero"
                        );
                    }
                    debug!("Aggregate of {user} on {today} is now {}", aggregate.total_weight);
                    return Ok(AppliedDelta {
                        aggregate,
                        delta,
                        clamped,
                    });
                }
                UpsertOutcome::Conflict { current } => {
                    debug!(
                        "Attempt {attempt} lost the race, expected revision {expected_revision:?} found {current:?}"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt as u32).await;
                }
            }
        }

        error!("Giving up on aggregate of {user} on {today}");
        Err(ActivityError::Conflict {
            user,
            date: today,
            attempts: MAX_UPSERT_ATTEMPTS,
        })
    }

    /// Aggregate of a single day. A day without activity is an empty aggregate.
    pub async fn get_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyAggregateEntity, ActivityError> {
        Ok(self
            .storage
            .get_aggregate(user_id, date)
            .await?
            .unwrap_or_else(|| DailyAggregateEntity::empty(user_id.into(), date)))
    }

    pub async fn history(&self, user_id: &str) -> Result<ActivityHistory, ActivityError> {
        let aggregates = self.storage.list_aggregates(user_id).await?;
        Ok(ActivityHistory::from_aggregates(aggregates))
    }

    pub async fn get_calendar_grid(
        &self,
        user_id: &str,
        today: NaiveDate,
        options: CalendarOptions,
    ) -> Result<CalendarGrid, ActivityError> {
        let history = self.history(user_id).await?;
        Ok(project_calendar(&history, today, options))
    }

    pub async fn get_streak(&self, user_id: &str, today: NaiveDate) -> Result<u32, ActivityError> {
        Ok(current_streak(&self.history(user_id).await?, today))
    }

    pub async fn get_summary(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<ActivitySummary, ActivityError> {
        Ok(self.history(user_id).await?.summary(today))
    }
}
