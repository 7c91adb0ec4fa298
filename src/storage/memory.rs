use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Result};
use chrono::NaiveDate;

use super::{
    aggregate_storage::{AggregateStorage, UpsertOutcome},
    entities::{DailyAggregateEntity, TagId, TaskEntity, TaskId, UserId},
    task_storage::TaskStorage,
};

/// Keeps everything in memory. Useful for embedding the engine where persistence is handled
/// elsewhere and for tests.
#[derive(Default)]
pub struct MemoryStorage {
    aggregates: Mutex<HashMap<(UserId, NaiveDate), DailyAggregateEntity>>,
    tasks: Mutex<HashMap<TaskId, TaskEntity>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateStorage for MemoryStorage {
    async fn get_aggregate(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregateEntity>> {
        Ok(lock(&self.aggregates).get(&(UserId::from(user_id), date)).cloned())
    }

    async fn upsert_aggregate(
        &self,
        mut aggregate: DailyAggregateEntity,
        expected_revision: Option<u64>,
    ) -> Result<UpsertOutcome> {
        let mut aggregates = lock(&self.aggregates);
        let key = (aggregate.user_id.clone(), aggregate.date);
        let current = aggregates.get(&key).map(|v| v.revision);
        if current != expected_revision {
            return Ok(UpsertOutcome::Conflict { current });
        }
        let revision = expected_revision.map_or(1, |v| v + 1);
        aggregate.revision = revision;
        aggregates.insert(key, aggregate);
        Ok(UpsertOutcome::Written { revision })
    }

    async fn list_aggregates(&self, user_id: &str) -> Result<Vec<DailyAggregateEntity>> {
        Ok(lock(&self.aggregates)
            .values()
            .filter(|v| &*v.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl TaskStorage for MemoryStorage {
    async fn create_task(&self, task: TaskEntity) -> Result<()> {
        let mut tasks = lock(&self.tasks);
        if tasks.contains_key(&task.id) {
            bail!("Task {} already exists", task.id);
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskEntity>> {
        Ok(lock(&self.tasks).get(task_id).cloned())
    }

    async fn get_task_tags(&self, task_id: &str) -> Result<Option<Vec<TagId>>> {
        Ok(lock(&self.tasks).get(task_id).map(|v| v.tags.clone()))
    }

    async fn update_task(&self, task: TaskEntity) -> Result<()> {
        let mut tasks = lock(&self.tasks);
        match tasks.get_mut(&task.id) {
            Some(stored) => {
                *stored = task;
                Ok(())
            }
            None => bail!("Task {} doesn't exist", task.id),
        }
    }

    async fn delete_task(&self, task_id: &str) -> Result<Option<TaskEntity>> {
        Ok(lock(&self.tasks).remove(task_id))
    }

    async fn list_tasks(&self, user_id: &str) -> Result<Vec<TaskEntity>> {
        let mut tasks = lock(&self.tasks)
            .values()
            .filter(|v| &*v.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }
}
