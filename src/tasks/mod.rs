//! Task bookkeeping on top of [TaskStorage]. Every mutation that changes which tags a user has
//! worked on is mirrored into the daily aggregates of the day the call happens.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, instrument};

use crate::{
    calendar::{ActivitySummary, CalendarGrid, CalendarOptions},
    engine::{ActivityError, AggregationEngine, Sign},
    storage::{
        aggregate_storage::AggregateStorage,
        entities::{TagId, TagWeights, TaskEntity, TaskId, UserId},
        task_storage::TaskStorage,
    },
    utils::clock::Clock,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: UserId,
    pub title: Arc<str>,
    pub description: Option<Arc<str>>,
    pub project_id: Option<Arc<str>>,
    pub duration: Option<u32>,
    pub tags: Vec<TagId>,
}

static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_task_id(now: DateTime<Utc>) -> TaskId {
    let sequence = TASK_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "task_{}_{}_{sequence}",
        now.timestamp_millis(),
        std::process::id()
    )
    .into()
}

/// Keeps the first occurrence of every tag.
fn unique_tags(tags: Vec<TagId>) -> Vec<TagId> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

pub struct TaskService<A, T> {
    engine: AggregationEngine<A>,
    tasks: T,
    clock: Box<dyn Clock>,
}

impl<A: AggregateStorage + Sync, T: TaskStorage + Sync> TaskService<A, T> {
    pub fn new(engine: AggregationEngine<A>, tasks: T, clock: Box<dyn Clock>) -> Self {
        Self {
            engine,
            tasks,
            clock,
        }
    }

    pub fn engine(&self) -> &AggregationEngine<A> {
        &self.engine
    }

    /// Stores the task and adds its tags to today's aggregate. The weights that were added are
    /// kept on the task so deletion can take back exactly the same amount. If the aggregate
    /// can't be updated the task is removed again.
    #[instrument(skip(self, new_task), fields(user = %new_task.user_id))]
    pub async fn create_task(&self, new_task: NewTask) -> Result<TaskEntity, ActivityError> {
        let now = self.clock.time();
        let today = self.clock.today();

        let tags = unique_tags(new_task.tags);
        let applied_weights = self.engine.resolve_weights(&tags);

        let task = TaskEntity {
            id: generate_task_id(now),
            title: new_task.title,
            description: new_task.description,
            project_id: new_task.project_id,
            duration: new_task.duration,
            user_id: new_task.user_id,
            tags,
            completed: false,
            created_at: now,
            applied_weights: Some(applied_weights.clone()),
        };
        self.tasks.create_task(task.clone()).await?;

        if let Err(e) = self
            .engine
            .apply_weights(&task.user_id, &applied_weights, Sign::Increment, today)
            .await
        {
            error!("Task {} couldn't be counted, removing it: {e}", task.id);
            if let Err(rollback) = self.tasks.delete_task(&task.id).await {
                error!("Task {} stays stored without its weight: {rollback}", task.id);
            }
            return Err(e);
        }

        info!("Created task {}", task.id);
        Ok(task)
    }

    /// Removes the task and subtracts its weights from today's aggregate. If the aggregate
    /// can't be updated the task is stored again.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: &str) -> Result<TaskEntity, ActivityError> {
        let today = self.clock.today();

        let task = self
            .tasks
            .delete_task(task_id)
            .await?
            .ok_or_else(|| ActivityError::TaskNotFound { id: task_id.into() })?;

        let weights = match &task.applied_weights {
            Some(weights) => weights.clone(),
            None => self.engine.resolve_weights(&task.tags),
        };
        let applied = match self
            .engine
            .apply_weights(&task.user_id, &weights, Sign::Decrement, today)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                error!("Task {} couldn't be subtracted, restoring it: {e}", task.id);
                if let Err(rollback) = self.tasks.create_task(task.clone()).await {
                    error!("Task {} is gone but its weight stays: {rollback}", task.id);
                }
                return Err(e);
            }
        };

        info!(
            "Deleted task {}, today's weight is {}",
            task.id, applied.aggregate.total_weight
        );
        Ok(task)
    }

    /// Replaces the tags of a task. The old weights are taken back and the new ones added, both
    /// on today's aggregate. The task is stored only after both changes landed, a failure undoes
    /// whatever part was already applied.
    #[instrument(skip(self, tags))]
    pub async fn update_task_tags(
        &self,
        task_id: &str,
        tags: Vec<TagId>,
    ) -> Result<TaskEntity, ActivityError> {
        let today = self.clock.today();

        let mut task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| ActivityError::TaskNotFound { id: task_id.into() })?;
        let old_weights = match &task.applied_weights {
            Some(weights) => weights.clone(),
            None => {
                let old_tags = self.tasks.get_task_tags(task_id).await?.unwrap_or_default();
                self.engine.resolve_weights(&old_tags)
            }
        };

        let tags = unique_tags(tags);
        let new_weights = self.engine.resolve_weights(&tags);
        let user_id = task.user_id.clone();

        self.engine
            .apply_weights(&user_id, &old_weights, Sign::Decrement, today)
            .await?;
        if let Err(e) = self
            .engine
            .apply_weights(&user_id, &new_weights, Sign::Increment, today)
            .await
        {
            self.undo(&user_id, &old_weights, Sign::Increment, today).await;
            return Err(e);
        }

        task.tags = tags;
        task.applied_weights = Some(new_weights.clone());
        if let Err(e) = self.tasks.update_task(task.clone()).await {
            self.undo(&user_id, &new_weights, Sign::Decrement, today).await;
            self.undo(&user_id, &old_weights, Sign::Increment, today).await;
            return Err(e.into());
        }
        Ok(task)
    }

    /// Best effort reversal of a delta that already landed.
    async fn undo(&self, user_id: &str, weights: &TagWeights, sign: Sign, today: NaiveDate) {
        if let Err(e) = self.engine.apply_weights(user_id, weights, sign, today).await {
            error!("Couldn't undo a partial change of {user_id} on {today}: {e}");
        }
    }

    /// Completion is bookkeeping only, it doesn't change any weight.
    pub async fn set_completed(
        &self,
        task_id: &str,
        completed: bool,
    ) -> Result<TaskEntity, ActivityError> {
        let mut task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| ActivityError::TaskNotFound { id: task_id.into() })?;
        task.completed = completed;
        self.tasks.update_task(task.clone()).await?;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskEntity>, ActivityError> {
        Ok(self.tasks.get_task(task_id).await?)
    }

    pub async fn list_tasks(&self, user_id: &str) -> Result<Vec<TaskEntity>, ActivityError> {
        Ok(self.tasks.list_tasks(user_id).await?)
    }

    pub async fn list_tasks_by_project(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<TaskEntity>, ActivityError> {
        let mut tasks = self.list_tasks(user_id).await?;
        tasks.retain(|v| v.project_id.as_deref() == Some(project_id));
        Ok(tasks)
    }

    pub async fn calendar(
        &self,
        user_id: &str,
        options: CalendarOptions,
    ) -> Result<CalendarGrid, ActivityError> {
        self.engine
            .get_calendar_grid(user_id, self.clock.today(), options)
            .await
    }

    pub async fn summary(&self, user_id: &str) -> Result<ActivitySummary, ActivityError> {
        self.engine.get_summary(user_id, self.clock.today()).await
    }
}
