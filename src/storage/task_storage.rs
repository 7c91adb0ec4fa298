use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};
use futures::{stream, StreamExt, TryStreamExt};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::warn;

use super::{
    entities::{TagId, TaskEntity},
    validate_path_component,
};

const TASK_EXTENSION: &str = "json";

/// Interface for abstracting storage of tasks. Tasks are plain records, the daily aggregates are
/// updated by the caller.
pub trait TaskStorage {
    /// Fails if a task with the same id already exists.
    fn create_task(&self, task: TaskEntity) -> impl Future<Output = Result<()>> + Send;

    fn get_task(&self, task_id: &str) -> impl Future<Output = Result<Option<TaskEntity>>> + Send;

    /// Tags the task was stored with. `None` if there is no such task.
    fn get_task_tags(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<Vec<TagId>>>> + Send;

    /// Replaces a stored task. Fails if the task doesn't exist.
    fn update_task(&self, task: TaskEntity) -> impl Future<Output = Result<()>> + Send;

    /// Removes the task and returns what was stored.
    fn delete_task(&self, task_id: &str)
    -> impl Future<Output = Result<Option<TaskEntity>>> + Send;

    /// Tasks of a user ordered by creation time.
    fn list_tasks(&self, user_id: &str) -> impl Future<Output = Result<Vec<TaskEntity>>> + Send;
}

impl<T: Deref + Sync> TaskStorage for T
where
    T::Target: TaskStorage,
{
    fn create_task(&self, task: TaskEntity) -> impl Future<Output = Result<()>> + Send {
        self.deref().create_task(task)
    }

    fn get_task(&self, task_id: &str) -> impl Future<Output = Result<Option<TaskEntity>>> + Send {
        self.deref().get_task(task_id)
    }

    fn get_task_tags(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<Vec<TagId>>>> + Send {
        self.deref().get_task_tags(task_id)
    }

    fn update_task(&self, task: TaskEntity) -> impl Future<Output = Result<()>> + Send {
        self.deref().update_task(task)
    }

    fn delete_task(
        &self,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<TaskEntity>>> + Send {
        self.deref().delete_task(task_id)
    }

    fn list_tasks(&self, user_id: &str) -> impl Future<Output = Result<Vec<TaskEntity>>> + Send {
        self.deref().list_tasks(user_id)
    }
}

/// The main realization of [TaskStorage]. Lays out `<dir>/<task id>.json`.
pub struct TaskStorageImpl {
    task_dir: PathBuf,
}

impl TaskStorageImpl {
    pub fn new(task_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&task_dir)?;

        Ok(Self { task_dir })
    }

    fn task_path(&self, task_id: &str) -> Result<PathBuf> {
        validate_path_component("task", task_id)?;
        Ok(self.task_dir.join(task_id).with_extension(TASK_EXTENSION))
    }

    async fn read_task(path: &Path) -> Result<Option<TaskEntity>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => Err(e)?,
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write_task(file: &mut File, task: &TaskEntity) -> Result<()> {
        let mut buffer = serde_json::to_vec(task)?;
        buffer.push(b'\n');
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl TaskStorage for TaskStorageImpl {
    async fn create_task(&self, task: TaskEntity) -> Result<()> {
        let path = self.task_path(&task.id)?;
        let mut file = match File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!("Task {} already exists", task.id)
            }
            Err(e) => Err(e)?,
        };
        Self::write_task(&mut file, &task).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskEntity>> {
        Self::read_task(&self.task_path(task_id)?).await
    }

    async fn get_task_tags(&self, task_id: &str) -> Result<Option<Vec<TagId>>> {
        Ok(self.get_task(task_id).await?.map(|v| v.tags))
    }

    async fn update_task(&self, task: TaskEntity) -> Result<()> {
        let path = self.task_path(&task.id)?;
        let mut file = match File::options()
            .write(true)
            .truncate(true)
            .open(&path)
            .await
        {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => bail!("Task {} doesn't exist", task.id),
            Err(e) => Err(e)?,
        };
        Self::write_task(&mut file, &task).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<Option<TaskEntity>> {
        let path = self.task_path(task_id)?;
        let Some(task) = Self::read_task(&path).await? else {
            return Ok(None);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(Some(task)),
            // Somebody removed it first, they also own the aggregate reversal.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)?,
        }
    }

    async fn list_tasks(&self, user_id: &str) -> Result<Vec<TaskEntity>> {
        let mut entries = tokio::fs::read_dir(&self.task_dir).await?;
        let mut paths = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) == Some(TASK_EXTENSION) {
                paths.push(path);
            }
        }

        let tasks = stream::iter(paths)
            .map(|path| async move {
                match Self::read_task(&path).await {
                    Ok(v) => Ok(v),
                    Err(e) if e.is::<serde_json::Error>() => {
                        warn!("Skipping corrupted task {path:?}: {e}");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(4)
            .try_collect::<Vec<_>>()
            .await?;

        let mut tasks = tasks
            .into_iter()
            .flatten()
            .filter(|v| &*v.user_id == user_id)
            .collect::<Vec<_>>();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }
}
