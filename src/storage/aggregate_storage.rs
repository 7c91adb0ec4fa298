use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, instrument, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::{entities::DailyAggregateEntity, key_locks::KeyLocks, validate_path_component};

const AGGREGATE_EXTENSION: &str = "json";

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written { revision: u64 },
    /// Someone else wrote the day in between. Holds the revision that is stored now.
    Conflict { current: Option<u64> },
}

/// Interface for abstracting storage of daily aggregates.
pub trait AggregateStorage {
    /// Missing aggregates are `None`, never an error.
    fn get_aggregate(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<DailyAggregateEntity>>> + Send;

    /// Inserts the aggregate if `expected_revision` is `None` and nothing is stored yet, or
    /// replaces totals and breakdown if the stored revision equals `expected_revision`.
    /// Otherwise nothing is written and [UpsertOutcome::Conflict] is returned. The revision of
    /// the passed aggregate is ignored.
    fn upsert_aggregate(
        &self,
        aggregate: DailyAggregateEntity,
        expected_revision: Option<u64>,
    ) -> impl Future<Output = Result<UpsertOutcome>> + Send;

    /// Every aggregate of the user, in no particular order.
    fn list_aggregates(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<DailyAggregateEntity>>> + Send;
}

impl<T: Deref + Sync> AggregateStorage for T
where
    T::Target: AggregateStorage,
{
    fn get_aggregate(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<DailyAggregateEntity>>> + Send {
        self.deref().get_aggregate(user_id, date)
    }

    fn upsert_aggregate(
        &self,
        aggregate: DailyAggregateEntity,
        expected_revision: Option<u64>,
    ) -> impl Future<Output = Result<UpsertOutcome>> + Send {
        self.deref().upsert_aggregate(aggregate, expected_revision)
    }

    fn list_aggregates(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<DailyAggregateEntity>>> + Send {
        self.deref().list_aggregates(user_id)
    }
}

/// The main realization of [AggregateStorage]. Lays out `<dir>/<user>/<YYYY-MM-DD>.json`.
pub struct AggregateStorageImpl {
    aggregate_dir: PathBuf,
    locks: KeyLocks<(Arc<str>, NaiveDate)>,
}

impl AggregateStorageImpl {
    pub fn new(aggregate_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&aggregate_dir)?;

        Ok(Self {
            aggregate_dir,
            locks: KeyLocks::new(),
        })
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        validate_path_component("user", user_id)?;
        Ok(self.aggregate_dir.join(user_id))
    }

    fn day_path(&self, user_id: &str, date: NaiveDate) -> Result<PathBuf> {
        Ok(self
            .user_dir(user_id)?
            .join(date_to_record_name(date))
            .with_extension(AGGREGATE_EXTENSION))
    }

    async fn read_day(path: &Path) -> Result<Option<DailyAggregateEntity>> {
        async fn extract(path: &Path) -> std::result::Result<String, std::io::Error> {
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut content = String::new();
            let read = file.read_to_string(&mut content).await;
            file.unlock_async().await?;
            read?;
            Ok(content)
        }

        let content = match extract(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => Err(e)?,
        };

        Ok(parse_aggregate(path, &content))
    }

    /// Reads the current revision and rewrites the file if it matches. Must run under an
    /// exclusive lock of `file`.
    async fn compare_and_write(
        file: &mut File,
        path: &Path,
        mut aggregate: DailyAggregateEntity,
        expected_revision: Option<u64>,
    ) -> Result<UpsertOutcome> {
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        let current = parse_aggregate(path, &content).map(|v| v.revision);

        if current != expected_revision {
            return Ok(UpsertOutcome::Conflict { current });
        }

        let revision = expected_revision.map_or(1, |v| v + 1);
        aggregate.revision = revision;

        let mut buffer = serde_json::to_vec(&aggregate)?;
        buffer.push(b'\n');

        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(UpsertOutcome::Written { revision })
    }
}

/// Empty files are fresh days. Corrupted files are treated the same way so that the next write
/// repairs them.
fn parse_aggregate(path: &Path, content: &str) -> Option<DailyAggregateEntity> {
    if content.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<DailyAggregateEntity>(content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Aggregate in {path:?} is corrupted {e}");
            None
        }
    }
}

impl AggregateStorage for AggregateStorageImpl {
    async fn get_aggregate(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyAggregateEntity>> {
        let path = self.day_path(user_id, date)?;
        let _guard = self.locks.lock((user_id.into(), date)).await;
        Self::read_day(&path).await
    }

    #[instrument(skip(self, aggregate), fields(user = %aggregate.user_id, date = %aggregate.date))]
    async fn upsert_aggregate(
        &self,
        aggregate: DailyAggregateEntity,
        expected_revision: Option<u64>,
    ) -> Result<UpsertOutcome> {
        let path = self.day_path(&aggregate.user_id, aggregate.date)?;
        let _guard = self
            .locks
            .lock((aggregate.user_id.clone(), aggregate.date))
            .await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::compare_and_write(&mut file, &path, aggregate, expected_revision).await;
        file.unlock_async().await?;
        debug!("Upsert finished with {result:?}");
        result
    }

    async fn list_aggregates(&self, user_id: &str) -> Result<Vec<DailyAggregateEntity>> {
        let user_dir = self.user_dir(user_id)?;
        let mut entries = match tokio::fs::read_dir(&user_dir).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => Err(e)?,
        };

        let mut dates = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some(AGGREGATE_EXTENSION) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|v| v.to_str())
                .and_then(record_name_to_date)
            {
                Some(date) => dates.push(date),
                None => warn!("Skipping unexpected file {path:?}"),
            }
        }

        let aggregates = stream::iter(dates)
            .map(|date| self.get_aggregate(user_id, date))
            .buffered(4)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(aggregates.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::{
        storage::entities::{DailyAggregateEntity, TagWeights},
        utils::logging::TEST_LOGGING,
    };

    use super::{AggregateStorage, AggregateStorageImpl, UpsertOutcome};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    fn aggregate(date: NaiveDate, values: &[(&str, i64)]) -> DailyAggregateEntity {
        let mut aggregate = DailyAggregateEntity::empty("user".into(), date);
        aggregate.apply_delta(&values.iter().map(|(k, v)| ((*k).into(), *v)).collect::<TagWeights>());
        aggregate
    }

    #[tokio::test]
    async fn missing_day_is_none() -> Result<()> {
        let dir = tempdir()?;
        let storage = AggregateStorageImpl::new(dir.path().to_owned())?;
        assert_eq!(storage.get_aggregate("user", TEST_DATE).await?, None);
        assert!(storage.list_aggregates("user").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn insert_then_replace() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let storage = AggregateStorageImpl::new(dir.path().to_owned())?;

        let first = aggregate(TEST_DATE, &[("tag-money", 1)]);
        assert_eq!(
            storage.upsert_aggregate(first.clone(), None).await?,
            UpsertOutcome::Written { revision: 1 }
        );

        let stored = storage.get_aggregate("user", TEST_DATE).await?.unwrap();
        assert_eq!(stored.revision, 1);
        assert!(stored.same_weights(&first));

        let second = aggregate(TEST_DATE, &[("tag-money", 2), ("tag-branding", 1)]);
        assert_eq!(
            storage.upsert_aggregate(second.clone(), Some(1)).await?,
            UpsertOutcome::Written { revision: 2 }
        );

        let stored = storage.get_aggregate("user", TEST_DATE).await?.unwrap();
        assert_eq!(stored.total_weight, 3);
        assert_eq!(stored.revision, 2);
        Ok(())
    }

    #[tokio::test]
    async fn stale_revision_conflicts() -> Result<()> {
        let dir = tempdir()?;
        let storage = AggregateStorageImpl::new(dir.path().to_owned())?;

        storage
            .upsert_aggregate(aggregate(TEST_DATE, &[("tag-money", 1)]), None)
            .await?;

        // A second insert believes the day is still empty.
        let outcome = storage
            .upsert_aggregate(aggregate(TEST_DATE, &[("tag-knowledge", 1)]), None)
            .await?;
        assert_eq!(outcome, UpsertOutcome::Conflict { current: Some(1) });

        let outcome = storage
            .upsert_aggregate(aggregate(TEST_DATE, &[("tag-knowledge", 1)]), Some(7))
            .await?;
        assert_eq!(outcome, UpsertOutcome::Conflict { current: Some(1) });

        let stored = storage.get_aggregate("user", TEST_DATE).await?.unwrap();
        assert_eq!(stored.weight_of("tag-money"), 1);
        assert_eq!(stored.weight_of("tag-knowledge"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn list_skips_foreign_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(AggregateStorageImpl::new(dir.path().to_owned())?);

        let dates = [
            TEST_DATE,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        ];
        for date in dates {
            storage
                .upsert_aggregate(aggregate(date, &[("tag-money", 1)]), None)
                .await?;
        }
        std::fs::write(dir.path().join("user").join("notes.txt"), "hello")?;
        std::fs::write(dir.path().join("user").join("garbage.json"), "{}")?;

        let mut listed = storage
            .list_aggregates("user")
            .await?
            .into_iter()
            .map(|v| v.date)
            .collect::<Vec<_>>();
        listed.sort();
        let mut expected = dates.to_vec();
        expected.sort();
        assert_eq!(listed, expected);

        assert!(storage.list_aggregates("someone else").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_day_is_repaired_by_next_write() -> Result<()> {
        let dir = tempdir()?;
        let storage = AggregateStorageImpl::new(dir.path().to_owned())?;
        std::fs::create_dir_all(dir.path().join("user"))?;
        std::fs::write(dir.path().join("user").join("2024-03-01.json"), "{\"user_id\":")?;

        assert_eq!(storage.get_aggregate("user", TEST_DATE).await?, None);
        assert_eq!(
            storage
                .upsert_aggregate(aggregate(TEST_DATE, &[("tag-money", 1)]), None)
                .await?,
            UpsertOutcome::Written { revision: 1 }
        );
        assert_eq!(
            storage
                .get_aggregate("user", TEST_DATE)
                .await?
                .map(|v| v.total_weight),
            Some(1)
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejects_path_like_users() -> Result<()> {
        let dir = tempdir()?;
        let storage = AggregateStorageImpl::new(dir.path().to_owned())?;
        assert!(storage.get_aggregate("../escape", TEST_DATE).await.is_err());
        assert!(storage.list_aggregates("..").await.is_err());
        Ok(())
    }
}
