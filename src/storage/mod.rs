//!  Storage is organized through [aggregate_storage::AggregateStorageImpl] and
//!  [task_storage::TaskStorageImpl]. The basic idea is:
//!   - There is a directory per user with one file per local day of activity.
//!   - A day file holds the whole [entities::DailyAggregateEntity] as json, including a revision
//!     number. Writers swap the file only if the revision they read is still current.
//!   - Tasks are stored one json file per task so that deletion is a single file removal.
//!
//!  [memory::MemoryStorage] implements the same contracts without touching the disk.

pub mod aggregate_storage;
pub mod entities;
pub mod key_locks;
pub mod memory;
pub mod task_storage;

use anyhow::{bail, Result};

/// Ids end up as file and directory names, so anything that could escape the storage directory
/// is rejected.
pub(crate) fn validate_path_component(kind: &str, id: &str) -> Result<()> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
    {
        bail!("Illegal {kind} id {id:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_path_component;

    #[test]
    fn path_components() {
        assert!(validate_path_component("user", "user_1").is_ok());
        assert!(validate_path_component("user", "").is_err());
        assert!(validate_path_component("user", "..").is_err());
        assert!(validate_path_component("user", "a/b").is_err());
        assert!(validate_path_component("task", "a\\b").is_err());
    }
}
