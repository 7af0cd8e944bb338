//! In-memory arena store
//!
//! `MemoryStore` implements both [`BuildStore`] and [`RepositoryStore`] over
//! `BTreeMap` arenas behind a single `Mutex`, so every trait call is one
//! atomic step. It backs the CLI and the test suites.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Arena {
    builds: BTreeMap<BuildId, BuildRecord>,
    repositories: BTreeMap<RepositoryId, RepositoryRecord>,
    last_build_id: u64,
    last_repository_id: u64,
}

impl Arena {
    fn next_build_id(&mut self) -> BuildId {
        self.last_build_id += 1;
        BuildId(self.last_build_id)
    }

    fn require_repository(&self, id: RepositoryId) -> StorageResult<()> {
        if self.repositories.contains_key(&id) {
            Ok(())
        } else {
            Err(StorageError::RepositoryRequired { id })
        }
    }

    fn has_children(&self, parent: BuildId) -> bool {
        self.builds.values().any(|b| b.parent_id == Some(parent))
    }

    fn insert_children(&mut self, parent: BuildId, matrix: Vec<NewBuild>) {
        let now = Utc::now();
        for mut child in matrix {
            child.parent_id = Some(parent);
            let id = self.next_build_id();
            self.builds.insert(id, BuildRecord::from_new(id, child, now));
        }
    }
}

/// In-memory build and repository store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    arena: Mutex<Arena>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> StorageResult<MutexGuard<'_, Arena>> {
        self.arena
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn find_or_create_repository(&self, url: &str) -> StorageResult<RepositoryRecord> {
        let mut arena = self.arena()?;
        if let Some(existing) = arena.repositories.values().find(|r| r.url == url) {
            return Ok(existing.clone());
        }
        arena.last_repository_id += 1;
        let id = RepositoryId(arena.last_repository_id);
        let record = RepositoryRecord::new(id, url);
        arena.repositories.insert(id, record.clone());
        debug!(repository_id = %id, url = %url, "created repository");
        Ok(record)
    }

    async fn get_repository(&self, id: RepositoryId) -> StorageResult<RepositoryRecord> {
        let arena = self.arena()?;
        arena
            .repositories
            .get(&id)
            .cloned()
            .ok_or(StorageError::RepositoryNotFound { id })
    }

    async fn next_build_number(&self, id: RepositoryId) -> StorageResult<u64> {
        let mut arena = self.arena()?;
        let existing = arena
            .builds
            .values()
            .filter(|b| b.repository_id == id)
            .count() as u64;
        let repo = arena
            .repositories
            .get_mut(&id)
            .ok_or(StorageError::RepositoryNotFound { id })?;
        // Numbers reserved but not yet written still count.
        repo.build_counter = repo.build_counter.max(existing) + 1;
        Ok(repo.build_counter)
    }

    async fn last_build_id(&self, id: RepositoryId) -> StorageResult<Option<BuildId>> {
        let arena = self.arena()?;
        if !arena.repositories.contains_key(&id) {
            return Err(StorageError::RepositoryNotFound { id });
        }
        Ok(arena
            .builds
            .values()
            .rev()
            .find(|b| b.repository_id == id && b.is_top_level())
            .map(|b| b.id))
    }

    async fn update_last_build(
        &self,
        id: RepositoryId,
        summary: LastBuildSummary,
    ) -> StorageResult<()> {
        let mut arena = self.arena()?;
        let repo = arena
            .repositories
            .get_mut(&id)
            .ok_or(StorageError::RepositoryNotFound { id })?;
        repo.apply_summary(&summary);
        Ok(())
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn create_build(
        &self,
        build: NewBuild,
        matrix: Vec<NewBuild>,
    ) -> StorageResult<BuildRecord> {
        let mut arena = self.arena()?;
        arena.require_repository(build.repository_id)?;
        if let Some(parent) = build.parent_id {
            if !arena.builds.contains_key(&parent) {
                return Err(StorageError::BuildNotFound { id: parent });
            }
        }

        let id = arena.next_build_id();
        let record = BuildRecord::from_new(id, build, Utc::now());
        arena.builds.insert(id, record.clone());
        arena.insert_children(id, matrix);
        Ok(record)
    }

    async fn get_build(&self, id: BuildId) -> StorageResult<BuildRecord> {
        let arena = self.arena()?;
        arena
            .builds
            .get(&id)
            .cloned()
            .ok_or(StorageError::BuildNotFound { id })
    }

    async fn update_build(
        &self,
        build: &BuildRecord,
        matrix: Vec<NewBuild>,
    ) -> StorageResult<BuildRecord> {
        let mut arena = self.arena()?;
        let stored = arena
            .builds
            .get(&build.id)
            .ok_or(StorageError::BuildNotFound { id: build.id })?;
        if stored.version != build.version {
            return Err(StorageError::VersionConflict {
                id: build.id,
                expected: build.version,
                found: stored.version,
            });
        }
        let created_at = stored.created_at;
        arena.require_repository(build.repository_id)?;
        if !matrix.is_empty() && arena.has_children(build.id) {
            return Err(StorageError::MatrixAlreadyExpanded { id: build.id });
        }

        let mut record = build.clone();
        record.version += 1;
        record.created_at = created_at;
        arena.builds.insert(record.id, record.clone());
        arena.insert_children(record.id, matrix);
        Ok(record)
    }

    async fn children(&self, parent: BuildId) -> StorageResult<Vec<BuildRecord>> {
        let arena = self.arena()?;
        Ok(arena
            .builds
            .values()
            .filter(|b| b.parent_id == Some(parent))
            .cloned()
            .collect())
    }

    async fn count_builds_for_repository(&self, id: RepositoryId) -> StorageResult<u64> {
        let arena = self.arena()?;
        Ok(arena
            .builds
            .values()
            .filter(|b| b.repository_id == id)
            .count() as u64)
    }
}
