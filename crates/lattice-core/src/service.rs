//! The build save pipeline.
//!
//! Every mutation of a build runs the same ordered steps:
//!
//! 1. read the prior snapshot (none on create)
//! 2. compute the [`SaveContext`] once: axes plus any log-append delta
//! 3. expand the matrix if the build is top-level, a matrix, and childless
//! 4. persist the build and any new children in one write
//! 5. sync the repository summary (failure fails the save)
//! 6. dispatch at most one notification (failure is only logged)
//!
//! Steps 1 to 5 of an update run under the build's writer lock. Dispatch
//! runs after the lock is released, so a slow publisher never holds up the
//! next write to the same build.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use lattice_domain::{
    child_builds, project_build, AxisVocabulary, BuildLifecycle, DomainError, LogAppend,
    MatrixAxes, Notification, NotificationKind, PushPayload, Transition, View,
};
use lattice_state::{
    BuildConfig, BuildId, BuildRecord, BuildStore, NewBuild, RepositoryStore, StorageError,
};
use serde_json::Value;
use tracing::Instrument;

use crate::config::LatticeConfig;
use crate::dispatch::{DispatchOutcome, NotificationDispatcher};
use crate::error::{LatticeError, Result};
use crate::obs;
use crate::publisher::Publisher;
use crate::summary::RepositorySummarySync;

/// Field changes for [`BuildService::update_build`]. `None` leaves a field
/// as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildUpdate {
    pub number: Option<String>,
    pub status: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config: Option<BuildConfig>,
}

impl BuildUpdate {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Default::default()
        }
    }

    pub fn finished(status: i32, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(at),
            ..Default::default()
        }
    }

    pub fn configured(config: BuildConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }

    fn apply(&self, build: &mut BuildRecord) {
        if let Some(number) = &self.number {
            build.number = Some(number.clone());
        }
        if let Some(status) = self.status {
            build.status = Some(status);
        }
        if let Some(at) = self.started_at {
            build.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            build.finished_at = Some(at);
        }
        if let Some(config) = &self.config {
            build.config = config.clone();
        }
    }
}

/// Values computed once per save and threaded through every step.
#[derive(Debug, Clone)]
struct SaveContext {
    axes: MatrixAxes,
    log_appended: Option<LogAppend>,
}

impl SaveContext {
    fn new(config: &BuildConfig, vocabulary: &AxisVocabulary, log_appended: Option<LogAppend>) -> Self {
        Self {
            axes: MatrixAxes::extract(config, vocabulary),
            log_appended,
        }
    }

    fn expands(&self, top_level: bool) -> bool {
        top_level && self.axes.is_matrix()
    }
}

type WriterMap = Mutex<HashMap<BuildId, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one build's writer lock. Dropping the last lease for a build
/// removes its entry from the map.
struct WriterLease<'a> {
    writers: &'a WriterMap,
    id: BuildId,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for WriterLease<'_> {
    fn drop(&mut self) {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        // References are only taken and released while the map is locked.
        drop(self.guard.take());
        if writers
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            writers.remove(&self.id);
        }
    }
}

/// Result of one save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub build: BuildRecord,
    pub transition: Transition,
    /// Matrix children written together with this save
    pub children_created: usize,
    pub summary_synced: bool,
    pub notification: DispatchOutcome,
}

/// Creates and mutates builds through the save pipeline.
pub struct BuildService {
    builds: Arc<dyn BuildStore>,
    repositories: Arc<dyn RepositoryStore>,
    summary: RepositorySummarySync,
    dispatcher: NotificationDispatcher,
    vocabulary: AxisVocabulary,
    max_write_attempts: u32,
    writers: WriterMap,
}

impl BuildService {
    pub fn new(
        builds: Arc<dyn BuildStore>,
        repositories: Arc<dyn RepositoryStore>,
        publisher: Arc<dyn Publisher>,
        config: &LatticeConfig,
    ) -> Self {
        Self {
            builds,
            summary: RepositorySummarySync::new(repositories.clone()),
            repositories,
            dispatcher: NotificationDispatcher::new(publisher, config.notifications.clone()),
            vocabulary: config.matrix.axis_keys.clone(),
            max_write_attempts: config.storage.max_write_attempts.max(1),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Use one store for both builds and repositories.
    pub fn with_store<S>(store: Arc<S>, publisher: Arc<dyn Publisher>, config: &LatticeConfig) -> Self
    where
        S: BuildStore + RepositoryStore + 'static,
    {
        Self::new(store.clone(), store, publisher, config)
    }

    /// Create a top-level build from a push payload. The repository is
    /// found or created by URL and the number comes from its counter.
    pub async fn create_from_payload(&self, json: &str) -> Result<SaveOutcome> {
        let request = PushPayload::from_json(json)
            .and_then(|payload| payload.build_request())
            .map_err(invalid)?;

        let repository = self
            .repositories
            .find_or_create_repository(&request.repository_url)
            .await?;
        let number = self.repositories.next_build_number(repository.id).await?;

        self.create_build(request.into_new_build(repository.id, number))
            .await
    }

    /// Create a build, expanding its matrix in the same write when its
    /// config describes one.
    pub async fn create_build(&self, new: NewBuild) -> Result<SaveOutcome> {
        match self.repositories.get_repository(new.repository_id).await {
            Ok(_) => {}
            Err(StorageError::RepositoryNotFound { id }) => {
                return Err(LatticeError::Validation(format!(
                    "build requires an existing repository, {id} not found"
                )))
            }
            Err(err) => return Err(err.into()),
        }

        let ctx = SaveContext::new(&new.config, &self.vocabulary, None);
        let children = if ctx.expands(new.parent_id.is_none()) {
            child_builds(&new, &ctx.axes.rows())
        } else {
            Vec::new()
        };
        let children_created = children.len();

        let saved = self
            .builds
            .create_build(new, children)
            .await
            .map_err(|err| match err {
                StorageError::RepositoryRequired { id } => LatticeError::Validation(format!(
                    "build requires an existing repository, {id} not found"
                )),
                other => other.into(),
            })?;

        let span = obs::build_span(saved.id);
        obs::emit_build_created(saved.id, saved.number.as_deref(), saved.repository_id);
        let (outcome, ctx) = self
            .record_commit(None, saved, ctx, children_created)
            .instrument(span.clone())
            .await?;
        Ok(self.announce(outcome, ctx).instrument(span).await)
    }

    pub async fn update_build(&self, id: BuildId, update: BuildUpdate) -> Result<SaveOutcome> {
        self.mutate(id, None, move |build| update.apply(build)).await
    }

    /// Replace the build's config. A top-level build without children
    /// expands if the new config is a matrix.
    pub async fn configure_build(&self, id: BuildId, config: BuildConfig) -> Result<SaveOutcome> {
        self.update_build(id, BuildUpdate::configured(config)).await
    }

    pub async fn start_build(&self, id: BuildId, at: DateTime<Utc>) -> Result<SaveOutcome> {
        self.update_build(id, BuildUpdate::started(at)).await
    }

    pub async fn finish_build(
        &self,
        id: BuildId,
        status: i32,
        at: DateTime<Utc>,
    ) -> Result<SaveOutcome> {
        self.update_build(id, BuildUpdate::finished(status, at)).await
    }

    /// Append `chars` to the build's log. Appends to one build are
    /// serialized, so concurrent callers never lose text.
    pub async fn append_log(&self, id: BuildId, chars: &str, msg_id: &str) -> Result<SaveOutcome> {
        let delta = LogAppend {
            chars: chars.to_string(),
            msg_id: msg_id.to_string(),
        };
        self.mutate(id, Some(delta), move |build| build.log.push_str(chars))
            .await
    }

    pub async fn get_build(&self, id: BuildId) -> Result<BuildRecord> {
        Ok(self.builds.get_build(id).await?)
    }

    /// Matrix children of a build, in creation order.
    pub async fn matrix(&self, id: BuildId) -> Result<Vec<BuildRecord>> {
        Ok(self.builds.children(id).await?)
    }

    /// Project a build under `view`, embedding matrix children for a matrix build.
    pub async fn project(&self, id: BuildId, view: View) -> Result<Value> {
        let build = self.builds.get_build(id).await?;
        let axes = MatrixAxes::extract(&build.config, &self.vocabulary);
        let matrix = self.matrix_of(&build, &axes).await?;
        Ok(project_build(&build, view, matrix.as_deref())?)
    }

    async fn matrix_of(
        &self,
        build: &BuildRecord,
        axes: &MatrixAxes,
    ) -> std::result::Result<Option<Vec<BuildRecord>>, StorageError> {
        if build.is_top_level() && axes.is_matrix() {
            Ok(Some(self.builds.children(build.id).await?))
        } else {
            Ok(None)
        }
    }

    async fn lease(&self, id: BuildId) -> WriterLease<'_> {
        let lock = {
            let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
            writers.entry(id).or_default().clone()
        };
        WriterLease {
            writers: &self.writers,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Read-modify-write of one build under its writer lock. The
    /// notification goes out once the lock is released.
    async fn mutate<F>(&self, id: BuildId, log_appended: Option<LogAppend>, apply: F) -> Result<SaveOutcome>
    where
        F: Fn(&mut BuildRecord) + Send + Sync,
    {
        let span = obs::build_span(id);
        let (outcome, ctx) = {
            let _lease = self.lease(id).await;
            self.save_with_retry(id, log_appended, &apply)
                .instrument(span.clone())
                .await?
        };

        Ok(self.announce(outcome, ctx).instrument(span).await)
    }

    /// Retries on version conflicts from writers outside this process.
    async fn save_with_retry<F>(
        &self,
        id: BuildId,
        log_appended: Option<LogAppend>,
        apply: &F,
    ) -> Result<(SaveOutcome, SaveContext)>
    where
        F: Fn(&mut BuildRecord) + Send + Sync,
    {
        for attempt in 1..=self.max_write_attempts {
            let before = self.builds.get_build(id).await?;
            let mut after = before.clone();
            apply(&mut after);

            let ctx = SaveContext::new(&after.config, &self.vocabulary, log_appended.clone());
            let children = if ctx.expands(after.is_top_level())
                && self.builds.children(id).await?.is_empty()
            {
                child_builds(&after.attributes(), &ctx.axes.rows())
            } else {
                Vec::new()
            };
            let children_created = children.len();

            match self.builds.update_build(&after, children).await {
                Ok(saved) => {
                    return self
                        .record_commit(Some(&before), saved, ctx, children_created)
                        .await
                }
                Err(StorageError::VersionConflict { .. })
                | Err(StorageError::MatrixAlreadyExpanded { .. }) => {
                    obs::emit_write_conflict(id, attempt);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(LatticeError::WriteContention {
            build_id: id,
            attempts: self.max_write_attempts,
        })
    }

    /// Logs the transition and syncs the repository summary. The outcome's
    /// notification stays `Skipped` until [`Self::announce`] runs.
    async fn record_commit(
        &self,
        before: Option<&BuildRecord>,
        saved: BuildRecord,
        ctx: SaveContext,
        children_created: usize,
    ) -> Result<(SaveOutcome, SaveContext)> {
        let transition = Transition::detect(before, &saved, ctx.log_appended.clone(), &ctx.axes);

        if children_created > 0 {
            obs::emit_matrix_expanded(saved.id, children_created, ctx.axes.keys());
        }
        if transition.was_started {
            obs::emit_build_started(saved.id);
        }
        if let Some(log) = &transition.log_appended {
            obs::emit_log_appended(saved.id, log.chars.len(), &log.msg_id);
        }
        if transition.was_finished {
            obs::emit_build_finished(saved.id, saved.status, saved.color());
        }

        let summary_synced = self.summary.sync(&saved, &transition.changes).await?;

        let outcome = SaveOutcome {
            build: saved,
            transition,
            children_created,
            summary_synced,
            notification: DispatchOutcome::Skipped,
        };
        Ok((outcome, ctx))
    }

    async fn announce(&self, mut outcome: SaveOutcome, ctx: SaveContext) -> SaveOutcome {
        outcome.notification = self
            .notify(&outcome.build, &outcome.transition, &ctx)
            .await;
        outcome
    }

    async fn notify(
        &self,
        build: &BuildRecord,
        transition: &Transition,
        ctx: &SaveContext,
    ) -> DispatchOutcome {
        let Some(kind) = NotificationKind::select(transition) else {
            return DispatchOutcome::Skipped;
        };

        match self.assemble(kind, build, transition, ctx).await {
            Ok(notification) => self.dispatcher.dispatch(build.id, &notification).await,
            Err(err) => {
                obs::emit_notification_dropped(build.id, kind.event_name(), 0, &err);
                DispatchOutcome::Dropped {
                    event: kind.event_name().to_string(),
                    attempts: 0,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn assemble(
        &self,
        kind: NotificationKind,
        build: &BuildRecord,
        transition: &Transition,
        ctx: &SaveContext,
    ) -> Result<Notification> {
        let repository = self.repositories.get_repository(build.repository_id).await?;
        let matrix = self.matrix_of(build, &ctx.axes).await?;
        Ok(Notification::build(
            kind,
            build,
            matrix.as_deref(),
            &repository,
            transition.log_appended.as_ref(),
        )?)
    }
}

fn invalid(err: DomainError) -> LatticeError {
    LatticeError::Validation(err.to_string())
}
