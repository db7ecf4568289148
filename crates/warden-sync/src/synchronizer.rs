//! The role cache synchronizer.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_cache::{CacheStore, ProjectRoles, ProjectionCache};
use warden_core::ProjectId;
use warden_store::{Role, RoleFilter, RoleStore, StoreError};

use crate::error::{Result, SyncError};
use crate::transform::{transform, Projection};
use crate::SyncConfig;

/// Outcome of one incremental poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Role records changed or deleted since the previous watermark.
    pub changed_roles: usize,
    /// Project projections rewritten successfully.
    pub projects_written: usize,
    /// Projects that could not be rebuilt or written; retried next tick.
    pub failed: Vec<ProjectId>,
}

/// One-way pipeline from the role store into the projection cache.
///
/// Owns the sync watermark: the store's commit horizon at the start of the
/// last completed pass. Roles with `updated_at` after it are picked up by the
/// next poll.
pub struct RoleSynchronizer<S, C> {
    store: Arc<S>,
    cache: ProjectionCache<C>,
    config: SyncConfig,
    watermark: Option<DateTime<Utc>>,
    pending: BTreeSet<ProjectId>,
}

impl<S, C> RoleSynchronizer<S, C>
where
    S: RoleStore + 'static,
    C: CacheStore + 'static,
{
    /// Create a synchronizer. Nothing runs until [`run`](Self::run) or
    /// [`initial_sync`](Self::initial_sync) is called.
    #[must_use]
    pub fn new(store: Arc<S>, cache: ProjectionCache<C>, config: SyncConfig) -> Self {
        Self {
            store,
            cache,
            config,
            watermark: None,
            pending: BTreeSet::new(),
        }
    }

    /// Start time of the last completed sync pass, if any.
    #[must_use]
    pub const fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Projects whose last rebuild failed and will be retried.
    #[must_use]
    pub fn pending_projects(&self) -> Vec<ProjectId> {
        self.pending.iter().copied().collect()
    }

    /// Write the projection of every project with active roles, and an empty
    /// entry for every project whose roles are all deleted.
    ///
    /// Returns the number of projects written. Undecodable role records are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the store error if the query fails, or
    /// `SyncError::PartialWrite` naming every project whose write failed.
    /// The watermark is only set on full success.
    pub async fn initial_sync(&mut self) -> Result<usize> {
        let started = self.commit_horizon().await?;

        let roles = readable(self.query(RoleFilter::active()).await?);
        let tombstones = readable(self.query(RoleFilter::deleted()).await?);

        let mut projection = transform(&roles);
        let live = projection.len();
        for role in &tombstones {
            projection.entry(role.project_id).or_default();
        }
        let projects = projection.len();
        if projects > live {
            debug!(emptied = projects - live, "Clearing projects with no active roles");
        }

        let failed = self.write_projects(projection).await;
        if !failed.is_empty() {
            return Err(SyncError::PartialWrite { failed });
        }

        self.watermark = Some(started);
        info!(roles = roles.len(), projects, "Initial role sync complete");
        Ok(projects)
    }

    /// Run one incremental poll.
    ///
    /// Projects touched by roles changed or deleted since the watermark, plus
    /// projects that failed on earlier ticks, are rebuilt from their complete
    /// set of active roles. The watermark then advances to the start of this
    /// poll, whether or not every write succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error without moving the watermark if either change query
    /// fails, or `SyncError::NotInitialized` before a successful initial sync.
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let since = self.watermark.ok_or(SyncError::NotInitialized)?;
        let tick_start = self.commit_horizon().await?;

        let changed = readable(
            self.query(RoleFilter::active().updated_after(since))
                .await?,
        );
        let removed = readable(
            self.query(RoleFilter::deleted().updated_after(since))
                .await?,
        );

        let mut touched = std::mem::take(&mut self.pending);
        touched.extend(changed.iter().chain(&removed).map(|r| r.project_id));

        let mut failed = Vec::new();
        let mut projection = Projection::new();
        for project_id in touched {
            match self.query(RoleFilter::active().in_project(project_id)).await {
                Ok(results) => {
                    let roles = readable(results);
                    let permissions = transform(&roles)
                        .remove(&project_id)
                        .unwrap_or_default();
                    projection.insert(project_id, permissions);
                }
                Err(e) => {
                    warn!(project_id = %project_id, error = %e, "Failed to load project roles");
                    failed.push(project_id);
                }
            }
        }

        let attempted = projection.len();
        let write_failures = self.write_projects(projection).await;
        let projects_written = attempted - write_failures.len();
        failed.extend(write_failures);

        self.pending = failed.iter().copied().collect();
        self.watermark = Some(tick_start);

        Ok(PollReport {
            changed_roles: changed.len() + removed.len(),
            projects_written,
            failed,
        })
    }

    /// Run the initial sync, then poll until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the initial sync error; the poll loop is not started in that
    /// case. Poll failures are logged and retried on the next tick.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        tokio::select! {
            result = self.initial_sync() => {
                if let Err(e) = result {
                    error!(error = %e, "Initial role sync failed, poll loop not started");
                    return Err(e);
                }
            }
            () = shutdown.cancelled() => {
                info!("Role sync cancelled during initial sync");
                return Ok(());
            }
        }

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = period.as_secs(), "Starting role poll loop");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(report) if report.changed_roles > 0 || !report.failed.is_empty() => {
                            info!(
                                changed_roles = report.changed_roles,
                                projects_written = report.projects_written,
                                failed = report.failed.len(),
                                "Role changes synced"
                            );
                        }
                        Ok(_) => debug!("No role changes"),
                        Err(e) => warn!(error = %e, "Role poll failed, retrying next tick"),
                    }
                }
                () = shutdown.cancelled() => {
                    info!("Role sync stopped");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }

    async fn query(
        &self,
        filter: RoleFilter,
    ) -> Result<Vec<std::result::Result<Role, StoreError>>> {
        self.blocking(move |store| store.find_roles(&filter)).await
    }

    /// Taken before the change scans, so a write still in flight is either
    /// visible to them or stamped after the new watermark.
    async fn commit_horizon(&self) -> Result<DateTime<Utc>> {
        self.blocking(|store| Ok(store.commit_horizon())).await
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || call(store.as_ref()));

        match tokio::time::timeout(self.config.store_timeout, task).await {
            Err(_) => Err(SyncError::StoreTimeout(self.config.store_timeout)),
            Ok(Err(join)) => Err(SyncError::Task(join.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Write every project, at most `write_concurrency` at a time. Returns
    /// the projects that failed.
    async fn write_projects(&self, projection: Projection) -> Vec<ProjectId> {
        stream::iter(projection)
            .map(|(project_id, permissions)| async move {
                let roles = ProjectRoles::new(project_id, permissions);
                match self.cache.put_project_roles(&roles).await {
                    Ok(()) => None,
                    Err(e) => {
                        error!(project_id = %project_id, error = %e, "Failed to write project roles");
                        Some(project_id)
                    }
                }
            })
            .buffer_unordered(self.config.write_concurrency.max(1))
            .filter_map(|failed| async move { failed })
            .collect()
            .await
    }
}

fn readable(results: Vec<std::result::Result<Role, StoreError>>) -> Vec<Role> {
    results
        .into_iter()
        .filter_map(|r| {
            r.map_err(|e| warn!(error = %e, "Skipping undecodable role record"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use warden_cache::{project_key, MemoryCache};
    use warden_core::{Permission, PermissionMap};
    use warden_store::{MemoryRoleStore, NewRole};

    struct Harness {
        store: Arc<MemoryRoleStore>,
        memory: Arc<MemoryCache>,
        cache: ProjectionCache<MemoryCache>,
        sync: RoleSynchronizer<MemoryRoleStore, MemoryCache>,
    }

    fn config(poll_interval: Duration) -> SyncConfig {
        SyncConfig {
            poll_interval,
            store_timeout: Duration::from_secs(5),
            write_concurrency: 4,
        }
    }

    fn harness(poll_interval: Duration) -> Harness {
        let store = Arc::new(MemoryRoleStore::new());
        let memory = Arc::new(MemoryCache::new());
        let cache = ProjectionCache::new(Arc::clone(&memory), Duration::from_secs(5));
        let sync = RoleSynchronizer::new(Arc::clone(&store), cache.clone(), config(poll_interval));
        Harness {
            store,
            memory,
            cache,
            sync,
        }
    }

    fn new_role(project: &ProjectId, name: &str, resource: &str, actions: &[&str]) -> NewRole {
        let mut permissions = PermissionMap::new();
        permissions.insert(resource.to_string(), Permission::new(actions.iter().copied()));
        NewRole {
            project_id: *project,
            owner: "owner@example.com".to_string(),
            role: name.to_string(),
            description: String::new(),
            permissions,
        }
    }

    async fn cached_roles(cache: &ProjectionCache<MemoryCache>, project: &ProjectId) -> BTreeSet<String> {
        cache
            .get_project_roles(project)
            .await
            .unwrap()
            .map(|p| p.permissions.into_keys().collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn initial_sync_writes_one_entry_per_project() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.store.create_role(new_role(&p1, "viewer", "urn:x", &["read"])).unwrap();
        h.store.create_role(new_role(&p2, "admin", "urn:y", &["write"])).unwrap();

        assert_eq!(h.sync.initial_sync().await.unwrap(), 2);

        assert_eq!(h.memory.write_count(), 2);
        assert_eq!(h.memory.keys(), {
            let mut keys = vec![project_key(&p1), project_key(&p2)];
            keys.sort();
            keys
        });
        assert!(h.cache.is_allowed(&p2, &["admin"], "urn:y", "write").await.unwrap());
        assert!(h.sync.watermark().is_some());
    }

    #[tokio::test]
    async fn initial_sync_skips_deleted_and_undecodable_roles() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        let gone = h.store.create_role(new_role(&p1, "legacy", "urn:x", &["read"])).unwrap();
        h.store.soft_delete_role(&gone.role_id).unwrap();
        h.store.inject_corrupt_records(2);

        h.sync.initial_sync().await.unwrap();

        assert_eq!(
            cached_roles(&h.cache, &p1).await,
            BTreeSet::from(["admin".to_string()])
        );
    }

    #[tokio::test]
    async fn restart_clears_project_whose_roles_were_all_deleted() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");
        let admin = h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.store.create_role(new_role(&p2, "admin", "urn:x", &["read"])).unwrap();
        h.sync.initial_sync().await.unwrap();
        assert!(h.cache.is_allowed(&p1, &["admin"], "urn:x", "read").await.unwrap());

        // Deleted while no synchronizer was running.
        h.store.soft_delete_role(&admin.role_id).unwrap();

        let mut restarted =
            RoleSynchronizer::new(Arc::clone(&h.store), h.cache.clone(), config(Duration::from_secs(60)));
        assert_eq!(restarted.initial_sync().await.unwrap(), 2);

        let cached = h.cache.get_project_roles(&p1).await.unwrap().unwrap();
        assert!(cached.permissions.is_empty());
        assert!(!h.cache.is_allowed(&p1, &["admin"], "urn:x", "read").await.unwrap());
        assert!(h.cache.is_allowed(&p2, &["admin"], "urn:x", "read").await.unwrap());
    }

    #[tokio::test]
    async fn project_writes_are_bounded() {
        let mut h = harness(Duration::from_secs(60));
        h.memory.set_write_delay(Some(Duration::from_millis(10)));
        for i in 0..12 {
            let project = ProjectId::from_seed(&format!("p{i}"));
            h.store.create_role(new_role(&project, "admin", "urn:x", &["read"])).unwrap();
        }

        assert_eq!(h.sync.initial_sync().await.unwrap(), 12);
        assert_eq!(h.memory.write_count(), 12);
        assert!(h.memory.peak_concurrent_writes() <= 4);
        assert!(h.memory.peak_concurrent_writes() > 1);
    }

    #[tokio::test]
    async fn initial_sync_query_failure_aborts() {
        let mut h = harness(Duration::from_secs(60));
        h.store
            .create_role(new_role(&ProjectId::from_seed("p1"), "admin", "urn:x", &["read"]))
            .unwrap();
        h.store.fail_queries(true);

        let err = h.sync.initial_sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert_eq!(h.memory.write_count(), 0);
        assert!(h.sync.watermark().is_none());
    }

    #[tokio::test]
    async fn initial_sync_reports_every_failed_project() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.store.create_role(new_role(&p2, "admin", "urn:x", &["read"])).unwrap();
        h.memory.fail_writes_for(project_key(&p1));

        let err = h.sync.initial_sync().await.unwrap_err();
        match err {
            SyncError::PartialWrite { failed } => assert_eq!(failed, vec![p1]),
            other => panic!("unexpected error: {other}"),
        }
        // The other project was still written.
        assert!(h.cache.get_project_roles(&p2).await.unwrap().is_some());
        assert!(h.sync.watermark().is_none());
    }

    #[tokio::test]
    async fn poll_before_initial_sync_is_rejected() {
        let mut h = harness(Duration::from_secs(60));
        assert!(matches!(
            h.sync.poll_once().await,
            Err(SyncError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn poll_rewrites_only_touched_projects() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        let p2 = ProjectId::from_seed("p2");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.store.create_role(new_role(&p2, "admin", "urn:x", &["read"])).unwrap();
        h.sync.initial_sync().await.unwrap();
        let before = h.sync.watermark().unwrap();

        h.store.create_role(new_role(&p1, "viewer", "urn:x", &["read"])).unwrap();
        let report = h.sync.poll_once().await.unwrap();

        assert_eq!(report.changed_roles, 1);
        assert_eq!(report.projects_written, 1);
        assert!(report.failed.is_empty());
        assert_eq!(h.memory.write_count(), 3);
        // The rebuilt entry keeps the roles that did not change.
        assert_eq!(
            cached_roles(&h.cache, &p1).await,
            BTreeSet::from(["admin".to_string(), "viewer".to_string()])
        );
        assert!(h.sync.watermark().unwrap() > before);
    }

    #[tokio::test]
    async fn poll_with_no_changes_writes_nothing() {
        let mut h = harness(Duration::from_secs(60));
        h.store
            .create_role(new_role(&ProjectId::from_seed("p1"), "admin", "urn:x", &["read"]))
            .unwrap();
        h.sync.initial_sync().await.unwrap();

        let report = h.sync.poll_once().await.unwrap();
        assert_eq!(report, PollReport::default());
        assert_eq!(h.memory.write_count(), 1);
    }

    #[tokio::test]
    async fn failed_poll_query_keeps_watermark() {
        let mut h = harness(Duration::from_secs(60));
        h.sync.initial_sync().await.unwrap();
        let watermark = h.sync.watermark();

        h.store.fail_queries(true);
        assert!(h.sync.poll_once().await.is_err());
        assert_eq!(h.sync.watermark(), watermark);

        // The same window is re-queried once the store recovers.
        h.store.fail_queries(false);
        let p1 = ProjectId::from_seed("p1");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        let report = h.sync.poll_once().await.unwrap();
        assert_eq!(report.projects_written, 1);
    }

    #[tokio::test]
    async fn soft_deleted_role_is_removed_from_projection() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        let viewer = h.store.create_role(new_role(&p1, "viewer", "urn:x", &["read"])).unwrap();
        h.sync.initial_sync().await.unwrap();

        h.store.soft_delete_role(&viewer.role_id).unwrap();
        let report = h.sync.poll_once().await.unwrap();

        assert_eq!(report.changed_roles, 1);
        assert_eq!(
            cached_roles(&h.cache, &p1).await,
            BTreeSet::from(["admin".to_string()])
        );
    }

    #[tokio::test]
    async fn project_with_no_active_roles_is_emptied() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.sync.initial_sync().await.unwrap();

        h.store.soft_delete_project_roles(&p1).unwrap();
        h.sync.poll_once().await.unwrap();

        let cached = h.cache.get_project_roles(&p1).await.unwrap().unwrap();
        assert!(cached.permissions.is_empty());
        assert!(!h.cache.is_allowed(&p1, &["admin"], "urn:x", "read").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn poll_sees_write_in_flight_when_it_starts() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        let admin = h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.sync.initial_sync().await.unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let store = Arc::clone(&h.store);
        let writer = std::thread::spawn(move || {
            store
                .modify_role(&admin.role_id, &mut |role| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(100));
                    role.set_permission("urn:y", BTreeSet::from(["write".to_string()]));
                    Ok(())
                })
                .unwrap();
        });
        entered_rx.recv().unwrap();

        let report = h.sync.poll_once().await.unwrap();
        writer.join().unwrap();

        assert_eq!(report.changed_roles, 1);
        assert!(h.cache.is_allowed(&p1, &["admin"], "urn:y", "write").await.unwrap());
        // Nothing is left for the next poll to find.
        assert_eq!(h.sync.poll_once().await.unwrap(), PollReport::default());
    }

    #[tokio::test]
    async fn failed_project_write_is_retried_next_tick() {
        let mut h = harness(Duration::from_secs(60));
        let p1 = ProjectId::from_seed("p1");
        h.sync.initial_sync().await.unwrap();

        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();
        h.memory.fail_writes_for(project_key(&p1));
        let report = h.sync.poll_once().await.unwrap();
        assert_eq!(report.failed, vec![p1]);
        assert_eq!(h.sync.pending_projects(), vec![p1]);

        // No further role changes; the pending project alone is rewritten.
        h.memory.clear_failures();
        let report = h.sync.poll_once().await.unwrap();
        assert_eq!(report.changed_roles, 0);
        assert_eq!(report.projects_written, 1);
        assert!(h.sync.pending_projects().is_empty());
        assert!(h.cache.is_allowed(&p1, &["admin"], "urn:x", "read").await.unwrap());
    }

    #[tokio::test]
    async fn run_stops_when_initial_sync_fails() {
        let h = harness(Duration::from_millis(10));
        h.store.fail_queries(true);

        let result = h.sync.run(CancellationToken::new()).await;
        assert!(result.is_err());
        assert_eq!(h.store.query_count(), 1);
    }

    #[tokio::test]
    async fn run_picks_up_changes_and_stops_on_cancel() {
        let h = harness(Duration::from_millis(20));
        let shutdown = CancellationToken::new();
        let handle = h.sync.spawn(shutdown.clone());

        let p1 = ProjectId::from_seed("p1");
        h.store.create_role(new_role(&p1, "admin", "urn:x", &["read"])).unwrap();

        let mut synced = false;
        for _ in 0..100 {
            if h.cache.is_allowed(&p1, &["admin"], "urn:x", "read").await.unwrap() {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(synced);

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sync task did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancel_between_ticks_exits_promptly() {
        let h = harness(Duration::from_secs(3600));
        let shutdown = CancellationToken::new();
        let handle = h.sync.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sync task did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
