//! # Action Manager Factory
//!
//! Registry that creates uniquely-named [`ActionManager`]s bound to a shared
//! [`ThrottledWorkPool`], and lets operational tooling look them up, purge
//! them, and read pool-wide statistics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use drover_api::store::{QueryExecutor, SessionProvider};
use drover_api::types::SessionRef;

use super::{ActionManager, ManagerError};
use crate::pool::stats::PoolSnapshot;
use crate::pool::ThrottledWorkPool;

pub struct ActionManagerFactory {
    pool: Arc<ThrottledWorkPool>,
    provider: Arc<dyn SessionProvider>,
    query: Arc<dyn QueryExecutor>,
    managers: Mutex<HashMap<String, Arc<ActionManager>>>,
}

impl ActionManagerFactory {
    pub fn new(
        pool: Arc<ThrottledWorkPool>,
        provider: Arc<dyn SessionProvider>,
        query: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            pool,
            provider,
            query,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new action manager bound to the caller-supplied session and
    /// batching interval.
    ///
    /// # Errors
    /// [`ManagerError::DuplicateName`] if a manager with this name already
    /// exists; names stay reserved until the manager is purged.
    pub fn create_action_manager(
        &self,
        name: &str,
        session: SessionRef,
        save_interval: usize,
    ) -> Result<Arc<ActionManager>, ManagerError> {
        let mut managers = self.managers.lock().unwrap();
        if managers.contains_key(name) {
            return Err(ManagerError::DuplicateName(name.to_string()));
        }

        let manager = ActionManager::new(
            name.to_string(),
            session,
            save_interval,
            self.pool.clone(),
            self.provider.clone(),
            self.query.clone(),
        );
        managers.insert(name.to_string(), manager.clone());
        info!(manager = name, save_interval, "action manager created");
        Ok(manager)
    }

    /// Create a manager whose primary session is opened from the factory's
    /// own provider rather than supplied by the caller.
    pub async fn create_action_manager_with_new_session(
        &self,
        name: &str,
        save_interval: usize,
    ) -> Result<Arc<ActionManager>, ManagerError> {
        let session = self.provider.open_session().await?;
        self.create_action_manager(name, session, save_interval)
    }

    /// Look up a manager by name.
    pub fn get(&self, name: &str) -> Option<Arc<ActionManager>> {
        self.managers.lock().unwrap().get(name).cloned()
    }

    /// Names of all registered managers.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a completed manager from the registry.
    ///
    /// # Errors
    /// [`ManagerError::PendingWork`] if the manager still has units of work
    /// in flight; drain it or use [`Self::purge_force`].
    pub fn purge(&self, name: &str) -> Result<(), ManagerError> {
        let mut managers = self.managers.lock().unwrap();
        let manager = managers
            .get(name)
            .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

        if !manager.is_complete() {
            return Err(ManagerError::PendingWork(name.to_string()));
        }

        managers.remove(name);
        info!(manager = name, "action manager purged");
        Ok(())
    }

    /// Cancel a manager's in-flight work, force-close its sessions, and
    /// remove it from the registry.
    pub async fn purge_force(&self, name: &str) -> Result<(), ManagerError> {
        let manager = {
            let mut managers = self.managers.lock().unwrap();
            managers
                .remove(name)
                .ok_or_else(|| ManagerError::NotFound(name.to_string()))?
        };

        if !manager.is_complete() {
            warn!(manager = name, "force-purging manager with pending work");
            manager.cancel(true);
        }
        manager.close_all_resolvers().await;
        Ok(())
    }

    /// Read-only pool-wide statistics for monitoring surfaces.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    pub fn pool(&self) -> Arc<ThrottledWorkPool> {
        self.pool.clone()
    }

    /// Tear down every registered manager and shut the pool down.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ManagerError> {
        let managers: Vec<Arc<ActionManager>> =
            self.managers.lock().unwrap().drain().map(|(_, m)| m).collect();

        for manager in &managers {
            if !manager.is_complete() {
                manager.cancel(true);
            }
        }
        for manager in &managers {
            manager.close_all_resolvers().await;
        }

        self.pool.shutdown(timeout).await?;
        Ok(())
    }
}
