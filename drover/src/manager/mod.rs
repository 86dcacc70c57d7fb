//! # Action Managers
//!
//! An [`ActionManager`] is a named façade over the throttled worker pool,
//! one per logical bulk operation. It submits units of work, hands each one
//! a scoped store session, tracks aggregate counts, accumulates the failure
//! ledger, and fires lifecycle hooks exactly once when everything submitted
//! has reached a terminal state.
//!
//! Managers are created through the [`factory::ActionManagerFactory`], which
//! enforces unique names and supports lookup and purge for operational
//! tooling.

pub mod batch;
pub mod chain;
pub mod factory;
pub mod failure;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use drover_api::priority;
use drover_api::store::{QueryExecutor, SessionProvider, StoreError};
use drover_api::types::{ItemCallback, ItemFilter, SessionAction, SessionRef, WorkResult};
use drover_api::work::WorkError;

use crate::cancel::CancelGroup;
use crate::pool::{Job, PoolError, ThrottledWorkPool};
use failure::Failure;

/// Errors related to action-manager operations.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Action manager name already exists: {0}")]
    DuplicateName(String),

    #[error("Action manager not found: {0}")]
    NotFound(String),

    #[error("Action manager has pending work: {0}")]
    PendingWork(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Hook fired with no arguments (`on_success`, `on_finish`).
pub type Hook = Box<dyn FnOnce() + Send>;

/// Hook fired with the accumulated failure ledger (`on_failure`).
pub type FailureHook = Box<dyn FnOnce(&[Failure]) + Send>;

struct HookState {
    on_success: Vec<Hook>,
    on_failure: Vec<FailureHook>,
    on_finish: Vec<Hook>,
    /// Set once the hooks have fired; later registrations fire immediately.
    fired: bool,
}

/// Per-operation task-tracking façade.
///
/// # Completion Contract
/// Lifecycle hooks fire exactly once, only after `add_cleanup_task` has been
/// called and every unit of work submitted before it reached a terminal
/// state. `add_cleanup_task` must therefore be the last thing scheduled.
///
/// # Session Ownership
/// Sessions opened by this manager are owned by it exclusively until
/// cleanup; concurrently running units never share a session. Callers that
/// skip `add_cleanup_task` leak sessions until the factory tears the
/// manager down.
pub struct ActionManager {
    name: String,
    pool: Arc<ThrottledWorkPool>,
    provider: Arc<dyn SessionProvider>,
    query: Arc<dyn QueryExecutor>,

    /// Caller-supplied session, used for query enumeration.
    primary: SessionRef,

    /// Batching interval handed to batch committers built on this manager.
    save_interval: usize,

    /// Cancellation group shared by every unit of work of this operation.
    cancel_group: CancelGroup,

    added: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,

    /// Fires hooks only after cleanup has been armed.
    cleanup_armed: AtomicBool,

    /// Last-touched target identifier. Last-writer-wins across workers;
    /// diagnostic only.
    current_item: Mutex<String>,

    failures: Mutex<Vec<Failure>>,
    hooks: Mutex<HookState>,

    /// Sessions available for reuse by the next unit of work.
    idle_sessions: Mutex<Vec<SessionRef>>,

    /// Every session this manager ever opened, for forced close at cleanup.
    opened_sessions: Mutex<Vec<SessionRef>>,
}

impl ActionManager {
    pub(crate) fn new(
        name: String,
        primary: SessionRef,
        save_interval: usize,
        pool: Arc<ThrottledWorkPool>,
        provider: Arc<dyn SessionProvider>,
        query: Arc<dyn QueryExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            pool,
            provider,
            query,
            primary,
            save_interval,
            cancel_group: CancelGroup::new(),
            added: AtomicU64::new(0),
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            cleanup_armed: AtomicBool::new(false),
            current_item: Mutex::new(String::new()),
            failures: Mutex::new(Vec::new()),
            hooks: Mutex::new(HookState {
                on_success: Vec::new(),
                on_failure: Vec::new(),
                on_finish: Vec::new(),
                fired: false,
            }),
            idle_sessions: Mutex::new(Vec::new()),
            opened_sessions: Mutex::new(Vec::new()),
        })
    }

    /// Identity used for factory lookup and uniqueness.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Batching interval this manager was created with.
    pub fn save_interval(&self) -> usize {
        self.save_interval
    }

    /// Cancellation group covering all of this manager's work.
    pub fn cancel_group(&self) -> CancelGroup {
        self.cancel_group.clone()
    }

    /// Cancel this operation; `force` additionally interrupts in-flight work.
    pub fn cancel(&self, force: bool) {
        info!(manager = self.name, force, "cancelling operation");
        self.cancel_group.cancel(force);
    }

    pub fn added_count(&self) -> u64 {
        self.added.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error.load(Ordering::SeqCst)
    }

    /// Units submitted but not yet terminal.
    pub fn remaining_count(&self) -> u64 {
        self.added_count() - self.success_count() - self.error_count()
    }

    /// True iff every unit of work submitted through this manager has
    /// reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.remaining_count() == 0
    }

    /// Record the identifier currently being processed, for cross-thread
    /// diagnostics. Intentionally last-writer-wins.
    pub fn set_current_item(&self, item: impl Into<String>) {
        *self.current_item.lock().unwrap() = item.into();
    }

    pub fn current_item(&self) -> String {
        self.current_item.lock().unwrap().clone()
    }

    /// The accumulated failure ledger.
    pub fn failure_list(&self) -> Vec<Failure> {
        self.failures.lock().unwrap().clone()
    }

    pub(crate) fn record_failure(&self, item: impl Into<String>, error: &WorkError) {
        self.failures.lock().unwrap().push(Failure::new(item, error));
    }

    // ---- session pooling ----

    async fn checkout_session(&self) -> Result<SessionRef, StoreError> {
        if let Some(session) = self.idle_sessions.lock().unwrap().pop() {
            return Ok(session);
        }

        let session = self.provider.open_session().await?;
        self.opened_sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    fn checkin_session(&self, session: SessionRef) {
        self.idle_sessions.lock().unwrap().push(session);
    }

    /// Drop a session whose unit of work failed.
    ///
    /// A failed unit may have staged uncommitted mutations on its session;
    /// returning it to the idle pool would let a later unit's `commit`
    /// silently persist them. The session is closed instead and stays only
    /// in the opened list, where a repeated close at cleanup is harmless.
    async fn discard_session(&self, session: SessionRef) {
        if let Err(e) = session.close().await {
            warn!(manager = self.name, error = %e, "failed-session close failed");
        }
    }

    // ---- work submission ----

    /// Schedule `action(session)` as a single asynchronous unit of work
    /// using a pooled session owned by this manager.
    pub fn deferred_with_resolver(
        self: &Arc<Self>,
        action: SessionAction,
    ) -> Result<(), ManagerError> {
        self.schedule_session_action(action, priority::NORMAL)
    }

    /// Like [`Self::deferred_with_resolver`] with an explicit priority.
    pub fn deferred_with_priority(
        self: &Arc<Self>,
        action: SessionAction,
        priority: u8,
    ) -> Result<(), ManagerError> {
        self.schedule_session_action(action, priority)
    }

    /// Run `action(session)` synchronously on the calling task.
    ///
    /// Used for setup and validation steps that must complete before
    /// subsequent steps are scheduled. The outcome is tracked in this
    /// manager's counts and ledger like any other unit of work.
    pub async fn with_resolver(self: &Arc<Self>, action: SessionAction) -> WorkResult {
        self.added.fetch_add(1, Ordering::SeqCst);

        let result = match self.checkout_session().await {
            Ok(session) => {
                let result = action(session.clone()).await;
                match &result {
                    Ok(()) => self.checkin_session(session),
                    Err(_) => self.discard_session(session).await,
                }
                result
            }
            Err(e) => Err(WorkError::Store(e)),
        };

        self.work_finished(&result);
        result
    }

    /// Execute a query against the backing store and schedule `callback` for
    /// every result that passes all `filters`.
    ///
    /// Filters run synchronously on the enumerating task, with AND
    /// semantics; a filtered-out result is skipped without counting as a
    /// failure. The callback always runs asynchronously in the pool.
    ///
    /// # Returns
    /// The **pre-filter** count of query hits, i.e. the total number of
    /// results the query matched before any filter ran.
    pub async fn with_query_results(
        self: &Arc<Self>,
        statement: &str,
        language: &str,
        callback: ItemCallback,
        filters: Vec<ItemFilter>,
    ) -> Result<usize, ManagerError> {
        let ids = self.query.query(statement, language, &self.primary).await?;
        let total_hits = ids.len();
        debug!(
            manager = self.name,
            statement, language, total_hits, "query enumerated"
        );

        for id in ids {
            if !filters.iter().all(|filter| filter(&id)) {
                continue;
            }

            let manager = self.clone();
            let callback = callback.clone();
            self.schedule_session_action(
                Box::new(move |session| {
                    Box::pin(async move {
                        manager.set_current_item(&id);
                        callback(session, id).await
                    })
                }),
                priority::NORMAL,
            )?;
        }

        Ok(total_hits)
    }

    fn schedule_session_action(
        self: &Arc<Self>,
        action: SessionAction,
        priority: u8,
    ) -> Result<(), ManagerError> {
        self.added.fetch_add(1, Ordering::SeqCst);

        let manager = self.clone();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let session = manager.checkout_session().await?;
                let result = action(session.clone()).await;
                match &result {
                    Ok(()) => manager.checkin_session(session),
                    Err(_) => manager.discard_session(session).await,
                }
                result
            })
        });

        let manager = self.clone();
        let submitted = self.pool.submit(
            job,
            priority,
            Some(self.cancel_group.clone()),
            Some(Box::new(move |result| manager.work_finished(&result))),
        );

        if let Err(e) = submitted {
            // Never scheduled; keep counts honest.
            self.added.fetch_sub(1, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    // ---- completion ----

    /// Terminal accounting for one unit of work.
    ///
    /// Cancellation is a clean exit: it is tallied as a success and never
    /// ledgered. A batch-commit failure was already ledgered per grouped
    /// item by the committer, so only the error count moves here.
    fn work_finished(&self, result: &WorkResult) {
        match result {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) if e.is_cancellation() => {
                debug!(manager = self.name, "unit exited on cancellation");
                self.success.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.error.fetch_add(1, Ordering::SeqCst);
                if !matches!(e, WorkError::BatchCommit { .. }) {
                    self.record_failure(self.current_item(), e);
                }
            }
        }

        self.maybe_complete();
    }

    /// Schedule the terminal cleanup for this manager.
    ///
    /// Mandatory for normal callers, and must be the last thing scheduled:
    /// once every unit submitted before this call is terminal, the lifecycle
    /// hooks fire and every session this manager opened is force-closed.
    pub fn add_cleanup_task(&self) {
        self.cleanup_armed.store(true, Ordering::SeqCst);
        self.maybe_complete();
    }

    fn maybe_complete(&self) {
        if !self.cleanup_armed.load(Ordering::SeqCst) || !self.is_complete() {
            return;
        }

        let (on_success, on_failure, on_finish) = {
            let mut hooks = self.hooks.lock().unwrap();
            if hooks.fired {
                return;
            }
            // Re-check under the lock so a completion racing a late
            // submission cannot fire early.
            if !self.is_complete() {
                return;
            }
            hooks.fired = true;
            (
                std::mem::take(&mut hooks.on_success),
                std::mem::take(&mut hooks.on_failure),
                std::mem::take(&mut hooks.on_finish),
            )
        };

        let failures = self.failure_list();
        crate::log_manager!(
            self.name.as_str(),
            "completed",
            added = self.added_count(),
            success = self.success_count(),
            error = self.error_count()
        );

        if failures.is_empty() {
            for hook in on_success {
                hook();
            }
        } else {
            for hook in on_failure {
                hook(&failures);
            }
        }
        for hook in on_finish {
            hook();
        }

        self.schedule_session_close();
    }

    /// Close every opened session as background work on the pool.
    fn schedule_session_close(&self) {
        let sessions = self.take_sessions();
        if sessions.is_empty() {
            return;
        }

        // The close job and the refusal fallback share the session list so
        // a refused job never strands unclosed sessions.
        let pending = Arc::new(Mutex::new(sessions));
        let name = self.name.clone();
        let job_sessions = pending.clone();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let sessions: Vec<SessionRef> =
                    job_sessions.lock().unwrap().drain(..).collect();
                for session in sessions {
                    if let Err(e) = session.close().await {
                        warn!(manager = %name, error = %e, "session close failed");
                    }
                }
                Ok(())
            })
        });

        if self
            .pool
            .schedule_work(job, priority::BACKGROUND, None)
            .is_err()
        {
            self.opened_sessions
                .lock()
                .unwrap()
                .extend(pending.lock().unwrap().drain(..));
            warn!(
                manager = self.name,
                "pool unavailable, sessions left for factory teardown"
            );
        }
    }

    fn take_sessions(&self) -> Vec<SessionRef> {
        self.idle_sessions.lock().unwrap().clear();
        self.opened_sessions.lock().unwrap().drain(..).collect()
    }

    /// Immediate, non-deferred forced close of every session this manager
    /// opened, the primary included.
    ///
    /// Reserved for factory teardown; normal callers must use
    /// [`Self::add_cleanup_task`] instead.
    pub async fn close_all_resolvers(&self) {
        let mut sessions = self.take_sessions();
        sessions.push(self.primary.clone());

        for session in sessions {
            if let Err(e) = session.close().await {
                warn!(manager = self.name, error = %e, "forced session close failed");
            }
        }
    }

    // ---- lifecycle hooks ----

    /// Register a hook fired when the operation completes with an empty
    /// failure ledger. Fires immediately if the operation already completed.
    pub fn on_success(&self, hook: Hook) {
        {
            let mut hooks = self.hooks.lock().unwrap();
            if !hooks.fired {
                hooks.on_success.push(hook);
                return;
            }
        }
        if self.failure_list().is_empty() {
            hook();
        }
    }

    /// Register a hook fired with the failure ledger when the operation
    /// completes with at least one failure.
    pub fn on_failure(&self, hook: FailureHook) {
        let mut hooks = self.hooks.lock().unwrap();
        if hooks.fired {
            drop(hooks);
            let failures = self.failure_list();
            if !failures.is_empty() {
                hook(&failures);
            }
            return;
        }
        hooks.on_failure.push(hook);
    }

    /// Register a hook fired unconditionally on completion.
    pub fn on_finish(&self, hook: Hook) {
        let mut hooks = self.hooks.lock().unwrap();
        if hooks.fired {
            drop(hooks);
            hook();
            return;
        }
        hooks.on_finish.push(hook);
    }
}
