//! # Chained Multi-Step Processes
//!
//! A [`StepChain`] runs an ordered sequence of named steps, each backed by
//! its own action manager. A step marked critical only proceeds to the next
//! step on a clean completion (`on_success`); its failure halts the whole
//! sequence. A non-critical step records its failures but proceeds
//! regardless (`on_finish`).
//!
//! Step handoff rides the manager lifecycle hooks, so a step only starts
//! after every unit of work of the previous step reached a terminal state.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{error, info, warn};

use drover_api::types::BoxedFuture;

use super::factory::ActionManagerFactory;
use super::{ActionManager, ManagerError};

/// Body of one step: schedules work on the step's manager.
pub type StepFn =
    Box<dyn FnOnce(Arc<ActionManager>) -> BoxedFuture<'static, Result<(), ManagerError>> + Send>;

pub struct ChainStep {
    pub name: String,
    pub critical: bool,
    action: StepFn,
}

impl ChainStep {
    pub fn new(name: impl Into<String>, critical: bool, action: StepFn) -> Self {
        Self {
            name: name.into(),
            critical,
            action,
        }
    }
}

/// Ordered multi-step process built on action managers.
pub struct StepChain {
    name: String,
    factory: Arc<ActionManagerFactory>,
    save_interval: usize,
    steps: Vec<ChainStep>,
}

impl StepChain {
    pub fn new(name: impl Into<String>, factory: Arc<ActionManagerFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            save_interval: 1000,
            steps: Vec::new(),
        }
    }

    /// Batching interval for the managers backing each step.
    pub fn save_interval(mut self, save_interval: usize) -> Self {
        self.save_interval = save_interval;
        self
    }

    /// Append a step. Critical steps halt the chain on failure.
    pub fn step(mut self, name: impl Into<String>, critical: bool, action: StepFn) -> Self {
        self.steps.push(ChainStep::new(name, critical, action));
        self
    }

    /// Start the chain. Returns once the first step is scheduled; later
    /// steps launch from the previous step's completion hooks.
    pub async fn start(self) -> Result<(), ManagerError> {
        Self::run_step(
            self.factory,
            Arc::new(self.name),
            self.save_interval,
            VecDeque::from(self.steps),
        )
        .await
    }

    fn run_step(
        factory: Arc<ActionManagerFactory>,
        chain: Arc<String>,
        save_interval: usize,
        mut steps: VecDeque<ChainStep>,
    ) -> BoxedFuture<'static, Result<(), ManagerError>> {
        Box::pin(async move {
            let step = match steps.pop_front() {
                Some(step) => step,
                None => {
                    info!(chain = %chain, "chain complete");
                    return Ok(());
                }
            };

            let manager_name = format!("{chain}/{}", step.name);
            let manager = factory
                .create_action_manager_with_new_session(&manager_name, save_interval)
                .await?;
            info!(chain = %chain, step = %step.name, critical = step.critical, "step started");

            // Step managers are transient; release the name on completion so
            // the chain can run again and the registry stays bounded.
            {
                let factory = factory.clone();
                let name = manager_name.clone();
                manager.on_finish(Box::new(move || {
                    if let Err(e) = factory.purge(&name) {
                        warn!(step = %name, error = %e, "step manager purge failed");
                    }
                }));
            }

            if let Err(e) = (step.action)(manager.clone()).await {
                error!(chain = %chain, step = %step.name, error = %e, "step setup failed");
                manager.add_cleanup_task();
                if step.critical {
                    return Err(e);
                }
                return Self::run_step(factory, chain, save_interval, steps).await;
            }

            let proceed = {
                let factory = factory.clone();
                let chain = chain.clone();
                move || {
                    tokio::spawn(async move {
                        if let Err(e) = Self::run_step(factory, chain, save_interval, steps).await {
                            error!(error = %e, "chain aborted");
                        }
                    });
                }
            };

            if step.critical {
                let step_name = manager_name.clone();
                manager.on_success(Box::new(proceed));
                manager.on_failure(Box::new(move |failures| {
                    error!(
                        step = %step_name,
                        failures = failures.len(),
                        "critical step failed, halting chain"
                    );
                }));
            } else {
                manager.on_finish(Box::new(proceed));
            }

            manager.add_cleanup_task();
            Ok(())
        })
    }
}
