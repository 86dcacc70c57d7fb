// Drover Task-Execution Core
//
// This crate implements the drover-api interface layer: a resource-aware,
// admission-controlled worker pool plus per-operation action managers for
// running bulk operations against a shared content store.

pub mod cancel;
pub mod logging;
pub mod manager;
pub mod pool;
pub mod sysmon;

// Re-export commonly used types
pub use cancel::CancelGroup;
pub use manager::batch::BatchCommitter;
pub use manager::chain::{ChainStep, StepChain, StepFn};
pub use manager::factory::ActionManagerFactory;
pub use manager::failure::Failure;
pub use manager::{ActionManager, ManagerError};
pub use pool::config::ThrottledPoolConfig;
pub use pool::stats::PoolSnapshot;
pub use pool::{PoolError, PoolStatus, ThrottledWorkPool};
pub use sysmon::SystemMonitor;
