use chrono::{DateTime, Utc};
use drover_api::work::WorkError;
use serde::Serialize;

/// Immutable record of a single unit-of-work failure.
///
/// Entries are append-only; reporting and monitoring surfaces read them
/// through [`super::ActionManager::failure_list`].
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    /// Target identifier (store path or key) the unit was processing.
    pub item: String,

    /// Captured error message.
    pub error: String,

    /// Captured error detail, including the source chain.
    pub detail: String,

    /// When the failure was recorded.
    pub time: DateTime<Utc>,
}

impl Failure {
    pub fn new(item: impl Into<String>, error: &WorkError) -> Self {
        Self {
            item: item.into(),
            error: error.to_string(),
            detail: format!("{error:?}"),
            time: Utc::now(),
        }
    }
}
