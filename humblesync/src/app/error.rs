//! Run-fatal errors.
//!
//! Per-item trouble (one download's retries exhausted, one hash mismatch)
//! is reported in the run summary, not here. `SyncError` covers only what
//! makes the whole run pointless: bad configuration, an unreachable or
//! unauthenticated API, or failure to persist state at the end.

use thiserror::Error;

use crate::api::ApiError;
use crate::app::options::OptionsError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The run was interrupted before the command finished.
    #[error("interrupted")]
    Interrupted,

    #[error("failed to persist state: {0}")]
    Persist(#[from] std::io::Error),
}
