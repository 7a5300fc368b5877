//! Tab-refresh orchestration engine.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`RefreshController`] | Owns the operation; start, cancel, status, finish |
//! | [`BatchScheduler`] | Splits the snapshot into batches and paces them |
//! | [`TabRefresher`] | Per-tab state machine with retry and backoff |
//! | [`ProgressEmitter`] | Progress, outcomes, completion and history |
//!
//! # Example
//!
//! ```ignore
//! let controller = RefreshController::builder()
//!     .browser(browser)
//!     .sink(sink)
//!     .build()?;
//!
//! let report = controller.start().await?.wait().await?;
//! println!("{}", report.details());
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Per-tab state machine.
pub mod attempt;

/// Controller builder.
pub mod builder;

/// Operation controller.
pub mod controller;

/// Operation state.
pub mod operation;

/// Progress emission.
pub mod progress;

/// Batch scheduling.
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use attempt::{SkipReason, TabOutcome, TabRefresher};
pub use builder::ControllerBuilder;
pub use controller::{OperationHandle, RefreshController};
pub use operation::{
    FailedTab, Operation, OperationCell, OperationReport, OperationSnapshot, Progress, Summary,
    percent,
};
pub use progress::ProgressEmitter;
pub use scheduler::{BatchScheduler, RunOutcome};
