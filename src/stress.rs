//! Repeated refresh runs for soak testing.
//!
//! Starts one operation after another with a pause in between, stopping at
//! the first operation that fails to start or ends with failed tabs.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{info, warn};

use crate::refresh::{OperationReport, RefreshController};

// ============================================================================
// Constants
// ============================================================================

/// Default number of runs.
pub const DEFAULT_ITERATIONS: u32 = 50;

/// Default pause between runs.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(2);

// ============================================================================
// StressReport
// ============================================================================

/// Result of [`run_stress`].
#[derive(Debug, Clone, PartialEq)]
pub struct StressReport {
    /// Runs that finished with every tab succeeded.
    pub completed: u32,
    /// A run failed before all iterations completed.
    pub stopped_early: bool,
    /// Report of the last run, if any started.
    pub last: Option<OperationReport>,
}

// ============================================================================
// run_stress
// ============================================================================

/// Runs up to `iterations` operations back to back, pausing `pause` between
/// them.
pub async fn run_stress(controller: &RefreshController, iterations: u32, pause: Duration) -> StressReport {
    let mut report = StressReport {
        completed: 0,
        stopped_early: false,
        last: None,
    };

    for iteration in 1..=iterations {
        if iteration > 1 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let outcome = match controller.start().await {
            Ok(handle) => handle.wait().await,
            Err(e) => Err(e),
        };

        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                warn!(iteration, error = %e, "Stress run could not start");
                report.stopped_early = true;
                break;
            }
        };

        let success = run.success();
        info!(iteration, of = iterations, details = %run.details(), "Stress run finished");
        report.last = Some(run);

        if !success {
            report.stopped_early = true;
            break;
        }
        report.completed += 1;
    }

    report
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::config::RefreshConfig;
    use crate::refresh::testing::{FakeBrowser, Fault};

    fn controller(browser: &Arc<FakeBrowser>) -> RefreshController {
        RefreshController::builder()
            .config(RefreshConfig::without_delays())
            .browser(browser.clone())
            .build()
            .expect("valid controller")
    }

    #[tokio::test]
    async fn test_runs_every_iteration() {
        let browser = Arc::new(FakeBrowser::new());
        browser.add_tabs(2);

        let report = run_stress(&controller(&browser), 4, Duration::ZERO).await;

        assert_eq!(report.completed, 4);
        assert!(!report.stopped_early);
        assert_eq!(browser.total_reloads(), 8);
        assert!(report.last.is_some_and(|r| r.success()));
    }

    #[tokio::test]
    async fn test_stops_on_failed_tab() {
        let browser = Arc::new(FakeBrowser::new());
        browser.add_tabs(2);
        browser.fail_reload(2, Fault::Times(3));

        let report = run_stress(&controller(&browser), 5, Duration::ZERO).await;

        assert_eq!(report.completed, 0);
        assert!(report.stopped_early);
        assert_eq!(report.last.map(|r| r.failed_tabs.len()), Some(1));
    }

    #[tokio::test]
    async fn test_stops_when_listing_fails() {
        let browser = Arc::new(FakeBrowser::new());
        browser.fail_listing("no tabs permission");

        let report = run_stress(&controller(&browser), 3, Duration::ZERO).await;

        assert!(report.stopped_early);
        assert_eq!(report.completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_runs() {
        let browser = Arc::new(FakeBrowser::new());
        browser.add_tabs(1);

        let started = tokio::time::Instant::now();
        let report = run_stress(&controller(&browser), 3, DEFAULT_PAUSE).await;

        assert_eq!(report.completed, 3);
        assert!(started.elapsed() >= DEFAULT_PAUSE * 2);
    }
}
