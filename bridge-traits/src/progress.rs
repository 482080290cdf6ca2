//! Progress Reporting and Cooperative Cancellation
//!
//! Long-running operations (change listings over large subtrees) report
//! progress through a listener the caller provides. Cancellation is
//! cooperative: the core polls `is_cancelled` at fixed points and stops at
//! the next poll, letting any in-flight network call complete first.

/// Progress/cancellation callback for long-running storage operations.
///
/// `pause_if_needed` may block the calling task to implement a user-initiated
/// pause; implementations that do not support pausing leave the default
/// no-op.
pub trait ProgressListener: Send + Sync {
    /// Report the total number of items for progress channel `index`.
    fn on_set_max(&self, index: usize, max: usize);

    /// Report cumulative progress on channel `index`.
    fn on_progress(&self, index: usize, current: usize);

    /// Block until the user resumes, if a pause was requested.
    fn pause_if_needed(&self) {}

    /// Whether the user requested cancellation.
    fn is_cancelled(&self) -> bool;
}
