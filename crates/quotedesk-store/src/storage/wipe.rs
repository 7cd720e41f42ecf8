//! Verified destructive wipe of store-owned files.
//!
//! Deleting a file that still has an open handle can silently do nothing on
//! some platforms, so each artifact goes through an explicit state machine:
//!
//! ```text
//! Requested -> HandleInvalidated -> DeleteAttempted -> Verified
//!                     ^                   |
//!                     |                   v
//!                     +------------ RetryScheduled      (attempts left)
//!                                         |
//!                                         v
//!                                      Failed           (bound reached)
//! ```
//!
//! [`transition`] is pure; [`Wiper`] performs the side effects and reports.
//! A failed wipe is reported in the [`WipeReport`], never raised.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::WipeSection;
use crate::storage::document::DocumentStore;

/// Wipe progress for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeState {
    Requested,
    HandleInvalidated { attempt: u32 },
    DeleteAttempted { attempt: u32 },
    RetryScheduled { attempt: u32 },
    Verified { attempts: u32 },
    Failed { attempts: u32 },
}

impl WipeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WipeState::Verified { .. } | WipeState::Failed { .. })
    }
}

/// Observation fed into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeEvent {
    /// Cached handle dropped and settle delay elapsed.
    HandleReset,
    /// Delete call returned (successfully or not).
    DeleteReturned,
    /// Existence re-checked after the delete.
    Checked { file_gone: bool },
}

/// Next state, or `None` if `event` is not valid in `state`.
///
/// `max_retries` counts attempts after the first, so an artifact gets at most
/// `max_retries + 1` delete attempts.
pub fn transition(state: WipeState, event: WipeEvent, max_retries: u32) -> Option<WipeState> {
    use WipeEvent::*;
    use WipeState::*;

    match (state, event) {
        (Requested, HandleReset) => Some(HandleInvalidated { attempt: 1 }),
        (RetryScheduled { attempt }, HandleReset) => Some(HandleInvalidated {
            attempt: attempt + 1,
        }),
        (HandleInvalidated { attempt }, DeleteReturned) => Some(DeleteAttempted { attempt }),
        (DeleteAttempted { attempt }, Checked { file_gone: true }) => {
            Some(Verified { attempts: attempt })
        }
        (DeleteAttempted { attempt }, Checked { file_gone: false }) => {
            if attempt <= max_retries {
                Some(RetryScheduled { attempt })
            } else {
                Some(Failed { attempts: attempt })
            }
        }
        _ => None,
    }
}

/// Delay schedule for the wipe loop.
pub trait BackoffPolicy: Send + Sync {
    /// Pause after invalidating a handle, before deleting.
    fn settle(&self) -> Duration;

    /// Pause before retry number `attempt` (the attempt that just failed).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Constant delays.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff {
    pub settle: Duration,
    pub retry: Duration,
}

impl From<&WipeSection> for FixedBackoff {
    fn from(section: &WipeSection) -> Self {
        Self {
            settle: section.settle_delay(),
            retry: section.retry_delay(),
        }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn settle(&self) -> Duration {
        self.settle
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.retry
    }
}

/// No waiting at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn settle(&self) -> Duration {
        Duration::ZERO
    }

    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Filesystem operations the wipe needs.
pub trait FileOps: Send + Sync {
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;

    /// Must report `true` when existence cannot be determined.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;
}

/// Real filesystem through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileOps;

impl FileOps for TokioFileOps {
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::remove_file(&path).await }
    }

    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send {
        let path = path.to_path_buf();
        async move { crate::fs::exists_conservative(&path).await }
    }
}

/// Final result for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeOutcome {
    Verified,
    /// The file was still present after every attempt.
    Incomplete,
}

#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub name: String,
    pub path: PathBuf,
    pub outcome: WipeOutcome,
    pub attempts: u32,
    pub history: Vec<WipeState>,
}

#[derive(Debug, Clone, Default)]
pub struct WipeReport {
    pub artifacts: Vec<ArtifactReport>,
}

impl WipeReport {
    pub fn is_complete(&self) -> bool {
        self.artifacts
            .iter()
            .all(|artifact| artifact.outcome == WipeOutcome::Verified)
    }

    /// Artifacts that are still on disk.
    pub fn incomplete(&self) -> impl Iterator<Item = &ArtifactReport> {
        self.artifacts
            .iter()
            .filter(|artifact| artifact.outcome == WipeOutcome::Incomplete)
    }
}

/// Drives the wipe state machine for a set of documents.
pub struct Wiper<F = TokioFileOps, B = FixedBackoff> {
    docs: Arc<DocumentStore>,
    ops: F,
    backoff: B,
    max_retries: u32,
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

impl<F: FileOps, B: BackoffPolicy> Wiper<F, B> {
    pub fn new(docs: Arc<DocumentStore>, ops: F, backoff: B, max_retries: u32) -> Self {
        Self {
            docs,
            ops,
            backoff,
            max_retries,
        }
    }

    /// Wipe every named document, each tracked and verified separately.
    pub async fn wipe(&self, names: &[&str]) -> WipeReport {
        let mut report = WipeReport::default();
        for name in names {
            report.artifacts.push(self.wipe_artifact(name).await);
        }

        if report.is_complete() {
            info!(artifacts = report.artifacts.len(), "wipe verified");
        } else {
            let residual: Vec<&str> = report.incomplete().map(|a| a.name.as_str()).collect();
            error!(?residual, "wipe incomplete, residual files remain");
        }
        report
    }

    async fn invalidate(&self, name: &str) {
        if let Err(err) = self.docs.invalidate(name).await {
            warn!(document = name, error = %err, "handle invalidation failed");
        }
        pause(self.backoff.settle()).await;
    }

    async fn wipe_artifact(&self, name: &str) -> ArtifactReport {
        let path = self.docs.path(name);
        let mut state = WipeState::Requested;
        let mut history = vec![state];

        loop {
            let event = match state {
                WipeState::Requested => {
                    self.invalidate(name).await;
                    WipeEvent::HandleReset
                }
                WipeState::HandleInvalidated { attempt } => {
                    match self.ops.remove(&path).await {
                        Ok(()) => debug!(document = name, attempt, "delete returned"),
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {
                            debug!(document = name, attempt, "nothing to delete")
                        }
                        Err(err) => {
                            warn!(document = name, attempt, error = %err, "delete failed")
                        }
                    }
                    WipeEvent::DeleteReturned
                }
                WipeState::DeleteAttempted { .. } => WipeEvent::Checked {
                    file_gone: !self.ops.exists(&path).await,
                },
                WipeState::RetryScheduled { attempt } => {
                    warn!(document = name, attempt, "file still present after delete, retrying");
                    pause(self.backoff.delay(attempt)).await;
                    self.invalidate(name).await;
                    WipeEvent::HandleReset
                }
                WipeState::Verified { attempts } => {
                    return ArtifactReport {
                        name: name.to_string(),
                        path,
                        outcome: WipeOutcome::Verified,
                        attempts,
                        history,
                    };
                }
                WipeState::Failed { attempts } => {
                    error!(document = name, attempts, "file survived every delete attempt");
                    return ArtifactReport {
                        name: name.to_string(),
                        path,
                        outcome: WipeOutcome::Incomplete,
                        attempts,
                        history,
                    };
                }
            };

            state = match transition(state, event, self.max_retries) {
                Some(next) => next,
                None => {
                    error!(document = name, ?state, ?event, "invalid wipe transition");
                    WipeState::Failed {
                        attempts: history.len() as u32,
                    }
                }
            };
            history.push(state);
        }
    }
}
