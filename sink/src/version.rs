//! Full-table snapshot activation.
//!
//! A tap re-extracting a whole table tags every record with a version and, once the snapshot
//! is complete, activates that version. Rows of older versions are then removed or marked as
//! deleted.

use chrono::Utc;
use config::shared::RetryConfig;
use tracing::info;

use crate::destination::{DeleteMode, Destination};
use crate::error::SinkResult;
use crate::types::DestinationTable;
use crate::writer::with_retry;

/// Version tag stamped on rows when no version is known at all.
pub const DEFAULT_TABLE_VERSION: i64 = 0;

/// Phase of the snapshot lifecycle of a table.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VersionPhase {
    Idle,
    /// Records of this version are being received.
    Collecting(i64),
    /// This version was activated and no newer version has been seen since.
    Reconciled(i64),
}

/// Version bookkeeping of one table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VersionState {
    phase: VersionPhase,
    /// Last committed version, once read from the destination.
    committed: Option<i64>,
}

impl VersionState {
    pub fn new() -> Self {
        Self {
            phase: VersionPhase::Idle,
            committed: None,
        }
    }

    pub fn phase(&self) -> VersionPhase {
        self.phase
    }

    pub fn committed(&self) -> Option<i64> {
        self.committed
    }

    /// Notes the version a record was tagged with.
    pub fn observe(&mut self, version: i64) {
        match self.phase {
            VersionPhase::Collecting(current) if current >= version => {}
            VersionPhase::Reconciled(current) if current == version => {}
            _ => self.phase = VersionPhase::Collecting(version),
        }
    }

    /// Version stamped on a row: the record's own tag, else the collecting version, else the
    /// last committed one, else [`DEFAULT_TABLE_VERSION`].
    pub fn stamp(&self, record_version: Option<i64>) -> i64 {
        if let Some(version) = record_version {
            return version;
        }

        match self.phase {
            VersionPhase::Collecting(version) => version,
            _ => self.committed.unwrap_or(DEFAULT_TABLE_VERSION),
        }
    }

    /// Records the outcome of an activation.
    pub fn reconciled(&mut self, version: i64, committed: Option<i64>) {
        self.phase = VersionPhase::Reconciled(version);
        self.committed = committed.max(Some(version));
    }

    /// Caches the committed version read from the destination.
    pub fn set_committed(&mut self, committed: Option<i64>) {
        self.committed = committed;
    }

    /// Returns to idle once the table is flushed after an activation.
    pub fn settle(&mut self) {
        if let VersionPhase::Reconciled(_) = self.phase {
            self.phase = VersionPhase::Idle;
        }
    }
}

impl Default for VersionState {
    fn default() -> Self {
        Self::new()
    }
}

/// What an activation did.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ActivationOutcome {
    /// No version was committed before. Nothing was cleaned up.
    Initialized { version: i64 },
    /// The version was already committed, or superseded. Nothing changed.
    Replayed { version: i64, committed: i64 },
    /// Rows of older versions were cleaned up.
    Reconciled {
        version: i64,
        previous: i64,
        cleaned: u64,
    },
}

/// Applies version activations to destination tables.
#[derive(Debug, Clone)]
pub struct VersionReconciler<D> {
    destination: D,
    delete_mode: DeleteMode,
    retry: RetryConfig,
}

impl<D> VersionReconciler<D>
where
    D: Destination,
{
    pub fn new(destination: D, delete_mode: DeleteMode, retry: RetryConfig) -> Self {
        Self {
            destination,
            delete_mode,
            retry,
        }
    }

    /// Activates `version` for `table`.
    ///
    /// Every pending row of the table must be committed before calling this, since rows still
    /// buffered would escape the cleanup.
    pub async fn activate(
        &self,
        stream: &str,
        table: &DestinationTable,
        state: &mut VersionState,
        version: i64,
    ) -> SinkResult<ActivationOutcome> {
        let (committed, _) = with_retry(&self.retry, stream, "read table version", |_| {
            self.destination.committed_version(&table.name)
        })
        .await?;

        let outcome = match committed {
            Some(committed) if version <= committed => {
                info!(stream, table = %table.name, version, committed, "activation already applied, skipping");

                state.reconciled(version, Some(committed));
                return Ok(ActivationOutcome::Replayed { version, committed });
            }
            Some(previous) => {
                let deleted_at = Utc::now();
                let (cleaned, _) = with_retry(&self.retry, stream, "activate version", |_| {
                    self.destination
                        .commit_version(table, version, Some(self.delete_mode), deleted_at)
                })
                .await?;

                ActivationOutcome::Reconciled {
                    version,
                    previous,
                    cleaned,
                }
            }
            None => {
                with_retry(&self.retry, stream, "activate version", |_| {
                    self.destination
                        .commit_version(table, version, None, Utc::now())
                })
                .await?;

                ActivationOutcome::Initialized { version }
            }
        };

        info!(stream, table = %table.name, ?outcome, delete_mode = ?self.delete_mode, "activated table version");

        state.reconciled(version, committed);

        Ok(outcome)
    }
}
