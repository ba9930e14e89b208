use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinSet};
use tracing::{debug, error};

use crate::error::{ErrorKind, SinkResult};
use crate::sink_error;
use crate::writer::CommitResult;

/// Result of one finished flush task.
#[derive(Debug)]
pub struct FlushCompletion {
    /// Task id returned by [`FlushPool::spawn`].
    pub id: Id,
    pub stream: String,
    pub result: SinkResult<CommitResult>,
}

/// Bounded pool running flushes in the background.
///
/// A permit must be acquired before spawning, which caps the number of tables flushing at
/// the same time. Callers hold the table lock while waiting for a permit so that flushes of
/// one table are spawned in order.
#[derive(Debug)]
pub struct FlushPool {
    semaphore: Arc<Semaphore>,
    join_set: JoinSet<(String, SinkResult<CommitResult>)>,
    /// Stream of every running task, to attribute panics.
    streams: HashMap<Id, String>,
}

impl FlushPool {
    pub fn new(max_concurrent_flushes: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_flushes.max(1))),
            join_set: JoinSet::new(),
            streams: HashMap::new(),
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> SinkResult<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.map_err(|err| {
            sink_error!(
                ErrorKind::InvalidState,
                "Flush pool is closed",
                err.to_string(),
                source: err
            )
        })
    }

    /// Runs `future` in the background, releasing `permit` once it completes.
    pub fn spawn<F>(&mut self, stream: String, permit: OwnedSemaphorePermit, future: F) -> Id
    where
        F: Future<Output = SinkResult<CommitResult>> + Send + 'static,
    {
        let task_stream = stream.clone();
        let handle = self.join_set.spawn(async move {
            let result = future.await;
            drop(permit);

            (task_stream, result)
        });

        let id = handle.id();
        debug!(%stream, task_id = %id, "spawned flush");
        self.streams.insert(id, stream);

        id
    }

    /// Number of flushes spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.join_set.len()
    }

    /// Collects the flushes that already finished without waiting.
    pub fn reap(&mut self) -> Vec<FlushCompletion> {
        let mut completions = Vec::new();

        while let Some(joined) = self.join_set.try_join_next_with_id() {
            completions.push(self.complete(joined));
        }

        completions
    }

    /// Waits for every running flush.
    pub async fn wait_all(&mut self) -> Vec<FlushCompletion> {
        let mut completions = Vec::new();

        while let Some(joined) = self.join_set.join_next_with_id().await {
            completions.push(self.complete(joined));
        }

        completions
    }

    fn complete(
        &mut self,
        joined: Result<(Id, (String, SinkResult<CommitResult>)), tokio::task::JoinError>,
    ) -> FlushCompletion {
        match joined {
            Ok((id, (stream, result))) => {
                self.streams.remove(&id);
                FlushCompletion { id, stream, result }
            }
            Err(join_err) => {
                let id = join_err.id();
                let stream = self.streams.remove(&id).unwrap_or_default();
                error!(%stream, error = %join_err, "flush task panicked");

                FlushCompletion {
                    id,
                    stream,
                    result: Err(sink_error!(
                        ErrorKind::FlushWorkerPanic,
                        "Flush task panicked",
                        join_err.to_string(),
                        source: join_err
                    )),
                }
            }
        }
    }
}
