use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use config::shared::{RetryConfig, TargetConfig};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::Id;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, RecordBatcher};
use crate::bail;
use crate::checkpoint::{CheckpointStore, CheckpointTracker};
use crate::conversions::coerce::coerce_value;
use crate::conversions::infer::infer_field;
use crate::conversions::temporal::parse_timestamp;
use crate::destination::{DeleteMode, Destination};
use crate::engine::context::{StreamContext, StreamStats, TableFailure, TableState};
use crate::engine::summary::{RunSummary, StreamFailure, StreamReport, stream_error};
use crate::error::{ErrorKind, SinkError, SinkResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{FLUSH_BEFORE_CHECKPOINT, sink_fail_point};
use crate::protocol::{
    ActivateVersionMessage, Message, RecordMessage, SchemaMessage, parse_stream_schema,
};
use crate::schema::flatten::flatten_record;
use crate::schema::metadata::{
    DELETED_AT, EXTRACTED_AT, RECEIVED_AT, SEQUENCE, TABLE_VERSION, is_metadata_column,
};
use crate::schema::naming::table_name_for_stream;
use crate::schema::SchemaReconciler;
use crate::types::{Cell, DestinationTable, FieldSchema, Record, TableName, TableRow};
use crate::version::VersionReconciler;
use crate::workers::pool::{FlushCompletion, FlushPool};
use crate::writer::{CommitResult, Writer, with_retry};

/// A STATE token waiting for every record before it to be committed.
#[derive(Debug)]
struct PendingState {
    position: u64,
    value: Value,
}

/// Materializes a stream of Singer messages into destination tables.
///
/// Messages are accepted one at a time. Records are buffered per stream and flushed in the
/// background, at most one flush per table at a time. STATE tokens are handed back only once
/// every record received before them is committed and checkpointed.
///
/// A failing stream stops receiving rows while every other stream keeps loading, unless
/// `fail_fast` is set.
#[derive(Debug)]
pub struct Engine<D, S> {
    config: Arc<TargetConfig>,
    destination: D,
    writer: Writer<D>,
    versions: VersionReconciler<D>,
    reconciler: SchemaReconciler,
    checkpoints: CheckpointTracker<S>,
    /// Positions committed by a previous run, when resuming.
    resume_positions: HashMap<String, u64>,
    streams: BTreeMap<String, StreamContext>,
    failures: BTreeMap<String, StreamFailure>,
    tables: HashMap<TableName, Arc<Mutex<TableState>>>,
    pool: FlushPool,
    /// First position of the batch of every running flush.
    in_flight: HashMap<Id, u64>,
    pending_states: VecDeque<PendingState>,
    position: u64,
}

impl<D, S> Engine<D, S>
where
    D: Destination + Clone + Send + Sync + 'static,
    S: CheckpointStore + Clone + Send + Sync + 'static,
{
    /// Creates an engine loading into `destination`.
    ///
    /// With `resume_from_checkpoint`, the committed positions of the previous run are read
    /// from `store` and records at or below them are skipped.
    pub async fn new(config: TargetConfig, destination: D, store: S) -> SinkResult<Self> {
        let config = Arc::new(config);
        let checkpoints = CheckpointTracker::new(store);

        let resume_positions = if config.resume_from_checkpoint {
            let streams = checkpoints.load().await?;
            info!(streams, "resuming from persisted checkpoints");

            checkpoints.positions().await
        } else {
            HashMap::new()
        };

        let delete_mode = DeleteMode::from_hard_delete(config.hard_delete);

        info!(
            destination = D::name(),
            ?delete_mode,
            max_concurrent_flushes = config.max_concurrent_flushes,
            fail_fast = config.fail_fast,
            "starting engine"
        );

        Ok(Self {
            writer: Writer::new(destination.clone(), config.retry.clone()),
            versions: VersionReconciler::new(
                destination.clone(),
                delete_mode,
                config.retry.clone(),
            ),
            reconciler: SchemaReconciler::from_config(&config),
            pool: FlushPool::new(config.max_concurrent_flushes),
            destination,
            checkpoints,
            resume_positions,
            streams: BTreeMap::new(),
            failures: BTreeMap::new(),
            tables: HashMap::new(),
            in_flight: HashMap::new(),
            pending_states: VecDeque::new(),
            position: 0,
            config,
        })
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn checkpoints(&self) -> &CheckpointTracker<S> {
        &self.checkpoints
    }

    /// Position of the last accepted message.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn stream_stats(&self, stream: &str) -> Option<StreamStats> {
        self.streams.get(stream).map(|ctx| ctx.stats)
    }

    pub fn is_failed(&self, stream: &str) -> bool {
        self.failures.contains_key(stream)
    }

    /// Accepts the next message.
    ///
    /// Returns the newest STATE value that became safe to emit, if any. Stream failures are
    /// recorded and only returned as errors when `fail_fast` is set.
    pub async fn accept(&mut self, message: Message) -> SinkResult<Option<Value>> {
        self.position += 1;
        let position = self.position;

        self.reap_flushes()?;

        match message {
            Message::Schema(message) => {
                let stream = message.stream.clone();
                if !self.failures.contains_key(&stream) {
                    let result = self.on_schema(message).await;
                    self.handle(&stream, "apply schema", position, result)?;
                }
            }
            Message::Record(message) => {
                let stream = message.stream.clone();
                if self.failures.contains_key(&stream) {
                    if let Some(ctx) = self.streams.get_mut(&stream) {
                        ctx.stats.dropped += 1;
                    }
                } else {
                    let result = self.on_record(message, position).await;
                    self.handle(&stream, "accept record", position, result)?;
                }
            }
            Message::ActivateVersion(message) => {
                let stream = message.stream.clone();
                if !self.failures.contains_key(&stream) {
                    let result = self.on_activate(message).await;
                    self.handle(&stream, "activate version", position, result)?;
                }
            }
            Message::State(message) => {
                debug!(position, "buffering state");
                self.pending_states.push_back(PendingState {
                    position,
                    value: message.value,
                });
            }
        }

        self.reap_flushes()?;

        Ok(self.try_ack())
    }

    /// Flushes every buffer, waits for all writes and returns the run summary.
    ///
    /// The summary carries the last STATE value that became safe to emit.
    pub async fn finish(mut self) -> SinkResult<RunSummary> {
        let streams: Vec<String> = self.streams.keys().cloned().collect();
        for stream in streams {
            if self.failures.contains_key(&stream) {
                continue;
            }

            let result = self.dispatch_flush(&stream).await;
            let position = self.position;
            self.handle(&stream, "flush", position, result)?;
        }

        let completions = self.pool.wait_all().await;
        self.process_completions(completions)?;

        let final_state = self.try_ack();
        self.destination.shutdown().await?;

        let summary = self.summary(final_state, false);
        info!(
            streams = summary.streams.len(),
            failed = summary.failed_streams().count(),
            "run finished"
        );

        Ok(summary)
    }

    /// Stops the run without flushing buffered records.
    ///
    /// Flushes already running are awaited. Buffered rows are discarded, so STATE is only
    /// acknowledged up to the first of them.
    pub async fn shutdown(mut self) -> SinkResult<RunSummary> {
        info!(in_flight = self.pool.in_flight(), "shutting down engine");

        let completions = self.pool.wait_all().await;
        if let Err(err) = self.process_completions(completions) {
            warn!(error = %err, "stream failed while shutting down");
        }

        let final_state = self.try_ack();

        for ctx in self.streams.values_mut() {
            let discarded = ctx.batcher.discard();
            if discarded > 0 {
                warn!(stream = %ctx.stream, rows = discarded, "discarded buffered rows");
            }
        }

        self.destination.shutdown().await?;

        Ok(self.summary(final_state, true))
    }

    async fn on_schema(&mut self, message: SchemaMessage) -> SinkResult<()> {
        let stream = message.stream.clone();
        let revision = self
            .streams
            .get(&stream)
            .map_or(1, |ctx| ctx.schema.revision + 1);

        let schema = parse_stream_schema(&message, revision)?;
        let shape = self.reconciler.shape(&schema)?;

        let existing = self.streams.get(&stream).map(|ctx| {
            (
                ctx.table_name.clone(),
                ctx.shape.key_columns != shape.key_columns,
            )
        });

        let table_name = match existing {
            Some((table_name, keys_changed)) => {
                // Buffered rows were built for the previous keys.
                if keys_changed {
                    self.dispatch_flush(&stream).await?;
                }
                table_name
            }
            None => table_name_for_stream(
                &stream,
                self.config.default_target_schema.as_deref(),
                &self.config.connection.database,
            ),
        };

        let table = self.table(&table_name);
        let mut state = table.lock().await;
        if let Some(failure) = &state.failure {
            return Err(failure.error.clone());
        }

        if !state.loaded {
            let (definition, _) = with_retry(&self.config.retry, &stream, "load table", |_| {
                self.destination.load_table(&table_name)
            })
            .await?;
            state.definition = definition;
            state.loaded = true;
        }

        let plan = self
            .reconciler
            .reconcile(&table_name, state.definition.as_ref(), &shape)?;
        let ddl_operations = plan.len() as u64;

        if !plan.is_empty() {
            with_retry(&self.config.retry, &stream, "apply schema", |_| {
                self.destination.apply_ddl(&plan)
            })
            .await?;
            plan.apply_to(&mut state.definition);
        }

        let definition = state.definition.clone();
        drop(state);

        info!(
            %stream,
            table = %table_name,
            revision,
            columns = shape.columns.len(),
            keys = ?shape.key_columns,
            ddl_operations,
            "applied stream schema"
        );

        match self.streams.get_mut(&stream) {
            Some(ctx) => {
                ctx.schema = schema;
                ctx.shape = shape;
                ctx.refresh_columns(definition.as_ref());
                ctx.stats.ddl_operations += ddl_operations;
            }
            None => {
                let (committed, _) =
                    with_retry(&self.config.retry, &stream, "read table version", |_| {
                        self.destination.committed_version(&table_name)
                    })
                    .await?;

                let mut ctx = StreamContext {
                    stream: stream.clone(),
                    table_name,
                    schema,
                    shape,
                    column_types: HashMap::new(),
                    batcher: RecordBatcher::new(stream.clone(), &self.config.batch),
                    version: Default::default(),
                    stats: StreamStats {
                        ddl_operations,
                        ..StreamStats::default()
                    },
                };
                ctx.version.set_committed(committed);
                ctx.refresh_columns(definition.as_ref());

                self.streams.insert(stream, ctx);
            }
        }

        Ok(())
    }

    async fn on_record(&mut self, message: RecordMessage, position: u64) -> SinkResult<()> {
        let stream = message.stream.clone();

        let Some(ctx) = self.streams.get_mut(&stream) else {
            bail!(
                ErrorKind::MissingSchema,
                "Record received before the schema of its stream",
                format!("stream `{stream}` at position {position}")
            );
        };

        if let Some(resumed) = self.resume_positions.get(&stream)
            && position <= *resumed
        {
            ctx.stats.resumed += 1;
            return Ok(());
        }

        let record = Record {
            time_extracted: message.time_extracted.as_deref().and_then(|value| {
                parse_timestamp(value)
                    .inspect_err(|err| debug!(%stream, error = %err, "ignoring time_extracted"))
                    .ok()
            }),
            data: flatten_record(
                &message.record,
                &ctx.schema.fields,
                self.reconciler.flattening_depth(),
            ),
            stream: message.stream,
            position,
            version: message.version,
            received_at: Utc::now(),
        };

        ctx.version.settle();
        if let Some(version) = record.version {
            ctx.version.observe(version);
        }

        let reconciler = &self.reconciler;
        let undeclared: Vec<FieldSchema> = record
            .data
            .iter()
            .filter_map(|(column, value)| {
                let field = infer_field(column, value)?;
                let Some(existing) = ctx.column_types.get(column) else {
                    return Some(field);
                };

                let declared = is_metadata_column(column) || ctx.shape.column(column).is_some();
                if declared || reconciler.holds_inferred(existing, &field) {
                    None
                } else {
                    Some(field)
                }
            })
            .collect();

        if !undeclared.is_empty() {
            let table = self
                .tables
                .entry(ctx.table_name.clone())
                .or_default()
                .clone();
            let (definition, ddl_operations) = add_inferred_columns(
                &self.destination,
                &self.reconciler,
                &self.config.retry,
                table,
                &stream,
                &undeclared,
            )
            .await?;

            ctx.refresh_columns(definition.as_ref());
            ctx.stats.ddl_operations += ddl_operations;
        }

        let row = match build_row(ctx, &record, self.config.add_record_metadata) {
            Ok(row) => row,
            Err(err) if err.kind() == ErrorKind::MalformedRecord => {
                warn!(%stream, position, error = %err, "skipping malformed record");
                ctx.stats.malformed += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        ctx.batcher.accept(row);
        ctx.stats.received += 1;

        if ctx.batcher.should_flush() {
            self.dispatch_flush(&stream).await?;
        }

        Ok(())
    }

    async fn on_activate(&mut self, message: ActivateVersionMessage) -> SinkResult<()> {
        let stream = message.stream;

        if !self.streams.contains_key(&stream) {
            bail!(
                ErrorKind::MissingSchema,
                "Version activated before the schema of its stream",
                format!("stream `{stream}` activated version {}", message.version)
            );
        }

        self.dispatch_flush(&stream).await?;

        let Some(ctx) = self.streams.get_mut(&stream) else {
            return Ok(());
        };

        // Waits for the flush above and any earlier one of the table.
        let table = self
            .tables
            .entry(ctx.table_name.clone())
            .or_default()
            .clone();
        let state = table.lock().await;
        if let Some(failure) = &state.failure {
            return Err(failure.error.clone());
        }

        let Some(definition) = state.definition.as_ref() else {
            bail!(
                ErrorKind::InvalidState,
                "Table of the stream does not exist",
                format!("stream `{stream}`, table {}", ctx.table_name)
            );
        };

        self.versions
            .activate(&stream, definition, &mut ctx.version, message.version)
            .await?;
        ctx.stats.activations += 1;

        Ok(())
    }

    /// Hands the buffered rows of `stream` to the flush pool.
    async fn dispatch_flush(&mut self, stream: &str) -> SinkResult<()> {
        let Some(ctx) = self.streams.get_mut(stream) else {
            return Ok(());
        };
        if ctx.batcher.is_empty() {
            return Ok(());
        }

        let batch = ctx.batcher.drain();
        let Some(first_position) = batch.first_position() else {
            return Ok(());
        };
        let keys = ctx.shape.key_columns.clone();
        let table = self
            .tables
            .entry(ctx.table_name.clone())
            .or_default()
            .clone();

        // Taking the table lock before the permit keeps flushes of a table in order.
        let state = table.lock_owned().await;
        let permit = self.pool.acquire().await?;

        let rows = batch.len();
        let id = self.pool.spawn(
            stream.to_string(),
            permit,
            flush_batch(
                self.writer.clone(),
                self.checkpoints.clone(),
                state,
                batch,
                keys,
            ),
        );
        self.in_flight.insert(id, first_position);

        debug!(stream, rows, first_position, "dispatched flush");

        Ok(())
    }

    fn reap_flushes(&mut self) -> SinkResult<()> {
        let completions = self.pool.reap();
        self.process_completions(completions)
    }

    fn process_completions(&mut self, completions: Vec<FlushCompletion>) -> SinkResult<()> {
        let mut fatal = None;

        for completion in completions {
            let first_position = self
                .in_flight
                .remove(&completion.id)
                .unwrap_or(self.position);

            match completion.result {
                Ok(result) => {
                    if let Some(ctx) = self.streams.get_mut(&completion.stream) {
                        ctx.stats.written += result.rows;
                        ctx.stats.flushes += 1;
                    }
                }
                Err(err) => {
                    self.fail_stream(&completion.stream, "flush", err, first_position);

                    if self.config.fail_fast
                        && fatal.is_none()
                        && let Some(failure) = self.failures.get(&completion.stream)
                    {
                        fatal = Some(stream_error(&completion.stream, failure));
                    }
                }
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handle(
        &mut self,
        stream: &str,
        operation: &'static str,
        position: u64,
        result: SinkResult<()>,
    ) -> SinkResult<()> {
        let Err(err) = result else {
            return Ok(());
        };

        self.fail_stream(stream, operation, err, position);

        if self.config.fail_fast
            && let Some(failure) = self.failures.get(stream)
        {
            return Err(stream_error(stream, failure));
        }

        Ok(())
    }

    /// Stops `stream`, discarding its buffer.
    ///
    /// `lost_from` is lowered to the first position that will never be committed, which
    /// bounds STATE acknowledgement from then on.
    fn fail_stream(
        &mut self,
        stream: &str,
        operation: &'static str,
        error: SinkError,
        lost_from: u64,
    ) {
        let mut lost_from = lost_from;

        if let Some(ctx) = self.streams.get_mut(stream) {
            if let Some(oldest) = ctx.batcher.oldest_position() {
                lost_from = lost_from.min(oldest);
            }

            let discarded = ctx.batcher.discard();
            if discarded > 0 {
                debug!(stream, rows = discarded, "discarded buffer of failed stream");
            }

            if let Some(table) = self.tables.get(&ctx.table_name)
                && let Ok(state) = table.try_lock()
                && let Some(failure) = &state.failure
            {
                lost_from = lost_from.min(failure.first_lost_position);
            }
        }

        match self.failures.entry(stream.to_string()) {
            Entry::Occupied(mut entry) => {
                let failure = entry.get_mut();
                failure.lost_from = failure.lost_from.min(lost_from);

                // A later flush only reports that the table failed before, keep the cause.
                if failure.error.kind() == ErrorKind::StreamFailed
                    && error.kind() != ErrorKind::StreamFailed
                {
                    failure.operation = operation;
                    failure.error = error;
                }
            }
            Entry::Vacant(entry) => {
                error!(stream, operation, lost_from, error = %error, "stream failed");

                entry.insert(StreamFailure {
                    operation,
                    error,
                    lost_from,
                });
            }
        }
    }

    /// Pops every STATE token whose preceding records are all committed and returns the
    /// newest of them.
    fn try_ack(&mut self) -> Option<Value> {
        let barrier = self.ack_barrier();
        let mut acked = None;

        while let Some(pending) = self.pending_states.front() {
            if barrier.is_some_and(|barrier| barrier <= pending.position) {
                break;
            }

            if let Some(pending) = self.pending_states.pop_front() {
                debug!(position = pending.position, "state acknowledged");
                acked = Some(pending.value);
            }
        }

        acked
    }

    /// Lowest position that is not committed yet, if any.
    fn ack_barrier(&self) -> Option<u64> {
        let buffered = self
            .streams
            .values()
            .filter_map(|ctx| ctx.batcher.oldest_position());
        let in_flight = self.in_flight.values().copied();
        let failed = self.failures.values().map(|failure| failure.lost_from);

        buffered.chain(in_flight).chain(failed).min()
    }

    fn table(&mut self, name: &TableName) -> Arc<Mutex<TableState>> {
        self.tables.entry(name.clone()).or_default().clone()
    }

    fn summary(&self, final_state: Option<Value>, interrupted: bool) -> RunSummary {
        let names: BTreeSet<&String> = self.streams.keys().chain(self.failures.keys()).collect();

        let streams = names
            .into_iter()
            .map(|stream| {
                let ctx = self.streams.get(stream);
                StreamReport {
                    stream: stream.clone(),
                    table: ctx.map(|ctx| ctx.table_name.clone()),
                    stats: ctx.map(|ctx| ctx.stats).unwrap_or_default(),
                    failure: self.failures.get(stream).cloned(),
                }
            })
            .collect();

        RunSummary {
            streams,
            final_state,
            interrupted,
        }
    }
}

/// Adds or widens the columns undeclared record fields need.
async fn add_inferred_columns<D>(
    destination: &D,
    reconciler: &SchemaReconciler,
    retry: &RetryConfig,
    table: Arc<Mutex<TableState>>,
    stream: &str,
    fields: &[FieldSchema],
) -> SinkResult<(Option<DestinationTable>, u64)>
where
    D: Destination,
{
    let mut state = table.lock().await;
    if let Some(failure) = &state.failure {
        return Err(failure.error.clone());
    }

    let Some(definition) = state.definition.as_ref() else {
        bail!(
            ErrorKind::InvalidState,
            "Table of the stream does not exist",
            format!("stream `{stream}`")
        );
    };

    let plan = reconciler.reconcile_inferred(definition, fields)?;
    if !plan.is_empty() {
        with_retry(retry, stream, "add inferred columns", |_| {
            destination.apply_ddl(&plan)
        })
        .await?;
        plan.apply_to(&mut state.definition);

        info!(stream, operations = plan.len(), "added columns for undeclared fields");
    }

    Ok((state.definition.clone(), plan.len() as u64))
}

/// Converts a record into a row of the stream's table.
///
/// Fails with [`ErrorKind::MalformedRecord`] when a key or required property is missing or a
/// value does not fit its column.
fn build_row(ctx: &StreamContext, record: &Record, add_record_metadata: bool) -> SinkResult<TableRow> {
    for key in &ctx.shape.key_columns {
        if record.data.get(key).is_none_or(Value::is_null) {
            bail!(
                ErrorKind::MalformedRecord,
                "Record is missing a key property",
                format!("key `{key}` is absent or null")
            );
        }
    }

    for required in &ctx.shape.required_columns {
        if !record.data.contains_key(required) {
            bail!(
                ErrorKind::MalformedRecord,
                "Record is missing a required property",
                format!("property `{required}` is absent")
            );
        }
    }

    let mut values = Vec::with_capacity(record.data.len() + 6);
    for (column, value) in &record.data {
        // Unknown columns only remain for null values, which need no column.
        let Some(sql_type) = ctx.column_types.get(column) else {
            continue;
        };
        values.push((column.clone(), coerce_value(column, value, sql_type)?));
    }

    let mut row = TableRow::new(record.position, values);
    let mut set_metadata = |column: &str, cell: Cell| {
        if ctx.column_types.contains_key(column) {
            row.set(column, cell);
        }
    };

    set_metadata(TABLE_VERSION, Cell::I64(ctx.version.stamp(record.version)));
    if add_record_metadata {
        set_metadata(
            EXTRACTED_AT,
            record.time_extracted.map_or(Cell::Null, Cell::Timestamp),
        );
        set_metadata(RECEIVED_AT, Cell::Timestamp(record.received_at));
        set_metadata(SEQUENCE, Cell::I64(record.position as i64));
    }

    if row.get(DELETED_AT).is_none() && ctx.column_types.contains_key(DELETED_AT) {
        row.set(DELETED_AT, Cell::Null);
    }

    Ok(row)
}

/// Writes one batch and advances the stream checkpoint.
///
/// Runs while holding the table lock. A failure poisons the table so that later flushes of
/// it fail fast instead of committing rows past the lost ones.
async fn flush_batch<D, S>(
    writer: Writer<D>,
    checkpoints: CheckpointTracker<S>,
    mut state: OwnedMutexGuard<TableState>,
    batch: Batch,
    keys: Vec<String>,
) -> SinkResult<CommitResult>
where
    D: Destination,
    S: CheckpointStore,
{
    let stream = batch.stream.clone();
    let first_position = batch.first_position().unwrap_or_default();

    if let Some(failure) = &state.failure {
        bail!(
            ErrorKind::StreamFailed,
            "Table failed during an earlier flush",
            format!(
                "stream `{stream}`, first lost position {}",
                failure.first_lost_position
            )
        );
    }

    let outcome: SinkResult<CommitResult> = async {
        let Some(definition) = state.definition.as_ref() else {
            bail!(
                ErrorKind::InvalidState,
                "Table of the stream does not exist",
                format!("stream `{stream}`")
            );
        };

        let result = writer.flush(definition, batch, &keys).await?;

        #[cfg(feature = "failpoints")]
        sink_fail_point(FLUSH_BEFORE_CHECKPOINT)?;

        checkpoints.advance(&stream, result.last_position).await?;

        Ok(result)
    }
    .await;

    match outcome {
        Ok(result) => {
            debug!(
                %stream,
                rows = result.rows,
                attempts = result.attempts,
                last_position = result.last_position,
                "flushed batch"
            );

            Ok(result)
        }
        Err(err) => {
            state.failure = Some(TableFailure {
                first_lost_position: first_position,
                error: err.clone(),
            });

            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::checkpoint::memory::MemoryCheckpointStore;
    use crate::destination::memory::MemoryDestination;
    use crate::protocol::StateMessage;

    fn config() -> TargetConfig {
        serde_json::from_value(json!({
            "host": "localhost",
            "user": "root",
            "database": "melty",
            "add_record_metadata": false,
            "batch": { "max_rows": 100 },
            "retry": { "initial_retry_delay_ms": 1, "max_retry_delay_ms": 2 }
        }))
        .unwrap()
    }

    fn schema() -> Message {
        Message::Schema(SchemaMessage {
            stream: "animals".to_string(),
            schema: json!({"properties": {"id": {"type": "integer"}, "name": {"type": ["null", "string"]}}}),
            key_properties: Some(vec!["id".to_string()]),
            bookmark_properties: None,
        })
    }

    fn record(id: i64) -> Message {
        let Value::Object(record) = json!({"id": id, "name": format!("animal {id}")}) else {
            unreachable!()
        };
        Message::Record(RecordMessage {
            stream: "animals".to_string(),
            record,
            version: None,
            time_extracted: None,
        })
    }

    fn state(value: i64) -> Message {
        Message::State(StateMessage {
            value: json!({"bookmark": value}),
        })
    }

    async fn engine() -> Engine<MemoryDestination, MemoryCheckpointStore> {
        Engine::new(config(), MemoryDestination::new(), MemoryCheckpointStore::new())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_is_held_until_records_before_it_are_flushed() {
        let mut engine = engine().await;

        engine.accept(schema()).await.unwrap();
        engine.accept(record(1)).await.unwrap();
        assert_eq!(engine.accept(state(1)).await.unwrap(), None);

        let summary = engine.finish().await.unwrap();
        assert_eq!(summary.final_state, Some(json!({"bookmark": 1})));
        assert_eq!(summary.stream("animals").unwrap().stats.written, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_without_pending_records_is_acked_immediately() {
        let mut engine = engine().await;

        assert_eq!(
            engine.accept(state(1)).await.unwrap(),
            Some(json!({"bookmark": 1}))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_without_schema_fails_only_its_stream() {
        let mut engine = engine().await;

        engine.accept(record(1)).await.unwrap();
        assert!(engine.is_failed("animals"));

        let summary = engine.finish().await.unwrap();
        let report = summary.stream("animals").unwrap();
        assert_eq!(
            report.failure.as_ref().unwrap().error.kind(),
            ErrorKind::MissingSchema
        );
        assert!(report.table.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_key_is_skipped_as_malformed() {
        let mut engine = engine().await;
        engine.accept(schema()).await.unwrap();

        let Value::Object(data) = json!({"name": "nameless"}) else {
            unreachable!()
        };
        engine
            .accept(Message::Record(RecordMessage {
                stream: "animals".to_string(),
                record: data,
                version: None,
                time_extracted: None,
            }))
            .await
            .unwrap();

        let stats = engine.stream_stats("animals").unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.received, 0);
        assert!(!engine.is_failed("animals"));
    }
}
