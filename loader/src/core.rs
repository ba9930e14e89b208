use std::path::PathBuf;

use config::shared::{
    BatchConfig, CheckpointStoreConfig, MySqlConnectionConfig, RetryConfig, TargetConfig,
};
use serde_json::Value;
use sink::checkpoint::CheckpointStore;
use sink::checkpoint::memory::MemoryCheckpointStore;
use sink::checkpoint::mysql::MySqlCheckpointStore;
use sink::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use sink::destination::Destination;
use sink::destination::mysql::MySqlDestination;
use sink::engine::{Engine, RunSummary};
use sink::protocol::Message;
use sqlx::MySqlPool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::LoaderResult;

/// Boxed reader over standard input or the file passed with `--input`.
type Input = Box<dyn AsyncBufRead + Unpin + Send>;

/// How reading the input ended.
enum InputEnd {
    /// The input was read completely.
    Eof,
    /// A shutdown signal arrived first.
    Shutdown,
}

/// Connects to the destination, builds the engine and feeds it the whole input.
///
/// Each checkpoint store gets its own engine instantiation. This is more verbose due to static
/// dispatch, but keeps the hot path free of trait objects.
pub async fn run_with_config(config: TargetConfig, input: Option<PathBuf>) -> LoaderResult<()> {
    info!("starting target-mysql");

    log_config(&config);

    let input = open_input(input).await?;
    let destination = MySqlDestination::connect(&config).await?;

    match config.checkpoint_store {
        CheckpointStoreConfig::Memory => {
            let store = MemoryCheckpointStore::new();
            run_engine(config, destination, store, input).await
        }
        CheckpointStoreConfig::Destination => {
            let schema = checkpoint_schema(&config, destination.pool()).await?;
            let store = MySqlCheckpointStore::new(destination.pool().clone(), schema);
            run_engine(config, destination, store, input).await
        }
    }
}

async fn open_input(input: Option<PathBuf>) -> LoaderResult<Input> {
    let input: Input = match input {
        Some(path) => {
            info!(path = %path.display(), "reading messages from file");
            Box::new(BufReader::new(tokio::fs::File::open(path).await?))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    Ok(input)
}

/// Schema holding `_sdc_checkpoints`: the default target schema, else the connection database.
async fn checkpoint_schema(config: &TargetConfig, pool: &MySqlPool) -> LoaderResult<String> {
    if let Some(schema) = &config.default_target_schema {
        return Ok(schema.clone());
    }
    if !config.connection.database.is_empty() {
        return Ok(config.connection.database.clone());
    }

    // Only the url names the database.
    let database: Option<String> = sqlx::query_scalar("select database()")
        .fetch_one(pool)
        .await?;

    Ok(database.unwrap_or_default())
}

/// Runs one engine over the input and handles graceful shutdown signals.
///
/// On `SIGINT` or `SIGTERM` the engine stops at the next message boundary, waits for in-flight
/// flushes and discards buffered rows. Only STATE already covered by committed writes is
/// emitted.
#[tracing::instrument(skip_all)]
async fn run_engine<D, S>(
    config: TargetConfig,
    destination: D,
    store: S,
    input: Input,
) -> LoaderResult<()>
where
    D: Destination + Clone + Send + Sync + 'static,
    S: CheckpointStore + Clone + Send + Sync + 'static,
{
    let mut engine = Engine::new(config, destination, store).await?;
    let mut stdout = tokio::io::stdout();

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let signal_handle = spawn_signal_listener(shutdown_tx.clone())?;

    let fed = feed(&mut engine, input, shutdown_rx, &mut stdout).await;

    // If the input ended before a signal arrived, the listener is no longer needed.
    signal_handle.abort();
    let _ = signal_handle.await;

    let summary = match fed {
        Ok(InputEnd::Eof) => engine.finish().await?,
        Ok(InputEnd::Shutdown) => engine.shutdown().await?,
        Err(err) => {
            // Let in-flight flushes settle so that committed STATE is still reported.
            match engine.shutdown().await {
                Ok(summary) => emit_state(&mut stdout, summary.final_state).await?,
                Err(shutdown_err) => error!(error = %shutdown_err, "engine shutdown failed"),
            }
            return Err(err);
        }
    };

    emit_state(&mut stdout, summary.final_state.clone()).await?;
    log_summary(&summary);

    summary.into_result()?;

    Ok(())
}

/// Reads messages line by line until the input ends or shutdown is requested.
async fn feed<D, S>(
    engine: &mut Engine<D, S>,
    input: Input,
    mut shutdown_rx: ShutdownRx,
    stdout: &mut Stdout,
) -> LoaderResult<InputEnd>
where
    D: Destination + Clone + Send + Sync + 'static,
    S: CheckpointStore + Clone + Send + Sync + 'static,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                warn!(position = engine.position(), "shutdown requested, stopping input");
                return Ok(InputEnd::Shutdown);
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            info!(messages = engine.position(), "input ended");
            return Ok(InputEnd::Eof);
        };

        if line.trim().is_empty() {
            continue;
        }

        let Some(message) = Message::parse(&line)? else {
            continue;
        };

        let acknowledged = engine.accept(message).await?;
        emit_state(stdout, acknowledged).await?;
    }
}

/// Writes an acknowledged STATE value as one JSON line.
async fn emit_state(stdout: &mut Stdout, state: Option<Value>) -> LoaderResult<()> {
    let Some(state) = state else {
        return Ok(());
    };

    let mut line = serde_json::to_string(&state).map_err(sink::error::SinkError::from)?;
    line.push('\n');

    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;

    debug!("emitted state");

    Ok(())
}

/// Listens for `SIGINT` and `SIGTERM` and broadcasts a shutdown on the first one.
fn spawn_signal_listener(shutdown_tx: ShutdownTx) -> LoaderResult<JoinHandle<()>> {
    let mut sigterm = signal(SignalKind::terminate())?;

    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    });

    Ok(handle)
}

fn log_summary(summary: &RunSummary) {
    for report in &summary.streams {
        let table = report.table.as_ref().map(ToString::to_string);
        match &report.failure {
            Some(failure) => error!(
                stream = report.stream,
                table,
                operation = failure.operation,
                lost_from = failure.lost_from,
                error = %failure.error,
                "stream failed"
            ),
            None => info!(
                stream = report.stream,
                table,
                received = report.stats.received,
                written = report.stats.written,
                malformed = report.stats.malformed,
                activations = report.stats.activations,
                "stream finished"
            ),
        }
    }

    if summary.interrupted {
        warn!("run was interrupted, buffered rows were discarded");
    }
}

fn log_config(config: &TargetConfig) {
    debug!(
        default_target_schema = ?config.default_target_schema,
        hard_delete = config.hard_delete,
        add_record_metadata = config.add_record_metadata,
        max_varchar_size = config.max_varchar_size,
        flattening_enabled = config.flattening_enabled,
        flattening_max_depth = config.flattening_max_depth,
        number_mode = ?config.number_mode,
        max_concurrent_flushes = config.max_concurrent_flushes,
        fail_fast = config.fail_fast,
        resume_from_checkpoint = config.resume_from_checkpoint,
        checkpoint_store = ?config.checkpoint_store,
        "target config"
    );
    log_connection_config(&config.connection);
    log_batch_config(&config.batch);
    log_retry_config(&config.retry);
}

fn log_connection_config(config: &MySqlConnectionConfig) {
    debug!(
        url_configured = config.url.is_some(),
        host = config.host,
        port = config.port,
        user = config.user,
        database = config.database,
        tls_enabled = config.tls.enabled,
        "destination mysql connection config"
    );
}

fn log_batch_config(config: &BatchConfig) {
    debug!(
        max_rows = config.max_rows,
        max_bytes = config.max_bytes,
        max_fill_ms = config.max_fill_ms,
        "batch config"
    );
}

fn log_retry_config(config: &RetryConfig) {
    debug!(
        max_attempts = config.max_attempts,
        initial_retry_delay_ms = config.initial_retry_delay_ms,
        max_retry_delay_ms = config.max_retry_delay_ms,
        backoff_multiplier = config.backoff_multiplier,
        operation_timeout_ms = config.operation_timeout_ms,
        "retry config"
    );
}
