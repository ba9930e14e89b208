use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Evaluated before every write attempt of the writer.
pub const WRITER_BEFORE_WRITE: &str = "writer.before_write";
/// Evaluated inside the write transaction after the first half of a batch was written.
pub const DESTINATION_WRITE_MID_BATCH: &str = "destination.write_batch.mid_batch";
/// Evaluated inside the activation transaction after stale rows were cleaned up.
pub const DESTINATION_COMMIT_VERSION_AFTER_CLEANUP: &str =
    "destination.commit_version.after_cleanup";
/// Evaluated by flush tasks after the batch committed and before the checkpoint advances.
pub const FLUSH_BEFORE_CHECKPOINT: &str = "flush.before_checkpoint";

/// Returns an error when the named failpoint is configured to fire.
///
/// The failpoint parameter selects the error kind: `timed_retry` produces an error the writer
/// retries, anything else produces an error that stops the stream.
pub fn sink_fail_point(name: &str) -> SinkResult<()> {
    fail_point!(name, |parameter| {
        let mut error_kind = ErrorKind::WithNoRetry;
        if let Some(parameter) = parameter {
            error_kind = match parameter.as_str() {
                "no_retry" => ErrorKind::WithNoRetry,
                "timed_retry" => ErrorKind::WithTimedRetry,
                _ => ErrorKind::WithNoRetry,
            }
        }

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
