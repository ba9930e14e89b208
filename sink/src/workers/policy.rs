use crate::error::{ErrorKind, SinkError};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The operation is retried automatically with exponential backoff.
    Timed,
    /// The operation is not retried and the affected stream stops.
    NoRetry,
}

/// Policy describing how a [`SinkError`] is handled by the writer and the engine.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    /// Returns the retry directive for this policy.
    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns `true` when the error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        self.retry_directive == RetryDirective::Timed
    }

    /// Returns an optional operator-facing solution message.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Builds an [`ErrorHandlingPolicy`] from a [`SinkError`].
pub fn build_error_handling_policy(error: &SinkError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Transient destination failures. Keep this list narrow: everything here is retried
        // inside one flush or activation before the stream is given up on.
        ErrorKind::DestinationConnectionFailed
        | ErrorKind::DestinationLockTimeout
        | ErrorKind::DestinationDeadlock
        | ErrorKind::DestinationTimeout => ErrorHandlingPolicy::new(RetryDirective::Timed, None),

        ErrorKind::DestinationAuthenticationFailed => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Verify the MySQL user exists and has CREATE, ALTER, INSERT, UPDATE and DELETE grants."),
        ),
        ErrorKind::SchemaConflict => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Alter the destination column to a type compatible with both schemas, or load the stream into a new table."),
        ),
        ErrorKind::MissingSchema => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Make sure the tap emits a SCHEMA message before the first RECORD of every stream."),
        ),
        ErrorKind::ValueRejected => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Raise `max_varchar_size` or declare a `maxLength` large enough for the values."),
        ),
        ErrorKind::ConstraintViolation => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Check that the stream's key properties match the unique keys of the destination table."),
        ),

        #[cfg(feature = "failpoints")]
        ErrorKind::WithNoRetry => {
            ErrorHandlingPolicy::new(RetryDirective::NoRetry, Some("Cannot retry this error."))
        }
        #[cfg(feature = "failpoints")]
        ErrorKind::WithTimedRetry => ErrorHandlingPolicy::new(
            RetryDirective::Timed,
            Some("Will automatically retry after the configured delay."),
        ),

        _ => ErrorHandlingPolicy::new(RetryDirective::NoRetry, None),
    }
}
