//! Error types and result definitions for the sink.
//!
//! [`SinkError`] carries a classified [`ErrorKind`], a static description, optional dynamic
//! detail, the originating error, the caller location and a backtrace. Several errors can be
//! aggregated into one, which is how the run summary reports every failed stream at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for sink operations using [`SinkError`] as the error type.
pub type SinkResult<T> = Result<T, SinkError>;

/// Detailed payload stored for single [`SinkError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ErrorPayload {
    fn new(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
        location: &'static Location<'static>,
        backtrace: Arc<Backtrace>,
    ) -> Self {
        Self {
            kind,
            description,
            detail,
            source,
            location,
            backtrace,
        }
    }
}

/// Main error type of the sink.
///
/// Represents either a single classified error or several aggregated errors, for example the
/// failures of multiple streams at the end of a run.
#[derive(Debug, Clone)]
pub struct SinkError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    Many {
        errors: Vec<SinkError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors raised while materializing streams.
///
/// [`crate::workers::policy::build_error_handling_policy`] decides from the kind whether an
/// operation is retried or the stream is stopped.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    DestinationConnectionFailed,
    DestinationAuthenticationFailed,

    // Query & Execution Errors
    DestinationQueryFailed,
    DestinationLockTimeout,
    DestinationDeadlock,
    DestinationTimeout,
    DestinationTableMissing,

    // Write Errors
    ConstraintViolation,
    ValueRejected,
    FatalWriteError,

    // Schema Errors
    SchemaConflict,
    InvalidSchema,
    MissingSchema,

    // Record & Protocol Errors
    MalformedRecord,
    InvalidMessage,
    ConversionError,

    // Configuration Errors
    ConfigError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,
    StreamFailed,
    FlushWorkerPanic,

    // Unknown / Uncategorized
    Unknown,

    // Special error kinds used for tests that trigger specific retry behaviors via fault injection.
    #[cfg(feature = "failpoints")]
    WithNoRetry,
    #[cfg(feature = "failpoints")]
    WithTimedRetry,
}

impl SinkError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// Aggregated errors return the description of their first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("Multiple errors"),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the aggregated errors, or a single-element slice view for single errors.
    pub fn errors(&self) -> Vec<&SinkError> {
        match self.repr {
            ErrorRepr::Single(_) => vec![self],
            ErrorRepr::Many { ref errors, .. } => errors.iter().collect(),
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.set_source(Some(Arc::new(source)));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        SinkError {
            repr: ErrorRepr::Single(ErrorPayload::new(
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            )),
        }
    }

    fn set_source(&mut self, source: Option<Arc<dyn error::Error + Send + Sync>>) {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = source;
        }
    }
}

impl PartialEq for SinkError {
    fn eq(&self, other: &SinkError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for SinkError {
    /// Hashes the kind and static description only, so that occurrences of the same failure
    /// group together regardless of the stream or values involved.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                std::mem::discriminant(&self.repr).hash(state);
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                std::mem::discriminant(&self.repr).hash(state);
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        } else {
                            write!(f, "\n  {}.", index + 1)?;
                        }

                        for line in lines {
                            if line.is_empty() {
                                write!(f, "\n     ")?;
                            } else {
                                write!(f, "\n     {line}")?;
                            }
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SinkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`SinkError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SinkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SinkError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SinkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`SinkError`] from a vector of errors for aggregation.
///
/// A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for SinkError
where
    E: Into<SinkError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SinkError {
        let location = Location::caller();

        let mut errors: Vec<SinkError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        SinkError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`SinkError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for SinkError {
    #[track_caller]
    fn from(err: std::io::Error) -> SinkError {
        let detail = err.to_string();
        let source = Arc::new(err);
        SinkError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`SinkError`] with the appropriate error kind.
impl From<serde_json::Error> for SinkError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SinkError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        SinkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`SinkError`] with [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for SinkError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> SinkError {
        let detail = err.to_string();
        let source = Arc::new(err);
        SinkError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`bigdecimal::ParseBigDecimalError`] to [`SinkError`] with
/// [`ErrorKind::ConversionError`].
impl From<bigdecimal::ParseBigDecimalError> for SinkError {
    #[track_caller]
    fn from(err: bigdecimal::ParseBigDecimalError) -> SinkError {
        let detail = err.to_string();
        let source = Arc::new(err);
        SinkError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Decimal parsing failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`SinkError`], classifying MySQL error numbers.
///
/// Lock wait timeouts, deadlocks and dropped connections map to kinds that the retry policy
/// treats as transient. Everything else stops the stream.
impl From<sqlx::Error> for SinkError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SinkError {
        use mysql::codes;

        let (kind, description) = match &err {
            sqlx::Error::Database(_) => match codes::error_number(&err) {
                Some(codes::LOCK_WAIT_TIMEOUT) => (
                    ErrorKind::DestinationLockTimeout,
                    "MySQL lock wait timeout exceeded",
                ),
                Some(codes::LOCK_DEADLOCK) => {
                    (ErrorKind::DestinationDeadlock, "MySQL deadlock detected")
                }
                Some(codes::QUERY_INTERRUPTED) => {
                    (ErrorKind::DestinationTimeout, "MySQL query interrupted")
                }
                Some(
                    codes::TOO_MANY_CONNECTIONS
                    | codes::SERVER_GONE
                    | codes::SERVER_LOST,
                ) => (
                    ErrorKind::DestinationConnectionFailed,
                    "MySQL connection lost",
                ),
                Some(codes::ACCESS_DENIED | codes::TABLE_ACCESS_DENIED) => (
                    ErrorKind::DestinationAuthenticationFailed,
                    "MySQL access denied",
                ),
                Some(codes::DUPLICATE_ENTRY | codes::BAD_NULL) => (
                    ErrorKind::ConstraintViolation,
                    "MySQL constraint violation",
                ),
                Some(
                    codes::DATA_TOO_LONG
                    | codes::DATA_OUT_OF_RANGE
                    | codes::TRUNCATED_WRONG_VALUE,
                ) => (ErrorKind::ValueRejected, "MySQL rejected a value"),
                Some(codes::NO_SUCH_TABLE | codes::BAD_FIELD) => (
                    ErrorKind::DestinationTableMissing,
                    "MySQL table or column not found",
                ),
                _ => (ErrorKind::DestinationQueryFailed, "MySQL query failed"),
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => (
                ErrorKind::DestinationConnectionFailed,
                "MySQL connection failed",
            ),
            sqlx::Error::PoolClosed => (ErrorKind::InvalidState, "MySQL pool is closed"),
            sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                (ErrorKind::ConfigError, "MySQL connection is misconfigured")
            }
            _ => (ErrorKind::DestinationQueryFailed, "MySQL operation failed"),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        SinkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`mysql::schema::SchemaError`] to [`SinkError`].
impl From<mysql::schema::SchemaError> for SinkError {
    #[track_caller]
    fn from(err: mysql::schema::SchemaError) -> SinkError {
        match err {
            mysql::schema::SchemaError::Database(err) => SinkError::from(err),
            err @ mysql::schema::SchemaError::InvalidData { .. } => {
                let detail = err.to_string();
                SinkError::from_components(
                    ErrorKind::InvalidSchema,
                    Cow::Borrowed("Destination table definition could not be read"),
                    Some(Cow::Owned(detail)),
                    Some(Arc::new(err)),
                )
            }
        }
    }
}
