use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use sink::error::SinkError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the loader binary.
///
/// Wraps [`SinkError`] for everything the engine reports, including failed streams, and adds
/// variants for startup and input errors.
#[derive(Debug)]
pub enum LoaderError {
    /// Engine, destination or stream failure.
    Sink(SinkError),
    /// Configuration or tracing setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Reading input or writing STATE output failed.
    Io(std::io::Error, CapturedBacktrace),
}

impl LoaderError {
    pub fn category(&self) -> &'static str {
        match self {
            LoaderError::Sink(_) => "load error",
            LoaderError::Config(_, _) => "configuration error",
            LoaderError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            LoaderError::Sink(err) => err.backtrace(),
            LoaderError::Config(_, cb) => Some(&cb.0),
            LoaderError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        LoaderError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("target-mysql failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        // Aggregated stream failures already list every cause in their display.
        if !matches!(self, LoaderError::Sink(err) if err.errors().len() > 1) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Sink(err) => write!(f, "{err}"),
            LoaderError::Config(source, _) => write!(f, "configuration error: {source}"),
            LoaderError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoaderError::Sink(err) => err.source(),
            LoaderError::Config(source, _) => Some(source.as_ref()),
            LoaderError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<SinkError> for LoaderError {
    fn from(err: SinkError) -> Self {
        LoaderError::Sink(err)
    }
}

impl From<sqlx::Error> for LoaderError {
    fn from(err: sqlx::Error) -> Self {
        LoaderError::Sink(err.into())
    }
}
