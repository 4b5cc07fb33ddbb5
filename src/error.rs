//! Unified error type.

use std::fmt;

/// Boxed error used for request bodies of unknown origin.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by gatehouse's fallible operations.
///
/// Authorization outcomes are not errors: a denied request is a `403`
/// response. This type covers infrastructure failures, configuration that is
/// rejected at construction time, and evaluators that could not reach a
/// decision.
#[derive(Debug)]
pub enum Error {
    /// Socket or transport I/O failed.
    Io(std::io::Error),
    /// A listen address could not be parsed.
    Addr(String),
    /// Reading a request body failed.
    Body(BoxError),
    /// A configuration value was rejected.
    Config(String),
    /// The metrics backend refused a collector.
    Metrics(prometheus::Error),
    /// A policy evaluator could not produce a decision.
    Evaluation(String),
    /// A policy line could not be parsed.
    PolicyParse { line: usize, reason: String },
    /// The request already carries a subject.
    SubjectAlreadyAttached,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Addr(addr) => write!(f, "invalid socket address `{addr}`"),
            Self::Body(e) => write!(f, "request body: {e}"),
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Metrics(e) => write!(f, "metrics: {e}"),
            Self::Evaluation(msg) => write!(f, "policy evaluation failed: {msg}"),
            Self::PolicyParse { line, reason } => write!(f, "policy line {line}: {reason}"),
            Self::SubjectAlreadyAttached => f.write_str("request subject is already attached"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Body(e) => Some(e.as_ref()),
            Self::Metrics(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Self::Metrics(e)
    }
}
