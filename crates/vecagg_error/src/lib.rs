use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// Callers branch on the kind, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    /// Internal invariant violation or a failure without a more specific
    /// category.
    #[default]
    Internal,
    /// Operation intentionally not supported by the target representation.
    Unsupported,
    /// A fixed capacity container was asked to hold more than it can.
    CapacityExceeded,
    /// Malformed aggregate or operator definition detected at build time.
    InvalidDefinition,
    /// Execution was interrupted by an external signal.
    Cancelled,
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    msg: String,
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<(String, String)>,
    backtrace: Backtrace,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                kind: ErrorKind::Internal,
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(msg).with_kind(ErrorKind::Unsupported)
    }

    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::new(msg).with_kind(ErrorKind::InvalidDefinition)
    }

    pub fn capacity_exceeded(msg: impl Into<String>) -> Self {
        Self::new(msg).with_kind(ErrorKind::CapacityExceeded)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(msg).with_kind(ErrorKind::Cancelled)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    /// Attach a structured field to the error.
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;
        for (key, value) in &self.inner.fields {
            write!(f, "\n  {key}: {value}")?;
        }
        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }
        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace:\n{}", self.inner.backtrace)?;
        }
        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

/// Return an `Unsupported` error with the formatted message.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        return Err($crate::DbError::unsupported(format!("Not yet implemented: {msg}")));
    }};
}

/// Extension methods on results for attaching context.
pub trait ResultExt<T, E> {
    /// Wrap the error with a message.
    fn context(self, msg: &'static str) -> Result<T, DbError>;

    /// Wrap the error with a lazily computed message.
    fn context_fn<F, S>(self, f: F) -> Result<T, DbError>
    where
        F: Fn() -> S,
        S: Into<String>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T, DbError> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F, S>(self, f: F) -> Result<T, DbError>
    where
        F: Fn() -> S,
        S: Into<String>,
    {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        self.ok_or_else(|| DbError::new(format!("Missing required value: {msg}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_fields() {
        let err = DbError::new("bad thing").with_field("row", 4);
        let s = err.to_string();
        assert!(s.starts_with("bad thing"));
        assert!(s.contains("row: 4"));
        assert_eq!(Some("4"), err.get_field("row"));
    }

    #[test]
    fn not_implemented_is_unsupported() {
        fn f() -> Result<()> {
            not_implemented!("copy {}", "batch")
        }
        let err = f().unwrap_err();
        assert_eq!(ErrorKind::Unsupported, err.kind());
        assert!(err.get_msg().contains("copy batch"));
    }

    #[test]
    fn context_wraps_source() {
        let res: std::result::Result<(), fmt::Error> = Err(fmt::Error);
        let err = res.context("writing").unwrap_err();
        assert_eq!("writing", err.get_msg());
        assert!(err.source().is_some());
    }

    #[test]
    fn required_missing() {
        let err = None::<i32>.required("value").unwrap_err();
        assert_eq!(ErrorKind::Internal, err.kind());
    }
}
