use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    Internal,
    InvalidState,
    UnsupportedQuery,
    Corrupted,
    /// Malformed query or plan, detected before execution starts.
    QueryCompile,
    UnresolvedBindVariable,
    /// A single candidate row failed; recorded and skipped.
    RowExecution,
    /// A transaction was rejected; the index is left untouched.
    IndexTransaction,
    /// Reindex aborted; the marker file stays in place.
    Recovery,
}

#[derive(Debug, Clone, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn query_compile(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryCompile, context)
    }

    pub fn row(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::RowExecution, context)
    }

    pub fn transaction(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::IndexTransaction, context)
    }

    pub fn recovery(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Recovery, context)
    }

    /// Re-tags an error while keeping its message, e.g. an I/O failure surfacing as a
    /// transaction failure.
    pub fn into_kind(self, kind: ErrorKind) -> Self {
        if self.kind == kind {
            return self;
        }
        Error {
            kind,
            context: format!("{:?}: {}", self.kind, self.context),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind != ErrorKind::RowExecution
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error {
            kind: ErrorKind::InvalidArgument,
            context: format!("Invalid pattern: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
