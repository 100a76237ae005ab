use std::fmt;

/// Error categories surfaced by the core: schema, query, IO/lifecycle,
/// runtime, and resource errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    // Schema errors
    UnknownStore,
    UnknownField,
    UnknownJoin,
    UnknownKey,
    NameCollision,
    ForwardJoinReference,
    InvalidName,
    TypeMismatch,

    // Query errors
    MalformedQuery,
    UnknownQueryOp,
    StoreMismatch,
    UnsupportedOperator,
    UnorderedLeaf,
    InvalidSortType,

    // IO / lifecycle errors
    MissingIndex,
    IndexCorrupt,
    ReadOnly,
    NotInitialized,
    AlreadyOpen,

    // Runtime errors
    NullViolation,
    WrongFieldType,
    RecordNotFound,
    DeletedRecord,
    GeoIndexAbsent,

    // Resource errors
    CacheOverflow,
    SerializationLimit,

    // Catch-alls
    Io,
    Parse,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Parse, err.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::new(ErrorKind::Internal, format!("FST error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::MalformedQuery, err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::new(ErrorKind::Internal, format!("invalid pattern: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
