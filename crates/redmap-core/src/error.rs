//! Error type shared by every redmap layer.

/// Error returned by map, cursor and store operations.
///
/// Absent keys are never errors; they come back as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The remote store could not be reached or answered with a failure.
    ///
    /// No retry is attempted; retry policy belongs to the connection.
    Communication(String),
    /// `remove()` was called on a cursor before `next()`, or twice in a row.
    InvalidIteratorState,
    /// The handle has already been released.
    Released,
    /// Configuration could not be parsed.
    Config(String),
}

impl MapError {
    pub fn communication(msg: impl Into<String>) -> Self {
        MapError::Communication(msg.into())
    }

    /// Whether this error came from the store rather than from local misuse.
    pub fn is_communication(&self) -> bool {
        matches!(self, MapError::Communication(_))
    }
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::Communication(msg) => write!(f, "remote store communication failed: {}", msg),
            MapError::InvalidIteratorState => {
                write!(f, "remove() requires a preceding next() on the cursor")
            }
            MapError::Released => write!(f, "map handle has already been released"),
            MapError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for MapError {}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for MapError {
    fn from(err: redis::RedisError) -> Self {
        MapError::Communication(err.to_string())
    }
}
