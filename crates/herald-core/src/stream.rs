//! Stream identity and event streams.

use std::fmt;

use crate::event::StoredEvent;

/// Identifies an aggregate's event stream together with the version the
/// caller expects it to be at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    stream_name: String,
    stream_version: i64,
}

impl StreamId {
    /// Creates a stream id with an explicit expected version.
    #[must_use]
    pub fn new(stream_name: impl Into<String>, stream_version: i64) -> Self {
        Self {
            stream_name: stream_name.into(),
            stream_version,
        }
    }

    /// Builds the conventional `Kind:id` stream name, e.g. `Product:1234`.
    #[must_use]
    pub fn for_aggregate(kind: &str, id: impl fmt::Display, stream_version: i64) -> Self {
        Self::new(format!("{kind}:{id}"), stream_version)
    }

    /// The stream name.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// The expected current version of the stream.
    #[must_use]
    pub fn stream_version(&self) -> i64 {
        self.stream_version
    }

    /// Returns a copy of this id expecting a different version.
    #[must_use]
    pub fn with_version(&self, stream_version: i64) -> Self {
        Self::new(self.stream_name.clone(), stream_version)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stream_name, self.stream_version)
    }
}

/// The ordered events of one stream plus the stream's current version.
///
/// Versions within a stream are contiguous starting at 1. `events` may be a
/// suffix of the full history (see `EventStore::stream_for`).
#[derive(Debug, Clone, PartialEq)]
pub struct EventStream {
    /// The stream these events belong to.
    pub stream_name: String,
    /// The stream's current version.
    pub version: i64,
    /// Events in ascending stream version.
    pub events: Vec<StoredEvent>,
}

impl EventStream {
    /// An empty stream at version 0.
    #[must_use]
    pub fn empty(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            version: 0,
            events: Vec::new(),
        }
    }

    /// Returns `true` if the stream has never been appended to.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// The id to use when appending after this stream.
    #[must_use]
    pub fn next_stream_id(&self) -> StreamId {
        StreamId::new(self.stream_name.clone(), self.version)
    }
}
