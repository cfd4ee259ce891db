//! Protocol message types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which bounds of a [`ScanRange`] are part of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Inclusion {
    /// Exclusive on both bounds
    #[default]
    Neither,
    /// Inclusive low bound only
    Low,
    /// Inclusive high bound only
    High,
    /// Inclusive on both bounds
    Both,
}

/// Half-open or closed key interval over the secondary index.
///
/// Empty `low`/`high` mean "unbounded" on that side; the server treats an
/// empty bound as negative/positive infinity respectively.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanRange {
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub low: Bytes,
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub high: Bytes,
    pub inclusion: Inclusion,
}

/// A query span: either a key range, a set of exact-match keys, or both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Range component, `None` for pure equality lookups
    pub range: Option<ScanRange>,
    /// Exact-match secondary keys
    #[serde(with = "crate::serde_utils::vec_bytes_serde")]
    pub equal: Vec<Bytes>,
}

impl Span {
    /// Span covering a single key range.
    pub fn range(low: impl Into<Bytes>, high: impl Into<Bytes>, inclusion: Inclusion) -> Self {
        Self {
            range: Some(ScanRange {
                low: low.into(),
                high: high.into(),
                inclusion,
            }),
            equal: Vec::new(),
        }
    }

    /// Span matching a set of exact keys.
    pub fn equal(keys: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            range: None,
            equal: keys.into_iter().collect(),
        }
    }
}

/// One scan hit: the secondary key that matched and the primary key of the
/// document it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub secondary_key: Bytes,
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub primary_key: Bytes,
}

/// Aggregate statistics for an index span.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of entries in the span
    pub count: u64,
    /// Number of distinct secondary keys in the span
    pub unique_count: u64,
    /// Smallest secondary key in the span
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub min: Bytes,
    /// Largest secondary key in the span
    #[serde(with = "crate::serde_utils::bytes_serde")]
    pub max: Bytes,
}

/// Protocol request messages
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable for postcard serialization
/// compatibility. Adding new variants should only be done at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Request aggregate statistics for a span. Answered by exactly one
    /// `Response::Statistics` followed by `Response::StreamEnd`.
    Statistics {
        index: String,
        bucket: String,
        span: Span,
    },

    /// Open a range scan stream over a span
    Scan {
        index: String,
        bucket: String,
        span: Span,
        /// Suppress duplicate secondary keys
        distinct: bool,
        /// Entries per response frame
        page_size: i64,
        /// Maximum entries overall, 0 for unlimited
        limit: i64,
    },

    /// Open a full-index scan stream
    ScanAll {
        index: String,
        bucket: String,
        page_size: i64,
        limit: i64,
    },

    /// Ask the server to terminate the current stream. The server replies
    /// with any residue frames followed by `Response::StreamEnd`.
    EndStream,
}

/// Protocol response messages
///
/// End-of-stream is a distinct variant so it can be discriminated
/// structurally, never by inspecting payload values.
///
/// # Stability
///
/// **WARNING**: Variant order must remain stable for postcard serialization
/// compatibility. Adding new variants should only be done at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to `Request::Statistics`
    Statistics {
        stats: Option<IndexStats>,
        /// Server-side failure, carried in-band
        error: Option<String>,
    },

    /// One page of scan results
    Stream {
        entries: Vec<IndexEntry>,
        /// Server-side failure, carried in-band; the stream still terminates
        /// with `StreamEnd`
        error: Option<String>,
    },

    /// The server has no further responses for the current request
    StreamEnd,
}

impl Response {
    /// True when this frame is the end-of-stream marker.
    #[inline]
    pub fn is_stream_end(&self) -> bool {
        matches!(self, Response::StreamEnd)
    }
}
