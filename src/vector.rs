//! Vector record types exchanged across the public API.

use serde::{Deserialize, Serialize};

/// A stored vector: an identifier, its embedding, and the timestamp it was
/// last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// Unique, caller-assigned identifier. `0` is reserved and invalid.
    pub id: u64,
    /// The embedding itself.
    pub data: Vec<f32>,
    /// Unix timestamp (seconds) of the last write to this record.
    pub timestamp: u64,
}

impl Vector {
    /// Creates a vector record. `timestamp` should be the current time;
    /// callers writing through [`crate::storage::VectorStore`] need not
    /// set this themselves, as insert stamps it.
    #[must_use]
    pub fn new(id: u64, data: Vec<f32>, timestamp: u64) -> Self {
        Self { id, data, timestamp }
    }

    /// Dimension of the stored embedding.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }
}

/// A single search hit: an identifier and its similarity score under the
/// database's configured metric, with the matching payload attached only
/// when the caller asked for it (see [`crate::Database::search_with_vectors`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identifier of the matching vector.
    pub id: u64,
    /// Similarity score. Higher is always more similar, regardless of
    /// metric (Euclidean distance is negated to preserve this).
    pub similarity: f32,
    /// The matching vector's payload, present only when explicitly
    /// requested; plain [`crate::Database::search`] always leaves this
    /// `None` to avoid a second read per hit.
    pub vector: Option<Vec<f32>>,
}

impl SearchHit {
    /// Creates a search hit with no payload attached.
    #[must_use]
    pub const fn new(id: u64, similarity: f32) -> Self {
        Self {
            id,
            similarity,
            vector: None,
        }
    }

    /// Creates a search hit with its payload attached.
    #[must_use]
    pub const fn with_vector(id: u64, similarity: f32, vector: Vec<f32>) -> Self {
        Self {
            id,
            similarity,
            vector: Some(vector),
        }
    }
}
