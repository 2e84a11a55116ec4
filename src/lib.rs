//! # cvector-rs
//!
//! An embedded vector database: an on-disk vector store with an HNSW
//! approximate nearest-neighbor index layered on top, built for the
//! workload one process talks to directly rather than a client/server
//! deployment.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cvector::{Database, DistanceMetric};
//!
//! let db = Database::create("./data/docs.cvec", 768, DistanceMetric::Cosine)?;
//! db.insert(1, &embedding)?;
//! let hits = db.search(&query_embedding, 10, 0.0)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod priority_queue;
pub mod storage;
pub mod vector;

pub use config::{DatabaseConfig, HnswTuning};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::HnswIndex;
pub use priority_queue::{HeapDirection, PriorityQueue};
pub use storage::VectorStore;
pub use vector::{SearchHit, Vector};

use std::path::Path;

/// Default candidate-list width multiplier applied to `top_k` when a caller
/// doesn't override `ef` explicitly.
pub const DEFAULT_EF_MULTIPLIER: usize = 2;

/// Largest `top_k` a search will accept.
pub const MAX_TOP_K: usize = 10_000;

/// An embedded vector database: a [`VectorStore`] (the on-disk record log
/// and id index) paired with an [`HnswIndex`] (the in-memory ANN graph).
///
/// `Database` is the facade most callers should use; `VectorStore` and
/// `HnswIndex` are public so advanced callers can drive them directly (for
/// instance, to rebuild an index from a store without replaying through the
/// facade).
pub struct Database {
    store: VectorStore,
    index: index::HnswIndex,
}

impl Database {
    /// Creates a new database file at `path`. Fails if a file already
    /// exists there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `dimension` is zero or exceeds
    /// [`config::MAX_DIMENSION`], or [`Error::FileIo`] if the file already
    /// exists or can't be created.
    pub fn create<P: AsRef<Path>>(path: P, dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::create_with_tuning(path, dimension, metric, HnswTuning::default())
    }

    /// Like [`Database::create`], with explicit HNSW tuning instead of the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Database::create`].
    pub fn create_with_tuning<P: AsRef<Path>>(
        path: P,
        dimension: usize,
        metric: DistanceMetric,
        tuning: HnswTuning,
    ) -> Result<Self> {
        let store = VectorStore::create(path, dimension, metric)?;
        let index = index::HnswIndex::new(dimension, metric, tuning);
        Ok(Self { store, index })
    }

    /// Creates a new database file at `path` from a layered [`DatabaseConfig`]
    /// (defaults < TOML file < `CVECTOR_*` environment, per
    /// [`DatabaseConfig::load_from_path`]): `config` is validated, then its
    /// `dimension`, `metric`, and `hnsw` tuning drive
    /// [`Database::create_with_tuning`] directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `config` fails
    /// [`DatabaseConfig::validate`], or anything [`Database::create_with_tuning`]
    /// can return.
    pub fn create_from_config<P: AsRef<Path>>(path: P, config: &DatabaseConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|err| Error::InvalidArgument(err.to_string()))?;
        Self::create_with_tuning(path, config.dimension, config.metric, config.hnsw)
    }

    /// Opens an existing database file at `path`, replaying every live
    /// record into a freshly built HNSW index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseNotFound`] if `path` doesn't exist, or
    /// [`Error::DatabaseCorrupt`] if the file header is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_tuning(path, HnswTuning::default())
    }

    /// Like [`Database::open`], with explicit HNSW tuning for the index
    /// built during replay.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`].
    pub fn open_with_tuning<P: AsRef<Path>>(path: P, tuning: HnswTuning) -> Result<Self> {
        let mut store = VectorStore::open(path)?;
        let dimension = store.dimension();
        let metric = store.metric();
        let index = index::HnswIndex::new(dimension, metric, tuning);

        for (id, data) in store.replay()? {
            if let Err(err) = index.insert(id, &data) {
                tracing::warn!(id, error = %err, "skipping record during HNSW replay");
            }
        }

        Ok(Self { store, index })
    }

    /// Opens an existing database file at `path`, applying `config`'s HNSW
    /// tuning to the index rebuilt during replay. `config.dimension` and
    /// `config.metric` are ignored: the on-disk header is authoritative for
    /// a file that already exists.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open_with_tuning`].
    pub fn open_from_config<P: AsRef<Path>>(path: P, config: &DatabaseConfig) -> Result<Self> {
        Self::open_with_tuning(path, config.hnsw)
    }

    /// Inserts `data` under `id`. Fails if `id` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `data.len()` doesn't match
    /// this database's dimension, or [`Error::InvalidArgument`] if `id`
    /// already exists.
    pub fn insert(&self, id: u64, data: &[f32]) -> Result<()> {
        self.store.insert(id, data)?;
        if let Err(err) = self.index.insert(id, data) {
            tracing::warn!(id, error = %err, "HNSW insert failed; vector is in the store but not yet searchable via the index");
        }
        Ok(())
    }

    /// Retrieves a vector by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id == 0`, or
    /// [`Error::VectorNotFound`] if no live vector carries `id`.
    pub fn get(&self, id: u64) -> Result<Vector> {
        self.store.get(id)
    }

    /// Deletes the vector stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id == 0`, or
    /// [`Error::VectorNotFound`] if no live vector carries `id`.
    pub fn delete(&self, id: u64) -> Result<()> {
        self.store.delete(id)?;
        if let Err(err) = self.index.remove(id) {
            tracing::warn!(id, error = %err, "HNSW remove failed after store delete");
        }
        Ok(())
    }

    /// Searches for the `top_k` vectors most similar to `query`.
    ///
    /// `min_similarity == 0.0` means "no filter"; any other value is
    /// applied as an inclusive lower bound. Tries the HNSW index first
    /// (candidate width `2 * top_k`), falling back to an exhaustive scan of
    /// the store if the index has nothing to offer (empty or erroring).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `top_k` is zero or greater than
    /// [`MAX_TOP_K`], or `min_similarity` is outside `[-1.0, 1.0]`, or
    /// [`Error::DimensionMismatch`] if `query.len()` doesn't match this
    /// database's dimension.
    pub fn search(&self, query: &[f32], top_k: usize, min_similarity: f32) -> Result<Vec<SearchHit>> {
        if top_k == 0 || top_k > MAX_TOP_K {
            return Err(Error::InvalidArgument(format!(
                "top_k must be in (0, {MAX_TOP_K}]"
            )));
        }
        if !(-1.0..=1.0).contains(&min_similarity) {
            return Err(Error::InvalidArgument(
                "min_similarity must be in [-1.0, 1.0]".to_string(),
            ));
        }
        let _store_guard = self.store.read_lock();
        if query.len() != self.store.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.store.dimension(),
                actual: query.len(),
            });
        }

        let ef = DEFAULT_EF_MULTIPLIER * top_k;
        match self.index.search(query, top_k, ef) {
            Ok(hits) if !hits.is_empty() => Ok(hits
                .into_iter()
                .filter(|(_, sim)| min_similarity == 0.0 || *sim >= min_similarity)
                .map(|(id, sim)| SearchHit::new(id, sim))
                .collect()),
            _ => self.store.brute_force_search(query, top_k, min_similarity),
        }
    }

    /// Like [`Database::search`], but also attaches each hit's own payload
    /// (one extra positioned read per hit beyond what `search` already
    /// does).
    ///
    /// # Errors
    ///
    /// Same as [`Database::search`].
    pub fn search_with_vectors(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = self.search(query, top_k, min_similarity)?;
        for hit in &mut hits {
            if let Ok(vector) = self.store.get(hit.id) {
                hit.vector = Some(vector.data);
            }
        }
        Ok(hits)
    }

    /// Database statistics: live vector count, on-disk size, dimension,
    /// metric, and backing file path.
    #[must_use]
    pub fn stats(&self) -> DatabaseStats {
        let total_size_bytes = self.store.size_bytes().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to read backing file size for stats");
            0
        });
        DatabaseStats {
            vector_count: self.store.vector_count(),
            total_size_bytes,
            dimension: self.store.dimension(),
            metric: self.store.metric(),
            path: self.store.path().to_path_buf(),
        }
    }
}

/// A snapshot of a database's summary statistics.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Number of live vectors.
    pub vector_count: u64,
    /// Current size of the backing file in bytes.
    pub total_size_bytes: u64,
    /// Configured dimension.
    pub dimension: usize,
    /// Configured similarity metric.
    pub metric: DistanceMetric,
    /// Path to the backing file.
    pub path: std::path::PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_insert_then_search() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.cvec"), 4, DistanceMetric::Cosine).unwrap();

        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        db.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();

        let hits = db.search(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn plain_search_leaves_vector_unset_but_with_vectors_attaches_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        let db = Database::create(&path, 4, DistanceMetric::Cosine).unwrap();
        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let plain = db.search(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert!(plain[0].vector.is_none());

        let with_vectors = db.search_with_vectors(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(with_vectors[0].vector, Some(vec![1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn stats_report_size_and_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        let db = Database::create(&path, 4, DistanceMetric::Cosine).unwrap();
        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let stats = db.stats();
        assert_eq!(stats.vector_count, 1);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.path, path);
    }

    #[test]
    fn create_from_config_applies_dimension_metric_and_tuning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        let mut config = DatabaseConfig::new(4, DistanceMetric::Cosine);
        config.hnsw.ef_search = 99;

        let db = Database::create_from_config(&path, &config).unwrap();
        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let hits = db.search(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].id, 1);

        let stats = db.stats();
        assert_eq!(stats.dimension, 4);
        assert_eq!(stats.metric, DistanceMetric::Cosine);
    }

    #[test]
    fn create_from_config_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        let config = DatabaseConfig::new(0, DistanceMetric::Cosine);

        let err = Database::create_from_config(&path, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn open_from_config_uses_persisted_header_not_config_dimension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        {
            let db = Database::create(&path, 4, DistanceMetric::Cosine).unwrap();
            db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        }

        let mut config = DatabaseConfig::new(4, DistanceMetric::Cosine);
        config.hnsw.ef_search = 7;
        let db = Database::open_from_config(&path, &config).unwrap();
        assert_eq!(db.stats().vector_count, 1);
    }

    #[test]
    fn reopen_replays_existing_vectors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        {
            let db = Database::create(&path, 4, DistanceMetric::Cosine).unwrap();
            db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
            db.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.stats().vector_count, 2);
        let hits = db.search(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.cvec"), 4, DistanceMetric::Cosine).unwrap();
        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        db.delete(1).unwrap();
        assert!(db.get(1).is_err());
    }

    #[test]
    fn zero_top_k_is_invalid_argument() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.cvec"), 4, DistanceMetric::Cosine).unwrap();
        let err = db.search(&[1.0, 0.0, 0.0, 0.0], 0, 0.0).unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }

    #[test]
    fn top_k_above_the_ceiling_is_invalid_argument() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.cvec"), 4, DistanceMetric::Cosine).unwrap();
        let err = db
            .search(&[1.0, 0.0, 0.0, 0.0], MAX_TOP_K + 1, 0.0)
            .unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }

    #[test]
    fn scenario_unit_axes_and_near_neighbor_rank_first() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.cvec"), 4, DistanceMetric::Cosine).unwrap();
        db.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        db.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        db.insert(3, &[0.0, 0.0, 1.0, 0.0]).unwrap();
        db.insert(4, &[0.0, 0.0, 0.0, 1.0]).unwrap();
        db.insert(5, &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let hits = db.search(&[1.0, 0.0, 0.0, 0.0], 2, 0.0).unwrap();
        assert_eq!(hits[0].id, 1);
        assert!(hits[0].similarity >= 0.999);
        assert_eq!(hits[1].id, 5);
        assert!(hits[1].similarity >= 0.98);
    }

    #[test]
    fn scenario_ten_vector_comprehensive_axes_rank_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cvec");
        let db = Database::create(&path, 4, DistanceMetric::Cosine).unwrap();
        let vectors: [[f32; 4]; 10] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.9, 0.1, 0.0, 0.0],
            [0.8, 0.2, 0.0, 0.0],
            [0.1, 0.9, 0.0, 0.0],
            [0.5, 0.5, 0.0, 0.0],
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
        ];
        for (i, v) in vectors.iter().enumerate() {
            db.insert(i as u64 + 1, v).unwrap();
        }

        for (axis, expected_id) in [
            ([1.0, 0.0, 0.0, 0.0], 1u64),
            ([0.0, 1.0, 0.0, 0.0], 2u64),
            ([0.0, 0.0, 1.0, 0.0], 3u64),
            ([0.0, 0.0, 0.0, 1.0], 4u64),
        ] {
            let hits = db.search(&axis, 1, 0.0).unwrap();
            assert_eq!(hits[0].id, expected_id);
        }

        db.delete(10).unwrap();
        assert_eq!(db.stats().vector_count, 9);
        assert!(db.get(10).is_err());

        let before: std::collections::HashSet<u64> = db
            .search(&[1.0, 0.0, 0.0, 0.0], 3, 0.0)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        let after: std::collections::HashSet<u64> = reopened
            .search(&[1.0, 0.0, 0.0, 0.0], 3, 0.0)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(before, after);
    }
}
