//! On-disk vector store: an append-only record log with an in-memory
//! separate-chaining id index, plus a brute-force search fallback.
//!
//! ```text
//! file layout:
//!   header (80 bytes, offset 0):
//!     magic          u32 le   0x4356_4543 ("CVEC")
//!     version        u32 le
//!     dimension      u32 le
//!     metric         u32 le   DistanceMetric::to_wire()
//!     vector_count   u64 le   live record count, refreshed on close
//!     next_id        u64 le   highest id ever inserted, plus one
//!     created        u64 le   unix seconds, set once at creation
//!     modified       u64 le   unix seconds, refreshed on close
//!     reserved       32 bytes, zeroed
//!   record (28 + 4*dimension bytes, repeated):
//!     id             u64 le
//!     dimension      u32 le   redundant with the header; checked on read
//!     timestamp      u64 le
//!     deletion_flag  u8
//!     reserved       7 bytes, zeroed
//!     data           dimension * f32 le
//! ```
//!
//! Deletes never remove or shift bytes: they flip the `deletion_flag` byte
//! of the existing record in place and mark the in-memory index entry dead,
//! leaving space reclamation to a future compaction pass (explicitly out of
//! scope here).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::MAX_DIMENSION;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::vector::{SearchHit, Vector};

/// Magic number identifying a vector store file.
pub const MAGIC: u32 = 0x4356_4543;
const FILE_VERSION: u32 = 1;
const HEADER_RESERVED: usize = 32;
const HEADER_SIZE: u64 = 48 + HEADER_RESERVED as u64;
const RECORD_RESERVED: usize = 7;
// id(8) + dimension(4) + timestamp(8) + deletion_flag(1) + reserved(7)
const RECORD_HEADER_SIZE: u64 = 21 + RECORD_RESERVED as u64;

/// Number of buckets in the in-memory id index. Prime, to spread
/// sequentially-assigned ids across buckets.
const HASH_TABLE_SIZE: usize = 10_007;
/// A chain longer than this logs a warning instead of silently scanning
/// forever; it never aborts the lookup.
const HASH_CHAIN_SAFETY_LIMIT: usize = 1000;

pub(crate) struct HashEntry {
    id: u64,
    offset: u64,
    is_deleted: bool,
}

fn bucket_of(id: u64) -> usize {
    (id % HASH_TABLE_SIZE as u64) as usize
}

fn hash_find(table: &[Vec<HashEntry>], id: u64) -> Option<u64> {
    let chain = &table[bucket_of(id)];
    if chain.len() > HASH_CHAIN_SAFETY_LIMIT {
        tracing::warn!(
            chain_len = chain.len(),
            "id index chain exceeds safety bound; possible corruption"
        );
    }
    chain
        .iter()
        .take(HASH_CHAIN_SAFETY_LIMIT)
        .find(|e| e.id == id && !e.is_deleted)
        .map(|e| e.offset)
}

fn hash_insert(table: &mut [Vec<HashEntry>], id: u64, offset: u64) {
    table[bucket_of(id)].insert(
        0,
        HashEntry {
            id,
            offset,
            is_deleted: false,
        },
    );
}

fn hash_mark_deleted(table: &mut [Vec<HashEntry>], id: u64) {
    if let Some(entry) = table[bucket_of(id)]
        .iter_mut()
        .find(|e| e.id == id && !e.is_deleted)
    {
        entry.is_deleted = true;
    }
}

fn new_hash_table() -> Vec<Vec<HashEntry>> {
    std::iter::repeat_with(Vec::new).take(HASH_TABLE_SIZE).collect()
}

struct FileHeader {
    dimension: u32,
    metric: u32,
    vector_count: u64,
    next_id: u64,
    created: u64,
    modified: u64,
}

impl FileHeader {
    fn write_to(&self, file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&MAGIC.to_le_bytes())?;
        file.write_all(&FILE_VERSION.to_le_bytes())?;
        file.write_all(&self.dimension.to_le_bytes())?;
        file.write_all(&self.metric.to_le_bytes())?;
        file.write_all(&self.vector_count.to_le_bytes())?;
        file.write_all(&self.next_id.to_le_bytes())?;
        file.write_all(&self.created.to_le_bytes())?;
        file.write_all(&self.modified.to_le_bytes())?;
        file.write_all(&[0u8; HEADER_RESERVED])?;
        Ok(())
    }

    fn read_from(file: &mut File) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut buf)?;
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::DatabaseCorrupt(format!(
                "bad vector store magic: {magic:#010x}"
            )));
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FILE_VERSION {
            return Err(Error::DatabaseCorrupt(format!(
                "unsupported vector store version: {version}"
            )));
        }
        Ok(Self {
            dimension: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            metric: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            vector_count: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            next_id: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            created: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            modified: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
        })
    }
}

fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(buf, offset)
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        let mut read = 0usize;
        while read < buf.len() {
            let n = file.seek_read(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
            }
            read += n;
        }
        Ok(())
    }
}

fn decode_record_header(buf: &[u8]) -> (u64, u32, u64, bool) {
    let id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let dimension = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let timestamp = u64::from_le_bytes(buf[12..20].try_into().unwrap());
    let is_deleted = buf[20] != 0;
    (id, dimension, timestamp, is_deleted)
}

fn decode_payload(buf: &[u8]) -> Vec<f32> {
    buf.chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// An append-only on-disk vector store with an in-memory id index.
///
/// Every mutating call (`insert`, `delete`) takes the store's single write
/// mutex, which also serializes header rewrites. `get` takes no lock around
/// the file read itself: it performs a positioned read (`pread`/
/// `seek_read`) through an independent read handle, which the OS guarantees
/// is race-free without any of the store's own synchronization. Looking up
/// the id index still takes a brief read lock, since unlike a raw pointer
/// dereference, mutating a `Vec` concurrently with a read is unsound in
/// Rust regardless of what the file underneath is doing.
pub struct VectorStore {
    dimension: usize,
    metric: DistanceMetric,
    write_file: Mutex<File>,
    read_handle: File,
    hash_table: RwLock<Vec<Vec<HashEntry>>>,
    vector_count: AtomicU64,
    next_id: AtomicU64,
    created: u64,
    path: std::path::PathBuf,
}

impl VectorStore {
    /// Creates a new store file at `path`. Fails if a file already exists
    /// there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `dimension` is zero or exceeds
    /// [`MAX_DIMENSION`], or [`Error::FileIo`] if the file already exists or
    /// can't be created.
    pub fn create<P: AsRef<Path>>(path: P, dimension: usize, metric: DistanceMetric) -> Result<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(Error::InvalidArgument(format!(
                "dimension must be in [1, {MAX_DIMENSION}]"
            )));
        }
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::FileIo(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let created = current_timestamp();
        let header = FileHeader {
            dimension: dimension as u32,
            metric: metric.to_wire(),
            vector_count: 0,
            next_id: 0,
            created,
            modified: created,
        };
        header.write_to(&mut file)?;
        file.flush()?;
        let read_handle = file.try_clone()?;

        Ok(Self {
            dimension,
            metric,
            write_file: Mutex::new(file),
            read_handle,
            hash_table: RwLock::new(new_hash_table()),
            vector_count: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            created,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing store file at `path`. Callers should follow this
    /// with [`VectorStore::replay`] to populate the in-memory id index (and
    /// rebuild an HNSW index, as [`crate::Database::open`] does).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseNotFound`] if `path` doesn't exist, or
    /// [`Error::DatabaseCorrupt`] if the header is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::DatabaseNotFound(path.display().to_string()));
        }
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let header = FileHeader::read_from(&mut file)?;
        let metric = DistanceMetric::from_wire(header.metric).ok_or_else(|| {
            Error::DatabaseCorrupt(format!("unrecognized metric {} in header", header.metric))
        })?;
        let read_handle = file.try_clone()?;

        Ok(Self {
            dimension: header.dimension as usize,
            metric,
            write_file: Mutex::new(file),
            read_handle,
            hash_table: RwLock::new(new_hash_table()),
            vector_count: AtomicU64::new(0),
            next_id: AtomicU64::new(header.next_id),
            created: header.created,
            path: path.to_path_buf(),
        })
    }

    /// Sequentially replays every record after the header, registering live
    /// ids in the in-memory index and returning `(id, data)` for each live
    /// record so a caller can rebuild an ANN index from them. Deleted
    /// records are skipped without reading their payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if the file can't be read, or
    /// [`Error::DatabaseCorrupt`] if a record is truncated.
    pub fn replay(&mut self) -> Result<Vec<(u64, Vec<f32>)>> {
        let mut file = self.write_file.lock();
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hash_table = self.hash_table.write();
        let mut out = Vec::new();
        let mut live_count = 0u64;

        loop {
            let offset = file.stream_position()?;
            let mut header_buf = [0u8; RECORD_HEADER_SIZE as usize];
            match file.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let (id, record_dimension, timestamp, is_deleted) = decode_record_header(&header_buf);
            let payload_len = self.dimension * 4;
            if record_dimension as usize != self.dimension {
                return Err(Error::DatabaseCorrupt(format!(
                    "record {id} has dimension {record_dimension}, expected {}",
                    self.dimension
                )));
            }

            if is_deleted {
                file.seek(SeekFrom::Current(payload_len as i64))?;
                continue;
            }

            let mut payload = vec![0u8; payload_len];
            file.read_exact(&mut payload).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Error::DatabaseCorrupt(format!(
                        "truncated record for id {id} at offset {offset}"
                    ))
                } else {
                    Error::FileIo(e)
                }
            })?;
            let data = decode_payload(&payload);

            hash_insert(&mut hash_table, id, offset);
            live_count += 1;
            let _ = timestamp;
            out.push((id, data));
        }

        drop(hash_table);
        self.vector_count.store(live_count, Ordering::Relaxed);
        Ok(out)
    }

    /// Dimension every vector in this store must match.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The metric this store's brute-force search ranks by.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Live vector count.
    #[must_use]
    pub fn vector_count(&self) -> u64 {
        self.vector_count.load(Ordering::Relaxed)
    }

    /// Path to the store's backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the backing file in bytes, header and every record
    /// (live or tombstoned) included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if the file's metadata can't be read.
    pub fn size_bytes(&self) -> Result<u64> {
        Ok(self.write_file.lock().metadata()?.len())
    }

    /// Takes the store's read lock, without reading anything. The facade
    /// holds this for the duration of a search so a concurrent insert can't
    /// mutate the id index out from under a brute-force fallback scan.
    pub(crate) fn read_lock(&self) -> RwLockReadGuard<'_, Vec<Vec<HashEntry>>> {
        self.hash_table.read()
    }

    /// Inserts `data` under `id`. `id == 0` is reserved and invalid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `data.len()` doesn't match
    /// this store's dimension, or [`Error::InvalidArgument`] if `id == 0`
    /// or a live vector already carries `id`.
    pub fn insert(&self, id: u64, data: &[f32]) -> Result<()> {
        if data.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: data.len(),
            });
        }
        if id == 0 {
            return Err(Error::InvalidArgument("id 0 is reserved".to_string()));
        }

        let mut file = self.write_file.lock();
        if hash_find(&self.hash_table.read(), id).is_some() {
            return Err(Error::InvalidArgument(format!(
                "vector {id} already exists"
            )));
        }

        let offset = file.seek(SeekFrom::End(0))?;
        let timestamp = current_timestamp();
        file.write_all(&id.to_le_bytes())?;
        file.write_all(&(self.dimension as u32).to_le_bytes())?;
        file.write_all(&timestamp.to_le_bytes())?;
        file.write_all(&[0u8])?; // deletion_flag
        file.write_all(&[0u8; RECORD_RESERVED])?;
        for &x in data {
            file.write_all(&x.to_le_bytes())?;
        }
        file.flush()?;

        hash_insert(&mut self.hash_table.write(), id, offset);
        self.vector_count.fetch_add(1, Ordering::Relaxed);
        self.next_id.fetch_max(id + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Retrieves a live vector by id. Takes no lock around the file read
    /// itself (see the type-level docs); only the id-index lookup is
    /// guarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id == 0`, or
    /// [`Error::VectorNotFound`] if no live vector carries `id`.
    pub fn get(&self, id: u64) -> Result<Vector> {
        if id == 0 {
            return Err(Error::InvalidArgument("id 0 is reserved".to_string()));
        }
        let offset = hash_find(&self.hash_table.read(), id).ok_or(Error::VectorNotFound(id))?;

        let mut header_buf = [0u8; RECORD_HEADER_SIZE as usize];
        read_at(&self.read_handle, offset, &mut header_buf)?;
        let (record_id, _record_dimension, timestamp, is_deleted) =
            decode_record_header(&header_buf);
        if is_deleted || record_id != id {
            return Err(Error::VectorNotFound(id));
        }

        let mut payload = vec![0u8; self.dimension * 4];
        read_at(&self.read_handle, offset + RECORD_HEADER_SIZE, &mut payload)?;
        Ok(Vector::new(id, decode_payload(&payload), timestamp))
    }

    /// Deletes the vector stored under `id` by flipping its `deletion_flag`
    /// byte in place, both on disk and in the in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `id == 0`, or
    /// [`Error::VectorNotFound`] if no live vector carries `id`.
    pub fn delete(&self, id: u64) -> Result<()> {
        if id == 0 {
            return Err(Error::InvalidArgument("id 0 is reserved".to_string()));
        }
        let mut file = self.write_file.lock();
        let offset = {
            let mut hash_table = self.hash_table.write();
            let offset = hash_find(&hash_table, id).ok_or(Error::VectorNotFound(id))?;
            hash_mark_deleted(&mut hash_table, id);
            offset
        };

        file.seek(SeekFrom::Start(offset + 20))?; // id(8) + dimension(4) + timestamp(8)
        file.write_all(&[1u8])?;
        file.flush()?;
        self.vector_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    /// Exhaustive scan over every live vector, used when the HNSW index has
    /// nothing to offer (empty, or erroring). `min_similarity == 0.0` means
    /// "no filter".
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if a record can't be read back.
    pub fn brute_force_search(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchHit>> {
        let live: Vec<(u64, u64)> = {
            let hash_table = self.hash_table.read();
            hash_table
                .iter()
                .flatten()
                .filter(|e| !e.is_deleted)
                .map(|e| (e.id, e.offset))
                .collect()
        };

        let mut scored = Vec::with_capacity(live.len());
        for (id, offset) in live {
            let mut payload = vec![0u8; self.dimension * 4];
            read_at(&self.read_handle, offset + RECORD_HEADER_SIZE, &mut payload)?;
            let data = decode_payload(&payload);
            let similarity = self.metric.similarity(query, &data);
            if min_similarity == 0.0 || similarity >= min_similarity {
                scored.push(SearchHit::new(id, similarity));
            }
        }
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Flushes the final header (live vector count, next id) and closes the
    /// file. Prefer this over relying on [`Drop`] when you need to observe
    /// I/O errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if the header can't be written.
    pub fn close(self) -> Result<()> {
        self.write_header()
    }

    fn write_header(&self) -> Result<()> {
        let mut file = self.write_file.lock();
        let header = FileHeader {
            dimension: self.dimension as u32,
            metric: self.metric.to_wire(),
            vector_count: self.vector_count.load(Ordering::Relaxed),
            next_id: self.next_id.load(Ordering::Relaxed),
            created: self.created,
            modified: current_timestamp(),
        };
        header.write_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Deletes a store file outright. The caller is responsible for making
    /// sure no [`VectorStore`] still has it open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIo`] if the file can't be removed.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}

impl Drop for VectorStore {
    fn drop(&mut self) {
        if let Err(err) = self.write_header() {
            tracing::error!(error = %err, "failed to flush vector store header on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_rejects_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.cvec");
        VectorStore::create(&path, 4, DistanceMetric::Cosine).unwrap();
        let err = VectorStore::create(&path, 4, DistanceMetric::Cosine).unwrap_err();
        assert_eq!(err.code(), "file-io");
    }

    #[test]
    fn insert_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = VectorStore::create(dir.path().join("a.cvec"), 3, DistanceMetric::Cosine).unwrap();
        store.insert(1, &[1.0, 2.0, 3.0]).unwrap();
        let v = store.get(1).unwrap();
        assert_eq!(v.data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_insert_is_invalid_argument() {
        let dir = tempdir().unwrap();
        let store = VectorStore::create(dir.path().join("a.cvec"), 3, DistanceMetric::Cosine).unwrap();
        store.insert(1, &[1.0, 2.0, 3.0]).unwrap();
        let err = store.insert(1, &[4.0, 5.0, 6.0]).unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
    }

    #[test]
    fn get_and_delete_of_id_zero_are_invalid_argument() {
        let dir = tempdir().unwrap();
        let store = VectorStore::create(dir.path().join("a.cvec"), 3, DistanceMetric::Cosine).unwrap();
        assert_eq!(store.get(0).unwrap_err().code(), "invalid-argument");
        assert_eq!(store.delete(0).unwrap_err().code(), "invalid-argument");
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = tempdir().unwrap();
        let store = VectorStore::create(dir.path().join("a.cvec"), 3, DistanceMetric::Cosine).unwrap();
        store.insert(1, &[1.0, 2.0, 3.0]).unwrap();
        store.delete(1).unwrap();
        assert!(store.get(1).is_err());
        assert_eq!(store.vector_count(), 0);
    }

    #[test]
    fn reopen_and_replay_recovers_live_vectors_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.cvec");
        {
            let store = VectorStore::create(&path, 2, DistanceMetric::Cosine).unwrap();
            store.insert(1, &[1.0, 0.0]).unwrap();
            store.insert(2, &[0.0, 1.0]).unwrap();
            store.delete(1).unwrap();
        }

        let mut store = VectorStore::open(&path).unwrap();
        let replayed = store.replay().unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, 2);
        assert!(store.get(1).is_err());
        assert!(store.get(2).is_ok());
    }

    #[test]
    fn brute_force_search_respects_min_similarity_filter() {
        let dir = tempdir().unwrap();
        let store = VectorStore::create(dir.path().join("a.cvec"), 2, DistanceMetric::Cosine).unwrap();
        store.insert(1, &[1.0, 0.0]).unwrap();
        store.insert(2, &[-1.0, 0.0]).unwrap();

        let all = store.brute_force_search(&[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store.brute_force_search(&[1.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }

    #[test]
    fn destroy_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.cvec");
        {
            VectorStore::create(&path, 2, DistanceMetric::Cosine).unwrap();
        }
        VectorStore::destroy(&path).unwrap();
        assert!(!path.exists());
    }
}
