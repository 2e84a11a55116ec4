//! Hierarchical Navigable Small World graph: the approximate nearest-neighbor
//! index backing vector search.
//!
//! The graph is a flat table of node slots rather than an owned tree of
//! linked nodes, which sidesteps the aliasing problems a graph-of-Rc/RefCell
//! would run into. Removal tombstones a slot (`nodes[slot] = None`) rather
//! than compacting the table, so slot indices are stable for the lifetime of
//! the index; [`HnswIndex::save`]/[`HnswIndex::load`] is the only place slots
//! get renumbered, since a freshly loaded index has no reason to carry dead
//! slots forward.

mod persistence;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::config::HnswTuning;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::priority_queue::{HeapDirection, PriorityQueue};

pub use persistence::MAGIC;

/// Hard ceiling on a node's level. Matches the level at which the geometric
/// level-assignment draw is truncated regardless of how many times in a row
/// the coin comes up heads.
pub const MAX_LEVEL: usize = 16;

#[derive(Debug, Clone)]
struct Node {
    id: u64,
    level: usize,
    data: Vec<f32>,
    /// `neighbors[level]` is the neighbor-slot list at that level; its
    /// length never exceeds `2*M` at level 0 or `M` above it.
    neighbors: Vec<Vec<u32>>,
}

#[derive(Debug)]
struct GraphState {
    nodes: Vec<Option<Node>>,
    entry_point: Option<u32>,
    max_level: usize,
    checksum: u32,
    last_modified: u64,
}

impl GraphState {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            checksum: 0,
            last_modified: current_timestamp(),
        }
    }
}

/// Runtime statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HnswStats {
    /// Total node slots, live and tombstoned.
    pub node_count: usize,
    /// Live (non-tombstoned) node count.
    pub live_count: usize,
    /// Highest level any live node occupies.
    pub max_level: usize,
    /// Searches served since the index was created or loaded.
    pub search_count: u64,
    /// Vectors inserted since the index was created or loaded.
    pub insert_count: u64,
    /// Vectors removed since the index was created or loaded.
    pub delete_count: u64,
    /// XOR checksum over node count, configuration, and per-node id/level,
    /// refreshed on every successful mutation.
    pub checksum: u32,
    /// Unix timestamp (seconds) of the last mutation.
    pub last_modified: u64,
}

/// The HNSW approximate nearest-neighbor graph.
///
/// Every mutation (`insert`, `remove`) takes the graph's single write lock;
/// `search` takes only a read lock, so searches never block each other. The
/// two-lock split the underlying algorithm is usually described with
/// (a construction-time write mutex and a separate search read-write lock)
/// collapses to one `RwLock` here: Rust's aliasing rules don't allow two
/// independent lock objects to guard the same data soundly, and a single
/// `RwLock` preserves the same observable behavior (writers exclude
/// everyone, readers run concurrently with each other).
pub struct HnswIndex {
    dimension: usize,
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f32,
    state: RwLock<GraphState>,
    rng_state: AtomicU64,
    is_corrupted: AtomicBool,
    search_count: AtomicU64,
    insert_count: AtomicU64,
    delete_count: AtomicU64,
}

impl HnswIndex {
    /// Creates an empty index for vectors of the given `dimension`, compared
    /// under `metric` and tuned by `tuning`.
    #[must_use]
    pub fn new(dimension: usize, metric: DistanceMetric, tuning: HnswTuning) -> Self {
        Self {
            dimension,
            metric,
            m: tuning.m.max(1),
            ef_construction: tuning.ef_construction.max(1),
            ef_search: tuning.ef_search.max(1),
            level_mult: if tuning.level_mult > 0.0 {
                tuning.level_mult
            } else {
                1.0 / std::f32::consts::LN_2
            },
            state: RwLock::new(GraphState::new()),
            rng_state: AtomicU64::new(0x9E37_79B9_7F4A_7C15 ^ current_timestamp()),
            is_corrupted: AtomicBool::new(false),
            search_count: AtomicU64::new(0),
            insert_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        }
    }

    /// Dimension every vector in this index must match.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The metric used to rank candidates.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn max_connections(&self, level: usize) -> usize {
        if level == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    /// xorshift64*, seeded once at construction. Kept as a field of the
    /// index rather than a process-global generator so two indexes never
    /// share (or contend on) the same stream.
    fn next_u64(&self) -> u64 {
        let mut x = self.rng_state.load(Ordering::Relaxed);
        if x == 0 {
            x = 0x9E37_79B9_7F4A_7C15;
        }
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state.store(x, Ordering::Relaxed);
        x
    }

    fn next_uniform(&self) -> f32 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Draws a level via repeated uniform sampling against `1/level_mult`,
    /// the standard geometric level-assignment used to keep each layer
    /// roughly `level_mult` times sparser than the one below it.
    fn random_level(&self) -> usize {
        let threshold = 1.0 / f64::from(self.level_mult);
        let mut level = 0usize;
        while self.next_uniform() < threshold && level < MAX_LEVEL - 1 {
            level += 1;
        }
        level
    }

    fn compute_checksum(&self, state: &GraphState) -> u32 {
        let mut checksum = state.nodes.len() as u32;
        checksum ^= self.dimension as u32;
        checksum ^= self.metric.to_wire();
        checksum ^= self.m as u32;
        checksum ^= state.max_level as u32;
        for node in state.nodes.iter().flatten() {
            checksum ^= node.id as u32;
            checksum ^= node.level as u32;
        }
        checksum
    }

    fn ensure_not_corrupted(&self) -> Result<()> {
        if self.is_corrupted.load(Ordering::Acquire) {
            return Err(Error::DatabaseCorrupt(
                "HNSW index failed its last integrity check; call repair() first".to_string(),
            ));
        }
        Ok(())
    }

    /// Inserts `data` under `id`. `id` is the caller's own identifier, not a
    /// slot index; it is opaque to the graph beyond being returned from
    /// searches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `data.len()` doesn't match
    /// this index's configured dimension, or [`Error::DatabaseCorrupt`] if
    /// the index failed a prior integrity check.
    pub fn insert(&self, id: u64, data: &[f32]) -> Result<()> {
        if data.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: data.len(),
            });
        }
        self.ensure_not_corrupted()?;

        let mut state = self.state.write();
        let level = self.random_level();
        let node_id = u32::try_from(state.nodes.len())
            .map_err(|_| Error::InvalidArgument("node table exceeds u32 capacity".to_string()))?;
        state.nodes.push(Some(Node {
            id,
            level,
            data: data.to_vec(),
            neighbors: vec![Vec::new(); level + 1],
        }));

        if state.entry_point.is_none() {
            state.entry_point = Some(node_id);
            state.max_level = level;
        } else {
            if state.nodes.len() <= 5 {
                self.connect_bootstrap(&mut state, node_id);
            } else {
                self.connect_general(&mut state, node_id, level);
            }
            if level > state.max_level {
                state.entry_point = Some(node_id);
                state.max_level = level;
            }
        }

        state.checksum = self.compute_checksum(&state);
        state.last_modified = current_timestamp();
        self.insert_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Connects a new node to every other live node at every level they
    /// share. Used only while the graph has five or fewer node slots, where
    /// a full frontier search would find nothing useful to descend through
    /// anyway.
    fn connect_bootstrap(&self, state: &mut GraphState, node_id: u32) {
        let new_level = state.nodes[node_id as usize].as_ref().unwrap().level;
        for other in 0..node_id {
            let Some(other_level) = state.nodes[other as usize].as_ref().map(|n| n.level) else {
                continue;
            };
            let shared = new_level.min(other_level);
            for level in 0..=shared {
                let cap = self.max_connections(level);
                let new_node = state.nodes[node_id as usize].as_mut().unwrap();
                if new_node.neighbors[level].len() < cap {
                    new_node.neighbors[level].push(other);
                }
                let other_node = state.nodes[other as usize].as_mut().unwrap();
                if other_node.neighbors[level].len() < cap {
                    other_node.neighbors[level].push(node_id);
                }
            }
        }
    }

    /// Frontier search down from the current entry point, then "simple"
    /// neighbor selection and bidirectional linking at each level from
    /// `level` down to 0.
    fn connect_general(&self, state: &mut GraphState, node_id: u32, level: usize) {
        let query = state.nodes[node_id as usize].as_ref().unwrap().data.clone();
        let entry = state.entry_point.unwrap();
        let entry_sim = self
            .metric
            .similarity(&query, &state.nodes[entry as usize].as_ref().unwrap().data);
        let mut frontier = vec![(entry, entry_sim)];

        for lvl in (level + 1..=state.max_level).rev() {
            frontier = search_layer(&state.nodes, self.metric, &query, &frontier, 1, lvl);
        }

        for lvl in (0..=level).rev() {
            let width = if lvl == 0 { self.ef_construction } else { self.m };
            let candidates = search_layer(&state.nodes, self.metric, &query, &frontier, width, lvl);
            self.select_and_connect(state, node_id, &candidates, lvl);
            frontier = candidates;
        }
    }

    /// Adds edges from `node_id` to up to `M` of the closest `candidates`
    /// (already sorted closest-first), skipping self and already-connected
    /// targets. Each reverse edge is added only if the candidate has spare
    /// capacity at that level; no existing edge is ever pruned to make room.
    fn select_and_connect(
        &self,
        state: &mut GraphState,
        node_id: u32,
        candidates: &[(u32, f32)],
        level: usize,
    ) {
        let own_cap = self.max_connections(level);
        let mut selected = 0usize;
        for &(candidate_id, _) in candidates {
            if selected >= self.m {
                break;
            }
            if candidate_id == node_id {
                continue;
            }
            if state.nodes[candidate_id as usize].is_none() {
                continue;
            }

            let already_linked = state.nodes[node_id as usize]
                .as_ref()
                .unwrap()
                .neighbors
                .get(level)
                .is_some_and(|n| n.contains(&candidate_id));
            if already_linked {
                continue;
            }

            {
                let new_node = state.nodes[node_id as usize].as_mut().unwrap();
                if new_node.neighbors[level].len() >= own_cap {
                    break;
                }
                new_node.neighbors[level].push(candidate_id);
            }
            selected += 1;

            let candidate_cap = self.max_connections(level);
            if let Some(candidate_node) = state.nodes[candidate_id as usize].as_mut() {
                if level < candidate_node.neighbors.len()
                    && candidate_node.neighbors[level].len() < candidate_cap
                    && !candidate_node.neighbors[level].contains(&node_id)
                {
                    candidate_node.neighbors[level].push(node_id);
                }
            }
        }
    }

    /// Removes the vector stored under `id`.
    ///
    /// The slot is tombstoned, not compacted: every other live node's
    /// neighbor lists are purged of the removed slot, and if it was the
    /// entry point a fresh one is chosen by rescanning for the highest
    /// surviving level (ties favor the later slot, matching the forward
    /// `>=` rescan this is ported from).
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorNotFound`] if no live node carries `id`.
    pub fn remove(&self, id: u64) -> Result<()> {
        self.ensure_not_corrupted()?;
        let mut state = self.state.write();
        let Some(slot) = state
            .nodes
            .iter()
            .position(|n| n.as_ref().is_some_and(|node| node.id == id))
        else {
            return Err(Error::VectorNotFound(id));
        };
        let slot = slot as u32;

        for node in state.nodes.iter_mut().flatten() {
            for level_neighbors in &mut node.neighbors {
                level_neighbors.retain(|&n| n != slot);
            }
        }
        state.nodes[slot as usize] = None;

        if state.entry_point == Some(slot) {
            rescan_entry_point(&mut state);
        }

        state.checksum = self.compute_checksum(&state);
        state.last_modified = current_timestamp();
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Searches for the `top_k` vectors most similar to `query`, exploring a
    /// candidate frontier of width `ef` at level 0 (the caller typically
    /// passes `max(ef_search, top_k)` or a search-time override).
    ///
    /// Returns an empty vector, not an error, if the index holds no live
    /// vectors yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `query.len()` doesn't match
    /// this index's dimension, [`Error::InvalidArgument`] if `top_k` is
    /// zero, or [`Error::DatabaseCorrupt`] if the index failed a prior
    /// integrity check.
    pub fn search(&self, query: &[f32], top_k: usize, ef: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be >= 1".to_string()));
        }
        self.ensure_not_corrupted()?;

        let state = self.state.read();
        self.search_count.fetch_add(1, Ordering::Relaxed);

        let Some(entry) = state.entry_point else {
            return Ok(Vec::new());
        };
        let entry_sim = self
            .metric
            .similarity(query, &state.nodes[entry as usize].as_ref().unwrap().data);
        let mut frontier = vec![(entry, entry_sim)];

        for lvl in (1..=state.max_level).rev() {
            frontier = search_layer(&state.nodes, self.metric, query, &frontier, 1, lvl);
        }

        let width = ef.max(top_k).max(self.ef_search);
        let mut results = search_layer(&state.nodes, self.metric, query, &frontier, width, 0);
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results
            .into_iter()
            .map(|(slot, sim)| (state.nodes[slot as usize].as_ref().unwrap().id, sim))
            .collect())
    }

    /// Checks every node's dimension, level, and neighbor-list invariants,
    /// and that the entry point (if any) points at a live node. Returns on
    /// the first violation found rather than collecting every defect, and
    /// marks the index corrupted (blocking further mutation/search until
    /// [`HnswIndex::repair`] clears it) when it finds one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseCorrupt`] describing the first violation
    /// found, if any.
    pub fn validate(&self) -> Result<()> {
        let state = self.state.read();
        self.validate_locked(&state)
    }

    fn validate_locked(&self, state: &GraphState) -> Result<()> {
        if self.is_corrupted.load(Ordering::Acquire) {
            return Err(Error::DatabaseCorrupt(
                "index already flagged corrupted".to_string(),
            ));
        }

        let mut any_live = false;
        for (slot, maybe_node) in state.nodes.iter().enumerate() {
            let Some(node) = maybe_node else { continue };
            any_live = true;

            if node.data.len() != self.dimension {
                self.is_corrupted.store(true, Ordering::Release);
                return Err(Error::DatabaseCorrupt(format!(
                    "node at slot {slot} has dimension {} but index dimension is {}",
                    node.data.len(),
                    self.dimension
                )));
            }
            if node.level >= MAX_LEVEL {
                self.is_corrupted.store(true, Ordering::Release);
                return Err(Error::DatabaseCorrupt(format!(
                    "node at slot {slot} has level {} >= MAX_LEVEL", node.level
                )));
            }
            if node.neighbors.len() != node.level + 1 {
                self.is_corrupted.store(true, Ordering::Release);
                return Err(Error::DatabaseCorrupt(format!(
                    "node at slot {slot} has {} neighbor levels but level {}",
                    node.neighbors.len(),
                    node.level
                )));
            }
            for (level, neighbors) in node.neighbors.iter().enumerate() {
                if neighbors.len() > self.max_connections(level) {
                    self.is_corrupted.store(true, Ordering::Release);
                    return Err(Error::DatabaseCorrupt(format!(
                        "node at slot {slot} level {level} exceeds its connection cap"
                    )));
                }
                for &target in neighbors {
                    if target as usize >= state.nodes.len() || state.nodes[target as usize].is_none() {
                        self.is_corrupted.store(true, Ordering::Release);
                        return Err(Error::DatabaseCorrupt(format!(
                            "node at slot {slot} level {level} references invalid slot {target}"
                        )));
                    }
                }
            }
        }

        match state.entry_point {
            Some(ep) => {
                if ep as usize >= state.nodes.len() || state.nodes[ep as usize].is_none() {
                    self.is_corrupted.store(true, Ordering::Release);
                    return Err(Error::DatabaseCorrupt(
                        "entry point references a dead or out-of-range slot".to_string(),
                    ));
                }
            }
            None if any_live => {
                self.is_corrupted.store(true, Ordering::Release);
                return Err(Error::DatabaseCorrupt(
                    "index has live nodes but no entry point".to_string(),
                ));
            }
            None => {}
        }

        Ok(())
    }

    /// Repairs what [`HnswIndex::validate`] can detect: an invalid entry
    /// point is rescanned, and every node's neighbor lists are compacted in
    /// place to drop references to dead or out-of-range slots, preserving
    /// the remaining order. A clean index is left untouched. Re-validates
    /// before returning, so the return value reflects whether the index is
    /// actually clean afterward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseCorrupt`] if the index is still not clean
    /// after the repair pass (a defect this function doesn't know how to
    /// fix).
    pub fn repair(&self) -> Result<()> {
        {
            let state = self.state.read();
            if self.validate_locked(&state).is_ok() {
                return Ok(());
            }
        }

        let mut state = self.state.write();
        self.is_corrupted.store(false, Ordering::Release);
        let mut repairs = 0usize;

        let entry_valid = state
            .entry_point
            .is_some_and(|ep| (ep as usize) < state.nodes.len() && state.nodes[ep as usize].is_some());
        if !entry_valid {
            rescan_entry_point(&mut state);
            repairs += 1;
        }

        let live: Vec<bool> = state.nodes.iter().map(Option::is_some).collect();
        for node in state.nodes.iter_mut().flatten() {
            for neighbors in &mut node.neighbors {
                let before = neighbors.len();
                neighbors.retain(|&t| (t as usize) < live.len() && live[t as usize]);
                repairs += before - neighbors.len();
            }
        }

        if repairs > 0 {
            state.checksum = self.compute_checksum(&state);
            state.last_modified = current_timestamp();
        }
        drop(state);

        let state = self.state.read();
        self.validate_locked(&state)
    }

    /// Current runtime statistics.
    #[must_use]
    pub fn stats(&self) -> HnswStats {
        let state = self.state.read();
        HnswStats {
            node_count: state.nodes.len(),
            live_count: state.nodes.iter().filter(|n| n.is_some()).count(),
            max_level: state.max_level,
            search_count: self.search_count.load(Ordering::Relaxed),
            insert_count: self.insert_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            checksum: state.checksum,
            last_modified: state.last_modified,
        }
    }
}

/// Rescans every live node for the highest level, favoring the
/// later-encountered slot on ties (mirrors a forward `>=` comparison), and
/// installs it as the new entry point. Clears `entry_point`/`max_level` if
/// nothing is left alive.
fn rescan_entry_point(state: &mut GraphState) {
    let mut best: Option<(u32, usize)> = None;
    for (slot, maybe_node) in state.nodes.iter().enumerate() {
        if let Some(node) = maybe_node {
            if best.is_none_or(|(_, level)| node.level >= level) {
                best = Some((slot as u32, node.level));
            }
        }
    }
    match best {
        Some((slot, level)) => {
            state.entry_point = Some(slot);
            state.max_level = level;
        }
        None => {
            state.entry_point = None;
            state.max_level = 0;
        }
    }
}

/// Best-first search of a single graph layer.
///
/// `entry_points` seeds both the exploration frontier and the result set.
/// The frontier is explored best-first (a max-heap on similarity); the
/// result set is bounded to `ef` and ordered so the worst-kept candidate
/// sits at the root, ready to be evicted the moment something closer turns
/// up. Exploration stops once the best remaining frontier candidate is
/// worse than the worst kept result and the result set is full, the
/// standard early-termination condition for this search.
fn search_layer(
    nodes: &[Option<Node>],
    metric: DistanceMetric,
    query: &[f32],
    entry_points: &[(u32, f32)],
    ef: usize,
    level: usize,
) -> Vec<(u32, f32)> {
    let cap = ef.max(1).max(entry_points.len());
    let mut visited: FxHashSet<u32> = FxHashSet::default();
    let mut frontier = PriorityQueue::new(nodes.len().max(cap), HeapDirection::Max);
    let mut results = PriorityQueue::new(cap, HeapDirection::Min);

    for &(id, sim) in entry_points {
        if visited.insert(id) {
            let _ = frontier.push(id, sim);
            if results.is_full() {
                results.pop();
            }
            let _ = results.push(id, sim);
        }
    }

    while let Some((current_id, current_sim)) = frontier.pop() {
        if results.len() >= ef {
            if let Some(worst) = results.peek_distance() {
                if current_sim < worst {
                    break;
                }
            }
        }

        let Some(node) = nodes.get(current_id as usize).and_then(Option::as_ref) else {
            continue;
        };
        if level >= node.neighbors.len() {
            continue;
        }

        for &neighbor_id in &node.neighbors[level] {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let Some(neighbor) = nodes.get(neighbor_id as usize).and_then(Option::as_ref) else {
                continue;
            };
            let sim = metric.similarity(query, &neighbor.data);

            let worth_exploring =
                results.len() < ef || results.peek_distance().is_some_and(|worst| sim > worst);
            if worth_exploring {
                let _ = frontier.push(neighbor_id, sim);
                if results.is_full() {
                    results.pop();
                }
                let _ = results.push(neighbor_id, sim);
            }
        }
    }

    results.drain_sorted()
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(dimension: usize) -> HnswIndex {
        HnswIndex::new(dimension, DistanceMetric::Cosine, HnswTuning::default())
    }

    #[test]
    fn insert_then_search_finds_itself() {
        let idx = index(4);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        idx.insert(3, &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let hits = idx.search(&[1.0, 0.0, 0.0, 0.0], 1, 10).unwrap();
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn search_on_empty_index_returns_empty_not_error() {
        let idx = index(4);
        let hits = idx.search(&[1.0, 0.0, 0.0, 0.0], 5, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn dimension_mismatch_on_insert_is_an_error() {
        let idx = index(4);
        let err = idx.insert(1, &[1.0, 0.0]).unwrap_err();
        assert_eq!(err.code(), "dimension-mismatch");
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let idx = index(4);
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        let err = idx.remove(999).unwrap_err();
        assert_eq!(err.code(), "vector-not-found");
    }

    #[test]
    fn remove_clears_back_references_and_entry_point_rescans() {
        let idx = index(2);
        for i in 1..=6u64 {
            idx.insert(i, &[i as f32, 0.0]).unwrap();
        }
        let before_entry = idx.state.read().entry_point.unwrap();
        idx.remove(
            idx.state.read().nodes[before_entry as usize]
                .as_ref()
                .unwrap()
                .id,
        )
        .unwrap();
        assert!(idx.validate().is_ok());
        let stats = idx.stats();
        assert_eq!(stats.live_count, 5);
    }

    #[test]
    fn validate_passes_on_freshly_built_graph() {
        let idx = index(3);
        for i in 1..=20u64 {
            idx.insert(i, &[i as f32, (i * 2) as f32, 1.0]).unwrap();
        }
        assert!(idx.validate().is_ok());
    }

    #[test]
    fn repair_is_a_no_op_on_a_clean_index() {
        let idx = index(3);
        idx.insert(1, &[1.0, 2.0, 3.0]).unwrap();
        assert!(idx.repair().is_ok());
        assert_eq!(idx.stats().insert_count, 1);
    }

    #[test]
    fn recall_at_ten_on_random_vectors_is_reasonably_high() {
        let dim = 128;
        let idx = HnswIndex::new(dim, DistanceMetric::Cosine, HnswTuning::default());
        let mut rng = 0x1234_5678_9abc_def0u64;
        let mut next = || {
            rng ^= rng << 13;
            rng ^= rng >> 7;
            rng ^= rng << 17;
            (rng >> 11) as f64 / (1u64 << 53) as f64
        };
        let vectors: Vec<Vec<f32>> = (0..1000)
            .map(|_| (0..dim).map(|_| next() as f32 - 0.5).collect())
            .collect();
        for (i, v) in vectors.iter().enumerate() {
            idx.insert(i as u64 + 1, v).unwrap();
        }

        let queries = 50;
        let mut total_recall = 0.0f64;
        for q in 0..queries {
            let query = &vectors[q * 37 % vectors.len()];
            let mut brute: Vec<(u64, f32)> = vectors
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64 + 1, DistanceMetric::Cosine.similarity(query, v)))
                .collect();
            brute.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            let truth: FxHashSet<u64> = brute.iter().take(10).map(|(id, _)| *id).collect();

            let hits = idx.search(query, 10, 50).unwrap();
            let found = hits.iter().filter(|(id, _)| truth.contains(id)).count();
            total_recall += found as f64 / 10.0;
        }
        let recall_at_10 = total_recall / f64::from(queries as u32);
        assert!(recall_at_10 >= 0.9, "recall@10 = {recall_at_10}");
    }
}
