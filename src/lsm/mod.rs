//! # LSM Data Model
//!
//! The simulated tree: a fixed array of [`Level`]s holding immutable
//! [`SstFile`] records, one mutable active [`Memtable`], and a queue of
//! frozen memtable sizes awaiting flush.
//!
//! ## Design Invariants
//!
//! - A file is owned by exactly one level at a time; membership is by
//!   file **id**, never by contents.
//! - `Level::total_size_mb` tracks `Σ file.size_mb` within floating
//!   epsilon; adding and removing files updates it atomically with the
//!   file list.
//! - `compacting_size_mb ≤ total_size_mb` — the compacting set is always
//!   a subset of the resident files.
//! - `next_file_id` is monotone; ids are never reused within one run.
//!
//! The tree knows nothing about events, scheduling, or metrics — the
//! simulator and the compactors mutate it through the methods here.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use tracing::trace;

// ------------------------------------------------------------------------------------------------
// SstFile
// ------------------------------------------------------------------------------------------------

/// An immutable simulated SST file.
///
/// Identity (the `id`) is what membership tests compare; two files with
/// equal sizes are still distinct files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SstFile {
    /// Unique id, allocated by [`LsmTree::alloc_file_id`].
    pub id: u64,
    /// File size, MB.
    pub size_mb: f64,
    /// Virtual time the file was created (flush or compaction output).
    pub created_at: f64,
}

// ------------------------------------------------------------------------------------------------
// Level
// ------------------------------------------------------------------------------------------------

/// One level of the tree: an ordered sequence of owned files plus
/// compaction bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct Level {
    number: usize,
    files: Vec<SstFile>,
    total_size_mb: f64,
    /// Ids of resident files currently claimed by an in-flight compaction.
    compacting: BTreeSet<u64>,
    /// Files on this level claimed as *targets* of an in-flight
    /// compaction coming from above. Drives the picker's contention gate.
    target_compacting_files: usize,
}

impl Level {
    fn new(number: usize) -> Self {
        Self {
            number,
            files: Vec::new(),
            total_size_mb: 0.0,
            compacting: BTreeSet::new(),
            target_compacting_files: 0,
        }
    }

    /// Level number, 0-based.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Resident files, oldest first.
    pub fn files(&self) -> &[SstFile] {
        &self.files
    }

    /// Number of resident files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total resident bytes, MB.
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_mb
    }

    /// True when the level holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes of resident files claimed by in-flight compactions.
    pub fn compacting_size_mb(&self) -> f64 {
        self.files
            .iter()
            .filter(|f| self.compacting.contains(&f.id))
            .map(|f| f.size_mb)
            .sum()
    }

    /// Number of resident files claimed by in-flight compactions.
    pub fn compacting_file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| self.compacting.contains(&f.id))
            .count()
    }

    /// Resident files claimed as compaction *targets*.
    pub fn target_compacting_files(&self) -> usize {
        self.target_compacting_files
    }

    /// True when `id` is resident on this level.
    pub fn contains(&self, id: u64) -> bool {
        self.files.iter().any(|f| f.id == id)
    }

    /// True when `id` is claimed by an in-flight compaction.
    pub fn is_compacting(&self, id: u64) -> bool {
        self.compacting.contains(&id)
    }

    /// Appends a file. The caller guarantees the id is not already
    /// resident anywhere in the tree.
    pub fn add_file(&mut self, file: SstFile) {
        self.total_size_mb += file.size_mb;
        self.files.push(file);
    }

    /// Removes a file by id, updating size and compaction bookkeeping
    /// atomically. Returns `None` when the id is not resident.
    pub fn remove_file(&mut self, id: u64) -> Option<SstFile> {
        let idx = self.files.iter().position(|f| f.id == id)?;
        let file = self.files.remove(idx);
        self.total_size_mb = (self.total_size_mb - file.size_mb).max(0.0);
        self.compacting.remove(&id);
        Some(file)
    }

    /// Claims a resident file for an in-flight compaction.
    pub fn mark_compacting(&mut self, id: u64) {
        if self.contains(id) {
            self.compacting.insert(id);
        }
    }

    /// Releases a compaction claim; no-op if the claim does not exist.
    pub fn unmark_compacting(&mut self, id: u64) {
        self.compacting.remove(&id);
    }

    /// Adjusts the target-claim counter; saturates at zero.
    pub fn add_target_compacting(&mut self, n: usize) {
        self.target_compacting_files += n;
    }

    /// See [`Level::add_target_compacting`].
    pub fn sub_target_compacting(&mut self, n: usize) {
        self.target_compacting_files = self.target_compacting_files.saturating_sub(n);
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable
// ------------------------------------------------------------------------------------------------

/// The mutable in-memory write buffer.
///
/// Unlike a real memtable this holds no keys — only a size. Reaching
/// `max_size_mb` makes the write handler freeze it into the immutable
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Memtable {
    /// Bytes buffered so far, MB.
    pub current_size_mb: f64,
    /// Freeze threshold, MB.
    pub max_size_mb: f64,
    /// Virtual time this memtable became active.
    pub created_at: f64,
}

impl Memtable {
    fn new(max_size_mb: f64, created_at: f64) -> Self {
        Self {
            current_size_mb: 0.0,
            max_size_mb,
            created_at,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// LsmTree
// ------------------------------------------------------------------------------------------------

/// The whole simulated tree.
#[derive(Debug, Clone)]
pub struct LsmTree {
    levels: Vec<Level>,
    /// The memtable currently accepting writes.
    pub active_memtable: Memtable,
    /// Sizes of frozen memtables, oldest first, awaiting flush.
    immutable_sizes: VecDeque<f64>,
    next_file_id: u64,
}

impl LsmTree {
    /// Builds an empty tree with `num_levels` levels and a fresh active
    /// memtable.
    pub fn new(num_levels: usize, memtable_max_mb: f64) -> Self {
        Self {
            levels: (0..num_levels).map(Level::new).collect(),
            active_memtable: Memtable::new(memtable_max_mb, 0.0),
            immutable_sizes: VecDeque::new(),
            next_file_id: 0,
        }
    }

    /// All levels, L0 first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Immutable view of level `n`.
    pub fn level(&self, n: usize) -> &Level {
        &self.levels[n]
    }

    /// Mutable view of level `n`.
    pub fn level_mut(&mut self, n: usize) -> &mut Level {
        &mut self.levels[n]
    }

    /// Total on-disk bytes across all levels, MB.
    pub fn total_size_mb(&self) -> f64 {
        self.levels.iter().map(Level::total_size_mb).sum()
    }

    /// Total file count across all levels.
    pub fn total_file_count(&self) -> usize {
        self.levels.iter().map(Level::file_count).sum()
    }

    /// Allocates the next monotone file id.
    pub fn alloc_file_id(&mut self) -> u64 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    /// Freezes the active memtable: its size joins the immutable queue
    /// and a zero-sized replacement becomes active. Returns the frozen
    /// size.
    pub fn freeze_active_memtable(&mut self, now: f64) -> f64 {
        let frozen_mb = self.active_memtable.current_size_mb;
        self.immutable_sizes.push_back(frozen_mb);
        let max = self.active_memtable.max_size_mb;
        self.active_memtable = Memtable::new(max, now);
        trace!(frozen_mb, immutables = self.immutable_sizes.len(), "memtable frozen");
        frozen_mb
    }

    /// Number of frozen memtables awaiting flush.
    pub fn num_immutable_memtables(&self) -> usize {
        self.immutable_sizes.len()
    }

    /// Sizes of the frozen memtables, oldest first.
    pub fn immutable_sizes(&self) -> impl Iterator<Item = f64> + '_ {
        self.immutable_sizes.iter().copied()
    }

    /// Removes the oldest frozen memtable (flush completed).
    pub fn pop_oldest_immutable(&mut self) -> Option<f64> {
        self.immutable_sizes.pop_front()
    }

    /// Appends a freshly flushed file to L0 and returns its id.
    pub fn append_l0_file(&mut self, size_mb: f64, now: f64) -> u64 {
        let id = self.alloc_file_id();
        self.levels[0].add_file(SstFile {
            id,
            size_mb,
            created_at: now,
        });
        id
    }

    /// Deepest non-empty level, L0 included.
    pub fn deepest_nonempty_level(&self) -> Option<usize> {
        self.levels.iter().rposition(|l| !l.is_empty())
    }

    /// Lowest-numbered non-empty level `≥ 1`.
    pub fn lowest_nonempty_level(&self) -> Option<usize> {
        self.levels[1..]
            .iter()
            .position(|l| !l.is_empty())
            .map(|i| i + 1)
    }

    /// Level currently holding file `id`, if any.
    pub fn find_file_level(&self, id: u64) -> Option<usize> {
        self.levels.iter().position(|l| l.contains(id))
    }
}
