//! Cloned state snapshots for the UI adapter.
//!
//! Snapshots are value objects produced on demand; nothing here aliases
//! simulator state, and nothing is persisted.

use serde::Serialize;

use crate::lsm::{Memtable, SstFile};

/// One level as the UI sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSnapshot {
    /// Level number, 0-based.
    pub number: usize,
    /// Resident file count.
    pub file_count: usize,
    /// Resident bytes, MB.
    pub total_size_mb: f64,
    /// Files claimed by in-flight compactions.
    pub compacting_file_count: usize,
    /// Bytes claimed by in-flight compactions, MB.
    pub compacting_size_mb: f64,
    /// The resident files, oldest first.
    pub files: Vec<SstFile>,
}

/// One in-flight compaction as the UI sees it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveCompactionSnapshot {
    /// Job id.
    pub job_id: u64,
    /// Source level.
    pub from_level: usize,
    /// Destination level.
    pub to_level: usize,
    /// Estimated input bytes, MB.
    pub input_mb: f64,
    /// Estimated output bytes, MB.
    pub output_mb: f64,
    /// Scheduled completion, virtual seconds.
    pub completion_time: f64,
}

/// Full tree + scheduling snapshot at one virtual instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Virtual time of the snapshot.
    pub virtual_time: f64,
    /// All levels, L0 first.
    pub levels: Vec<LevelSnapshot>,
    /// The active memtable.
    pub active_memtable: Memtable,
    /// Frozen memtable sizes awaiting flush, oldest first.
    pub immutable_memtable_sizes: Vec<f64>,
    /// In-flight compactions, ordered by job id.
    pub active_compactions: Vec<ActiveCompactionSnapshot>,
}
