//! # Compaction Module
//!
//! Implements the two compaction strategy families of the simulated
//! engine:
//!
//! ## Leveled
//!
//! Score-driven. L0 is scored by file count and total size; deeper levels
//! by how far their non-compacting bytes exceed a per-level target
//! (static geometric targets, or dynamic targets computed back from the
//! deepest non-empty level). The highest-scoring level compacts into the
//! next one, with an intra-L0 fast path when the base level is
//! disproportionately large.
//!
//! ## Universal
//!
//! Sorted-run driven. Each L0 file and each non-empty level up to the
//! base level is one run. Size-amplification picks **all** runs into the
//! last level; otherwise the size-ratio rule accumulates runs from the
//! newest end while each next run stays within the configured slack.
//!
//! ## Code organization
//!
//! Strategy-specific picking lives in [`leveled`] and [`universal`];
//! the shared execution mechanics (trivial moves, multi-level source
//! removal, output splitting) live here so both strategies reuse one
//! mutation path against the tree.

pub mod leveled;
pub mod universal;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::{CompactionStyle, Config};
use crate::lsm::{LsmTree, SstFile};

// ------------------------------------------------------------------------------------------------
// CompactionStrategy trait
// ------------------------------------------------------------------------------------------------

/// A uniform interface for compaction strategies.
///
/// The simulator's compaction-check loop calls
/// [`pick_compaction`](CompactionStrategy::pick_compaction) until it
/// returns `None` or job slots run out; each picked job is executed
/// later, at its completion event, via
/// [`execute`](CompactionStrategy::execute).
///
/// Pickers are `&mut self` because they own their sampling RNGs — all
/// randomness is strategy-internal and seeded from the master seed, so
/// identical configs replay identical decisions.
pub trait CompactionStrategy {
    /// True when the tree currently warrants background compaction.
    fn needs_compaction(&self, lsm: &LsmTree, config: &Config) -> bool;

    /// Chooses the next compaction job, or `None` when nothing qualifies.
    ///
    /// The picker never mutates the tree; claiming the chosen files is
    /// the caller's responsibility.
    fn pick_compaction(
        &mut self,
        lsm: &LsmTree,
        ctx: &PickContext<'_>,
        config: &Config,
    ) -> Option<CompactionJob>;

    /// Applies a previously picked job against the tree at virtual time
    /// `now`, returning the realized sizes.
    fn execute(
        &mut self,
        job: &CompactionJob,
        lsm: &mut LsmTree,
        config: &Config,
        now: f64,
    ) -> CompactionOutcome;
}

/// Returns the strategy implementation selected by the config.
pub fn new_strategy(config: &Config) -> Box<dyn CompactionStrategy> {
    match config.compaction_style {
        CompactionStyle::Leveled => Box::new(leveled::LeveledCompactor::new(config.random_seed)),
        CompactionStyle::Universal => Box::new(universal::UniversalCompactor::new()),
    }
}

// ------------------------------------------------------------------------------------------------
// Shared types
// ------------------------------------------------------------------------------------------------

/// Scheduling state the picker consults but does not own.
pub struct PickContext<'a> {
    /// Source levels with a compaction already in flight.
    pub active_levels: &'a BTreeSet<usize>,
    /// Per-level bytes currently being compacted *into* the level from
    /// above (indexed by level number). Drives the dynamic-mode score
    /// deprioritization.
    pub inflow_mb: &'a [f64],
}

/// A picked-but-not-yet-executed compaction.
///
/// Source and target lists are disjoint in file identity — a file on
/// both lists is a programming bug and panics at execution.
#[derive(Debug, Clone)]
pub struct CompactionJob {
    /// Unique job id, allocated by the picker.
    pub id: u64,
    /// Level the job was picked from (universal jobs always report 0).
    pub from_level: usize,
    /// Level receiving the output files.
    pub to_level: usize,
    /// Files consumed by the merge. May span multiple levels in
    /// universal size-amplification jobs.
    pub source_files: Vec<SstFile>,
    /// Files on `to_level` rewritten by the merge.
    pub target_files: Vec<SstFile>,
    /// L0-to-L0 merge that reduces file count without leaving the level.
    pub is_intra_l0: bool,
    /// Number of parallel sub-jobs the scheduler models; `1` when the
    /// job does not qualify for subcompactions.
    pub subcompactions: usize,
}

impl CompactionJob {
    /// Total input bytes: sources plus targets, MB.
    pub fn input_mb(&self) -> f64 {
        self.source_files.iter().map(|f| f.size_mb).sum::<f64>()
            + self.target_files.iter().map(|f| f.size_mb).sum::<f64>()
    }

    /// Whether the scheduler may split this job into subcompactions.
    pub fn qualifies_for_subcompactions(&self, style: CompactionStyle) -> bool {
        match style {
            CompactionStyle::Leveled => self.from_level == 0 && !self.is_intra_l0,
            CompactionStyle::Universal => self.to_level != 0,
        }
    }

    /// Panics when a file appears on both the source and target lists.
    pub(crate) fn assert_disjoint(&self) {
        for src in &self.source_files {
            assert!(
                !self.target_files.iter().any(|t| t.id == src.id),
                "compaction job {}: file {} appears in both source and target lists",
                self.id,
                src.id,
            );
        }
    }
}

/// Realized result of executing a compaction against the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionOutcome {
    /// Bytes actually read (sources found resident, plus targets), MB.
    pub input_mb: f64,
    /// Bytes written as output files, MB.
    pub output_mb: f64,
    /// Number of output files synthesized.
    pub output_file_count: usize,
    /// The job degenerated to a reference relocation; no bytes were
    /// rewritten and write amplification is unaffected.
    pub trivial_move: bool,
}

// ------------------------------------------------------------------------------------------------
// Size model constants
// ------------------------------------------------------------------------------------------------

/// Output/input ratio for compactions below the base level. L0-sourced
/// compactions use the configurable factor instead (heavier dedup).
pub(crate) const DEEP_LEVEL_REDUCTION: f64 = 0.99;

/// Hard cap on a single output file.
pub(crate) const MAX_OUTPUT_FILE_MB: f64 = 2048.0;

/// Target output file size for a level:
/// `target_file_size_mb × multiplier^(level − 1)`, capped at 2 GB.
/// L0 outputs (intra-L0 merges) use the base size.
pub fn target_file_size_mb(config: &Config, level: usize) -> f64 {
    let exp = level.saturating_sub(1) as i32;
    (config.target_file_size_mb * config.target_file_size_multiplier.powi(exp))
        .min(MAX_OUTPUT_FILE_MB)
}

// ------------------------------------------------------------------------------------------------
// Shared execution — trivial moves, removal grouping, output splitting
// ------------------------------------------------------------------------------------------------

/// Applies a compaction job to the tree.
///
/// This is the common tail shared by both strategies:
///
/// 1. **Trivial move** — when the job has no target files and none of
///    its sources already live on the target level, file references are
///    relocated unchanged.
/// 2. Otherwise sources are removed from whichever level currently
///    holds them (the job does not record origin levels; membership is
///    re-resolved at execution time), targets are removed from
///    `to_level`, and `input × reduction` bytes of output are
///    synthesized as new files split to the target file size.
pub(crate) fn apply_compaction(
    job: &CompactionJob,
    lsm: &mut LsmTree,
    config: &Config,
    now: f64,
) -> CompactionOutcome {
    job.assert_disjoint();

    let trivial = job.target_files.is_empty()
        && job
            .source_files
            .iter()
            .all(|f| !lsm.level(job.to_level).contains(f.id));

    if trivial {
        let mut moved_mb = 0.0;
        let mut moved = 0usize;
        for file in &job.source_files {
            let Some(level) = lsm.find_file_level(file.id) else {
                warn!(job_id = job.id, file_id = file.id, "trivial move: source file not found");
                continue;
            };
            if let Some(owned) = lsm.level_mut(level).remove_file(file.id) {
                moved_mb += owned.size_mb;
                moved += 1;
                lsm.level_mut(job.to_level).add_file(owned);
            }
        }
        debug!(
            job_id = job.id,
            to_level = job.to_level,
            moved,
            moved_mb,
            "trivial move"
        );
        return CompactionOutcome {
            input_mb: moved_mb,
            output_mb: moved_mb,
            output_file_count: moved,
            trivial_move: true,
        };
    }

    // Group source files by the level that currently holds them, then
    // remove. A file can have vanished only through a claim-bookkeeping
    // bug, so absence is logged and skipped rather than fatal.
    let mut input_mb = 0.0;
    let mut removed_sources = 0usize;
    for file in &job.source_files {
        match lsm.find_file_level(file.id) {
            Some(level) => {
                if let Some(owned) = lsm.level_mut(level).remove_file(file.id) {
                    input_mb += owned.size_mb;
                    removed_sources += 1;
                }
            }
            None => {
                warn!(job_id = job.id, file_id = file.id, "source file not found; skipping");
            }
        }
    }
    for file in &job.target_files {
        match lsm.level_mut(job.to_level).remove_file(file.id) {
            Some(owned) => input_mb += owned.size_mb,
            None => {
                warn!(job_id = job.id, file_id = file.id, "target file not found; skipping");
            }
        }
    }

    let reduction = if job.from_level == 0 {
        config.compaction_reduction_factor
    } else {
        DEEP_LEVEL_REDUCTION
    };
    let output_mb = input_mb * reduction;

    let output_file_count = if output_mb <= 0.0 {
        0
    } else if job.is_intra_l0 {
        // Intra-L0 merges roughly two files into one.
        removed_sources.div_ceil(2).max(1)
    } else {
        let target = target_file_size_mb(config, job.to_level);
        (output_mb / target).ceil().max(1.0) as usize
    };

    if output_file_count > 0 {
        let each_mb = output_mb / output_file_count as f64;
        for _ in 0..output_file_count {
            let id = lsm.alloc_file_id();
            lsm.level_mut(job.to_level).add_file(SstFile {
                id,
                size_mb: each_mb,
                created_at: now,
            });
        }
    }

    debug!(
        job_id = job.id,
        from_level = job.from_level,
        to_level = job.to_level,
        input_mb,
        output_mb,
        output_file_count,
        "compaction applied"
    );

    CompactionOutcome {
        input_mb,
        output_mb,
        output_file_count,
        trivial_move: false,
    }
}
