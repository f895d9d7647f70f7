//! Universal compaction — sorted-run tiering.
//!
//! The fundamental unit is the **sorted run**: each L0 file is one run,
//! and each non-empty level from L1 down to the base level is one run.
//! Runs are ordered newest-first (L0 by creation time, then the level
//! runs).
//!
//! Picking follows RocksDB's priority order: size amplification first
//! (merge everything into the last level), then the size-ratio rule
//! (accumulate runs from the newest end while each next run is within
//! the configured slack of the accumulated size).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use tracing::debug;

use crate::compaction::{
    CompactionJob, CompactionOutcome, CompactionStrategy, PickContext, apply_compaction,
};
use crate::config::Config;
use crate::lsm::{LsmTree, SstFile};

/// Minimum sorted runs merged by a size-ratio compaction.
const MIN_MERGE_WIDTH: usize = 2;

// ------------------------------------------------------------------------------------------------
// Sorted runs
// ------------------------------------------------------------------------------------------------

/// One mergeable unit: a single L0 file, or a whole non-L0 level.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedRun {
    /// Level the run lives on.
    pub level: usize,
    /// Total bytes of the run, MB.
    pub size_mb: f64,
    /// The run's files (one for L0 runs).
    pub files: Vec<SstFile>,
}

/// The base level: lowest-numbered non-empty level `≥ 1`, or the last
/// level when everything below L0 is empty.
pub fn base_level(lsm: &LsmTree) -> usize {
    lsm.lowest_nonempty_level().unwrap_or(lsm.num_levels() - 1)
}

/// Builds the sorted-run list: all L0 files newest-to-oldest, then the
/// non-empty levels L1..=base_level, each as one run.
pub fn sorted_runs(lsm: &LsmTree) -> Vec<SortedRun> {
    let mut runs = Vec::new();

    let mut l0_files: Vec<SstFile> = lsm.level(0).files().to_vec();
    l0_files.sort_by(|a, b| {
        b.created_at
            .total_cmp(&a.created_at)
            .then(b.id.cmp(&a.id))
    });
    for file in l0_files {
        runs.push(SortedRun {
            level: 0,
            size_mb: file.size_mb,
            files: vec![file],
        });
    }

    let base = base_level(lsm);
    for level_no in 1..=base.min(lsm.num_levels() - 1) {
        let level = lsm.level(level_no);
        if !level.is_empty() {
            runs.push(SortedRun {
                level: level_no,
                size_mb: level.total_size_mb(),
                files: level.files().to_vec(),
            });
        }
    }

    runs
}

// ------------------------------------------------------------------------------------------------
// UniversalCompactor
// ------------------------------------------------------------------------------------------------

/// Universal strategy state. Run selection is fully deterministic, so
/// the only state is job-id allocation.
pub struct UniversalCompactor {
    next_job_id: u64,
}

impl Default for UniversalCompactor {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalCompactor {
    /// Builds a universal compactor.
    pub fn new() -> Self {
        Self { next_job_id: 0 }
    }

    fn alloc_job_id(&mut self) -> u64 {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    /// Size-amplification check:
    /// `Σ non-last-run sizes / last-run size > percent / 100`.
    fn size_amplification_triggered(runs: &[SortedRun], config: &Config) -> bool {
        let Some(last) = runs.last() else {
            return false;
        };
        if last.size_mb <= 0.0 {
            return false;
        }
        let preceding_mb: f64 = runs[..runs.len() - 1].iter().map(|r| r.size_mb).sum();
        preceding_mb / last.size_mb > config.size_amplification_percent() / 100.0
    }

    /// A size-amp job merges every sorted run into the last level. The
    /// base level's files all move into the source list, so the target
    /// list is empty by construction.
    fn pick_size_amplification(
        &mut self,
        runs: &[SortedRun],
        lsm: &LsmTree,
    ) -> CompactionJob {
        let source_files: Vec<SstFile> = runs.iter().flat_map(|r| r.files.iter().copied()).collect();
        CompactionJob {
            id: self.alloc_job_id(),
            from_level: 0,
            to_level: lsm.num_levels() - 1,
            source_files,
            target_files: Vec::new(),
            is_intra_l0: false,
            subcompactions: 1,
        }
    }

    /// Size-ratio accumulation: starting from the newest run, keep
    /// adding the next run while
    /// `accumulated × (1 + ratio%) ≥ next run size`. Returns the number
    /// of runs picked (`first_index_after`).
    fn size_ratio_width(runs: &[SortedRun], config: &Config) -> usize {
        let slack = 1.0 + config.universal_size_ratio_percent / 100.0;
        let mut accumulated = runs[0].size_mb;
        let mut picked = 1;
        while picked < runs.len() {
            let next = &runs[picked];
            if accumulated * slack >= next.size_mb {
                accumulated += next.size_mb;
                picked += 1;
            } else {
                break;
            }
        }
        if config.universal_max_merge_width > 0 {
            picked = picked.min(config.universal_max_merge_width);
        }
        picked
    }

    /// RocksDB `CalculateOutputLevel`: the level just above the first
    /// run left out of the merge, with an L0 subroutine when that run is
    /// itself an L0 file.
    fn output_level(
        runs: &[SortedRun],
        first_index_after: usize,
        lsm: &LsmTree,
    ) -> usize {
        if first_index_after >= runs.len() {
            return lsm.num_levels() - 1;
        }
        let next = &runs[first_index_after];
        if next.level != 0 {
            return next.level - 1;
        }
        // The next run is still L0: land in the base level when one
        // exists below L1, else just above the first later non-L0 run,
        // else stay intra-L0.
        let base = base_level(lsm);
        if base > 1 {
            return base;
        }
        runs[first_index_after..]
            .iter()
            .find(|r| r.level != 0)
            .map(|r| r.level.saturating_sub(1))
            .unwrap_or(0)
    }
}

impl CompactionStrategy for UniversalCompactor {
    fn needs_compaction(&self, lsm: &LsmTree, config: &Config) -> bool {
        lsm.level(0).file_count() >= config.l0_compaction_trigger
    }

    fn pick_compaction(
        &mut self,
        lsm: &LsmTree,
        ctx: &PickContext<'_>,
        config: &Config,
    ) -> Option<CompactionJob> {
        // Universal jobs always originate from the newest runs, so one
        // in-flight job (keyed by source level 0) serializes picking.
        if ctx.active_levels.contains(&0) {
            return None;
        }
        if !self.needs_compaction(lsm, config) {
            return None;
        }
        let runs = sorted_runs(lsm);
        if runs.len() < MIN_MERGE_WIDTH {
            return None;
        }

        if Self::size_amplification_triggered(&runs, config) {
            let job = self.pick_size_amplification(&runs, lsm);
            debug!(
                job_id = job.id,
                runs = runs.len(),
                to_level = job.to_level,
                input_mb = job.input_mb(),
                "picker: universal size-amplification compaction"
            );
            return Some(job);
        }

        let first_index_after = Self::size_ratio_width(&runs, config);
        if first_index_after < MIN_MERGE_WIDTH {
            debug!(runs = runs.len(), "picker: size-ratio accumulation too narrow");
            return None;
        }

        let to_level = Self::output_level(&runs, first_index_after, lsm);
        let source_files: Vec<SstFile> = runs[..first_index_after]
            .iter()
            .flat_map(|r| r.files.iter().copied())
            .collect();
        // Intra-L0 merges have no rewrite set; the leftover L0 runs
        // stay untouched.
        let target_files: Vec<SstFile> = if to_level == 0 {
            Vec::new()
        } else {
            lsm.level(to_level)
                .files()
                .iter()
                .filter(|f| !source_files.iter().any(|s| s.id == f.id))
                .copied()
                .collect()
        };

        let job = CompactionJob {
            id: self.alloc_job_id(),
            from_level: 0,
            to_level,
            source_files,
            target_files,
            is_intra_l0: to_level == 0,
            subcompactions: 1,
        };
        debug!(
            job_id = job.id,
            picked_runs = first_index_after,
            to_level = job.to_level,
            input_mb = job.input_mb(),
            "picker: universal size-ratio compaction"
        );
        Some(job)
    }

    fn execute(
        &mut self,
        job: &CompactionJob,
        lsm: &mut LsmTree,
        config: &Config,
        now: f64,
    ) -> CompactionOutcome {
        apply_compaction(job, lsm, config, now)
    }
}
