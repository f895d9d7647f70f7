//! Leveled compaction — score-driven level-to-level merging.
//!
//! The picker mirrors RocksDB's leveled behavior at simulation fidelity:
//! per-level compaction scores, static or dynamic level targets, an
//! intra-L0 fast path when pushing into a heavy base level would cost
//! too much write amplification, and statistical overlap estimation in
//! lieu of real key ranges.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tracing::debug;

use crate::compaction::{
    CompactionJob, CompactionOutcome, CompactionStrategy, PickContext, apply_compaction,
};
use crate::config::Config;
use crate::distributions::Distribution;
use crate::lsm::{Level, LsmTree, SstFile};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Score multiplier applied in dynamic mode when a level over target has
/// heavy inbound traffic (RocksDB `kScoreScale`).
const SCORE_SCALE: f64 = 10.0;

/// Geometric parameter for the source-file-count sample on `L≥1`
/// compactions: usually 1–3 files.
const SOURCE_PICK_P: f64 = 0.5;

/// Seed offsets deriving the per-concern RNGs from the master seed.
const FILE_PICK_SEED_OFFSET: u64 = 0x5157_4a19;
const OVERLAP_SEED_OFFSET: u64 = 0x9e37_79b9;

// ------------------------------------------------------------------------------------------------
// Level targets
// ------------------------------------------------------------------------------------------------

/// Per-level size targets plus the computed base level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTargets {
    /// Target bytes per level, MB. Zero means the level is skipped
    /// (L0, and levels above the base level in dynamic mode).
    pub target_mb: Vec<f64>,
    /// The level L0 compacts into.
    pub base_level: usize,
}

/// Computes level size targets.
///
/// Static mode: `target(i) = base × multiplier^(i−1)`, base level 1.
///
/// Dynamic mode: the base level is the shallowest level needed to hold
/// the tree given the deepest non-empty level's size; targets are worked
/// backwards from that size by the level multiplier, and levels above
/// the base level get a zero target so scoring skips them.
pub fn compute_level_targets(lsm: &LsmTree, config: &Config) -> LevelTargets {
    let n = lsm.num_levels();
    let base = config.max_bytes_for_level_base_mb;
    let mult = config.level_multiplier;
    let mut target_mb = vec![0.0; n];

    if !config.level_compaction_dynamic_level_bytes {
        for (i, t) in target_mb.iter_mut().enumerate().skip(1) {
            *t = base * mult.powi(i as i32 - 1);
        }
        return LevelTargets {
            target_mb,
            base_level: 1.min(n - 1),
        };
    }

    let bottom = lsm.deepest_nonempty_level().filter(|&l| l >= 1).unwrap_or(n - 1);
    let bottom_size = lsm.level(bottom).total_size_mb().max(base);

    let mut base_level = bottom;
    let mut base_size = bottom_size;
    while base_level > 1 && base_size > base {
        base_size /= mult;
        base_level -= 1;
    }

    let mut size = base_size;
    for t in target_mb.iter_mut().take(bottom + 1).skip(base_level) {
        *t = size;
        size *= mult;
    }
    // Levels deeper than the deepest data keep growing geometrically so
    // output landing there still has a finite target.
    for t in target_mb.iter_mut().skip(bottom + 1) {
        *t = size;
        size *= mult;
    }

    LevelTargets {
        target_mb,
        base_level,
    }
}

/// Compaction score for one level.
///
/// L0 is scored by `max(file count / trigger, size / base)`. Deeper
/// levels score their non-compacting bytes against the level target; in
/// dynamic mode a level over target with positive inbound compaction
/// traffic is rescored as `kScoreScale × bytes / (target + inflow)`,
/// which keeps it above 1 while deprioritizing it against levels whose
/// downstream is idle.
pub fn compaction_score(
    level: &Level,
    targets: &LevelTargets,
    inflow_mb: f64,
    config: &Config,
) -> f64 {
    if level.number() == 0 {
        let by_count = level.file_count() as f64 / config.l0_compaction_trigger as f64;
        let by_size = level.total_size_mb() / config.max_bytes_for_level_base_mb;
        return by_count.max(by_size);
    }

    let target = targets.target_mb[level.number()];
    if target <= 0.0 {
        return 0.0;
    }
    let not_compacting = (level.total_size_mb() - level.compacting_size_mb()).max(0.0);
    let mut score = not_compacting / target;
    if config.level_compaction_dynamic_level_bytes && not_compacting > target && inflow_mb > 0.0 {
        score = SCORE_SCALE * not_compacting / (target + inflow_mb);
    }
    score
}

// ------------------------------------------------------------------------------------------------
// LeveledCompactor
// ------------------------------------------------------------------------------------------------

/// Leveled strategy state: job-id allocation plus the two sampling RNGs
/// (source file count, target overlap), both derived from the master
/// seed.
pub struct LeveledCompactor {
    next_job_id: u64,
    file_pick_rng: Pcg64,
    overlap_rng: Pcg64,
}

impl LeveledCompactor {
    /// Builds a leveled compactor seeded from the master seed.
    pub fn new(seed: u64) -> Self {
        Self {
            next_job_id: 0,
            file_pick_rng: Pcg64::seed_from_u64(seed.wrapping_add(FILE_PICK_SEED_OFFSET)),
            overlap_rng: Pcg64::seed_from_u64(seed.wrapping_add(OVERLAP_SEED_OFFSET)),
        }
    }

    fn alloc_job_id(&mut self) -> u64 {
        let id = self.next_job_id;
        self.next_job_id += 1;
        id
    }

    /// Intra-L0 gate: enough L0 files piled up *and* the base level is
    /// large enough relative to L0 that pushing down would be
    /// write-amp-expensive. All three conditions are ANDed.
    fn wants_intra_l0(lsm: &LsmTree, base_level: usize, config: &Config) -> bool {
        let l0 = lsm.level(0);
        let l0_size = l0.total_size_mb();
        l0.file_count() >= config.l0_compaction_trigger + 2
            && l0.file_count() >= 4
            && l0_size > 0.0
            && lsm.level(base_level).total_size_mb() <= 20.0 * l0_size
    }

    /// Builds an intra-L0 job: adjacent non-compacting L0 files merged
    /// up to the compaction byte cap, staying within the level.
    fn pick_intra_l0(&mut self, lsm: &LsmTree, config: &Config) -> Option<CompactionJob> {
        let l0 = lsm.level(0);
        let mut picked: Vec<SstFile> = Vec::new();
        let mut total_mb = 0.0;
        for file in l0.files().iter().filter(|f| !l0.is_compacting(f.id)) {
            if total_mb + file.size_mb > config.max_compaction_bytes_mb && !picked.is_empty() {
                break;
            }
            total_mb += file.size_mb;
            picked.push(*file);
        }
        if picked.len() < 2 {
            return None;
        }
        Some(CompactionJob {
            id: self.alloc_job_id(),
            from_level: 0,
            to_level: 0,
            source_files: picked,
            target_files: Vec::new(),
            is_intra_l0: true,
            subcompactions: 1,
        })
    }

    /// Source files for a regular job: all of L0, or a geometric sample
    /// of contiguous files on a deeper level.
    fn pick_source_files(&mut self, level: &Level) -> Vec<SstFile> {
        let available: Vec<SstFile> = level
            .files()
            .iter()
            .filter(|f| !level.is_compacting(f.id))
            .copied()
            .collect();
        if available.is_empty() {
            return available;
        }
        if level.number() == 0 {
            // L0 files overlap the whole keyspace; take them all.
            return available;
        }
        let want =
            (Distribution::sample_geometric(&mut self.file_pick_rng, SOURCE_PICK_P) as usize)
                .min(available.len());
        let start = self.file_pick_rng.gen_range(0..=available.len() - want);
        available[start..start + want].to_vec()
    }

    /// Estimated overlapping files on the target level: a sampled
    /// fraction of its non-compacting files, clipped incrementally so
    /// the job stays under `max_compaction_bytes_mb`.
    fn pick_target_files(
        &mut self,
        target_level: &Level,
        source_mb: f64,
        config: &Config,
    ) -> Vec<SstFile> {
        let candidates: Vec<SstFile> = target_level
            .files()
            .iter()
            .filter(|f| !target_level.is_compacting(f.id))
            .copied()
            .collect();
        if candidates.is_empty() {
            return candidates;
        }
        let fraction = config.overlap_fraction.sample_fraction(&mut self.overlap_rng);
        let want = ((fraction * candidates.len() as f64).round() as usize).min(candidates.len());
        if want == 0 {
            return Vec::new();
        }
        let start = self.overlap_rng.gen_range(0..=candidates.len() - want);

        let mut picked = Vec::with_capacity(want);
        let mut total_mb = source_mb;
        for file in &candidates[start..start + want] {
            if total_mb + file.size_mb > config.max_compaction_bytes_mb {
                break;
            }
            total_mb += file.size_mb;
            picked.push(*file);
        }
        picked
    }
}

impl CompactionStrategy for LeveledCompactor {
    fn needs_compaction(&self, lsm: &LsmTree, config: &Config) -> bool {
        let targets = compute_level_targets(lsm, config);
        lsm.levels()
            .iter()
            .take(lsm.num_levels() - 1)
            .any(|l| compaction_score(l, &targets, 0.0, config) > 1.0)
    }

    fn pick_compaction(
        &mut self,
        lsm: &LsmTree,
        ctx: &PickContext<'_>,
        config: &Config,
    ) -> Option<CompactionJob> {
        let targets = compute_level_targets(lsm, config);

        // Score every candidate source level, rank descending; ties go
        // to the shallower level.
        let mut scored: Vec<(usize, f64)> = (0..lsm.num_levels() - 1)
            .map(|n| {
                let inflow = ctx.inflow_mb.get(n).copied().unwrap_or(0.0);
                (n, compaction_score(lsm.level(n), &targets, inflow, config))
            })
            .filter(|(_, score)| *score > 1.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (level_no, score) in scored {
            if ctx.active_levels.contains(&level_no) {
                continue;
            }
            let to_level = if level_no == 0 {
                targets.base_level
            } else {
                level_no + 1
            };

            // Contention gate: skip when over half of the target level
            // is already claimed as compaction targets.
            let target_level = lsm.level(to_level);
            if target_level.file_count() > 0
                && target_level.target_compacting_files() as f64
                    / target_level.file_count() as f64
                    > 0.5
            {
                debug!(level = level_no, to_level, "picker: target level contended");
                continue;
            }

            // The score bar rises when the target level is shallow on
            // files, so nearly-empty targets only absorb urgent work.
            let threshold = if target_level.file_count() == 0 {
                2.0
            } else if target_level.file_count() < 3 {
                1.5
            } else {
                1.0
            };
            if score <= threshold {
                debug!(level = level_no, score, threshold, "picker: below threshold");
                continue;
            }

            if level_no == 0 && Self::wants_intra_l0(lsm, targets.base_level, config) {
                if let Some(job) = self.pick_intra_l0(lsm, config) {
                    debug!(
                        job_id = job.id,
                        files = job.source_files.len(),
                        "picker: intra-L0 compaction"
                    );
                    return Some(job);
                }
            }

            let source_files = self.pick_source_files(lsm.level(level_no));
            if source_files.is_empty() {
                continue;
            }
            let source_mb: f64 = source_files.iter().map(|f| f.size_mb).sum();
            let target_files = self.pick_target_files(lsm.level(to_level), source_mb, config);

            let job = CompactionJob {
                id: self.alloc_job_id(),
                from_level: level_no,
                to_level,
                source_files,
                target_files,
                is_intra_l0: false,
                subcompactions: 1,
            };
            debug!(
                job_id = job.id,
                from_level = job.from_level,
                to_level = job.to_level,
                sources = job.source_files.len(),
                targets = job.target_files.len(),
                score,
                "picker: leveled compaction"
            );
            return Some(job);
        }

        None
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
