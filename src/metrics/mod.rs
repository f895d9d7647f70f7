//! # Metrics Module
//!
//! Accumulates everything the UI and the metrics pipeline consume:
//!
//! - cumulative byte counters (user writes, WAL, flush output,
//!   compaction input/output),
//! - derived amplification factors (write, space, read),
//! - EMA-smoothed throughputs over a small window around `virtual_time`,
//!   capped to the physical disk rate,
//! - a sustainable-write-rate band,
//! - stall and OOM indicators,
//! - the statistical read-path model (see [`read_model`]).
//!
//! Metrics never mutate the tree and never schedule events; the
//! simulator records activity in, and [`Metrics::refresh`] derives
//! everything else once per step.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

pub mod read_model;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CompactionStyle, Config};
use crate::lsm::LsmTree;
use read_model::{ReadLatencyStats, ReadPathModel};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Smoothing factor of every throughput/latency EMA.
const EMA_ALPHA: f64 = 0.2;

/// Half-width of the throughput sampling window around `virtual_time`.
const THROUGHPUT_WINDOW_SECS: f64 = 0.05;

/// Completed activities older than this are pruned.
const ACTIVITY_RETENTION_SECS: f64 = 0.5;

/// Compaction overhead multiplier feeding the max-sustainable-rate
/// estimate.
const UNIVERSAL_BASE_OVERHEAD: f64 = 1.8;
/// See [`UNIVERSAL_BASE_OVERHEAD`].
const LEVELED_BASE_OVERHEAD: f64 = 2.5;

/// `WriteActivity::from_level` sentinel for WAL writes.
pub const ACTIVITY_WAL: i32 = -2;
/// `WriteActivity::from_level` sentinel for flushes.
pub const ACTIVITY_FLUSH: i32 = -1;

// ------------------------------------------------------------------------------------------------
// WriteActivity
// ------------------------------------------------------------------------------------------------

/// One unit of disk-writing work, tracked from admission to completion.
///
/// `from_level` is `−2` for WAL writes, `−1` for flushes, and the source
/// level for compactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WriteActivity {
    /// Compaction job id, when the activity is a compaction.
    pub job_id: Option<u64>,
    /// Virtual time the work began (CPU phase admission).
    pub start_time: f64,
    /// Virtual time the work completes.
    pub end_time: f64,
    /// Bytes read, MB.
    pub input_mb: f64,
    /// Bytes written, MB.
    pub output_mb: f64,
    /// Origin: `−2` WAL, `−1` flush, `≥ 0` compaction source level.
    pub from_level: i32,
    /// Destination level (0 for flushes, ignored for WAL).
    pub to_level: i32,
}

impl WriteActivity {
    fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    fn overlaps(&self, window_start: f64, window_end: f64) -> bool {
        self.start_time <= window_end && self.end_time >= window_start
    }
}

// ------------------------------------------------------------------------------------------------
// Ema
// ------------------------------------------------------------------------------------------------

/// Exponential moving average where the first sample initializes the
/// value instead of being smoothed against zero.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub(crate) struct Ema {
    value: Option<f64>,
}

impl Ema {
    pub(crate) fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            None => sample,
            Some(prev) => prev + EMA_ALPHA * (sample - prev),
        };
        self.value = Some(next);
        next
    }

    pub(crate) fn get(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

// ------------------------------------------------------------------------------------------------
// Metrics
// ------------------------------------------------------------------------------------------------

/// The full metrics snapshot. Cloned out to callers per step.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    // --- cumulative counters ---
    /// All bytes written to disk: WAL + flush output + compaction output.
    pub total_disk_written_mb: f64,
    /// Flush output only — the write-amplification denominator.
    pub total_flush_written_mb: f64,
    /// Bytes read by compactions.
    pub total_compaction_input_mb: f64,
    /// User-written bytes.
    pub total_data_written_mb: f64,
    /// Bytes appended to the WAL.
    pub wal_bytes_written_mb: f64,

    // --- amplification ---
    /// `total_disk_written / total_flush_written`, floor 1.
    pub write_amplification: f64,
    /// `total disk size / deepest non-empty level size`, floor 1.
    pub space_amplification: f64,
    /// Memtable + L0 files + one per deeper level.
    pub read_amplification: f64,

    // --- throughput ---
    /// Smoothed flush bandwidth, MB/s.
    pub flush_throughput_mbps: f64,
    /// Smoothed compaction bandwidth (input + output), MB/s.
    pub compaction_throughput_mbps: f64,
    /// Smoothed user write rate, MB/s.
    pub write_throughput_mbps: f64,
    /// Share of the physical disk rate in use, percent, clipped to 100.
    pub disk_utilization_percent: f64,

    // --- sustainable band ---
    /// Optimistic sustainable user write rate.
    pub max_sustainable_rate_mbps: f64,
    /// Pessimistic sustainable user write rate.
    pub min_sustainable_rate_mbps: f64,

    // --- stall / terminal state ---
    /// A write stall is currently in force.
    pub is_stalled: bool,
    /// Times a write event hit the stall path (retries included).
    pub stalled_write_count: u64,
    /// Cumulative stalled time, virtual seconds.
    pub total_stall_secs: f64,
    /// The simulation was killed by stalled-write memory overflow.
    /// Terminal: `step()` is a no-op afterwards.
    pub is_oom_killed: bool,

    // --- read path ---
    /// Latest read-path statistics; zeroed when the read workload is
    /// disabled.
    pub read_latency: ReadLatencyStats,

    // --- internals ---
    #[serde(skip)]
    in_progress: Vec<WriteActivity>,
    #[serde(skip)]
    recent: Vec<WriteActivity>,
    #[serde(skip)]
    flush_ema: Ema,
    #[serde(skip)]
    compaction_ema: Ema,
    #[serde(skip)]
    write_ema: Ema,
    #[serde(skip)]
    read_model: ReadPathModel,
    #[serde(skip)]
    last_refresh_time: f64,
    #[serde(skip)]
    user_mb_at_last_refresh: f64,
}

impl Metrics {
    /// Builds a zeroed metrics accumulator; the read-model RNG derives
    /// from the master seed.
    pub fn new(config: &Config) -> Self {
        Self {
            total_disk_written_mb: 0.0,
            total_flush_written_mb: 0.0,
            total_compaction_input_mb: 0.0,
            total_data_written_mb: 0.0,
            wal_bytes_written_mb: 0.0,
            write_amplification: 1.0,
            space_amplification: 1.0,
            read_amplification: 1.0,
            flush_throughput_mbps: 0.0,
            compaction_throughput_mbps: 0.0,
            write_throughput_mbps: 0.0,
            disk_utilization_percent: 0.0,
            max_sustainable_rate_mbps: 0.0,
            min_sustainable_rate_mbps: 0.0,
            is_stalled: false,
            stalled_write_count: 0,
            total_stall_secs: 0.0,
            is_oom_killed: false,
            read_latency: ReadLatencyStats::default(),
            in_progress: Vec::new(),
            recent: Vec::new(),
            flush_ema: Ema::default(),
            compaction_ema: Ema::default(),
            write_ema: Ema::default(),
            read_model: ReadPathModel::new(config.random_seed),
            last_refresh_time: 0.0,
            user_mb_at_last_refresh: 0.0,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Recording — called by the event handlers
    // --------------------------------------------------------------------------------------------

    /// Accounts one user write.
    pub fn record_user_write(&mut self, size_mb: f64) {
        self.total_data_written_mb += size_mb;
    }

    /// Accounts one WAL append occupying the disk over
    /// `[start_time, end_time]`.
    pub fn record_wal_write(&mut self, size_mb: f64, start_time: f64, end_time: f64) {
        self.wal_bytes_written_mb += size_mb;
        self.total_disk_written_mb += size_mb;
        self.in_progress.push(WriteActivity {
            job_id: None,
            start_time,
            end_time,
            input_mb: size_mb,
            output_mb: size_mb,
            from_level: ACTIVITY_WAL,
            to_level: 0,
        });
    }

    /// Starts tracking an admitted flush.
    pub fn begin_flush(&mut self, start_time: f64, end_time: f64, size_mb: f64) {
        self.in_progress.push(WriteActivity {
            job_id: None,
            start_time,
            end_time,
            input_mb: size_mb,
            output_mb: size_mb,
            from_level: ACTIVITY_FLUSH,
            to_level: 0,
        });
    }

    /// Completes the flush whose completion event just fired, accruing
    /// its output into the write-amplification numerator.
    pub fn complete_flush(&mut self, size_mb: f64, now: f64) {
        if let Some(idx) = self
            .in_progress
            .iter()
            .position(|a| a.from_level == ACTIVITY_FLUSH && a.end_time <= now)
        {
            let activity = self.in_progress.remove(idx);
            self.recent.push(activity);
        } else {
            warn!(now, "flush completion without a matching in-progress activity");
        }
        self.total_flush_written_mb += size_mb;
        self.total_disk_written_mb += size_mb;
    }

    /// Starts tracking a scheduled compaction job.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_compaction(
        &mut self,
        job_id: u64,
        start_time: f64,
        end_time: f64,
        input_mb: f64,
        output_mb: f64,
        from_level: usize,
        to_level: usize,
    ) {
        self.in_progress.push(WriteActivity {
            job_id: Some(job_id),
            start_time,
            end_time,
            input_mb,
            output_mb,
            from_level: from_level as i32,
            to_level: to_level as i32,
        });
    }

    /// Completes a compaction with its realized sizes. Trivial moves
    /// contribute nothing to disk-written bytes.
    pub fn complete_compaction(
        &mut self,
        job_id: u64,
        input_mb: f64,
        output_mb: f64,
        trivial_move: bool,
    ) {
        if let Some(idx) = self.in_progress.iter().position(|a| a.job_id == Some(job_id)) {
            let mut activity = self.in_progress.remove(idx);
            activity.input_mb = input_mb;
            activity.output_mb = output_mb;
            self.recent.push(activity);
        } else {
            warn!(job_id, "compaction completion without a matching activity");
        }
        self.total_compaction_input_mb += input_mb;
        if !trivial_move {
            self.total_disk_written_mb += output_mb;
        }
    }

    /// One write event entered the stall path.
    pub fn record_stall_entry(&mut self) {
        if !self.is_stalled {
            info!("write stall engaged");
        }
        self.is_stalled = true;
        self.stalled_write_count += 1;
    }

    /// The stall condition cleared after `stalled_secs`.
    pub fn record_stall_exit(&mut self, stalled_secs: f64) {
        if self.is_stalled {
            info!(stalled_secs, "write stall cleared");
        }
        self.is_stalled = false;
        self.total_stall_secs += stalled_secs.max(0.0);
    }

    /// Terminal: stalled-write memory exceeded its ceiling.
    pub fn mark_oom_killed(&mut self) {
        info!("stalled-write memory ceiling exceeded; simulation OOM-killed");
        self.is_oom_killed = true;
        self.is_stalled = true;
    }

    /// Completed and in-flight activities, for state snapshots.
    pub fn in_progress_activities(&self) -> &[WriteActivity] {
        &self.in_progress
    }

    // --------------------------------------------------------------------------------------------
    // Refresh — called once per step
    // --------------------------------------------------------------------------------------------

    /// Re-derives every computed quantity at virtual time `now`.
    pub fn refresh(&mut self, now: f64, lsm: &LsmTree, config: &Config) {
        self.refresh_amplification(lsm, config);
        self.refresh_throughput(now, config);
        self.refresh_sustainable_band(lsm, config);

        if config.read_workload.enabled {
            self.read_latency = self
                .read_model
                .update(&config.read_workload, self.read_amplification);
        }

        // Move anything that has finished out of in_progress, then drop
        // stale history.
        let mut i = 0;
        while i < self.in_progress.len() {
            if self.in_progress[i].end_time <= now {
                let activity = self.in_progress.remove(i);
                self.recent.push(activity);
            } else {
                i += 1;
            }
        }
        self.recent
            .retain(|a| a.end_time >= now - ACTIVITY_RETENTION_SECS);

        self.last_refresh_time = now;
        self.user_mb_at_last_refresh = self.total_data_written_mb;
    }

    fn refresh_amplification(&mut self, lsm: &LsmTree, config: &Config) {
        self.write_amplification = if self.total_flush_written_mb > 0.0 {
            (self.total_disk_written_mb / self.total_flush_written_mb).max(1.0)
        } else {
            1.0
        };

        let total = lsm.total_size_mb();
        let last_level_size = lsm
            .deepest_nonempty_level()
            .map(|l| lsm.level(l).total_size_mb())
            .unwrap_or(0.0);
        self.space_amplification = if last_level_size > 0.0 {
            (total / last_level_size).max(1.0)
        } else {
            1.0
        };

        // One probe for the active memtable, one per L0 file, one per
        // deeper level.
        let ra = 1.0 + lsm.level(0).file_count() as f64 + (config.num_levels as f64 - 1.0);
        self.read_amplification = ra.max(1.0);
    }

    fn refresh_throughput(&mut self, now: f64, config: &Config) {
        let window_start = now - THROUGHPUT_WINDOW_SECS;
        let window_end = now + THROUGHPUT_WINDOW_SECS;

        let mut flush_raw = 0.0;
        for activity in self.recent.iter().chain(self.in_progress.iter()) {
            if activity.from_level == ACTIVITY_FLUSH
                && activity.overlaps(window_start, window_end)
                && activity.duration() > 0.0
            {
                flush_raw += activity.output_mb / activity.duration();
            }
        }

        // The disk model serializes compactions, so only the single job
        // actually writing at `now` contributes bandwidth.
        let compaction_raw = self
            .in_progress
            .iter()
            .chain(self.recent.iter())
            .find(|a| a.from_level >= 0 && a.start_time <= now && now < a.end_time)
            .map(|a| {
                if a.duration() > 0.0 {
                    (a.input_mb + a.output_mb) / a.duration()
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        let elapsed = now - self.last_refresh_time;
        let write_raw = if elapsed > 0.0 {
            (self.total_data_written_mb - self.user_mb_at_last_refresh) / elapsed
        } else {
            self.write_ema.get()
        };

        let mut flush = self.flush_ema.update(flush_raw);
        let mut compaction = self.compaction_ema.update(compaction_raw);
        let write = self.write_ema.update(write_raw);

        // Cap the disk-facing components to the physical rate.
        let disk_total = flush + compaction;
        if disk_total > config.io_throughput_mbps && disk_total > 0.0 {
            let scale = config.io_throughput_mbps / disk_total;
            flush *= scale;
            compaction *= scale;
        }
        self.flush_throughput_mbps = flush;
        self.compaction_throughput_mbps = compaction;
        self.write_throughput_mbps = write;
        self.disk_utilization_percent =
            (100.0 * (flush + compaction) / config.io_throughput_mbps).min(100.0);
    }

    fn refresh_sustainable_band(&mut self, lsm: &LsmTree, config: &Config) {
        let overhead = match config.compaction_style {
            CompactionStyle::Universal => UNIVERSAL_BASE_OVERHEAD,
            CompactionStyle::Leveled => LEVELED_BASE_OVERHEAD,
        };
        let max_rate = config.io_throughput_mbps / (1.0 + overhead * 3.0);

        // Pessimistic bound: the write buffer must outlast every job
        // slot draining a worst-case compaction at the deepest level.
        let buffer_capacity_mb =
            config.memtable_flush_size_mb * config.max_write_buffer_number as f64;
        let worst_input_mb = lsm
            .deepest_nonempty_level()
            .map(|l| lsm.level(l).total_size_mb())
            .unwrap_or(0.0)
            .clamp(config.memtable_flush_size_mb, config.max_compaction_bytes_mb);
        let worst_total = worst_input_mb * (1.0 + config.compaction_reduction_factor);
        let per_job_secs = worst_total / config.sstable_build_throughput_mbps
            + worst_total / config.io_throughput_mbps
            + config.io_latency_ms / 1000.0;
        let worst_case_secs = config.max_background_jobs as f64 * per_job_secs;
        let min_rate = if worst_case_secs > 0.0 {
            (buffer_capacity_mb / worst_case_secs).min(max_rate)
        } else {
            max_rate
        };

        self.max_sustainable_rate_mbps = max_rate;
        self.min_sustainable_rate_mbps = min_rate;
    }
}
