//! # Simulator Module
//!
//! The single-owner state machine driving the whole simulation. The
//! caller repeatedly invokes [`Simulator::step`]; each step pops events
//! up to a deadline, dispatches them to their handlers, and refreshes
//! the metrics. There are no threads, no wall-clock timing, and no I/O
//! — determinism is total: identical config and seed replay an
//! identical trace.
//!
//! ## Event flow
//!
//! ```text
//!  ScheduleWrite ──► Write ──► (freeze) ──► Flush
//!       ▲  │            │                     │
//!       └──┘            ▼                     ▼
//!              StalledWrite / OOM          L0 file
//!
//!  CompactionCheck ──► pick_compaction ──► Compaction
//!       ▲  │                                   │
//!       └──┘                                   ▼
//!                                      LSM tree mutation
//! ```
//!
//! ## Ordering invariants
//!
//! - `virtual_time` is non-decreasing across and within steps.
//! - Handlers schedule follow-ups from the **incoming event's
//!   timestamp**, never a stale clock, so nothing lands in the past.
//! - An empty queue at step entry is a programming bug and panics; a
//!   correctly initialized simulator always has a `CompactionCheck`
//!   pending.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

pub mod scheduler;
pub mod snapshot;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace, warn};

use crate::compaction::{self, CompactionJob, CompactionStrategy, PickContext};
use crate::config::{Config, ConfigError, TrafficPattern};
use crate::event::{Event, EventKind, EventQueue};
use crate::lsm::LsmTree;
use crate::metrics::Metrics;
use scheduler::JobScheduler;
use snapshot::{ActiveCompactionSnapshot, LevelSnapshot, StateSnapshot};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Virtual seconds one `step()` advances at speed multiplier 1.
pub const BASE_STEP_SECS: f64 = 0.1;

/// Interval of the background compaction poll, approximating the
/// RocksDB background thread's wakeup cadence.
const COMPACTION_CHECK_INTERVAL_SECS: f64 = 1.0;

/// Nudge applied when rescheduling a stalled write past the expected
/// flush completion (or the disk), so the retry lands strictly after
/// the unblocking event.
const STALL_RETRY_EPS: f64 = 1e-4;

/// Size of each generated write event.
const WRITE_EVENT_SIZE_MB: f64 = 1.0;

/// Floor on the instantaneous generator rate under bursty traffic, as
/// a fraction of the configured mean rate.
const BURST_OFF_RATE_FLOOR: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Simulator
// ------------------------------------------------------------------------------------------------

/// The discrete-event simulator. See the module docs for the contract.
pub struct Simulator {
    config: Config,
    lsm: LsmTree,
    queue: EventQueue,
    compactor: Box<dyn CompactionStrategy>,
    metrics: Metrics,
    scheduler: JobScheduler,
    virtual_time: f64,

    /// Picked jobs awaiting their completion event, by job id.
    pending_compactions: BTreeMap<u64, CompactionJob>,
    /// Source level → job id of the compaction running from it.
    active_compactions: BTreeMap<usize, u64>,
    /// Per-level bytes currently being compacted into the level.
    inflow_mb: Vec<f64>,

    /// Aggregate bytes of queued `StalledWrite` events (OOM accounting).
    stalled_write_queued_mb: f64,
    /// When the current stall began, if one is in force.
    stall_start_time: Option<f64>,
    /// Completion times of in-flight flushes, unordered.
    pending_flush_completions: Vec<f64>,
}

impl Simulator {
    /// Validates the config and builds a simulator at `virtual_time = 0`
    /// with the initial `ScheduleWrite` and `CompactionCheck` queued.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let lsm = LsmTree::new(config.num_levels, config.memtable_flush_size_mb);
        let compactor = compaction::new_strategy(&config);
        let metrics = Metrics::new(&config);
        let scheduler = JobScheduler::new(config.max_background_jobs);
        let mut queue = EventQueue::new();
        queue.push(Event::new(0.0, EventKind::ScheduleWrite));
        queue.push(Event::new(0.0, EventKind::CompactionCheck));

        let num_levels = config.num_levels;
        info!(
            style = ?config.compaction_style,
            num_levels,
            write_rate_mbps = config.write_rate_mbps,
            seed = config.random_seed,
            "simulator initialized"
        );

        Self {
            config,
            lsm,
            queue,
            compactor,
            metrics,
            scheduler,
            virtual_time: 0.0,
            pending_compactions: BTreeMap::new(),
            active_compactions: BTreeMap::new(),
            inflow_mb: vec![0.0; num_levels],
            stalled_write_queued_mb: 0.0,
            stall_start_time: None,
            pending_flush_completions: Vec::new(),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Public interface
    // --------------------------------------------------------------------------------------------

    /// Advances one simulated quantum:
    /// `base_step × speed_multiplier` virtual seconds.
    ///
    /// A no-op once the simulation is OOM-killed.
    ///
    /// # Panics
    ///
    /// Panics when the event queue is empty at entry — that state is
    /// unreachable from a correctly initialized simulator.
    pub fn step(&mut self) {
        if self.metrics.is_oom_killed {
            return;
        }
        assert!(
            !self.queue.is_empty(),
            "event queue empty at step entry; a CompactionCheck must always be pending"
        );

        let target_time = self.virtual_time + BASE_STEP_SECS * self.config.speed_multiplier();

        while let Some(timestamp) = self.queue.peek_timestamp() {
            if timestamp > target_time || self.metrics.is_oom_killed {
                break;
            }
            let Some(event) = self.queue.pop() else { break };
            assert!(
                event.timestamp >= self.virtual_time,
                "event scheduled in the past: {} < {}",
                event.timestamp,
                self.virtual_time
            );
            self.virtual_time = self.virtual_time.max(event.timestamp);
            self.dispatch(event);
        }

        self.virtual_time = self.virtual_time.max(target_time);
        self.metrics.refresh(self.virtual_time, &self.lsm, &self.config);
    }

    /// Reinitializes to `virtual_time = 0` with the current config.
    pub fn reset(&mut self) {
        info!("simulator reset");
        *self = Self::build(self.config.clone());
    }

    /// Applies a new config. `write_rate_mbps` changes hot; any other
    /// difference forces a full reset. The simulator is untouched when
    /// validation fails.
    pub fn update_config(&mut self, new_config: Config) -> Result<(), ConfigError> {
        new_config.validate()?;

        if self.config.hot_updatable_from(&new_config) {
            let old_rate = self.config.write_rate_mbps;
            let new_rate = new_config.write_rate_mbps;
            self.config.write_rate_mbps = new_rate;
            // A quiesced generator has no pending ScheduleWrite to pick
            // the new rate up, so re-arm the chain.
            if old_rate <= 0.0 && new_rate > 0.0 {
                self.queue
                    .push(Event::new(self.virtual_time, EventKind::ScheduleWrite));
            }
            debug!(old_rate, new_rate, "write rate hot-updated");
        } else {
            info!("structural config change; resetting");
            *self = Self::build(new_config);
        }
        Ok(())
    }

    /// The simulator's monotonic clock.
    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    /// Cloned metrics snapshot.
    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read-only view of the tree.
    pub fn lsm(&self) -> &LsmTree {
        &self.lsm
    }

    /// Cloned description of the tree and in-flight compactions.
    pub fn state(&self) -> StateSnapshot {
        let levels = self
            .lsm
            .levels()
            .iter()
            .map(|level| LevelSnapshot {
                number: level.number(),
                file_count: level.file_count(),
                total_size_mb: level.total_size_mb(),
                compacting_file_count: level.compacting_file_count(),
                compacting_size_mb: level.compacting_size_mb(),
                files: level.files().to_vec(),
            })
            .collect();

        let active_compactions = self
            .pending_compactions
            .values()
            .map(|job| ActiveCompactionSnapshot {
                job_id: job.id,
                from_level: job.from_level,
                to_level: job.to_level,
                input_mb: job.input_mb(),
                output_mb: job.input_mb() * self.reduction_for(job),
                completion_time: self
                    .metrics
                    .in_progress_activities()
                    .iter()
                    .find(|a| a.job_id == Some(job.id))
                    .map(|a| a.end_time)
                    .unwrap_or(self.virtual_time),
            })
            .collect();

        StateSnapshot {
            virtual_time: self.virtual_time,
            levels,
            active_memtable: self.lsm.active_memtable,
            immutable_memtable_sizes: self.lsm.immutable_sizes().collect(),
            active_compactions,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Dispatch
    // --------------------------------------------------------------------------------------------

    fn dispatch(&mut self, event: Event) {
        trace!(timestamp = event.timestamp, kind = ?event.kind, "dispatch");
        match event.kind {
            EventKind::Write { size_mb } => self.handle_write(event.timestamp, size_mb),
            EventKind::StalledWrite { size_mb } => {
                // The deferred bytes leave the stalled queue on pop;
                // they re-enter it if the write stalls again.
                self.stalled_write_queued_mb =
                    (self.stalled_write_queued_mb - size_mb).max(0.0);
                self.handle_write(event.timestamp, size_mb);
            }
            EventKind::ScheduleWrite => self.handle_schedule_write(event.timestamp),
            EventKind::Flush {
                start_time,
                size_mb,
            } => self.handle_flush(event.timestamp, start_time, size_mb),
            EventKind::CompactionCheck => self.handle_compaction_check(event.timestamp),
            EventKind::Compaction { job_id, .. } => {
                self.handle_compaction(event.timestamp, job_id)
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Write path
    // --------------------------------------------------------------------------------------------

    fn handle_write(&mut self, t: f64, size_mb: f64) {
        // 1. Stall: too many immutable memtables — defer the write past
        // the expected unblocking point.
        if self.lsm.num_immutable_memtables() >= self.config.max_write_buffer_number {
            let unblock_at = self
                .next_flush_completion()
                .unwrap_or(self.scheduler.disk_busy_until())
                .max(t);
            let retry_at = (unblock_at + STALL_RETRY_EPS).max(self.virtual_time);
            self.queue
                .push(Event::new(retry_at, EventKind::StalledWrite { size_mb }));
            self.stalled_write_queued_mb += size_mb;
            if self.stall_start_time.is_none() {
                self.stall_start_time = Some(t);
            }
            self.metrics.record_stall_entry();

            // 2. OOM: the stalled queue outgrew its memory ceiling.
            if self.stalled_write_queued_mb > self.config.max_stalled_write_memory_mb {
                self.metrics.mark_oom_killed();
                self.queue.clear();
                self.stalled_write_queued_mb = 0.0;
            }
            return;
        }

        // 3. Stall cleared.
        if let Some(started) = self.stall_start_time.take() {
            self.metrics.record_stall_exit(t - started);
        }

        // 4. Apply the write.
        self.lsm.active_memtable.current_size_mb += size_mb;
        self.metrics.record_user_write(size_mb);

        if self.config.enable_wal {
            let mut io_secs = size_mb / self.config.io_throughput_mbps;
            if self.config.wal_sync {
                io_secs += self.config.wal_sync_latency_ms / 1000.0;
            }
            let (start, end) = self.scheduler.reserve_disk(t, io_secs);
            self.metrics.record_wal_write(size_mb, start, end);
        }

        // 5. Freeze and schedule the flush.
        if self.lsm.active_memtable.current_size_mb >= self.config.memtable_flush_size_mb
            && self.lsm.num_immutable_memtables() < self.config.max_write_buffer_number
        {
            let frozen_mb = self.lsm.freeze_active_memtable(t);
            let cpu_secs = frozen_mb / self.config.sstable_build_throughput_mbps;
            let io_secs =
                frozen_mb / self.config.io_throughput_mbps + self.config.io_latency_ms / 1000.0;
            let admission = self.scheduler.allocate(t, cpu_secs, io_secs);
            self.pending_flush_completions.push(admission.completion);
            self.metrics
                .begin_flush(admission.cpu_start, admission.completion, frozen_mb);
            self.queue.push(Event::new(
                admission.completion,
                EventKind::Flush {
                    start_time: t,
                    size_mb: frozen_mb,
                },
            ));
            debug!(
                frozen_mb,
                slot = admission.slot,
                completion = admission.completion,
                "memtable frozen; flush scheduled"
            );
        }
    }

    fn handle_schedule_write(&mut self, t: f64) {
        let rate = self.config.write_rate_mbps;
        if rate <= 0.0 {
            // Quiesced; update_config re-arms the chain when the rate
            // turns positive again.
            return;
        }
        self.queue.push(Event::new(
            t,
            EventKind::Write {
                size_mb: WRITE_EVENT_SIZE_MB,
            },
        ));
        let interval = WRITE_EVENT_SIZE_MB / self.instantaneous_rate(t, rate);
        self.queue
            .push(Event::new(t + interval, EventKind::ScheduleWrite));
    }

    /// Generator rate at virtual time `t` under the configured traffic
    /// pattern.
    fn instantaneous_rate(&self, t: f64, mean_rate: f64) -> f64 {
        match self.config.traffic_pattern {
            TrafficPattern::Constant => mean_rate,
            TrafficPattern::Sinusoidal {
                period_secs,
                amplitude,
            } => {
                let phase = 2.0 * std::f64::consts::PI * t / period_secs;
                mean_rate * (1.0 + amplitude * phase.sin())
            }
            TrafficPattern::Bursty {
                period_secs,
                duty_cycle,
                multiplier,
            } => {
                let phase = (t / period_secs).fract();
                if phase < duty_cycle {
                    mean_rate * multiplier
                } else {
                    // Whatever rate the bursts left unused, floored so
                    // the chain keeps ticking.
                    let leftover = (1.0 - duty_cycle * multiplier).max(0.0) / (1.0 - duty_cycle);
                    mean_rate * leftover.max(BURST_OFF_RATE_FLOOR)
                }
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Flush path
    // --------------------------------------------------------------------------------------------

    fn handle_flush(&mut self, t: f64, start_time: f64, size_mb: f64) {
        let file_id = self.lsm.append_l0_file(size_mb, t);
        if self.lsm.pop_oldest_immutable().is_none() {
            warn!(t, "flush completed with no immutable memtable to retire");
        }
        self.metrics.complete_flush(size_mb, t);

        // Drop this completion from the pending list.
        if let Some(idx) = self
            .pending_flush_completions
            .iter()
            .position(|c| (*c - t).abs() < f64::EPSILON || *c <= t)
        {
            self.pending_flush_completions.swap_remove(idx);
        }

        debug!(
            file_id,
            size_mb,
            start_time,
            immutables = self.lsm.num_immutable_memtables(),
            "flush completed; L0 file appended"
        );
    }

    /// Earliest in-flight flush completion, the stall-clear signal.
    fn next_flush_completion(&self) -> Option<f64> {
        self.pending_flush_completions
            .iter()
            .copied()
            .min_by(f64::total_cmp)
    }

    // --------------------------------------------------------------------------------------------
    // Compaction path
    // --------------------------------------------------------------------------------------------

    fn handle_compaction_check(&mut self, t: f64) {
        while self.active_compactions.len() < self.config.max_background_jobs {
            let active: BTreeSet<usize> = self.active_compactions.keys().copied().collect();
            let ctx = PickContext {
                active_levels: &active,
                inflow_mb: &self.inflow_mb,
            };
            let Some(mut job) = self.compactor.pick_compaction(&self.lsm, &ctx, &self.config)
            else {
                break;
            };

            // Claim the chosen files so later picks skip them.
            for file in &job.source_files {
                if let Some(level) = self.lsm.find_file_level(file.id) {
                    self.lsm.level_mut(level).mark_compacting(file.id);
                }
            }
            for file in &job.target_files {
                self.lsm.level_mut(job.to_level).mark_compacting(file.id);
            }
            self.lsm
                .level_mut(job.to_level)
                .add_target_compacting(job.target_files.len());

            // Duration model: CPU scales with input + estimated output
            // at the build rate, I/O with the same total at the disk
            // rate. Subcompactions divide both (parallel in the
            // abstract; the scheduler sees the max sub-duration).
            let input_mb = job.input_mb();
            let est_output_mb = input_mb * self.reduction_for(&job);
            if self.config.max_subcompactions > 1
                && job.qualifies_for_subcompactions(self.config.compaction_style)
            {
                job.subcompactions = self
                    .config
                    .max_subcompactions
                    .min(job.source_files.len().max(1));
            }
            let divisor = job.subcompactions as f64;
            let total_mb = input_mb + est_output_mb;
            let cpu_secs = total_mb / self.config.sstable_build_throughput_mbps / divisor;
            let io_secs = total_mb / self.config.io_throughput_mbps / divisor
                + self.config.io_latency_ms / 1000.0;

            let admission = self.scheduler.allocate(t, cpu_secs, io_secs);
            self.inflow_mb[job.to_level] += input_mb;
            self.metrics.begin_compaction(
                job.id,
                admission.cpu_start,
                admission.completion,
                input_mb,
                est_output_mb,
                job.from_level,
                job.to_level,
            );
            self.queue.push(Event::new(
                admission.completion,
                EventKind::Compaction {
                    start_time: admission.cpu_start,
                    job_id: job.id,
                    from_level: job.from_level,
                    to_level: job.to_level,
                    input_mb,
                    output_mb: est_output_mb,
                },
            ));
            debug!(
                job_id = job.id,
                from_level = job.from_level,
                to_level = job.to_level,
                input_mb,
                subcompactions = job.subcompactions,
                completion = admission.completion,
                "compaction scheduled"
            );
            self.active_compactions.insert(job.from_level, job.id);
            self.pending_compactions.insert(job.id, job);
        }

        self.queue.push(Event::new(
            t + COMPACTION_CHECK_INTERVAL_SECS,
            EventKind::CompactionCheck,
        ));
    }

    fn handle_compaction(&mut self, t: f64, job_id: u64) {
        let Some(job) = self.pending_compactions.remove(&job_id) else {
            warn!(job_id, "compaction completion for unknown job; ignoring");
            return;
        };

        // Release claims before execution mutates the file lists.
        for file in &job.source_files {
            if let Some(level) = self.lsm.find_file_level(file.id) {
                self.lsm.level_mut(level).unmark_compacting(file.id);
            }
        }
        for file in &job.target_files {
            self.lsm.level_mut(job.to_level).unmark_compacting(file.id);
        }
        self.lsm
            .level_mut(job.to_level)
            .sub_target_compacting(job.target_files.len());
        self.inflow_mb[job.to_level] = (self.inflow_mb[job.to_level] - job.input_mb()).max(0.0);

        let outcome = self
            .compactor
            .execute(&job, &mut self.lsm, &self.config, t);
        self.metrics.complete_compaction(
            job.id,
            outcome.input_mb,
            outcome.output_mb,
            outcome.trivial_move,
        );
        self.active_compactions.remove(&job.from_level);

        debug!(
            job_id,
            input_mb = outcome.input_mb,
            output_mb = outcome.output_mb,
            output_files = outcome.output_file_count,
            trivial = outcome.trivial_move,
            "compaction completed"
        );
    }

    /// Output/input ratio the duration model assumes for a job.
    fn reduction_for(&self, job: &CompactionJob) -> f64 {
        if job.from_level == 0 {
            self.config.compaction_reduction_factor
        } else {
            crate::compaction::DEEP_LEVEL_REDUCTION
        }
    }
}
