//! # Configuration Module
//!
//! The [`Config`] bundle describes everything the simulator needs to run:
//! hardware capacity (disk throughput, SST build rate, I/O latency),
//! workload shape (write rate, traffic pattern, read mix), and the LSM
//! tuning knobs familiar from RocksDB (level sizing, compaction style,
//! write-buffer limits).
//!
//! Validation happens at the edge: [`Config::validate`] is called by
//! `Simulator::new` and `Simulator::update_config`, and a failed
//! validation leaves the simulator untouched.
//!
//! A handful of values are *coerced* rather than rejected, matching
//! RocksDB's own option sanitization:
//!
//! - `simulation_speed_multiplier ≤ 0` is treated as `1`,
//! - `max_size_amplification_percent = 0` is treated as the 200% default.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distributions::Distribution;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Returned when a [`Config`] fails validation.
///
/// Construction and hot-update both validate first and leave the
/// simulator state unchanged on failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric option is outside its admissible range.
    #[error("invalid value for {option}: {reason}")]
    InvalidOption {
        /// Name of the offending option.
        option: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Enums
// ------------------------------------------------------------------------------------------------

/// Which compaction strategy family the simulator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompactionStyle {
    /// Leveled compaction: score-driven, level-targeted, RocksDB default.
    Leveled,
    /// Universal (tiered) compaction over sorted runs.
    Universal,
}

/// Shape of the write-arrival process.
///
/// Only the inter-arrival formula of the `ScheduleWrite` chain changes;
/// every pattern produces 1 MB writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrafficPattern {
    /// Constant-rate generator: one write every `1 / write_rate_mbps` seconds.
    Constant,
    /// Rate oscillates as `rate × (1 + amplitude × sin(2πt / period))`.
    Sinusoidal {
        /// Full oscillation period in virtual seconds.
        period_secs: f64,
        /// Relative swing, in `[0, 1)`.
        amplitude: f64,
    },
    /// On/off bursts: `rate × multiplier` for the duty fraction of each
    /// period, a trickle otherwise.
    Bursty {
        /// Burst cycle length in virtual seconds.
        period_secs: f64,
        /// Fraction of the period spent bursting, in `(0, 1)`.
        duty_cycle: f64,
        /// Rate multiplier while bursting, `≥ 1`.
        multiplier: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// Read workload
// ------------------------------------------------------------------------------------------------

/// Mix of request kinds in the statistical read model.
///
/// Fractions are normalized at sampling time, so they need not sum to
/// exactly 1 — but all must be non-negative and at least one positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadMix {
    /// Requests served from the block cache.
    pub cache_hit: f64,
    /// Point lookups rejected by a bloom filter.
    pub bloom_negative: f64,
    /// Range scans.
    pub scan: f64,
    /// Point lookups that go to disk.
    pub point_lookup: f64,
}

impl Default for ReadMix {
    fn default() -> Self {
        Self {
            cache_hit: 0.60,
            bloom_negative: 0.10,
            scan: 0.05,
            point_lookup: 0.25,
        }
    }
}

/// Configuration of the statistical read-path model.
///
/// The read path produces no events; see `metrics::read_model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadWorkload {
    /// Master switch. When false, no read statistics are produced.
    pub enabled: bool,
    /// Mean read request rate.
    pub requests_per_sec: f64,
    /// Distribution of request kinds.
    pub mix: ReadMix,
    /// Latency of a cache hit, microseconds.
    pub cache_hit_latency_us: Distribution,
    /// Latency of a bloom-filter negative, microseconds.
    pub bloom_negative_latency_us: Distribution,
    /// Latency of a range scan, microseconds.
    pub scan_latency_us: Distribution,
    /// Latency of a single point-lookup probe, microseconds. The model
    /// takes the max of `read_amplification` independent samples.
    pub point_lookup_latency_us: Distribution,
    /// Coefficient of variation of the per-update request-rate jitter.
    pub variability_cv: f64,
}

impl Default for ReadWorkload {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_sec: 1000.0,
            mix: ReadMix::default(),
            cache_hit_latency_us: Distribution::Uniform { min: 1.0, max: 10.0 },
            bloom_negative_latency_us: Distribution::Uniform { min: 2.0, max: 15.0 },
            scan_latency_us: Distribution::Exponential { mean: 2000.0 },
            point_lookup_latency_us: Distribution::Exponential { mean: 150.0 },
            variability_cv: 0.1,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Config
// ------------------------------------------------------------------------------------------------

/// The full simulator parameter bundle.
///
/// Sizes are megabytes, rates MB/s, latencies milliseconds, and time
/// virtual seconds throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // --- workload ---
    /// Mean user write rate. `0` quiesces the write generator.
    pub write_rate_mbps: f64,
    /// Shape of the write-arrival process.
    pub traffic_pattern: TrafficPattern,
    /// Statistical read-path model.
    pub read_workload: ReadWorkload,

    // --- memtables ---
    /// Active-memtable size that triggers a freeze.
    pub memtable_flush_size_mb: f64,
    /// Max immutable memtables before writes stall.
    pub max_write_buffer_number: usize,
    /// Aggregate stalled-write bytes beyond which the simulation is
    /// OOM-killed.
    pub max_stalled_write_memory_mb: f64,

    // --- background work ---
    /// Number of background job slots shared by flushes and compactions.
    pub max_background_jobs: usize,
    /// Max parallel sub-jobs a single compaction may be split into.
    pub max_subcompactions: usize,

    // --- hardware ---
    /// Sequential disk bandwidth. All I/O phases serialize on one disk.
    pub io_throughput_mbps: f64,
    /// CPU-side SST build rate (compression, index/filter construction).
    pub sstable_build_throughput_mbps: f64,
    /// Fixed per-I/O latency added to every flush/compaction I/O phase.
    pub io_latency_ms: f64,

    // --- LSM shape ---
    /// Compaction strategy family.
    pub compaction_style: CompactionStyle,
    /// Number of levels, L0 included.
    pub num_levels: usize,
    /// L0 file count that makes L0's compaction score reach 1.
    pub l0_compaction_trigger: usize,
    /// Target size of the base level (static mode: of L1).
    pub max_bytes_for_level_base_mb: f64,
    /// Size ratio between adjacent levels.
    pub level_multiplier: f64,
    /// Target output file size at the base level.
    pub target_file_size_mb: f64,
    /// Per-level multiplier on the target output file size.
    pub target_file_size_multiplier: f64,
    /// Cap on total input bytes of a single compaction.
    pub max_compaction_bytes_mb: f64,
    /// Output/input size ratio for compactions out of L0. Deeper-level
    /// compactions dedup less and use a fixed 0.99.
    pub compaction_reduction_factor: f64,
    /// Dynamic level targets computed back from the deepest non-empty
    /// level, RocksDB `level_compaction_dynamic_level_bytes`.
    pub level_compaction_dynamic_level_bytes: bool,
    /// Universal: size-amplification trigger percent. `0` coerces to the
    /// RocksDB default of 200.
    pub max_size_amplification_percent: f64,
    /// Universal: size-ratio slack percent when accumulating sorted runs.
    pub universal_size_ratio_percent: f64,
    /// Universal: cap on sorted runs merged at once. `0` means unlimited.
    pub universal_max_merge_width: usize,
    /// Leveled: distribution of the fraction of target-level files that
    /// overlap a compaction's key range.
    pub overlap_fraction: Distribution,

    // --- WAL ---
    /// Account WAL writes against the shared disk.
    pub enable_wal: bool,
    /// Synchronous WAL: add `wal_sync_latency_ms` per write.
    pub wal_sync: bool,
    /// Latency of one WAL fsync.
    pub wal_sync_latency_ms: f64,

    // --- simulation ---
    /// Virtual seconds advanced per `step()` = `0.1 × multiplier`.
    /// Values `≤ 0` are treated as 1.
    pub simulation_speed_multiplier: f64,
    /// Master RNG seed. Identical seed + config ⇒ identical trace.
    pub random_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_rate_mbps: 10.0,
            traffic_pattern: TrafficPattern::Constant,
            read_workload: ReadWorkload::default(),

            memtable_flush_size_mb: 64.0,
            max_write_buffer_number: 2,
            max_stalled_write_memory_mb: 4096.0,

            max_background_jobs: 2,
            max_subcompactions: 1,

            io_throughput_mbps: 100.0,
            sstable_build_throughput_mbps: 75.0,
            io_latency_ms: 1.0,

            compaction_style: CompactionStyle::Leveled,
            num_levels: 7,
            l0_compaction_trigger: 4,
            max_bytes_for_level_base_mb: 256.0,
            level_multiplier: 10.0,
            target_file_size_mb: 64.0,
            target_file_size_multiplier: 1.0,
            max_compaction_bytes_mb: 1600.0,
            compaction_reduction_factor: 0.9,
            level_compaction_dynamic_level_bytes: true,
            max_size_amplification_percent: 200.0,
            universal_size_ratio_percent: 1.0,
            universal_max_merge_width: 0,
            overlap_fraction: Distribution::Uniform { min: 0.1, max: 0.5 },

            enable_wal: true,
            wal_sync: false,
            wal_sync_latency_ms: 0.1,

            simulation_speed_multiplier: 1.0,
            random_seed: 42,
        }
    }
}

impl Config {
    /// Checks every option against its admissible range.
    ///
    /// Returns the first violation found. Coercible values
    /// (`simulation_speed_multiplier`, `max_size_amplification_percent`)
    /// are *not* errors; see [`Config::speed_multiplier`] and
    /// [`Config::size_amplification_percent`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.write_rate_mbps >= 0.0) || !self.write_rate_mbps.is_finite() {
            return Err(ConfigError::invalid(
                "write_rate_mbps",
                "must be finite and ≥ 0",
            ));
        }
        if let TrafficPattern::Sinusoidal {
            period_secs,
            amplitude,
        } = self.traffic_pattern
        {
            if period_secs <= 0.0 {
                return Err(ConfigError::invalid(
                    "traffic_pattern.period_secs",
                    "must be > 0",
                ));
            }
            if !(0.0..1.0).contains(&amplitude) {
                return Err(ConfigError::invalid(
                    "traffic_pattern.amplitude",
                    "must be in [0, 1)",
                ));
            }
        }
        if let TrafficPattern::Bursty {
            period_secs,
            duty_cycle,
            multiplier,
        } = self.traffic_pattern
        {
            if period_secs <= 0.0 {
                return Err(ConfigError::invalid(
                    "traffic_pattern.period_secs",
                    "must be > 0",
                ));
            }
            if !(0.0 < duty_cycle && duty_cycle < 1.0) {
                return Err(ConfigError::invalid(
                    "traffic_pattern.duty_cycle",
                    "must be in (0, 1)",
                ));
            }
            if multiplier < 1.0 {
                return Err(ConfigError::invalid(
                    "traffic_pattern.multiplier",
                    "must be ≥ 1",
                ));
            }
        }

        if self.memtable_flush_size_mb <= 0.0 {
            return Err(ConfigError::invalid(
                "memtable_flush_size_mb",
                "must be > 0",
            ));
        }
        if self.max_write_buffer_number == 0 {
            return Err(ConfigError::invalid(
                "max_write_buffer_number",
                "must be ≥ 1",
            ));
        }
        if self.max_stalled_write_memory_mb <= 0.0 {
            return Err(ConfigError::invalid(
                "max_stalled_write_memory_mb",
                "must be > 0",
            ));
        }
        if self.max_background_jobs == 0 {
            return Err(ConfigError::invalid("max_background_jobs", "must be ≥ 1"));
        }
        if self.max_subcompactions == 0 {
            return Err(ConfigError::invalid("max_subcompactions", "must be ≥ 1"));
        }
        if self.io_throughput_mbps <= 0.0 {
            return Err(ConfigError::invalid("io_throughput_mbps", "must be > 0"));
        }
        if self.sstable_build_throughput_mbps <= 0.0 {
            return Err(ConfigError::invalid(
                "sstable_build_throughput_mbps",
                "must be > 0",
            ));
        }
        if self.io_latency_ms < 0.0 {
            return Err(ConfigError::invalid("io_latency_ms", "must be ≥ 0"));
        }

        if self.num_levels < 2 {
            return Err(ConfigError::invalid("num_levels", "must be ≥ 2"));
        }
        if self.l0_compaction_trigger == 0 {
            return Err(ConfigError::invalid("l0_compaction_trigger", "must be ≥ 1"));
        }
        if self.max_bytes_for_level_base_mb <= 0.0 {
            return Err(ConfigError::invalid(
                "max_bytes_for_level_base_mb",
                "must be > 0",
            ));
        }
        if self.level_multiplier <= 1.0 {
            return Err(ConfigError::invalid("level_multiplier", "must be > 1"));
        }
        if self.target_file_size_mb <= 0.0 {
            return Err(ConfigError::invalid("target_file_size_mb", "must be > 0"));
        }
        if self.target_file_size_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "target_file_size_multiplier",
                "must be ≥ 1",
            ));
        }
        if self.max_compaction_bytes_mb <= 0.0 {
            return Err(ConfigError::invalid(
                "max_compaction_bytes_mb",
                "must be > 0",
            ));
        }
        if !(0.0 < self.compaction_reduction_factor && self.compaction_reduction_factor <= 1.0) {
            return Err(ConfigError::invalid(
                "compaction_reduction_factor",
                "must be in (0, 1]",
            ));
        }
        if self.max_size_amplification_percent < 0.0 {
            return Err(ConfigError::invalid(
                "max_size_amplification_percent",
                "must be ≥ 0",
            ));
        }
        if self.universal_size_ratio_percent < 0.0 {
            return Err(ConfigError::invalid(
                "universal_size_ratio_percent",
                "must be ≥ 0",
            ));
        }
        self.overlap_fraction
            .validate()
            .map_err(|reason| ConfigError::invalid("overlap_fraction", reason))?;

        if self.wal_sync_latency_ms < 0.0 {
            return Err(ConfigError::invalid("wal_sync_latency_ms", "must be ≥ 0"));
        }

        let rw = &self.read_workload;
        if rw.enabled {
            if rw.requests_per_sec <= 0.0 {
                return Err(ConfigError::invalid(
                    "read_workload.requests_per_sec",
                    "must be > 0 when the read workload is enabled",
                ));
            }
            let mix = [
                rw.mix.cache_hit,
                rw.mix.bloom_negative,
                rw.mix.scan,
                rw.mix.point_lookup,
            ];
            if mix.iter().any(|f| *f < 0.0) || mix.iter().sum::<f64>() <= 0.0 {
                return Err(ConfigError::invalid(
                    "read_workload.mix",
                    "fractions must be ≥ 0 and not all zero",
                ));
            }
            if rw.variability_cv < 0.0 {
                return Err(ConfigError::invalid(
                    "read_workload.variability_cv",
                    "must be ≥ 0",
                ));
            }
            for (name, dist) in [
                ("read_workload.cache_hit_latency_us", &rw.cache_hit_latency_us),
                (
                    "read_workload.bloom_negative_latency_us",
                    &rw.bloom_negative_latency_us,
                ),
                ("read_workload.scan_latency_us", &rw.scan_latency_us),
                (
                    "read_workload.point_lookup_latency_us",
                    &rw.point_lookup_latency_us,
                ),
            ] {
                dist.validate()
                    .map_err(|reason| ConfigError::invalid(name, reason))?;
            }
        }

        Ok(())
    }

    /// Effective speed multiplier: values `≤ 0` fall back to 1.
    pub fn speed_multiplier(&self) -> f64 {
        if self.simulation_speed_multiplier <= 0.0 {
            1.0
        } else {
            self.simulation_speed_multiplier
        }
    }

    /// Effective universal size-amplification trigger: `0` falls back to
    /// the 200% RocksDB default.
    pub fn size_amplification_percent(&self) -> f64 {
        if self.max_size_amplification_percent == 0.0 {
            200.0
        } else {
            self.max_size_amplification_percent
        }
    }

    /// True when `other` differs only in hot-updatable options
    /// (`write_rate_mbps`); any structural difference forces a reset.
    pub fn hot_updatable_from(&self, other: &Config) -> bool {
        let mut normalized = other.clone();
        normalized.write_rate_mbps = self.write_rate_mbps;
        normalized == *self
    }
}
