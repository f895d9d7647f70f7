//! # lsmsim
//!
//! A **deterministic discrete-event simulator** of RocksDB-style
//! LSM-tree storage engines. Given a configuration describing hardware
//! capacity, workload characteristics, and LSM tuning knobs, it advances
//! *virtual time* and exposes, at each step, the evolving tree (files
//! per level, memtables, in-flight jobs), amplification factors,
//! throughput, and stall/OOM indicators.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      Simulator                         │
//! │  ┌───────────┐   ┌────────────┐   ┌────────────────┐  │
//! │  │  Event    │──►│  Handlers  │──►│   LSM tree     │  │
//! │  │  queue    │   │ write/flush│   │ levels + files │  │
//! │  │ (min-heap)│   │ compaction │   │  + memtables   │  │
//! │  └───────────┘   └─────┬──────┘   └────────────────┘  │
//! │                        │                               │
//! │  ┌─────────────────────┴──────────────────────────┐   │
//! │  │  Job scheduler (slots + single shared disk)    │   │
//! │  └─────────────────────┬──────────────────────────┘   │
//! │                        ▼                               │
//! │  ┌────────────────────────────────────────────────┐   │
//! │  │  Metrics (amplification, EMA throughput,       │   │
//! │  │  sustainable band, statistical read path)      │   │
//! │  └────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`simulator`] | The stepper — owns all state, routes events, manages jobs, stalls, OOM |
//! | [`event`] | Tagged event union and the timestamp-ordered min-heap |
//! | [`lsm`] | Data model — levels, SST files, memtable lifecycle |
//! | [`compaction`] | Leveled and universal strategies, shared execution mechanics |
//! | [`metrics`] | Counters, amplification factors, smoothed throughput, read-path model |
//! | [`config`] | The option bundle, defaults, and validation |
//! | [`distributions`] | Sampling helpers shared by the pickers and the read model |
//!
//! ## Guarantees
//!
//! - **Determinism:** identical config + identical seed ⇒ identical
//!   trace, bit for bit. All randomness flows through seeded `Pcg64`
//!   instances, one per concern.
//! - **Monotonic time:** `virtual_time` never decreases; no handler may
//!   schedule an event in the past.
//! - **Single-threaded:** no locks, no atomics, no internal tasks. The
//!   caller drives progress by calling [`Simulator::step`] repeatedly.
//!
//! ## Quick Start
//!
//! ```rust
//! use lsmsim::{Config, Simulator};
//!
//! let config = Config {
//!     write_rate_mbps: 100.0,
//!     ..Config::default()
//! };
//! let mut sim = Simulator::new(config).unwrap();
//!
//! // One UI frame ≈ one step.
//! for _ in 0..100 {
//!     sim.step();
//! }
//!
//! let metrics = sim.metrics();
//! assert!(metrics.write_amplification >= 1.0);
//!
//! let state = sim.state();
//! println!(
//!     "t={:.1}s files={}",
//!     state.virtual_time,
//!     state.levels.iter().map(|l| l.file_count).sum::<usize>(),
//! );
//! ```

pub mod compaction;
pub mod config;
pub mod distributions;
pub mod event;
pub mod lsm;
pub mod metrics;
pub mod simulator;

pub use config::{CompactionStyle, Config, ConfigError, ReadWorkload, TrafficPattern};
pub use simulator::snapshot::StateSnapshot;
pub use simulator::Simulator;
