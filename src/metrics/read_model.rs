//! Statistical read-path model.
//!
//! Reads are not events: at each metrics refresh a synthetic batch of
//! 1000 requests is drawn according to the configured mix, each kind's
//! latency distribution is sampled, and the batch's mean/p50/p99 feed
//! the EMA-smoothed [`ReadLatencyStats`]. Point lookups take the max of
//! `read_amplification` independent samples, modelling the parallel
//! probes of a real lookup.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Normal};
use rand_pcg::Pcg64;
use serde::Serialize;

use crate::config::ReadWorkload;
use crate::metrics::Ema;

/// Requests per synthetic batch.
const BATCH_SIZE: usize = 1000;

/// Seed offset deriving the read-model RNG from the master seed.
const READ_MODEL_SEED_OFFSET: u64 = 0x85eb_ca6b;

/// Assumed bytes transferred by a point-shaped request (cache hit,
/// bloom negative, point lookup), KB.
const POINT_READ_KB: f64 = 4.0;
/// Assumed bytes transferred by a scan, KB.
const SCAN_READ_KB: f64 = 256.0;

// ------------------------------------------------------------------------------------------------
// ReadLatencyStats
// ------------------------------------------------------------------------------------------------

/// EMA-smoothed read-path statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReadLatencyStats {
    /// Mean request latency, microseconds.
    pub mean_us: f64,
    /// Median request latency, microseconds.
    pub p50_us: f64,
    /// 99th-percentile request latency, microseconds.
    pub p99_us: f64,
    /// Jittered request rate this refresh.
    pub requests_per_sec: f64,
    /// Estimated read bandwidth, MB/s.
    pub bandwidth_mbps: f64,
}

// ------------------------------------------------------------------------------------------------
// ReadPathModel
// ------------------------------------------------------------------------------------------------

/// Sampler state: one RNG plus the smoothing accumulators.
#[derive(Debug, Clone)]
pub struct ReadPathModel {
    rng: Pcg64,
    mean_ema: Ema,
    p50_ema: Ema,
    p99_ema: Ema,
    bandwidth_ema: Ema,
}

impl ReadPathModel {
    /// Builds a model seeded from the master seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed.wrapping_add(READ_MODEL_SEED_OFFSET)),
            mean_ema: Ema::default(),
            p50_ema: Ema::default(),
            p99_ema: Ema::default(),
            bandwidth_ema: Ema::default(),
        }
    }

    /// Draws one batch and returns the smoothed statistics.
    pub fn update(&mut self, workload: &ReadWorkload, read_amplification: f64) -> ReadLatencyStats {
        let mix = [
            workload.mix.cache_hit,
            workload.mix.bloom_negative,
            workload.mix.scan,
            workload.mix.point_lookup,
        ];
        let mix_total: f64 = mix.iter().sum();
        if mix_total <= 0.0 {
            return ReadLatencyStats::default();
        }

        let probes = (read_amplification.ceil() as usize).max(1);
        let mut latencies = Vec::with_capacity(BATCH_SIZE);
        let mut scan_count = 0usize;
        for _ in 0..BATCH_SIZE {
            let mut pick = self.rng.gen_range(0.0..mix_total);
            let kind = mix
                .iter()
                .position(|w| {
                    if pick < *w {
                        true
                    } else {
                        pick -= w;
                        false
                    }
                })
                .unwrap_or(mix.len() - 1);

            let latency_us = match kind {
                0 => workload.cache_hit_latency_us.sample(&mut self.rng),
                1 => workload.bloom_negative_latency_us.sample(&mut self.rng),
                2 => {
                    scan_count += 1;
                    workload.scan_latency_us.sample(&mut self.rng)
                }
                // A point lookup probes every sorted component; its
                // latency is the max of the parallel probes.
                _ => (0..probes)
                    .map(|_| workload.point_lookup_latency_us.sample(&mut self.rng))
                    .fold(0.0, f64::max),
            };
            latencies.push(latency_us.max(0.0));
        }

        latencies.sort_by(f64::total_cmp);
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        let p50 = latencies[latencies.len() / 2];
        let p99 = latencies[latencies.len() * 99 / 100];

        let jitter = if workload.variability_cv > 0.0 {
            match Normal::new(1.0, workload.variability_cv) {
                Ok(normal) => normal.sample(&mut self.rng).max(0.0),
                Err(_) => 1.0,
            }
        } else {
            1.0
        };
        let requests_per_sec = workload.requests_per_sec * jitter;

        let scan_fraction = scan_count as f64 / BATCH_SIZE as f64;
        let kb_per_request =
            scan_fraction * SCAN_READ_KB + (1.0 - scan_fraction) * POINT_READ_KB;
        let bandwidth_raw = requests_per_sec * kb_per_request / 1024.0;

        ReadLatencyStats {
            mean_us: self.mean_ema.update(mean),
            p50_us: self.p50_ema.update(p50),
            p99_us: self.p99_ema.update(p99),
            requests_per_sec,
            bandwidth_mbps: self.bandwidth_ema.update(bandwidth_raw),
        }
    }
}
