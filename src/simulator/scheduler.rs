//! Background job slots and the shared-disk model.
//!
//! Every flush and compaction runs in two phases: a CPU phase (SST
//! build) that only contends for a job slot, and an I/O phase that
//! additionally serializes on the single simulated disk. WAL appends
//! take the disk without occupying a slot.

use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// JobAdmission
// ------------------------------------------------------------------------------------------------

/// Where and when an admitted job runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JobAdmission {
    /// Index of the slot the job occupies.
    pub slot: usize,
    /// CPU phase start: `max(arrival, slot free)`.
    pub cpu_start: f64,
    /// I/O phase start: `max(cpu end, disk free)`.
    pub io_start: f64,
    /// Completion time; the slot and the disk are busy until then.
    pub completion: f64,
}

// ------------------------------------------------------------------------------------------------
// JobScheduler
// ------------------------------------------------------------------------------------------------

/// `max_background_jobs` slots, each holding its occupant's completion
/// time, plus the single disk's busy-until scalar.
#[derive(Debug, Clone, Serialize)]
pub struct JobScheduler {
    job_slots: Vec<f64>,
    disk_busy_until: f64,
}

impl JobScheduler {
    /// Builds an idle scheduler with the given slot count.
    pub fn new(max_background_jobs: usize) -> Self {
        Self {
            job_slots: vec![0.0; max_background_jobs.max(1)],
            disk_busy_until: 0.0,
        }
    }

    /// Admits a two-phase job: earliest-free slot, CPU phase off-disk,
    /// I/O phase serialized behind `disk_busy_until`.
    pub fn allocate(&mut self, arrival: f64, cpu_duration: f64, io_duration: f64) -> JobAdmission {
        let slot = self
            .job_slots
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        let slot_free_at = self.job_slots[slot];

        let cpu_start = arrival.max(slot_free_at);
        let cpu_end = cpu_start + cpu_duration;
        let io_start = cpu_end.max(self.disk_busy_until);
        let completion = io_start + io_duration;

        self.job_slots[slot] = completion;
        self.disk_busy_until = completion;

        JobAdmission {
            slot,
            cpu_start,
            io_start,
            completion,
        }
    }

    /// Occupies the disk only (WAL append). Returns the I/O interval.
    pub fn reserve_disk(&mut self, arrival: f64, io_duration: f64) -> (f64, f64) {
        let start = arrival.max(self.disk_busy_until);
        let end = start + io_duration;
        self.disk_busy_until = end;
        (start, end)
    }

    /// When the disk next goes idle.
    pub fn disk_busy_until(&self) -> f64 {
        self.disk_busy_until
    }

    /// Per-slot busy-until times.
    pub fn job_slots(&self) -> &[f64] {
        &self.job_slots
    }
}
