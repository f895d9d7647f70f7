//! Throughput windowing, EMA smoothing, and the disk cap.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::lsm::LsmTree;
    use crate::metrics::{Ema, Metrics};

    const EPS: f64 = 1e-9;

    /// The first EMA sample initializes the average instead of being
    /// smoothed against zero.
    #[test]
    fn ema_first_sample_initializes() {
        let mut ema = Ema::default();
        assert_eq!(ema.get(), 0.0);
        assert_eq!(ema.update(50.0), 50.0);
        // Second sample smooths with α = 0.2.
        let next = ema.update(100.0);
        assert!((next - 60.0).abs() < EPS);
        assert!((ema.get() - 60.0).abs() < EPS);
    }

    /// # Scenario
    /// A flush active across the sampling window contributes
    /// `output / duration` to flush throughput.
    #[test]
    fn active_flush_contributes_its_bandwidth() {
        let config = Config::default();
        let lsm = LsmTree::new(7, 64.0);
        let mut metrics = Metrics::new(&config);

        // 64 MB over exactly one second.
        metrics.begin_flush(0.0, 1.0, 64.0);
        metrics.refresh(0.5, &lsm, &config);

        assert!((metrics.flush_throughput_mbps - 64.0).abs() < EPS);
        assert!((metrics.disk_utilization_percent - 64.0).abs() < EPS);
    }

    /// # Scenario
    /// Only the single compaction active at `now` contributes — the
    /// serialized-disk model admits one writer at a time.
    #[test]
    fn only_one_compaction_counts() {
        let config = Config::default();
        let lsm = LsmTree::new(7, 64.0);
        let mut metrics = Metrics::new(&config);

        metrics.begin_compaction(1, 0.0, 2.0, 50.0, 40.0, 0, 1);
        metrics.begin_compaction(2, 0.0, 2.0, 80.0, 70.0, 1, 2);
        metrics.refresh(1.0, &lsm, &config);

        // Job 1 is found first: (50 + 40) / 2 = 45 MB/s.
        assert!((metrics.compaction_throughput_mbps - 45.0).abs() < EPS);
    }

    /// Combined flush + compaction bandwidth is capped at the physical
    /// disk rate, and utilization clips at 100%.
    #[test]
    fn cap_scales_components_to_the_disk_rate() {
        let config = Config::default(); // io_throughput = 100 MB/s
        let lsm = LsmTree::new(7, 64.0);
        let mut metrics = Metrics::new(&config);

        // 128 MB/s of flush + 95 MB/s of compaction, both over-subscribed.
        metrics.begin_flush(0.0, 1.0, 128.0);
        metrics.begin_compaction(1, 0.0, 2.0, 100.0, 90.0, 0, 1);
        metrics.refresh(0.5, &lsm, &config);

        let total = metrics.flush_throughput_mbps + metrics.compaction_throughput_mbps;
        assert!((total - 100.0).abs() < 1e-6);
        assert!((metrics.disk_utilization_percent - 100.0).abs() < EPS);
    }

    /// Completed activities age out of the window and stop contributing.
    #[test]
    fn stale_activities_stop_contributing() {
        let config = Config::default();
        let lsm = LsmTree::new(7, 64.0);
        let mut metrics = Metrics::new(&config);

        metrics.begin_flush(0.0, 1.0, 64.0);
        metrics.complete_flush(64.0, 1.0);
        metrics.refresh(1.0, &lsm, &config);
        assert!(metrics.flush_throughput_mbps > 0.0);

        // Two seconds later the activity is far outside the window;
        // the EMA decays toward zero.
        metrics.refresh(3.0, &lsm, &config);
        let decayed = metrics.flush_throughput_mbps;
        metrics.refresh(5.0, &lsm, &config);
        assert!(metrics.flush_throughput_mbps < decayed);
    }

    /// The sustainable band orders `min ≤ max` and responds to the
    /// compaction style's overhead factor.
    #[test]
    fn sustainable_band_is_ordered_and_style_dependent() {
        let lsm = LsmTree::new(7, 64.0);

        let leveled = Config::default();
        let mut metrics = Metrics::new(&leveled);
        metrics.refresh(0.1, &lsm, &leveled);
        let leveled_max = metrics.max_sustainable_rate_mbps;
        assert!(metrics.min_sustainable_rate_mbps <= leveled_max);
        assert!((leveled_max - 100.0 / (1.0 + 2.5 * 3.0)).abs() < EPS);

        let universal = Config {
            compaction_style: crate::config::CompactionStyle::Universal,
            ..Config::default()
        };
        let mut metrics = Metrics::new(&universal);
        metrics.refresh(0.1, &lsm, &universal);
        assert!((metrics.max_sustainable_rate_mbps - 100.0 / (1.0 + 1.8 * 3.0)).abs() < EPS);
        assert!(
            metrics.max_sustainable_rate_mbps > leveled_max,
            "universal's lighter overhead sustains a higher rate"
        );
    }
}
