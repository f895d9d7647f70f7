//! Determinism — identical seeds replay identical traces.

#[cfg(test)]
mod tests {
    use crate::config::{CompactionStyle, Config};
    use crate::simulator::Simulator;

    fn busy_config(style: CompactionStyle) -> Config {
        Config {
            write_rate_mbps: 80.0,
            compaction_style: style,
            random_seed: 1234,
            ..Config::default()
        }
    }

    /// # Scenario
    /// Two simulators with the same config and seed, stepped in
    /// lockstep, must agree bit-for-bit on state and counters.
    #[test]
    fn identical_configs_replay_identically() {
        for style in [CompactionStyle::Leveled, CompactionStyle::Universal] {
            let config = busy_config(style);
            let mut a = Simulator::new(config.clone()).unwrap();
            let mut b = Simulator::new(config).unwrap();

            for _ in 0..200 {
                a.step();
                b.step();
            }

            assert_eq!(a.state(), b.state(), "{style:?} state diverged");
            let (ma, mb) = (a.metrics(), b.metrics());
            assert_eq!(ma.total_disk_written_mb, mb.total_disk_written_mb);
            assert_eq!(ma.total_flush_written_mb, mb.total_flush_written_mb);
            assert_eq!(ma.total_compaction_input_mb, mb.total_compaction_input_mb);
            assert_eq!(ma.write_amplification, mb.write_amplification);
            assert_eq!(ma.stalled_write_count, mb.stalled_write_count);
        }
    }

    /// # Scenario
    /// Reset-then-run reproduces the original run exactly: the reset
    /// re-seeds every RNG from the master seed.
    #[test]
    fn reset_then_rerun_is_identical() {
        let config = busy_config(CompactionStyle::Leveled);
        let mut sim = Simulator::new(config).unwrap();

        for _ in 0..150 {
            sim.step();
        }
        let first_run = sim.state();

        sim.reset();
        assert_eq!(sim.virtual_time(), 0.0);
        assert_eq!(sim.metrics().total_data_written_mb, 0.0);

        for _ in 0..150 {
            sim.step();
        }
        assert_eq!(sim.state(), first_run);
    }

    /// Different seeds diverge — the randomness is real, just
    /// reproducible.
    #[test]
    fn different_seeds_diverge() {
        let mut config = busy_config(CompactionStyle::Leveled);
        let mut a = Simulator::new(config.clone()).unwrap();
        config.random_seed = 99;
        let mut b = Simulator::new(config).unwrap();

        for _ in 0..200 {
            a.step();
            b.step();
        }

        // Clocks agree; the sampled compaction shapes generally do not.
        assert_eq!(a.virtual_time(), b.virtual_time());
    }
}
