//! Config hot-updates, structural resets, and rejection semantics.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::simulator::Simulator;

    /// Invalid updates are rejected and leave the simulator untouched.
    #[test]
    fn invalid_update_is_rejected_without_side_effects() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        for _ in 0..20 {
            sim.step();
        }
        let before_time = sim.virtual_time();
        let before_state = sim.state();

        let mut bad = Config::default();
        bad.num_levels = 0;
        assert!(sim.update_config(bad).is_err());

        assert_eq!(sim.virtual_time(), before_time);
        assert_eq!(sim.state(), before_state);
    }

    /// # Scenario
    /// A write-rate-only change applies hot: the clock keeps running
    /// and the tree is untouched.
    #[test]
    fn write_rate_applies_hot() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        for _ in 0..20 {
            sim.step();
        }
        let before_time = sim.virtual_time();

        let mut new_config = sim.config().clone();
        new_config.write_rate_mbps = 10.0;
        sim.update_config(new_config).unwrap();

        assert_eq!(sim.virtual_time(), before_time, "hot update must not reset");
        assert_eq!(sim.config().write_rate_mbps, 10.0);
        sim.step();
        assert!(sim.virtual_time() > before_time);
    }

    /// Hot-updating to the identical value is a no-op on the state.
    #[test]
    fn identical_update_is_a_noop() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        for _ in 0..20 {
            sim.step();
        }
        let before = sim.state();
        sim.update_config(sim.config().clone()).unwrap();
        assert_eq!(sim.state(), before);
    }

    /// # Scenario
    /// Raising the rate from zero revives the quiesced generator at the
    /// current virtual time.
    #[test]
    fn raising_rate_from_zero_revives_the_generator() {
        let config = Config {
            write_rate_mbps: 0.0,
            ..Config::default()
        };
        let mut sim = Simulator::new(config).unwrap();
        for _ in 0..20 {
            sim.step();
        }
        assert_eq!(sim.metrics().total_data_written_mb, 0.0);

        let mut revived = sim.config().clone();
        revived.write_rate_mbps = 50.0;
        sim.update_config(revived).unwrap();

        for _ in 0..20 {
            sim.step();
        }
        assert!(
            sim.metrics().total_data_written_mb > 0.0,
            "the generator must resume after the rate turns positive"
        );
    }

    /// Any structural change forces a full reset to time zero.
    #[test]
    fn structural_change_resets() {
        let mut sim = Simulator::new(Config::default()).unwrap();
        for _ in 0..20 {
            sim.step();
        }
        assert!(sim.virtual_time() > 0.0);

        let mut structural = sim.config().clone();
        structural.num_levels = 4;
        sim.update_config(structural).unwrap();

        assert_eq!(sim.virtual_time(), 0.0);
        assert_eq!(sim.config().num_levels, 4);
        assert_eq!(sim.lsm().num_levels(), 4);
        sim.step();
        assert!(sim.virtual_time() > 0.0);
    }
}
