//! Memtable freeze/flush lifecycle.

#[cfg(test)]
mod tests {
    use crate::lsm::LsmTree;

    /// # Scenario
    /// Freezing pushes the active memtable's size onto the immutable
    /// queue and resets the active memtable to zero.
    #[test]
    fn freeze_moves_size_to_immutable_queue() {
        let mut lsm = LsmTree::new(7, 64.0);
        lsm.active_memtable.current_size_mb = 64.0;

        let frozen = lsm.freeze_active_memtable(1.5);
        assert_eq!(frozen, 64.0);
        assert_eq!(lsm.num_immutable_memtables(), 1);
        assert_eq!(lsm.active_memtable.current_size_mb, 0.0);
        assert_eq!(lsm.active_memtable.max_size_mb, 64.0);
        assert_eq!(lsm.active_memtable.created_at, 1.5);
    }

    /// # Scenario
    /// Immutables retire oldest-first as flushes complete.
    #[test]
    fn immutables_retire_in_fifo_order() {
        let mut lsm = LsmTree::new(7, 64.0);
        lsm.active_memtable.current_size_mb = 10.0;
        lsm.freeze_active_memtable(0.1);
        lsm.active_memtable.current_size_mb = 20.0;
        lsm.freeze_active_memtable(0.2);

        assert_eq!(lsm.num_immutable_memtables(), 2);
        assert_eq!(lsm.immutable_sizes().collect::<Vec<_>>(), vec![10.0, 20.0]);

        assert_eq!(lsm.pop_oldest_immutable(), Some(10.0));
        assert_eq!(lsm.pop_oldest_immutable(), Some(20.0));
        assert_eq!(lsm.pop_oldest_immutable(), None);
    }

    #[test]
    fn flushed_file_lands_in_l0_with_timestamp() {
        let mut lsm = LsmTree::new(7, 64.0);
        let id = lsm.append_l0_file(64.0, 3.25);
        let level0 = lsm.level(0);
        assert_eq!(level0.file_count(), 1);
        assert_eq!(level0.files()[0].id, id);
        assert_eq!(level0.files()[0].size_mb, 64.0);
        assert_eq!(level0.files()[0].created_at, 3.25);
    }
}
