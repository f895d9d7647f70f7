//! Event queue ordering and bookkeeping.

#[cfg(test)]
mod tests {
    use crate::event::{Event, EventKind, EventQueue};

    fn write_at(timestamp: f64, size_mb: f64) -> Event {
        Event::new(timestamp, EventKind::Write { size_mb })
    }

    #[test]
    fn pops_in_timestamp_order() {
        let mut queue = EventQueue::new();
        queue.push(write_at(3.0, 1.0));
        queue.push(write_at(1.0, 2.0));
        queue.push(write_at(2.0, 3.0));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().timestamp, 1.0);
        assert_eq!(queue.pop().unwrap().timestamp, 2.0);
        assert_eq!(queue.pop().unwrap().timestamp, 3.0);
        assert!(queue.pop().is_none());
    }

    /// # Scenario
    /// Ties on the timestamp must break by insertion order — dispatch
    /// determinism depends on it.
    #[test]
    fn ties_break_by_insertion_order() {
        let mut queue = EventQueue::new();
        queue.push(write_at(1.0, 10.0));
        queue.push(write_at(1.0, 20.0));
        queue.push(write_at(0.5, 30.0));
        queue.push(write_at(1.0, 40.0));

        assert_eq!(queue.pop().unwrap().kind, EventKind::Write { size_mb: 30.0 });
        assert_eq!(queue.pop().unwrap().kind, EventKind::Write { size_mb: 10.0 });
        assert_eq!(queue.pop().unwrap().kind, EventKind::Write { size_mb: 20.0 });
        assert_eq!(queue.pop().unwrap().kind, EventKind::Write { size_mb: 40.0 });
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = EventQueue::new();
        queue.push(write_at(5.0, 1.0));
        assert_eq!(queue.peek_timestamp(), Some(5.0));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().timestamp, 5.0);
        assert_eq!(queue.peek_timestamp(), None);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = EventQueue::new();
        for i in 0..10 {
            queue.push(write_at(i as f64, 1.0));
        }
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        // Still usable after a clear, and ordering still holds.
        queue.push(write_at(2.0, 1.0));
        queue.push(write_at(1.0, 1.0));
        assert_eq!(queue.pop().unwrap().timestamp, 1.0);
    }

    #[test]
    fn mixed_event_kinds_carry_payloads() {
        let mut queue = EventQueue::new();
        queue.push(Event::new(0.0, EventKind::CompactionCheck));
        queue.push(Event::new(
            0.0,
            EventKind::Flush {
                start_time: 0.0,
                size_mb: 64.0,
            },
        ));

        assert_eq!(queue.pop().unwrap().kind, EventKind::CompactionCheck);
        match queue.pop().unwrap().kind {
            EventKind::Flush {
                start_time,
                size_mb,
            } => {
                assert_eq!(start_time, 0.0);
                assert_eq!(size_mb, 64.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
