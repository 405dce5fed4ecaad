//! Property-based tests for cancellation and drain ordering using proptest.
//!
//! Properties verified:
//! - A timer cleared on the owning thread before it runs never runs,
//!   whether or not its trigger already fired
//! - Every timer that was not cleared runs exactly once
//! - Immediates drain in registration order

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use deferloop_timers::{Callback, Delay, EventLoop, TimerId, TimerPool};
use proptest::prelude::*;

fn recording(id_log: &Rc<RefCell<Vec<u32>>>, tag: u32) -> Callback<u32> {
    let id_log = Rc::clone(id_log);
    Callback::new(format!("timer-{tag}"), move |_| {
        id_log.borrow_mut().push(tag);
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: clearing before the drain wins over a trigger that has
    /// already fired; everything else runs once.
    #[test]
    fn prop_cleared_timers_never_run(
        plan in proptest::collection::vec((0u64..15, any::<bool>()), 1..20),
    ) {
        let pool = TimerPool::shared();
        prop_assert!(pool.is_ok());
        let Ok(pool) = pool else { return Ok(()) };

        let event_loop = EventLoop::new(pool);
        let ran = Rc::new(RefCell::new(Vec::new()));
        let mut expected = BTreeSet::new();
        let mut ids: Vec<(TimerId, bool)> = Vec::new();

        for (tag, (delay_ms, cancel)) in (0u32..).zip(plan.iter().copied()) {
            let callback = recording(&ran, tag);
            let id = event_loop.set_timeout(callback, Vec::new(), Delay::from_millis(delay_ms));
            prop_assert!(id.is_ok());
            if let Ok(id) = id {
                ids.push((id, cancel));
            }
            if !cancel {
                expected.insert(tag);
            }
        }

        // Give some triggers time to fire before clearing.
        thread::sleep(Duration::from_millis(5));
        for (id, cancel) in &ids {
            if *cancel {
                event_loop.clear_timeout(*id);
            }
        }

        let deadline = Instant::now() + Duration::from_secs(3);
        while !event_loop.is_idle() && Instant::now() < deadline {
            event_loop.process();
            thread::sleep(Duration::from_millis(1));
        }

        let ran = ran.borrow();
        let ran_set: BTreeSet<u32> = ran.iter().copied().collect();
        prop_assert_eq!(ran.len(), ran_set.len(), "no timer ran twice");
        prop_assert_eq!(ran_set, expected);
    }

    /// Property: immediates run in the order they were registered.
    #[test]
    fn prop_immediates_drain_fifo(count in 1u32..50) {
        let pool = TimerPool::shared();
        prop_assert!(pool.is_ok());
        let Ok(pool) = pool else { return Ok(()) };

        let event_loop = EventLoop::new(pool);
        let ran = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..count {
            prop_assert!(event_loop.set_immediate(recording(&ran, tag), vec![tag]).is_ok());
        }

        let summary = event_loop.process();

        prop_assert_eq!(summary.executed, ran.borrow().len());
        prop_assert_eq!(ran.borrow().clone(), (0..count).collect::<Vec<_>>());
    }
}
