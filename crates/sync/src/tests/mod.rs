// Host unit tests for sync.
//
// Interrupt control and thread blocking are provided by the mocks in `test-support`;
// blocking maps onto `std::thread::park`, so contention tests use real host threads.

extern crate std;

use std::sync::Once;
use std::thread;

use test_support::mock::arch::{MOCK_ARCH_OPS, MockArchOps};
use test_support::mock::sched::{MOCK_SCHED_OPS, MockSchedOps};

use crate::{ArchOps, SchedOps, ThreadId, register_arch_ops, register_sched_ops};


impl ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MockArchOps::read_and_disable_interrupts(self) }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MockArchOps::restore_interrupts(self, flags) }
    }

    fn in_interrupt(&self) -> bool {
        MockArchOps::in_interrupt(self)
    }
}

impl SchedOps for MockSchedOps {
    fn current_thread(&self) -> ThreadId {
        ThreadId(MockSchedOps::current_thread(self))
    }

    fn block_current(&self, wchan: usize) {
        MockSchedOps::block_current(self, wchan)
    }

    fn wake(&self, thread: ThreadId) {
        MockSchedOps::wake(self, thread.0)
    }
}

static INIT: Once = Once::new();

/// Registers the mock ops once per test binary.
fn setup() {
    INIT.call_once(|| unsafe {
        register_arch_ops(&MOCK_ARCH_OPS);
        register_sched_ops(&MOCK_SCHED_OPS);
    });
}

/// Spins (yielding) until `cond` holds.
fn wait_until(cond: impl Fn() -> bool) {
    while !cond() {
        thread::yield_now();
    }
}
