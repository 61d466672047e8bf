// Host unit tests for mm.
//
// A leaked, page-aligned host allocation stands in for physical memory and
// `paddr_to_vaddr` is the identity. The frame allocator is global, so every test
// holds `TEST_LOCK` and checks that it leaves the allocator as it found it.

extern crate std;

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::mm::{MOCK_MM_CONFIG, MOCK_MM_OPS, MockMmConfig, MockMmOps, leak_page_arena};

use crate::frame_allocator::{get_allocated_frames, get_committed_frames, get_free_frames};
use crate::{ArchMmOps, MmConfig, commit_frames, init_frame_allocator, uncommit_frames};

mod address;
mod anonymous;
mod committed;
mod frame_allocator;

const ARENA_PAGES: usize = 2048;

impl ArchMmOps for MockMmOps {
    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        MockMmOps::paddr_to_vaddr(self, paddr)
    }
}

impl MmConfig for MockMmConfig {
    fn page_size(&self) -> usize {
        MockMmConfig::page_size(self)
    }
}

/// Forwards the spin lock's interrupt hooks to the shared mock.
struct TestArchOps;

impl sync::ArchOps for TestArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn in_interrupt(&self) -> bool {
        MOCK_ARCH_OPS.in_interrupt()
    }
}

static TEST_ARCH_OPS: TestArchOps = TestArchOps;
static INIT: Once = Once::new();
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Frame allocator counters at the start of a test.
struct Fixture {
    allocated: usize,
    committed: usize,
    _guard: MutexGuard<'static, ()>,
}

impl Fixture {
    /// Asserts every frame and commitment taken during the test was returned.
    fn assert_balanced(&self) {
        assert_eq!(get_allocated_frames(), self.allocated, "leaked frames");
        assert_eq!(get_committed_frames(), self.committed, "leaked commitments");
    }
}

fn setup() -> Fixture {
    let guard = TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    INIT.call_once(|| {
        unsafe {
            sync::register_arch_ops(&TEST_ARCH_OPS);
            crate::register_arch_ops(&MOCK_MM_OPS);
            crate::register_config(&MOCK_MM_CONFIG);
        }
        let (start, end) = leak_page_arena(ARENA_PAGES);
        init_frame_allocator(start, end);
    });
    Fixture {
        allocated: get_allocated_frames(),
        committed: get_committed_frames(),
        _guard: guard,
    }
}

/// Commits every frame ordinary allocation could still use; returns how many.
fn exhaust_frames() -> usize {
    let available = get_free_frames() - get_committed_frames();
    assert!(commit_frames(available));
    available
}

/// Gives back what `exhaust_frames` took.
fn release_frames(count: usize) {
    uncommit_frames(count);
}
