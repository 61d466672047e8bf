//! 调度器操作的 Mock 实现
//!
//! 每个宿主线程在第一次调用 `current_thread` 时分配一个递增的编号，
//! 阻塞 / 唤醒直接映射到 `std::thread::park` / `Thread::unpark`，
//! 天然具备令牌语义。

use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, Thread};

static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

std::thread_local! {
    static TID: usize = NEXT_TID.fetch_add(1, Ordering::Relaxed);
}

/// Mock 调度器
pub struct MockSchedOps {
    threads: Mutex<BTreeMap<usize, Thread>>,
}

impl MockSchedOps {
    pub const fn new() -> Self {
        Self {
            threads: Mutex::new(BTreeMap::new()),
        }
    }

    /// 当前宿主线程的编号，并登记它以便之后唤醒
    pub fn current_thread(&self) -> usize {
        let tid = TID.with(|tid| *tid);
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tid)
            .or_insert_with(thread::current);
        tid
    }

    pub fn block_current(&self, _wchan: usize) {
        thread::park();
    }

    pub fn wake(&self, tid: usize) {
        let threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(thread) = threads.get(&tid) {
            thread.unpark();
        }
    }
}

/// 全局 Mock 实例
pub static MOCK_SCHED_OPS: MockSchedOps = MockSchedOps::new();
