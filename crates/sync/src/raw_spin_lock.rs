//! 原始自旋锁
//!
//! 基于原子操作实现的忙等待锁，实现 [`lock_api::RawMutex`]，
//! 持锁期间本地中断保持禁用。

use crate::intr_guard::IntrGuard;
use core::{
    hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use lock_api::{GuardNoSend, RawMutex};

/// 原始自旋锁。
///
/// 获取锁前先禁用本地中断，并把之前的中断状态记录在锁内；
/// 释放锁后再恢复。只有持锁者会读写 `saved_flags`，因此无需额外同步。
/// 不可重入 (即不能嵌套调用同一把锁的 `lock()`)。
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
    saved_flags: AtomicUsize,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            locked: AtomicBool::new(false),
            saved_flags: AtomicUsize::new(0),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    // 中断状态属于当前 CPU，守卫不能跨线程传递
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        let guard = IntrGuard::new();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }

        self.saved_flags.store(guard.into_raw(), Ordering::Relaxed);
    }

    fn try_lock(&self) -> bool {
        let guard = IntrGuard::new();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.saved_flags.store(guard.into_raw(), Ordering::Relaxed);
            true
        } else {
            // guard 被 drop，立即恢复中断状态
            false
        }
    }

    unsafe fn unlock(&self) {
        // 必须在释放锁标志之前取出中断状态，否则可能被下一个持锁者覆盖
        let flags = self.saved_flags.load(Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        // SAFETY: flags 由本锁的 lock()/try_lock() 写入，且只恢复一次
        drop(unsafe { IntrGuard::from_raw(flags) });
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
