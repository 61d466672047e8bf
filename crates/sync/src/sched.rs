//! 调度器接口
//!
//! 睡眠锁需要“阻塞当前线程 / 唤醒指定线程”的能力，但调度器本身位于 os crate。
//! 这里用 [`SchedOps`] trait 抽象这部分能力，由 os crate 在启动时注册。

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 线程标识
///
/// 只用于比较和唤醒，不持有线程本身的引用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid {}", self.0)
    }
}

/// 调度器相关操作
///
/// # 唤醒语义
///
/// `block_current` / `wake` 必须具备 park/unpark 的“令牌”语义：
/// - 若 `wake(t)` 先于 `t` 调用 `block_current` 发生，则之后的 `block_current` 立即返回；
/// - `block_current` 允许伪唤醒，调用方负责在返回后重新检查条件。
///
/// 这样调用方可以在释放自旋锁之后再阻塞，而不会丢失唤醒。
pub trait SchedOps: Send + Sync {
    /// 当前线程的标识
    fn current_thread(&self) -> ThreadId;

    /// 阻塞当前线程直到被唤醒
    ///
    /// `wchan` 为等待通道（通常是锁的地址），仅用于调试显示。
    fn block_current(&self, wchan: usize);

    /// 唤醒指定线程
    ///
    /// 不得阻塞，可以在持有自旋锁时调用。
    fn wake(&self, thread: ThreadId);
}

static SCHED_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static SCHED_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册调度器操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_sched_ops(ops: &'static dyn SchedOps) {
    let ptr = ops as *const dyn SchedOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn SchedOps, (usize, usize)>(ptr) };
    SCHED_OPS_DATA.store(data, Ordering::Release);
    SCHED_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的调度器操作实现
///
/// # Panics
/// 如果尚未调用 [`register_sched_ops`] 注册实现，则 panic
#[inline]
pub fn sched_ops() -> &'static dyn SchedOps {
    let data = SCHED_OPS_DATA.load(Ordering::Acquire);
    let vtable = SCHED_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: SchedOps not registered, call register_sched_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_sched_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn SchedOps>((data, vtable)) }
}

/// 当前线程的标识（[`SchedOps::current_thread`] 的简写）
#[inline]
pub fn current_thread() -> ThreadId {
    sched_ops().current_thread()
}
