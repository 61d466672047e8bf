//! 缺页统计
//!
//! 全局计数器，只在缺页路径上递增，供调试和 procfs 之类的接口读取。

use core::sync::atomic::{AtomicUsize, Ordering};

static COW_COPIES: AtomicUsize = AtomicUsize::new(0);
static COW_SHORTCUTS: AtomicUsize = AtomicUsize::new(0);
static ZERO_FILLS: AtomicUsize = AtomicUsize::new(0);
static OUT_OF_MEMORY: AtomicUsize = AtomicUsize::new(0);

/// 缺页统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// 复制了页内容的 COW 缺页
    pub cow_copies: usize,
    /// 唯一持有者直接接管页面、无需复制的 COW 缺页
    pub cow_shortcuts: usize,
    /// 零页缺页
    pub zero_fills: usize,
    /// 因内存不足而失败的缺页
    pub out_of_memory: usize,
}

/// 读取当前统计
pub fn fault_stats() -> FaultStats {
    FaultStats {
        cow_copies: COW_COPIES.load(Ordering::Relaxed),
        cow_shortcuts: COW_SHORTCUTS.load(Ordering::Relaxed),
        zero_fills: ZERO_FILLS.load(Ordering::Relaxed),
        out_of_memory: OUT_OF_MEMORY.load(Ordering::Relaxed),
    }
}

pub(super) fn incr_cow_copy() {
    COW_COPIES.fetch_add(1, Ordering::Relaxed);
}

pub(super) fn incr_cow_shortcut() {
    COW_SHORTCUTS.fetch_add(1, Ordering::Relaxed);
}

pub(super) fn incr_zero_fill() {
    ZERO_FILLS.fetch_add(1, Ordering::Relaxed);
}

pub(super) fn incr_out_of_memory() {
    OUT_OF_MEMORY.fetch_add(1, Ordering::Relaxed);
}
