//! 帧分配器模块
//!
//! 本模块提供物理内存帧的分配、跟踪和承诺（commit）记账。
//!
//! ## 分配策略（位图）
//!
//! 分配器使用 [`Bitmap`] 跟踪每个物理帧的分配状态（0=空闲，1=已分配），
//! 并用 `last_alloc_hint` 记录上次分配所在的字，利用局部性加速查找。
//! 释放时直接清除对应 bit。
//!
//! ## 承诺记账
//!
//! 匿名内存需要“现在保留、以后再分配”的帧：[`commit_frames`] 预留若干帧，
//! 之后 [`alloc_committed_frame`] 消耗一个预留并保证成功，
//! 不再需要的预留用 [`uncommit_frames`] 归还。
//! 普通分配只能使用 `空闲 - 已承诺` 的部分，因此承诺过的帧不会被别人抢走。
//!
//! ## RAII：自动回收
//!
//! - [`FrameTracker`]：单帧 RAII 包装器，`Drop` 时自动回收
//! - [`FrameRangeTracker`]：连续帧范围 RAII 包装器，`Drop` 时自动回收，
//!   也可以用 [`FrameRangeTracker::into_frames`] 拆成逐帧的 [`FrameTracker`]

use crate::address::{Paddr, PageNum, Ppn, PpnRange, UsizeConvert};
use crate::bitmap::Bitmap;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::SpinLock;

// ============================================================================
// FrameTracker - 单帧 RAII 封装
// ============================================================================

/// 物理帧跟踪器。
/// 实现了 RAII 模式：当此结构体被 drop 时，它所管理的物理页帧会被自动回收。
#[derive(Debug)]
pub struct FrameTracker(Ppn);

impl FrameTracker {
    /// 接管一个刚分配的帧，并将其清零。
    fn new(ppn: Ppn) -> Self {
        clear_frame(ppn);
        FrameTracker(ppn)
    }

    /// 获取此帧跟踪器所管理的物理页号 (Ppn)。
    pub fn ppn(&self) -> Ppn {
        self.0
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        FRAME_ALLOCATOR.lock().dealloc_range(self.0, 1);
    }
}

// ============================================================================
// FrameRangeTracker - 连续帧范围 RAII 封装
// ============================================================================

/// 连续物理帧范围跟踪器。
/// 当此结构体被 drop 时，它所管理的物理页帧范围会被自动回收。
#[derive(Debug)]
pub struct FrameRangeTracker {
    range: PpnRange,
}

impl FrameRangeTracker {
    fn new(range: PpnRange) -> Self {
        for ppn in range.iter() {
            clear_frame(ppn);
        }
        FrameRangeTracker { range }
    }

    /// 起始物理页号
    pub fn start_ppn(&self) -> Ppn {
        self.range.start()
    }

    /// 帧数量
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// 获取连续帧范围的引用。
    pub fn range(&self) -> &PpnRange {
        &self.range
    }

    /// 拆成逐帧跟踪器，之后每一帧单独回收
    pub fn into_frames(self) -> Vec<FrameTracker> {
        let range = self.range;
        core::mem::forget(self);
        // 帧在 FrameRangeTracker::new 中已经清零
        range.iter().map(FrameTracker).collect()
    }
}

impl Drop for FrameRangeTracker {
    fn drop(&mut self) {
        FRAME_ALLOCATOR
            .lock()
            .dealloc_range(self.range.start(), self.range.len());
    }
}

/// 将指定的物理页帧清零。
fn clear_frame(ppn: Ppn) {
    let page_size = crate::config::page_size();
    let va = ppn.start_addr().to_vaddr().as_mut_ptr::<u8>();
    // SAFETY: 帧刚被分配，不存在其他引用；直接映射区覆盖全部物理内存
    unsafe { core::ptr::write_bytes(va, 0, page_size) };
}

// ============================================================================
// 全局帧分配器
// ============================================================================

lazy_static! {
    /// 全局物理帧分配器，由自旋锁保护。
    static ref FRAME_ALLOCATOR: SpinLock<FrameAllocator> = SpinLock::new(FrameAllocator::new());
}

/// 物理帧分配器。
struct FrameAllocator {
    /// 物理帧的起始 Ppn。
    start: Ppn,
    bitmap: Bitmap,
    allocated_count: usize,
    /// 已承诺但尚未分配的帧数
    committed_count: usize,
    last_alloc_hint: usize,
}

impl FrameAllocator {
    fn new() -> Self {
        FrameAllocator {
            start: Ppn(0),
            bitmap: Bitmap::new(0),
            allocated_count: 0,
            committed_count: 0,
            last_alloc_hint: 0,
        }
    }

    fn init(&mut self, start: Ppn, end: Ppn) {
        debug_assert_eq!(self.allocated_count, 0, "re-initialized with live frames");
        self.start = start;
        self.bitmap = Bitmap::new(end.as_usize().saturating_sub(start.as_usize()));
        self.allocated_count = 0;
        self.committed_count = 0;
        self.last_alloc_hint = 0;
    }

    fn total_frames(&self) -> usize {
        self.bitmap.len()
    }

    fn free_frames(&self) -> usize {
        self.total_frames() - self.allocated_count
    }

    /// 普通分配可以使用的帧数
    fn uncommitted_free_frames(&self) -> usize {
        self.free_frames() - self.committed_count
    }

    /// 找到并占用一个空闲帧，不检查承诺
    ///
    /// 从 last_alloc_hint 开始循环查找第一个空闲位。
    fn take_free_frame(&mut self) -> Option<Ppn> {
        let total = self.total_frames();
        let word_count = self.bitmap.words().len();
        for offset in 0..word_count {
            let idx = (self.last_alloc_hint + offset) % word_count;
            let word = self.bitmap.words()[idx];
            if word == u64::MAX {
                continue;
            }
            let frame_idx = idx * 64 + (!word).trailing_zeros() as usize;
            if frame_idx >= total {
                continue;
            }
            self.bitmap.set(frame_idx, true);
            self.allocated_count += 1;
            self.last_alloc_hint = idx;
            return Some(self.start + frame_idx);
        }
        None
    }

    fn alloc_frame(&mut self) -> Option<Ppn> {
        if self.uncommitted_free_frames() == 0 {
            return None;
        }
        self.take_free_frame()
    }

    fn alloc_committed_frame(&mut self) -> Ppn {
        assert!(self.committed_count > 0, "alloc_committed_frame without a commitment");
        self.committed_count -= 1;
        match self.take_free_frame() {
            Some(ppn) => ppn,
            None => panic!("committed frame missing: free frames exhausted"),
        }
    }

    fn commit(&mut self, count: usize) -> bool {
        if count > self.uncommitted_free_frames() {
            return false;
        }
        self.committed_count += count;
        true
    }

    fn uncommit(&mut self, count: usize) {
        assert!(
            count <= self.committed_count,
            "uncommit {} frames but only {} committed",
            count,
            self.committed_count
        );
        self.committed_count -= count;
    }

    /// 查找 `num` 个连续空闲帧
    fn alloc_contig(&mut self, num: usize) -> Option<PpnRange> {
        if num == 0 || num > self.uncommitted_free_frames() {
            return None;
        }

        let run_start = self.find_free_run(num)?;
        for idx in run_start..run_start + num {
            self.bitmap.set(idx, true);
        }
        self.allocated_count += num;
        Some(PpnRange::from_start_len(self.start + run_start, num))
    }

    /// 第一段长度为 `num` 的空闲帧的起始下标
    fn find_free_run(&self, num: usize) -> Option<usize> {
        let total = self.total_frames();
        let mut run_start = 0;
        let mut run_len = 0;
        for (idx, &word) in self.bitmap.words().iter().enumerate() {
            // 整字已满，直接跳过
            if word == u64::MAX {
                run_len = 0;
                continue;
            }
            for bit in 0..64 {
                let frame_idx = idx * 64 + bit;
                if frame_idx >= total {
                    return None;
                }
                if word & (1u64 << bit) != 0 {
                    run_len = 0;
                    continue;
                }
                if run_len == 0 {
                    run_start = frame_idx;
                }
                run_len += 1;
                if run_len == num {
                    return Some(run_start);
                }
            }
        }
        None
    }

    fn dealloc_range(&mut self, start: Ppn, len: usize) {
        let start_idx = start.as_usize() - self.start.as_usize();
        debug_assert!(start_idx + len <= self.total_frames(), "dealloc: frame out of range");
        for idx in start_idx..start_idx + len {
            debug_assert!(self.bitmap.get(idx), "dealloc: double free detected");
            self.bitmap.set(idx, false);
        }
        self.allocated_count -= len;
    }
}

// ============================================================================
// 公共 API
// ============================================================================

/// 使用可用的物理内存范围初始化全局帧分配器。
///
/// 起始地址向上、结束地址向下取整到页边界。
pub fn init_frame_allocator(start_addr: usize, end_addr: usize) {
    let start_ppn = Ppn::from_addr_ceil(Paddr::from_usize(start_addr));
    let end_ppn = Ppn::from_addr_floor(Paddr::from_usize(end_addr));

    FRAME_ALLOCATOR.lock().init(start_ppn, end_ppn);
    log::debug!(
        "frame allocator: {} frames from {:?}",
        end_ppn.as_usize().saturating_sub(start_ppn.as_usize()),
        start_ppn
    );
}

/// 分配一个清零的物理帧；只使用未被承诺的空闲帧。
pub fn alloc_frame() -> Option<FrameTracker> {
    let ppn = FRAME_ALLOCATOR.lock().alloc_frame()?;
    Some(FrameTracker::new(ppn))
}

/// 分配多个物理帧（不保证连续），全部成功或全部回收。
pub fn alloc_frames(num: usize) -> Option<Vec<FrameTracker>> {
    let mut frames = Vec::new();
    frames.try_reserve_exact(num).ok()?;
    for _ in 0..num {
        // 失败时 frames 被 drop，已分配的帧随之回收
        frames.push(alloc_frame()?);
    }
    Some(frames)
}

/// 分配指定数量的**连续**物理帧。
pub fn alloc_contig_frames(num: usize) -> Option<FrameRangeTracker> {
    let range = FRAME_ALLOCATOR.lock().alloc_contig(num)?;
    Some(FrameRangeTracker::new(range))
}

/// 预留 `count` 个帧供以后分配；可用帧不足时返回 false 且不做任何改变。
pub fn commit_frames(count: usize) -> bool {
    FRAME_ALLOCATOR.lock().commit(count)
}

/// 归还 `count` 个未使用的预留。
///
/// # Panics
/// 归还数量超过当前预留总数。
pub fn uncommit_frames(count: usize) {
    if count > 0 {
        FRAME_ALLOCATOR.lock().uncommit(count);
    }
}

/// 消耗一个预留并分配一个清零的帧，不会失败。
///
/// # Panics
/// 当前没有任何预留。
pub fn alloc_committed_frame() -> FrameTracker {
    let ppn = FRAME_ALLOCATOR.lock().alloc_committed_frame();
    FrameTracker::new(ppn)
}

/// 获取总的物理帧数
pub fn get_total_frames() -> usize {
    FRAME_ALLOCATOR.lock().total_frames()
}

/// 获取已分配的帧数
pub fn get_allocated_frames() -> usize {
    FRAME_ALLOCATOR.lock().allocated_count
}

/// 获取空闲的帧数（包括已承诺的部分）
pub fn get_free_frames() -> usize {
    FRAME_ALLOCATOR.lock().free_frames()
}

/// 获取已承诺但尚未分配的帧数
pub fn get_committed_frames() -> usize {
    FRAME_ALLOCATOR.lock().committed_count
}

/// 获取帧分配器的当前状态
/// # 返回值
/// - 总帧数
/// - 已分配的帧数
/// - 空闲的帧数
/// - 已承诺的帧数
pub fn get_stats() -> (usize, usize, usize, usize) {
    let allocator = FRAME_ALLOCATOR.lock();
    (
        allocator.total_frames(),
        allocator.allocated_count,
        allocator.free_frames(),
        allocator.committed_count,
    )
}
