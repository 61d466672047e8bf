//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `mm` crate（避免循环依赖）。
//! `mm` crate 在 `cfg(test)` 下用本地适配器把这些类型接到其 trait（`ArchMmOps` / `MmConfig`）上。

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Mock 的内存管理架构操作
///
/// 采用“恒等映射”（vaddr == paddr），物理页直接来自宿主机堆。
pub struct MockMmOps;

impl MockMmOps {
    pub const fn new() -> Self {
        Self
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_OPS: MockMmOps = MockMmOps::new();

/// Mock 的内存管理配置
pub struct MockMmConfig;

impl MockMmConfig {
    pub const fn new() -> Self {
        Self
    }

    pub fn page_size(&self) -> usize {
        4096
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_CONFIG: MockMmConfig = MockMmConfig::new();

#[repr(C, align(4096))]
struct ArenaPage([u8; 4096]);

/// 泄漏一段页对齐的宿主机内存充当“物理内存”
///
/// 返回 `[start, end)` 地址区间，在恒等映射下既是物理地址也是虚拟地址。
pub fn leak_page_arena(pages: usize) -> (usize, usize) {
    let mut arena: Vec<ArenaPage> = Vec::with_capacity(pages);
    arena.resize_with(pages, || ArenaPage([0; 4096]));
    let arena: &'static mut [ArenaPage] = Box::leak(arena.into_boxed_slice());
    let start = arena.as_mut_ptr() as usize;
    (start, start + pages * 4096)
}
