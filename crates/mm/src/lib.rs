//! 内存管理子系统
//!
//! 提供地址抽象、带承诺记账的物理帧分配，以及实现写时复制、
//! 可清除内存和 fork 页面共享的匿名 VM 对象。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`ArchMmOps`]: 物理地址到直接映射区的转换
//! - [`MmConfig`]: 内存布局常量
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现，
//! 并用 [`init_frame_allocator`] 交出可用的物理内存。

#![no_std]

extern crate alloc;

mod arch_ops;
mod bitmap;
mod config;

pub mod address;
pub mod frame_allocator;
pub mod vm_object;

#[cfg(test)]
mod tests;

pub use arch_ops::{ArchMmOps, arch_ops, register_arch_ops};
pub use bitmap::Bitmap;
pub use config::{MmConfig, mm_config, page_count_for, page_size, register_config};

// Re-export 常用类型
pub use address::{PageNum, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr};
pub use frame_allocator::{
    FrameRangeTracker, FrameTracker, alloc_committed_frame, alloc_contig_frames, alloc_frame,
    alloc_frames, commit_frames, init_frame_allocator, uncommit_frames,
};
pub use vm_object::{
    AllocationStrategy, AnonymousVmObject, CommittedCowPages, FaultStats, PageFaultResponse,
    PageSlot, PhysicalPage, VmError, VmObject, fault_stats,
};
