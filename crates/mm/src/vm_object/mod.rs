//! VM 对象
//!
//! VM 对象描述一段可被映射的内存的“内容”：每个页下标对应哪个物理页，
//! 而不关心它被映射到哪个地址空间的哪个位置。
//! 区域映射和页表操作由调用方负责，缺页处理器根据异常类型调用
//! [`AnonymousVmObject::handle_cow_fault`] 或 [`AnonymousVmObject::handle_zero_fault`]，
//! 得到 [`PageFaultResponse::Continue`] 后重新映射并重试访问。

mod anonymous;
mod committed;
mod page;
mod stats;

pub use anonymous::{AllocationStrategy, AnonymousVmObject};
pub use committed::CommittedCowPages;
pub use page::{PageSlot, PhysicalPage};
pub use stats::{FaultStats, fault_stats};

use alloc::sync::Arc;

/// 缺页处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultResponse {
    /// 不是可以修复的异常，调用方应终止出错的线程
    ShouldCrash,
    /// 物理内存不足，状态未改变
    OutOfMemory,
    /// 已修复，重新映射后重试
    Continue,
}

/// VM 对象操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// 物理内存不足
    OutOfMemory,
    /// 对象不可清除（不是 purgeable）
    NotPurgeable,
    /// 对象当前不是易失的
    NotVolatile,
}

impl VmError {
    /// 转换为系统调用返回的负 errno
    pub fn to_errno(self) -> isize {
        match self {
            VmError::OutOfMemory => -12,                        // ENOMEM
            VmError::NotPurgeable | VmError::NotVolatile => -22, // EINVAL
        }
    }
}

/// VM 对象的公共接口
pub trait VmObject: Send + Sync {
    /// 页数
    fn page_count(&self) -> usize;

    /// 字节大小
    fn size(&self) -> usize {
        self.page_count() * crate::config::page_size()
    }

    /// 类型名（调试用）
    fn class_name(&self) -> &'static str;

    /// 是否为匿名内存
    fn is_anonymous(&self) -> bool {
        false
    }

    /// 第 `index` 页当前对应的物理页；未实体化时为 `None`
    fn physical_page(&self, index: usize) -> Option<Arc<PhysicalPage>>;
}
