//! 物理页与页槽

use alloc::sync::Arc;

use crate::address::{Paddr, PageNum, Ppn, Vaddr};
use crate::frame_allocator::FrameTracker;

enum Backing {
    /// 由帧分配器分配，最后一个引用消失时回收
    Owned(FrameTracker),
    /// 外部给定的物理页（如设备内存），从不回收
    Fixed(Ppn),
}

/// 一个物理页帧
///
/// 通过 `Arc` 在多个 VM 对象之间共享；内容经由直接映射区读写。
pub struct PhysicalPage {
    backing: Backing,
}

impl PhysicalPage {
    /// 接管一个已分配的帧
    pub fn from_frame(frame: FrameTracker) -> Self {
        Self {
            backing: Backing::Owned(frame),
        }
    }

    /// 包装一个不归本系统管理的物理页
    pub fn fixed(ppn: Ppn) -> Self {
        Self {
            backing: Backing::Fixed(ppn),
        }
    }

    /// 物理页号
    pub fn ppn(&self) -> Ppn {
        match &self.backing {
            Backing::Owned(frame) => frame.ppn(),
            Backing::Fixed(ppn) => *ppn,
        }
    }

    /// 起始物理地址
    pub fn paddr(&self) -> Paddr {
        self.ppn().start_addr()
    }

    /// 是否为外部给定的页
    pub fn is_fixed(&self) -> bool {
        matches!(self.backing, Backing::Fixed(_))
    }

    fn vaddr(&self) -> Vaddr {
        self.paddr().to_vaddr()
    }

    /// 从页内 `offset` 处读取 `buf.len()` 字节
    ///
    /// # Panics
    /// 越过页边界
    pub fn read(&self, offset: usize, buf: &mut [u8]) {
        self.check_bounds(offset, buf.len());
        let src = self.vaddr().as_ptr::<u8>();
        // SAFETY: 范围在页内，页在 self 存活期间有效
        unsafe { core::ptr::copy_nonoverlapping(src.add(offset), buf.as_mut_ptr(), buf.len()) };
    }

    /// 向页内 `offset` 处写入 `data`
    ///
    /// # Panics
    /// 越过页边界
    pub fn write(&self, offset: usize, data: &[u8]) {
        self.check_bounds(offset, data.len());
        let dst = self.vaddr().as_mut_ptr::<u8>();
        // SAFETY: 范围在页内，页在 self 存活期间有效
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), dst.add(offset), data.len()) };
    }

    /// 整页复制 `src` 的内容
    pub fn copy_from(&self, src: &PhysicalPage) {
        if core::ptr::eq(self, src) {
            return;
        }
        let page_size = crate::config::page_size();
        // SAFETY: 两个不同的页帧不重叠，且都在直接映射区内
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.vaddr().as_ptr::<u8>(),
                self.vaddr().as_mut_ptr::<u8>(),
                page_size,
            )
        };
    }

    fn check_bounds(&self, offset: usize, len: usize) {
        let page_size = crate::config::page_size();
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= page_size),
            "page access {:#x}+{:#x} crosses the page boundary",
            offset,
            len
        );
    }
}

impl core::fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhysicalPage")
            .field("ppn", &self.ppn())
            .field("fixed", &self.is_fixed())
            .finish()
    }
}

/// VM 对象中一个页下标的状态
#[derive(Debug, Clone, Default)]
pub enum PageSlot {
    /// 读作全零，没有物理页也没有预留
    #[default]
    Empty,
    /// 有一个预留，尚未实体化
    LazyCommitted,
    /// 已有物理页
    Present(Arc<PhysicalPage>),
}

impl PageSlot {
    /// 是否已有物理页
    pub fn is_present(&self) -> bool {
        matches!(self, PageSlot::Present(_))
    }

    /// 物理页（如有）
    pub fn page(&self) -> Option<&Arc<PhysicalPage>> {
        match self {
            PageSlot::Present(page) => Some(page),
            _ => None,
        }
    }
}
