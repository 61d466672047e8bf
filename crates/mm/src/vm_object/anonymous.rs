//! 匿名内存 VM 对象
//!
//! 匿名内存没有后备文件：页面要么读作全零，要么是进程写入过的私有内容。
//! fork 时通过 [`AnonymousVmObject::try_clone`] 与子进程共享全部已有页面，
//! 双方第一次写入时各自复制（COW）。
//!
//! # 承诺
//!
//! 为保证“已经承诺的内存以后一定能拿到”，对象在两处持有帧预留：
//! - `unused_committed_pages`：本对象 [`PageSlot::LazyCommitted`] 页的预留，与这类页一一对应；
//! - `shared_committed_cow_pages`：克隆时为共享页建立的 [`CommittedCowPages`]，
//!   由整个家族共享，供 COW 缺页分配新页。
//!
//! # 可清除内存
//!
//! purgeable 对象可以被标记为易失（volatile）。易失期间内核可以调用
//! [`AnonymousVmObject::purge`] 丢弃其全部页面，所有者在取消易失标记时
//! 通过返回值得知内容是否已经丢失。

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use sync::SpinLock;

use super::committed::CommittedCowPages;
use super::page::{PageSlot, PhysicalPage};
use super::{PageFaultResponse, VmError, VmObject, stats};
use crate::address::{Paddr, PageNum, Ppn, Vaddr};
use crate::bitmap::Bitmap;
use crate::config::page_count_for;
use crate::frame_allocator::{
    alloc_committed_frame, alloc_contig_frames, alloc_frame, commit_frames, uncommit_frames,
};

/// 创建匿名对象时如何准备物理内存
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// 为每页预留一个帧，首次访问时再分配
    Reserve,
    /// 立即分配全部页面
    AllocateNow,
    /// 不预留；缺页时直接向帧分配器申请，可能失败
    None,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct AnonFlags: u8 {
        const PURGEABLE = 1 << 0;
        const VOLATILE = 1 << 1;
        const WAS_PURGED = 1 << 2;
    }
}

struct AnonymousInner {
    pages: Vec<PageSlot>,
    /// 置位表示该页与其他对象共享，写入前必须复制
    cow_map: Option<Bitmap>,
    shared_committed_cow_pages: Option<Arc<CommittedCowPages>>,
    unused_committed_pages: usize,
    flags: AnonFlags,
}

impl AnonymousInner {
    fn is_cow(&self, index: usize) -> bool {
        self.cow_map.as_ref().is_some_and(|map| map.get(index))
    }

    fn clear_cow(&mut self, index: usize) {
        if let Some(map) = self.cow_map.as_mut() {
            map.set(index, false);
        }
    }

    fn count_slots(&self, pred: impl Fn(&PageSlot) -> bool) -> usize {
        self.pages.iter().filter(|slot| pred(*slot)).count()
    }

    /// 用本对象的一个预留填充惰性页 `index`
    fn populate_committed(&mut self, index: usize) -> Arc<PhysicalPage> {
        assert!(
            matches!(self.pages.get(index), Some(PageSlot::LazyCommitted)),
            "anonymous vmobject: page {} has no committed credit",
            index
        );
        // 惰性页与预留一一对应，因此这里必然还有预留
        self.unused_committed_pages -= 1;
        let page = Arc::new(PhysicalPage::from_frame(alloc_committed_frame()));
        self.pages[index] = PageSlot::Present(page.clone());
        page
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.unused_committed_pages,
            self.count_slots(|slot| matches!(slot, PageSlot::LazyCommitted))
        );
        debug_assert!(self.cow_map.as_ref().is_none_or(|map| map.len() == self.pages.len()));
    }
}

/// 匿名内存 VM 对象
pub struct AnonymousVmObject {
    inner: SpinLock<AnonymousInner>,
}

/// 分配 `count` 个空页槽；内存不足时返回 `None`
fn try_alloc_slots(count: usize) -> Option<Vec<PageSlot>> {
    let mut pages = Vec::new();
    pages.try_reserve_exact(count).ok()?;
    pages.resize(count, PageSlot::Empty);
    Some(pages)
}

impl AnonymousVmObject {
    fn from_parts(
        pages: Vec<PageSlot>,
        cow_map: Option<Bitmap>,
        shared_committed_cow_pages: Option<Arc<CommittedCowPages>>,
        unused_committed_pages: usize,
        flags: AnonFlags,
    ) -> Arc<Self> {
        let inner = AnonymousInner {
            pages,
            cow_map,
            shared_committed_cow_pages,
            unused_committed_pages,
            flags,
        };
        inner.check_invariants();
        Arc::new(Self {
            inner: SpinLock::new(inner),
        })
    }

    fn try_create_with_flags(
        size: usize,
        strategy: AllocationStrategy,
        flags: AnonFlags,
    ) -> Option<Arc<Self>> {
        let page_count = page_count_for(size);
        if page_count == 0 {
            return None;
        }
        let mut pages = try_alloc_slots(page_count)?;
        let cow_map = if flags.contains(AnonFlags::PURGEABLE) {
            Some(Bitmap::try_new(page_count)?)
        } else {
            None
        };

        let mut unused_committed_pages = 0;
        match strategy {
            AllocationStrategy::Reserve => {
                if !commit_frames(page_count) {
                    log::warn!("anonymous vmobject: cannot reserve {} pages", page_count);
                    return None;
                }
                pages.fill(PageSlot::LazyCommitted);
                unused_committed_pages = page_count;
            }
            AllocationStrategy::AllocateNow => {
                if !commit_frames(page_count) {
                    log::warn!("anonymous vmobject: cannot allocate {} pages", page_count);
                    return None;
                }
                for slot in pages.iter_mut() {
                    *slot = PageSlot::Present(Arc::new(PhysicalPage::from_frame(
                        alloc_committed_frame(),
                    )));
                }
            }
            AllocationStrategy::None => {}
        }

        Some(Self::from_parts(
            pages,
            cow_map,
            None,
            unused_committed_pages,
            flags,
        ))
    }

    /// 创建 `size` 字节（向上取整到页）的匿名对象
    ///
    /// 大小为 0 或内存不足时返回 `None`。
    pub fn try_create_with_size(size: usize, strategy: AllocationStrategy) -> Option<Arc<Self>> {
        Self::try_create_with_flags(size, strategy, AnonFlags::empty())
    }

    /// 创建可清除的匿名对象，初始不是易失的
    pub fn try_create_purgeable_with_size(
        size: usize,
        strategy: AllocationStrategy,
    ) -> Option<Arc<Self>> {
        Self::try_create_with_flags(size, strategy, AnonFlags::PURGEABLE)
    }

    /// 用一段外部物理内存（如帧缓冲）创建对象，页面不归本对象回收
    ///
    /// # Panics
    /// `paddr` 不是页对齐的
    pub fn try_create_for_physical_range(paddr: Paddr, size: usize) -> Option<Arc<Self>> {
        assert!(paddr.is_page_aligned(), "physical range {} is not page aligned", paddr);
        let page_count = page_count_for(size);
        if page_count == 0 {
            return None;
        }
        let first = Ppn::from_addr_floor(paddr);
        let mut pages = try_alloc_slots(page_count)?;
        for (i, slot) in pages.iter_mut().enumerate() {
            *slot = PageSlot::Present(Arc::new(PhysicalPage::fixed(first + i)));
        }
        Some(Self::from_parts(pages, None, None, 0, AnonFlags::empty()))
    }

    /// 用给定的物理页创建对象
    pub fn try_create_with_physical_pages(physical_pages: &[Arc<PhysicalPage>]) -> Option<Arc<Self>> {
        if physical_pages.is_empty() {
            return None;
        }
        let mut pages = Vec::new();
        pages.try_reserve_exact(physical_pages.len()).ok()?;
        pages.extend(physical_pages.iter().cloned().map(PageSlot::Present));
        Some(Self::from_parts(pages, None, None, 0, AnonFlags::empty()))
    }

    /// 创建物理连续的匿名对象（DMA 缓冲区等）
    pub fn try_create_physically_contiguous_with_size(size: usize) -> Option<Arc<Self>> {
        let page_count = page_count_for(size);
        if page_count == 0 {
            return None;
        }
        let mut pages = try_alloc_slots(page_count)?;
        let Some(frames) = alloc_contig_frames(page_count) else {
            log::warn!("anonymous vmobject: no {} contiguous frames", page_count);
            return None;
        };
        for (slot, frame) in pages.iter_mut().zip(frames.into_frames()) {
            *slot = PageSlot::Present(Arc::new(PhysicalPage::from_frame(frame)));
        }
        Some(Self::from_parts(pages, None, None, 0, AnonFlags::empty()))
    }

    /// 为 fork 克隆本对象
    ///
    /// 双方共享全部已有页面，并把它们都标记为 COW；为共享页新建一个
    /// [`CommittedCowPages`] 池由双方共用。克隆自己的惰性页会重新预留。
    /// 易失的可清除对象克隆为一个全新的、已被清除的易失对象。
    ///
    /// 再次克隆时本对象改用新池，旧池仍由之前的克隆持有。新池只为每个共享页
    /// 预留一页，因此三方以上共享同一页时，后写入者可能要直接向分配器申请。
    ///
    /// 任何预留失败都返回 `None`，本对象保持不变。
    pub fn try_clone(&self) -> Option<Arc<Self>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let page_count = inner.pages.len();

        if inner
            .flags
            .contains(AnonFlags::PURGEABLE | AnonFlags::VOLATILE)
        {
            drop(guard);
            let pages = try_alloc_slots(page_count)?;
            let cow_map = Bitmap::try_new(page_count)?;
            return Some(Self::from_parts(
                pages,
                Some(cow_map),
                None,
                0,
                AnonFlags::PURGEABLE | AnonFlags::VOLATILE | AnonFlags::WAS_PURGED,
            ));
        }

        // 先准备所有可能失败的资源，成功后再一次性修改双方状态
        let shared_pages = inner.count_slots(PageSlot::is_present);
        let lazy_pages = inner.unused_committed_pages;

        let mut clone_pages = Vec::new();
        clone_pages.try_reserve_exact(page_count).ok()?;
        clone_pages.extend(inner.pages.iter().cloned());
        let mut own_map = Bitmap::try_new(page_count)?;
        let mut clone_map = Bitmap::try_new(page_count)?;

        if !commit_frames(lazy_pages) {
            log::warn!("anonymous vmobject: clone cannot recommit {} lazy pages", lazy_pages);
            return None;
        }
        let pool = if shared_pages > 0 {
            match CommittedCowPages::try_create(shared_pages) {
                Some(pool) => Some(pool),
                None => {
                    uncommit_frames(lazy_pages);
                    return None;
                }
            }
        } else {
            None
        };

        for (index, slot) in inner.pages.iter().enumerate() {
            if slot.is_present() {
                own_map.set(index, true);
                clone_map.set(index, true);
            }
        }
        inner.cow_map = Some(own_map);
        inner.shared_committed_cow_pages = pool.clone();
        let flags = inner.flags & AnonFlags::PURGEABLE;
        drop(guard);

        log::debug!(
            "anonymous vmobject: cloned {} pages, {} shared, {} lazy",
            page_count,
            shared_pages,
            lazy_pages
        );
        Some(Self::from_parts(
            clone_pages,
            Some(clone_map),
            pool,
            lazy_pages,
            flags,
        ))
    }

    /// 第 `index` 页被写入前是否需要复制
    ///
    /// 共享映射的写入直接落在共享页上，因此总是返回 false。
    pub fn should_cow(&self, index: usize, is_shared_mapping: bool) -> bool {
        !is_shared_mapping && self.inner.lock().is_cow(index)
    }

    /// 设置第 `index` 页的 COW 标记，必要时创建 COW 位图
    pub fn set_should_cow(&self, index: usize, value: bool) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(map) = inner.cow_map.as_mut() {
            map.set(index, value);
            return;
        }
        if value {
            let mut map = Bitmap::new(inner.pages.len());
            map.set(index, true);
            inner.cow_map = Some(map);
        }
    }

    /// 共享中的页数
    pub fn cow_pages(&self) -> usize {
        self.inner
            .lock()
            .cow_map
            .as_ref()
            .map_or(0, Bitmap::count_ones)
    }

    /// 处理对第 `index` 页的写保护异常
    ///
    /// 页面只剩本对象持有时直接接管，否则复制一份私有页。
    /// `vaddr` 为出错地址，仅用于日志。
    pub fn handle_cow_fault(&self, index: usize, vaddr: Vaddr) -> PageFaultResponse {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.is_cow(index) {
            log::debug!("cow fault at {:?}: page {} is not cow", vaddr, index);
            return PageFaultResponse::ShouldCrash;
        }
        if inner.flags.contains(AnonFlags::VOLATILE) {
            log::debug!("cow fault at {:?}: object is volatile", vaddr);
            return PageFaultResponse::ShouldCrash;
        }

        if inner
            .shared_committed_cow_pages
            .as_ref()
            .is_some_and(|pool| pool.is_empty())
        {
            inner.shared_committed_cow_pages = None;
        }

        let Some(old_page) = inner.pages[index].page() else {
            log::debug!("cow fault at {:?}: page {} not present", vaddr, index);
            return PageFaultResponse::ShouldCrash;
        };

        if Arc::strong_count(old_page) == 1 {
            // 其他共享者都已复制走，页面只剩我们持有
            inner.clear_cow(index);
            if let Some(pool) = inner.shared_committed_cow_pages.as_ref() {
                pool.try_uncommit_one();
            }
            stats::incr_cow_shortcut();
            return PageFaultResponse::Continue;
        }

        // 兄弟对象可能同时在消耗同一个池，池空时退回普通分配
        let pooled = inner
            .shared_committed_cow_pages
            .as_ref()
            .and_then(|pool| pool.try_allocate_one());
        let new_page = match pooled {
            Some(page) => page,
            None => match alloc_frame() {
                Some(frame) => Arc::new(PhysicalPage::from_frame(frame)),
                None => {
                    log::warn!("cow fault at {:?}: out of memory", vaddr);
                    stats::incr_out_of_memory();
                    return PageFaultResponse::OutOfMemory;
                }
            },
        };
        new_page.copy_from(old_page);

        inner.pages[index] = PageSlot::Present(new_page);
        inner.clear_cow(index);
        stats::incr_cow_copy();
        PageFaultResponse::Continue
    }

    /// 处理对第 `index` 页的缺页（页不存在）
    pub fn handle_zero_fault(&self, index: usize) -> PageFaultResponse {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(slot) = inner.pages.get(index) else {
            return PageFaultResponse::ShouldCrash;
        };
        match slot {
            PageSlot::Present(_) => return PageFaultResponse::Continue,
            PageSlot::LazyCommitted => {
                inner.populate_committed(index);
            }
            PageSlot::Empty => match alloc_frame() {
                Some(frame) => {
                    inner.pages[index] = PageSlot::Present(Arc::new(PhysicalPage::from_frame(frame)));
                }
                None => {
                    log::warn!("zero fault on page {}: out of memory", index);
                    stats::incr_out_of_memory();
                    return PageFaultResponse::OutOfMemory;
                }
            },
        }
        stats::incr_zero_fill();
        PageFaultResponse::Continue
    }

    /// 消耗惰性页 `index` 的预留，返回装入该页的清零新页
    ///
    /// 其他惰性页的预留不受影响。
    ///
    /// # Panics
    /// 第 `index` 页不是带预留的惰性页
    pub fn allocate_committed_page(&self, index: usize) -> Arc<PhysicalPage> {
        let mut inner = self.inner.lock();
        let page = inner.populate_committed(index);
        inner.check_invariants();
        page
    }

    /// 丢弃易失对象的全部页面，返回丢弃的页数
    pub fn purge(&self) -> Result<usize, VmError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.flags.contains(AnonFlags::VOLATILE) {
            return Err(VmError::NotVolatile);
        }

        let mut purged = 0;
        for (index, slot) in inner.pages.iter_mut().enumerate() {
            if slot.is_present() {
                *slot = PageSlot::Empty;
                if let Some(map) = inner.cow_map.as_mut() {
                    map.set(index, false);
                }
                purged += 1;
            }
        }
        inner.flags.insert(AnonFlags::WAS_PURGED);
        drop(guard);

        if purged > 0 {
            log::warn!("anonymous vmobject: purged {} pages", purged);
        }
        Ok(purged)
    }

    /// 设置易失状态，返回调用时对象是否曾被清除
    ///
    /// 变为易失时放弃所有预留；取消易失时为每个空页重新预留，
    /// 预留失败返回 [`VmError::OutOfMemory`] 且不做任何改变。
    pub fn set_volatile(&self, is_volatile: bool) -> Result<bool, VmError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.flags.contains(AnonFlags::PURGEABLE) {
            return Err(VmError::NotPurgeable);
        }

        let was_purged = inner.flags.contains(AnonFlags::WAS_PURGED);
        let currently_volatile = inner.flags.contains(AnonFlags::VOLATILE);

        if is_volatile && !currently_volatile {
            for slot in inner.pages.iter_mut() {
                if matches!(slot, PageSlot::LazyCommitted) {
                    *slot = PageSlot::Empty;
                }
            }
            uncommit_frames(core::mem::take(&mut inner.unused_committed_pages));
            inner.shared_committed_cow_pages = None;
            inner.flags.insert(AnonFlags::VOLATILE);
            inner.flags.remove(AnonFlags::WAS_PURGED);
        } else if !is_volatile && currently_volatile {
            let empty = inner.count_slots(|slot| matches!(slot, PageSlot::Empty));
            if !commit_frames(empty) {
                log::warn!("anonymous vmobject: cannot recommit {} purged pages", empty);
                return Err(VmError::OutOfMemory);
            }
            for slot in inner.pages.iter_mut() {
                if matches!(slot, PageSlot::Empty) {
                    *slot = PageSlot::LazyCommitted;
                }
            }
            inner.unused_committed_pages += empty;
            inner.flags.remove(AnonFlags::VOLATILE);
        }

        inner.check_invariants();
        Ok(was_purged)
    }

    /// 是否可清除
    pub fn is_purgeable(&self) -> bool {
        self.inner.lock().flags.contains(AnonFlags::PURGEABLE)
    }

    /// 是否易失
    pub fn is_volatile(&self) -> bool {
        self.inner.lock().flags.contains(AnonFlags::VOLATILE)
    }

    /// 自上次变为易失以来是否被清除过
    pub fn was_purged(&self) -> bool {
        self.inner.lock().flags.contains(AnonFlags::WAS_PURGED)
    }

    /// 本对象未使用的预留数
    pub fn unused_committed_pages(&self) -> usize {
        self.inner.lock().unused_committed_pages
    }

    /// 共享 COW 池中剩余的预留数；没有池时为 0
    pub fn shared_committed_pages(&self) -> usize {
        self.inner
            .lock()
            .shared_committed_cow_pages
            .as_ref()
            .map_or(0, |pool| pool.committed_count())
    }

    /// 第 `index` 页的当前状态
    pub fn slot(&self, index: usize) -> Option<PageSlot> {
        self.inner.lock().pages.get(index).cloned()
    }
}

impl VmObject for AnonymousVmObject {
    fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    fn class_name(&self) -> &'static str {
        "AnonymousVmObject"
    }

    fn is_anonymous(&self) -> bool {
        true
    }

    fn physical_page(&self, index: usize) -> Option<Arc<PhysicalPage>> {
        self.inner.lock().pages.get(index)?.page().cloned()
    }
}

impl Drop for AnonymousVmObject {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        uncommit_frames(inner.unused_committed_pages);
    }
}
