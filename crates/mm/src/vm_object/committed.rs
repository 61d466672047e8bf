//! 写时复制的预留池

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::page::PhysicalPage;
use crate::frame_allocator::{alloc_committed_frame, commit_frames, uncommit_frames};

/// 克隆时为共享页预留的帧
///
/// 克隆后父子双方的每个共享页都可能在将来被写入而需要一个新页；
/// 克隆时一次性预留，使之后的 COW 缺页不会因内存不足而失败。
/// 由原对象和所有克隆通过 `Arc` 共享，计数是原子的。
/// 最后一个引用消失时，剩余的预留归还给帧分配器。
#[derive(Debug)]
pub struct CommittedCowPages {
    committed: AtomicUsize,
}

impl CommittedCowPages {
    /// 预留 `count` 个帧；帧分配器无法满足时返回 `None`
    pub fn try_create(count: usize) -> Option<Arc<Self>> {
        if !commit_frames(count) {
            log::warn!("cow pool: failed to commit {} frames", count);
            return None;
        }
        Some(Arc::new(Self {
            committed: AtomicUsize::new(count),
        }))
    }

    /// 消耗一个预留，返回一个清零的新页
    ///
    /// # Panics
    /// 预留已经用完
    pub fn allocate_one(&self) -> Arc<PhysicalPage> {
        match self.try_allocate_one() {
            Some(page) => page,
            None => panic!("cow pool: allocate_one on an exhausted pool"),
        }
    }

    /// 同 [`allocate_one`](Self::allocate_one)，预留已用完时返回 `None`
    ///
    /// 池由多个对象共享，各自只持有自己的锁，
    /// 因此检查余量和取走预留必须是同一个原子操作。
    pub fn try_allocate_one(&self) -> Option<Arc<PhysicalPage>> {
        self.try_take_one()
            .then(|| Arc::new(PhysicalPage::from_frame(alloc_committed_frame())))
    }

    /// 归还一个预留而不分配
    ///
    /// # Panics
    /// 预留已经用完
    pub fn uncommit_one(&self) {
        if !self.try_uncommit_one() {
            panic!("cow pool: uncommit_one on an exhausted pool");
        }
    }

    /// 同 [`uncommit_one`](Self::uncommit_one)，预留已用完时返回 false
    pub fn try_uncommit_one(&self) -> bool {
        let taken = self.try_take_one();
        if taken {
            uncommit_frames(1);
        }
        taken
    }

    /// 剩余预留数
    pub fn committed_count(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    /// 预留是否已经用完
    pub fn is_empty(&self) -> bool {
        self.committed_count() == 0
    }

    fn try_take_one(&self) -> bool {
        self.committed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Drop for CommittedCowPages {
    fn drop(&mut self) {
        uncommit_frames(*self.committed.get_mut());
    }
}
