//! Mutex 的作用域守卫

use crate::mutex::{LockMode, Mutex};

/// [`Mutex`] 的 RAII 守卫，离开作用域时释放自己加上的那一层锁
///
/// 支持在作用域内提前 `unlock()` 再重新 `lock()`，
/// 也可以先创建一个未关联的守卫，稍后再 `attach_and_lock()`。
///
/// # 示例
/// ```ignore
/// let mut locker = MutexLocker::new(&INODE_LOCK, LockMode::Shared);
/// read_inode();
/// locker.unlock();
/// wait_for_io();
/// locker.lock(LockMode::Exclusive);
/// ```
#[must_use]
pub struct MutexLocker<'a> {
    mutex: Option<&'a Mutex>,
    locked: bool,
}

impl<'a> MutexLocker<'a> {
    /// 以 `mode` 加锁并返回守卫
    pub fn new(mutex: &'a Mutex, mode: LockMode) -> Self {
        mutex.lock(mode);
        Self {
            mutex: Some(mutex),
            locked: true,
        }
    }

    /// 未关联任何锁的守卫
    pub const fn detached() -> Self {
        Self {
            mutex: None,
            locked: false,
        }
    }

    /// 关联到 `mutex` 并以 `mode` 加锁
    ///
    /// # Panics
    /// 守卫当前仍持有锁。
    pub fn attach_and_lock(&mut self, mutex: &'a Mutex, mode: LockMode) {
        assert!(!self.locked, "MutexLocker: attach while still locked");
        self.mutex = Some(mutex);
        mutex.lock(mode);
        self.locked = true;
    }

    /// 提前释放
    ///
    /// # Panics
    /// 守卫未关联锁或已经释放。
    pub fn unlock(&mut self) {
        let mutex = self.attached("unlock");
        assert!(self.locked, "MutexLocker: double unlock of {}", mutex.name());
        self.locked = false;
        mutex.unlock();
    }

    /// 释放后重新加锁
    ///
    /// # Panics
    /// 守卫未关联锁或仍持有锁。
    pub fn lock(&mut self, mode: LockMode) {
        let mutex = self.attached("lock");
        assert!(!self.locked, "MutexLocker: {} already locked", mutex.name());
        mutex.lock(mode);
        self.locked = true;
    }

    /// 守卫当前是否持有锁
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn attached(&self, op: &str) -> &'a Mutex {
        match self.mutex {
            Some(mutex) => mutex,
            None => panic!("MutexLocker: {} on a detached locker", op),
        }
    }
}

impl Drop for MutexLocker<'_> {
    fn drop(&mut self) {
        if self.locked
            && let Some(mutex) = self.mutex
        {
            self.locked = false;
            mutex.unlock();
        }
    }
}

/// 在作用域内暂时完全交出锁
///
/// 创建时调用 [`Mutex::force_unlock_if_locked`]，离开作用域时以原模式和原深度恢复。
/// 当前线程本来不持有锁时什么也不做。
///
/// # 示例
/// ```ignore
/// {
///     let _release = ScopedLockRelease::new(&BIG_LOCK);
///     block_on_disk(); // 睡眠期间其他线程可以取得 BIG_LOCK
/// } // 重新获得，递归深度不变
/// ```
#[must_use]
pub struct ScopedLockRelease<'a> {
    mutex: &'a Mutex,
    previous_mode: LockMode,
    previous_recursions: u32,
}

impl<'a> ScopedLockRelease<'a> {
    /// 完全释放当前线程持有的 `mutex`
    pub fn new(mutex: &'a Mutex) -> Self {
        let (previous_mode, previous_recursions) = mutex.force_unlock_if_locked();
        Self {
            mutex,
            previous_mode,
            previous_recursions,
        }
    }

    /// 释放前的模式
    pub fn previous_mode(&self) -> LockMode {
        self.previous_mode
    }

    /// 释放前当前线程的递归深度
    pub fn previous_recursions(&self) -> u32 {
        self.previous_recursions
    }

    /// 提前恢复；重复调用无效果
    pub fn restore_lock(&mut self) {
        if self.previous_mode == LockMode::Unlocked {
            return;
        }
        let mode = core::mem::replace(&mut self.previous_mode, LockMode::Unlocked);
        let recursions = core::mem::replace(&mut self.previous_recursions, 0);
        self.mutex.restore_lock(mode, recursions);
    }

    /// 放弃恢复，离开作用域时保持未持有状态
    pub fn do_not_restore(&mut self) {
        self.previous_mode = LockMode::Unlocked;
        self.previous_recursions = 0;
    }
}

impl Drop for ScopedLockRelease<'_> {
    fn drop(&mut self) {
        self.restore_lock();
    }
}
