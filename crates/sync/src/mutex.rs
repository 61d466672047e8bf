//! 可重入睡眠锁
//!
//! [`Mutex`] 是一把区分独占 / 共享模式、支持递归加锁的阻塞锁，
//! 用于保护可能在持锁期间睡眠的内核数据结构。
//!
//! # 状态机
//!
//! | 当前模式 | 请求 Exclusive | 请求 Shared |
//! |---|---|---|
//! | Unlocked | 立即获得 | 立即获得 |
//! | Exclusive（持有者本人） | 递归计数 +1 | 递归计数 +1，保持独占 |
//! | Exclusive（其他线程） | 排队等待 | 排队等待 |
//! | Shared（唯一持有者本人） | 原地升级为独占 | 递归计数 +1 |
//! | Shared（其他） | 排队等待 | 立即获得 |
//!
//! # 交接（hand-off）
//!
//! 释放到 `times_locked == 0` 时，锁直接交给等待者而不是让它们重新竞争：
//! 先交给独占队列的队首（FIFO），独占队列为空时一次性交给全部共享等待者。
//! 被唤醒的线程醒来时已经是持有者。
//!
//! 元数据由内部 [`SpinLock`] 保护；阻塞发生在释放自旋锁之后，
//! 依赖 [`SchedOps`](crate::SchedOps) 的令牌语义避免丢失唤醒。

use alloc::collections::{BTreeMap, VecDeque};
use core::fmt;

use crate::sched::{ThreadId, current_thread, sched_ops};
use crate::spin_lock::{SpinLock, SpinLockGuard};

/// 锁模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// 未加锁
    Unlocked,
    /// 独占（写者）
    Exclusive,
    /// 共享（读者）
    Shared,
}

impl LockMode {
    /// 模式名称
    pub const fn as_str(self) -> &'static str {
        match self {
            LockMode::Unlocked => "unlocked",
            LockMode::Exclusive => "exclusive",
            LockMode::Shared => "shared",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 排队中的线程以及它被授予锁时应得的递归深度
#[derive(Debug, Clone, Copy)]
struct Waiter {
    thread: ThreadId,
    requested: u32,
}

/// 释放自旋锁之后需要唤醒的线程
enum Wakeups {
    None,
    One(ThreadId),
    Many(VecDeque<Waiter>),
}

impl Wakeups {
    fn deliver(self) {
        match self {
            Wakeups::None => {}
            Wakeups::One(thread) => sched_ops().wake(thread),
            Wakeups::Many(waiters) => {
                let sched = sched_ops();
                for waiter in waiters {
                    sched.wake(waiter.thread);
                }
            }
        }
    }
}

struct MutexState {
    mode: LockMode,
    /// 所有持有者的递归次数之和
    times_locked: u32,
    /// 独占模式下为持有者；共享模式下只是某个持有者的提示，可能为空
    holder: Option<ThreadId>,
    shared_holders: BTreeMap<ThreadId, u32>,
    blocked_exclusive: VecDeque<Waiter>,
    blocked_shared: VecDeque<Waiter>,
}

impl MutexState {
    const fn new() -> Self {
        Self {
            mode: LockMode::Unlocked,
            times_locked: 0,
            holder: None,
            shared_holders: BTreeMap::new(),
            blocked_exclusive: VecDeque::new(),
            blocked_shared: VecDeque::new(),
        }
    }

    fn queue_for(&mut self, mode: LockMode) -> &mut VecDeque<Waiter> {
        match mode {
            LockMode::Exclusive => &mut self.blocked_exclusive,
            LockMode::Shared => &mut self.blocked_shared,
            LockMode::Unlocked => unreachable!("no wait queue for unlocked mode"),
        }
    }

    fn is_queued(&self, mode: LockMode, thread: ThreadId) -> bool {
        let queue = match mode {
            LockMode::Exclusive => &self.blocked_exclusive,
            _ => &self.blocked_shared,
        };
        queue.iter().any(|w| w.thread == thread)
    }

    fn owned_by(&self, thread: ThreadId) -> bool {
        match self.mode {
            LockMode::Exclusive => self.holder == Some(thread),
            LockMode::Shared => self.shared_holders.contains_key(&thread),
            LockMode::Unlocked => false,
        }
    }

    fn is_sole_shared_holder(&self, thread: ThreadId) -> bool {
        self.shared_holders.len() == 1 && self.shared_holders.contains_key(&thread)
    }

    /// 从 Unlocked 状态直接获得锁
    fn acquire_unlocked(&mut self, thread: ThreadId, mode: LockMode, count: u32) {
        debug_assert_eq!(self.mode, LockMode::Unlocked);
        debug_assert_eq!(self.times_locked, 0);
        match mode {
            LockMode::Exclusive => {
                self.mode = LockMode::Exclusive;
                self.holder = Some(thread);
                self.times_locked = count;
            }
            LockMode::Shared => {
                self.mode = LockMode::Shared;
                self.add_shared(thread, count);
            }
            LockMode::Unlocked => unreachable!(),
        }
    }

    fn add_shared(&mut self, thread: ThreadId, count: u32) {
        debug_assert_eq!(self.mode, LockMode::Shared);
        *self.shared_holders.entry(thread).or_insert(0) += count;
        self.times_locked += count;
        if self.holder.is_none() {
            self.holder = Some(thread);
        }
    }

    /// 唯一的共享持有者原地升级为独占，递归深度保持不变
    fn upgrade(&mut self, thread: ThreadId) {
        debug_assert!(self.is_sole_shared_holder(thread));
        self.shared_holders.clear();
        self.mode = LockMode::Exclusive;
        self.holder = Some(thread);
    }

    /// 移除一个共享持有者后修正提示
    fn refresh_shared_hint(&mut self, leaving: ThreadId) {
        if self.holder == Some(leaving) {
            self.holder = self.shared_holders.keys().next().copied();
        }
    }

    /// 锁已完全释放，把它交给等待者
    ///
    /// 独占等待者优先，避免写者饥饿。
    fn unblock_waiters(&mut self) -> Wakeups {
        debug_assert_eq!(self.times_locked, 0);
        self.mode = LockMode::Unlocked;
        self.holder = None;

        if let Some(next) = self.blocked_exclusive.pop_front() {
            self.acquire_unlocked(next.thread, LockMode::Exclusive, next.requested);
            return Wakeups::One(next.thread);
        }
        if self.blocked_shared.is_empty() {
            return Wakeups::None;
        }

        let granted = core::mem::take(&mut self.blocked_shared);
        self.mode = LockMode::Shared;
        for waiter in &granted {
            self.add_shared(waiter.thread, waiter.requested);
        }
        Wakeups::Many(granted)
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.mode == LockMode::Unlocked, self.times_locked == 0);
        match self.mode {
            LockMode::Unlocked => {
                debug_assert!(self.holder.is_none());
                debug_assert!(self.shared_holders.is_empty());
            }
            LockMode::Exclusive => {
                debug_assert!(self.holder.is_some());
                debug_assert!(self.shared_holders.is_empty());
            }
            LockMode::Shared => {
                debug_assert!(!self.shared_holders.is_empty());
                debug_assert_eq!(self.shared_holders.values().sum::<u32>(), self.times_locked);
            }
        }
    }
}

/// 可重入、区分模式的睡眠锁
///
/// 与 [`SpinLock`] 不同，`Mutex` 不包裹数据，只负责串行化；
/// 持锁期间允许睡眠。中断上下文中不得使用。
///
/// # 示例
/// ```ignore
/// static FS_LOCK: Mutex = Mutex::new("fs");
///
/// FS_LOCK.lock(LockMode::Exclusive);
/// FS_LOCK.lock(LockMode::Exclusive); // 同一线程重入
/// FS_LOCK.unlock();
/// FS_LOCK.unlock();
/// ```
pub struct Mutex {
    name: &'static str,
    state: SpinLock<MutexState>,
}

impl Mutex {
    /// 创建一把未加锁的 Mutex
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: SpinLock::new(MutexState::new()),
        }
    }

    /// 锁名（调试用）
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 以指定模式加锁，必要时阻塞当前线程
    ///
    /// # Panics
    /// - `mode` 为 [`LockMode::Unlocked`]
    /// - 在中断上下文中调用
    /// - 当前线程以共享模式持有锁、且还有其他共享持有者时请求独占（必然死锁）
    pub fn lock(&self, mode: LockMode) {
        assert!(
            mode != LockMode::Unlocked,
            "mutex {}: cannot lock in unlocked mode",
            self.name
        );
        self.assert_not_in_interrupt();
        let current = current_thread();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match (state.mode, mode) {
            (LockMode::Unlocked, _) => {
                state.acquire_unlocked(current, mode, 1);
                return;
            }
            (LockMode::Exclusive, _) if state.holder == Some(current) => {
                state.times_locked += 1;
                return;
            }
            (LockMode::Shared, LockMode::Shared) => {
                state.add_shared(current, 1);
                return;
            }
            (LockMode::Shared, LockMode::Exclusive) if state.is_sole_shared_holder(current) => {
                state.upgrade(current);
                state.times_locked += 1;
                return;
            }
            _ => {}
        }

        self.block(guard, current, mode, 1);
    }

    /// 释放一层递归
    ///
    /// 递归计数归零时锁交给等待者（见模块文档）。从不阻塞。
    ///
    /// # Panics
    /// 当前线程不持有此锁。
    pub fn unlock(&self) {
        self.assert_not_in_interrupt();
        let current = current_thread();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.mode {
            LockMode::Exclusive => {
                assert!(
                    state.holder == Some(current),
                    "mutex {}: unlocked by {} but held exclusively by {:?}",
                    self.name,
                    current,
                    state.holder
                );
                if state.times_locked == 1 {
                    state.holder = None;
                }
            }
            LockMode::Shared => {
                let Some(count) = state.shared_holders.get_mut(&current) else {
                    panic!(
                        "mutex {}: unlocked by {} which is not a shared holder",
                        self.name, current
                    );
                };
                if *count > 1 {
                    *count -= 1;
                } else {
                    state.shared_holders.remove(&current);
                    state.refresh_shared_hint(current);
                }
            }
            LockMode::Unlocked => panic!("mutex {}: unlock of an unlocked mutex", self.name),
        }

        state.times_locked -= 1;
        let wakeups = if state.times_locked == 0 {
            state.unblock_waiters()
        } else {
            Wakeups::None
        };
        state.check_invariants();
        drop(guard);

        wakeups.deliver();
    }

    /// 是否处于加锁状态（任一模式）
    pub fn is_locked(&self) -> bool {
        self.state.lock().mode != LockMode::Unlocked
    }

    /// 当前线程是否持有此锁
    pub fn own_lock(&self) -> bool {
        let current = current_thread();
        self.state.lock().owned_by(current)
    }

    /// 当前模式
    pub fn mode(&self) -> LockMode {
        self.state.lock().mode
    }

    /// 所有持有者的递归次数之和
    pub fn times_locked(&self) -> u32 {
        self.state.lock().times_locked
    }

    /// 独占持有者；共享模式下仅为提示
    pub fn holder(&self) -> Option<ThreadId> {
        self.state.lock().holder
    }

    /// 指定线程以共享模式持有的递归次数
    pub fn shared_recursions(&self, thread: ThreadId) -> u32 {
        self.state
            .lock()
            .shared_holders
            .get(&thread)
            .copied()
            .unwrap_or(0)
    }

    /// 如果当前线程持有此锁，则不论递归深度完全释放它
    ///
    /// 返回释放前的模式和当前线程的递归深度；不持有时返回 `(Unlocked, 0)`。
    /// 与 [`Mutex::restore_lock`] 配对，用于在执行其他阻塞操作前暂时交出锁。
    #[must_use]
    pub fn force_unlock_if_locked(&self) -> (LockMode, u32) {
        self.assert_not_in_interrupt();
        let current = current_thread();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let previous = state.mode;
        let recursions = match previous {
            LockMode::Unlocked => return (LockMode::Unlocked, 0),
            LockMode::Exclusive => {
                if state.holder != Some(current) {
                    return (LockMode::Unlocked, 0);
                }
                state.holder = None;
                core::mem::replace(&mut state.times_locked, 0)
            }
            LockMode::Shared => {
                let Some(recursions) = state.shared_holders.remove(&current) else {
                    return (LockMode::Unlocked, 0);
                };
                state.refresh_shared_hint(current);
                state.times_locked -= recursions;
                recursions
            }
        };

        let wakeups = if state.times_locked == 0 {
            state.unblock_waiters()
        } else {
            Wakeups::None
        };
        state.check_invariants();
        drop(guard);

        wakeups.deliver();
        log::trace!(
            "mutex {}: {} force-released {} x{}",
            self.name,
            current,
            previous,
            recursions
        );
        (previous, recursions)
    }

    /// 以 `mode` 和递归深度 `recursions` 重新获得锁
    ///
    /// 直接设定深度而不逐层加锁。锁空闲或兼容时立即获得；
    /// 若期间被其他线程取得，则排队等待，被交接时一次获得全部深度。
    ///
    /// # Panics
    /// `mode` 为 Unlocked 或 `recursions` 为 0（没有与之配对的
    /// [`Mutex::force_unlock_if_locked`]）。
    pub fn restore_lock(&self, mode: LockMode, recursions: u32) {
        assert!(
            mode != LockMode::Unlocked && recursions > 0,
            "mutex {}: restore_lock({}, {}) without a matching release",
            self.name,
            mode,
            recursions
        );
        self.assert_not_in_interrupt();
        let current = current_thread();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match (state.mode, mode) {
            (LockMode::Unlocked, _) => {
                state.acquire_unlocked(current, mode, recursions);
                return;
            }
            (LockMode::Exclusive, _) if state.holder == Some(current) => {
                state.times_locked += recursions;
                return;
            }
            (LockMode::Shared, LockMode::Shared) => {
                state.add_shared(current, recursions);
                return;
            }
            (LockMode::Shared, LockMode::Exclusive) if state.is_sole_shared_holder(current) => {
                state.upgrade(current);
                state.times_locked += recursions;
                return;
            }
            _ => {}
        }

        self.block(guard, current, mode, recursions);
    }

    /// 排队并睡眠，直到锁被交接给当前线程
    fn block(
        &self,
        mut guard: SpinLockGuard<'_, MutexState>,
        current: ThreadId,
        mode: LockMode,
        requested: u32,
    ) {
        assert!(
            !guard.shared_holders.contains_key(&current),
            "mutex {}: {} waits for {} while holding it shared",
            self.name,
            current,
            mode
        );
        guard.queue_for(mode).push_back(Waiter {
            thread: current,
            requested,
        });
        drop(guard);

        log::trace!("mutex {}: {} blocks for {}", self.name, current, mode);
        let sched = sched_ops();
        // 交接者会把我们从队列中移除；仍在队列中说明是伪唤醒
        while self.state.lock().is_queued(mode, current) {
            sched.block_current(self.wchan());
        }
        log::trace!("mutex {}: handed to {} ({})", self.name, current, mode);
    }

    /// (独占等待者数, 共享等待者数)
    #[cfg(test)]
    pub(crate) fn waiting(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.blocked_exclusive.len(), state.blocked_shared.len())
    }

    fn wchan(&self) -> usize {
        self as *const Self as usize
    }

    fn assert_not_in_interrupt(&self) {
        assert!(
            !crate::arch_ops().in_interrupt(),
            "mutex {}: used from interrupt context",
            self.name
        );
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Mutex")
            .field("name", &self.name)
            .field("mode", &state.mode)
            .field("times_locked", &state.times_locked)
            .field("holder", &state.holder)
            .finish()
    }
}
