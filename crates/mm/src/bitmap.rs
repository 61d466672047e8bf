//! 定长位图
//!
//! 帧分配器用它跟踪帧的分配状态，匿名 VM 对象用它记录哪些页需要写时复制。
//! 以 `u64` 为单位存储，便于整字跳过。

use alloc::vec::Vec;

/// 定长位图，所有位初始为 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// 创建 `len` 位的位图
    pub fn new(len: usize) -> Self {
        Self {
            words: alloc::vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    /// 创建 `len` 位的位图；内存不足时返回 `None`
    pub fn try_new(len: usize) -> Option<Self> {
        let count = len.div_ceil(64);
        let mut words = Vec::new();
        words.try_reserve_exact(count).ok()?;
        words.resize(count, 0);
        Some(Self { words, len })
    }

    /// 位数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为 0 位
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 读取第 `index` 位；越界视为 0
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// 写入第 `index` 位
    ///
    /// # Panics
    /// `index` 越界
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.len, "bitmap index {} out of range {}", index, self.len);
        let mask = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    /// 置位的数量
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// 底层的字，末尾超出 `len` 的位恒为 0
    pub(crate) fn words(&self) -> &[u64] {
        &self.words
    }
}
