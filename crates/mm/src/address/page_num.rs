//! 页码抽象
//!
//! 页码是地址空间中页的索引，它将内存管理抽象与底层硬件地址解耦。

use core::ops::{Add, Range};

use crate::address::types::{Paddr, UsizeConvert};
use crate::config::page_size;

/// 页码 trait
pub trait PageNum: UsizeConvert + Ord {
    /// 关联的地址类型（Ppn 关联 Paddr）
    type TAddress: UsizeConvert;

    /// 包含 `addr` 的页（向下取整）
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.as_usize() / page_size())
    }

    /// `addr` 之后的第一个完整页（向上取整）
    ///
    /// 页起始地址返回该页本身，例如 0x1000 得到 1，0x1001 得到 2。
    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.as_usize().div_ceil(page_size()))
    }

    /// 页的起始地址
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * page_size())
    }
}

/// 物理页码 (Physical Page Number)
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Ppn(pub usize);

impl UsizeConvert for Ppn {
    fn as_usize(&self) -> usize {
        self.0
    }

    fn from_usize(value: usize) -> Self {
        Self(value)
    }
}

impl PageNum for Ppn {
    type TAddress = Paddr;
}

impl Add<usize> for Ppn {
    type Output = Ppn;

    fn add(self, rhs: usize) -> Ppn {
        Ppn(self.0 + rhs)
    }
}

/// 物理页码区间 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PpnRange {
    start: Ppn,
    end: Ppn,
}

impl PpnRange {
    /// 由起止页码创建
    pub fn new(start: Ppn, end: Ppn) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// 由起始页码和页数创建
    pub fn from_start_len(start: Ppn, len: usize) -> Self {
        Self::new(start, start + len)
    }

    /// 起始页码
    pub fn start(&self) -> Ppn {
        self.start
    }

    /// 结束页码（不包含）
    pub fn end(&self) -> Ppn {
        self.end
    }

    /// 页数
    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    /// 是否为空区间
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 是否包含 `ppn`
    pub fn contains(&self, ppn: Ppn) -> bool {
        ppn >= self.start && ppn < self.end
    }

    /// 按升序遍历区间内的页码
    pub fn iter(&self) -> impl Iterator<Item = Ppn> + use<> {
        let range: Range<usize> = self.start.0..self.end.0;
        range.map(Ppn)
    }
}
