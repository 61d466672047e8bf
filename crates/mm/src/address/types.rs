//! 地址类型

use core::fmt;
use core::ops::Add;

use crate::config::page_size;

/// 与 `usize` 互相转换
pub trait UsizeConvert: Copy {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

macro_rules! impl_address {
    ($type:ident, $prefix:literal) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl $type {
            /// 页内偏移
            pub fn page_offset(self) -> usize {
                self.0 % page_size()
            }

            /// 是否页对齐
            pub fn is_page_aligned(self) -> bool {
                self.page_offset() == 0
            }

            /// 向下对齐到页边界
            pub fn align_down_to_page(self) -> Self {
                Self(self.0 - self.page_offset())
            }

            /// 向上对齐到页边界
            pub fn align_up_to_page(self) -> Self {
                Self(self.0.next_multiple_of(page_size()))
            }
        }

        impl Add<usize> for $type {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "({:#x})"), self.0)
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Paddr(pub usize);
impl_address!(Paddr, "Paddr");

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr, "Vaddr");

impl Paddr {
    /// 通过直接映射区得到对应的虚拟地址
    pub fn to_vaddr(self) -> Vaddr {
        Vaddr(crate::arch_ops().paddr_to_vaddr(self.0))
    }
}

impl Vaddr {
    /// 作为只读指针
    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    /// 作为可写指针
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}
