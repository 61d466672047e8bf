//! 地址模块
//!
//! 物理 / 虚拟地址与物理页码的轻量封装。
//!
//! - [`Paddr`] / [`Vaddr`]：物理地址与虚拟地址
//! - [`Ppn`] / [`PpnRange`]：物理页码及其半开区间
//! - [`UsizeConvert`] / [`PageNum`]：与 `usize` 互转、页码与地址互转

mod page_num;
mod types;

pub use page_num::{PageNum, Ppn, PpnRange};
pub use types::{Paddr, UsizeConvert, Vaddr};
