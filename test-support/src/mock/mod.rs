//! Mock 实现模块
//!
//! 提供架构、调度器和内存管理的 Mock 实现，用于测试

pub mod arch;
pub mod mm;
pub mod sched;
