//! 测试支持 crate
//!
//! 提供 Mock 实现，让 `sync` / `mm` 可以在宿主机上用 `cargo test` 运行

#![no_std]

extern crate std;

pub mod mock;
