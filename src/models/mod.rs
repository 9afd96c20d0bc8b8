//! # 数据模型模块
//!
//! 定义统一的提取记录、晶体结构和元素数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`registry.rs` 和 `collect.rs` 使用
//! - 子模块: elements, record, structure

pub mod elements;
pub mod record;
pub mod structure;

pub use record::{Record, RecordValue, ScalarValue};
pub use structure::{Lattice, Site, Structure};
