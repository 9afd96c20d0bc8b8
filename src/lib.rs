//! # Dftout - DFT 计算输出提取库
//!
//! 从 VASP / GPAW 计算目录提取设置与结果，汇总成带标签、带单位
//! 的运行记录。解析器只暴露能力接口：支持的字段给出 `Record`，
//! 引擎不产出的字段安静地返回 `None`，本应可读却损坏的内容才算
//! 错误。
//!
//! ```no_run
//! use dftout::{collect_run, identify_directory};
//!
//! # fn main() -> dftout::Result<()> {
//! let parser = identify_directory("runs/relax-Fe2O3")?;
//! let record = collect_run(parser.as_ref());
//! println!("{}: {:?}", record.code, record.chemical_formula);
//! # Ok(())
//! # }
//! ```
//!
//! ## 依赖关系
//! ```text
//! lib.rs
//!   ├── collect.rs    (运行记录汇总)
//!   ├── registry.rs   (标签到能力的有序注册表)
//!   ├── parsers/      (解析器协定与引擎: VASP, GPAW, ULM 轨迹)
//!   ├── resolver.rs   (文件角色解析)
//!   ├── models/       (记录 / 结构 / 元素数据模型)
//!   └── error.rs      (错误处理)
//! ```

pub mod collect;
pub mod error;
pub mod models;
pub mod parsers;
pub mod registry;
pub mod resolver;

pub use collect::{collect_run, CapabilityFailure, RunRecord, TaggedRecord};
pub use error::{ExtractError, Result};
pub use models::{Lattice, Record, RecordValue, ScalarValue, Site, Structure};
pub use parsers::gpaw::GpawParser;
pub use parsers::vasp::VaspParser;
pub use parsers::{identify, identify_directory, presence_of, ConvergenceCell, DftParser};
pub use registry::{base_results, base_settings, CapabilityFn, Registry};
pub use resolver::FileSet;
