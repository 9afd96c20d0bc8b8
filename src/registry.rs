//! # 能力注册表模块
//!
//! 标签到提取能力的有序映射。标签字符串是对外命名契约，
//! 能力是普通函数指针，调用时才访问解析器。
//!
//! 注册语义：同名标签原位替换（保持首次注册的位置），新标签追加到
//! 末尾。因此引擎扩展后的注册表必然是基础注册表的超集，迭代顺序
//! 稳定且可复现。
//!
//! ## 依赖关系
//! - 依赖 `error`、`models::record`、`parsers`
//! - 被 `parsers/` 和 `collect.rs` 使用

use crate::error::Result;
use crate::models::Record;
use crate::parsers::DftParser;

/// 一个提取能力：从解析器读取一条记录，`Ok(None)` 表示不适用
pub type CapabilityFn = fn(&dyn DftParser) -> Result<Option<Record>>;

/// 标签到能力的有序映射
#[derive(Default, Clone)]
pub struct Registry {
    entries: Vec<(&'static str, CapabilityFn)>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            entries: Vec::new(),
        }
    }

    /// 注册能力：已存在的标签原位替换，新标签追加到末尾
    pub fn register(&mut self, tag: &'static str, capability: CapabilityFn) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = capability;
        } else {
            self.entries.push((tag, capability));
        }
    }

    pub fn get(&self, tag: &str) -> Option<CapabilityFn> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, f)| *f)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.iter().any(|(t, _)| *t == tag)
    }

    /// 按注册顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, CapabilityFn)> + '_ {
        self.entries.iter().map(|&(tag, f)| (tag, f))
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(tag, _)| *tag).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 所有引擎共享的设置标签表
pub fn base_settings() -> Registry {
    let mut r = Registry::new();
    r.register("XC Functional", |p| p.xc_functional());
    r.register("Relaxed", |p| p.is_relaxed());
    r.register("Cutoff Energy", |p| p.cutoff_energy());
    r.register("k-Points per Reciprocal Atom", |p| {
        p.kpoints_per_reciprocal_atom()
    });
    r.register("Spin-Orbit Coupling", |p| p.uses_soc());
    r.register("DFT+U", |p| p.dft_u());
    r.register("vdW Interactions", |p| p.vdw_settings());
    r.register("Pseudopotentials", |p| p.pseudopotentials());
    r
}

/// 所有引擎共享的结果标签表
pub fn base_results() -> Registry {
    let mut r = Registry::new();
    r.register("Converged", |p| {
        p.is_converged().map(|b| Some(Record::scalar(b)))
    });
    r.register("Total Energy", |p| p.total_energy());
    r.register("Band Gap Energy", |p| p.band_gap());
    r.register("Pressure", |p| p.pressure());
    r.register("Density of States", |p| p.density_of_states());
    r.register("Positions", |p| p.positions());
    r.register("Forces", |p| p.forces());
    r.register("Density", |p| p.density());
    r.register("Total magnetization", |p| p.total_magnetization());
    r.register("Stresses", |p| p.stresses());
    r.register("Number of atoms", |p| p.atom_count());
    r.register("Initial volume", |p| p.initial_volume());
    r.register("Final volume", |p| p.final_volume());
    r
}
