//! # 晶体结构数据模型
//!
//! 定义统一的晶体结构表示：晶格向量 + 笛卡尔坐标原子列表。
//! 几何派生量（化学式、体积、原子数）在这里计算，
//! 各解析器只负责把引擎输出转换成这个表示。
//!
//! ## 依赖关系
//! - 被 `parsers/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 计算晶格体积（有符号，左手系为负）
    pub fn volume(&self) -> f64 {
        let a = self.matrix[0];
        let b = self.matrix[1];
        let c = self.matrix[2];

        // 行列式计算
        a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
            + a[2] * (b[0] * c[1] - b[1] * c[0])
    }
}

/// 晶胞内的一个原子位点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// 元素符号
    pub species: String,

    /// 笛卡尔坐标 [x, y, z]，单位 Angstrom
    pub position: [f64; 3],
}

impl Site {
    pub fn new(species: impl Into<String>, position: [f64; 3]) -> Self {
        Site {
            species: species.into(),
            position,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// 晶格
    pub lattice: Lattice,

    /// 原子位点列表，保持输出文件中的顺序
    pub sites: Vec<Site>,

    /// 来源文件角色（如 "CONTCAR"、"trajectory"）
    pub source: Option<String>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Structure {
            lattice,
            sites,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 晶胞内原子总数
    pub fn atom_count(&self) -> usize {
        self.sites.len()
    }

    /// 晶胞体积 (Angstrom^3)
    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 计算化学式：元素按字母序，计数 1 不写下标
    pub fn composition(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for site in &self.sites {
            *counts.entry(site.species.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
