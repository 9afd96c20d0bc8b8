//! # 解析器模块
//!
//! 定义所有 DFT 引擎解析器共享的能力契约 `DftParser`，以及从文件
//! 快照识别引擎的入口 `identify`。
//!
//! 契约要点：
//! - 每个能力按查询执行，返回 `Result<Option<Record>>`；
//!   `Ok(None)` 表示 "该引擎不提供此信息"，不是错误
//! - 内容损坏才返回 `ParseFailure`，且只影响当前能力
//! - 结构派生能力（化学式、密度、原子数、坐标）只在契约层实现一次，
//!   引擎只需提供 `structure()`
//! - 收敛标志经 `ConvergenceCell` 按实例缓存，检测失败不写入缓存
//!
//! ## 依赖关系
//! - 依赖 `error`、`models`、`registry`、`resolver`
//! - 被 `collect.rs` 使用
//! - 子模块: gpaw, ulm, vasp

pub mod gpaw;
pub mod ulm;
pub mod vasp;

use crate::error::{ExtractError, Result};
use crate::models::elements::atomic_mass;
use crate::models::{Record, Structure};
use crate::registry::{self, Registry};
use crate::resolver::FileSet;
use std::cell::OnceCell;
use std::path::Path;

use gpaw::GpawParser;
use vasp::VaspParser;

/// amu/Angstrom^3 到 g/cm^3 的换算因子
const AMU_PER_A3_TO_G_CM3: f64 = 1.660539040;

/// 按实例缓存的收敛标志
///
/// 状态机只有两态：未知、已计算。首次成功检测后写入，之后不再
/// 失效；检测失败保持未知并向调用方传播错误。单线程使用，
/// `OnceCell` 不是 `Sync`。
#[derive(Debug, Default)]
pub struct ConvergenceCell {
    state: OnceCell<bool>,
}

impl ConvergenceCell {
    pub fn new() -> Self {
        ConvergenceCell {
            state: OnceCell::new(),
        }
    }

    /// 当前缓存值，未知时返回 `None`
    pub fn get(&self) -> Option<bool> {
        self.state.get().copied()
    }

    /// 返回缓存值，未知时先执行检测并缓存
    pub fn get_or_detect<F>(&self, detect: F) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        if let Some(value) = self.state.get() {
            return Ok(*value);
        }
        let value = detect()?;
        Ok(*self.state.get_or_init(|| value))
    }
}

/// 布尔型设置的统一编码：`Some(true)` 编码为无内容的 "存在" 标记，
/// `Some(false)` 和 `None` 一律编码为缺席
pub fn presence_of(flag: Option<bool>) -> Option<Record> {
    match flag {
        Some(true) => Some(Record::presence()),
        _ => None,
    }
}

/// DFT 引擎解析器的能力契约
///
/// 除三个必需方法外，每个能力都有默认实现。不覆盖即 "安静缺席"：
/// 调用方无法区分 "引擎不支持" 和 "这次计算没有该数据"，二者都
/// 编码为 `Ok(None)`。
pub trait DftParser {
    /// 引擎标识（如 `"VASP"`）
    fn name(&self) -> &str;

    /// 底层收敛检测，不做缓存
    fn detect_convergence(&self) -> Result<bool>;

    /// 本实例的收敛缓存单元
    fn convergence_cell(&self) -> &ConvergenceCell;

    /// 引擎版本号
    fn version(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// 输出结构（弛豫计算取末态）
    fn structure(&self) -> Result<Option<Structure>> {
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────
    // 结构派生能力（共享实现，引擎不覆盖）
    // ─────────────────────────────────────────────────────────────

    /// 收敛标志，经 `ConvergenceCell` 按实例缓存
    fn is_converged(&self) -> Result<bool> {
        self.convergence_cell()
            .get_or_detect(|| self.detect_convergence())
    }

    /// 化学式，元素按字母序
    fn composition(&self) -> Result<Option<String>> {
        Ok(self.structure()?.map(|s| s.composition()))
    }

    /// 质量密度 (g/(cm^3))
    fn density(&self) -> Result<Option<Record>> {
        let structure = match self.structure()? {
            Some(s) => s,
            None => return Ok(None),
        };
        let origin = structure
            .source
            .clone()
            .unwrap_or_else(|| self.name().to_string());

        let mut mass_amu = 0.0;
        for site in &structure.sites {
            match atomic_mass(&site.species) {
                Some(m) => mass_amu += m,
                None => {
                    return Err(ExtractError::parse_failure(
                        origin,
                        format!("unknown element symbol '{}'", site.species),
                    ))
                }
            }
        }

        let volume = structure.volume();
        if volume < 1e-9 {
            return Err(ExtractError::parse_failure(
                origin,
                "degenerate cell with zero volume",
            ));
        }

        Ok(Some(
            Record::scalar(mass_amu / volume * AMU_PER_A3_TO_G_CM3).with_units("g/(cm^3)"),
        ))
    }

    /// 晶胞内原子数
    fn atom_count(&self) -> Result<Option<Record>> {
        Ok(self
            .structure()?
            .map(|s| Record::scalar(s.atom_count()).with_units("/unit cell")))
    }

    /// 原子笛卡尔坐标矩阵 (N x 3)
    fn positions(&self) -> Result<Option<Record>> {
        Ok(self
            .structure()?
            .map(|s| Record::matrix(s.sites.iter().map(|site| site.position))))
    }

    // ─────────────────────────────────────────────────────────────
    // 设置能力（默认缺席）
    // ─────────────────────────────────────────────────────────────

    fn xc_functional(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn is_relaxed(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn cutoff_energy(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn kpoints_per_reciprocal_atom(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn uses_soc(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn dft_u(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn vdw_settings(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn pseudopotentials(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn grid_spacing(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn calculation_mode(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────
    // 结果能力（默认缺席）
    // ─────────────────────────────────────────────────────────────

    fn total_energy(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn band_gap(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn pressure(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn density_of_states(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn forces(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn stresses(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn total_magnetization(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn initial_volume(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    fn final_volume(&self) -> Result<Option<Record>> {
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────
    // 注册表
    // ─────────────────────────────────────────────────────────────

    /// 设置标签表，引擎可扩展
    fn settings_registry(&self) -> Registry {
        registry::base_settings()
    }

    /// 结果标签表，引擎可扩展
    fn results_registry(&self) -> Registry {
        registry::base_results()
    }
}

/// 依次尝试各引擎，返回第一个声明接受该文件快照的解析器
///
/// `MissingOutput` 表示 "不是这个引擎的输出"，继续尝试下一个；
/// `Ambiguity` 等其他错误立即传播，绝不靠换引擎掩盖。
pub fn identify(files: &FileSet) -> Result<Box<dyn DftParser>> {
    match VaspParser::from_fileset(files) {
        Ok(parser) => return Ok(Box::new(parser)),
        Err(ExtractError::MissingOutput { .. }) => {}
        Err(e) => return Err(e),
    }

    match GpawParser::from_fileset(files) {
        Ok(parser) => return Ok(Box::new(parser)),
        Err(ExtractError::MissingOutput { .. }) => {}
        Err(e) => return Err(e),
    }

    Err(ExtractError::MissingOutput {
        role: "recognized DFT output".to_string(),
        candidates: files.len(),
    })
}

/// 扫描目录顶层文件后识别引擎
pub fn identify_directory(dir: impl AsRef<Path>) -> Result<Box<dyn DftParser>> {
    let files = FileSet::from_directory(dir)?;
    identify(&files)
}
