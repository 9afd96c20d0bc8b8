//! # 运行记录汇总
//!
//! 按注册表顺序逐项查询解析器的设置与结果能力，把一次计算
//! 汇总成内存里的 `RunRecord`：
//!
//! - 能力返回缺席（`Ok(None)`）时直接跳过，不产生记录
//! - 单项能力失败记入 `failures`，不中断其余标签的提取
//!
//! 记录类型派生 serde，具体落盘格式由下游自行接驳。
//!
//! ## 依赖关系
//! - 依赖 `models`、`parsers`、`registry`
//! - 被 `lib.rs` 重导出

use crate::models::Record;
use crate::parsers::DftParser;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

/// 带标签的已提取记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRecord {
    pub tag: String,
    pub record: Record,
}

/// 单项能力的提取失败，保留标签与原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityFailure {
    pub tag: String,
    pub error: String,
}

/// 一次 DFT 计算的完整提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// 产生输出的程序名，如 "VASP"
    pub code: String,
    pub code_version: Option<String>,
    pub chemical_formula: Option<String>,
    pub settings: Vec<TaggedRecord>,
    pub results: Vec<TaggedRecord>,
    pub failures: Vec<CapabilityFailure>,
}

/// 汇总一个解析器暴露的全部设置与结果
pub fn collect_run(parser: &dyn DftParser) -> RunRecord {
    let mut failures = Vec::new();

    let code_version = match parser.version() {
        Ok(version) => version,
        Err(e) => {
            failures.push(CapabilityFailure {
                tag: "Version".to_string(),
                error: e.to_string(),
            });
            None
        }
    };

    let chemical_formula = match parser.composition() {
        Ok(formula) => formula,
        Err(e) => {
            failures.push(CapabilityFailure {
                tag: "Composition".to_string(),
                error: e.to_string(),
            });
            None
        }
    };

    let settings = collect_records(parser, &parser.settings_registry(), &mut failures);
    let results = collect_records(parser, &parser.results_registry(), &mut failures);

    RunRecord {
        code: parser.name().to_string(),
        code_version,
        chemical_formula,
        settings,
        results,
        failures,
    }
}

fn collect_records(
    parser: &dyn DftParser,
    registry: &Registry,
    failures: &mut Vec<CapabilityFailure>,
) -> Vec<TaggedRecord> {
    let mut records = Vec::new();
    for (tag, capability) in registry.iter() {
        match capability(parser) {
            Ok(Some(record)) => records.push(TaggedRecord {
                tag: tag.to_string(),
                record,
            }),
            Ok(None) => {}
            Err(e) => failures.push(CapabilityFailure {
                tag: tag.to_string(),
                error: e.to_string(),
            }),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractError, Result};
    use crate::models::{Lattice, Site, Structure};
    use crate::parsers::ConvergenceCell;

    /// 固定返回值的解析器：能量可用，压力永远解析失败
    struct Scripted {
        converged: ConvergenceCell,
    }

    impl Scripted {
        fn new() -> Self {
            Scripted {
                converged: ConvergenceCell::new(),
            }
        }
    }

    impl DftParser for Scripted {
        fn name(&self) -> &str {
            "Scripted"
        }

        fn detect_convergence(&self) -> Result<bool> {
            Ok(true)
        }

        fn convergence_cell(&self) -> &ConvergenceCell {
            &self.converged
        }

        fn version(&self) -> Result<Option<String>> {
            Ok(Some("1.2.3".to_string()))
        }

        fn structure(&self) -> Result<Option<Structure>> {
            let lattice = Lattice::from_vectors([
                [4.0, 0.0, 0.0],
                [0.0, 4.0, 0.0],
                [0.0, 0.0, 4.0],
            ]);
            let sites = vec![
                Site::new("Na", [0.0, 0.0, 0.0]),
                Site::new("Cl", [2.0, 2.0, 2.0]),
            ];
            Ok(Some(Structure::new(lattice, sites)))
        }

        fn total_energy(&self) -> Result<Option<Record>> {
            Ok(Some(Record::scalar(-3.5).with_units("eV")))
        }

        fn pressure(&self) -> Result<Option<Record>> {
            Err(ExtractError::parse_failure("run.log", "garbled pressure line"))
        }
    }

    #[test]
    fn test_collect_identity_and_formula() {
        let record = collect_run(&Scripted::new());

        assert_eq!(record.code, "Scripted");
        assert_eq!(record.code_version.as_deref(), Some("1.2.3"));
        assert_eq!(record.chemical_formula.as_deref(), Some("ClNa"));
    }

    #[test]
    fn test_absent_capabilities_are_omitted() {
        let record = collect_run(&Scripted::new());

        // 未覆写的设置全部缺席
        assert!(record
            .settings
            .iter()
            .all(|t| t.tag != "XC Functional" && t.tag != "Cutoff Energy"));
        // 缺席不是失败
        assert!(record.failures.iter().all(|f| f.tag != "XC Functional"));
    }

    #[test]
    fn test_failure_is_recorded_without_aborting() {
        let record = collect_run(&Scripted::new());

        let tags: Vec<&str> = record.results.iter().map(|t| t.tag.as_str()).collect();
        assert!(tags.contains(&"Total Energy"));
        assert!(tags.contains(&"Converged"));
        assert!(tags.contains(&"Density"));
        assert!(!tags.contains(&"Pressure"));

        let failure = record
            .failures
            .iter()
            .find(|f| f.tag == "Pressure")
            .unwrap();
        assert!(failure.error.contains("garbled pressure line"));
    }

    #[test]
    fn test_registry_order_is_preserved() {
        let record = collect_run(&Scripted::new());

        let tags: Vec<&str> = record.results.iter().map(|t| t.tag.as_str()).collect();
        let converged = tags.iter().position(|t| *t == "Converged").unwrap();
        let energy = tags.iter().position(|t| *t == "Total Energy").unwrap();
        let atoms = tags.iter().position(|t| *t == "Number of atoms").unwrap();
        assert!(converged < energy);
        assert!(energy < atoms);
    }

    #[test]
    fn test_run_record_round_trips_through_json() {
        let record = collect_run(&Scripted::new());

        let text = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
