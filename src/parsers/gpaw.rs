//! # GPAW 输出解析器
//!
//! 从 GPAW 计算目录提取设置和结果。角色解析：
//!
//! - 文本日志必需：扩展名不是 `.traj` 且内容含 "gpaw"（不分大小写）
//! - 轨迹可选：扩展名 `.traj` 且具备 ULM 魔数
//!
//! 结构优先取轨迹末镜像，没有轨迹时退回日志的 Positions /
//! Unit cell 块。日志未打印的设置落到声明的默认值（LDA、fd 模式、
//! 0.2 Angstrom 网格、340 eV 平面波截断）。
//!
//! ## 依赖关系
//! - 依赖 `error`、`models`、`registry`、`resolver`、`parsers/ulm`
//! - 被 `parsers/mod.rs` 的引擎识别使用

use crate::error::{ExtractError, Result};
use crate::models::{Lattice, Record, Site, Structure};
use crate::parsers::ulm::{is_ulm_file, read_trajectory, TrajectoryImage};
use crate::parsers::{presence_of, ConvergenceCell, DftParser};
use crate::registry::{self, Registry};
use crate::resolver::{content_contains, file_extension_is, FileSet};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 日志未声明时的交换关联泛函
const DEFAULT_XC: &str = "LDA";
/// 默认计算模式
const DEFAULT_MODE: &str = "fd";
/// fd 模式的默认网格间距 (Angstrom)
const DEFAULT_GRID_SPACING: f64 = 0.2;
/// pw 模式的默认平面波截断 (eV)
const DEFAULT_PW_CUTOFF: f64 = 340.0;

/// GPAW 计算目录解析器
#[derive(Debug)]
pub struct GpawParser {
    log: PathBuf,
    trajectory: Option<PathBuf>,
    converged: ConvergenceCell,
}

impl GpawParser {
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_fileset(&FileSet::from_directory(dir)?)
    }

    /// 解析文件角色；没有 GPAW 日志时返回 `MissingOutput`
    pub fn from_fileset(files: &FileSet) -> Result<Self> {
        let log = files
            .resolve_required("GPAW log", |p| {
                !file_extension_is(p, "traj") && content_contains(p, "gpaw")
            })?
            .to_path_buf();

        let trajectory = files
            .resolve("trajectory", |p| {
                file_extension_is(p, "traj") && is_ulm_file(p)
            })?
            .map(Path::to_path_buf);

        Ok(GpawParser {
            log,
            trajectory,
            converged: ConvergenceCell::new(),
        })
    }

    fn log_text(&self) -> Result<String> {
        let bytes =
            fs::read(&self.log).map_err(|e| ExtractError::file_read(self.log.display(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn images(&self) -> Result<Vec<TrajectoryImage>> {
        match &self.trajectory {
            Some(path) => read_trajectory(path),
            None => Ok(Vec::new()),
        }
    }
}

impl DftParser for GpawParser {
    fn name(&self) -> &str {
        "GPAW"
    }

    fn detect_convergence(&self) -> Result<bool> {
        let content = self.log_text()?;
        Ok(content.contains("Converged after"))
    }

    fn convergence_cell(&self) -> &ConvergenceCell {
        &self.converged
    }

    /// 版本号在 ASCII 字符画标志的第四行末尾
    fn version(&self) -> Result<Option<String>> {
        let content = self.log_text()?;
        for line in content.lines() {
            if line.contains("|_____|") {
                if let Some(token) = line.split_whitespace().last() {
                    if !token.contains('|') {
                        return Ok(Some(token.to_string()));
                    }
                }
            }
        }
        Ok(None)
    }

    fn structure(&self) -> Result<Option<Structure>> {
        let images = self.images()?;
        if let Some(image) = images.last() {
            return Ok(Some(image_structure(image).with_source("trajectory")));
        }
        let content = self.log_text()?;
        log_structure(&content, &self.log)
    }

    fn xc_functional(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let params = input_parameters(&content);
        let xc = setting_or_default(&params, "xc", DEFAULT_XC);
        Ok(Some(Record::scalar(strip_quotes(xc))))
    }

    /// 轨迹多于一个镜像即弛豫计算；没有轨迹时无法判断，按缺席处理
    fn is_relaxed(&self) -> Result<Option<Record>> {
        let images = self.images()?;
        Ok(presence_of(Some(images.len() > 1)))
    }

    fn cutoff_energy(&self) -> Result<Option<Record>> {
        use regex::Regex;

        let content = self.log_text()?;
        let params = input_parameters(&content);
        if mode_name(&params) != "pw" {
            return Ok(None);
        }

        let ecut = params.get("mode").and_then(|raw| {
            let ecut_re = Regex::new(r"ecut:\s*([0-9eE+\-.]+)").unwrap();
            ecut_re
                .captures(raw)
                .and_then(|c| c[1].parse::<f64>().ok())
        });
        Ok(Some(
            Record::scalar(ecut.unwrap_or(DEFAULT_PW_CUTOFF)).with_units("eV"),
        ))
    }

    fn grid_spacing(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let params = input_parameters(&content);
        if mode_name(&params) != "fd" {
            return Ok(None);
        }
        let h = params.get("h").and_then(|v| v.trim().parse::<f64>().ok());
        Ok(Some(
            Record::scalar(h.unwrap_or(DEFAULT_GRID_SPACING)).with_units("Angstrom"),
        ))
    }

    fn calculation_mode(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let params = input_parameters(&content);
        Ok(Some(Record::scalar(mode_name(&params))))
    }

    fn total_energy(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let mut energy = None;
        for line in content.lines() {
            // 每个 SCF 循环打印一次，保留最后一次
            if line.contains("Extrapolated:") {
                if let Some(val) = extract_number_after(line, "Extrapolated:") {
                    energy = Some(val);
                }
            }
        }
        Ok(energy.map(|v| Record::scalar(v).with_units("eV")))
    }

    fn forces(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let lines: Vec<&str> = content.lines().collect();
        let start = match lines.iter().rposition(|l| l.contains("Forces in eV/Ang")) {
            Some(i) => i,
            None => return Ok(None),
        };

        let mut rows: Vec<[f64; 3]> = Vec::new();
        for line in lines.iter().skip(start + 1) {
            // "  0 O    0.00000    0.00000   -0.61123"
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 5 || tokens[0].parse::<usize>().is_err() {
                break;
            }
            let fx = tokens[2].parse::<f64>();
            let fy = tokens[3].parse::<f64>();
            let fz = tokens[4].parse::<f64>();
            match (fx, fy, fz) {
                (Ok(x), Ok(y), Ok(z)) => rows.push([x, y, z]),
                _ => break,
            }
        }

        if rows.is_empty() {
            return Err(ExtractError::parse_failure(
                self.log.display(),
                "force block contains no rows",
            ));
        }
        Ok(Some(Record::matrix(rows).with_units("eV/Angstrom")))
    }

    fn total_magnetization(&self) -> Result<Option<Record>> {
        let content = self.log_text()?;
        let mut magnetization = None;
        for line in content.lines() {
            if line.contains("Total magnetic moment") {
                // 新版日志打印三分量元组，取 z 分量
                let cleaned: String = line
                    .chars()
                    .map(|c| if c == '(' || c == ')' || c == ',' { ' ' } else { c })
                    .collect();
                if let Some(val) = extract_last_number(&cleaned) {
                    magnetization = Some(val);
                }
            }
        }
        Ok(magnetization.map(|v| Record::scalar(v).with_units("Bohr magnetons")))
    }

    fn initial_volume(&self) -> Result<Option<Record>> {
        let images = self.images()?;
        if let Some(image) = images.first() {
            return Ok(Some(volume_record(&image.cell)));
        }
        // 无轨迹时初末体积都取日志晶胞
        let content = self.log_text()?;
        Ok(log_cell(&content, &self.log)?.map(|c| volume_record(&c)))
    }

    fn final_volume(&self) -> Result<Option<Record>> {
        let images = self.images()?;
        if let Some(image) = images.last() {
            return Ok(Some(volume_record(&image.cell)));
        }
        let content = self.log_text()?;
        Ok(log_cell(&content, &self.log)?.map(|c| volume_record(&c)))
    }

    fn settings_registry(&self) -> Registry {
        let mut registry = registry::base_settings();
        registry.register("Grid Spacing", |p| p.grid_spacing());
        registry.register("Mode", |p| p.calculation_mode());
        registry
    }
}

fn volume_record(cell: &[[f64; 3]; 3]) -> Record {
    Record::scalar(Lattice::from_vectors(*cell).volume().abs()).with_units("Angstrom^3")
}

fn image_structure(image: &TrajectoryImage) -> Structure {
    let sites = image
        .symbols
        .iter()
        .zip(image.positions.iter())
        .map(|(symbol, &position)| Site::new(symbol.clone(), position))
        .collect();
    Structure::new(Lattice::from_vectors(image.cell), sites)
}

/// 解析 "Input parameters:" 块为键值表
///
/// 键行缩进两格，更深缩进的行是前一个值的续行。空行结束整个块。
fn input_parameters(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut lines = content.lines();

    for line in lines.by_ref() {
        if line.trim_start().starts_with("Input parameters:") {
            break;
        }
    }

    let mut current_key: Option<String> = None;
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let indent = line.len() - line.trim_start().len();
        if indent == 0 {
            break;
        }

        let trimmed = line.trim();
        if indent == 2 {
            if let Some((key, value)) = trimmed.split_once(':') {
                let key = key.trim().to_string();
                params.insert(key.clone(), value.trim().to_string());
                current_key = Some(key);
            }
        } else if let Some(key) = &current_key {
            if let Some(value) = params.get_mut(key) {
                value.push(' ');
                value.push_str(trimmed);
            }
        }
    }
    params
}

/// 显式设定优先，其次落到声明的默认值
fn setting_or_default<'a>(
    params: &'a HashMap<String, String>,
    key: &str,
    default: &'a str,
) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or(default)
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '\'' || c == '"')
}

/// 计算模式名：字典形式（如 "{ecut: 340.0, name: pw}"）取 name 字段
fn mode_name(params: &HashMap<String, String>) -> String {
    use regex::Regex;

    let raw = setting_or_default(params, "mode", DEFAULT_MODE);
    if raw.contains('{') {
        let name_re = Regex::new(r"name:\s*'?([A-Za-z]+)'?").unwrap();
        if let Some(caps) = name_re.captures(raw) {
            return caps[1].to_string();
        }
        return raw.to_string();
    }
    strip_quotes(raw).to_string()
}

/// 从日志的最后一个 Positions / Unit cell 块恢复结构
fn log_structure(content: &str, log: &Path) -> Result<Option<Structure>> {
    let cell = match log_cell(content, log)? {
        Some(c) => c,
        None => return Ok(None),
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = match lines.iter().rposition(|l| l.trim() == "Positions:") {
        Some(i) => i,
        None => return Ok(None),
    };

    let mut sites = Vec::new();
    for line in lines.iter().skip(start + 1) {
        // "   0 O      0.000000    0.000000    0.298154"
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 5 || tokens[0].parse::<usize>().is_err() {
            break;
        }
        let x = tokens[2].parse::<f64>();
        let y = tokens[3].parse::<f64>();
        let z = tokens[4].parse::<f64>();
        match (x, y, z) {
            (Ok(x), Ok(y), Ok(z)) => sites.push(Site::new(tokens[1], [x, y, z])),
            _ => {
                return Err(ExtractError::parse_failure(
                    log.display(),
                    format!("malformed position row: '{}'", line.trim()),
                ))
            }
        }
    }

    if sites.is_empty() {
        return Err(ExtractError::parse_failure(
            log.display(),
            "empty Positions block",
        ));
    }
    Ok(Some(
        Structure::new(Lattice::from_vectors(cell), sites).with_source("log"),
    ))
}

/// 日志最后一个 "Unit cell:" 块的三行轴向量；没有该块返回 `None`，
/// 块存在但轴行残缺按解析失败处理
fn log_cell(content: &str, log: &Path) -> Result<Option<[[f64; 3]; 3]>> {
    let lines: Vec<&str> = content.lines().collect();
    let start = match lines.iter().rposition(|l| l.trim() == "Unit cell:") {
        Some(i) => i,
        None => return Ok(None),
    };

    let mut rows: Vec<[f64; 3]> = Vec::new();
    for line in lines.iter().skip(start + 1).take(8) {
        // "  1. axis:    no     8.000000    0.000000    0.000000    32  0.2500"
        if line.contains("axis:") {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 6 {
                return Err(ExtractError::parse_failure(
                    log.display(),
                    format!("malformed cell axis row: '{}'", line.trim()),
                ));
            }
            let x = tokens[3].parse::<f64>();
            let y = tokens[4].parse::<f64>();
            let z = tokens[5].parse::<f64>();
            match (x, y, z) {
                (Ok(x), Ok(y), Ok(z)) => rows.push([x, y, z]),
                _ => {
                    return Err(ExtractError::parse_failure(
                        log.display(),
                        format!("malformed cell axis row: '{}'", line.trim()),
                    ))
                }
            }
        }
        if rows.len() == 3 {
            return Ok(Some([rows[0], rows[1], rows[2]]));
        }
    }

    Err(ExtractError::parse_failure(
        log.display(),
        "truncated Unit cell block",
    ))
}

/// 从字符串中提取指定标记之后的数字
fn extract_number_after(s: &str, marker: &str) -> Option<f64> {
    let pos = s.find(marker)?;
    let after = &s[pos + marker.len()..];
    after.trim().split_whitespace().next()?.parse().ok()
}

/// 提取字符串中最后一个数字
fn extract_last_number(s: &str) -> Option<f64> {
    s.split_whitespace()
        .filter_map(|w| w.parse::<f64>().ok())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ulm::test_support::{encode_traj, ImageSpec};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) {
        let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(content).unwrap();
    }

    fn static_log(input_parameters: &str) -> String {
        format!(
            "
  ___ ___ ___ _ _ _
 |   |   |_  | | | |
 | | | | | . | | | |
 |__ |  _|___|_____|  19.8.1
 |___|_|

User:   tester@node01
Date:   Mon Jun 24 10:00:00 2019
gpaw:   /usr/lib/python3/site-packages/gpaw

Input parameters:
{input_parameters}

Positions:
   0 O      0.000000    0.000000    0.298154
   1 H      0.000000    0.763239   -0.298154
   2 H      0.000000   -0.763239   -0.298154

Unit cell:
                periodic     x           y           z      points  spacing
  1. axis:    no     8.000000    0.000000    0.000000    32     0.2500
  2. axis:    no     0.000000    8.000000    0.000000    32     0.2500
  3. axis:    no     0.000000    0.000000    8.000000    32     0.2500

Converged after 12 iterations.

Free energy:    -14.222653
Extrapolated:   -14.218401

Forces in eV/Ang:
  0 O    0.00000    0.00000   -0.61123
  1 H    0.00000    0.37462    0.30562
  2 H    0.00000   -0.37462    0.30562

Total magnetic moment: 0.666667
"
        )
    }

    fn fd_log() -> String {
        static_log("  h: 0.18\n  kpts: [4, 4, 4]\n  xc: PBE")
    }

    fn pw_log() -> String {
        static_log("  mode: {ecut: 450.0,\n         name: pw}\n  xc: PBE")
    }

    fn parser_for(dir: &TempDir) -> GpawParser {
        GpawParser::from_directory(dir.path()).unwrap()
    }

    #[test]
    fn test_log_is_required() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "notes.txt", b"nothing relevant");

        let err = GpawParser::from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::MissingOutput { .. }));
    }

    #[test]
    fn test_two_logs_is_ambiguity() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "run1.txt", fd_log().as_bytes());
        write_file(&dir, "run2.txt", fd_log().as_bytes());

        let err = GpawParser::from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Ambiguity { .. }));
    }

    #[test]
    fn test_version_from_banner() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());

        let parser = parser_for(&dir);
        assert_eq!(parser.name(), "GPAW");
        assert_eq!(parser.version().unwrap().unwrap(), "19.8.1");
    }

    #[test]
    fn test_fd_mode_settings() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        let parser = parser_for(&dir);

        assert_eq!(
            parser.xc_functional().unwrap().unwrap().as_text(),
            Some("PBE")
        );
        assert_eq!(
            parser.calculation_mode().unwrap().unwrap().as_text(),
            Some("fd")
        );

        let h = parser.grid_spacing().unwrap().unwrap();
        assert_eq!(h.as_f64(), Some(0.18));
        assert_eq!(h.units.as_deref(), Some("Angstrom"));

        // fd 模式没有平面波截断
        assert!(parser.cutoff_energy().unwrap().is_none());
    }

    #[test]
    fn test_pw_mode_settings() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", pw_log().as_bytes());
        let parser = parser_for(&dir);

        assert_eq!(
            parser.calculation_mode().unwrap().unwrap().as_text(),
            Some("pw")
        );

        let cutoff = parser.cutoff_energy().unwrap().unwrap();
        assert_eq!(cutoff.as_f64(), Some(450.0));
        assert_eq!(cutoff.units.as_deref(), Some("eV"));

        assert!(parser.grid_spacing().unwrap().is_none());
    }

    #[test]
    fn test_declared_defaults_when_log_is_silent() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", static_log("  kpts: [2, 2, 2]").as_bytes());
        let parser = parser_for(&dir);

        assert_eq!(
            parser.xc_functional().unwrap().unwrap().as_text(),
            Some("LDA")
        );
        assert_eq!(
            parser.calculation_mode().unwrap().unwrap().as_text(),
            Some("fd")
        );
        assert_eq!(
            parser.grid_spacing().unwrap().unwrap().as_f64(),
            Some(0.2)
        );
    }

    #[test]
    fn test_results_from_log() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        let parser = parser_for(&dir);

        let energy = parser.total_energy().unwrap().unwrap();
        assert!((energy.as_f64().unwrap() - (-14.218401)).abs() < 1e-9);
        assert_eq!(energy.units.as_deref(), Some("eV"));

        let forces = parser.forces().unwrap().unwrap();
        let rows = forces.matrix_as_f64().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![0.0, 0.0, -0.61123]);
        assert_eq!(forces.units.as_deref(), Some("eV/Angstrom"));

        let moment = parser.total_magnetization().unwrap().unwrap();
        assert!((moment.as_f64().unwrap() - 0.666667).abs() < 1e-9);
        assert_eq!(moment.units.as_deref(), Some("Bohr magnetons"));

        assert!(parser.is_converged().unwrap());
    }

    #[test]
    fn test_unconverged_log() {
        let dir = TempDir::new().unwrap();
        let log = fd_log().replace("Converged after 12 iterations.", "");
        write_file(&dir, "relax.txt", log.as_bytes());

        assert!(!parser_for(&dir).is_converged().unwrap());
    }

    #[test]
    fn test_last_scf_cycle_wins() {
        let dir = TempDir::new().unwrap();
        let log = format!("{}\nExtrapolated:   -14.500000\n", fd_log());
        write_file(&dir, "relax.txt", log.as_bytes());

        let energy = parser_for(&dir).total_energy().unwrap().unwrap();
        assert!((energy.as_f64().unwrap() - (-14.5)).abs() < 1e-9);
    }

    #[test]
    fn test_structure_from_log_when_no_trajectory() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        let parser = parser_for(&dir);

        let structure = parser.structure().unwrap().unwrap();
        assert_eq!(structure.source.as_deref(), Some("log"));
        assert_eq!(structure.composition(), "H2O");
        assert_eq!(structure.sites[0].position, [0.0, 0.0, 0.298154]);
        assert!((structure.volume() - 512.0).abs() < 1e-9);

        // 日志晶胞同时充当初末体积
        assert_eq!(
            parser.initial_volume().unwrap().unwrap().as_f64(),
            Some(512.0)
        );
        assert_eq!(
            parser.final_volume().unwrap().unwrap().as_f64(),
            Some(512.0)
        );

        // 没有轨迹无法判断是否弛豫
        assert!(parser.is_relaxed().unwrap().is_none());
    }

    fn two_image_traj() -> Vec<u8> {
        encode_traj(&[
            ImageSpec {
                numbers: Some(vec![8, 1, 1]),
                positions: vec![
                    [0.0, 0.0, 0.3],
                    [0.0, 0.76, -0.3],
                    [0.0, -0.76, -0.3],
                ],
                cell: Some([[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]),
            },
            ImageSpec {
                numbers: None,
                positions: vec![
                    [0.0, 0.0, 0.29],
                    [0.0, 0.77, -0.29],
                    [0.0, -0.77, -0.29],
                ],
                cell: Some([[11.0, 0.0, 0.0], [0.0, 11.0, 0.0], [0.0, 0.0, 11.0]]),
            },
        ])
    }

    #[test]
    fn test_malformed_cell_axis_is_parse_failure() {
        let dir = TempDir::new().unwrap();
        let broken = fd_log().replace(
            "  2. axis:    no     0.000000    8.000000    0.000000    32     0.2500",
            "  2. axis:    no     0.000000    8.0x0000    0.000000    32     0.2500",
        );
        write_file(&dir, "broken.txt", broken.as_bytes());
        let parser = parser_for(&dir);

        assert!(matches!(
            parser.structure(),
            Err(ExtractError::ParseFailure { .. })
        ));
        assert!(matches!(
            parser.final_volume(),
            Err(ExtractError::ParseFailure { .. })
        ));
    }

    #[test]
    fn test_trajectory_preferred_over_log() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        write_file(&dir, "relax.traj", &two_image_traj());
        let parser = parser_for(&dir);

        let structure = parser.structure().unwrap().unwrap();
        assert_eq!(structure.source.as_deref(), Some("trajectory"));
        assert_eq!(structure.composition(), "H2O");
        assert_eq!(structure.sites[1].position, [0.0, 0.77, -0.29]);

        // 结构来自轨迹，版本号仍从文本日志读取
        assert_eq!(parser.version().unwrap().as_deref(), Some("19.8.1"));

        // 初始体积取首镜像，最终体积取末镜像
        assert_eq!(
            parser.initial_volume().unwrap().unwrap().as_f64(),
            Some(1000.0)
        );
        assert_eq!(
            parser.final_volume().unwrap().unwrap().as_f64(),
            Some(1331.0)
        );

        assert!(parser.is_relaxed().unwrap().unwrap().is_presence());
    }

    #[test]
    fn test_single_image_trajectory_is_not_relaxed() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "static.txt", fd_log().as_bytes());
        write_file(
            &dir,
            "static.traj",
            &encode_traj(&[ImageSpec {
                numbers: Some(vec![8, 1, 1]),
                positions: vec![
                    [0.0, 0.0, 0.3],
                    [0.0, 0.76, -0.3],
                    [0.0, -0.76, -0.3],
                ],
                cell: Some([[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]),
            }]),
        );

        assert!(parser_for(&dir).is_relaxed().unwrap().is_none());
    }

    #[test]
    fn test_text_traj_is_not_a_trajectory() {
        // 扩展名是 .traj 但没有 ULM 魔数的文件不算轨迹角色
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        write_file(&dir, "broken.traj", b"plain text, not a ULM container");
        let parser = parser_for(&dir);

        let structure = parser.structure().unwrap().unwrap();
        assert_eq!(structure.source.as_deref(), Some("log"));
    }

    #[test]
    fn test_extended_registry_is_superset() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "relax.txt", fd_log().as_bytes());
        let parser = parser_for(&dir);

        let settings = parser.settings_registry();
        for tag in registry::base_settings().tags() {
            assert!(settings.contains(tag), "missing base tag: {tag}");
        }
        assert!(settings.contains("Grid Spacing"));
        assert!(settings.contains("Mode"));
    }
}
