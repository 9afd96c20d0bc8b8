//! # VASP 输出解析器
//!
//! 从 VASP 计算目录提取设置和结果。角色解析：
//!
//! - `OUTCAR` 必需，文件名以 "outcar" 开头（不分大小写）
//! - `DOSCAR` 可选，文件名等于 "doscar"，提供态密度和带隙
//! - 输出结构优先取非空 `CONTCAR`，退回 `POSCAR`，都可选
//!
//! OUTCAR 采用逐行标记扫描：多数量按 "最后一次出现" 取值（弛豫
//! 计算的末态），体积同时保留首次出现作为初始值。
//!
//! ## 依赖关系
//! - 依赖 `error`、`models`、`resolver`
//! - 被 `parsers/mod.rs` 的引擎识别使用

use crate::error::{ExtractError, Result};
use crate::models::{Lattice, Record, Site, Structure};
use crate::parsers::{presence_of, ConvergenceCell, DftParser};
use crate::resolver::{file_name_matches, file_name_starts_with, FileSet};
use std::fs;
use std::path::{Path, PathBuf};

/// VASP 计算目录解析器
#[derive(Debug)]
pub struct VaspParser {
    outcar: PathBuf,
    doscar: Option<PathBuf>,
    structure_file: Option<(PathBuf, &'static str)>,
    converged: ConvergenceCell,
}

impl VaspParser {
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_fileset(&FileSet::from_directory(dir)?)
    }

    /// 解析文件角色；没有 OUTCAR 时返回 `MissingOutput`
    pub fn from_fileset(files: &FileSet) -> Result<Self> {
        let outcar = files
            .resolve_required("OUTCAR", |p| file_name_starts_with(p, "outcar"))?
            .to_path_buf();

        let doscar = files
            .resolve("DOSCAR", |p| file_name_matches(p, "doscar"))?
            .map(Path::to_path_buf);

        // 非空 CONTCAR 优先，POSCAR 兜底
        let contcar = files.resolve("CONTCAR", |p| file_name_matches(p, "contcar"))?;
        let structure_file = match contcar {
            Some(p) if file_is_non_empty(p) => Some((p.to_path_buf(), "CONTCAR")),
            _ => files
                .resolve("POSCAR", |p| file_name_matches(p, "poscar"))?
                .map(|p| (p.to_path_buf(), "POSCAR")),
        };

        Ok(VaspParser {
            outcar,
            doscar,
            structure_file,
            converged: ConvergenceCell::new(),
        })
    }

    fn outcar_text(&self) -> Result<String> {
        let bytes =
            fs::read(&self.outcar).map_err(|e| ExtractError::file_read(self.outcar.display(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl DftParser for VaspParser {
    fn name(&self) -> &str {
        "VASP"
    }

    /// 弛豫计算看离子步收敛标记，静态计算要求正常结束且电子步收敛
    fn detect_convergence(&self) -> Result<bool> {
        let content = self.outcar_text()?;
        if is_relaxation_run(&content) {
            Ok(content.contains("reached required accuracy"))
        } else {
            let finished =
                content.contains("General timing and accounting informations for this job");
            Ok(finished && content.contains("aborting loop because EDIFF is reached"))
        }
    }

    fn convergence_cell(&self) -> &ConvergenceCell {
        &self.converged
    }

    fn version(&self) -> Result<Option<String>> {
        let content = self.outcar_text()?;
        for line in content.lines() {
            if let Some(token) = line.split_whitespace().find(|w| w.starts_with("vasp.")) {
                let version = token.trim_start_matches("vasp.");
                if !version.is_empty() {
                    return Ok(Some(version.to_string()));
                }
            }
        }
        Ok(None)
    }

    fn structure(&self) -> Result<Option<Structure>> {
        let (path, role) = match &self.structure_file {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let content =
            fs::read_to_string(path).map_err(|e| ExtractError::file_read(path.display(), e))?;
        parse_structure_text(&content, path).map(|s| Some(s.with_source(*role)))
    }

    fn xc_functional(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let code = match tagged_token(&content, "LEXCH") {
            Some(c) => c,
            None => return Ok(None),
        };
        let name = match code {
            "PE" => "PBE",
            "CA" => "LDA",
            "91" => "PW91",
            "RP" => "revPBE",
            "AM" => "AM05",
            "PS" => "PBEsol",
            other => {
                return Err(ExtractError::parse_failure(
                    self.outcar.display(),
                    format!("unknown LEXCH code '{other}'"),
                ))
            }
        };
        Ok(Some(Record::scalar(name)))
    }

    fn is_relaxed(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        Ok(presence_of(Some(is_relaxation_run(&content))))
    }

    fn cutoff_energy(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        Ok(tagged_number(&content, "ENCUT").map(|v| Record::scalar(v).with_units("eV")))
    }

    fn kpoints_per_reciprocal_atom(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let nkpts = tagged_number(&content, "NKPTS");
        let nions = tagged_number(&content, "NIONS");
        match (nkpts, nions) {
            (Some(k), Some(n)) => Ok(Some(Record::scalar((k * n) as i64))),
            _ => Ok(None),
        }
    }

    fn uses_soc(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let flag = tagged_token(&content, "LSORBIT").map(|t| t.starts_with('T'));
        Ok(presence_of(flag))
    }

    fn dft_u(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        match tagged_token(&content, "LDAU") {
            Some(t) if t.starts_with('T') => {}
            _ => return Ok(None),
        }
        let scheme = match tagged_token(&content, "LDAUTYPE") {
            Some("2") => "Dudarev",
            _ => "Liechtenstein",
        };
        Ok(Some(Record::scalar(scheme)))
    }

    fn vdw_settings(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let code = match tagged_token(&content, "IVDW") {
            Some(c) => c,
            None => return Ok(None),
        };
        let method = match code {
            "0" => return Ok(None),
            "1" | "10" => "DFT-D2",
            "11" => "DFT-D3",
            "12" => "DFT-D3 (BJ)",
            "2" | "20" => "TS",
            "21" => "TS-H",
            "202" => "MBD",
            "4" => "dDsC",
            other => {
                return Err(ExtractError::parse_failure(
                    self.outcar.display(),
                    format!("unknown IVDW code '{other}'"),
                ))
            }
        };
        Ok(Some(Record::scalar(method)))
    }

    fn pseudopotentials(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut names: Vec<String> = Vec::new();
        for line in content.lines() {
            // "TITEL  = PAW_PBE Fe 06Sep2000"，OUTCAR 会重复打印，去重保序
            if line.contains("TITEL") {
                if let Some(pos) = line.find('=') {
                    let name = line[pos + 1..].trim().to_string();
                    if !name.is_empty() && !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        if names.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Record::vector(names)))
        }
    }

    fn total_energy(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut energy = None;
        for line in content.lines() {
            // "energy  without entropy=   -39.86  energy(sigma->0) =   -39.85"
            if line.contains("energy  without entropy") {
                if let Some(pos) = line.find("energy(sigma->0)") {
                    if let Some(val) = extract_number_after(&line[pos..], "=") {
                        energy = Some(val);
                    }
                }
            }
        }
        Ok(energy.map(|v| Record::scalar(v).with_units("eV")))
    }

    fn band_gap(&self) -> Result<Option<Record>> {
        let doscar = match &self.doscar {
            Some(p) => p,
            None => return Ok(None),
        };
        let (fermi, rows) = read_doscar(doscar)?;
        match band_gap_from_rows(fermi, &rows) {
            Some(gap) => Ok(Some(Record::scalar(gap).with_units("eV"))),
            None => Err(ExtractError::parse_failure(
                doscar.display(),
                "no occupied states around the Fermi level",
            )),
        }
    }

    fn pressure(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut pressure = None;
        for line in content.lines() {
            // "external pressure =     -0.50 kB  Pullay stress = ..."
            if line.contains("external pressure") {
                if let Some(val) = extract_number_after(line, "=") {
                    pressure = Some(val);
                }
            }
        }
        Ok(pressure.map(|v| Record::scalar(v).with_units("kbar")))
    }

    fn density_of_states(&self) -> Result<Option<Record>> {
        let doscar = match &self.doscar {
            Some(p) => p,
            None => return Ok(None),
        };
        let (_, rows) = read_doscar(doscar)?;
        Ok(Some(
            Record::matrix(rows.iter().map(|&(e, d)| [e, d])).with_units("states/unit cell"),
        ))
    }

    fn forces(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let lines: Vec<&str> = content.lines().collect();
        let start = match lines.iter().rposition(|l| l.contains("TOTAL-FORCE")) {
            Some(i) => i,
            None => return Ok(None),
        };

        let mut rows: Vec<[f64; 3]> = Vec::new();
        for line in lines.iter().skip(start + 1) {
            if line.contains("---") {
                if rows.is_empty() {
                    continue;
                }
                break;
            }
            let cols: Vec<f64> = line
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            if cols.len() < 6 {
                break;
            }
            // 前三列是位置，后三列是力
            rows.push([cols[3], cols[4], cols[5]]);
        }

        if rows.is_empty() {
            return Err(ExtractError::parse_failure(
                self.outcar.display(),
                "TOTAL-FORCE block contains no force rows",
            ));
        }
        Ok(Some(Record::matrix(rows).with_units("eV/Angstrom")))
    }

    fn stresses(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut voigt: Option<Vec<f64>> = None;
        let mut saw_marker = false;
        for line in content.lines() {
            // "in kB   XX YY ZZ XY YZ ZX"
            if line.trim_start().starts_with("in kB") {
                saw_marker = true;
                let vals: Vec<f64> = line
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if vals.len() >= 6 {
                    voigt = Some(vals);
                }
            }
        }

        let v = match voigt {
            Some(v) => v,
            None if saw_marker => {
                return Err(ExtractError::parse_failure(
                    self.outcar.display(),
                    "malformed stress tensor row",
                ))
            }
            None => return Ok(None),
        };
        let matrix = [
            [v[0], v[3], v[5]],
            [v[3], v[1], v[4]],
            [v[5], v[4], v[2]],
        ];
        Ok(Some(Record::matrix(matrix).with_units("kbar")))
    }

    fn total_magnetization(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut magnetization = None;
        for line in content.lines() {
            // "number of electron   48.0000000 magnetization    4.0000000"
            // 非自旋极化计算该行 magnetization 后为空，按缺席处理
            if line.contains("number of electron") && line.contains("magnetization") {
                if let Some(pos) = line.find("magnetization") {
                    if let Some(val) = extract_last_number(&line[pos..]) {
                        magnetization = Some(val);
                    }
                }
            }
        }
        Ok(magnetization.map(|v| Record::scalar(v).with_units("Bohr magnetons")))
    }

    fn initial_volume(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        for line in content.lines() {
            if line.contains("volume of cell") {
                if let Some(val) = extract_last_number(line) {
                    return Ok(Some(Record::scalar(val).with_units("Angstrom^3")));
                }
            }
        }
        Ok(None)
    }

    fn final_volume(&self) -> Result<Option<Record>> {
        let content = self.outcar_text()?;
        let mut volume = None;
        for line in content.lines() {
            if line.contains("volume of cell") {
                if let Some(val) = extract_last_number(line) {
                    volume = Some(val);
                }
            }
        }
        Ok(volume.map(|v| Record::scalar(v).with_units("Angstrom^3")))
    }
}

fn file_is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// NSW > 0 且 IBRION 为 1/2/3 的计算是结构弛豫
fn is_relaxation_run(content: &str) -> bool {
    let nsw = tagged_number(content, "NSW").map(|v| v > 0.0).unwrap_or(false);
    let ibrion = tagged_token(content, "IBRION");
    nsw && matches!(ibrion, Some("1") | Some("2") | Some("3"))
}

/// 在 "TAG = value" 形式的行中取 TAG 后的第一个词
fn tagged_token<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
    for line in content.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        for i in 0..tokens.len() {
            if tokens[i] == tag && tokens.get(i + 1) == Some(&"=") {
                if let Some(value) = tokens.get(i + 2) {
                    return Some(*value);
                }
            }
        }
    }
    None
}

fn tagged_number(content: &str, tag: &str) -> Option<f64> {
    tagged_token(content, tag)?.parse().ok()
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

/// 读取 DOSCAR 的总态密度：返回 (费米能级, [(能量, 态密度)])
///
/// 第 6 行为 "Emax Emin NEDOS Efermi 权重"；自旋极化时数据行有
/// 上下自旋两列，求和得到总态密度。
fn read_doscar(path: &Path) -> Result<(f64, Vec<(f64, f64)>)> {
    let bytes = fs::read(path).map_err(|e| ExtractError::file_read(path.display(), e))?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 7 {
        return Err(ExtractError::parse_failure(path.display(), "file too short"));
    }

    let header: Vec<f64> = lines[5]
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    if header.len() < 4 {
        return Err(ExtractError::parse_failure(
            path.display(),
            "malformed energy grid header",
        ));
    }
    let nedos = header[2] as usize;
    let fermi = header[3];

    // NEDOS 是未经验证的文件声明，不可用作分配尺寸
    let mut rows = Vec::new();
    for line in lines.iter().skip(6).take(nedos) {
        let cols: Vec<f64> = line
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if cols.len() < 3 {
            return Err(ExtractError::parse_failure(
                path.display(),
                format!("malformed DOS row: '{}'", line.trim()),
            ));
        }
        let total = if cols.len() >= 5 {
            cols[1] + cols[2]
        } else {
            cols[1]
        };
        rows.push((cols[0], total));
    }

    if rows.len() < nedos {
        return Err(ExtractError::parse_failure(
            path.display(),
            format!("DOS block truncated: {} of {} rows", rows.len(), nedos),
        ));
    }
    if rows.is_empty() {
        return Err(ExtractError::parse_failure(path.display(), "no DOS rows"));
    }
    Ok((fermi, rows))
}

/// 从态密度定位带边：费米能级处有态密度即金属（带隙为零），
/// 否则向两侧走到第一个占据网格点。低于 1e-3 的拖尾视为未占据。
fn band_gap_from_rows(fermi: f64, rows: &[(f64, f64)]) -> Option<f64> {
    const OCCUPIED: f64 = 1e-3;

    let start = match rows.iter().position(|(e, _)| *e >= fermi) {
        Some(i) => i,
        None => rows.len() - 1,
    };

    if rows[start].1 > OCCUPIED || (start > 0 && rows[start - 1].1 > OCCUPIED) {
        return Some(0.0);
    }

    let vbm = rows[..start]
        .iter()
        .rev()
        .find(|(_, d)| *d > OCCUPIED)
        .map(|(e, _)| *e)?;
    let cbm = rows[start..]
        .iter()
        .find(|(_, d)| *d > OCCUPIED)
        .map(|(e, _)| *e)?;
    Some(cbm - vbm)
}

/// 解析 POSCAR/CONTCAR 文本为笛卡尔坐标结构
///
/// 格式：注释行、缩放因子（负值表示目标体积）、三行晶格向量、
/// 元素行 + 计数行（VASP 5+）、可选 "Selective dynamics"、
/// Direct/Cartesian 标记、原子坐标行。
fn parse_structure_text(content: &str, path: &Path) -> Result<Structure> {
    let fail = |reason: String| ExtractError::parse_failure(path.display(), reason);

    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 8 {
        return Err(fail("file too short".to_string()));
    }

    let raw_scale: f64 = lines[1]
        .trim()
        .parse()
        .map_err(|_| fail(format!("invalid scaling factor '{}'", lines[1].trim())))?;

    let mut matrix = [[0.0; 3]; 3];
    for i in 0..3 {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(fail(format!("invalid lattice vector at line {}", 3 + i)));
        }
        matrix[i] = [parts[0], parts[1], parts[2]];
    }

    // 负缩放因子给出目标体积，换算为线性因子
    let scale = if raw_scale < 0.0 {
        let det = Lattice::from_vectors(matrix).volume().abs();
        if det < 1e-9 {
            return Err(fail("degenerate lattice with volume scaling".to_string()));
        }
        (-raw_scale / det).powf(1.0 / 3.0)
    } else {
        raw_scale
    };
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v *= scale;
        }
    }
    let lattice = Lattice::from_vectors(matrix);

    // VASP 4 格式没有元素符号行，无法确定物种
    let symbol_tokens: Vec<&str> = lines[5].split_whitespace().collect();
    if symbol_tokens.is_empty() {
        return Err(fail("missing element symbol line".to_string()));
    }
    if symbol_tokens[0].parse::<i64>().is_ok() {
        return Err(fail(
            "element symbols missing (VASP 4 format is not supported)".to_string(),
        ));
    }

    let counts: Vec<usize> = lines[6]
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    if counts.len() != symbol_tokens.len() {
        return Err(fail(format!(
            "{} element symbols but {} counts",
            symbol_tokens.len(),
            counts.len()
        )));
    }

    let mut coord_line = 7;
    if lines.len() > coord_line
        && lines[coord_line]
            .trim()
            .to_lowercase()
            .starts_with("selective")
    {
        coord_line += 1;
    }
    if lines.len() <= coord_line {
        return Err(fail("missing coordinate type line".to_string()));
    }

    let coord_type = lines[coord_line].trim().to_lowercase();
    let is_cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');

    let mut sites: Vec<Site> = Vec::new();
    let mut line_idx = coord_line + 1;
    for (symbol, &count) in symbol_tokens.iter().zip(counts.iter()) {
        for _ in 0..count {
            let parts: Vec<f64> = match lines.get(line_idx) {
                Some(l) => l
                    .split_whitespace()
                    .take(3)
                    .filter_map(|s| s.parse().ok())
                    .collect(),
                None => Vec::new(),
            };
            if parts.len() < 3 {
                return Err(fail(format!(
                    "expected {} coordinate rows, file ends at row {}",
                    counts.iter().sum::<usize>(),
                    sites.len()
                )));
            }

            let position = if is_cartesian {
                // 笛卡尔坐标同样乘缩放因子
                [parts[0] * scale, parts[1] * scale, parts[2] * scale]
            } else {
                frac_to_cart([parts[0], parts[1], parts[2]], &lattice)
            };
            sites.push(Site::new(*symbol, position));
            line_idx += 1;
        }
    }

    Ok(Structure::new(lattice, sites))
}

/// 分数坐标转笛卡尔坐标
fn frac_to_cart(frac: [f64; 3], lattice: &Lattice) -> [f64; 3] {
    let m = lattice.matrix;
    [
        frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
        frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
        frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
    ]
}
