//! # ULM 轨迹读取器
//!
//! ASE 轨迹文件 (.traj) 的只读子集实现。ULM 容器布局：
//!
//! ```text
//! 0   magic "- of Ulm" (8 字节)
//! 8   标签 (16 字节 ASCII，轨迹为 "ASE-Trajectory")
//! 24  版本, 条目数, 指针表偏移 (3 x i64, 小端)
//! ... 条目: i64 长度 + JSON 文本
//! ... 指针表: 条目数 x i64 绝对偏移
//! ```
//!
//! JSON 中的大数组以 `{"__ndarray__": [形状, dtype, 偏移]}` 引用
//! 文件内的原始小端数据块，支持 float64/int64/int32。后续镜像可以
//! 省略未变化的数组（元素编号、晶胞），读取时沿用前一镜像的值。
//!
//! ## 依赖关系
//! - 依赖 `error`、`models::elements`
//! - 被 `parsers/gpaw` 使用

use crate::error::{ExtractError, Result};
use crate::models::elements::symbol_for_number;
use byteorder::{ByteOrder, LittleEndian};
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;

/// ULM 容器魔数
pub const ULM_MAGIC: &[u8] = b"- of Ulm";

const HEADER_LEN: usize = 48;

/// 轨迹中的一个镜像
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryImage {
    /// 元素符号，按位点顺序
    pub symbols: Vec<String>,
    /// 笛卡尔坐标 (Angstrom)
    pub positions: Vec<[f64; 3]>,
    /// 晶格向量矩阵，行向量
    pub cell: [[f64; 3]; 3],
}

/// 文件头 8 字节是否为 ULM 魔数；读取失败按否处理
pub fn is_ulm_file(path: &Path) -> bool {
    let mut head = [0u8; 8];
    match fs::File::open(path).and_then(|mut f| f.read_exact(&mut head)) {
        Ok(()) => head == *ULM_MAGIC,
        Err(_) => false,
    }
}

/// 读取轨迹文件的全部镜像，保持写入顺序
pub fn read_trajectory(path: &Path) -> Result<Vec<TrajectoryImage>> {
    let bytes = fs::read(path).map_err(|e| ExtractError::file_read(path.display(), e))?;

    if bytes.len() < HEADER_LEN || !bytes.starts_with(ULM_MAGIC) {
        return Err(ExtractError::parse_failure(
            path.display(),
            "not a ULM container",
        ));
    }

    let tag = String::from_utf8_lossy(&bytes[8..24]);
    let tag = tag.trim_end_matches(|c| c == ' ' || c == '\0');
    if tag != "ASE-Trajectory" {
        return Err(ExtractError::parse_failure(
            path.display(),
            format!("unexpected ULM tag '{tag}'"),
        ));
    }

    let nitems = read_offset(&bytes, 32, path)?;
    let pointers_offset = read_offset(&bytes, 40, path)?;

    // 指针表必须完整落在文件内，文件头声明的条目数才可信
    let table_end = nitems
        .checked_mul(8)
        .and_then(|len| pointers_offset.checked_add(len));
    if table_end.map_or(true, |end| end > bytes.len()) {
        return Err(ExtractError::parse_failure(
            path.display(),
            "item pointer table extends past end of file",
        ));
    }

    let mut item_offsets = Vec::with_capacity(nitems);
    for i in 0..nitems {
        item_offsets.push(read_offset(&bytes, pointers_offset + 8 * i, path)?);
    }

    let mut images = Vec::new();
    let mut carried_numbers: Option<Vec<i64>> = None;
    let mut carried_positions: Option<Vec<[f64; 3]>> = None;
    let mut carried_cell: Option<[[f64; 3]; 3]> = None;

    for offset in item_offsets {
        let length = read_offset(&bytes, offset, path)?;
        let start = offset + 8;
        let end = start
            .checked_add(length)
            .ok_or_else(|| ExtractError::parse_failure(path.display(), "item length overflow"))?;
        let text = bytes.get(start..end).ok_or_else(|| {
            ExtractError::parse_failure(path.display(), "item extends past end of file")
        })?;

        let item: Value = serde_json::from_slice(text).map_err(|e| {
            ExtractError::parse_failure(path.display(), format!("invalid item JSON: {e}"))
        })?;

        let atoms = match item.get("atoms") {
            Some(v) if v.is_object() => v,
            _ => &item,
        };

        let has_atom_keys = atoms.get("positions").is_some()
            || atoms.get("numbers").is_some()
            || atoms.get("cell").is_some();
        if !has_atom_keys {
            // 元数据条目（版本信息等），不产生镜像
            continue;
        }

        if let Some(v) = atoms.get("numbers") {
            carried_numbers = Some(int_vector(v, &bytes, path)?);
        }
        if let Some(v) = atoms.get("positions") {
            carried_positions = Some(position_rows(v, &bytes, path)?);
        }
        if let Some(v) = atoms.get("cell") {
            carried_cell = Some(cell_matrix(v, &bytes, path)?);
        }

        let numbers = carried_numbers.clone().ok_or_else(|| {
            ExtractError::parse_failure(path.display(), "image missing atomic numbers")
        })?;
        let positions = carried_positions
            .clone()
            .ok_or_else(|| ExtractError::parse_failure(path.display(), "image missing positions"))?;
        let cell = carried_cell
            .ok_or_else(|| ExtractError::parse_failure(path.display(), "image missing cell"))?;

        if numbers.len() != positions.len() {
            return Err(ExtractError::parse_failure(
                path.display(),
                format!(
                    "atom count mismatch: {} numbers vs {} positions",
                    numbers.len(),
                    positions.len()
                ),
            ));
        }

        let mut symbols = Vec::with_capacity(numbers.len());
        for n in &numbers {
            let symbol = u32::try_from(*n)
                .ok()
                .and_then(symbol_for_number)
                .ok_or_else(|| {
                    ExtractError::parse_failure(
                        path.display(),
                        format!("unknown atomic number {n}"),
                    )
                })?;
            symbols.push(symbol.to_string());
        }

        images.push(TrajectoryImage {
            symbols,
            positions,
            cell,
        });
    }

    Ok(images)
}

/// 读取小端 i64 并转为非负偏移量
fn read_offset(bytes: &[u8], offset: usize, path: &Path) -> Result<usize> {
    let end = offset
        .checked_add(8)
        .ok_or_else(|| ExtractError::parse_failure(path.display(), "offset overflow"))?;
    let slice = bytes.get(offset..end).ok_or_else(|| {
        ExtractError::parse_failure(path.display(), "unexpected end of file")
    })?;
    let value = LittleEndian::read_i64(slice);
    usize::try_from(value).map_err(|_| {
        ExtractError::parse_failure(path.display(), format!("negative offset {value}"))
    })
}

/// 解码 ndarray 引用为扁平 f64 序列
fn read_ndarray(spec: &Value, bytes: &[u8], path: &Path) -> Result<Vec<f64>> {
    let bad = || ExtractError::parse_failure(path.display(), "malformed __ndarray__ reference");

    let parts = spec
        .get("__ndarray__")
        .and_then(Value::as_array)
        .ok_or_else(bad)?;
    if parts.len() < 3 {
        return Err(bad());
    }

    let shape: Vec<usize> = parts[0]
        .as_array()
        .ok_or_else(bad)?
        .iter()
        .map(|v| v.as_u64().map(|x| x as usize).ok_or_else(bad))
        .collect::<Result<_>>()?;
    let dtype = parts[1].as_str().ok_or_else(bad)?;
    let offset = parts[2].as_u64().ok_or_else(bad)? as usize;

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(bad)?;

    let item_size = match dtype {
        "float64" | "int64" => 8,
        "int32" => 4,
        other => {
            return Err(ExtractError::parse_failure(
                path.display(),
                format!("unsupported ndarray dtype '{other}'"),
            ))
        }
    };

    let end = count
        .checked_mul(item_size)
        .and_then(|len| offset.checked_add(len))
        .ok_or_else(bad)?;
    let data = bytes.get(offset..end).ok_or_else(|| {
        ExtractError::parse_failure(path.display(), "ndarray data extends past end of file")
    })?;

    let values = match dtype {
        "float64" => data.chunks_exact(8).map(LittleEndian::read_f64).collect(),
        "int64" => data
            .chunks_exact(8)
            .map(|c| LittleEndian::read_i64(c) as f64)
            .collect(),
        _ => data
            .chunks_exact(4)
            .map(|c| LittleEndian::read_i32(c) as f64)
            .collect(),
    };
    Ok(values)
}

/// 收集任意深度嵌套 JSON 数组里的数字
fn flatten_json_numbers(value: &Value, out: &mut Vec<f64>) -> bool {
    match value {
        Value::Array(items) => items.iter().all(|v| flatten_json_numbers(v, out)),
        Value::Number(n) => match n.as_f64() {
            Some(x) => {
                out.push(x);
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// 统一的数组取值：ndarray 引用、`{"array": ...}` 包裹或内联 JSON 列表
fn numeric_values(value: &Value, bytes: &[u8], path: &Path) -> Result<Vec<f64>> {
    if value.get("__ndarray__").is_some() {
        return read_ndarray(value, bytes, path);
    }
    if let Some(inner) = value.get("array") {
        return numeric_values(inner, bytes, path);
    }

    let mut out = Vec::new();
    if flatten_json_numbers(value, &mut out) {
        Ok(out)
    } else {
        Err(ExtractError::parse_failure(
            path.display(),
            "expected numeric array",
        ))
    }
}

fn position_rows(value: &Value, bytes: &[u8], path: &Path) -> Result<Vec<[f64; 3]>> {
    let flat = numeric_values(value, bytes, path)?;
    if flat.len() % 3 != 0 {
        return Err(ExtractError::parse_failure(
            path.display(),
            format!("position array of {} values is not N x 3", flat.len()),
        ));
    }
    Ok(flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn cell_matrix(value: &Value, bytes: &[u8], path: &Path) -> Result<[[f64; 3]; 3]> {
    let flat = numeric_values(value, bytes, path)?;
    if flat.len() != 9 {
        return Err(ExtractError::parse_failure(
            path.display(),
            format!("cell array of {} values is not 3 x 3", flat.len()),
        ));
    }
    Ok([
        [flat[0], flat[1], flat[2]],
        [flat[3], flat[4], flat[5]],
        [flat[6], flat[7], flat[8]],
    ])
}

fn int_vector(value: &Value, bytes: &[u8], path: &Path) -> Result<Vec<i64>> {
    let flat = numeric_values(value, bytes, path)?;
    Ok(flat.iter().map(|x| *x as i64).collect())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ULM_MAGIC;
    use serde_json::json;

    pub(crate) struct ImageSpec {
        pub(crate) numbers: Option<Vec<i64>>,
        pub(crate) positions: Vec<[f64; 3]>,
        pub(crate) cell: Option<[[f64; 3]; 3]>,
    }

    /// 按 ULM 布局编码测试轨迹：positions 走 ndarray 数据块，
    /// numbers 和 cell 走内联 JSON（cell 带 "array" 包裹）
    pub(crate) fn encode_traj(images: &[ImageSpec]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(ULM_MAGIC);

        let mut tag = [b' '; 16];
        tag[..14].copy_from_slice(b"ASE-Trajectory");
        buf.extend_from_slice(&tag);

        buf.extend_from_slice(&1i64.to_le_bytes());
        buf.extend_from_slice(&(images.len() as i64).to_le_bytes());
        let pointers_patch = buf.len();
        buf.extend_from_slice(&0i64.to_le_bytes());

        let mut offsets = Vec::new();
        for spec in images {
            let data_offset = buf.len();
            for row in &spec.positions {
                for v in row {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }

            let mut atoms = serde_json::Map::new();
            atoms.insert(
                "positions".to_string(),
                json!({"__ndarray__": [[spec.positions.len(), 3], "float64", data_offset]}),
            );
            if let Some(numbers) = &spec.numbers {
                atoms.insert("numbers".to_string(), json!(numbers));
            }
            if let Some(cell) = &spec.cell {
                atoms.insert("cell".to_string(), json!({ "array": cell }));
            }

            let text = serde_json::to_vec(&json!({ "atoms": atoms })).unwrap();
            offsets.push(buf.len() as i64);
            buf.extend_from_slice(&(text.len() as i64).to_le_bytes());
            buf.extend_from_slice(&text);
        }

        let pointers_offset = buf.len() as i64;
        for off in &offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }
        buf[pointers_patch..pointers_patch + 8].copy_from_slice(&pointers_offset.to_le_bytes());
        buf
    }
}
