//! # 提取记录数据模型
//!
//! 定义统一的标量/向量/矩阵记录容器，附带可选单位字符串。
//! 单位仅作不透明元数据透传，单位换算由各解析器在编码前完成。
//!
//! 约定："不适用" 在 API 层表达为 `Option<Record>` 的 `None`，
//! 而不是空记录。空向量是有效数据（例如零个磁性位点）。
//! 布尔型设置的 "存在" 标记是值为 `RecordValue::Empty` 的记录。
//!
//! ## 依赖关系
//! - 被 `parsers/` 和 `collect.rs` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 单个标量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// 数值视图：Float 直接返回，Int 提升为 f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<usize> for ScalarValue {
    fn from(v: usize) -> Self {
        ScalarValue::Int(v as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

/// 记录值：零维标量、一维序列或二维序列
///
/// `Empty` 是布尔型设置的无内容 "存在" 标记。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValue {
    Empty,
    Scalar(ScalarValue),
    Vector(Vec<ScalarValue>),
    Matrix(Vec<Vec<ScalarValue>>),
}

/// 一条提取记录：值 + 可选单位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub value: RecordValue,
    /// 单位字符串，不做校验和换算
    pub units: Option<String>,
}

impl Record {
    /// 编码零维标量
    pub fn scalar(value: impl Into<ScalarValue>) -> Self {
        Record {
            value: RecordValue::Scalar(value.into()),
            units: None,
        }
    }

    /// 编码一维序列，保持原顺序
    pub fn vector<V, T>(values: V) -> Self
    where
        V: IntoIterator<Item = T>,
        T: Into<ScalarValue>,
    {
        Record {
            value: RecordValue::Vector(values.into_iter().map(Into::into).collect()),
            units: None,
        }
    }

    /// 编码二维序列，外层为行序、内层为列序
    pub fn matrix<M, R, T>(rows: M) -> Self
    where
        M: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
        T: Into<ScalarValue>,
    {
        Record {
            value: RecordValue::Matrix(
                rows.into_iter()
                    .map(|row| row.into_iter().map(Into::into).collect())
                    .collect(),
            ),
            units: None,
        }
    }

    /// 无内容的 "存在" 标记
    pub fn presence() -> Self {
        Record {
            value: RecordValue::Empty,
            units: None,
        }
    }

    /// 附加单位字符串
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// 是否为 "存在" 标记
    pub fn is_presence(&self) -> bool {
        matches!(self.value, RecordValue::Empty)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            RecordValue::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            RecordValue::Scalar(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            RecordValue::Scalar(v) => v.as_text(),
            _ => None,
        }
    }

    /// 解码一维数值序列
    pub fn vector_as_f64(&self) -> Option<Vec<f64>> {
        match &self.value {
            RecordValue::Vector(values) => values.iter().map(ScalarValue::as_f64).collect(),
            _ => None,
        }
    }

    /// 解码二维数值序列，形状与编码前一致
    pub fn matrix_as_f64(&self) -> Option<Vec<Vec<f64>>> {
        match &self.value {
            RecordValue::Matrix(rows) => rows
                .iter()
                .map(|row| row.iter().map(ScalarValue::as_f64).collect())
                .collect(),
            _ => None,
        }
    }

    /// 解码一维文本序列
    pub fn vector_as_text(&self) -> Option<Vec<&str>> {
        match &self.value {
            RecordValue::Vector(values) => values.iter().map(ScalarValue::as_text).collect(),
            _ => None,
        }
    }
}
