//! # 统一错误处理模块
//!
//! 定义 dftout 的所有错误类型，使用 `thiserror` 派生。
//!
//! 错误分类遵循提取契约：构造期错误（MissingOutput / Ambiguity）直接
//! 中止解析器实例化；查询期错误（ParseFailure）只影响单个能力，
//! 调用方应跳过该能力并继续。"不适用" 不是错误，能力返回 `Ok(None)`。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// dftout 统一错误类型
#[derive(Error, Debug)]
pub enum ExtractError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 文件角色解析错误（构造期，致命）
    // ─────────────────────────────────────────────────────────────
    #[error("No file matching required role '{role}' among {candidates} candidate file(s)")]
    MissingOutput { role: String, candidates: usize },

    #[error("Role '{role}' matched more than one file:\n{}", paths.join("\n"))]
    Ambiguity { role: String, paths: Vec<String> },

    // ─────────────────────────────────────────────────────────────
    // 解析错误（查询期，仅影响单个能力）
    // ─────────────────────────────────────────────────────────────
    #[error("Unparsable content in {path}\nReason: {reason}")]
    ParseFailure { path: String, reason: String },
}

impl ExtractError {
    /// 从路径和原因构造 ParseFailure
    pub fn parse_failure(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        ExtractError::ParseFailure {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// 从路径和 io::Error 构造 FileReadError
    pub fn file_read(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        ExtractError::FileReadError {
            path: path.to_string(),
            source,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, ExtractError>;
