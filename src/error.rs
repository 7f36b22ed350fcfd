//! # 统一错误处理模块
//!
//! 定义 vaspex 的所有错误类型，使用 `thiserror` 派生。
//! 可恢复的"未找到"类错误与致命的解析/越界错误用不同变体区分，
//! 调用方可以直接模式匹配。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// vaspex 统一错误类型
#[derive(Error, Debug)]
pub enum VaspexError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 致命解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 可恢复的查找失败（值不存在，调用方决定默认处理）
    // ─────────────────────────────────────────────────────────────
    #[error("Value not found: {0}")]
    NotFound(String),

    #[error("Tag <{tag}> not found in {path}")]
    TagNotFound { tag: String, path: String },

    #[error("Velocities not found. Is this file from a MD run?")]
    NotDynamicsRun,

    // ─────────────────────────────────────────────────────────────
    // 违反不变量（静默忽略会污染后续数值分析）
    // ─────────────────────────────────────────────────────────────
    #[error("Step index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("Data line matched before any step marker was seen: {line}")]
    MissingStepContext { line: String },

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl VaspexError {
    /// 是否为可恢复的"值不存在"类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VaspexError::NotFound(_)
                | VaspexError::TagNotFound { .. }
                | VaspexError::NotDynamicsRun
        )
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, VaspexError>;
