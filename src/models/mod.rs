//! # 数据模型模块
//!
//! 定义从 VASP 输出中提取的数据结构。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `commands/` 模块使用
//! - 子模块: trajectory, outcar

pub mod outcar;
pub mod trajectory;

pub use outcar::{IonicSteps, OutcarSummary, RunConfig};
pub use trajectory::{InitialStructure, Trajectory};

/// 3x3 晶格矩阵
pub type Mat33 = [[f64; 3]; 3];

/// Nx3 矩阵（每原子一行）
pub type MatX3 = Vec<[f64; 3]>;
