//! # 工具模块
//!
//! 提供终端输出与进度条工具函数。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `commands/` 模块使用
//! - 子模块: output, progress

pub mod output;
pub mod progress;
