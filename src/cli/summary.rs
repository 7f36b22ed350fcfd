//! # summary 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/summary.rs`

use clap::Args;
use std::path::PathBuf;

/// summary 子命令参数
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Path to an OUTCAR or vasprun.xml file (format detected from the file name)
    pub file: PathBuf,

    /// Do not cache the whole OUTCAR in memory (for very large files)
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Print file size diagnostics
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
