//! # steps 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/steps.rs`

use clap::Args;
use std::path::PathBuf;

/// steps 子命令参数
#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Path to the OUTCAR file
    pub file: PathBuf,

    /// Number of steps to print in the terminal table
    #[arg(long, default_value_t = 10)]
    pub top_n: usize,

    /// Write the full per-step series to a CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Do not cache the whole OUTCAR in memory (for very large files)
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Print file size diagnostics
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
