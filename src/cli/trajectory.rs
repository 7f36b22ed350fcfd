//! # trajectory 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/trajectory.rs`

use clap::Args;
use std::path::PathBuf;

/// trajectory 子命令参数
#[derive(Args, Debug)]
pub struct TrajectoryArgs {
    /// Path to the vasprun.xml file
    pub file: PathBuf,

    /// Extract the trajectory of a single atom (0-based index)
    #[arg(long)]
    pub atom: Option<usize>,

    /// Write per-step energies to a CSV file
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Print file size and step diagnostics
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
