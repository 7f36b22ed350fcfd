//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `trajectory`: 流式提取 vasprun.xml 离子步轨迹
//! - `summary`: OUTCAR / vasprun.xml 汇总报告
//! - `steps`: OUTCAR 离子步能量与力序列
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: trajectory, summary, steps

pub mod steps;
pub mod summary;
pub mod trajectory;

use clap::{Parser, Subcommand};

/// vaspex - VASP 输出提取工具箱
#[derive(Parser)]
#[command(name = "vaspex")]
#[command(version)]
#[command(about = "A VASP output extraction toolkit for large vasprun.xml and OUTCAR files", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Extract the ionic-step trajectory from a vasprun.xml (streaming, bounded memory)
    Trajectory(trajectory::TrajectoryArgs),

    /// Summarize an OUTCAR or vasprun.xml file
    Summary(summary::SummaryArgs),

    /// Extract per-ionic-step energies and forces from an OUTCAR
    Steps(steps::StepsArgs),
}
