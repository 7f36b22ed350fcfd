//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `models/`, `utils/`
//! - 子模块: trajectory, summary, steps

pub mod steps;
pub mod summary;
pub mod trajectory;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Trajectory(args) => trajectory::execute(args),
        Commands::Summary(args) => summary::execute(args),
        Commands::Steps(args) => steps::execute(args),
    }
}
