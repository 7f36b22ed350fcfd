//! # vaspex - VASP 输出提取工具箱
//!
//! 从 vasprun.xml 和 OUTCAR 中提取结构化计算结果：
//! 大文件流式解析、容错清洗、按离子步的时间序列提取。
//!
//! ## 子命令
//! - `trajectory` - 流式提取 vasprun.xml 离子步轨迹
//! - `summary`    - OUTCAR / vasprun.xml 汇总报告
//! - `steps`      - OUTCAR 离子步能量与力序列
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/   (格式解析器)
//!   │     └── models/    (数据模型)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
