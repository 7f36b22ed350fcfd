//! # 解析器模块
//!
//! 提供 vasprun.xml（流式与全文档）和 OUTCAR 两种输出格式的解析器。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: sanitize, xmltree, vasprun, vasprun_stream, outcar

pub mod outcar;
pub mod sanitize;
pub mod vasprun;
pub mod vasprun_stream;
pub mod xmltree;

/// 解析器能力描述，构造时显式传入
///
/// 替代全局特性标志：进度条、详细诊断等可选能力缺失时对应
/// 操作可预测地降级，而不是查询全局状态。
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    /// 打印文件大小、步数等诊断信息
    pub verbose: bool,
    /// 长扫描显示进度条
    pub progress: bool,
}

impl ParserOptions {
    pub fn new(verbose: bool, progress: bool) -> Self {
        ParserOptions { verbose, progress }
    }
}
