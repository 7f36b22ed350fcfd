//! # summary 子命令实现
//!
//! 按文件名区分 OUTCAR 与 vasprun.xml，输出汇总表格。
//! 单值缺失显示为 n/a，不作为错误。
//!
//! ## 依赖关系
//! - 使用 `cli/summary.rs` 定义的参数
//! - 使用 `parsers/outcar.rs`, `parsers/vasprun.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use tabled::{Table, Tabled};

use crate::cli::summary::SummaryArgs;
use crate::error::{Result, VaspexError};
use crate::parsers::outcar::OutcarParser;
use crate::parsers::vasprun::VasprunParser;
use crate::parsers::ParserOptions;
use crate::utils::{output, progress};

/// 汇总表格行
#[derive(Debug, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl SummaryRow {
    fn new(quantity: &str, value: Option<String>) -> Self {
        SummaryRow {
            quantity: quantity.to_string(),
            value: value.unwrap_or_else(|| "n/a".to_string()),
        }
    }
}

/// 执行汇总报告
pub fn execute(args: SummaryArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(VaspexError::FileNotFound {
            path: args.file.display().to_string(),
        });
    }

    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if name.starts_with("OUTCAR") {
        summarize_outcar(&args)
    } else if name.ends_with(".xml") || name.starts_with("vasprun") {
        summarize_vasprun(&args)
    } else {
        Err(VaspexError::UnsupportedFormat(format!(
            "Cannot determine format for: {}",
            args.file.display()
        )))
    }
}

fn summarize_outcar(args: &SummaryArgs) -> Result<()> {
    output::print_header("OUTCAR Summary");

    let options = ParserOptions::new(args.verbose, false);
    let mut parser = OutcarParser::new(&args.file, !args.no_cache, options)?;
    for warning in parser.warnings() {
        output::print_warning(warning);
    }

    let config = parser.config().clone();
    let summary = parser.read_summary()?;

    let rows = vec![
        SummaryRow::new("IBRION", Some(format!("{}", config.ibrion))),
        SummaryRow::new("NSW", Some(format!("{}", config.nsw))),
        SummaryRow::new("POTIM (fs)", Some(format!("{}", config.potim))),
        SummaryRow::new("TEBEG (K)", Some(format!("{}", config.tebeg))),
        SummaryRow::new("TEEND (K)", Some(format!("{}", config.teend))),
        SummaryRow::new(
            "Irreducible k-points",
            summary.kpoints.map(|k| k.to_string()),
        ),
        SummaryRow::new("Plane waves (NPLWV)", summary.planewaves.map(|p| p.to_string())),
        SummaryRow::new("TOTEN (eV)", summary.toten.map(|e| format!("{:.6}", e))),
        SummaryRow::new(
            "Max force component",
            summary.max_force.map(|f| format!("{:.6}", f)),
        ),
        SummaryRow::new(
            "Max drift component",
            summary.max_drift.map(|d| format!("{:.6}", d)),
        ),
        SummaryRow::new(
            "External pressure (kB)",
            summary.pressure.map(|p| format!("{:.2}", p)),
        ),
        SummaryRow::new(
            "k-point distance",
            summary.kpoint_distance.map(|d| format!("{:.6}", d)),
        ),
        SummaryRow::new(
            "Total CPU time (s)",
            summary.cpu_time.map(|t| format!("{:.3}", t)),
        ),
    ];

    println!("{}", Table::new(&rows));
    Ok(())
}

fn summarize_vasprun(args: &SummaryArgs) -> Result<()> {
    output::print_header("vasprun.xml Summary");

    let pb = progress::create_spinner("Parsing document");
    let options = ParserOptions::new(args.verbose, false);
    let parser = VasprunParser::new(&args.file, options)?;
    pb.finish_and_clear();

    for warning in parser.warnings() {
        output::print_warning(warning);
    }

    // 单值缺失是合法状态（NotFound），与致命解析错误区分
    let rows = vec![
        SummaryRow::new(
            "Atoms",
            match parser.get_final_positions() {
                Ok(pos) => Some(pos.len().to_string()),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        ),
        SummaryRow::new(
            "Dynamics run",
            match parser.get_final_velocities() {
                Ok(_) => Some("yes".to_string()),
                Err(VaspexError::NotDynamicsRun) => Some("no".to_string()),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        ),
        SummaryRow::new("Total energy (eV)", optional(parser.get_total_energy())?),
        SummaryRow::new("Final volume (A^3)", optional(parser.get_final_volume())?),
        SummaryRow::new("Max force (eV/A)", Some(format!("{:.6}", parser.get_max_force()))),
        SummaryRow::new("SC loop CPU time (s)", optional(parser.get_cpu_time())?),
        SummaryRow::new(
            "SC steps",
            match parser.get_sc_steps() {
                Ok(steps) => Some(steps.len().to_string()),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        ),
    ];

    println!("{}", Table::new(&rows));
    Ok(())
}

/// 可恢复的 NotFound 显示为 n/a，其余错误向上传播
fn optional(result: Result<f64>) -> Result<Option<String>> {
    match result {
        Ok(v) => Ok(Some(format!("{:.6}", v))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
