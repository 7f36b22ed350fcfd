//! # steps 子命令实现
//!
//! 提取 OUTCAR 离子步能量与力序列，输出表格与可选 CSV。
//!
//! ## 依赖关系
//! - 使用 `cli/steps.rs` 定义的参数
//! - 使用 `parsers/outcar.rs`
//! - 使用 `utils/output.rs`

use std::path::Path;

use tabled::{Table, Tabled};

use crate::cli::steps::StepsArgs;
use crate::error::{Result, VaspexError};
use crate::models::IonicSteps;
use crate::parsers::outcar::OutcarParser;
use crate::parsers::ParserOptions;
use crate::utils::output;

/// 离子步表格行
#[derive(Debug, Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "TOTEN (eV)")]
    e_ion_electron: String,
    #[tabled(rename = "EKIN (eV)")]
    e_kinetic: String,
    #[tabled(rename = "ETOTAL (eV)")]
    e_total: String,
    #[tabled(rename = "F max")]
    force_max: String,
    #[tabled(rename = "F rms")]
    force_rms: String,
}

/// 执行离子步提取
pub fn execute(args: StepsArgs) -> Result<()> {
    output::print_header("Extracting Ionic Steps");

    if !args.file.exists() {
        return Err(VaspexError::FileNotFound {
            path: args.file.display().to_string(),
        });
    }

    let options = ParserOptions::new(args.verbose, false);
    let mut parser = OutcarParser::new(&args.file, !args.no_cache, options)?;
    for warning in parser.warnings() {
        output::print_warning(warning);
    }

    let steps = parser.get_ionic_steps()?;
    if steps.is_empty() {
        output::print_warning("No ionic steps declared (NSW = 0).");
        return Ok(());
    }

    output::print_info(&format!("Extracted {} declared steps", steps.len()));

    let rows: Vec<StepRow> = (0..steps.len().min(args.top_n))
        .map(|i| StepRow {
            step: i + 1,
            time: format!("{:.3}", steps.time[i]),
            e_ion_electron: format!("{:.6}", steps.e_ion_electron[i]),
            e_kinetic: format!("{:.6}", steps.e_kinetic[i]),
            e_total: format!("{:.6}", steps.e_total[i]),
            force_max: format!("{:.4}", steps.force_max_atom[i]),
            force_rms: format!("{:.4}", steps.force_rms[i]),
        })
        .collect();
    println!("{}", Table::new(&rows));

    if let Some(ref csv_path) = args.output_csv {
        save_steps_csv(&steps, csv_path)?;
        output::print_success(&format!(
            "Full per-step series saved to '{}'",
            csv_path.display()
        ));
    }

    Ok(())
}

/// 保存全部离子步到 CSV
fn save_steps_csv(steps: &IonicSteps, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path).map_err(VaspexError::CsvError)?;

    wtr.write_record([
        "step",
        "time",
        "toten_eV",
        "ekin_eV",
        "etotal_eV",
        "force_max_atom",
        "force_rms",
    ])
    .map_err(VaspexError::CsvError)?;

    for i in 0..steps.len() {
        wtr.write_record(&[
            (i + 1).to_string(),
            format!("{:.4}", steps.time[i]),
            format!("{:.10}", steps.e_ion_electron[i]),
            format!("{:.10}", steps.e_kinetic[i]),
            format!("{:.10}", steps.e_total[i]),
            format!("{:.10}", steps.force_max_atom[i]),
            format!("{:.10}", steps.force_rms[i]),
        ])
        .map_err(VaspexError::CsvError)?;
    }

    wtr.flush().map_err(|e| VaspexError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
