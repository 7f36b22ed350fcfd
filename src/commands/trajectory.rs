//! # trajectory 子命令实现
//!
//! 流式扫描 vasprun.xml，提取离子步轨迹并报告。
//!
//! ## 依赖关系
//! - 使用 `cli/trajectory.rs` 定义的参数
//! - 使用 `parsers/vasprun_stream.rs`
//! - 使用 `utils/output.rs`

use std::path::Path;

use crate::cli::trajectory::TrajectoryArgs;
use crate::error::{Result, VaspexError};
use crate::models::Trajectory;
use crate::parsers::vasprun_stream::IterVasprunParser;
use crate::parsers::ParserOptions;
use crate::utils::output;

/// 执行轨迹提取
pub fn execute(args: TrajectoryArgs) -> Result<()> {
    output::print_header("Extracting Trajectory");

    if !args.file.exists() {
        return Err(VaspexError::FileNotFound {
            path: args.file.display().to_string(),
        });
    }

    let options = ParserOptions::new(args.verbose, !args.no_progress);
    let mut parser = IterVasprunParser::new(&args.file, options)?;

    output::print_info(&format!(
        "{} atoms, {} declared ionic steps",
        parser.num_atoms(),
        parser.num_ionic_steps()
    ));

    let trajectory = match args.atom {
        Some(atom_no) => parser.get_single_trajectory(atom_no)?,
        None => parser.get_all_trajectories()?,
    };

    for warning in parser.warnings() {
        output::print_warning(warning);
    }

    output::print_info(&format!(
        "Found {} of {} declared steps",
        trajectory.num_steps,
        parser.num_ionic_steps()
    ));
    if let Some(e_total) = trajectory.e_total.last() {
        output::print_info(&format!("Final total energy: {:.6} eV", e_total));
    }

    if let Some(ref csv_path) = args.output_csv {
        save_energy_csv(&trajectory, csv_path)?;
        output::print_success(&format!("Per-step energies saved to '{}'", csv_path.display()));
    }

    Ok(())
}

/// 保存每步能量到 CSV
fn save_energy_csv(trajectory: &Trajectory, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path).map_err(VaspexError::CsvError)?;

    wtr.write_record(["step", "time", "e_kinetic_eV", "e_total_eV"])
        .map_err(VaspexError::CsvError)?;

    for step in 0..trajectory.num_steps {
        wtr.write_record(&[
            (step + 1).to_string(),
            format!("{:.4}", (step + 1) as f64 * trajectory.timestep),
            format!("{:.10}", trajectory.e_kinetic[step]),
            format!("{:.10}", trajectory.e_total[step]),
        ])
        .map_err(VaspexError::CsvError)?;
    }

    wtr.flush().map_err(|e| VaspexError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
