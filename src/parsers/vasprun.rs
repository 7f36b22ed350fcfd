//! # vasprun.xml 全文档解析器
//!
//! 将整个 vasprun.xml 读入内存树，提供随机访问查询
//! （单次能量、力、始末位置等）。清洗控制字符后容错解析，
//! 可恢复的格式问题记为警告；完全无法解析才致命失败。
//! 流式不必要时（中小文件、单值查询）优先使用本解析器。
//!
//! ## 依赖关系
//! - 被 `commands/summary.rs` 使用
//! - 使用 `parsers/sanitize.rs`, `parsers/xmltree.rs`
//! - 使用 `models/`

use std::fs;
use std::path::Path;

use crate::error::{Result, VaspexError};
use crate::models::MatX3;
use crate::parsers::sanitize::sanitize_buffer;
use crate::parsers::xmltree::{named, parse_document, select, tag, Element, Step};
use crate::parsers::ParserOptions;
use crate::utils::output;

/// vasprun.xml 内存树解析器
pub struct VasprunParser {
    path: String,
    doc: Element,
    warnings: Vec<String>,
}

impl VasprunParser {
    /// 读取并解析整个文件
    pub fn new(path: &Path, options: ParserOptions) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| VaspexError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;

        if options.verbose {
            output::print_info(&format!(
                "Reading {} ({:.2} MB)...",
                path.display(),
                bytes.len() as f64 / 1024.0 / 1024.0
            ));
        }

        // 计算崩溃可能在文件中留下使 XML 失效的控制字节
        let cleaned = sanitize_buffer(&bytes);
        let (doc, warnings) = parse_document(&cleaned, &path.display().to_string())?;

        Ok(VasprunParser {
            path: path.display().to_string(),
            doc,
            warnings,
        })
    }

    /// 解析期间收集的警告
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn first(&self, steps: &[Step], what: &str) -> Result<&Element> {
        select(&self.doc, steps)
            .into_iter()
            .next()
            .ok_or_else(|| VaspexError::NotFound(format!("{} in {}", what, self.path)))
    }

    /// INCAR 属性值（字符串形式）
    pub fn get_incar_property(&self, propname: &str) -> Result<String> {
        let elem = self.first(
            &[tag("incar"), named("i", propname)],
            &format!("INCAR property {}", propname),
        )?;
        Ok(elem.text.trim().to_string())
    }

    /// 总能量 (eV)
    pub fn get_total_energy(&self) -> Result<f64> {
        let elem = self.first(
            &[tag("calculation"), tag("energy"), named("i", "e_fr_energy")],
            "total energy",
        )?;
        parse_scalar(elem, "total energy")
    }

    /// 电子自洽迭代记录
    pub fn get_sc_steps(&self) -> Result<Vec<&Element>> {
        let steps = select(&self.doc, &[tag("calculation"), tag("scstep")]);
        if steps.is_empty() {
            return Err(VaspexError::NotFound(format!("scstep in {}", self.path)));
        }
        Ok(steps)
    }

    /// 作用在第 atom_no 个原子上的力（1 为第一个原子）
    pub fn get_force_on_atom(&self, atom_no: usize) -> Result<[f64; 3]> {
        let forces = select(
            &self.doc,
            &[tag("calculation"), named("varray", "forces"), tag("v")],
        );
        forces
            .get(atom_no.wrapping_sub(1))
            .and_then(|v| v.parse_v3())
            .ok_or_else(|| VaspexError::NotFound(format!("force on atom {}", atom_no)))
    }

    fn structure_varray(&self, structure: &str, varray: &str) -> Vec<&Element> {
        select(
            &self.doc,
            &[named("structure", structure), named("varray", varray), tag("v")],
        )
    }

    fn positions_of(&self, structure: &str) -> Result<MatX3> {
        let rows: MatX3 = self
            .structure_varray(structure, "positions")
            .iter()
            .filter_map(|v| v.parse_v3())
            .collect();
        if rows.is_empty() {
            return Err(VaspexError::NotFound(format!(
                "{} positions in {}",
                structure, self.path
            )));
        }
        Ok(rows)
    }

    fn velocities_of(&self, structure: &str) -> Result<MatX3> {
        let vels = self.structure_varray(structure, "velocities");
        if vels.is_empty() {
            // 速度结构性缺失：不是动力学计算，与一般性未找到区分
            return Err(VaspexError::NotDynamicsRun);
        }
        Ok(vels.iter().filter_map(|v| v.parse_v3()).collect())
    }

    /// 所有原子的初始位置 (Nx3)
    pub fn get_initial_positions(&self) -> Result<MatX3> {
        self.positions_of("initialpos")
    }

    /// 所有原子的最终位置 (Nx3)
    pub fn get_final_positions(&self) -> Result<MatX3> {
        self.positions_of("finalpos")
    }

    /// 所有原子的初始速度 (Nx3)
    pub fn get_initial_velocities(&self) -> Result<MatX3> {
        self.velocities_of("initialpos")
    }

    /// 所有原子的最终速度 (Nx3)
    pub fn get_final_velocities(&self) -> Result<MatX3> {
        self.velocities_of("finalpos")
    }

    /// 第 atom_no 个原子的最终位置（1 为第一个原子）
    pub fn get_final_atom_position(&self, atom_no: usize) -> Result<[f64; 3]> {
        let pos = self.structure_varray("finalpos", "positions");
        pos.get(atom_no.wrapping_sub(1))
            .and_then(|v| v.parse_v3())
            .ok_or_else(|| VaspexError::NotFound(format!("final position of atom {}", atom_no)))
    }

    /// 单个原子跨全部离子步的轨迹 (n x 3)，原子下标从 0 开始
    pub fn get_atom_trajectory(&self, atom_no: usize) -> Result<MatX3> {
        let calculations = select(&self.doc, &[tag("calculation")]);
        if calculations.is_empty() {
            return Err(VaspexError::NotFound(format!(
                "calculation steps in {}",
                self.path
            )));
        }
        let mut traj = MatX3::with_capacity(calculations.len());
        for step in calculations {
            let v = select(step, &[tag("structure"), named("varray", "positions"), tag("v")])
                .get(atom_no)
                .and_then(|v| v.parse_v3())
                .ok_or_else(|| {
                    VaspexError::NotFound(format!("position of atom {} in step", atom_no))
                })?;
            traj.push(v);
        }
        Ok(traj)
    }

    /// 最终晶胞体积 (Å³)
    pub fn get_final_volume(&self) -> Result<f64> {
        let elem = self.first(
            &[
                named("structure", "finalpos"),
                tag("crystal"),
                named("i", "volume"),
            ],
            "final volume",
        )?;
        parse_scalar(elem, "final volume")
    }

    /// 作用在任一原子上的最大力（欧几里得范数），无力数据时为 0
    pub fn get_max_force(&self) -> f64 {
        let forces = select(
            &self.doc,
            &[tag("calculation"), named("varray", "forces"), tag("v")],
        );
        let mut max_force = 0.0f64;
        for f in forces {
            if let Some([x, y, z]) = f.parse_v3() {
                let norm = (x * x + y * y + z * z).sqrt();
                if norm > max_force {
                    max_force = norm;
                }
            }
        }
        max_force
    }

    /// 自洽循环 CPU 时间 (s)
    ///
    /// 对应 OUTCAR 中 `LOOP+: cpu time` 的值，总是略低于
    /// `Total CPU time used (sec):`，但 vasprun.xml 中只有前者。
    pub fn get_cpu_time(&self) -> Result<f64> {
        let elem = self.first(
            &[tag("calculation"), named("time", "totalsc")],
            "CPU time",
        )?;
        elem.parse_floats()
            .first()
            .copied()
            .ok_or_else(|| VaspexError::NotFound(format!("CPU time in {}", self.path)))
    }
}

fn parse_scalar(elem: &Element, what: &str) -> Result<f64> {
    elem.text.trim().parse().map_err(|_| {
        VaspexError::NotFound(format!("{}: unparsable value '{}'", what, elem.text.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<modeling>
 <incar>
  <i name="NSW">    2 </i>
  <i name="ENCUT"> 400.0 </i>
 </incar>
 <structure name="initialpos">
  <crystal>
   <varray name="basis">
    <v> 5.4 0.0 0.0 </v>
    <v> 0.0 5.4 0.0 </v>
    <v> 0.0 0.0 5.4 </v>
   </varray>
  </crystal>
  <varray name="positions">
   <v> 0.1 0.1 0.1 </v>
   <v> 0.6 0.6 0.6 </v>
  </varray>
 </structure>
 <calculation>
  <scstep><energy><i name="e_fr_energy"> -9.0 </i></energy></scstep>
  <scstep><energy><i name="e_fr_energy"> -10.0 </i></energy></scstep>
  <structure>
   <varray name="positions">
    <v> 0.2 0.2 0.2 </v>
    <v> 0.7 0.7 0.7 </v>
   </varray>
  </structure>
  <varray name="forces">
   <v> 3.0 4.0 0.0 </v>
   <v> 0.0 0.0 5.0 </v>
  </varray>
  <energy><i name="e_fr_energy"> -10.5 </i></energy>
  <time name="totalsc"> 482.23 482.58 </time>
 </calculation>
 <structure name="finalpos">
  <crystal>
   <i name="volume"> 157.46 </i>
  </crystal>
  <varray name="positions">
   <v> 0.0 0.0 0.0 </v>
   <v> 1.0 1.0 1.0 </v>
  </varray>
 </structure>
</modeling>
"#;

    fn write_sample(content: &str) -> std::path::PathBuf {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut path = std::env::temp_dir();
        path.push(format!("vaspex_test_{}_{}.xml", std::process::id(), n));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn parser() -> VasprunParser {
        let path = write_sample(SAMPLE);
        VasprunParser::new(&path, ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_incar_property() {
        let p = parser();
        assert_eq!(p.get_incar_property("ENCUT").unwrap(), "400.0");
        assert!(p.get_incar_property("POTIM").unwrap_err().is_not_found());
    }

    #[test]
    fn test_total_energy_and_cpu_time() {
        let p = parser();
        assert_eq!(p.get_total_energy().unwrap(), -10.5);
        assert_eq!(p.get_cpu_time().unwrap(), 482.23);
    }

    #[test]
    fn test_sc_steps() {
        let p = parser();
        assert_eq!(p.get_sc_steps().unwrap().len(), 2);
    }

    #[test]
    fn test_final_positions() {
        let p = parser();
        let pos = p.get_final_positions().unwrap();
        assert_eq!(pos, vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
    }

    #[test]
    fn test_force_queries() {
        let p = parser();
        assert_eq!(p.get_force_on_atom(1).unwrap(), [3.0, 4.0, 0.0]);
        // 范数分别为 5 和 5
        assert_eq!(p.get_max_force(), 5.0);
    }

    #[test]
    fn test_atom_trajectory_and_final_position() {
        let p = parser();
        let traj = p.get_atom_trajectory(1).unwrap();
        assert_eq!(traj, vec![[0.7, 0.7, 0.7]]);
        assert_eq!(p.get_final_atom_position(2).unwrap(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_final_volume() {
        let p = parser();
        assert!((p.get_final_volume().unwrap() - 157.46).abs() < 1e-9);
    }

    #[test]
    fn test_velocities_not_dynamics_run() {
        let p = parser();
        assert!(matches!(
            p.get_final_velocities(),
            Err(VaspexError::NotDynamicsRun)
        ));
        assert!(matches!(
            p.get_initial_velocities(),
            Err(VaspexError::NotDynamicsRun)
        ));
    }

    #[test]
    fn test_control_characters_are_sanitized() {
        let dirty = SAMPLE.replace("-10.5", "-10.5\u{1}\u{8}");
        let path = write_sample(&dirty);
        let p = VasprunParser::new(&path, ParserOptions::default()).unwrap();
        assert_eq!(p.get_total_energy().unwrap(), -10.5);
    }

    #[test]
    fn test_max_force_empty_is_zero() {
        let doc = r#"<modeling><calculation></calculation></modeling>"#;
        let path = write_sample(doc);
        let p = VasprunParser::new(&path, ParserOptions::default()).unwrap();
        assert_eq!(p.get_max_force(), 0.0);
    }
}
