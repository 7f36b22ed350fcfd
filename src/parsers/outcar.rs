//! # VASP OUTCAR 解析器
//!
//! 对自由格式日志做有状态的逐行正则扫描：
//! - 构造时做有界的头部扫描，恢复运行配置标量（IBRION/NSW/...）
//! - `get_ionic_steps` 全文件扫描，用显式步号计数器把力与能量
//!   归属到对应离子步
//! - `read_summary` 独立的单遍扫描，提取汇总标量
//!
//! 标签字符串与数字 token 语法与既有 OUTCAR 生产端逐字节兼容，
//! 不得改动。
//!
//! ## 依赖关系
//! - 被 `commands/summary.rs`, `commands/steps.rs` 使用
//! - 使用 `models/outcar.rs`
//! - 使用 `regex` crate

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::error::{Result, VaspexError};
use crate::models::{IonicSteps, OutcarSummary, RunConfig};
use crate::parsers::ParserOptions;
use crate::utils::output;

/// 头部扫描的配置键，默认值均为 0
const CONFIG_KEYS: [&str; 7] = ["IBRION", "NSW", "POTIM", "TEIN", "TEBEG", "TEEND", "SMASS"];

/// 行来源：整文件缓存（可随机重置）或超大文件逐行重读
enum LineSource {
    Cached { lines: Vec<String>, pos: usize },
    Streamed { reader: BufReader<File> },
}

impl LineSource {
    fn open(path: &Path, cached: bool) -> Result<Self> {
        if cached {
            let bytes = std::fs::read(path).map_err(|e| VaspexError::FileReadError {
                path: path.display().to_string(),
                source: e,
            })?;
            let lines = String::from_utf8_lossy(&bytes)
                .lines()
                .map(|l| l.to_string())
                .collect();
            Ok(LineSource::Cached { lines, pos: 0 })
        } else {
            let file = File::open(path).map_err(|e| VaspexError::FileReadError {
                path: path.display().to_string(),
                source: e,
            })?;
            Ok(LineSource::Streamed {
                reader: BufReader::new(file),
            })
        }
    }

    fn next_line(&mut self, path: &Path) -> Result<Option<String>> {
        match self {
            LineSource::Cached { lines, pos } => {
                if *pos >= lines.len() {
                    return Ok(None);
                }
                let line = lines[*pos].clone();
                *pos += 1;
                Ok(Some(line))
            }
            LineSource::Streamed { reader } => {
                let mut raw = Vec::new();
                let n = reader
                    .read_until(b'\n', &mut raw)
                    .map_err(|e| VaspexError::FileReadError {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                if n == 0 {
                    return Ok(None);
                }
                Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
            }
        }
    }

    fn reset(&mut self, path: &Path) -> Result<()> {
        match self {
            LineSource::Cached { pos, .. } => {
                *pos = 0;
                Ok(())
            }
            LineSource::Streamed { reader } => {
                reader
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| VaspexError::FileReadError {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                Ok(())
            }
        }
    }
}

/// 第二阶段扫描状态：是否已见到步标记
enum ScanState {
    NoStepSeen,
    InStep(usize),
}

impl ScanState {
    /// 当前步的零基下标；未见到任何步标记前的数据行是致命输入错误
    fn index(&self, line: &str) -> Result<usize> {
        match self {
            ScanState::NoStepSeen => Err(VaspexError::MissingStepContext {
                line: line.trim().to_string(),
            }),
            ScanState::InStep(n) => Ok(n - 1),
        }
    }
}

/// 汇总扫描状态：逐行携带跨行的扫描上下文
enum SummaryState {
    Scanning,
    /// `Following cartesian coordinates:` 之后：跳过一行表头，
    /// 再取两行 k 点坐标
    KpointCoords { skip: usize, first: Option<[f64; 3]> },
    /// `TOTAL-FORCE` 之后的分隔线
    ForceBlockSeparator,
    /// 力块内，逐行更新最大力分量
    InForceBlock { max_force: f64 },
    /// 力块结束分隔线之后的漂移行
    DriftLine { max_force: f64 },
}

/// OUTCAR 文件解析器
pub struct OutcarParser {
    path: PathBuf,
    lines: LineSource,
    config: RunConfig,
    warnings: Vec<String>,
}

impl OutcarParser {
    /// 打开文件并执行头部扫描
    ///
    /// `cached` 为 true 时整文件读入内存（通常更快），超大文件
    /// 用 false 逐行重读。
    pub fn new(path: &Path, cached: bool, options: ParserOptions) -> Result<Self> {
        if options.verbose {
            if let Ok(meta) = std::fs::metadata(path) {
                output::print_info(&format!(
                    "Parsing {} ({:.1} MB)...",
                    path.display(),
                    meta.len() as f64 / 1024.0 / 1024.0
                ));
            }
        }

        let mut parser = OutcarParser {
            path: path.to_path_buf(),
            lines: LineSource::open(path, cached)?,
            config: RunConfig::default(),
            warnings: Vec::new(),
        };
        parser.scan_header()?;
        parser.lines.reset(&parser.path)?;
        Ok(parser)
    }

    /// 有界头部扫描：每个键首个匹配生效，全部找到即提前结束
    fn scan_header(&mut self) -> Result<()> {
        let patterns: Vec<Regex> = CONFIG_KEYS
            .iter()
            .map(|key| Regex::new(&format!(r"{}[ \t]*=[ \t]*([0-9.\-]+)", key)).unwrap())
            .collect();
        let mut values = [0.0f64; CONFIG_KEYS.len()];
        let mut found = [false; CONFIG_KEYS.len()];

        while let Some(line) = self.lines.next_line(&self.path)? {
            for (i, pattern) in patterns.iter().enumerate() {
                if !found[i] {
                    if let Some(c) = pattern.captures(&line) {
                        values[i] = cap_f64(&c, 1);
                        found[i] = true;
                    }
                }
            }
            if found.iter().all(|f| *f) {
                break;
            }
        }

        self.config = RunConfig {
            ibrion: values[0],
            nsw: values[1],
            potim: values[2],
            tein: values[3],
            tebeg: values[4],
            teend: values[5],
            smass: values[6],
            missing: CONFIG_KEYS
                .iter()
                .zip(found.iter())
                .filter(|(_, &f)| !f)
                .map(|(k, _)| k.to_string())
                .collect(),
        };

        if !self.config.missing.is_empty() {
            self.warnings.push(format!(
                "Not all config keys were found! Perhaps the OUTCAR format has changed? Keys not found: {}",
                self.config.missing.join(", ")
            ));
        }
        Ok(())
    }

    /// 头部扫描恢复的运行配置
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// 扫描期间收集的警告
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// 全文件扫描，提取按离子步索引的能量与力序列
    ///
    /// 用 `Iteration N` 标记更新显式步号，其后匹配到的数据行写入
    /// 下标 N-1。标记出现前的数据行是致命输入错误；超过声明的
    /// NSW 容量的步号是越界错误。
    pub fn get_ionic_steps(&mut self) -> Result<IonicSteps> {
        self.lines.reset(&self.path)?;
        let numsteps = self.config.num_steps();
        let timestep = if self.config.is_md() {
            Some(self.config.potim)
        } else {
            None
        };
        let mut steps = IonicSteps::new(numsteps, timestep);

        let re_iteration = Regex::new(r"Iteration[ \t]*([0-9]+)").unwrap();
        let re_forces =
            Regex::new(r"FORCES: max atom, RMS[ \t]*([0-9.\-]+)[ \t]*([0-9.\-]+)").unwrap();
        let re_ion_electron =
            Regex::new(r"% ion-electron   TOTEN[ \t]*=[ \t]*([0-9.\-]+)").unwrap();
        let re_ekin = Regex::new(r"kinetic Energy EKIN[ \t]*=[ \t]*([0-9.\-]+)").unwrap();
        let re_etotal = Regex::new(r"total energy   ETOTAL[ \t]*=[ \t]*([0-9.\-E]+)").unwrap();

        let mut state = ScanState::NoStepSeen;
        while let Some(line) = self.lines.next_line(&self.path)? {
            // 各模式对每行独立检测，不做互斥假设（遗留格式中
            // 实际每行最多命中一个）
            if let Some(c) = re_iteration.captures(&line) {
                let n = c[1].parse::<usize>().unwrap_or(0);
                if n == 0 || n > numsteps {
                    return Err(VaspexError::IndexOutOfRange {
                        index: n,
                        capacity: numsteps,
                    });
                }
                state = ScanState::InStep(n);
            }
            if let Some(c) = re_forces.captures(&line) {
                let idx = state.index(&line)?;
                steps.force_max_atom[idx] = cap_f64(&c, 1);
                steps.force_rms[idx] = cap_f64(&c, 2);
            }
            if let Some(c) = re_ion_electron.captures(&line) {
                let idx = state.index(&line)?;
                steps.e_ion_electron[idx] = cap_f64(&c, 1);
            }
            if let Some(c) = re_ekin.captures(&line) {
                let idx = state.index(&line)?;
                steps.e_kinetic[idx] = cap_f64(&c, 1);
            }
            if let Some(c) = re_etotal.captures(&line) {
                let idx = state.index(&line)?;
                steps.e_total[idx] = cap_f64(&c, 1);
            }
        }
        Ok(steps)
    }

    /// 独立的单遍汇总扫描
    ///
    /// 与头部/离子步扫描状态无关；"在力块内"等跨行上下文由显式
    /// 状态机携带。
    pub fn read_summary(&mut self) -> Result<OutcarSummary> {
        self.lines.reset(&self.path)?;
        let mut summary = OutcarSummary::default();

        let re_kpoints = Regex::new(r"(\d+) +irreducible").unwrap();
        let re_toten = Regex::new(r"free  energy   TOTEN  = +(-*\d+.\d+)").unwrap();
        let re_cpu = Regex::new(r"Total CPU time used \(sec\): +(\d+.\d+)").unwrap();
        let re_coords = Regex::new(r"Following cartesian coordinates:").unwrap();
        let re_nplwv = Regex::new(r"NPLWV[ \t]*=[ \t]*([0-9]+)").unwrap();
        let re_pressure = Regex::new(r"external pressure").unwrap();
        let re_force_block = Regex::new(r"TOTAL\-FORCE").unwrap();
        let re_dashes = Regex::new(r"----").unwrap();

        let mut state = SummaryState::Scanning;
        while let Some(line) = self.lines.next_line(&self.path)? {
            state = match state {
                SummaryState::Scanning => {
                    if let Some(c) = re_nplwv.captures(&line) {
                        summary.planewaves = c[1].parse().ok();
                    }
                    if let Some(c) = re_kpoints.captures(&line) {
                        summary.kpoints = c[1].parse().ok();
                        SummaryState::Scanning
                    } else if let Some(c) = re_toten.captures(&line) {
                        summary.toten = c[1].parse().ok();
                        SummaryState::Scanning
                    } else if let Some(c) = re_cpu.captures(&line) {
                        summary.cpu_time = c[1].parse().ok();
                        SummaryState::Scanning
                    } else if re_coords.is_match(&line) {
                        // k 点数未知时无法决定是否读取坐标行
                        match summary.kpoints {
                            None => {
                                return Err(VaspexError::ParseError {
                                    format: "outcar".to_string(),
                                    path: self.path.display().to_string(),
                                    reason:
                                        "k-point coordinates found before irreducible k-point count"
                                            .to_string(),
                                })
                            }
                            Some(k) if k > 1 => SummaryState::KpointCoords {
                                skip: 1,
                                first: None,
                            },
                            Some(_) => {
                                summary.kpoint_distance = Some(0.0);
                                SummaryState::Scanning
                            }
                        }
                    } else if re_pressure.is_match(&line) {
                        summary.pressure = line
                            .split_whitespace()
                            .nth(3)
                            .and_then(|s| s.parse().ok());
                        SummaryState::Scanning
                    } else if re_force_block.is_match(&line) {
                        SummaryState::ForceBlockSeparator
                    } else {
                        SummaryState::Scanning
                    }
                }
                SummaryState::KpointCoords { skip, first } => {
                    if skip > 0 {
                        SummaryState::KpointCoords {
                            skip: skip - 1,
                            first,
                        }
                    } else {
                        let coords: Vec<f64> = line
                            .split_whitespace()
                            .filter_map(|s| s.parse().ok())
                            .collect();
                        if coords.len() < 3 {
                            return Err(VaspexError::ParseError {
                                format: "outcar".to_string(),
                                path: self.path.display().to_string(),
                                reason: format!("bad k-point coordinate line: {}", line.trim()),
                            });
                        }
                        let point = [coords[0], coords[1], coords[2]];
                        match first {
                            None => SummaryState::KpointCoords {
                                skip: 0,
                                first: Some(point),
                            },
                            Some(k1) => {
                                let dx = point[0] - k1[0];
                                let dy = point[1] - k1[1];
                                let dz = point[2] - k1[2];
                                summary.kpoint_distance =
                                    Some((dx * dx + dy * dy + dz * dz).sqrt());
                                SummaryState::Scanning
                            }
                        }
                    }
                }
                SummaryState::ForceBlockSeparator => {
                    SummaryState::InForceBlock { max_force: 0.0 }
                }
                SummaryState::InForceBlock { max_force } => {
                    if re_dashes.is_match(&line) {
                        SummaryState::DriftLine { max_force }
                    } else {
                        let values: Vec<f64> = line
                            .split_whitespace()
                            .filter_map(|s| s.parse().ok())
                            .collect();
                        // posx posy posz forx fory forz
                        let mut max_force = max_force;
                        for f in values.iter().skip(3).take(3) {
                            if f.abs() > max_force {
                                max_force = f.abs();
                            }
                        }
                        SummaryState::InForceBlock { max_force }
                    }
                }
                SummaryState::DriftLine { max_force } => {
                    // total drift:  x  y  z
                    let mut max_drift = 0.0f64;
                    for d in line
                        .split_whitespace()
                        .filter_map(|s| s.parse::<f64>().ok())
                    {
                        if d.abs() > max_drift {
                            max_drift = d.abs();
                        }
                    }
                    summary.max_force = Some(max_force);
                    summary.max_drift = Some(max_drift);
                    SummaryState::Scanning
                }
            };
        }
        Ok(summary)
    }

    /// INCAR 属性的全文件首个匹配
    pub fn get_incar_property(&mut self, propname: &str) -> Result<String> {
        self.lines.reset(&self.path)?;
        let pattern = Regex::new(&format!(
            r"^[\t ]*{}[\t ]*=[\t ]*([0-9.]*)",
            regex::escape(propname)
        ))
        .unwrap();
        while let Some(line) = self.lines.next_line(&self.path)? {
            if let Some(c) = pattern.captures(&line) {
                return Ok(c[1].to_string());
            }
        }
        Err(VaspexError::NotFound(format!(
            "INCAR property {} in {}",
            propname,
            self.path.display()
        )))
    }
}

fn cap_f64(c: &Captures, i: usize) -> f64 {
    c.get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "\
 vasp.5.2.2 15Apr09 complex
   IBRION =      0    ionic relax: 0-MD 1-quasi-New 2-CG
   NSW    =      3    number of steps for IOM
   POTIM  = 1.5000    time-step for ionic-motion
   TEIN   =    0.0    initial temperature
   TEBEG  =  300.0;   TEEND  = 300.0 temperature during run
   SMASS  =  -3.00    Nose mass-parameter (am)
";

    const STEPS: &str = "\
--------------------------------------- Iteration      1(   1)  ---------------------------------------
 % ion-electron   TOTEN  =     -20.123456
  FORCES: max atom, RMS   0.1000   0.0500
  kinetic Energy EKIN   =       0.250000
  total energy   ETOTAL =     -19.873456
--------------------------------------- Iteration      3(   1)  ---------------------------------------
 % ion-electron   TOTEN  =     -20.200000
  FORCES: max atom, RMS   0.0123   0.0045
  kinetic Energy EKIN   =       0.300000
  total energy   ETOTAL =     -19.900000
";

    const SUMMARY: &str = "\
 Found      2 irreducible k-points:

 Following cartesian coordinates:
            (in units of 2pi/SCALE)
   0.000000  0.000000  0.000000  0.500000
   0.300000  0.400000  0.000000  0.500000

   total plane-waves  NPLWV =  32768

 POSITION                                       TOTAL-FORCE (eV/Angst)
 -----------------------------------------------------------------------------------
      0.00000      0.00000      0.00000         3.000000      4.000000      0.000000
      1.35000      1.35000      1.35000         0.000000      0.000000     -5.000000
 -----------------------------------------------------------------------------------
    total drift:                                0.000010      0.000080     -0.000009

  external pressure =      -1.97 kB  Pullay stress =        0.00 kB

  free  energy   TOTEN  =       -19.873456 eV

         Total CPU time used (sec):      490.877
";

    fn write_outcar(content: &str) -> PathBuf {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut path = std::env::temp_dir();
        path.push(format!("vaspex_outcar_{}_{}", std::process::id(), n));
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn parser_for(content: &str, cached: bool) -> OutcarParser {
        OutcarParser::new(&write_outcar(content), cached, ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_header_scan_finds_all_keys() {
        let p = parser_for(&format!("{}{}", HEADER, STEPS), true);
        let c = p.config();
        assert_eq!(c.ibrion, 0.0);
        assert_eq!(c.nsw, 3.0);
        assert_eq!(c.potim, 1.5);
        assert_eq!(c.tebeg, 300.0);
        assert_eq!(c.teend, 300.0);
        assert_eq!(c.smass, -3.0);
        assert!(c.missing.is_empty());
        assert!(p.warnings().is_empty());
    }

    #[test]
    fn test_header_scan_missing_key_warns_and_defaults() {
        let header = HEADER.replace("   SMASS  =  -3.00    Nose mass-parameter (am)\n", "");
        let p = parser_for(&header, true);
        assert_eq!(p.config().smass, 0.0);
        assert_eq!(p.config().missing, vec!["SMASS".to_string()]);
        assert_eq!(p.warnings().len(), 1);
    }

    #[test]
    fn test_ionic_steps_indexed_by_step_marker() {
        let mut p = parser_for(&format!("{}{}", HEADER, STEPS), true);
        let steps = p.get_ionic_steps().unwrap();
        assert_eq!(steps.len(), 3);
        // 一基步号写入零基下标
        assert_eq!(steps.force_max_atom[0], 0.1);
        assert_eq!(steps.force_rms[0], 0.05);
        assert_eq!(steps.force_max_atom[2], 0.0123);
        assert_eq!(steps.force_rms[2], 0.0045);
        assert_eq!(steps.e_ion_electron[2], -20.2);
        assert_eq!(steps.e_kinetic[2], 0.3);
        assert_eq!(steps.e_total[2], -19.9);
        // 未出现的步保持零
        assert_eq!(steps.e_total[1], 0.0);
        // IBRION=0 时 time 乘以 POTIM
        assert_eq!(steps.time, vec![1.5, 3.0, 4.5]);
    }

    #[test]
    fn test_ionic_steps_streamed_matches_cached() {
        let content = format!("{}{}", HEADER, STEPS);
        let cached = parser_for(&content, true).get_ionic_steps().unwrap();
        let streamed = parser_for(&content, false).get_ionic_steps().unwrap();
        assert_eq!(cached.e_total, streamed.e_total);
        assert_eq!(cached.force_max_atom, streamed.force_max_atom);
    }

    #[test]
    fn test_data_before_step_marker_is_fatal() {
        let content = format!(
            "{}  FORCES: max atom, RMS   0.1000   0.0500\n",
            HEADER
        );
        let mut p = parser_for(&content, true);
        assert!(matches!(
            p.get_ionic_steps(),
            Err(VaspexError::MissingStepContext { .. })
        ));
    }

    #[test]
    fn test_step_marker_beyond_capacity_is_fatal() {
        let content = format!("{}--------- Iteration      4(   1)  ---------\n", HEADER);
        let mut p = parser_for(&content, true);
        assert!(matches!(
            p.get_ionic_steps(),
            Err(VaspexError::IndexOutOfRange {
                index: 4,
                capacity: 3
            })
        ));
    }

    #[test]
    fn test_read_summary() {
        let mut p = parser_for(&format!("{}{}", HEADER, SUMMARY), true);
        let s = p.read_summary().unwrap();
        assert_eq!(s.kpoints, Some(2));
        assert_eq!(s.planewaves, Some(32768));
        assert_eq!(s.toten, Some(-19.873456));
        assert_eq!(s.cpu_time, Some(490.877));
        assert_eq!(s.pressure, Some(-1.97));
        // 前两个 k 点: (0,0,0) 与 (0.3,0.4,0) → 距离 0.5
        assert!((s.kpoint_distance.unwrap() - 0.5).abs() < 1e-9);
        // 力块中最大分量
        assert_eq!(s.max_force, Some(5.0));
        assert_eq!(s.max_drift, Some(0.00008));
    }

    #[test]
    fn test_summary_single_kpoint_distance_is_zero() {
        let content = format!(
            "{} Found      1 irreducible k-points:\n Following cartesian coordinates:\n",
            HEADER
        );
        let mut p = parser_for(&content, true);
        assert_eq!(p.read_summary().unwrap().kpoint_distance, Some(0.0));
    }

    #[test]
    fn test_summary_coords_before_kpoint_count_is_fatal() {
        let content = format!("{} Following cartesian coordinates:\n", HEADER);
        let mut p = parser_for(&content, true);
        assert!(matches!(
            p.read_summary(),
            Err(VaspexError::ParseError { .. })
        ));
    }

    #[test]
    fn test_get_incar_property() {
        let content = format!("{}   ENCUT  =  400.0 eV\n", HEADER);
        let mut p = parser_for(&content, true);
        assert_eq!(p.get_incar_property("ENCUT").unwrap(), "400.0");
        assert!(p.get_incar_property("ISPIN").unwrap_err().is_not_found());
    }
}
