//! # vasprun.xml 流式解析器
//!
//! 面向超大文件（数百 MB 到 GB）的增量解析：每次只物化一个
//! 目标元素的子树，访问后立即丢弃，峰值内存与文件大小无关。
//! 功能比全文档解析器有限，只做按步时间序列提取。
//!
//! 每次操作都从文件头打开新的清洗读取流，前向只读。
//!
//! ## 依赖关系
//! - 被 `commands/trajectory.rs` 使用
//! - 使用 `parsers/sanitize.rs`, `parsers/xmltree.rs`
//! - 使用 `models/trajectory.rs`, `utils/progress.rs`

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, VaspexError};
use crate::models::{InitialStructure, MatX3, Trajectory};
use crate::parsers::sanitize::SanitizingReader;
use crate::parsers::xmltree::{named, read_subtree, select, tag, varray_mat33, Element};
use crate::parsers::ParserOptions;
use crate::utils::{output, progress};

type SanitizedXmlReader = Reader<BufReader<SanitizingReader<File>>>;

/// 迭代式 vasprun.xml 解析器
pub struct IterVasprunParser {
    path: PathBuf,
    options: ParserOptions,
    nsw: usize,
    potim: f64,
    atoms: Vec<String>,
    warnings: Vec<String>,
}

impl IterVasprunParser {
    /// 打开文件并预扫描 INCAR 与原子信息
    ///
    /// NSW 缺失是致命错误：流式扫描需要预先知道容量上限。
    /// POTIM 缺失时取 0（非动力学计算）。
    pub fn new(path: &Path, options: ParserOptions) -> Result<Self> {
        let mut parser = IterVasprunParser {
            path: path.to_path_buf(),
            options,
            nsw: 0,
            potim: 0.0,
            atoms: Vec::new(),
            warnings: Vec::new(),
        };

        if parser.options.verbose {
            if let Ok(meta) = std::fs::metadata(path) {
                output::print_info(&format!(
                    "Parsing {} ({:.2} MB)...",
                    path.display(),
                    meta.len() as f64 / 1024.0 / 1024.0
                ));
            }
        }

        let (nsw, potim) = parser.find_first("incar", |incar| {
            let nsw = select(incar, &[named("i", "NSW")])
                .first()
                .and_then(|e| e.text.trim().parse::<usize>().ok())
                .ok_or_else(|| VaspexError::ParseError {
                    format: "vasprun".to_string(),
                    path: path.display().to_string(),
                    reason: "incar:NSW not found".to_string(),
                })?;
            let potim = select(incar, &[named("i", "POTIM")])
                .first()
                .and_then(|e| e.text.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            Ok((nsw, potim))
        })?;
        parser.nsw = nsw;
        parser.potim = potim;

        parser.atoms = parser.find_first("atominfo", |info| {
            let species = select(info, &[named("array", "atoms"), tag("set"), tag("rc")])
                .iter()
                .filter_map(|rc| rc.child("c"))
                .map(|c| c.text.trim().to_string())
                .collect::<Vec<_>>();
            Ok(species)
        })?;

        Ok(parser)
    }

    /// 声明的离子步数 (NSW)
    pub fn num_ionic_steps(&self) -> usize {
        self.nsw
    }

    /// 原子数
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// 原子种类符号
    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    /// 扫描期间收集的警告
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn open_reader(&self) -> Result<SanitizedXmlReader> {
        let file = File::open(&self.path).map_err(|e| VaspexError::FileReadError {
            path: self.path.display().to_string(),
            source: e,
        })?;
        let mut reader = Reader::from_reader(BufReader::new(SanitizingReader::new(file)));
        reader.config_mut().trim_text(true);
        Ok(reader)
    }

    /// 从头扫描，对第一个匹配的元素调用 visitor 后立即停止
    ///
    /// 标签到流结束都未出现时返回 `TagNotFound`。
    pub fn find_first<T, F>(&self, tag_name: &str, visitor: F) -> Result<T>
    where
        F: FnOnce(&Element) -> Result<T>,
    {
        let mut reader = self.open_reader()?;
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.name().as_ref() == tag_name.as_bytes() => {
                    let start = e.to_owned();
                    let elem = read_subtree(&mut reader, &start)?;
                    return visitor(&elem);
                }
                Ok(Event::Eof) => {
                    return Err(VaspexError::TagNotFound {
                        tag: tag_name.to_string(),
                        path: self.path.display().to_string(),
                    })
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(VaspexError::ParseError {
                        format: "vasprun".to_string(),
                        path: self.path.display().to_string(),
                        reason: format!("error at byte {}: {}", reader.buffer_position(), e),
                    })
                }
            }
            buf.clear();
        }
    }

    /// 扫描整个流，按文档序对每个匹配元素调用一次 visitor
    ///
    /// 每个子树在 visitor 返回后立即释放，工作集有界。最后一个
    /// 有效元素之后的残缺内容（计算中途崩溃的截断文件）只记警告，
    /// 已处理的结果保留。返回匹配次数。
    pub fn for_each<F>(&mut self, tag_name: &str, mut visitor: F) -> Result<usize>
    where
        F: FnMut(&Element) -> Result<()>,
    {
        let mut reader = self.open_reader()?;
        let mut buf = Vec::new();
        let mut count = 0usize;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.name().as_ref() == tag_name.as_bytes() => {
                    let start = e.to_owned();
                    match read_subtree(&mut reader, &start) {
                        Ok(elem) => {
                            visitor(&elem)?;
                            count += 1;
                        }
                        Err(e) => {
                            // 子树内截断：保留之前的完整元素
                            self.warnings.push(format!("Warning: {}", e));
                            break;
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    self.warnings.push(format!(
                        "Warning: error at byte {}: {}",
                        reader.buffer_position(),
                        e
                    ));
                    break;
                }
            }
            buf.clear();
        }
        Ok(count)
    }

    /// 初始结构快照（第一个 structure 元素）
    pub fn get_initial_structure(&self) -> Result<InitialStructure> {
        self.find_first("structure", |elem| {
            let basis = select(elem, &[tag("crystal"), named("varray", "basis")])
                .first()
                .and_then(|v| varray_mat33(v))
                .ok_or_else(|| VaspexError::NotFound("initial basis".to_string()))?;
            let positions = collect_rows(elem, "positions", None);
            let velocities = collect_rows(elem, "velocities", None);
            Ok(InitialStructure {
                basis,
                positions,
                velocities,
            })
        })
    }

    /// 全部原子的轨迹
    pub fn get_all_trajectories(&mut self) -> Result<Trajectory> {
        self.scan_trajectory(None)
    }

    /// 单个原子的轨迹，原子下标从 0 开始
    pub fn get_single_trajectory(&mut self, atom_no: usize) -> Result<Trajectory> {
        if atom_no >= self.atoms.len() {
            return Err(VaspexError::InvalidArgument(format!(
                "atom index {} out of range ({} atoms)",
                atom_no,
                self.atoms.len()
            )));
        }
        self.scan_trajectory(Some(atom_no))
    }

    /// 逐 calculation 元素增量填充轨迹，结束后截断到实际步数
    fn scan_trajectory(&mut self, atom_no: Option<usize>) -> Result<Trajectory> {
        let species = match atom_no {
            Some(i) => vec![self.atoms[i].clone()],
            None => self.atoms.clone(),
        };
        let mut trajectory = Trajectory::new(self.nsw, self.potim, species);

        let pb = if self.options.progress {
            Some(progress::create_progress_bar(
                self.nsw as u64,
                "Parsing ionic steps",
            ))
        } else {
            None
        };

        let mut step = 0usize;
        let found = self.for_each("calculation", |elem| {
            if let Some(basis) = select(elem, &[tag("structure"), tag("crystal"), named("varray", "basis")])
                .first()
                .and_then(|v| varray_mat33(v))
            {
                trajectory.set_basis(step, basis)?;
            }

            trajectory.set_positions(step, collect_rows(elem, "positions", atom_no))?;

            let velocities = collect_rows(elem, "velocities", atom_no);
            if !velocities.is_empty() {
                trajectory.set_velocities(step, velocities)?;
            }

            if let Some(e_kin) = energy_value(elem, "kinetic") {
                trajectory.set_e_kinetic(step, e_kin)?;
            }
            if let Some(e_total) = energy_value(elem, "e_fr_energy") {
                trajectory.set_e_total(step, e_total)?;
            }

            step += 1;
            if let Some(ref pb) = pb {
                pb.inc(1);
            }
            Ok(())
        })?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        if self.options.verbose {
            output::print_info(&format!("Found {} out of {} steps", found, self.nsw));
        }

        trajectory.update_length(found)?;
        Ok(trajectory)
    }
}

/// calculation/structure 下指定 varray 的行，可只取单个原子的一行
fn collect_rows(elem: &Element, varray: &str, atom_no: Option<usize>) -> MatX3 {
    let rows = select(elem, &[tag("structure"), named("varray", varray), tag("v")]);
    let rows = if rows.is_empty() {
        // 初始结构：varray 直接在 structure 元素下
        select(elem, &[named("varray", varray), tag("v")])
    } else {
        rows
    };
    match atom_no {
        Some(i) => rows
            .get(i)
            .and_then(|v| v.parse_v3())
            .map(|v| vec![v])
            .unwrap_or_default(),
        None => rows.iter().filter_map(|v| v.parse_v3()).collect(),
    }
}

fn energy_value(elem: &Element, name: &str) -> Option<f64> {
    select(elem, &[tag("energy"), named("i", name)])
        .first()
        .and_then(|e| e.text.trim().parse().ok())
}
