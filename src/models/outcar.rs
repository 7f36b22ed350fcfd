//! # OUTCAR 数据模型
//!
//! 存储从 OUTCAR 日志中提取的运行配置、离子步序列和汇总标量。
//!
//! ## 依赖关系
//! - 被 `parsers/outcar.rs` 使用
//! - 被 `commands/summary.rs`, `commands/steps.rs` 使用

use serde::{Deserialize, Serialize};

/// 头部扫描恢复的运行配置标量
///
/// 每个键有默认值；头部扫描未找到的键记录在 `missing` 中，
/// 作为警告报告而非致命错误。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// 动力学积分器标志 (IBRION)
    pub ibrion: f64,
    /// 声明的离子步数 (NSW)
    pub nsw: f64,
    /// 时间步长 (POTIM, fs)
    pub potim: f64,
    /// 初始温度 (TEIN)
    pub tein: f64,
    /// 起始温度 (TEBEG)
    pub tebeg: f64,
    /// 终止温度 (TEEND)
    pub teend: f64,
    /// Nose 质量参数 (SMASS)
    pub smass: f64,
    /// 头部扫描未找到的键
    pub missing: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            ibrion: 0.0,
            nsw: 0.0,
            potim: 0.0,
            tein: 0.0,
            tebeg: 0.0,
            teend: 0.0,
            smass: 0.0,
            missing: Vec::new(),
        }
    }
}

impl RunConfig {
    /// 声明的步数，用作按步数组容量
    pub fn num_steps(&self) -> usize {
        self.nsw as usize
    }

    /// 是否为分子动力学计算
    pub fn is_md(&self) -> bool {
        self.ibrion == 0.0
    }
}

/// 按离子步索引的能量与力序列
///
/// 数组以声明的 NSW 容量分配，下标为步号减一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IonicSteps {
    /// 每步时刻：步号，MD 计算时乘以 POTIM
    pub time: Vec<f64>,
    /// % ion-electron TOTEN (eV)
    pub e_ion_electron: Vec<f64>,
    /// 离子动能 EKIN (eV)
    pub e_kinetic: Vec<f64>,
    /// 总能量 ETOTAL (eV)
    pub e_total: Vec<f64>,
    /// 最大单原子力
    pub force_max_atom: Vec<f64>,
    /// 力均方根
    pub force_rms: Vec<f64>,
}

impl IonicSteps {
    pub fn new(num_steps: usize, timestep: Option<f64>) -> Self {
        let time = (1..=num_steps)
            .map(|i| match timestep {
                Some(dt) => i as f64 * dt,
                None => i as f64,
            })
            .collect();
        IonicSteps {
            time,
            e_ion_electron: vec![0.0; num_steps],
            e_kinetic: vec![0.0; num_steps],
            e_total: vec![0.0; num_steps],
            force_max_atom: vec![0.0; num_steps],
            force_rms: vec![0.0; num_steps],
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// 单遍汇总扫描提取的标量
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcarSummary {
    /// 不可约 k 点数
    pub kpoints: Option<usize>,
    /// 平面波数 (NPLWV)
    pub planewaves: Option<usize>,
    /// 最终自由能 TOTEN (eV)
    pub toten: Option<f64>,
    /// 总 CPU 时间 (s)
    pub cpu_time: Option<f64>,
    /// 前两个 k 点间的笛卡尔距离，单 k 点时为 0
    pub kpoint_distance: Option<f64>,
    /// 外压 (kB)
    pub pressure: Option<f64>,
    /// 最终力块中的最大力分量
    pub max_force: Option<f64>,
    /// 最终力块漂移行中的最大漂移分量
    pub max_drift: Option<f64>,
}
