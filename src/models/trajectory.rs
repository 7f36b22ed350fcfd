//! # 轨迹数据模型
//!
//! 按离子步索引的时间序列容器。扫描开始前以声明的步数预分配，
//! 扫描结束后用 `update_length` 截断到实际找到的步数
//! （提前终止的计算中实际步数可能小于 INCAR 声明值）。
//!
//! ## 依赖关系
//! - 被 `parsers/vasprun_stream.rs` 增量写入
//! - 被 `commands/trajectory.rs` 使用

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaspexError};
use crate::models::{Mat33, MatX3};

/// 原子轨迹时间序列
///
/// 所有按步索引的数组以 `num_steps` 容量零初始化，写入不允许增长；
/// 越过声明容量写入是 `IndexOutOfRange` 错误。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// 声明的步数上限（来自 INCAR NSW），截断后为实际步数
    pub num_steps: usize,

    /// 每步时间增量 (fs)，非动力学计算为 0
    pub timestep: f64,

    /// 原子种类符号，构造后不可变
    pub atoms: Vec<String>,

    /// 每步晶格矢量 (3x3)
    pub basis: Vec<Mat33>,

    /// 每步原子位置 (Nx3)
    pub positions: Vec<MatX3>,

    /// 每步原子速度 (Nx3)，来源缺失时保持零
    pub velocities: Vec<MatX3>,

    /// 每步离子动能 (eV)
    pub e_kinetic: Vec<f64>,

    /// 每步总能量 (eV)
    pub e_total: Vec<f64>,

    /// `update_length` 只允许调用一次
    finalized: bool,
}

impl Trajectory {
    /// 以声明的步数预分配全部按步数组
    pub fn new(num_steps: usize, timestep: f64, atoms: Vec<String>) -> Self {
        let num_atoms = atoms.len();
        Trajectory {
            num_steps,
            timestep,
            atoms,
            basis: vec![[[0.0; 3]; 3]; num_steps],
            positions: vec![vec![[0.0; 3]; num_atoms]; num_steps],
            velocities: vec![vec![[0.0; 3]; num_atoms]; num_steps],
            e_kinetic: vec![0.0; num_steps],
            e_total: vec![0.0; num_steps],
            finalized: false,
        }
    }

    /// 原子数
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    fn check_step(&self, step: usize) -> Result<()> {
        if step >= self.num_steps {
            return Err(VaspexError::IndexOutOfRange {
                index: step,
                capacity: self.num_steps,
            });
        }
        Ok(())
    }

    /// 写入第 step 步的晶格矢量
    pub fn set_basis(&mut self, step: usize, basis: Mat33) -> Result<()> {
        self.check_step(step)?;
        self.basis[step] = basis;
        Ok(())
    }

    /// 写入第 step 步的原子位置
    pub fn set_positions(&mut self, step: usize, positions: MatX3) -> Result<()> {
        self.check_step(step)?;
        self.positions[step] = positions;
        Ok(())
    }

    /// 写入第 step 步的原子速度
    pub fn set_velocities(&mut self, step: usize, velocities: MatX3) -> Result<()> {
        self.check_step(step)?;
        self.velocities[step] = velocities;
        Ok(())
    }

    /// 写入第 step 步的离子动能
    pub fn set_e_kinetic(&mut self, step: usize, e_kinetic: f64) -> Result<()> {
        self.check_step(step)?;
        self.e_kinetic[step] = e_kinetic;
        Ok(())
    }

    /// 写入第 step 步的总能量
    pub fn set_e_total(&mut self, step: usize, e_total: f64) -> Result<()> {
        self.check_step(step)?;
        self.e_total[step] = e_total;
        Ok(())
    }

    /// 声明实际找到的步数，截断全部按步数组
    ///
    /// 扫描完成后、任何读取之前必须恰好调用一次。声明容量与实际
    /// 步数不一致时以实际步数为准。
    pub fn update_length(&mut self, actual: usize) -> Result<()> {
        if self.finalized {
            return Err(VaspexError::InvalidArgument(
                "update_length called twice".to_string(),
            ));
        }
        if actual > self.num_steps {
            return Err(VaspexError::IndexOutOfRange {
                index: actual,
                capacity: self.num_steps,
            });
        }
        self.basis.truncate(actual);
        self.positions.truncate(actual);
        self.velocities.truncate(actual);
        self.e_kinetic.truncate(actual);
        self.e_total.truncate(actual);
        self.num_steps = actual;
        self.finalized = true;
        Ok(())
    }
}

/// 初始结构快照（首个 structure 元素）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialStructure {
    pub basis: Mat33,
    pub positions: MatX3,
    /// 非动力学计算中为空
    pub velocities: MatX3,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trajectory {
        Trajectory::new(4, 1.5, vec!["Si".to_string(), "O".to_string()])
    }

    #[test]
    fn test_preallocated_capacity() {
        let t = sample();
        assert_eq!(t.basis.len(), 4);
        assert_eq!(t.positions.len(), 4);
        assert_eq!(t.positions[0].len(), 2);
        assert_eq!(t.e_total.len(), 4);
        assert_eq!(t.num_atoms(), 2);
    }

    #[test]
    fn test_set_within_capacity() {
        let mut t = sample();
        t.set_basis(3, [[5.4, 0.0, 0.0], [0.0, 5.4, 0.0], [0.0, 0.0, 5.4]])
            .unwrap();
        t.set_positions(0, vec![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]])
            .unwrap();
        t.set_e_total(2, -10.5).unwrap();
        assert_eq!(t.basis[3][0][0], 5.4);
        assert_eq!(t.positions[0][1][2], 0.6);
        assert_eq!(t.e_total[2], -10.5);
    }

    #[test]
    fn test_set_beyond_capacity_fails() {
        let mut t = sample();
        let basis = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            t.set_basis(4, basis),
            Err(VaspexError::IndexOutOfRange { index: 4, capacity: 4 })
        ));
        assert!(t.set_positions(4, vec![]).is_err());
        assert!(t.set_velocities(10, vec![]).is_err());
        assert!(t.set_e_kinetic(4, 1.0).is_err());
        assert!(t.set_e_total(4, 1.0).is_err());
    }

    #[test]
    fn test_update_length_truncates_all_arrays() {
        let mut t = sample();
        t.set_e_total(1, -3.0).unwrap();
        t.update_length(2).unwrap();
        assert_eq!(t.num_steps, 2);
        assert_eq!(t.basis.len(), 2);
        assert_eq!(t.positions.len(), 2);
        assert_eq!(t.velocities.len(), 2);
        assert_eq!(t.e_kinetic.len(), 2);
        assert_eq!(t.e_total.len(), 2);
        assert_eq!(t.e_total[1], -3.0);
    }

    #[test]
    fn test_update_length_twice_fails() {
        let mut t = sample();
        t.update_length(2).unwrap();
        assert!(t.update_length(1).is_err());
    }

    #[test]
    fn test_update_length_beyond_capacity_fails() {
        let mut t = sample();
        assert!(t.update_length(5).is_err());
    }
}
