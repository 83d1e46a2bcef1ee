#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供放疗计划中轮廓, 占据掩膜和剂量网格的几何模型与基础计算.
//!
//! 该 crate 目前仅提供 `safe` 接口, 所有计算均为单线程同步计算.
//!
//! # 注意
//!
//! 1. 所有几何向量均按照 `x, y[, z]` 顺序给出, 而数据数组按照 `[z, ]y, x` 顺序存储.
//!   "网格索引" 指前者 (可以有非零起始索引), "数组下标" 指后者 (总是从 0 开始).
//! 2. 可恢复的错误通过 [`RtError`] 返回. 仅在内部不变量被破坏时 panic.
//!
//! # 开发计划
//!
//! ### 网格坐标系统 ✅
//!
//! 物理坐标 / 连续网格索引 / 最近整数索引之间的双向转换, 多线性插值,
//! 水平面重切片与网格重采样.
//!
//! 实现位于 `rt-berry/src/data`.
//!
//! ### 占据掩膜 ✅
//!
//! 包围盒, 体积, 6-邻域 (或水平 4-邻域) 边缘体素, 行程编码的持久化形式.
//!
//! 实现位于 `rt-berry/src/data/mask`.
//!
//! ### 轮廓栅格化 ✅
//!
//! 1. 同一平面内轮廓的嵌套关系与方向归一化. ✅
//! 2. 按包围盒栅格化并以异或合并. ✅
//! 3. 边缘体素的分数占据 (边缘加权掩膜). ✅
//!
//! 实现位于 `rt-berry/src/roi`.
//!
//! ### 剂量映射 ✅
//!
//! 将剂量网格双线性插值到掩膜的每一个被占据体素上, 并统计落在剂量网格之外的体素比例.
//!
//! 实现位于 `rt-berry/src/dose_map`.
//!
//! ### 剂量体积直方图 (DVH) ✅
//!
//! 累积 / 微分直方图, 剂量与体积的相互查询, 边缘体素加权.
//!
//! 实现位于 `rt-berry/src/dvh`.
//!
//! ### 掩膜变换 ✅
//!
//! 扩张 / 收缩 / 壳层, 卦限 / 上下 / 等厚切片分割, 组合, 裁剪, 降采样与欧氏距离变换.
//!
//! 实现位于 `rt-berry/src/transform`.
//!
//! ### 完善代码文档 ⌛️
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

pub mod consts;

/// 网格坐标系统, 数据网格, 占据掩膜与剂量网格.
pub mod data;

pub mod dose_map;

pub mod dvh;

pub mod error;

pub mod prelude;

pub mod roi;

pub mod transform;

pub use data::{
    DoseGrid, DoseStats, DoseUnits, Geometry, GeometryAttr, Grid, GridRecord, Mask, PlaneWindow,
};
pub use dose_map::{DoseMask, Occupancy};
pub use dvh::{Dvh, DvhKind, DvhSpec, VolumeUnits};
pub use error::{RtError, RtResult};
pub use roi::{Contour, MaskTemplate, PlaneRecord, RasterSpec, Roi};
