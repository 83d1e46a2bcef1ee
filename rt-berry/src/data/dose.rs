//! 剂量网格.

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array3, ArrayD};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Geometry, GeometryAttr, Grid, GridRecord, PlaneWindow};
use crate::error::{RtError, RtResult};

/// 剂量单位.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoseUnits {
    /// 戈瑞.
    Gy,
    /// 厘戈瑞.
    CGy,
    /// 归一化剂量, 最大值为 1.
    Normalized,
}

impl DoseUnits {
    /// 根据最大剂量推断单位: 恰好为 1 视为归一化, 超过 1000 视为 cGy, 其余视为 Gy.
    pub fn infer(max_dose: f64) -> Self {
        if max_dose == 1.0 {
            Self::Normalized
        } else if max_dose > 1000.0 {
            Self::CGy
        } else {
            Self::Gy
        }
    }
}

/// 非零剂量的统计量.
///
/// 零剂量视为 "解剖结构之外", 不参与统计. 没有非零值时所有统计量均为 0.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DoseStats {
    /// 最小值.
    pub min: f64,
    /// 最大值.
    pub max: f64,
    /// 均值.
    pub mean: f64,
    /// 总体标准差.
    pub std: f64,
}

impl DoseStats {
    /// 统计 `values` 中的非零值.
    pub fn from_nonzero<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let values: Vec<f64> = values.into_iter().filter(|v| *v != 0.0).collect();
        let (min, max) = match values.iter().minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::NoElements => return Self::default(),
            MinMaxResult::OneElement(v) => (*v, *v),
            MinMaxResult::MinMax(lo, hi) => (*lo, *hi),
        };
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            min,
            max,
            mean,
            std: var.sqrt(),
        }
    }
}

/// 带缩放因子的剂量网格.
///
/// 原始值以 `f32` 保存, 所有读取操作都返回乘以 `scale` 之后的剂量.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseGrid {
    grid: Grid<f32>,
    scale: f64,
    units: Option<DoseUnits>,
    origin_modified: bool,
    stats: DoseStats,
}

impl GeometryAttr for DoseGrid {
    #[inline]
    fn geometry(&self) -> &Geometry {
        self.grid.geometry()
    }
}

impl DoseGrid {
    /// 由原始剂量网格和缩放因子创建剂量网格.
    ///
    /// 缩放因子不是有限值时返回 `InvalidParameter`.
    pub fn new(grid: Grid<f32>, scale: f64) -> RtResult<Self> {
        if !scale.is_finite() {
            return Err(RtError::invalid(format!("剂量缩放因子必须为有限值: {scale}")));
        }
        let stats = DoseStats::from_nonzero(grid.data().iter().map(|v| *v as f64 * scale));
        Ok(Self {
            grid,
            scale,
            units: None,
            origin_modified: false,
            stats,
        })
    }

    /// 由几何记录和按 `(z, y, x)` 顺序排列的剂量缓冲区创建剂量网格.
    ///
    /// 缓冲区长度与体素个数不一致时返回 `GeometryMismatch`.
    pub fn from_record(record: &GridRecord, buffer: Vec<f32>, scale: f64) -> RtResult<Self> {
        let geometry = Geometry::from_record(record)?;
        Self::new(Grid::from_shape_vec(geometry, buffer)?, scale)
    }

    /// 由小端序 `f32` 字节缓冲区创建剂量网格.
    pub fn from_le_bytes(record: &GridRecord, bytes: &[u8], scale: f64) -> RtResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(RtError::mismatch(format!(
                "字节数 {} 不是 4 的整数倍",
                bytes.len()
            )));
        }
        let buffer = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_record(record, buffer, scale)
    }

    /// 获取原始 (未缩放) 网格.
    #[inline]
    pub fn grid(&self) -> &Grid<f32> {
        &self.grid
    }

    /// 缩放因子.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// 剂量单位. 未设置时为 `None`.
    #[inline]
    pub fn units(&self) -> Option<DoseUnits> {
        self.units
    }

    /// 设置剂量单位.
    #[inline]
    pub fn set_units(&mut self, units: DoseUnits) {
        self.units = Some(units);
    }

    /// 非零剂量统计量.
    #[inline]
    pub fn stats(&self) -> &DoseStats {
        &self.stats
    }

    /// 非零剂量的最小值.
    #[inline]
    pub fn min(&self) -> f64 {
        self.stats.min
    }

    /// 非零剂量的最大值.
    #[inline]
    pub fn max(&self) -> f64 {
        self.stats.max
    }

    /// 非零剂量的均值.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.stats.mean
    }

    /// 非零剂量的 (总体) 标准差.
    #[inline]
    pub fn std(&self) -> f64 {
        self.stats.std
    }

    /// 缩放后的剂量数组.
    pub fn scaled_data(&self) -> ArrayD<f64> {
        let scale = self.scale;
        self.grid.data().mapv(|v| v as f64 * scale)
    }

    /// 网格索引处的剂量. 越界时返回 `OutOfBounds`.
    #[inline]
    pub fn value_at(&self, index: &[i64]) -> RtResult<f64> {
        Ok(self.grid.pixel(index)? as f64 * self.scale)
    }

    /// 一组网格索引处的剂量.
    pub fn values_at<I, P>(&self, indices: I) -> RtResult<Vec<f64>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[i64]>,
    {
        indices
            .into_iter()
            .map(|idx| self.value_at(idx.as_ref()))
            .collect()
    }

    /// 在连续网格索引处做多线性插值. 参见 [`Grid::interpolate_voxel`].
    #[inline]
    pub fn interpolate_voxel(&self, cidx: &[f64]) -> RtResult<f64> {
        Ok(self.grid.interpolate_voxel(cidx)? * self.scale)
    }

    /// 在若干连续 `z` 索引处插值出水平平面. 参见 [`Grid::interpolate_plane`].
    pub fn interpolate_plane(
        &self,
        planes: &[f64],
        window: Option<&PlaneWindow>,
    ) -> RtResult<Array3<f64>> {
        let scale = self.scale;
        let mut out = self.grid.interpolate_plane(planes, window)?;
        out.mapv_inplace(|v| v * scale);
        Ok(out)
    }

    /// 原点是否已经修正过?
    #[inline]
    pub fn origin_modified(&self) -> bool {
        self.origin_modified
    }

    /// 将剂量网格标记为已修正, 之后 [`DoseGrid::correct_origin`] 不再生效.
    ///
    /// 适用于剂量与轮廓来自同一坐标约定的数据.
    #[inline]
    pub fn mark_origin_corrected(&mut self) {
        self.origin_modified = true;
    }

    /// 按照掩膜的坐标系统修正剂量网格在 `y` 方向上的原点. 每个剂量网格只修正一次.
    ///
    /// 剂量数据的 `y` 方向与轮廓数据相反, 新原点为
    /// `(m.oy + m.ny * m.sy) - (d.oy - m.oy) - d.ny * d.sy`.
    ///
    /// 返回本次调用是否实际修改了原点. 维度不一致时返回 `GeometryMismatch`.
    pub fn correct_origin<G: GeometryAttr + ?Sized>(&mut self, mask: &G) -> RtResult<bool> {
        if mask.dimension() != self.dimension() {
            return Err(RtError::mismatch(format!(
                "掩膜维度 {} 与剂量网格维度 {} 不一致",
                mask.dimension(),
                self.dimension()
            )));
        }
        if self.origin_modified {
            return Ok(false);
        }
        let (m_o, m_n, m_s) = (mask.origin()[1], mask.size()[1] as f64, mask.spacing()[1]);
        let (d_o, d_n, d_s) = (self.origin()[1], self.size()[1] as f64, self.spacing()[1]);
        let new_y = (m_o + m_n * m_s) - (d_o - m_o) - d_n * d_s;
        log::debug!("修正剂量网格 y 原点: {d_o} -> {new_y}");

        let mut origin = self.origin().to_vec();
        origin[1] = new_y;
        self.grid.set_origin(&origin)?;
        self.origin_modified = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn record() -> GridRecord {
        GridRecord {
            origin: [0.0, 0.0, 0.0],
            spacing: [1.0, 1.0, 1.0],
            size: [2, 2, 2],
        }
    }

    #[test]
    fn test_dose_stats_nonzero_only() {
        let stats = DoseStats::from_nonzero([0.0, 2.0, 0.0, 4.0]);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.std, 1.0);
        assert_eq!(DoseStats::from_nonzero([0.0; 3]), DoseStats::default());
    }

    #[test]
    fn test_dose_grid_scaled_access() {
        let buf = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let dose = DoseGrid::from_record(&record(), buf, 0.5).unwrap();
        assert_relative_eq!(dose.value_at(&[1, 1, 1]).unwrap(), 3.5);
        assert_relative_eq!(dose.interpolate_voxel(&[0.5, 0.5, 0.5]).unwrap(), 1.75);
        assert_relative_eq!(dose.min(), 0.5);
        assert_relative_eq!(dose.max(), 3.5);
        assert_relative_eq!(dose.mean(), 2.0);
        assert_eq!(
            dose.values_at([[0i64, 0, 0], [1, 0, 0]]).unwrap(),
            vec![0.0, 0.5]
        );
        let planes = dose.interpolate_plane(&[1.0], None).unwrap();
        assert_relative_eq!(planes[[0, 1, 0]], 3.0);
        assert_relative_eq!(dose.scaled_data()[[1, 1, 1]], 3.5);
    }

    #[test]
    fn test_dose_grid_invalid_input() {
        assert!(matches!(
            DoseGrid::from_record(&record(), vec![0.0; 7], 1.0),
            Err(RtError::GeometryMismatch(_))
        ));
        assert!(matches!(
            DoseGrid::from_record(&record(), vec![0.0; 8], f64::NAN),
            Err(RtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_dose_grid_from_le_bytes() {
        let bytes: Vec<u8> = (0..8).flat_map(|v| (v as f32).to_le_bytes()).collect();
        let dose = DoseGrid::from_le_bytes(&record(), &bytes, 1.0).unwrap();
        assert_eq!(dose.value_at(&[1, 0, 1]).unwrap(), 5.0);
        assert!(DoseGrid::from_le_bytes(&record(), &bytes[1..], 1.0).is_err());
    }

    #[test]
    fn test_correct_origin_once() {
        let mut dose = DoseGrid::new(
            Grid::zeros(Geometry::new(&[0.0, 10.0, 0.0], &[1.0, 2.0, 1.0], &[4, 5, 4]).unwrap()),
            1.0,
        )
        .unwrap();
        let mask = Geometry::new(&[0.0, 4.0, 0.0], &[1.0, 1.0, 1.0], &[4, 20, 4]).unwrap();
        assert!(dose.correct_origin(&mask).unwrap());
        // (4 + 20) - (10 - 4) - 5 * 2 = 8
        assert_eq!(dose.origin(), &[0.0, 8.0, 0.0]);
        assert_eq!(dose.end(), &[3.0, 16.0, 3.0]);
        assert!(dose.origin_modified());
        assert!(!dose.correct_origin(&mask).unwrap());
        assert_eq!(dose.origin(), &[0.0, 8.0, 0.0]);
    }

    #[test]
    fn test_mark_origin_corrected() {
        let mut dose = DoseGrid::from_record(&record(), vec![0.0; 8], 1.0).unwrap();
        dose.mark_origin_corrected();
        let mask = Geometry::unit(&[3, 3, 3]).unwrap();
        assert!(!dose.correct_origin(&mask).unwrap());
        assert_eq!(dose.origin(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_infer_units() {
        assert_eq!(DoseUnits::infer(1.0), DoseUnits::Normalized);
        assert_eq!(DoseUnits::infer(6000.0), DoseUnits::CGy);
        assert_eq!(DoseUnits::infer(60.0), DoseUnits::Gy);
    }
}
