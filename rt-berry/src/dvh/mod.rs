//! 剂量体积直方图 (DVH).
//!
//! 剂量数据有两种形式: 累积形式 (即各分箱的剂量值) 和差分形式 (即分箱宽度).
//! 体积数据同样有两种形式: 累积形式 (接受至少该剂量的体积) 和差分形式 (落在该分箱内的体积).

mod hist;

use either::Either;
use ndarray::Dimension;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::{occupancy, DEFAULT_DVH_BINS};
use crate::data::{DoseUnits, GeometryAttr};
use crate::dose_map::DoseMask;
use crate::error::{RtError, RtResult};

/// 数据形式.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DvhKind {
    /// 累积形式.
    #[default]
    Cumulative,
    /// 差分形式.
    Differential,
}

/// 体积单位.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeUnits {
    /// 绝对体积 (与体素间距的单位一致).
    Absolute,
    /// 相对于总体积的比例.
    Normalized,
}

/// DVH 计算参数.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DvhSpec {
    // 注: `Left(n)` 表示 `n - 1` 个等宽分箱加上一个体积为 0 的尾箱,
    // `Right(edges)` 表示显式给定的分箱边界.
    bins: Either<usize, Vec<f64>>,

    /// 水平面内边缘体素的权重.
    edge_weight: f64,

    /// 输出体积的形式.
    kind: DvhKind,
}

impl Default for DvhSpec {
    fn default() -> Self {
        Self {
            bins: Either::Left(DEFAULT_DVH_BINS),
            edge_weight: 1.0,
            kind: DvhKind::Cumulative,
        }
    }
}

impl DvhSpec {
    /// 构建参数.
    ///
    /// 分箱数小于 2, 分箱边界不合法, 或者 `edge_weight` 为负数或非有限值时返回 `InvalidParameter`.
    pub fn new(bins: Either<usize, Vec<f64>>, edge_weight: f64, kind: DvhKind) -> RtResult<Self> {
        match &bins {
            Either::Left(n) if *n < 2 => {
                return Err(RtError::invalid(format!("分箱数至少为 2, 实际为 {n}")));
            }
            Either::Left(_) => {}
            Either::Right(edges) => hist::check_edges(edges)?,
        }
        if !edge_weight.is_finite() || edge_weight < 0.0 {
            return Err(RtError::invalid(format!("边缘权重必须为非负有限值: {edge_weight}")));
        }
        Ok(Self {
            bins,
            edge_weight,
            kind,
        })
    }

    /// 给定分箱数, 其余为默认值.
    #[inline]
    pub fn with_bins(n: usize) -> RtResult<Self> {
        Self::new(Either::Left(n), 1.0, DvhKind::Cumulative)
    }

    /// 给定分箱边界, 其余为默认值.
    #[inline]
    pub fn with_edges(edges: Vec<f64>) -> RtResult<Self> {
        Self::new(Either::Right(edges), 1.0, DvhKind::Cumulative)
    }

    /// 分箱数或分箱边界.
    #[inline]
    pub fn bins(&self) -> &Either<usize, Vec<f64>> {
        &self.bins
    }

    /// 水平面内边缘体素的权重.
    #[inline]
    pub fn edge_weight(&self) -> f64 {
        self.edge_weight
    }

    /// 输出体积的形式.
    #[inline]
    pub fn kind(&self) -> DvhKind {
        self.kind
    }
}

/// 剂量累积: 分箱宽度 -> 剂量值.
fn cumulate_dose(d: &[f64]) -> Vec<f64> {
    d.iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// 剂量差分: 剂量值 -> 分箱宽度. 第一个值保持不变.
fn differentiate_dose(d: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(d.len());
    out.extend(d.first().copied());
    out.extend(d.windows(2).map(|w| w[1] - w[0]));
    out
}

/// 体积累积: 从高剂量一端向低剂量一端累加.
fn cumulate_volume(v: &[f64]) -> Vec<f64> {
    let mut out = v.to_vec();
    for i in (0..out.len().saturating_sub(1)).rev() {
        out[i] += out[i + 1];
    }
    out
}

/// 体积差分. 最后一个值保持不变.
fn differentiate_volume(v: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = v.windows(2).map(|w| w[0] - w[1]).collect();
    out.extend(v.last().copied());
    out
}

/// 第一个与 `target` 距离最小的元素下标.
fn nearest(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if (v - target).abs() < (values[best] - target).abs() {
            best = i;
        }
    }
    best
}

/// 剂量体积直方图.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Dvh {
    dose: Vec<f64>,
    volume: Vec<f64>,
    dose_kind: DvhKind,
    volume_kind: DvhKind,
    dose_units: Option<DoseUnits>,
    volume_units: VolumeUnits,
    total_volume: f64,
}

impl Dvh {
    /// 由 `[剂量, 体积]` 数据点创建 DVH.
    ///
    /// 剂量单位按最大剂量推断 (参见 [`DoseUnits::infer`]); 最大体积为 `1` 时体积视为比例,
    /// 否则视为绝对体积, 并以最大体积作为总体积.
    ///
    /// 没有数据点时返回 `InvalidParameter`.
    pub fn from_pairs(pairs: &[[f64; 2]], dose_kind: DvhKind, volume_kind: DvhKind) -> RtResult<Self> {
        if pairs.is_empty() {
            return Err(RtError::invalid("DVH 至少需要一个数据点"));
        }
        let dose: Vec<f64> = pairs.iter().map(|p| p[0]).collect();
        let volume: Vec<f64> = pairs.iter().map(|p| p[1]).collect();
        let max_dose = dose.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let total_volume = volume.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let volume_units = if total_volume == 1.0 {
            VolumeUnits::Normalized
        } else {
            VolumeUnits::Absolute
        };
        Ok(Self {
            dose,
            volume,
            dose_kind,
            volume_kind,
            dose_units: Some(DoseUnits::infer(max_dose)),
            volume_units,
            total_volume,
        })
    }

    /// 数据点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.dose.len()
    }

    /// 是否没有数据点?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dose.is_empty()
    }

    /// 按当前形式保存的剂量数据.
    #[inline]
    pub fn doses(&self) -> &[f64] {
        &self.dose
    }

    /// 按当前形式保存的体积数据.
    #[inline]
    pub fn volumes(&self) -> &[f64] {
        &self.volume
    }

    /// 按当前形式保存的 `[剂量, 体积]` 数据.
    pub fn data(&self) -> Vec<[f64; 2]> {
        self.dose
            .iter()
            .zip(&self.volume)
            .map(|(d, v)| [*d, *v])
            .collect()
    }

    /// 剂量数据的形式.
    #[inline]
    pub fn dose_kind(&self) -> DvhKind {
        self.dose_kind
    }

    /// 体积数据的形式.
    #[inline]
    pub fn volume_kind(&self) -> DvhKind {
        self.volume_kind
    }

    /// 剂量单位.
    #[inline]
    pub fn dose_units(&self) -> Option<DoseUnits> {
        self.dose_units
    }

    /// 设置剂量单位.
    #[inline]
    pub fn set_dose_units(&mut self, units: DoseUnits) {
        self.dose_units = Some(units);
    }

    /// 体积单位.
    #[inline]
    pub fn volume_units(&self) -> VolumeUnits {
        self.volume_units
    }

    /// 总体积 (绝对单位, 或从数据点推断).
    #[inline]
    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    /// 以 `kind` 形式返回剂量数据.
    ///
    /// `normalized` 为 `true` 时除以最大值, 最大值为 `0` 时返回 `InvalidParameter`.
    pub fn dose(&self, kind: DvhKind, normalized: bool) -> RtResult<Vec<f64>> {
        let mut d = match (self.dose_kind, kind) {
            (DvhKind::Differential, DvhKind::Cumulative) => cumulate_dose(&self.dose),
            (DvhKind::Cumulative, DvhKind::Differential) => differentiate_dose(&self.dose),
            _ => self.dose.clone(),
        };
        if normalized {
            let max = d.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max == 0.0 {
                return Err(RtError::invalid("最大剂量为 0, 无法归一化"));
            }
            d.iter_mut().for_each(|v| *v /= max);
        }
        Ok(d)
    }

    /// 以 `kind` 形式返回体积数据.
    ///
    /// `normalized` 为 `true` 时除以最大值; 最大值为 `0` 时记录警告并返回未归一化的数据.
    pub fn volume(&self, kind: DvhKind, normalized: bool) -> Vec<f64> {
        let mut v = match (self.volume_kind, kind) {
            (DvhKind::Differential, DvhKind::Cumulative) => cumulate_volume(&self.volume),
            (DvhKind::Cumulative, DvhKind::Differential) => differentiate_volume(&self.volume),
            _ => self.volume.clone(),
        };
        if normalized {
            let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max == 0.0 {
                log::warn!("最大体积为 0, 未进行归一化");
                return v;
            }
            v.iter_mut().for_each(|x| *x /= max);
        }
        v
    }

    /// 将数据转换为给定形式.
    pub fn convert(&mut self, dose_kind: DvhKind, volume_kind: DvhKind) {
        if let Ok(d) = self.dose(dose_kind, false) {
            self.dose = d;
        }
        self.volume = self.volume(volume_kind, false);
        self.dose_kind = dose_kind;
        self.volume_kind = volume_kind;
    }

    /// 差分 DVH: `(剂量值, 分箱体积)`.
    pub fn differential_dvh(&self) -> Vec<(f64, f64)> {
        let dose = match self.dose_kind {
            DvhKind::Cumulative => self.dose.clone(),
            DvhKind::Differential => cumulate_dose(&self.dose),
        };
        let volume = self.volume(DvhKind::Differential, false);
        dose.into_iter().zip(volume).collect()
    }

    /// 由差分 DVH 估计平均剂量. 总体积为 `0` 时返回 `0`.
    pub fn estimate_mean(&self) -> f64 {
        let (weighted, total) = self
            .differential_dvh()
            .into_iter()
            .fold((0.0, 0.0), |(s, t), (d, v)| (s + d * v, t + v));
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }

    /// 体积最接近 `v` 的第一个数据点的剂量.
    pub fn dose_to_volume(&self, v: f64) -> f64 {
        self.dose[nearest(&self.volume, v)]
    }

    /// 剂量最接近 `d` 的第一个数据点的体积.
    pub fn volume_at_dose(&self, d: f64) -> f64 {
        self.volume[nearest(&self.dose, d)]
    }
}

/// 由映射到掩膜上的剂量计算 DVH.
///
/// 样本为所有非零剂量体素, 权重为掩膜在该体素的占据值; 如果该体素是掩膜水平面内的边缘体素,
/// 权重再乘以 `edge_weight`. 体积为权重之和乘以体素体积.
///
/// 给定分箱数 `n` 时, 在 `[最小剂量, 最大剂量]` 上等宽分成 `n - 1` 个箱, 剂量取所有 `n` 个边界,
/// 最后一个数据点的体积为 `0`. 给定分箱边界时, 剂量取各箱的左边界.
///
/// 累积形式的体积按第一个值归一化.
pub fn compute_dvh(dose_mask: &DoseMask, spec: &DvhSpec) -> RtResult<Dvh> {
    let mask = dose_mask.mask();
    let occ = mask.data();
    let edges = if spec.edge_weight != 1.0 {
        Some(mask.edge_voxels(true))
    } else {
        None
    };

    let samples: Vec<(f64, f64)> = dose_mask
        .data()
        .data()
        .indexed_iter()
        .filter(|(_, d)| **d != 0.0)
        .map(|(idx, d)| {
            let mut w = occ[idx.slice()];
            if let Some(edges) = &edges {
                if occupancy::is_on(edges.data()[idx.slice()]) {
                    w *= spec.edge_weight;
                }
            }
            (*d, w)
        })
        .collect();
    let vv = dose_mask.voxel_volume();

    let (dose, mut volume) = match &spec.bins {
        Either::Left(n) => {
            let h = hist::uniform(&samples, n - 1);
            let mut counts = h.counts;
            counts.push(0.0);
            (h.edges, counts)
        }
        Either::Right(edges) => {
            let h = hist::with_edges(&samples, edges)?;
            let n = h.counts.len();
            (h.edges[..n].to_vec(), h.counts)
        }
    };
    volume.iter_mut().for_each(|v| *v *= vv);
    let total_volume: f64 = volume.iter().sum();
    log::debug!(
        "DVH: {} 个样本, {} 个数据点, 总体积 {total_volume}",
        samples.len(),
        dose.len()
    );

    let volume_units = match spec.kind {
        DvhKind::Cumulative => {
            volume = cumulate_volume(&volume);
            let v0 = volume[0];
            if v0 > 0.0 {
                volume.iter_mut().for_each(|v| *v /= v0);
                VolumeUnits::Normalized
            } else {
                log::warn!("DVH 总体积为 0, 未进行归一化");
                VolumeUnits::Absolute
            }
        }
        DvhKind::Differential => VolumeUnits::Absolute,
    };

    let max_dose = dose.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Dvh {
        dose,
        volume,
        dose_kind: DvhKind::Cumulative,
        volume_kind: spec.kind,
        dose_units: Some(DoseUnits::infer(max_dose)),
        volume_units,
        total_volume,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array3;

    use super::*;
    use crate::data::{DoseGrid, Geometry, Grid, Mask};
    use crate::dose_map::Occupancy;

    fn init_logger() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    }

    /// 4 × 4 × 2 的掩膜, 剂量值为 `x + 1`, 体素体积 2.
    fn ramp_dose_mask() -> DoseMask {
        let g = Geometry::new(&[0.0; 3], &[1.0, 1.0, 2.0], &[4, 4, 2]).unwrap();
        let dose = Array3::from_shape_fn((2, 4, 4), |(_, _, x)| (x + 1) as f32);
        let mut dose = DoseGrid::new(Grid::from_array(dose.into_dyn(), g.clone()).unwrap(), 1.0).unwrap();
        let mask = Mask::from_array(Array3::<f64>::ones((2, 4, 4)).into_dyn(), g).unwrap();
        DoseMask::new(Occupancy::from(&mask), &mut dose).unwrap()
    }

    #[test]
    fn test_dvh_spec_validation() {
        assert!(DvhSpec::with_bins(2).is_ok());
        assert!(matches!(DvhSpec::with_bins(1), Err(RtError::InvalidParameter(_))));
        assert!(matches!(
            DvhSpec::with_edges(vec![1.0, 1.0]),
            Err(RtError::InvalidParameter(_))
        ));
        assert!(matches!(
            DvhSpec::new(Either::Left(10), -1.0, DvhKind::Cumulative),
            Err(RtError::InvalidParameter(_))
        ));
        let spec = DvhSpec::default();
        assert_eq!(spec.bins(), &Either::Left(200));
        assert_eq!(spec.edge_weight(), 1.0);
        assert_eq!(spec.kind(), DvhKind::Cumulative);
    }

    #[test]
    fn test_compute_cumulative_dvh() {
        init_logger();
        let dm = ramp_dose_mask();
        let dvh = compute_dvh(&dm, &DvhSpec::with_bins(5).unwrap()).unwrap();
        // 4 个等宽分箱 [1, 1.75, 2.5, 3.25, 4] 加上尾箱.
        assert_eq!(dvh.len(), 5);
        assert_relative_eq!(dvh.doses()[1], 1.75);
        assert_eq!(dvh.volumes(), &[1.0, 0.75, 0.5, 0.25, 0.0]);
        assert_eq!(dvh.volume_units(), VolumeUnits::Normalized);
        assert_relative_eq!(dvh.total_volume(), 64.0);
        assert!(dvh.volumes().windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_compute_differential_dvh_with_edges() {
        let dm = ramp_dose_mask();
        let spec = DvhSpec::new(Either::Right(vec![0.0, 2.0, 4.0]), 1.0, DvhKind::Differential).unwrap();
        let dvh = compute_dvh(&dm, &spec).unwrap();
        assert_eq!(dvh.doses(), &[0.0, 2.0]);
        // 剂量 1 落在第一个箱, 剂量 2, 3, 4 落在第二个箱 (最后一个箱为闭区间).
        assert_eq!(dvh.volumes(), &[16.0, 48.0]);
        assert_eq!(dvh.volume_units(), VolumeUnits::Absolute);
    }

    #[test]
    fn test_compute_dvh_edge_weight() {
        // 6 × 6 平面中央的 4 × 4 方块: 12 个边缘体素, 4 个内部体素.
        let g = Geometry::new(&[0.0; 3], &[1.0; 3], &[6, 6, 1]).unwrap();
        let indices = (1..5i64).flat_map(|x| (1..5i64).map(move |y| [x, y, 0]));
        let mask = Mask::from_indices(g.clone(), indices).unwrap();
        let mut dose = DoseGrid::new(Grid::filled(g, 5.0f32), 1.0).unwrap();
        let dm = DoseMask::new(Occupancy::from(&mask), &mut dose).unwrap();

        let spec = DvhSpec::new(Either::Left(5), 0.5, DvhKind::Differential).unwrap();
        let dvh = compute_dvh(&dm, &spec).unwrap();
        assert_relative_eq!(dvh.total_volume(), 12.0 * 0.5 + 4.0);
        let unweighted = compute_dvh(&dm, &DvhSpec::new(Either::Left(5), 1.0, DvhKind::Differential).unwrap()).unwrap();
        assert_relative_eq!(unweighted.total_volume(), 16.0);
    }

    #[test]
    fn test_dvh_conversions() {
        let dvh = Dvh::from_pairs(
            &[[0.0, 1.0], [1.0, 0.5], [2.0, 0.25], [3.0, 0.0]],
            DvhKind::Cumulative,
            DvhKind::Cumulative,
        )
        .unwrap();
        assert_eq!(dvh.volume_units(), VolumeUnits::Normalized);
        assert_eq!(dvh.dose_units(), Some(DoseUnits::Gy));
        assert_eq!(dvh.dose(DvhKind::Differential, false).unwrap(), vec![0.0, 1.0, 1.0, 1.0]);
        assert_eq!(dvh.volume(DvhKind::Differential, false), vec![0.5, 0.25, 0.25, 0.0]);
        assert_eq!(dvh.dose(DvhKind::Cumulative, true).unwrap(), vec![0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0]);

        let mut diff = dvh.clone();
        diff.convert(DvhKind::Differential, DvhKind::Differential);
        assert_eq!(diff.dose(DvhKind::Cumulative, false).unwrap(), dvh.doses());
        assert_eq!(diff.volume(DvhKind::Cumulative, false), dvh.volumes());
        assert_eq!(diff.differential_dvh(), dvh.differential_dvh());

        // (0 * 0.5 + 1 * 0.25 + 2 * 0.25) / 1
        assert_relative_eq!(dvh.estimate_mean(), 0.75);
        assert_eq!(dvh.dose_to_volume(0.3), 2.0);
        assert_eq!(dvh.volume_at_dose(1.2), 0.5);
    }

    #[test]
    fn test_dvh_normalization_errors() {
        let zero = Dvh::from_pairs(&[[0.0, 0.0], [0.0, 0.0]], DvhKind::Cumulative, DvhKind::Cumulative).unwrap();
        assert!(matches!(
            zero.dose(DvhKind::Cumulative, true),
            Err(RtError::InvalidParameter(_))
        ));
        assert_eq!(zero.volume(DvhKind::Cumulative, true), vec![0.0, 0.0]);
        assert!(matches!(
            Dvh::from_pairs(&[], DvhKind::Cumulative, DvhKind::Cumulative),
            Err(RtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_dvh_fractional_occupancy() {
        // 分数占据的体素只贡献部分体积.
        let g = Geometry::new(&[0.0; 3], &[1.0; 3], &[2, 1, 1]).unwrap();
        let mask_data = Array3::from_shape_vec((1, 1, 2), vec![1.0, 0.25]).unwrap();
        let mask = Mask::from_array(mask_data.into_dyn(), g.clone()).unwrap();
        let mut dose = DoseGrid::new(Grid::filled(g, 10.0f32), 1.0).unwrap();
        let dm = DoseMask::new(Occupancy::from(&mask), &mut dose).unwrap();
        let spec = DvhSpec::new(Either::Left(3), 1.0, DvhKind::Differential).unwrap();
        let dvh = compute_dvh(&dm, &spec).unwrap();
        assert_relative_eq!(dvh.total_volume(), 1.25);
    }
}
