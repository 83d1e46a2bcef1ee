//! 将剂量网格映射到掩膜体素上.

use std::collections::BTreeMap;

use ndarray::ArrayD;
use once_cell::unsync::OnceCell;

use crate::data::{DoseGrid, DoseStats, Geometry, GeometryAttr, Grid, Mask, PlaneWindow};
use crate::dvh::{compute_dvh, Dvh, DvhSpec};
use crate::error::{RtError, RtResult};
use crate::roi::Roi;

/// 剂量映射所接受的占据区域.
#[derive(Debug, Clone, Copy)]
pub enum Occupancy<'a> {
    /// 已经栅格化的感兴趣区域, 使用其缓存的掩膜.
    Roi(&'a Roi),
    /// 直接给定的掩膜.
    Mask(&'a Mask),
}

impl<'a> From<&'a Roi> for Occupancy<'a> {
    #[inline]
    fn from(roi: &'a Roi) -> Self {
        Self::Roi(roi)
    }
}

impl<'a> From<&'a Mask> for Occupancy<'a> {
    #[inline]
    fn from(mask: &'a Mask) -> Self {
        Self::Mask(mask)
    }
}

impl<'a> Occupancy<'a> {
    /// 获取掩膜. 感兴趣区域尚未栅格化时返回 `InvalidParameter`.
    pub fn mask(&self) -> RtResult<&'a Mask> {
        match *self {
            Self::Mask(mask) => Ok(mask),
            Self::Roi(roi) => roi.mask().ok_or_else(|| {
                RtError::invalid(format!("感兴趣区域 `{}` 尚未栅格化", roi.name()))
            }),
        }
    }
}

/// [`compute_dose_mask`] 的结果.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedDose {
    /// 与掩膜坐标系统相同的剂量网格, 未被占据或落在剂量网格之外的体素为 `0`.
    pub data: Grid<f64>,
    /// 落在剂量网格之外的被占据体素比例.
    pub fraction_outside_dosegrid: f64,
}

/// 数组连续下标 `pos` 的双线性插值下标和权重, 上侧下标截断到 `n - 1`.
#[inline]
fn split(pos: f64, n: usize) -> (usize, usize, f64) {
    let lower = (pos.floor().max(0.0) as usize).min(n - 1);
    let upper = (lower + 1).min(n - 1);
    (lower, upper, pos - lower as f64)
}

/// 计算掩膜中每个被占据体素处的剂量.
///
/// 1. 将被占据体素中心转换到剂量网格的连续索引, 落在剂量网格之外的体素只计入比例;
/// 2. 只对被占据体素所在的平面, 在它们覆盖的 `(x, y)` 窗口内插值出剂量平面;
/// 3. 在这些平面上对每个体素做双线性插值.
///
/// 每个掩膜平面只使用该平面第一个体素的 `z` 索引.
///
/// 没有被占据体素时返回 `EmptyVolume`, 全部落在剂量网格之外时返回 `OutOfBounds`.
pub fn compute_dose_mask(dose: &DoseGrid, mask: &Mask) -> RtResult<MappedDose> {
    mask.geometry().check_dim(3)?;
    dose.geometry().check_dim(3)?;

    let offsets = mask.occupied_offsets();
    if offsets.is_empty() {
        return Err(RtError::empty("掩膜中没有被占据的体素"));
    }
    let total = offsets.len();

    let d0: Vec<f64> = dose.start_index().iter().map(|i| *i as f64).collect();
    let mut inside: Vec<(Vec<usize>, [f64; 3])> = Vec::with_capacity(total);
    for offset in offsets {
        let index: Vec<f64> = mask
            .geometry()
            .index_of(&offset)
            .iter()
            .map(|i| *i as f64)
            .collect();
        let point = mask.physical_point(&index)?;
        let (c, ok) = dose.continuous_index(&point)?;
        if ok {
            inside.push((offset, [c[0] - d0[0], c[1] - d0[1], c[2] - d0[2]]));
        }
    }
    if inside.is_empty() {
        return Err(RtError::out_of_bounds("掩膜完全位于剂量网格之外"));
    }
    let fraction_outside_dosegrid = 1.0 - inside.len() as f64 / total as f64;

    let (nx, ny) = (dose.size()[0], dose.size()[1]);
    let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    let mut first_z: BTreeMap<usize, f64> = BTreeMap::new();
    for (offset, c) in &inside {
        for d in 0..2 {
            lo[d] = lo[d].min(c[d]);
            hi[d] = hi[d].max(c[d]);
        }
        first_z.entry(offset[0]).or_insert(c[2]);
    }
    let window = PlaneWindow {
        x: (lo[0].floor().max(0.0) as usize, (hi[0].ceil() as usize).min(nx - 1)),
        y: (lo[1].floor().max(0.0) as usize, (hi[1].ceil() as usize).min(ny - 1)),
    };
    let planes: Vec<f64> = first_z.values().map(|z| z + d0[2]).collect();
    let rows: BTreeMap<usize, usize> = first_z.keys().enumerate().map(|(k, z)| (*z, k)).collect();
    let resliced = dose.interpolate_plane(&planes, Some(&window))?;
    let (w, h) = (window.width(), window.height());

    let mut out = ArrayD::<f64>::zeros(mask.shape());
    for (offset, c) in &inside {
        let k = rows[&offset[0]];
        let (x0, x1, wx) = split(c[0] - window.x.0 as f64, w);
        let (y0, y1, wy) = split(c[1] - window.y.0 as f64, h);
        out[offset.as_slice()] = (1.0 - wx) * (1.0 - wy) * resliced[[k, y0, x0]]
            + wx * (1.0 - wy) * resliced[[k, y0, x1]]
            + (1.0 - wx) * wy * resliced[[k, y1, x0]]
            + wx * wy * resliced[[k, y1, x1]];
    }

    Ok(MappedDose {
        data: Grid::from_array(out, mask.geometry().clone())?,
        fraction_outside_dosegrid,
    })
}

/// 映射到掩膜上的剂量.
///
/// 构造时完成全部计算, 之后不可修改. 默认参数的 DVH 在第一次访问时计算并缓存.
#[derive(Debug, Clone)]
pub struct DoseMask {
    mask: Mask,
    data: Grid<f64>,
    fraction_outside_dosegrid: f64,
    stats: DoseStats,
    dvh: OnceCell<Dvh>,
}

impl GeometryAttr for DoseMask {
    #[inline]
    fn geometry(&self) -> &Geometry {
        self.mask.geometry()
    }
}

impl DoseMask {
    /// 将 `dose` 映射到占据区域上.
    ///
    /// 如果剂量网格的原点尚未修正, 先按掩膜修正 (参见 [`DoseGrid::correct_origin`]).
    /// 部分体素落在剂量网格之外时记录警告.
    ///
    /// # 注意
    ///
    /// 掩膜会被复制一份; 剂量网格只在构造期间被借用.
    pub fn new(occupancy: Occupancy, dose: &mut DoseGrid) -> RtResult<Self> {
        let mask = occupancy.mask()?.clone();
        dose.correct_origin(&mask)?;
        let MappedDose {
            data,
            fraction_outside_dosegrid,
        } = compute_dose_mask(dose, &mask)?;
        if fraction_outside_dosegrid > 0.0 {
            log::warn!(
                "{:.2}% 的掩膜体素位于剂量网格之外",
                fraction_outside_dosegrid * 100.0
            );
        }
        let stats = DoseStats::from_nonzero(data.data().iter().copied());
        Ok(Self {
            mask,
            data,
            fraction_outside_dosegrid,
            stats,
            dvh: OnceCell::new(),
        })
    }

    /// 占据掩膜 (副本).
    #[inline]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// 每个体素的剂量.
    #[inline]
    pub fn data(&self) -> &Grid<f64> {
        &self.data
    }

    /// 落在剂量网格之外的被占据体素比例.
    #[inline]
    pub fn fraction_outside_dosegrid(&self) -> f64 {
        self.fraction_outside_dosegrid
    }

    /// 非零剂量体素的统计量.
    #[inline]
    pub fn stats(&self) -> &DoseStats {
        &self.stats
    }

    /// 非零剂量的最小值.
    #[inline]
    pub fn min_dose(&self) -> f64 {
        self.stats.min
    }

    /// 非零剂量的最大值.
    #[inline]
    pub fn max_dose(&self) -> f64 {
        self.stats.max
    }

    /// 非零剂量的均值.
    #[inline]
    pub fn mean_dose(&self) -> f64 {
        self.stats.mean
    }

    /// 非零剂量的 (总体) 标准差.
    #[inline]
    pub fn std_dose(&self) -> f64 {
        self.stats.std
    }

    /// 默认参数 (200 个分箱, 边缘权重 1, 累积) 的 DVH.
    pub fn dvh(&self) -> RtResult<&Dvh> {
        self.dvh
            .get_or_try_init(|| compute_dvh(self, &DvhSpec::default()))
    }

    /// 按给定参数计算 DVH, 不影响缓存.
    #[inline]
    pub fn compute_dvh(&self, spec: &DvhSpec) -> RtResult<Dvh> {
        compute_dvh(self, spec)
    }

    /// 默认 DVH 的 `[剂量, 体积]` 数据.
    pub fn dvh_data(&self) -> RtResult<Vec<[f64; 2]>> {
        Ok(self.dvh()?.data())
    }

    /// 体积 (比例) 最接近 `v` 的 DVH 点对应的剂量.
    pub fn dose_to_volume(&self, v: f64) -> RtResult<f64> {
        Ok(self.dvh()?.dose_to_volume(v))
    }

    /// 接受剂量 `d` 的体积 (比例). `d` 超过最大剂量时为 `0`.
    pub fn volume_with_dose(&self, d: f64) -> RtResult<f64> {
        if d > self.stats.max {
            return Ok(0.0);
        }
        Ok(self.dvh()?.volume_at_dose(d))
    }
}
