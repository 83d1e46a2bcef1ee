//! 感兴趣区域 (ROI): 按平面组织的闭合轮廓, 以及轮廓到掩膜的栅格化.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::consts::{tolerance::CONTAINS_RADIUS, DEFAULT_MASK_SIZE_XY};
use crate::data::{Geometry, Grid, Mask};
use crate::error::{RtError, RtResult};

mod contour;
mod edge;
mod path;
mod raster;

pub use contour::{Contour, PlaneRecord};
pub use raster::{MaskTemplate, RasterSpec};

use path::PolygonPath;

/// 平面上的点 `(x, y)`.
pub type Point2d = (f64, f64);

/// 感兴趣区域.
///
/// 构造和添加轮廓时会统一轮廓方向: 被偶数个同平面轮廓包含的轮廓 (外轮廓) 为逆时针,
/// 被奇数个包含的轮廓 (内轮廓, 即孔洞) 为顺时针. 同时计算基于多边形的体积.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    name: String,
    contours: Vec<Contour>,
    volume: f64,
    mask: Option<Mask>,
}

impl Roi {
    /// 创建感兴趣区域. 轮廓列表为空时返回 `MalformedContour`.
    pub fn new(name: impl Into<String>, contours: Vec<Contour>) -> RtResult<Self> {
        if contours.is_empty() {
            return Err(RtError::malformed("感兴趣区域至少需要一个轮廓"));
        }
        let mut roi = Self {
            name: name.into(),
            contours,
            volume: 0.0,
            mask: None,
        };
        roi.check_contour_directions();
        Ok(roi)
    }

    /// 由外部平面轮廓记录创建感兴趣区域.
    pub fn from_records(name: impl Into<String>, records: &[PlaneRecord]) -> RtResult<Self> {
        let contours = records
            .iter()
            .map(Contour::from_record)
            .collect::<RtResult<Vec<_>>>()?;
        Self::new(name, contours)
    }

    /// 添加轮廓, 重新统一方向并重新计算体积. 已缓存的掩膜会被丢弃.
    pub fn add_contour(&mut self, contour: Contour) {
        self.contours.push(contour);
        self.mask = None;
        self.check_contour_directions();
    }

    /// 名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 方向统一后的轮廓, 保持添加顺序.
    #[inline]
    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// 基于多边形的体积: 所有 (方向统一后的) 轮廓有向面积之和乘以层厚.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// 升序排列的不重复轮廓平面.
    pub fn planes(&self) -> Vec<f64> {
        let mut planes: Vec<f64> = self.contours.iter().map(Contour::plane).collect();
        planes.sort_by(f64::total_cmp);
        planes.dedup();
        planes
    }

    /// 相邻轮廓平面之间的最小间距. 只有一个平面时为 0.
    pub fn slice_thickness(&self) -> f64 {
        let planes = self.planes();
        planes
            .windows(2)
            .map(|w| w[1] - w[0])
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// 所有轮廓的 `(x, y, z)` 最小值和最大值.
    pub fn extent(&self) -> ([f64; 3], [f64; 3]) {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for c in &self.contours {
            for (d, (l, h)) in c.min().into_iter().zip(c.max()).enumerate() {
                lo[d] = lo[d].min(l);
                hi[d] = hi[d].max(h);
            }
        }
        (lo, hi)
    }

    /// 统一轮廓方向并重新计算体积, 返回新的体积.
    ///
    /// 对每个平面, 用轮廓 `j` 的第一个点判断它被多少个同平面轮廓包含 (容差 `1e-4`, 与方向无关).
    /// 包含次数为偶数的轮廓面积应为正, 奇数应为负; 不满足的轮廓被反转.
    pub fn check_contour_directions(&mut self) -> f64 {
        let thickness = self.slice_thickness();
        let mut groups: BTreeMap<OrderedFloat<f64>, Vec<usize>> = BTreeMap::new();
        for (i, c) in self.contours.iter().enumerate() {
            groups.entry(OrderedFloat(c.plane())).or_default().push(i);
        }

        let mut volume = 0.0;
        for members in groups.values() {
            let depths: Vec<usize> = members
                .iter()
                .map(|&j| {
                    let probe = self.contours[j].points()[0];
                    members
                        .iter()
                        .filter(|&&i| i != j)
                        .filter(|&&i| {
                            PolygonPath::new(self.contours[i].points())
                                .contains_within(probe, CONTAINS_RADIUS)
                        })
                        .count()
                })
                .collect();
            for (&j, depth) in members.iter().zip(depths) {
                let contour = &mut self.contours[j];
                let mut area = contour.area();
                let outer = depth % 2 == 0;
                if (outer && area < 0.0) || (!outer && area > 0.0) {
                    contour.reverse();
                    area = -area;
                }
                volume += area * thickness;
            }
        }
        self.volume = volume;
        volume
    }

    /// 已缓存的掩膜. 参见 [`Roi::rasterize`].
    #[inline]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    /// 设置缓存的掩膜, 例如由游程编码还原的掩膜.
    #[inline]
    pub fn set_mask(&mut self, mask: Mask) {
        self.mask = Some(mask);
    }

    /// 取出缓存的掩膜.
    #[inline]
    pub fn take_mask(&mut self) -> Option<Mask> {
        self.mask.take()
    }

    /// 基于缓存掩膜的体积. 参见 [`Mask::volume`].
    ///
    /// 尚未栅格化时返回 `InvalidParameter`.
    pub fn mask_volume(&self, edge_weight: Option<f64>) -> RtResult<f64> {
        self.mask
            .as_ref()
            .map(|m| m.volume(edge_weight))
            .ok_or_else(|| RtError::invalid(format!("感兴趣区域 `{}` 尚未栅格化", self.name)))
    }

    /// 缓存掩膜的欧氏距离变换. 参见 [`transform::distance_transform`](crate::transform::distance_transform).
    ///
    /// 尚未栅格化时返回 `InvalidParameter`.
    pub fn distance_transform(&self) -> RtResult<Grid<f64>> {
        let mask = self
            .mask
            .as_ref()
            .ok_or_else(|| RtError::invalid(format!("感兴趣区域 `{}` 尚未栅格化", self.name)))?;
        crate::transform::distance_transform(mask)
    }

    /// 根据轮廓范围推导掩膜坐标系统.
    ///
    /// - 同时给定 `size` 和 `spacing`: 保持两者, 平移原点使轮廓位于网格中央;
    /// - 只给定 `spacing`: 尺寸为恰好覆盖轮廓范围所需的体素个数;
    /// - 只给定 `size`: 间距使首尾体素中心落在轮廓范围的两端;
    /// - 都不给定: 尺寸为 `256 × 256 × 平面数`, 间距同上.
    ///
    /// 某个方向只有一个体素或范围为零时, 该方向间距取 1.
    pub fn mask_geometry(
        &self,
        size: Option<[usize; 3]>,
        spacing: Option<[f64; 3]>,
    ) -> RtResult<Geometry> {
        let (lo, hi) = self.extent();
        let fit_spacing = |size: &[usize; 3]| -> [f64; 3] {
            let mut sp = [1.0; 3];
            for d in 0..3 {
                let extent = hi[d] - lo[d];
                if size[d] > 1 && extent > 0.0 {
                    sp[d] = extent / (size[d] - 1) as f64;
                }
            }
            sp
        };
        let (origin, size, spacing) = match (size, spacing) {
            (Some(size), Some(spacing)) => {
                let mut origin = lo;
                for d in 0..3 {
                    let required = ((hi[d] - lo[d]) / spacing[d]).ceil() + 1.0;
                    origin[d] -= 0.5 * (size[d] as f64 - required) * spacing[d];
                }
                (origin, size, spacing)
            }
            (None, Some(spacing)) => {
                let mut size = [0; 3];
                for d in 0..3 {
                    size[d] = ((hi[d] - lo[d]) / spacing[d]).ceil() as usize + 1;
                }
                (lo, size, spacing)
            }
            (Some(size), None) => (lo, size, fit_spacing(&size)),
            (None, None) => {
                let size = [DEFAULT_MASK_SIZE_XY, DEFAULT_MASK_SIZE_XY, self.planes().len()];
                (lo, size, fit_spacing(&size))
            }
        };
        if size.iter().any(|n| *n == 0) {
            return Err(RtError::invalid(format!("掩膜尺寸必须为正: {size:?}")));
        }
        Geometry::new(&origin, &spacing, &size)
    }
}
