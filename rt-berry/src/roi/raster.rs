use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::path::PolygonPath;
use super::{Point2d, Roi};
use crate::consts::tolerance::CONTAINS_RADIUS;
use crate::data::{Geometry, GeometryAttr, Mask};
use crate::error::{RtError, RtResult};

/// 栅格化参数.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSpec {
    radius: f64,
    map_points_to_voxels: bool,
}

impl Default for RasterSpec {
    fn default() -> Self {
        Self {
            radius: CONTAINS_RADIUS,
            map_points_to_voxels: false,
        }
    }
}

impl RasterSpec {
    /// 创建栅格化参数.
    ///
    /// `radius` 是点包含判定的扩张半径: 正值使外轮廓扩张, 孔洞收缩, 从而纳入部分被覆盖的体素.
    /// `map_points_to_voxels` 为 `true` 时, 轮廓顶点先被吸附到最近的体素中心.
    ///
    /// `radius` 不是有限值时返回 `InvalidParameter`.
    pub fn new(radius: f64, map_points_to_voxels: bool) -> RtResult<Self> {
        if !radius.is_finite() {
            return Err(RtError::invalid(format!("扩张半径必须为有限值: {radius}")));
        }
        Ok(Self {
            radius,
            map_points_to_voxels,
        })
    }

    /// 点包含判定的扩张半径.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// 是否将轮廓顶点吸附到最近的体素中心?
    #[inline]
    pub fn map_points_to_voxels(&self) -> bool {
        self.map_points_to_voxels
    }
}

/// 掩膜坐标系统的来源.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskTemplate<'a> {
    /// 使用给定的 3D 坐标系统.
    Geometry(&'a Geometry),
    /// 根据轮廓范围推导坐标系统, 参见 [`Roi::mask_geometry`].
    Fit {
        /// 各方向体素个数 (`x, y, z`).
        size: Option<[usize; 3]>,

        /// 体素间距 (`x, y, z`).
        spacing: Option<[f64; 3]>,
    },
}

impl Default for MaskTemplate<'_> {
    fn default() -> Self {
        Self::Fit {
            size: None,
            spacing: None,
        }
    }
}

impl<'a> From<&'a Geometry> for MaskTemplate<'a> {
    #[inline]
    fn from(g: &'a Geometry) -> Self {
        Self::Geometry(g)
    }
}

impl MaskTemplate<'_> {
    fn resolve(&self, roi: &Roi) -> RtResult<Geometry> {
        match self {
            Self::Geometry(g) => Ok((*g).clone()),
            Self::Fit { size, spacing } => roi.mask_geometry(*size, *spacing),
        }
    }
}

/// 闭区间 `[a, b]` (顺序任意) 与 `[0, n - 1]` 的交集.
fn clip_range(a: i64, b: i64, n: usize) -> Option<(usize, usize)> {
    let lo = a.min(b).max(0);
    let hi = a.max(b).min(n as i64 - 1);
    (lo <= hi).then_some((lo as usize, hi as usize))
}

impl Roi {
    /// 将轮廓栅格化为二值掩膜, 不修改缓存.
    ///
    /// 对每个轮廓, 在其包围盒 (裁剪到网格之内) 中枚举体素中心, 用带半径的点包含判定求出被覆盖的体素,
    /// 再以异或方式写入对应的水平切片. 由于孔洞轮廓的覆盖区域恰好被异或掉一次,
    /// 结果与轮廓的处理顺序无关.
    ///
    /// 平面落在网格之外的轮廓会被跳过并记录警告. 坐标系统不是 3D 时返回 `GeometryMismatch`.
    pub fn to_mask(&self, template: &MaskTemplate, spec: &RasterSpec) -> RtResult<Mask> {
        let geometry = template.resolve(self)?;
        geometry.check_dim(3)?;
        let [nx, ny, nz] = [geometry.size()[0], geometry.size()[1], geometry.size()[2]];
        let origin = geometry.origin();
        let spacing = geometry.spacing();
        let index0 = geometry.start_index();

        let mut data = Array3::from_elem((nz, ny, nx), false);
        for contour in &self.contours {
            let slice = ((contour.plane() - origin[2]) / spacing[2]).round_ties_even();
            if slice < 0.0 || slice >= nz as f64 {
                log::warn!(
                    "感兴趣区域 `{}` 的轮廓平面 z = {} 不在掩膜网格之内, 已跳过",
                    self.name,
                    contour.plane()
                );
                continue;
            }
            let slice = slice as usize;

            let (lo, _) = geometry.nearest_index(&contour.min())?;
            let (hi, _) = geometry.nearest_index(&contour.max())?;
            let xs = clip_range(lo[0] - index0[0], hi[0] - index0[0], nx);
            let ys = clip_range(lo[1] - index0[1], hi[1] - index0[1], ny);
            let (Some((x0, x1)), Some((y0, y1))) = (xs, ys) else {
                continue;
            };

            let snapped: Vec<Point2d>;
            let points = if spec.map_points_to_voxels {
                snapped = snap_to_voxels(contour.points(), contour.plane(), &geometry)?;
                snapped.as_slice()
            } else {
                contour.points()
            };
            let path = PolygonPath::new(points);

            for y in y0..=y1 {
                let py = origin[1] + y as f64 * spacing[1];
                for x in x0..=x1 {
                    let px = origin[0] + x as f64 * spacing[0];
                    if path.contains((px, py), spec.radius) {
                        let v = &mut data[[slice, y, x]];
                        *v = !*v;
                    }
                }
            }
        }
        Mask::from_bool_array(data.into_dyn(), geometry)
    }

    /// 栅格化并缓存掩膜, 返回缓存的掩膜.
    ///
    /// 如果已经缓存了掩膜, 则直接返回, 忽略 `template` 和 `spec`.
    pub fn rasterize(&mut self, template: &MaskTemplate, spec: &RasterSpec) -> RtResult<&Mask> {
        let mask = match self.mask.take() {
            Some(mask) => mask,
            None => self.to_mask(template, spec)?,
        };
        let mask: &Mask = self.mask.insert(mask);
        Ok(mask)
    }
}

/// 将轮廓顶点吸附到最近的体素中心.
fn snap_to_voxels(points: &[Point2d], plane: f64, geometry: &Geometry) -> RtResult<Vec<Point2d>> {
    points
        .iter()
        .map(|&(x, y)| {
            let (idx, _) = geometry.nearest_index(&[x, y, plane])?;
            let idx: Vec<f64> = idx.iter().map(|i| *i as f64).collect();
            let p = geometry.physical_point(&idx)?;
            Ok((p[0], p[1]))
        })
        .collect()
}
