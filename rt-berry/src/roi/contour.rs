use itertools::Itertools;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::path::{signed_area, PolygonPath};
use super::Point2d;
use crate::error::{RtError, RtResult};

/// 外部存储中的单个平面轮廓.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneRecord {
    /// 平面的 `z` 坐标.
    pub z: f64,

    /// 按顺序排列的 `(x, y)` 顶点.
    pub points: Vec<Point2d>,
}

/// 位于平面 `z = plane` 上的闭合轮廓. 最后一个点与第一个点隐式相连.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    plane: f64,
    points: Vec<Point2d>,
}

impl Contour {
    /// 创建轮廓. 点列表为空或含有非有限值时返回 `MalformedContour`.
    pub fn new(plane: f64, points: Vec<Point2d>) -> RtResult<Self> {
        if points.is_empty() {
            return Err(RtError::malformed("轮廓至少需要一个点"));
        }
        if !plane.is_finite() || points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(RtError::malformed("轮廓坐标必须为有限值"));
        }
        Ok(Self { plane, points })
    }

    /// 由展平的 `[x0, y0, z0, x1, y1, z1, ...]` 创建轮廓, 平面取第一个点的 `z`.
    ///
    /// 长度不是 3 的整数倍时返回 `MalformedContour`.
    pub fn from_flat_xyz(data: &[f64]) -> RtResult<Self> {
        if data.len() % 3 != 0 {
            return Err(RtError::malformed(format!(
                "展平的轮廓数据长度 {} 不是 3 的整数倍",
                data.len()
            )));
        }
        let plane = data.get(2).copied().unwrap_or(f64::NAN);
        let points = data.iter().tuples().map(|(x, y, _)| (*x, *y)).collect_vec();
        Self::new(plane, points)
    }

    /// 由 `N × 3` 的点列表创建轮廓, 平面取第一个点的 `z`.
    pub fn from_xyz(points: &[[f64; 3]]) -> RtResult<Self> {
        let plane = points.first().map_or(f64::NAN, |p| p[2]);
        Self::new(plane, points.iter().map(|p| (p[0], p[1])).collect())
    }

    /// 由分离的 `x`, `y` 坐标数组创建轮廓. 长度不一致时返回 `MalformedContour`.
    pub fn from_axes(xs: &[f64], ys: &[f64], plane: f64) -> RtResult<Self> {
        if xs.len() != ys.len() {
            return Err(RtError::malformed(format!(
                "x, y 坐标个数不一致: {} != {}",
                xs.len(),
                ys.len()
            )));
        }
        Self::new(plane, xs.iter().copied().zip(ys.iter().copied()).collect())
    }

    /// 由外部平面轮廓记录创建轮廓.
    #[inline]
    pub fn from_record(record: &PlaneRecord) -> RtResult<Self> {
        Self::new(record.z, record.points.clone())
    }

    /// 轮廓所在平面的 `z` 坐标.
    #[inline]
    pub fn plane(&self) -> f64 {
        self.plane
    }

    /// 顶点.
    #[inline]
    pub fn points(&self) -> &[Point2d] {
        &self.points
    }

    /// 顶点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 总是 `false`, 轮廓至少有一个点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 有向面积. 逆时针为正, 顺时针为负.
    #[inline]
    pub fn area(&self) -> f64 {
        signed_area(&self.points)
    }

    /// 面积的符号: 逆时针为 `1`, 顺时针为 `-1`, 退化为 `0`.
    pub fn direction(&self) -> i8 {
        let area = self.area();
        if area > 0.0 {
            1
        } else if area < 0.0 {
            -1
        } else {
            0
        }
    }

    /// `(x, y, z)` 最小值.
    pub fn min(&self) -> [f64; 3] {
        let (x, y) = self
            .points
            .iter()
            .fold((f64::INFINITY, f64::INFINITY), |(ax, ay), (x, y)| (ax.min(*x), ay.min(*y)));
        [x, y, self.plane]
    }

    /// `(x, y, z)` 最大值.
    pub fn max(&self) -> [f64; 3] {
        let (x, y) = self.points.iter().fold(
            (f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(ax, ay), (x, y)| (ax.max(*x), ay.max(*y)),
        );
        [x, y, self.plane]
    }

    /// 反转点的顺序, 即反转方向.
    #[inline]
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// 点是否在轮廓内. 正 `radius` 使逆时针轮廓扩张, 使顺时针轮廓收缩.
    #[inline]
    pub fn contains_point(&self, p: Point2d, radius: f64) -> bool {
        PolygonPath::new(&self.points).contains(p, radius)
    }
}
