//! 平面多边形的点包含判定.

use itertools::Itertools;

use super::Point2d;

/// 鞋带公式计算的有向面积, 逆时针为正.
pub(crate) fn signed_area(points: &[Point2d]) -> f64 {
    0.5 * points
        .iter()
        .circular_tuple_windows()
        .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
        .sum::<f64>()
}

/// 点到线段 `ab` 的距离.
fn segment_distance((px, py): Point2d, (ax, ay): Point2d, (bx, by): Point2d) -> f64 {
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    (px - ax - t * dx).hypot(py - ay - t * dy)
}

/// 闭合多边形.
///
/// 带半径的包含判定与多边形的方向有关: 对逆时针多边形, 正半径使其向外扩张;
/// 对顺时针多边形, 正半径使其向内收缩. 负半径的效果相反.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PolygonPath<'a> {
    points: &'a [Point2d],
    clockwise: bool,
}

impl<'a> PolygonPath<'a> {
    pub(crate) fn new(points: &'a [Point2d]) -> Self {
        Self {
            points,
            clockwise: signed_area(points) < 0.0,
        }
    }

    /// 偶奇规则射线法.
    fn crossing_contains(&self, (px, py): Point2d) -> bool {
        let mut inside = false;
        for (&(xi, yi), &(xj, yj)) in self.points.iter().circular_tuple_windows() {
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
        }
        inside
    }

    /// 点到多边形边界的最短距离.
    fn boundary_distance(&self, p: Point2d) -> f64 {
        self.points
            .iter()
            .circular_tuple_windows()
            .map(|(a, b)| segment_distance(p, *a, *b))
            .fold(f64::INFINITY, f64::min)
    }

    /// 按方向相关的半径 `radius` 判断点是否在多边形内.
    pub(crate) fn contains(&self, p: Point2d, radius: f64) -> bool {
        let inside = self.crossing_contains(p);
        let e = if self.clockwise { -radius } else { radius };
        if e > 0.0 {
            inside || self.boundary_distance(p) <= e
        } else if e < 0.0 {
            inside && self.boundary_distance(p) > -e
        } else {
            inside
        }
    }

    /// 点在多边形内或者与边界的距离不超过 `tolerance`. 与方向无关.
    pub(crate) fn contains_within(&self, p: Point2d, tolerance: f64) -> bool {
        self.crossing_contains(p) || self.boundary_distance(p) <= tolerance
    }
}
