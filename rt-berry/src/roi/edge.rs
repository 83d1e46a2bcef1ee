//! 轮廓的体素级面积占比 (分数边缘掩膜).
//!
//! 在以体素角点为原点的索引坐标中, 体素 `(i, j)` 占据 `[i, i + 1) × [j, j + 1)`.
//! 轮廓先在所有整数网格线处插值, 然后被切成若干段, 每段恰好位于一个体素之内.
//! 每段用该体素在轮廓内的角点闭合, 其有向面积即为轮廓在这个体素中覆盖的面积.

use ndarray::Array3;

use super::path::{signed_area, PolygonPath};
use super::{MaskTemplate, Point2d, RasterSpec, Roi};
use crate::consts::tolerance::CONTAINS_RADIUS;
use crate::data::{GeometryAttr, Mask};
use crate::error::RtResult;

/// 严格位于 `a` 和 `b` 之间的整数, 按从 `a` 到 `b` 的顺序排列.
fn open_range(a: f64, b: f64) -> Vec<f64> {
    let mut out = vec![];
    if a < b {
        let mut k = a.floor() + 1.0;
        while k < b {
            out.push(k);
            k += 1.0;
        }
    } else {
        let mut k = a.ceil() - 1.0;
        while k > b {
            out.push(k);
            k -= 1.0;
        }
    }
    out
}

#[inline]
fn is_integral(v: f64) -> bool {
    v == v.trunc()
}

#[inline]
fn strictly_monotone(a: f64, b: f64, c: f64) -> bool {
    (a < b && b < c) || (c < b && b < a)
}

/// 在轮廓与整数网格线的所有交点处插值.
///
/// 返回插值后的点列, 以及每个点是否为轮廓穿过体素边界的位置.
fn interpolate_at_voxel_edges(points: &[Point2d]) -> (Vec<Point2d>, Vec<bool>) {
    let n = points.len();
    let mut out: Vec<Point2d> = Vec::with_capacity(n * 2);
    for i in 0..n {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % n];

        let mut crossings: Vec<Point2d> = vec![];
        for x in open_range(x0, x1) {
            let p = (x, y0 + (y1 - y0) * (x - x0) / (x1 - x0));
            if !crossings.contains(&p) {
                crossings.push(p);
            }
        }
        for y in open_range(y0, y1) {
            let p = (x0 + (x1 - x0) * (y - y0) / (y1 - y0), y);
            if !crossings.contains(&p) {
                crossings.push(p);
            }
        }
        let dist2 = |(x, y): &Point2d| (x - x0).powi(2) + (y - y0).powi(2);
        crossings.sort_by(|a, b| dist2(a).total_cmp(&dist2(b)));

        if !crossings.contains(&(x0, y0)) {
            out.push((x0, y0));
        }
        out.extend(crossings);
    }

    let m = out.len();
    let is_boundary = (0..m)
        .map(|i| {
            let (xp, yp) = out[(i + m - 1) % m];
            let (x, y) = out[i];
            let (xn, yn) = out[(i + 1) % m];
            (is_integral(x) && strictly_monotone(xp, x, xn))
                || (is_integral(y) && strictly_monotone(yp, y, yn))
        })
        .collect();
    (out, is_boundary)
}

/// 将一个体素内的轮廓段用轮廓内的体素角点闭合.
///
/// 角点按逆时针顺序, 从距离出口点最近的角点开始追加.
/// 返回闭合后的多边形和体素的 `(x, y)` 下角点.
fn close_fragment(mut fragment: Vec<Point2d>, path: &PolygonPath) -> (Vec<Point2d>, (f64, f64)) {
    let (mx, my) = fragment
        .iter()
        .fold((f64::INFINITY, f64::INFINITY), |(ax, ay), (x, y)| (ax.min(*x), ay.min(*y)));
    let (lx, ly) = (mx.floor(), my.floor());
    let corners: Vec<Point2d> = [(lx, ly), (lx + 1.0, ly), (lx + 1.0, ly + 1.0), (lx, ly + 1.0)]
        .into_iter()
        .filter(|c| path.contains(*c, CONTAINS_RADIUS))
        .collect();

    match corners.len() {
        0 => {}
        1 => fragment.push(corners[0]),
        k => {
            let (ex, ey) = fragment[fragment.len() - 1];
            let d2: Vec<f64> = corners
                .iter()
                .map(|(x, y)| (x - ex).powi(2) + (y - ey).powi(2))
                .collect();
            let start = (0..k).fold(0, |best, i| if d2[i] < d2[best] { i } else { best });
            for i in 0..k {
                let c = corners[(start + i) % k];
                if !fragment.contains(&c) {
                    fragment.push(c);
                }
            }
        }
    }
    (fragment, (lx, ly))
}

impl Roi {
    /// 分数边缘掩膜: 轮廓穿过的每个体素的值为该体素被感兴趣区域覆盖的面积占比,
    /// 其余体素为 `0`.
    ///
    /// 孔洞轮廓贡献负面积, 累加后小于 `0` 的值加一 (并截断到 `0`), 大于 `1` 的值截断到 `1`.
    ///
    /// # 注意
    ///
    /// 被同一轮廓穿过两次以上的体素, 其角点顺序只是启发式的, 结果可能不准确.
    pub fn edge_mask<G: GeometryAttr + ?Sized>(&self, template: &G) -> RtResult<Mask> {
        let geometry = template.geometry();
        geometry.check_dim(3)?;
        let [nx, ny, nz] = [geometry.size()[0], geometry.size()[1], geometry.size()[2]];
        let index0 = geometry.start_index();
        let mut acc = Array3::<f64>::zeros((nz, ny, nx));

        for contour in &self.contours {
            let mut plane = f64::NAN;
            let mut points = Vec::with_capacity(contour.len());
            for &(x, y) in contour.points() {
                let (c, _) = geometry.continuous_index(&[x, y, contour.plane()])?;
                points.push((c[0] - index0[0] as f64 + 0.5, c[1] - index0[1] as f64 + 0.5));
                plane = c[2] - index0[2] as f64;
            }
            let z = plane.round_ties_even();
            if !(0.0..nz as f64).contains(&z) {
                continue;
            }
            let z = z as usize;

            let path = PolygonPath::new(&points);
            let (fine, is_boundary) = interpolate_at_voxel_edges(&points);
            let n = fine.len();
            let mut i = is_boundary.iter().position(|b| *b).unwrap_or(n);
            while i < n {
                let mut fragment = vec![fine[i]];
                i += 1;
                while !is_boundary[i % n] {
                    fragment.push(fine[i % n]);
                    i += 1;
                }
                fragment.push(fine[i % n]);

                let (polygon, (lx, ly)) = close_fragment(fragment, &path);
                if lx < 0.0 || ly < 0.0 || lx >= nx as f64 || ly >= ny as f64 {
                    continue;
                }
                acc[[z, ly as usize, lx as usize]] += signed_area(&polygon);
            }
        }

        acc.mapv_inplace(|v| {
            if v > 1.0 {
                1.0
            } else if v < 0.0 {
                (v + 1.0).max(0.0)
            } else {
                v
            }
        });
        Mask::from_array(acc.into_dyn(), geometry.clone())
    }

    /// 边缘加权掩膜: 二值掩膜中被轮廓穿过的体素替换为其分数占比.
    ///
    /// 已有缓存掩膜时使用缓存 (二值化后), 否则按 `template` 和 `spec` 栅格化.
    pub fn edge_weighted_mask(&self, template: &MaskTemplate, spec: &RasterSpec) -> RtResult<Mask> {
        let binary = match &self.mask {
            Some(mask) => mask.binarized(),
            None => self.to_mask(template, spec)?,
        };
        let edges = self.edge_mask(&binary)?;
        let mut data = binary.data().to_owned();
        data.zip_mut_with(&edges.data(), |v, e| {
            if *e != 0.0 {
                *v = *e;
            }
        });
        Mask::from_array(data, binary.geometry().clone())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::Geometry;
    use crate::roi::tests::{square, square_cw};
    use crate::roi::Contour;

    #[test]
    fn test_open_range() {
        assert_eq!(open_range(0.25, 3.75), vec![1.0, 2.0, 3.0]);
        assert_eq!(open_range(1.0, 3.0), vec![2.0]);
        assert_eq!(open_range(3.75, 1.0), vec![3.0, 2.0]);
        assert_eq!(open_range(3.0, 0.5), vec![2.0, 1.0]);
        assert!(open_range(2.5, 2.5).is_empty());
        assert!(open_range(2.0, 2.0).is_empty());
    }

    #[test]
    fn test_interpolate_at_voxel_edges() {
        let points = [(0.25, 0.25), (1.75, 0.25), (1.75, 1.75), (0.25, 1.75)];
        let (fine, is_boundary) = interpolate_at_voxel_edges(&points);
        assert_eq!(
            fine,
            vec![
                (0.25, 0.25),
                (1.0, 0.25),
                (1.75, 0.25),
                (1.75, 1.0),
                (1.75, 1.75),
                (1.0, 1.75),
                (0.25, 1.75),
                (0.25, 1.0),
            ]
        );
        assert_eq!(
            is_boundary,
            vec![false, true, false, true, false, true, false, true]
        );
    }

    #[test]
    fn test_edge_mask_square() {
        // 索引坐标 (体素角点为原点) 中为 [0.25, 3.75]².
        let roi = Roi::new("sq", vec![square(-0.25, 3.25, 0.0)]).unwrap();
        let geom = Geometry::new(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[5, 5, 1]).unwrap();
        let edges = roi.edge_mask(&geom).unwrap();
        assert_relative_eq!(edges.data().sum(), 8.25, epsilon = 1e-12);
        assert_relative_eq!(edges.get(&[0, 0, 0]).unwrap(), 0.5625, epsilon = 1e-12);
        assert_relative_eq!(edges.get(&[1, 0, 0]).unwrap(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(edges.get(&[3, 3, 0]).unwrap(), 0.5625, epsilon = 1e-12);
        assert_eq!(edges.get(&[1, 1, 0]), Some(0.0));
        assert_eq!(edges.get(&[4, 4, 0]), Some(0.0));

        let weighted = roi
            .edge_weighted_mask(&MaskTemplate::from(&geom), &RasterSpec::default())
            .unwrap();
        assert_relative_eq!(weighted.data().sum(), 12.25, epsilon = 1e-12);
        assert_eq!(weighted.get(&[1, 1, 0]), Some(1.0));
    }

    #[test]
    fn test_edge_weighted_mask_with_hole() {
        // 外轮廓 [0.25, 5.75]², 孔洞 [2.25, 3.75]² (索引坐标), 面积 30.25 - 2.25.
        let roi = Roi::new(
            "ring",
            vec![square(-0.25, 5.25, 0.0), square_cw(1.75, 3.25, 0.0)],
        )
        .unwrap();
        let geom = Geometry::new(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[6, 6, 1]).unwrap();
        let binary = roi.to_mask(&MaskTemplate::from(&geom), &RasterSpec::default()).unwrap();
        assert_eq!(binary.count(), 32);

        let edges = roi.edge_mask(&geom).unwrap();
        assert_relative_eq!(edges.get(&[2, 2, 0]).unwrap(), 0.4375, epsilon = 1e-12);
        assert_relative_eq!(edges.get(&[3, 3, 0]).unwrap(), 0.4375, epsilon = 1e-12);

        let weighted = roi
            .edge_weighted_mask(&MaskTemplate::from(&geom), &RasterSpec::default())
            .unwrap();
        assert_relative_eq!(weighted.data().sum(), 28.0, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_weighted_mask_uses_cache() {
        let mut roi = Roi::new(
            "r",
            vec![Contour::new(0.0, vec![(-0.25, -0.25), (1.25, -0.25), (1.25, 1.25), (-0.25, 1.25)]).unwrap()],
        )
        .unwrap();
        let geom = Geometry::new(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[3, 3, 1]).unwrap();
        roi.rasterize(&MaskTemplate::from(&geom), &RasterSpec::default())
            .unwrap();
        // 缓存已存在, 模板被忽略.
        let weighted = roi
            .edge_weighted_mask(&MaskTemplate::default(), &RasterSpec::default())
            .unwrap();
        assert_eq!(weighted.size(), &[3, 3, 1]);
        assert_relative_eq!(weighted.data().sum(), 2.25, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_mask_skips_planes_outside() {
        let roi = Roi::new("sq", vec![square(-0.25, 3.25, 4.0)]).unwrap();
        let geom = Geometry::new(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[5, 5, 1]).unwrap();
        assert!(roi.edge_mask(&geom).unwrap().is_empty());
    }
}
