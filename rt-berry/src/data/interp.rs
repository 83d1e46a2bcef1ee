//! 网格插值: 单点多线性插值, 水平平面插值以及重采样.

use itertools::izip;
use ndarray::{s, Array3, ArrayD, Axis, Ix3, IxDyn};
use num::ToPrimitive;

use super::{Geometry, GeometryAttr, Grid};
use crate::error::{RtError, RtResult};

/// 水平平面插值的窗口, 分别是 `x` 和 `y` 方向上的数组下标闭区间.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneWindow {
    /// `x` 方向数组下标范围 `(first, last)`.
    pub x: (usize, usize),
    /// `y` 方向数组下标范围 `(first, last)`.
    pub y: (usize, usize),
}

impl PlaneWindow {
    /// 窗口宽度 (`x` 方向体素个数).
    #[inline]
    pub fn width(&self) -> usize {
        self.x.1 - self.x.0 + 1
    }

    /// 窗口高度 (`y` 方向体素个数).
    #[inline]
    pub fn height(&self) -> usize {
        self.y.1 - self.y.0 + 1
    }

    fn check(&self, (ny, nx): (usize, usize)) -> RtResult<()> {
        let (x0, x1) = self.x;
        let (y0, y1) = self.y;
        if x0 > x1 || y0 > y1 || x1 >= nx || y1 >= ny {
            return Err(RtError::out_of_bounds(format!(
                "平面窗口 {self:?} 超出平面范围 ({ny}, {nx})"
            )));
        }
        Ok(())
    }
}

#[inline]
fn as_f64<T: ToPrimitive>(v: T) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// 沿 `axis` 在数组连续下标 `positions` 处做线性插值. 下标必须已落在 `[0, n - 1]` 之内.
fn resample_axis(data: &ArrayD<f64>, axis: Axis, positions: &[f64]) -> ArrayD<f64> {
    let n = data.len_of(axis);
    debug_assert!(n > 0);
    let mut shape = data.shape().to_vec();
    shape[axis.index()] = positions.len();
    let mut out = ArrayD::zeros(IxDyn(&shape));
    for (k, &pos) in positions.iter().enumerate() {
        let lower = (pos.floor().max(0.0) as usize).min(n - 1);
        let upper = (lower + 1).min(n - 1);
        let w = pos - lower as f64;
        let mut dst = out.index_axis_mut(axis, k);
        dst.assign(&data.index_axis(axis, lower));
        dst.mapv_inplace(|v| v * (1.0 - w));
        if w != 0.0 {
            dst.scaled_add(w, &data.index_axis(axis, upper));
        }
    }
    out
}

impl<T: Copy + ToPrimitive> Grid<T> {
    /// 在连续网格索引 `cidx` (`x, y[, z]`) 处做多线性插值.
    ///
    /// 上侧邻居在数组末端被截断到最后一个体素, 因此网格最后一个体素中心之外,
    /// 开区间上界之内的位置也可以插值.
    ///
    /// 如果索引不在 `index <= c < index + size` 之内, 则返回 `OutOfBounds`.
    pub fn interpolate_voxel(&self, cidx: &[f64]) -> RtResult<f64> {
        let g = self.geometry();
        g.check_dim(cidx.len())?;
        if !g.contains_continuous(cidx) {
            return Err(RtError::out_of_bounds(format!(
                "连续索引 {cidx:?} 不在网格之内"
            )));
        }
        // 数组下标顺序.
        let local: Vec<f64> = izip!(cidx.iter().rev(), g.index.iter().rev())
            .map(|(c, i0)| c - *i0 as f64)
            .collect();
        let shape = self.data.shape();
        let lower: Vec<usize> = local.iter().map(|c| c.floor() as usize).collect();
        let upper: Vec<usize> = izip!(&lower, shape).map(|(l, n)| (l + 1).min(n - 1)).collect();
        let weights: Vec<f64> = izip!(&local, &lower).map(|(c, l)| c - *l as f64).collect();

        let dim = local.len();
        let mut corner = vec![0; dim];
        let mut acc = 0.0;
        for bits in 0..(1usize << dim) {
            let mut weight = 1.0;
            for d in 0..dim {
                if bits >> d & 1 == 1 {
                    corner[d] = upper[d];
                    weight *= weights[d];
                } else {
                    corner[d] = lower[d];
                    weight *= 1.0 - weights[d];
                }
            }
            if weight != 0.0 {
                acc += weight * as_f64(self.data[corner.as_slice()]);
            }
        }
        Ok(acc)
    }

    /// 在若干连续 `z` 索引处插值出完整 (或窗口内的) 水平平面. 仅 3D 网格可用.
    ///
    /// 输出形状为 `(planes.len(), ny, nx)`, 其中 `ny, nx` 为窗口大小.
    /// 平面之间做线性插值, 上侧平面在最后一层被截断.
    ///
    /// 如果任一 `z` 索引不在网格之内, 则返回 `OutOfBounds`.
    pub fn interpolate_plane(
        &self,
        planes: &[f64],
        window: Option<&PlaneWindow>,
    ) -> RtResult<Array3<f64>> {
        let g = self.geometry();
        g.check_dim(3)?;
        let data = self
            .data
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|e| RtError::mismatch(e.to_string()))?;
        let (nz, ny, nx) = data.dim();
        let window = match window {
            Some(w) => {
                w.check((ny, nx))?;
                *w
            }
            None => PlaneWindow {
                x: (0, nx - 1),
                y: (0, ny - 1),
            },
        };
        let (x0, x1) = window.x;
        let (y0, y1) = window.y;

        let mut out = Array3::zeros((planes.len(), window.height(), window.width()));
        for (k, &plane) in planes.iter().enumerate() {
            let local = plane - g.index[2] as f64;
            if !(0.0..nz as f64).contains(&local) {
                return Err(RtError::out_of_bounds(format!(
                    "z 索引 {plane} 不在网格之内"
                )));
            }
            let lower = local.trunc() as usize;
            let upper = (lower + 1).min(nz - 1);
            let w = local - lower as f64;
            let mut dst = out.index_axis_mut(Axis(0), k);
            let below = data.slice(s![lower, y0..=y1, x0..=x1]);
            let above = data.slice(s![upper, y0..=y1, x0..=x1]);
            dst.zip_mut_with(&below, |d, b| *d = (1.0 - w) * as_f64(*b));
            if w != 0.0 {
                dst.zip_mut_with(&above, |d, a| *d += w * as_f64(*a));
            }
        }
        Ok(out)
    }

    /// 将本网格重采样到 `template` 的体素中心上.
    ///
    /// 依次沿 `[z, ]y, x` 方向做一维线性插值. 只保留落在本网格第一个和最后一个体素中心之间的模板样本,
    /// 因此结果只覆盖两者的重叠区域: 其原点是第一个保留的模板体素中心,
    /// 起始索引是模板起始索引加上被跳过的样本数.
    ///
    /// 维度不一致时返回 `GeometryMismatch`, 任一方向没有重叠时返回 `OutOfBounds`.
    pub fn resample<G: GeometryAttr + ?Sized>(&self, template: &G) -> RtResult<Grid<f64>> {
        let src = self.geometry();
        let tpl = template.geometry();
        src.check_dim(tpl.dimension())?;
        let dim = src.dimension();

        const EPS: f64 = 1e-9;
        let mut data = self.data.mapv(as_f64);
        let mut origin = vec![0.0; dim];
        let mut index = vec![0; dim];
        let mut size = vec![0; dim];
        for axis in 0..dim {
            let d = dim - 1 - axis;
            let n = src.size[d];
            let last = (n - 1) as f64;
            let mut first_kept = None;
            let mut positions = Vec::new();
            for t in 0..tpl.size[d] {
                let coord = tpl.origin[d] + t as f64 * tpl.spacing[d];
                let pos = (coord - src.origin[d]) / src.spacing[d];
                if (-EPS..=last + EPS).contains(&pos) {
                    first_kept.get_or_insert(t);
                    positions.push(pos.clamp(0.0, last));
                }
            }
            let Some(t0) = first_kept else {
                return Err(RtError::out_of_bounds(format!(
                    "模板网格在第 {d} 个方向上与源网格没有重叠"
                )));
            };
            data = resample_axis(&data, Axis(axis), &positions);
            origin[d] = tpl.origin[d] + t0 as f64 * tpl.spacing[d];
            index[d] = tpl.index[d] + t0 as i64;
            size[d] = positions.len();
        }

        let mut geometry = Geometry::new(&origin, &tpl.spacing, &size)?;
        geometry.set_index(&index)?;
        Grid::from_array(data, geometry)
    }
}
