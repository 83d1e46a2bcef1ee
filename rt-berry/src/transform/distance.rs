//! 欧氏距离变换.

use ndarray::{ArrayD, IxDyn};

use crate::consts::occupancy::is_on;
use crate::data::{GeometryAttr, Grid, Mask};
use crate::error::{RtError, RtResult};

/// 行优先 (最后一个轴变化最快) 的扁平下标换算.
struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    fn new(shape: &[usize]) -> Self {
        let mut strides = vec![1; shape.len()];
        for a in (0..shape.len().saturating_sub(1)).rev() {
            strides[a] = strides[a + 1] * shape[a + 1];
        }
        Self {
            shape: shape.to_vec(),
            strides,
        }
    }

    #[inline]
    fn coord(&self, flat: usize, axis: usize) -> usize {
        flat / self.strides[axis] % self.shape[axis]
    }

    /// `flat` 沿 `axis` 移动一格后的扁平下标. 越界返回 `None`.
    #[inline]
    fn step(&self, flat: usize, axis: usize, forward: bool) -> Option<usize> {
        let c = self.coord(flat, axis);
        match forward {
            true if c + 1 < self.shape[axis] => Some(flat + self.strides[axis]),
            false if c > 0 => Some(flat - self.strides[axis]),
            _ => None,
        }
    }
}

/// 每个体素到最近的被占据体素中心的欧氏距离 (物理单位), 坐标系统与 `mask` 相同.
///
/// 从所有被占据体素出发, 沿 6-邻域 (2D 为 4-邻域) 逐层传播. 每个体素记录当前最近的源体素,
/// 只有当经由邻居得到的距离更短时才更新并加入下一层. 被占据体素 (包括分数占据) 的距离为 0.
///
/// 空掩膜返回 `EmptyVolume`.
pub fn distance_transform(mask: &Mask) -> RtResult<Grid<f64>> {
    let data = mask.data();
    let layout = Layout::new(data.shape());
    let ndim = layout.shape.len();
    // 数组轴顺序 (`[z, ]y, x`) 的间距.
    let spacing: Vec<f64> = mask.spacing().iter().rev().copied().collect();

    let n = data.len();
    let mut sq = vec![f64::INFINITY; n];
    let mut root = vec![usize::MAX; n];
    let mut front: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, v)| is_on(**v))
        .map(|(i, _)| i)
        .collect();
    if front.is_empty() {
        return Err(RtError::empty("空掩膜无法计算距离变换"));
    }
    for &i in &front {
        sq[i] = 0.0;
        root[i] = i;
    }

    let mut rounds = 0;
    while !front.is_empty() {
        rounds += 1;
        let mut next = Vec::new();
        for &p in &front {
            let r = root[p];
            for axis in 0..ndim {
                for forward in [false, true] {
                    let Some(q) = layout.step(p, axis, forward) else {
                        continue;
                    };
                    let dist: f64 = (0..ndim)
                        .map(|a| {
                            let d = layout.coord(q, a) as f64 - layout.coord(r, a) as f64;
                            (d * spacing[a]).powi(2)
                        })
                        .sum();
                    if dist < sq[q] {
                        sq[q] = dist;
                        root[q] = r;
                        next.push(q);
                    }
                }
            }
        }
        next.sort_unstable();
        next.dedup();
        front = next;
    }
    log::debug!("距离变换: {rounds} 轮传播");

    let out = ArrayD::from_shape_vec(IxDyn(&layout.shape), sq.into_iter().map(f64::sqrt).collect())
        .map_err(|e| RtError::mismatch(e.to_string()))?;
    Grid::from_array(out, mask.geometry().clone())
}
