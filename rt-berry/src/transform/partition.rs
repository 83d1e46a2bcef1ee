//! 掩膜分割: 卦限, 上下两半, 等厚切片.

use ndarray::{ArrayD, Dimension};

use crate::data::{Geometry, GeometryAttr, Mask};
use crate::error::{RtError, RtResult};

/// 将连续网格索引四舍五入 (五成双) 为整数网格索引.
fn pivot_of(mask: &Mask, point: &[f64]) -> RtResult<Vec<i64>> {
    mask.geometry().check_dim(3)?;
    mask.geometry().check_dim(point.len())?;
    Ok(point.iter().map(|p| p.round_ties_even() as i64).collect())
}

/// 按 `label(网格索引)` 将掩膜的值分配到 `n` 个新掩膜中. `label` 返回 `None` 的体素被丢弃.
fn split_by<F>(mask: &Mask, n: usize, mut label: F) -> RtResult<Vec<Mask>>
where
    F: FnMut(&[i64]) -> Option<usize>,
{
    let geom: &Geometry = mask.geometry();
    let mut parts: Vec<ArrayD<f64>> = vec![ArrayD::zeros(mask.shape()); n];
    for (idx, v) in mask.data().indexed_iter() {
        if let Some(i) = label(geom.index_of(idx.slice()).as_slice()) {
            parts[i][idx.slice()] = *v;
        }
    }
    parts
        .into_iter()
        .map(|data| Mask::from_array(data, geom.clone()))
        .collect()
}

/// 以 `point` (连续网格索引 `x, y, z`, 四舍五入取整) 为中心将 3D 掩膜分为 8 个卦限.
///
/// "+" 表示该方向上索引不小于中心, "-" 表示小于中心. 返回值的下标与卦限对应关系:
///
/// | 下标 | (x, y, z) |
/// |------|-----------|
/// | 0    | (+, +, +) |
/// | 1    | (-, +, +) |
/// | 2    | (-, -, +) |
/// | 3    | (+, -, +) |
/// | 4    | (+, +, -) |
/// | 5    | (-, +, -) |
/// | 6    | (-, -, -) |
/// | 7    | (+, -, -) |
///
/// 每个卦限保留原掩膜在该区域内的值 (包括分数占据值).
pub fn octants(mask: &Mask, point: &[f64]) -> RtResult<Vec<Mask>> {
    let c = pivot_of(mask, point)?;
    split_by(mask, 8, |idx| {
        let quadrant = match (idx[0] >= c[0], idx[1] >= c[1]) {
            (true, true) => 0,
            (false, true) => 1,
            (false, false) => 2,
            (true, false) => 3,
        };
        Some(if idx[2] >= c[2] { quadrant } else { quadrant + 4 })
    })
}

/// 沿 `z` 方向在 `point` 处将 3D 掩膜分为两半.
///
/// 返回 `(inferior, superior)`: 前者为 `z` 索引小于 `round(point.z)` 的部分, 后者为其余部分.
pub fn halves(mask: &Mask, point: &[f64]) -> RtResult<(Mask, Mask)> {
    let c = pivot_of(mask, point)?;
    let mut parts = split_by(mask, 2, |idx| Some(usize::from(idx[2] >= c[2])))?;
    let superior = parts.pop();
    let inferior = parts.pop();
    inferior
        .zip(superior)
        .ok_or_else(|| RtError::mismatch("分割结果数量错误"))
}

/// 沿几何轴 `axis` (`0, 1, 2` 分别为 `x, y, z`) 将被占据范围等分为 `n` 个切片.
///
/// 第 `i` 个切片包含索引 `lo + ⌊i·(hi - lo)/n⌋` 到 `lo + ⌊(i + 1)·(hi - lo)/n⌋` (不含) 的体素,
/// 其中 `[lo, hi)` 为被占据体素的包围盒. 当 `n` 大于包围盒厚度时部分切片为空.
///
/// `n == 0` 或 `axis` 超出维度时返回 `InvalidParameter`, 空掩膜返回 `EmptyVolume`.
pub fn slabs(mask: &Mask, n: usize, axis: usize) -> RtResult<Vec<Mask>> {
    if n == 0 {
        return Err(RtError::invalid("切片数必须至少为 1"));
    }
    if axis >= mask.dimension() {
        return Err(RtError::invalid(format!(
            "轴 {axis} 超出网格维度 {}",
            mask.dimension()
        )));
    }
    let (lo, hi) = mask.bounds()?;
    let (lo, hi) = (lo[axis], hi[axis]);
    let thickness = hi - lo;
    let cuts: Vec<i64> = (0..=n as i64)
        .map(|i| lo + i * thickness / n as i64)
        .collect();
    log::debug!("沿轴 {axis} 切分为 {n} 片, 边界: {cuts:?}");

    split_by(mask, n, |idx| {
        let v = idx[axis];
        if v < lo || v >= hi {
            return None;
        }
        Some(cuts.partition_point(|c| *c <= v) - 1)
    })
}
