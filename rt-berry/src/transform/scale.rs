//! 扩张 / 收缩 / 壳层.

use std::cmp::Reverse;

use ndarray::{Array3, Dimension};
use ordered_float::OrderedFloat;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::occupancy::{is_on, OFF};
use crate::data::{GeometryAttr, Mask};
use crate::error::{RtError, RtResult};

/// 各方向上的扩张 (或收缩) 量, 物理单位.
///
/// 按 `x, y, z` 顺序分别保存负方向和正方向上的扩张量, 均为非负有限值.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expansion {
    negative: [f64; 3],
    positive: [f64; 3],
}

impl Expansion {
    /// 所有方向相同的扩张量.
    #[inline]
    pub fn uniform(e: f64) -> RtResult<Self> {
        Self::from_values(&[e])
    }

    /// 由 1 个 (各向同性), 3 个 (`x, y, z`) 或 6 个 (`-x, +x, -y, +y, -z, +z`) 值创建.
    ///
    /// 值的个数不对, 或存在负值 / 非有限值时返回 `InvalidParameter`.
    pub fn from_values(values: &[f64]) -> RtResult<Self> {
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(RtError::invalid(format!(
                "扩张 / 收缩量必须为非负有限值: {values:?}"
            )));
        }
        let (negative, positive) = match *values {
            [e] => ([e; 3], [e; 3]),
            [x, y, z] => ([x, y, z], [x, y, z]),
            [nx, px, ny, py, nz, pz] => ([nx, ny, nz], [px, py, pz]),
            _ => {
                return Err(RtError::invalid(format!(
                    "扩张量必须为 1, 3 或 6 个值, 实际为 {}",
                    values.len()
                )))
            }
        };
        Ok(Self { negative, positive })
    }

    /// 负方向上的扩张量 (`x, y, z`).
    #[inline]
    pub fn negative(&self) -> &[f64; 3] {
        &self.negative
    }

    /// 正方向上的扩张量 (`x, y, z`).
    #[inline]
    pub fn positive(&self) -> &[f64; 3] {
        &self.positive
    }
}

impl TryFrom<f64> for Expansion {
    type Error = RtError;

    #[inline]
    fn try_from(e: f64) -> RtResult<Self> {
        Self::uniform(e)
    }
}

impl TryFrom<&[f64]> for Expansion {
    type Error = RtError;

    #[inline]
    fn try_from(values: &[f64]) -> RtResult<Self> {
        Self::from_values(values)
    }
}

/// 扩张核: 相对于中心体素的数组偏移量 (`z, y, x`).
///
/// 某个体素被纳入, 当且仅当以其中心为圆心, 半轴为 `1/4` 体素尺寸的椭球与扩张椭球相交,
/// 即在各方向半径为 `e + spacing / 4` 的椭球内.
fn kernel_offsets(e: &Expansion, spacing: &[f64]) -> Vec<[i64; 3]> {
    let reach = |d: usize| {
        let n = (e.negative[d] / spacing[d]).round_ties_even() as i64;
        let p = (e.positive[d] / spacing[d]).round_ties_even() as i64;
        -n..=p
    };
    let term = |d: usize, i: i64| {
        let r = if i < 0 { e.negative[d] } else { e.positive[d] } + spacing[d] / 4.0;
        (i as f64 * spacing[d] / r).powi(2)
    };

    let mut offsets = vec![];
    for iz in reach(2) {
        for iy in reach(1) {
            for ix in reach(0) {
                if term(0, ix) + term(1, iy) + term(2, iz) <= 1.0 {
                    offsets.push([iz, iy, ix]);
                }
            }
        }
    }
    offsets
}

/// 在每个边缘体素 (6-邻域) 处盖上扩张核, 返回被覆盖的体素.
fn stamp(mask: &Mask, e: &Expansion) -> RtResult<Array3<bool>> {
    mask.geometry().check_dim(3)?;
    let offsets = kernel_offsets(e, mask.spacing());
    let shape = mask.shape();
    let bound = [shape[0] as i64, shape[1] as i64, shape[2] as i64];

    let mut out = Array3::from_elem((shape[0], shape[1], shape[2]), false);
    let edge = mask.edge_voxels(false);
    for (idx, _) in edge.data().indexed_iter().filter(|(_, v)| is_on(**v)) {
        let p = idx.slice();
        for off in &offsets {
            let q = [
                p[0] as i64 + off[0],
                p[1] as i64 + off[1],
                p[2] as i64 + off[2],
            ];
            if q.iter().zip(&bound).all(|(v, n)| (0..*n).contains(v)) {
                out[[q[0] as usize, q[1] as usize, q[2] as usize]] = true;
            }
        }
    }
    Ok(out)
}

/// 将掩膜表面向外扩张 `e` (物理单位). 结果是二值掩膜.
///
/// 仅支持 3D 掩膜, 否则返回 `GeometryMismatch`.
pub fn expand(mask: &Mask, e: &Expansion) -> RtResult<Mask> {
    let mut covered = stamp(mask, e)?.into_dyn();
    covered.zip_mut_with(&mask.data(), |c, v| *c |= is_on(*v));
    Mask::from_bool_array(covered, mask.geometry().clone())
}

/// 将掩膜表面向内收缩 `e` (物理单位). 结果是二值掩膜.
///
/// # 注意
///
/// 表面体素本身总会被移除, 因此 `e = 0` 时结果是去掉所有边缘体素后的掩膜.
pub fn contract(mask: &Mask, e: &Expansion) -> RtResult<Mask> {
    let mut kept = stamp(mask, e)?.into_dyn();
    kept.zip_mut_with(&mask.data(), |c, v| *c = is_on(*v) && !*c);
    Mask::from_bool_array(kept, mask.geometry().clone())
}

/// 一层壳.
#[derive(Debug, Clone, PartialEq)]
pub struct Shell {
    /// 外边界的扩张量标签, 如 `+1.0`, `+0.0`, `-0.5`.
    pub label: String,

    /// 外边界与下一层外边界之间的体素.
    pub mask: Mask,
}

/// 由一组 (各向同性的) 扩张量和收缩量生成嵌套的壳层.
///
/// 外边界由外向内依次为: 从大到小的扩张结果, 原掩膜 (`+0.0`), 从小到大的收缩结果.
/// 每一层壳等于其外边界减去下一层的外边界, 最后一层就是最深的收缩结果本身.
pub fn shells(mask: &Mask, expansions: &[f64], contractions: &[f64]) -> RtResult<Vec<Shell>> {
    let mut exp = expansions.to_vec();
    let mut con = contractions.to_vec();
    exp.sort_by_key(|e| Reverse(OrderedFloat(*e)));
    con.sort_by_key(|c| OrderedFloat(*c));

    let mut outer = Vec::with_capacity(exp.len() + con.len() + 1);
    for e in exp {
        outer.push((format!("+{e:?}"), expand(mask, &Expansion::uniform(e)?)?));
    }
    outer.push((format!("+{:?}", 0.0), mask.binarized()));
    for c in con {
        outer.push((format!("-{c:?}"), contract(mask, &Expansion::uniform(c)?)?));
    }

    let mut out: Vec<Shell> = Vec::with_capacity(outer.len());
    let mut iter = outer.into_iter().peekable();
    while let Some((label, mut m)) = iter.next() {
        if let Some((_, inner)) = iter.peek() {
            m.data_mut().zip_mut_with(&inner.data(), |v, w| {
                if is_on(*w) {
                    *v = OFF;
                }
            });
        }
        out.push(Shell { label, mask: m });
    }
    log::debug!(
        "共生成 {} 层壳: {:?}",
        out.len(),
        out.iter().map(|s| s.label.as_str()).collect::<Vec<_>>()
    );
    Ok(out)
}
