//! 组合, 裁剪, 降采样等通用变换.

use ndarray::{ArrayD, Slice};

use crate::data::{GeometryAttr, Mask};
use crate::error::{RtError, RtResult};

/// 将多个坐标系统完全相同的掩膜逐体素加权求和.
///
/// 未给出 `weights` 时所有权重为 1. 结果可能超出 `[0, 1]`, 调用方可自行二值化.
///
/// # 错误
///
/// 1. 少于 2 个掩膜, 或权重个数与掩膜个数不一致时返回 `InvalidParameter`.
/// 2. 任意两个掩膜的坐标系统不同时返回 `GeometryMismatch`.
pub fn combine(masks: &[Mask], weights: Option<&[f64]>) -> RtResult<Mask> {
    let [first, rest @ ..] = masks else {
        return Err(RtError::invalid("至少需要 2 个掩膜才能组合"));
    };
    if rest.is_empty() {
        return Err(RtError::invalid("至少需要 2 个掩膜才能组合"));
    }
    if let Some(i) = rest
        .iter()
        .position(|m| !m.geometry().same_as(first.geometry()))
    {
        return Err(RtError::mismatch(format!(
            "第 {} 个掩膜的坐标系统与第 0 个不同",
            i + 1
        )));
    }
    if let Some(w) = weights {
        if w.len() != masks.len() {
            return Err(RtError::invalid(format!(
                "{} 个掩膜无法对应 {} 个权重",
                masks.len(),
                w.len()
            )));
        }
    }

    let weight = |i: usize| weights.map_or(1.0, |w| w[i]);
    let mut data: ArrayD<f64> = first.data().mapv(|v| v * weight(0));
    for (i, m) in rest.iter().enumerate() {
        let w = weight(i + 1);
        data.zip_mut_with(&m.data(), |a, b| *a += b * w);
    }
    Mask::from_array(data, first.geometry().clone())
}

/// 将掩膜裁剪到被占据体素的包围盒.
///
/// 起始索引保持不变, 原点移动到包围盒第一个体素的中心, 因此每个体素的物理位置不变.
/// 空掩膜返回 `EmptyVolume`.
pub fn crop(mask: &Mask) -> RtResult<Mask> {
    let (lo, hi) = mask.bounds()?;
    let dim = mask.dimension();
    let i0 = mask.start_index();
    let data = mask
        .data()
        .slice_each_axis(|ax| {
            let d = dim - 1 - ax.axis.index();
            Slice::from((lo[d] - i0[d]) as usize..(hi[d] - i0[d]) as usize)
        })
        .to_owned();

    let lo_f: Vec<f64> = lo.iter().map(|v| *v as f64).collect();
    let size: Vec<usize> = lo.iter().zip(&hi).map(|(l, h)| (h - l) as usize).collect();
    let mut geom = mask.geometry().clone();
    geom.set_origin(&mask.physical_point(&lo_f)?)?;
    geom.set_size(&size)?;
    geom.update_end();
    Mask::from_array(data, geom)
}

/// 沿各轴等间隔抽取体素降采样.
///
/// `fractions` 为 1 个 (所有轴) 或与维度相同个数 (`x, y[, z]`) 的保留比例, 取值 `(0, 1]`.
/// 每个轴上每隔 `⌊1 / f⌋` 个体素保留一个, 间距相应放大. 不做插值,
/// 因此 `f` 最好是某个整数的倒数.
pub fn downsample(mask: &Mask, fractions: &[f64]) -> RtResult<Mask> {
    let dim = mask.dimension();
    let fractions = match fractions.len() {
        1 => vec![fractions[0]; dim],
        n if n == dim => fractions.to_vec(),
        n => {
            return Err(RtError::invalid(format!(
                "降采样比例个数必须为 1 或 {dim}, 实际为 {n}"
            )))
        }
    };
    if fractions.iter().any(|f| !(*f > 0.0 && *f <= 1.0)) {
        return Err(RtError::invalid(format!(
            "降采样比例必须位于 (0, 1]: {fractions:?}"
        )));
    }
    let skips: Vec<usize> = fractions.iter().map(|f| (1.0 / f) as usize).collect();

    let data = mask
        .data()
        .slice_each_axis(|ax| {
            let step = skips[dim - 1 - ax.axis.index()];
            Slice::new(0, None, step as isize)
        })
        .to_owned();

    let spacing: Vec<f64> = mask
        .spacing()
        .iter()
        .zip(&skips)
        .map(|(s, k)| s * *k as f64)
        .collect();
    let size: Vec<usize> = data.shape().iter().rev().copied().collect();
    let mut geom = mask.geometry().clone();
    geom.set_spacing(&spacing)?;
    geom.set_size(&size)?;
    geom.update_end();
    log::debug!(
        "降采样: {} -> {} 个被占据体素",
        mask.count(),
        data.iter().filter(|v| **v != 0.0).count()
    );
    Mask::from_array(data, geom)
}

/// 以 `mask` 的坐标系统创建新掩膜, 只有 `indices` (`x, y[, z]` 网格索引) 处被占据.
///
/// 任一索引越界时返回 `OutOfBounds`.
#[inline]
pub fn fill_from_indices<I, P>(mask: &Mask, indices: I) -> RtResult<Mask>
where
    I: IntoIterator<Item = P>,
    P: AsRef<[i64]>,
{
    Mask::from_indices(mask.geometry().clone(), indices)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::Geometry;

    fn geom() -> Geometry {
        Geometry::new(&[10.0, 20.0, 30.0], &[1.0, 2.0, 3.0], &[6, 6, 6]).unwrap()
    }

    #[test]
    fn test_combine() {
        let g = Geometry::unit(&[2, 2, 1]).unwrap();
        let a = Mask::from_indices(g.clone(), [[0, 0, 0]]).unwrap();
        let b = Mask::from_indices(g.clone(), [[0, 0, 0], [1, 0, 0]]).unwrap();
        let masks = [a, b];

        let sum = combine(&masks, None).unwrap();
        assert_eq!(sum.get(&[0, 0, 0]), Some(2.0));
        assert_eq!(sum.get(&[1, 0, 0]), Some(1.0));
        assert_eq!(sum.get(&[1, 1, 0]), Some(0.0));

        let weighted = combine(&masks, Some(&[0.5, 2.0])).unwrap();
        assert_eq!(weighted.get(&[0, 0, 0]), Some(2.5));
        assert_eq!(weighted.get(&[1, 0, 0]), Some(2.0));
    }

    #[test]
    fn test_combine_errors() {
        let g = Geometry::unit(&[2, 2, 1]).unwrap();
        let a = Mask::new(g.clone());
        assert!(matches!(
            combine(&[a.clone()], None),
            Err(RtError::InvalidParameter(_))
        ));
        assert!(matches!(combine(&[], None), Err(RtError::InvalidParameter(_))));
        assert!(matches!(
            combine(&[a.clone(), a.clone()], Some(&[1.0])),
            Err(RtError::InvalidParameter(_))
        ));

        let shifted = Geometry::new(&[1.0, 0.0, 0.0], &[1.0; 3], &[2, 2, 1]).unwrap();
        assert!(matches!(
            combine(&[a, Mask::new(shifted)], None),
            Err(RtError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_crop() {
        let m = Mask::from_indices(geom(), [[2, 3, 4], [3, 3, 5]]).unwrap();
        let c = crop(&m).unwrap();
        assert_eq!(c.size(), &[2, 1, 2]);
        assert_eq!(c.origin(), &[12.0, 26.0, 42.0]);
        assert_eq!(c.start_index(), &[0, 0, 0]);
        assert_eq!(c.count(), 2);
        assert!(c.is_occupied(&[0, 0, 0]));
        assert!(c.is_occupied(&[1, 0, 1]));
        assert_eq!(c.to_point_cloud().unwrap(), m.to_point_cloud().unwrap());
        assert_relative_eq!(c.end()[2], 45.0);

        assert!(matches!(
            crop(&Mask::new(geom())),
            Err(RtError::EmptyVolume(_))
        ));
    }

    #[test]
    fn test_downsample() {
        let g = Geometry::unit(&[4, 4, 2]).unwrap();
        let m = Mask::from_array(ArrayD::from_elem(g.shape(), 1.0), g).unwrap();

        let d = downsample(&m, &[0.5]).unwrap();
        assert_eq!(d.size(), &[2, 2, 1]);
        assert_eq!(d.spacing(), &[2.0, 2.0, 2.0]);
        assert_eq!(d.count(), 4);

        let d = downsample(&m, &[0.5, 1.0, 1.0]).unwrap();
        assert_eq!(d.size(), &[2, 4, 2]);
        assert_eq!(d.spacing(), &[2.0, 1.0, 1.0]);

        // ⌊1 / 0.3⌋ = 3, 保留 x = 0, 3.
        let d = downsample(&m, &[0.3, 1.0, 1.0]).unwrap();
        assert_eq!(d.size(), &[2, 4, 2]);
        assert_eq!(d.spacing()[0], 3.0);

        let bad: [&[f64]; 3] = [&[0.0], &[1.5], &[0.5, 0.5]];
        for bad in bad {
            assert!(matches!(
                downsample(&m, bad),
                Err(RtError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_fill_from_indices() {
        let m = Mask::new(geom());
        let f = fill_from_indices(&m, [[0, 0, 0], [5, 5, 5]]).unwrap();
        assert_eq!(f.count(), 2);
        assert!(f.is_occupied(&[5, 5, 5]));
        assert!(m.is_empty());
        assert!(matches!(
            fill_from_indices(&m, [[6, 0, 0]]),
            Err(RtError::OutOfBounds(_))
        ));
    }
}
