//! 加权直方图, 分箱规则与 numpy 的 `histogram` 一致.

use crate::error::{RtError, RtResult};

/// 直方图: `edges.len() == counts.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Histogram {
    pub(crate) edges: Vec<f64>,
    pub(crate) counts: Vec<f64>,
}

/// 在 `[min, max]` 上等宽分成 `bins` 个箱. 最后一个箱为闭区间.
///
/// 取值范围退化 (`min == max`) 时使用 `[v - 0.5, v + 0.5]`.
/// 没有样本时使用 `[0, 1]`.
pub(crate) fn uniform(samples: &[(f64, f64)], bins: usize) -> Histogram {
    debug_assert!(bins >= 1);
    let (mut first, mut last) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (v, _)| (lo.min(*v), hi.max(*v)));
    if samples.is_empty() {
        (first, last) = (0.0, 1.0);
    } else if first == last {
        first -= 0.5;
        last += 0.5;
    }

    let width = last - first;
    let mut edges: Vec<f64> = (0..=bins)
        .map(|i| first + width * i as f64 / bins as f64)
        .collect();
    edges[bins] = last;

    let norm = bins as f64 / width;
    let mut counts = vec![0.0; bins];
    for &(v, w) in samples {
        let mut idx = (((v - first) * norm) as usize).min(bins - 1);
        // 浮点误差修正, 保证 `edges[idx] <= v < edges[idx + 1]`.
        if v < edges[idx] && idx > 0 {
            idx -= 1;
        } else if idx + 1 < bins && v >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += w;
    }
    Histogram { edges, counts }
}

/// 按给定的单调递增分箱边界统计. 最后一个箱为闭区间, 范围之外的样本被忽略.
///
/// 边界少于 2 个或不是严格递增时返回 `InvalidParameter`.
pub(crate) fn with_edges(samples: &[(f64, f64)], edges: &[f64]) -> RtResult<Histogram> {
    check_edges(edges)?;
    let n = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[n]);
    let mut counts = vec![0.0; n];
    for &(v, w) in samples {
        if v < lo || v > hi {
            continue;
        }
        let idx = (edges.partition_point(|e| *e <= v) - 1).min(n - 1);
        counts[idx] += w;
    }
    Ok(Histogram {
        edges: edges.to_vec(),
        counts,
    })
}

pub(crate) fn check_edges(edges: &[f64]) -> RtResult<()> {
    if edges.len() < 2 {
        return Err(RtError::invalid(format!(
            "至少需要 2 个分箱边界, 实际为 {}",
            edges.len()
        )));
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(RtError::invalid("分箱边界必须严格递增"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_uniform_counts() {
        let samples = [(0.0, 1.0), (1.0, 1.0), (2.0, 2.0), (4.0, 0.5)];
        let h = uniform(&samples, 4);
        assert_eq!(h.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        // 最大值落在最后一个 (闭) 箱中.
        assert_eq!(h.counts, vec![1.0, 1.0, 2.0, 0.5]);
    }

    #[test]
    fn test_uniform_degenerate_range() {
        let samples = [(100.0, 1.0); 5];
        let h = uniform(&samples, 199);
        assert_relative_eq!(h.edges[0], 99.5);
        assert_relative_eq!(h.edges[199], 100.5);
        assert_eq!(h.counts.iter().sum::<f64>(), 5.0);
        assert_eq!(h.counts[99], 5.0);
    }

    #[test]
    fn test_uniform_value_on_inner_edge() {
        let samples = [(0.0, 1.0), (0.3, 1.0), (1.0, 1.0)];
        let h = uniform(&samples, 10);
        assert_eq!(h.edges[3], 0.3);
        assert_eq!(
            h.counts,
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_with_edges() {
        let samples = [(0.5, 1.0), (1.0, 1.0), (3.0, 1.0), (-1.0, 1.0), (3.5, 1.0)];
        let h = with_edges(&samples, &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(h.counts, vec![1.0, 1.0, 1.0]);
        assert!(matches!(
            with_edges(&samples, &[1.0]),
            Err(RtError::InvalidParameter(_))
        ));
        assert!(matches!(
            with_edges(&samples, &[0.0, 2.0, 1.0]),
            Err(RtError::InvalidParameter(_))
        ));
    }
}
