use ndarray::{Array2, ArrayD, ArrayViewD, ArrayViewMutD, Dimension};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Geometry, GeometryAttr, Grid};
use crate::consts::occupancy::{self, ON};
use crate::error::{RtError, RtResult};

mod edge;
mod rle;

/// 占据掩膜.
///
/// 每个体素的值表示该体素被感兴趣区域占据的程度: `0` 为未占据, `1` 为完全占据,
/// `(0, 1)` 之间的值只出现在边缘加权掩膜中.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    grid: Grid<f64>,
}

impl GeometryAttr for Mask {
    #[inline]
    fn geometry(&self) -> &Geometry {
        self.grid.geometry()
    }
}

impl From<Grid<f64>> for Mask {
    #[inline]
    fn from(grid: Grid<f64>) -> Self {
        Self { grid }
    }
}

impl Mask {
    /// 创建全部未占据的掩膜.
    #[inline]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            grid: Grid::zeros(geometry),
        }
    }

    /// 由数据数组和坐标系统创建掩膜.
    #[inline]
    pub fn from_array(data: ArrayD<f64>, geometry: Geometry) -> RtResult<Self> {
        Grid::from_array(data, geometry).map(Self::from)
    }

    /// 由布尔数组创建二值掩膜.
    pub fn from_bool_array(data: ArrayD<bool>, geometry: Geometry) -> RtResult<Self> {
        Self::from_array(data.mapv(|b| if b { ON } else { occupancy::OFF }), geometry)
    }

    /// 将一组网格索引 (`x, y[, z]`) 设置为占据, 其余体素未占据.
    ///
    /// 任一索引越界时返回 `OutOfBounds`.
    pub fn from_indices<I, P>(geometry: Geometry, indices: I) -> RtResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[i64]>,
    {
        let mut mask = Self::new(geometry);
        for idx in indices {
            mask.grid.set_pixel(idx.as_ref(), ON)?;
        }
        Ok(mask)
    }

    /// 获取底层网格.
    #[inline]
    pub fn grid(&self) -> &Grid<f64> {
        &self.grid
    }

    /// 拆出底层网格.
    #[inline]
    pub fn into_grid(self) -> Grid<f64> {
        self.grid
    }

    /// 获取数据视图.
    #[inline]
    pub fn data(&self) -> ArrayViewD<'_, f64> {
        self.grid.data()
    }

    /// 获取可变数据视图.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.grid.data_mut()
    }

    /// 设置原点并更新 `end`.
    #[inline]
    pub fn set_origin(&mut self, origin: &[f64]) -> RtResult<()> {
        self.grid.set_origin(origin)
    }

    /// 按网格索引获取体素值, 越界返回 `None`.
    #[inline]
    pub fn get(&self, index: &[i64]) -> Option<f64> {
        self.grid.get(index).copied()
    }

    /// 网格索引处的体素是否被占据? 越界视为未占据.
    #[inline]
    pub fn is_occupied(&self, index: &[i64]) -> bool {
        self.get(index).map_or(false, occupancy::is_on)
    }

    /// 被占据的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data().iter().filter(|v| occupancy::is_on(**v)).count()
    }

    /// 掩膜中是否一个被占据的体素都没有?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data().iter().any(|v| occupancy::is_on(*v))
    }

    /// 所有值是否都是 0 或 1?
    #[inline]
    pub fn is_binary(&self) -> bool {
        self.data().iter().all(|v| *v == occupancy::OFF || *v == ON)
    }

    /// 将所有非零值置为 1.
    pub fn binarized(&self) -> Mask {
        self.grid
            .map(|v| if occupancy::is_on(*v) { ON } else { occupancy::OFF })
            .into()
    }

    /// 按行优先顺序返回所有被占据体素的数组下标 (`[z, ]y, x`).
    pub fn occupied_offsets(&self) -> Vec<Vec<usize>> {
        self.data()
            .indexed_iter()
            .filter(|(_, v)| occupancy::is_on(**v))
            .map(|(idx, _)| idx.slice().to_vec())
            .collect()
    }

    /// 按行优先顺序返回所有被占据体素的网格索引 (`x, y[, z]`).
    pub fn occupied_indices(&self) -> Vec<Vec<i64>> {
        let g = self.geometry();
        self.occupied_offsets()
            .iter()
            .map(|o| g.index_of(o))
            .collect()
    }

    /// 被占据体素网格索引 (`x, y[, z]`) 的包围盒, 下界闭, 上界开 (最大索引加一).
    ///
    /// 没有被占据体素时返回 `EmptyVolume`.
    pub fn bounds(&self) -> RtResult<(Vec<i64>, Vec<i64>)> {
        let indices = self.occupied_indices();
        let first = indices
            .first()
            .ok_or_else(|| RtError::empty("掩膜中没有被占据的体素"))?;
        let mut lo = first.clone();
        let mut hi = first.clone();
        for idx in &indices[1..] {
            for (d, v) in idx.iter().enumerate() {
                lo[d] = lo[d].min(*v);
                hi[d] = hi[d].max(*v);
            }
        }
        hi.iter_mut().for_each(|h| *h += 1);
        Ok((lo, hi))
    }

    /// 被占据体素的最小网格索引.
    #[inline]
    pub fn lower_bound(&self) -> RtResult<Vec<i64>> {
        self.bounds().map(|(lo, _)| lo)
    }

    /// 被占据体素的最大网格索引加一.
    #[inline]
    pub fn upper_bound(&self) -> RtResult<Vec<i64>> {
        self.bounds().map(|(_, hi)| hi)
    }

    /// 被占据体素的 (不加权) 网格索引均值.
    pub fn center_of_mass(&self) -> RtResult<Vec<f64>> {
        let indices = self.occupied_indices();
        if indices.is_empty() {
            return Err(RtError::empty("掩膜中没有被占据的体素"));
        }
        let n = indices.len() as f64;
        let mut acc = vec![0.0; self.dimension()];
        for idx in &indices {
            for (a, v) in acc.iter_mut().zip(idx) {
                *a += *v as f64;
            }
        }
        Ok(acc.into_iter().map(|a| a / n).collect())
    }

    /// 所有被占据体素中心的物理坐标, 每行一个点.
    pub fn to_point_cloud(&self) -> RtResult<Array2<f64>> {
        let indices = self.occupied_indices();
        let dim = self.dimension();
        let flat = indices
            .iter()
            .flat_map(|idx| idx.iter().map(|v| *v as f64))
            .collect();
        let indices = Array2::from_shape_vec((indices.len(), dim), flat)
            .map_err(|e| RtError::mismatch(e.to_string()))?;
        self.physical_points(indices.view())
    }

    /// 掩膜体积.
    ///
    /// 体积等于被占据体素数乘以体素体积. 给定 `edge_weight = w` 且 `w != 1` 时,
    /// 每个水平面内边缘体素 (不考虑 `z` 方向邻居) 只计 `w` 个体素.
    pub fn volume(&self, edge_weight: Option<f64>) -> f64 {
        let vv = self.voxel_volume();
        let mut volume = self.count() as f64 * vv;
        if let Some(w) = edge_weight {
            if w != 1.0 {
                let n_edge = self.count_edge_voxels(true);
                volume -= (1.0 - w) * n_edge as f64 * vv;
            }
        }
        volume
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{s, Array3, ArrayD, IxDyn};

    use super::*;

    fn cube_mask() -> Mask {
        // 5 × 5 × 5 网格中心的 3 × 3 × 3 立方体.
        let geom = Geometry::new(&[0.0, 0.0, 0.0], &[1.0, 2.0, 0.5], &[5, 5, 5]).unwrap();
        let mut data = Array3::zeros((5, 5, 5));
        data.slice_mut(s![1..4, 1..4, 1..4]).fill(1.0);
        Mask::from_array(data.into_dyn(), geom).unwrap()
    }

    #[test]
    fn test_mask_count_and_bounds() {
        let mask = cube_mask();
        assert_eq!(mask.count(), 27);
        assert!(!mask.is_empty());
        assert!(mask.is_binary());
        assert_eq!(mask.bounds().unwrap(), (vec![1, 1, 1], vec![4, 4, 4]));
        assert_eq!(mask.center_of_mass().unwrap(), vec![2.0, 2.0, 2.0]);
        assert!(mask.is_occupied(&[2, 2, 2]));
        assert!(!mask.is_occupied(&[0, 2, 2]));
        assert!(!mask.is_occupied(&[9, 9, 9]));
    }

    #[test]
    fn test_empty_mask_bounds() {
        let mask = Mask::new(Geometry::unit(&[3, 3, 3]).unwrap());
        assert!(mask.is_empty());
        assert!(matches!(mask.bounds(), Err(RtError::EmptyVolume(_))));
        assert!(matches!(
            mask.center_of_mass(),
            Err(RtError::EmptyVolume(_))
        ));
        assert_eq!(mask.to_point_cloud().unwrap().nrows(), 0);
    }

    #[test]
    fn test_mask_volume() {
        let mask = cube_mask();
        assert_relative_eq!(mask.volume(None), 27.0);
        assert_relative_eq!(mask.volume(Some(1.0)), 27.0);
        // 每层 8 个水平面内边缘体素, 共 24 个.
        assert_relative_eq!(mask.volume(Some(0.5)), 27.0 - 0.5 * 24.0);
    }

    #[test]
    fn test_from_indices_and_point_cloud() {
        let geom = Geometry::new(&[10.0, 20.0], &[0.5, 0.5], &[4, 4]).unwrap();
        let mask = Mask::from_indices(geom.clone(), [[0i64, 0], [3, 1]]).unwrap();
        assert_eq!(mask.count(), 2);
        let pts = mask.to_point_cloud().unwrap();
        assert_eq!(pts.row(0).to_vec(), vec![10.0, 20.0]);
        assert_eq!(pts.row(1).to_vec(), vec![11.5, 20.5]);

        assert!(matches!(
            Mask::from_indices(geom, [[4i64, 0]]),
            Err(RtError::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_binarized() {
        let geom = Geometry::unit(&[3, 1]).unwrap();
        let mask =
            Mask::from_array(ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![0.0, 0.25, 1.0]).unwrap(), geom)
                .unwrap();
        assert!(!mask.is_binary());
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.binarized().data().iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 1.0]);
    }
}
