use std::ops::{Index, IndexMut};

use itertools::izip;
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use num::Zero;

cfg_if::cfg_if! {
    if #[cfg(feature = "serde")] {
        use serde::{Deserialize, Serialize};
    }
}

use crate::error::{RtError, RtResult};

pub mod dose;
mod interp;
/// 占据掩膜.
pub mod mask;

pub use dose::{DoseGrid, DoseStats, DoseUnits};
pub use interp::PlaneWindow;
pub use mask::Mask;

/// 外部存储中记录的网格几何 (`x, y, z` 顺序).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRecord {
    /// 第一个体素中心的物理坐标.
    pub origin: [f64; 3],
    /// 体素间距.
    pub spacing: [f64; 3],
    /// 各方向体素个数.
    pub size: [usize; 3],
}

/// 轴对齐的网格坐标系统.
///
/// 所有向量均按照几何顺序 (`x, y[, z]`) 保存, 而数据数组的形状是其逆序 (`[z, ]y, x`).
/// 网格索引 `i` (对应数组下标 `i - index`) 的体素中心位于物理坐标 `origin + (i - index) * spacing`.
///
/// `end` 是缓存值, 修改 `origin` / `spacing` / `size` 之后需要调用 [`Geometry::update_end`] 重新计算.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    origin: Vec<f64>,
    spacing: Vec<f64>,
    index: Vec<i64>,
    size: Vec<usize>,
    end: Vec<f64>,
    direction: Vec<f64>,
}

/// 每个方向上至少要有一个体素.
fn check_size(size: &[usize]) -> RtResult<()> {
    if size.contains(&0) {
        return Err(RtError::mismatch(format!("size 必须为正: {size:?}")));
    }
    Ok(())
}

impl Geometry {
    /// 创建 2D 或 3D 网格坐标系统, 起始索引为 0, 方向为单位阵.
    ///
    /// 如果向量长度不一致, 维度不是 2 或 3, 间距不是有限正数, 或某个方向上的尺寸为 0,
    /// 则返回 `GeometryMismatch`.
    pub fn new(origin: &[f64], spacing: &[f64], size: &[usize]) -> RtResult<Self> {
        let dim = origin.len();
        if !(2..=3).contains(&dim) || spacing.len() != dim || size.len() != dim {
            return Err(RtError::mismatch(format!(
                "origin/spacing/size 长度必须同为 2 或 3, 实际为 {}/{}/{}",
                origin.len(),
                spacing.len(),
                size.len()
            )));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(RtError::mismatch(format!("origin 必须为有限值: {origin:?}")));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RtError::mismatch(format!(
                "spacing 必须为有限正数: {spacing:?}"
            )));
        }
        check_size(size)?;
        let mut direction = vec![0.0; dim * dim];
        for d in 0..dim {
            direction[d * dim + d] = 1.0;
        }
        let mut geom = Self {
            origin: origin.to_vec(),
            spacing: spacing.to_vec(),
            index: vec![0; dim],
            size: size.to_vec(),
            end: vec![0.0; dim],
            direction,
        };
        geom.update_end();
        Ok(geom)
    }

    /// 原点为 0, 间距为 1 的网格坐标系统.
    pub fn unit(size: &[usize]) -> RtResult<Self> {
        let dim = size.len();
        Self::new(&vec![0.0; dim], &vec![1.0; dim], size)
    }

    /// 从外部几何记录创建 3D 网格坐标系统.
    pub fn from_record(record: &GridRecord) -> RtResult<Self> {
        Self::new(&record.origin, &record.spacing, &record.size)
    }

    /// 转换为外部几何记录. 仅 3D 网格可用.
    pub fn to_record(&self) -> RtResult<GridRecord> {
        self.check_dim(3)?;
        Ok(GridRecord {
            origin: [self.origin[0], self.origin[1], self.origin[2]],
            spacing: [self.spacing[0], self.spacing[1], self.spacing[2]],
            size: [self.size[0], self.size[1], self.size[2]],
        })
    }

    /// 重新计算 `end = origin + (size - 1) * spacing`.
    pub fn update_end(&mut self) {
        self.end = izip!(&self.origin, &self.spacing, &self.size)
            .map(|(o, s, n)| o + (*n as f64 - 1.0) * s)
            .collect();
    }

    /// 设置原点. 需要手动调用 [`Geometry::update_end`].
    pub fn set_origin(&mut self, origin: &[f64]) -> RtResult<()> {
        self.check_dim(origin.len())?;
        self.origin.copy_from_slice(origin);
        Ok(())
    }

    /// 设置间距. 需要手动调用 [`Geometry::update_end`].
    pub fn set_spacing(&mut self, spacing: &[f64]) -> RtResult<()> {
        self.check_dim(spacing.len())?;
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(RtError::mismatch(format!(
                "spacing 必须为有限正数: {spacing:?}"
            )));
        }
        self.spacing.copy_from_slice(spacing);
        Ok(())
    }

    /// 设置起始索引.
    pub fn set_index(&mut self, index: &[i64]) -> RtResult<()> {
        self.check_dim(index.len())?;
        self.index.copy_from_slice(index);
        Ok(())
    }

    /// 设置尺寸. 需要手动调用 [`Geometry::update_end`].
    ///
    /// 网格对象 ([`Grid`]) 的尺寸由数据决定, 因此只有独立的 `Geometry` 才能修改尺寸.
    pub fn set_size(&mut self, size: &[usize]) -> RtResult<()> {
        self.check_dim(size.len())?;
        check_size(size)?;
        self.size.copy_from_slice(size);
        Ok(())
    }

    /// 检查输入维度是否与网格维度一致.
    #[inline]
    pub(crate) fn check_dim(&self, dim: usize) -> RtResult<()> {
        if dim == self.origin.len() {
            Ok(())
        } else {
            Err(RtError::mismatch(format!(
                "输入维度 {dim} 与网格维度 {} 不一致",
                self.origin.len()
            )))
        }
    }

    /// 连续索引是否落在 `index <= c < index + size` 之内?
    #[inline]
    pub(crate) fn contains_continuous(&self, cidx: &[f64]) -> bool {
        izip!(cidx, &self.index, &self.size)
            .all(|(c, i0, n)| *i0 as f64 <= *c && *c < (*i0 + *n as i64) as f64)
    }

    /// 将网格索引 (`x, y[, z]`) 转换为数组下标 (`[z, ]y, x`). 越界返回 `None`.
    pub fn offset_of(&self, index: &[i64]) -> Option<Vec<usize>> {
        if index.len() != self.dimension() {
            return None;
        }
        let mut offset = Vec::with_capacity(index.len());
        for (i, i0, n) in izip!(index, &self.index, &self.size).rev() {
            let o = i - i0;
            if o < 0 || o >= *n as i64 {
                return None;
            }
            offset.push(o as usize);
        }
        Some(offset)
    }

    /// 将数组下标 (`[z, ]y, x`) 转换为网格索引 (`x, y[, z]`).
    pub fn index_of(&self, offset: &[usize]) -> Vec<i64> {
        debug_assert_eq!(offset.len(), self.dimension());
        izip!(offset.iter().rev(), &self.index)
            .map(|(o, i0)| *o as i64 + i0)
            .collect()
    }

    /// 两个网格坐标系统的 origin, spacing, index 和 size 是否完全相同?
    #[inline]
    pub fn same_as(&self, other: &Geometry) -> bool {
        self.origin == other.origin
            && self.spacing == other.spacing
            && self.index == other.index
            && self.size == other.size
    }
}

impl GeometryAttr for Geometry {
    #[inline]
    fn geometry(&self) -> &Geometry {
        self
    }
}

/// 网格坐标系统的共用属性和坐标变换.
///
/// 单点变换接受长度为网格维度的切片; 批量变换接受 `N × dim` 的矩阵, 每一行是一个点.
pub trait GeometryAttr {
    /// 获取坐标系统.
    fn geometry(&self) -> &Geometry;

    /// 网格维度 (2 或 3).
    #[inline]
    fn dimension(&self) -> usize {
        self.geometry().origin.len()
    }

    /// 第一个体素中心的物理坐标.
    #[inline]
    fn origin(&self) -> &[f64] {
        &self.geometry().origin
    }

    /// 体素间距.
    #[inline]
    fn spacing(&self) -> &[f64] {
        &self.geometry().spacing
    }

    /// 第一个体素的网格索引.
    #[inline]
    fn start_index(&self) -> &[i64] {
        &self.geometry().index
    }

    /// 各个几何方向上的体素个数.
    #[inline]
    fn size(&self) -> &[usize] {
        &self.geometry().size
    }

    /// 最后一个体素中心的物理坐标.
    #[inline]
    fn end(&self) -> &[f64] {
        &self.geometry().end
    }

    /// 方向余弦矩阵 (按行展平). 目前总是单位阵.
    #[inline]
    fn direction(&self) -> &[f64] {
        &self.geometry().direction
    }

    /// 数据数组形状, 即 `size` 的逆序.
    #[inline]
    fn shape(&self) -> Vec<usize> {
        self.size().iter().rev().copied().collect()
    }

    /// 体素个数.
    #[inline]
    fn voxel_count(&self) -> usize {
        self.size().iter().product()
    }

    /// 单个体素体积 (2D 网格为面积).
    #[inline]
    fn voxel_volume(&self) -> f64 {
        self.spacing().iter().product::<f64>().abs()
    }

    /// 将 (连续) 网格索引转换为物理坐标.
    fn physical_point(&self, index: &[f64]) -> RtResult<Vec<f64>> {
        let g = self.geometry();
        g.check_dim(index.len())?;
        Ok(izip!(index, &g.origin, &g.spacing, &g.index)
            .map(|(i, o, s, i0)| o + (i - *i0 as f64) * s)
            .collect())
    }

    /// 批量将网格索引转换为物理坐标.
    fn physical_points(&self, indices: ArrayView2<f64>) -> RtResult<Array2<f64>> {
        let g = self.geometry();
        g.check_dim(indices.ncols())?;
        let mut out = indices.to_owned();
        for (d, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (o, s, i0) = (g.origin[d], g.spacing[d], g.index[d] as f64);
            col.mapv_inplace(|i| o + (i - i0) * s);
        }
        Ok(out)
    }

    /// 将物理坐标转换为连续网格索引, 同时返回该索引是否落在网格之内.
    fn continuous_index(&self, point: &[f64]) -> RtResult<(Vec<f64>, bool)> {
        let g = self.geometry();
        g.check_dim(point.len())?;
        let cidx: Vec<f64> = izip!(point, &g.origin, &g.spacing, &g.index)
            .map(|(p, o, s, i0)| (p - o) / s + *i0 as f64)
            .collect();
        let inside = g.contains_continuous(&cidx);
        Ok((cidx, inside))
    }

    /// 批量将物理坐标转换为连续网格索引.
    fn continuous_indices(&self, points: ArrayView2<f64>) -> RtResult<(Array2<f64>, Vec<bool>)> {
        let g = self.geometry();
        g.check_dim(points.ncols())?;
        let mut out = points.to_owned();
        for (d, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (o, s, i0) = (g.origin[d], g.spacing[d], g.index[d] as f64);
            col.mapv_inplace(|p| (p - o) / s + i0);
        }
        let inside = out
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().collect::<Vec<_>>())
            .map(|row| g.contains_continuous(&row))
            .collect();
        Ok((out, inside))
    }

    /// 将物理坐标转换为最近的整数网格索引 (四舍六入五成双), 同时返回连续索引是否落在网格之内.
    fn nearest_index(&self, point: &[f64]) -> RtResult<(Vec<i64>, bool)> {
        let (cidx, inside) = self.continuous_index(point)?;
        Ok((cidx.iter().map(|c| c.round_ties_even() as i64).collect(), inside))
    }

    /// 批量将物理坐标转换为最近的整数网格索引.
    fn nearest_indices(&self, points: ArrayView2<f64>) -> RtResult<(Array2<i64>, Vec<bool>)> {
        let (cidx, inside) = self.continuous_indices(points)?;
        Ok((cidx.mapv(|c| c.round_ties_even() as i64), inside))
    }
}

/// 带坐标系统的稠密数据网格.
///
/// 数据数组形状总是等于 `geometry` 的尺寸逆序.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    geometry: Geometry,
    data: ArrayD<T>,
}

impl<T> GeometryAttr for Grid<T> {
    #[inline]
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl<T: Clone + Zero> Grid<T> {
    /// 创建全零网格.
    pub fn zeros(geometry: Geometry) -> Self {
        let data = ArrayD::zeros(IxDyn(&geometry.shape()));
        Self { geometry, data }
    }
}

impl<T: Clone> Grid<T> {
    /// 创建以 `value` 填充的网格.
    pub fn filled(geometry: Geometry, value: T) -> Self {
        let data = ArrayD::from_elem(IxDyn(&geometry.shape()), value);
        Self { geometry, data }
    }
}

impl<T> Grid<T> {
    /// 由数据数组和坐标系统创建网格. 数组形状必须等于坐标系统尺寸的逆序.
    pub fn from_array(data: ArrayD<T>, geometry: Geometry) -> RtResult<Self> {
        if data.shape() != geometry.shape().as_slice() {
            return Err(RtError::mismatch(format!(
                "数据形状 {:?} 与网格形状 {:?} 不一致",
                data.shape(),
                geometry.shape()
            )));
        }
        Ok(Self { geometry, data })
    }

    /// 由按行优先顺序 (`x` 变化最快) 排列的缓冲区创建网格.
    pub fn from_shape_vec(geometry: Geometry, buffer: Vec<T>) -> RtResult<Self> {
        let shape = geometry.shape();
        let expected: usize = shape.iter().product();
        if buffer.len() != expected {
            return Err(RtError::mismatch(format!(
                "缓冲区长度 {} 与网格体素个数 {expected} 不一致",
                buffer.len()
            )));
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), buffer)
            .map_err(|e| RtError::mismatch(e.to_string()))?;
        Ok(Self { geometry, data })
    }

    /// 获取数据视图.
    #[inline]
    pub fn data(&self) -> ArrayViewD<'_, T> {
        self.data.view()
    }

    /// 获取可变数据视图.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, T> {
        self.data.view_mut()
    }

    /// 拆分为坐标系统和数据数组.
    #[inline]
    pub fn into_parts(self) -> (Geometry, ArrayD<T>) {
        (self.geometry, self.data)
    }

    /// 设置原点并更新 `end`.
    pub fn set_origin(&mut self, origin: &[f64]) -> RtResult<()> {
        self.geometry.set_origin(origin)?;
        self.geometry.update_end();
        Ok(())
    }

    /// 设置间距并更新 `end`.
    pub fn set_spacing(&mut self, spacing: &[f64]) -> RtResult<()> {
        self.geometry.set_spacing(spacing)?;
        self.geometry.update_end();
        Ok(())
    }

    /// 设置起始索引.
    #[inline]
    pub fn set_start_index(&mut self, index: &[i64]) -> RtResult<()> {
        self.geometry.set_index(index)
    }

    /// 复制另一网格的坐标系统. 两者尺寸必须一致, 否则返回 `GeometryMismatch`.
    pub fn copy_geometry<G: GeometryAttr + ?Sized>(&mut self, other: &G) -> RtResult<()> {
        if other.size() != self.geometry.size.as_slice() {
            return Err(RtError::mismatch(format!(
                "尺寸 {:?} 与 {:?} 不一致",
                other.size(),
                self.geometry.size
            )));
        }
        self.geometry = other.geometry().clone();
        Ok(())
    }

    /// 按网格索引 (`x, y[, z]`) 获取体素值. 越界返回 `None`.
    #[inline]
    pub fn get(&self, index: &[i64]) -> Option<&T> {
        let offset = self.geometry.offset_of(index)?;
        self.data.get(offset.as_slice())
    }

    /// 按网格索引 (`x, y[, z]`) 获取可变体素值. 越界返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, index: &[i64]) -> Option<&mut T> {
        let offset = self.geometry.offset_of(index)?;
        self.data.get_mut(offset.as_slice())
    }

    /// 对每个体素应用 `f`, 生成同坐标系统的新网格.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            geometry: self.geometry.clone(),
            data: self.data.map(f),
        }
    }

    /// 用新数据替换当前数据, 生成同坐标系统的新网格.
    pub fn with_data<U>(&self, data: ArrayD<U>) -> RtResult<Grid<U>> {
        Grid::from_array(data, self.geometry.clone())
    }
}

impl<T: Copy> Grid<T> {
    /// 将所有体素设置为 `value`.
    #[inline]
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// 按网格索引获取体素值. 越界时返回 `OutOfBounds`.
    pub fn pixel(&self, index: &[i64]) -> RtResult<T> {
        self.get(index)
            .copied()
            .ok_or_else(|| RtError::out_of_bounds(format!("网格索引 {index:?} 越界")))
    }

    /// 按网格索引设置体素值. 越界时返回 `OutOfBounds`.
    pub fn set_pixel(&mut self, index: &[i64], value: T) -> RtResult<()> {
        let v = self
            .get_mut(index)
            .ok_or_else(|| RtError::out_of_bounds(format!("网格索引 {index:?} 越界")))?;
        *v = value;
        Ok(())
    }
}

/// 按数组下标 (`[z, ]y, x`) 访问, 越界时 panic.
impl<T> Index<&[usize]> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, offset: &[usize]) -> &Self::Output {
        &self.data[offset]
    }
}

impl<T> IndexMut<&[usize]> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, offset: &[usize]) -> &mut Self::Output {
        &mut self.data[offset]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    fn geometry_3d() -> Geometry {
        Geometry::new(&[-10.0, 5.0, 2.0], &[0.5, 2.0, 3.0], &[4, 3, 2]).unwrap()
    }

    #[test]
    fn test_geometry_new_invalid() {
        assert!(matches!(
            Geometry::new(&[0.0, 0.0], &[1.0, 1.0, 1.0], &[1, 1, 1]),
            Err(RtError::GeometryMismatch(_))
        ));
        assert!(matches!(
            Geometry::new(&[0.0], &[1.0], &[1]),
            Err(RtError::GeometryMismatch(_))
        ));
        assert!(matches!(
            Geometry::new(&[0.0, 0.0], &[1.0, 0.0], &[1, 1]),
            Err(RtError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_geometry_rejects_zero_size() {
        assert!(matches!(
            Geometry::new(&[0.0; 3], &[1.0; 3], &[0, 2, 2]),
            Err(RtError::GeometryMismatch(_))
        ));
        assert!(matches!(
            Geometry::unit(&[2, 0]),
            Err(RtError::GeometryMismatch(_))
        ));

        let mut g = geometry_3d();
        assert!(matches!(
            g.set_size(&[4, 0, 2]),
            Err(RtError::GeometryMismatch(_))
        ));
        assert_eq!(g.size(), &[4, 3, 2]);

        let record = GridRecord {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            size: [2, 2, 0],
        };
        assert!(Geometry::from_record(&record).is_err());
    }

    #[test]
    fn test_geometry_end_and_shape() {
        let g = geometry_3d();
        assert_eq!(g.end(), &[-8.5, 9.0, 5.0]);
        assert_eq!(g.shape(), vec![2, 3, 4]);
        assert_eq!(g.voxel_count(), 24);
        assert_relative_eq!(g.voxel_volume(), 3.0);
        assert_eq!(g.direction(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_physical_continuous_roundtrip() {
        let mut g = geometry_3d();
        g.set_index(&[2, -1, 5]).unwrap();
        let p = g.physical_point(&[3.0, 0.5, 6.0]).unwrap();
        assert_eq!(p, vec![-9.5, 8.0, 5.0]);
        let (c, inside) = g.continuous_index(&p).unwrap();
        assert_eq!(c, vec![3.0, 0.5, 6.0]);
        assert!(inside);

        // 上界是开区间.
        let (_, inside) = g.continuous_index(&[-8.0, 5.0, 2.0]).unwrap();
        assert!(!inside);
        // 网格内但超过最后一个体素中心的位置仍然 "在界内".
        let (c, inside) = g.continuous_index(&[-8.4, 5.0, 2.0]).unwrap();
        assert_relative_eq!(c[0], 5.2, epsilon = 1e-12);
        assert!(inside);
    }

    #[test]
    fn test_batch_transforms() {
        let g = geometry_3d();
        let idx = array![[0.0, 0.0, 0.0], [3.0, 2.0, 1.0], [4.0, 0.0, 0.0]];
        let pts = g.physical_points(idx.view()).unwrap();
        assert_eq!(pts.row(1).to_vec(), vec![-8.5, 9.0, 5.0]);

        let (back, inside) = g.continuous_indices(pts.view()).unwrap();
        assert_eq!(back, idx);
        assert_eq!(inside, vec![true, true, false]);

        let (near, _) = g
            .nearest_indices(array![[-9.76, 6.1, 3.4]].view())
            .unwrap();
        assert_eq!(near.row(0).to_vec(), vec![0, 1, 0]);

        assert!(matches!(
            g.physical_points(array![[1.0, 2.0]].view()),
            Err(RtError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_nearest_rounds_half_to_even() {
        let g = Geometry::unit(&[8, 8]).unwrap();
        assert_eq!(g.nearest_index(&[2.5, 3.5]).unwrap().0, vec![2, 4]);
        assert_eq!(g.nearest_index(&[-0.5, 0.49]).unwrap().0, vec![0, 0]);
    }

    #[test]
    fn test_offset_and_index_of() {
        let mut g = geometry_3d();
        g.set_index(&[1, 1, 1]).unwrap();
        assert_eq!(g.offset_of(&[4, 3, 2]), Some(vec![1, 2, 3]));
        assert_eq!(g.offset_of(&[0, 1, 1]), None);
        assert_eq!(g.offset_of(&[5, 1, 1]), None);
        assert_eq!(g.index_of(&[1, 2, 3]), vec![4, 3, 2]);
    }

    #[test]
    fn test_grid_construction() {
        let g = geometry_3d();
        let grid = Grid::<f32>::zeros(g.clone());
        assert_eq!(grid.data().shape(), &[2, 3, 4]);

        let buf: Vec<u8> = (0..24).collect();
        let grid = Grid::from_shape_vec(g.clone(), buf).unwrap();
        // x 变化最快.
        assert_eq!(grid.pixel(&[1, 0, 0]).unwrap(), 1);
        assert_eq!(grid.pixel(&[0, 1, 0]).unwrap(), 4);
        assert_eq!(grid.pixel(&[0, 0, 1]).unwrap(), 12);
        assert_eq!(grid[&[1, 2, 3][..]], 23);
        assert!(matches!(
            grid.pixel(&[4, 0, 0]),
            Err(RtError::OutOfBounds(_))
        ));

        assert!(matches!(
            Grid::from_shape_vec(g.clone(), vec![0u8; 23]),
            Err(RtError::GeometryMismatch(_))
        ));
        assert!(matches!(
            Grid::from_array(ArrayD::<f64>::zeros(IxDyn(&[4, 3, 2])), g),
            Err(RtError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_grid_set_origin_updates_end() {
        let mut grid = Grid::<f64>::zeros(geometry_3d());
        grid.set_origin(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(grid.end(), &[1.5, 4.0, 3.0]);
        grid.set_pixel(&[3, 2, 1], 7.0).unwrap();
        assert_eq!(grid.data()[[1, 2, 3]], 7.0);
    }

    #[test]
    fn test_record_roundtrip() {
        let rec = GridRecord {
            origin: [1.0, 2.0, 3.0],
            spacing: [1.0, 1.0, 2.5],
            size: [5, 6, 7],
        };
        let g = Geometry::from_record(&rec).unwrap();
        assert_eq!(g.to_record().unwrap(), rec);
        assert!(Geometry::unit(&[2, 2]).unwrap().to_record().is_err());
    }
}
