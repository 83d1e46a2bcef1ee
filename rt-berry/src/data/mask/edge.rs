use ndarray::{ArrayD, ArrayViewD, Dimension};

use super::Mask;
use crate::data::Grid;
use crate::consts::occupancy::{is_off, is_on, ON};

/// 判断 `pos` 在 `first_axis..` 各数组方向上的直接邻居中是否有未被占据的体素.
/// 数组之外的邻居不计入.
fn has_vacant_neighbour(data: &ArrayViewD<f64>, pos: &mut [usize], first_axis: usize) -> bool {
    for axis in first_axis..pos.len() {
        let p = pos[axis];
        for q in [p.wrapping_sub(1), p.saturating_add(1)] {
            pos[axis] = q;
            let vacant = matches!(data.get(&*pos), Some(&v) if is_off(v));
            pos[axis] = p;
            if vacant {
                return true;
            }
        }
    }
    false
}

impl Mask {
    /// 获取边缘体素掩膜.
    ///
    /// 边缘体素是至少有一个未被占据的直接邻居 (3D 为 6-邻域) 的被占据体素.
    /// 如果 `exclude_last_axis` 为 `true`, 则不考虑最后一个几何方向 (通常为 `z`) 上的邻居,
    /// 3D 网格即为水平面内的 4-邻域.
    ///
    /// # 注意
    ///
    /// 网格之外的位置不视为未占据, 因此贴着网格边界的体素只会因为朝内的邻居而成为边缘体素.
    pub fn edge_voxels(&self, exclude_last_axis: bool) -> Mask {
        let data = self.data();
        let first_axis = usize::from(exclude_last_axis);
        let mut out = ArrayD::zeros(data.raw_dim());
        let mut probe = Vec::with_capacity(data.ndim());
        for (idx, v) in data.indexed_iter() {
            if !is_on(*v) {
                continue;
            }
            probe.clear();
            probe.extend_from_slice(idx.slice());
            if has_vacant_neighbour(&data, &mut probe, first_axis) {
                out[idx.slice()] = ON;
            }
        }
        Mask::from(Grid {
            geometry: self.grid.geometry.clone(),
            data: out,
        })
    }

    /// 边缘体素个数. 参见 [`Mask::edge_voxels`].
    pub fn count_edge_voxels(&self, exclude_last_axis: bool) -> usize {
        let data = self.data();
        let first_axis = usize::from(exclude_last_axis);
        let mut probe = Vec::with_capacity(data.ndim());
        data.indexed_iter()
            .filter(|(_, v)| is_on(**v))
            .filter(|(idx, _)| {
                probe.clear();
                probe.extend_from_slice(idx.slice());
                has_vacant_neighbour(&data, &mut probe, first_axis)
            })
            .count()
    }
}
