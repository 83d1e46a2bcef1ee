//! 掩膜变换.
//!
//! 包括表面扩张 / 收缩与壳层, 按卦限 / 上下 / 等厚切片分割,
//! 以及组合, 裁剪, 降采样和距离变换. 除距离变换返回距离网格外, 所有变换都返回新的掩膜. 输入均不会被修改.

mod distance;
mod general;
mod partition;
mod scale;

pub use distance::distance_transform;
pub use general::{combine, crop, downsample, fill_from_indices};
pub use partition::{halves, octants, slabs};
pub use scale::{contract, expand, shells, Expansion, Shell};
