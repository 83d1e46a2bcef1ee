//! 通用常量.

/// 体素占据值.
pub mod occupancy {
    /// 未被占据的体素值.
    pub const OFF: f64 = 0.0;

    /// 完全被占据的体素值.
    pub const ON: f64 = 1.0;

    /// 体素是否被占据? 任何非零值 (包括分数占据) 都视为占据.
    #[inline]
    pub fn is_on(v: f64) -> bool {
        v != OFF
    }

    /// 体素是否未被占据?
    #[inline]
    pub fn is_off(v: f64) -> bool {
        !is_on(v)
    }
}

/// 几何容差.
pub mod tolerance {
    /// 点在多边形内判定的默认扩张半径 (物理单位).
    ///
    /// 用于吸收共享边上的浮点舍入误差.
    pub const CONTAINS_RADIUS: f64 = 1e-4;
}

/// DVH 默认分箱数.
pub const DEFAULT_DVH_BINS: usize = 200;

/// 未指定尺寸和间距时, 由轮廓推导出的掩膜在水平方向上的默认体素个数.
pub const DEFAULT_MASK_SIZE_XY: usize = 256;
