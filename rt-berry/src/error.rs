//! 运行时错误.

use thiserror::Error;

/// 几何 / 剂量计算的运行时错误.
///
/// 每一个变体都携带一条可读的描述信息, 用于说明具体是哪一次调用检测到了该错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtError {
    /// 两个网格之间的维度或形状不兼容, 或批量输入的列数与网格维度不符.
    #[error("几何不匹配: {0}")]
    GeometryMismatch(String),

    /// 所需的点或平面在目标网格中没有有效数据.
    #[error("越界: {0}")]
    OutOfBounds(String),

    /// 需要至少一个被占据的体素, 但实际一个也没有.
    #[error("空体积: {0}")]
    EmptyVolume(String),

    /// 轮廓点数组形状错误, 或轮廓列表为空.
    #[error("轮廓格式错误: {0}")]
    MalformedContour(String),

    /// 参数非法 (负扩张量, 直方图分箱数过少等).
    #[error("非法参数: {0}")]
    InvalidParameter(String),
}

impl RtError {
    #[inline]
    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Self::GeometryMismatch(msg.into())
    }

    #[inline]
    pub(crate) fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfBounds(msg.into())
    }

    #[inline]
    pub(crate) fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyVolume(msg.into())
    }

    #[inline]
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContour(msg.into())
    }

    #[inline]
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// 几何 / 剂量计算结果.
pub type RtResult<T> = Result<T, RtError>;
