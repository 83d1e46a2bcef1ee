//! 掩膜的持久化形式: 游程编码字符串和 (可能经过 gzip 压缩的) 字节缓冲区.
//!
//! 游程编码把按行优先顺序 (`x` 变化最快) 展平的占据状态写成状态翻转位置的列表,
//! 以逗号分隔. 编码隐含一个位于缓冲区之前的 "未占据" 状态, 因此第一个数字是第一个被占据体素的位置.

use std::io::Read;

use flate2::read::GzDecoder;
use itertools::Itertools;
use ndarray::{ArrayD, IxDyn};

use super::Mask;
use crate::consts::occupancy::{is_on, OFF, ON};
use crate::data::Geometry;
use crate::error::{RtError, RtResult};

/// 解析以逗号分隔的翻转位置. 空字符串表示没有翻转.
fn parse_cuts(code: &str, len: usize) -> RtResult<Vec<usize>> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(Vec::new());
    }
    let cuts: Vec<usize> = code
        .split(',')
        .map(|c| {
            c.trim()
                .parse::<usize>()
                .map_err(|e| RtError::invalid(format!("无法解析游程编码 `{c}`: {e}")))
        })
        .collect::<RtResult<_>>()?;
    if let Some(c) = cuts.iter().find(|c| **c > len) {
        return Err(RtError::invalid(format!(
            "游程编码位置 {c} 超出缓冲区长度 {len}"
        )));
    }
    if !cuts.iter().tuple_windows().all(|(a, b)| a <= b) {
        return Err(RtError::invalid("游程编码位置必须单调不减"));
    }
    Ok(cuts)
}

/// 从 `initial` 状态开始, 每遇到一个翻转位置就切换状态, 最后一段延续到缓冲区末尾.
fn fill_runs(cuts: &[usize], len: usize, initial: bool) -> Vec<f64> {
    let mut buf = Vec::with_capacity(len);
    let mut state = initial;
    for &c in cuts {
        buf.resize(c, if state { ON } else { OFF });
        state = !state;
    }
    buf.resize(len, if state { ON } else { OFF });
    buf
}

fn unit_mask(buf: Vec<f64>, shape: &[usize]) -> RtResult<Mask> {
    let size: Vec<usize> = shape.iter().rev().copied().collect();
    let geometry = Geometry::unit(&size)?;
    let data = ArrayD::from_shape_vec(IxDyn(shape), buf)
        .map_err(|e| RtError::mismatch(e.to_string()))?;
    Mask::from_array(data, geometry)
}

impl Mask {
    /// 占据状态翻转的位置 (按行优先顺序展平). 缓冲区之前的状态视为未占据.
    pub fn run_length_cuts(&self) -> Vec<usize> {
        let mut prev = false;
        let mut cuts = Vec::new();
        for (i, v) in self.data().iter().enumerate() {
            let on = is_on(*v);
            if on != prev {
                cuts.push(i);
                prev = on;
            }
        }
        cuts
    }

    /// 游程编码字符串, 以逗号分隔翻转位置. 空掩膜编码为空字符串.
    #[inline]
    pub fn run_length_encode(&self) -> String {
        self.run_length_cuts().iter().join(",")
    }

    /// 由游程编码字符串和数组形状 (`[z, ]y, x`) 还原二值掩膜. 原点为 0, 间距为 1.
    ///
    /// 无法解析, 位置越界或不单调时返回 `InvalidParameter`.
    pub fn run_length_decode(code: &str, shape: &[usize]) -> RtResult<Mask> {
        let len = shape.iter().product();
        let cuts = parse_cuts(code, len)?;
        unit_mask(fill_runs(&cuts, len, false), shape)
    }

    /// 解码旧格式的游程编码字符串.
    ///
    /// 旧格式假定缓冲区之前的状态为 "占据", 因此以未占据体素开头的掩膜总是以 `0` 开始.
    pub fn run_length_decode_legacy(code: &str, shape: &[usize]) -> RtResult<Mask> {
        let len = shape.iter().product();
        let cuts = parse_cuts(code, len)?;
        unit_mask(fill_runs(&cuts, len, true), shape)
    }

    /// 由每个体素一个字节的缓冲区创建二值掩膜, 非零字节视为占据.
    ///
    /// 缓冲区可以是 gzip 压缩的, 无法解压时按原始字节处理.
    /// 字节数与形状不一致时返回 `GeometryMismatch`.
    pub fn from_binary_bytes(bytes: &[u8], shape: &[usize]) -> RtResult<Mask> {
        let mut raw = Vec::new();
        let buf = match GzDecoder::new(bytes).read_to_end(&mut raw) {
            Ok(_) => raw.as_slice(),
            Err(_) => bytes,
        };
        let len: usize = shape.iter().product();
        if buf.len() != len {
            return Err(RtError::mismatch(format!(
                "字节数 {} 与形状 {shape:?} 不一致",
                buf.len()
            )));
        }
        let buf = buf.iter().map(|b| if *b != 0 { ON } else { OFF }).collect();
        unit_mask(buf, shape)
    }
}
