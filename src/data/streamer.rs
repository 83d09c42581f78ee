//! Per-cell channel extraction and injection.
//!
//! A [`ChannelStreamer`] is the only place that knows what a block's payload
//! means. The layout transform calls it once per cell and never looks at the
//! block type itself.

use crate::data::block::CellBlock;
use crate::data::element::Element;

/// Conventional attribute labels understood by XDMF viewers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    Vector,
    Tensor,
    Matrix,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKind::Scalar => "Scalar",
            AttributeKind::Vector => "Vector",
            AttributeKind::Tensor => "Tensor",
            AttributeKind::Matrix => "Matrix",
        }
    }

    /// Label implied by a channel count (1, 3 or 9); anything else is a
    /// generic `Matrix`.
    pub fn for_channels(channels: usize) -> Self {
        match channels {
            1 => AttributeKind::Scalar,
            3 => AttributeKind::Vector,
            9 => AttributeKind::Tensor,
            _ => AttributeKind::Matrix,
        }
    }
}

/// Moves `CHANNELS` values per cell between a block of type `B` and a flat
/// buffer.
///
/// `extract` receives an output slice of exactly `CHANNELS` zeroed values.
/// `inject` receives exactly `CHANNELS` values read back from storage.
pub trait ChannelStreamer<B>: Sync {
    /// Values per cell: 1 for scalars, 3 for vectors, 9 for tensors.
    const CHANNELS: usize;

    /// Attribute label written into the sidecar.
    fn attribute_name(&self) -> &str {
        AttributeKind::for_channels(Self::CHANNELS).as_str()
    }

    fn extract<R: Element>(&self, block: &B, cell: [usize; 3], out: &mut [R]);

    fn inject<R: Element>(&self, block: &mut B, input: &[R], cell: [usize; 3]);
}

/// One `f64` per cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScalarStreamer;

impl ChannelStreamer<CellBlock<f64>> for ScalarStreamer {
    const CHANNELS: usize = 1;

    #[inline]
    fn extract<R: Element>(&self, block: &CellBlock<f64>, cell: [usize; 3], out: &mut [R]) {
        out[0] = R::from_f64_lossy(*block.get(cell));
    }

    #[inline]
    fn inject<R: Element>(&self, block: &mut CellBlock<f64>, input: &[R], cell: [usize; 3]) {
        *block.get_mut(cell) = input[0].into_f64();
    }
}

/// `N` `f64` components per cell, stored in component order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentStreamer<const N: usize>;

/// Three components per cell.
pub type VectorStreamer = ComponentStreamer<3>;
/// Nine components per cell (row-major 3×3).
pub type TensorStreamer = ComponentStreamer<9>;

impl<const N: usize> ChannelStreamer<CellBlock<[f64; N]>> for ComponentStreamer<N> {
    const CHANNELS: usize = N;

    #[inline]
    fn extract<R: Element>(&self, block: &CellBlock<[f64; N]>, cell: [usize; 3], out: &mut [R]) {
        for (o, &v) in out.iter_mut().zip(block.get(cell)) {
            *o = R::from_f64_lossy(v);
        }
    }

    #[inline]
    fn inject<R: Element>(&self, block: &mut CellBlock<[f64; N]>, input: &[R], cell: [usize; 3]) {
        for (c, &v) in block.get_mut(cell).iter_mut().zip(input) {
            *c = v.into_f64();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_channel_count() {
        assert_eq!(ScalarStreamer.attribute_name(), "Scalar");
        assert_eq!(VectorStreamer::default().attribute_name(), "Vector");
        assert_eq!(TensorStreamer::default().attribute_name(), "Tensor");
        assert_eq!(ComponentStreamer::<2>.attribute_name(), "Matrix");
    }

    #[test]
    fn vector_extract_then_inject_is_identity() {
        let src = CellBlock::from_fn([2, 2, 2], |[x, y, z]| [x as f64, y as f64, z as f64]);
        let mut dst = CellBlock::<[f64; 3]>::new([2, 2, 2]);
        let s = VectorStreamer::default();
        let mut tmp = [0.0f64; 3];
        s.extract(&src, [1, 0, 1], &mut tmp);
        assert_eq!(tmp, [1.0, 0.0, 1.0]);
        s.inject(&mut dst, &tmp, [1, 0, 1]);
        assert_eq!(dst.get([1, 0, 1]), src.get([1, 0, 1]));
    }
}
