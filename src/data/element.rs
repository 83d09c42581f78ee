//! Element precision of stored channel values.
//!
//! Values travel through the container as little-endian IEEE floats. On
//! little-endian hosts encoding is a plain byte view of the buffer.

use bytemuck::Pod;
use num_traits::Float;
use std::fmt::Debug;

/// On-disk element kind, identified by its byte width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F64,
}

impl ElementKind {
    /// Width in bytes; also the `Precision` printed in the sidecar.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            ElementKind::F32 => 4,
            ElementKind::F64 => 8,
        }
    }

    pub fn from_width(width: usize) -> Option<Self> {
        match width {
            4 => Some(ElementKind::F32),
            8 => Some(ElementKind::F64),
            _ => None,
        }
    }
}

/// A floating-point type that can be stored in a checkpoint dataset.
pub trait Element: Float + Pod + Default + Debug + Send + Sync + 'static {
    const KIND: ElementKind;

    /// Convert from the simulation's working precision (rounds for `f32`).
    fn from_f64_lossy(v: f64) -> Self;
    fn into_f64(self) -> f64;

    fn push_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
    #[inline]
    fn push_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(raw)
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::F64;

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v
    }
    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
    #[inline]
    fn push_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }
}

/// Append `values` to `out` as little-endian bytes.
pub fn encode_le<R: Element>(values: &[R], out: &mut Vec<u8>) {
    if cfg!(target_endian = "little") {
        out.extend_from_slice(bytemuck::cast_slice(values));
    } else {
        out.reserve(values.len() * R::KIND.width());
        for &v in values {
            v.push_le(out);
        }
    }
}

/// Fill `out` from little-endian `bytes`; `bytes.len()` must equal the byte
/// length of `out`.
pub fn decode_le<R: Element>(bytes: &[u8], out: &mut [R]) {
    debug_assert_eq!(bytes.len(), out.len() * R::KIND.width());
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice_mut::<R, u8>(out).copy_from_slice(bytes);
    } else {
        for (v, chunk) in out.iter_mut().zip(bytes.chunks_exact(R::KIND.width())) {
            *v = R::read_le(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_precision() {
        assert_eq!(<f32 as Element>::KIND.width(), 4);
        assert_eq!(<f64 as Element>::KIND.width(), 8);
        assert_eq!(ElementKind::from_width(8), Some(ElementKind::F64));
        assert_eq!(ElementKind::from_width(2), None);
    }

    #[test]
    fn le_bytes_are_portable() {
        let mut out = Vec::new();
        encode_le(&[1.0f32, -2.5], &mut out);
        assert_eq!(&out[..4], &1.0f32.to_le_bytes());
        assert_eq!(&out[4..], &(-2.5f32).to_le_bytes());

        let mut back = [0.0f32; 2];
        decode_le(&out, &mut back);
        assert_eq!(back, [1.0, -2.5]);
    }

    #[test]
    fn narrowing_rounds_to_nearest() {
        let v = <f32 as Element>::from_f64_lossy(0.1);
        assert_eq!(v, 0.1f32);
        assert_eq!(v.into_f64(), 0.1f32 as f64);
    }
}
