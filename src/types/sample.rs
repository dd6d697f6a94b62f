//! Element types a reader can write samples into

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::SampleType;

/// A single numeric value independent of its storage width.
///
/// Rules, constants, offsets and cross-type conversions go through this carrier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            Scalar::Float(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Int(v) => v as u64,
            Scalar::UInt(v) => v,
            Scalar::Float(v) => v as u64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    /// `self + delta * index`, staying integral when both sides are.
    pub(crate) fn offset_by(self, delta: Scalar, index: i64) -> Scalar {
        match (self, delta) {
            (Scalar::Float(_), _) | (_, Scalar::Float(_)) => {
                Scalar::Float(self.as_f64() + delta.as_f64() * index as f64)
            }
            (Scalar::UInt(base), Scalar::UInt(step)) if index >= 0 => {
                Scalar::UInt(base.wrapping_add(step.wrapping_mul(index as u64)))
            }
            _ => Scalar::Int(self.as_i64().wrapping_add(delta.as_i64().wrapping_mul(index))),
        }
    }

    pub(crate) fn add(self, other: Scalar) -> Scalar {
        self.offset_by(other, 1)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// Start/end pair used by block-domain encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeInt64 {
    pub start: i64,
    pub end: i64,
}

/// Types that can receive decoded samples.
///
/// Each implementor is bound to exactly one [`SampleType`]; readers refuse to write
/// into a buffer whose element type differs from the configured read type.
pub trait Sample: Copy + Default + Debug + Send + Sync + 'static {
    const SAMPLE_TYPE: SampleType;

    /// Decode one element. `bytes` holds at least `SAMPLE_TYPE.size()` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this element.
    fn write_le(self, out: &mut Vec<u8>);

    fn to_scalar(self) -> Scalar;

    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_sample {
    ($ty:ty, $variant:ident, $size:expr, $scalar:ident, $conv:ident) => {
        impl Sample for $ty {
            const SAMPLE_TYPE: SampleType = SampleType::$variant;

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; $size];
                buf.copy_from_slice(&bytes[..$size]);
                <$ty>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn to_scalar(self) -> Scalar {
                Scalar::$scalar(self as _)
            }

            fn from_scalar(value: Scalar) -> Self {
                value.$conv() as $ty
            }
        }
    };
}

impl_sample!(i8, Int8, 1, Int, as_i64);
impl_sample!(u8, UInt8, 1, UInt, as_u64);
impl_sample!(i16, Int16, 2, Int, as_i64);
impl_sample!(u16, UInt16, 2, UInt, as_u64);
impl_sample!(i32, Int32, 4, Int, as_i64);
impl_sample!(u32, UInt32, 4, UInt, as_u64);
impl_sample!(i64, Int64, 8, Int, as_i64);
impl_sample!(u64, UInt64, 8, UInt, as_u64);
impl_sample!(f32, Float32, 4, Float, as_f64);
impl_sample!(f64, Float64, 8, Float, as_f64);

impl Sample for RangeInt64 {
    const SAMPLE_TYPE: SampleType = SampleType::RangeInt64;

    fn from_le_slice(bytes: &[u8]) -> Self {
        RangeInt64 {
            start: i64::from_le_slice(&bytes[..8]),
            end: i64::from_le_slice(&bytes[8..16]),
        }
    }

    fn write_le(self, out: &mut Vec<u8>) {
        self.start.write_le(out);
        self.end.write_le(out);
    }

    // Only the start participates in numeric conversions.
    fn to_scalar(self) -> Scalar {
        Scalar::Int(self.start)
    }

    fn from_scalar(value: Scalar) -> Self {
        let v = value.as_i64();
        RangeInt64 { start: v, end: v }
    }
}

/// Encode a slice of samples into a little-endian byte payload.
pub fn encode_samples<T: Sample>(samples: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * T::SAMPLE_TYPE.size());
    for sample in samples {
        sample.write_le(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scalar_conversions() {
        assert_eq!(Scalar::Float(3.7).as_i64(), 3);
        assert_eq!(Scalar::Int(-1).as_f64(), -1.0);
        assert_eq!(i16::from_scalar(Scalar::Int(300)), 300);
        assert_eq!(f32::from_scalar(Scalar::UInt(7)), 7.0);
    }

    #[test]
    fn offset_by_keeps_integers_exact() {
        let base = Scalar::Int(1_000_000_000_000_000_001);
        assert_eq!(base.offset_by(Scalar::Int(2), 3), Scalar::Int(1_000_000_000_000_000_007));
        assert_eq!(Scalar::Int(1).offset_by(Scalar::Float(0.5), 2), Scalar::Float(2.0));
    }

    #[test]
    fn range_converts_through_start() {
        let r = RangeInt64 { start: 10, end: 20 };
        assert_eq!(r.to_scalar(), Scalar::Int(10));
        assert_eq!(i64::from_scalar(r.to_scalar()), 10);
        let bytes = encode_samples(&[r]);
        assert_eq!(bytes.len(), 16);
        assert_eq!(RangeInt64::from_le_slice(&bytes), r);
    }

    proptest! {
        #[test]
        fn f64_decodes_what_it_encodes(value in any::<f64>()) {
            let bytes = encode_samples(&[value]);
            let decoded = f64::from_le_slice(&bytes);
            prop_assert_eq!(decoded.to_bits(), value.to_bits());
        }

        #[test]
        fn i32_widens_losslessly(value in any::<i32>()) {
            prop_assert_eq!(i64::from_scalar(value.to_scalar()), value as i64);
        }
    }
}
