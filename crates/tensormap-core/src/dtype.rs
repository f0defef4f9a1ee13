use std::fmt;

// DType: element types a leaf tensor can hold
//
// Containers do not care about element types except when casting
// (`TensorMap::to_dtype`) and when joining tensors (stack/cat require the
// joined leaves to agree). The set mirrors what common array backends ship:
//
//   F16 / BF16: half precision
//   F32 / F64 : single / double precision
//   U8        : bytes and boolean masks
//   U32 / I64 : indices and labels

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::F16 | DType::BF16 => 2,
            DType::F32 | DType::U32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// WithDType: connects Rust scalar types to the DType enum
//
// Backends store typed vectors; this trait lets them write one generic
// routine per operation and convert through f64 at the API boundary.

/// Rust scalar types that can be stored in a tensor.
pub trait WithDType:
    Copy + Send + Sync + 'static + num_traits::NumCast + PartialEq + fmt::Debug
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;
}

macro_rules! with_dtype {
    ($ty:ty, $dtype:ident, $to:expr, $from:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = DType::$dtype;
            fn to_f64(self) -> f64 {
                $to(self)
            }
            fn from_f64(v: f64) -> Self {
                $from(v)
            }
        }
    };
}

with_dtype!(f32, F32, |v: f32| v as f64, |v: f64| v as f32);
with_dtype!(f64, F64, |v: f64| v, |v: f64| v);
with_dtype!(u8, U8, |v: u8| v as f64, |v: f64| v as u8);
with_dtype!(u32, U32, |v: u32| v as f64, |v: f64| v as u32);
with_dtype!(i64, I64, |v: i64| v as f64, |v: f64| v as i64);
with_dtype!(
    half::f16,
    F16,
    |v: half::f16| v.to_f64(),
    half::f16::from_f64
);
with_dtype!(
    half::bf16,
    BF16,
    |v: half::bf16| v.to_f64(),
    half::bf16::from_f64
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::BF16.size_in_bytes(), 2);
        assert_eq!(DType::U32.size_in_bytes(), 4);
        assert_eq!(DType::I64.size_in_bytes(), 8);
    }

    #[test]
    fn test_dtype_kinds() {
        assert!(DType::F16.is_half());
        assert!(!DType::F32.is_half());
        assert!(DType::I64.is_integer());
        assert!(!DType::F64.is_integer());
        assert_eq!(DType::BF16.to_string(), "bf16");
    }

    #[test]
    fn test_with_dtype_conversions() {
        assert_eq!(<f32 as WithDType>::DTYPE, DType::F32);
        assert_eq!(<i64 as WithDType>::from_f64(42.0), 42);
        assert_eq!(<half::f16 as WithDType>::from_f64(0.5).to_f64(), 0.5);
    }
}
