// CPU Backend: reference host implementation of the tensormap Backend trait
//
// Storage is a plain Vec per dtype. Every read goes through the layout's
// strided iterator, so views (offsets, strides, stride-0 broadcasts) need no
// special cases here: the core rewrites layouts, this crate only walks them.
//
// DEVICES:
//   A CpuDevice is a *logical* host device identified by an ordinal ("cpu:0",
//   "cpu:1", ...). All of them live in host memory, but tensors on different
//   ordinals never share storage: moving between ordinals copies. Only
//   `CpuDevice::MAX_ORDINAL` ordinals exist; allocating on or transferring to
//   any other ordinal fails with `Error::Device`, which is how callers observe
//   an unavailable device.
//
// USAGE:
//   let device = CpuDevice::default();  // cpu:0
//   let tensor = CpuTensor::zeros((2, 3), DType::F32, &device)?;

use std::fmt;

use half::{bf16, f16};

use tensormap_core::backend::{Backend, BackendDevice, BackendStorage};
use tensormap_core::dtype::{DType, WithDType};
use tensormap_core::error::{Error, Result};
use tensormap_core::layout::Layout;
use tensormap_core::shape::Shape;
use tensormap_core::tensor::Tensor;

/// Tensor on the reference CPU backend.
pub type CpuTensor = Tensor<CpuBackend>;

// CpuDevice

/// A logical host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuDevice {
    ordinal: usize,
}

impl CpuDevice {
    /// Number of logical CPU devices.
    pub const MAX_ORDINAL: usize = 8;

    pub fn new(ordinal: usize) -> Self {
        CpuDevice { ordinal }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn is_available(&self) -> bool {
        self.ordinal < Self::MAX_ORDINAL
    }

    fn check_available(&self) -> Result<()> {
        if !self.is_available() {
            return Err(Error::device(
                self.name(),
                format!("only {} cpu devices exist", Self::MAX_ORDINAL),
            ));
        }
        Ok(())
    }
}

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        format!("cpu:{}", self.ordinal)
    }
}

// CpuStorage: host memory for each supported dtype

/// Host-side storage. Each variant holds a Vec of the corresponding type.
#[derive(Clone, PartialEq)]
pub enum CpuStorage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I64(Vec<i64>),
}

/// Run `$body` with `$v` bound to the typed Vec, rewrapping the result in
/// the same variant.
macro_rules! map_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::F16($v) => CpuStorage::F16($body),
            CpuStorage::BF16($v) => CpuStorage::BF16($body),
            CpuStorage::F32($v) => CpuStorage::F32($body),
            CpuStorage::F64($v) => CpuStorage::F64($body),
            CpuStorage::U8($v) => CpuStorage::U8($body),
            CpuStorage::U32($v) => CpuStorage::U32($body),
            CpuStorage::I64($v) => CpuStorage::I64($body),
        }
    };
}

/// Run `$body` with `$v` bound to the typed Vec.
macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::F16($v) => $body,
            CpuStorage::BF16($v) => $body,
            CpuStorage::F32($v) => $body,
            CpuStorage::F64($v) => $body,
            CpuStorage::U8($v) => $body,
            CpuStorage::U32($v) => $body,
            CpuStorage::I64($v) => $body,
        }
    };
}

impl fmt::Debug for CpuStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuStorage::{}(len={})", self.dtype(), self.len())
    }
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::U32(_) => DType::U32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }
}

impl CpuStorage {
    fn from_f64(data: &[f64], dtype: DType) -> Self {
        fn convert<T: WithDType>(data: &[f64]) -> Vec<T> {
            data.iter().map(|&v| T::from_f64(v)).collect()
        }
        match dtype {
            DType::F16 => CpuStorage::F16(convert(data)),
            DType::BF16 => CpuStorage::BF16(convert(data)),
            DType::F32 => CpuStorage::F32(convert(data)),
            DType::F64 => CpuStorage::F64(convert(data)),
            DType::U8 => CpuStorage::U8(convert(data)),
            DType::U32 => CpuStorage::U32(convert(data)),
            DType::I64 => CpuStorage::I64(convert(data)),
        }
    }
}

// Typed kernels

/// Read the elements addressed by `layout`, in logical order.
fn gather<T: Copy>(data: &[T], layout: &Layout) -> Result<Vec<T>> {
    layout
        .strided_indices()
        .map(|i| data.get(i).copied().ok_or_else(|| out_of_storage(i, data.len())))
        .collect()
}

fn out_of_storage(index: usize, len: usize) -> Error {
    Error::msg(format!(
        "layout addresses element {} of a storage of length {}",
        index, len
    ))
}

fn index_select_typed<T: Copy>(
    data: &[T],
    layout: &Layout,
    indices: &[usize],
    dim: usize,
) -> Result<Vec<T>> {
    let dims = layout.dims();
    if dim >= dims.len() {
        return Err(Error::DimOutOfRange {
            dim,
            rank: dims.len(),
        });
    }
    let size = dims[dim];
    if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
        return Err(Error::IndexOutOfBounds {
            index: bad as isize,
            dim,
            size,
        });
    }
    let src = gather(data, layout)?;
    let outer: usize = dims[..dim].iter().product();
    let inner: usize = dims[dim + 1..].iter().product();
    let mut out = Vec::with_capacity(outer * indices.len() * inner);
    for o in 0..outer {
        for &i in indices {
            let start = (o * size + i) * inner;
            out.extend_from_slice(&src[start..start + inner]);
        }
    }
    Ok(out)
}

fn masked_fill_typed<T: WithDType>(
    data: &[T],
    layout: &Layout,
    mask: &[bool],
    value: f64,
) -> Result<Vec<T>> {
    if mask.len() != layout.elem_count() {
        return Err(Error::ShapeMismatch {
            expected: layout.shape().clone(),
            got: Shape::from(mask.len()),
        });
    }
    let fill = T::from_f64(value);
    Ok(gather(data, layout)?
        .into_iter()
        .zip(mask)
        .map(|(v, &m)| if m { fill } else { v })
        .collect())
}

fn cat_typed<T: Copy>(parts: &[(&[T], &Layout)], dim: usize) -> Result<Vec<T>> {
    let (_, first) = parts[0];
    let outer: usize = first.dims()[..dim].iter().product();
    let blocks = parts
        .iter()
        .map(|&(data, layout)| {
            let block: usize = layout.dims()[dim..].iter().product();
            Ok((gather(data, layout)?, block))
        })
        .collect::<Result<Vec<_>>>()?;
    let total: usize = blocks.iter().map(|(b, _)| b.len()).sum();
    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for (data, block) in &blocks {
            out.extend_from_slice(&data[o * block..(o + 1) * block]);
        }
    }
    Ok(out)
}

fn assign_typed<T: Copy>(
    dst: &mut [T],
    dst_layout: &Layout,
    src: &[T],
    src_layout: &Layout,
) -> Result<()> {
    let values = gather(src, src_layout)?;
    let len = dst.len();
    for (i, v) in dst_layout.strided_indices().zip(values) {
        *dst.get_mut(i).ok_or_else(|| out_of_storage(i, len))? = v;
    }
    Ok(())
}

fn fill_typed<T: WithDType>(dst: &mut [T], layout: &Layout, value: f64) -> Result<()> {
    let v = T::from_f64(value);
    let len = dst.len();
    for i in layout.strided_indices() {
        *dst.get_mut(i).ok_or_else(|| out_of_storage(i, len))? = v;
    }
    Ok(())
}

// CpuBackend: The Backend trait implementation

/// The reference CPU backend. This is a zero-sized marker type.
#[derive(Clone, Debug)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    // ---- Creation ----

    fn zeros(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        Self::full(shape, 0.0, dtype, device)
    }

    fn full(shape: &Shape, val: f64, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        device.check_available()?;
        Ok(CpuStorage::from_f64(&vec![val; shape.elem_count()], dtype))
    }

    fn from_f64_slice(data: &[f64], dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        device.check_available()?;
        Ok(CpuStorage::from_f64(data, dtype))
    }

    // ---- Data movement ----

    fn to_contiguous(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        Ok(map_storage!(input, v => gather(v, layout)?))
    }

    fn to_f64_vec(input: &CpuStorage, layout: &Layout) -> Result<Vec<f64>> {
        with_storage!(input, v => Ok(gather(v, layout)?
            .into_iter()
            .map(WithDType::to_f64)
            .collect()))
    }

    fn cat(inputs: &[(&CpuStorage, &Layout)], out_shape: &Shape, dim: usize) -> Result<CpuStorage> {
        let first = match inputs.first() {
            Some((s, _)) => *s,
            None => return Err(Error::msg("cat: empty input list")),
        };

        macro_rules! cat_as {
            ($variant:ident) => {{
                let mut parts = Vec::with_capacity(inputs.len());
                for &(s, l) in inputs {
                    match s {
                        CpuStorage::$variant(v) => parts.push((v.as_slice(), l)),
                        other => {
                            return Err(Error::DTypeMismatch {
                                expected: DType::$variant,
                                got: other.dtype(),
                            })
                        }
                    }
                }
                CpuStorage::$variant(cat_typed(&parts, dim)?)
            }};
        }

        let out = match first.dtype() {
            DType::F16 => cat_as!(F16),
            DType::BF16 => cat_as!(BF16),
            DType::F32 => cat_as!(F32),
            DType::F64 => cat_as!(F64),
            DType::U8 => cat_as!(U8),
            DType::U32 => cat_as!(U32),
            DType::I64 => cat_as!(I64),
        };
        if out.len() != out_shape.elem_count() {
            return Err(Error::ShapeMismatch {
                expected: out_shape.clone(),
                got: Shape::from(out.len()),
            });
        }
        Ok(out)
    }

    fn index_select(
        input: &CpuStorage,
        layout: &Layout,
        indices: &[usize],
        dim: usize,
    ) -> Result<CpuStorage> {
        Ok(map_storage!(input, v => index_select_typed(v, layout, indices, dim)?))
    }

    fn masked_fill(
        input: &CpuStorage,
        layout: &Layout,
        mask: &[bool],
        value: f64,
    ) -> Result<CpuStorage> {
        Ok(map_storage!(input, v => masked_fill_typed(v, layout, mask, value)?))
    }

    // ---- In-place writes ----

    fn assign(
        dst: &mut CpuStorage,
        dst_layout: &Layout,
        src: &CpuStorage,
        src_layout: &Layout,
    ) -> Result<()> {
        if dst_layout.shape() != src_layout.shape() {
            return Err(Error::ShapeMismatch {
                expected: dst_layout.shape().clone(),
                got: src_layout.shape().clone(),
            });
        }
        match (dst, src) {
            (CpuStorage::F16(d), CpuStorage::F16(s)) => assign_typed(d, dst_layout, s, src_layout),
            (CpuStorage::BF16(d), CpuStorage::BF16(s)) => {
                assign_typed(d, dst_layout, s, src_layout)
            }
            (CpuStorage::F32(d), CpuStorage::F32(s)) => assign_typed(d, dst_layout, s, src_layout),
            (CpuStorage::F64(d), CpuStorage::F64(s)) => assign_typed(d, dst_layout, s, src_layout),
            (CpuStorage::U8(d), CpuStorage::U8(s)) => assign_typed(d, dst_layout, s, src_layout),
            (CpuStorage::U32(d), CpuStorage::U32(s)) => assign_typed(d, dst_layout, s, src_layout),
            (CpuStorage::I64(d), CpuStorage::I64(s)) => assign_typed(d, dst_layout, s, src_layout),
            (d, s) => Err(Error::DTypeMismatch {
                expected: d.dtype(),
                got: s.dtype(),
            }),
        }
    }

    fn fill(dst: &mut CpuStorage, layout: &Layout, value: f64) -> Result<()> {
        with_storage!(dst, v => fill_typed(v, layout, value))
    }

    // ---- Conversion ----

    fn transfer(
        input: &CpuStorage,
        layout: &Layout,
        _src: &CpuDevice,
        dst: &CpuDevice,
    ) -> Result<CpuStorage> {
        dst.check_available()?;
        Self::to_contiguous(input, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensormap_core::index::{BoolMask, TensorIndex};

    fn dev() -> CpuDevice {
        CpuDevice::default()
    }

    fn grid(rows: usize, cols: usize) -> Result<CpuTensor> {
        CpuTensor::arange(rows * cols, DType::F32, &dev())?.reshape((rows, cols))
    }

    #[test]
    fn test_device_names_and_availability() {
        assert_eq!(dev().name(), "cpu:0");
        assert_eq!(CpuDevice::new(3).name(), "cpu:3");
        assert!(CpuDevice::new(7).is_available());
        assert!(!CpuDevice::new(CpuDevice::MAX_ORDINAL).is_available());
    }

    #[test]
    fn test_storage_dtype_and_len() {
        let s = CpuStorage::from_f64(&[1.0, 2.0, 3.0], DType::BF16);
        assert_eq!(s.dtype(), DType::BF16);
        assert_eq!(s.len(), 3);
        assert_eq!(format!("{:?}", s), "CpuStorage::bf16(len=3)");
    }

    #[test]
    fn test_zeros_on_missing_device_fails() {
        let err = CpuTensor::zeros((2, 2), DType::F32, &CpuDevice::new(9)).unwrap_err();
        assert!(matches!(err, Error::Device { .. }));
    }

    #[test]
    fn test_transposed_read() -> Result<()> {
        let t = grid(2, 3)?.transpose(0, 1)?;
        assert_eq!(t.to_f64_vec()?, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_cat_strided_inputs() -> Result<()> {
        let a = grid(2, 2)?.transpose(0, 1)?; // [[0, 2], [1, 3]]
        let b = CpuTensor::full((2, 1), 9.0, DType::F32, &dev())?;
        let c = CpuTensor::cat(&[a, b], 1)?;
        assert_eq!(c.dims(), &[2, 3]);
        assert_eq!(c.to_f64_vec()?, vec![0.0, 2.0, 9.0, 1.0, 3.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_cat_dtype_mismatch() -> Result<()> {
        let a = grid(1, 2)?;
        let b = a.to_dtype(DType::F64)?;
        assert!(matches!(
            CpuTensor::cat(&[a, b], 0),
            Err(Error::DTypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_index_select_middle_dim() -> Result<()> {
        let t = CpuTensor::arange(12, DType::I64, &dev())?.reshape((2, 3, 2))?;
        let s = t.index_select(&[2, 0], 1)?;
        assert_eq!(s.dims(), &[2, 2, 2]);
        assert_eq!(
            s.to_f64_vec()?,
            vec![4.0, 5.0, 0.0, 1.0, 10.0, 11.0, 6.0, 7.0]
        );
        Ok(())
    }

    #[test]
    fn test_fill_through_strided_view() -> Result<()> {
        let t = grid(3, 3)?;
        let col = t.index(&[TensorIndex::Full, TensorIndex::Select(1)])?;
        col.fill_(-1.0)?;
        assert_eq!(
            t.to_f64_vec()?,
            vec![0.0, -1.0, 2.0, 3.0, -1.0, 5.0, 6.0, -1.0, 8.0]
        );
        Ok(())
    }

    #[test]
    fn test_assign_into_view() -> Result<()> {
        let t = CpuTensor::zeros((2, 3), DType::F64, &dev())?;
        let row = t.index(&[TensorIndex::Select(1)])?;
        let src = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0], 3, DType::F32, &dev())?;
        row.assign_(&src)?;
        assert_eq!(t.to_f64_vec()?, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_masked_fill_rows() -> Result<()> {
        let t = grid(3, 2)?;
        let mask = BoolMask::from_vec(vec![true, false, true]);
        let filled = t.masked_fill(&mask, 7.0)?;
        assert_eq!(filled.to_f64_vec()?, vec![7.0, 7.0, 2.0, 3.0, 7.0, 7.0]);
        // source untouched
        assert_eq!(t.to_f64_vec()?[0], 0.0);
        Ok(())
    }

    #[test]
    fn test_transfer_between_ordinals_copies() -> Result<()> {
        let t = grid(2, 2)?;
        let moved = t.to_device(&CpuDevice::new(1))?;
        assert_eq!(moved.device().ordinal(), 1);
        assert!(!moved.shares_storage(&t));
        assert_eq!(moved.to_f64_vec()?, t.to_f64_vec()?);
        assert!(matches!(
            t.to_device(&CpuDevice::new(8)),
            Err(Error::Device { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_cast_half() -> Result<()> {
        let t = CpuTensor::from_f64_slice(&[0.5, 1.25, -2.0], 3, DType::F64, &dev())?;
        let h = t.to_dtype(DType::F16)?;
        assert_eq!(h.dtype(), DType::F16);
        assert_eq!(h.to_f64_vec()?, vec![0.5, 1.25, -2.0]);
        Ok(())
    }
}
