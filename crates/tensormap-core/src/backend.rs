use std::fmt;

use crate::dtype::DType;
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;

// Backend: the tensor capability consumed by the container
//
// The container never does arithmetic. What it needs from a tensor library is
// a small, fixed operation set: create storage, read it back, copy it into a
// contiguous buffer, join buffers, gather rows, write values in place, change
// dtype and move between devices. Everything shape-related (views, slicing,
// squeeze, permute, broadcast) is handled above this trait by rewriting the
// Layout, so backends only ever see storage + layout pairs.
//
// A backend is a trait rather than an enum so that a new device can live in
// its own crate; `Tensor<B>` is generic over it.

/// Identifies a compute device (e.g., "cpu:0").
pub trait BackendDevice: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device (e.g., "cpu:0", "cuda:1").
    fn name(&self) -> String;
}

/// A storage buffer that holds tensor data on a specific device.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements that fit in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The operation set every backend provides.
///
/// Read operations take storage + layout (the layout encodes which elements,
/// in which order) and return new contiguous storage. In-place operations take
/// `&mut` storage and write only the positions the layout addresses, so views
/// sharing the storage observe the write.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The storage type for this backend.
    type Storage: BackendStorage;

    //  Creation

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage filled with a constant value.
    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Data movement

    /// Copy the elements addressed by `layout` into new contiguous storage.
    fn to_contiguous(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// Copy the elements addressed by `layout` to the host as f64.
    fn to_f64_vec(input: &Self::Storage, layout: &Layout) -> Result<Vec<f64>>;

    /// Concatenate inputs along `dim` into one contiguous storage of `out_shape`.
    fn cat(
        inputs: &[(&Self::Storage, &Layout)],
        out_shape: &Shape,
        dim: usize,
    ) -> Result<Self::Storage>;

    /// Gather positions `indices` along `dim`. The output is contiguous, with
    /// the dim resized to `indices.len()`.
    fn index_select(
        input: &Self::Storage,
        layout: &Layout,
        indices: &[usize],
        dim: usize,
    ) -> Result<Self::Storage>;

    /// Replace the elements whose `mask` entry is set (one flag per element,
    /// logical order) by `value`. Returns contiguous storage.
    fn masked_fill(
        input: &Self::Storage,
        layout: &Layout,
        mask: &[bool],
        value: f64,
    ) -> Result<Self::Storage>;

    //  In-place writes

    /// Write the elements of `src` (read through `src_layout`) into the
    /// positions of `dst` addressed by `dst_layout`. Shapes must match.
    fn assign(
        dst: &mut Self::Storage,
        dst_layout: &Layout,
        src: &Self::Storage,
        src_layout: &Layout,
    ) -> Result<()>;

    /// Set every position of `dst` addressed by `layout` to `value`.
    fn fill(dst: &mut Self::Storage, layout: &Layout, value: f64) -> Result<()>;

    //  Conversion

    /// Cast to another dtype.
    ///
    /// The default implementation round-trips through the host as f64.
    fn cast(
        input: &Self::Storage,
        layout: &Layout,
        dtype: DType,
        device: &Self::Device,
    ) -> Result<Self::Storage> {
        let data = Self::to_f64_vec(input, layout)?;
        Self::from_f64_slice(&data, dtype, device)
    }

    /// Move the elements addressed by `layout` to device `dst` as contiguous
    /// storage. Fails with `Error::Device` when `dst` cannot hold them.
    fn transfer(
        input: &Self::Storage,
        layout: &Layout,
        src: &Self::Device,
        dst: &Self::Device,
    ) -> Result<Self::Storage>;
}
