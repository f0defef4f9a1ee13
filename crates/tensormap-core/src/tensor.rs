use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{Backend, BackendDevice};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::index::{BoolMask, IndexPlan, TensorIndex};
use crate::layout::Layout;
use crate::shape::Shape;

// Tensor: a handle on backend storage plus a layout
//
// The container stores `Tensor<B>` values as its leaves. A tensor is:
//
//   1. storage on a device, owned by the backend
//   2. a Layout (shape + strides + offset) selecting elements of it
//   3. a dtype and the device it lives on
//
// MEMORY MODEL:
//
//   The handle is an Arc around the inner data, so `Clone` is O(1) and never
//   copies elements. Storage itself sits behind Arc<RwLock<_>>:
//
//   - view-producing operations (basic index, narrow, permute, squeeze,
//     unsqueeze, expand, view, reshape when strides allow) build a new
//     handle with a new Layout over the *same* storage;
//   - copy-producing operations (advanced index, cat/stack, contiguous on a
//     strided view, deep_clone, to_device, to_dtype) allocate new storage;
//   - in-place operations (fill_, assign_, masked_fill_) take the write lock
//     and modify the shared storage, so every view observes the change.
//
//   `deep_clone` is the explicit way to get storage nobody else sees.

struct TensorInner<B: Backend> {
    storage: Arc<RwLock<B::Storage>>,
    layout: Layout,
    dtype: DType,
    device: B::Device,
}

/// An n-dimensional array on a specific backend.
///
/// # Example
/// ```ignore
/// use tensormap_core::{DType, Tensor};
/// use tensormap_cpu::{CpuBackend, CpuDevice};
///
/// let dev = CpuDevice::default();
/// let t = Tensor::<CpuBackend>::arange(12, DType::F32, &dev)?.reshape((3, 4))?;
/// let row = t.index(&[TensorIndex::Select(1)])?; // view, shares storage
/// ```
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={})",
            self.shape(),
            self.inner.dtype,
            self.inner.device.name(),
        )
    }
}

impl<B: Backend> Tensor<B> {
    // Internal constructors

    fn from_storage(storage: B::Storage, layout: Layout, dtype: DType, device: B::Device) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                storage: Arc::new(RwLock::new(storage)),
                layout,
                dtype,
                device,
            }),
        }
    }

    /// A new handle on the same storage with a different layout.
    fn view_with_layout(&self, layout: Layout) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                storage: Arc::clone(&self.inner.storage),
                layout,
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
            }),
        }
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether both handles read the same underlying storage buffer.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    /// Access the underlying storage (read lock).
    pub fn storage(&self) -> Result<RwLockReadGuard<'_, B::Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    fn storage_mut(&self) -> Result<RwLockWriteGuard<'_, B::Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    // Creation

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        Self::full(shape, 1.0, dtype, device)
    }

    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// Create a tensor from a flat slice of f64 values, converted to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: Shape::from(data.len()),
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
        ))
    }

    /// 1-D tensor `[0, 1, ..., n-1]`.
    pub fn arange(n: usize, dtype: DType, device: &B::Device) -> Result<Self> {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Self::from_f64_slice(&data, n, dtype, device)
    }

    // Data extraction

    /// All elements in logical order as f64.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let storage = self.storage()?;
        B::to_f64_vec(&storage, &self.inner.layout)
    }

    /// The single element of a one-element tensor.
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::ShapeMismatch {
                expected: Shape::scalar(),
                got: self.shape().clone(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }

    // Copies, devices, dtypes

    /// Copy the elements into fresh storage. The result aliases nothing.
    pub fn deep_clone(&self) -> Result<Self> {
        let storage = self.storage()?;
        let copy = B::to_contiguous(&storage, &self.inner.layout)?;
        Ok(Self::from_storage(
            copy,
            Layout::contiguous(self.shape().clone()),
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Contiguous tensor with the same values; `self` when already contiguous.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        self.deep_clone()
    }

    /// Place the tensor on `device`. Same device → same handle.
    pub fn to_device(&self, device: &B::Device) -> Result<Self> {
        if self.device() == device {
            return Ok(self.clone());
        }
        let storage = self.storage()?;
        let moved = B::transfer(&storage, &self.inner.layout, self.device(), device)?;
        Ok(Self::from_storage(
            moved,
            Layout::contiguous(self.shape().clone()),
            self.inner.dtype,
            device.clone(),
        ))
    }

    /// Convert to another dtype. Same dtype → same handle.
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        let storage = self.storage()?;
        let cast = B::cast(&storage, &self.inner.layout, dtype, self.device())?;
        Ok(Self::from_storage(
            cast,
            Layout::contiguous(self.shape().clone()),
            dtype,
            self.inner.device.clone(),
        ))
    }

    // Shape manipulation

    /// Reinterpret under `new_shape` without copying.
    ///
    /// Fails with `NotViewable` when the strides do not allow it (for example
    /// after a permute); use `reshape` to accept a copy.
    pub fn view(&self, new_shape: impl Into<Shape>) -> Result<Self> {
        let new_shape = new_shape.into();
        self.check_same_count(&new_shape)?;
        match self.inner.layout.view_as(&new_shape) {
            Some(layout) => Ok(self.view_with_layout(layout)),
            None => Err(Error::NotViewable {
                shape: self.shape().clone(),
                strides: self.inner.layout.strides().to_vec(),
                target: new_shape,
            }),
        }
    }

    /// Like `view`, but copies into contiguous storage when a view is impossible.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Self> {
        let new_shape = new_shape.into();
        self.check_same_count(&new_shape)?;
        match self.inner.layout.view_as(&new_shape) {
            Some(layout) => Ok(self.view_with_layout(layout)),
            None => {
                let copy = self.deep_clone()?;
                Ok(copy.view_with_layout(Layout::contiguous(new_shape)))
            }
        }
    }

    fn check_same_count(&self, new_shape: &Shape) -> Result<()> {
        if self.elem_count() != new_shape.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: new_shape.elem_count(),
                dst_shape: new_shape.clone(),
            });
        }
        Ok(())
    }

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        Ok(self.view_with_layout(self.inner.layout.transpose(dim0, dim1)?))
    }

    /// permute(&[2, 0, 1]) on [A, B, C] → [C, A, B]
    pub fn permute(&self, order: &[usize]) -> Result<Self> {
        Ok(self.view_with_layout(self.inner.layout.permute(order)?))
    }

    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        Ok(self.view_with_layout(self.inner.layout.narrow(dim, start, len)?))
    }

    /// Remove a size-1 dimension. squeeze(1) on [3, 1, 4] → [3, 4]
    pub fn squeeze(&self, dim: usize) -> Result<Self> {
        Ok(self.view_with_layout(self.inner.layout.remove_axis(dim)?))
    }

    /// Insert a size-1 dimension. unsqueeze(0) on [3, 4] → [1, 3, 4]
    pub fn unsqueeze(&self, dim: usize) -> Result<Self> {
        Ok(self.view_with_layout(self.inner.layout.insert_axis(dim)?))
    }

    /// Broadcast to `target` without copying (trailing-aligned; size-1 dims
    /// and new leading dims are repeated through stride 0).
    pub fn expand(&self, target: impl Into<Shape>) -> Result<Self> {
        let target = target.into();
        Ok(self.view_with_layout(self.inner.layout.broadcast_as(&target)?))
    }

    // Indexing

    /// Apply a tensor-style index expression.
    ///
    /// Basic items (select, slice, full, ellipsis, new axis) return a view.
    /// Integer arrays and boolean masks gather into new storage.
    pub fn index(&self, items: &[TensorIndex]) -> Result<Self> {
        let plan = IndexPlan::for_layout(&self.inner.layout, items)?;
        let view = self.view_with_layout(plan.view().clone());
        let gather = match plan.gather() {
            None => return Ok(view),
            Some(g) => g,
        };

        // Bring the advanced dims together: in place when already adjacent,
        // otherwise in front of everything else (same rule as IndexPlan).
        let k = gather.dims.len();
        let (grouped, start) = if gather.adjacent {
            (view, gather.dims[0])
        } else {
            let mut order = gather.dims.clone();
            order.extend((0..view.rank()).filter(|d| !gather.dims.contains(d)));
            (view.permute(&order)?, 0)
        };

        // Merge the advanced block into one dim and gather linear positions.
        let block = Shape::from(&grouped.dims()[start..start + k]);
        let mut merged = grouped.dims()[..start].to_vec();
        merged.push(block.elem_count());
        merged.extend_from_slice(&grouped.dims()[start + k..]);
        let flat = grouped.reshape(merged)?;

        let block_strides = block.stride_contiguous();
        let positions: Vec<usize> = (0..gather.len)
            .map(|j| {
                gather
                    .indices
                    .iter()
                    .zip(block_strides.iter())
                    .map(|(arr, &s)| arr[j] * s)
                    .sum()
            })
            .collect();
        flat.index_select(&positions, start)
    }

    /// Gather positions along `dim` into new storage.
    pub fn index_select(&self, indices: &[usize], dim: usize) -> Result<Self> {
        if dim >= self.rank() {
            return Err(Error::DimOutOfRange {
                dim,
                rank: self.rank(),
            });
        }
        let size = self.dims()[dim];
        if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
            return Err(Error::IndexOutOfBounds {
                index: bad as isize,
                dim,
                size,
            });
        }
        let storage = self.storage()?;
        let out = B::index_select(&storage, &self.inner.layout, indices, dim)?;
        let mut dims = self.dims().to_vec();
        dims[dim] = indices.len();
        Ok(Self::from_storage(
            out,
            Layout::contiguous(Shape::new(dims)),
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    // Joining and splitting

    /// Concatenate along an existing dimension.
    pub fn cat(tensors: &[Self], dim: usize) -> Result<Self> {
        let first = match tensors.first() {
            Some(t) => t,
            None => crate::bail!("cat: empty tensor list"),
        };
        let rank = first.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        for t in tensors.iter().skip(1) {
            if t.dtype() != first.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: first.dtype(),
                    got: t.dtype(),
                });
            }
            if t.device() != first.device() {
                return Err(Error::device(
                    t.device().name(),
                    format!("cat: expected all tensors on {}", first.device().name()),
                ));
            }
            let same_except_dim = t.rank() == rank
                && (0..rank).all(|d| d == dim || t.dims()[d] == first.dims()[d]);
            if !same_except_dim {
                let mut expected = first.dims().to_vec();
                if t.rank() == rank {
                    expected[dim] = t.dims()[dim];
                }
                return Err(Error::ShapeMismatch {
                    expected: Shape::new(expected),
                    got: t.shape().clone(),
                });
            }
        }

        let mut out_dims = first.dims().to_vec();
        out_dims[dim] = tensors.iter().map(|t| t.dims()[dim]).sum();
        let out_shape = Shape::new(out_dims);

        // One read guard per distinct storage: re-locking an RwLock this
        // thread already holds for reading can deadlock behind a writer.
        let mut owners: Vec<&Self> = Vec::new();
        let mut slots = Vec::with_capacity(tensors.len());
        for t in tensors {
            match owners.iter().position(|o| o.shares_storage(t)) {
                Some(i) => slots.push(i),
                None => {
                    slots.push(owners.len());
                    owners.push(t);
                }
            }
        }
        let guards = owners
            .iter()
            .map(|t| t.storage())
            .collect::<Result<Vec<_>>>()?;
        let pairs: Vec<(&B::Storage, &Layout)> = slots
            .iter()
            .zip(tensors.iter())
            .map(|(&i, t)| (&*guards[i], &t.inner.layout))
            .collect();
        let storage = B::cat(&pairs, &out_shape, dim)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(out_shape),
            first.dtype(),
            first.device().clone(),
        ))
    }

    /// Stack along a new dimension. All shapes must be identical.
    /// `stack([a, b], 0)` with a, b of shape [2, 3] → [2, 2, 3].
    pub fn stack(tensors: &[Self], dim: usize) -> Result<Self> {
        let first = match tensors.first() {
            Some(t) => t,
            None => crate::bail!("stack: empty tensor list"),
        };
        for t in tensors.iter().skip(1) {
            if t.shape() != first.shape() {
                return Err(Error::ShapeMismatch {
                    expected: first.shape().clone(),
                    got: t.shape().clone(),
                });
            }
        }
        let unsqueezed = tensors
            .iter()
            .map(|t| t.unsqueeze(dim))
            .collect::<Result<Vec<_>>>()?;
        Self::cat(&unsqueezed, dim)
    }

    /// Split into views of the given sizes along `dim`; sizes must sum to the dim.
    pub fn split(&self, sizes: &[usize], dim: usize) -> Result<Vec<Self>> {
        let dim_size = self.shape().dim(dim)?;
        let total: usize = sizes.iter().sum();
        if total != dim_size {
            let mut got = self.dims().to_vec();
            got[dim] = total;
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: Shape::new(got),
            });
        }
        let mut start = 0;
        let mut parts = Vec::with_capacity(sizes.len());
        for &len in sizes {
            parts.push(self.narrow(dim, start, len)?);
            start += len;
        }
        Ok(parts)
    }

    /// Split into chunks of `split_size` (the last may be smaller).
    pub fn split_size(&self, split_size: usize, dim: usize) -> Result<Vec<Self>> {
        if split_size == 0 {
            crate::bail!("split: split_size must be > 0, got {}", split_size);
        }
        let dim_size = self.shape().dim(dim)?;
        let sizes: Vec<usize> = (0..dim_size)
            .step_by(split_size)
            .map(|start| split_size.min(dim_size - start))
            .collect();
        self.split(&sizes, dim)
    }

    /// Split into `n` chunks of (almost) equal size.
    pub fn chunk(&self, n: usize, dim: usize) -> Result<Vec<Self>> {
        if n == 0 {
            crate::bail!("chunk: number of chunks must be > 0");
        }
        let dim_size = self.shape().dim(dim)?;
        self.split_size(dim_size.div_ceil(n).max(1), dim)
    }

    /// Views of every position along `dim`, with `dim` removed.
    pub fn unbind(&self, dim: usize) -> Result<Vec<Self>> {
        let dim_size = self.shape().dim(dim)?;
        (0..dim_size)
            .map(|i| Ok(self.view_with_layout(self.inner.layout.select(dim, i)?)))
            .collect()
    }

    // Masked and in-place writes

    /// Copy of `self` with the positions selected by `mask` set to `value`.
    ///
    /// `mask` covers the leading dims of the tensor; each flag applies to the
    /// whole trailing block below it.
    pub fn masked_fill(&self, mask: &BoolMask, value: f64) -> Result<Self> {
        let lead = mask.shape();
        if !self.shape().starts_with(lead) {
            return Err(Error::ShapeMismatch {
                expected: Shape::from(&self.dims()[..lead.rank().min(self.rank())]),
                got: lead.clone(),
            });
        }
        let block: usize = self.shape().trailing(lead.rank()).iter().product();
        let flags: Vec<bool> = mask
            .data()
            .iter()
            .flat_map(|&b| std::iter::repeat(b).take(block))
            .collect();
        let storage = self.storage()?;
        let out = B::masked_fill(&storage, &self.inner.layout, &flags, value)?;
        Ok(Self::from_storage(
            out,
            Layout::contiguous(self.shape().clone()),
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// In-place `masked_fill`: visible through every view of this storage.
    pub fn masked_fill_(&self, mask: &BoolMask, value: f64) -> Result<()> {
        let filled = self.masked_fill(mask, value)?;
        self.assign_(&filled)
    }

    /// Set every element of this (possibly strided) view to `value`.
    pub fn fill_(&self, value: f64) -> Result<()> {
        let mut storage = self.storage_mut()?;
        B::fill(&mut storage, &self.inner.layout, value)
    }

    /// Write `src` element-wise into this view. Shapes must match exactly;
    /// `src` is converted to this tensor's dtype and device first.
    pub fn assign_(&self, src: &Self) -> Result<()> {
        if src.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: src.shape().clone(),
            });
        }
        let mut src = src.to_dtype(self.dtype())?.to_device(self.device())?;
        if src.shares_storage(self) {
            // Reading and writing the same lock would deadlock; detach first.
            src = src.deep_clone()?;
        }
        let src_storage = src.storage()?;
        let mut dst = self.storage_mut()?;
        B::assign(&mut dst, &self.inner.layout, &src_storage, &src.inner.layout)
    }
}
