use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout: Memory layout of a tensor (shape + strides + offset)
//
// The Layout decouples the *logical* shape of a tensor from how its data is
// arranged in storage. Every view-producing operation of the container
// (basic indexing, squeeze/unsqueeze, permute, expand, view) is a pure
// Layout rewrite: the new tensor shares the storage of its source.
//
// KEY CONCEPTS:
//
// 1. **Strides**: how many storage elements to skip to move one step along
//    each dimension. A contiguous [2,3] matrix has strides [3,1].
//
// 2. **Slice with step**: `slice(dim, start, len, step)` moves the offset to
//    `start` and multiplies the stride by `step`. No data movement.
//
// 3. **Select**: an integer index drops the dimension after moving the
//    offset to the chosen row.
//
// 4. **Broadcast**: expanded dims get stride 0, so one element is read many
//    times. Such layouts are never written to element-by-element in place
//    by the container (the backend writes through them as given).
//
// 5. **View compatibility**: reinterpreting a layout under a new shape is
//    only possible when every group of merged/split dims is contiguous
//    relative to itself. `view_as` returns `None` otherwise and callers fall
//    back to a copy (reshape) or fail (view).

/// Layout describes how a tensor's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Offset into the storage buffer where this tensor's data starts.
    offset: usize,
}

impl Layout {
    /// Create a new contiguous layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit strides and offset (for views).
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Check if this layout is contiguous (row-major, no gaps, offset 0).
    /// Strides of size-1 dims are ignored: they are never stepped along.
    pub fn is_contiguous(&self) -> bool {
        if self.offset != 0 {
            return false;
        }
        let expected = self.shape.stride_contiguous();
        self.dims()
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (&s, &e))| d == 1 || s == e)
    }

    fn check_dim(&self, dim: usize) -> Result<()> {
        if dim >= self.rank() {
            return Err(Error::DimOutOfRange {
                dim,
                rank: self.rank(),
            });
        }
        Ok(())
    }

    /// Transpose two dimensions. Returns a new layout with swapped shape/strides.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Layout> {
        self.check_dim(dim0)?;
        self.check_dim(dim1)?;
        let mut new_dims = self.shape.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims.swap(dim0, dim1);
        new_strides.swap(dim0, dim1);
        Ok(Layout::new(Shape::new(new_dims), new_strides, self.offset))
    }

    /// Reorder dimensions: output dim `i` is input dim `order[i]`.
    pub fn permute(&self, order: &[usize]) -> Result<Layout> {
        let rank = self.rank();
        if order.len() != rank {
            return Err(Error::RankMismatch {
                expected: rank,
                got: order.len(),
            });
        }
        let mut seen = vec![false; rank];
        for &d in order {
            self.check_dim(d)?;
            if seen[d] {
                return Err(Error::msg(format!("permute: duplicate dimension {}", d)));
            }
            seen[d] = true;
        }
        let dims: Vec<usize> = order.iter().map(|&d| self.dims()[d]).collect();
        let strides: Vec<usize> = order.iter().map(|&d| self.strides[d]).collect();
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// Narrow (slice) along a dimension with unit step.
    ///
    /// Example: tensor of shape [4, 6], narrow(dim=1, start=2, len=3)
    /// → shape [4, 3], offset += 2 * stride[1]
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Layout> {
        self.slice(dim, start, len, 1)
    }

    /// Strided slice: `len` elements starting at `start`, every `step`-th one.
    pub fn slice(&self, dim: usize, start: usize, len: usize, step: usize) -> Result<Layout> {
        self.check_dim(dim)?;
        if step == 0 {
            return Err(Error::InvalidIndex("slice step cannot be zero".into()));
        }
        let dim_size = self.dims()[dim];
        let last = if len == 0 { start } else { start + (len - 1) * step + 1 };
        if last > dim_size || (len > 0 && start >= dim_size) {
            return Err(Error::NarrowOutOfBounds {
                dim,
                start,
                len,
                dim_size,
            });
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims[dim] = len;
        let offset = if len == 0 {
            self.offset
        } else {
            self.offset + start * self.strides[dim]
        };
        new_strides[dim] *= step;
        Ok(Layout::new(Shape::new(new_dims), new_strides, offset))
    }

    /// Pick one position along `dim` and drop the dimension.
    pub fn select(&self, dim: usize, index: usize) -> Result<Layout> {
        self.check_dim(dim)?;
        let size = self.dims()[dim];
        if index >= size {
            return Err(Error::IndexOutOfBounds {
                index: index as isize,
                dim,
                size,
            });
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims.remove(dim);
        new_strides.remove(dim);
        Ok(Layout::new(
            Shape::new(new_dims),
            new_strides,
            self.offset + index * self.strides[dim],
        ))
    }

    /// Insert a size-1 dimension at `dim` (0 ..= rank).
    pub fn insert_axis(&self, dim: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim > rank {
            return Err(Error::DimOutOfRange {
                dim,
                rank: rank + 1,
            });
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.strides.clone();
        // The stride of a size-1 dim is never used; take the next dim's stride
        // (or 1 when appending) so contiguous layouts stay contiguous.
        let stride = if dim < rank { new_strides[dim] * new_dims[dim] } else { 1 };
        new_dims.insert(dim, 1);
        new_strides.insert(dim, stride);
        Ok(Layout::new(Shape::new(new_dims), new_strides, self.offset))
    }

    /// Remove a size-1 dimension at `dim`.
    pub fn remove_axis(&self, dim: usize) -> Result<Layout> {
        self.check_dim(dim)?;
        if self.dims()[dim] != 1 {
            let mut expected = self.dims().to_vec();
            expected[dim] = 1;
            return Err(Error::ShapeMismatch {
                expected: Shape::new(expected),
                got: self.shape.clone(),
            });
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims.remove(dim);
        new_strides.remove(dim);
        Ok(Layout::new(Shape::new(new_dims), new_strides, self.offset))
    }

    /// Broadcast this layout to `target` (trailing-aligned).
    /// New leading dims and expanded size-1 dims get stride 0.
    pub fn broadcast_as(&self, target: &Shape) -> Result<Layout> {
        self.shape.broadcast_to(target)?;
        let lead = target.rank() - self.rank();
        let mut strides = vec![0usize; target.rank()];
        for (i, (&d, &s)) in self.dims().iter().zip(self.strides.iter()).enumerate() {
            if d == target.dims()[i + lead] {
                strides[i + lead] = s;
            }
        }
        Ok(Layout::new(target.clone(), strides, self.offset))
    }

    /// Reinterpret this layout under `target` without moving data.
    ///
    /// Returns `None` when the strides make that impossible (for example a
    /// transposed matrix flattened to 1-D). Element counts must already match.
    ///
    /// Walks the source dims from the right, grouping them into chunks that
    /// are contiguous among themselves, and requires every chunk to be covered
    /// by a run of target dims with the same element count.
    pub fn view_as(&self, target: &Shape) -> Option<Layout> {
        if self.elem_count() != target.elem_count() {
            return None;
        }
        if self.rank() == 0 || self.elem_count() == 0 {
            return Some(Layout::new(
                target.clone(),
                target.stride_contiguous(),
                self.offset,
            ));
        }

        let old_dims = self.dims();
        let new_dims = target.dims();
        let mut new_strides = vec![0usize; new_dims.len()];

        let mut view_d = new_dims.len() as isize - 1;
        let mut chunk_base_stride = *self.strides.last()?;
        let mut tensor_numel = 1usize;
        let mut view_numel = 1usize;

        for tensor_d in (0..old_dims.len()).rev() {
            tensor_numel *= old_dims[tensor_d];
            let chunk_ends = tensor_d == 0
                || (old_dims[tensor_d - 1] != 1
                    && self.strides[tensor_d - 1] != tensor_numel * chunk_base_stride);
            if chunk_ends {
                while view_d >= 0
                    && (view_numel < tensor_numel || new_dims[view_d as usize] == 1)
                {
                    new_strides[view_d as usize] = view_numel * chunk_base_stride;
                    view_numel *= new_dims[view_d as usize];
                    view_d -= 1;
                }
                if view_numel != tensor_numel {
                    return None;
                }
                if tensor_d > 0 {
                    chunk_base_stride = self.strides[tensor_d - 1];
                    tensor_numel = 1;
                    view_numel = 1;
                }
            }
        }
        if view_d != -1 {
            return None;
        }
        Some(Layout::new(target.clone(), new_strides, self.offset))
    }

    /// Compute the flat index into storage for a given multi-dimensional index.
    /// flat_index = offset + sum(index[i] * stride[i])
    pub fn flat_index(&self, index: &[usize]) -> usize {
        let mut flat = self.offset;
        for (i, &idx) in index.iter().enumerate() {
            flat += idx * self.strides[i];
        }
        flat
    }

    /// Iterator over all flat indices of this layout, in logical order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

// StridedIter: Iterates over flat storage indices respecting strides
//
// Backends use it to read (or write) non-contiguous views in logical order.
// For a contiguous layout this just counts offset, offset+1, ...

/// Iterator that yields flat storage indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            offset: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        let mut idx = self.offset;
        for i in 0..self.current.len() {
            idx += self.current[i] * self.strides[i];
        }
        idx
    }

    /// Advance the multi-dimensional index by one (rightmost dimension first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
