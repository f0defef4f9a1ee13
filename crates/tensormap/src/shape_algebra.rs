use tensormap_core::{expand_ellipsis, Error, IndexPlan, Layout, Result, Shape, TensorIndex};

// Shape algebra: what each structural operation does to a batch shape
//
// Every container operation first computes the new batch shape here, from
// the batch shape alone, and only then touches tensors. Two consequences:
//
//   - invalid requests fail before any entry is rewritten (all-or-nothing);
//   - the batch dims of a leaf are its *leading* dims, so a batch dim `d` is
//     tensor dim `d` for every leaf, and the feature dims after the batch
//     prefix are carried along unchanged.

/// Fails unless the leading `batch_shape.rank()` dims of `tensor_shape` equal
/// `batch_shape` exactly.
pub fn check_compatible(batch_shape: &Shape, tensor_shape: &Shape) -> Result<()> {
    if !tensor_shape.starts_with(batch_shape) {
        return Err(Error::ShapeMismatch {
            expected: batch_shape.clone(),
            got: tensor_shape.clone(),
        });
    }
    Ok(())
}

/// A nested container may add trailing batch dims but must agree on the
/// parent's. Same rule as for tensors.
pub fn check_nested(batch_shape: &Shape, nested_batch_shape: &Shape) -> Result<()> {
    check_compatible(batch_shape, nested_batch_shape)
}

/// Rewrite an index expression so that it addresses exactly the batch dims.
///
/// The ellipsis (or the implicit one at the end) expands relative to the
/// batch rank, so `[..., 0]` on a batch `[3, 4]` selects along batch dim 1 of
/// every leaf, never along a feature dim.
pub fn normalize_index(items: &[TensorIndex], batch_rank: usize) -> Result<Vec<TensorIndex>> {
    expand_ellipsis(items, batch_rank)
}

/// Batch shape after indexing. Runs the very same plan the tensors run.
pub fn index_result_shape(batch_shape: &Shape, items: &[TensorIndex]) -> Result<Shape> {
    let items = normalize_index(items, batch_shape.rank())?;
    Ok(IndexPlan::for_shape(batch_shape, &items)?
        .result_shape()
        .clone())
}

/// Batch shape after a reshape/view to `target` (one `-1` may be inferred).
pub fn reshape_result_shape(batch_shape: &Shape, target: &[isize]) -> Result<Shape> {
    batch_shape.resolve_reshape(target)
}

/// Batch shape after stacking containers of identical batch shape along a
/// new dim `dim`.
pub fn stack_result_shape(batch_shapes: &[Shape], dim: usize) -> Result<Shape> {
    let first = match batch_shapes.first() {
        Some(s) => s,
        None => tensormap_core::bail!("stack: no containers given"),
    };
    for shape in &batch_shapes[1..] {
        if shape != first {
            return Err(Error::ShapeMismatch {
                expected: first.clone(),
                got: shape.clone(),
            });
        }
    }
    if dim > first.rank() {
        return Err(Error::DimOutOfRange {
            dim,
            rank: first.rank() + 1,
        });
    }
    let mut dims = first.dims().to_vec();
    dims.insert(dim, batch_shapes.len());
    Ok(Shape::new(dims))
}

/// Batch shape after concatenating along `dim`; shapes may differ only there.
pub fn cat_result_shape(batch_shapes: &[Shape], dim: usize) -> Result<Shape> {
    let first = match batch_shapes.first() {
        Some(s) => s,
        None => tensormap_core::bail!("cat: no containers given"),
    };
    let rank = first.rank();
    if dim >= rank {
        return Err(Error::DimOutOfRange { dim, rank });
    }
    let mut total = 0;
    for shape in batch_shapes {
        let compatible = shape.rank() == rank
            && (0..rank).all(|d| d == dim || shape.dims()[d] == first.dims()[d]);
        if !compatible {
            let mut expected = first.dims().to_vec();
            if shape.rank() == rank {
                expected[dim] = shape.dims()[dim];
            }
            return Err(Error::ShapeMismatch {
                expected: Shape::new(expected),
                got: shape.clone(),
            });
        }
        total += shape.dims()[dim];
    }
    let mut dims = first.dims().to_vec();
    dims[dim] = total;
    Ok(Shape::new(dims))
}

/// Batch shape after removing the size-1 dim `dim`.
pub fn squeeze_result_shape(batch_shape: &Shape, dim: usize) -> Result<Shape> {
    Ok(Layout::contiguous(batch_shape.clone())
        .remove_axis(dim)?
        .shape()
        .clone())
}

/// Batch shape after inserting a size-1 dim at `dim` (0 ..= rank).
pub fn unsqueeze_result_shape(batch_shape: &Shape, dim: usize) -> Result<Shape> {
    Ok(Layout::contiguous(batch_shape.clone())
        .insert_axis(dim)?
        .shape()
        .clone())
}

/// Batch shape after reordering the batch dims.
pub fn permute_result_shape(batch_shape: &Shape, dims: &[usize]) -> Result<Shape> {
    Ok(Layout::contiguous(batch_shape.clone())
        .permute(dims)?
        .shape()
        .clone())
}

/// Batch shape after a trailing-aligned broadcast to `target`.
pub fn expand_result_shape(batch_shape: &Shape, target: &Shape) -> Result<Shape> {
    batch_shape.broadcast_to(target)
}

/// One batch shape per part of a split along `dim`.
pub fn split_result_shapes(batch_shape: &Shape, sizes: &[usize], dim: usize) -> Result<Vec<Shape>> {
    let dim_size = batch_shape.dim(dim)?;
    let total: usize = sizes.iter().sum();
    if total != dim_size {
        let mut got = batch_shape.dims().to_vec();
        got[dim] = total;
        return Err(Error::ShapeMismatch {
            expected: batch_shape.clone(),
            got: Shape::new(got),
        });
    }
    Ok(sizes
        .iter()
        .map(|&len| {
            let mut dims = batch_shape.dims().to_vec();
            dims[dim] = len;
            Shape::new(dims)
        })
        .collect())
}

/// Batch shape after merging dims `start ..= end` into one.
pub fn flatten_result_shape(batch_shape: &Shape, start: usize, end: usize) -> Result<Shape> {
    let rank = batch_shape.rank();
    if end >= rank {
        return Err(Error::DimOutOfRange { dim: end, rank });
    }
    if start > end {
        tensormap_core::bail!("flatten: start dim {} is after end dim {}", start, end);
    }
    let dims = batch_shape.dims();
    let merged: usize = dims[start..=end].iter().product();
    let mut out = dims[..start].to_vec();
    out.push(merged);
    out.extend_from_slice(&dims[end + 1..]);
    Ok(Shape::new(out))
}

/// Batch shape after splitting dim `dim` into `sizes`.
pub fn unflatten_result_shape(batch_shape: &Shape, dim: usize, sizes: &[usize]) -> Result<Shape> {
    let dim_size = batch_shape.dim(dim)?;
    let product: usize = sizes.iter().product();
    if product != dim_size {
        return Err(Error::ShapeMismatch {
            expected: Shape::from(dim_size),
            got: Shape::from(sizes),
        });
    }
    let dims = batch_shape.dims();
    let mut out = dims[..dim].to_vec();
    out.extend_from_slice(sizes);
    out.extend_from_slice(&dims[dim + 1..]);
    Ok(Shape::new(out))
}

/// `head` followed by the dims of `shape` after its first `skip`: the target
/// shape of a leaf (or nested batch) whose batch prefix became `head`.
pub(crate) fn with_new_batch(head: &Shape, shape: &Shape, skip: usize) -> Shape {
    Shape::concat(head.dims(), shape.trailing(skip))
}

pub(crate) fn to_isize(shape: &Shape) -> Vec<isize> {
    shape.dims().iter().map(|&d| d as isize).collect()
}
