use tensormap_core::{Backend, Error, Result, Shape, Tensor};

use crate::container::TensorMap;
use crate::entry::Entry;
use crate::shape_algebra::{
    cat_result_shape, expand_result_shape, permute_result_shape, reshape_result_shape,
    split_result_shapes, squeeze_result_shape, stack_result_shape, to_isize,
    unsqueeze_result_shape, with_new_batch,
};

// Structural operations over whole maps
//
// Each operation computes the new batch shape first (shape_algebra), then
// rewrites every entry: leaves get the matching tensor operation with batch
// dim `d` as tensor dim `d`, nested maps get the same operation recursively
// with their own extra batch dims carried along like feature dims.
//
//   op            result storage
//   stack / cat   new
//   reshape       view when the strides allow, else new
//   view          view, or NotViewable
//   squeeze       view
//   unsqueeze     view
//   permute       view
//   expand        view (stride 0 on broadcast dims)
//   split         views

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Join {
    Stack,
    Cat,
}

/// Stack maps with identical keys and batch shapes along a new batch dim.
///
/// The result follows the key order of the first map.
pub fn stack<B: Backend>(maps: &[TensorMap<B>], dim: usize) -> Result<TensorMap<B>> {
    join(maps, dim, Join::Stack)
}

/// Concatenate maps with identical keys along an existing batch dim.
pub fn cat<B: Backend>(maps: &[TensorMap<B>], dim: usize) -> Result<TensorMap<B>> {
    join(maps, dim, Join::Cat)
}

fn check_same_keys<B: Backend>(maps: &[TensorMap<B>]) -> Result<()> {
    let sorted_keys = |m: &TensorMap<B>| {
        let mut keys: Vec<String> = m.keys().map(str::to_string).collect();
        keys.sort();
        keys
    };
    let expected = sorted_keys(&maps[0]);
    for m in &maps[1..] {
        let got = sorted_keys(m);
        if got != expected {
            return Err(Error::KeyMismatch { expected, got });
        }
    }
    Ok(())
}

fn join<B: Backend>(maps: &[TensorMap<B>], dim: usize, how: Join) -> Result<TensorMap<B>> {
    let shapes: Vec<Shape> = maps.iter().map(|m| m.batch_shape().clone()).collect();
    let batch_shape = match how {
        Join::Stack => stack_result_shape(&shapes, dim)?,
        Join::Cat => cat_result_shape(&shapes, dim)?,
    };
    check_same_keys(maps)?;

    let first = &maps[0];
    let mut out = first.empty_like(batch_shape);
    for (key, entry) in first.iter() {
        let joined = match entry {
            Entry::Leaf(_) => {
                let tensors = maps
                    .iter()
                    .map(|m| {
                        let e = m.get(key)?;
                        e.as_tensor().cloned().ok_or_else(|| e.kind_error(key, "leaf"))
                    })
                    .collect::<Result<Vec<Tensor<B>>>>()?;
                Entry::Leaf(match how {
                    Join::Stack => Tensor::stack(&tensors, dim)?,
                    Join::Cat => Tensor::cat(&tensors, dim)?,
                })
            }
            Entry::Nested(_) => {
                let nested = maps
                    .iter()
                    .map(|m| {
                        let e = m.get(key)?;
                        e.as_map().cloned().ok_or_else(|| e.kind_error(key, "nested"))
                    })
                    .collect::<Result<Vec<TensorMap<B>>>>()?;
                Entry::Nested(join(&nested, dim, how)?)
            }
        };
        out.set(key, joined)?;
    }
    Ok(out)
}

/// Reshape the batch dims to `target` (one `-1` may be inferred). Leaves
/// become `new_batch + feature dims`; they are views when the strides allow
/// and copies otherwise.
pub fn reshape<B: Backend>(map: &TensorMap<B>, target: &[isize]) -> Result<TensorMap<B>> {
    let rank = map.batch_rank();
    let batch_shape = reshape_result_shape(map.batch_shape(), target)?;
    map.map_entries(
        batch_shape.clone(),
        |t| t.reshape(with_new_batch(&batch_shape, t.shape(), rank)),
        |m| {
            let nested = with_new_batch(&batch_shape, m.batch_shape(), rank);
            reshape(m, &to_isize(&nested))
        },
    )
}

/// Like `reshape`, but every leaf must be viewable without a copy; fails
/// with `NotViewable` otherwise (the map is left untouched).
pub fn view<B: Backend>(map: &TensorMap<B>, target: &[isize]) -> Result<TensorMap<B>> {
    let rank = map.batch_rank();
    let batch_shape = reshape_result_shape(map.batch_shape(), target)?;
    map.map_entries(
        batch_shape.clone(),
        |t| t.view(with_new_batch(&batch_shape, t.shape(), rank)),
        |m| {
            let nested = with_new_batch(&batch_shape, m.batch_shape(), rank);
            view(m, &to_isize(&nested))
        },
    )
}

/// Remove the size-1 batch dim `dim`.
pub fn squeeze<B: Backend>(map: &TensorMap<B>, dim: usize) -> Result<TensorMap<B>> {
    let batch_shape = squeeze_result_shape(map.batch_shape(), dim)?;
    map.map_entries(batch_shape, |t| t.squeeze(dim), |m| squeeze(m, dim))
}

/// Insert a size-1 batch dim at `dim`.
pub fn unsqueeze<B: Backend>(map: &TensorMap<B>, dim: usize) -> Result<TensorMap<B>> {
    let batch_shape = unsqueeze_result_shape(map.batch_shape(), dim)?;
    map.map_entries(batch_shape, |t| t.unsqueeze(dim), |m| unsqueeze(m, dim))
}

/// Reorder the batch dims; feature dims keep their positions.
pub fn permute<B: Backend>(map: &TensorMap<B>, dims: &[usize]) -> Result<TensorMap<B>> {
    let batch_shape = permute_result_shape(map.batch_shape(), dims)?;
    let full_order = |rank: usize| -> Vec<usize> {
        let mut order = dims.to_vec();
        order.extend(dims.len()..rank);
        order
    };
    map.map_entries(
        batch_shape,
        |t| t.permute(&full_order(t.rank())),
        |m| permute(m, &full_order(m.batch_rank())),
    )
}

/// Broadcast the batch dims to `target` (trailing-aligned). Size-1 dims
/// expand and new leading dims may be added; leaves become stride-0 views.
pub fn expand<B: Backend>(map: &TensorMap<B>, target: &Shape) -> Result<TensorMap<B>> {
    let rank = map.batch_rank();
    let batch_shape = expand_result_shape(map.batch_shape(), target)?;
    map.map_entries(
        batch_shape.clone(),
        |t| t.expand(with_new_batch(&batch_shape, t.shape(), rank)),
        |m| expand(m, &with_new_batch(&batch_shape, m.batch_shape(), rank)),
    )
}

/// Split along batch dim `dim` into parts of the given sizes (views).
pub fn split<B: Backend>(
    map: &TensorMap<B>,
    sizes: &[usize],
    dim: usize,
) -> Result<Vec<TensorMap<B>>> {
    let shapes = split_result_shapes(map.batch_shape(), sizes, dim)?;
    let mut parts: Vec<TensorMap<B>> = shapes.into_iter().map(|s| map.empty_like(s)).collect();
    for (key, entry) in map.iter() {
        let pieces: Vec<Entry<B>> = match entry {
            Entry::Leaf(t) => t.split(sizes, dim)?.into_iter().map(Entry::Leaf).collect(),
            Entry::Nested(m) => split(m, sizes, dim)?
                .into_iter()
                .map(Entry::Nested)
                .collect(),
        };
        for (part, piece) in parts.iter_mut().zip(pieces) {
            part.set(key, piece)?;
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensormap_core::{DType, TensorIndex};
    use tensormap_cpu::{CpuBackend, CpuDevice, CpuTensor};

    type Map = TensorMap<CpuBackend>;

    fn seq(dims: &[usize]) -> CpuTensor {
        let n = dims.iter().product();
        CpuTensor::arange(n, DType::F32, &CpuDevice::default())
            .and_then(|t| t.reshape(dims))
            .unwrap()
    }

    fn sample() -> Map {
        let mut m = Map::new((3, 4));
        m.set("a", seq(&[3, 4, 2])).unwrap();
        m.set_path("n.b", seq(&[3, 4])).unwrap();
        m
    }

    #[test]
    fn test_stack_nested() -> Result<()> {
        let s = stack(&[sample(), sample()], 1)?;
        assert_eq!(s.batch_shape().dims(), &[3, 2, 4]);
        assert_eq!(s.get_tensor("a")?.dims(), &[3, 2, 4, 2]);
        assert_eq!(s.get_tensor("n.b")?.dims(), &[3, 2, 4]);
        Ok(())
    }

    #[test]
    fn test_kind_mismatch_in_cat() -> Result<()> {
        let a = sample();
        let mut b = Map::new((3, 4));
        b.set_path("a.x", seq(&[3, 4]))?;
        b.set_path("n.b", seq(&[3, 4]))?;
        assert!(matches!(
            cat(&[a, b], 0),
            Err(Error::EntryKindMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_permute_keeps_feature_dims() -> Result<()> {
        let m = sample();
        let p = permute(&m, &[1, 0])?;
        assert_eq!(p.batch_shape().dims(), &[4, 3]);
        assert_eq!(p.get_tensor("a")?.dims(), &[4, 3, 2]);
        assert!(p.get_tensor("a")?.shares_storage(m.get_tensor("a")?));
        // a[j, i, k] == original a[i, j, k]
        let v = p.get_tensor("a")?.index(&[TensorIndex::Select(1), TensorIndex::Select(2)])?;
        assert_eq!(v.to_f64_vec()?, vec![18.0, 19.0]);
        Ok(())
    }

    #[test]
    fn test_split_parts_share_storage() -> Result<()> {
        let m = sample();
        let parts = split(&m, &[1, 2], 0)?;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].batch_shape().dims(), &[2, 4]);
        assert!(parts[1].get_tensor("a")?.shares_storage(m.get_tensor("a")?));
        assert_eq!(parts[0].get_tensor("n.b")?.dims(), &[1, 4]);
        Ok(())
    }
}
