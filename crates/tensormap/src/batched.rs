use tensormap_core::{Backend, BoolMask, Result, Shape, TensorIndex};

use crate::container::TensorMap;
use crate::ops;
use crate::shape_algebra::{flatten_result_shape, to_isize, unflatten_result_shape};

/// Anything with a leading batch shape that can be indexed and reshaped along
/// it.
///
/// Implementors provide the primitive structural operations; splitting into
/// equal parts, flattening and masked selection are derived from them.
pub trait BatchedContainer: Sized {
    fn batch_shape(&self) -> &Shape;

    /// Index along the batch dims.
    fn index(&self, items: &[TensorIndex]) -> Result<Self>;

    fn reshape(&self, target: &[isize]) -> Result<Self>;

    /// Reshape without copying, or fail with `NotViewable`.
    fn view(&self, target: &[isize]) -> Result<Self>;

    fn squeeze(&self, dim: usize) -> Result<Self>;

    fn unsqueeze(&self, dim: usize) -> Result<Self>;

    fn permute(&self, dims: &[usize]) -> Result<Self>;

    fn expand(&self, target: &Shape) -> Result<Self>;

    fn split(&self, sizes: &[usize], dim: usize) -> Result<Vec<Self>>;

    fn batch_rank(&self) -> usize {
        self.batch_shape().rank()
    }

    /// Number of batch elements.
    fn numel(&self) -> usize {
        self.batch_shape().elem_count()
    }

    /// One container per position along `dim`, with `dim` removed.
    fn unbind(&self, dim: usize) -> Result<Vec<Self>> {
        let size = self.batch_shape().dim(dim)?;
        self.split(&vec![1; size], dim)?
            .into_iter()
            .map(|part| part.squeeze(dim))
            .collect()
    }

    /// Split `dim` into `n` parts of `ceil(size / n)`; the last may be
    /// smaller and fewer than `n` parts may come back.
    fn chunk(&self, n: usize, dim: usize) -> Result<Vec<Self>> {
        if n == 0 {
            tensormap_core::bail!("chunk: number of chunks must be positive");
        }
        let size = self.batch_shape().dim(dim)?;
        let step = size.div_ceil(n).max(1);
        let mut sizes = Vec::new();
        let mut start = 0;
        while start < size {
            sizes.push(step.min(size - start));
            start += step;
        }
        if sizes.is_empty() {
            sizes.push(0);
        }
        self.split(&sizes, dim)
    }

    /// Merge batch dims `start ..= end` into one.
    fn flatten_batch(&self, start: usize, end: usize) -> Result<Self> {
        let shape = flatten_result_shape(self.batch_shape(), start, end)?;
        self.reshape(&to_isize(&shape))
    }

    /// Split batch dim `dim` into `sizes`.
    fn unflatten_batch(&self, dim: usize, sizes: &[usize]) -> Result<Self> {
        let shape = unflatten_result_shape(self.batch_shape(), dim, sizes)?;
        self.reshape(&to_isize(&shape))
    }

    /// The batch elements selected by `mask` (which covers the leading batch
    /// dims), gathered into one new leading dim.
    fn masked_select(&self, mask: &BoolMask) -> Result<Self> {
        self.index(&[TensorIndex::Mask(mask.clone())])
    }
}

impl<B: Backend> BatchedContainer for TensorMap<B> {
    fn batch_shape(&self) -> &Shape {
        TensorMap::batch_shape(self)
    }

    fn index(&self, items: &[TensorIndex]) -> Result<Self> {
        TensorMap::index(self, items)
    }

    fn reshape(&self, target: &[isize]) -> Result<Self> {
        ops::reshape(self, target)
    }

    fn view(&self, target: &[isize]) -> Result<Self> {
        ops::view(self, target)
    }

    fn squeeze(&self, dim: usize) -> Result<Self> {
        ops::squeeze(self, dim)
    }

    fn unsqueeze(&self, dim: usize) -> Result<Self> {
        ops::unsqueeze(self, dim)
    }

    fn permute(&self, dims: &[usize]) -> Result<Self> {
        ops::permute(self, dims)
    }

    fn expand(&self, target: &Shape) -> Result<Self> {
        ops::expand(self, target)
    }

    fn split(&self, sizes: &[usize], dim: usize) -> Result<Vec<Self>> {
        ops::split(self, sizes, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensormap_core::DType;
    use tensormap_cpu::{CpuBackend, CpuDevice, CpuTensor};

    type Map = TensorMap<CpuBackend>;

    fn sample() -> Map {
        let dev = CpuDevice::default();
        let mut m = Map::new((3, 4));
        let t = CpuTensor::arange(24, DType::F32, &dev)
            .and_then(|t| t.reshape((3, 4, 2)))
            .unwrap();
        m.set("a", t).unwrap();
        m
    }

    #[test]
    fn test_unbind_drops_dim() -> Result<()> {
        let parts = sample().unbind(1)?;
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].batch_shape().dims(), &[3]);
        assert_eq!(parts[3].get_tensor("a")?.dims(), &[3, 2]);
        Ok(())
    }

    #[test]
    fn test_chunk_uneven() -> Result<()> {
        let parts = sample().chunk(3, 1)?;
        let sizes: Vec<usize> = parts.iter().map(|p| p.batch_shape().dims()[1]).collect();
        assert_eq!(sizes, vec![2, 2]);
        assert!(sample().chunk(0, 1).is_err());
        Ok(())
    }

    #[test]
    fn test_flatten_unflatten_batch() -> Result<()> {
        let m = sample();
        assert_eq!(m.numel(), 12);
        let flat = m.flatten_batch(0, 1)?;
        assert_eq!(flat.batch_shape().dims(), &[12]);
        assert_eq!(flat.get_tensor("a")?.dims(), &[12, 2]);
        let back = flat.unflatten_batch(0, &[3, 4])?;
        assert_eq!(back.get_tensor("a")?.to_f64_vec()?, m.get_tensor("a")?.to_f64_vec()?);
        assert!(flat.unflatten_batch(0, &[5, 2]).is_err());
        Ok(())
    }

    #[test]
    fn test_masked_select() -> Result<()> {
        let mut flags = vec![false; 12];
        flags[1] = true;
        flags[6] = true;
        let mask = BoolMask::new(flags, (3, 4))?;
        let sel = sample().masked_select(&mask)?;
        assert_eq!(sel.batch_shape().dims(), &[2]);
        assert_eq!(sel.get_tensor("a")?.to_f64_vec()?, vec![2.0, 3.0, 12.0, 13.0]);
        Ok(())
    }
}
