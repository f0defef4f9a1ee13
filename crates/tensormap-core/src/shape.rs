use std::fmt;

use crate::error::{Error, Result};

// Shape: N-dimensional shape representation
//
// A Shape is the list of dimension sizes of a tensor, or of the batch prefix
// shared by every entry of a container:
//   - Scalar: Shape([])         : 0 dimensions, 1 element
//   - Vector: Shape([5])        : 1 dimension, 5 elements
//   - Batch:  Shape([2, 3])     : the leading dims shared by a container
//
// Batch shapes are compared with `starts_with`: a tensor of shape
// [2, 3, 7] fits a container whose batch shape is [2, 3].

/// N-dimensional shape of a tensor or of a container's batch prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The scalar shape `[]`.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element; any zero-sized dim gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Compute the contiguous (row-major / C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    /// Whether the leading dims of `self` equal `prefix` exactly.
    pub fn starts_with(&self, prefix: &Shape) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The dims after the first `n` (the "feature" part of a batched tensor).
    pub fn trailing(&self, n: usize) -> &[usize] {
        &self.0[n.min(self.rank())..]
    }

    /// Concatenate two dim lists into a new shape.
    pub fn concat(head: &[usize], tail: &[usize]) -> Shape {
        let mut dims = Vec::with_capacity(head.len() + tail.len());
        dims.extend_from_slice(head);
        dims.extend_from_slice(tail);
        Shape(dims)
    }

    /// Product of the dims, or `None` if it does not fit in `usize`.
    pub fn checked_elem_count(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Resolve a reshape target that may contain a single `-1` wildcard.
    ///
    /// `[-1]` on a [3, 4] shape resolves to [12]; `[2, -1]` to [2, 6].
    /// Every failure is a shape-family error.
    pub fn resolve_reshape(&self, target: &[isize]) -> Result<Shape> {
        let invalid = |reason: &str| Error::InvalidReshapeTarget {
            target: target.to_vec(),
            reason: reason.to_string(),
        };
        let numel = self.elem_count();
        let mut inferred = None;
        let mut known: usize = 1;

        for (i, &d) in target.iter().enumerate() {
            if d == -1 {
                if inferred.is_some() {
                    return Err(invalid("only one dimension can be inferred"));
                }
                inferred = Some(i);
            } else if d < 0 {
                return Err(invalid("dimensions must be non-negative or -1"));
            } else {
                known = known
                    .checked_mul(d as usize)
                    .ok_or_else(|| invalid("element count overflows usize"))?;
            }
        }

        let mut dims: Vec<usize> = target
            .iter()
            .map(|&d| if d == -1 { 0 } else { d as usize })
            .collect();

        let mismatch = |dims: Vec<usize>| {
            let dst_shape = Shape(dims);
            Error::ReshapeElementMismatch {
                src: numel,
                dst: dst_shape.checked_elem_count().unwrap_or(usize::MAX),
                dst_shape,
            }
        };

        if let Some(idx) = inferred {
            if known == 0 || numel % known != 0 {
                return Err(mismatch(dims));
            }
            dims[idx] = numel / known;
        }

        let resolved = Shape(dims);
        if resolved.checked_elem_count() != Some(numel) {
            return Err(mismatch(resolved.0));
        }
        Ok(resolved)
    }

    // Broadcasting

    /// Check that `self` can be broadcast to `target`.
    ///
    /// Rules (trailing-aligned, like NumPy):
    ///   1. Align shapes from the right.
    ///   2. A dim must equal the target dim or be 1.
    ///   3. The target may have extra leading dims; `self` may not.
    ///
    /// Examples:
    ///   [1, 4] → [3, 4]      ok
    ///   [4]    → [2, 3, 4]   ok
    ///   [2, 4] → [3, 4]      error (2 ≠ 3 and 2 ≠ 1)
    pub fn broadcast_to(&self, target: &Shape) -> Result<Shape> {
        let err = || Error::BroadcastMismatch {
            from: self.clone(),
            to: target.clone(),
        };
        if self.rank() > target.rank() {
            return Err(err());
        }
        let offset = target.rank() - self.rank();
        for (i, &d) in self.0.iter().enumerate() {
            let t = target.0[i + offset];
            if d != t && d != 1 {
                return Err(err());
            }
        }
        Ok(target.clone())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// Convenient From implementations
// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    /// 1-D shape.
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}
