use std::fmt;

use tensormap_core::{Backend, Error, Result, Shape, Tensor};

use crate::container::TensorMap;
use crate::shape_algebra::{check_compatible, check_nested};

/// One value of a [`TensorMap`]: a tensor, or a nested map whose batch shape
/// extends the parent's.
///
/// Structural operations dispatch on the variant: leaves get the tensor
/// operation, nested maps get the same container operation recursively.
pub enum Entry<B: Backend> {
    Leaf(Tensor<B>),
    Nested(TensorMap<B>),
}

impl<B: Backend> Clone for Entry<B> {
    fn clone(&self) -> Self {
        match self {
            Entry::Leaf(t) => Entry::Leaf(t.clone()),
            Entry::Nested(m) => Entry::Nested(m.clone()),
        }
    }
}

impl<B: Backend> Entry<B> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Entry::Leaf(_))
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Entry::Nested(_))
    }

    pub fn as_tensor(&self) -> Option<&Tensor<B>> {
        match self {
            Entry::Leaf(t) => Some(t),
            Entry::Nested(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&TensorMap<B>> {
        match self {
            Entry::Leaf(_) => None,
            Entry::Nested(m) => Some(m),
        }
    }

    pub fn into_tensor(self) -> Option<Tensor<B>> {
        match self {
            Entry::Leaf(t) => Some(t),
            Entry::Nested(_) => None,
        }
    }

    pub fn into_map(self) -> Option<TensorMap<B>> {
        match self {
            Entry::Leaf(_) => None,
            Entry::Nested(m) => Some(m),
        }
    }

    /// "leaf" or "nested".
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Leaf(_) => "leaf",
            Entry::Nested(_) => "nested",
        }
    }

    /// The shape checked against the owner's batch shape: the tensor shape
    /// of a leaf, the batch shape of a nested map.
    pub fn leading_shape(&self) -> &Shape {
        match self {
            Entry::Leaf(t) => t.shape(),
            Entry::Nested(m) => m.batch_shape(),
        }
    }

    /// Check that this entry may live in a map of batch shape `batch_shape`.
    pub fn check_fits(&self, batch_shape: &Shape) -> Result<()> {
        match self {
            Entry::Leaf(t) => check_compatible(batch_shape, t.shape()),
            Entry::Nested(m) => check_nested(batch_shape, m.batch_shape()),
        }
    }

    /// `EntryKindMismatch` for `key`, given the kind that was required.
    pub(crate) fn kind_error(&self, key: &str, expected: &'static str) -> Error {
        Error::EntryKindMismatch {
            key: key.to_string(),
            expected,
            found: self.kind(),
        }
    }
}

impl<B: Backend> From<Tensor<B>> for Entry<B> {
    fn from(t: Tensor<B>) -> Self {
        Entry::Leaf(t)
    }
}

impl<B: Backend> From<TensorMap<B>> for Entry<B> {
    fn from(m: TensorMap<B>) -> Self {
        Entry::Nested(m)
    }
}

impl<B: Backend> fmt::Debug for Entry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Leaf(t) => write!(f, "Leaf({:?})", t),
            Entry::Nested(m) => write!(f, "Nested({:?})", m),
        }
    }
}
