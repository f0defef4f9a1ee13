use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within tensormap.
///
/// One enum covers the tensor layer and the container layer: shape problems,
/// key problems, device placement and indexing. Every failure is a contract
/// violation by the caller; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A shape disagrees with the one required (batch prefix, stack inputs, ...).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Narrow/split out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// A reshape target that names no shape: two `-1`s, another negative
    /// dim, or an element count that does not fit in `usize`.
    #[error("invalid reshape target {target:?}: {reason}")]
    InvalidReshapeTarget { target: Vec<isize>, reason: String },

    /// The strides of a tensor do not allow reinterpreting it without a copy.
    #[error("cannot view tensor of shape {shape} (strides {strides:?}) as {target} without copying")]
    NotViewable {
        shape: Shape,
        strides: Vec<usize>,
        target: Shape,
    },

    /// A shape cannot be broadcast to the requested one.
    #[error("cannot broadcast shape {from} to {to}")]
    BroadcastMismatch { from: Shape, to: Shape },

    /// Integer index outside a dimension.
    #[error("index {index} out of bounds for dim {dim} with size {size}")]
    IndexOutOfBounds { index: isize, dim: usize, size: usize },

    /// The index expression addresses more dims than exist.
    #[error("too many indices: expression consumes {consumed} dims, shape has {rank}")]
    TooManyIndices { consumed: usize, rank: usize },

    /// Structurally invalid index expression.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// DType mismatch between tensors in a joint operation.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// A value cannot be placed on the requested device.
    #[error("device error on {device}: {reason}")]
    Device { device: String, reason: String },

    /// Lookup or deletion of an absent key.
    #[error("key not found: {0:?}")]
    KeyNotFound(String),

    /// Containers combined by stack/cat have different key sets.
    #[error("key mismatch: expected keys {expected:?}, got {got:?}")]
    KeyMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// Flattening or unflattening would make two entries share a key.
    #[error("key collision: {0:?}")]
    KeyCollision(String),

    /// Malformed key (e.g. an empty path segment).
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// A key holds a tensor where a nested container was required, or the
    /// reverse (also: one key of a stack/cat is a leaf in one input and nested
    /// in another).
    #[error("entry kind mismatch for key {key:?}: expected {expected}, found {found}")]
    EntryKindMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Create a device placement error.
    pub fn device(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Device {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the shape-mismatch family.
    ///
    /// Callers that only care "were the shapes wrong" (e.g. a failed `view`)
    /// match on this instead of the individual variants.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::RankMismatch { .. }
                | Error::DimOutOfRange { .. }
                | Error::NarrowOutOfBounds { .. }
                | Error::ReshapeElementMismatch { .. }
                | Error::InvalidReshapeTarget { .. }
                | Error::NotViewable { .. }
                | Error::BroadcastMismatch { .. }
        )
    }
}

/// Convenience Result type used throughout tensormap.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_family() {
        let e = Error::NotViewable {
            shape: Shape::from((3, 4)),
            strides: vec![1, 3],
            target: Shape::from(12),
        };
        assert!(e.is_shape_error());
        let e = Error::InvalidReshapeTarget {
            target: vec![-1, -1],
            reason: "only one dimension can be inferred".into(),
        };
        assert!(e.is_shape_error());
        assert!(!Error::KeyNotFound("a".into()).is_shape_error());
    }

    #[test]
    fn test_display() {
        let e = Error::ShapeMismatch {
            expected: Shape::from((3, 4)),
            got: Shape::from((3, 5)),
        };
        assert_eq!(e.to_string(), "shape mismatch: expected [3, 4], got [3, 5]");
    }
}
