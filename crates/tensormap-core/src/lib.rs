//! # tensormap-core
//!
//! The tensor capability layer that tensormap containers are built on.
//!
//! This crate provides:
//! - [`Tensor`]: n-dimensional array handle; views share storage
//! - [`Shape`] / [`Layout`]: shape, strides, and memory layout
//! - [`DType`]: data types (F16, BF16, F32, F64, U8, U32, I64)
//! - [`TensorIndex`] / [`IndexPlan`]: tensor-style index expressions
//! - [`Backend`] trait: abstraction over device storage
// - Backend trait: what a device must implement (CPU lives in tensormap-cpu)
// - IndexPlan: resolves an index expression once, for tensors and bare shapes

pub mod backend;
pub mod dtype;
pub mod error;
pub mod index;
pub mod layout;
pub mod shape;
pub mod tensor;

pub use backend::{Backend, BackendDevice, BackendStorage};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use index::{expand_ellipsis, BoolMask, Gather, IndexPlan, SliceRange, TensorIndex};
pub use layout::Layout;
pub use shape::Shape;
pub use tensor::Tensor;
