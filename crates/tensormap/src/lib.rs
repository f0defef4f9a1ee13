//! # tensormap
//!
//! Dictionary-like containers of tensors that share a leading batch shape.
//!
//! A [`TensorMap`] maps string keys to tensors or nested maps. Every entry
//! starts with the map's batch shape, so indexing, reshaping, stacking or
//! splitting the map applies the same operation to the leading dims of every
//! entry while the trailing feature dims ride along.
//!
//! ## Usage
//!
//! ```ignore
//! use tensormap::prelude::*;
//!
//! let dev = CpuDevice::default();
//! let mut td = TensorMap::<CpuBackend>::new((3, 4));
//! td.set("obs", CpuTensor::zeros((3, 4, 7), DType::F32, &dev)?)?;
//! td.set_path("next.reward", CpuTensor::zeros((3, 4), DType::F32, &dev)?)?;
//!
//! let rows = td.index(&[TensorIndex::range(0, 2)])?;   // batch [2, 4]
//! let flat = td.reshape(&[-1])?;                         // batch [12]
//! let both = stack(&[td.clone(), td], 0)?;               // batch [2, 3, 4]
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `tensormap-core` | Tensor, Shape, Layout, DType, index expressions, Backend trait |
//! | `tensormap-cpu` | Reference CPU backend |
//! | `tensormap` | TensorMap, structural and key-path operations |
//!
//! ## Modules
//!
//! - [`container`]: the map itself: get/set/delete, index, apply, transfers
//! - [`ops`]: stack, cat, reshape, view, squeeze, unsqueeze, permute, expand, split
//! - [`keys`]: flatten and unflatten key paths
//! - [`batched`]: the [`BatchedContainer`] trait
//! - [`shape_algebra`]: batch-shape rules shared by all of the above

pub mod batched;
pub mod config;
pub mod container;
pub mod entry;
pub mod keys;
pub mod ops;
pub mod shape_algebra;

/// Re-export core types.
pub use tensormap_core::{
    backend::{Backend, BackendDevice, BackendStorage},
    BoolMask, DType, Error, IndexPlan, Layout, Result, Shape, SliceRange, Tensor, TensorIndex,
    WithDType,
};

/// Re-export the reference CPU backend.
pub use tensormap_cpu::{CpuBackend, CpuDevice, CpuStorage, CpuTensor};

pub use batched::BatchedContainer;
pub use config::TensorMapConfig;
pub use container::TensorMap;
pub use entry::Entry;
pub use keys::{flatten_keys, unflatten_keys};
pub use ops::{cat, stack};

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::batched::BatchedContainer;
    pub use crate::config::TensorMapConfig;
    pub use crate::container::TensorMap;
    pub use crate::entry::Entry;
    pub use crate::keys::{flatten_keys, unflatten_keys};
    pub use crate::ops::{cat, stack};
    pub use crate::{
        Backend, BackendDevice, BoolMask, CpuBackend, CpuDevice, CpuTensor, DType, Error, Result,
        Shape, Tensor, TensorIndex,
    };
}
