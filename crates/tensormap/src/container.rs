use std::fmt;

use tensormap_core::{
    Backend, BackendDevice, BoolMask, DType, Error, IndexPlan, Result, Shape, Tensor, TensorIndex,
};

use crate::config::TensorMapConfig;
use crate::entry::Entry;
use crate::shape_algebra::{index_result_shape, normalize_index};

// TensorMap: named tensors sharing a leading batch shape
//
// INVARIANTS:
//
//   1. Every leaf's shape starts with `batch_shape` (exactly, no broadcast).
//   2. Every nested map's batch shape starts with `batch_shape`.
//   3. When `device` is set, every leaf lives on it: incoming tensors are
//      transferred on insertion, incoming maps are transferred recursively.
//   4. Keys are unique; iteration follows insertion order.
//
// Every mutation validates (and transfers) first and only then touches
// `entries`, so a failed call leaves the map as it was.
//
// OWNERSHIP:
//
//   The map owns its entries, not the tensor storage. `Clone` is shallow (the
//   tensors are Arc handles). `index` with basic items, `view`, `reshape`
//   when strides allow, `squeeze`, `unsqueeze`, `permute`, `expand` and
//   `split` return maps whose leaves alias the source storage; advanced
//   indexing, `stack`, `cat`, `deep_clone`, `to_device` and `to_dtype`
//   allocate. In-place operations (`apply(.., true)`, `fill_`,
//   `masked_fill(.., true)`, `assign_index`) write through every alias.

/// A dictionary of tensors (or nested maps) sharing a leading batch shape.
///
/// # Example
/// ```ignore
/// let mut td = TensorMap::<CpuBackend>::new((3, 4));
/// td.set("obs", CpuTensor::zeros((3, 4, 7), DType::F32, &dev)?)?;
/// td.set_path("next.reward", CpuTensor::zeros((3, 4), DType::F32, &dev)?)?;
/// let first_rows = td.index(&[TensorIndex::range(0, 2)])?; // batch [2, 4]
/// ```
pub struct TensorMap<B: Backend> {
    entries: Vec<(String, Entry<B>)>,
    batch_shape: Shape,
    device: Option<B::Device>,
    config: TensorMapConfig,
}

impl<B: Backend> Clone for TensorMap<B> {
    fn clone(&self) -> Self {
        TensorMap {
            entries: self.entries.clone(),
            batch_shape: self.batch_shape.clone(),
            device: self.device.clone(),
            config: self.config.clone(),
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl<B: Backend> TensorMap<B> {
    // Construction

    /// Empty map with the given batch shape and no fixed device.
    pub fn new(batch_shape: impl Into<Shape>) -> Self {
        TensorMap {
            entries: Vec::new(),
            batch_shape: batch_shape.into(),
            device: None,
            config: TensorMapConfig::default(),
        }
    }

    /// Empty map whose leaves are all placed on `device`.
    pub fn with_device(batch_shape: impl Into<Shape>, device: B::Device) -> Self {
        let mut map = Self::new(batch_shape);
        map.device = Some(device);
        map
    }

    pub fn with_config(
        batch_shape: impl Into<Shape>,
        device: Option<B::Device>,
        config: TensorMapConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut map = Self::new(batch_shape);
        map.device = device;
        map.config = config;
        Ok(map)
    }

    /// Build a map from `(key, tensor or map)` pairs, validating each one.
    pub fn from_entries<I, K, V>(
        entries: I,
        batch_shape: impl Into<Shape>,
        device: Option<B::Device>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Entry<B>>,
    {
        let mut map = Self::new(batch_shape);
        map.device = device;
        for (key, value) in entries {
            map.set(key, value)?;
        }
        Ok(map)
    }

    /// Empty map with the same device and config and a new batch shape.
    pub(crate) fn empty_like(&self, batch_shape: Shape) -> Self {
        TensorMap {
            entries: Vec::new(),
            batch_shape,
            device: self.device.clone(),
            config: self.config.clone(),
        }
    }

    // Accessors

    pub fn batch_shape(&self) -> &Shape {
        &self.batch_shape
    }

    pub fn batch_rank(&self) -> usize {
        self.batch_shape.rank()
    }

    pub fn device(&self) -> Option<&B::Device> {
        self.device.as_ref()
    }

    pub fn config(&self) -> &TensorMapConfig {
        &self.config
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry<B>)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Every leaf with its full key path, depth-first in insertion order.
    pub fn leaves(&self) -> Vec<(String, &Tensor<B>)> {
        let mut out = Vec::new();
        self.collect_leaves("", &self.config.separator, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, sep: &str, out: &mut Vec<(String, &'a Tensor<B>)>) {
        for (key, entry) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}{}{}", prefix, sep, key)
            };
            match entry {
                Entry::Leaf(t) => out.push((path, t)),
                Entry::Nested(m) => m.collect_leaves(&path, sep, out),
            }
        }
    }

    // Lookup

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Literal key first, then every way of splitting it at a separator
    /// whose head names a nested map.
    fn lookup(&self, key: &str) -> Option<&Entry<B>> {
        if let Some(i) = self.position(key) {
            return Some(&self.entries[i].1);
        }
        let sep = self.config.separator.as_str();
        for (at, _) in key.match_indices(sep) {
            let (head, rest) = (&key[..at], &key[at + sep.len()..]);
            if let Some(Entry::Nested(child)) = self.position(head).map(|i| &self.entries[i].1) {
                if let Some(entry) = child.lookup(rest) {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// The entry stored under `key` (a literal key or a key path).
    pub fn get(&self, key: &str) -> Result<&Entry<B>> {
        self.lookup(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    pub fn get_tensor(&self, key: &str) -> Result<&Tensor<B>> {
        let entry = self.get(key)?;
        entry.as_tensor().ok_or_else(|| entry.kind_error(key, "leaf"))
    }

    pub fn get_map(&self, key: &str) -> Result<&TensorMap<B>> {
        let entry = self.get(key)?;
        entry.as_map().ok_or_else(|| entry.kind_error(key, "nested"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    // Mutation

    /// Validate `entry` against this map and place it on the map's device.
    fn prepare(&self, entry: Entry<B>) -> Result<Entry<B>> {
        entry.check_fits(&self.batch_shape)?;
        match (&self.device, entry) {
            (None, entry) => Ok(entry),
            (Some(device), Entry::Leaf(t)) => Ok(Entry::Leaf(t.to_device(device)?)),
            (Some(device), Entry::Nested(m)) => Ok(Entry::Nested(m.to_device(device)?)),
        }
    }

    fn insert_prepared(&mut self, key: String, entry: Entry<B>) {
        match self.position(&key) {
            Some(i) => self.entries[i].1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    /// Store a tensor or nested map under the literal `key`.
    ///
    /// An existing key is overwritten in place (its position is kept).
    /// Fails with `ShapeMismatch` when the value does not start with the batch
    /// shape, and with `Device` when it cannot be moved to the map's device.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Entry<B>>) -> Result<()> {
        let key = key.into();
        check_key(&key)?;
        let entry = self.prepare(value.into())?;
        self.insert_prepared(key, entry);
        Ok(())
    }

    /// Like `set`, but `path` is split at the separator and missing
    /// intermediate maps are created with this map's batch shape.
    pub fn set_path(&mut self, path: &str, value: impl Into<Entry<B>>) -> Result<()> {
        let segments = self.split_path(path)?;
        self.set_segments(&segments, value.into(), path, true)
    }

    pub(crate) fn split_path<'a>(&self, path: &'a str) -> Result<Vec<&'a str>> {
        let segments: Vec<&str> = path.split(self.config.separator.as_str()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidKey(path.to_string()));
        }
        Ok(segments)
    }

    /// Walk `segments`, creating intermediate maps as needed. A leaf on the
    /// way is a `KeyCollision`.
    ///
    /// An existing final key is replaced when `overwrite` is set. Otherwise
    /// two nested maps merge (the incoming map's batch shape and keys first,
    /// then the existing keys) and anything else is a `KeyCollision`, so the
    /// outcome does not depend on which of the two arrived first.
    pub(crate) fn set_segments(
        &mut self,
        segments: &[&str],
        entry: Entry<B>,
        path: &str,
        overwrite: bool,
    ) -> Result<()> {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Err(Error::InvalidKey(path.to_string())),
        };
        if rest.is_empty() {
            let i = match self.position(head) {
                Some(i) if !overwrite => i,
                _ => return self.set(*head, entry),
            };
            let merged = match (&self.entries[i].1, entry) {
                (Entry::Nested(existing), Entry::Nested(incoming)) => {
                    incoming.merged_with(existing, path)?
                }
                _ => return Err(Error::KeyCollision(path.to_string())),
            };
            let merged = self.prepare(Entry::Nested(merged))?;
            self.entries[i].1 = merged;
            return Ok(());
        }
        match self.position(head) {
            Some(i) => match &mut self.entries[i].1 {
                Entry::Nested(child) => child.set_segments(rest, entry, path, overwrite),
                Entry::Leaf(_) => Err(Error::KeyCollision(path.to_string())),
            },
            None => {
                let mut child = self.empty_like(self.batch_shape.clone());
                child.set_segments(rest, entry, path, overwrite)?;
                self.entries.push((head.to_string(), Entry::Nested(child)));
                Ok(())
            }
        }
    }

    /// `self` plus every entry of `other`, without overwriting. Each entry of
    /// `other` must fit this map's batch shape.
    fn merged_with(mut self, other: &TensorMap<B>, path: &str) -> Result<Self> {
        for (key, entry) in &other.entries {
            let child_path = format!("{}{}{}", path, self.config.separator, key);
            self.set_segments(&[key.as_str()], entry.clone(), &child_path, false)?;
        }
        Ok(self)
    }

    /// Remove and return the entry under `key` (literal key or key path).
    pub fn delete(&mut self, key: &str) -> Result<Entry<B>> {
        if let Some(i) = self.position(key) {
            return Ok(self.entries.remove(i).1);
        }
        let sep = self.config.separator.clone();
        for (at, _) in key.match_indices(sep.as_str()) {
            let (head, rest) = (&key[..at], &key[at + sep.len()..]);
            if let Some(i) = self.position(head) {
                if let Entry::Nested(child) = &mut self.entries[i].1 {
                    if let Ok(entry) = child.delete(rest) {
                        return Ok(entry);
                    }
                }
            }
        }
        Err(Error::KeyNotFound(key.to_string()))
    }

    /// Rename a top-level key, keeping its position.
    pub fn rename_key(&mut self, old: &str, new: &str) -> Result<()> {
        check_key(new)?;
        let i = self
            .position(old)
            .ok_or_else(|| Error::KeyNotFound(old.to_string()))?;
        if old != new && self.position(new).is_some() {
            return Err(Error::KeyCollision(new.to_string()));
        }
        self.entries[i].0 = new.to_string();
        Ok(())
    }

    /// Copy every top-level entry of `other` into this map.
    pub fn update(&mut self, other: &TensorMap<B>) -> Result<()> {
        let prepared = other
            .entries
            .iter()
            .map(|(k, e)| Ok((k.clone(), self.prepare(e.clone())?)))
            .collect::<Result<Vec<_>>>()?;
        for (key, entry) in prepared {
            self.insert_prepared(key, entry);
        }
        Ok(())
    }

    /// A map holding only `keys` (key paths keep their nesting).
    pub fn select(&self, keys: &[&str]) -> Result<Self> {
        let mut out = self.empty_like(self.batch_shape.clone());
        for &key in keys {
            let entry = self.get(key)?.clone();
            if self.position(key).is_some() {
                out.set(key, entry)?;
            } else {
                out.set_path(key, entry)?;
            }
        }
        Ok(out)
    }

    /// A map without `keys`. Absent keys are ignored.
    pub fn exclude(&self, keys: &[&str]) -> Result<Self> {
        let mut out = self.clone();
        for &key in keys {
            match out.delete(key) {
                Ok(_) | Err(Error::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // Whole-map transforms

    /// Build a map of batch shape `batch_shape` by transforming every leaf
    /// with `leaf` and every nested map with `nested`. Nothing is returned
    /// unless every entry succeeds and fits the new batch shape.
    pub(crate) fn map_entries<L, N>(&self, batch_shape: Shape, mut leaf: L, mut nested: N) -> Result<Self>
    where
        L: FnMut(&Tensor<B>) -> Result<Tensor<B>>,
        N: FnMut(&TensorMap<B>) -> Result<TensorMap<B>>,
    {
        let mut out = self.empty_like(batch_shape);
        for (key, entry) in &self.entries {
            let mapped = match entry {
                Entry::Leaf(t) => Entry::Leaf(leaf(t)?),
                Entry::Nested(m) => Entry::Nested(nested(m)?),
            };
            mapped.check_fits(&out.batch_shape)?;
            out.entries.push((key.clone(), mapped));
        }
        Ok(out)
    }

    /// Index every entry along its leading batch dims.
    ///
    /// The expression addresses batch dims only: the ellipsis expands relative
    /// to the batch rank and feature dims are never indexed. Basic items give
    /// views; integer arrays and masks give copies.
    pub fn index(&self, items: &[TensorIndex]) -> Result<Self> {
        let items = normalize_index(items, self.batch_rank())?;
        let batch_shape = index_result_shape(&self.batch_shape, &items)?;
        self.map_entries(batch_shape, |t| t.index(&items), |m| m.index(&items))
    }

    /// Call `f` on every leaf (nested maps recurse).
    ///
    /// With `in_place == false` the results form a new map with the same
    /// batch shape. With `in_place == true` every result must keep its leaf's
    /// shape and is written into the existing storage, visible through every
    /// alias; all results are computed and checked before the first write.
    pub fn apply<F>(&self, mut f: F, in_place: bool) -> Result<Self>
    where
        F: FnMut(&Tensor<B>) -> Result<Tensor<B>>,
    {
        let mapped = self.apply_with(&mut f)?;
        if !in_place {
            return Ok(mapped);
        }
        let targets = self.leaves();
        let values = mapped.leaves();
        for ((_, dst), (_, src)) in targets.iter().zip(values.iter()) {
            if dst.shape() != src.shape() {
                return Err(Error::ShapeMismatch {
                    expected: dst.shape().clone(),
                    got: src.shape().clone(),
                });
            }
        }
        for ((_, dst), (_, src)) in targets.iter().zip(values.iter()) {
            dst.assign_(src)?;
        }
        Ok(self.clone())
    }

    fn apply_with(&self, f: &mut dyn FnMut(&Tensor<B>) -> Result<Tensor<B>>) -> Result<Self> {
        let mut out = self.empty_like(self.batch_shape.clone());
        for (key, entry) in &self.entries {
            let mapped = match entry {
                Entry::Leaf(t) => Entry::Leaf(f(t)?),
                Entry::Nested(m) => Entry::Nested(m.apply_with(f)?),
            };
            let mapped = out.prepare(mapped)?;
            out.entries.push((key.clone(), mapped));
        }
        Ok(out)
    }

    /// A map with every leaf moved to `device` and the map (and nested maps)
    /// fixed to it. `self` is untouched.
    pub fn to_device(&self, device: &B::Device) -> Result<Self> {
        let mut out = self.map_entries(
            self.batch_shape.clone(),
            |t| t.to_device(device),
            |m| m.to_device(device),
        )?;
        out.device = Some(device.clone());
        Ok(out)
    }

    /// In-place `to_device`: rebinds this map's entries. On failure nothing
    /// changes.
    pub fn to_device_(&mut self, device: &B::Device) -> Result<()> {
        *self = self.to_device(device)?;
        Ok(())
    }

    /// A map with every leaf cast to `dtype`.
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        self.map_entries(
            self.batch_shape.clone(),
            |t| t.to_dtype(dtype),
            |m| m.to_dtype(dtype),
        )
    }

    /// In-place `to_dtype`. On failure nothing changes.
    pub fn to_dtype_(&mut self, dtype: DType) -> Result<()> {
        *self = self.to_dtype(dtype)?;
        Ok(())
    }

    /// Copy every leaf into fresh storage.
    pub fn deep_clone(&self) -> Result<Self> {
        self.map_entries(
            self.batch_shape.clone(),
            |t| t.deep_clone(),
            |m| m.deep_clone(),
        )
    }

    /// Make every leaf contiguous (leaves that already are stay shared).
    pub fn contiguous(&self) -> Result<Self> {
        self.map_entries(
            self.batch_shape.clone(),
            |t| t.contiguous(),
            |m| m.contiguous(),
        )
    }

    /// Set every element of every leaf to `value`.
    pub fn fill_(&self, value: f64) -> Result<()> {
        for (_, t) in self.leaves() {
            t.fill_(value)?;
        }
        Ok(())
    }

    pub fn zero_(&self) -> Result<()> {
        self.fill_(0.0)
    }

    fn check_mask(&self, mask: &BoolMask) -> Result<()> {
        if !self.batch_shape.starts_with(mask.shape()) {
            return Err(Error::ShapeMismatch {
                expected: self.batch_shape.clone(),
                got: mask.shape().clone(),
            });
        }
        Ok(())
    }

    /// Set the batch positions selected by `mask` to `value` in every leaf.
    /// `mask` covers the leading batch dims.
    pub fn masked_fill(&self, mask: &BoolMask, value: f64, in_place: bool) -> Result<Self> {
        self.check_mask(mask)?;
        if in_place {
            for (_, t) in self.leaves() {
                t.masked_fill_(mask, value)?;
            }
            return Ok(self.clone());
        }
        self.map_entries(
            self.batch_shape.clone(),
            |t| t.masked_fill(mask, value),
            |m| m.masked_fill(mask, value, false),
        )
    }

    /// Write `other` into the region of this map addressed by `items`
    /// (`td[items] = other`).
    ///
    /// `items` must be a basic index so the region is a view. `other` must
    /// hold the same leaf paths, each with exactly the shape of the region.
    pub fn assign_index(&self, items: &[TensorIndex], other: &TensorMap<B>) -> Result<()> {
        let items = normalize_index(items, self.batch_rank())?;
        if !IndexPlan::for_shape(&self.batch_shape, &items)?.is_view() {
            return Err(Error::InvalidIndex(
                "assignment needs a basic index (no integer arrays or masks)".into(),
            ));
        }
        let region = self.index(&items)?;
        let targets = region.leaves();
        let values = other.leaves();

        let mut expected: Vec<String> = targets.iter().map(|(k, _)| k.clone()).collect();
        let mut got: Vec<String> = values.iter().map(|(k, _)| k.clone()).collect();
        expected.sort();
        got.sort();
        if expected != got {
            return Err(Error::KeyMismatch { expected, got });
        }

        let mut pairs = Vec::with_capacity(targets.len());
        for (path, dst) in &targets {
            let src = values
                .iter()
                .find(|(k, _)| k == path)
                .map(|(_, t)| *t)
                .ok_or_else(|| Error::KeyNotFound(path.clone()))?;
            if dst.shape() != src.shape() {
                return Err(Error::ShapeMismatch {
                    expected: dst.shape().clone(),
                    got: src.shape().clone(),
                });
            }
            pairs.push((*dst, src));
        }
        for (dst, src) in pairs {
            dst.assign_(src)?;
        }
        Ok(())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth + 1);
        let device = self
            .device
            .as_ref()
            .map(|d| d.name())
            .unwrap_or_else(|| "None".to_string());
        writeln!(f, "TensorMap(")?;
        writeln!(f, "{}batch_shape={}, device={},", pad, self.batch_shape, device)?;
        for (key, entry) in &self.entries {
            match entry {
                Entry::Leaf(t) => writeln!(
                    f,
                    "{}{}: Tensor(shape={}, dtype={}, device={}),",
                    pad,
                    key,
                    t.shape(),
                    t.dtype(),
                    t.device().name()
                )?,
                Entry::Nested(m) => {
                    write!(f, "{}{}: ", pad, key)?;
                    m.fmt_indented(f, depth + 1)?;
                    writeln!(f, ",")?;
                }
            }
        }
        write!(f, "{})", "    ".repeat(depth))
    }
}

impl<B: Backend> fmt::Display for TensorMap<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl<B: Backend> fmt::Debug for TensorMap<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensormap_cpu::{CpuBackend, CpuDevice, CpuTensor};

    type Map = TensorMap<CpuBackend>;

    fn dev() -> CpuDevice {
        CpuDevice::default()
    }

    fn zeros(dims: &[usize]) -> CpuTensor {
        CpuTensor::zeros(dims, DType::F32, &dev()).unwrap()
    }

    #[test]
    fn test_set_and_get() -> Result<()> {
        let mut m = Map::new((3, 4));
        m.set("a", zeros(&[3, 4, 2]))?;
        m.set("b", zeros(&[3, 4]))?;
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.get_tensor("a")?.dims(), &[3, 4, 2]);
        assert!(matches!(m.get("c"), Err(Error::KeyNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_overwrite_keeps_position() -> Result<()> {
        let mut m = Map::new(3);
        m.set("a", zeros(&[3]))?;
        m.set("b", zeros(&[3]))?;
        m.set("a", zeros(&[3, 5]))?;
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.get_tensor("a")?.dims(), &[3, 5]);
        Ok(())
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut m = Map::new(3);
        assert!(matches!(m.set("", zeros(&[3])), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_path_lookup_prefers_literal_key() -> Result<()> {
        let mut m = Map::new(2);
        m.set_path("x.y", zeros(&[2, 1]))?;
        m.set("x.y", zeros(&[2, 9]))?;
        assert_eq!(m.get_tensor("x.y")?.dims(), &[2, 9]);
        m.delete("x.y")?;
        assert_eq!(m.get_tensor("x.y")?.dims(), &[2, 1]);
        Ok(())
    }

    #[test]
    fn test_kind_errors() -> Result<()> {
        let mut m = Map::new(2);
        m.set_path("n.t", zeros(&[2]))?;
        assert!(matches!(
            m.get_tensor("n"),
            Err(Error::EntryKindMismatch { expected: "leaf", found: "nested", .. })
        ));
        assert!(m.get_map("n.t").is_err());
        Ok(())
    }

    #[test]
    fn test_display_lists_entries() -> Result<()> {
        let mut m = Map::new(2);
        m.set("obs", zeros(&[2, 3]))?;
        m.set_path("next.done", zeros(&[2]))?;
        let text = m.to_string();
        assert!(text.starts_with("TensorMap("));
        assert!(text.contains("batch_shape=[2], device=None"));
        assert!(text.contains("obs: Tensor(shape=[2, 3], dtype=f32, device=cpu:0)"));
        assert!(text.contains("next: TensorMap("));
        Ok(())
    }
}
