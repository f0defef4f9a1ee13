use tensormap_core::{Backend, Error, Result};

use crate::container::TensorMap;
use crate::entry::Entry;

// Key-path operations
//
// flatten_keys turns a tree of maps into one flat map whose keys are the leaf
// paths joined with a separator; unflatten_keys rebuilds the tree. Flattening
// keeps every leaf (with its own shape) but drops the extra batch dims of
// nested maps: after the round trip, intermediates carry the parent's batch
// shape.

fn check_separator(sep: &str) -> Result<()> {
    if sep.is_empty() {
        return Err(Error::InvalidKey("key path separator cannot be empty".into()));
    }
    Ok(())
}

/// A flat map keyed by `parent<sep>child` paths.
///
/// Fails with `KeyCollision` when two different paths join to the same key,
/// e.g. a literal key `"a.b"` next to a nested `a` holding `b`.
pub fn flatten_keys<B: Backend>(map: &TensorMap<B>, sep: &str) -> Result<TensorMap<B>> {
    check_separator(sep)?;
    let mut out = map.empty_like(map.batch_shape().clone());
    collect_into(map, "", sep, &mut out)?;
    Ok(out)
}

fn collect_into<B: Backend>(
    map: &TensorMap<B>,
    prefix: &str,
    sep: &str,
    out: &mut TensorMap<B>,
) -> Result<()> {
    for (key, entry) in map.iter() {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", prefix, sep, key)
        };
        match entry {
            Entry::Leaf(t) => {
                if out.keys().any(|k| k == path) {
                    return Err(Error::KeyCollision(path));
                }
                out.set(path, t.clone())?;
            }
            Entry::Nested(m) => collect_into(m, &path, sep, out)?,
        }
    }
    Ok(())
}

/// Inverse of [`flatten_keys`]: `"a<sep>b"` becomes `b` inside a nested map
/// `a`. Intermediate maps get this map's batch shape.
///
/// A name used both as a leaf and as a path prefix (`"a"` and `"a.b"`) is a
/// `KeyCollision` regardless of order. A nested map `"a"` and path keys
/// `"a<sep>..."` merge into one nested map, also regardless of order. An empty
/// path segment is `InvalidKey`.
pub fn unflatten_keys<B: Backend>(map: &TensorMap<B>, sep: &str) -> Result<TensorMap<B>> {
    check_separator(sep)?;
    let mut out = map.empty_like(map.batch_shape().clone());
    for (key, entry) in map.iter() {
        let segments: Vec<&str> = key.split(sep).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidKey(key.to_string()));
        }
        let entry = match entry {
            Entry::Leaf(t) => Entry::Leaf(t.clone()),
            Entry::Nested(m) => Entry::Nested(unflatten_keys(m, sep)?),
        };
        out.set_segments(&segments, entry, key, false)?;
    }
    Ok(out)
}

impl<B: Backend> TensorMap<B> {
    /// [`flatten_keys`] with the configured separator.
    pub fn flatten_keys(&self) -> Result<Self> {
        flatten_keys(self, &self.config().separator)
    }

    /// [`unflatten_keys`] with the configured separator.
    pub fn unflatten_keys(&self) -> Result<Self> {
        unflatten_keys(self, &self.config().separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensormap_core::DType;
    use tensormap_cpu::{CpuBackend, CpuDevice, CpuTensor};

    type Map = TensorMap<CpuBackend>;

    fn zeros(dims: &[usize]) -> CpuTensor {
        CpuTensor::zeros(dims, DType::F32, &CpuDevice::default()).unwrap()
    }

    #[test]
    fn test_flatten_nested_paths() -> Result<()> {
        let mut m = Map::new(2);
        m.set("a", zeros(&[2]))?;
        m.set_path("n.b", zeros(&[2, 3]))?;
        m.set_path("n.deep.c", zeros(&[2]))?;
        let flat = flatten_keys(&m, "/")?;
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["a", "n/b", "n/deep/c"]);
        assert!(flat.iter().all(|(_, e)| e.is_leaf()));
        Ok(())
    }

    #[test]
    fn test_flatten_collision() -> Result<()> {
        let mut m = Map::new(2);
        m.set("n.b", zeros(&[2]))?;
        m.set_path("n.b", zeros(&[2]))?;
        assert!(matches!(flatten_keys(&m, "."), Err(Error::KeyCollision(k)) if k == "n.b"));
        Ok(())
    }

    #[test]
    fn test_unflatten_prefix_collision_either_order() -> Result<()> {
        let mut leaf_first = Map::new(2);
        leaf_first.set("a", zeros(&[2]))?;
        leaf_first.set("a.b", zeros(&[2]))?;
        assert!(matches!(unflatten_keys(&leaf_first, "."), Err(Error::KeyCollision(_))));

        let mut path_first = Map::new(2);
        path_first.set("a.b", zeros(&[2]))?;
        path_first.set("a", zeros(&[2]))?;
        assert!(matches!(unflatten_keys(&path_first, "."), Err(Error::KeyCollision(_))));
        Ok(())
    }

    fn nested_and_path(nested_first: bool) -> Result<Map> {
        let mut inner = Map::new(2);
        inner.set("b", zeros(&[2]))?;
        let mut m = Map::new(2);
        if nested_first {
            m.set("a", inner)?;
            m.set("a.c", zeros(&[2, 3]))?;
        } else {
            m.set("a.c", zeros(&[2, 3]))?;
            m.set("a", inner)?;
        }
        Ok(m)
    }

    #[test]
    fn test_unflatten_merges_nested_and_path_in_either_order() -> Result<()> {
        for nested_first in [true, false] {
            let tree = unflatten_keys(&nested_and_path(nested_first)?, ".")?;
            let paths: Vec<String> = tree.leaves().into_iter().map(|(k, _)| k).collect();
            assert_eq!(paths, vec!["a.b", "a.c"]);
            assert_eq!(tree.get_tensor("a.c")?.dims(), &[2, 3]);
        }
        Ok(())
    }

    #[test]
    fn test_unflatten_nested_and_path_clash_in_either_order() -> Result<()> {
        for nested_first in [true, false] {
            let mut m = nested_and_path(nested_first)?;
            m.set("a.b", zeros(&[2]))?;
            assert!(matches!(unflatten_keys(&m, "."), Err(Error::KeyCollision(_))));
        }
        Ok(())
    }

    #[test]
    fn test_unflatten_rejects_empty_segment() -> Result<()> {
        let mut m = Map::new(2);
        m.set("a..b", zeros(&[2]))?;
        assert!(matches!(unflatten_keys(&m, "."), Err(Error::InvalidKey(_))));
        assert!(matches!(unflatten_keys(&m, ""), Err(Error::InvalidKey(_))));
        Ok(())
    }

    #[test]
    fn test_methods_use_configured_separator() -> Result<()> {
        use crate::config::TensorMapConfig;
        let mut m = Map::with_config(2, None, TensorMapConfig::default().separator("/"))?;
        m.set("x/y", zeros(&[2]))?;
        let tree = m.unflatten_keys()?;
        assert_eq!(tree.get_map("x")?.batch_shape().dims(), &[2]);
        assert_eq!(tree.flatten_keys()?.keys().collect::<Vec<_>>(), vec!["x/y"]);
        Ok(())
    }
}
