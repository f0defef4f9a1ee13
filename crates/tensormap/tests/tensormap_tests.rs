// Tests for tensormap: container semantics, structural ops, key paths

use tensormap::prelude::*;

fn dev() -> CpuDevice {
    CpuDevice::default()
}

/// Tensor of the given shape holding 0, 1, 2, ...
fn seq(dims: &[usize]) -> Result<CpuTensor> {
    let n = dims.iter().product();
    CpuTensor::arange(n, DType::F32, &dev())?.reshape(dims)
}

/// Batch [3, 4] with a feature leaf, a batch-only leaf and a nested map.
fn sample() -> Result<TensorMap<CpuBackend>> {
    let mut td = TensorMap::new((3, 4));
    td.set("obs", seq(&[3, 4, 2])?)?;
    td.set("reward", seq(&[3, 4])?)?;
    td.set_path("next.done", seq(&[3, 4])?)?;
    td.set_path("next.obs", seq(&[3, 4, 2])?)?;
    Ok(td)
}

fn assert_same_leaves(a: &TensorMap<CpuBackend>, b: &TensorMap<CpuBackend>) -> Result<()> {
    let (la, lb) = (a.leaves(), b.leaves());
    assert_eq!(la.len(), lb.len());
    for ((ka, ta), (kb, tb)) in la.iter().zip(lb.iter()) {
        assert_eq!(ka, kb);
        assert_eq!(ta.dims(), tb.dims());
        assert_eq!(ta.to_f64_vec()?, tb.to_f64_vec()?);
    }
    Ok(())
}

// Construction

#[test]
fn test_every_leaf_starts_with_batch_shape() -> Result<()> {
    let td = sample()?;
    for (_, t) in td.leaves() {
        assert_eq!(&t.dims()[..2], &[3, 4]);
    }
    assert_eq!(td.get_map("next")?.batch_shape().dims(), &[3, 4]);
    Ok(())
}

#[test]
fn test_from_entries() -> Result<()> {
    let td = TensorMap::<CpuBackend>::from_entries(
        vec![("a", seq(&[2, 5])?), ("b", seq(&[2])?)],
        2,
        None,
    )?;
    assert_eq!(td.len(), 2);
    assert!(td.contains("a") && td.contains("b"));
    let bad = TensorMap::<CpuBackend>::from_entries(vec![("a", seq(&[3])?)], 2, None);
    assert!(matches!(bad, Err(Error::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn test_failed_set_leaves_map_unchanged() -> Result<()> {
    let mut td = sample()?;
    let before: Vec<String> = td.keys().map(str::to_string).collect();
    let err = td.set("obs", seq(&[4, 3, 2])?).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    let err = td.set("extra", seq(&[3])?).unwrap_err();
    assert!(err.is_shape_error());
    assert_eq!(td.keys().collect::<Vec<_>>(), before);
    assert_eq!(td.get_tensor("obs")?.dims(), &[3, 4, 2]);
    Ok(())
}

// Devices

#[test]
fn test_fixed_device_moves_incoming_leaves() -> Result<()> {
    let target = CpuDevice::new(1);
    let mut td = TensorMap::<CpuBackend>::with_device((3, 4), target);
    td.set("obs", seq(&[3, 4, 2])?)?;
    td.set_path("next.done", seq(&[3, 4])?)?;
    for (_, t) in td.leaves() {
        assert_eq!(t.device(), &target);
    }
    assert_eq!(td.get_map("next")?.device(), Some(&target));
    Ok(())
}

#[test]
fn test_unavailable_device_fails_without_change() -> Result<()> {
    let mut td = sample()?;
    let missing = CpuDevice::new(CpuDevice::MAX_ORDINAL);
    let err = td.to_device_(&missing).unwrap_err();
    assert!(matches!(err, Error::Device { .. }));
    assert!(td.device().is_none());
    for (_, t) in td.leaves() {
        assert_eq!(t.device(), &dev());
    }

    let mut fixed = TensorMap::<CpuBackend>::with_device(3, missing);
    assert!(matches!(fixed.set("a", seq(&[3])?), Err(Error::Device { .. })));
    assert!(fixed.is_empty());
    Ok(())
}

#[test]
fn test_to_device_in_place() -> Result<()> {
    let mut td = sample()?;
    let before = td.get_tensor("obs")?.clone();
    td.to_device_(&CpuDevice::new(2))?;
    assert_eq!(td.device(), Some(&CpuDevice::new(2)));
    assert_eq!(td.get_tensor("next.obs")?.device(), &CpuDevice::new(2));
    assert!(!td.get_tensor("obs")?.shares_storage(&before));
    Ok(())
}

#[test]
fn test_to_device_leaves_source_alone() -> Result<()> {
    let td = sample()?;
    let moved = td.to_device(&CpuDevice::new(3))?;
    assert_eq!(moved.device(), Some(&CpuDevice::new(3)));
    assert_eq!(moved.get_map("next")?.device(), Some(&CpuDevice::new(3)));
    assert_eq!(moved.get_tensor("next.done")?.device(), &CpuDevice::new(3));
    assert!(td.device().is_none());
    assert_eq!(td.get_tensor("obs")?.device(), &dev());
    assert_same_leaves(&td, &moved)?;
    Ok(())
}

#[test]
fn test_to_dtype() -> Result<()> {
    let mut td = sample()?;
    let cast = td.to_dtype(DType::F64)?;
    assert_eq!(cast.get_tensor("next.obs")?.dtype(), DType::F64);
    assert_eq!(td.get_tensor("next.obs")?.dtype(), DType::F32);
    td.to_dtype_(DType::I64)?;
    assert_eq!(td.get_tensor("reward")?.dtype(), DType::I64);
    assert_eq!(td.get_tensor("reward")?.to_f64_vec()?[5], 5.0);
    Ok(())
}

// Indexing

#[test]
fn test_index_slices_batch_dims_only() -> Result<()> {
    let td = sample()?;
    let sub = td.index(&[TensorIndex::Full, TensorIndex::range(0, 2)])?;
    assert_eq!(sub.batch_shape().dims(), &[3, 2]);
    assert_eq!(sub.get_tensor("obs")?.dims(), &[3, 2, 2]);
    assert_eq!(sub.get_tensor("next.done")?.dims(), &[3, 2]);
    assert_eq!(sub.get_tensor("reward")?.to_f64_vec()?, vec![0.0, 1.0, 4.0, 5.0, 8.0, 9.0]);
    Ok(())
}

#[test]
fn test_ellipsis_never_reaches_feature_dims() -> Result<()> {
    let td = sample()?;
    let last = td.index(&[TensorIndex::Ellipsis, TensorIndex::Select(-1)])?;
    assert_eq!(last.batch_shape().dims(), &[3]);
    assert_eq!(last.get_tensor("obs")?.dims(), &[3, 2]);
    assert_eq!(last.get_tensor("reward")?.to_f64_vec()?, vec![3.0, 7.0, 11.0]);
    Ok(())
}

#[test]
fn test_advanced_index_copies() -> Result<()> {
    let td = sample()?;
    let picked = td.index(&[TensorIndex::Indices(vec![2, 0])])?;
    assert_eq!(picked.batch_shape().dims(), &[2, 4]);
    assert!(!picked.get_tensor("obs")?.shares_storage(td.get_tensor("obs")?));
    assert_eq!(&picked.get_tensor("reward")?.to_f64_vec()?[..2], &[8.0, 9.0]);
    Ok(())
}

#[test]
fn test_views_share_and_deep_clone_does_not() -> Result<()> {
    let td = sample()?;
    let view = td.index(&[TensorIndex::Select(1)])?;
    let copy = td.deep_clone()?;
    assert!(view.get_tensor("reward")?.shares_storage(td.get_tensor("reward")?));
    assert!(!copy.get_tensor("reward")?.shares_storage(td.get_tensor("reward")?));

    view.fill_(-1.0)?;
    let row1 = td.get_tensor("reward")?.index(&[TensorIndex::Select(1)])?;
    assert_eq!(row1.to_f64_vec()?, vec![-1.0; 4]);
    assert_eq!(&copy.get_tensor("reward")?.to_f64_vec()?[4..8], &[4.0, 5.0, 6.0, 7.0]);
    Ok(())
}

#[test]
fn test_masked_select() -> Result<()> {
    let td = sample()?;
    let mut flags = vec![false; 12];
    flags[0] = true;
    flags[5] = true;
    flags[11] = true;
    let mask = BoolMask::new(flags, (3, 4))?;
    let sel = td.masked_select(&mask)?;
    assert_eq!(sel.batch_shape().dims(), &[mask.count_true()]);
    assert_eq!(sel.get_tensor("reward")?.to_f64_vec()?, vec![0.0, 5.0, 11.0]);
    assert_eq!(sel.get_tensor("next.obs")?.dims(), &[3, 2]);
    Ok(())
}

// Structural operations

#[test]
fn test_stack_and_cat_shapes() -> Result<()> {
    let (a, b) = (sample()?, sample()?);
    let stacked = stack(&[a.clone(), b.clone()], 0)?;
    assert_eq!(stacked.batch_shape().dims(), &[2, 3, 4]);
    assert_eq!(stacked.get_tensor("obs")?.dims(), &[2, 3, 4, 2]);
    let joined = cat(&[a, b], 0)?;
    assert_eq!(joined.batch_shape().dims(), &[6, 4]);
    assert_eq!(joined.get_tensor("next.obs")?.dims(), &[6, 4, 2]);
    Ok(())
}

#[test]
fn test_stack_map_with_itself() -> Result<()> {
    let td = sample()?;
    let twice = stack(&[td.clone(), td.clone()], 0)?;
    let reward = td.get_tensor("reward")?.to_f64_vec()?;
    let stacked = twice.get_tensor("reward")?.to_f64_vec()?;
    assert_eq!(&stacked[..12], &reward[..]);
    assert_eq!(&stacked[12..], &reward[..]);
    let joined = cat(&[td.clone(), td], 1)?;
    assert_eq!(joined.get_tensor("next.obs")?.dims(), &[3, 8, 2]);
    Ok(())
}

#[test]
fn test_stack_rejects_different_keys() -> Result<()> {
    let a = sample()?;
    let mut b = sample()?;
    b.delete("reward")?;
    b.set("other", seq(&[3, 4])?)?;
    assert!(matches!(stack(&[a.clone(), b.clone()], 0), Err(Error::KeyMismatch { .. })));
    assert!(matches!(cat(&[a.clone(), b], 0), Err(Error::KeyMismatch { .. })));

    let smaller = a.index(&[TensorIndex::range(0, 2)])?;
    assert!(matches!(stack(&[a.clone(), smaller.clone()], 0), Err(Error::ShapeMismatch { .. })));
    assert_eq!(cat(&[a, smaller], 0)?.batch_shape().dims(), &[5, 4]);
    Ok(())
}

#[test]
fn test_stack_keeps_first_key_order() -> Result<()> {
    let mut a = TensorMap::<CpuBackend>::new(2);
    a.set("x", seq(&[2])?)?;
    a.set("y", seq(&[2])?)?;
    let mut b = TensorMap::<CpuBackend>::new(2);
    b.set("y", seq(&[2])?)?;
    b.set("x", seq(&[2])?)?;
    let s = stack(&[a, b], 1)?;
    assert_eq!(s.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    assert_eq!(s.batch_shape().dims(), &[2, 2]);
    Ok(())
}

#[test]
fn test_reshape_round_trip() -> Result<()> {
    let td = sample()?;
    let flat = td.reshape(&[-1])?;
    assert_eq!(flat.batch_shape().dims(), &[12]);
    assert_eq!(flat.get_tensor("obs")?.dims(), &[12, 2]);
    let back = flat.reshape(&[3, 4])?;
    assert_eq!(back.batch_shape(), td.batch_shape());
    assert_same_leaves(&back, &td)?;
    assert!(td.reshape(&[5, -1]).unwrap_err().is_shape_error());
    Ok(())
}

#[test]
fn test_reshape_rejects_unresolvable_targets() -> Result<()> {
    let td = sample()?;
    let targets: [&[isize]; 4] = [&[-1, -1], &[-3, 4], &[isize::MAX, 4], &[isize::MAX, -1]];
    for target in targets {
        assert!(td.reshape(target).unwrap_err().is_shape_error());
        assert!(td.view(target).unwrap_err().is_shape_error());
    }
    assert_eq!(td.batch_shape().dims(), &[3, 4]);
    assert_eq!(td.get_tensor("obs")?.dims(), &[3, 4, 2]);
    Ok(())
}

#[test]
fn test_view_after_permute_fails_but_reshape_copies() -> Result<()> {
    let td = sample()?;
    let p = td.permute(&[1, 0])?;
    assert_eq!(p.batch_shape().dims(), &[4, 3]);
    assert_eq!(p.get_tensor("obs")?.dims(), &[4, 3, 2]);

    let err = p.view(&[-1]).unwrap_err();
    assert!(matches!(err, Error::NotViewable { .. }));
    assert!(err.is_shape_error());

    let r = p.reshape(&[-1])?;
    assert_eq!(r.batch_shape().dims(), &[12]);
    assert_eq!(&r.get_tensor("reward")?.to_f64_vec()?[..4], &[0.0, 4.0, 8.0, 1.0]);
    assert!(td.view(&[12])?.get_tensor("reward")?.shares_storage(td.get_tensor("reward")?));
    Ok(())
}

#[test]
fn test_squeeze_unsqueeze() -> Result<()> {
    let td = sample()?;
    let u = td.unsqueeze(0)?;
    assert_eq!(u.batch_shape().dims(), &[1, 3, 4]);
    assert_eq!(u.get_tensor("next.obs")?.dims(), &[1, 3, 4, 2]);
    let s = u.squeeze(0)?;
    assert_eq!(s.batch_shape().dims(), &[3, 4]);
    assert!(td.squeeze(0).is_err());
    Ok(())
}

#[test]
fn test_split_and_unbind() -> Result<()> {
    let td = sample()?;
    let parts = td.split(&[1, 3], 1)?;
    assert_eq!(parts[0].batch_shape().dims(), &[3, 1]);
    assert_eq!(parts[1].get_tensor("obs")?.dims(), &[3, 3, 2]);
    assert!(td.split(&[1, 1], 1).unwrap_err().is_shape_error());

    let rows = td.unbind(0)?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].batch_shape().dims(), &[4]);
    assert_eq!(rows[2].get_tensor("reward")?.to_f64_vec()?, vec![8.0, 9.0, 10.0, 11.0]);
    Ok(())
}

#[test]
fn test_expand() -> Result<()> {
    let mut td = TensorMap::<CpuBackend>::new((1, 4));
    td.set("x", seq(&[1, 4, 2])?)?;
    let wide = td.expand(&Shape::from((3, 4)))?;
    assert_eq!(wide.batch_shape().dims(), &[3, 4]);
    assert_eq!(wide.get_tensor("x")?.dims(), &[3, 4, 2]);
    assert!(wide.get_tensor("x")?.shares_storage(td.get_tensor("x")?));
    let deeper = td.expand(&Shape::from((2, 3, 4)))?;
    assert_eq!(deeper.get_tensor("x")?.dims(), &[2, 3, 4, 2]);
    assert!(td.expand(&Shape::from((3, 5))).is_err());
    Ok(())
}

// Key paths

#[test]
fn test_flatten_unflatten_round_trip() -> Result<()> {
    let td = sample()?;
    let flat = flatten_keys(&td, ".")?;
    assert_eq!(
        flat.keys().collect::<Vec<_>>(),
        vec!["obs", "reward", "next.done", "next.obs"]
    );
    let tree = unflatten_keys(&flat, ".")?;
    assert!(tree.get("next")?.is_nested());
    assert_same_leaves(&tree, &td)?;
    Ok(())
}

#[test]
fn test_key_collisions() -> Result<()> {
    let mut td = TensorMap::<CpuBackend>::new(2);
    td.set("a", seq(&[2])?)?;
    td.set("a.b", seq(&[2])?)?;
    assert!(matches!(unflatten_keys(&td, "."), Err(Error::KeyCollision(_))));
    assert!(matches!(td.set_path("a.c", seq(&[2])?), Err(Error::KeyCollision(_))));
    Ok(())
}

// In-place and bulk updates

#[test]
fn test_apply_functional_and_in_place() -> Result<()> {
    let td = sample()?;
    let widened = td.apply(|t| t.to_dtype(DType::F64), false)?;
    assert_eq!(widened.get_tensor("next.done")?.dtype(), DType::F64);

    let alias = td.index(&[TensorIndex::Full])?;
    td.apply(
        |t| {
            let c = t.deep_clone()?;
            c.fill_(7.0)?;
            Ok(c)
        },
        true,
    )?;
    assert_eq!(alias.get_tensor("next.obs")?.to_f64_vec()?, vec![7.0; 24]);
    Ok(())
}

#[test]
fn test_apply_in_place_checks_before_writing() -> Result<()> {
    let td = sample()?;
    let err = td
        .apply(
            |t| {
                let c = t.deep_clone()?;
                c.fill_(1.0)?;
                if t.rank() == 3 {
                    c.index(&[TensorIndex::Full, TensorIndex::Full, TensorIndex::Select(0)])
                } else {
                    Ok(c)
                }
            },
            true,
        )
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert_eq!(td.get_tensor("reward")?.to_f64_vec()?[11], 11.0);
    Ok(())
}

#[test]
fn test_masked_fill() -> Result<()> {
    let td = sample()?;
    let mask = BoolMask::new(vec![true, false, true], 3)?;
    let filled = td.masked_fill(&mask, 0.0, false)?;
    let reward = filled.get_tensor("reward")?.to_f64_vec()?;
    assert_eq!(&reward[..8], &[0.0, 0.0, 0.0, 0.0, 4.0, 5.0, 6.0, 7.0]);
    assert_eq!(&td.get_tensor("reward")?.to_f64_vec()?[0..2], &[0.0, 1.0]);
    assert_eq!(td.get_tensor("reward")?.to_f64_vec()?[8], 8.0);

    td.masked_fill(&mask, -2.0, true)?;
    assert_eq!(td.get_tensor("next.obs")?.to_f64_vec()?[23], -2.0);
    assert!(td.masked_fill(&BoolMask::new(vec![true; 4], 4)?, 0.0, true).is_err());
    Ok(())
}

#[test]
fn test_assign_index() -> Result<()> {
    let td = sample()?;
    let mut row = TensorMap::<CpuBackend>::new(4);
    row.set("obs", CpuTensor::ones((4, 2), DType::F32, &dev())?)?;
    row.set("reward", CpuTensor::ones(4, DType::F32, &dev())?)?;
    row.set_path("next.done", CpuTensor::ones(4, DType::F32, &dev())?)?;
    row.set_path("next.obs", CpuTensor::ones((4, 2), DType::F32, &dev())?)?;

    td.assign_index(&[TensorIndex::Select(1)], &row)?;
    let reward = td.get_tensor("reward")?.to_f64_vec()?;
    assert_eq!(&reward[3..9], &[3.0, 1.0, 1.0, 1.0, 1.0, 8.0]);

    row.delete("reward")?;
    assert!(matches!(
        td.assign_index(&[TensorIndex::Select(0)], &row),
        Err(Error::KeyMismatch { .. })
    ));
    assert!(td.assign_index(&[TensorIndex::Indices(vec![0])], &row).is_err());
    Ok(())
}

#[test]
fn test_select_exclude_rename_update() -> Result<()> {
    let mut td = sample()?;
    let only = td.select(&["obs", "next.done"])?;
    assert_eq!(only.keys().collect::<Vec<_>>(), vec!["obs", "next"]);
    assert!(only.get_map("next")?.contains("done"));
    assert!(!only.contains("next.obs"));

    let rest = td.exclude(&["next", "missing"])?;
    assert_eq!(rest.keys().collect::<Vec<_>>(), vec!["obs", "reward"]);

    td.rename_key("reward", "r")?;
    assert_eq!(td.keys().collect::<Vec<_>>(), vec!["obs", "r", "next"]);
    assert!(matches!(td.rename_key("r", "obs"), Err(Error::KeyCollision(_))));

    let mut extra = TensorMap::<CpuBackend>::new((3, 4));
    extra.set("r", seq(&[3, 4, 5])?)?;
    extra.set("new", seq(&[3, 4])?)?;
    td.update(&extra)?;
    assert_eq!(td.get_tensor("r")?.dims(), &[3, 4, 5]);
    assert_eq!(td.len(), 4);
    Ok(())
}
