use std::fmt;

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// Index expressions: tensor-style `x[...]` as data
//
// An index expression is a list of `TensorIndex` items, one per addressed
// dimension (plus `Ellipsis` / `NewAxis`, which address none):
//
//   x[1]            → [Select(1)]
//   x[:, 0:2]       → [Full, Slice { start: Some(0), stop: Some(2), step: 1 }]
//   x[..., -1]      → [Ellipsis, Select(-1)]
//   x[None]         → [NewAxis]
//   x[[0, 2]]       → [Indices(vec![0, 2])]
//   x[mask]         → [Mask(mask)]
//
// RESOLUTION (IndexPlan):
//
//   1. The ellipsis expands to as many full slices as the other items leave
//      unaddressed; without one, unaddressed trailing dims are full slices.
//   2. Basic items (Select, Slice, Full, NewAxis) become layout rewrites:
//      the result is a *view* sharing storage.
//   3. Advanced items (Indices, Mask) broadcast together to one length `L`.
//      A mask consumes `mask.rank()` dims and contributes its true positions.
//      If the dims they address are adjacent once selects are applied, the
//      new dim of size `L` takes their place, otherwise it moves to the
//      front. Advanced indexing gathers into fresh storage (a *copy*).
//
// The same plan computes the result shape for a bare shape (no tensor), which
// is how the container predicts its new batch shape: both paths run the same
// code, so the predicted and the actual shape cannot disagree.

/// Python-style slice bounds. `None` means "from the start" / "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: usize,
}

impl SliceRange {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: usize) -> Self {
        Self { start, stop, step }
    }

    /// Clamp the bounds against a dim of size `size`: (start, len).
    pub fn resolve(&self, size: usize) -> Result<(usize, usize)> {
        if self.step == 0 {
            return Err(Error::InvalidIndex("slice step cannot be zero".into()));
        }
        let size_i = size as isize;
        let clamp = |v: isize| -> usize {
            let v = if v < 0 { v + size_i } else { v };
            v.clamp(0, size_i) as usize
        };
        let start = self.start.map(clamp).unwrap_or(0);
        let stop = self.stop.map(clamp).unwrap_or(size);
        let len = if stop > start {
            (stop - start).div_ceil(self.step)
        } else {
            0
        };
        Ok((start, len))
    }
}

/// Boolean mask with its own shape. Row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolMask {
    data: Vec<bool>,
    shape: Shape,
}

impl BoolMask {
    pub fn new(data: Vec<bool>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: Shape::from(data.len()),
            });
        }
        Ok(Self { data, shape })
    }

    /// 1-D mask.
    pub fn from_vec(data: Vec<bool>) -> Self {
        let shape = Shape::from(data.len());
        Self { data, shape }
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Multi-dimensional coordinates of the true positions, one index array
    /// per mask dim (NumPy's `nonzero`).
    pub fn nonzero(&self) -> Vec<Vec<usize>> {
        let strides = self.shape.stride_contiguous();
        let mut out = vec![Vec::with_capacity(self.count_true()); self.shape.rank()];
        for (flat, _) in self.data.iter().enumerate().filter(|(_, &b)| b) {
            let mut rem = flat;
            for (d, &s) in strides.iter().enumerate() {
                out[d].push(rem / s);
                rem %= s;
            }
        }
        out
    }
}

/// One item of an index expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorIndex {
    /// Integer index; removes the dim. Negative values count from the end.
    Select(isize),
    /// `start:stop:step`; keeps the dim.
    Slice(SliceRange),
    /// `:`
    Full,
    /// `...`
    Ellipsis,
    /// `None`: inserts a size-1 dim.
    NewAxis,
    /// 1-D integer array (advanced indexing).
    Indices(Vec<isize>),
    /// Boolean mask (advanced indexing), consumes `mask.rank()` dims.
    Mask(BoolMask),
}

impl TensorIndex {
    /// `start..stop` with unit step.
    pub fn range(start: isize, stop: isize) -> Self {
        TensorIndex::Slice(SliceRange::new(Some(start), Some(stop), 1))
    }

    pub fn slice(start: Option<isize>, stop: Option<isize>, step: usize) -> Self {
        TensorIndex::Slice(SliceRange::new(start, stop, step))
    }

    /// Number of source dims this item addresses.
    pub fn consumed_dims(&self) -> usize {
        match self {
            TensorIndex::Ellipsis | TensorIndex::NewAxis => 0,
            TensorIndex::Mask(m) => m.shape().rank(),
            _ => 1,
        }
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, TensorIndex::Indices(_) | TensorIndex::Mask(_))
    }
}

impl fmt::Display for TensorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<isize>| v.map(|v| v.to_string()).unwrap_or_default();
        match self {
            TensorIndex::Select(i) => write!(f, "{}", i),
            TensorIndex::Slice(s) if s.step == 1 => {
                write!(f, "{}:{}", opt(s.start), opt(s.stop))
            }
            TensorIndex::Slice(s) => write!(f, "{}:{}:{}", opt(s.start), opt(s.stop), s.step),
            TensorIndex::Full => write!(f, ":"),
            TensorIndex::Ellipsis => write!(f, "..."),
            TensorIndex::NewAxis => write!(f, "None"),
            TensorIndex::Indices(v) => write!(f, "{:?}", v),
            TensorIndex::Mask(m) => write!(f, "mask{}", m.shape()),
        }
    }
}

impl From<isize> for TensorIndex {
    fn from(i: isize) -> Self {
        TensorIndex::Select(i)
    }
}

impl From<std::ops::Range<isize>> for TensorIndex {
    fn from(r: std::ops::Range<isize>) -> Self {
        TensorIndex::range(r.start, r.end)
    }
}

impl From<std::ops::RangeFull> for TensorIndex {
    fn from(_: std::ops::RangeFull) -> Self {
        TensorIndex::Full
    }
}

impl From<Vec<isize>> for TensorIndex {
    fn from(v: Vec<isize>) -> Self {
        TensorIndex::Indices(v)
    }
}

impl From<BoolMask> for TensorIndex {
    fn from(m: BoolMask) -> Self {
        TensorIndex::Mask(m)
    }
}

/// Replace the ellipsis (or pad the end) with explicit full slices so the
/// expression addresses exactly `rank` source dims.
pub fn expand_ellipsis(items: &[TensorIndex], rank: usize) -> Result<Vec<TensorIndex>> {
    let ellipses = items
        .iter()
        .filter(|i| matches!(i, TensorIndex::Ellipsis))
        .count();
    if ellipses > 1 {
        return Err(Error::InvalidIndex(
            "an index can only have a single ellipsis".into(),
        ));
    }
    let consumed: usize = items.iter().map(TensorIndex::consumed_dims).sum();
    if consumed > rank {
        return Err(Error::TooManyIndices { consumed, rank });
    }
    let fill = rank - consumed;
    let mut out = Vec::with_capacity(items.len() + fill);
    for item in items {
        if matches!(item, TensorIndex::Ellipsis) {
            out.extend(std::iter::repeat(TensorIndex::Full).take(fill));
        } else {
            out.push(item.clone());
        }
    }
    if ellipses == 0 {
        out.extend(std::iter::repeat(TensorIndex::Full).take(fill));
    }
    Ok(out)
}

/// The gather step of an advanced index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    /// Dims of the basic view addressed by advanced items, ascending.
    pub dims: Vec<usize>,
    /// One broadcast index array per entry of `dims`, all of length `len`.
    pub indices: Vec<Vec<usize>>,
    /// Broadcast length of the advanced result dim.
    pub len: usize,
    /// Whether `dims` form one contiguous run (result dim stays in place).
    pub adjacent: bool,
}

/// A resolved index expression for one shape.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    view: Layout,
    gather: Option<Gather>,
    result: Shape,
}

impl IndexPlan {
    /// Resolve `items` against `layout`. Basic items are applied to the layout
    /// directly; advanced items are recorded as a gather over the view.
    pub fn for_layout(layout: &Layout, items: &[TensorIndex]) -> Result<Self> {
        let items = expand_ellipsis(items, layout.rank())?;

        let mut view = layout.clone();
        // `src` walks the dims of `layout`, `pos` the dims of `view`.
        let mut src = 0usize;
        let mut pos = 0usize;
        let mut adv_dims: Vec<usize> = Vec::new();
        let mut adv_arrays: Vec<Vec<usize>> = Vec::new();

        for item in &items {
            match item {
                TensorIndex::Select(i) => {
                    let size = view.dims()[pos];
                    let idx = normalize_index(*i, src, size)?;
                    view = view.select(pos, idx)?;
                    src += 1;
                }
                TensorIndex::Slice(range) => {
                    let (start, len) = range.resolve(view.dims()[pos])?;
                    view = view.slice(pos, start, len, range.step)?;
                    src += 1;
                    pos += 1;
                }
                TensorIndex::Full => {
                    src += 1;
                    pos += 1;
                }
                TensorIndex::NewAxis => {
                    view = view.insert_axis(pos)?;
                    pos += 1;
                }
                TensorIndex::Indices(values) => {
                    let size = view.dims()[pos];
                    let arr = values
                        .iter()
                        .map(|&v| normalize_index(v, src, size))
                        .collect::<Result<Vec<_>>>()?;
                    adv_dims.push(pos);
                    adv_arrays.push(arr);
                    src += 1;
                    pos += 1;
                }
                TensorIndex::Mask(mask) => {
                    let k = mask.shape().rank();
                    if k == 0 {
                        return Err(Error::InvalidIndex("mask must have at least one dim".into()));
                    }
                    let covered = Shape::from(&view.dims()[pos..pos + k]);
                    if &covered != mask.shape() {
                        return Err(Error::ShapeMismatch {
                            expected: covered,
                            got: mask.shape().clone(),
                        });
                    }
                    for (j, arr) in mask.nonzero().into_iter().enumerate() {
                        adv_dims.push(pos + j);
                        adv_arrays.push(arr);
                    }
                    src += k;
                    pos += k;
                }
                TensorIndex::Ellipsis => unreachable!("ellipsis expanded above"),
            }
        }

        let gather = if adv_dims.is_empty() {
            None
        } else {
            Some(broadcast_gather(adv_dims, adv_arrays)?)
        };

        let result = match &gather {
            None => view.shape().clone(),
            Some(g) => {
                let mut rest: Vec<usize> = view
                    .dims()
                    .iter()
                    .enumerate()
                    .filter(|(d, _)| !g.dims.contains(d))
                    .map(|(_, &s)| s)
                    .collect();
                let at = if g.adjacent { g.dims[0] } else { 0 };
                rest.insert(at, g.len);
                Shape::new(rest)
            }
        };

        Ok(Self {
            view,
            gather,
            result,
        })
    }

    /// Resolve `items` against a bare shape.
    pub fn for_shape(shape: &Shape, items: &[TensorIndex]) -> Result<Self> {
        Self::for_layout(&Layout::contiguous(shape.clone()), items)
    }

    /// Layout after the basic items (before any gather).
    pub fn view(&self) -> &Layout {
        &self.view
    }

    pub fn gather(&self) -> Option<&Gather> {
        self.gather.as_ref()
    }

    /// Whether executing the plan only rewrites the layout.
    pub fn is_view(&self) -> bool {
        self.gather.is_none()
    }

    pub fn result_shape(&self) -> &Shape {
        &self.result
    }
}

fn normalize_index(i: isize, dim: usize, size: usize) -> Result<usize> {
    let resolved = if i < 0 { i + size as isize } else { i };
    if resolved < 0 || resolved as usize >= size {
        return Err(Error::IndexOutOfBounds {
            index: i,
            dim,
            size,
        });
    }
    Ok(resolved as usize)
}

fn broadcast_gather(dims: Vec<usize>, arrays: Vec<Vec<usize>>) -> Result<Gather> {
    let mut len = 1usize;
    for arr in &arrays {
        if arr.len() != 1 {
            if len != 1 && arr.len() != len {
                return Err(Error::InvalidIndex(format!(
                    "index arrays of lengths {:?} cannot be broadcast together",
                    arrays.iter().map(Vec::len).collect::<Vec<_>>()
                )));
            }
            len = arr.len();
        }
    }
    let indices = arrays
        .into_iter()
        .map(|arr| {
            if arr.len() == len {
                arr
            } else {
                vec![arr[0]; len]
            }
        })
        .collect();
    let adjacent = dims.windows(2).all(|w| w[1] == w[0] + 1);
    Ok(Gather {
        dims,
        indices,
        len,
        adjacent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_of(dims: &[usize], items: &[TensorIndex]) -> Result<Vec<usize>> {
        Ok(IndexPlan::for_shape(&Shape::from(dims), items)?
            .result_shape()
            .dims()
            .to_vec())
    }

    #[test]
    fn test_slice_resolve() {
        let r = SliceRange::new(Some(-3), None, 1);
        assert_eq!(r.resolve(10).unwrap(), (7, 3));
        let r = SliceRange::new(Some(1), Some(100), 3);
        assert_eq!(r.resolve(10).unwrap(), (1, 3));
        let r = SliceRange::new(Some(5), Some(2), 1);
        assert_eq!(r.resolve(10).unwrap(), (5, 0));
    }

    #[test]
    fn test_basic_shapes() {
        assert_eq!(
            shape_of(&[3, 4], &[TensorIndex::Full, TensorIndex::range(0, 2)]).unwrap(),
            vec![3, 2]
        );
        assert_eq!(shape_of(&[3, 4], &[TensorIndex::Select(-1)]).unwrap(), vec![4]);
        assert_eq!(
            shape_of(&[3, 4, 5], &[TensorIndex::Ellipsis, TensorIndex::Select(0)]).unwrap(),
            vec![3, 4]
        );
        assert_eq!(
            shape_of(&[3, 4], &[TensorIndex::NewAxis, TensorIndex::Ellipsis]).unwrap(),
            vec![1, 3, 4]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            shape_of(&[3], &[TensorIndex::Select(3)]),
            Err(Error::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            shape_of(&[3], &[TensorIndex::Full, TensorIndex::Full]),
            Err(Error::TooManyIndices { .. })
        ));
        assert!(matches!(
            shape_of(&[3], &[TensorIndex::Ellipsis, TensorIndex::Ellipsis]),
            Err(Error::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_mask_collapses_dims() {
        let mask = BoolMask::new(vec![true, false, true, false, false, true], (2, 3)).unwrap();
        assert_eq!(mask.nonzero(), vec![vec![0, 0, 1], vec![0, 2, 2]]);
        assert_eq!(
            shape_of(&[2, 3, 7], &[TensorIndex::Mask(mask)]).unwrap(),
            vec![3, 7]
        );
        let bad = BoolMask::from_vec(vec![true; 4]);
        assert!(shape_of(&[3, 2], &[TensorIndex::Mask(bad)])
            .unwrap_err()
            .is_shape_error());
    }

    #[test]
    fn test_advanced_placement() {
        // adjacent: stays in place
        assert_eq!(
            shape_of(&[3, 4, 5], &[TensorIndex::Full, TensorIndex::Indices(vec![0, 1])]).unwrap(),
            vec![3, 2, 5]
        );
        // separated by a slice: moves to the front
        assert_eq!(
            shape_of(
                &[3, 4, 5],
                &[
                    TensorIndex::Indices(vec![0, 1]),
                    TensorIndex::Full,
                    TensorIndex::Indices(vec![2, 3])
                ]
            )
            .unwrap(),
            vec![2, 4]
        );
        // a select between them is applied first, so they become adjacent
        assert_eq!(
            shape_of(
                &[3, 4, 5],
                &[
                    TensorIndex::Indices(vec![0, 1]),
                    TensorIndex::Select(0),
                    TensorIndex::Indices(vec![2])
                ]
            )
            .unwrap(),
            vec![2]
        );
    }

    #[test]
    fn test_advanced_broadcast_mismatch() {
        let items = [
            TensorIndex::Indices(vec![0, 1]),
            TensorIndex::Indices(vec![0, 1, 2]),
        ];
        assert!(matches!(shape_of(&[3, 4], &items), Err(Error::InvalidIndex(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(TensorIndex::range(0, 2).to_string(), "0:2");
        assert_eq!(TensorIndex::slice(None, None, 2).to_string(), "::2");
    }
}
