use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::errors::IgaError;

/// One non-negative index per direction.
pub type TensorIndex<const D: usize> = [usize; D];

/// One extent per direction.
pub type TensorSize<const D: usize> = [usize; D];

///
/// Strides used for the flat <-> tensor conversion. Direction 0 varies fastest,
/// i.e. `weights[0] == 1` and `weights[d] == weights[d-1] * extents[d-1]`.
///
pub fn compute_weights<const D: usize>(extents: &TensorSize<D>) -> [usize; D]
{
    let mut weights = [1; D];
    for d in 1..D
    {
        weights[d] = weights[d - 1] * extents[d - 1];
    }
    weights
}

///
/// Converts a flat index into its tensor counterpart. Fails with `IndexOutOfRange` when
/// `flat >= prod(extents)`.
///
pub fn flat_to_tensor<const D: usize>(flat: usize, extents: &TensorSize<D>) -> Result<TensorIndex<D>, IgaError>
{
    let size: usize = extents.iter().product();
    if flat >= size
    {
        return Err(IgaError::IndexOutOfRange { index: flat, extent: size });
    }
    Ok(flat_to_tensor_unchecked(flat, &compute_weights(extents)))
}

///
/// Converts a tensor index into its flat counterpart. Fails with `IndexOutOfRange` when any
/// component exceeds `extent - 1`.
///
pub fn tensor_to_flat<const D: usize>(tensor: &TensorIndex<D>, extents: &TensorSize<D>) -> Result<usize, IgaError>
{
    for d in 0..D
    {
        if tensor[d] >= extents[d]
        {
            return Err(IgaError::IndexOutOfRange { index: tensor[d], extent: extents[d] });
        }
    }
    Ok(tensor_to_flat_unchecked(tensor, &compute_weights(extents)))
}

///
/// Unchecked conversion used inside evaluation loops. Bounds are only verified
/// in debug builds by the callers.
///
#[inline(always)]
pub fn flat_to_tensor_unchecked<const D: usize>(flat: usize, weights: &[usize; D]) -> TensorIndex<D>
{
    let mut tensor = [0; D];
    let mut rest = flat;
    for d in (0..D).rev()
    {
        tensor[d] = rest / weights[d];
        rest %= weights[d];
    }
    tensor
}

#[inline(always)]
pub fn tensor_to_flat_unchecked<const D: usize>(tensor: &TensorIndex<D>, weights: &[usize; D]) -> usize
{
    tensor.iter().zip(weights.iter()).map(|(i, w)| i * w).sum()
}

///
/// Flat <-> tensor index conversion over a fixed set of extents. The weights are
/// recomputed whenever the extents change (e.g. after refinement).
///
#[serde_as]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorIndexer<const D: usize>
{
    #[serde_as(as = "[_; D]")]
    extents: TensorSize<D>,
    #[serde_as(as = "[_; D]")]
    weights: [usize; D],
}

impl<const D: usize> TensorIndexer<D>
{
    pub fn new(extents: TensorSize<D>) -> Self
    {
        Self { extents, weights: compute_weights(&extents) }
    }

    #[inline]
    pub fn extents(&self) -> &TensorSize<D>
    {
        &self.extents
    }

    #[inline]
    pub fn weights(&self) -> &[usize; D]
    {
        &self.weights
    }

    #[inline]
    pub fn flat_size(&self) -> usize
    {
        self.extents.iter().product()
    }

    pub fn set_extents(&mut self, extents: TensorSize<D>)
    {
        self.extents = extents;
        self.weights = compute_weights(&extents);
    }

    pub fn flat_to_tensor(&self, flat: usize) -> Result<TensorIndex<D>, IgaError>
    {
        if flat >= self.flat_size()
        {
            return Err(IgaError::IndexOutOfRange { index: flat, extent: self.flat_size() });
        }
        Ok(flat_to_tensor_unchecked(flat, &self.weights))
    }

    pub fn tensor_to_flat(&self, tensor: &TensorIndex<D>) -> Result<usize, IgaError>
    {
        for d in 0..D
        {
            if tensor[d] >= self.extents[d]
            {
                return Err(IgaError::IndexOutOfRange { index: tensor[d], extent: self.extents[d] });
            }
        }
        Ok(tensor_to_flat_unchecked(tensor, &self.weights))
    }

    #[inline(always)]
    pub fn flat_to_tensor_unchecked(&self, flat: usize) -> TensorIndex<D>
    {
        debug_assert!(flat < self.flat_size());
        flat_to_tensor_unchecked(flat, &self.weights)
    }

    #[inline(always)]
    pub fn tensor_to_flat_unchecked(&self, tensor: &TensorIndex<D>) -> usize
    {
        debug_assert!(tensor.iter().zip(self.extents.iter()).all(|(i, e)| i < e));
        tensor_to_flat_unchecked(tensor, &self.weights)
    }

    /// Iterates over all tensor indices in increasing flat order.
    pub fn iter(&self) -> TensorIndexIterator<D>
    {
        TensorIndexIterator::new(self.extents)
    }
}

///
/// Walks every tensor index of a box in increasing flat order (direction 0 fastest).
///
#[derive(Clone, Debug)]
pub struct TensorIndexIterator<const D: usize>
{
    extents: TensorSize<D>,
    head: TensorIndex<D>,
    done: bool,
}

impl<const D: usize> TensorIndexIterator<D>
{
    pub fn new(extents: TensorSize<D>) -> Self
    {
        Self { extents, head: [0; D], done: extents.contains(&0) }
    }
}

impl<const D: usize> Iterator for TensorIndexIterator<D>
{
    type Item = TensorIndex<D>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.done
        {
            return None;
        }
        let current = self.head;
        // advance like an odometer, direction 0 first
        let mut d = 0;
        loop
        {
            if d == D
            {
                self.done = true;
                break;
            }
            self.head[d] += 1;
            if self.head[d] < self.extents[d]
            {
                break;
            }
            self.head[d] = 0;
            d += 1;
        }
        Some(current)
    }
}

#[test]
fn check_index_bijection()
{
    let extents = [3, 4, 2];
    let indexer = TensorIndexer::new(extents);
    assert_eq!(indexer.weights(), &[1, 3, 12]);
    for flat in 0..indexer.flat_size()
    {
        let tensor = indexer.flat_to_tensor(flat).unwrap();
        assert_eq!(indexer.tensor_to_flat(&tensor).unwrap(), flat);
    }
    for (flat, tensor) in indexer.iter().enumerate()
    {
        assert_eq!(tensor_to_flat(&tensor, &extents).unwrap(), flat);
        assert_eq!(flat_to_tensor(flat, &extents).unwrap(), tensor);
    }
    assert_eq!(indexer.iter().count(), 24);
}

#[test]
fn check_direction_zero_is_fastest()
{
    let indexer = TensorIndexer::new([2, 3]);
    let all: Vec<_> = indexer.iter().collect();
    assert_eq!(all[0], [0, 0]);
    assert_eq!(all[1], [1, 0]);
    assert_eq!(all[2], [0, 1]);
    assert_eq!(all[5], [1, 2]);
}

#[test]
fn check_index_out_of_range()
{
    let extents = [2, 2];
    assert_eq!(tensor_to_flat(&[2, 0], &extents), Err(IgaError::IndexOutOfRange { index: 2, extent: 2 }));
    assert_eq!(flat_to_tensor(4, &extents), Err(IgaError::IndexOutOfRange { index: 4, extent: 4 }));
    let indexer = TensorIndexer::new([5]);
    assert!(indexer.tensor_to_flat(&[5]).is_err());
    assert!(indexer.flat_to_tensor(4).is_ok());
}

#[test]
fn check_zero_dimensional_indexer()
{
    let indexer = TensorIndexer::<0>::new([]);
    assert_eq!(indexer.flat_size(), 1);
    assert_eq!(indexer.iter().count(), 1);
    assert_eq!(indexer.tensor_to_flat(&[]).unwrap(), 0);
}
