use num_traits::Zero;

///
/// Contiguous storage of fixed-length entries laid out as (function x point).
/// Entry `(f, p)` occupies `entry_len` consecutive scalars starting at
/// `(f * n_points + p) * entry_len`.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueTable<T = f64>
{
    data: Vec<T>,
    n_functions: usize,
    n_points: usize,
    entry_len: usize,
}

impl<T: Zero + Copy> ValueTable<T>
{
    pub fn new(n_functions: usize, n_points: usize, entry_len: usize) -> Self
    {
        Self { data: vec![T::zero(); n_functions * n_points * entry_len], n_functions, n_points, entry_len }
    }

    #[inline]
    pub fn n_functions(&self) -> usize
    {
        self.n_functions
    }

    #[inline]
    pub fn n_points(&self) -> usize
    {
        self.n_points
    }

    #[inline]
    pub fn entry_len(&self) -> usize
    {
        self.entry_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.data.is_empty()
    }

    ///
    /// Changes the shape, keeping the allocation when it is large enough.
    ///
    pub fn resize(&mut self, n_functions: usize, n_points: usize, entry_len: usize)
    {
        self.n_functions = n_functions;
        self.n_points = n_points;
        self.entry_len = entry_len;
        self.data.clear();
        self.data.resize(n_functions * n_points * entry_len, T::zero());
    }

    /// Zeroes every entry without reallocating.
    pub fn reset(&mut self)
    {
        self.data.iter_mut().for_each(|v| *v = T::zero());
    }

    #[inline(always)]
    fn offset(&self, function: usize, point: usize) -> usize
    {
        debug_assert!(function < self.n_functions && point < self.n_points);
        (function * self.n_points + point) * self.entry_len
    }

    #[inline]
    pub fn entry(&self, function: usize, point: usize) -> &[T]
    {
        let start = self.offset(function, point);
        &self.data[start..start + self.entry_len]
    }

    #[inline]
    pub fn entry_mut(&mut self, function: usize, point: usize) -> &mut [T]
    {
        let start = self.offset(function, point);
        let len = self.entry_len;
        &mut self.data[start..start + len]
    }

    /// All point entries of one function, contiguous.
    #[inline]
    pub fn function_view(&self, function: usize) -> &[T]
    {
        let len = self.n_points * self.entry_len;
        &self.data[function * len..(function + 1) * len]
    }

    #[inline]
    pub fn function_view_mut(&mut self, function: usize) -> &mut [T]
    {
        let len = self.n_points * self.entry_len;
        &mut self.data[function * len..(function + 1) * len]
    }

    /// Entries of every function at one point, in function order.
    pub fn point_view(&self, point: usize) -> impl Iterator<Item = &[T]> + '_
    {
        (0..self.n_functions).map(move |f| self.entry(f, point))
    }

    #[inline]
    pub fn as_slice(&self) -> &[T]
    {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T]
    {
        &mut self.data
    }
}

#[test]
fn check_value_table_layout()
{
    let mut table = ValueTable::<f64>::new(3, 2, 2);
    table.entry_mut(1, 1).copy_from_slice(&[4.0, 5.0]);
    assert_eq!(table.function_view(1), &[0.0, 0.0, 4.0, 5.0]);
    let at_point: Vec<_> = table.point_view(1).collect();
    assert_eq!(at_point.len(), 3);
    assert_eq!(at_point[1], &[4.0, 5.0]);
    assert_eq!(table.as_slice()[6..8], [4.0, 5.0]);
}

#[test]
fn check_value_table_reset_keeps_storage()
{
    let mut table = ValueTable::<f64>::new(4, 4, 1);
    table.as_mut_slice().iter_mut().for_each(|v| *v = 1.0);
    let capacity = table.as_slice().as_ptr();
    table.reset();
    assert!(table.as_slice().iter().all(|&v| v == 0.0));
    assert_eq!(capacity, table.as_slice().as_ptr());
    table.resize(2, 4, 2);
    assert_eq!(table.as_slice().len(), 16);
    assert_eq!(capacity, table.as_slice().as_ptr());
}
