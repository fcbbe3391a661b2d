use crate::errors::IgaError;
use crate::utilities::tensor_index::TensorIndex;

use super::spline_space::{DirectionSpace, SplineSpace};

///
/// Square matrix mapping the Bernstein polynomials of one element to its active
/// B-splines: `N_r = sum_k C[r][k] B_k`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionMatrix
{
    n: usize,
    data: Vec<f64>,
}

impl ExtractionMatrix
{
    pub fn identity(n: usize) -> Self
    {
        let mut data = vec![0.0; n * n];
        for i in 0..n
        {
            data[i * n + i] = 1.0;
        }
        Self { n, data }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Self
    {
        Self { n: rows.len(), data: rows.iter().flatten().copied().collect() }
    }

    #[inline]
    pub fn size(&self) -> usize
    {
        self.n
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64
    {
        self.data[row * self.n + col]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64]
    {
        &self.data
    }

    ///
    /// `out[r] = sum_k C[r][k] bernstein[k]`, e.g. B-spline values from Bernstein values.
    ///
    #[inline]
    pub fn apply(&self, bernstein: &[f64], out: &mut [f64])
    {
        debug_assert!(bernstein.len() == self.n && out.len() == self.n);
        for (r, o) in out.iter_mut().enumerate()
        {
            *o = self.data[r * self.n..(r + 1) * self.n].iter().zip(bernstein.iter()).map(|(c, b)| c * b).sum();
        }
    }
}

///
/// Extraction operator of one element by repeated knot insertion.
///
/// `window` holds the `2*degree+2` knots defining the element's active functions, with the
/// element being `[window[degree], window[degree+1]]`. Both end points are inserted until
/// they have multiplicity `degree+1`; the accumulated insertion matrices restricted to the
/// functions living on the element give the operator.
///
pub fn compute_extraction_operator(window: &[f64], degree: usize) -> ExtractionMatrix
{
    let p = degree;
    debug_assert_eq!(window.len(), 2 * p + 2);
    let a = window[p];
    let b = window[p + 1];
    let mut knots = window.to_vec();
    // rows: original functions, columns: functions of the current knot vector
    let mut m: Vec<Vec<f64>> = (0..=p).map(|r| (0..=p).map(|c| if r == c { 1.0 } else { 0.0 }).collect()).collect();
    for x in [a, b]
    {
        while knots.iter().filter(|&&k| k == x).count() < p + 1
        {
            let n_cur = knots.len() - p - 1;
            let k = knots.iter().rposition(|&t| t <= x).unwrap_or(0);
            let alpha = |i: usize| -> f64 {
                if i + p <= k
                {
                    1.0
                }
                else if i > k
                {
                    0.0
                }
                else
                {
                    (x - knots[i]) / (knots[i + p] - knots[i])
                }
            };
            let alphas: Vec<f64> = (0..=n_cur).map(alpha).collect();
            for row in m.iter_mut()
            {
                let mut next = vec![0.0; n_cur + 1];
                for (j, v) in next.iter_mut().enumerate()
                {
                    if j < n_cur
                    {
                        *v += row[j] * alphas[j];
                    }
                    if j > 0
                    {
                        *v += row[j - 1] * (1.0 - alphas[j]);
                    }
                }
                *row = next;
            }
            knots.insert(k + 1, x);
        }
    }
    let s = knots.iter().filter(|&&t| t < a).count();
    let rows: Vec<Vec<f64>> = m.iter().map(|row| row[s..s + p + 1].to_vec()).collect();
    ExtractionMatrix::from_rows(&rows)
}

/// Extraction operators of all elements of one direction.
pub fn compute_direction_operators(dir: &DirectionSpace) -> Vec<ExtractionMatrix>
{
    (0..dir.n_elements()).map(|e| compute_extraction_operator(dir.element_knot_window(e), dir.degree)).collect()
}

///
/// Per component, per direction and per one dimensional element the extraction operator.
/// The operator of a `D`-dimensional element is the tensor product of its directional
/// operators, which is never assembled.
///
#[derive(Clone, Debug, PartialEq)]
pub struct BernsteinExtraction<const D: usize>
{
    operators: Vec<[Vec<ExtractionMatrix>; D]>,
}

impl<const D: usize> BernsteinExtraction<D>
{
    pub fn new(space: &SplineSpace<D>) -> Self
    {
        let operators: Vec<[Vec<ExtractionMatrix>; D]> = space.directions().iter()
            .map(|dirs| std::array::from_fn(|d| compute_direction_operators(&dirs[d])))
            .collect();
        log::debug!("computed extraction operators for space {}", space.get_object_id());
        Self { operators }
    }

    pub fn get_operator(&self, comp: usize, dir: usize, element_1d: usize) -> Result<&ExtractionMatrix, IgaError>
    {
        let per_comp = self.operators.get(comp).ok_or(IgaError::IndexOutOfRange { index: comp, extent: self.operators.len() })?;
        let per_dir = per_comp.get(dir).ok_or(IgaError::IndexOutOfRange { index: dir, extent: D })?;
        per_dir.get(element_1d).ok_or(IgaError::IndexOutOfRange { index: element_1d, extent: per_dir.len() })
    }

    /// The directional operators of an element of a component.
    #[inline]
    pub fn get_element_operators(&self, comp: usize, element: &TensorIndex<D>) -> [&ExtractionMatrix; D]
    {
        std::array::from_fn(|d| &self.operators[comp][d][element[d]])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::grids::grid::Grid;
    use approx::assert_abs_diff_eq;

    fn assert_matrix(m: &ExtractionMatrix, expected: &[[f64; 3]; 3])
    {
        for r in 0..3
        {
            for c in 0..3
            {
                assert_abs_diff_eq!(m.get(r, c), expected[r][c], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn degree_one_single_element_is_identity()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let space = SplineSpace::create_scalar(grid, 1).unwrap();
        let extraction = BernsteinExtraction::new(&space);
        assert_eq!(extraction.get_operator(0, 0, 0).unwrap(), &ExtractionMatrix::identity(2));
    }

    #[test]
    fn degree_two_closed_form()
    {
        let grid = Grid::<1>::create_from_knots([vec![0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap();
        let space = SplineSpace::create_scalar(grid, 2).unwrap();
        let extraction = BernsteinExtraction::new(&space);
        assert_matrix(extraction.get_operator(0, 0, 0).unwrap(), &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.5], [0.0, 0.0, 0.5]]);
        let middle = [[0.5, 0.0, 0.0], [0.5, 1.0, 0.5], [0.0, 0.0, 0.5]];
        assert_matrix(extraction.get_operator(0, 0, 1).unwrap(), &middle);
        assert_matrix(extraction.get_operator(0, 0, 2).unwrap(), &middle);
        assert_matrix(extraction.get_operator(0, 0, 3).unwrap(), &[[0.5, 0.0, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(extraction.get_operator(0, 0, 4).is_err());
    }

    #[test]
    fn columns_sum_to_one()
    {
        // partition of unity: the B-splines on an element sum to sum_k B_k = 1
        let grid = Grid::<1>::create_from_knots([vec![0.0, 0.3, 1.1, 1.5, 2.0, 3.7]]).unwrap();
        for p in 0..5
        {
            let space = SplineSpace::create_scalar(grid.clone(), p).unwrap();
            let extraction = BernsteinExtraction::new(&space);
            for e in 0..5
            {
                let m = extraction.get_operator(0, 0, e).unwrap();
                for c in 0..=p
                {
                    let sum: f64 = (0..=p).map(|r| m.get(r, c)).sum();
                    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn degree_zero_is_trivial()
    {
        let m = compute_extraction_operator(&[0.0, 1.0], 0);
        assert_eq!(m, ExtractionMatrix::identity(1));
    }
}
