use indexmap::IndexSet;

use crate::errors::IgaError;
use crate::utilities::linalg::{inverse_dyn, mat_mul_dyn};
use crate::utilities::tensor_index::TensorIndexer;

use super::bernstein::bernstein_derivatives;
use super::bernstein_extraction::compute_extraction_operator;
use super::dof_distribution::DofDistribution;
use super::spline_space::DirectionSpace;

///
/// Matrix `S` with `B_k(alpha + (beta - alpha) s) = sum_j S[k][j] B_j(s)`: the Bernstein
/// polynomials of `[0,1]` written in the Bernstein basis of the sub-interval `[alpha, beta]`.
///
pub fn bernstein_subdivision(degree: usize, alpha: f64, beta: f64) -> Result<Vec<f64>, IgaError>
{
    let n = degree + 1;
    let samples: Vec<f64> = if degree == 0 { vec![0.5] } else { (0..n).map(|i| i as f64 / degree as f64).collect() };
    let mut v_fine = vec![0.0; n * n];
    let mut v_coarse = vec![0.0; n * n];
    for (i, &s) in samples.iter().enumerate()
    {
        let fine = &bernstein_derivatives(degree, s, 0)[0];
        let coarse = &bernstein_derivatives(degree, alpha + (beta - alpha) * s, 0)[0];
        for k in 0..n
        {
            v_fine[k * n + i] = fine[k];
            v_coarse[k * n + i] = coarse[k];
        }
    }
    Ok(mat_mul_dyn(&v_coarse, &inverse_dyn(&v_fine, n)?, n))
}

///
/// Row-major `n_old x n_new` matrix `R` of one direction with `N_old_i = sum_j R[i][j] N_new_j`.
/// The new direction must be a refinement of the old one.
///
/// Built element by element: on a fine element inside the coarse element `e`,
/// `R_local = C_e * S * C_f^-1` with `C` the extraction operators and `S` the Bernstein
/// subdivision matrix.
///
pub fn direction_refinement_matrix(old: &DirectionSpace, new: &DirectionSpace) -> Result<Vec<f64>, IgaError>
{
    if old.degree != new.degree || old.periodic != new.periodic
    {
        return Err(IgaError::InvalidArgument("spaces are not nested"));
    }
    let p = old.degree;
    let n = p + 1;
    let mut r = vec![0.0; old.n_functions * new.n_functions];
    let old_bp = &old.breakpoints;
    for f in 0..new.n_elements()
    {
        let (lo, hi) = (new.breakpoints[f], new.breakpoints[f + 1]);
        let center = 0.5 * (lo + hi);
        let e = old_bp.partition_point(|&k| k <= center).saturating_sub(1).min(old.n_elements() - 1);
        let h = old_bp[e + 1] - old_bp[e];
        let subdivision = bernstein_subdivision(p, (lo - old_bp[e]) / h, (hi - old_bp[e]) / h)?;
        let c_coarse = compute_extraction_operator(old.element_knot_window(e), p);
        let c_fine = compute_extraction_operator(new.element_knot_window(f), p);
        let c_fine_inv = inverse_dyn(c_fine.as_slice(), n)?;
        let local = mat_mul_dyn(&mat_mul_dyn(c_coarse.as_slice(), &subdivision, n), &c_fine_inv, n);
        for row in 0..n
        {
            let i = old.local_to_global(e, row);
            for col in 0..n
            {
                let j = new.local_to_global(f, col);
                r[i * new.n_functions + j] = local[row * n + col];
            }
        }
    }
    Ok(r)
}

///
/// Coefficients of a function in the refined space. `coefficients` holds `width` values per
/// dof of `old_dofs` (e.g. control point coordinates), the result the same for `new_dofs`.
/// The tensor product is applied one direction at a time.
///
pub fn refine_coefficients<const D: usize>(
    old_dirs: &[[DirectionSpace; D]],
    new_dirs: &[[DirectionSpace; D]],
    old_dofs: &DofDistribution<D>,
    new_dofs: &DofDistribution<D>,
    coefficients: &[f64],
    width: usize,
) -> Result<Vec<f64>, IgaError>
{
    if coefficients.len() != old_dofs.get_num_dofs() * width
    {
        return Err(IgaError::DimensionMismatch { expected: old_dofs.get_num_dofs() * width, found: coefficients.len() });
    }
    let mut refined = Vec::with_capacity(new_dofs.get_num_dofs() * width);
    for (comp, (old_c, new_c)) in old_dirs.iter().zip(new_dirs.iter()).enumerate()
    {
        let offset = old_dofs.get_component_offset(comp)?;
        let mut shape: [usize; D] = std::array::from_fn(|d| old_c[d].n_functions);
        let size: usize = shape.iter().product();
        let mut current = coefficients[offset * width..(offset + size) * width].to_vec();
        for d in 0..D
        {
            let r = direction_refinement_matrix(&old_c[d], &new_c[d])?;
            let n_old = old_c[d].n_functions;
            let n_new = new_c[d].n_functions;
            let from = TensorIndexer::new(shape);
            shape[d] = n_new;
            let to = TensorIndexer::new(shape);
            let mut next = vec![0.0; to.flat_size() * width];
            for t in to.iter()
            {
                let target = to.tensor_to_flat_unchecked(&t) * width;
                let mut source = t;
                for i in 0..n_old
                {
                    let factor = r[i * n_new + t[d]];
                    if factor == 0.0
                    {
                        continue;
                    }
                    source[d] = i;
                    let s = from.tensor_to_flat_unchecked(&source) * width;
                    for k in 0..width
                    {
                        next[target + k] += factor * current[s + k];
                    }
                }
            }
            current = next;
        }
        refined.extend_from_slice(&current);
    }
    Ok(refined)
}

///
/// Moves the global offset and the dof properties of `old_dofs` onto the refined numbering.
/// A refined dof carries a property when every coarse dof it is refined from carries it.
///
pub fn refine_dof_properties<const D: usize>(
    old_dirs: &[[DirectionSpace; D]],
    new_dirs: &[[DirectionSpace; D]],
    old_dofs: &DofDistribution<D>,
    new_dofs: &mut DofDistribution<D>,
) -> Result<(), IgaError>
{
    new_dofs.set_global_dof_offset(old_dofs.get_global_dof_offset());
    let n_old = old_dofs.get_num_dofs();
    for (name, set) in old_dofs.properties()
    {
        // knot insertion weights are non-negative, so a refined dof with any coarse parent
        // outside the set picks up a positive value
        let outside: Vec<f64> = (0..n_old).map(|i| if set.contains(&i) { 0.0 } else { 1.0 }).collect();
        let refined = refine_coefficients(old_dirs, new_dirs, old_dofs, new_dofs, &outside, 1)?;
        let carried: IndexSet<usize> = refined.iter().enumerate().filter(|(_, v)| v.abs() < 1e-10).map(|(j, _)| j).collect();
        new_dofs.set_property_dofs(name, carried);
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn subdivision_of_the_whole_interval_is_identity()
    {
        let s = bernstein_subdivision(3, 0.0, 1.0).unwrap();
        for i in 0..4
        {
            for j in 0..4
            {
                assert_abs_diff_eq!(s[i * 4 + j], if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn linear_refinement_matrix()
    {
        // hat functions on [0,1] refined once: N_0 = N'_0 + 0.5 N'_1
        let old = DirectionSpace::new(1, false, &[0.0, 1.0], &[]).unwrap();
        let new = DirectionSpace::new(1, false, &[0.0, 0.5, 1.0], &[1]).unwrap();
        let r = direction_refinement_matrix(&old, &new).unwrap();
        let expected = [1.0, 0.5, 0.0, 0.0, 0.5, 1.0];
        for (a, b) in r.iter().zip(expected.iter())
        {
            assert_abs_diff_eq!(a, b, epsilon = 1e-14);
        }
    }

    #[test]
    fn refined_coefficients_reproduce_the_function()
    {
        // quadratic coefficients of x^2 on [0, 2] with one interior knot
        let old = DirectionSpace::new(2, false, &[0.0, 1.0, 2.0], &[1]).unwrap();
        let new = DirectionSpace::new(2, false, &[0.0, 0.5, 1.0, 1.5, 2.0], &[1, 1, 1]).unwrap();
        let old_dofs = DofDistribution::<1>::new(&[[old.n_functions]], [false]);
        let new_dofs = DofDistribution::<1>::new(&[[new.n_functions]], [false]);
        // x^2 = sum c_i N_i with c_i = t_{i+1} t_{i+2} (quadratic blossom)
        let blossom = |k: &[f64]| -> Vec<f64> { (0..k.len() - 3).map(|i| k[i + 1] * k[i + 2]).collect() };
        let old_coefs = blossom(&old.knots);
        let refined = refine_coefficients(&[[old]], &[[new.clone()]], &old_dofs, &new_dofs, &old_coefs, 1).unwrap();
        for (a, b) in refined.iter().zip(blossom(&new.knots).iter())
        {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn dof_properties_follow_their_parents()
    {
        let old = DirectionSpace::new(1, false, &[0.0, 1.0, 2.0], &[1]).unwrap();
        let new = DirectionSpace::new(1, false, &[0.0, 0.5, 1.0, 1.5, 2.0], &[1, 1, 1]).unwrap();
        let mut old_dofs = DofDistribution::<1>::new(&[[3]], [false]);
        old_dofs.set_global_dof_offset(7);
        old_dofs.add_dofs_property("fixed");
        old_dofs.set_dof_property("fixed", 0, true).unwrap();
        old_dofs.set_dof_property("fixed", 1, true).unwrap();
        let mut new_dofs = DofDistribution::<1>::new(&[[5]], [false]);
        refine_dof_properties(&[[old]], &[[new]], &old_dofs, &mut new_dofs).unwrap();
        assert_eq!(new_dofs.get_global_dof_offset(), 7);
        // new hat 3 sits between old hats 1 and 2
        assert_eq!(new_dofs.get_dofs_with_property("fixed").unwrap(), vec![0, 1, 2]);
        assert_eq!(new_dofs.get_dofs_with_property(crate::grids::grid::ACTIVE).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn periodic_refinement_keeps_constants()
    {
        let old = DirectionSpace::new(2, true, &[0.0, 1.0, 2.0, 3.0], &[1, 1]).unwrap();
        let new = DirectionSpace::new(2, true, &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0], &[1; 5]).unwrap();
        let r = direction_refinement_matrix(&old, &new).unwrap();
        // every new function gets total weight one from the old partition of unity
        for j in 0..new.n_functions
        {
            let sum: f64 = (0..old.n_functions).map(|i| r[i * new.n_functions + j]).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }
}
