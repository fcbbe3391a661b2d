use std::f64::consts::PI;

use igrust::basis::bspline::BSpline;
use igrust::basis::physical_basis::PhysicalBasis;
use igrust::basis::spline_space::SplineSpace;
use igrust::errors::IgaError;
use igrust::flags::BasisFlags;
use igrust::functions::linear::LinearGridFunction;
use igrust::geometry::domain::Domain;
use igrust::grids::grid::{Grid, ACTIVE};
use igrust::quadrature::Quadrature;
use igrust::utilities::linalg::inverse_dyn;

const INTERIOR: &str = "interior";

fn exact(x: &[f64; 2]) -> f64
{
    (PI * x[0]).sin() * (PI * x[1]).sin() / 4.0
}

fn source(x: &[f64; 2]) -> f64
{
    2.0 * PI * PI * exact(x)
}

///
/// Solves `-laplace(u) = f` with `u = 0` on the boundary of `[0,2]^2` (the unit square
/// scaled by two) and returns the L2 error against the exact solution.
///
fn solve(basis: &PhysicalBasis<2, 2>) -> Result<f64, IgaError>
{
    let space = basis.get_spline_space();
    let interior = space.with_dof_distribution_mut(|dofs| -> Result<Vec<usize>, IgaError> {
        dofs.add_dofs_property(INTERIOR);
        let interior = dofs.get_interior_dofs();
        for &dof in &interior
        {
            dofs.set_dof_property(INTERIOR, dof, true)?;
        }
        Ok(interior)
    })?;
    let n_dofs = space.get_num_basis();
    let mut row = vec![usize::MAX; n_dofs];
    for (i, &dof) in interior.iter().enumerate()
    {
        row[dof] = i;
    }
    let n = interior.len();
    let mut stiffness = vec![0.0; n * n];
    let mut rhs = vec![0.0; n];

    let quad = Quadrature::<2>::gauss_isotropic(space.get_degree(0)?[0] + 1)?;
    let mut handler = basis.create_cache_handler();
    handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true))?;
    let mut elem = basis.begin();
    handler.init_element_cache(&mut elem, &quad)?;
    loop
    {
        handler.fill_element_cache(&mut elem)?;
        let patch = elem.get_local_to_patch(INTERIOR)?;
        let k = elem.integrate_gradu_gradv(INTERIOR)?;
        let f: Vec<f64> = elem.get_element_points()?.iter().map(source).collect();
        let b = elem.integrate_u_func(&f, INTERIOR)?;
        for (i, &pi) in patch.iter().enumerate()
        {
            rhs[row[pi]] += b[i];
            for (j, &pj) in patch.iter().enumerate()
            {
                stiffness[row[pi] * n + row[pj]] += k[i * patch.len() + j];
            }
        }
        if !elem.next_element()
        {
            break;
        }
    }

    let inverse = inverse_dyn(&stiffness, n)?;
    let mut coefficients = vec![0.0; n_dofs];
    for (i, &dof) in interior.iter().enumerate()
    {
        coefficients[dof] = (0..n).map(|j| inverse[i * n + j] * rhs[j]).sum();
    }

    let mut error = 0.0;
    let mut elem = basis.begin();
    handler.init_element_cache(&mut elem, &quad)?;
    loop
    {
        handler.fill_element_cache(&mut elem)?;
        let dofs = elem.get_local_to_patch(ACTIVE)?;
        let values = elem.get_element_values()?;
        let w = elem.get_element_w_measures()?;
        for (q, x) in elem.get_element_points()?.iter().enumerate()
        {
            let uh: f64 = dofs.iter().enumerate().map(|(f, &d)| coefficients[d] * values.entry(f, q)[0]).sum();
            error += w[q] * (uh - exact(x)).powi(2);
        }
        if !elem.next_element()
        {
            break;
        }
    }
    Ok(error.sqrt())
}

fn main() -> Result<(), IgaError>
{
    let grid = Grid::<2>::create_uniform(3)?;
    let space = SplineSpace::create_scalar(grid.clone(), 2)?;
    let domain = Domain::create(LinearGridFunction::create(grid.clone(), [[2.0, 0.0], [0.0, 2.0]], [0.0, 0.0]));
    let basis = PhysicalBasis::create(BSpline::create(space).into(), domain)?;
    let mut previous: Option<f64> = None;
    for level in 0..4
    {
        let error = solve(&basis)?;
        let rate = previous.map(|p| (p / error).log2());
        println!("level {level}: {} elements, {} dofs, L2 error {error:.3e}, rate {:?}", grid.get_num_elements(), basis.get_num_basis(), rate);
        previous = Some(error);
        grid.refine(2)?;
    }
    Ok(())
}
