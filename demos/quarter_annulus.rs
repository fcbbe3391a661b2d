use std::f64::consts::PI;

use igrust::basis::bspline::BSpline;
use igrust::basis::nurbs::Nurbs;
use igrust::basis::spline_space::SplineSpace;
use igrust::errors::IgaError;
use igrust::flags::DomainFlags;
use igrust::functions::ig_function::IgGridFunction;
use igrust::geometry::domain::Domain;
use igrust::grids::grid::Grid;
use igrust::quadrature::Quadrature;

///
/// Area of the domain and length of its outer arc (face 1, where the radial parameter
/// is one).
///
fn measure(domain: &Domain<2, 2>) -> Result<(f64, f64), IgaError>
{
    let mut handler = domain.create_cache_handler();
    handler.set_element_flags(DomainFlags::new().with_w_measure(true))?;
    handler.set_flags(1, DomainFlags::new().with_w_measure(true).with_ext_normal(true))?;
    let mut elem = domain.begin();
    handler.init_element_cache(&mut elem, &Quadrature::<2>::gauss_isotropic(4)?)?;
    handler.init_cache(&mut elem, &Quadrature::<1>::gauss_isotropic(4)?)?;
    let mut area = 0.0;
    let mut arc = 0.0;
    loop
    {
        handler.fill_element_cache(&mut elem)?;
        area += elem.get_element_w_measures()?.iter().sum::<f64>();
        if elem.get_grid_element().is_boundary_face(1)?
        {
            handler.fill_cache(&mut elem, 1, 1)?;
            arc += elem.get_w_measures(1, 1)?.iter().sum::<f64>();
        }
        if !elem.next_element()
        {
            break;
        }
    }
    Ok((area, arc))
}

fn main() -> Result<(), IgaError>
{
    // radial direction first, then the angle; quadratic in both
    let grid = Grid::<2>::create_uniform(2)?;
    let bspline = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2)?);
    let h = 0.5_f64.sqrt();
    let arc = [([1.0, 0.0], 1.0), ([1.0, 1.0], h), ([0.0, 1.0], 1.0)];
    let radii = [1.0, 1.5, 2.0];
    let mut control_points = Vec::new();
    let mut weights = Vec::new();
    for (q, w) in arc
    {
        for r in radii
        {
            control_points.push([r * q[0], r * q[1]]);
            weights.push(w);
        }
    }
    let nurbs = Nurbs::create(bspline, weights)?;
    let function = IgGridFunction::<2, 2>::create(nurbs.into(), control_points)?;
    let domain = Domain::create(function.clone());
    println!("exact area {:.12}, exact outer arc {:.12}", 0.75 * PI, PI);
    for _ in 0..3
    {
        let (area, arc) = measure(&domain)?;
        println!("{} elements, {} control points: area {area:.12}, outer arc {arc:.12}", grid.get_num_elements(), function.get_control_points().len());
        grid.refine(2)?;
    }
    let corner = domain.evaluate_at_points(0, &[[0.0, 0.0]])?;
    println!("first element corner maps to {:?}", corner[0]);
    Ok(())
}
