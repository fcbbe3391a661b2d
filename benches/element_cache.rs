use std::f64::consts::PI;

use criterion::{criterion_group, criterion_main, Criterion};
use igrust::basis::bspline::BSpline;
use igrust::basis::physical_basis::PhysicalBasis;
use igrust::basis::reference_basis::ReferenceBasis;
use igrust::basis::spline_space::SplineSpace;
use igrust::errors::IgaError;
use igrust::flags::BasisFlags;
use igrust::functions::ball::BallGridFunction;
use igrust::geometry::domain::Domain;
use igrust::grids::bounding_box::BoundingBox;
use igrust::grids::grid::Grid;
use igrust::quadrature::Quadrature;
use std::rc::Rc;

fn build_basis() -> Result<Rc<PhysicalBasis<3, 3>>, IgaError>
{
    // a spherical shell sector, cubic splines on 8x8x8 elements
    let bbox = BoundingBox::new([1.0, 0.25 * PI, 0.0], [2.0, 0.75 * PI, 0.5 * PI]);
    let grid = Grid::<3>::create_from_bbox(&bbox, [9, 9, 9])?;
    let reference: ReferenceBasis<3> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 3)?).into();
    let domain = Domain::create(BallGridFunction::create(grid));
    PhysicalBasis::create(reference, domain)
}

fn reference_fill(basis: &ReferenceBasis<3>, quad: &Quadrature<3>) -> Result<f64, IgaError>
{
    let mut handler = basis.create_cache_handler();
    handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true))?;
    let mut elem = basis.begin();
    handler.init_element_cache(&mut elem, quad)?;
    let mut checksum = 0.0;
    loop
    {
        handler.fill_element_cache(&mut elem)?;
        checksum += elem.get_element_values()?.entry(0, 0)[0];
        if !elem.next_element()
        {
            break;
        }
    }
    Ok(checksum)
}

fn physical_fill(basis: &PhysicalBasis<3, 3>, quad: &Quadrature<3>) -> Result<f64, IgaError>
{
    let mut handler = basis.create_cache_handler();
    handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true).with_hessian(true))?;
    let mut elem = basis.begin();
    handler.init_element_cache(&mut elem, quad)?;
    let mut checksum = 0.0;
    loop
    {
        handler.fill_element_cache(&mut elem)?;
        checksum += elem.get_element_hessians()?.entry(0, 0)[0];
        if !elem.next_element()
        {
            break;
        }
    }
    Ok(checksum)
}

fn run_cache_fill(c: &mut Criterion)
{
    let basis = build_basis().unwrap();
    let quad = Quadrature::<3>::gauss_isotropic(4).unwrap();
    c.bench_function("reference cubic 3d", |b| b.iter(|| reference_fill(basis.get_reference_basis(), &quad).unwrap()));
    c.bench_function("physical cubic 3d with hessians", |b| b.iter(|| physical_fill(&basis, &quad).unwrap()));
}

criterion_group!(benches, run_cache_fill);
criterion_main!(benches);
