//! Dense element matrices and vectors from cached basis values and weighted measures.

use crate::errors::IgaError;
use crate::utilities::value_table::ValueTable;

fn check_points(table: &ValueTable, w_measures: &[f64]) -> Result<(), IgaError>
{
    if table.n_points() != w_measures.len()
    {
        return Err(IgaError::DimensionMismatch { expected: table.n_points(), found: w_measures.len() });
    }
    Ok(())
}

fn check_functions(table: &ValueTable, functions: &[usize]) -> Result<(), IgaError>
{
    match functions.iter().find(|&&f| f >= table.n_functions())
    {
        Some(&f) => Err(IgaError::IndexOutOfRange { index: f, extent: table.n_functions() }),
        None => Ok(()),
    }
}

///
/// Row-major `m x m` matrix `sum_q w_q <t_i(x_q), t_j(x_q)>` over the listed local functions,
/// where the inner product runs over the whole entry of the table. With values this is the
/// mass matrix, with gradients the stiffness matrix.
///
pub fn integrate_entry_products(table: &ValueTable, functions: &[usize], w_measures: &[f64]) -> Result<Vec<f64>, IgaError>
{
    check_points(table, w_measures)?;
    check_functions(table, functions)?;
    let m = functions.len();
    let mut matrix = vec![0.0; m * m];
    for (i, &fi) in functions.iter().enumerate()
    {
        for (j, &fj) in functions.iter().enumerate().skip(i)
        {
            let v: f64 = w_measures.iter().enumerate().map(|(q, w)| {
                w * table.entry(fi, q).iter().zip(table.entry(fj, q)).map(|(a, b)| a * b).sum::<f64>()
            }).sum();
            matrix[i * m + j] = v;
            matrix[j * m + i] = v;
        }
    }
    Ok(matrix)
}

///
/// Vector `sum_q w_q <t_i(x_q), g(x_q)>` with `func` holding one entry of `g` per point,
/// laid out like the table's entries.
///
pub fn integrate_entry_function(table: &ValueTable, functions: &[usize], func: &[f64], w_measures: &[f64]) -> Result<Vec<f64>, IgaError>
{
    check_points(table, w_measures)?;
    check_functions(table, functions)?;
    let len = table.entry_len();
    if func.len() != len * table.n_points()
    {
        return Err(IgaError::DimensionMismatch { expected: len * table.n_points(), found: func.len() });
    }
    Ok(functions.iter().map(|&f| {
        w_measures.iter().enumerate().map(|(q, w)| {
            w * table.entry(f, q).iter().zip(&func[q * len..(q + 1) * len]).map(|(a, b)| a * b).sum::<f64>()
        }).sum()
    }).collect())
}

#[test]
fn check_mass_matrix_of_constant()
{
    let mut values = ValueTable::new(2, 2, 1);
    for q in 0..2
    {
        values.entry_mut(0, q)[0] = 1.0;
        values.entry_mut(1, q)[0] = 2.0;
    }
    let m = integrate_entry_products(&values, &[0, 1], &[0.25, 0.25]).unwrap();
    assert_eq!(m, vec![0.5, 1.0, 1.0, 2.0]);
    let rhs = integrate_entry_function(&values, &[1], &[3.0, 3.0], &[0.25, 0.25]).unwrap();
    assert_eq!(rhs, vec![3.0]);
    assert!(integrate_entry_products(&values, &[2], &[0.25, 0.25]).is_err());
    assert!(integrate_entry_function(&values, &[0], &[1.0], &[0.25, 0.25]).is_err());
}
