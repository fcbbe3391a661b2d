use crate::errors::IgaError;

/// Relative size of `measure / scale^dim` below which a map is reported as degenerate.
pub const DEGENERACY_TOLERANCE: f64 = 1e-12;

#[inline]
pub fn transpose<const R: usize, const C: usize>(m: &[[f64; C]; R]) -> [[f64; R]; C]
{
    let mut t = [[0.0; R]; C];
    for i in 0..R
    {
        for j in 0..C
        {
            t[j][i] = m[i][j];
        }
    }
    t
}

#[inline]
pub fn mat_mul<const R: usize, const K: usize, const C: usize>(a: &[[f64; K]; R], b: &[[f64; C]; K]) -> [[f64; C]; R]
{
    let mut r = [[0.0; C]; R];
    for i in 0..R
    {
        for k in 0..K
        {
            let aik = a[i][k];
            for j in 0..C
            {
                r[i][j] += aik * b[k][j];
            }
        }
    }
    r
}

#[inline]
pub fn mat_vec<const R: usize, const C: usize>(a: &[[f64; C]; R], x: &[f64; C]) -> [f64; R]
{
    let mut r = [0.0; R];
    for i in 0..R
    {
        r[i] = a[i].iter().zip(x.iter()).map(|(a, b)| a * b).sum();
    }
    r
}

///
/// Determinant of a row-major `n x n` matrix by Gaussian elimination with
/// partial pivoting. The buffer is overwritten.
///
pub fn determinant_in_place(a: &mut [f64], n: usize) -> f64
{
    debug_assert_eq!(a.len(), n * n);
    let mut det = 1.0;
    for col in 0..n
    {
        let mut pivot = col;
        for row in col + 1..n
        {
            if a[row * n + col].abs() > a[pivot * n + col].abs()
            {
                pivot = row;
            }
        }
        if a[pivot * n + col] == 0.0
        {
            return 0.0;
        }
        if pivot != col
        {
            for j in 0..n
            {
                a.swap(col * n + j, pivot * n + j);
            }
            det = -det;
        }
        let p = a[col * n + col];
        det *= p;
        for row in col + 1..n
        {
            let factor = a[row * n + col] / p;
            for j in col..n
            {
                a[row * n + j] -= factor * a[col * n + j];
            }
        }
    }
    det
}

pub fn determinant<const N: usize>(m: &[[f64; N]; N]) -> f64
{
    let mut buffer: Vec<f64> = m.iter().flatten().copied().collect();
    determinant_in_place(&mut buffer, N)
}

pub fn inverse<const N: usize>(m: &[[f64; N]; N]) -> Result<[[f64; N]; N], IgaError>
{
    let flat: Vec<f64> = m.iter().flatten().copied().collect();
    let inv = inverse_dyn(&flat, N)?;
    Ok(std::array::from_fn(|i| std::array::from_fn(|j| inv[i * N + j])))
}

///
/// Inverse of a row-major `n x n` matrix by Gauss-Jordan elimination with partial pivoting.
///
pub fn inverse_dyn(m: &[f64], n: usize) -> Result<Vec<f64>, IgaError>
{
    debug_assert_eq!(m.len(), n * n);
    let mut a = m.to_vec();
    let mut inv = vec![0.0; n * n];
    for i in 0..n
    {
        inv[i * n + i] = 1.0;
    }
    for col in 0..n
    {
        let pivot = (col..n).max_by(|&i, &j| a[i * n + col].abs().total_cmp(&a[j * n + col].abs())).unwrap_or(col);
        if a[pivot * n + col] == 0.0
        {
            return Err(IgaError::DegenerateMapping { determinant: 0.0 });
        }
        if pivot != col
        {
            for j in 0..n
            {
                a.swap(col * n + j, pivot * n + j);
                inv.swap(col * n + j, pivot * n + j);
            }
        }
        let p = a[col * n + col];
        for j in 0..n
        {
            a[col * n + j] /= p;
            inv[col * n + j] /= p;
        }
        for row in 0..n
        {
            let factor = a[row * n + col];
            if row == col || factor == 0.0
            {
                continue;
            }
            for j in 0..n
            {
                a[row * n + j] -= factor * a[col * n + j];
                inv[row * n + j] -= factor * inv[col * n + j];
            }
        }
    }
    Ok(inv)
}

/// Product of two row-major `n x n` matrices.
pub fn mat_mul_dyn(a: &[f64], b: &[f64], n: usize) -> Vec<f64>
{
    let mut r = vec![0.0; n * n];
    for i in 0..n
    {
        for k in 0..n
        {
            let aik = a[i * n + k];
            for j in 0..n
            {
                r[i * n + j] += aik * b[k * n + j];
            }
        }
    }
    r
}

///
/// Measure of the parallelotope spanned by the given columns, i.e. `sqrt(det(G))`
/// with `G` the Gram matrix of the columns. Used for sub-element (face, edge) measures.
///
pub fn gram_measure(columns: &[&[f64]]) -> f64
{
    let k = columns.len();
    if k == 0
    {
        return 1.0;
    }
    let mut gram = vec![0.0; k * k];
    for i in 0..k
    {
        for j in 0..k
        {
            gram[i * k + j] = columns[i].iter().zip(columns[j].iter()).map(|(a, b)| a * b).sum();
        }
    }
    determinant_in_place(&mut gram, k).max(0.0).sqrt()
}

///
/// Left pseudo-inverse `(J^T J)^{-1} J^T` of a `S x D` Jacobian together with its
/// measure (`|det J|` when `S == D`, `sqrt(det(J^T J))` otherwise).
///
pub fn pseudo_inverse<const S: usize, const D: usize>(jac: &[[f64; D]; S]) -> Result<([[f64; S]; D], f64), IgaError>
{
    let jt = transpose(jac);
    let gram = mat_mul(&jt, jac);
    let measure = if S == D
    {
        let mut buffer: Vec<f64> = jac.iter().flatten().copied().collect();
        determinant_in_place(&mut buffer, D).abs()
    }
    else
    {
        determinant(&gram).max(0.0).sqrt()
    };
    let scale = jac.iter().flatten().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || measure <= DEGENERACY_TOLERANCE * scale.powi(D as i32)
    {
        return Err(IgaError::DegenerateMapping { determinant: measure });
    }
    let gram_inv = inverse(&gram)?;
    Ok((mat_mul(&gram_inv, &jt), measure))
}

#[test]
fn check_inverse_and_determinant()
{
    let m = [[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]];
    let det = determinant(&m);
    approx::assert_relative_eq!(det, 9.0, epsilon = 1e-12);
    let inv = inverse(&m).unwrap();
    let id = mat_mul(&m, &inv);
    for i in 0..3
    {
        for j in 0..3
        {
            approx::assert_abs_diff_eq!(id[i][j], if i == j { 1.0 } else { 0.0 }, epsilon = 1e-12);
        }
    }
}

#[test]
fn check_dynamic_inverse()
{
    let m = [2.0, 1.0, 0.0, 0.0, 3.0, 1.0, 1.0, 0.0, 1.0];
    let inv = inverse_dyn(&m, 3).unwrap();
    let id = mat_mul_dyn(&m, &inv, 3);
    for i in 0..3
    {
        for j in 0..3
        {
            approx::assert_abs_diff_eq!(id[i * 3 + j], if i == j { 1.0 } else { 0.0 }, epsilon = 1e-14);
        }
    }
    assert!(inverse_dyn(&[1.0, 2.0, 2.0, 4.0], 2).is_err());
}

#[test]
fn check_pseudo_inverse_of_curve()
{
    // tangent (3, 4): measure 5, J+ J = 1
    let jac = [[3.0], [4.0]];
    let (pinv, measure) = pseudo_inverse::<2, 1>(&jac).unwrap();
    approx::assert_relative_eq!(measure, 5.0, epsilon = 1e-14);
    approx::assert_relative_eq!(mat_mul(&pinv, &jac)[0][0], 1.0, epsilon = 1e-14);
    approx::assert_relative_eq!(gram_measure(&[&[3.0, 4.0]]), 5.0, epsilon = 1e-14);
}

#[test]
fn check_singular_jacobian_is_degenerate()
{
    let jac = [[1.0, 2.0], [2.0, 4.0]];
    assert!(matches!(pseudo_inverse::<2, 2>(&jac), Err(IgaError::DegenerateMapping { .. })));
}
