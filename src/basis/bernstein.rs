//! Bernstein polynomials `B^p_k(x) = C(p,k) x^k (1-x)^(p-k)` on `[0,1]` and their derivatives.

fn binomial(n: usize, k: usize) -> f64
{
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

///
/// Values of all Bernstein polynomials of degree `0..=p` at `x`, stored as a triangle:
/// row `q` holds `B^q_0 .. B^q_q`.
///
fn bernstein_triangle(p: usize, x: f64) -> Vec<Vec<f64>>
{
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(p + 1);
    rows.push(vec![1.0]);
    for q in 1..=p
    {
        let prev = &rows[q - 1];
        let mut row = vec![0.0; q + 1];
        for k in 0..=q
        {
            let left = if k < q { (1.0 - x) * prev[k] } else { 0.0 };
            let right = if k > 0 { x * prev[k - 1] } else { 0.0 };
            row[k] = left + right;
        }
        rows.push(row);
    }
    rows
}

///
/// `result[r][k]` is the `r`-th derivative of `B^p_k` at `x`, for `r <= max_order`.
/// Derivatives of order larger than `p` vanish.
///
pub fn bernstein_derivatives(p: usize, x: f64, max_order: usize) -> Vec<Vec<f64>>
{
    let triangle = bernstein_triangle(p, x);
    let mut result = vec![vec![0.0; p + 1]; max_order + 1];
    for r in 0..=max_order.min(p)
    {
        // D^r B^p_k = p!/(p-r)! sum_i (-1)^(r-i) C(r,i) B^(p-r)_(k-i)
        let factor: f64 = (p - r + 1..=p).map(|v| v as f64).product();
        let lower = &triangle[p - r];
        for k in 0..=p
        {
            let mut sum = 0.0;
            for i in 0..=r
            {
                if i > k || k - i > p - r
                {
                    continue;
                }
                let sign = if (r - i) % 2 == 0 { 1.0 } else { -1.0 };
                sum += sign * binomial(r, i) * lower[k - i];
            }
            result[r][k] = factor * sum;
        }
    }
    result
}

///
/// Bernstein values and derivatives of one degree at a list of coordinates, laid out as
/// `[point][order][k]`.
///
#[derive(Clone, Debug, PartialEq)]
pub struct BernsteinTable
{
    degree: usize,
    max_order: usize,
    n_points: usize,
    data: Vec<f64>,
}

impl BernsteinTable
{
    pub fn new(degree: usize, coordinates: &[f64], max_order: usize) -> Self
    {
        let mut data = Vec::with_capacity(coordinates.len() * (max_order + 1) * (degree + 1));
        for &x in coordinates
        {
            for row in bernstein_derivatives(degree, x, max_order)
            {
                data.extend_from_slice(&row);
            }
        }
        Self { degree, max_order, n_points: coordinates.len(), data }
    }

    #[inline]
    pub fn degree(&self) -> usize
    {
        self.degree
    }

    #[inline]
    pub fn max_order(&self) -> usize
    {
        self.max_order
    }

    #[inline]
    pub fn n_points(&self) -> usize
    {
        self.n_points
    }

    /// The `degree+1` polynomials' `order`-th derivatives at point `point`.
    #[inline]
    pub fn get(&self, point: usize, order: usize) -> &[f64]
    {
        debug_assert!(point < self.n_points && order <= self.max_order);
        let n = self.degree + 1;
        let start = (point * (self.max_order + 1) + order) * n;
        &self.data[start..start + n]
    }
}

#[test]
fn check_partition_of_unity()
{
    for p in 0..6
    {
        for &x in &[0.0, 0.13, 0.5, 0.91, 1.0]
        {
            let d = bernstein_derivatives(p, x, 2);
            approx::assert_abs_diff_eq!(d[0].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            approx::assert_abs_diff_eq!(d[1].iter().sum::<f64>(), 0.0, epsilon = 1e-12);
            approx::assert_abs_diff_eq!(d[2].iter().sum::<f64>(), 0.0, epsilon = 1e-11);
        }
    }
}

#[test]
fn check_quadratic_closed_form()
{
    let x = 0.3;
    let d = bernstein_derivatives(2, x, 3);
    let expected = [[0.49, 0.42, 0.09], [-1.4, 0.8, 0.6], [2.0, -4.0, 2.0], [0.0, 0.0, 0.0]];
    for r in 0..4
    {
        for k in 0..3
        {
            approx::assert_abs_diff_eq!(d[r][k], expected[r][k], epsilon = 1e-14);
        }
    }
    let table = BernsteinTable::new(2, &[0.0, x], 2);
    assert_eq!(table.get(0, 0), &[1.0, 0.0, 0.0]);
    approx::assert_abs_diff_eq!(table.get(1, 1)[2], 0.6, epsilon = 1e-14);
}
