use std::f64::consts::PI;

use static_init::dynamic;

/// Number of points up to which the one dimensional rules are precomputed.
pub const GL_CACHED_POINTS: usize = 32;

/// Legendre polynomial P_n(x) and its derivative by the three-term recurrence.
fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64)
{
    let mut p0 = 1.0;
    let mut p1 = x;
    let mut dp0 = 0.0;
    let mut dp1 = 1.0;

    for k in 2..=n
    {
        let kf = k as f64;
        let pk = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        let dpk = ((2.0 * kf - 1.0) * (p1 + x * dp1) - (kf - 1.0) * dp0) / kf;

        p0 = p1;
        p1 = pk;
        dp0 = dp1;
        dp1 = dpk;
    }

    (p1, dp1)
}

/// Gauss-Legendre nodes (increasing) and weights of an `n` point rule on [0, 1].
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>)
{
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let eps = 1e-15;

    for i in 0..n
    {
        // Chebyshev-like initial guess, roots come out in decreasing order
        let theta = PI * (i as f64 + 0.75) / (n as f64 + 0.5);
        let mut x = theta.cos();

        for _ in 0..100
        {
            let (p, dp) = legendre_and_derivative(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() < eps
            {
                break;
            }
        }

        let (_, dp) = legendre_and_derivative(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        nodes.push(0.5 * (x + 1.0));
        weights.push(0.5 * w);
    }
    nodes.reverse();
    weights.reverse();
    (nodes, weights)
}

#[dynamic]
static GL_CACHE: Vec<(Vec<f64>, Vec<f64>)> = (0..=GL_CACHED_POINTS).map(gauss_legendre).collect();

/// Cached rule for small `n`, computed on the fly otherwise.
pub fn gauss_legendre_rule(n: usize) -> (Vec<f64>, Vec<f64>)
{
    if n <= GL_CACHED_POINTS
    {
        GL_CACHE[n].clone()
    }
    else
    {
        gauss_legendre(n)
    }
}

#[test]
fn test_gauss_legendre()
{
    let (nodes, weights) = gauss_legendre_rule(10);
    let expected_nodes = [0.0130467357414145,0.067468316655508,0.160295215850488,0.283302302935377,0.425562830509185,0.574437169490815,0.716697697064624,0.839704784149512,0.932531683344492,0.986953264258586];
    let expected_weights = [0.033335672154344,0.07472567457529,0.109543181257991,0.134633359654998,0.147762112357376,0.147762112357376,0.134633359654998,0.109543181257991,0.07472567457529,0.033335672154344];

    for (n1, n2) in nodes.iter().zip(expected_nodes.iter())
    {
        assert!((n1 - n2).abs() < 1e-12);
    }
    for (w1, w2) in weights.iter().zip(expected_weights.iter())
    {
        assert!((w1 - w2).abs() < 1e-12);
    }
}

#[test]
fn test_gauss_legendre_exactness()
{
    // n points integrate x^(2n-1) exactly on [0, 1]
    for n in [1, 2, 5, 40]
    {
        let (nodes, weights) = gauss_legendre_rule(n);
        let degree = 2 * n as i32 - 1;
        let integral: f64 = nodes.iter().zip(weights.iter()).map(|(x, w)| w * x.powi(degree)).sum();
        approx::assert_relative_eq!(integral, 1.0 / (degree + 1) as f64, epsilon = 1e-12);
    }
}
