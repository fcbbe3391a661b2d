use crate::errors::IgaError;

///
/// A `k`-dimensional sub-element (vertex, edge, face, ...) of the unit hypercube `[0,1]^D`.
/// Points on it are obtained by taking the `active_directions` from a `k`-dimensional
/// point and fixing every other direction to its constant value (0 or 1).
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubElement
{
    pub dim: usize,
    pub id: usize,
    pub active_directions: Vec<usize>,
    pub constant_directions: Vec<usize>,
    /// One entry per constant direction, 0 for the lower side and 1 for the upper side.
    pub constant_sides: Vec<usize>,
}

impl SubElement
{
    pub fn constant_values(&self) -> impl Iterator<Item = (usize, f64)> + '_
    {
        self.constant_directions.iter().zip(self.constant_sides.iter()).map(|(&d, &s)| (d, s as f64))
    }

    ///
    /// Lifts a point of the sub-element reference cube `[0,1]^K` into `[0,1]^D`.
    ///
    pub fn lift_point<const K: usize, const D: usize>(&self, point: &[f64; K]) -> [f64; D]
    {
        debug_assert_eq!(K, self.active_directions.len());
        let mut lifted = [0.0; D];
        for (k, &d) in self.active_directions.iter().enumerate()
        {
            lifted[d] = point[k];
        }
        for (d, v) in self.constant_values()
        {
            lifted[d] = v;
        }
        lifted
    }
}

fn binomial(n: usize, k: usize) -> usize
{
    if k > n
    {
        return 0;
    }
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Increasing `size`-subsets of `0..n` in lexicographic order.
fn combinations(n: usize, size: usize) -> Vec<Vec<usize>>
{
    let mut result = Vec::with_capacity(binomial(n, size));
    let mut current: Vec<usize> = (0..size).collect();
    if size > n
    {
        return result;
    }
    loop
    {
        result.push(current.clone());
        let mut i = size;
        loop
        {
            if i == 0
            {
                return result;
            }
            i -= 1;
            if current[i] < n - size + i
            {
                current[i] += 1;
                for j in i + 1..size
                {
                    current[j] = current[j - 1] + 1;
                }
                break;
            }
        }
    }
}

///
/// Topology of the unit hypercube `[0,1]^D`.
///
/// Sub-elements of dimension `k` are numbered by taking the sets of constant directions in
/// lexicographic order and, within one set, the side patterns with the first constant
/// direction varying fastest. For faces (`k == D-1`) this gives the id `2*d + side`.
///
#[derive(Copy, Clone, Debug, Default)]
pub struct UnitElement<const D: usize>;

impl<const D: usize> UnitElement<D>
{
    /// `C(D, k) * 2^(D-k)`
    pub fn num_sub_elements(k: usize) -> usize
    {
        if k > D
        {
            return 0;
        }
        binomial(D, k) << (D - k)
    }

    pub fn num_faces() -> usize
    {
        if D == 0 { 0 } else { 2 * D }
    }

    pub fn sub_elements(k: usize) -> Result<Vec<SubElement>, IgaError>
    {
        if k > D
        {
            return Err(IgaError::DimensionMismatch { expected: D, found: k });
        }
        let n_fixed = D - k;
        let mut result = Vec::with_capacity(Self::num_sub_elements(k));
        for constant_directions in combinations(D, n_fixed)
        {
            let active_directions: Vec<usize> = (0..D).filter(|d| !constant_directions.contains(d)).collect();
            for pattern in 0..(1usize << n_fixed)
            {
                let constant_sides = (0..n_fixed).map(|j| (pattern >> j) & 1).collect();
                result.push(SubElement
                {
                    dim: k,
                    id: result.len(),
                    active_directions: active_directions.clone(),
                    constant_directions: constant_directions.clone(),
                    constant_sides,
                });
            }
        }
        Ok(result)
    }

    pub fn sub_element(k: usize, id: usize) -> Result<SubElement, IgaError>
    {
        let n = Self::num_sub_elements(k);
        Self::sub_elements(k)?.into_iter().nth(id).ok_or(IgaError::IndexOutOfRange { index: id, extent: n })
    }

    /// Direction and side of a face id.
    #[inline]
    pub fn face_direction_and_side(face: usize) -> Result<(usize, usize), IgaError>
    {
        if face >= Self::num_faces()
        {
            return Err(IgaError::IndexOutOfRange { index: face, extent: Self::num_faces() });
        }
        Ok((face / 2, face % 2))
    }

    /// Outward unit normal of a face in parametric coordinates.
    pub fn face_normal(face: usize) -> Result<[f64; D], IgaError>
    {
        let (dir, side) = Self::face_direction_and_side(face)?;
        let mut normal = [0.0; D];
        normal[dir] = if side == 0 { -1.0 } else { 1.0 };
        Ok(normal)
    }
}

#[test]
fn check_sub_element_counts()
{
    assert_eq!(UnitElement::<3>::num_sub_elements(0), 8);
    assert_eq!(UnitElement::<3>::num_sub_elements(1), 12);
    assert_eq!(UnitElement::<3>::num_sub_elements(2), 6);
    assert_eq!(UnitElement::<3>::num_sub_elements(3), 1);
    assert_eq!(UnitElement::<3>::sub_elements(1).unwrap().len(), 12);
    assert_eq!(UnitElement::<2>::sub_elements(0).unwrap().len(), 4);
}

#[test]
fn check_face_numbering()
{
    let faces = UnitElement::<3>::sub_elements(2).unwrap();
    for (id, face) in faces.iter().enumerate()
    {
        assert_eq!(face.constant_directions, vec![id / 2]);
        assert_eq!(face.constant_sides, vec![id % 2]);
    }
    let p: [f64; 3] = faces[3].lift_point(&[0.25, 0.75]);
    assert_eq!(p, [0.25, 1.0, 0.75]);
    assert_eq!(UnitElement::<2>::face_normal(2).unwrap(), [0.0, -1.0]);
}

#[test]
fn check_vertex_numbering()
{
    let vertices = UnitElement::<2>::sub_elements(0).unwrap();
    let lifted: Vec<[f64; 2]> = vertices.iter().map(|v| v.lift_point(&[])).collect();
    assert_eq!(lifted, vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
}
