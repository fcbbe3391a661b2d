use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub enum IgaError
{
    /// A tensor or flat index component lies outside `[0, extent)`.
    IndexOutOfRange { index: usize, extent: usize },
    /// Knot coordinates are not strictly increasing, or fewer than two were given.
    InvalidKnotSequence,
    /// An interior multiplicity is larger than the degree allows.
    InvalidMultiplicity { component: usize, direction: usize, multiplicity: usize, degree: usize },
    InvalidArgument(&'static str),
    DimensionMismatch { expected: usize, found: usize },
    /// A cache entry was read for a value kind that was not declared with `set_flags`.
    ValueKindNotRequested,
    /// A cache entry was read before being filled, or after its quadrature changed.
    CacheNotFilled,
    /// The Jacobian of the geometric map is (numerically) singular.
    DegenerateMapping { determinant: f64 },
    NotImplemented(&'static str),
    /// The object could not follow a refinement of the grid it lives on and is no longer
    /// consistent with it.
    RefinementFailed { object_id: usize },
    OutOfDomain,
    SerializationFailed,
    DeserializationFailed,
    LZ4DecompressionFailed,
    ReadBufferFailed,
    WriteBufferFailed,
    FileIOError { path: String },
}
impl std::error::Error for IgaError {}

impl Display for IgaError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{:?}", self)
    }
}
