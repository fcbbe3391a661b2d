use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::IgaError;

/// Encoding of grid, space and geometry snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerializationFormat
{
    /// Plain bincode.
    Bincode,
    /// Bincode compressed with LZ4, size prepended.
    #[default]
    BincodeLz4,
}

impl SerializationFormat
{
    /// Returns true if this format uses LZ4 compression
    pub fn is_compressed(&self) -> bool
    {
        matches!(self, SerializationFormat::BincodeLz4)
    }
}

pub fn serialize<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>, IgaError>
{
    let bytes = bincode::serde::encode_to_vec(data, bincode::config::standard()).map_err(|_| IgaError::SerializationFailed)?;
    if format.is_compressed()
    {
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }
    else
    {
        Ok(bytes)
    }
}

pub fn deserialize<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T, IgaError>
{
    let decode = |bytes: &[u8]| -> Result<T, IgaError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(value, _)| value).map_err(|_| IgaError::DeserializationFailed)
    };
    if format.is_compressed()
    {
        let decompressed = lz4_flex::decompress_size_prepended(data).map_err(|_| IgaError::LZ4DecompressionFailed)?;
        decode(&decompressed)
    }
    else
    {
        decode(data)
    }
}

/// Writes `data` to `path`, replacing the file.
pub fn save<T: Serialize, P: AsRef<Path>>(data: &T, path: P, format: SerializationFormat) -> Result<(), IgaError>
{
    let bytes = serialize(data, format)?;
    std::fs::write(path.as_ref(), bytes).map_err(|_| IgaError::FileIOError { path: path.as_ref().display().to_string() })
}

pub fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P, format: SerializationFormat) -> Result<T, IgaError>
{
    let bytes = std::fs::read(path.as_ref()).map_err(|_| IgaError::FileIOError { path: path.as_ref().display().to_string() })?;
    deserialize(&bytes, format)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::bspline::BSpline;
    use crate::basis::nurbs::Nurbs;
    use crate::basis::spline_space::SplineSpace;
    use crate::functions::ig_function::{IgFunctionData, IgGridFunction};
    use crate::functions::GridFunction;
    use crate::grids::grid::{Grid, GridData};

    #[test]
    fn grid_snapshot_survives_both_formats()
    {
        let grid = Grid::<2>::create_from_knots([vec![0.0, 0.3, 1.0], vec![-1.0, 1.0]]).unwrap();
        grid.set_boundary_id(3, 7).unwrap();
        for format in [SerializationFormat::Bincode, SerializationFormat::BincodeLz4]
        {
            let bytes = serialize(&grid.get_data(), format).unwrap();
            let data: GridData<2> = deserialize(&bytes, format).unwrap();
            let copy = Grid::create_from_data(&data).unwrap();
            assert_eq!(copy.get_data(), grid.get_data());
            assert_eq!(copy.get_boundary_id(3).unwrap(), 7);
        }
    }

    #[test]
    fn nurbs_geometry_is_rebuilt_from_file()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let bspline = BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap());
        let h = 0.5_f64.sqrt();
        let nurbs = Nurbs::create(bspline, vec![1.0, h, 1.0]).unwrap();
        let function = IgGridFunction::<1, 2>::create(nurbs.into(), vec![[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap();
        let path = std::env::temp_dir().join(format!("igrust_quarter_circle_{}.bin", std::process::id()));
        save(&function.get_data(), &path, SerializationFormat::default()).unwrap();
        let data: IgFunctionData<1, 2> = load(&path, SerializationFormat::default()).unwrap();
        std::fs::remove_file(&path).unwrap();
        let copy = IgGridFunction::create_from_data(data).unwrap();
        let a = function.evaluate(0, &[[0.3]], 0).unwrap();
        let b = copy.evaluate(0, &[[0.3]], 0).unwrap();
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn io_errors_carry_the_path()
    {
        let err = load::<GridData<1>, _>("/nonexistent/igrust/grid.bin", SerializationFormat::Bincode).unwrap_err();
        assert_eq!(err, IgaError::FileIOError { path: "/nonexistent/igrust/grid.bin".to_string() });
        assert_eq!(deserialize::<GridData<1>>(&[1, 2, 3], SerializationFormat::BincodeLz4).unwrap_err(), IgaError::LZ4DecompressionFailed);
    }
}
