//! NumPy `.npy` array files.
//!
//! ## Layout
//!
//! ```text
//! [0..6]    Magic: "\x93NUMPY"
//! [6]       Major version (1, 2 or 3)
//! [7]       Minor version
//! [8..10]   Header length (u16 LE, v1)   | [8..12] (u32 LE, v2/v3)
//! [..]      Python dict literal: descr, fortran_order, shape
//! [..]      Raw elements
//! ```
//!
//! Every file is read into an [`NdArray`]; the element kind records whether
//! the source dtype was boolean, integer or floating point.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use half::f16;

use super::MappedFile;
use crate::util::{ElementKind, Error, NdArray, Result, Shape};

/// Magic bytes at the start of every `.npy` file.
pub const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header alignment used when writing.
const HEADER_ALIGN: usize = 64;

/// Element type parsed from a `descr` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Descr {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl Descr {
    fn parse(descr: &str) -> Result<Self> {
        let (order, code) = match descr.chars().next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
            _ => ('|', descr),
        };
        if order == '>' && !matches!(code, "b1" | "u1" | "i1") {
            return Err(Error::invalid(format!("big-endian npy dtype {} is not supported", descr)));
        }
        Ok(match code {
            "b1" => Self::Bool,
            "u1" => Self::U8,
            "u2" => Self::U16,
            "u4" => Self::U32,
            "u8" => Self::U64,
            "i1" => Self::I8,
            "i2" => Self::I16,
            "i4" => Self::I32,
            "i8" => Self::I64,
            "f2" => Self::F16,
            "f4" => Self::F32,
            "f8" => Self::F64,
            _ => {
                return Err(Error::TypeMismatch {
                    expected: "numeric npy dtype".to_string(),
                    actual: descr.to_string(),
                })
            }
        })
    }

    const fn size(self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 | Self::F16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    const fn kind(self) -> ElementKind {
        match self {
            Self::Bool => ElementKind::Bool,
            Self::F16 | Self::F32 | Self::F64 => ElementKind::Float,
            _ => ElementKind::Int,
        }
    }

    /// Decode `bytes` (exactly `n * size` long) to f64.
    fn decode(self, bytes: &[u8], n: usize) -> Vec<f64> {
        macro_rules! read_into {
            ($t:ty, $read:ident) => {{
                let mut buf = vec![<$t>::default(); n];
                LittleEndian::$read(bytes, &mut buf);
                buf.into_iter().map(|v| v as f64).collect()
            }};
        }
        match self {
            Self::Bool => bytes.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
            Self::U8 => bytes.iter().map(|&b| b as f64).collect(),
            Self::I8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
            Self::U16 => read_into!(u16, read_u16_into),
            Self::U32 => read_into!(u32, read_u32_into),
            Self::U64 => read_into!(u64, read_u64_into),
            Self::I16 => read_into!(i16, read_i16_into),
            Self::I32 => read_into!(i32, read_i32_into),
            Self::I64 => read_into!(i64, read_i64_into),
            Self::F16 => bytes
                .chunks_exact(2)
                .map(|c| f16::from_bits(LittleEndian::read_u16(c)).to_f64())
                .collect(),
            Self::F32 => read_into!(f32, read_f32_into),
            Self::F64 => read_into!(f64, read_f64_into),
        }
    }
}

/// Parsed header dictionary.
#[derive(Debug, PartialEq)]
struct Header {
    descr: Descr,
    fortran_order: bool,
    shape: Shape,
}

/// Locate the value that follows `'key':` in a header dict literal.
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{}'", key);
    let start = header
        .find(&needle)
        .ok_or_else(|| Error::invalid(format!("npy header has no {}", key)))?;
    let rest = header[start + needle.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| Error::invalid(format!("npy header: malformed {} entry", key)))?;
    Ok(rest.trim_start())
}

fn parse_header(text: &str) -> Result<Header> {
    let descr_value = header_value(text, "descr")?;
    let descr = descr_value
        .strip_prefix('\'')
        .and_then(|s| s.split('\'').next())
        .ok_or_else(|| Error::TypeMismatch {
            expected: "simple npy dtype".to_string(),
            actual: descr_value.chars().take(32).collect(),
        })?;
    let descr = Descr::parse(descr)?;

    let fortran_order = header_value(text, "fortran_order")?.starts_with("True");

    let shape_value = header_value(text, "shape")?;
    let inner = shape_value
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| Error::invalid("npy header: malformed shape"))?;
    let dims = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::invalid(format!("npy header: bad shape: {}", e)))?;

    Ok(Header { descr, fortran_order, shape: Shape::from(dims) })
}

/// Load a `.npy` file.
pub fn load_array(path: impl AsRef<Path>) -> Result<NdArray> {
    let file = MappedFile::open(path.as_ref())?;
    let preamble = file.read_bytes(0, 8)?;
    if &preamble[0..6] != NPY_MAGIC {
        return Err(Error::InvalidMagic("npy"));
    }
    let (header_len, header_start) = match preamble[6] {
        1 => (file.read_u16(8)? as usize, 10u64),
        2 | 3 => (file.read_u32(8)? as usize, 12u64),
        v => return Err(Error::UnsupportedVersion(format!("npy {}.{}", v, preamble[7]))),
    };
    let text = String::from_utf8(file.read_bytes(header_start, header_len)?)?;
    let header = parse_header(&text)?;

    let n = header.shape.num_elements();
    let data_pos = header_start + header_len as u64;
    let bytes = file.bytes(data_pos, n * header.descr.size())?;
    let data = header.descr.decode(&bytes, n);

    let array = if header.fortran_order && header.shape.rank() > 1 {
        // Column-major data is C-ordered under the reversed shape.
        NdArray::new(header.shape.reversed(), header.descr.kind(), data)?.transpose()
    } else {
        NdArray::new(header.shape, header.descr.kind(), data)?
    };
    tracing::debug!(path = %file.path().display(), shape = %array.shape(), kind = %array.kind(), "loaded npy");
    Ok(array)
}

/// Save an array as a v1.0 `.npy` file: `<i8` for integer arrays, `<f8` otherwise.
pub fn save_array(path: impl AsRef<Path>, array: &NdArray) -> Result<()> {
    let descr = match array.kind() {
        ElementKind::Int => "<i8",
        _ => "<f8",
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr,
        array.shape()
    );
    let unpadded = NPY_MAGIC.len() + 4 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');
    let header_len = u16::try_from(dict.len())
        .map_err(|_| Error::WriteFailed(format!("npy header for shape {} is too long", array.shape())))?;

    let mut out = BufWriter::new(File::create(path.as_ref())?);
    out.write_all(NPY_MAGIC)?;
    out.write_u8(1)?;
    out.write_u8(0)?;
    out.write_u16::<LittleEndian>(header_len)?;
    out.write_all(dict.as_bytes())?;
    for &v in array.data() {
        match array.kind() {
            ElementKind::Int => out.write_i64::<LittleEndian>(v as i64)?,
            _ => out.write_f64::<LittleEndian>(v)?,
        }
    }
    out.flush()?;
    tracing::debug!(path = %path.as_ref().display(), shape = %array.shape(), "saved npy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a v1.0 file by hand from a header dict and raw payload.
    fn raw_npy(dict: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = NPY_MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_parse_header() {
        let h = parse_header("{'descr': '<f8', 'fortran_order': False, 'shape': (3, 2), }").unwrap();
        assert_eq!(h.descr, Descr::F64);
        assert!(!h.fortran_order);
        assert_eq!(h.shape, Shape::d2(3, 2));

        let h = parse_header("{'descr': '|b1', 'fortran_order': True, 'shape': (), }").unwrap();
        assert_eq!(h.descr, Descr::Bool);
        assert!(h.fortran_order);
        assert!(h.shape.is_scalar());
    }

    #[test]
    fn test_rejects_big_endian() {
        assert!(Descr::parse(">f8").is_err());
        assert!(Descr::parse(">u1").is_ok());
        assert!(Descr::parse("<c16").is_err());
    }

    #[test]
    fn test_int_and_float_files() -> Result<()> {
        let dir = TempDir::new()?;
        let ints = dir.path().join("ints.npy");
        save_array(&ints, &NdArray::from_i64(&[3, -1, 7]))?;
        let back = load_array(&ints)?;
        assert_eq!(back.kind(), ElementKind::Int);
        assert_eq!(back.to_i64_vec(), vec![3, -1, 7]);

        let floats = dir.path().join("floats.npy");
        let m = NdArray::new(Shape::d2(2, 2), ElementKind::Float, vec![0.5, 1.5, 2.5, 3.5])?;
        save_array(&floats, &m)?;
        assert_eq!(load_array(&floats)?, m);

        let bytes = std::fs::read(&floats)?;
        assert_eq!((bytes.len() - 32) % HEADER_ALIGN, 0);
        Ok(())
    }

    #[test]
    fn test_narrow_dtypes() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("i4.npy");
        let payload: Vec<u8> = [5i32, -2].iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(&path, raw_npy("{'descr': '<i4', 'fortran_order': False, 'shape': (2,), }\n", &payload))?;
        assert_eq!(load_array(&path)?.to_i64_vec(), vec![5, -2]);

        let path = dir.path().join("f2.npy");
        let payload: Vec<u8> = [1.5f32, -0.25]
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_bits().to_le_bytes())
            .collect();
        std::fs::write(&path, raw_npy("{'descr': '<f2', 'fortran_order': False, 'shape': (2,), }\n", &payload))?;
        assert_eq!(load_array(&path)?.data(), &[1.5, -0.25]);
        Ok(())
    }

    #[test]
    fn test_fortran_order() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("f.npy");
        // [[1, 2, 3], [4, 5, 6]] stored column-major
        let payload: Vec<u8> = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        std::fs::write(&path, raw_npy("{'descr': '<f8', 'fortran_order': True, 'shape': (2, 3), }\n", &payload))?;
        let a = load_array(&path)?;
        assert_eq!(a.shape(), &Shape::d2(2, 3));
        assert_eq!(a.data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        Ok(())
    }

    #[test]
    fn test_bad_magic() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.npy");
        std::fs::write(&path, b"NOTNUMPYFILE")?;
        assert!(matches!(load_array(&path), Err(Error::InvalidMagic(_))));
        Ok(())
    }
}
