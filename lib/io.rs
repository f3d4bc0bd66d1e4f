//! Output helpers: `.npz` archives and the native "pom" dump of term lists.
//!
//! A pom file is a `u64` term count followed by one fixed-width record of
//! `f64`s per term, all in host byte order.

use std::{
    fs::File,
    io::{ BufReader, BufWriter, Read, Write },
    path::Path,
};
use byteorder::{ NativeEndian, ReadBytesExt, WriteBytesExt };
use crate::error::{ EdError, EdResult };

pub use ndarray_npy::NpzWriter;

/// Create a directory and all its parents if it does not already exist.
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        std::fs::create_dir_all(&$dir)
    }
}

/// Write a collection of arrays to an `.npz` archive, evaluating to an
/// [`EdResult`][crate::error::EdResult].
///
/// ```ignore
/// write_npz!(
///     outdir.join("gf.npz"),
///     arrays: {
///         "eigenvalues" => &E,
///         "gf" => &G,
///     }
/// )?;
/// ```
#[macro_export]
macro_rules! write_npz {
    (
        $path:expr,
        arrays: { $( $name:expr => $arr:expr ),* $(,)? } $(,)?
    ) => {
        (|| -> $crate::error::EdResult<()> {
            let mut npz = $crate::io::NpzWriter::new(std::fs::File::create($path)?);
            $( npz.add_array($name, $arr)?; )*
            npz.finish()?;
            Ok(())
        })()
    }
}

/// A term that can be stored as a fixed-width record of `f64`s.
pub trait PomRecord: Sized {
    /// Number of `f64`s per record.
    const WIDTH: usize;

    /// Append the record to `out`.
    fn write_record(&self, out: &mut Vec<f64>);

    /// Parse a record of exactly [`Self::WIDTH`] values.
    fn read_record(rec: &[f64]) -> EdResult<Self>;
}

/// Concatenate the records of a sequence of terms.
pub fn flatten<'a, Tm, I>(terms: I) -> Vec<f64>
where
    Tm: PomRecord + 'a,
    I: IntoIterator<Item = &'a Tm>,
{
    let mut out: Vec<f64> = Vec::new();
    terms.into_iter().for_each(|t| t.write_record(&mut out));
    out
}

/// Split a flat sequence of records back into terms.
pub fn unflatten<Tm>(data: &[f64]) -> EdResult<Vec<Tm>>
where Tm: PomRecord
{
    if data.len() % Tm::WIDTH != 0 {
        return Err(EdError::MalformedRecord(format!(
            "{} values do not split into records of width {}",
            data.len(), Tm::WIDTH,
        )));
    }
    data.chunks_exact(Tm::WIDTH).map(Tm::read_record).collect()
}

/// Write a pom dump of a sequence of terms.
pub fn write_pom<'a, W, Tm, I>(mut writer: W, terms: I) -> EdResult<()>
where
    W: Write,
    Tm: PomRecord + 'a,
    I: IntoIterator<Item = &'a Tm>,
{
    let data = flatten(terms);
    writer.write_u64::<NativeEndian>((data.len() / Tm::WIDTH) as u64)?;
    for x in data.into_iter() {
        writer.write_f64::<NativeEndian>(x)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a pom dump.
pub fn read_pom<R, Tm>(mut reader: R) -> EdResult<Vec<Tm>>
where
    R: Read,
    Tm: PomRecord,
{
    let count = reader.read_u64::<NativeEndian>()? as usize;
    let mut data: Vec<f64> = vec![0.0; count * Tm::WIDTH];
    reader.read_f64_into::<NativeEndian>(&mut data)?;
    unflatten(&data)
}

/// Write a pom dump to a file.
pub fn save_pom<'a, P, Tm, I>(path: P, terms: I) -> EdResult<()>
where
    P: AsRef<Path>,
    Tm: PomRecord + 'a,
    I: IntoIterator<Item = &'a Tm>,
{
    write_pom(BufWriter::new(File::create(path)?), terms)
}

/// Read a pom dump from a file.
pub fn load_pom<P, Tm>(path: P) -> EdResult<Vec<Tm>>
where
    P: AsRef<Path>,
    Tm: PomRecord,
{
    read_pom(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pair(f64, f64);

    impl PomRecord for Pair {
        const WIDTH: usize = 2;

        fn write_record(&self, out: &mut Vec<f64>) {
            out.extend([self.0, self.1]);
        }

        fn read_record(rec: &[f64]) -> EdResult<Self> {
            Ok(Self(rec[0], rec[1]))
        }
    }

    #[test]
    fn pom_layout() {
        let terms = vec![Pair(1.0, -0.5), Pair(f64::MIN_POSITIVE, 3.0e300)];
        let mut buf: Vec<u8> = Vec::new();
        write_pom(&mut buf, &terms).unwrap();
        assert_eq!(buf.len(), 8 + 4 * 8);
        assert_eq!(buf[..8], 2_u64.to_ne_bytes());
        assert_eq!(buf[8..16], 1.0_f64.to_ne_bytes());
        let back: Vec<Pair> = read_pom(buf.as_slice()).unwrap();
        assert_eq!(back, terms);
    }

    #[test]
    fn truncated_input() {
        let terms = vec![Pair(1.0, 2.0)];
        let mut buf: Vec<u8> = Vec::new();
        write_pom(&mut buf, &terms).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(read_pom::<_, Pair>(buf.as_slice()), Err(EdError::Io(_))));
        assert!(matches!(
            unflatten::<Pair>(&[1.0, 2.0, 3.0]),
            Err(EdError::MalformedRecord(_)),
        ));
    }
}
