//! Little-endian scalar helpers of the binary table format.

use std::io::{self, Read, Write};

pub(crate) fn write_i32<W: Write + ?Sized>(w: &mut W, value: i32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub(crate) fn read_i32<R: Read + ?Sized>(r: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

/// Reads a row count, rejecting negative values.
pub(crate) fn read_count<R: Read + ?Sized>(r: &mut R) -> io::Result<usize> {
    let count = read_i32(r)?;
    usize::try_from(count).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative row count {count}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_is_little_endian() {
        let mut out = Vec::new();
        write_i32(&mut out, 0x0102_0304).unwrap();
        assert_eq!(out, [4, 3, 2, 1]);
        assert_eq!(read_i32(&mut out.as_slice()).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_negative_count_is_invalid() {
        let mut out = Vec::new();
        write_i32(&mut out, -1).unwrap();
        let err = read_count(&mut out.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
