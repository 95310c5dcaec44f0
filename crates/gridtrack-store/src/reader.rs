//! .gtv file reader

use crate::format::{ArrayHeader, Dtype, StoreError, CRC64, MAGIC, VERSION};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Read a flat f64 vector
pub fn read_f64(path: &Path) -> Result<Vec<f64>, StoreError> {
    let (header, payload) = read_file(path, Dtype::F64)?;
    let count = header.rows as usize * header.cols as usize;
    let mut values = Vec::with_capacity(count);
    for chunk in payload.chunks_exact(8) {
        values.push(f64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(values)
}

/// Read a flat u64 vector
pub fn read_u64(path: &Path) -> Result<Vec<u64>, StoreError> {
    let (_, payload) = read_file(path, Dtype::U64)?;
    let mut values = Vec::with_capacity(payload.len() / 8);
    for chunk in payload.chunks_exact(8) {
        values.push(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(values)
}

/// Read a flat i64 vector
pub fn read_i64(path: &Path) -> Result<Vec<i64>, StoreError> {
    let (_, payload) = read_file(path, Dtype::I64)?;
    let mut values = Vec::with_capacity(payload.len() / 8);
    for chunk in payload.chunks_exact(8) {
        values.push(i64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(values)
}

/// Read an f32 matrix, row-major
pub fn read_f32_matrix(path: &Path) -> Result<Vec<Vec<f32>>, StoreError> {
    let (header, payload) = read_file(path, Dtype::F32)?;
    let cols = header.cols as usize;
    let mut rows = Vec::with_capacity(header.rows as usize);
    if cols == 0 {
        rows.resize(header.rows as usize, Vec::new());
        return Ok(rows);
    }
    for chunk in payload.chunks_exact(cols * 4) {
        let row: Vec<f32> = chunk
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn read_file(path: &Path, expected: Dtype) -> Result<(ArrayHeader, Vec<u8>), StoreError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader)?;
    if header.dtype != expected {
        return Err(StoreError::DtypeMismatch {
            expected,
            found: header.dtype,
        });
    }

    let mut payload = vec![0u8; header.payload_size()];
    reader.read_exact(&mut payload)?;

    let computed = CRC64.checksum(&payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: header.checksum,
            computed,
        });
    }

    Ok((header, payload))
}

fn read_header(reader: &mut BufReader<File>) -> Result<ArrayHeader, StoreError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(StoreError::BadMagic);
    }

    let version = read_u16(reader)?;
    if version != VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }

    let mut dtype_tag = [0u8; 2]; // tag + reserved byte
    reader.read_exact(&mut dtype_tag)?;
    let dtype = Dtype::from_tag(dtype_tag[0])?;

    let cols = read_u32(reader)?;
    let rows = read_u64_le(reader)?;
    let checksum = read_u64_le(reader)?;
    let _reserved = read_u32(reader)?;

    Ok(ArrayHeader {
        version,
        dtype,
        cols,
        rows,
        checksum,
    })
}

fn read_u16(reader: &mut BufReader<File>) -> Result<u16, StoreError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut BufReader<File>) -> Result<u32, StoreError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le(reader: &mut BufReader<File>) -> Result<u64, StoreError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer;

    #[test]
    fn f64_vector_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fund_v.gtv");
        let values = vec![312.5, 617.25, f64::NAN, 0.0];

        writer::write_f64(&path, &values).unwrap();
        let loaded = read_f64(&path).unwrap();

        assert_eq!(loaded.len(), values.len());
        assert_eq!(loaded[0], 312.5);
        assert_eq!(loaded[1], 617.25);
        assert!(loaded[2].is_nan());
        assert_eq!(loaded[3], 0.0);
    }

    #[test]
    fn i64_vector_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ident_v.gtv");
        let values = vec![-1, 0, 7, i64::MAX];

        writer::write_i64(&path, &values).unwrap();
        assert_eq!(read_i64(&path).unwrap(), values);
    }

    #[test]
    fn f32_matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sign_v.gtv");
        let rows = vec![vec![1.0f32, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];

        writer::write_f32_matrix(&path, &rows).unwrap();
        assert_eq!(read_f32_matrix(&path).unwrap(), rows);
    }

    #[test]
    fn empty_matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gtv");

        writer::write_f32_matrix(&path, &[]).unwrap();
        assert!(read_f32_matrix(&path).unwrap().is_empty());
    }

    #[test]
    fn dtype_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idx_v.gtv");

        writer::write_u64(&path, &[1, 2, 3]).unwrap();
        let err = read_f64(&path).unwrap_err();
        assert!(matches!(err, StoreError::DtypeMismatch { .. }));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.gtv");
        writer::write_f64(&path, &[1.0, 2.0, 3.0]).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap();
        file.seek(SeekFrom::Start(crate::format::HEADER_SIZE as u64))
            .unwrap();
        file.write_all(&[0xFF; 8]).unwrap();

        let err = read_f64(&path).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.gtv");
        std::fs::write(&path, b"not a gtv file, definitely not long enough").unwrap();

        let err = read_f64(&path).unwrap_err();
        assert!(matches!(err, StoreError::BadMagic));
    }
}
