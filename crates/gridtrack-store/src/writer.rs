//! .gtv file writer

use crate::format::{ArrayHeader, Dtype, StoreError, CRC64, MAGIC};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a flat f64 vector
pub fn write_f64(path: &Path, values: &[f64]) -> Result<(), StoreError> {
    let mut payload = Vec::with_capacity(values.len() * 8);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    write_file(path, Dtype::F64, 1, values.len() as u64, &payload)
}

/// Write a flat u64 vector
pub fn write_u64(path: &Path, values: &[u64]) -> Result<(), StoreError> {
    let mut payload = Vec::with_capacity(values.len() * 8);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    write_file(path, Dtype::U64, 1, values.len() as u64, &payload)
}

/// Write a flat i64 vector
pub fn write_i64(path: &Path, values: &[i64]) -> Result<(), StoreError> {
    let mut payload = Vec::with_capacity(values.len() * 8);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    write_file(path, Dtype::I64, 1, values.len() as u64, &payload)
}

/// Write an f32 matrix, row-major
///
/// All rows must have the same length. An empty matrix is written with
/// `cols == 0` and can be read back as empty.
pub fn write_f32_matrix(path: &Path, rows: &[Vec<f32>]) -> Result<(), StoreError> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut payload = Vec::with_capacity(rows.len() * cols * 4);
    for row in rows {
        if row.len() != cols {
            return Err(StoreError::RaggedMatrix(cols, row.len()));
        }
        for v in row {
            payload.extend_from_slice(&v.to_le_bytes());
        }
    }
    write_file(path, Dtype::F32, cols as u32, rows.len() as u64, &payload)
}

fn write_file(
    path: &Path,
    dtype: Dtype,
    cols: u32,
    rows: u64,
    payload: &[u8],
) -> Result<(), StoreError> {
    let checksum = CRC64.checksum(payload);
    let header = ArrayHeader::new(dtype, cols, rows, checksum);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_header(&mut writer, &header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

fn write_header(writer: &mut BufWriter<File>, header: &ArrayHeader) -> Result<(), StoreError> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&header.version.to_le_bytes())?;
    writer.write_all(&[header.dtype.tag()])?;
    writer.write_all(&[0u8])?; // reserved
    writer.write_all(&header.cols.to_le_bytes())?;
    writer.write_all(&header.rows.to_le_bytes())?;
    writer.write_all(&header.checksum.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?; // reserved
    Ok(())
}
