//! Gridtrack array file format library
//!
//! Detection vectors and spectrogram products are persisted as flat
//! little-endian arrays with a fixed-size header (magic, version, dtype,
//! shape, CRC-64 of the payload), one array per `.gtv` file.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{ArrayHeader, Dtype, StoreError, MAGIC, VERSION};
pub use reader::{read_f32_matrix, read_f64, read_i64, read_u64};
pub use writer::{write_f32_matrix, write_f64, write_i64, write_u64};
