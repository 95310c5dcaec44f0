//! .gtv file format structures

use thiserror::Error;

/// Magic bytes for .gtv files: "GTV1"
pub const MAGIC: [u8; 4] = [0x47, 0x54, 0x56, 0x31];

/// Current format version
pub const VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 32;

/// CRC-64 used for payload checksums
pub const CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

/// Element type of an array file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F64,
    U64,
    I64,
    F32,
}

impl Dtype {
    pub fn tag(self) -> u8 {
        match self {
            Dtype::F64 => 1,
            Dtype::U64 => 2,
            Dtype::I64 => 3,
            Dtype::F32 => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            1 => Ok(Dtype::F64),
            2 => Ok(Dtype::U64),
            3 => Ok(Dtype::I64),
            4 => Ok(Dtype::F32),
            _ => Err(StoreError::UnknownDtype(tag)),
        }
    }

    /// Size of one element in bytes
    pub fn elem_size(self) -> usize {
        match self {
            Dtype::F64 | Dtype::U64 | Dtype::I64 => 8,
            Dtype::F32 => 4,
        }
    }
}

/// File header (32 bytes fixed size)
///
/// Layout, little-endian: magic(4) version(2) dtype(1) reserved(1)
/// cols(4) rows(8) checksum(8) reserved(4). Flat vectors use `cols == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayHeader {
    pub version: u16,
    pub dtype: Dtype,
    /// Number of columns per row (1 for flat vectors)
    pub cols: u32,
    /// Number of rows
    pub rows: u64,
    /// CRC-64 of the payload bytes
    pub checksum: u64,
}

impl ArrayHeader {
    pub fn new(dtype: Dtype, cols: u32, rows: u64, checksum: u64) -> Self {
        Self {
            version: VERSION,
            dtype,
            cols,
            rows,
            checksum,
        }
    }

    /// Total payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.rows as usize * self.cols as usize * self.dtype.elem_size()
    }
}

/// Errors produced when reading or writing .gtv files
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a .gtv file: magic bytes mismatch")]
    BadMagic,

    #[error("unsupported .gtv version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown dtype tag {0}")]
    UnknownDtype(u8),

    #[error("dtype mismatch: expected {expected:?}, file contains {found:?}")]
    DtypeMismatch { expected: Dtype, found: Dtype },

    #[error("checksum mismatch: header says {expected:#018x}, payload is {computed:#018x}")]
    ChecksumMismatch { expected: u64, computed: u64 },

    #[error("matrix rows have unequal lengths ({0} vs {1})")]
    RaggedMatrix(usize, usize),
}
