use std::fmt;

/// Column types a heap file can store.
///
/// Every type has a fixed on-page width so that all slots of a file are the
/// same size. `Text(n)` reserves a 2-byte length prefix plus `n` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 1 byte (0 = false, 1 = true)
    Boolean,

    /// 32-bit signed integer, little-endian
    Integer,

    /// 64-bit signed integer, little-endian
    BigInt,

    /// 64-bit IEEE 754 float, little-endian
    Double,

    /// UTF-8 string of at most `n` bytes, zero padded
    Text(u16),
}

impl DataType {
    /// Returns the number of bytes a value of this type occupies in a slot.
    pub fn width(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Integer => 4,
            DataType::BigInt => 8,
            DataType::Double => 8,
            DataType::Text(n) => 2 + *n as usize,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Text(n) => write!(f, "TEXT({})", n),
        }
    }
}
