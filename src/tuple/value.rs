use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use super::DataType;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns whether a non-null value can be stored in a column of `data_type`.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Boolean(_), DataType::Boolean)
            | (Value::Integer(_), DataType::Integer)
            | (Value::BigInt(_), DataType::BigInt)
            | (Value::Double(_), DataType::Double) => true,
            (Value::Text(s), DataType::Text(n)) => s.len() <= *n as usize,
            _ => false,
        }
    }

    /// Writes exactly `data_type.width()` bytes. A null value writes zeros.
    /// Returns false (writing nothing) if the value does not fit the type.
    pub fn encode<B: BufMut>(&self, data_type: &DataType, buf: &mut B) -> bool {
        if !self.fits(data_type) {
            return false;
        }
        match (self, data_type) {
            (Value::Null, dt) => buf.put_bytes(0, dt.width()),
            (Value::Boolean(b), _) => buf.put_u8(u8::from(*b)),
            (Value::Integer(v), _) => buf.put_i32_le(*v),
            (Value::BigInt(v), _) => buf.put_i64_le(*v),
            (Value::Double(v), _) => buf.put_f64_le(*v),
            (Value::Text(s), DataType::Text(n)) => {
                buf.put_u16_le(s.len() as u16);
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, *n as usize - s.len());
            }
            _ => return false,
        }
        true
    }

    /// Reads one value of `data_type`, consuming exactly `data_type.width()` bytes.
    pub fn decode<B: Buf>(data_type: &DataType, buf: &mut B) -> Option<Self> {
        if buf.remaining() < data_type.width() {
            return None;
        }
        let value = match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::Integer => Value::Integer(buf.get_i32_le()),
            DataType::BigInt => Value::BigInt(buf.get_i64_le()),
            DataType::Double => Value::Double(buf.get_f64_le()),
            DataType::Text(n) => {
                let len = buf.get_u16_le() as usize;
                let n = *n as usize;
                if len > n {
                    return None;
                }
                let mut raw = vec![0u8; n];
                buf.copy_to_slice(&mut raw);
                raw.truncate(len);
                Value::Text(String::from_utf8(raw).ok()?)
            }
        };
        Some(value)
    }

    /// Compares two values of the same type.
    /// Returns None if the values are not comparable (different types or null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::BigInt(b)) => Some((*a as i64).cmp(b)),
            (Value::BigInt(a), Value::Integer(b)) => Some(a.cmp(&(*b as i64))),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
