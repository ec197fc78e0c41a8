use std::fmt;
use std::sync::Arc;

use bytes::BufMut;

use crate::common::{HeapStoreError, RecordId, Result};

use super::{Schema, Value};

/// Represents a single row in a table.
///
/// A tuple carries its schema, its values in schema order and, once it has
/// been stored, the [`RecordId`] of the slot holding it.
///
/// ## Slot Format
///
/// ```text
/// +----------------+-----------+-----------+-----+
/// | Null Bitmap    | Column 0  | Column 1  | ... |
/// | (N bytes)      | (w0)      | (w1)      |     |
/// +----------------+-----------+-----------+-----+
/// ```
///
/// The null bitmap has one bit per column (1 = NULL). Every column is written
/// at its fixed width, so the encoded size always equals
/// [`Schema::tuple_width`].
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given schema and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the schema column count.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "Value count must match schema column count"
        );
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Decodes a tuple from exactly one slot's worth of bytes.
    pub fn from_bytes(schema: Arc<Schema>, data: &[u8]) -> Option<Self> {
        if data.len() < schema.tuple_width() {
            return None;
        }
        let (bitmap, mut rest) = data.split_at(schema.null_bitmap_size());

        let mut values = Vec::with_capacity(schema.column_count());
        for (i, col) in schema.columns().enumerate() {
            let value = Value::decode(col.data_type(), &mut rest)?;
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(value);
            }
        }

        Some(Self {
            schema,
            values,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets the value at the given column index.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns where this tuple is stored, if it has been stored.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encodes the tuple into exactly `schema.tuple_width()` bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.schema.tuple_width());
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Appends the encoded tuple to `buf`.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut bitmap = vec![0u8; self.schema.null_bitmap_size()];
        for (i, (col, value)) in self.schema.columns().zip(&self.values).enumerate() {
            if value.is_null() {
                if !col.is_nullable() {
                    return Err(HeapStoreError::SchemaMismatch(format!(
                        "column {} is not nullable",
                        col.name()
                    )));
                }
                bitmap[i / 8] |= 1 << (i % 8);
            } else if !value.fits(col.data_type()) {
                return Err(HeapStoreError::SchemaMismatch(format!(
                    "value {} does not fit column {} {}",
                    value,
                    col.name(),
                    col.data_type()
                )));
            }
        }

        buf.put_slice(&bitmap);
        for (col, value) in self.schema.columns().zip(&self.values) {
            value.encode(col.data_type(), buf);
        }
        Ok(())
    }
}

/// Tuples compare equal when their schemas and values match; where they are
/// stored does not matter.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    schema: Arc<Schema>,
    values: Vec<Value>,
    current_index: usize,
}

impl TupleBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            values: vec![Value::Null; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = value.into();
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(self) -> Self {
        self.value(Value::Null)
    }

    /// Sets the value for a specific column by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.schema.column_index(name) {
            self.values[index] = value.into();
        }
        self
    }

    pub fn build(self) -> Tuple {
        Tuple::new(self.schema, self.values)
    }
}
