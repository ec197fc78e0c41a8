use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::DataType;

/// Represents a single column in a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Column {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the on-page width of this column in bytes.
    pub fn width(&self) -> usize {
        self.data_type.width()
    }
}

/// The fixed shape of every tuple stored in one heap file.
///
/// Because each column has a fixed width, every tuple of a schema encodes to
/// exactly [`Schema::tuple_width`] bytes: a null bitmap followed by the
/// columns in order.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
    /// Size of the null bitmap in bytes (ceiling of column_count / 8)
    null_bitmap_size: usize,
    tuple_width: usize,
}

impl Schema {
    /// Creates a new schema from a list of columns.
    pub fn new(columns: Vec<Column>) -> Self {
        let name_to_index = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.name.clone(), i))
            .collect();
        let null_bitmap_size = columns.len().div_ceil(8);
        let tuple_width = null_bitmap_size + columns.iter().map(Column::width).sum::<usize>();

        Self {
            columns,
            name_to_index,
            null_bitmap_size,
            tuple_width,
        }
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Returns the number of bytes one encoded tuple occupies in a page slot.
    pub fn tuple_width(&self) -> usize {
        self.tuple_width
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", col.name, col.data_type)?;
            if col.nullable {
                write!(f, " NULL")?;
            }
        }
        write!(f, ")")
    }
}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Adds a non-nullable column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, false));
        self
    }

    /// Adds a nullable column.
    pub fn nullable_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, true));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_schema() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::Text(20))
            .nullable_column("score", DataType::Double)
            .build()
    }

    #[test]
    fn test_schema_creation() {
        let schema = create_test_schema();

        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column(0).unwrap().name(), "id");
        assert_eq!(schema.column_index("score"), Some(2));
        assert_eq!(schema.column_index("missing"), None);
        assert!(schema.column(2).unwrap().is_nullable());
    }

    #[test]
    fn test_tuple_width() {
        let schema = create_test_schema();

        // bitmap (1) + id (4) + name (2 + 20) + score (8)
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.tuple_width(), 35);
    }

    #[test]
    fn test_wide_null_bitmap() {
        let mut builder = Schema::builder();
        for i in 0..9 {
            builder = builder.nullable_column(format!("c{}", i), DataType::Boolean);
        }
        let schema = builder.build();
        assert_eq!(schema.null_bitmap_size(), 2);
        assert_eq!(schema.tuple_width(), 11);
    }

    #[test]
    fn test_equality_ignores_construction_path() {
        let a = create_test_schema();
        let b = Schema::new(a.columns().cloned().collect());
        assert_eq!(a, b);

        let c = Schema::builder().column("id", DataType::BigInt).build();
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let schema = create_test_schema();
        assert_eq!(
            schema.to_string(),
            "(id INTEGER, name TEXT(20), score DOUBLE NULL)"
        );
    }
}
