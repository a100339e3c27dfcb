use std::fmt;

use super::error::{RecordError, RecordResult};
use super::value::{Field, FieldType};

/// One named, typed column of a tuple descriptor
#[derive(Debug, Clone)]
pub struct TdItem {
    pub field_type: FieldType,
    pub name: String,
}

/// Ordered schema of a tuple
///
/// Two descriptors are equal when their type sequences match; names are
/// only used for display and for resolving fields by name.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
    byte_size: usize,
}

impl TupleDesc {
    /// Create a descriptor from `(type, name)` pairs
    pub fn new(items: Vec<(FieldType, String)>) -> Self {
        let items: Vec<TdItem> = items
            .into_iter()
            .map(|(field_type, name)| TdItem { field_type, name })
            .collect();
        let byte_size = items.iter().map(|i| i.field_type.size()).sum();
        Self { items, byte_size }
    }

    /// Create a descriptor with generated field names (`f0`, `f1`, ...)
    pub fn from_types(types: &[FieldType]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, t)| (*t, format!("f{}", i)))
                .collect(),
        )
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    pub fn field_type(&self, i: usize) -> RecordResult<FieldType> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or_else(|| RecordError::NoSuchField(format!("index {}", i)))
    }

    pub fn field_name(&self, i: usize) -> RecordResult<&str> {
        self.items
            .get(i)
            .map(|item| item.name.as_str())
            .ok_or_else(|| RecordError::NoSuchField(format!("index {}", i)))
    }

    /// Find a field by name, also matching a `alias.name` qualified field by its bare name
    pub fn field_name_to_index(&self, name: &str) -> RecordResult<usize> {
        self.items
            .iter()
            .position(|item| item.name == name)
            .or_else(|| {
                self.items
                    .iter()
                    .position(|item| item.name.rsplit('.').next() == Some(name))
            })
            .ok_or_else(|| RecordError::NoSuchField(name.to_string()))
    }

    /// Size in bytes of one tuple with this schema
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Concatenate two descriptors, `self` first
    pub fn merge(&self, other: &TupleDesc) -> TupleDesc {
        let items = self
            .items
            .iter()
            .chain(other.items.iter())
            .map(|item| (item.field_type, item.name.clone()))
            .collect();
        TupleDesc::new(items)
    }

    /// Same types with every name prefixed by `alias.`
    pub fn with_alias(&self, alias: &str) -> TupleDesc {
        let items = self
            .items
            .iter()
            .map(|item| (item.field_type, format!("{}.{}", alias, item.name)))
            .collect();
        TupleDesc::new(items)
    }

    /// Check that `fields` can be stored under this schema
    pub fn validate(&self, fields: &[Field]) -> RecordResult<()> {
        if fields.len() != self.items.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} fields, got {}",
                self.items.len(),
                fields.len()
            )));
        }

        for (field, item) in fields.iter().zip(&self.items) {
            if !field.matches(&item.field_type) {
                return Err(RecordError::TypeMismatch {
                    expected: item.field_type.to_string(),
                    actual: format!("{:?}", field),
                });
            }
            if let (Field::Str(s), FieldType::Str(max_len)) = (field, &item.field_type) {
                if s.len() > *max_len {
                    return Err(RecordError::Serialization(format!(
                        "Value for '{}' is {} bytes, column allows {}",
                        item.name,
                        s.len(),
                        max_len
                    )));
                }
                // Stored strings are NUL-padded, so a NUL would end the value early
                if s.contains('\0') {
                    return Err(RecordError::Serialization(format!(
                        "Value for '{}' contains a NUL byte",
                        item.name
                    )));
                }
            }
        }

        Ok(())
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for TupleDesc {}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", item.field_type, item.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_desc() -> TupleDesc {
        TupleDesc::new(vec![
            (FieldType::Int, "id".to_string()),
            (FieldType::Str(20), "name".to_string()),
            (FieldType::Int, "score".to_string()),
        ])
    }

    #[test]
    fn test_byte_size() {
        let desc = create_test_desc();
        assert_eq!(desc.num_fields(), 3);
        assert_eq!(desc.byte_size(), 4 + 20 + 4);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = create_test_desc();
        let b = TupleDesc::from_types(&[FieldType::Int, FieldType::Str(20), FieldType::Int]);
        assert_eq!(a, b);

        let c = TupleDesc::from_types(&[FieldType::Int, FieldType::Str(21), FieldType::Int]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_field_name_to_index() {
        let desc = create_test_desc();
        assert_eq!(desc.field_name_to_index("name").unwrap(), 1);
        assert!(matches!(
            desc.field_name_to_index("missing"),
            Err(RecordError::NoSuchField(_))
        ));

        let aliased = desc.with_alias("t");
        assert_eq!(aliased.field_name(2).unwrap(), "t.score");
        assert_eq!(aliased.field_name_to_index("t.score").unwrap(), 2);
        assert_eq!(aliased.field_name_to_index("score").unwrap(), 2);
    }

    #[test]
    fn test_merge() {
        let desc = create_test_desc();
        let merged = desc.merge(&TupleDesc::from_types(&[FieldType::Int]));
        assert_eq!(merged.num_fields(), 4);
        assert_eq!(merged.byte_size(), desc.byte_size() + 4);
        assert_eq!(merged.field_name(3).unwrap(), "f0");
    }

    #[test]
    fn test_validate() {
        let desc = create_test_desc();
        let ok = vec![Field::Int(1), Field::Str("Alice".to_string()), Field::Int(90)];
        assert!(desc.validate(&ok).is_ok());

        let short = vec![Field::Int(1)];
        assert!(matches!(
            desc.validate(&short),
            Err(RecordError::SchemaMismatch(_))
        ));

        let wrong_type = vec![Field::Int(1), Field::Int(2), Field::Int(3)];
        assert!(matches!(
            desc.validate(&wrong_type),
            Err(RecordError::TypeMismatch { .. })
        ));

        let too_long = vec![Field::Int(1), Field::Str("x".repeat(21)), Field::Int(3)];
        assert!(desc.validate(&too_long).is_err());
    }

    #[test]
    fn test_display() {
        let desc = TupleDesc::new(vec![
            (FieldType::Int, "a".to_string()),
            (FieldType::Str(4), "b".to_string()),
        ]);
        assert_eq!(desc.to_string(), "INT(a), STRING(4)(b)");
    }
}
