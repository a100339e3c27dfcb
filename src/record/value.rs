use std::fmt;

use super::error::{RecordError, RecordResult};

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,        // 4 bytes
    Str(usize), // n bytes (fixed length, zero padded)
}

impl FieldType {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str(n) => *n,
        }
    }

    /// Parse a textual type name: `int`, `string` or `string(n)`
    pub fn parse(name: &str, default_string_len: usize) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        if name == "int" {
            return Some(FieldType::Int);
        }
        if name == "string" {
            return Some(FieldType::Str(default_string_len));
        }
        let len = name.strip_prefix("string(")?.strip_suffix(')')?;
        len.trim().parse().ok().map(FieldType::Str)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Str(n) => write!(f, "STRING({})", n),
        }
    }
}

/// Comparison operators shared by predicates and histograms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    GreaterThan,
    LessThan,
    LessThanOrEq,
    GreaterThanOrEq,
    Like,
    NotEquals,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Equals => "=",
            CompareOp::GreaterThan => ">",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::NotEquals => "<>",
        };
        f.write_str(s)
    }
}

/// Represents a single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    /// Check whether this value can be stored in a column of `field_type`
    pub fn matches(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (Field::Int(_), FieldType::Int) | (Field::Str(_), FieldType::Str(_))
        )
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(i) => Some(*i),
            Field::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Evaluate `self op other`; values of different types never compare true
    pub fn compare(&self, op: CompareOp, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => match op {
                CompareOp::Equals | CompareOp::Like => a == b,
                CompareOp::NotEquals => a != b,
                CompareOp::GreaterThan => a > b,
                CompareOp::GreaterThanOrEq => a >= b,
                CompareOp::LessThan => a < b,
                CompareOp::LessThanOrEq => a <= b,
            },
            (Field::Str(a), Field::Str(b)) => match op {
                CompareOp::Equals => a == b,
                CompareOp::NotEquals => a != b,
                CompareOp::GreaterThan => a > b,
                CompareOp::GreaterThanOrEq => a >= b,
                CompareOp::LessThan => a < b,
                CompareOp::LessThanOrEq => a <= b,
                CompareOp::Like => a.contains(b.as_str()),
            },
            _ => false,
        }
    }

    /// Serialize value into exactly `field_type.size()` bytes
    pub fn serialize_into(&self, field_type: &FieldType, out: &mut [u8]) -> RecordResult<()> {
        match (self, field_type) {
            (Field::Int(i), FieldType::Int) => {
                out.copy_from_slice(&i.to_le_bytes());
                Ok(())
            }
            (Field::Str(s), FieldType::Str(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len {
                    return Err(RecordError::Serialization(format!(
                        "String length {} exceeds max length {}",
                        bytes.len(),
                        max_len
                    )));
                }
                out[..bytes.len()].copy_from_slice(bytes);
                out[bytes.len()..].fill(0);
                Ok(())
            }
            _ => Err(RecordError::TypeMismatch {
                expected: field_type.to_string(),
                actual: format!("{:?}", self),
            }),
        }
    }

    /// Deserialize value from bytes
    pub fn deserialize(bytes: &[u8], field_type: &FieldType) -> RecordResult<Self> {
        if bytes.len() != field_type.size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes for {}, got {}",
                field_type.size(),
                field_type,
                bytes.len()
            )));
        }

        match field_type {
            FieldType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Field::Int(i32::from_le_bytes(buf)))
            }
            FieldType::Str(_) => {
                // Find the first null byte (string terminator)
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Field::Str(s))
            }
        }
    }

    /// Parse a textual value according to `field_type`
    pub fn parse(text: &str, field_type: &FieldType) -> RecordResult<Self> {
        match field_type {
            FieldType::Int => text.trim().parse::<i32>().map(Field::Int).map_err(|e| {
                RecordError::TypeMismatch {
                    expected: field_type.to_string(),
                    actual: format!("{:?} ({})", text, e),
                }
            }),
            FieldType::Str(_) => Ok(Field::Str(text.to_string())),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(i) => write!(f, "{}", i),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}
